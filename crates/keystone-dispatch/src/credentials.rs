//! `Authorization` header parsing.
//!
//! Accepted values have the form
//!
//! ```text
//! <scheme> <base64(id:secret)> [realm="<realm>"]
//! ```
//!
//! with two schemes:
//!
//! | Scheme     | `id`      | `secret`   |
//! |------------|-----------|------------|
//! | `basic`    | user ID   | session ID |
//! | `password` | ignored   | password   |
//!
//! Header values are scanned in order. The first value whose scheme is
//! known and whose realm is absent or equal to the configured realm is
//! used. Values with an unknown scheme or another realm are skipped. A
//! known scheme with a missing token, stray parameters or a bad token is
//! an error rather than a reason to keep scanning.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue};
use keystone_core::{AppError, AppResult};
use std::fmt;

/// Field name used in errors about the credential header.
pub const AUTHORIZATION_FIELD: &str = "authorization";

/// Credentials carried by a request.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// A user ID and the session it authenticated with.
    Session {
        /// User ID.
        user_id: String,
        /// Session ID.
        session_id: String,
    },
    /// A bare password, for endpoints that confirm it themselves.
    Password {
        /// The password.
        secret: String,
    },
}

impl Credentials {
    /// Creates session credentials.
    #[must_use]
    pub fn session(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self::Session {
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }

    /// Creates password credentials.
    #[must_use]
    pub fn password(secret: impl Into<String>) -> Self {
        Self::Password {
            secret: secret.into(),
        }
    }

    /// Returns the scheme name.
    #[must_use]
    pub const fn scheme(&self) -> &'static str {
        match self {
            Self::Session { .. } => "basic",
            Self::Password { .. } => "password",
        }
    }

    /// Renders the credentials as an `Authorization` header value.
    ///
    /// # Example
    ///
    /// ```
    /// use keystone_dispatch::Credentials;
    ///
    /// let value = Credentials::session("u1", "s1").to_header_value(None);
    /// assert_eq!(value.to_str().unwrap(), "basic dTE6czE=");
    /// ```
    #[must_use]
    pub fn to_header_value(&self, realm: Option<&str>) -> HeaderValue {
        let raw = match self {
            Self::Session {
                user_id,
                session_id,
            } => format!("{user_id}:{session_id}"),
            Self::Password { secret } => format!(":{secret}"),
        };
        let mut value = format!("{} {}", self.scheme(), STANDARD.encode(raw));
        if let Some(realm) = realm {
            value.push_str(&format!(" realm=\"{realm}\""));
        }
        HeaderValue::from_str(&value)
            .unwrap_or_else(|_| HeaderValue::from_static("invalid"))
    }

    /// Parses one header value.
    ///
    /// Returns `Ok(None)` for an unknown scheme or a well-formed value
    /// addressed to another realm.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` on field `authorization` when the scheme is known
    /// but the token is missing, the parameters do not parse or the token
    /// is not valid base64 `id:secret`.
    pub fn parse(value: &str, realm: &str) -> AppResult<Option<Self>> {
        let mut parts = value.split_whitespace();
        let Some(scheme) = parts.next() else {
            return Ok(None);
        };
        let is_basic = scheme.eq_ignore_ascii_case("basic");
        if !is_basic && !scheme.eq_ignore_ascii_case("password") {
            return Ok(None);
        }

        let token = parts
            .next()
            .ok_or_else(|| malformed("credentials token is missing"))?;
        let rest: Vec<&str> = parts.collect();
        let value_realm = match rest.as_slice() {
            [] => None,
            [param] => Some(
                parse_realm(param)
                    .ok_or_else(|| malformed("only a realm parameter may follow the token"))?,
            ),
            _ => return Err(malformed("unexpected data after the credentials token")),
        };
        if value_realm.is_some_and(|r| r != realm) {
            return Ok(None);
        }

        if is_basic {
            let (user_id, session_id) = decode_pair(token)?;
            if user_id.is_empty() || session_id.is_empty() {
                return Err(malformed("basic credentials need a user ID and a session ID"));
            }
            Ok(Some(Self::Session {
                user_id,
                session_id,
            }))
        } else {
            let (_, secret) = decode_pair(token)?;
            Ok(Some(Self::Password { secret }))
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session { user_id, .. } => f
                .debug_struct("Session")
                .field("user_id", user_id)
                .field("session_id", &"<redacted>")
                .finish(),
            Self::Password { .. } => f
                .debug_struct("Password")
                .field("secret", &"<redacted>")
                .finish(),
        }
    }
}

/// Finds the credentials of a request.
///
/// Returns `Ok(None)` when no header value matches.
///
/// # Errors
///
/// `InvalidArgument` on field `authorization` when a value with a known
/// scheme is malformed.
pub fn parse_authorization(headers: &HeaderMap, realm: &str) -> AppResult<Option<Credentials>> {
    for value in headers.get_all(AUTHORIZATION) {
        let Ok(value) = value.to_str() else {
            tracing::debug!("skipping non-ASCII authorization header value");
            continue;
        };
        if let Some(credentials) = Credentials::parse(value, realm)? {
            return Ok(Some(credentials));
        }
    }
    Ok(None)
}

fn parse_realm(param: &str) -> Option<&str> {
    let (key, value) = param.split_once('=')?;
    if !key.eq_ignore_ascii_case("realm") {
        return None;
    }
    Some(value.trim_matches('"'))
}

fn decode_pair(token: &str) -> AppResult<(String, String)> {
    let bytes = STANDARD
        .decode(token)
        .map_err(|_| malformed("credentials are not valid base64"))?;
    let text =
        String::from_utf8(bytes).map_err(|_| malformed("credentials are not valid UTF-8"))?;
    let (id, secret) = text
        .split_once(':')
        .ok_or_else(|| malformed("credentials must have the form id:secret"))?;
    Ok((id.to_string(), secret.to_string()))
}

fn malformed(message: &str) -> AppError {
    AppError::invalid_argument(AUTHORIZATION_FIELD, message)
}
