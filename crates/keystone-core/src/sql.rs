//! Storage error mapping.
//!
//! Recognizes the two storage conditions that callers can act upon:
//!
//! - "no rows" becomes [`ErrorKind::NotFound`](crate::ErrorKind::NotFound)
//! - a unique-constraint violation (SQLSTATE `23505`) becomes
//!   [`ErrorKind::AlreadyExists`](crate::ErrorKind::AlreadyExists), with the
//!   offending column taken from the backend's detail message
//!   (`Key (email)=(ada@example.com) already exists.`)
//!
//! Anything else is passed through untouched so [`convert`](crate::convert)
//! can wrap it as `Internal`.

use crate::error::AppError;
use regex::Regex;
use std::sync::OnceLock;

/// SQLSTATE for `unique_violation`.
pub const UNIQUE_VIOLATION: &str = "23505";

fn detail_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"Key \((?P<column>[^)]+)\)=\(.*\) already exists")
            .unwrap_or_else(|_| unreachable!("static pattern is valid"))
    })
}

/// Extracts the column name from a unique-violation detail message.
#[must_use]
pub fn column_from_detail(detail: &str) -> Option<&str> {
    detail_pattern()
        .captures(detail)
        .and_then(|caps| caps.name("column"))
        .map(|m| m.as_str())
}

/// Maps a backend error given as its SQLSTATE code and detail text.
///
/// Returns `None` when the code is not recognized.
///
/// # Example
///
/// ```
/// use keystone_core::sql::map_sql_parts;
/// use keystone_core::ErrorKind;
///
/// let err = map_sql_parts(
///     Some("23505"),
///     Some("Key (email)=(ada@example.com) already exists."),
/// )
/// .unwrap();
/// assert_eq!(err.kind(), ErrorKind::AlreadyExists);
/// assert_eq!(err.field(), Some("email"));
///
/// assert!(map_sql_parts(Some("40001"), None).is_none());
/// ```
#[must_use]
pub fn map_sql_parts(code: Option<&str>, detail: Option<&str>) -> Option<AppError> {
    if code != Some(UNIQUE_VIOLATION) {
        return None;
    }
    let column = detail.and_then(column_from_detail);
    let err = match column {
        Some(column) => {
            AppError::already_exists(format!("{column} already exists")).with_field(column)
        }
        None => AppError::already_exists("resource already exists"),
    };
    Some(err)
}

/// Tries to map a `sqlx` error; unrecognized errors are returned as-is.
#[cfg(feature = "sqlx")]
pub fn try_map_sql_error(err: sqlx::Error) -> Result<AppError, sqlx::Error> {
    let mapped = match &err {
        sqlx::Error::RowNotFound => Some(AppError::not_found("resource not found")),
        sqlx::Error::Database(db) => {
            let code = db.code().map(std::borrow::Cow::into_owned);
            let detail = db
                .try_downcast_ref::<sqlx::postgres::PgDatabaseError>()
                .and_then(sqlx::postgres::PgDatabaseError::detail);
            map_sql_parts(code.as_deref(), detail)
        }
        _ => None,
    };
    mapped.ok_or(err)
}

/// Maps a `sqlx` error into the taxonomy, wrapping unknown errors as
/// `Internal`.
#[cfg(feature = "sqlx")]
pub fn map_sql_error(err: sqlx::Error) -> AppError {
    match try_map_sql_error(err) {
        Ok(mapped) => mapped,
        Err(other) => crate::error::convert(other),
    }
}
