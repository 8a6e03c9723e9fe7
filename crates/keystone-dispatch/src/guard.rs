//! Endpoint guards.
//!
//! A [`Guard`] pairs an optional authorization predicate with an optional
//! parameter schema. Both halves are optional: an endpoint without a guard,
//! or with an empty one, is open and declares no parameters.
//!
//! Predicates are plain functions of the [`Identity`]. They run before any
//! parameter is bound and never perform I/O.
//!
//! # Example
//!
//! ```
//! use keystone_core::{ErrorKind, Identity, Session, User};
//! use keystone_dispatch::Guard;
//!
//! let guard = Guard::admin();
//!
//! let err = guard.authorize(&Identity::anonymous()).unwrap_err();
//! assert_eq!(err.kind(), ErrorKind::Unauthenticated);
//!
//! let member = Identity::new(User::new("u1", "ada@example.com"), Session::new("s1", "u1"));
//! assert_eq!(guard.authorize(&member).unwrap_err().kind(), ErrorKind::PermissionDenied);
//!
//! let admin = Identity::new(User::new("u2", "root@example.com").admin(), Session::new("s2", "u2"));
//! assert!(guard.authorize(&admin).is_ok());
//! ```

use keystone_bind::{bind, Params, RequestBuckets, Schema, SchemaError};
use keystone_core::{AppError, AppResult, Identity};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// An authorization predicate.
pub type Authorize = Arc<dyn Fn(&Identity) -> AppResult<()> + Send + Sync>;

/// Parameters bound for one request, type-erased.
pub type BoundParams = Box<dyn Any + Send + Sync>;

/// Requires a non-anonymous identity.
///
/// # Errors
///
/// `Unauthenticated` when there is no user or the user has no ID.
pub fn authenticated(identity: &Identity) -> AppResult<()> {
    if identity.is_anonymous() {
        return Err(AppError::unauthenticated("authentication required"));
    }
    Ok(())
}

/// Requires an admin identity.
///
/// # Errors
///
/// `Unauthenticated` as for [`authenticated`], then `PermissionDenied` when
/// the user is not an admin.
pub fn admin_only(identity: &Identity) -> AppResult<()> {
    authenticated(identity)?;
    if !identity.is_admin() {
        return Err(AppError::permission_denied("admin access required"));
    }
    Ok(())
}

#[derive(Clone, Copy)]
struct ParamsBinder {
    type_name: &'static str,
    bind: fn(&RequestBuckets) -> AppResult<BoundParams>,
    compile: fn() -> Result<(), SchemaError>,
}

fn bind_erased<T: Params>(buckets: &RequestBuckets) -> AppResult<BoundParams> {
    let params: T = bind(&buckets.buckets, Some(buckets.file_source()))?;
    Ok(Box::new(params))
}

fn compile_erased<T: Params>() -> Result<(), SchemaError> {
    Schema::<T>::of().map(|_| ())
}

/// Authorization predicate and parameter schema of one endpoint.
#[derive(Clone, Default)]
pub struct Guard {
    authorize: Option<Authorize>,
    params: Option<ParamsBinder>,
}

impl Guard {
    /// Creates a guard that authorizes everyone and binds nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a guard requiring an authenticated identity.
    #[must_use]
    pub fn authenticated() -> Self {
        Self::new().with_authorize(authenticated)
    }

    /// Creates a guard requiring an admin identity.
    #[must_use]
    pub fn admin() -> Self {
        Self::new().with_authorize(admin_only)
    }

    /// Sets the authorization predicate.
    #[must_use]
    pub fn with_authorize<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Identity) -> AppResult<()> + Send + Sync + 'static,
    {
        self.authorize = Some(Arc::new(predicate));
        self
    }

    /// Declares the parameter schema bound before the handler runs.
    #[must_use]
    pub fn with_params<T: Params>(mut self) -> Self {
        self.params = Some(ParamsBinder {
            type_name: std::any::type_name::<T>(),
            bind: bind_erased::<T>,
            compile: compile_erased::<T>,
        });
        self
    }

    /// Runs the predicate. A guard without one always authorizes.
    pub fn authorize(&self, identity: &Identity) -> AppResult<()> {
        match &self.authorize {
            Some(predicate) => predicate(identity),
            None => Ok(()),
        }
    }

    /// Returns `true` if a parameter schema is declared.
    #[must_use]
    pub fn has_params(&self) -> bool {
        self.params.is_some()
    }

    /// Returns the declared parameter type name.
    #[must_use]
    pub fn params_type(&self) -> Option<&'static str> {
        self.params.map(|p| p.type_name)
    }

    /// Compiles the declared schema, so malformed annotations can be caught
    /// at startup instead of on the first request.
    pub fn check_schema(&self) -> Result<(), SchemaError> {
        self.params.map_or(Ok(()), |p| (p.compile)())
    }

    /// Binds the declared schema. Returns `None` when none is declared.
    pub fn bind(&self, buckets: &RequestBuckets) -> AppResult<Option<BoundParams>> {
        self.params.map(|p| (p.bind)(buckets)).transpose()
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard")
            .field("authorize", &self.authorize.is_some())
            .field("params", &self.params_type())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_bind::{Bucket, Buckets, FieldAnnotation, SchemaBuilder};
    use keystone_core::{ErrorKind, Session, User};

    fn member() -> Identity {
        Identity::new(User::new("u1", "ada@example.com"), Session::new("s1", "u1"))
    }

    fn admin() -> Identity {
        Identity::new(
            User::new("u2", "root@example.com").admin(),
            Session::new("s2", "u2"),
        )
    }

    #[derive(Debug, Default)]
    struct Lookup {
        id: String,
    }

    fn id(p: &mut Lookup) -> &mut String {
        &mut p.id
    }

    impl Params for Lookup {
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema.field(FieldAnnotation::new("url", "id").rules("required"), id);
        }
    }

    #[derive(Debug, Default)]
    struct Broken {
        n: i64,
    }

    fn n(p: &mut Broken) -> &mut i64 {
        &mut p.n
    }

    impl Params for Broken {
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema.field(FieldAnnotation::new("query", "n").max("ten"), n);
        }
    }

    #[test]
    fn test_empty_guard_allows_everyone() {
        let guard = Guard::new();
        assert!(guard.authorize(&Identity::anonymous()).is_ok());
        assert!(!guard.has_params());
        assert!(guard.bind(&RequestBuckets::empty()).unwrap().is_none());
    }

    #[test]
    fn test_authenticated() {
        assert_eq!(
            authenticated(&Identity::anonymous()).unwrap_err().kind(),
            ErrorKind::Unauthenticated
        );
        assert!(authenticated(&member()).is_ok());
    }

    #[test]
    fn test_empty_user_id_is_anonymous() {
        let identity = Identity {
            user: Some(User::new("", "ghost@example.com")),
            session: None,
        };
        assert_eq!(
            authenticated(&identity).unwrap_err().kind(),
            ErrorKind::Unauthenticated
        );
    }

    #[test]
    fn test_admin_only_branches() {
        assert_eq!(
            admin_only(&Identity::anonymous()).unwrap_err().kind(),
            ErrorKind::Unauthenticated
        );
        assert_eq!(
            admin_only(&member()).unwrap_err().kind(),
            ErrorKind::PermissionDenied
        );
        assert!(admin_only(&admin()).is_ok());
    }

    #[test]
    fn test_custom_predicate() {
        let guard = Guard::new().with_authorize(|identity: &Identity| {
            authenticated(identity)?;
            if identity.user_id() == Some("u1") {
                Ok(())
            } else {
                Err(AppError::permission_denied("only u1"))
            }
        });
        assert!(guard.authorize(&member()).is_ok());
        assert_eq!(
            guard.authorize(&admin()).unwrap_err().kind(),
            ErrorKind::PermissionDenied
        );
    }

    #[test]
    fn test_bind_declared_params() {
        let guard = Guard::authenticated().with_params::<Lookup>();
        assert!(guard.has_params());
        assert!(guard.params_type().unwrap().ends_with("Lookup"));

        let mut buckets = RequestBuckets::empty();
        buckets.buckets = Buckets::standard().with("url", Bucket::from_pairs([("id", "42")]));
        let bound = guard.bind(&buckets).unwrap().unwrap();
        assert_eq!(bound.downcast_ref::<Lookup>().unwrap().id, "42");

        let err = guard.bind(&RequestBuckets::empty()).unwrap_err();
        assert_eq!(err.field(), Some("id"));
    }

    #[test]
    fn test_check_schema() {
        assert!(Guard::new().with_params::<Lookup>().check_schema().is_ok());
        assert!(Guard::new().with_params::<Broken>().check_schema().is_err());
        assert!(Guard::new().check_schema().is_ok());
    }
}
