//! Handlers and endpoints.
//!
//! A handler receives the [`RequestContext`] and returns `Ok(())` or an
//! error. It writes its response only through
//! [`RequestContext::response`]; the dispatcher renders errors.
//!
//! Any `async fn(RequestContext) -> AppResult<()>` is a handler:
//!
//! ```
//! use keystone_core::AppResult;
//! use keystone_dispatch::{Endpoint, Guard, RequestContext};
//!
//! async fn whoami(ctx: RequestContext) -> AppResult<()> {
//!     ctx.response().ok(&ctx.identity().log_id())
//! }
//!
//! let endpoint = Endpoint::new("users.whoami", whoami).with_guard(Guard::authenticated());
//! assert_eq!(endpoint.name(), "users.whoami");
//! ```

use crate::context::RequestContext;
use crate::guard::Guard;
use crate::types::BoxFuture;
use keystone_core::AppResult;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Request handler.
pub trait Handler: Send + Sync + 'static {
    /// Handles one request.
    fn call(&self, ctx: RequestContext) -> BoxFuture<'static, AppResult<()>>;
}

impl<F, Fut> Handler for F
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<()>> + Send + 'static,
{
    fn call(&self, ctx: RequestContext) -> BoxFuture<'static, AppResult<()>> {
        Box::pin(self(ctx))
    }
}

/// A handler and the guard in front of it.
#[derive(Clone)]
pub struct Endpoint {
    name: String,
    guard: Option<Guard>,
    handler: Arc<dyn Handler>,
}

impl Endpoint {
    /// Creates an open endpoint without parameters.
    pub fn new<H: Handler>(name: impl Into<String>, handler: H) -> Self {
        Self {
            name: name.into(),
            guard: None,
            handler: Arc::new(handler),
        }
    }

    /// Puts `guard` in front of the handler.
    #[must_use]
    pub fn with_guard(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Returns the endpoint name used in logs, metrics and reports.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the guard, if any.
    #[must_use]
    pub const fn guard(&self) -> Option<&Guard> {
        self.guard.as_ref()
    }

    /// Returns the handler.
    #[must_use]
    pub fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn noop(_ctx: RequestContext) -> AppResult<()> {
        Ok(())
    }

    #[test]
    fn test_endpoint_builder() {
        let endpoint = Endpoint::new("noop", noop);
        assert_eq!(endpoint.name(), "noop");
        assert!(endpoint.guard().is_none());

        let endpoint = endpoint.with_guard(Guard::admin());
        assert!(endpoint.guard().is_some());
        assert!(format!("{endpoint:?}").contains("noop"));
    }

    #[test]
    fn test_closure_handler() {
        let endpoint = Endpoint::new("closure", |ctx: RequestContext| async move {
            ctx.response().no_content()
        });
        assert_eq!(endpoint.name(), "closure");
    }
}
