//! # Keystone
//!
//! **Request binding, authorization and dispatch for REST services**
//!
//! Keystone sits between a router and the handlers it routes to:
//!
//! - **Declarative parameters** – `#[derive(Params)]` structs bound from
//!   path, query, form and file inputs with validation rules
//! - **Guards** – authentication and authorization checked before any
//!   parameter is bound
//! - **One error taxonomy** – every failure is an [`AppError`](core::AppError)
//!   rendered as a stable JSON envelope
//! - **Panic containment** – a panicking handler becomes a generic `500`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use keystone::prelude::*;
//! use std::sync::Arc;
//!
//! #[derive(Debug, Default, Params)]
//! #[params(crate = "::keystone::bind")]
//! struct ListInvoices {
//!     #[param(from = "url", name = "account", rules = "required,uuid")]
//!     account: String,
//!     #[param(flatten)]
//!     page: Pagination,
//! }
//!
//! async fn list_invoices(ctx: RequestContext) -> AppResult<()> {
//!     let params = ctx.params::<ListInvoices>()?;
//!     ctx.response().ok(&serde_json::json!({"page": params.page.page}))
//! }
//!
//! let config = ConfigLoader::new().with_env_prefix("KEYSTONE").load()?;
//! let dispatcher = Dispatcher::builder(Arc::new(MemorySessionStore::new()))
//!     .config(config.dispatcher)
//!     .multipart(config.multipart)
//!     .build();
//! let endpoint = Endpoint::new("invoices.list", list_invoices)
//!     .with_guard(Guard::authenticated().with_params::<ListInvoices>());
//!
//! let response = dispatcher.dispatch(&endpoint, request, [("account", account_id)]).await;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Request → Identity → Guard → Binding → Handler
//!                                          ↓
//! Response ←──────── ResponseWriting ←─────┘
//! ```

#![doc(html_root_url = "https://docs.rs/keystone/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use keystone_core as core;

// Re-export binding types and the derive
pub use keystone_bind as bind;

// Re-export dispatch types
pub use keystone_dispatch as dispatch;

// Re-export configuration types
pub use keystone_config as config;

// Re-export logging and metrics
pub use keystone_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```
/// use keystone::prelude::*;
///
/// let err = AppError::validation("email", Reason::Required);
/// assert_eq!(err.kind(), ErrorKind::InvalidArgument);
/// ```
pub mod prelude {
    pub use keystone_core::{
        AppError, AppResult, ErrorKind, Identity, MemorySessionStore, MemoryStorage, Reason,
        RequestId, Session, SessionStore, Storage, User,
    };

    pub use keystone_bind::{Pagination, Params, SelfValidate, UploadedFile};

    pub use keystone_dispatch::{
        Credentials, Dispatcher, Endpoint, Guard, RequestContext, ResponseSink,
    };

    pub use keystone_config::{ConfigLoader, KeystoneConfig};
}
