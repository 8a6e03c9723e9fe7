//! # Keystone Dispatch
//!
//! Runs one endpoint per request: resolves the caller, applies the
//! endpoint's guard, binds its parameters, calls the handler and renders
//! the outcome.
//!
//! ## Dispatch Stages
//!
//! ```text
//! Request → Identity → Guard → Binding → Handler
//!                                          ↓
//! Response ←──────── ResponseWriting ←─────┘
//! ```
//!
//! Stages run in a fixed order and the first failure ends the request. Only
//! the dispatcher renders responses; every other component returns an
//! [`AppError`](keystone_core::AppError).
//!
//! ## Example
//!
//! ```
//! use keystone_dispatch::DispatchStage;
//!
//! let stages = DispatchStage::all();
//! assert_eq!(stages.len(), 5);
//! assert_eq!(stages[0].name(), "identity_resolution");
//! assert_eq!(stages[4].name(), "response_writing");
//! ```

#![doc(html_root_url = "https://docs.rs/keystone-dispatch/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod context;
pub mod credentials;
pub mod dispatcher;
pub mod guard;
pub mod handler;
pub mod response;
pub mod types;

// Re-export main types at crate root
pub use config::DispatcherConfig;
pub use context::RequestContext;
pub use credentials::{parse_authorization, Credentials, AUTHORIZATION_FIELD};
pub use dispatcher::{DispatchStage, Dispatcher, DispatcherBuilder};
pub use guard::{admin_only, authenticated, Authorize, BoundParams, Guard};
pub use handler::{Endpoint, Handler};
pub use response::{render_error, render_success, ResponseSink};
pub use types::{BoxFuture, Request, Response, JSON_CONTENT_TYPE};
