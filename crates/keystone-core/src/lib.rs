//! # Keystone Core
//!
//! Core types shared by every Keystone crate:
//!
//! - [`AppError`] / [`ErrorKind`] - the closed error taxonomy and its HTTP mapping
//! - [`convert`] - normalization of foreign errors into the taxonomy
//! - [`Identity`] - the resolved caller of a request
//! - [`RequestId`] - UUID v7 correlation identifier
//! - [`SessionStore`], [`Reporter`], [`Mailer`], [`Storage`] - collaborator boundaries
//! - [`sql`] - storage error mapping

#![doc(html_root_url = "https://docs.rs/keystone-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod identity;
mod mail;
mod report;
mod request_id;
pub mod sql;
mod storage;
mod store;

pub use error::{convert, AppError, AppResult, ErrorEnvelope, ErrorKind, Reason};
pub use identity::{Identity, Session, User};
pub use mail::{Mail, Mailer};
pub use report::{ErrorReport, ReportScope, Reporter, TracingReporter};
pub use request_id::RequestId;
pub use storage::{Attributes, MemoryStorage, Storage};
pub use store::{MemorySessionStore, SessionStore};
