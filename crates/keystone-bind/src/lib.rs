//! # Keystone Bind
//!
//! Declarative parameter binding for the Keystone request pipeline.
//!
//! A parameter struct describes, field by field, where each value comes from
//! and which rules it must satisfy. The binder then fills the struct from the
//! request without any hand-written parsing code, or reports the first
//! offending field.
//!
//! | Stage              | Module       | Input                  | Output          |
//! |--------------------|--------------|------------------------|-----------------|
//! | metadata parsing   | [`spec`]     | annotation strings     | [`FieldSpec`]   |
//! | schema compilation | [`schema`]   | [`Params::describe`]   | [`Schema`]      |
//! | extraction         | [`extract`]  | HTTP request           | [`Buckets`]     |
//! | validation         | [`rules`]    | strings + `FieldSpec`  | `AppError`      |
//! | coercion           | [`value`]    | validated strings      | field values    |
//!
//! ## Example
//!
//! ```rust
//! use keystone_bind::{bind, Bucket, Buckets, Pagination, Params};
//!
//! #[derive(Debug, Default, Params)]
//! struct ListInvoices {
//!     #[param(from = "url", name = "customer", rules = "required,uuid")]
//!     customer: String,
//!     #[param(from = "query", name = "status", one_of = "open|paid")]
//!     status: Option<String>,
//!     #[param(flatten)]
//!     page: Pagination,
//! }
//!
//! let buckets = Buckets::standard()
//!     .with("url", Bucket::from_pairs([("customer", "0190a4b2-7c1e-7d5a-9f00-1b2c3d4e5f60")]))
//!     .with("query", Bucket::from_pairs([("status", "paid"), ("page", "2")]));
//!
//! let params: ListInvoices = bind(&buckets, None).unwrap();
//! assert_eq!(params.status.as_deref(), Some("paid"));
//! assert_eq!(params.page.page, 2);
//! ```

#![doc(html_root_url = "https://docs.rs/keystone-bind/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Lets `#[derive(Params)]` output, which names `::keystone_bind`, compile
// inside this crate's own tests and docs.
extern crate self as keystone_bind;

mod binder;
mod bucket;
mod error;
pub mod extract;
pub mod file;
mod pagination;
pub mod rules;
pub mod schema;
pub mod spec;
pub mod value;

pub use binder::{bind, bind_into};
pub use bucket::{Bucket, Buckets};
pub use error::SchemaError;
pub use extract::{MultipartConfig, RequestBuckets};
pub use file::{FileMap, FileSource, ImageLimits, UploadedFile};
pub use pagination::Pagination;
pub use schema::{Accessor, Params, Schema, SchemaBuilder, SelfValidate};
pub use spec::{FieldAnnotation, FieldSpec, Rule, Source};
pub use value::ParamValue;

/// Derives [`Params`] from `#[param(...)]` field attributes.
pub use keystone_macros::Params;

#[doc(hidden)]
pub use keystone_core as __core;
