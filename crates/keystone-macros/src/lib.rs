//! Procedural macros for Keystone parameter structs.
//!
//! # Overview
//!
//! `#[derive(Params)]` turns `#[param(...)]` field attributes into a
//! `keystone_bind::Params` implementation, so a parameter struct is fully
//! described by its declaration.
//!
//! # Example
//!
//! ```rust,ignore
//! use keystone_bind::{Pagination, Params, UploadedFile};
//!
//! #[derive(Debug, Default, Params)]
//! #[params(validate)]
//! struct UpdateProfile {
//!     #[param(from = "url", name = "id", rules = "required,uuid")]
//!     id: String,
//!     #[param(from = "form", name = "display_name", rules = "trim,noempty", max_len = 64)]
//!     display_name: Option<String>,
//!     #[param(from = "form", name = "role", one_of = "member|owner")]
//!     role: String,
//!     #[param(from = "file", name = "avatar", rules = "image")]
//!     avatar: Option<UploadedFile>,
//!     #[param(flatten)]
//!     page: Pagination,
//!     #[param(skip)]
//!     cached: bool,
//! }
//! ```
//!
//! # Macro Expansion
//!
//! For every annotated field the derive emits an accessor function and one
//! `SchemaBuilder` call, picked from the field's shape:
//!
//! | Field                         | Builder call |
//! |-------------------------------|--------------|
//! | `#[param(flatten)]`           | `embed`      |
//! | `from = "file"`               | `file`       |
//! | `Option<T>`                   | `optional`   |
//! | `Vec<T>`                      | `list`       |
//! | anything else                 | `field`      |
//!
//! Attribute values are emitted as the annotation strings the schema
//! compiler parses at runtime, so a malformed bound such as `min = "one"`
//! is reported when the schema is first compiled. Fields without a
//! `#[param]` attribute are left alone.

mod params;
mod parse;

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

/// Derives `keystone_bind::Params`.
///
/// # Field attributes
///
/// - `from`: `url`, `query` (default), `form` or `file`
/// - `name`: bucket key, defaults to the field name; `"-"` skips the field
/// - `rules`: comma-separated rules (`required`, `trim`, `uuid`, `slug`,
///   `slugOrUuid`, `email`, `url`, `image`, `noempty`, `no_empty_items`)
/// - `default`: value used when the key is absent or empty
/// - `max_len`, `min`, `max`, `min_items`, `max_items`: integer bounds
/// - `one_of`: `|`-separated allowed values
/// - `skip`: never bind this field
/// - `flatten`: bind the fields of an embedded `Params` struct in place
///
/// # Container attributes
///
/// - `#[params(validate)]`: the struct implements `SelfValidate`, run after
///   its fields are bound
/// - `#[params(crate = "path")]`: path of the binding crate when it is not
///   available as `::keystone_bind`
#[proc_macro_derive(Params, attributes(param, params))]
pub fn derive_params(item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    params::expand_params(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
