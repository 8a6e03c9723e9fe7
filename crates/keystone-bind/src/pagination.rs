//! Reusable pagination parameters.

use crate::schema::{Params, SchemaBuilder};
use crate::spec::FieldAnnotation;

/// Default page size.
pub const DEFAULT_PER_PAGE: u32 = 20;

/// Largest accepted page size.
pub const MAX_PER_PAGE: u32 = 100;

/// `page` / `per_page` query parameters, meant to be embedded in endpoint
/// parameter structs with `#[param(flatten)]`.
///
/// Pages are 1-based.
///
/// # Example
///
/// ```
/// use keystone_bind::Pagination;
///
/// let p = Pagination { page: 3, per_page: 25 };
/// assert_eq!(p.offset(), 50);
/// assert_eq!(p.limit(), 25);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Pagination {
    /// 1-based page number.
    pub page: u32,
    /// Items per page.
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl Pagination {
    /// Number of items to skip.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }

    /// Number of items to return.
    #[must_use]
    pub fn limit(&self) -> u64 {
        u64::from(self.per_page)
    }
}

fn page(p: &mut Pagination) -> &mut u32 {
    &mut p.page
}

fn per_page(p: &mut Pagination) -> &mut u32 {
    &mut p.per_page
}

impl Params for Pagination {
    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema
            .field(
                FieldAnnotation::new("query", "page")
                    .rules("trim")
                    .default_value("1")
                    .min("1"),
                page,
            )
            .field(
                FieldAnnotation::new("query", "per_page")
                    .rules("trim")
                    .default_value("20")
                    .min("1")
                    .max("100"),
                per_page,
            );
    }
}
