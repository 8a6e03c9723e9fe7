//! Schema construction errors.
//!
//! A [`SchemaError`] means a parameter type was declared incorrectly. It is
//! raised when the schema is compiled, which happens once per type, so a bad
//! declaration surfaces at startup or in the first test that touches it
//! rather than on some later request.

use keystone_core::AppError;
use thiserror::Error;

/// Error raised while compiling a parameter schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A numeric annotation could not be parsed as an integer.
    #[error("field `{field}`: `{attribute}` must be an integer, got `{value}`")]
    InvalidInteger {
        /// Field the annotation belongs to.
        field: String,
        /// Annotation attribute (`max_len`, `min`, ...).
        attribute: &'static str,
        /// The rejected text.
        value: String,
    },

    /// `min` is greater than `max`, or `min_items` greater than `max_items`.
    #[error("field `{field}`: lower bound {min} exceeds upper bound {max}")]
    InvertedBounds {
        /// Field the annotation belongs to.
        field: String,
        /// Lower bound.
        min: i64,
        /// Upper bound.
        max: i64,
    },

    /// A sub-schema failed to compile.
    #[error("embedded `{embedded}`: {source}")]
    Embedded {
        /// Type name of the embedded struct.
        embedded: &'static str,
        /// The underlying error.
        #[source]
        source: Box<SchemaError>,
    },
}

impl SchemaError {
    /// Creates an [`SchemaError::InvalidInteger`].
    #[must_use]
    pub fn invalid_integer(
        field: impl Into<String>,
        attribute: &'static str,
        value: impl Into<String>,
    ) -> Self {
        Self::InvalidInteger {
            field: field.into(),
            attribute,
            value: value.into(),
        }
    }
}

impl From<SchemaError> for AppError {
    fn from(err: SchemaError) -> Self {
        AppError::internal_with_cause("invalid parameter schema", err)
    }
}
