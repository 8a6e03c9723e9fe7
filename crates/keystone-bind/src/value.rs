//! Coercion of validated strings into field values.
//!
//! [`ParamValue`] is implemented for the scalar kinds a parameter struct can
//! hold: `String`, `bool` and the integer types. The `assign_*` functions
//! apply the binding rules for plain, optional and list fields:
//!
//! - an empty value for an integer or boolean leaves the field untouched
//! - an `Option` stays `None` unless the key was supplied or a value resolved
//! - a list is replaced by the coerced values, skipping empty items

use keystone_core::{AppError, AppResult, Reason};

/// The kinds of scalar a field can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Text, bound verbatim.
    String,
    /// Signed or unsigned integer.
    Integer,
    /// Boolean.
    Boolean,
}

/// A scalar that can be parsed from a parameter string.
pub trait ParamValue: Sized + Send + 'static {
    /// Kind of scalar.
    const KIND: ValueKind;

    /// Parses a non-empty value for `field`.
    fn parse_param(field: &str, raw: &str) -> AppResult<Self>;
}

impl ParamValue for String {
    const KIND: ValueKind = ValueKind::String;

    fn parse_param(_field: &str, raw: &str) -> AppResult<Self> {
        Ok(raw.to_string())
    }
}

impl ParamValue for bool {
    const KIND: ValueKind = ValueKind::Boolean;

    fn parse_param(field: &str, raw: &str) -> AppResult<Self> {
        parse_bool(raw).ok_or_else(|| AppError::validation(field, Reason::InvalidBoolean))
    }
}

macro_rules! impl_integer {
    ($($t:ty),*) => {
        $(
            impl ParamValue for $t {
                const KIND: ValueKind = ValueKind::Integer;

                fn parse_param(field: &str, raw: &str) -> AppResult<Self> {
                    raw.parse::<$t>()
                        .map_err(|_| AppError::validation(field, Reason::InvalidInteger))
                }
            }
        )*
    };
}

impl_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

/// Parses the boolean spellings accepted in parameters:
/// `1`, `t`, `true`, `0`, `f`, `false` in any letter case.
#[must_use]
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Some(true),
        "0" | "f" | "false" => Some(false),
        _ => None,
    }
}

/// Assigns a plain scalar field.
pub fn assign_scalar<F: ParamValue>(
    slot: &mut F,
    field: &str,
    value: &str,
    present: bool,
) -> AppResult<()> {
    if value.is_empty() {
        if present && F::KIND == ValueKind::String {
            *slot = F::parse_param(field, value)?;
        }
        return Ok(());
    }
    *slot = F::parse_param(field, value)?;
    Ok(())
}

/// Assigns an optional scalar field.
pub fn assign_optional<F: ParamValue>(
    slot: &mut Option<F>,
    field: &str,
    value: &str,
    present: bool,
) -> AppResult<()> {
    if value.is_empty() {
        if present && F::KIND == ValueKind::String {
            *slot = Some(F::parse_param(field, value)?);
        }
        return Ok(());
    }
    *slot = Some(F::parse_param(field, value)?);
    Ok(())
}

/// Assigns a list field. Leaves the field untouched when nothing was supplied.
pub fn assign_list<F: ParamValue>(
    slot: &mut Vec<F>,
    field: &str,
    values: &[String],
) -> AppResult<()> {
    if values.is_empty() {
        return Ok(());
    }
    *slot = values
        .iter()
        .filter(|v| !v.is_empty() || F::KIND == ValueKind::String)
        .map(|v| F::parse_param(field, v))
        .collect::<AppResult<Vec<F>>>()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_spellings() {
        for raw in ["1", "t", "T", "true", "TRUE", "True"] {
            assert_eq!(parse_bool(raw), Some(true), "{raw}");
        }
        for raw in ["0", "f", "false", "FALSE"] {
            assert_eq!(parse_bool(raw), Some(false), "{raw}");
        }
        assert_eq!(parse_bool("yes"), None);
    }

    #[test]
    fn test_integer_coercion_error() {
        let mut n = 0u32;
        let err = assign_scalar(&mut n, "page", "-1", true).unwrap_err();
        assert_eq!(err.reason(), Some(Reason::InvalidInteger));
        assert_eq!(err.field(), Some("page"));
    }

    #[test]
    fn test_empty_integer_keeps_default() {
        let mut n = 20u32;
        assign_scalar(&mut n, "per_page", "", true).unwrap();
        assert_eq!(n, 20);
    }

    #[test]
    fn test_empty_string_when_present() {
        let mut s = "preset".to_string();
        assign_scalar(&mut s, "q", "", false).unwrap();
        assert_eq!(s, "preset");
        assign_scalar(&mut s, "q", "", true).unwrap();
        assert_eq!(s, "");
    }

    #[test]
    fn test_optional_left_unset() {
        let mut opt: Option<i64> = None;
        assign_optional(&mut opt, "limit", "", false).unwrap();
        assert_eq!(opt, None);
        assign_optional(&mut opt, "limit", "", true).unwrap();
        assert_eq!(opt, None);
        assign_optional(&mut opt, "limit", "7", true).unwrap();
        assert_eq!(opt, Some(7));

        let mut name: Option<String> = None;
        assign_optional(&mut name, "name", "", true).unwrap();
        assert_eq!(name.as_deref(), Some(""));
    }

    #[test]
    fn test_bool_coercion_error() {
        let mut b = false;
        let err = assign_scalar(&mut b, "active", "maybe", true).unwrap_err();
        assert_eq!(err.reason(), Some(Reason::InvalidBoolean));
    }

    #[test]
    fn test_list_assignment() {
        let mut ids: Vec<u64> = vec![99];
        assign_list(&mut ids, "id", &[]).unwrap();
        assert_eq!(ids, vec![99]);
        assign_list(&mut ids, "id", &["1".into(), "".into(), "3".into()]).unwrap();
        assert_eq!(ids, vec![1, 3]);
        assert!(assign_list(&mut ids, "id", &["x".into()]).is_err());
    }
}
