//! Field validation.
//!
//! Scalar checks run in a fixed order and stop at the first failure:
//!
//! 1. length bound (`max_len`)
//! 2. `required` / `noempty`
//! 3. format rules (`uuid`, `slug`, `slugOrUuid`, `email`, `url`)
//! 4. enum membership (`one_of`)
//! 5. integer range (`min` / `max`)
//!
//! List checks run `required`, `min_items` and `max_items` first, then the
//! per-element checks (`no_empty_items`, then steps 1 and 3-5 above).
//!
//! Validation operates on strings only; coercion happens afterwards.

use crate::spec::{FieldSpec, Rule};
use keystone_core::{AppError, AppResult, Reason};
use regex::Regex;
use std::sync::OnceLock;
use validator::{ValidateEmail, ValidateUrl};

fn slug_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$")
            .unwrap_or_else(|_| unreachable!("static pattern is valid"))
    })
}

/// Returns `true` if `value` is a UUID.
#[must_use]
pub fn is_uuid(value: &str) -> bool {
    uuid::Uuid::try_parse(value).is_ok()
}

/// Returns `true` if `value` is a lowercase slug such as `release-2024`.
#[must_use]
pub fn is_slug(value: &str) -> bool {
    slug_pattern().is_match(value)
}

/// Returns `true` if `value` is an email address.
#[must_use]
pub fn is_email(value: &str) -> bool {
    value.to_owned().validate_email()
}

/// Returns `true` if `value` is an absolute URL.
#[must_use]
pub fn is_url(value: &str) -> bool {
    value.to_owned().validate_url()
}

/// Checks one format rule. Non-format rules always pass.
#[must_use]
pub fn check_format(rule: Rule, value: &str) -> Option<Reason> {
    let ok = match rule {
        Rule::Uuid => is_uuid(value),
        Rule::Slug => is_slug(value),
        Rule::SlugOrUuid => is_slug(value) || is_uuid(value),
        Rule::Email => is_email(value),
        Rule::Url => is_url(value),
        _ => true,
    };
    if ok {
        return None;
    }
    Some(match rule {
        Rule::Uuid => Reason::InvalidUuid,
        Rule::Slug => Reason::InvalidSlug,
        Rule::SlugOrUuid => Reason::InvalidSlugOrUuid,
        Rule::Email => Reason::InvalidEmail,
        _ => Reason::InvalidUrl,
    })
}

/// Validates a scalar value.
///
/// `value` is the effective value (after default and trim); `present` tells
/// whether the key appeared in the bucket at all.
pub fn validate_scalar(spec: &FieldSpec, value: &str, present: bool) -> AppResult<()> {
    check_length(spec, value)?;

    if value.is_empty() {
        if spec.required {
            return Err(AppError::validation(&spec.name, Reason::Required));
        }
        if present && spec.has(Rule::NoEmpty) {
            return Err(AppError::validation(&spec.name, Reason::Empty));
        }
        // Nothing supplied: the remaining checks only apply to values.
        return Ok(());
    }

    check_value(spec, value)
}

/// Validates all values of a list field.
pub fn validate_list(spec: &FieldSpec, values: &[String]) -> AppResult<()> {
    if spec.required && values.iter().all(String::is_empty) {
        return Err(AppError::validation(&spec.name, Reason::Required));
    }
    if let Some(min) = spec.min_items {
        if values.len() < min {
            return Err(AppError::invalid_argument(
                &spec.name,
                format!("{} must have at least {min} items", spec.name),
            )
            .with_reason(Reason::TooFewItems));
        }
    }
    if let Some(max) = spec.max_items {
        if values.len() > max {
            return Err(AppError::invalid_argument(
                &spec.name,
                format!("{} must have at most {max} items", spec.name),
            )
            .with_reason(Reason::TooManyItems));
        }
    }

    for value in values {
        if value.is_empty() {
            if spec.has(Rule::NoEmptyItems) {
                return Err(AppError::validation(&spec.name, Reason::EmptyItem));
            }
            continue;
        }
        check_length(spec, value)?;
        check_value(spec, value)?;
    }
    Ok(())
}

fn check_length(spec: &FieldSpec, value: &str) -> AppResult<()> {
    match spec.max_len {
        Some(max) if value.chars().count() > max => Err(AppError::invalid_argument(
            &spec.name,
            format!("{} must be at most {max} characters", spec.name),
        )
        .with_reason(Reason::TooLong)),
        _ => Ok(()),
    }
}

fn check_value(spec: &FieldSpec, value: &str) -> AppResult<()> {
    for rule in spec.format_rules() {
        if let Some(reason) = check_format(rule, value) {
            return Err(AppError::validation(&spec.name, reason));
        }
    }

    if !spec.enum_values.is_empty() && !spec.enum_values.contains(value) {
        let allowed: Vec<&str> = spec.enum_values.iter().map(String::as_str).collect();
        return Err(AppError::invalid_argument(
            &spec.name,
            format!("{} must be one of: {}", spec.name, allowed.join(", ")),
        )
        .with_reason(Reason::NotAllowed));
    }

    if spec.min_int.is_some() || spec.max_int.is_some() {
        let n: i64 = value
            .parse()
            .map_err(|_| AppError::validation(&spec.name, Reason::InvalidInteger))?;
        let below = spec.min_int.is_some_and(|min| n < min);
        let above = spec.max_int.is_some_and(|max| n > max);
        if below || above {
            return Err(AppError::invalid_argument(&spec.name, range_message(spec))
                .with_reason(Reason::OutOfRange));
        }
    }
    Ok(())
}

fn range_message(spec: &FieldSpec) -> String {
    let name = &spec.name;
    match (spec.min_int, spec.max_int) {
        (Some(min), Some(max)) => format!("{name} must be between {min} and {max}"),
        (Some(min), None) => format!("{name} must be at least {min}"),
        (None, Some(max)) => format!("{name} must be at most {max}"),
        (None, None) => format!("{name} is out of range"),
    }
}
