//! Field metadata parsing.
//!
//! A field is declared with a handful of annotation strings, the same ones
//! `#[param(...)]` takes:
//!
//! | Attribute   | Meaning                                                  |
//! |-------------|----------------------------------------------------------|
//! | `from`      | source bucket: `url`, `query`, `form` or `file`          |
//! | `name`      | key in the bucket; `-` skips the field                   |
//! | `rules`     | comma-separated rule tokens (see [`Rule`])               |
//! | `default`   | value used when the key is absent or empty               |
//! | `max_len`   | maximum length in characters                             |
//! | `min`/`max` | inclusive integer range                                  |
//! | `min_items`/`max_items` | bounds on the number of values for lists     |
//! | `one_of`    | `|`-separated list of allowed values                     |
//!
//! [`FieldSpec::parse`] turns them into an immutable [`FieldSpec`]. Numeric
//! attributes that are not integers are rejected here, at schema compile
//! time. Unknown rule tokens are ignored.

use crate::error::SchemaError;
use std::collections::BTreeSet;
use std::fmt;

/// Marker that excludes a field from binding when used as its name.
pub const SKIP: &str = "-";

/// Where a field's value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    /// Path template variables.
    Url,
    /// Query string.
    Query,
    /// Body fields (JSON, urlencoded or multipart text parts).
    Form,
    /// Multipart file parts.
    File,
    /// A bucket registered under another name.
    Other(String),
}

impl Source {
    /// Parses a `from` annotation. An empty string means `query`.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "" | "query" => Self::Query,
            "url" | "path" => Self::Url,
            "form" | "body" => Self::Form,
            "file" => Self::File,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the bucket name this source reads from.
    #[must_use]
    pub fn bucket_name(&self) -> &str {
        match self {
            Self::Url => "url",
            Self::Query => "query",
            Self::Form => "form",
            Self::File => "file",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.bucket_name())
    }
}

/// A validation or transformation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rule {
    /// Missing or empty values are rejected.
    Required,
    /// Leading and trailing whitespace is removed before validation.
    Trim,
    /// Must be a UUID.
    Uuid,
    /// Must be a lowercase slug (`my-thing-2`).
    Slug,
    /// Must be a slug or a UUID.
    SlugOrUuid,
    /// Must be an email address.
    Email,
    /// Must be an absolute URL.
    Url,
    /// File content must decode as an image.
    Image,
    /// An explicitly supplied empty value is rejected.
    NoEmpty,
    /// No element of a list may be empty.
    NoEmptyItems,
}

impl Rule {
    /// Parses one rule token. Returns `None` for unknown tokens.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        let rule = match token {
            "required" => Self::Required,
            "trim" => Self::Trim,
            "uuid" => Self::Uuid,
            "slug" => Self::Slug,
            "slugOrUuid" => Self::SlugOrUuid,
            "email" => Self::Email,
            "url" => Self::Url,
            "image" => Self::Image,
            "noempty" => Self::NoEmpty,
            "no_empty_items" => Self::NoEmptyItems,
            _ => return None,
        };
        Some(rule)
    }

    /// Returns `true` for rules that check the shape of a value.
    #[must_use]
    pub const fn is_format(&self) -> bool {
        matches!(
            self,
            Self::Uuid | Self::Slug | Self::SlugOrUuid | Self::Email | Self::Url
        )
    }
}

/// Raw annotation strings for one field.
///
/// # Example
///
/// ```
/// use keystone_bind::{FieldAnnotation, FieldSpec, Source};
///
/// let spec = FieldSpec::parse(
///     &FieldAnnotation::new("query", "per_page").default_value("20").min("1").max("100"),
/// )
/// .unwrap();
/// assert_eq!(spec.source, Source::Query);
/// assert_eq!(spec.max_int, Some(100));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldAnnotation<'a> {
    /// Source bucket.
    pub from: &'a str,
    /// Bucket key, or [`SKIP`].
    pub name: &'a str,
    /// Comma-separated rule tokens.
    pub rules: &'a str,
    /// Default value.
    pub default: Option<&'a str>,
    /// Maximum length.
    pub max_len: Option<&'a str>,
    /// Inclusive lower integer bound.
    pub min: Option<&'a str>,
    /// Inclusive upper integer bound.
    pub max: Option<&'a str>,
    /// Minimum number of list items.
    pub min_items: Option<&'a str>,
    /// Maximum number of list items.
    pub max_items: Option<&'a str>,
    /// `|`-separated allowed values.
    pub one_of: Option<&'a str>,
}

impl<'a> FieldAnnotation<'a> {
    /// Starts an annotation for `name` read from `from`.
    #[must_use]
    pub const fn new(from: &'a str, name: &'a str) -> Self {
        Self {
            from,
            name,
            rules: "",
            default: None,
            max_len: None,
            min: None,
            max: None,
            min_items: None,
            max_items: None,
            one_of: None,
        }
    }

    /// An annotation for a field that is never bound.
    #[must_use]
    pub const fn skip() -> Self {
        Self::new("", SKIP)
    }

    /// Sets the rule list.
    #[must_use]
    pub const fn rules(mut self, rules: &'a str) -> Self {
        self.rules = rules;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub const fn default_value(mut self, value: &'a str) -> Self {
        self.default = Some(value);
        self
    }

    /// Sets the maximum length.
    #[must_use]
    pub const fn max_len(mut self, value: &'a str) -> Self {
        self.max_len = Some(value);
        self
    }

    /// Sets the lower integer bound.
    #[must_use]
    pub const fn min(mut self, value: &'a str) -> Self {
        self.min = Some(value);
        self
    }

    /// Sets the upper integer bound.
    #[must_use]
    pub const fn max(mut self, value: &'a str) -> Self {
        self.max = Some(value);
        self
    }

    /// Sets the minimum item count.
    #[must_use]
    pub const fn min_items(mut self, value: &'a str) -> Self {
        self.min_items = Some(value);
        self
    }

    /// Sets the maximum item count.
    #[must_use]
    pub const fn max_items(mut self, value: &'a str) -> Self {
        self.max_items = Some(value);
        self
    }

    /// Sets the allowed values.
    #[must_use]
    pub const fn one_of(mut self, value: &'a str) -> Self {
        self.one_of = Some(value);
        self
    }
}

/// Compiled binding and validation metadata for one field.
///
/// When `ignore` is set the binder skips the field and no other attribute is
/// consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Skip this field entirely.
    pub ignore: bool,
    /// Bucket key, also used as the error field name.
    pub name: String,
    /// Source bucket.
    pub source: Source,
    /// The `required` rule is present.
    pub required: bool,
    /// The `trim` rule is present.
    pub trim: bool,
    /// All rules, including `required` and `trim`.
    pub rules: BTreeSet<Rule>,
    /// Fallback for absent or empty values.
    pub default_value: String,
    /// Maximum length in characters.
    pub max_len: Option<usize>,
    /// Inclusive lower integer bound.
    pub min_int: Option<i64>,
    /// Inclusive upper integer bound.
    pub max_int: Option<i64>,
    /// Minimum number of list items.
    pub min_items: Option<usize>,
    /// Maximum number of list items.
    pub max_items: Option<usize>,
    /// Allowed values; empty means unrestricted.
    pub enum_values: BTreeSet<String>,
}

impl FieldSpec {
    /// A spec for a field that is never bound.
    #[must_use]
    pub fn ignored() -> Self {
        Self {
            ignore: true,
            name: SKIP.to_string(),
            source: Source::Query,
            required: false,
            trim: false,
            rules: BTreeSet::new(),
            default_value: String::new(),
            max_len: None,
            min_int: None,
            max_int: None,
            min_items: None,
            max_items: None,
            enum_values: BTreeSet::new(),
        }
    }

    /// Parses a field annotation.
    pub fn parse(annotation: &FieldAnnotation<'_>) -> Result<Self, SchemaError> {
        let name = annotation.name.trim();
        if name == SKIP {
            return Ok(Self::ignored());
        }

        let rules: BTreeSet<Rule> = annotation
            .rules
            .split(',')
            .map(str::trim)
            .filter_map(Rule::parse)
            .collect();

        let min_int = parse_bound::<i64>(name, "min", annotation.min)?;
        let max_int = parse_bound::<i64>(name, "max", annotation.max)?;
        check_order(name, min_int, max_int)?;

        let min_items = parse_bound::<usize>(name, "min_items", annotation.min_items)?;
        let max_items = parse_bound::<usize>(name, "max_items", annotation.max_items)?;
        check_order(
            name,
            min_items.and_then(|v| i64::try_from(v).ok()),
            max_items.and_then(|v| i64::try_from(v).ok()),
        )?;

        let enum_values = annotation
            .one_of
            .map(|list| {
                list.split('|')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            ignore: false,
            name: name.to_string(),
            source: Source::parse(annotation.from),
            required: rules.contains(&Rule::Required),
            trim: rules.contains(&Rule::Trim),
            rules,
            default_value: annotation.default.unwrap_or_default().to_string(),
            max_len: parse_bound(name, "max_len", annotation.max_len)?,
            min_int,
            max_int,
            min_items,
            max_items,
            enum_values,
        })
    }

    /// Returns `true` if the rule is present.
    #[must_use]
    pub fn has(&self, rule: Rule) -> bool {
        self.rules.contains(&rule)
    }

    /// Returns the format rules, in evaluation order.
    pub fn format_rules(&self) -> impl Iterator<Item = Rule> + '_ {
        self.rules.iter().copied().filter(Rule::is_format)
    }
}

fn parse_bound<N: std::str::FromStr>(
    field: &str,
    attribute: &'static str,
    value: Option<&str>,
) -> Result<Option<N>, SchemaError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => text
            .parse()
            .map(Some)
            .map_err(|_| SchemaError::invalid_integer(field, attribute, text)),
    }
}

fn check_order(field: &str, min: Option<i64>, max: Option<i64>) -> Result<(), SchemaError> {
    match (min, max) {
        (Some(min), Some(max)) if min > max => Err(SchemaError::InvertedBounds {
            field: field.to_string(),
            min,
            max,
        }),
        _ => Ok(()),
    }
}
