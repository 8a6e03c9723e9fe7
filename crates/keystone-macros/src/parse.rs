//! Attribute parsing for `#[derive(Params)]`.

use syn::{meta::ParseNestedMeta, spanned::Spanned, Attribute, Field, Lit, LitStr, Path};

/// Parsed `#[params(...)]` container attributes.
#[derive(Debug, Default)]
pub struct ContainerAttrs {
    /// Implement `as_self_validate` by returning `Some(self)`.
    pub validate: bool,
    /// Path of the binding crate, `::keystone_bind` when not given.
    pub krate: Option<Path>,
}

impl ContainerAttrs {
    pub fn from_attrs(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut out = Self::default();
        for attr in attrs.iter().filter(|a| a.path().is_ident("params")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("validate") {
                    out.validate = true;
                    Ok(())
                } else if meta.path.is_ident("crate") {
                    let lit: LitStr = meta.value()?.parse()?;
                    out.krate = Some(lit.parse()?);
                    Ok(())
                } else {
                    Err(meta.error("unknown params attribute, expected `validate` or `crate`"))
                }
            })?;
        }
        Ok(out)
    }
}

/// Parsed `#[param(...)]` field attributes.
#[derive(Debug, Default)]
pub struct FieldAttrs {
    pub skip: bool,
    pub flatten: bool,
    pub from: Option<String>,
    pub name: Option<String>,
    pub rules: Option<String>,
    pub default: Option<String>,
    pub max_len: Option<String>,
    pub min: Option<String>,
    pub max: Option<String>,
    pub min_items: Option<String>,
    pub max_items: Option<String>,
    pub one_of: Option<String>,
}

impl FieldAttrs {
    /// Parses the attributes of one field. Returns `None` if the field has
    /// no `#[param]` attribute.
    pub fn from_field(field: &Field) -> syn::Result<Option<Self>> {
        let mut found = false;
        let mut out = Self::default();

        for attr in field.attrs.iter().filter(|a| a.path().is_ident("param")) {
            found = true;
            attr.parse_nested_meta(|meta| out.apply(&meta))?;
        }
        if !found {
            return Ok(None);
        }

        if out.flatten && (out.skip || out.has_values()) {
            return Err(syn::Error::new(
                field.span(),
                "`flatten` cannot be combined with other param attributes",
            ));
        }
        if out.skip && out.has_values() {
            return Err(syn::Error::new(
                field.span(),
                "`skip` cannot be combined with other param attributes",
            ));
        }
        Ok(Some(out))
    }

    fn apply(&mut self, meta: &ParseNestedMeta<'_>) -> syn::Result<()> {
        let key = meta
            .path
            .get_ident()
            .map(ToString::to_string)
            .ok_or_else(|| meta.error("expected identifier"))?;

        match key.as_str() {
            "skip" => self.skip = true,
            "flatten" => self.flatten = true,
            "from" => self.from = Some(literal(meta)?),
            "name" => self.name = Some(literal(meta)?),
            "rules" => self.rules = Some(literal(meta)?),
            "default" => self.default = Some(literal(meta)?),
            "max_len" => self.max_len = Some(literal(meta)?),
            "min" => self.min = Some(literal(meta)?),
            "max" => self.max = Some(literal(meta)?),
            "min_items" => self.min_items = Some(literal(meta)?),
            "max_items" => self.max_items = Some(literal(meta)?),
            "one_of" => self.one_of = Some(literal(meta)?),
            other => return Err(meta.error(format!("unknown param attribute: {other}"))),
        }
        Ok(())
    }

    fn has_values(&self) -> bool {
        [
            &self.from,
            &self.name,
            &self.rules,
            &self.default,
            &self.max_len,
            &self.min,
            &self.max,
            &self.min_items,
            &self.max_items,
            &self.one_of,
        ]
        .iter()
        .any(|v| v.is_some())
    }
}

/// Reads `= "text"` or `= 42`. Integers are passed on as their digits so
/// that bounds are still parsed, and rejected, by the schema compiler.
fn literal(meta: &ParseNestedMeta<'_>) -> syn::Result<String> {
    let lit: Lit = meta.value()?.parse()?;
    match lit {
        Lit::Str(s) => Ok(s.value()),
        Lit::Int(i) => Ok(i.base10_digits().to_string()),
        other => Err(syn::Error::new(
            other.span(),
            "expected a string or integer literal",
        )),
    }
}
