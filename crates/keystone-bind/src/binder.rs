//! The parameter binder.
//!
//! Walks a schema in declaration order. For each field it resolves the raw
//! input from the field's bucket, validates it ([`crate::rules`]) and hands
//! it to the field's writer for coercion ([`crate::value`]). Embedded
//! structs are bound depth-first where they appear. Binding stops at the
//! first failing field.

use crate::bucket::{Bucket, Buckets};
use crate::file::FileSource;
use crate::rules::{validate_list, validate_scalar};
use crate::schema::{Entry, FieldEntry, Input, Params, Schema, Shape};
use crate::spec::{FieldSpec, Rule};
use keystone_core::{AppError, AppResult, Reason};

/// Binds a fresh `T` from the request buckets.
///
/// The caller sees either a fully bound value or the first error.
///
/// # Example
///
/// ```
/// use keystone_bind::{bind, Bucket, Buckets, Pagination};
///
/// let buckets = Buckets::standard().with("query", Bucket::from_pairs([("page", "24")]));
/// let page: Pagination = bind(&buckets, None).unwrap();
/// assert_eq!(page.page, 24);
/// assert_eq!(page.per_page, 20);
/// ```
pub fn bind<T: Params>(buckets: &Buckets, files: Option<&dyn FileSource>) -> AppResult<T> {
    let mut target = T::default();
    bind_into(&mut target, buckets, files)?;
    Ok(target)
}

/// Binds into an existing value.
///
/// On error `target` may be partially written and should be discarded.
pub fn bind_into<T: Params>(
    target: &mut T,
    buckets: &Buckets,
    files: Option<&dyn FileSource>,
) -> AppResult<()> {
    let schema = Schema::<T>::of()?;
    for entry in &schema.entries {
        match entry {
            Entry::Field(field) => bind_field(target, field, buckets, files)?,
            Entry::Embed(embed) => (embed.bind)(target, buckets, files)?,
        }
    }

    if let Some(validatable) = target.as_self_validate() {
        validatable.validate()?;
    }
    Ok(())
}

fn bind_field<T>(
    target: &mut T,
    field: &FieldEntry<T>,
    buckets: &Buckets,
    files: Option<&dyn FileSource>,
) -> AppResult<()> {
    let spec = &field.spec;
    if spec.ignore {
        return Ok(());
    }

    let input = match field.shape {
        Shape::File => Input::File(resolve_file(spec, files)?),
        Shape::Scalar => {
            let (value, present) = resolve_scalar(spec, bucket_for(spec, buckets)?);
            validate_scalar(spec, &value, present)?;
            Input::Scalar { value, present }
        }
        Shape::List => {
            let values = resolve_list(spec, bucket_for(spec, buckets)?);
            validate_list(spec, &values)?;
            Input::List(values)
        }
    };
    (field.write)(target, spec, input)
}

fn bucket_for<'b>(spec: &FieldSpec, buckets: &'b Buckets) -> AppResult<&'b Bucket> {
    buckets.get(spec.source.bucket_name()).ok_or_else(|| {
        AppError::internal(format!(
            "field `{}` reads from unknown source bucket `{}`",
            spec.name, spec.source
        ))
    })
}

/// Returns the effective value (after default and trim) and whether the key
/// was supplied.
fn resolve_scalar(spec: &FieldSpec, bucket: &Bucket) -> (String, bool) {
    let raw = bucket.first(&spec.name);
    let present = raw.is_some();
    let mut value = raw.unwrap_or_default();
    if value.is_empty() {
        value = spec.default_value.as_str();
    }
    if spec.trim {
        value = value.trim();
    }
    (value.to_string(), present)
}

fn resolve_list(spec: &FieldSpec, bucket: &Bucket) -> Vec<String> {
    let mut values: Vec<&str> = bucket.all(&spec.name);
    if values.is_empty() && !spec.default_value.is_empty() {
        values.push(spec.default_value.as_str());
    }
    values
        .into_iter()
        .map(|v| if spec.trim { v.trim() } else { v })
        .map(String::from)
        .collect()
}

fn resolve_file(
    spec: &FieldSpec,
    files: Option<&dyn FileSource>,
) -> AppResult<Option<crate::file::UploadedFile>> {
    let files = files.ok_or_else(|| {
        AppError::internal(format!(
            "field `{}` expects a file but no file source is available",
            spec.name
        ))
    })?;

    let Some(mut file) = files.file(&spec.name) else {
        if spec.required {
            return Err(AppError::validation(&spec.name, Reason::Required));
        }
        return Ok(None);
    };

    file.sniff()?;
    if spec.has(Rule::Image) {
        file.validate_image(&spec.name)?;
    }
    Ok(Some(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{FileMap, UploadedFile};
    use crate::schema::{SchemaBuilder, SelfValidate};
    use crate::spec::FieldAnnotation;
    use keystone_core::ErrorKind;
    use proptest::prelude::*;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Search {
        q: String,
        limit: Option<u32>,
        exact: bool,
        tags: Vec<String>,
    }

    fn q(p: &mut Search) -> &mut String {
        &mut p.q
    }
    fn limit(p: &mut Search) -> &mut Option<u32> {
        &mut p.limit
    }
    fn exact(p: &mut Search) -> &mut bool {
        &mut p.exact
    }
    fn tags(p: &mut Search) -> &mut Vec<String> {
        &mut p.tags
    }

    impl Params for Search {
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema
                .field(FieldAnnotation::new("query", "q").rules("required,trim"), q)
                .optional(FieldAnnotation::new("query", "limit").max("50"), limit)
                .field(FieldAnnotation::new("query", "exact"), exact)
                .list(FieldAnnotation::new("query", "tag").rules("trim,no_empty_items"), tags);
        }
    }

    #[derive(Debug, Default)]
    struct Range {
        from: i64,
        to: i64,
    }

    fn from(p: &mut Range) -> &mut i64 {
        &mut p.from
    }
    fn to(p: &mut Range) -> &mut i64 {
        &mut p.to
    }

    impl Params for Range {
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema
                .field(FieldAnnotation::new("query", "from"), from)
                .field(FieldAnnotation::new("query", "to"), to);
        }

        fn as_self_validate(&self) -> Option<&dyn SelfValidate> {
            Some(self)
        }
    }

    impl SelfValidate for Range {
        fn validate(&self) -> AppResult<()> {
            if self.to < self.from {
                return Err(AppError::invalid_argument("to", "to must not be before from"));
            }
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct Note {
        title: String,
        bio: String,
    }

    fn title(p: &mut Note) -> &mut String {
        &mut p.title
    }
    fn bio(p: &mut Note) -> &mut String {
        &mut p.bio
    }

    impl Params for Note {
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema
                .field(FieldAnnotation::new("query", "title").rules("trim"), title)
                .field(FieldAnnotation::new("query", "bio").rules("trim,noempty"), bio);
        }
    }

    #[derive(Debug, Default)]
    struct Upload {
        avatar: Option<UploadedFile>,
    }

    fn avatar(p: &mut Upload) -> &mut Option<UploadedFile> {
        &mut p.avatar
    }

    impl Params for Upload {
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema.file(FieldAnnotation::new("file", "avatar").rules("required,image"), avatar);
        }
    }

    #[derive(Debug, Default)]
    struct FromHeader {
        token: String,
    }

    fn token(p: &mut FromHeader) -> &mut String {
        &mut p.token
    }

    impl Params for FromHeader {
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema.field(FieldAnnotation::new("header", "token"), token);
        }
    }

    fn query(pairs: &[(&str, &str)]) -> Buckets {
        Buckets::standard().with("query", Bucket::from_pairs(pairs.iter().copied()))
    }

    #[test]
    fn test_bind_all_shapes() {
        let buckets = query(&[
            ("q", "  rust  "),
            ("limit", "10"),
            ("exact", "true"),
            ("tag", " a "),
            ("tag", "b"),
        ]);
        let search: Search = bind(&buckets, None).unwrap();
        assert_eq!(search.q, "rust");
        assert_eq!(search.limit, Some(10));
        assert!(search.exact);
        assert_eq!(search.tags, vec!["a", "b"]);
    }

    #[test]
    fn test_optional_left_unset_when_absent() {
        let search: Search = bind(&query(&[("q", "x")]), None).unwrap();
        assert_eq!(search.limit, None);
        assert!(!search.exact);
        assert!(search.tags.is_empty());
    }

    #[test]
    fn test_fail_fast_reports_first_field() {
        let buckets = query(&[("limit", "500"), ("exact", "maybe")]);
        let err = bind::<Search>(&buckets, None).unwrap_err();
        assert_eq!(err.field(), Some("q"));
        assert_eq!(err.reason(), Some(Reason::Required));

        let buckets = query(&[("q", "x"), ("limit", "500"), ("exact", "maybe")]);
        let err = bind::<Search>(&buckets, None).unwrap_err();
        assert_eq!(err.field(), Some("limit"));
        assert_eq!(err.reason(), Some(Reason::OutOfRange));
    }

    #[test]
    fn test_whitespace_only_is_empty_after_trim() {
        let err = bind::<Search>(&query(&[("q", "   ")]), None).unwrap_err();
        assert_eq!(err.reason(), Some(Reason::Required));
    }

    #[test]
    fn test_optional_trimmed_whitespace_binds_empty() {
        let note: Note = bind(&query(&[("title", "   ")]), None).unwrap();
        assert_eq!(note.title, "");
        assert_eq!(note.bio, "");

        let note: Note = bind(&query(&[("title", "  draft ")]), None).unwrap();
        assert_eq!(note.title, "draft");
    }

    #[test]
    fn test_noempty_checks_trimmed_value() {
        let err = bind::<Note>(&query(&[("bio", "   ")]), None).unwrap_err();
        assert_eq!(err.field(), Some("bio"));
        assert_eq!(err.reason(), Some(Reason::Empty));

        let note: Note = bind(&query(&[("bio", " hi ")]), None).unwrap();
        assert_eq!(note.bio, "hi");
    }

    #[test]
    fn test_coercion_error() {
        let err = bind::<Search>(&query(&[("q", "x"), ("exact", "maybe")]), None).unwrap_err();
        assert_eq!(err.field(), Some("exact"));
        assert_eq!(err.reason(), Some(Reason::InvalidBoolean));
    }

    #[test]
    fn test_self_validate_runs_after_fields() {
        let ok: Range = bind(&query(&[("from", "1"), ("to", "5")]), None).unwrap();
        assert_eq!(ok.to, 5);

        let err = bind::<Range>(&query(&[("from", "5"), ("to", "1")]), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.field(), Some("to"));

        let err = bind::<Range>(&query(&[("from", "x")]), None).unwrap_err();
        assert_eq!(err.reason(), Some(Reason::InvalidInteger));
    }

    #[test]
    fn test_missing_bucket_is_server_error() {
        let err = bind::<FromHeader>(&Buckets::standard(), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_required_file() {
        let files = FileMap::new();
        let err = bind::<Upload>(&Buckets::standard(), Some(&files)).unwrap_err();
        assert_eq!(err.field(), Some("avatar"));
        assert_eq!(err.reason(), Some(Reason::Required));

        let err = bind::<Upload>(&Buckets::standard(), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_image_file_validation() {
        let mut files = FileMap::new();
        files.insert(UploadedFile::new("avatar", "plain text, not pixels"));
        let err = bind::<Upload>(&Buckets::standard(), Some(&files)).unwrap_err();
        assert_eq!(err.reason(), Some(Reason::InvalidImage));

        let img = image::RgbImage::from_pixel(1, 1, image::Rgb([0, 0, 0]));
        let mut png = std::io::Cursor::new(Vec::new());
        img.write_to(&mut png, image::ImageFormat::Png).unwrap();

        let mut files = FileMap::new();
        files.insert(UploadedFile::new("avatar", png.into_inner()).with_file_name("me.png"));
        let upload: Upload = bind(&Buckets::standard(), Some(&files)).unwrap();
        let file = upload.avatar.unwrap();
        assert_eq!(file.content_type(), Some("image/png"));
        assert_eq!(file.file_name(), Some("me.png"));
    }

    proptest! {
        #[test]
        fn prop_required_accepts_any_non_blank(value in "[a-zA-Z0-9 ]{0,16}") {
            let result = bind::<Search>(&query(&[("q", value.as_str())]), None);
            if value.trim().is_empty() {
                let err = result.unwrap_err();
                prop_assert_eq!(err.field(), Some("q"));
            } else {
                prop_assert_eq!(result.unwrap().q, value.trim().to_string());
            }
        }

        #[test]
        fn prop_binding_is_idempotent(
            q in "[a-z]{1,8}",
            limit in 0u32..=50,
            tags in proptest::collection::vec("[a-z]{1,4}", 0..4),
        ) {
            let limit = limit.to_string();
            let mut pairs = vec![("q", q.as_str()), ("limit", limit.as_str())];
            pairs.extend(tags.iter().map(|t| ("tag", t.as_str())));
            let buckets = query(&pairs);

            let first: Search = bind(&buckets, None).unwrap();
            let second: Search = bind(&buckets, None).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
