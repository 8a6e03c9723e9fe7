//! Building buckets from an HTTP request.
//!
//! [`RequestBuckets::from_request`] fills the `url`, `query` and `form`
//! buckets and the file lookup once per request:
//!
//! - `url` comes from the router's path parameters
//! - `query` is the decoded query string, repeated keys kept in order
//! - `form` depends on the body's content type: JSON objects are flattened
//!   one level, urlencoded bodies decode like the query string and
//!   multipart text parts are added as-is
//! - multipart parts that carry a filename go to the file lookup

use crate::bucket::{Bucket, Buckets};
use crate::file::{
    FileMap, FileSource, ImageLimits, UploadedFile, DEFAULT_MAX_IMAGE_ALLOC,
    DEFAULT_MAX_IMAGE_DIMENSION,
};
use bytes::Bytes;
use http::{header, request::Parts, HeaderMap};
use keystone_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::io;

/// Default maximum size per multipart part (10 MB).
pub const DEFAULT_MAX_FIELD_SIZE: usize = 10 * 1024 * 1024;

/// Default maximum number of multipart parts.
pub const DEFAULT_MAX_FIELDS: usize = 100;

/// Limits applied while parsing multipart bodies and decoding the images
/// they carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MultipartConfig {
    /// Maximum size per part in bytes, enforced while the part streams in.
    pub max_field_size: usize,
    /// Maximum number of parts.
    pub max_fields: usize,
    /// Maximum width and height of an uploaded image in pixels.
    pub max_image_dimension: u32,
    /// Maximum bytes an image decoder may allocate.
    pub max_image_alloc: u64,
}

impl MultipartConfig {
    /// Image decoding bounds for files parsed under this configuration.
    #[must_use]
    pub const fn image_limits(&self) -> ImageLimits {
        ImageLimits {
            max_dimension: self.max_image_dimension,
            max_alloc: self.max_image_alloc,
        }
    }
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            max_field_size: DEFAULT_MAX_FIELD_SIZE,
            max_fields: DEFAULT_MAX_FIELDS,
            max_image_dimension: DEFAULT_MAX_IMAGE_DIMENSION,
            max_image_alloc: DEFAULT_MAX_IMAGE_ALLOC,
        }
    }
}

/// The buckets and files of one request.
#[derive(Debug, Clone, Default)]
pub struct RequestBuckets {
    /// String buckets keyed by source name.
    pub buckets: Buckets,
    /// Uploaded files.
    pub files: FileMap,
}

impl RequestBuckets {
    /// Creates empty `url`, `query` and `form` buckets and no files.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            buckets: Buckets::standard(),
            files: FileMap::new(),
        }
    }

    /// Returns the file lookup.
    #[must_use]
    pub fn file_source(&self) -> &dyn FileSource {
        &self.files
    }

    /// Fills only the `url` bucket, leaving the query string and body
    /// untouched.
    #[must_use]
    pub fn from_path<I, K, V>(path_params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut out = Self::empty();
        out.buckets
            .insert(Buckets::URL, Bucket::from_pairs(path_params));
        out
    }

    /// Parses the buckets of a request.
    ///
    /// Malformed bodies are rejected with `InvalidArgument`.
    pub async fn from_request<I, K, V>(
        parts: &Parts,
        body: Bytes,
        path_params: I,
        config: &MultipartConfig,
    ) -> AppResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut out = Self::from_path(path_params);
        if let Some(query) = parts.uri.query() {
            out.buckets.insert(Buckets::QUERY, parse_urlencoded(query.as_bytes())?);
        }

        if body.is_empty() {
            return Ok(out);
        }

        match body_kind(&parts.headers) {
            BodyKind::Json => {
                out.buckets.insert(Buckets::FORM, parse_json(&body)?);
            }
            BodyKind::UrlEncoded => {
                out.buckets.insert(Buckets::FORM, parse_urlencoded(&body)?);
            }
            BodyKind::Multipart(boundary) => {
                let (form, files) = parse_multipart(body, boundary, config).await?;
                out.buckets.insert(Buckets::FORM, form);
                out.files = files;
            }
            BodyKind::Other => {
                tracing::debug!("request body has no bindable content type, form bucket left empty");
            }
        }
        Ok(out)
    }
}

enum BodyKind {
    Json,
    UrlEncoded,
    Multipart(String),
    Other,
}

fn body_kind(headers: &HeaderMap) -> BodyKind {
    let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    else {
        return BodyKind::Other;
    };
    let Ok(mime) = content_type.parse::<mime::Mime>() else {
        return BodyKind::Other;
    };

    if mime.subtype() == mime::JSON || mime.suffix() == Some(mime::JSON) {
        BodyKind::Json
    } else if mime.type_() == mime::APPLICATION && mime.subtype() == mime::WWW_FORM_URLENCODED {
        BodyKind::UrlEncoded
    } else if mime.type_() == mime::MULTIPART && mime.subtype() == mime::FORM_DATA {
        match multer::parse_boundary(content_type) {
            Ok(boundary) => BodyKind::Multipart(boundary),
            Err(_) => BodyKind::Other,
        }
    } else {
        BodyKind::Other
    }
}

fn malformed(what: &str, err: impl std::fmt::Display) -> AppError {
    AppError::new(
        keystone_core::ErrorKind::InvalidArgument,
        format!("malformed {what}: {err}"),
    )
}

fn parse_urlencoded(input: &[u8]) -> AppResult<Bucket> {
    let pairs: Vec<(String, String)> =
        serde_urlencoded::from_bytes(input).map_err(|e| malformed("urlencoded data", e))?;
    Ok(Bucket::from_pairs(pairs))
}

/// Flattens the top level of a JSON object into a bucket.
///
/// Strings are kept verbatim, numbers and booleans rendered, arrays become
/// repeated values, `null` is treated as absent and nested objects are kept
/// as JSON text.
fn parse_json(body: &[u8]) -> AppResult<Bucket> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| malformed("JSON body", e))?;
    let serde_json::Value::Object(map) = value else {
        return Err(malformed("JSON body", "expected an object"));
    };

    let mut bucket = Bucket::new();
    for (key, value) in map {
        match value {
            serde_json::Value::Array(items) => {
                for item in items {
                    if let Some(text) = render_json(item) {
                        bucket.push(key.clone(), text);
                    }
                }
            }
            other => {
                if let Some(text) = render_json(other) {
                    bucket.push(key, text);
                }
            }
        }
    }
    Ok(bucket)
}

fn render_json(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        nested => Some(nested.to_string()),
    }
}

async fn parse_multipart(
    body: Bytes,
    boundary: String,
    config: &MultipartConfig,
) -> AppResult<(Bucket, FileMap)> {
    let stream = futures_util::stream::once(async move { Ok::<_, io::Error>(body) });
    let per_field = u64::try_from(config.max_field_size).unwrap_or(u64::MAX);
    let constraints =
        multer::Constraints::new().size_limit(multer::SizeLimit::new().per_field(per_field));
    let mut multipart = multer::Multipart::with_constraints(stream, boundary, constraints);

    let mut form = Bucket::new();
    let mut files = FileMap::new();
    let mut count = 0usize;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| malformed("multipart body", e))?
    {
        count += 1;
        if count > config.max_fields {
            return Err(malformed(
                "multipart body",
                format!("too many parts (max {})", config.max_fields),
            ));
        }

        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(String::from);
        let declared = field.content_type().map(ToString::to_string);
        let data = field.bytes().await.map_err(|e| match e {
            multer::Error::FieldSizeExceeded { .. } => AppError::invalid_argument(
                name.as_str(),
                format!("part exceeds the limit of {} bytes", config.max_field_size),
            ),
            other => malformed("multipart body", other),
        })?;

        match file_name {
            Some(file_name) => {
                let mut file = UploadedFile::new(name, data)
                    .with_file_name(file_name)
                    .with_image_limits(config.image_limits());
                if let Some(declared) = declared {
                    file = file.with_declared_type(declared);
                }
                files.insert(file);
            }
            None => {
                let text = String::from_utf8(data.to_vec())
                    .map_err(|e| malformed("multipart text part", e))?;
                form.push(name, text);
            }
        }
    }
    Ok((form, files))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;
    use keystone_core::ErrorKind;

    fn parts(uri: &str, content_type: Option<&str>) -> Parts {
        let mut builder = Request::builder().method("POST").uri(uri);
        if let Some(ct) = content_type {
            builder = builder.header(header::CONTENT_TYPE, ct);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn no_path() -> Vec<(String, String)> {
        Vec::new()
    }

    fn create_multipart_body(boundary: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, filename, data) in parts {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            match filename {
                Some(fname) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{fname}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                ),
            }
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        body
    }

    #[tokio::test]
    async fn test_url_and_query() {
        let p = parts("/users/42?tag=a&tag=b&empty=", None);
        let rb = RequestBuckets::from_request(
            &p,
            Bytes::new(),
            [("id", "42")],
            &MultipartConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(rb.buckets.get("url").unwrap().first("id"), Some("42"));
        let query = rb.buckets.get("query").unwrap();
        assert_eq!(query.all("tag"), vec!["a", "b"]);
        assert!(query.contains("empty"));
        assert!(rb.buckets.get("form").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_json_flattening() {
        let p = parts("/", Some("application/json; charset=utf-8"));
        let body = Bytes::from_static(
            br#"{"name":"Ada","age":36,"admin":false,"tags":["x","y"],"gone":null,"meta":{"k":1}}"#,
        );
        let rb = RequestBuckets::from_request(&p, body, no_path(), &MultipartConfig::default())
            .await
            .unwrap();
        let form = rb.buckets.get("form").unwrap();
        assert_eq!(form.first("name"), Some("Ada"));
        assert_eq!(form.first("age"), Some("36"));
        assert_eq!(form.first("admin"), Some("false"));
        assert_eq!(form.all("tags"), vec!["x", "y"]);
        assert!(!form.contains("gone"));
        assert_eq!(form.first("meta"), Some(r#"{"k":1}"#));
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let p = parts("/", Some("application/json"));
        let err = RequestBuckets::from_request(
            &p,
            Bytes::from_static(b"{not json"),
            no_path(),
            &MultipartConfig::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.field().is_none());

        let err = RequestBuckets::from_request(
            &p,
            Bytes::from_static(b"[1,2]"),
            no_path(),
            &MultipartConfig::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_urlencoded_body() {
        let p = parts("/", Some("application/x-www-form-urlencoded"));
        let rb = RequestBuckets::from_request(
            &p,
            Bytes::from_static(b"email=ada%40example.com&name=Ada+Lovelace"),
            no_path(),
            &MultipartConfig::default(),
        )
        .await
        .unwrap();
        let form = rb.buckets.get("form").unwrap();
        assert_eq!(form.first("email"), Some("ada@example.com"));
        assert_eq!(form.first("name"), Some("Ada Lovelace"));
    }

    #[tokio::test]
    async fn test_multipart_text_and_files() {
        let boundary = "----keystone";
        let body = create_multipart_body(
            boundary,
            &[
                ("title", None, b"Holiday"),
                ("photo", Some("beach.jpg"), b"\xff\xd8\xff\xe0 pretend jpeg"),
            ],
        );
        let p = parts(
            "/",
            Some(&format!("multipart/form-data; boundary={boundary}")),
        );
        let rb = RequestBuckets::from_request(&p, Bytes::from(body), no_path(), &MultipartConfig::default())
            .await
            .unwrap();

        assert_eq!(rb.buckets.get("form").unwrap().first("title"), Some("Holiday"));
        let photo = rb.files.file("photo").unwrap();
        assert_eq!(photo.file_name(), Some("beach.jpg"));
        assert_eq!(photo.declared_type(), Some("application/octet-stream"));
    }

    #[tokio::test]
    async fn test_multipart_too_many_parts() {
        let boundary = "b";
        let body = create_multipart_body(boundary, &[("a", None, b"1"), ("b", None, b"2")]);
        let p = parts("/", Some("multipart/form-data; boundary=b"));
        let config = MultipartConfig {
            max_fields: 1,
            ..MultipartConfig::default()
        };
        let err = RequestBuckets::from_request(&p, Bytes::from(body), no_path(), &config)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_multipart_part_too_large() {
        let body = create_multipart_body("b", &[("bio", None, b"0123456789")]);
        let p = parts("/", Some("multipart/form-data; boundary=b"));
        let config = MultipartConfig {
            max_field_size: 4,
            ..MultipartConfig::default()
        };
        let err = RequestBuckets::from_request(&p, Bytes::from(body), no_path(), &config)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.field(), Some("bio"));
        assert_eq!(err.to_string(), "part exceeds the limit of 4 bytes");
    }

    #[tokio::test]
    async fn test_multipart_part_at_limit_and_oversized_file() {
        let body = create_multipart_body("b", &[("bio", None, b"0123")]);
        let p = parts("/", Some("multipart/form-data; boundary=b"));
        let config = MultipartConfig {
            max_field_size: 4,
            ..MultipartConfig::default()
        };
        let rb = RequestBuckets::from_request(&p, Bytes::from(body), no_path(), &config)
            .await
            .unwrap();
        assert_eq!(rb.buckets.get("form").unwrap().first("bio"), Some("0123"));

        let body = create_multipart_body("b", &[("doc", Some("a.bin"), &[0u8; 64][..])]);
        let err = RequestBuckets::from_request(&p, Bytes::from(body), no_path(), &config)
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("doc"));
    }

    #[tokio::test]
    async fn test_multipart_files_carry_image_limits() {
        let mut png = std::io::Cursor::new(Vec::new());
        image::RgbImage::from_pixel(4, 4, image::Rgb([0, 255, 0]))
            .write_to(&mut png, image::ImageFormat::Png)
            .unwrap();
        let png = png.into_inner();
        let body = create_multipart_body("b", &[("avatar", Some("a.png"), png.as_slice())]);
        let p = parts("/", Some("multipart/form-data; boundary=b"));

        let config = MultipartConfig {
            max_image_dimension: 2,
            ..MultipartConfig::default()
        };
        let rb = RequestBuckets::from_request(&p, Bytes::from(body.clone()), no_path(), &config)
            .await
            .unwrap();
        let mut avatar = rb.files.file("avatar").unwrap();
        assert!(avatar.validate_image("avatar").is_err());

        let rb = RequestBuckets::from_request(&p, Bytes::from(body), no_path(), &MultipartConfig::default())
            .await
            .unwrap();
        let mut avatar = rb.files.file("avatar").unwrap();
        assert!(avatar.validate_image("avatar").is_ok());
    }
}
