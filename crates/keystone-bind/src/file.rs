//! Uploaded files and content inspection.
//!
//! Files are looked up through a [`FileSource`] rather than a string bucket.
//! Inspection never moves the stream: [`sniff_content_type`] reads at most
//! [`SNIFF_LEN`] bytes and [`validate_image`] decodes the whole stream, and
//! both seek back to where the reader was before returning.
//!
//! Decoding is bounded by [`ImageLimits`]; an image over the limits is
//! rejected before its pixels are allocated.

use bytes::Bytes;
use image::ImageReader;
use keystone_core::{AppError, Reason};
use std::collections::HashMap;
use std::io::{self, BufRead, Cursor, Read, Seek, SeekFrom};

/// Number of leading bytes inspected when sniffing content types.
pub const SNIFF_LEN: usize = 512;

/// Default maximum image width and height in pixels.
pub const DEFAULT_MAX_IMAGE_DIMENSION: u32 = 8192;

/// Default maximum decoder allocation (64 MB).
pub const DEFAULT_MAX_IMAGE_ALLOC: u64 = 64 * 1024 * 1024;

/// Bounds applied when decoding an uploaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLimits {
    /// Maximum width and height in pixels.
    pub max_dimension: u32,
    /// Maximum number of bytes the decoder may allocate.
    pub max_alloc: u64,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_IMAGE_DIMENSION,
            max_alloc: DEFAULT_MAX_IMAGE_ALLOC,
        }
    }
}

impl ImageLimits {
    fn to_decoder_limits(self) -> image::Limits {
        let mut limits = image::Limits::default();
        limits.max_image_width = Some(self.max_dimension);
        limits.max_image_height = Some(self.max_dimension);
        limits.max_alloc = Some(self.max_alloc);
        limits
    }
}

/// A file received in a multipart request.
///
/// The content is held in memory behind a seekable cursor.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    field_name: String,
    file_name: Option<String>,
    declared_type: Option<String>,
    detected_type: Option<String>,
    image_limits: ImageLimits,
    content: Cursor<Bytes>,
}

impl UploadedFile {
    /// Creates an uploaded file.
    #[must_use]
    pub fn new(field_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            field_name: field_name.into(),
            file_name: None,
            declared_type: None,
            detected_type: None,
            image_limits: ImageLimits::default(),
            content: Cursor::new(data.into()),
        }
    }

    /// Sets the client-supplied file name.
    #[must_use]
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// Sets the client-declared content type.
    #[must_use]
    pub fn with_declared_type(mut self, content_type: impl Into<String>) -> Self {
        self.declared_type = Some(content_type.into());
        self
    }

    /// Sets the bounds used by [`validate_image`](Self::validate_image).
    #[must_use]
    pub fn with_image_limits(mut self, limits: ImageLimits) -> Self {
        self.image_limits = limits;
        self
    }

    /// Form field the file was sent under.
    #[must_use]
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// Client-supplied file name.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// Content type declared by the client. Not trustworthy.
    #[must_use]
    pub fn declared_type(&self) -> Option<&str> {
        self.declared_type.as_deref()
    }

    /// Content type detected from the leading bytes, set during binding.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.detected_type.as_deref()
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.content.get_ref().len()
    }

    /// Returns `true` for zero-length files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.get_ref().is_empty()
    }

    /// The whole content, independent of the read position.
    #[must_use]
    pub fn bytes(&self) -> &Bytes {
        self.content.get_ref()
    }

    /// Detects and records the content type.
    pub fn sniff(&mut self) -> io::Result<&str> {
        let detected = sniff_content_type(&mut self.content)?;
        let detected = self.detected_type.insert(detected);
        Ok(detected.as_str())
    }

    /// Checks that the content decodes as an image within the file's
    /// [`ImageLimits`].
    pub fn validate_image(&mut self, field: &str) -> Result<(), AppError> {
        validate_image(&mut self.content, field, self.image_limits)
    }
}

impl Read for UploadedFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.content.read(buf)
    }
}

impl Seek for UploadedFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.content.seek(pos)
    }
}

/// Lookup of uploaded files by field name.
pub trait FileSource: Send + Sync {
    /// Returns the file sent under `name`, if any.
    fn file(&self, name: &str) -> Option<UploadedFile>;
}

/// A [`FileSource`] backed by a map.
#[derive(Debug, Clone, Default)]
pub struct FileMap {
    files: HashMap<String, UploadedFile>,
}

impl FileMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file under its field name. The first file per name wins.
    pub fn insert(&mut self, file: UploadedFile) {
        self.files
            .entry(file.field_name().to_string())
            .or_insert(file);
    }

    /// Number of files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` if no files were uploaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FileSource for FileMap {
    fn file(&self, name: &str) -> Option<UploadedFile> {
        self.files.get(name).cloned()
    }
}

/// Detects a content type from at most [`SNIFF_LEN`] leading bytes.
///
/// The reader is returned to its original position.
///
/// # Example
///
/// ```
/// use keystone_bind::file::sniff_content_type;
/// use std::io::{Cursor, Seek};
///
/// let mut cursor = Cursor::new(b"%PDF-1.7 ...".to_vec());
/// assert_eq!(sniff_content_type(&mut cursor).unwrap(), "application/pdf");
/// assert_eq!(cursor.stream_position().unwrap(), 0);
/// ```
pub fn sniff_content_type<R: Read + Seek>(reader: &mut R) -> io::Result<String> {
    let start = reader.stream_position()?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    let read = reader.by_ref().take(SNIFF_LEN as u64).read_to_end(&mut head);
    reader.seek(SeekFrom::Start(start))?;
    read?;
    Ok(detect(&head).to_string())
}

fn detect(head: &[u8]) -> &'static str {
    if let Ok(format) = image::guess_format(head) {
        return format.to_mime_type();
    }
    if head.starts_with(b"%PDF-") {
        return "application/pdf";
    }
    if head.starts_with(b"PK\x03\x04") {
        return "application/zip";
    }
    if head.is_empty() {
        return "text/plain; charset=utf-8";
    }
    match std::str::from_utf8(head) {
        Ok(_) => "text/plain; charset=utf-8",
        // The cut at SNIFF_LEN may split a multi-byte character.
        Err(e) if e.error_len().is_none() => "text/plain; charset=utf-8",
        Err(_) => "application/octet-stream",
    }
}

/// Decodes the whole stream as an image, reporting
/// [`Reason::InvalidImage`] on `field` if that fails or the image exceeds
/// `limits`.
///
/// The reader is returned to its original position either way.
pub fn validate_image<R: BufRead + Seek>(
    reader: &mut R,
    field: &str,
    limits: ImageLimits,
) -> Result<(), AppError> {
    let start = reader.stream_position()?;
    let decoded = ImageReader::new(&mut *reader)
        .with_guessed_format()
        .map_err(image::ImageError::IoError)
        .and_then(|mut image| {
            image.limits(limits.to_decoder_limits());
            image.decode()
        });
    reader.seek(SeekFrom::Start(start))?;

    match decoded {
        Ok(_) => Ok(()),
        Err(err) => {
            tracing::debug!(field, error = %err, "uploaded file is not a decodable image");
            Err(AppError::validation(field, Reason::InvalidImage))
        }
    }
}
