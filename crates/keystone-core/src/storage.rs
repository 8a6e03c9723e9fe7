//! Object storage boundary.
//!
//! Handlers persist uploaded files through a [`Storage`]. Object paths are
//! opaque keys such as `avatars/u1.png`. [`MemoryStorage`] keeps objects in
//! process for tests.

use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Metadata stored next to an object, e.g. `content-type`.
pub type Attributes = HashMap<String, String>;

/// Reads and writes objects in an external store.
///
/// A missing object is `NotFound` for [`read`](Storage::read),
/// [`attributes`](Storage::attributes) and
/// [`set_attributes`](Storage::set_attributes). [`delete`](Storage::delete)
/// of a missing object succeeds.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Returns the content of an object.
    async fn read(&self, path: &str) -> AppResult<Bytes>;

    /// Creates or replaces an object. Existing attributes are kept.
    async fn write(&self, path: &str, data: Bytes) -> AppResult<()>;

    /// Removes an object and its attributes.
    async fn delete(&self, path: &str) -> AppResult<()>;

    /// Public URL of an object. The object need not exist.
    fn url(&self, path: &str) -> String;

    /// Returns the attributes of an object.
    async fn attributes(&self, path: &str) -> AppResult<Attributes>;

    /// Merges `attributes` into those of an existing object.
    async fn set_attributes(&self, path: &str, attributes: Attributes) -> AppResult<()>;

    /// Returns `true` if the object exists.
    async fn exists(&self, path: &str) -> AppResult<bool>;
}

#[derive(Debug, Clone, Default)]
struct Object {
    data: Bytes,
    attributes: Attributes,
}

/// A [`Storage`] backed by an in-memory map.
///
/// # Example
///
/// ```
/// use keystone_core::{MemoryStorage, Storage};
///
/// let storage = MemoryStorage::new("https://cdn.example.com/");
/// assert_eq!(storage.url("/avatars/u1.png"), "https://cdn.example.com/avatars/u1.png");
/// ```
#[derive(Debug, Default)]
pub struct MemoryStorage {
    base_url: String,
    objects: RwLock<HashMap<String, Object>>,
}

impl MemoryStorage {
    /// Creates an empty store whose URLs start with `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

fn missing(path: &str) -> AppError {
    AppError::not_found(format!("object {path} not found"))
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn read(&self, path: &str) -> AppResult<Bytes> {
        self.objects
            .read()
            .get(path)
            .map(|object| object.data.clone())
            .ok_or_else(|| missing(path))
    }

    async fn write(&self, path: &str, data: Bytes) -> AppResult<()> {
        self.objects
            .write()
            .entry(path.to_string())
            .or_default()
            .data = data;
        Ok(())
    }

    async fn delete(&self, path: &str) -> AppResult<()> {
        self.objects.write().remove(path);
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn attributes(&self, path: &str) -> AppResult<Attributes> {
        self.objects
            .read()
            .get(path)
            .map(|object| object.attributes.clone())
            .ok_or_else(|| missing(path))
    }

    async fn set_attributes(&self, path: &str, attributes: Attributes) -> AppResult<()> {
        let mut objects = self.objects.write();
        let object = objects.get_mut(path).ok_or_else(|| missing(path))?;
        object.attributes.extend(attributes);
        Ok(())
    }

    async fn exists(&self, path: &str) -> AppResult<bool> {
        Ok(self.objects.read().contains_key(path))
    }
}
