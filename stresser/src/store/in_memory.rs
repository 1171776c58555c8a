//! In-memory store for dry runs and tests.
//!
//! The store is [`Clone`] so callers can hold a handle for inspection while the run owns another.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures_util::StreamExt;

use super::{ObjectStore, PayloadStream, StoreError, StoreResult};

type Objects = HashMap<String, Bytes>;

/// A [`HashMap`] backed object store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    objects: Arc<Mutex<Objects>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `objects`.
    pub fn with_objects<K, V>(objects: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Bytes>,
    {
        let objects = objects
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self {
            objects: Arc::new(Mutex::new(objects)),
        }
    }

    /// Stores `contents` at `key`, replacing any previous object.
    pub fn insert(&self, key: impl Into<String>, contents: impl Into<Bytes>) {
        self.lock().insert(key.into(), contents.into());
    }

    /// Returns a clone of the stored contents, if present.
    pub fn get_stored(&self, key: &str) -> Option<Bytes> {
        self.lock().get(key).cloned()
    }

    /// Returns the number of stored objects.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Objects> {
        // Nothing panics while holding the lock, so poisoning carries no broken invariant.
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl ObjectStore for InMemoryStore {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn get_object(&self, key: &str) -> StoreResult<PayloadStream> {
        let bytes = self
            .get_stored(key)
            .ok_or_else(|| StoreError::NotFound(key.to_owned()))?;
        Ok(futures_util::stream::once(async move { Ok(bytes) }).boxed())
    }

    async fn put_object(&self, key: &str, payload: Bytes) -> StoreResult<()> {
        self.insert(key, payload);
        Ok(())
    }
}
