//! In-memory object store for testing.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{ObjectStore, ObjectStoreError, ObjectStream, S3Location};

const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// An object store that serves objects from memory in fixed-size chunks.
#[derive(Debug)]
pub struct MockObjectStore {
    objects: Mutex<HashMap<S3Location, Bytes>>,
    chunk_size: usize,
    get_calls: AtomicUsize,
}

impl MockObjectStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            chunk_size: DEFAULT_CHUNK_SIZE,
            get_calls: AtomicUsize::new(0),
        }
    }

    /// Sets the size of the chunks objects are streamed in.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Stores an object.
    pub fn put(&self, location: S3Location, body: impl Into<Bytes>) {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(location, body.into());
    }

    /// Number of `get_object` calls made so far.
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn get_object(&self, location: &S3Location) -> Result<ObjectStream, ObjectStoreError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let body = self
            .objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(location)
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound(location.to_string()))?;

        let chunk_size = self.chunk_size;
        let chunks: Vec<Result<Bytes, ObjectStoreError>> = (0..body.len())
            .step_by(chunk_size)
            .map(|start| Ok(body.slice(start..(start + chunk_size).min(body.len()))))
            .collect();

        Ok(stream::iter(chunks).boxed())
    }
}
