//! Durable object store access for exported result sets.
//!
//! The execution service writes each successful result set to an object;
//! this module resolves `s3://bucket/key` locations and streams those
//! objects back unmodified.

mod mock;
mod s3;

pub use mock::MockObjectStore;
pub use s3::S3ObjectStore;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::fmt;
use thiserror::Error;

/// A stream of object bytes, chunk by chunk.
pub type ObjectStream = BoxStream<'static, Result<Bytes, ObjectStoreError>>;

/// Failure reading from the object store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObjectStoreError {
    #[error("invalid object location: {0}")]
    InvalidLocation(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("object store unavailable: {0}")]
    Unavailable(String),

    #[error("failed to read object body: {0}")]
    Read(String),
}

/// A bucket/key pair addressing one object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct S3Location {
    pub bucket: String,
    pub key: String,
}

impl S3Location {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parses an `s3://bucket/key` URL. Both bucket and key must be non-empty.
    pub fn parse(url: &str) -> Result<Self, ObjectStoreError> {
        let stripped = url
            .strip_prefix("s3://")
            .ok_or_else(|| ObjectStoreError::InvalidLocation(format!("not an s3:// URL: {url}")))?;

        match stripped.split_once('/') {
            Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
                Ok(Self::new(bucket, key))
            }
            _ => Err(ObjectStoreError::InvalidLocation(format!(
                "expected s3://bucket/key, got {url}"
            ))),
        }
    }
}

impl fmt::Display for S3Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Trait defining read access to the durable object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Opens the object at `location` as a byte stream.
    ///
    /// Fails up front if the object cannot be opened; later chunk errors are
    /// reported through the stream.
    async fn get_object(&self, location: &S3Location) -> Result<ObjectStream, ObjectStoreError>;
}
