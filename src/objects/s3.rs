//! S3 object store backend.
//!
//! Streams result objects written by Athena using `aws-sdk-s3`.

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::Client;
use futures::stream;
use futures::StreamExt;
use tracing::debug;

use super::{ObjectStore, ObjectStoreError, ObjectStream, S3Location};

/// S3-backed object store.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Wraps an existing SDK client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a store from a loaded AWS configuration.
    pub fn from_sdk_config(config: &aws_config::SdkConfig) -> Self {
        Self::new(Client::new(config))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get_object(&self, location: &S3Location) -> Result<ObjectStream, ObjectStoreError> {
        let output = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|err| {
                let message = format!("{location}: {}", DisplayErrorContext(&err));
                match &err {
                    SdkError::ServiceError(service) if service.err().is_no_such_key() => {
                        ObjectStoreError::NotFound(message)
                    }
                    _ => ObjectStoreError::Unavailable(message),
                }
            })?;

        debug!(
            "Streaming {location} ({} bytes)",
            output.content_length().unwrap_or_default()
        );

        let body = output.body;
        let chunks = stream::unfold(body, |mut body| async move {
            body.next()
                .await
                .map(|chunk| (chunk.map_err(|e| ObjectStoreError::Read(e.to_string())), body))
        });

        Ok(chunks.boxed())
    }
}
