//! Remote object-storage state backend.
//!
//! Persists the envelope as one object keyed by the cluster identifier.
//! A missing object is a fatal read error until the first write creates
//! it; the write path fetches or creates the container as needed.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{Result, StateError};

use super::store::StateBackend;

/// S3-backed state backend, one object per cluster.
#[derive(Debug)]
pub struct CloudStateBackend {
    client: Client,
    bucket: String,
    key: String,
}

impl CloudStateBackend {
    /// Creates a backend for `cluster` in `bucket`.
    ///
    /// # Errors
    ///
    /// Returns an error if the S3 client cannot be initialized.
    pub async fn new(
        bucket: &str,
        cluster: &str,
        prefix: Option<&str>,
        region: Option<&str>,
    ) -> Result<Self> {
        let config = if let Some(region_str) = region {
            aws_config::from_env()
                .region(aws_config::Region::new(region_str.to_string()))
                .load()
                .await
        } else {
            aws_config::load_from_env().await
        };

        let client = Client::new(&config);
        Ok(Self::with_client(client, bucket, cluster, prefix))
    }

    /// Creates a backend with an existing client.
    #[must_use]
    pub fn with_client(client: Client, bucket: &str, cluster: &str, prefix: Option<&str>) -> Self {
        let prefix = prefix
            .map(|p| {
                let p = p.trim_matches('/');
                if p.is_empty() {
                    String::new()
                } else {
                    format!("{p}/")
                }
            })
            .unwrap_or_default();

        Self {
            client,
            bucket: bucket.to_string(),
            key: format!("{prefix}{cluster}"),
        }
    }

    /// Ensures the container exists, creating it when absent.
    async fn ensure_bucket(&self) -> Result<()> {
        let head = self.client.head_bucket().bucket(&self.bucket).send().await;

        match head {
            Ok(_) => Ok(()),
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_not_found() {
                    info!("Creating state bucket: {}", self.bucket);
                    self.client
                        .create_bucket()
                        .bucket(&self.bucket)
                        .send()
                        .await
                        .map_err(|e| {
                            StateError::backend(format!("Failed to create bucket: {e}"))
                        })?;
                    Ok(())
                } else {
                    Err(StateError::backend(format!("Bucket check failed: {service_err}")).into())
                }
            }
        }
    }
}

#[async_trait]
impl StateBackend for CloudStateBackend {
    async fn read(&self) -> Result<Option<String>> {
        debug!("Loading state from s3://{}/{}", self.bucket, self.key);

        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .send()
            .await;

        match result {
            Ok(response) => {
                let bytes = response.body.collect().await.map_err(|e| {
                    StateError::backend(format!("Failed to read state object: {e}"))
                })?;

                let content = String::from_utf8(bytes.to_vec()).map_err(|e| {
                    StateError::corrupted(format!("Invalid UTF-8 in state object: {e}"))
                })?;

                Ok(Some(content))
            }
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_no_such_key() {
                    // Unlike the local backend, a missing remote object is
                    // fatal: the cluster has no state to resume from.
                    Err(StateError::RemoteMissing {
                        key: self.key.clone(),
                    }
                    .into())
                } else {
                    Err(StateError::backend(format!("State read failed: {service_err}")).into())
                }
            }
        }
    }

    async fn write(&self, content: &str) -> Result<()> {
        self.ensure_bucket().await?;

        info!("Saving state to s3://{}/{}", self.bucket, self.key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .body(content.as_bytes().to_vec().into())
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| StateError::backend(format!("State write failed: {e}")))?;

        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "cloud"
    }
}
