//! AWS S3 backing store.
//!
//! The ledger document lives in a single object. `PutObject` replaces an
//! object as a whole, so readers never see a partial document.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;

use crate::error::{AppError, Result};
use crate::storage::LedgerStore;

/// S3-backed ledger store.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    key: String,
}

impl S3Store {
    /// Create a new S3 store instance.
    pub fn new(client: Client, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Create an S3 store from environment configuration.
    ///
    /// Reads `S3_BUCKET` (required) and `STATE_KEY` (default
    /// `watchbot/sent_ads.json`).
    pub async fn from_env() -> Result<Self> {
        let bucket = std::env::var("S3_BUCKET")
            .map_err(|_| AppError::config("S3_BUCKET must be set for the S3 store"))?;
        let key =
            std::env::var("STATE_KEY").unwrap_or_else(|_| "watchbot/sent_ads.json".to_string());

        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Ok(Self::new(Client::new(&config), bucket, key))
    }
}

#[async_trait]
impl LedgerStore for S3Store {
    async fn read(&self) -> Result<Option<Vec<u8>>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let bytes = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| AppError::S3(e.to_string()))?;
                Ok(Some(bytes.into_bytes().to_vec()))
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    log::info!("No existing state at {}", self.location());
                    Ok(None)
                } else {
                    Err(AppError::S3(service_err.to_string()))
                }
            }
        }
    }

    async fn write(&self, bytes: &[u8]) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .body(ByteStream::from(bytes.to_vec()))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| AppError::S3(e.to_string()))?;

        log::debug!("Wrote {} bytes to {}", bytes.len(), self.location());
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .send()
            .await
            .map_err(|e| AppError::S3(e.to_string()))?;

        log::info!("Deleted {}", self.location());
        Ok(())
    }

    async fn exists(&self) -> bool {
        self.client
            .head_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .send()
            .await
            .is_ok()
    }

    fn location(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}
