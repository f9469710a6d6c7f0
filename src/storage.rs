mod aws;
mod filesystem;

pub use aws::AwsS3;
pub use filesystem::Filesystem;

use std::{io, sync::Arc};

use async_trait::async_trait;
use color_eyre::eyre::Error as Report;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("AWS SDK error: {0}")]
    AwsSdk(#[source] Report),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Bucket {0} is unavailable")]
    BucketUnavailable(String),
}

/// Abstract interface for the blob stores holding requisitions.
///
/// A missing key is reported as `Ok(None)`, never as an error.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store the value identified by the given key
    async fn store(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;
    /// Get the raw value stored under the given key
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
}

/// Persists the requisition document of one institution
#[derive(Clone)]
pub struct RequisitionStore {
    storage: Arc<dyn Storage>,
    key: String,
}

impl RequisitionStore {
    /// Create a store that keeps the requisition under `key` in the given storage
    pub fn new(storage: impl Storage + 'static, key: impl Into<String>) -> Self {
        Self {
            storage: Arc::new(storage),
            key: key.into(),
        }
    }

    /// Store the requisition as `<data_dir>/<name>.json`.
    ///
    /// The file name is the configured requisition file when set, the
    /// institution id otherwise.
    pub fn filesystem(
        data_dir: impl Into<std::path::PathBuf>,
        file: Option<&str>,
        institution_id: &str,
    ) -> Self {
        let name = file.filter(|f| !f.is_empty()).unwrap_or(institution_id);
        Self::new(Filesystem::new(data_dir), format!("{name}.json"))
    }

    /// Store the requisition in `bucket` under the institution id
    pub fn s3(config: &aws_config::SdkConfig, bucket: &str, institution_id: &str) -> Self {
        Self::new(AwsS3::new(config, bucket), institution_id)
    }

    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the stored document as is, it is not validated in any way
    pub async fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        self.storage.load(&self.key).await
    }

    pub async fn save(&self, document: &[u8]) -> Result<(), StorageError> {
        self.storage.store(&self.key, document).await
    }
}
