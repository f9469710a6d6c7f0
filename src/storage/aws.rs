use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::{
    error::{ProvideErrorMetadata, SdkError},
    Client as S3Client,
};
use tracing::{debug, info};

use crate::storage::{Storage, StorageError};

const NO_SUCH_BUCKET: &str = "NoSuchBucket";

/// AWS S3 storage, one object per key in an existing bucket
pub struct AwsS3 {
    client: S3Client,
    bucket: String,
}

impl AwsS3 {
    /// Create a new instance of [AwsS3] with the given AWS SDK config and bucket name
    pub fn new(config: &SdkConfig, bucket_name: impl Into<String>) -> Self {
        Self::with_client(S3Client::new(config), bucket_name)
    }

    /// Use an already configured S3 client
    pub fn with_client(client: S3Client, bucket_name: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket_name.into(),
        }
    }

    fn sdk_error<E, R>(&self, err: SdkError<E, R>) -> StorageError
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
        R: std::fmt::Debug + Send + Sync + 'static,
    {
        if err.code() == Some(NO_SUCH_BUCKET) {
            return StorageError::BucketUnavailable(self.bucket.clone());
        }
        StorageError::AwsSdk(err.into())
    }
}

#[async_trait]
impl Storage for AwsS3 {
    async fn store(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/json")
            .body(data.to_vec().into())
            .send()
            .await
            .map_err(|e| self.sdk_error(e))?;

        info!("Stored object {key} in bucket {}", self.bucket);
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        debug!("Reading object {key} from bucket {}", self.bucket);
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(SdkError::ServiceError(err)) if err.err().is_no_such_key() => return Ok(None),
            Err(err) => return Err(self.sdk_error(err)),
        };

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::AwsSdk(e.into()))?;
        Ok(Some(bytes.into_bytes().to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        requisition::{PollPolicy, RequisitionManager},
        storage::RequisitionStore,
        test_utils::{linked_requisition, MockAggregator},
    };
    use aws_sdk_s3::config::{
        retry::RetryConfig, BehaviorVersion, Credentials, Region, RequestChecksumCalculation,
        ResponseChecksumValidation,
    };
    use axum::{
        body::Bytes,
        extract::{Path, State},
        http::{header, StatusCode},
        response::{IntoResponse, Response},
        routing::get,
        Router,
    };
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
        time::Duration,
    };
    use tokio::net::TcpListener;

    const BUCKET: &str = "requisitions";
    const KEY: &str = "SANDBOXFINANCE_SFIN0000";

    #[derive(Clone, Default)]
    struct FakeS3 {
        objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
        content_types: Arc<Mutex<Vec<String>>>,
    }

    fn s3_error(code: &str) -> Response {
        let body = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <Error><Code>{code}</Code><Message>{code}</Message></Error>"
        );
        (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "application/xml")],
            body,
        )
            .into_response()
    }

    async fn get_object(
        State(s3): State<FakeS3>,
        Path((bucket, key)): Path<(String, String)>,
    ) -> Response {
        if bucket != BUCKET {
            return s3_error("NoSuchBucket");
        }
        match s3.objects.lock().unwrap().get(&key) {
            Some(data) => (StatusCode::OK, data.clone()).into_response(),
            None => s3_error("NoSuchKey"),
        }
    }

    async fn put_object(
        State(s3): State<FakeS3>,
        Path((bucket, key)): Path<(String, String)>,
        headers: axum::http::HeaderMap,
        body: Bytes,
    ) -> Response {
        if bucket != BUCKET {
            return s3_error("NoSuchBucket");
        }
        if let Some(content_type) = headers.get(header::CONTENT_TYPE) {
            s3.content_types
                .lock()
                .unwrap()
                .push(content_type.to_str().unwrap_or_default().to_string());
        }
        s3.objects.lock().unwrap().insert(key, body.to_vec());
        StatusCode::OK.into_response()
    }

    async fn spawn_s3() -> (S3Client, FakeS3) {
        let s3 = FakeS3::default();
        let router = Router::new()
            .route("/{bucket}/{key}", get(get_object).put(put_object))
            .with_state(s3.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("eu-central-1"))
            .credentials_provider(Credentials::new("test", "test", None, None, "static"))
            .endpoint_url(format!("http://{addr}"))
            .force_path_style(true)
            .retry_config(RetryConfig::disabled())
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .response_checksum_validation(ResponseChecksumValidation::WhenRequired)
            .build();
        (S3Client::from_conf(config), s3)
    }

    #[tokio::test]
    async fn test_store_puts_object_and_loads_it_back() {
        let (client, s3) = spawn_s3().await;
        let storage = AwsS3::with_client(client, BUCKET);

        storage.store(KEY, b"{\"id\":\"req-1\"}").await.unwrap();

        assert_eq!(
            s3.objects.lock().unwrap().get(KEY).cloned(),
            Some(b"{\"id\":\"req-1\"}".to_vec())
        );
        assert_eq!(*s3.content_types.lock().unwrap(), vec!["application/json"]);
        assert_eq!(
            storage.load(KEY).await.unwrap(),
            Some(b"{\"id\":\"req-1\"}".to_vec())
        );
    }

    #[tokio::test]
    async fn test_missing_object_is_not_an_error() {
        let (client, _) = spawn_s3().await;
        let storage = AwsS3::with_client(client, BUCKET);

        assert!(storage.load(KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_bucket_is_reported() {
        let (client, s3) = spawn_s3().await;
        let storage = AwsS3::with_client(client, "missing");

        let err = storage.store(KEY, b"{}").await.unwrap_err();
        assert!(matches!(err, StorageError::BucketUnavailable(ref b) if b == "missing"));

        let err = storage.load(KEY).await.unwrap_err();
        assert!(matches!(err, StorageError::BucketUnavailable(_)));
        assert!(s3.objects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_renewed_requisition_is_written_to_bucket() {
        let (client, s3) = spawn_s3().await;
        let store = RequisitionStore::new(AwsS3::with_client(client, BUCKET), KEY);
        let aggregator =
            Arc::new(MockAggregator::new().poll_returns(linked_requisition("req-1", &["acc-1"])));
        let manager = RequisitionManager::new(aggregator, store, KEY).with_poll_policy(
            PollPolicy {
                interval: Duration::ZERO,
                ..Default::default()
            },
        );

        let requisition = manager.get_requisition().await.unwrap();

        let saved = s3.objects.lock().unwrap().get(KEY).cloned().unwrap();
        let saved: crate::models::Requisition = serde_json::from_slice(&saved).unwrap();
        assert_eq!(saved, requisition);
        assert_eq!(saved.accounts, vec!["acc-1"]);
    }
}
