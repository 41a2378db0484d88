//! Object storage upload.
//!
//! Publishes a report file to an S3-compatible bucket. The S3 client is
//! hidden behind the [`ObjectStore`] trait so the publish flow can be
//! exercised without a network.
//!
//! Missing or rejected credentials are reported as
//! [`UploadError::CredentialsUnavailable`], which callers treat as a
//! recoverable outcome. Every other failure is fatal.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_config::retry::RetryConfig;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::primitives::ByteStream;
use tracing::{debug, info};

use crate::config::{Credentials, UploadConfig};

/// Message printed when the upload is skipped for lack of credentials.
pub const CREDENTIALS_UNAVAILABLE_MESSAGE: &str = "Credentials not available";

/// Message printed after a successful upload.
pub const UPLOAD_SUCCESS_MESSAGE: &str = "Upload Successful";

/// Service error codes meaning the key pair itself was refused.
const REJECTED_CREDENTIAL_CODES: &[&str] = &["InvalidAccessKeyId", "SignatureDoesNotMatch"];

/// Result type for upload operations.
pub type UploadResult<T> = Result<T, UploadError>;

/// Errors that can occur while uploading a report.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Credentials are missing from the environment or were rejected.
    #[error("{}", CREDENTIALS_UNAVAILABLE_MESSAGE)]
    CredentialsUnavailable,

    /// The local file could not be opened for streaming.
    #[error("Failed to read {}: {message}", .path.display())]
    Read { path: PathBuf, message: String },

    /// Any other transport or service failure.
    #[error("Upload failed: {0}")]
    Service(String),
}

impl UploadError {
    /// Returns true when the failure is due to credentials, which callers
    /// report and then carry on from.
    pub fn is_credentials(&self) -> bool {
        matches!(self, UploadError::CredentialsUnavailable)
    }
}

/// A bucket/key addressed blob store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store name for logs.
    fn name(&self) -> &str;

    /// Uploads the contents of `path` to `bucket` under `key`.
    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> UploadResult<()>;
}

/// [`ObjectStore`] backed by the AWS S3 SDK pointed at a custom endpoint.
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Builds a client for the configured endpoint and region.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::CredentialsUnavailable`] if either half of the
    /// key pair is missing. No network traffic happens in that case.
    pub async fn connect(config: &UploadConfig, credentials: &Credentials) -> UploadResult<Self> {
        if !credentials.is_complete() {
            debug!(
                "{} or {} is not set",
                config.access_key_var, config.secret_key_var
            );
            return Err(UploadError::CredentialsUnavailable);
        }

        let provider = aws_sdk_s3::config::Credentials::new(
            credentials.access_key.clone().unwrap_or_default(),
            credentials.secret_key.clone().unwrap_or_default(),
            None,
            None,
            "environment",
        );

        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(config.endpoint.clone())
            .credentials_provider(provider)
            .retry_config(RetryConfig::disabled())
            .load()
            .await;
        let client = Client::from_conf(aws_sdk_s3::config::Builder::from(&shared_config).build());

        debug!("S3 client ready for {} ({})", config.endpoint, config.region);
        Ok(Self { client })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn name(&self) -> &str {
        "s3"
    }

    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> UploadResult<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| UploadError::Read {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type("application/xml")
            .body(body)
            .send()
            .await
            .map_err(|err| {
                if err
                    .code()
                    .is_some_and(|code| REJECTED_CREDENTIAL_CODES.contains(&code))
                {
                    UploadError::CredentialsUnavailable
                } else {
                    UploadError::Service(DisplayErrorContext(&err).to_string())
                }
            })?;

        Ok(())
    }
}

/// Uploads `filename` to the configured bucket, using the filename string
/// itself as the object key.
pub async fn upload_report(
    config: &UploadConfig,
    store: &dyn ObjectStore,
    filename: &str,
) -> UploadResult<()> {
    info!(
        "Uploading {} to bucket {} via {}",
        filename,
        config.bucket,
        store.name()
    );

    store
        .put_file(&config.bucket, filename, Path::new(filename))
        .await?;

    info!("Uploaded {} to {}", filename, config.bucket);
    Ok(())
}

/// Connects to the configured S3 endpoint and uploads `filename`.
pub async fn publish(
    config: &UploadConfig,
    credentials: &Credentials,
    filename: &str,
) -> UploadResult<()> {
    let store = S3ObjectStore::connect(config, credentials).await?;
    upload_report(config, &store, filename).await
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use super::*;

    struct InMemoryObjectStore {
        objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    }

    impl InMemoryObjectStore {
        fn new() -> Self {
            Self {
                objects: Mutex::new(BTreeMap::new()),
            }
        }
    }

    #[async_trait]
    impl ObjectStore for InMemoryObjectStore {
        fn name(&self) -> &str {
            "memory"
        }

        async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> UploadResult<()> {
            let bytes = std::fs::read(path).map_err(|e| UploadError::Read {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            self.objects
                .lock()
                .unwrap()
                .insert((bucket.to_string(), key.to_string()), bytes);
            Ok(())
        }
    }

    /// Store that fails every put with a fixed error.
    struct FailingObjectStore {
        credentials: bool,
    }

    #[async_trait]
    impl ObjectStore for FailingObjectStore {
        fn name(&self) -> &str {
            "failing"
        }

        async fn put_file(&self, _bucket: &str, _key: &str, _path: &Path) -> UploadResult<()> {
            if self.credentials {
                Err(UploadError::CredentialsUnavailable)
            } else {
                Err(UploadError::Service("connection reset".to_string()))
            }
        }
    }

    #[tokio::test]
    async fn test_upload_uses_filename_as_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.xml");
        std::fs::write(&path, "<testsuites/>").unwrap();
        let filename = path.to_str().unwrap();

        let config = UploadConfig::default();
        let store = InMemoryObjectStore::new();
        upload_report(&config, &store, filename).await.unwrap();

        let objects = store.objects.lock().unwrap();
        let key = ("dx-test-results".to_string(), filename.to_string());
        assert_eq!(objects.get(&key).map(Vec::as_slice), Some(&b"<testsuites/>"[..]));
    }

    #[tokio::test]
    async fn test_upload_missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.xml");

        let err = upload_report(
            &UploadConfig::default(),
            &InMemoryObjectStore::new(),
            path.to_str().unwrap(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, UploadError::Read { .. }));
        assert!(!err.is_credentials());
    }

    #[tokio::test]
    async fn test_upload_propagates_store_errors() {
        let config = UploadConfig::default();

        let err = upload_report(&config, &FailingObjectStore { credentials: true }, "r.xml")
            .await
            .unwrap_err();
        assert!(err.is_credentials());

        let err = upload_report(&config, &FailingObjectStore { credentials: false }, "r.xml")
            .await
            .unwrap_err();
        assert!(!err.is_credentials());
        assert_eq!(err.to_string(), "Upload failed: connection reset");
    }

    #[tokio::test]
    async fn test_publish_without_credentials() {
        let config = UploadConfig::default();
        let err = publish(&config, &Credentials::default(), "report.xml")
            .await
            .unwrap_err();
        assert!(err.is_credentials());
        assert_eq!(err.to_string(), CREDENTIALS_UNAVAILABLE_MESSAGE);
    }

    #[tokio::test]
    async fn test_connect_requires_both_keys() {
        let credentials = Credentials {
            access_key: Some("AKID".to_string()),
            secret_key: None,
        };
        let result = S3ObjectStore::connect(&UploadConfig::default(), &credentials).await;
        assert!(matches!(result, Err(UploadError::CredentialsUnavailable)));
    }

    #[tokio::test]
    async fn test_connect_treats_empty_variable_as_missing() {
        let config = UploadConfig::default();
        let credentials = Credentials::from_lookup(&config, |name| match name {
            "LINODE_CLI_OBJ_ACCESS_KEY" => Some(String::new()),
            _ => Some("SECRET".to_string()),
        });
        let result = S3ObjectStore::connect(&config, &credentials).await;
        assert!(matches!(result, Err(UploadError::CredentialsUnavailable)));
    }
}
