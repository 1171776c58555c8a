use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt};
use s3::creds::Credentials;
use s3::{Bucket, Region};

use super::{ObjectStore, PayloadStream, StoreError, StoreResult};

/// Settings for [`S3CompatibleStore`].
#[derive(Clone, Default)]
pub struct S3CompatibleStoreConfig {
    /// Custom endpoint URL, e.g. `http://localhost:9000` for MinIO.
    ///
    /// Falls back to the AWS endpoint of `region` if unset.
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    /// Static credentials. When either is missing, the ambient AWS credential chain is used.
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub path_style: bool,
    pub request_timeout: Option<Duration>,
    /// Skip verification of the endpoint's TLS certificate and host name.
    pub insecure_skip_verify: bool,
}

impl fmt::Debug for S3CompatibleStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3CompatibleStoreConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("access_key", &self.access_key)
            .field("path_style", &self.path_style)
            .field("request_timeout", &self.request_timeout)
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .finish_non_exhaustive()
    }
}

/// A client for S3 and S3-compatible services, bound to one bucket.
pub struct S3CompatibleStore {
    bucket: Box<Bucket>,
}

impl S3CompatibleStore {
    /// Creates a new client bound to the configured bucket.
    ///
    /// No request is sent; connectivity problems surface on the first operation.
    pub fn new(config: S3CompatibleStoreConfig) -> StoreResult<Self> {
        let credentials = match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                tracing::info!("using static credentials from configuration");
                Credentials::new(
                    Some(access_key.as_str()),
                    Some(secret_key.as_str()),
                    None,
                    None,
                    None,
                )
            }
            _ => {
                tracing::info!("using default AWS credential chain");
                Credentials::new(None, None, None, None, None)
            }
        }
        .map_err(|cause| StoreError::Generic {
            context: "failed to resolve S3 credentials".into(),
            cause: Box::new(cause),
        })?;

        let endpoint = match config.endpoint {
            Some(endpoint) => endpoint,
            None => format!("https://s3.{}.amazonaws.com", config.region),
        };
        let region = Region::Custom {
            region: config.region,
            endpoint,
        };

        let mut bucket = Bucket::new(&config.bucket, region, credentials)?;
        if config.path_style {
            bucket = bucket.with_path_style();
        }
        if let Some(request_timeout) = config.request_timeout {
            bucket = bucket.with_request_timeout(request_timeout)?;
        }
        if config.insecure_skip_verify {
            tracing::warn!("disabling TLS certificate verification for the S3 client");
            bucket = bucket.set_dangereous_config(true, true)?.into();
        }

        Ok(Self { bucket })
    }
}

impl fmt::Debug for S3CompatibleStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3CompatibleStore")
            .field("bucket", &self.bucket.name())
            .field("endpoint", &self.bucket.host())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3CompatibleStore {
    fn name(&self) -> &'static str {
        "s3-compatible"
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn get_object(&self, key: &str) -> StoreResult<PayloadStream> {
        // Resolves once response headers are in; the body is streamed on demand.
        let response = self.bucket.get_object_stream(key).await?;
        Ok(response.bytes.map_err(StoreError::from).boxed())
    }

    #[tracing::instrument(level = "trace", skip(self, payload), fields(len = payload.len()))]
    async fn put_object(&self, key: &str, payload: Bytes) -> StoreResult<()> {
        self.bucket.put_object(key, &payload).await?;
        Ok(())
    }
}
