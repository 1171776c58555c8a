//! Object store clients that load can be driven against.
//!
//! Every client implements [`ObjectStore`], the minimal capability the stresser needs: fetch an
//! object as a byte stream and upload a complete payload. A client is bound to its bucket (or root
//! directory) when it is constructed from [`Storage`] configuration, so operations only take the
//! object key.

use std::fmt::Debug;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use thiserror::Error;

use crate::config::Storage;

mod in_memory;
mod local_fs;
mod s3_compatible;

pub use in_memory::InMemoryStore;
pub use local_fs::LocalFsStore;
pub use s3_compatible::{S3CompatibleStore, S3CompatibleStoreConfig};

/// A stream of object contents as returned by [`ObjectStore::get_object`].
pub type PayloadStream = BoxStream<'static, StoreResult<Bytes>>;

/// A shared, type-erased [`ObjectStore`] instance.
pub type BoxedStore = Arc<dyn ObjectStore>;

/// Result type for object store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// The capabilities the stresser requires from an object store.
#[async_trait::async_trait]
pub trait ObjectStore: Debug + Send + Sync + 'static {
    /// The store name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Requests the object at `key`.
    ///
    /// Resolves once the store has answered the request, before the body has been consumed. The
    /// returned stream yields the body.
    async fn get_object(&self, key: &str) -> StoreResult<PayloadStream>;

    /// Uploads `payload` as the full contents of the object at `key`.
    async fn put_object(&self, key: &str, payload: Bytes) -> StoreResult<()>;
}

/// Errors returned by object store clients.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO errors related to payload streaming or file operations.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The key cannot be mapped onto the store.
    #[error("invalid object key: {0:?}")]
    InvalidKey(String),

    /// Errors from the S3 client, including error responses from the service.
    #[error("s3 error: {0}")]
    S3(#[from] s3::error::S3Error),

    /// Any other error stemming from a store client.
    #[error("storage backend error: {context}")]
    Generic {
        /// What the client was doing when the error occurred.
        context: String,
        /// The underlying error.
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Constructs the store client described by `config`.
pub fn from_config(config: &Storage) -> StoreResult<BoxedStore> {
    let store: BoxedStore = match config {
        Storage::S3Compatible {
            endpoint,
            region,
            bucket,
            access_key,
            secret_key,
            path_style,
            request_timeout,
            insecure_skip_verify,
        } => {
            let store = S3CompatibleStore::new(S3CompatibleStoreConfig {
                endpoint: endpoint.clone(),
                region: region.clone(),
                bucket: bucket.clone(),
                access_key: access_key.clone(),
                secret_key: secret_key.as_ref().map(|secret| {
                    use secrecy::ExposeSecret;
                    secret.expose_secret().as_str().to_owned()
                }),
                path_style: *path_style,
                request_timeout: *request_timeout,
                insecure_skip_verify: *insecure_skip_verify,
            })?;
            Arc::new(store)
        }
        Storage::FileSystem { path } => Arc::new(LocalFsStore::new(path)),
        Storage::Memory => Arc::new(InMemoryStore::new()),
    };

    tracing::info!(store = store.name(), "object store client created");
    Ok(store)
}
