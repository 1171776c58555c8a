//! Timed execution of single object store operations.
//!
//! Failures never escape as errors here. Every outcome, successful or not, is captured in an
//! [`OpResult`] so the run can account for it.

use std::fmt;
use std::time::{Duration, Instant, SystemTime};

use bytes::Bytes;
use futures_util::StreamExt;

use crate::store::ObjectStore;

/// The kind of request issued against the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Put,
}

impl Operation {
    /// The label used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of one request.
///
/// Timings are measured from the moment just before the request is issued. `None` marks a timing
/// that was never reached, for instance because the request failed before the store answered.
#[derive(Clone, Debug, PartialEq)]
pub struct OpResult {
    /// Wall-clock time at which the operation started.
    pub timestamp: SystemTime,
    pub operation: Operation,
    pub key: String,
    /// Time to first byte: until the store answered the request. Only measured for GETs.
    pub ttfb: Option<Duration>,
    /// Time to last byte: until the body was fully transferred.
    pub ttlb: Option<Duration>,
    pub bytes_downloaded: u64,
    pub bytes_uploaded: u64,
    /// Description of the failure, if the operation failed.
    pub error: Option<String>,
}

impl OpResult {
    /// Returns `true` if the operation completed without an error.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Downloads the object at `key` and measures how long it takes.
///
/// TTFB is taken when the store answers the request, TTLB once the last body chunk has arrived. A
/// failure while reading the body still reports both timings and the bytes received so far.
pub async fn get_object(store: &dyn ObjectStore, key: &str) -> OpResult {
    let timestamp = SystemTime::now();
    let start = Instant::now();

    let (ttfb, ttlb, bytes_downloaded, error) = match store.get_object(key).await {
        Ok(mut stream) => {
            let ttfb = start.elapsed();
            let mut received = 0;
            let mut error = None;

            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(chunk) => received += chunk.len() as u64,
                    Err(err) => {
                        error = Some(format!("body read error: {err}"));
                        break;
                    }
                }
            }

            (Some(ttfb), Some(start.elapsed()), received, error)
        }
        Err(err) => (None, None, 0, Some(err.to_string())),
    };

    OpResult {
        timestamp,
        operation: Operation::Get,
        key: key.to_owned(),
        ttfb,
        ttlb,
        bytes_downloaded,
        bytes_uploaded: 0,
        error,
    }
}

/// Uploads `payload` to `key` and measures how long it takes.
///
/// The upload is only observable as a whole, so there is no TTFB. TTLB is only measured when the
/// upload succeeds.
pub async fn put_object(store: &dyn ObjectStore, key: &str, payload: Bytes) -> OpResult {
    let size = payload.len() as u64;
    let timestamp = SystemTime::now();
    let start = Instant::now();

    let (ttlb, bytes_uploaded, error) = match store.put_object(key, payload).await {
        Ok(()) => (Some(start.elapsed()), size, None),
        Err(err) => (None, 0, Some(err.to_string())),
    };

    OpResult {
        timestamp,
        operation: Operation::Put,
        key: key.to_owned(),
        ttfb: None,
        ttlb,
        bytes_downloaded: 0,
        bytes_uploaded,
        error,
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use futures_util::stream;

    use super::*;
    use crate::store::{InMemoryStore, PayloadStream, StoreError, StoreResult};

    #[derive(Debug)]
    struct BrokenBodyStore;

    #[async_trait::async_trait]
    impl ObjectStore for BrokenBodyStore {
        fn name(&self) -> &'static str {
            "broken-body"
        }

        async fn get_object(&self, _key: &str) -> StoreResult<PayloadStream> {
            let chunks = vec![
                Ok(Bytes::from_static(b"12345")),
                Err(StoreError::Io(io::Error::other("connection reset"))),
                Ok(Bytes::from_static(b"never read")),
            ];
            Ok(stream::iter(chunks).boxed())
        }

        async fn put_object(&self, key: &str, _payload: Bytes) -> StoreResult<()> {
            Err(StoreError::InvalidKey(key.to_owned()))
        }
    }

    #[tokio::test]
    async fn get_reports_size_and_ordered_timings() {
        let store = InMemoryStore::with_objects([("a", vec![7u8; 300])]);
        let result = get_object(&store, "a").await;

        assert!(result.is_success());
        assert_eq!(result.operation, Operation::Get);
        assert_eq!(result.key, "a");
        assert_eq!(result.bytes_downloaded, 300);
        assert_eq!(result.bytes_uploaded, 0);
        assert!(result.ttfb.unwrap() <= result.ttlb.unwrap());
    }

    #[tokio::test]
    async fn get_failure_has_no_timings() {
        let store = InMemoryStore::new();
        let result = get_object(&store, "missing").await;

        assert_eq!(result.ttfb, None);
        assert_eq!(result.ttlb, None);
        assert_eq!(result.bytes_downloaded, 0);
        assert_eq!(result.error.as_deref(), Some("object not found: missing"));
    }

    #[tokio::test]
    async fn body_error_keeps_partial_transfer() {
        let result = get_object(&BrokenBodyStore, "a").await;

        assert!(result.ttfb.is_some());
        assert!(result.ttlb.is_some());
        assert_eq!(result.bytes_downloaded, 5);
        let error = result.error.unwrap();
        assert!(error.starts_with("body read error:"), "{error}");
        assert!(error.contains("connection reset"), "{error}");
    }

    #[tokio::test]
    async fn put_reports_uploaded_bytes() {
        let store = InMemoryStore::new();
        let result = put_object(&store, "b", Bytes::from(vec![1u8; 64])).await;

        assert!(result.is_success());
        assert_eq!(result.operation, Operation::Put);
        assert_eq!(result.bytes_uploaded, 64);
        assert_eq!(result.bytes_downloaded, 0);
        assert_eq!(result.ttfb, None);
        assert!(result.ttlb.is_some());
        assert_eq!(store.get_stored("b").unwrap().len(), 64);
    }

    #[tokio::test]
    async fn put_failure_uploads_nothing() {
        let result = put_object(&BrokenBodyStore, "b", Bytes::from_static(b"data")).await;

        assert_eq!(result.bytes_uploaded, 0);
        assert_eq!(result.ttfb, None);
        assert_eq!(result.ttlb, None);
        assert!(!result.is_success());
    }
}
