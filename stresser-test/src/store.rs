//! An object store with scripted latency and failures.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{StreamExt, stream};
use stresser::store::{InMemoryStore, ObjectStore, PayloadStream, StoreError, StoreResult};

#[derive(Debug, Default)]
struct Calls {
    gets: AtomicUsize,
    puts: AtomicUsize,
}

/// An in-memory object store that injects latency and failures.
///
/// Clones share their objects and call counters, so a test can keep a handle for inspection
/// while the run owns another.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use stresser_test::store::ScriptedStore;
///
/// let store = ScriptedStore::new()
///     .with_object("a/1", "contents")
///     .with_latency(Duration::from_millis(5))
///     .failing_every_nth_put(3);
/// assert_eq!(store.objects().len(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct ScriptedStore {
    objects: InMemoryStore,
    calls: Arc<Calls>,
    latency: Duration,
    fail_gets: bool,
    truncate_bodies: bool,
    fail_every_nth_put: Option<usize>,
}

impl ScriptedStore {
    /// Creates an empty store that answers immediately and never fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an object.
    pub fn with_object(self, key: &str, contents: impl Into<Bytes>) -> Self {
        self.objects.insert(key, contents);
        self
    }

    /// Delays every operation by `latency` before it is answered.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fails every GET before the object is looked up.
    pub fn failing_gets(mut self) -> Self {
        self.fail_gets = true;
        self
    }

    /// Answers GETs successfully, but breaks off the body after half of the object.
    pub fn truncating_bodies(mut self) -> Self {
        self.truncate_bodies = true;
        self
    }

    /// Fails every `n`-th PUT, counting from the first one.
    pub fn failing_every_nth_put(mut self, n: usize) -> Self {
        self.fail_every_nth_put = Some(n);
        self
    }

    /// The objects currently stored.
    pub fn objects(&self) -> &InMemoryStore {
        &self.objects
    }

    /// The number of GETs received so far.
    pub fn gets(&self) -> usize {
        self.calls.gets.load(Ordering::Relaxed)
    }

    /// The number of PUTs received so far.
    pub fn puts(&self) -> usize {
        self.calls.puts.load(Ordering::Relaxed)
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for ScriptedStore {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn get_object(&self, key: &str) -> StoreResult<PayloadStream> {
        self.calls.gets.fetch_add(1, Ordering::Relaxed);
        self.delay().await;

        if self.fail_gets {
            return Err(StoreError::Generic {
                context: format!("scripted GET failure for {key}"),
                cause: "injected failure".into(),
            });
        }

        let object = self
            .objects
            .get_stored(key)
            .ok_or_else(|| StoreError::NotFound(key.to_owned()))?;

        let chunks: Vec<StoreResult<Bytes>> = if self.truncate_bodies {
            let reset = io::Error::new(io::ErrorKind::ConnectionReset, "connection reset by peer");
            vec![Ok(object.slice(..object.len() / 2)), Err(reset.into())]
        } else {
            vec![Ok(object)]
        };

        Ok(stream::iter(chunks).boxed())
    }

    async fn put_object(&self, key: &str, payload: Bytes) -> StoreResult<()> {
        let count = self.calls.puts.fetch_add(1, Ordering::Relaxed) + 1;
        self.delay().await;

        if self
            .fail_every_nth_put
            .is_some_and(|n| n > 0 && count % n == 0)
        {
            return Err(StoreError::Generic {
                context: format!("scripted PUT failure for {key}"),
                cause: "injected failure".into(),
            });
        }

        self.objects.put_object(key, payload).await
    }
}
