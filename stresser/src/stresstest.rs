//! Runs workers concurrently against an object store and aggregates their results.
//!
//! In continuous mode, `concurrency` workers issue operations back to back until the configured
//! duration has elapsed or the run is cancelled. In fixed-count mode, the same number of workers
//! drains a queue of upload jobs instead, regardless of the duration.
//!
//! Workers push every [`OpResult`] into a bounded channel read by a single consumer that feeds the
//! [`StatsCollector`]. The channel closes once every worker has returned, so draining it completely
//! means all workers are done.

use std::sync::Arc;
use std::time::Instant;

use rand::rngs::SmallRng;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, OperationMode, RunConfig};
use crate::error::Error;
use crate::executor::{self, OpResult, Operation};
use crate::manifest::{self, ManifestWriter};
use crate::stats::{RunStats, StatsCollector};
use crate::store::{self, BoxedStore};
use crate::workload::{self, KeyOwner, KeyPicker, PayloadGenerator};

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunReport {
    /// Every emitted result, in the order the consumer received them.
    pub results: Vec<OpResult>,
    pub stats: RunStats,
}

/// Loads keys, connects to the store and runs a stress test as described by `config`.
///
/// Returns once the run has ended, either because the duration has elapsed, all fixed-count jobs
/// are done, or `cancel` was triggered. Cancellation is not an error; the report then contains
/// the results collected so far.
pub async fn run(config: &Config, cancel: CancellationToken) -> Result<RunReport, Error> {
    config.validate()?;
    let run_config = config.run_config();

    let keys: Vec<String> = match &config.manifest {
        Some(path) if run_config.mode.reads() => manifest::load_manifest(path).await?,
        _ => Vec::new(),
    };

    let store = store::from_config(&config.storage)?;
    let mut stresstest = Stresstest::new(store, run_config).with_keys(keys);

    let manifest = match &config.manifest {
        Some(path) if config.operation == OperationMode::Write && config.generate_manifest => {
            Some(Arc::new(ManifestWriter::create(path).await?))
        }
        _ => None,
    };
    if let Some(manifest) = &manifest {
        tracing::info!(path = %manifest.path().display(), "recording uploaded keys");
        stresstest = stresstest.with_manifest(Arc::clone(manifest));
    }

    let report = stresstest.run(cancel).await;

    if let Some(manifest) = manifest
        && let Err(error) = manifest.close().await
    {
        tracing::error!(error = &error as &dyn std::error::Error, "failed to close manifest");
    }

    report
}

/// A configured stress test against an injected store.
#[derive(Clone, Debug)]
pub struct Stresstest {
    store: BoxedStore,
    config: Arc<RunConfig>,
    keys: Arc<[String]>,
    manifest: Option<Arc<ManifestWriter>>,
    payloads: PayloadGenerator,
}

impl Stresstest {
    /// Creates a stress test without keys to read and without manifest recording.
    pub fn new(store: BoxedStore, config: RunConfig) -> Self {
        Self {
            payloads: PayloadGenerator::new(config.put_object_size),
            store,
            config: Arc::new(config),
            keys: Vec::new().into(),
            manifest: None,
        }
    }

    /// Sets the keys that GETs are distributed over.
    pub fn with_keys(mut self, keys: impl Into<Arc<[String]>>) -> Self {
        self.keys = keys.into();
        self
    }

    /// Records the keys of successful uploads in `manifest`.
    pub fn with_manifest(mut self, manifest: Arc<ManifestWriter>) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// Runs the stress test until the duration elapses, all jobs are done, or `cancel` fires.
    ///
    /// Operations still in flight when the run ends are awaited, but their results are discarded.
    /// An error is only returned if there are no keys to read or a worker panics.
    pub async fn run(self, cancel: CancellationToken) -> Result<RunReport, Error> {
        let mode = self.config.mode;
        if mode.reads() && self.keys.is_empty() {
            return Err(Error::NoKeys(mode));
        }

        let concurrency = self.config.concurrency;
        let fixed_count = self.config.fixed_file_count();
        let (sender, mut receiver) = mpsc::channel(2 * concurrency.max(1));

        let token = cancel.child_token();
        let _guard = token.clone().drop_guard();

        tracing::info!(
            %mode,
            concurrency,
            duration = ?self.config.duration,
            file_count = ?fixed_count,
            keys = self.keys.len(),
            put_object_size = mode.writes().then(|| self.payloads.size()),
            "starting stress test"
        );

        let started = Instant::now();
        let mut workers = JoinSet::new();
        match fixed_count {
            Some(count) => {
                let (queue, jobs) = async_channel::unbounded();
                for job in 0..count {
                    if queue.try_send(job).is_err() {
                        break;
                    }
                }
                queue.close();

                for id in 0..concurrency {
                    let worker = self.clone();
                    let jobs = jobs.clone();
                    let token = token.clone();
                    let sender = sender.clone();
                    workers.spawn(async move { worker.run_jobs(id, jobs, token, sender).await });
                }
            }
            None => {
                for id in 0..concurrency {
                    let worker = self.clone();
                    let token = token.clone();
                    let sender = sender.clone();
                    workers.spawn(async move { worker.run_worker(id, token, sender).await });
                }
            }
        }
        drop(sender);

        let deadline = tokio::time::sleep(self.config.duration);
        tokio::pin!(deadline);

        let mut collector = StatsCollector::new();
        let mut results = Vec::new();
        loop {
            tokio::select! {
                result = receiver.recv() => {
                    let Some(result) = result else { break };
                    collector.add(&result);
                    results.push(result);
                }
                _ = &mut deadline, if fixed_count.is_none() && !token.is_cancelled() => {
                    tracing::info!(
                        collected = collector.total_requests(),
                        "duration elapsed, stopping workers"
                    );
                    token.cancel();
                }
            }
        }

        // The channel only closes once every worker has returned.
        while let Some(joined) = workers.join_next().await {
            joined?;
        }

        let elapsed = started.elapsed();
        if cancel.is_cancelled() {
            tracing::info!(
                collected = collector.total_requests(),
                ?elapsed,
                "stress test cancelled"
            );
        }

        let stats = collector.finalize(elapsed, concurrency);
        tracing::info!(
            requests = stats.total_requests(),
            errors = stats.total_errors(),
            ?elapsed,
            "stress test finished"
        );

        Ok(RunReport { results, stats })
    }

    async fn run_worker(
        self,
        id: usize,
        token: CancellationToken,
        sender: mpsc::Sender<OpResult>,
    ) {
        let mut rng = workload::worker_rng(id);
        let mut keys = KeyPicker::new(Arc::clone(&self.keys), id, self.config.randomize);
        tracing::debug!(worker = id, "worker started");

        while !token.is_cancelled() {
            let result = match workload::choose_operation(self.config.mode, &mut rng) {
                Operation::Get => {
                    let Some(key) = keys.next_key(&mut rng) else {
                        tracing::warn!(worker = id, "no keys to read, stopping worker");
                        break;
                    };
                    executor::get_object(self.store.as_ref(), key).await
                }
                Operation::Put => self.upload(KeyOwner::Worker(id), &mut rng).await,
            };

            if !emit(&sender, &token, result) {
                break;
            }

            // Stores that complete without suspending would otherwise starve the consumer.
            tokio::task::yield_now().await;
        }

        tracing::debug!(worker = id, "worker stopped");
    }

    async fn run_jobs(
        self,
        id: usize,
        jobs: async_channel::Receiver<usize>,
        token: CancellationToken,
        sender: mpsc::Sender<OpResult>,
    ) {
        let mut rng = workload::worker_rng(id);

        loop {
            let job = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                job = jobs.recv() => match job {
                    Ok(job) => job,
                    Err(_) => break,
                },
            };

            let result = self.upload(KeyOwner::Job(job), &mut rng).await;
            if !emit(&sender, &token, result) {
                break;
            }
        }

        tracing::debug!(worker = id, "job worker stopped");
    }

    async fn upload(&self, owner: KeyOwner, rng: &mut SmallRng) -> OpResult {
        let key = workload::generate_key(owner, rng);
        let payload = self.payloads.generate(rng);
        let result = executor::put_object(self.store.as_ref(), &key, payload).await;

        if result.is_success()
            && let Some(manifest) = &self.manifest
            && let Err(error) = manifest.append_key(&key).await
        {
            tracing::warn!(
                error = &error as &dyn std::error::Error,
                %key,
                "failed to record key in manifest"
            );
        }

        result
    }
}

/// Hands a result to the consumer.
///
/// Returns `false` if the worker should stop. A full channel drops the result and keeps going.
fn emit(sender: &mpsc::Sender<OpResult>, token: &CancellationToken, result: OpResult) -> bool {
    if token.is_cancelled() {
        return false;
    }

    match sender.try_send(result) {
        Ok(()) => true,
        Err(TrySendError::Full(result)) => {
            tracing::warn!(
                operation = %result.operation,
                key = %result.key,
                "result channel full, dropping result"
            );
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}
