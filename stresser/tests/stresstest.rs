use std::sync::Arc;
use std::time::{Duration, Instant};

use stresser::config::{OperationMode, RunConfig};
use stresser::executor::Operation;
use stresser::manifest::{self, ManifestWriter};
use stresser::{RunReport, Stresstest};
use stresser_test::store::ScriptedStore;
use tokio_util::sync::CancellationToken;

fn keys() -> Vec<String> {
    ["objects/a", "objects/b", "objects/c"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn populated_store() -> ScriptedStore {
    keys()
        .iter()
        .fold(ScriptedStore::new(), |store, key| {
            store.with_object(key, vec![42u8; 1000])
        })
        .with_latency(Duration::from_millis(1))
}

fn config(mode: OperationMode, duration: Duration) -> RunConfig {
    RunConfig {
        duration,
        concurrency: 4,
        mode,
        put_object_size: 256,
        ..Default::default()
    }
}

fn assert_consistent(report: &RunReport) {
    let stats = &report.stats;
    assert_eq!(stats.total_requests(), report.results.len() as u64);
    assert_eq!(
        stats.total_requests(),
        stats.total_gets() + stats.total_puts()
    );
    assert_eq!(
        stats.total_requests(),
        stats.total_successes() + stats.total_errors()
    );

    for latency in [&stats.get_ttfb, &stats.get_ttlb, &stats.put_ttlb] {
        if latency.is_empty() {
            continue;
        }
        assert!(latency.min <= latency.avg && latency.avg <= latency.max);
        assert!(latency.p50 <= latency.p90);
        assert!(latency.p90 <= latency.p99);
        assert!(latency.p99 <= latency.max);
    }

    for result in &report.results {
        if result.operation == Operation::Put {
            assert_eq!(result.ttfb, None);
        }
        if result.is_success() {
            assert!(result.ttlb.is_some());
        }
    }
}

#[tokio::test]
async fn cancellation_returns_partial_results() {
    stresser_test::tracing::init();

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let report = Stresstest::new(
        Arc::new(populated_store()),
        config(OperationMode::Read, Duration::from_secs(600)),
    )
    .with_keys(keys())
    .run(cancel)
    .await
    .unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(report.stats.total_requests() > 0);
    assert_consistent(&report);
}

#[tokio::test]
async fn mixed_run_issues_both_operations() {
    stresser_test::tracing::init();

    let store = populated_store();
    let report = Stresstest::new(
        Arc::new(store.clone()),
        config(OperationMode::Mixed, Duration::from_millis(300)),
    )
    .with_keys(keys())
    .run(CancellationToken::new())
    .await
    .unwrap();

    let stats = &report.stats;
    assert!(stats.total_gets() > 0);
    assert!(stats.total_puts() > 0);
    assert_eq!(stats.total_errors(), 0);
    assert_eq!(stats.bytes_downloaded(), 1000 * stats.total_gets());
    assert_eq!(stats.bytes_uploaded(), 256 * stats.total_puts());
    assert!(stats.elapsed >= Duration::from_millis(300));
    assert!(store.objects().len() > keys().len());
    assert_consistent(&report);
}

#[tokio::test]
async fn sequential_reads_cycle_through_keys() {
    let report = Stresstest::new(
        Arc::new(populated_store()),
        RunConfig {
            concurrency: 1,
            ..config(OperationMode::Read, Duration::from_millis(100))
        },
    )
    .with_keys(keys())
    .run(CancellationToken::new())
    .await
    .unwrap();

    assert!(report.results.len() >= 3);
    let visited: Vec<_> = report.results.iter().map(|r| r.key.as_str()).collect();
    for (index, key) in visited.iter().enumerate() {
        assert_eq!(*key, keys()[index % 3]);
    }
}

#[tokio::test]
async fn failed_gets_are_counted() {
    let report = Stresstest::new(
        Arc::new(populated_store().failing_gets()),
        config(OperationMode::Read, Duration::from_millis(100)),
    )
    .with_keys(keys())
    .run(CancellationToken::new())
    .await
    .unwrap();

    let stats = &report.stats;
    assert!(stats.total_requests() > 0);
    assert_eq!(stats.get_errors(), stats.total_gets());
    assert!(stats.get_ttfb.is_empty());
    assert_eq!(stats.bytes_downloaded(), 0);
    assert!(report.results.iter().all(|r| r.ttfb.is_none()));
    assert_consistent(&report);
}

#[tokio::test]
async fn truncated_bodies_keep_their_measurements() {
    let report = Stresstest::new(
        Arc::new(populated_store().truncating_bodies()),
        config(OperationMode::Read, Duration::from_millis(100)),
    )
    .with_keys(keys())
    .run(CancellationToken::new())
    .await
    .unwrap();

    assert!(!report.results.is_empty());
    for result in &report.results {
        assert!(result.ttfb.is_some());
        assert!(result.ttlb.is_some());
        assert_eq!(result.bytes_downloaded, 500);
        let error = result.error.as_deref().unwrap();
        assert!(error.starts_with("body read error:"), "{error}");
    }

    // Failed operations contribute no samples.
    assert_eq!(report.stats.total_errors(), report.stats.total_requests());
    assert!(report.stats.get_ttlb.is_empty());
}

#[tokio::test]
async fn fixed_count_records_successful_uploads() {
    stresser_test::tracing::init();

    let tempdir = tempfile::tempdir().unwrap();
    let path = tempdir.path().join("created.txt");
    let manifest = Arc::new(ManifestWriter::create(&path).await.unwrap());

    let store = ScriptedStore::new()
        .with_latency(Duration::from_millis(1))
        .failing_every_nth_put(4);
    let run_config = RunConfig {
        concurrency: 3,
        file_count: Some(20),
        ..config(OperationMode::Write, Duration::from_millis(1))
    };

    let report = Stresstest::new(Arc::new(store.clone()), run_config)
        .with_manifest(Arc::clone(&manifest))
        .run(CancellationToken::new())
        .await
        .unwrap();
    manifest.close().await.unwrap();

    assert_eq!(store.puts(), 20);
    assert_eq!(report.stats.total_puts(), 20);
    assert_eq!(report.stats.put_errors(), 5);
    assert_eq!(report.stats.put_ttlb.count(), 15);

    let mut recorded = manifest::load_manifest(&path).await.unwrap();
    let mut uploaded: Vec<_> = report
        .results
        .iter()
        .filter(|result| result.is_success())
        .map(|result| result.key.clone())
        .collect();
    recorded.sort();
    uploaded.sort();
    assert_eq!(recorded, uploaded);
    assert!(recorded.iter().all(|key| key.starts_with("stresser/job")));
}

#[tokio::test]
async fn operations_completing_after_the_deadline_are_discarded() {
    let store = ScriptedStore::new().with_latency(Duration::from_millis(300));

    let started = Instant::now();
    let report = Stresstest::new(
        Arc::new(store.clone()),
        config(OperationMode::Write, Duration::from_millis(50)),
    )
    .run(CancellationToken::new())
    .await
    .unwrap();

    // Every worker started exactly one upload and waited for it to finish.
    assert_eq!(store.puts(), 4);
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(report.results.is_empty());
    assert_eq!(report.stats.total_requests(), 0);
}
