//! Aggregation of operation results into run statistics.
//!
//! A [`StatsCollector`] is fed every [`OpResult`] of a run by a single consumer. Once the run is
//! over, [`StatsCollector::finalize`] consumes it and derives the latency distributions, which
//! makes a second finalization impossible.

use std::time::Duration;

use crate::executor::{OpResult, Operation};

/// Collects results while the run is in progress.
#[derive(Debug, Default)]
pub struct StatsCollector {
    counters: Counters,
    get_ttfb: Vec<Duration>,
    get_ttlb: Vec<Duration>,
    put_ttlb: Vec<Duration>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Counters {
    gets: u64,
    puts: u64,
    get_errors: u64,
    put_errors: u64,
    bytes_downloaded: u64,
    bytes_uploaded: u64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accounts for a single result.
    ///
    /// Failed operations are counted but contribute neither bytes nor latency samples.
    pub fn add(&mut self, result: &OpResult) {
        let failed = !result.is_success();

        match result.operation {
            Operation::Get => {
                self.counters.gets += 1;
                if failed {
                    self.counters.get_errors += 1;
                    return;
                }

                self.counters.bytes_downloaded += result.bytes_downloaded;
                self.get_ttfb.extend(result.ttfb);
                self.get_ttlb.extend(result.ttlb);
            }
            Operation::Put => {
                self.counters.puts += 1;
                if failed {
                    self.counters.put_errors += 1;
                    return;
                }

                self.counters.bytes_uploaded += result.bytes_uploaded;
                self.put_ttlb.extend(result.ttlb);
            }
        }
    }

    /// Returns the number of results added so far.
    pub fn total_requests(&self) -> u64 {
        self.counters.gets + self.counters.puts
    }

    /// Freezes the collected data into [`RunStats`].
    ///
    /// `elapsed` is the measured wall-clock duration of the run.
    pub fn finalize(self, elapsed: Duration, concurrency: usize) -> RunStats {
        RunStats {
            counters: self.counters,
            get_ttfb: LatencyStats::from_samples(self.get_ttfb),
            get_ttlb: LatencyStats::from_samples(self.get_ttlb),
            put_ttlb: LatencyStats::from_samples(self.put_ttlb),
            elapsed,
            concurrency,
        }
    }
}

/// Averages `samples` in nanoseconds.
fn mean(samples: &[Duration]) -> Duration {
    const NANOS_PER_SEC: u128 = 1_000_000_000;

    if samples.is_empty() {
        return Duration::ZERO;
    }

    let total: u128 = samples.iter().map(Duration::as_nanos).sum();
    let nanos = total / samples.len() as u128;
    // The mean never exceeds the largest sample, so the seconds fit.
    Duration::new(
        (nanos / NANOS_PER_SEC) as u64,
        (nanos % NANOS_PER_SEC) as u32,
    )
}

/// A finalized latency distribution.
///
/// All figures are zero if there are no samples.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LatencyStats {
    samples: Vec<Duration>,
    pub min: Duration,
    pub avg: Duration,
    pub p50: Duration,
    pub p90: Duration,
    pub p99: Duration,
    pub max: Duration,
}

impl LatencyStats {
    /// Sorts `samples` and derives the distribution figures from them.
    pub fn from_samples(mut samples: Vec<Duration>) -> Self {
        samples.sort_unstable();

        let (Some(&min), Some(&max)) = (samples.first(), samples.last()) else {
            return Self::default();
        };

        let avg = mean(&samples);

        Self {
            min,
            avg,
            p50: percentile(&samples, 50),
            p90: percentile(&samples, 90),
            p99: percentile(&samples, 99),
            max,
            samples,
        }
    }

    /// The number of samples in this distribution.
    pub fn count(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if no samples were recorded.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The samples in ascending order.
    pub fn samples(&self) -> &[Duration] {
        &self.samples
    }
}

/// Nearest-rank percentile of an ascending sample set, without interpolation.
///
/// A single sample is every percentile. With two samples, P50 and below is the lower sample and
/// anything above the higher one. Larger sets use index `p * n / 100`, clamped to the last sample.
pub fn percentile(sorted: &[Duration], p: usize) -> Duration {
    match sorted {
        [] => Duration::ZERO,
        [only] => *only,
        [low, high] => {
            if p <= 50 {
                *low
            } else {
                *high
            }
        }
        _ => {
            let index = (p * sorted.len() / 100).min(sorted.len() - 1);
            sorted[index]
        }
    }
}

/// The immutable statistics of a finished run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunStats {
    counters: Counters,
    /// GET time to first byte.
    pub get_ttfb: LatencyStats,
    /// GET time to last byte.
    pub get_ttlb: LatencyStats,
    /// PUT duration.
    pub put_ttlb: LatencyStats,
    /// Measured wall-clock duration of the run.
    pub elapsed: Duration,
    pub concurrency: usize,
}

impl RunStats {
    pub fn total_requests(&self) -> u64 {
        self.counters.gets + self.counters.puts
    }

    pub fn total_gets(&self) -> u64 {
        self.counters.gets
    }

    pub fn total_puts(&self) -> u64 {
        self.counters.puts
    }

    pub fn total_errors(&self) -> u64 {
        self.counters.get_errors + self.counters.put_errors
    }

    pub fn total_successes(&self) -> u64 {
        self.total_requests() - self.total_errors()
    }

    pub fn get_errors(&self) -> u64 {
        self.counters.get_errors
    }

    pub fn put_errors(&self) -> u64 {
        self.counters.put_errors
    }

    pub fn successful_gets(&self) -> u64 {
        self.counters.gets - self.counters.get_errors
    }

    pub fn successful_puts(&self) -> u64 {
        self.counters.puts - self.counters.put_errors
    }

    /// Bytes received by successful GETs.
    pub fn bytes_downloaded(&self) -> u64 {
        self.counters.bytes_downloaded
    }

    /// Bytes sent by successful PUTs.
    pub fn bytes_uploaded(&self) -> u64 {
        self.counters.bytes_uploaded
    }

    /// Requests per second over the whole run.
    pub fn request_rate(&self) -> f64 {
        self.per_second(self.total_requests())
    }

    /// Download throughput in bytes per second.
    pub fn download_throughput(&self) -> f64 {
        self.per_second(self.counters.bytes_downloaded)
    }

    /// Upload throughput in bytes per second.
    pub fn upload_throughput(&self) -> f64 {
        self.per_second(self.counters.bytes_uploaded)
    }

    /// Mean size of successfully uploaded objects, if any.
    pub fn average_put_size(&self) -> Option<u64> {
        self.counters
            .bytes_uploaded
            .checked_div(self.successful_puts())
    }

    fn per_second(&self, value: u64) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds > 0.0 {
            value as f64 / seconds
        } else {
            0.0
        }
    }
}
