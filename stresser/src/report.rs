//! Rendering of run results: a console summary and a per-operation CSV log.

use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use bytesize::ByteSize;
use yansi::Paint;

use crate::executor::OpResult;
use crate::stats::{LatencyStats, RunStats};

const CSV_HEADER: [&str; 8] = [
    "Timestamp",
    "Operation",
    "ObjectKey",
    "TTFB(ms)",
    "TTLB(ms)",
    "BytesDownloaded",
    "BytesUploaded",
    "Error",
];

/// Prints a human readable summary of `stats`.
pub fn print_summary(stats: &RunStats, out: &mut impl Write) -> io::Result<()> {
    writeln!(out)?;
    writeln!(
        out,
        "{} ({:.2?})",
        "## Stress Test Summary".bold(),
        stats.elapsed
    )?;
    writeln!(out, "  Concurrency:    {}", stats.concurrency)?;
    writeln!(
        out,
        "  Total Requests: {} ({:.2} req/s)",
        stats.total_requests().bold(),
        stats.request_rate()
    )?;
    writeln!(out, "  Total Success:  {}", stats.total_successes().green())?;
    writeln!(out, "  Total Errors:   {}", errors(stats.total_errors()))?;

    writeln!(out)?;
    writeln!(
        out,
        "{} ({} total)",
        "## GET".bold().blue(),
        stats.total_gets()
    )?;
    writeln!(out, "  Success:        {}", stats.successful_gets())?;
    writeln!(out, "  Errors:         {}", errors(stats.get_errors()))?;
    writeln!(
        out,
        "  Downloaded:     {}",
        ByteSize::b(stats.bytes_downloaded())
    )?;
    writeln!(
        out,
        "  Throughput:     {}/s",
        ByteSize::b(stats.download_throughput() as u64)
    )?;
    if stats.get_ttfb.is_empty() {
        writeln!(out, "  No successful GETs to calculate latency.")?;
    } else {
        latency_header(out)?;
        latency_row(out, "TTFB (proxy)", &stats.get_ttfb)?;
        latency_row(out, "TTLB (body)", &stats.get_ttlb)?;
    }

    writeln!(out)?;
    writeln!(
        out,
        "{} ({} total)",
        "## PUT".bold().blue(),
        stats.total_puts()
    )?;
    writeln!(out, "  Success:        {}", stats.successful_puts())?;
    writeln!(out, "  Errors:         {}", errors(stats.put_errors()))?;
    writeln!(
        out,
        "  Uploaded:       {}",
        ByteSize::b(stats.bytes_uploaded())
    )?;
    if let Some(size) = stats.average_put_size() {
        writeln!(out, "  Object Size:    {}", ByteSize::b(size))?;
    }
    writeln!(
        out,
        "  Throughput:     {}/s",
        ByteSize::b(stats.upload_throughput() as u64)
    )?;
    if stats.put_ttlb.is_empty() {
        writeln!(out, "  No successful PUTs to calculate latency.")?;
    } else {
        latency_header(out)?;
        latency_row(out, "TTLB (total)", &stats.put_ttlb)?;
    }

    Ok(())
}

fn errors(count: u64) -> String {
    if count > 0 {
        count.red().bold().to_string()
    } else {
        count.to_string()
    }
}

fn latency_header(out: &mut impl Write) -> io::Result<()> {
    writeln!(
        out,
        "  {:<13} | {:>8} | {:>8} | {:>8} | {:>8} | {:>8} | {:>8}",
        "Latency (ms)", "Min", "Avg", "P50", "P90", "P99", "Max"
    )
}

fn latency_row(out: &mut impl Write, label: &str, latency: &LatencyStats) -> io::Result<()> {
    let figures = [
        latency.min,
        latency.avg,
        latency.p50,
        latency.p90,
        latency.p99,
        latency.max,
    ];

    write!(out, "  {label:<13}")?;
    for figure in figures {
        write!(out, " | {:>8.2}", millis(figure))?;
    }
    writeln!(out)
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

fn millis_field(duration: Option<Duration>) -> String {
    format!("{:.3}", duration.map(millis).unwrap_or_default())
}

/// Writes one CSV row per result to `path`, replacing the file if it exists.
pub fn write_results_csv(results: &[OpResult], path: &Path) -> Result<(), csv::Error> {
    let file = std::fs::File::create(path)?;
    write_results(results, file)?;
    tracing::info!(path = %path.display(), rows = results.len(), "wrote results");
    Ok(())
}

/// Writes one CSV row per result to `out`.
///
/// Unmeasured timings are written as `0.000`.
pub fn write_results(results: &[OpResult], out: impl Write) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(CSV_HEADER)?;

    for result in results {
        writer.write_record([
            humantime::format_rfc3339_nanos(result.timestamp).to_string(),
            result.operation.to_string(),
            result.key.clone(),
            millis_field(result.ttfb),
            millis_field(result.ttlb),
            result.bytes_downloaded.to_string(),
            result.bytes_uploaded.to_string(),
            result.error.clone().unwrap_or_default(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}
