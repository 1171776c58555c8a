use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use argh::FromArgs;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

use crate::config::{Config, OperationMode, Overrides};
use crate::{observability, report, stresstest};

/// Object store stress tester.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunCommand),
    Version(VersionCommand),
}

/// run a stress test against the configured object store
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "run")]
struct RunCommand {
    /// file with object keys to read, one per line; receives created keys in 'write' mode
    #[argh(positional)]
    manifest: Option<PathBuf>,

    /// how long to issue operations, e.g. 30s, 5m or 1h
    #[argh(option, short = 'd')]
    duration: Option<String>,

    /// number of concurrent workers
    #[argh(option, short = 'n')]
    concurrency: Option<usize>,

    /// pick manifest keys at random instead of sequentially
    #[argh(switch, short = 'r')]
    randomize: bool,

    /// operation type: 'read', 'write' or 'mixed'
    #[argh(option)]
    op: Option<OperationMode>,

    /// size of uploaded objects, e.g. 64KiB or 1MiB
    #[argh(option)]
    put_size: Option<String>,

    /// upload exactly this many objects in 'write' mode, ignoring the duration
    #[argh(option)]
    files: Option<usize>,

    /// do not record created keys in the manifest in 'write' mode
    #[argh(switch)]
    no_manifest: bool,

    /// path of the CSV file receiving one row per operation
    #[argh(option, short = 'o')]
    output: Option<PathBuf>,

    /// log level: error, warn, info, debug or trace
    #[argh(option)]
    log_level: Option<String>,
}

impl RunCommand {
    fn overrides(self) -> Overrides {
        Overrides {
            duration: self.duration,
            concurrency: self.concurrency,
            operation: self.op,
            randomize: self.randomize.then_some(true),
            put_object_size: self.put_size,
            file_count: self.files,
            generate_manifest: self.no_manifest.then_some(false),
            manifest: self.manifest,
            output: self.output,
            log_level: self.log_level,
        }
    }
}

/// print the stresser version
#[derive(Default, Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    let command = match args.command {
        Command::Version(VersionCommand {}) => {
            println!("stresser {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Command::Run(command) => command,
    };

    let config = Config::load(args.config.as_deref(), &command.overrides())?;

    observability::init_tracing(&config.logging);
    tracing::debug!(?config);

    if !std::io::stdout().is_terminal() {
        yansi::disable();
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("stresser-rt")
        .enable_all()
        .build()?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let bar = ProgressBar::new_spinner()
        .with_style(ProgressStyle::with_template("{spinner} {msg} {elapsed}")?)
        .with_message(format!("Running {} stress test:", config.operation));
    bar.enable_steady_tick(Duration::from_millis(100));

    let result = stresstest::run(&config, cancel).await;
    bar.finish_and_clear();
    let report = result.context("stress test failed")?;

    report::print_summary(&report.stats, &mut std::io::stdout().lock())?;

    if report.results.is_empty() {
        tracing::warn!("no results collected, skipping CSV output");
    } else {
        report::write_results_csv(&report.results, &config.output).with_context(|| {
            format!("failed to write results to {}", config.output.display())
        })?;
        println!("Detailed results written to {}", config.output.display());
    }

    Ok(())
}

/// Cancels `cancel` on SIGINT or SIGTERM.
async fn cancel_on_signal(cancel: CancellationToken) {
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                tracing::warn!(
                    error = &error as &dyn std::error::Error,
                    "failed to install SIGTERM handler"
                );
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate => {}
        _ = cancel.cancelled() => return,
    }

    tracing::info!("received shutdown signal, stopping workers");
    cancel.cancel();
}
