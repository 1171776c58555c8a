use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

/// Crates whose events tests want to see, at full verbosity.
const VERBOSE_CRATES: &[&str] = &["stresser", "stresser_test"];

/// Installs a subscriber that writes to the test runner's captured output.
///
/// `RUST_LOG` is honored when set. Otherwise dependencies log at `WARN` and the stresser crates
/// log everything. Calling this more than once is harmless.
pub fn init() {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.is_empty() => EnvFilter::new(directives),
        _ => VERBOSE_CRATES
            .iter()
            .filter_map(|name| format!("{name}=trace").parse::<Directive>().ok())
            .fold(EnvFilter::default().add_directive(LevelFilter::WARN.into()), |filter, directive| {
                filter.add_directive(directive)
            }),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .without_time()
        .compact()
        .try_init();
}
