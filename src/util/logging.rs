use tracing_subscriber::{EnvFilter, fmt};

/// Initializes tracing/logging based on environment variables.
///
/// `RUST_LOG` overrides the default `info` filter. JSON output is used when
/// the web service runs behind a log collector.
pub fn init_tracing(json_output: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(false);

    if json_output {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
