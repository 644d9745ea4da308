//! `tracing` subscriber initialization.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber writing to stderr, honoring `RUST_LOG` and falling back to
/// `level` when the environment variable is unset or unparsable.
///
/// Safe to call more than once; later calls are no-ops (a global subscriber can only be set once
/// per process).
pub fn init_logger(level: tracing::Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let format = time::macros::format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    );
    let timer = tracing_subscriber::fmt::time::UtcTime::new(format);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(timer)
        .with_target(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init();
}
