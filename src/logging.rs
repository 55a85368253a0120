use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor the config supplies one.
pub const DEFAULT_FILTER: &str = "info";

/// Builds the event filter: `RUST_LOG` wins, then `level`, then the default.
pub fn env_filter(level: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.unwrap_or(DEFAULT_FILTER)))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the stderr subscriber. Stdout stays reserved for conversion output.
pub fn init_logging(level: Option<&str>) {
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true);

    // A subscriber may already be installed (tests, embedding); keep it.
    let _ = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(console)
        .try_init();
}
