use tracing_subscriber::EnvFilter;

/// Installs the global fmt subscriber writing to stderr. `RUST_LOG` wins over
/// `default_level`. Returns `false` when a subscriber was already installed.
pub fn init(default_level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
