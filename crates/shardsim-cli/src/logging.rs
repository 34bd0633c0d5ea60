use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. `level` is an `EnvFilter` directive such
/// as `info` or `shardsim_index=debug,warn`; an invalid one falls back to
/// `info`. Calling twice is a no-op.
pub fn init(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
