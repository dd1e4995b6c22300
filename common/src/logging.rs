use tracing_subscriber::{fmt, EnvFilter};

/// Installs a global `tracing` subscriber reading `RUST_LOG` (default
/// `info`), matching the teacher's `tracing` + `tracing-subscriber` pairing.
/// Safe to call more than once; subsequent calls are no-ops.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
