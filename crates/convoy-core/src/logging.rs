use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "CONVOY_LOG";
const DEFAULT_DIRECTIVE: &str = "convoy_core=info";

/// Filter from `CONVOY_LOG`, then `RUST_LOG`, then `convoy_core=info`.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Installs a global fmt subscriber. Returns `false` when one is already set.
pub fn init_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}
