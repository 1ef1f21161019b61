//! Structured logging bootstrap. A thin wrapper so both the CLI and integration tests initialize
//! tracing the same way, instead of duplicating the subscriber setup at each call site.

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::FmtSubscriber;

/// Installs a global `tracing` subscriber reading `RUST_LOG` (defaulting to info-level if unset).
/// Safe to call more than once; later calls are no-ops since a global subscriber can only be set
/// once per process.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::TRACE)
        .with_env_filter(filter)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
