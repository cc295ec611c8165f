//! Development-time tracing for the agent loop.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: Progress and diagnostics on stderr. Not
//!   persisted, not part of the workspace artifacts.
//!
//! - **Worklog and call logs (`io/worklog`, `oracle`)**: Product artifacts in
//!   `.entropic/`. Always written, unaffected by the filter below.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Crate-specific filter variable; wins over `RUST_LOG`.
pub const LOG_ENV: &str = "ENTROPIC_LOG";

/// Iteration progress from this crate, warnings from everything else.
pub const DEFAULT_DIRECTIVES: &str = "warn,entropic=info";

/// Initialize the stderr subscriber.
///
/// The filter comes from `ENTROPIC_LOG`, then `RUST_LOG`, then
/// [`DEFAULT_DIRECTIVES`]. An unparsable value falls back to the default.
///
/// # Example
/// ```bash
/// ENTROPIC_LOG=entropic=debug entropic run --goal "todo CLI"
/// ```
pub fn init() {
    let directives = filter_directives(
        std::env::var(LOG_ENV).ok(),
        std::env::var("RUST_LOG").ok(),
    );
    let filter =
        EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact().with_target(false))
        .init();
}

/// First non-blank of the crate variable and `RUST_LOG`, else the default.
fn filter_directives(crate_env: Option<String>, rust_log: Option<String>) -> String {
    [crate_env, rust_log]
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DIRECTIVES.to_string())
}
