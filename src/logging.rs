//! Diagnostic logging.
//!
//! Log lines go to stderr so command output on stdout stays pipeable.
//! The filter is read from `RAGFUSE_LOG` (e.g. `RAGFUSE_LOG=ragfuse_core=debug`)
//! and defaults to `info`.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

pub const LOG_ENV: &str = "RAGFUSE_LOG";

/// Install the global subscriber. Later calls are no-ops.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init();
    });
}
