//! Ambient structured logging (§10.1).
//!
//! One idempotent initializer installs an `EnvFilter`-driven `tracing_subscriber`
//! layer; call sites elsewhere use `tracing::{debug,info,warn,error}!` with
//! structured fields directly rather than going through a bespoke logging
//! facade. `RUST_LOG` (or `SANDTRAP_LOG` as a fallback) controls verbosity.

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs the global subscriber. Safe to call more than once per process —
/// later calls are no-ops — so test fixtures that each spin up a guest can
/// call it unconditionally.
pub fn init_logging() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
            .or_else(|_| tracing_subscriber::EnvFilter::try_from_env("SANDTRAP_LOG"))
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .finish();

        // A subscriber may already be installed by the embedding process;
        // that is not a failure condition for a library-initiated call.
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging();
        init_logging();
        tracing::info!("second init did not panic");
    }
}
