//! Structured logging using **tracing**.
//!
//! The library only emits events: `debug!` per artifact and unit, `info!`
//! for aggregate totals, `warn!` for cleanup problems. Installing a
//! subscriber is left to the binary through [`init_logging`].

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "warn";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initializes the global tracing subscriber, writing to stderr.
///
/// `json` selects machine-readable JSON lines; otherwise a compact
/// human-readable format is used. Calling this more than once is harmless:
/// later calls leave the first subscriber in place.
///
/// # Environment Variables
/// - `RUST_LOG`: Controls log filtering (e.g., `RUST_LOG=dexmember_core=debug`)
pub fn init_logging(json: bool) {
    let result = if json {
        tracing_subscriber::fmt()
            .json()
            .with_ansi(false)
            .with_level(true)
            .with_target(true)
            .with_current_span(true)
            .with_env_filter(env_filter())
            .with_writer(std::io::stderr)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .compact()
            .with_target(false)
            .with_env_filter(env_filter())
            .with_writer(std::io::stderr)
            .try_init()
    };
    if let Err(e) = result {
        tracing::debug!(error = %e, "tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init_logging(false);
        init_logging(true);
        tracing::info!(event = "test", "logging initialized");
    }
}
