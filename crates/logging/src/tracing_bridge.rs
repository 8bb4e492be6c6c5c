//! crates/logging/src/tracing_bridge.rs
//! Installs the process-wide tracing subscriber.
//!
//! The filter comes from `RUST_LOG` when it is set and parses, otherwise from
//! [`Verbosity::directives`]. Output goes to standard error so standard
//! output stays free for results.
//!
//! # Usage
//!
//! ```rust,ignore
//! use logging::{Verbosity, init_tracing};
//!
//! init_tracing(Verbosity::from_flags(1, false));
//! tracing::debug!(target: "session::monitor", "subscribed");
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use super::verbosity::Verbosity;

/// Builds the filter for `verbosity`, letting `RUST_LOG` override it.
#[must_use]
pub fn env_filter(verbosity: Verbosity) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.directives()))
}

/// Installs a formatting subscriber filtered by `verbosity`.
///
/// Returns `false` when a global subscriber was already installed; the
/// existing one is kept.
pub fn init_tracing(verbosity: Verbosity) -> bool {
    tracing_subscriber::registry()
        .with(env_filter(verbosity))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbosity >= Verbosity::Debug),
        )
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_keeps_the_first_subscriber() {
        // Another test in this binary may already have installed it.
        init_tracing(Verbosity::Quiet);
        assert!(tracing::dispatcher::has_been_set());
        assert!(!init_tracing(Verbosity::Trace));
    }

    #[test]
    fn directives_parse_as_filter() {
        for verbosity in [
            Verbosity::Quiet,
            Verbosity::Normal,
            Verbosity::Verbose,
            Verbosity::Debug,
            Verbosity::Trace,
        ] {
            assert!(
                EnvFilter::try_new(verbosity.directives()).is_ok(),
                "{verbosity} directives rejected"
            );
        }
    }
}
