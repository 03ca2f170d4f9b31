//! JSON logs on stdout.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor `DIRSYNC_LOG` is set.
pub const DEFAULT_LOG_FILTER: &str = "info,dirsync=debug";

/// `RUST_LOG` if set and valid, otherwise `configured`.
fn resolve_filter(configured: &str) -> Result<EnvFilter, tracing_subscriber::filter::ParseError> {
    EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(configured))
}

/// Install the global subscriber. Exits the process on an unparsable filter.
pub fn init_logging(configured: &str) {
    let filter = match resolve_filter(configured) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error: invalid log filter '{configured}': {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_target(true),
        )
        .with(filter)
        .init();

    tracing::debug!(filter = %configured, "Logging initialized");
}

/// Plain output captured by the test harness. Safe to call more than once.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new(DEFAULT_LOG_FILTER))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }

    #[test]
    fn test_init_test_logging_twice() {
        init_test_logging();
        init_test_logging();
    }
}
