//! Diagnostic logging setup
//!
//! Diagnostics go to stderr through `tracing`; stdout stays reserved for the
//! reports the commands print.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a tracing filter, e.g. `modsync=debug`
pub const LOG_ENV: &str = "MODSYNC_LOG";

/// Install the global subscriber
///
/// `MODSYNC_LOG` wins over `default_level`. Calling this twice is harmless;
/// the second call leaves the first subscriber in place.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}
