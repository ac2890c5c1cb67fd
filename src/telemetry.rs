//! Logging initialization.
//!
//! Controlled by two environment variables:
//! - `RUST_LOG` — standard `EnvFilter` directives (default `info`)
//! - `VC_LOG_FORMAT` — `"json"` for JSON events to stderr, anything else
//!   (or unset) for the compact human format
//!
//! Call [`init`] once from the embedding executor. Re-initialization is a
//! no-op, so library tests can call it freely.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Install the global tracing subscriber. Safe to call more than once.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("VC_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let result = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    // Another subscriber (the embedding executor's, or a second test) won
    // the race; theirs stands.
    if let Err(err) = result {
        tracing::debug!("telemetry already initialized: {err}");
    }
}
