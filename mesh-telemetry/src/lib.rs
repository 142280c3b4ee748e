//! Structured logging bootstrap.

#![warn(missing_docs, clippy::pedantic)]

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs the process-wide tracing subscriber.
///
/// The filter comes from `RUST_LOG`, defaulting to `info`. `json` switches
/// the fmt layer to line-delimited JSON for log shippers. Calling this
/// twice is harmless; the second call is a no-op.
pub fn init(json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init(false);
        init(true);
        tracing::info!("telemetry initialized");
    }
}
