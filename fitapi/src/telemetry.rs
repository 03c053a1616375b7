//! Tracing initialisation.
//!
//! Log output goes to stdout through the `tracing-subscriber` fmt layer. Verbosity follows
//! `RUST_LOG` (for example `RUST_LOG=fitapi=debug,tower_http=info`) and defaults to `info`.

use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. Fails if one is already installed.
pub fn init_telemetry() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    info!("Telemetry initialized");
    Ok(())
}
