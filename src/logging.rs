//! Subscriber setup for binaries. The library itself only emits `tracing` events.

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Installs a global formatting subscriber at `INFO`, or `DEBUG` to include every request
/// sent to DynamoDB.
pub fn init_logging(debug: bool) -> Result<()> {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_line_number(true)
        .with_file(true)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
