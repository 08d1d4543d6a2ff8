//! table-bridge: a framed-JSON table processing bridge
//!
//! Accepts a TCP connection, reads one length-prefixed JSON payload
//! (array-of-records orientation, modified UTF-8 on the wire), converts it
//! into a table, runs it through a processor selected by name at startup,
//! and writes the resulting table back with the identical framing.
//!
//! Features:
//! - Wire-compatible with Java's `DataOutputStream.writeUTF` framing
//! - Name-addressed processor registry (`identity`, `reverse`)
//! - Single-shot or persistent serving, selected by configuration
//! - Configuration via CLI arguments or TOML file

mod config;
mod frame;
mod processors;
mod server;
mod table;

use config::Config;
use server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        processor = %config.processor,
        mode = ?config.mode,
        timeout_secs = config.timeout_secs,
        "Starting table-bridge server"
    );

    // Resolution failure is fatal here, before the listener binds, so a
    // missing processor never degrades to pass-through
    let processor = processors::resolve(&config.processor)?;

    Server::new(config, processor).run().await?;
    Ok(())
}
