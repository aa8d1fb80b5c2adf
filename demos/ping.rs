//! Ping a JMRI JSON server and log the reply.
//!
//! Set `JMRI_HOST` / `JMRI_PORT` to point at a server other than `localhost:12090`.
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=info cargo run --example ping --features tracing
//! ```

use std::time::Duration;

use jmri_ws_client::commands::{self, Command};
use jmri_ws_client::error::Error;
use jmri_ws_client::ws::config::{Config, DEFAULT_PORT, Target};
use jmri_ws_client::ws::{ConnectionManager, Inbound, Payload, Transport as _};
use tokio::time::sleep;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let host = std::env::var("JMRI_HOST").unwrap_or_else(|_| "localhost".to_owned());
    let port = match std::env::var("JMRI_PORT") {
        Ok(port) => port.parse()?,
        Err(_) => DEFAULT_PORT,
    };
    let target = Target::builder().host(host).port(port).build();

    let manager = ConnectionManager::new(&target, Config::default())?;
    info!(url = %manager.url(), "Starting JMRI ping example");

    manager.on_message(Box::new(|message: Inbound| {
        if message.message_type() == Some("pong") {
            info!("Received pong response from server");
        } else {
            info!(?message, "Received message from JMRI");
        }
    }));

    let sender = manager.sender();
    manager.on_connect(Box::new(move || {
        info!("Connected to JMRI WebSocket server");

        let ping = Command::ping();
        if let Ok(payload) = Payload::serialize(&ping)
            && sender.send(payload)
        {
            info!(?ping, "Sent ping command");
        }
        if let Ok(text) = commands::ping_json() {
            info!(%text, "JSON text of the ping command");
        }
    }));

    manager.on_disconnect(Box::new(|| info!("Disconnected from JMRI WebSocket server")));
    manager.on_error(Box::new(|e: &Error| {
        warn!(error = %e, "JMRI WebSocket connection error");
    }));

    if let Err(e) = manager.connect().await {
        error!(error = %e, "Failed to connect to JMRI WebSocket server");
        return Err(e.into());
    }
    info!("Successfully connected to JMRI WebSocket server");

    sleep(Duration::from_secs(10)).await;
    info!("Disconnecting after 10 seconds");
    manager.disconnect();

    Ok(())
}
