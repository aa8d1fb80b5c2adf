//! Application-side consumer that drives a [`Transport`] through the contract only.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value, json};

use crate::Result;
use crate::commands::Command;
use crate::error::Error;
use crate::ws::{Inbound, Transport, TransportExt as _};

/// Human-readable connection status derived from transport events.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Status {
    #[strum(to_string = "Not connected")]
    NotConnected,
    #[strum(to_string = "Connecting to JMRI server...")]
    Connecting,
    #[strum(to_string = "Connected to JMRI server")]
    Connected,
    #[strum(to_string = "Disconnected from JMRI server")]
    Disconnected,
    #[strum(to_string = "Error connecting to JMRI server")]
    Error,
    #[strum(to_string = "Failed to connect to JMRI server")]
    ConnectFailed,
    #[strum(to_string = "Sending ping to JMRI server...")]
    SendingPing,
    #[strum(to_string = "Received pong response from JMRI server")]
    Pong,
    #[strum(to_string = "Not connected to JMRI server")]
    PingUnavailable,
}

#[derive(Debug)]
struct Shared {
    status: Mutex<Status>,
    last_message: Mutex<Option<Inbound>>,
}

impl Shared {
    fn set_status(&self, status: Status) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }
}

/// Service constructed with an injected transport.
///
/// Handlers may fire any number of times in any order; the status always reflects
/// the most recent event.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use jmri_ws_client::mock::MockTransport;
/// use jmri_ws_client::service::{Status, StatusService};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> jmri_ws_client::Result<()> {
/// let service = StatusService::new(Arc::new(MockTransport::default()));
/// service.initialize().await?;
/// assert_eq!(service.status(), Status::Connected);
/// # Ok(())
/// # }
/// ```
pub struct StatusService {
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
}

impl StatusService {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            shared: Arc::new(Shared {
                status: Mutex::new(Status::NotConnected),
                last_message: Mutex::new(None),
            }),
        }
    }

    /// Register every handler and connect.
    pub async fn initialize(&self) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        self.transport.on_message(Box::new(move |message: Inbound| {
            #[cfg(feature = "tracing")]
            tracing::debug!(?message, "Message received");

            if message.message_type() == Some("pong") {
                shared.set_status(Status::Pong);
            }
            *shared
                .last_message
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(message);
        }));

        let shared = Arc::clone(&self.shared);
        self.transport.on_connect(Box::new(move || {
            shared.set_status(Status::Connected);
        }));

        let shared = Arc::clone(&self.shared);
        self.transport.on_disconnect(Box::new(move || {
            shared.set_status(Status::Disconnected);
        }));

        let shared = Arc::clone(&self.shared);
        self.transport.on_error(Box::new(move |error: &Error| {
            #[cfg(feature = "tracing")]
            tracing::warn!(%error, "Connection error");
            #[cfg(not(feature = "tracing"))]
            let _ = error;
            shared.set_status(Status::Error);
        }));

        self.shared.set_status(Status::Connecting);
        if let Err(e) = self.transport.connect().await {
            self.shared.set_status(Status::ConnectFailed);
            return Err(e);
        }

        Ok(())
    }

    /// Send `{"command", "params", "timestamp"}`.
    pub fn send_command(&self, command: &str, params: Map<String, Value>) -> bool {
        self.transport.send_serialized(&json!({
            "command": command,
            "params": params,
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }))
    }

    /// Send a ping if connected.
    pub fn ping(&self) -> bool {
        if !self.transport.is_active() {
            self.shared.set_status(Status::PingUnavailable);
            return false;
        }

        self.shared.set_status(Status::SendingPing);
        self.transport.send_serialized(&Command::ping())
    }

    #[must_use]
    pub fn status(&self) -> Status {
        *self
            .shared
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Most recent inbound message, if any.
    #[must_use]
    pub fn last_message(&self) -> Option<Inbound> {
        self.shared
            .last_message
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport.is_active()
    }

    /// Disconnect the transport.
    pub fn cleanup(&self) {
        self.transport.disconnect();
    }
}
