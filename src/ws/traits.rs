//! Core traits for the WebSocket transport layer.

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use super::handlers::{ConnectHandler, DisconnectHandler, ErrorHandler, MessageHandler};
use super::payload::Payload;
use super::socket::Socket;
use crate::Result;

/// Capability contract shared by the real connection manager and test doubles.
///
/// Consumers should hold an `Arc<dyn Transport>` so that the concrete connection can
/// be swapped without touching application logic.
///
/// # Example
///
/// ```ignore
/// let transport: Arc<dyn Transport> = Arc::new(ConnectionManager::new(&Target::default(), Config::default())?);
/// transport.on_message(Box::new(|message| println!("{message:?}")));
/// transport.connect().await?;
/// transport.send_serialized(&Command::ping());
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the connection.
    ///
    /// Resolves once the connection is open, or immediately if it already is. Fails
    /// with the underlying transport error if the attempt fails before opening; the
    /// error handler is invoked first.
    async fn connect(&self) -> Result<()>;

    /// Close the connection and cancel any pending reconnect.
    ///
    /// Safe to call repeatedly or before ever connecting.
    fn disconnect(&self);

    /// Hand a payload to the transport.
    ///
    /// Returns `false` when not connected. `true` means the payload was handed off,
    /// not that it was delivered.
    fn send(&self, payload: Payload) -> bool;

    /// Replace the message handler.
    fn on_message(&self, handler: MessageHandler);

    /// Replace the connect handler.
    fn on_connect(&self, handler: ConnectHandler);

    /// Replace the disconnect handler.
    fn on_disconnect(&self, handler: DisconnectHandler);

    /// Replace the error handler.
    fn on_error(&self, handler: ErrorHandler);

    /// Whether the transport is currently connected.
    fn is_active(&self) -> bool;
}

/// Convenience methods available on every [`Transport`], including trait objects.
pub trait TransportExt: Transport {
    /// Serialize `value` and send it. Returns `false` if serialization fails.
    fn send_serialized<T: Serialize + ?Sized>(&self, value: &T) -> bool {
        match Payload::serialize(value) {
            Ok(payload) => self.send(payload),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %e, "Unable to serialize outbound payload");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                false
            }
        }
    }
}

impl<T: Transport + ?Sized> TransportExt for T {}

/// Opens one socket per connection attempt.
///
/// The connection manager never touches the network directly; it asks a connector
/// for a [`Socket`] and drives the state machine from the socket's events. The
/// returned future resolving is the "open" event, failing is the pre-open error.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, url: &Url) -> Result<Socket>;
}
