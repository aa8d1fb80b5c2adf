//! Core WebSocket infrastructure.
//!
//! This module provides a reconnecting connection manager behind a small capability
//! trait, so application code can be written against [`Transport`] and tested with
//! [`crate::mock::MockTransport`].
//!
//! # Architecture
//!
//! - [`Transport`]: Capability contract (connect, disconnect, send, callbacks)
//! - [`ConnectionManager`]: Production implementation with exponential-backoff reconnection
//! - [`Connector`]: Opens sockets for the manager; [`socket::TungsteniteConnector`] by default
//!
//! # Example
//!
//! ```ignore
//! let manager = ConnectionManager::new(&Target::default(), Config::default())?;
//! manager.on_connect(Box::new(|| println!("connected")));
//! manager.connect().await?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod handlers;
pub mod payload;
pub mod socket;
pub mod traits;

pub use connection::{ConnectionManager, ConnectionState, MessageSender};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use payload::{Inbound, Payload};
pub use traits::*;
