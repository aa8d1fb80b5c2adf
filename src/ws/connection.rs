#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt as _;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use url::Url;

use super::config::{Config, Target};
use super::error::WsError;
use super::handlers::{ConnectHandler, DisconnectHandler, ErrorHandler, Handlers, MessageHandler};
use super::payload::{Inbound, Payload};
use super::socket::{Socket, SocketEvent, TungsteniteConnector};
use super::traits::{Connector, Transport};
use crate::Result;
use crate::error::Error;

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Successfully connected
    Connected,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Manages a single WebSocket connection: connect/disconnect, callbacks, and
/// reconnection with exponential backoff after unsolicited closures.
///
/// - An unsolicited closure fires the disconnect handler and schedules a retry after
///   `initial_backoff * 2^attempt` (capped), up to `max_attempts`
/// - A successful open resets the attempt counter and cancels any pending retry
/// - A failed attempt during a reconnect cycle schedules the next retry, even when
///   it was a manual [`Transport::connect`] that a retry joined
/// - [`Transport::disconnect`] cancels any pending retry and never triggers one
///
/// Dropping the manager cancels the pending retry and closes the socket.
///
/// # Type Parameters
///
/// - `C`: [`Connector`] used to open sockets, [`TungsteniteConnector`] by default
///
/// # Example
///
/// ```rust, no_run
/// use jmri_ws_client::ws::config::{Config, Target};
/// use jmri_ws_client::ws::{ConnectionManager, Transport as _, TransportExt as _};
/// use jmri_ws_client::commands::Command;
///
/// # async fn run() -> jmri_ws_client::Result<()> {
/// let manager = ConnectionManager::new(&Target::default(), Config::default())?;
/// manager.on_message(Box::new(|message| println!("received {message:?}")));
///
/// manager.connect().await?;
/// manager.send_serialized(&Command::ping());
/// # Ok(())
/// # }
/// ```
pub struct ConnectionManager<C: Connector = TungsteniteConnector> {
    inner: Arc<Inner<C>>,
}

struct Inner<C> {
    url: Url,
    config: Config,
    connector: C,
    handlers: Handlers,
    /// Current state; written only while `core` is locked
    state_tx: watch::Sender<ConnectionState>,
    core: Mutex<Core>,
}

#[derive(Default)]
struct Core {
    /// Reconnection attempts since the last successful open
    attempts: u32,
    /// A reconnect cycle is under way: set when a retry is scheduled, cleared on
    /// open, on give-up and on explicit disconnect
    retrying: bool,
    /// Bumped by every new attempt and every explicit disconnect. Events from a
    /// socket whose generation is stale are ignored.
    generation: u64,
    /// Outbound half of the open socket
    outbound: Option<mpsc::UnboundedSender<String>>,
    /// Task that opens the socket and then reads from it
    task: Option<JoinHandle<()>>,
    /// Pending reconnect timer
    reconnect: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Create a manager for `target` using the `tokio-tungstenite` connector.
    ///
    /// No connection is made until [`Transport::connect`] is called.
    pub fn new(target: &Target, config: Config) -> Result<Self> {
        Self::with_connector(target, config, TungsteniteConnector)
    }
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager for `target` that opens sockets through `connector`.
    pub fn with_connector(target: &Target, config: Config, connector: C) -> Result<Self> {
        let url = target.url()?;
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Ok(Self {
            inner: Arc::new(Inner {
                url,
                config,
                connector,
                handlers: Handlers::default(),
                state_tx,
                core: Mutex::new(Core::default()),
            }),
        })
    }

    /// Endpoint URL composed from the target.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Reconnection attempts made since the last successful open.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.lock().attempts
    }

    /// Whether a reconnect timer is currently pending.
    #[must_use]
    pub fn reconnect_pending(&self) -> bool {
        self.inner.lock().reconnect.is_some()
    }

    /// Replace the handler fired when the reconnect policy gives up.
    ///
    /// After it fires the manager stays disconnected until the next explicit
    /// [`Transport::connect`].
    pub fn on_reconnect_exhausted(&self, handler: ConnectHandler) {
        self.inner.handlers.set_exhausted(handler);
    }

    /// A handle that can send through this manager without keeping it alive.
    ///
    /// Useful inside handlers, which would otherwise need a reference to the manager
    /// that owns them.
    #[must_use]
    pub fn sender(&self) -> MessageSender<C> {
        MessageSender {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

#[async_trait]
impl<C: Connector> Transport for ConnectionManager<C> {
    async fn connect(&self) -> Result<()> {
        self.inner.connect().await
    }

    fn disconnect(&self) {
        self.inner.disconnect(true);
    }

    fn send(&self, payload: Payload) -> bool {
        self.inner.send(&payload)
    }

    fn on_message(&self, handler: MessageHandler) {
        self.inner.handlers.set_message(handler);
    }

    fn on_connect(&self, handler: ConnectHandler) {
        self.inner.handlers.set_connect(handler);
    }

    fn on_disconnect(&self, handler: DisconnectHandler) {
        self.inner.handlers.set_disconnect(handler);
    }

    fn on_error(&self, handler: ErrorHandler) {
        self.inner.handlers.set_error(handler);
    }

    fn is_active(&self) -> bool {
        self.inner.state().is_connected()
    }
}

impl<C: Connector> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        self.inner.disconnect(false);
    }
}

/// Weak sending handle returned by [`ConnectionManager::sender`].
pub struct MessageSender<C: Connector = TungsteniteConnector> {
    inner: Weak<Inner<C>>,
}

impl<C: Connector> Clone for MessageSender<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<C: Connector> MessageSender<C> {
    /// Send through the manager. Returns `false` if it is gone or not connected.
    #[must_use]
    pub fn send(&self, payload: Payload) -> bool {
        self.inner
            .upgrade()
            .is_some_and(|inner| inner.send(&payload))
    }
}

impl<C: Connector> Inner<C> {
    fn lock(&self) -> MutexGuard<'_, Core> {
        // Every field of `Core` is valid on its own, so a poisoned lock is still usable.
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    fn connect(self: &Arc<Self>) -> BoxFuture<'static, Result<()>> {
        let this = Arc::clone(self);

        async move {
            let reply = {
                let mut core = this.lock();
                match this.state() {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Connecting => None,
                    ConnectionState::Disconnected => {
                        core.generation = core.generation.wrapping_add(1);
                        let generation = core.generation;
                        let (reply_tx, reply_rx) = oneshot::channel();

                        this.state_tx.send_replace(ConnectionState::Connecting);
                        let task = tokio::spawn(Arc::clone(&this).run(generation, reply_tx));
                        if let Some(stale) = core.task.replace(task) {
                            stale.abort();
                        }

                        Some(reply_rx)
                    }
                }
            };

            match reply {
                Some(reply_rx) => reply_rx
                    .await
                    .unwrap_or_else(|_e| Err(WsError::Aborted.into())),
                // Another attempt is in flight: share its outcome instead of opening a
                // second socket.
                None => this.wait_for_attempt().await,
            }
        }
        .boxed()
    }

    async fn wait_for_attempt(&self) -> Result<()> {
        let mut state_rx = self.state_tx.subscribe();
        let state = *state_rx
            .wait_for(|state| *state != ConnectionState::Connecting)
            .await
            .map_err(|_e| WsError::ConnectionClosed)?;

        if state.is_connected() {
            Ok(())
        } else {
            Err(WsError::ConnectionClosed.into())
        }
    }

    /// Open a socket, then read from it until it closes.
    async fn run(self: Arc<Self>, generation: u64, reply: oneshot::Sender<Result<()>>) {
        #[cfg(feature = "tracing")]
        tracing::debug!(url = %self.url, "Opening WebSocket connection");

        let Socket {
            outbound,
            mut events,
        } = match self.connector.open(&self.url).await {
            Ok(socket) => socket,
            Err(error) => {
                self.attempt_failed(generation, error, reply);
                return;
            }
        };

        {
            let mut core = self.lock();
            if core.generation != generation {
                // Superseded while opening; dropping the socket closes it.
                return;
            }
            core.attempts = 0;
            core.retrying = false;
            // A manual connect may have won the race against a scheduled retry.
            if let Some(timer) = core.reconnect.take() {
                timer.abort();
            }
            core.outbound = Some(outbound);
            self.state_tx.send_replace(ConnectionState::Connected);
        }

        #[cfg(feature = "tracing")]
        tracing::info!(url = %self.url, "WebSocket connected");

        self.handlers.emit_connect();
        _ = reply.send(Ok(()));

        while let Some(event) = events.recv().await {
            match event {
                SocketEvent::Message(text) => {
                    if self.is_current(generation) {
                        self.handlers.emit_message(Inbound::decode(text));
                    }
                }
                SocketEvent::Error(error) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %error, "WebSocket error");

                    if self.is_current(generation) {
                        self.handlers.emit_error(&error);
                    }
                }
                SocketEvent::Closed => break,
            }
        }

        self.closed(generation);
    }

    fn attempt_failed(
        self: &Arc<Self>,
        generation: u64,
        error: Error,
        reply: oneshot::Sender<Result<()>>,
    ) {
        let reschedule = {
            let mut core = self.lock();
            if core.generation != generation {
                return;
            }
            core.outbound = None;
            core.task = None;
            self.state_tx.send_replace(ConnectionState::Disconnected);
            core.retrying && core.reconnect.is_none()
        };

        #[cfg(feature = "tracing")]
        tracing::warn!(url = %self.url, error = %error, "Unable to connect");

        self.handlers.emit_error(&error);
        _ = reply.send(Err(error));

        // Any failure during a reconnect cycle counts as another closure so the
        // backoff keeps escalating while the server stays down. This covers retries
        // and manual connects that a retry joined. Outside a cycle, failed manual
        // connects are only reported.
        if reschedule {
            self.schedule_reconnect(generation);
        }
    }

    /// Unsolicited closure of the socket belonging to `generation`.
    fn closed(self: &Arc<Self>, generation: u64) {
        {
            let mut core = self.lock();
            if core.generation != generation {
                return;
            }
            core.outbound = None;
            core.task = None;
            self.state_tx.send_replace(ConnectionState::Disconnected);
        }

        #[cfg(feature = "tracing")]
        tracing::info!(url = %self.url, "WebSocket closed by peer");

        self.handlers.emit_disconnect();
        self.schedule_reconnect(generation);
    }

    fn schedule_reconnect(self: &Arc<Self>, generation: u64) {
        let reconnect = &self.config.reconnect;
        let mut core = self.lock();

        // A handler may have disconnected or started a new attempt.
        if core.generation != generation {
            return;
        }

        if !reconnect.allows(core.attempts) {
            core.retrying = false;
            drop(core);

            #[cfg(feature = "tracing")]
            tracing::error!(max = ?reconnect.max_attempts, "Max reconnect attempts reached");

            self.handlers.emit_exhausted();
            return;
        }

        core.attempts = core.attempts.saturating_add(1);
        core.retrying = true;
        let attempt = core.attempts;
        let delay = reconnect.delay_for(attempt);

        #[cfg(feature = "tracing")]
        tracing::debug!(attempt, ?delay, "Scheduling reconnect");

        let timer = tokio::spawn(Arc::clone(self).retry(attempt, delay));
        if let Some(stale) = core.reconnect.replace(timer) {
            stale.abort();
        }
    }

    async fn retry(self: Arc<Self>, attempt: u32, delay: Duration) {
        sleep(delay).await;

        // The timer has fired; from here on `disconnect` cancels the attempt itself.
        self.lock().reconnect = None;

        #[cfg(feature = "tracing")]
        tracing::info!(
            attempt,
            max = ?self.config.reconnect.max_attempts,
            "Attempting to reconnect"
        );
        #[cfg(not(feature = "tracing"))]
        let _ = attempt;

        if let Err(e) = self.connect().await {
            #[cfg(feature = "tracing")]
            tracing::debug!(error = %e, "Reconnect attempt failed");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }
    }

    fn disconnect(&self, notify: bool) {
        let previous = {
            let mut core = self.lock();
            core.generation = core.generation.wrapping_add(1);
            core.retrying = false;
            if let Some(timer) = core.reconnect.take() {
                timer.abort();
            }
            if let Some(task) = core.task.take() {
                task.abort();
            }
            // Dropping the outbound half lets the socket close itself.
            core.outbound = None;
            self.state_tx.send_replace(ConnectionState::Disconnected)
        };

        if previous.is_connected() {
            #[cfg(feature = "tracing")]
            tracing::info!(url = %self.url, "WebSocket disconnected");

            if notify {
                self.handlers.emit_disconnect();
            }
        }
    }

    fn send(&self, payload: &Payload) -> bool {
        let core = self.lock();
        if !self.state().is_connected() {
            return false;
        }
        let Some(outbound) = core.outbound.as_ref() else {
            return false;
        };

        match payload.encode() {
            Ok(text) => outbound.send(text).is_ok(),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %e, "Unable to encode outbound payload");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                false
            }
        }
    }
}
