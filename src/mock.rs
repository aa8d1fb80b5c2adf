//! In-memory [`Transport`] for exercising application code without a server.
//!
//! [`MockTransport`] honors the same contract and the same asynchronous timing as
//! [`crate::ws::ConnectionManager`]: canned responses arrive on a later tick, never
//! inline with `send`, and nothing is delivered once disconnected.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::Result;
use crate::error::Error;
use crate::ws::handlers::{
    ConnectHandler, DisconnectHandler, ErrorHandler, Handlers, MessageHandler,
};
use crate::ws::{Inbound, Payload, Transport, WsError};

/// Delay before a connection completes when `auto_connect` is off.
pub const CONNECT_DELAY: Duration = Duration::from_millis(100);
/// Delay between a `send` and the delivery of the matching canned response.
pub const RESPONSE_DELAY: Duration = Duration::from_millis(10);

/// Behavior of a [`MockTransport`], fixed at construction.
///
/// # Example
///
/// ```
/// use jmri_ws_client::mock::MockOptions;
/// use jmri_ws_client::ws::Inbound;
/// use serde_json::json;
///
/// let options = MockOptions::builder()
///     .responses(vec![Inbound::Json(json!({ "type": "pong" }))])
///     .build();
/// assert!(options.auto_connect);
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct MockOptions {
    /// Complete `connect` without a timer delay
    #[builder(default = true)]
    pub auto_connect: bool,
    /// Make every `connect` fail with a generated error
    #[builder(default)]
    pub should_fail: bool,
    /// Responses delivered one per `send`, in order
    #[builder(default)]
    pub responses: Vec<Inbound>,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Fake transport with injectable behavior and a record of everything sent.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

struct MockInner {
    auto_connect: bool,
    should_fail: bool,
    handlers: Handlers,
    state: Mutex<MockState>,
    /// Whether a delayed connect is in flight; written only while `state` is locked
    connecting: watch::Sender<bool>,
}

/// Clears the in-flight flag when a delayed connect ends, however it ends.
struct Attempt<'a>(&'a MockInner);

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        let _state = self.0.lock();
        self.0.connecting.send_replace(false);
    }
}

#[derive(Default)]
struct MockState {
    connected: bool,
    /// Bumped on every disconnect so stale deliveries can be dropped
    generation: u64,
    responses: VecDeque<Inbound>,
    sent: Vec<Payload>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new(MockOptions::default())
    }
}

impl MockTransport {
    #[must_use]
    pub fn new(options: MockOptions) -> Self {
        Self {
            inner: Arc::new(MockInner {
                auto_connect: options.auto_connect,
                should_fail: options.should_fail,
                handlers: Handlers::default(),
                state: Mutex::new(MockState {
                    responses: options.responses.into(),
                    ..MockState::default()
                }),
                connecting: watch::Sender::new(false),
            }),
        }
    }

    /// Every payload accepted by `send`, in arrival order.
    #[must_use]
    pub fn sent_messages(&self) -> Vec<Payload> {
        self.inner.lock().sent.clone()
    }

    /// Canned responses not yet handed out.
    #[must_use]
    pub fn pending_responses(&self) -> usize {
        self.inner.lock().responses.len()
    }

    /// Deliver a message as if the server sent it. Ignored while disconnected.
    pub fn simulate_message(&self, message: Inbound) {
        if self.inner.lock().connected {
            self.inner.handlers.emit_message(message);
        }
    }

    /// Drop the connection as if the server closed it.
    pub fn simulate_disconnect(&self) {
        self.inner.drop_connection();
    }

    /// Report an error as if the transport raised one.
    pub fn simulate_error(&self, error: &Error) {
        self.inner.handlers.emit_error(error);
    }
}

impl MockInner {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn wait_for_attempt(&self) -> Result<()> {
        let mut connecting_rx = self.connecting.subscribe();
        connecting_rx
            .wait_for(|connecting| !connecting)
            .await
            .map_err(|_e| WsError::ConnectionClosed)?;

        if self.lock().connected {
            Ok(())
        } else {
            Err(WsError::ConnectionClosed.into())
        }
    }

    fn drop_connection(&self) {
        let was_connected = {
            let mut state = self.lock();
            state.generation = state.generation.wrapping_add(1);
            std::mem::replace(&mut state.connected, false)
        };

        if was_connected {
            self.handlers.emit_disconnect();
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<()> {
        if self.inner.should_fail {
            let error: Error = WsError::Transport("simulated connection failure".to_owned()).into();
            self.inner.handlers.emit_error(&error);
            return Err(error);
        }

        let generation = {
            let state = self.inner.lock();
            if state.connected {
                return Ok(());
            }
            if *self.inner.connecting.borrow() {
                None
            } else {
                self.inner.connecting.send_replace(!self.inner.auto_connect);
                Some(state.generation)
            }
        };

        // Share the outcome of the attempt already in flight.
        let Some(generation) = generation else {
            return self.inner.wait_for_attempt().await;
        };

        // Cleared only after `connected` is set, so joined callers see the outcome.
        let attempt = (!self.inner.auto_connect).then(|| Attempt(&self.inner));
        if attempt.is_some() {
            sleep(CONNECT_DELAY).await;
        }

        {
            let mut state = self.inner.lock();
            if state.generation != generation {
                return Err(WsError::Aborted.into());
            }
            state.connected = true;
        }
        drop(attempt);

        self.inner.handlers.emit_connect();
        Ok(())
    }

    fn disconnect(&self) {
        self.inner.drop_connection();
    }

    fn send(&self, payload: Payload) -> bool {
        let mut state = self.inner.lock();
        if !state.connected {
            return false;
        }

        state.sent.push(payload);

        if !self.inner.handlers.has_message() || state.responses.is_empty() {
            return true;
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %e, "No runtime to deliver the canned response on");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                return true;
            }
        };

        if let Some(response) = state.responses.pop_front() {
            let generation = state.generation;
            let inner = Arc::clone(&self.inner);

            runtime.spawn(async move {
                sleep(RESPONSE_DELAY).await;

                let still_connected = {
                    let state = inner.lock();
                    state.connected && state.generation == generation
                };
                if still_connected {
                    inner.handlers.emit_message(response);
                }
            });
        }

        true
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
        self.inner.lock().connected
    }
}
