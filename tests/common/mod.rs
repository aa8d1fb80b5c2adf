#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Not every test binary uses every helper in this module"
)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use jmri_ws_client::Result;
use jmri_ws_client::error::Error;
use jmri_ws_client::ws::config::{Config, Target};
use jmri_ws_client::ws::socket::{Socket, SocketPeer};
use jmri_ws_client::ws::{ConnectionManager, ConnectionState, Connector, Inbound, WsError};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, timeout};
use url::Url;

/// Generous enough for the longest backoff under paused time.
pub const WAIT: Duration = Duration::from_secs(600);

/// What the next `open` call does.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Open,
    /// Open after the given delay
    OpenAfter(Duration),
    Fail,
    /// Fail after the given delay
    FailAfter(Duration),
    /// Never resolve
    Hang,
}

/// In-memory connector. Each successful open hands the server side of the socket to
/// the paired [`FakeServer`].
pub struct FakeConnector {
    peers: mpsc::UnboundedSender<SocketPeer>,
    script: Arc<Mutex<VecDeque<Outcome>>>,
    opens: Arc<Mutex<Vec<Instant>>>,
}

pub struct FakeServer {
    peers: mpsc::UnboundedReceiver<SocketPeer>,
    script: Arc<Mutex<VecDeque<Outcome>>>,
    opens: Arc<Mutex<Vec<Instant>>>,
}

#[must_use]
pub fn fake() -> (FakeConnector, FakeServer) {
    let (peers_tx, peers_rx) = mpsc::unbounded_channel();
    let script = Arc::new(Mutex::new(VecDeque::new()));
    let opens = Arc::new(Mutex::new(Vec::new()));

    (
        FakeConnector {
            peers: peers_tx,
            script: Arc::clone(&script),
            opens: Arc::clone(&opens),
        },
        FakeServer {
            peers: peers_rx,
            script,
            opens,
        },
    )
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open(&self, url: &Url) -> Result<Socket> {
        assert_eq!(url.scheme(), "ws");
        self.opens.lock().unwrap().push(Instant::now());

        // Default to opening once the script runs out.
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Outcome::Open);

        match outcome {
            Outcome::Open => {}
            Outcome::OpenAfter(delay) => sleep(delay).await,
            Outcome::Fail => {
                return Err(WsError::Transport("connection refused".to_owned()).into());
            }
            Outcome::FailAfter(delay) => {
                sleep(delay).await;
                return Err(WsError::Transport("connection timed out".to_owned()).into());
            }
            Outcome::Hang => std::future::pending::<()>().await,
        }

        let (socket, peer) = Socket::pair();
        self.peers.send(peer).unwrap();
        Ok(socket)
    }
}

impl FakeServer {
    /// Queue outcomes for upcoming `open` calls.
    pub fn script<I: IntoIterator<Item = Outcome>>(&self, outcomes: I) {
        self.script.lock().unwrap().extend(outcomes);
    }

    /// Wait for the next socket the client opens.
    pub async fn accept(&mut self) -> SocketPeer {
        timeout(WAIT, self.peers.recv())
            .await
            .expect("client never opened a socket")
            .unwrap()
    }

    /// Number of `open` calls so far, successful or not.
    #[must_use]
    pub fn opens(&self) -> usize {
        self.opens.lock().unwrap().len()
    }

    /// Times at which `open` was called.
    #[must_use]
    pub fn open_times(&self) -> Vec<Instant> {
        self.opens.lock().unwrap().clone()
    }
}

pub type TestManager = ConnectionManager<FakeConnector>;

#[must_use]
pub fn manager() -> (TestManager, FakeServer) {
    let (connector, server) = fake();
    let manager =
        ConnectionManager::with_connector(&Target::default(), Config::default(), connector)
            .unwrap();
    (manager, server)
}

/// Wait until the manager reaches `state`.
pub async fn wait_for_state(manager: &TestManager, state: ConnectionState) {
    let mut state_rx = manager.state_receiver();
    timeout(WAIT, state_rx.wait_for(|current| *current == state))
        .await
        .expect("state never reached")
        .unwrap();
}

/// Event log shared with handlers.
#[derive(Clone, Default)]
pub struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    pub fn push<S: Into<String>>(&self, entry: S) {
        self.0.lock().unwrap().push(entry.into());
    }

    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    #[must_use]
    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == entry).count()
    }
}

/// Register logging handlers for every event kind and forward messages to a channel.
pub fn record<T: jmri_ws_client::ws::Transport + ?Sized>(
    transport: &T,
) -> (Log, mpsc::UnboundedReceiver<Inbound>) {
    let log = Log::default();
    let (messages_tx, messages_rx) = mpsc::unbounded_channel();

    let entries = log.clone();
    transport.on_connect(Box::new(move || entries.push("connect")));
    let entries = log.clone();
    transport.on_disconnect(Box::new(move || entries.push("disconnect")));
    let entries = log.clone();
    transport.on_error(Box::new(move |error: &Error| {
        entries.push(format!("error: {error}"));
    }));
    transport.on_message(Box::new(move |message: Inbound| {
        _ = messages_tx.send(message);
    }));

    (log, messages_rx)
}

/// Counter for handler invocations.
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    #[must_use]
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
