//! Socket handles and the `tokio-tungstenite` connector.

use async_trait::async_trait;
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use url::Url;

use super::traits::Connector;
use crate::Result;
use crate::error::Error;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle events reported by an open socket.
#[non_exhaustive]
#[derive(Debug)]
pub enum SocketEvent {
    /// A text frame arrived
    Message(String),
    /// The socket reported an error after opening
    Error(Error),
    /// The remote end closed the socket
    Closed,
}

/// Client end of an open socket, owned by a connection manager.
///
/// Dropping it closes the socket.
#[derive(Debug)]
pub struct Socket {
    pub(crate) outbound: mpsc::UnboundedSender<String>,
    pub(crate) events: mpsc::UnboundedReceiver<SocketEvent>,
}

/// Remote end of a [`Socket`]: whatever actually moves bytes.
///
/// The tungstenite connector pumps frames through one of these; tests hold one to
/// play the server.
#[derive(Debug)]
pub struct SocketPeer {
    outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<SocketEvent>,
}

impl Socket {
    /// Create a connected socket/peer pair.
    #[must_use]
    pub fn pair() -> (Socket, SocketPeer) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        (
            Socket {
                outbound: outbound_tx,
                events: events_rx,
            },
            SocketPeer {
                outbound: outbound_rx,
                events: events_tx,
            },
        )
    }
}

impl SocketPeer {
    /// Deliver a text frame to the client. Returns `false` once the client is gone.
    pub fn deliver<S: Into<String>>(&self, text: S) -> bool {
        self.events.send(SocketEvent::Message(text.into())).is_ok()
    }

    /// Report an error on the open socket.
    pub fn fail(&self, error: Error) -> bool {
        self.events.send(SocketEvent::Error(error)).is_ok()
    }

    /// Close the socket from the remote side.
    pub fn close(self) {
        _ = self.events.send(SocketEvent::Closed);
    }

    /// Next text frame sent by the client, or `None` once the client has closed
    /// its end.
    pub async fn recv(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// Whether the client has dropped its end of the socket.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}

/// Production connector backed by `tokio-tungstenite`.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn open(&self, url: &Url) -> Result<Socket> {
        let (ws_stream, _) = connect_async(url.as_str()).await?;
        let (socket, peer) = Socket::pair();

        tokio::spawn(pump(ws_stream, peer));

        Ok(socket)
    }
}

/// Move frames between a tungstenite stream and a [`SocketPeer`] until either side
/// closes.
async fn pump(ws_stream: WsStream, peer: SocketPeer) {
    let (mut write, mut read) = ws_stream.split();
    let SocketPeer {
        mut outbound,
        events,
    } = peer;

    loop {
        tokio::select! {
            incoming = read.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        #[cfg(feature = "tracing")]
                        tracing::trace!(text = %text.as_str(), "Received WebSocket text message");

                        if events.send(SocketEvent::Message(text.as_str().to_owned())).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        _ = events.send(SocketEvent::Closed);
                        break;
                    }
                    Some(Err(e)) => {
                        _ = events.send(SocketEvent::Error(e.into()));
                        _ = events.send(SocketEvent::Closed);
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary frames and protocol-level PING/PONG carry nothing for us.
                    }
                }
            }

            outgoing = outbound.recv() => {
                if let Some(text) = outgoing {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        _ = events.send(SocketEvent::Error(e.into()));
                        _ = events.send(SocketEvent::Closed);
                        break;
                    }
                } else {
                    // Client dropped its end: explicit disconnect.
                    _ = write.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }
}
