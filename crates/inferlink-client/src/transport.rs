//! Socket transport.
//!
//! A [`Connector`] opens a [`Link`]: a pair of text-frame channels backed by
//! a socket. The connection driver only ever sees links, so tests can swap
//! the WebSocket for in-memory channels with [`Link::pair`].
//!
//! A link is closed when its inbound channel ends. Dropping a link closes
//! the underlying socket.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ClientError, ClientResult};

/// Boxed future used by the [`Connector`] trait.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Open text-frame channels to the server.
#[derive(Debug)]
pub struct Link {
    /// Frames to send.
    pub outbound: mpsc::UnboundedSender<String>,
    /// Frames received; ends when the socket closes.
    pub inbound: mpsc::UnboundedReceiver<String>,
}

/// Server side of an in-memory [`Link`].
#[derive(Debug)]
pub struct LinkPeer {
    /// Frames for the client.
    pub to_client: mpsc::UnboundedSender<String>,
    /// Frames sent by the client.
    pub from_client: mpsc::UnboundedReceiver<String>,
}

impl Link {
    /// Creates an in-memory link and the peer that serves it.
    ///
    /// Dropping `LinkPeer::to_client` closes the link.
    pub fn pair() -> (Link, LinkPeer) {
        let (outbound, from_client) = mpsc::unbounded_channel();
        let (to_client, inbound) = mpsc::unbounded_channel();
        (
            Link { outbound, inbound },
            LinkPeer {
                to_client,
                from_client,
            },
        )
    }
}

/// Opens links to the server.
pub trait Connector: Send + Sync {
    /// Opens one link.
    fn open(&self) -> BoxFuture<'_, ClientResult<Link>>;
}

/// Opens WebSocket links.
#[derive(Debug, Clone)]
pub struct WsConnector {
    endpoint: Url,
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(endpoint: Url, connect_timeout: Duration) -> Self {
        Self {
            endpoint,
            connect_timeout,
        }
    }

    async fn open_socket(&self) -> ClientResult<Link> {
        let connecting = tokio_tungstenite::connect_async(self.endpoint.as_str());
        let (ws, _response) = tokio::time::timeout(self.connect_timeout, connecting)
            .await
            .map_err(|_| {
                ClientError::Connect(format!(
                    "{} did not answer within {}ms",
                    self.endpoint,
                    self.connect_timeout.as_millis()
                ))
            })?
            .map_err(|e| ClientError::Connect(format!("{}: {}", self.endpoint, e)))?;

        debug!(endpoint = %self.endpoint, "WebSocket open");

        let (mut sink, mut stream) = ws.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!(error = %e, "WebSocket write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if inbound_tx.send(text).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "WebSocket closed by server");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "WebSocket read failed");
                        break;
                    }
                }
            }
        });

        Ok(Link { outbound, inbound })
    }
}

impl Connector for WsConnector {
    fn open(&self) -> BoxFuture<'_, ClientResult<Link>> {
        Box::pin(self.open_socket())
    }
}
