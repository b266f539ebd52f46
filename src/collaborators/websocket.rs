//! WebSocket push transport
//!
//! Opens one WebSocket connection per subscription and forwards its text
//! frames. Binary, ping and pong frames are skipped (tungstenite answers pings
//! itself). The subscription ends on a close frame or the first read error.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

use super::{PushSubscription, PushTransport};
use crate::error::{AppResult, OverlayError};

/// Push transport backed by the fleet manager's WebSocket endpoint
#[derive(Debug, Clone)]
pub struct WebSocketPushTransport {
    url: Url,
}

impl WebSocketPushTransport {
    /// Create a transport for a `ws://` or `wss://` URL
    pub fn new(url: &str) -> AppResult<Self> {
        let url = Url::parse(url)
            .map_err(|e| OverlayError::Transport(format!("invalid push url '{url}': {e}")))?;
        match url.scheme() {
            "ws" | "wss" => Ok(Self { url }),
            other => Err(OverlayError::Transport(format!(
                "unsupported push url scheme '{other}'"
            ))),
        }
    }

    /// Endpoint this transport connects to
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl PushTransport for WebSocketPushTransport {
    async fn subscribe(&self) -> Result<PushSubscription> {
        let (socket, _response) = connect_async(self.url.as_str())
            .await
            .with_context(|| format!("failed to connect push channel at {}", self.url))?;
        debug!(url = %self.url, "push channel connected");

        let frames = futures::stream::unfold(socket, |mut socket| async move {
            loop {
                match socket.next().await {
                    Some(Ok(Message::Text(text))) => return Some((text, socket)),
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("push channel closed by server");
                        return None;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        warn!(?err, "push channel read error");
                        return None;
                    }
                }
            }
        });

        Ok(frames.boxed())
    }
}
