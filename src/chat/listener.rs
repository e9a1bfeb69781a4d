//! Websocket event listener.
//!
//! One reader task per connection turns inbound text frames into
//! [`ChatEvent`]s on an unbounded channel. There is no reconnect: when the
//! socket closes, the event sequence ends.

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use super::model::{parse_frame, ChatEvent};
use crate::error::Result;

/// Closes the connection owned by an [`EventListener`].
#[derive(Clone, Debug)]
pub struct ListenerHandle {
    close_tx: watch::Sender<bool>,
}

impl ListenerHandle {
    fn new() -> (Self, watch::Receiver<bool>) {
        let (close_tx, close_rx) = watch::channel(false);
        (Self { close_tx }, close_rx)
    }

    /// Ask the reader task to send a close frame and stop.
    pub fn close(&self) {
        self.close_tx.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.close_tx.borrow()
    }
}

/// Ordered stream of events from one connection.
pub struct EventListener {
    events: mpsc::UnboundedReceiver<ChatEvent>,
    handle: ListenerHandle,
}

impl EventListener {
    /// Open the websocket, authenticate with `token`, and start forwarding
    /// events.
    pub async fn connect(ws_url: &Url, token: &str) -> Result<Self> {
        tracing::info!(url = %ws_url, "Connecting to event stream");
        let (mut ws, _response) = connect_async(ws_url.as_str()).await?;

        let challenge = json!({
            "seq": 1,
            "action": "authentication_challenge",
            "data": { "token": token },
        });
        ws.send(Message::Text(challenge.to_string().into())).await?;

        let (tx, events) = mpsc::unbounded_channel();
        let (handle, mut close_rx) = ListenerHandle::new();

        tokio::spawn(async move {
            let (mut sink, mut stream) = ws.split();
            loop {
                tokio::select! {
                    changed = close_rx.changed() => {
                        if changed.is_err() || *close_rx.borrow() {
                            tracing::debug!("Closing event stream");
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                    }
                    frame = stream.next() => match frame {
                        Some(Ok(Message::Text(text))) => match parse_frame(text.as_str()) {
                            Some(event) => {
                                if tx.send(event).is_err() {
                                    break;
                                }
                            }
                            None => tracing::debug!("Skipping non-event frame: {}", text.as_str()),
                        },
                        Some(Ok(Message::Ping(data))) => {
                            let _ = sink.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!("Event stream closed by server");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::error!("Event stream error: {}", e);
                            break;
                        }
                    },
                }
            }
        });

        Ok(Self { events, handle })
    }

    /// Listener fed from an in-process channel instead of a socket.
    pub fn from_channel(events: mpsc::UnboundedReceiver<ChatEvent>) -> Self {
        let (handle, _close_rx) = ListenerHandle::new();
        Self { events, handle }
    }

    pub fn handle(&self) -> ListenerHandle {
        self.handle.clone()
    }

    /// Next event, or `None` once the connection is gone.
    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        self.events.recv().await
    }
}
