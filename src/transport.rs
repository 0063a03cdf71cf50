//! Persistent bidirectional channel to the detection service.
//!
//! One WebSocket connection per session. The socket is split into a writer
//! task fed by a depth-1 handoff (latest-effort: a busy writer means the
//! frame is dropped, never queued) and a reader task that forwards inbound
//! text payloads, in order, to the renderer.

use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::protocol::ClientMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
    Connecting = 0,
    Open = 1,
    Closed = 2,
    Error = 3,
}

fn load_state(state: &AtomicU8) -> ChannelState {
    match state.load(Ordering::SeqCst) {
        0 => ChannelState::Connecting,
        1 => ChannelState::Open,
        2 => ChannelState::Closed,
        _ => ChannelState::Error,
    }
}

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
}

/// Cheap handle for outbound sends, cloned into the capture loop.
#[derive(Clone)]
pub struct ChannelSender {
    state: Arc<AtomicU8>,
    out_tx: mpsc::Sender<Message>,
}

impl ChannelSender {
    pub fn state(&self) -> ChannelState {
        load_state(&self.state)
    }

    /// Fire-and-forget send. Dropped silently unless the channel is Open and
    /// the writer is idle; a slow or closed channel never causes backlog.
    pub fn send(&self, msg: &ClientMessage) {
        if self.state() != ChannelState::Open {
            debug!(state = ?self.state(), "channel not open, frame dropped");
            return;
        }
        let text = match serde_json::to_string(msg) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "failed to encode outbound message");
                return;
            }
        };
        if self.out_tx.try_send(Message::Text(text)).is_err() {
            debug!("writer busy, frame dropped");
        }
    }

    #[cfg(test)]
    pub(crate) fn detached(state: ChannelState) -> (Self, mpsc::Receiver<Message>) {
        let (out_tx, out_rx) = mpsc::channel(1);
        (
            ChannelSender {
                state: Arc::new(AtomicU8::new(state as u8)),
                out_tx,
            },
            out_rx,
        )
    }
}

pub struct Channel {
    sender: ChannelSender,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Channel {
    /// Open a connection and start the reader/writer tasks. Inbound text
    /// payloads are forwarded to `inbound_tx` in arrival order; if the
    /// consumer lags, frames are dropped rather than buffered without bound.
    pub async fn connect(
        endpoint: &Url,
        inbound_tx: mpsc::Sender<String>,
    ) -> Result<Self, ChannelError> {
        let state = Arc::new(AtomicU8::new(ChannelState::Connecting as u8));

        let (ws_stream, _) =
            connect_async(endpoint.as_str())
                .await
                .map_err(|source| ChannelError::Connect {
                    url: endpoint.to_string(),
                    source,
                })?;

        state.store(ChannelState::Open as u8, Ordering::SeqCst);
        info!(endpoint = %endpoint, "channel open");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<Message>(1);

        let writer_state = Arc::clone(&state);
        let writer = tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if let Err(e) = ws_tx.send(msg).await {
                    if !closing {
                        warn!(error = %e, "channel write failed");
                        writer_state.store(ChannelState::Error as u8, Ordering::SeqCst);
                    }
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        let reader_state = Arc::clone(&state);
        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_rx.next().await {
                match msg {
                    Ok(Message::Text(payload)) => {
                        if inbound_tx.try_send(payload).is_err() {
                            debug!("renderer busy, inbound frame dropped");
                        }
                    }
                    Ok(Message::Close(_)) => {
                        reader_state.store(ChannelState::Closed as u8, Ordering::SeqCst);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "channel read failed");
                        reader_state.store(ChannelState::Error as u8, Ordering::SeqCst);
                        break;
                    }
                }
            }
            // Remote went away without a close frame.
            let _ = reader_state.compare_exchange(
                ChannelState::Open as u8,
                ChannelState::Closed as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
        });

        Ok(Channel {
            sender: ChannelSender { state, out_tx },
            reader,
            writer,
        })
    }

    pub fn state(&self) -> ChannelState {
        self.sender.state()
    }

    /// Handle for the capture loop.
    pub fn sender(&self) -> ChannelSender {
        self.sender.clone()
    }

    pub fn send(&self, msg: &ClientMessage) {
        self.sender.send(msg)
    }

    /// Idempotent. Marks the channel Closed (sends become no-ops at once),
    /// attempts a close frame, and stops the reader. The socket itself is
    /// torn down when the channel is dropped.
    pub fn close(&self) {
        let prev = self
            .sender
            .state
            .swap(ChannelState::Closed as u8, Ordering::SeqCst);
        if prev == ChannelState::Closed as u8 {
            return;
        }
        let _ = self.sender.out_tx.try_send(Message::Close(None));
        self.reader.abort();
        info!("channel closed");
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
        self.writer.abort();
        self.reader.abort();
    }
}
