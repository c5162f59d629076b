//! WebSocket relay client.
//!
//! A connection subscribes to one call id with an `init` frame, then
//! forwards transcript lines and receives the server's broadcasts. Socket
//! reads and writes run on their own tasks behind bounded queues; a dropped
//! connection is reported by [`RelayClient::recv`] returning `None`, and is
//! never reconnected automatically.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, warn};

use concierge_types::frames::{ClientFrame, TranscriptFrame};
use concierge_types::TranscriptEvent;

use crate::error::RelayError;

/// Frames buffered in each direction.
const RELAY_QUEUE: usize = 256;

pub struct RelayClient {
    call_id: String,
    outgoing: mpsc::Sender<Message>,
    incoming: mpsc::Receiver<String>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl RelayClient {
    /// Connects to `url` and subscribes to `call_id`.
    pub async fn connect(url: &str, call_id: &str) -> Result<Self, RelayError> {
        let (socket, _) = connect_async(url).await?;
        let (mut sink, mut stream) = socket.split();

        let (out_tx, mut out_rx) = mpsc::channel::<Message>(RELAY_QUEUE);
        let (in_tx, in_rx) = mpsc::channel::<String>(RELAY_QUEUE);

        let writer = tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if let Err(e) = sink.send(msg).await {
                    warn!(error = %e, "relay write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if in_tx.send(text.as_str().to_owned()).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "relay read failed");
                        break;
                    }
                }
            }
            debug!("relay reader finished");
        });

        let client = Self {
            call_id: call_id.to_string(),
            outgoing: out_tx,
            incoming: in_rx,
            reader,
            writer,
        };
        client
            .send_frame(&ClientFrame::Init {
                call_id: call_id.to_string(),
            })
            .await?;
        Ok(client)
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// Forwards a transcript line, as `transcript(final)` when it is final.
    pub async fn send_transcript(&self, event: &TranscriptEvent) -> Result<(), RelayError> {
        let line = TranscriptFrame {
            call_id: event.call_id.clone(),
            role: event.role,
            content: event.content.clone(),
            segment_id: None,
            utterance_id: event.utterance_id.clone(),
        };
        let frame = if event.is_final {
            ClientFrame::FinalTranscript(line)
        } else {
            ClientFrame::Transcript(line)
        };
        self.send_frame(&frame).await
    }

    async fn send_frame(&self, frame: &ClientFrame) -> Result<(), RelayError> {
        let text = serde_json::to_string(frame)?;
        self.outgoing
            .send(Message::Text(text.into()))
            .await
            .map_err(|_| RelayError::Closed)
    }

    /// Next text frame from the server, or `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.incoming.recv().await
    }

    /// Closes the connection after flushing queued frames.
    pub async fn close(mut self) {
        // Dropping the last sender ends the writer loop, which closes the sink.
        let (detached, _) = mpsc::channel(1);
        drop(std::mem::replace(&mut self.outgoing, detached));
        let _ = (&mut self.writer).await;
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
