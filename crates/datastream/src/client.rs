//! Stream client (run by downstream consumers)

use crate::error::StreamError;
use crate::types::{ClientRequest, ServerMessage, StreamEntry};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Follows a stream server from a given entry
pub struct StreamClient {
    entry_rx: mpsc::Receiver<Result<StreamEntry, StreamError>>,
}

impl StreamClient {
    /// Connect to a stream server and request entries starting at `from_entry`
    pub async fn connect(server_addr: &str, from_entry: u64) -> Result<Self, StreamError> {
        let url = format!("ws://{}", server_addr);
        let (ws_stream, _) = connect_async(&url).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        ws_sender
            .send(Message::Binary(
                ClientRequest::StartFrom { entry: from_entry }.to_bytes(),
            ))
            .await?;

        tracing::info!("Connected to stream server at {}", server_addr);

        let (entry_tx, entry_rx) = mpsc::channel(1000);

        tokio::spawn(async move {
            // Keep the sink alive so the server does not see a half-closed socket
            let _ws_sender = ws_sender;
            while let Some(msg) = ws_receiver.next().await {
                let item = match msg {
                    Ok(Message::Binary(data)) => match ServerMessage::from_bytes(&data) {
                        Ok(ServerMessage::Entry(entry)) => Ok(entry),
                        Ok(ServerMessage::Error { reason }) => Err(StreamError::Protocol(reason)),
                        Err(e) => Err(StreamError::Protocol(e.to_string())),
                    },
                    Ok(Message::Close(_)) => {
                        tracing::warn!("Stream server closed connection");
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => Err(e.into()),
                };

                let failed = item.is_err();
                if entry_tx.send(item).await.is_err() || failed {
                    break;
                }
            }
        });

        Ok(Self { entry_rx })
    }

    /// Receive the next entry; `None` once the connection is gone
    pub async fn recv(&mut self) -> Option<Result<StreamEntry, StreamError>> {
        self.entry_rx.recv().await
    }
}
