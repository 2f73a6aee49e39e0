//! # IPC Client
//!
//! Unix socket client for driving debates on a running server.

use crate::features::debate::{DebateId, DebateRequest};
use crate::ipc::protocol::{encode_message, read_frame, ClientCommand, ServerEvent};
use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

/// Connection timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct DebateClient {
    /// Event receiver channel
    event_rx: mpsc::Receiver<ServerEvent>,
    /// Command sender channel
    command_tx: mpsc::Sender<ClientCommand>,
}

impl DebateClient {
    pub async fn connect_to(socket_path: &str) -> Result<Self> {
        info!("Connecting to debate server at {}", socket_path);

        let stream = timeout(CONNECT_TIMEOUT, UnixStream::connect(socket_path))
            .await
            .map_err(|_| anyhow!("Connection timeout"))?
            .map_err(|e| anyhow!("Failed to connect to {}: {}", socket_path, e))?;

        debug!("Connected to debate server");

        let (event_tx, event_rx) = mpsc::channel(256);
        let (command_tx, command_rx) = mpsc::channel(64);

        tokio::spawn(async move {
            Self::connection_loop(stream, event_tx, command_rx).await;
        });

        Ok(DebateClient { event_rx, command_tx })
    }

    /// Main connection loop - handles reading events and writing commands
    async fn connection_loop(
        stream: UnixStream,
        event_tx: mpsc::Sender<ServerEvent>,
        mut command_rx: mpsc::Receiver<ClientCommand>,
    ) {
        let (mut reader, mut writer) = stream.into_split();

        let write_handle = tokio::spawn(async move {
            while let Some(cmd) = command_rx.recv().await {
                match encode_message(&cmd) {
                    Ok(data) => {
                        if let Err(e) = writer.write_all(&data).await {
                            error!("Failed to write command: {}", e);
                            break;
                        }
                        if let Err(e) = writer.flush().await {
                            error!("Failed to flush command: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Failed to encode command: {}", e);
                    }
                }
            }
        });

        loop {
            let frame = match read_frame(&mut reader).await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    error!("Read error: {}", e);
                    break;
                }
            };

            match serde_json::from_slice::<ServerEvent>(&frame) {
                Ok(event) => {
                    if event_tx.send(event).await.is_err() {
                        debug!("Event receiver closed");
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to parse event: {}", e);
                }
            }
        }

        write_handle.abort();
        debug!("Debate server connection closed");
    }

    /// Receive the next event; `None` once the connection is gone
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        self.event_rx.recv().await
    }

    pub async fn send(&self, cmd: ClientCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|e| anyhow!("Failed to send command: {}", e))
    }

    /// Ask for a new debate; returns the request id the reply will carry
    pub async fn start_debate(&self, request: DebateRequest) -> Result<String> {
        let request_id = new_request_id();
        self.send(ClientCommand::StartDebate {
            request_id: request_id.clone(),
            request,
        })
        .await?;
        Ok(request_id)
    }

    pub async fn advance_turn(&self, debate_id: DebateId, stream: bool) -> Result<String> {
        let request_id = new_request_id();
        self.send(ClientCommand::AdvanceTurn {
            request_id: request_id.clone(),
            debate_id,
            stream,
        })
        .await?;
        Ok(request_id)
    }

    pub async fn end_debate(&self, debate_id: DebateId) -> Result<String> {
        let request_id = new_request_id();
        self.send(ClientCommand::EndDebate {
            request_id: request_id.clone(),
            debate_id,
        })
        .await?;
        Ok(request_id)
    }

    pub async fn get_debate(&self, debate_id: DebateId) -> Result<String> {
        let request_id = new_request_id();
        self.send(ClientCommand::GetDebate {
            request_id: request_id.clone(),
            debate_id,
        })
        .await?;
        Ok(request_id)
    }

    pub async fn list_debates(&self, limit: usize) -> Result<String> {
        let request_id = new_request_id();
        self.send(ClientCommand::ListDebates {
            request_id: request_id.clone(),
            limit,
        })
        .await?;
        Ok(request_id)
    }

    pub async fn ping(&self, timestamp: i64) -> Result<()> {
        self.send(ClientCommand::Ping { timestamp }).await
    }
}

fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Try to connect with retries
pub async fn connect_with_retry(socket_path: &str, max_attempts: u32, delay: Duration) -> Result<DebateClient> {
    let mut attempt = 1;
    loop {
        match DebateClient::connect_to(socket_path).await {
            Ok(client) => return Ok(client),
            Err(e) if attempt < max_attempts => {
                warn!(
                    "Connection attempt {} failed: {}. Retrying in {:?}...",
                    attempt, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(anyhow!(
                    "Failed to connect after {} attempts: {}",
                    attempt,
                    e
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_to_missing_socket_fails() {
        let path = std::env::temp_dir().join(format!("persona-clash-missing-{}.sock", uuid::Uuid::new_v4()));
        let result = connect_with_retry(&path.to_string_lossy(), 2, Duration::from_millis(10)).await;
        let err = result.err().expect("connect should fail");
        assert!(err.to_string().contains("after 2 attempts"));
    }
}
