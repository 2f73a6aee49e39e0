//! # IPC Server
//!
//! Unix socket server exposing the debate orchestrator to clients.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.2.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 2.0.0: Per-request streaming; a client disconnect cancels its turns in flight
//! - 1.1.0: Concurrent command handling per connection
//! - 1.0.0: Initial IPC implementation with Unix socket protocol

use crate::features::debate::{DebateId, DebateOrchestrator};
use crate::features::relay::{RelayEvent, StreamingRelay};
use crate::ipc::get_socket_path;
use crate::ipc::protocol::{encode_message, read_frame, ClientCommand, ServerEvent};
use anyhow::Result;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;

/// Maximum number of connected clients
const MAX_CLIENTS: usize = 32;

/// Outgoing event queue per client
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Relay buffer between the orchestrator and a client's event queue
const RELAY_CHANNEL_CAPACITY: usize = 64;

/// Default number of debates returned by ListDebates
pub const DEFAULT_LIST_LIMIT: usize = 10;

pub struct DebateServer {
    orchestrator: Arc<DebateOrchestrator>,
    socket_path: String,
    client_count: Arc<AtomicUsize>,
}

impl DebateServer {
    pub fn new(orchestrator: Arc<DebateOrchestrator>) -> Self {
        Self {
            orchestrator,
            socket_path: get_socket_path(),
            client_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_socket_path(mut self, socket_path: impl Into<String>) -> Self {
        self.socket_path = socket_path.into();
        self
    }

    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }

    pub fn client_count(&self) -> usize {
        self.client_count.load(Ordering::SeqCst)
    }

    /// Bind the socket, replacing a stale one left by a previous run
    pub fn bind(&self) -> Result<UnixListener> {
        if std::path::Path::new(&self.socket_path).exists() {
            std::fs::remove_file(&self.socket_path)?;
        }
        let listener = UnixListener::bind(&self.socket_path)?;
        info!("Debate server listening on {}", self.socket_path);
        Ok(listener)
    }

    /// Bind and serve until the task is dropped
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let listener = self.bind()?;
        self.serve(listener).await;
        Ok(())
    }

    /// Accept loop
    pub async fn serve(self: Arc<Self>, listener: UnixListener) {
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let client_count = self.client_count.load(Ordering::SeqCst);
                    if client_count >= MAX_CLIENTS {
                        warn!("Maximum clients reached ({}), rejecting connection", MAX_CLIENTS);
                        continue;
                    }

                    self.client_count.fetch_add(1, Ordering::SeqCst);
                    info!("Client connected (total: {})", client_count + 1);

                    let server = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = server.clone().handle_client(stream).await {
                            debug!("Client handler ended: {}", e);
                        }
                        server.client_count.fetch_sub(1, Ordering::SeqCst);
                        info!("Client disconnected");
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    /// Handle a connected client
    async fn handle_client(self: Arc<Self>, stream: UnixStream) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();
        let (event_tx, mut event_rx) = mpsc::channel::<ServerEvent>(EVENT_CHANNEL_CAPACITY);

        // Writer task for events
        let write_handle = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                match encode_message(&event) {
                    Ok(data) => {
                        if let Err(e) = writer.write_all(&data).await {
                            debug!("Failed to write to client: {}", e);
                            break;
                        }
                        if let Err(e) = writer.flush().await {
                            debug!("Failed to flush to client: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Failed to encode event: {}", e);
                    }
                }
            }
        });

        // Each command runs on its own task so a long turn does not block the connection
        let result = loop {
            let frame = match read_frame(&mut reader).await {
                Ok(Some(frame)) => frame,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };

            match serde_json::from_slice::<ClientCommand>(&frame) {
                Ok(command) => {
                    let server = self.clone();
                    let events = event_tx.clone();
                    tokio::spawn(async move {
                        server.dispatch(command, events).await;
                    });
                }
                Err(e) => {
                    warn!("Failed to parse command from client: {}", e);
                    let _ = event_tx
                        .send(ServerEvent::Error {
                            request_id: None,
                            kind: "invalid_request".to_string(),
                            message: format!("unparseable command: {e}"),
                            retryable: false,
                        })
                        .await;
                }
            }
        };

        // Dropping the event queue is what cancels this client's turns in flight
        write_handle.abort();
        result
    }

    async fn dispatch(&self, command: ClientCommand, events: mpsc::Sender<ServerEvent>) {
        let reply = match command {
            ClientCommand::StartDebate { request_id, request } => {
                match self.orchestrator.start(request).await {
                    Ok(debate) => ServerEvent::DebateStarted { request_id, debate },
                    Err(e) => ServerEvent::error(request_id, &e),
                }
            }
            ClientCommand::AdvanceTurn { request_id, debate_id, stream: true } => {
                self.stream_turn(request_id, debate_id, events).await;
                return;
            }
            ClientCommand::AdvanceTurn { request_id, debate_id, stream: false } => {
                match self.orchestrator.advance_turn_collected(debate_id).await {
                    Ok(turn) => ServerEvent::TurnCompleted { request_id, turn },
                    Err(e) => ServerEvent::error(request_id, &e),
                }
            }
            ClientCommand::EndDebate { request_id, debate_id } => match self.orchestrator.end_debate(debate_id) {
                Ok(()) => ServerEvent::DebateEnded { request_id, debate_id },
                Err(e) => ServerEvent::error(request_id, &e),
            },
            ClientCommand::GetDebate { request_id, debate_id } => {
                match self.orchestrator.get_debate(debate_id).await {
                    Ok(transcript) => ServerEvent::Debate { request_id, transcript },
                    Err(e) => ServerEvent::error(request_id, &e),
                }
            }
            ClientCommand::ListDebates { request_id, limit } => {
                let limit = if limit == 0 { DEFAULT_LIST_LIMIT } else { limit };
                match self.orchestrator.list_debates(limit).await {
                    Ok(debates) => ServerEvent::Debates { request_id, debates },
                    Err(e) => ServerEvent::error(request_id, &e),
                }
            }
            ClientCommand::Ping { timestamp } => ServerEvent::Pong { timestamp },
        };

        if events.send(reply).await.is_err() {
            debug!("Client gone before reply could be sent");
        }
    }

    /// Advance one turn, forwarding relay events to the client as they happen
    async fn stream_turn(&self, request_id: String, debate_id: DebateId, events: mpsc::Sender<ServerEvent>) {
        let (relay_tx, relay_rx) = mpsc::channel(RELAY_CHANNEL_CAPACITY);
        let forwarder = tokio::spawn(forward_relay(request_id, debate_id, relay_rx, events));

        let relay = StreamingRelay::new(relay_tx);
        let _ = self.orchestrator.advance_turn(debate_id, &relay).await;
        drop(relay);

        if let Err(e) = forwarder.await {
            error!("Relay forwarder for debate {debate_id} failed: {e}");
        }
    }
}

/// Copy relay events to the client queue until the turn ends or the client goes away
async fn forward_relay(
    request_id: String,
    debate_id: DebateId,
    mut relay_rx: mpsc::Receiver<RelayEvent>,
    events: mpsc::Sender<ServerEvent>,
) {
    loop {
        let event = tokio::select! {
            _ = events.closed() => {
                debug!("Client left during debate {debate_id} turn, cancelling");
                return;
            }
            event = relay_rx.recv() => event,
        };
        let Some(event) = event else { return };

        if events
            .send(ServerEvent::from_relay(&request_id, debate_id, event))
            .await
            .is_err()
        {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::debate::DebateRequest;
    use crate::features::generation::scripted::{ScriptStep, ScriptedGenerator};
    use crate::features::personas::{MemoryPersonaCache, PersonaGenerator};
    use crate::features::transcripts::MemoryTurnStore;
    use crate::ipc::client::DebateClient;
    use std::time::Duration;

    const TWO_PERSONAS: &str = "<persona><name>Ava</name><systemprompt>You are Ava.</systemprompt></persona>\
        <persona><name>Ben</name><systemprompt>You are Ben.</systemprompt></persona>";

    fn orchestrator(turns: ScriptedGenerator) -> Arc<DebateOrchestrator> {
        Arc::new(DebateOrchestrator::new(
            Arc::new(turns),
            Arc::new(ScriptedGenerator::constant("Short summary.")),
            PersonaGenerator::new(
                Arc::new(ScriptedGenerator::constant(TWO_PERSONAS)),
                Arc::new(MemoryPersonaCache::new()),
            ),
            Arc::new(MemoryTurnStore::new()),
        ))
    }

    async fn start_server(orchestrator: Arc<DebateOrchestrator>) -> (String, tokio::task::JoinHandle<()>) {
        let path = std::env::temp_dir()
            .join(format!("persona-clash-test-{}.sock", uuid::Uuid::new_v4()))
            .to_string_lossy()
            .to_string();
        let server = Arc::new(DebateServer::new(orchestrator).with_socket_path(&path));
        let listener = server.bind().unwrap();
        let handle = tokio::spawn(server.serve(listener));
        (path, handle)
    }

    async fn next_event(client: &mut DebateClient) -> ServerEvent {
        tokio::time::timeout(Duration::from_secs(5), client.recv())
            .await
            .expect("timed out waiting for server event")
            .expect("connection closed")
    }

    #[tokio::test]
    async fn test_streamed_turn_over_socket() {
        let turns = ScriptedGenerator::new(vec![ScriptStep::Reply(vec![
            "Pineapple ".into(),
            "is a fruit.".into(),
        ])]);
        let (path, handle) = start_server(orchestrator(turns)).await;
        let mut client = DebateClient::connect_to(&path).await.unwrap();

        let start_id = client
            .start_debate(DebateRequest::new("Pizza", "Ava", "Ben").with_questions(vec!["Q1".into()]))
            .await
            .unwrap();
        let debate_id = match next_event(&mut client).await {
            ServerEvent::DebateStarted { request_id, debate } => {
                assert_eq!(request_id, start_id);
                assert_eq!(debate.current_speaker, "Ava");
                debate.id
            }
            other => panic!("unexpected event: {other:?}"),
        };

        client.advance_turn(debate_id, true).await.unwrap();
        let mut text = String::new();
        loop {
            match next_event(&mut client).await {
                ServerEvent::Fragment { speaker, fragment, .. } => {
                    assert_eq!(speaker, "Ava");
                    text.push_str(&fragment);
                }
                ServerEvent::EndOfTurn { speaker, turn_index, .. } => {
                    assert_eq!(speaker, "Ava");
                    assert_eq!(turn_index, 0);
                    break;
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(text, "Pineapple is a fruit.");

        client.advance_turn(debate_id, false).await.unwrap();
        match next_event(&mut client).await {
            ServerEvent::TurnCompleted { turn, .. } => {
                assert_eq!(turn.speaker, "Ben");
                assert_eq!(turn.turn_index, 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        client.get_debate(debate_id).await.unwrap();
        match next_event(&mut client).await {
            ServerEvent::Debate { transcript, .. } => assert_eq!(transcript.turns.len(), 2),
            other => panic!("unexpected event: {other:?}"),
        }

        handle.abort();
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_errors_carry_request_id() {
        let (path, handle) = start_server(orchestrator(ScriptedGenerator::unscripted())).await;
        let mut client = DebateClient::connect_to(&path).await.unwrap();

        let request_id = client.advance_turn(404, true).await.unwrap();
        match next_event(&mut client).await {
            ServerEvent::Error { request_id: Some(id), kind, retryable, .. } => {
                assert_eq!(id, request_id);
                assert_eq!(kind, "debate_not_found");
                assert!(!retryable);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        client.ping(7).await.unwrap();
        assert_eq!(next_event(&mut client).await, ServerEvent::Pong { timestamp: 7 });

        handle.abort();
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_disconnect_cancels_turn() {
        let fragments: Vec<String> = (0..50).map(|i| format!("w{i} ")).collect();
        let orchestrator = orchestrator(
            ScriptedGenerator::new(vec![ScriptStep::Reply(fragments)])
                .with_fragment_delay(Duration::from_millis(20)),
        );
        let (path, handle) = start_server(orchestrator.clone()).await;

        let mut client = DebateClient::connect_to(&path).await.unwrap();
        client.start_debate(DebateRequest::new("Pizza", "Ava", "Ben")).await.unwrap();
        let debate_id = match next_event(&mut client).await {
            ServerEvent::DebateStarted { debate, .. } => debate.id,
            other => panic!("unexpected event: {other:?}"),
        };

        client.advance_turn(debate_id, true).await.unwrap();
        assert!(matches!(next_event(&mut client).await, ServerEvent::Fragment { .. }));
        drop(client);

        // The session lock is released once the cancelled turn unwinds
        let snapshot = tokio::time::timeout(Duration::from_secs(5), orchestrator.snapshot(debate_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.turn_count, 0);
        assert_eq!(snapshot.current_speaker, "Ava");

        handle.abort();
        let _ = std::fs::remove_file(&path);
    }
}
