//! WebSocket transport.
//!
//! Binds one duplex WebSocket connection to one session: inbound binary
//! frames become audio chunks on the session's bounded queue, outbound
//! session events become JSON text frames. The connection path carries the
//! agent and session identifiers: `/ws/voice/{agent_id}/{session_id}`.

use crate::agent::AgentDirectory;
use crate::providers::ProviderSet;
use crate::session::events::SessionEvent;
use crate::session::machine::SessionStateMachine;
use crate::session::registry::SessionRegistry;
use crate::transcode::{AudioChunk, AudioEncoding};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

static CONNECTION_COUNT: AtomicU64 = AtomicU64::new(0);

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub bind_address: String,
    /// Per-session inbound audio queue depth.
    pub queue_depth: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8088".to_string(),
            queue_depth: crate::session::machine::INBOUND_QUEUE_DEPTH,
        }
    }
}

/// Shared wiring handed to each connection task.
#[derive(Clone)]
struct ConnectionContext {
    directory: Arc<dyn AgentDirectory>,
    registry: Arc<SessionRegistry>,
    providers: ProviderSet,
    queue_depth: usize,
}

pub struct VoiceServer {
    config: TransportConfig,
    context: ConnectionContext,
}

impl VoiceServer {
    pub fn new(
        config: TransportConfig,
        directory: Arc<dyn AgentDirectory>,
        registry: Arc<SessionRegistry>,
        providers: ProviderSet,
    ) -> Self {
        let queue_depth = config.queue_depth;
        Self {
            config,
            context: ConnectionContext {
                directory,
                registry,
                providers,
                queue_depth,
            },
        }
    }

    /// Accept connections until cancelled. One task per connection.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), TransportError> {
        let listener = TcpListener::bind(&self.config.bind_address).await?;
        log::info!("voice gateway listening on {}", self.config.bind_address);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("voice gateway shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let context = self.context.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, addr, context).await {
                                log::error!("connection from {} failed: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        log::error!("failed to accept connection: {}", e);
                    }
                }
            }
        }

        Ok(())
    }
}

/// Extract `(agent_id, session_id)` from a `/ws/voice/{agent}/{session}` path.
fn parse_path(path: &str) -> Result<(u64, String), String> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        ["ws", "voice", agent, session] => {
            let agent_id: u64 = agent
                .parse()
                .map_err(|_| format!("Invalid agent id: {}", agent))?;
            if session.is_empty() {
                return Err("Session ID required".to_string());
            }
            Ok((agent_id, session.to_string()))
        }
        _ => Err("Expected path /ws/voice/{agentId}/{sessionId}".to_string()),
    }
}

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Send a final error frame and close. Used for rejections that happen
/// before any session exists.
async fn reject(sink: &mut WsSink, message: &str) {
    if let Ok(frame) = serde_json::to_string(&SessionEvent::error(message)) {
        let _ = sink.send(Message::Text(frame.into())).await;
    }
    let _ = sink.close().await;
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    context: ConnectionContext,
) -> Result<(), TransportError> {
    let connection = CONNECTION_COUNT.fetch_add(1, Ordering::Relaxed) + 1;

    let mut path = None;
    let ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        path = Some(req.uri().path().to_string());
        Ok(resp)
    })
    .await?;
    log::info!("WebSocket connection #{} established from {}", connection, addr);

    let (mut sink, mut inbound_frames) = ws.split();

    // Validate identifiers and agent before any session state exists.
    let (agent_id, session_id) = match parse_path(path.as_deref().unwrap_or("")) {
        Ok(ids) => ids,
        Err(reason) => {
            log::warn!("connection #{} rejected: {}", connection, reason);
            reject(&mut sink, &reason).await;
            return Ok(());
        }
    };

    let Some(agent) = context.directory.get_agent(agent_id).await else {
        log::warn!("connection #{} rejected: agent {} not found", connection, agent_id);
        reject(&mut sink, &format!("Agent {} not found", agent_id)).await;
        return Ok(());
    };
    let documents = context.directory.get_documents_for_agent(agent_id).await;

    let (input_tx, input_rx) = mpsc::channel::<AudioChunk>(context.queue_depth);
    let (event_tx, mut event_rx) = mpsc::channel::<SessionEvent>(32);

    let handle = match context.registry.create(&session_id, agent_id, input_tx.clone()) {
        Ok(handle) => handle,
        Err(e) => {
            log::warn!("connection #{} rejected: {}", connection, e);
            reject(&mut sink, &e.to_string()).await;
            return Ok(());
        }
    };

    let machine = SessionStateMachine::new(
        &session_id,
        agent,
        &documents,
        context.providers.clone(),
        event_tx,
        handle.last_activity.clone(),
    );
    let machine_task = tokio::spawn(machine.run(input_rx));

    loop {
        tokio::select! {
            _ = handle.cancel.cancelled() => {
                log::info!("[{}] session evicted, closing connection", session_id);
                break;
            }
            event = event_rx.recv() => match event {
                Some(event) => {
                    let frame = serde_json::to_string(&event)?;
                    if sink.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                None => break, // machine ended
            },
            frame = inbound_frames.next() => match frame {
                Some(Ok(Message::Binary(data))) => {
                    let chunk = AudioChunk::new(data.as_slice().to_vec(), AudioEncoding::WebmOpus);
                    match input_tx.try_send(chunk) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            log::warn!(
                                "[{}] inbound audio queue full, dropping chunk",
                                session_id
                            );
                        }
                        Err(TrySendError::Closed(_)) => break,
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // text/ping/pong frames carry no audio
                Some(Err(e)) => {
                    log::warn!("connection #{} stream error: {}", connection, e);
                    break;
                }
            }
        }
    }

    // Disconnect: the session is destroyed; a provider call still in flight
    // completes or times out on its own and its result is discarded.
    context.registry.destroy(&session_id);
    drop(input_tx);
    drop(machine_task);
    log::info!("WebSocket connection #{} closed", connection);
    Ok(())
}
