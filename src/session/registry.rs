//! Process-wide map of live sessions.
//!
//! The registry is the one structure mutated from multiple tasks. Its lock
//! covers map updates only, never a network call. Destroying a session
//! cancels its handle; the owning connection closes and the state machine's
//! inbound queue drains shut.

use crate::transcode::AudioChunk;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("session {0} is already connected")]
    DuplicateSession(String),
    #[error("session {0} not found")]
    NotFound(String),
}

/// Registry-side view of one live session.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    pub agent_id: u64,
    pub created_at: DateTime<Utc>,
    /// Bounded inbound audio queue owned by the session's state machine.
    pub input: mpsc::Sender<AudioChunk>,
    /// Updated by the state machine on every chunk; read by the idle sweep.
    pub last_activity: Arc<Mutex<Instant>>,
    /// Cancelled when the session is destroyed or evicted; the connection
    /// task watches this and closes.
    pub cancel: CancellationToken,
}

pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionHandle>>,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Register a new session. A live duplicate id is rejected, never
    /// silently replaced: killing an existing call on an id collision would
    /// be worse than refusing the newcomer.
    pub fn create(
        &self,
        session_id: &str,
        agent_id: u64,
        input: mpsc::Sender<AudioChunk>,
    ) -> Result<SessionHandle, RegistryError> {
        let handle = SessionHandle {
            agent_id,
            created_at: Utc::now(),
            input,
            last_activity: Arc::new(Mutex::new(Instant::now())),
            cancel: CancellationToken::new(),
        };

        let mut sessions = self.sessions.lock().unwrap();
        if sessions.contains_key(session_id) {
            return Err(RegistryError::DuplicateSession(session_id.to_string()));
        }
        sessions.insert(session_id.to_string(), handle.clone());
        log::info!(
            "session {} created for agent {} ({} live)",
            session_id,
            agent_id,
            sessions.len()
        );
        Ok(handle)
    }

    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.lock().unwrap().get(session_id).cloned()
    }

    /// Remove a session. Idempotent: destroying an absent id is a no-op.
    pub fn destroy(&self, session_id: &str) {
        let removed = self.sessions.lock().unwrap().remove(session_id);
        if let Some(handle) = removed {
            handle.cancel.cancel();
            log::info!("session {} destroyed", session_id);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().unwrap().is_empty()
    }

    /// Evict sessions idle past the threshold. Returns the evicted ids.
    pub fn sweep_idle(&self) -> Vec<String> {
        let mut sessions = self.sessions.lock().unwrap();
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, handle)| {
                handle
                    .last_activity
                    .lock()
                    .map(|last| last.elapsed() > self.idle_timeout)
                    .unwrap_or(false)
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            if let Some(handle) = sessions.remove(id) {
                handle.cancel.cancel();
            }
        }
        expired
    }

    /// Background sweep loop. The only component allowed to destroy a
    /// session without an explicit disconnect.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        log::info!("session sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        for id in registry.sweep_idle() {
                            log::info!("session {} evicted after idle timeout", id);
                        }
                    }
                }
            }
        })
    }
}
