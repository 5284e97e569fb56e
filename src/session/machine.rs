//! Per-session conversation state machine.
//!
//! One machine owns one live call. It is the only writer of that session's
//! state and history: chunks are consumed strictly in arrival order from the
//! session's inbound queue, and at most one provider call is in flight per
//! session at any time. Turns of different sessions run on independent tasks
//! and never interact.

use crate::agent::{Agent, KnowledgeDocument};
use crate::context::{
    build_conversation_context, closed_book_fallback, ConversationContext, ANSWER_MARKER,
    CANNOT_ANSWER_MARKER,
};
use crate::providers::{Message, ProviderSet};
use crate::session::events::SessionEvent;
use crate::transcode::{transcode_chunk, AudioChunk};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use strum::Display;
use tokio::sync::mpsc;

/// Inbound audio queue depth per session. Chunks arriving while a turn is in
/// flight queue up to this bound; beyond it the transport drops them with a
/// warning instead of letting a slow provider chain grow memory.
pub const INBOUND_QUEUE_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SessionState {
    Greeting,
    AwaitingAudio,
    Transcribing,
    Completing,
    Synthesizing,
    Error,
    Closed,
}

/// The outbound event channel is gone: the transport disconnected and the
/// session should wind down. Any in-flight provider result is discarded.
#[derive(Debug, PartialEq, Eq)]
pub struct TransportGone;

pub struct SessionStateMachine {
    session_id: String,
    agent: Agent,
    context: ConversationContext,
    closed_book: bool,
    /// User/assistant turns only, in strict chronological order. The system
    /// message is rebuilt fresh for every completion request, never stored.
    history: Vec<Message>,
    state: SessionState,
    providers: ProviderSet,
    events: mpsc::Sender<SessionEvent>,
    last_activity: Arc<Mutex<Instant>>,
}

impl SessionStateMachine {
    pub fn new(
        session_id: impl Into<String>,
        agent: Agent,
        documents: &[KnowledgeDocument],
        providers: ProviderSet,
        events: mpsc::Sender<SessionEvent>,
        last_activity: Arc<Mutex<Instant>>,
    ) -> Self {
        let context = build_conversation_context(&agent, documents);
        Self {
            session_id: session_id.into(),
            agent,
            context,
            closed_book: !documents.is_empty(),
            history: Vec::new(),
            state: SessionState::Greeting,
            providers,
            events,
            last_activity,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Run the session to completion: greet, then consume chunks in arrival
    /// order until the inbound queue closes or the transport goes away.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<AudioChunk>) {
        if self.greet().await.is_err() {
            self.state = SessionState::Closed;
            return;
        }

        while let Some(chunk) = inbound.recv().await {
            if self.state == SessionState::Closed {
                break;
            }
            if self.process_chunk(chunk).await.is_err() {
                log::info!(
                    "[{}] transport gone, discarding remaining work",
                    self.session_id
                );
                break;
            }
        }

        self.state = SessionState::Closed;
        log::info!("[{}] session closed after {} turns", self.session_id, self.history.len() / 2);
    }

    /// Emit the greeting and, if the agent has a voice, its audio.
    pub async fn greet(&mut self) -> Result<(), TransportGone> {
        let greeting = self.context.greeting_message.clone();
        self.emit(SessionEvent::transcription(&greeting, true))
            .await?;

        if let Some(voice_id) = self.agent.voice_id.clone() {
            // Greeting synthesis failure is non-fatal: the text greeting was
            // already delivered.
            match self
                .providers
                .synthesizer
                .synthesize(&greeting, &voice_id)
                .await
            {
                Ok(audio) => self.emit(SessionEvent::audio(&audio)).await?,
                Err(e) => {
                    log::warn!("[{}] greeting synthesis failed: {}", self.session_id, e)
                }
            }
        }

        self.state = SessionState::AwaitingAudio;
        Ok(())
    }

    /// Process one inbound audio chunk: transcribe, and on a final transcript
    /// run the completion and synthesis stages of the turn.
    pub async fn process_chunk(&mut self, chunk: AudioChunk) -> Result<(), TransportGone> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.touch();

        self.state = SessionState::Transcribing;
        let audio = transcode_chunk(chunk);
        let result = match self.providers.transcriber.transcribe(audio).await {
            Ok(result) => result,
            Err(e) => {
                log::error!("[{}] transcription failed: {}", self.session_id, e);
                return self.fail_turn("Transcription failed").await;
            }
        };

        if result.transcript.trim().is_empty() {
            // Silence or filler; nothing to transcribe, nothing to answer.
            self.state = SessionState::AwaitingAudio;
            return Ok(());
        }

        self.emit(SessionEvent::transcription(
            &result.transcript,
            result.is_final,
        ))
        .await?;

        if !result.is_final {
            // Interim result: the turn hasn't started, keep listening.
            self.state = SessionState::AwaitingAudio;
            return Ok(());
        }

        self.history.push(Message::user(&result.transcript));
        self.state = SessionState::Completing;

        let response_text = match self
            .providers
            .completer
            .complete(&self.completion_messages())
            .await
        {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                log::error!("[{}] empty completion", self.session_id);
                return self.fail_turn("No response generated").await;
            }
            Err(e) => {
                log::error!("[{}] completion failed: {}", self.session_id, e);
                return self.fail_turn("Failed to generate a response").await;
            }
        };

        let response_text = self.enforce_closed_book(response_text);

        self.history.push(Message::assistant(&response_text));
        self.emit(SessionEvent::response(&response_text)).await?;

        self.state = SessionState::Synthesizing;
        self.synthesize_response(&response_text).await?;

        self.state = SessionState::AwaitingAudio;
        Ok(())
    }

    /// Full message list for one completion request: exactly one system
    /// message built fresh, then the stored user/assistant turns.
    fn completion_messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history.len() + 1);
        messages.push(Message::system(self.context.system_message()));
        messages.extend(self.history.iter().cloned());
        messages
    }

    /// With documents assigned, a response must carry one of the two
    /// compliance markers; anything else is replaced by the canonical
    /// fallback rather than forwarded unvalidated.
    fn enforce_closed_book(&self, text: String) -> String {
        if !self.closed_book
            || text.contains(ANSWER_MARKER)
            || text.contains(CANNOT_ANSWER_MARKER)
        {
            return text;
        }
        log::warn!(
            "[{}] completion violated the closed-book contract, substituting fallback",
            self.session_id
        );
        closed_book_fallback(&self.context.document_names)
    }

    /// Synthesis failure is non-fatal: the textual response was already
    /// delivered, the caller just doesn't hear it.
    async fn synthesize_response(&mut self, text: &str) -> Result<(), TransportGone> {
        let Some(voice_id) = self.agent.voice_id.clone() else {
            return Ok(());
        };

        match self.providers.synthesizer.synthesize(text, &voice_id).await {
            Ok(audio) => self.emit(SessionEvent::audio(&audio)).await,
            Err(e) => {
                log::warn!("[{}] synthesis failed: {}", self.session_id, e);
                Ok(())
            }
        }
    }

    /// Turn-fatal failure: report it and return to listening. One failed
    /// turn never closes the session.
    async fn fail_turn(&mut self, message: &str) -> Result<(), TransportGone> {
        self.state = SessionState::Error;
        self.emit(SessionEvent::error(message)).await?;
        self.state = SessionState::AwaitingAudio;
        Ok(())
    }

    async fn emit(&self, event: SessionEvent) -> Result<(), TransportGone> {
        self.events.send(event).await.map_err(|_| TransportGone)
    }

    fn touch(&self) {
        if let Ok(mut last) = self.last_activity.lock() {
            *last = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Role;

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::AwaitingAudio.to_string(), "AwaitingAudio");
        assert_eq!(SessionState::Closed.to_string(), "Closed");
    }

    #[test]
    fn test_queue_depth_is_small() {
        assert_eq!(INBOUND_QUEUE_DEPTH, 8);
    }

    #[test]
    fn test_completion_messages_start_with_one_system_message() {
        let agent = Agent {
            id: 1,
            name: "Ava".to_string(),
            voice_id: None,
            greeting_message: None,
            system_prompt: None,
        };
        let (events, _rx) = mpsc::channel(8);
        let providers = crate::providers::ProviderSet {
            transcriber: std::sync::Arc::new(NoopTranscriber),
            completer: std::sync::Arc::new(NoopCompleter),
            synthesizer: std::sync::Arc::new(NoopSynthesizer),
        };
        let mut machine = SessionStateMachine::new(
            "s1",
            agent,
            &[],
            providers,
            events,
            Arc::new(Mutex::new(Instant::now())),
        );
        machine.history.push(Message::user("hi"));
        machine.history.push(Message::assistant("hello"));

        let messages = machine.completion_messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[2].role, Role::Assistant);
        // The system message is not stored in history.
        assert_eq!(machine.history().len(), 2);
    }

    struct NoopTranscriber;
    struct NoopCompleter;
    struct NoopSynthesizer;

    #[async_trait::async_trait]
    impl crate::providers::Transcriber for NoopTranscriber {
        async fn transcribe(
            &self,
            _audio: crate::transcode::TranscodedAudio,
        ) -> Result<crate::providers::TranscriptionResult, crate::providers::ProviderError>
        {
            Ok(crate::providers::TranscriptionResult {
                transcript: String::new(),
                is_final: true,
            })
        }
    }

    #[async_trait::async_trait]
    impl crate::providers::Completer for NoopCompleter {
        async fn complete(
            &self,
            _messages: &[Message],
        ) -> Result<String, crate::providers::ProviderError> {
            Ok("ok".to_string())
        }
    }

    #[async_trait::async_trait]
    impl crate::providers::Synthesizer for NoopSynthesizer {
        async fn synthesize(
            &self,
            _text: &str,
            _voice_id: &str,
        ) -> Result<Vec<u8>, crate::providers::ProviderError> {
            Ok(vec![])
        }
    }
}
