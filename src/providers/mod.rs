//! Provider clients.
//!
//! Each client wraps exactly one outbound HTTP call. None of them retry:
//! a failed call surfaces to the session as a failed turn rather than
//! adding unbounded latency to a live call. Hard timeouts are carried on
//! each client's `reqwest::Client`, so a hung provider fails like any other
//! request error.

pub mod completion;
pub mod synthesis;
pub mod transcription;

pub use completion::{Completer, CompletionConfig, Message, OpenAiCompletion, Role};
pub use synthesis::{ElevenLabsSynthesis, Synthesizer, SynthesisConfig};
pub use transcription::{
    DeepgramTranscription, Transcriber, TranscriptionConfig, TranscriptionResult,
};

use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{provider} API error: {status} - {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} request failed: {source}")]
    Request {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} returned a malformed payload: {detail}")]
    Malformed {
        provider: &'static str,
        detail: String,
    },

    #[error("{provider} returned an empty completion")]
    EmptyCompletion { provider: &'static str },
}

impl ProviderError {
    pub(crate) fn request(provider: &'static str, source: reqwest::Error) -> Self {
        ProviderError::Request { provider, source }
    }

    /// Provider the error originated from, for diagnostics.
    pub fn provider(&self) -> &'static str {
        match self {
            ProviderError::Api { provider, .. }
            | ProviderError::Request { provider, .. }
            | ProviderError::Malformed { provider, .. }
            | ProviderError::EmptyCompletion { provider } => provider,
        }
    }
}

/// The three provider seams a session needs, bundled for wiring.
#[derive(Clone)]
pub struct ProviderSet {
    pub transcriber: Arc<dyn Transcriber>,
    pub completer: Arc<dyn Completer>,
    pub synthesizer: Arc<dyn Synthesizer>,
}
