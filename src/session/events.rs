//! Outbound session events.
//!
//! The transport only ever sees these four shapes; provider error types
//! never cross this boundary.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SessionEvent {
    /// A transcript of caller audio, or the greeting. Interim results carry
    /// `isFinal: false` and may be revised by a later event.
    Transcription {
        text: String,
        #[serde(rename = "isFinal")]
        is_final: bool,
    },
    /// The assistant's textual reply for one turn.
    Response { text: String },
    /// Synthesized speech for the preceding response, base64-encoded.
    Audio { audio: String },
    /// A turn failed; the session stays open for the next turn.
    Error { message: String },
}

impl SessionEvent {
    pub fn transcription(text: impl Into<String>, is_final: bool) -> Self {
        SessionEvent::Transcription {
            text: text.into(),
            is_final,
        }
    }

    pub fn response(text: impl Into<String>) -> Self {
        SessionEvent::Response { text: text.into() }
    }

    pub fn audio(bytes: &[u8]) -> Self {
        SessionEvent::Audio {
            audio: BASE64.encode(bytes),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        SessionEvent::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcription_json_shape() {
        let event = SessionEvent::transcription("hello", true);
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"transcription","text":"hello","isFinal":true}"#);
    }

    #[test]
    fn test_response_json_shape() {
        let json = serde_json::to_string(&SessionEvent::response("hi")).unwrap();
        assert_eq!(json, r#"{"type":"response","text":"hi"}"#);
    }

    #[test]
    fn test_audio_json_shape() {
        let json = serde_json::to_string(&SessionEvent::audio(&[0x01, 0x02])).unwrap();
        assert_eq!(json, r#"{"type":"audio","audio":"AQI="}"#);
    }

    #[test]
    fn test_error_json_shape() {
        let json = serde_json::to_string(&SessionEvent::error("boom")).unwrap();
        assert_eq!(json, r#"{"type":"error","message":"boom"}"#);
    }

    #[test]
    fn test_round_trip() {
        let event = SessionEvent::transcription("hey", false);
        let json = serde_json::to_string(&event).unwrap();
        let parsed: SessionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }
}
