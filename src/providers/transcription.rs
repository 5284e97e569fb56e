use super::ProviderError;
use crate::transcode::TranscodedAudio;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

const PROVIDER: &str = "Deepgram";
const DEFAULT_BASE_URL: &str = "https://api.deepgram.com";

/// Speech-to-text seam. Implemented by the Deepgram client in production and
/// by stubs in tests.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: TranscodedAudio) -> Result<TranscriptionResult, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct TranscriptionConfig {
    pub language: String,
    pub punctuate: bool,
    pub interim_results: bool,
    pub request_timeout: Duration,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            punctuate: true,
            interim_results: true,
            request_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionResult {
    pub transcript: String,
    pub is_final: bool,
}

#[derive(Debug, Deserialize)]
struct ListenResponse {
    // Absent on one-shot requests, which are final by definition.
    is_final: Option<bool>,
    results: Option<ListenResults>,
}

#[derive(Debug, Deserialize)]
struct ListenResults {
    channels: Vec<ListenChannel>,
}

#[derive(Debug, Deserialize)]
struct ListenChannel {
    alternatives: Vec<ListenAlternative>,
}

#[derive(Debug, Deserialize)]
struct ListenAlternative {
    transcript: String,
}

pub struct DeepgramTranscription {
    client: Client,
    api_key: String,
    base_url: String,
    config: TranscriptionConfig,
}

impl DeepgramTranscription {
    pub fn new(api_key: String) -> Result<Self, ProviderError> {
        Self::with_config(api_key, TranscriptionConfig::default())
    }

    pub fn with_config(
        api_key: String,
        config: TranscriptionConfig,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ProviderError::request(PROVIDER, e))?;

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            config,
        })
    }

    fn listen_url(&self, audio: &TranscodedAudio) -> Result<Url, ProviderError> {
        let mut url =
            Url::parse(&format!("{}/v1/listen", self.base_url)).map_err(|e| {
                ProviderError::Malformed {
                    provider: PROVIDER,
                    detail: format!("invalid base URL: {}", e),
                }
            })?;

        url.query_pairs_mut()
            .append_pair("encoding", audio.encoding.query_name())
            .append_pair("language", &self.config.language)
            .append_pair("punctuate", &self.config.punctuate.to_string())
            .append_pair("interim_results", &self.config.interim_results.to_string());

        Ok(url)
    }
}

#[async_trait]
impl Transcriber for DeepgramTranscription {
    async fn transcribe(
        &self,
        audio: TranscodedAudio,
    ) -> Result<TranscriptionResult, ProviderError> {
        let url = self.listen_url(&audio)?;

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", audio.mime_type)
            .body(audio.bytes)
            .send()
            .await
            .map_err(|e| ProviderError::request(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                body,
            });
        }

        let payload: ListenResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::Malformed {
                    provider: PROVIDER,
                    detail: e.to_string(),
                })?;

        let transcript = payload
            .results
            .as_ref()
            .and_then(|r| r.channels.first())
            .and_then(|c| c.alternatives.first())
            .map(|a| a.transcript.clone())
            .unwrap_or_default();

        Ok(TranscriptionResult {
            transcript,
            is_final: payload.is_final.unwrap_or(true),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcode::{transcode_chunk, AudioChunk, AudioEncoding};

    #[test]
    fn test_config_defaults() {
        let config = TranscriptionConfig::default();
        assert_eq!(config.language, "en-US");
        assert!(config.punctuate);
        assert!(config.interim_results);
        assert_eq!(config.request_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_listen_url_carries_encoding() {
        let stt = DeepgramTranscription::new("test_key".to_string()).unwrap();
        let audio = transcode_chunk(AudioChunk::new(vec![0u8; 4], AudioEncoding::WebmOpus));
        let url = stt.listen_url(&audio).unwrap();

        let query = url.query().unwrap();
        assert!(query.contains("encoding=webm"));
        assert!(query.contains("language=en-US"));
        assert!(query.contains("interim_results=true"));
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{
            "is_final": false,
            "results": {"channels": [{"alternatives": [{"transcript": "hello there"}]}]}
        }"#;
        let payload: ListenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(payload.is_final, Some(false));
        assert_eq!(
            payload.results.unwrap().channels[0].alternatives[0].transcript,
            "hello there"
        );
    }

    #[test]
    fn test_response_without_results_is_empty_transcript() {
        let payload: ListenResponse = serde_json::from_str("{}").unwrap();
        assert!(payload.results.is_none());
        assert_eq!(payload.is_final, None);
    }
}
