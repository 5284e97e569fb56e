use super::ProviderError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

const PROVIDER: &str = "ElevenLabs";
const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io/v1";

/// Text-to-speech seam.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize speech for `text` with the given voice. Returns raw audio
    /// bytes (MP3).
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    pub model: String,
    pub stability: f32,
    pub similarity_boost: f32,
    /// Longer than the other providers; synthesis time grows with text length.
    pub request_timeout: Duration,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            model: "eleven_monolingual_v1".to_string(),
            stability: 0.75,
            similarity_boost: 0.75,
            request_timeout: Duration::from_secs(45),
        }
    }
}

pub struct ElevenLabsSynthesis {
    client: Client,
    api_key: String,
    base_url: String,
    config: SynthesisConfig,
}

impl ElevenLabsSynthesis {
    pub fn new(api_key: String) -> Result<Self, ProviderError> {
        Self::with_config(api_key, SynthesisConfig::default())
    }

    pub fn with_config(api_key: String, config: SynthesisConfig) -> Result<Self, ProviderError> {
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

    /// Clamp voice settings into the provider's accepted range.
    pub fn set_voice_settings(&mut self, stability: f32, similarity_boost: f32) {
        self.config.stability = stability.clamp(0.0, 1.0);
        self.config.similarity_boost = similarity_boost.clamp(0.0, 1.0);
    }
}

#[async_trait]
impl Synthesizer for ElevenLabsSynthesis {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, ProviderError> {
        let url = format!("{}/text-to-speech/{}", self.base_url, voice_id);

        let payload = json!({
            "text": text,
            "model_id": self.config.model,
            "voice_settings": {
                "stability": self.config.stability,
                "similarity_boost": self.config.similarity_boost,
            }
        });

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .header("Accept", "audio/mpeg")
            .json(&payload)
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

        let audio = response
            .bytes()
            .await
            .map_err(|e| ProviderError::request(PROVIDER, e))?;

        Ok(audio.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SynthesisConfig::default();
        assert_eq!(config.model, "eleven_monolingual_v1");
        assert_eq!(config.stability, 0.75);
        assert_eq!(config.similarity_boost, 0.75);
        assert_eq!(config.request_timeout, Duration::from_secs(45));
    }

    #[test]
    fn test_voice_settings_clamping() {
        let mut tts = ElevenLabsSynthesis::new("test_key".to_string()).unwrap();
        tts.set_voice_settings(2.0, -0.5);
        assert_eq!(tts.config.stability, 1.0);
        assert_eq!(tts.config.similarity_boost, 0.0);
    }
}
