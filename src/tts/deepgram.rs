//! Speech synthesis through the Deepgram Speak HTTP API.

use crate::config::TtsConfig;
use crate::error::{Result, SpeechError};
use crate::traits::SpeechSynthesizer;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Serialize)]
struct SpeakRequest<'a> {
    text: &'a str,
}

/// Synthesis collaborator returning encoded (MP3) audio bytes.
pub struct DeepgramSpeak {
    http: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
}

impl DeepgramSpeak {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &TtsConfig, api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| SpeechError::Tts(format!("cannot build HTTP client: {e}")))?;
        info!("Deepgram synthesis configured: voice {}", config.model);
        Ok(Self {
            http,
            url: config.url.clone(),
            model: config.model.clone(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for DeepgramSpeak {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .post(&self.url)
            .query(&[("model", self.model.as_str())])
            .header("Authorization", format!("Token {}", self.api_key))
            .json(&SpeakRequest { text })
            .send()
            .await
            .map_err(|e| SpeechError::Tts(format!("Deepgram speak request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Tts(format!(
                "Deepgram speak HTTP {}: {body}",
                status.as_u16()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SpeechError::Tts(format!("Deepgram speak body failed: {e}")))?;
        if bytes.is_empty() {
            return Err(SpeechError::Tts("Deepgram speak returned no audio".into()));
        }
        debug!("synthesized {} bytes for {} chars", bytes.len(), text.len());
        Ok(bytes.to_vec())
    }
}
