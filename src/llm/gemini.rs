//! Reply generation through the Gemini `generateContent` HTTP API.
//!
//! The conversation is rendered as one text part: persona, a
//! `=== Current Conversation ===` marker, one labelled line per turn, and a
//! trailing assistant label for the model to continue.

use crate::config::{ConversationConfig, LlmConfig};
use crate::error::{Result, SpeechError};
use crate::pipeline::messages::{Role, Turn};
use crate::traits::ReplyGenerator;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Harm categories every request sets a block threshold for.
const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
    pub safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub max_output_tokens: u32,
    pub stop_sequences: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SafetySetting {
    pub category: String,
    pub threshold: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Content,
}

/// Generation collaborator backed by Gemini.
pub struct GeminiClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    system_prompt: String,
    user_label: String,
    assistant_label: String,
    generation: GenerationConfig,
    safety: Vec<SafetySetting>,
}

impl GeminiClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        llm: &LlmConfig,
        conversation: &ConversationConfig,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(llm.request_timeout_secs))
            .build()
            .map_err(|e| SpeechError::Llm(format!("cannot build HTTP client: {e}")))?;

        info!("Gemini generation configured: {}", llm.api_url);

        Ok(Self {
            http,
            api_url: llm.api_url.clone(),
            api_key: api_key.into(),
            system_prompt: conversation.effective_system_prompt(),
            user_label: conversation.user_label.clone(),
            assistant_label: conversation.assistant_name.clone(),
            generation: GenerationConfig {
                temperature: llm.temperature,
                top_p: llm.top_p,
                top_k: llm.top_k,
                max_output_tokens: llm.max_output_tokens,
                stop_sequences: llm.stop_sequences.clone(),
            },
            safety: HARM_CATEGORIES
                .iter()
                .map(|category| SafetySetting {
                    category: (*category).to_owned(),
                    threshold: llm.safety_threshold.clone(),
                })
                .collect(),
        })
    }

    /// Build the request body for a history, oldest turn first.
    pub fn build_request(&self, history: &[Turn]) -> GenerateRequest {
        let text = format_context(
            &self.system_prompt,
            history,
            &self.user_label,
            &self.assistant_label,
        );
        GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: Some(text) }],
            }],
            generation_config: self.generation.clone(),
            safety_settings: self.safety.clone(),
        }
    }
}

/// Render persona plus labelled turns, ending with an open assistant line.
pub fn format_context(
    system_prompt: &str,
    history: &[Turn],
    user_label: &str,
    assistant_label: &str,
) -> String {
    let mut context = format!("{system_prompt}\n\n=== Current Conversation ===\n");
    for turn in history {
        let label = match turn.role {
            Role::User => user_label,
            Role::Assistant => assistant_label,
        };
        context.push_str(label);
        context.push_str(": ");
        context.push_str(&turn.text);
        context.push('\n');
    }
    context.push('\n');
    context.push_str(assistant_label);
    context.push(':');
    context
}

/// First candidate's first text part, with the assistant label removed.
///
/// # Errors
///
/// Returns [`SpeechError::EmptyReply`] when there is no usable text.
pub fn parse_reply(response: &GenerateResponse, assistant_label: &str) -> Result<String> {
    let text = response
        .candidates
        .first()
        .and_then(|c| c.content.parts.first())
        .and_then(|p| p.text.as_deref())
        .ok_or(SpeechError::EmptyReply)?;

    let reply = text.replace(&format!("{assistant_label}:"), "");
    let reply = reply.trim();
    if reply.is_empty() {
        return Err(SpeechError::EmptyReply);
    }
    Ok(reply.to_owned())
}

/// Pull `error.message` out of an error body, falling back to the raw body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_owned())
}

#[async_trait]
impl ReplyGenerator for GeminiClient {
    async fn generate(&self, history: &[Turn]) -> Result<String> {
        let body = self.build_request(history);
        debug!("requesting reply with {} turns of context", history.len());

        let response = self
            .http
            .post(&self.api_url)
            .header("X-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SpeechError::Llm(format!("Gemini request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(SpeechError::Llm(format!(
                "Gemini HTTP {}: {}",
                status.as_u16(),
                extract_error_message(&body_text)
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::Llm(format!("Gemini response decode failed: {e}")))?;
        parse_reply(&parsed, &self.assistant_label)
    }
}
