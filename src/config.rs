//! Configuration types for the voice conversation agent.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for the agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Microphone and speaker settings.
    pub audio: AudioConfig,
    /// Live transcription transport settings.
    pub stt: SttConfig,
    /// Reply generation settings.
    pub llm: LlmConfig,
    /// Speech synthesis settings.
    pub tts: TtsConfig,
    /// Turn-taking and conversation settings.
    pub conversation: ConversationConfig,
}

/// Audio I/O configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output sample rate in Hz. Decoded payloads are resampled to this rate.
    pub output_sample_rate: u32,
    /// Input device name (None = system default).
    pub input_device: Option<String>,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            output_sample_rate: 24_000,
            input_device: None,
            output_device: None,
        }
    }
}

/// Live transcription (Deepgram listen) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// WebSocket endpoint.
    pub url: String,
    /// Recognition model.
    pub model: String,
    /// BCP-47 language tag.
    pub language: String,
    /// Sample encoding of the audio frames we send.
    pub encoding: String,
    /// Sample rate of the audio frames we send, in Hz.
    pub sample_rate: u32,
    /// Channel count of the audio frames we send.
    pub channels: u16,
    /// Whether the server should emit interim (non-final) results.
    pub interim_results: bool,
    /// Whether the server should punctuate and format transcripts.
    pub smart_format: bool,
    /// Whether the server should emit voice-activity events.
    pub vad_events: bool,
    /// Silence in ms after which the server marks speech as final.
    pub endpointing_ms: u32,
    /// Gap in ms after which the server emits an utterance-end event.
    pub utterance_end_ms: u32,
    /// Ask the server to skip its result batching delay.
    pub no_delay: bool,
    /// Interval between keep-alive messages, in seconds (0 = disabled).
    pub keepalive_secs: u64,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            url: "wss://api.deepgram.com/v1/listen".to_owned(),
            model: "nova-2".to_owned(),
            language: "en-US".to_owned(),
            encoding: "linear16".to_owned(),
            sample_rate: 16_000,
            channels: 1,
            interim_results: true,
            smart_format: true,
            vad_events: true,
            endpointing_ms: 300,
            utterance_end_ms: 1000,
            no_delay: true,
            keepalive_secs: 8,
        }
    }
}

/// Reply generation (Gemini) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// `generateContent` endpoint of the model to use.
    pub api_url: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Nucleus sampling threshold.
    pub top_p: f64,
    /// Top-k sampling limit.
    pub top_k: u32,
    /// Maximum tokens in a reply.
    pub max_output_tokens: u32,
    /// Sequences that stop generation.
    pub stop_sequences: Vec<String>,
    /// Block threshold applied to every harm category.
    pub safety_threshold: String,
    /// Number of most recent turns sent as context.
    pub history_turns: usize,
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
                .to_owned(),
            temperature: 0.7,
            top_p: 0.8,
            top_k: 40,
            max_output_tokens: 150,
            stop_sequences: vec!["Customer:".to_owned(), "\n\n".to_owned()],
            safety_threshold: "BLOCK_MEDIUM_AND_ABOVE".to_owned(),
            history_turns: 10,
            request_timeout_secs: 30,
        }
    }
}

/// Speech synthesis (Deepgram speak) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// HTTP endpoint.
    pub url: String,
    /// Voice model.
    pub model: String,
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            url: "https://api.deepgram.com/v1/speak".to_owned(),
            model: "aura-helios-en".to_owned(),
            request_timeout_secs: 30,
        }
    }
}

/// Turn-taking and conversation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Label used for assistant lines in the generation context.
    pub assistant_name: String,
    /// Label used for user lines in the generation context.
    pub user_label: String,
    /// Extra instructions appended to the built-in persona.
    pub system_prompt: String,
    /// Greeting spoken when the session starts.
    pub welcome_text: String,
    /// Goodbye spoken when a termination keyword is heard.
    pub farewell_text: String,
    /// Reply substituted when the generation request fails.
    pub fallback_text: String,
    /// Reply substituted when generation returns no usable text.
    pub empty_reply_text: String,
    /// Case-insensitive substrings that end the session.
    pub termination_keywords: Vec<String>,
    /// How long the playback consumer waits for a job before re-checking, in ms.
    pub playback_recv_timeout_ms: u64,
    /// Upper bound on waiting for in-flight replies at shutdown, in ms.
    pub shutdown_drain_timeout_ms: u64,
    /// Emit assistant replies in the order their utterances were finalized.
    pub strict_reply_order: bool,
    /// Print the conversation to stdout.
    pub console_output: bool,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            assistant_name: "DineAI".to_owned(),
            user_label: "Customer".to_owned(),
            system_prompt: String::new(),
            welcome_text: "Hello! Welcome to DineAI, your intelligent restaurant assistant. \
                I'm here to help you with table reservations and food orders. \
                How can I make your dining experience exceptional today?"
                .to_owned(),
            farewell_text: "Thank you for choosing DineAI! \
                Have a wonderful day and enjoy your dining experience!"
                .to_owned(),
            fallback_text: "I'm having some technical difficulties. Could you please try again?"
                .to_owned(),
            empty_reply_text: "I'm sorry, I didn't catch that. Could you please repeat?"
                .to_owned(),
            termination_keywords: [
                "end", "stop", "finished", "done", "goodbye", "bye", "thank you", "thanks",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            playback_recv_timeout_ms: 1000,
            shutdown_drain_timeout_ms: 10_000,
            strict_reply_order: true,
            console_output: true,
        }
    }
}

impl ConversationConfig {
    /// Persona plus any configured add-on instructions.
    pub fn effective_system_prompt(&self) -> String {
        crate::personality::assemble_prompt(&self.system_prompt)
    }

    pub fn playback_recv_timeout(&self) -> Duration {
        Duration::from_millis(self.playback_recv_timeout_ms.max(1))
    }

    pub fn shutdown_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_drain_timeout_ms)
    }
}

impl AgentConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::SpeechError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::SpeechError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/dineai/config.toml`.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp/dineai-config"))
            .join("dineai")
            .join("config.toml")
    }
}
