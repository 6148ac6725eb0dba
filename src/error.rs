//! Error types for the dineai conversation agent.

/// Top-level error type for the voice agent.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    /// Audio device, stream or decode error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Live transcription transport error.
    #[error("STT error: {0}")]
    Stt(String),

    /// Reply generation request failed.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Reply generation returned no usable text.
    #[error("LLM returned an empty reply")]
    EmptyReply,

    /// Text-to-speech synthesis error.
    #[error("TTS error: {0}")]
    Tts(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Missing or unreadable API credentials.
    #[error("credentials error: {0}")]
    Credentials(String),

    /// Session lifecycle error.
    #[error("session error: {0}")]
    Session(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, SpeechError>;
