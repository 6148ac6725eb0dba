//! Message types passed between pipeline stages.

use chrono::{DateTime, Utc};

/// One result from the live transcription transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEvent {
    /// Transcript text for this fragment (may be empty).
    pub text: String,
    /// The fragment text will not be revised further.
    pub is_final: bool,
    /// The speaker reached an endpoint; the utterance is complete.
    pub is_speech_final: bool,
}

impl TranscriptEvent {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            is_speech_final: false,
        }
    }

    pub fn finalized(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            is_speech_final: false,
        }
    }

    pub fn speech_final(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            is_speech_final: true,
        }
    }
}

/// Everything a transcription transport can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is open and accepting audio.
    Opened,
    /// A transcript result.
    Transcript(TranscriptEvent),
    /// A recoverable connection or protocol error.
    Error(String),
    /// The connection closed.
    Closed,
}

/// A chunk of linear16 little-endian audio for the transcription transport.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub bytes: Vec<u8>,
}

/// A complete user statement, joined from final transcript fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    text: String,
}

impl Utterance {
    pub(crate) fn new(text: String) -> Self {
        Self { text }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One recorded contribution to the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A synthesized audio payload scheduled for playback.
///
/// Ownership moves to the playback sequencer on submission; the payload is
/// dropped once it has been played (or failed to play).
#[derive(Debug)]
pub struct AudioJob {
    pub id: String,
    pub payload: Vec<u8>,
}

impl AudioJob {
    pub fn new(id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }

    /// A job for an assistant reply, with a unique id.
    pub fn response(payload: Vec<u8>) -> Self {
        Self::new(format!("response-{}", uuid::Uuid::new_v4().simple()), payload)
    }
}
