//! Runtime events emitted by the conversation session for UI and observability.
//!
//! Events are lightweight and sent best-effort over a broadcast channel, so
//! emitting never blocks a pipeline stage.

use crate::pipeline::state::SessionState;
use tokio::sync::broadcast;

/// Events that describe what the session is doing "right now".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// The session lifecycle changed.
    SessionState(SessionState),
    /// A finalized user utterance was accepted.
    UserUtterance(String),
    /// An assistant reply was recorded (it may or may not be spoken).
    AssistantReply(String),
    /// Playback of an audio job started.
    AssistantSpeechStart { job_id: String },
    /// Playback of an audio job finished.
    AssistantSpeechEnd { job_id: String, failed: bool },
    /// The transcription transport reported a recoverable error.
    TransportError(String),
}

/// Send an event if anyone is listening.
pub(crate) fn emit(tx: &Option<broadcast::Sender<RuntimeEvent>>, event: RuntimeEvent) {
    if let Some(tx) = tx {
        let _ = tx.send(event);
    }
}
