//! Accumulates streaming transcript fragments into finalized utterances.

use crate::pipeline::messages::{TranscriptEvent, Utterance};
use crate::pipeline::state::{SessionCell, SpeakingGate};

/// What the buffer did with one transcript event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intake {
    /// Dropped: the assistant is speaking or the session is winding down.
    Suppressed,
    /// Dropped: empty text or an interim (non-final) result.
    Ignored,
    /// Retained; the utterance is not complete yet.
    Buffered,
    /// The speaker reached an endpoint and the buffer was flushed.
    Utterance(Utterance),
}

/// Ordered final fragments since the last flush.
///
/// Single writer: only the transcript intake stage owns a buffer.
#[derive(Debug, Default)]
pub struct UtteranceBuffer {
    fragments: Vec<String>,
}

impl UtteranceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fragments retained since the last flush.
    pub fn pending(&self) -> &[String] {
        &self.fragments
    }

    /// Feed one transcript event.
    ///
    /// Events are only accepted while the session is active and the speaking
    /// gate is idle, so the agent never transcribes its own voice. Interim
    /// results are skipped; final fragments are retained, and a speech-final
    /// fragment flushes everything retained into one space-joined utterance.
    pub fn ingest(
        &mut self,
        event: &TranscriptEvent,
        gate: &SpeakingGate,
        session: &SessionCell,
    ) -> Intake {
        if gate.is_speaking() || !session.is_active() {
            return Intake::Suppressed;
        }
        if event.text.is_empty() || !event.is_final {
            return Intake::Ignored;
        }

        self.fragments.push(event.text.clone());
        if !event.is_speech_final {
            return Intake::Buffered;
        }

        let text = std::mem::take(&mut self.fragments).join(" ");
        Intake::Utterance(Utterance::new(text))
    }
}
