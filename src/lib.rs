//! DineAI: real-time voice assistant for restaurant reservations and orders.
//!
//! The crate is a turn-taking engine around four hosted or device
//! collaborators:
//! Microphone → live STT → utterance buffer → reply units (LLM, TTS) →
//! playback queue → Speaker
//!
//! # Architecture
//!
//! - **Utterance buffer**: joins final transcript fragments into utterances,
//!   ignoring everything heard while the assistant is speaking
//! - **Reply pipeline**: one tracked task per utterance; generation runs
//!   concurrently, emission waits for its turn and for the speaker
//! - **Playback sequencer**: single consumer, FIFO, raises the speaking gate
//!   around each payload
//! - **Session**: startup, termination phrase or interrupt, ordered drain
//!
//! Collaborators sit behind the traits in [`traits`]; the shipped
//! implementations use Deepgram (live STT and Speak), Gemini and `cpal`.

pub mod audio;
pub mod config;
pub mod credentials;
pub mod error;
pub mod llm;
pub mod personality;
pub mod pipeline;
pub mod runtime;
pub mod stt;
pub mod traits;
pub mod tts;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::AgentConfig;
pub use error::{Result, SpeechError};
pub use pipeline::session::{Collaborators, ConversationSession, SessionHandle, SessionSummary};
pub use runtime::RuntimeEvent;
