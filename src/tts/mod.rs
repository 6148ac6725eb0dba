//! Text-to-speech synthesis backends.

pub mod deepgram;

pub use deepgram::DeepgramSpeak;
