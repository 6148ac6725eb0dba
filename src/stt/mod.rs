//! Live speech-to-text transports.

pub mod deepgram;

pub use deepgram::DeepgramLive;
