//! Capability interfaces for the external collaborators the session drives.
//!
//! The turn-taking core only talks to these traits; the concrete Deepgram,
//! Gemini and cpal implementations live in [`crate::stt`], [`crate::llm`],
//! [`crate::tts`] and [`crate::audio`].

use crate::error::Result;
use crate::pipeline::messages::{AudioFrame, TransportEvent, Turn};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Where captured audio frames are sent. Sending on it is the transport's
/// `send(frame)` operation.
pub type AudioSender = mpsc::Sender<AudioFrame>;

/// Streaming speech recognition over an open audio session.
#[async_trait]
pub trait TranscriptionTransport: Send {
    /// Open the session. Results and errors are delivered on `events`; audio
    /// frames pushed into the returned sender are forwarded to the recognizer.
    async fn start(&mut self, events: mpsc::Sender<TransportEvent>) -> Result<AudioSender>;

    /// Close the session. Calling `stop` on a stopped transport is a no-op.
    async fn stop(&mut self) -> Result<()>;
}

/// Microphone capture feeding a transcription transport.
pub trait AudioInput: Send {
    /// Begin streaming frames into `frames`.
    fn start(&mut self, frames: AudioSender) -> Result<()>;

    /// Stop capturing. Calling `finish` twice is a no-op.
    fn finish(&mut self) -> Result<()>;
}

/// Conversational reply generation.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Produce the assistant's next line given recent turns, oldest first.
    async fn generate(&self, history: &[Turn]) -> Result<String>;
}

/// Text-to-speech.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Render `text` as an encoded audio payload.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// Blocking audio output.
pub trait AudioOutput: Send {
    /// Play an encoded payload to completion.
    fn play(&mut self, payload: &[u8]) -> Result<()>;
}
