//! Microphone capture and speaker playback via cpal.

pub mod capture;
pub mod playback;

pub use capture::CpalMicrophone;
pub use playback::CpalSpeaker;
