//! Reply generation backends.

pub mod gemini;

pub use gemini::GeminiClient;
