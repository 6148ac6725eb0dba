//! API key loading from the environment (and an optional `.env` file).

use crate::error::{Result, SpeechError};
use std::fmt;

pub const DEEPGRAM_API_KEY: &str = "DEEPGRAM_API_KEY";
pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";

/// Resolved keys for the hosted collaborators.
///
/// `Debug` redacts the values so keys never reach logs.
pub struct ApiKeys {
    pub deepgram: String,
    pub gemini: String,
}

impl fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeys")
            .field("deepgram", &redact(&self.deepgram))
            .field("gemini", &redact(&self.gemini))
            .finish()
    }
}

fn redact(s: &str) -> &str {
    if s.is_empty() { "" } else { "[REDACTED]" }
}

impl ApiKeys {
    /// Read `.env` if present, then both keys from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Credentials`] naming the first missing key.
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("loaded environment from {}", path.display());
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve both keys through `lookup`; blank values count as missing.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Credentials`] naming the first missing key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| SpeechError::Credentials(format!("{name} is not set")))
        };
        Ok(Self {
            deepgram: get(DEEPGRAM_API_KEY)?,
            gemini: get(GEMINI_API_KEY)?,
        })
    }
}
