//! Shared test doubles for the pipeline unit tests.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use crate::error::{Result, SpeechError};
use crate::pipeline::messages::{AudioFrame, Role, TranscriptEvent, TransportEvent, Turn};
use crate::pipeline::state::SpeakingGate;
use crate::traits::{
    AudioInput, AudioOutput, AudioSender, ReplyGenerator, SpeechSynthesizer,
    TranscriptionTransport,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Audio output that records payloads (as UTF-8) instead of playing them.
#[derive(Clone, Default)]
pub struct RecordingOutput {
    played: Arc<Mutex<Vec<String>>>,
    gate_seen: Arc<Mutex<Vec<bool>>>,
    gate: Option<SpeakingGate>,
    fail_on: Option<String>,
    panic_on: Option<String>,
    delay: Duration,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the gate state each time a payload starts.
    pub fn observing(mut self, gate: SpeakingGate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn failing_on(mut self, payload: &str) -> Self {
        self.fail_on = Some(payload.to_owned());
        self
    }

    pub fn panicking_on(mut self, payload: &str) -> Self {
        self.panic_on = Some(payload.to_owned());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }

    pub fn gate_seen(&self) -> Vec<bool> {
        self.gate_seen.lock().unwrap().clone()
    }
}

impl AudioOutput for RecordingOutput {
    fn play(&mut self, payload: &[u8]) -> Result<()> {
        let text = String::from_utf8_lossy(payload).into_owned();
        if let Some(gate) = &self.gate {
            self.gate_seen.lock().unwrap().push(gate.is_speaking());
        }
        if self.panic_on.as_deref() == Some(text.as_str()) {
            panic!("simulated output panic");
        }
        self.played.lock().unwrap().push(text.clone());
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail_on.as_deref() == Some(text.as_str()) {
            return Err(SpeechError::Audio("simulated device failure".into()));
        }
        Ok(())
    }
}

/// Generator that answers `reply to: <last user text>` unless scripted otherwise.
#[derive(Clone, Default)]
pub struct ScriptedGenerator {
    replies: Arc<Mutex<HashMap<String, Result<String>>>>,
    delays: Arc<Mutex<HashMap<String, Duration>>>,
    calls: Arc<Mutex<Vec<Vec<Turn>>>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, user_text: &str, result: Result<String>) -> Self {
        self.replies
            .lock()
            .unwrap()
            .insert(user_text.to_owned(), result);
        self
    }

    pub fn delay(self, user_text: &str, delay: Duration) -> Self {
        self.delays
            .lock()
            .unwrap()
            .insert(user_text.to_owned(), delay);
        self
    }

    /// The history passed to each call.
    pub fn calls(&self) -> Vec<Vec<Turn>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReplyGenerator for ScriptedGenerator {
    async fn generate(&self, history: &[Turn]) -> Result<String> {
        self.calls.lock().unwrap().push(history.to_vec());
        let last_user = history
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.text.clone())
            .unwrap_or_default();
        let delay = self.delays.lock().unwrap().get(&last_user).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.replies.lock().unwrap().remove(&last_user) {
            Some(result) => result,
            None => Ok(format!("reply to: {last_user}")),
        }
    }
}

/// Synthesizer that returns the text bytes, failing for texts containing a marker.
#[derive(Clone, Default)]
pub struct EchoSynthesizer {
    fail_containing: Option<String>,
    slow_containing: Option<(String, Duration)>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl EchoSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_containing(mut self, marker: &str) -> Self {
        self.fail_containing = Some(marker.to_owned());
        self
    }

    /// Sleep before answering texts containing `marker`.
    pub fn slow_containing(mut self, marker: &str, delay: Duration) -> Self {
        self.slow_containing = Some((marker.to_owned(), delay));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for EchoSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        self.calls.lock().unwrap().push(text.to_owned());
        if let Some((marker, delay)) = &self.slow_containing
            && text.contains(marker.as_str())
        {
            tokio::time::sleep(*delay).await;
        }
        if let Some(marker) = &self.fail_containing
            && text.contains(marker.as_str())
        {
            return Err(SpeechError::Tts("simulated synthesis failure".into()));
        }
        Ok(text.as_bytes().to_vec())
    }
}

/// Transport fed by the test instead of a network connection.
#[derive(Clone)]
pub struct FakeTransport {
    events: Arc<Mutex<Option<mpsc::Sender<TransportEvent>>>>,
    started: Arc<watch::Sender<bool>>,
    frames: Arc<AtomicUsize>,
    stopped: Arc<AtomicBool>,
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self {
            events: Arc::default(),
            started: Arc::new(watch::channel(false).0),
            frames: Arc::default(),
            stopped: Arc::default(),
        }
    }
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn wait_started(&self) {
        let mut rx = self.started.subscribe();
        rx.wait_for(|started| *started).await.unwrap();
    }

    pub async fn push(&self, event: TransportEvent) {
        let tx = self.events.lock().unwrap().clone();
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }

    /// Deliver one complete utterance as a single speech-final fragment.
    pub async fn say(&self, text: &str) {
        self.push(TransportEvent::Transcript(TranscriptEvent::speech_final(text)))
            .await;
    }

    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptionTransport for FakeTransport {
    async fn start(&mut self, events: mpsc::Sender<TransportEvent>) -> Result<AudioSender> {
        *self.events.lock().unwrap() = Some(events);
        let (tx, mut rx) = mpsc::channel::<AudioFrame>(16);
        let frames = Arc::clone(&self.frames);
        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                frames.fetch_add(1, Ordering::SeqCst);
            }
        });
        self.started.send_replace(true);
        Ok(tx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        self.events.lock().unwrap().take();
        Ok(())
    }
}

/// Microphone that sends one silent frame on start.
#[derive(Clone, Default)]
pub struct FakeMicrophone {
    finished: Arc<AtomicBool>,
}

impl FakeMicrophone {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

impl AudioInput for FakeMicrophone {
    fn start(&mut self, frames: AudioSender) -> Result<()> {
        let _ = frames.try_send(AudioFrame { bytes: vec![0; 320] });
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }
}
