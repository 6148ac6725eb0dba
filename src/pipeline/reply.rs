//! Turns one finalized utterance into a recorded, spoken assistant reply.

use crate::config::AgentConfig;
use crate::error::SpeechError;
use crate::pipeline::ledger::ConversationLedger;
use crate::pipeline::messages::{AudioJob, Turn, Utterance};
use crate::pipeline::ordering::ReplyTicket;
use crate::pipeline::playback::PlaybackHandle;
use crate::pipeline::state::{SessionCell, SpeakingGate};
use crate::runtime::{RuntimeEvent, emit};
use crate::traits::{ReplyGenerator, SpeechSynthesizer};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Fixed texts and limits a reply unit needs.
#[derive(Debug, Clone)]
pub struct ReplySettings {
    pub history_turns: usize,
    pub termination_keywords: Vec<String>,
    pub farewell_text: String,
    pub fallback_text: String,
    pub empty_reply_text: String,
    pub assistant_name: String,
    pub console_output: bool,
}

impl ReplySettings {
    pub fn from_config(config: &AgentConfig) -> Self {
        let conv = &config.conversation;
        Self {
            history_turns: config.llm.history_turns,
            termination_keywords: conv.termination_keywords.clone(),
            farewell_text: conv.farewell_text.clone(),
            fallback_text: conv.fallback_text.clone(),
            empty_reply_text: conv.empty_reply_text.clone(),
            assistant_name: conv.assistant_name.clone(),
            console_output: conv.console_output,
        }
    }
}

/// How a reply unit finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// A termination phrase ended the session and the farewell was handled.
    Farewell,
    /// A termination phrase arrived while the session was already ending.
    AlreadyEnding,
    /// The reply was recorded and its audio queued.
    Queued,
    /// The reply was recorded but synthesis failed, so nothing plays.
    Unspoken,
    /// The session left `Active` before the reply's audio could be queued.
    Abandoned,
}

/// `true` if the case-folded text contains any keyword as a substring.
pub fn is_termination(text: &str, keywords: &[String]) -> bool {
    let folded = text.to_lowercase();
    keywords
        .iter()
        .filter(|k| !k.is_empty())
        .any(|k| folded.contains(&k.to_lowercase()))
}

/// Shared by every reply unit of a session. Cheap to clone.
#[derive(Clone)]
pub struct ReplyPipeline {
    generator: Arc<dyn ReplyGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    ledger: ConversationLedger,
    gate: SpeakingGate,
    session: SessionCell,
    playback: PlaybackHandle,
    settings: Arc<ReplySettings>,
    runtime_tx: Option<broadcast::Sender<RuntimeEvent>>,
}

impl ReplyPipeline {
    pub fn new(
        generator: Arc<dyn ReplyGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        ledger: ConversationLedger,
        gate: SpeakingGate,
        session: SessionCell,
        playback: PlaybackHandle,
        settings: ReplySettings,
    ) -> Self {
        Self {
            generator,
            synthesizer,
            ledger,
            gate,
            session,
            playback,
            settings: Arc::new(settings),
            runtime_tx: None,
        }
    }

    pub fn with_runtime_events(mut self, tx: broadcast::Sender<RuntimeEvent>) -> Self {
        self.runtime_tx = Some(tx);
        self
    }

    /// Run one reply unit to completion.
    ///
    /// The ticket is held for the whole unit and released when this returns,
    /// whichever branch it returns from.
    pub async fn handle(&self, utterance: Utterance, ticket: ReplyTicket) -> ReplyOutcome {
        let text = utterance.into_text();

        if is_termination(&text, &self.settings.termination_keywords) {
            return self.terminate(&text).await;
        }
        if !self.session.is_active() {
            debug!("session inactive, dropping utterance #{}", ticket.seq());
            return ReplyOutcome::Abandoned;
        }

        self.ledger.append(Turn::user(text.trim()));
        let history = self.ledger.recent(self.settings.history_turns);
        let reply = self.generate(&history).await;

        tokio::select! {
            () = ticket.wait_turn() => {}
            () = self.session.wait_until_inactive() => {}
        }
        tokio::select! {
            () = self.gate.wait_idle() => {}
            () = self.session.wait_until_inactive() => {}
        }
        if !self.session.is_active() {
            debug!("session ended while reply #{} was waiting", ticket.seq());
            return ReplyOutcome::Abandoned;
        }

        if !self.ledger.append(Turn::assistant(reply.clone())) {
            return ReplyOutcome::Abandoned;
        }
        if self.settings.console_output {
            println!("{}: {reply}", self.settings.assistant_name);
        }
        emit(&self.runtime_tx, RuntimeEvent::AssistantReply(reply.clone()));

        match self.synthesizer.synthesize(&reply).await {
            Ok(_) if !self.session.is_active() => {
                debug!("session ended during synthesis of reply #{}", ticket.seq());
                ReplyOutcome::Abandoned
            }
            Ok(payload) => match self.playback.enqueue(AudioJob::response(payload)) {
                Ok(()) => ReplyOutcome::Queued,
                Err(e) => {
                    warn!("could not queue reply audio: {e}");
                    ReplyOutcome::Unspoken
                }
            },
            Err(e) => {
                warn!("synthesis failed, reply stays text-only: {e}");
                ReplyOutcome::Unspoken
            }
        }
    }

    /// Synthesize fixed text and queue it under `job_id`. Returns `true` if queued.
    pub async fn speak(&self, job_id: &str, text: &str) -> bool {
        match self.synthesizer.synthesize(text).await {
            Ok(payload) => match self.playback.enqueue(AudioJob::new(job_id, payload)) {
                Ok(()) => true,
                Err(e) => {
                    warn!("could not queue {job_id} audio: {e}");
                    false
                }
            },
            Err(e) => {
                warn!("synthesis of {job_id} failed: {e}");
                false
            }
        }
    }

    async fn terminate(&self, text: &str) -> ReplyOutcome {
        if !self.session.begin_ending("termination phrase") {
            return ReplyOutcome::AlreadyEnding;
        }
        info!("termination phrase heard: {text:?}");
        if self.settings.console_output {
            println!("{}: {}", self.settings.assistant_name, self.settings.farewell_text);
        }
        self.speak("farewell", &self.settings.farewell_text).await;
        ReplyOutcome::Farewell
    }

    async fn generate(&self, history: &[Turn]) -> String {
        match self.generator.generate(history).await {
            Ok(reply) if !reply.trim().is_empty() => reply.trim().to_owned(),
            Ok(_) | Err(SpeechError::EmptyReply) => {
                warn!("generation returned no usable text");
                self.settings.empty_reply_text.clone()
            }
            Err(e) => {
                warn!("generation failed: {e}");
                self.settings.fallback_text.clone()
            }
        }
    }
}
