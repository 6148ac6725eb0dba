//! Session controller: owns the lifecycle of one conversation.
//!
//! Startup order is playback consumer, transcription transport, microphone,
//! welcome. The controller then waits until the session leaves `Active`
//! (termination phrase, external interrupt or hard abort) and drains:
//!
//! 1. stop the microphone and the transport,
//! 2. stop transcript intake and wait (bounded) for in-flight reply units,
//! 3. submit the playback sentinel and wait for everything queued to play,
//! 4. mark the session `Ended` and seal the ledger.
//!
//! A hard abort skips the wait in step 2 and the consumer drops whatever is
//! still queued in step 3.

use crate::config::AgentConfig;
use crate::error::{Result, SpeechError};
use crate::pipeline::ledger::ConversationLedger;
use crate::pipeline::messages::{TransportEvent, Turn};
use crate::pipeline::ordering::ReplyOrder;
use crate::pipeline::playback::{PlaybackHandle, PlaybackReport, PlaybackSequencer};
use crate::pipeline::reply::{ReplyPipeline, ReplySettings};
use crate::pipeline::state::{SessionCell, SessionState, SpeakingGate};
use crate::pipeline::utterance::{Intake, UtteranceBuffer};
use crate::runtime::{RuntimeEvent, emit};
use crate::traits::{
    AudioInput, AudioOutput, ReplyGenerator, SpeechSynthesizer, TranscriptionTransport,
};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Capacity of the transport-to-intake event channel.
const TRANSPORT_EVENT_CAPACITY: usize = 256;

/// The external services a session drives.
pub struct Collaborators {
    pub transport: Box<dyn TranscriptionTransport>,
    pub microphone: Box<dyn AudioInput>,
    pub generator: Arc<dyn ReplyGenerator>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub output: Box<dyn AudioOutput>,
}

/// What a finished session leaves behind.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub turns: Vec<Turn>,
    pub playback: PlaybackReport,
}

/// Control surface usable from outside a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session: SessionCell,
    gate: SpeakingGate,
    ledger: ConversationLedger,
}

impl SessionHandle {
    /// External interrupt: move the session to `Ending` right away.
    ///
    /// Returns `false` if it was already leaving `Active`.
    pub fn interrupt(&self) -> bool {
        self.session.begin_ending("external interrupt")
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn is_speaking(&self) -> bool {
        self.gate.is_speaking()
    }

    pub fn ledger(&self) -> &ConversationLedger {
        &self.ledger
    }

    /// Resolve once the session has fully ended.
    pub async fn wait_ended(&self) {
        let mut rx = self.session.subscribe();
        let _ = rx.wait_for(|s| *s == SessionState::Ended).await;
    }
}

/// One conversation, from welcome to sealed ledger.
pub struct ConversationSession {
    config: AgentConfig,
    collaborators: Collaborators,
    session: SessionCell,
    gate: SpeakingGate,
    ledger: ConversationLedger,
    cancel: CancellationToken,
    runtime_tx: Option<broadcast::Sender<RuntimeEvent>>,
}

impl ConversationSession {
    pub fn new(config: AgentConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            session: SessionCell::new(),
            gate: SpeakingGate::new(),
            ledger: ConversationLedger::new(),
            cancel: CancellationToken::new(),
            runtime_tx: None,
        }
    }

    /// Attach a runtime event broadcaster.
    pub fn with_runtime_events(mut self, tx: broadcast::Sender<RuntimeEvent>) -> Self {
        self.runtime_tx = Some(tx);
        self
    }

    /// Hard abort: end the session, skip the reply drain and drop queued audio
    /// when fired.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            session: self.session.clone(),
            gate: self.gate.clone(),
            ledger: self.ledger.clone(),
        }
    }

    /// Run the conversation until it ends and everything queued has played.
    ///
    /// # Errors
    ///
    /// Returns an error only if the transport or microphone cannot be started,
    /// or the playback consumer dies. Collaborator failures during the
    /// conversation are recovered and never end the session.
    pub async fn run(self) -> Result<SessionSummary> {
        let Self {
            config,
            collaborators,
            session,
            gate,
            ledger,
            cancel,
            runtime_tx,
        } = self;
        let Collaborators {
            mut transport,
            mut microphone,
            generator,
            synthesizer,
            output,
        } = collaborators;
        let conv = &config.conversation;

        info!("starting conversation session");
        emit(&runtime_tx, RuntimeEvent::SessionState(SessionState::Active));

        let (sequencer, playback) =
            PlaybackSequencer::new(output, gate.clone(), conv.playback_recv_timeout());
        let mut sequencer = sequencer.with_cancel(cancel.clone());
        if let Some(tx) = &runtime_tx {
            sequencer = sequencer.with_runtime_events(tx.clone());
        }
        let consumer = tokio::spawn(sequencer.run());

        let mut reply = ReplyPipeline::new(
            generator,
            synthesizer,
            ledger.clone(),
            gate.clone(),
            session.clone(),
            playback.clone(),
            ReplySettings::from_config(&config),
        );
        if let Some(tx) = &runtime_tx {
            reply = reply.with_runtime_events(tx.clone());
        }

        let (event_tx, event_rx) = mpsc::channel(TRANSPORT_EVENT_CAPACITY);
        let audio_tx = match transport.start(event_tx).await {
            Ok(tx) => tx,
            Err(e) => {
                error!("failed to start transcription transport: {e}");
                abort_startup(&session, &ledger, &playback, consumer, &runtime_tx).await;
                return Err(e);
            }
        };
        if let Err(e) = microphone.start(audio_tx) {
            error!("failed to start microphone: {e}");
            if let Err(e) = transport.stop().await {
                warn!("transport stop failed: {e}");
            }
            abort_startup(&session, &ledger, &playback, consumer, &runtime_tx).await;
            return Err(e);
        }

        ledger.append(Turn::assistant(conv.welcome_text.clone()));
        if conv.console_output {
            println!("{}: {}", conv.assistant_name, conv.welcome_text);
        }
        tokio::select! {
            _ = reply.speak("welcome", &conv.welcome_text) => {}
            () = session.wait_until_inactive() => {
                info!("session ended before the welcome was queued");
            }
            () = cancel.cancelled() => {
                session.begin_ending("hard abort");
            }
        }

        let tracker = TaskTracker::new();
        let intake_cancel = cancel.child_token();
        let intake = tokio::spawn(run_intake_stage(
            event_rx,
            IntakeStage {
                reply,
                order: ReplyOrder::new(conv.strict_reply_order),
                gate: gate.clone(),
                session: session.clone(),
                tracker: tracker.clone(),
                user_label: conv.user_label.clone(),
                console_output: conv.console_output,
                runtime_tx: runtime_tx.clone(),
            },
            intake_cancel.clone(),
        ));

        tokio::select! {
            () = session.wait_until_inactive() => {}
            () = cancel.cancelled() => {
                session.begin_ending("hard abort");
            }
        }
        emit(&runtime_tx, RuntimeEvent::SessionState(SessionState::Ending));

        if let Err(e) = microphone.finish() {
            warn!("microphone finish failed: {e}");
        }
        if let Err(e) = transport.stop().await {
            warn!("transport stop failed: {e}");
        }

        intake_cancel.cancel();
        if let Err(e) = intake.await {
            warn!("intake stage ended abnormally: {e}");
        }
        tracker.close();
        tokio::select! {
            () = tracker.wait() => {}
            () = cancel.cancelled() => {
                info!("hard abort, not waiting for {} reply unit(s)", tracker.len());
            }
            () = tokio::time::sleep(conv.shutdown_drain_timeout()) => {
                warn!(
                    "{} reply unit(s) still running after drain timeout",
                    tracker.len()
                );
            }
        }

        if let Err(e) = playback.shutdown() {
            debug!("playback consumer already stopped: {e}");
        }
        let report = consumer
            .await
            .map_err(|e| SpeechError::Session(format!("playback consumer failed: {e}")))?;

        session.mark_ended();
        ledger.seal();
        emit(&runtime_tx, RuntimeEvent::SessionState(SessionState::Ended));
        info!(
            "conversation ended with {} turns ({} played, {} failed)",
            ledger.len(),
            report.played,
            report.failed
        );

        Ok(SessionSummary {
            turns: ledger.snapshot(),
            playback: report,
        })
    }
}

async fn abort_startup(
    session: &SessionCell,
    ledger: &ConversationLedger,
    playback: &PlaybackHandle,
    consumer: JoinHandle<PlaybackReport>,
    runtime_tx: &Option<broadcast::Sender<RuntimeEvent>>,
) {
    session.begin_ending("startup failed");
    let _ = playback.shutdown();
    let _ = consumer.await;
    session.mark_ended();
    ledger.seal();
    emit(runtime_tx, RuntimeEvent::SessionState(SessionState::Ended));
}

struct IntakeStage {
    reply: ReplyPipeline,
    order: ReplyOrder,
    gate: SpeakingGate,
    session: SessionCell,
    tracker: TaskTracker,
    user_label: String,
    console_output: bool,
    runtime_tx: Option<broadcast::Sender<RuntimeEvent>>,
}

/// Feed transport events through the utterance buffer and spawn one tracked
/// reply unit per finalized utterance.
async fn run_intake_stage(
    mut rx: mpsc::Receiver<TransportEvent>,
    stage: IntakeStage,
    cancel: CancellationToken,
) {
    let mut buffer = UtteranceBuffer::new();

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            event = rx.recv() => {
                match event {
                    Some(TransportEvent::Transcript(event)) => {
                        match buffer.ingest(&event, &stage.gate, &stage.session) {
                            Intake::Utterance(utterance) => {
                                if stage.console_output {
                                    println!("{}: {}", stage.user_label, utterance.text());
                                }
                                emit(
                                    &stage.runtime_tx,
                                    RuntimeEvent::UserUtterance(utterance.text().to_owned()),
                                );
                                let ticket = stage.order.issue();
                                let reply = stage.reply.clone();
                                stage.tracker.spawn(async move {
                                    let seq = ticket.seq();
                                    let outcome = reply.handle(utterance, ticket).await;
                                    debug!("reply unit #{seq} finished: {outcome:?}");
                                });
                            }
                            Intake::Suppressed => {
                                debug!("transcript suppressed: {:?}", event.text);
                            }
                            Intake::Buffered | Intake::Ignored => {}
                        }
                    }
                    Some(TransportEvent::Error(message)) => {
                        if stage.session.is_active() {
                            warn!("transcription transport error: {message}");
                            emit(&stage.runtime_tx, RuntimeEvent::TransportError(message));
                        } else {
                            debug!("transport error while ending: {message}");
                        }
                    }
                    Some(TransportEvent::Opened) => info!("transcription transport opened"),
                    Some(TransportEvent::Closed) => info!("transcription transport closed"),
                    None => break,
                }
            }
        }
    }
    debug!("intake stage stopped");
}
