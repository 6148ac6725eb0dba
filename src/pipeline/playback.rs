//! Single-consumer playback queue.
//!
//! Audio jobs play one at a time in submission order. The consumer raises the
//! speaking gate before each payload and a guard lowers it afterwards, whether
//! playback succeeded, failed or panicked.

use crate::error::{Result, SpeechError};
use crate::pipeline::messages::AudioJob;
use crate::pipeline::state::SpeakingGate;
use crate::runtime::{RuntimeEvent, emit};
use crate::traits::AudioOutput;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Items on the playback queue.
#[derive(Debug)]
enum PlaybackItem {
    Job(AudioJob),
    /// Stop the consumer once everything queued before it has played.
    Shutdown,
}

/// Submission side of the playback queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PlaybackHandle {
    tx: mpsc::UnboundedSender<PlaybackItem>,
}

impl PlaybackHandle {
    /// Queue a job behind everything already submitted.
    ///
    /// # Errors
    ///
    /// Returns an error if the consumer has already stopped.
    pub fn enqueue(&self, job: AudioJob) -> Result<()> {
        debug!("queueing audio job {}", job.id);
        self.tx
            .send(PlaybackItem::Job(job))
            .map_err(|_| SpeechError::Channel("playback queue closed".into()))
    }

    /// Queue the shutdown sentinel.
    ///
    /// # Errors
    ///
    /// Returns an error if the consumer has already stopped.
    pub fn shutdown(&self) -> Result<()> {
        self.tx
            .send(PlaybackItem::Shutdown)
            .map_err(|_| SpeechError::Channel("playback queue closed".into()))
    }
}

/// Counts reported when the consumer exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackReport {
    pub played: usize,
    pub failed: usize,
}

/// The playback consumer.
pub struct PlaybackSequencer {
    rx: mpsc::UnboundedReceiver<PlaybackItem>,
    output: Arc<Mutex<Box<dyn AudioOutput>>>,
    gate: SpeakingGate,
    recv_timeout: Duration,
    cancel: CancellationToken,
    runtime_tx: Option<broadcast::Sender<RuntimeEvent>>,
}

impl PlaybackSequencer {
    /// Create a consumer and its submission handle.
    pub fn new(
        output: Box<dyn AudioOutput>,
        gate: SpeakingGate,
        recv_timeout: Duration,
    ) -> (Self, PlaybackHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sequencer = Self {
            rx,
            output: Arc::new(Mutex::new(output)),
            gate,
            recv_timeout,
            cancel: CancellationToken::new(),
            runtime_tx: None,
        };
        (sequencer, PlaybackHandle { tx })
    }

    /// Abort the consumer when `cancel` fires. Queued jobs are dropped; a job
    /// already playing finishes.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Attach a runtime event broadcaster.
    pub fn with_runtime_events(mut self, tx: broadcast::Sender<RuntimeEvent>) -> Self {
        self.runtime_tx = Some(tx);
        self
    }

    /// Consume jobs until the shutdown sentinel, a closed queue, or cancellation.
    pub async fn run(mut self) -> PlaybackReport {
        let mut report = PlaybackReport::default();
        info!("playback sequencer started");

        loop {
            let received = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    info!("playback sequencer cancelled");
                    break;
                }
                received = tokio::time::timeout(self.recv_timeout, self.rx.recv()) => received,
            };
            let item = match received {
                Ok(Some(item)) => item,
                Ok(None) => {
                    info!("playback queue closed");
                    break;
                }
                Err(_) => continue,
            };

            match item {
                PlaybackItem::Shutdown => {
                    info!("playback sequencer received shutdown");
                    break;
                }
                PlaybackItem::Job(job) => {
                    if self.cancel.is_cancelled() {
                        info!("playback sequencer cancelled, dropping {}", job.id);
                        break;
                    }
                    if self.play(job).await {
                        report.played += 1;
                    } else {
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            "playback sequencer stopped ({} played, {} failed)",
            report.played, report.failed
        );
        report
    }

    /// Play one job with the gate raised. Returns `true` on success.
    async fn play(&self, job: AudioJob) -> bool {
        let AudioJob { id, payload } = job;
        let _speaking = self.gate.begin_speaking();
        emit(
            &self.runtime_tx,
            RuntimeEvent::AssistantSpeechStart { job_id: id.clone() },
        );
        debug!("playing audio job {id} ({} bytes)", payload.len());

        let output = Arc::clone(&self.output);
        let result = tokio::task::spawn_blocking(move || {
            let mut output = output.lock().unwrap_or_else(PoisonError::into_inner);
            output.play(&payload)
        })
        .await;

        let ok = match result {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("playback of {id} failed: {e}");
                false
            }
            Err(e) => {
                error!("playback task for {id} panicked: {e}");
                false
            }
        };
        emit(
            &self.runtime_tx,
            RuntimeEvent::AssistantSpeechEnd {
                job_id: id,
                failed: !ok,
            },
        );
        ok
    }
}
