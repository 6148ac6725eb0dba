//! Live transcription over the Deepgram streaming WebSocket API.
//!
//! Audio frames go out as binary messages; `Results` messages come back as
//! transcript events. A `KeepAlive` is sent on an interval so the server does
//! not drop the socket during long silences, and `stop()` flushes pending
//! audio, sends `CloseStream` and closes the socket.

use crate::config::SttConfig;
use crate::error::{Result, SpeechError};
use crate::pipeline::messages::{AudioFrame, TranscriptEvent, TransportEvent};
use crate::traits::{AudioSender, TranscriptionTransport};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Interval;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Audio frames buffered between the microphone and the socket writer.
const AUDIO_CHANNEL_CAPACITY: usize = 64;
/// How long `stop()` waits for the connection task to close the socket.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

const KEEP_ALIVE: &str = r#"{"type":"KeepAlive"}"#;
const CLOSE_STREAM: &str = r#"{"type":"CloseStream"}"#;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ServerMessage {
    Results {
        #[serde(default)]
        channel: ResultsChannel,
        #[serde(default)]
        is_final: bool,
        #[serde(default)]
        speech_final: bool,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct ResultsChannel {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
}

/// Build the listen URL with every recognition option as a query parameter.
///
/// # Errors
///
/// Returns an error if the configured base URL does not parse.
pub fn listen_url(config: &SttConfig) -> Result<Url> {
    let mut url = Url::parse(&config.url)
        .map_err(|e| SpeechError::Config(format!("invalid STT url '{}': {e}", config.url)))?;
    url.query_pairs_mut()
        .append_pair("model", &config.model)
        .append_pair("language", &config.language)
        .append_pair("encoding", &config.encoding)
        .append_pair("sample_rate", &config.sample_rate.to_string())
        .append_pair("channels", &config.channels.to_string())
        .append_pair("interim_results", bool_str(config.interim_results))
        .append_pair("smart_format", bool_str(config.smart_format))
        .append_pair("vad_events", bool_str(config.vad_events))
        .append_pair("endpointing", &config.endpointing_ms.to_string())
        .append_pair("utterance_end_ms", &config.utterance_end_ms.to_string())
        .append_pair("no_delay", bool_str(config.no_delay));
    Ok(url)
}

fn bool_str(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

/// Map one server text message to a transcript event, if it carries one.
pub fn parse_message(text: &str) -> Option<TranscriptEvent> {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(ServerMessage::Results {
            channel,
            is_final,
            speech_final,
        }) => {
            let text = channel
                .alternatives
                .into_iter()
                .next()
                .map(|a| a.transcript)
                .unwrap_or_default();
            Some(TranscriptEvent {
                text,
                is_final,
                is_speech_final: speech_final,
            })
        }
        Ok(ServerMessage::Other) => None,
        Err(e) => {
            debug!("ignoring unparseable server message: {e}");
            None
        }
    }
}

/// Transcription transport backed by Deepgram live streaming.
pub struct DeepgramLive {
    config: SttConfig,
    api_key: String,
    worker: Option<(CancellationToken, JoinHandle<()>)>,
}

impl DeepgramLive {
    pub fn new(config: &SttConfig, api_key: impl Into<String>) -> Self {
        Self {
            config: config.clone(),
            api_key: api_key.into(),
            worker: None,
        }
    }
}

#[async_trait]
impl TranscriptionTransport for DeepgramLive {
    async fn start(&mut self, events: mpsc::Sender<TransportEvent>) -> Result<AudioSender> {
        if self.worker.is_some() {
            return Err(SpeechError::Stt("transport already started".into()));
        }

        let url = listen_url(&self.config)?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| SpeechError::Stt(format!("invalid listen request: {e}")))?;
        let auth = HeaderValue::from_str(&format!("Token {}", self.api_key))
            .map_err(|e| SpeechError::Credentials(format!("invalid Deepgram API key: {e}")))?;
        request.headers_mut().insert("Authorization", auth);

        let (socket, _) = connect_async(request)
            .await
            .map_err(|e| SpeechError::Stt(format!("connect: {e}")))?;
        info!("connected to live transcription at {}", self.config.url);
        let _ = events.send(TransportEvent::Opened).await;

        let (audio_tx, audio_rx) = mpsc::channel(AUDIO_CHANNEL_CAPACITY);
        let stop = CancellationToken::new();
        let keepalive = (self.config.keepalive_secs > 0)
            .then(|| Duration::from_secs(self.config.keepalive_secs));
        let handle = tokio::spawn(run_connection(
            socket,
            audio_rx,
            events,
            stop.clone(),
            keepalive,
        ));
        self.worker = Some((stop, handle));
        Ok(audio_tx)
    }

    async fn stop(&mut self) -> Result<()> {
        let Some((stop, handle)) = self.worker.take() else {
            return Ok(());
        };
        stop.cancel();
        match tokio::time::timeout(STOP_TIMEOUT, handle).await {
            Ok(Ok(())) => info!("live transcription closed"),
            Ok(Err(e)) => warn!("transcription connection task failed: {e}"),
            Err(_) => warn!("transcription connection did not close in time"),
        }
        Ok(())
    }
}

impl Drop for DeepgramLive {
    fn drop(&mut self) {
        if let Some((stop, _)) = &self.worker {
            stop.cancel();
        }
    }
}

/// Pump audio out and results in until stopped or the socket closes.
async fn run_connection(
    socket: Socket,
    mut audio_rx: mpsc::Receiver<AudioFrame>,
    events: mpsc::Sender<TransportEvent>,
    stop: CancellationToken,
    keepalive: Option<Duration>,
) {
    let (mut write, mut read) = socket.split();
    let mut keepalive = keepalive.map(|period| {
        tokio::time::interval_at(tokio::time::Instant::now() + period, period)
    });
    let mut audio_open = true;

    loop {
        tokio::select! {
            biased;
            () = stop.cancelled() => {
                while let Ok(frame) = audio_rx.try_recv() {
                    if write.send(Message::Binary(frame.bytes)).await.is_err() {
                        break;
                    }
                }
                if let Err(e) = write.send(Message::Text(CLOSE_STREAM.to_owned())).await {
                    debug!("close stream send failed: {e}");
                }
                let _ = write.close().await;
                break;
            }
            frame = audio_rx.recv(), if audio_open => {
                match frame {
                    Some(frame) => {
                        if let Err(e) = write.send(Message::Binary(frame.bytes)).await {
                            let _ = events
                                .send(TransportEvent::Error(format!("send error: {e}")))
                                .await;
                            break;
                        }
                    }
                    None => {
                        debug!("audio source closed");
                        audio_open = false;
                    }
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(event) = parse_message(&text)
                            && events.send(TransportEvent::Transcript(event)).await.is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("server closed the connection");
                        break;
                    }
                    Some(Err(e)) => {
                        let _ = events
                            .send(TransportEvent::Error(format!("read error: {e}")))
                            .await;
                        break;
                    }
                    _ => {}
                }
            }
            () = next_tick(&mut keepalive) => {
                if let Err(e) = write.send(Message::Text(KEEP_ALIVE.to_owned())).await {
                    let _ = events
                        .send(TransportEvent::Error(format!("keepalive error: {e}")))
                        .await;
                    break;
                }
            }
        }
    }

    let _ = events.send(TransportEvent::Closed).await;
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
