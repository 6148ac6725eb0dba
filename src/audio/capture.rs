//! Microphone capture using cpal.
//!
//! Captures at the device's native configuration, downmixes to mono and
//! resamples to the transcription sample rate, then ships linear16 frames to
//! the transport. The cpal stream is not `Send`, so it lives on its own
//! thread for the lifetime of the capture.

use crate::config::{AudioConfig, SttConfig};
use crate::error::{Result, SpeechError};
use crate::pipeline::messages::AudioFrame;
use crate::traits::{AudioInput, AudioSender};
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use std::thread::JoinHandle;
use tracing::{debug, error, info};

/// Microphone collaborator backed by the system input device.
pub struct CpalMicrophone {
    device_name: Option<String>,
    target_rate: u32,
    target_channels: u16,
    worker: Option<(Sender<()>, JoinHandle<()>)>,
}

impl CpalMicrophone {
    /// Frames follow the transcription transport's rate and channel count.
    pub fn new(audio: &AudioConfig, stt: &SttConfig) -> Self {
        Self {
            device_name: audio.input_device.clone(),
            target_rate: stt.sample_rate,
            target_channels: stt.channels.max(1),
            worker: None,
        }
    }

    /// List available input devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_input_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| SpeechError::Audio(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }
}

impl AudioInput for CpalMicrophone {
    fn start(&mut self, frames: AudioSender) -> Result<()> {
        if self.worker.is_some() {
            return Err(SpeechError::Audio("microphone already started".into()));
        }

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<()>>(1);
        let device_name = self.device_name.clone();
        let target_rate = self.target_rate;
        let target_channels = self.target_channels;

        let handle = std::thread::Builder::new()
            .name("dineai-mic".into())
            .spawn(move || {
                capture_thread(
                    device_name.as_deref(),
                    target_rate,
                    target_channels,
                    frames,
                    &ready_tx,
                    &stop_rx,
                );
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some((stop_tx, handle));
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(SpeechError::Audio("capture thread exited during startup".into()))
            }
        }
    }

    fn finish(&mut self) -> Result<()> {
        let Some((stop_tx, handle)) = self.worker.take() else {
            return Ok(());
        };
        let _ = stop_tx.send(());
        handle
            .join()
            .map_err(|_| SpeechError::Audio("capture thread panicked".into()))?;
        info!("audio capture stopped");
        Ok(())
    }
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

/// Owns the cpal stream until `stop` fires (or its sender is dropped).
fn capture_thread(
    device_name: Option<&str>,
    target_rate: u32,
    target_channels: u16,
    frames: AudioSender,
    ready: &Sender<Result<()>>,
    stop: &Receiver<()>,
) {
    let stream = match open_stream(device_name, target_rate, target_channels, frames) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(()));
    let _ = stop.recv();
    drop(stream);
}

fn open_stream(
    device_name: Option<&str>,
    target_rate: u32,
    target_channels: u16,
    frames: AudioSender,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = if let Some(name) = device_name {
        host.input_devices()
            .map_err(|e| SpeechError::Audio(format!("cannot enumerate devices: {e}")))?
            .find(|d| {
                d.description()
                    .ok()
                    .map(|desc| desc.name() == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| SpeechError::Audio(format!("input device '{name}' not found")))?
    } else {
        host.default_input_device()
            .ok_or_else(|| SpeechError::Audio("no default input device".into()))?
    };

    let device_label = device
        .description()
        .map(|d| d.name().to_owned())
        .unwrap_or_else(|_| "<unknown>".into());
    info!("using input device: {device_label}");

    let default_config = device
        .default_input_config()
        .map_err(|e| SpeechError::Audio(format!("no default input config: {e}")))?;
    let native_rate = default_config.sample_rate();
    let native_channels = default_config.channels();
    let stream_config = StreamConfig {
        channels: native_channels,
        sample_rate: native_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                let mono = if native_channels > 1 {
                    to_mono(data, native_channels)
                } else {
                    data.to_vec()
                };
                let samples = resample(&mono, native_rate, target_rate);
                let frame = AudioFrame {
                    bytes: encode_linear16(&samples, target_channels),
                };
                // Never block the audio thread.
                if frames.try_send(frame).is_err() {
                    debug!("audio frame channel full, dropping frame");
                }
            },
            move |err| {
                error!("audio input stream error: {err}");
            },
            None,
        )
        .map_err(|e| SpeechError::Audio(format!("failed to build input stream: {e}")))?;

    stream
        .play()
        .map_err(|e| SpeechError::Audio(format!("failed to start input stream: {e}")))?;

    info!(
        "audio capture started: native {native_rate}Hz/{native_channels}ch -> {target_rate}Hz/{target_channels}ch"
    );
    Ok(stream)
}

/// Convert interleaved multi-channel audio to mono by averaging channels.
pub(crate) fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = usize::from(channels.max(1));
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Linear-interpolation resampler, adequate for speech in either direction.
pub(crate) fn resample(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() || src_rate == 0 || dst_rate == 0 {
        return samples.to_vec();
    }

    let ratio = f64::from(src_rate) / f64::from(dst_rate);
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            f64::from(samples[idx]) * (1.0 - frac) + f64::from(samples[idx + 1]) * frac
        } else {
            f64::from(samples[idx.min(samples.len() - 1)])
        };

        output.push(sample as f32);
    }

    output
}

/// Mono f32 samples to interleaved little-endian i16, duplicated per channel.
fn encode_linear16(samples: &[f32], channels: u16) -> Vec<u8> {
    let ch = usize::from(channels.max(1));
    let mut bytes = Vec::with_capacity(samples.len() * ch * 2);
    for &s in samples {
        let value = (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        for _ in 0..ch {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
    }
    bytes
}
