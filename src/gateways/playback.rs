//! Audio playback through the default output device.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use tracing::debug;

use crate::error::PlaybackError;
use crate::gateways::{AudioPayload, PlaybackGateway};

/// Extra wait beyond the computed payload duration before giving up on
/// the device reporting completion.
const COMPLETION_GRACE: Duration = Duration::from_millis(500);

/// Plays MP3 payloads on the default output device.
pub struct CpalPlayback;

impl CpalPlayback {
    /// Create a playback gateway.
    ///
    /// # Errors
    ///
    /// Returns a device error if no output device is available.
    pub fn new() -> Result<Self, PlaybackError> {
        let host = cpal::default_host();
        if host.default_output_device().is_none() {
            return Err(PlaybackError::Device(
                "no output device available".to_owned(),
            ));
        }
        Ok(Self)
    }
}

#[async_trait::async_trait]
impl PlaybackGateway for CpalPlayback {
    async fn play(&self, audio: AudioPayload) -> Result<(), PlaybackError> {
        tokio::task::spawn_blocking(move || {
            let (samples, sample_rate) = decode_mp3(&audio.bytes)?;
            play_blocking(&samples, sample_rate)
        })
        .await
        .map_err(|e| PlaybackError::Device(format!("playback task failed: {e}")))?
    }
}

/// Decode MP3 bytes to mono f32 samples plus the stream's sample rate.
fn decode_mp3(mp3_data: &[u8]) -> Result<(Vec<f32>, u32), PlaybackError> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = frame.sample_rate as u32;
                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        (left + right) / 2.0
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(PlaybackError::Decode(format!("MP3 decode error: {e}"))),
        }
    }

    if samples.is_empty() || sample_rate == 0 {
        return Err(PlaybackError::Decode("payload carried no audio".to_owned()));
    }
    Ok((samples, sample_rate))
}

/// Play mono samples to completion on the default output device.
fn play_blocking(samples: &[f32], sample_rate: u32) -> Result<(), PlaybackError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| PlaybackError::Device("no output device".to_owned()))?;

    let supported = device
        .supported_output_configs()
        .map_err(|e| PlaybackError::Device(e.to_string()))?
        .find(|c| {
            c.min_sample_rate() <= sample_rate
                && c.max_sample_rate() >= sample_rate
        })
        .ok_or_else(|| PlaybackError::Device("no suitable output config".to_owned()))?;

    let config: StreamConfig = supported.with_sample_rate(sample_rate).config();
    let channels = config.channels as usize;

    let shared = Arc::new(samples.to_vec());
    let position = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));

    let cb_samples = Arc::clone(&shared);
    let cb_position = Arc::clone(&position);
    let cb_finished = Arc::clone(&finished);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let pos = cb_position.load(Ordering::Relaxed);
                    let sample = if pos < cb_samples.len() {
                        cb_position.store(pos + 1, Ordering::Relaxed);
                        cb_samples[pos]
                    } else {
                        cb_finished.store(true, Ordering::Release);
                        0.0
                    };
                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| PlaybackError::Device(e.to_string()))?;

    stream.play().map_err(|e| PlaybackError::Device(e.to_string()))?;

    // Wait for the callback to run out of samples, bounded by the payload
    // duration plus a grace period.
    let duration = Duration::from_millis(samples.len() as u64 * 1000 / u64::from(sample_rate));
    let deadline = std::time::Instant::now() + duration + COMPLETION_GRACE;
    while !finished.load(Ordering::Acquire) {
        if std::time::Instant::now() > deadline {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    drop(stream);
    debug!(samples = samples.len(), sample_rate, "playback complete");
    Ok(())
}
