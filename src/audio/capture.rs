//! Microphone capture via cpal
//!
//! The cpal stream is `!Send`, so a dedicated thread owns it for the life of
//! the handle. The device callback does the minimum possible work: it slices
//! incoming samples into fixed-length frames and hands them off with
//! `try_send`, so it never blocks, and drops frames if the consumer lags.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;
use std::sync::mpsc as std_mpsc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::backend::{CaptureBackend, CaptureConfig, CaptureHandle};
use crate::error::{LiveError, Result};

/// Frames buffered between the device thread and the session pump
const FRAME_QUEUE_DEPTH: usize = 32;

/// Captures from the default input device
pub struct CpalCaptureBackend;

impl CaptureBackend for CpalCaptureBackend {
    fn open(&self, config: &CaptureConfig) -> Result<CaptureHandle> {
        let (frame_tx, frame_rx) = mpsc::channel::<Vec<f32>>(FRAME_QUEUE_DEPTH);
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<()>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let config = config.clone();
        let thread = std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                let stream = match build_input_stream(&config, frame_tx) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Park until close() signals, then release the device
                let _ = stop_rx.recv();
                drop(stream);
                debug!("Capture stream released");
            })
            .map_err(|e| LiveError::DeviceUnavailable(format!("capture thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(LiveError::DeviceUnavailable(
                    "capture thread exited during startup".to_string(),
                ));
            }
        }

        let stopper = Box::new(move || {
            let _ = stop_tx.send(());
            if thread.join().is_err() {
                error!("Capture thread panicked");
            }
        });

        Ok(CaptureHandle::new(frame_rx, stopper))
    }
}

/// Build and start the input stream, delivering fixed-length frames
fn build_input_stream(
    config: &CaptureConfig,
    frame_tx: mpsc::Sender<Vec<f32>>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or_else(|| LiveError::DeviceUnavailable("no input device available".to_string()))?;

    let rate = SampleRate(config.sample_rate);
    let supported = device
        .supported_input_configs()
        .map_err(map_configs_error)?
        .filter(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
        .min_by_key(|c| c.channels())
        .ok_or_else(|| {
            LiveError::DeviceUnavailable(format!(
                "no input config supports {} Hz",
                config.sample_rate
            ))
        })?;

    let channels = supported.channels() as usize;
    let stream_config = supported.with_sample_rate(rate).config();

    debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = config.sample_rate,
        channels,
        frame_samples = config.frame_samples,
        "capture initialized"
    );

    let frame_samples = config.frame_samples;
    let mut pending: Vec<f32> = Vec::with_capacity(frame_samples);

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Take channel 0 when the device would not open mono
                for sample in data.iter().step_by(channels) {
                    pending.push(*sample);
                    if pending.len() == frame_samples {
                        let frame = std::mem::replace(
                            &mut pending,
                            Vec::with_capacity(frame_samples),
                        );
                        if frame_tx.try_send(frame).is_err() {
                            // Consumer lagging; dropping keeps the render
                            // thread from ever blocking
                            warn!("Capture frame dropped, consumer lagging");
                        }
                    }
                }
            },
            |err| {
                error!("Capture stream error: {}", err);
            },
            None,
        )
        .map_err(map_build_error)?;

    stream
        .play()
        .map_err(|e| LiveError::DeviceUnavailable(format!("start capture stream: {}", e)))?;

    Ok(stream)
}

fn map_configs_error(e: cpal::SupportedStreamConfigsError) -> LiveError {
    match e {
        cpal::SupportedStreamConfigsError::DeviceNotAvailable => {
            LiveError::DeviceUnavailable("input device disappeared".to_string())
        }
        other => classify_backend_message(other.to_string()),
    }
}

fn map_build_error(e: cpal::BuildStreamError) -> LiveError {
    match e {
        cpal::BuildStreamError::DeviceNotAvailable => {
            LiveError::DeviceUnavailable("input device disappeared".to_string())
        }
        other => classify_backend_message(other.to_string()),
    }
}

/// OS backends report permission refusals as free-form messages
fn classify_backend_message(message: String) -> LiveError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not permitted") {
        LiveError::PermissionDenied(message)
    } else {
        LiveError::DeviceUnavailable(message)
    }
}

/// Root-mean-square energy of one frame
pub fn frame_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}
