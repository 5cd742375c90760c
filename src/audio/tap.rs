//! Capture tap
//!
//! Optional WAV dump of the outbound capture stream, useful when tuning the
//! silence gate. Writes one 16-bit mono file for the whole session.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Writes captured frames to a WAV file
pub struct CaptureTap {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    path: PathBuf,
}

impl CaptureTap {
    pub fn create(path: impl AsRef<Path>, sample_rate: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&path, spec)
            .with_context(|| format!("Failed to create tap file: {:?}", path))?;

        info!("Capture tap writing to {:?}", path);

        Ok(Self {
            writer: Some(writer),
            path,
        })
    }

    /// Append one frame of normalized samples
    pub fn write_frame(&mut self, samples: &[f32]) -> Result<()> {
        if let Some(writer) = &mut self.writer {
            for &sample in samples {
                let s = sample.clamp(-1.0, 1.0);
                let scaled = if s < 0.0 { s * 32768.0 } else { s * 32767.0 };
                writer
                    .write_sample(scaled as i16)
                    .context("Failed to write sample to tap")?;
            }
        }
        Ok(())
    }

    /// Finalize the WAV header
    pub fn finish(mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize tap file")?;
            info!("Capture tap finalized: {:?}", self.path);
        }
        Ok(())
    }
}

impl Drop for CaptureTap {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize capture tap on drop: {}", e);
            }
        }
    }
}
