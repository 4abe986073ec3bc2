//! PCM data types shared by the decode and playback stages.
//!
//! [`PcmBuffer`] is the "wire format" between stages: a fixed block of
//! interleaved signed 16-bit little-endian samples produced once by the
//! decode thread and then consumed by the playback callback. Buffers move
//! by value from the queue into the callback's cursor slot; they are never
//! shared or mutated after creation.

use std::sync::Arc;

/// Owned block of interleaved 16-bit PCM.
///
/// `sample_count` counts interleaved samples (frames × channels), so
/// `bytes.len() == sample_count * 2`.
#[derive(Debug)]
pub struct PcmBuffer {
    bytes: Vec<u8>,
    sample_count: usize,
}

impl PcmBuffer {
    /// Wrap raw little-endian sample bytes.
    pub fn new(bytes: Vec<u8>, sample_count: usize) -> Self {
        Self {
            bytes,
            sample_count,
        }
    }

    /// Pack interleaved samples into a new buffer.
    pub fn from_samples(samples: &[i16]) -> Self {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        Self {
            bytes,
            sample_count: samples.len(),
        }
    }

    /// Raw sample bytes, interleaved s16le.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Interleaved sample count (frames × channels).
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Audible duration of this buffer in seconds.
    ///
    /// Returns `0.0` for a degenerate rate or channel count so water-level
    /// arithmetic stays finite.
    pub fn duration_seconds(&self, sample_rate: u32, channels: usize) -> f64 {
        if sample_rate == 0 || channels == 0 {
            return 0.0;
        }
        self.sample_count as f64 / (sample_rate as f64 * channels as f64)
    }
}

/// Source of decoded audio for the playback stage.
///
/// Returns the next buffer in stream order, or `None` when nothing is
/// available right now; the caller cannot distinguish transient starvation
/// from end of stream through this alone. Must be fast and non-blocking: it
/// is invoked from the real-time output callback.
pub type PcmSupplier = Arc<dyn Fn() -> Option<PcmBuffer> + Send + Sync>;
