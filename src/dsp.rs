//! Signal access and spectral analysis.

pub mod peaks;
pub mod transform;
pub mod window;

use parking_lot::RwLock;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};

/// Random-access, read-only view of a (possibly multi-channel) sampled signal.
///
/// Frames are addressed on an absolute timeline; `start_frame..end_frame` is
/// the valid range and reads outside it yield silence.
pub trait SignalSource: Send + Sync {
    fn sample_rate(&self) -> f32;
    fn channel_count(&self) -> usize;
    fn start_frame(&self) -> i64;
    /// Exclusive end of the valid frame range.
    fn end_frame(&self) -> i64;

    /// Whether the signal is usable yet (e.g. decoding has finished).
    fn is_ready(&self) -> bool {
        true
    }

    /// Fills `out` with `channel` samples starting at frame `start`, zeroing
    /// anything outside the valid range. Returns the number of real frames.
    fn read_samples(&self, channel: usize, start: i64, out: &mut [f32]) -> usize;

    fn frame_range(&self) -> Range<i64> {
        self.start_frame()..self.end_frame()
    }

    fn frame_count(&self) -> usize {
        (self.end_frame() - self.start_frame()).max(0) as usize
    }
}

/// In-memory planar signal, mostly useful for tests and offline rendering.
#[derive(Debug)]
pub struct MemorySignal {
    sample_rate: f32,
    start_frame: i64,
    channels: RwLock<Vec<Vec<f32>>>,
    ready: AtomicBool,
}

impl MemorySignal {
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: f32) -> Self {
        Self {
            sample_rate,
            start_frame: 0,
            channels: RwLock::new(channels),
            ready: AtomicBool::new(true),
        }
    }

    pub fn mono(samples: Vec<f32>, sample_rate: f32) -> Self {
        Self::new(vec![samples], sample_rate)
    }

    pub fn with_start_frame(mut self, start_frame: i64) -> Self {
        self.start_frame = start_frame;
        self
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    /// Overwrites samples in place; callers must notify the engine afterwards.
    pub fn write(&self, channel: usize, offset: usize, samples: &[f32]) {
        let mut channels = self.channels.write();
        let Some(data) = channels.get_mut(channel) else {
            return;
        };
        let end = (offset + samples.len()).min(data.len());
        if offset < end {
            data[offset..end].copy_from_slice(&samples[..end - offset]);
        }
    }
}

impl SignalSource for MemorySignal {
    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn channel_count(&self) -> usize {
        self.channels.read().len()
    }

    fn start_frame(&self) -> i64 {
        self.start_frame
    }

    fn end_frame(&self) -> i64 {
        let len = self.channels.read().iter().map(Vec::len).max().unwrap_or(0);
        self.start_frame + len as i64
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn read_samples(&self, channel: usize, start: i64, out: &mut [f32]) -> usize {
        out.fill(0.0);
        let channels = self.channels.read();
        let Some(data) = channels.get(channel) else {
            return 0;
        };

        let rel_start = start - self.start_frame;
        let rel_end = rel_start + out.len() as i64;
        let copy_start = rel_start.max(0);
        let copy_end = rel_end.min(data.len() as i64);
        if copy_start >= copy_end {
            return 0;
        }

        let dst = (copy_start - rel_start) as usize;
        let count = (copy_end - copy_start) as usize;
        out[dst..dst + count].copy_from_slice(&data[copy_start as usize..copy_end as usize]);
        count
    }
}
