//! Engine-wide configuration that is not part of the persisted parameter set.

use crate::dsp::peaks::DEFAULT_DIVISOR;
use crate::util::audio::musical::DEFAULT_TUNING_HZ;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Upper bound on transform frame storage; larger models fail to build
    /// and leave the engine in its degraded state.
    pub frame_budget_bytes: usize,
    /// Materialise transform columns on a background thread.
    pub background_worker: bool,
    pub peak_divisor: usize,
    /// Make time-constrained paints render synchronously.
    pub synchronous_painting: bool,
    /// Default paint budget hosts can use to build deadlines.
    pub paint_budget: Duration,
    /// Concert A used for pitch labels.
    pub tuning_frequency: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_budget_bytes: 512 << 20,
            background_worker: true,
            peak_divisor: DEFAULT_DIVISOR,
            synchronous_painting: false,
            paint_budget: Duration::from_millis(50),
            tuning_frequency: DEFAULT_TUNING_HZ,
        }
    }
}

impl EngineConfig {
    /// Configuration for offline use: no worker thread, unbounded paints.
    pub fn offline() -> Self {
        Self {
            background_worker: false,
            synchronous_painting: true,
            ..Self::default()
        }
    }
}
