//! Pixel <-> (column, bin) mapping.
//!
//! Rows grow downwards: row `0` is the top of the surface and shows the
//! effective maximum frequency, `y == height` is the effective minimum.

use super::SurfaceView;
use crate::dsp::transform::SpectralCache;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

// Tolerances used when snapping configured frequencies onto the bin grid.
const MIN_BIN_ROUNDING: f64 = 0.01;
const MAX_BIN_ROUNDING: f64 = 0.1;
// Fractional slack before a continuous bin position counts as the next bin.
const BIN_EDGE_SLACK: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinScale {
    #[default]
    Linear,
    Log,
}

impl BinScale {
    pub fn index(self) -> i64 {
        match self {
            BinScale::Linear => 0,
            BinScale::Log => 1,
        }
    }

    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(BinScale::Linear),
            1 => Some(BinScale::Log),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinDisplay {
    #[default]
    AllBins,
    PeakBins,
    PeakFrequencies,
}

impl BinDisplay {
    pub fn index(self) -> i64 {
        match self {
            BinDisplay::AllBins => 0,
            BinDisplay::PeakBins => 1,
            BinDisplay::PeakFrequencies => 2,
        }
    }

    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(BinDisplay::AllBins),
            1 => Some(BinDisplay::PeakBins),
            2 => Some(BinDisplay::PeakFrequencies),
            _ => None,
        }
    }

    pub fn peaks_only(self) -> bool {
        !matches!(self, BinDisplay::AllBins)
    }
}

/// Vertical mapping between pixel rows and frequency bins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyAxis {
    pub sample_rate: f64,
    pub fft_size: usize,
    /// Configured lower bound in Hz; `0` means "from DC" (bin 1 under log).
    pub min_frequency: f64,
    /// Configured upper bound in Hz; `0` means Nyquist.
    pub max_frequency: f64,
    pub scale: BinScale,
}

impl FrequencyAxis {
    #[inline]
    pub fn bin_width(&self) -> f64 {
        self.sample_rate / self.fft_size.max(1) as f64
    }

    #[inline]
    pub fn nyquist(&self) -> f64 {
        self.sample_rate / 2.0
    }

    /// Lowest displayed bin.
    pub fn effective_min_bin(&self) -> usize {
        if self.min_frequency > 0.0 {
            let bin = (self.min_frequency / self.bin_width() + MIN_BIN_ROUNDING) as usize;
            bin.max(1)
        } else {
            match self.scale {
                BinScale::Linear => 0,
                BinScale::Log => 1,
            }
        }
    }

    /// Highest displayed bin, always above [`Self::effective_min_bin`] when the
    /// transform has more than one bin.
    pub fn effective_max_bin(&self) -> usize {
        let top = self.fft_size / 2;
        let bin = if self.max_frequency > 0.0 {
            ((self.max_frequency / self.bin_width() + MAX_BIN_ROUNDING) as usize).min(top)
        } else {
            top
        };
        bin.max((self.effective_min_bin() + 1).min(top))
    }

    /// Configured minimum snapped down onto the bin grid.
    pub fn effective_min_frequency(&self) -> f64 {
        self.effective_min_bin() as f64 * self.bin_width()
    }

    /// Configured maximum snapped onto the bin grid, capped at Nyquist.
    pub fn effective_max_frequency(&self) -> f64 {
        self.effective_max_bin() as f64 * self.bin_width()
    }

    pub fn y_for_frequency(&self, frequency: f64, height: f64) -> f64 {
        let (min, max) = self.mapped_extents();
        let span = max - min;
        if span <= 0.0 {
            return height;
        }
        let value = match self.scale {
            BinScale::Linear => frequency,
            BinScale::Log => frequency.max(f64::MIN_POSITIVE).log10(),
        };
        height - height * (value - min) / span
    }

    pub fn frequency_for_y(&self, y: f64, height: f64) -> f64 {
        let (min, max) = self.mapped_extents();
        if height <= 0.0 {
            return self.effective_min_frequency();
        }
        let value = min + (height - y) * (max - min) / height;
        match self.scale {
            BinScale::Linear => value,
            BinScale::Log => 10f64.powf(value),
        }
    }

    /// `yForBin`: pixel row (continuous) showing the given bin position.
    pub fn y_for_bin(&self, bin: f64, height: f64) -> f64 {
        self.y_for_frequency(bin * self.bin_width(), height)
    }

    /// `binForY`: continuous bin position at pixel coordinate `y`.
    pub fn bin_for_y(&self, y: f64, height: f64) -> f64 {
        self.frequency_for_y(y, height) / self.bin_width()
    }

    /// Continuous bin range `(low, high)` covered by pixel row `y`.
    pub fn y_bin_range(&self, y: i64, height: u32) -> Option<(f64, f64)> {
        if y < 0 || y >= height as i64 {
            return None;
        }
        let h = height as f64;
        Some((self.bin_for_y((y + 1) as f64, h), self.bin_for_y(y as f64, h)))
    }

    /// Integer bins read when painting row `y`, clamped to `0..bin_count`.
    pub fn bin_span(&self, y: i64, height: u32, bin_count: usize) -> Option<RangeInclusive<usize>> {
        let (q0, q1) = self.y_bin_range(y, height)?;
        let last = bin_count.checked_sub(1)?;
        let low = ((q0 + BIN_EDGE_SLACK).floor().max(0.0) as usize).min(last);
        let high = (q1.floor().max(0.0) as usize).clamp(low, last);
        Some(low..=high)
    }

    /// Frequency range in Hz of the bins behind row `y`.
    pub fn y_frequency_range(&self, y: i64, height: u32, bin_count: usize) -> Option<(f64, f64)> {
        let span = self.bin_span(y, height, bin_count)?;
        let width = self.bin_width();
        Some((*span.start() as f64 * width, (*span.end() + 1) as f64 * width))
    }

    fn mapped_extents(&self) -> (f64, f64) {
        let min = self.effective_min_frequency();
        let max = self.effective_max_frequency();
        match self.scale {
            BinScale::Linear => (min, max),
            BinScale::Log => (
                min.max(self.bin_width()).log10(),
                max.max(self.bin_width()).log10(),
            ),
        }
    }
}

/// Horizontal mapping between pixel columns and hop-indexed analysis columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeAxis {
    /// First frame of the source signal.
    pub origin: i64,
    pub frame_count: i64,
    pub hop: usize,
    pub window_size: usize,
    /// Number of analysis columns.
    pub columns: usize,
}

impl TimeAxis {
    pub fn from_cache(cache: &SpectralCache, origin: i64, frame_count: i64) -> Self {
        Self {
            origin,
            frame_count,
            hop: cache.hop_size(),
            window_size: cache.params().window_size,
            columns: cache.width(),
        }
    }

    /// Continuous column range `(s0, s1)` covered by pixel column `x`, or
    /// `None` when the pixel lies entirely outside the source signal.
    pub fn x_bin_range(&self, view: &SurfaceView, x: i64) -> Option<(f64, f64)> {
        let f0 = view.frame_for_x(x) - self.origin;
        let f1 = view.frame_for_x(x + 1) - self.origin - 1;
        if f1 < 0 || f0 >= self.frame_count {
            return None;
        }
        let hop = self.hop.max(1) as f64;
        Some((f0 as f64 / hop, f1 as f64 / hop))
    }

    /// Integer analysis columns read when painting pixel column `x`.
    pub fn column_span(&self, view: &SurfaceView, x: i64) -> Option<RangeInclusive<usize>> {
        let (s0, s1) = self.x_bin_range(view, x)?;
        let last = self.columns.checked_sub(1)?;
        let low = ((s0 + BIN_EDGE_SLACK).floor().max(0.0) as usize).min(last);
        let high = (s1.floor().max(0.0) as usize).clamp(low, last);
        Some(low..=high)
    }

    /// `binForX`: continuous column position at pixel coordinate `x`.
    pub fn bin_for_x(&self, view: &SurfaceView, x: f64) -> f64 {
        let frame = view.start_frame as f64 + x * view.zoom_level.max(1) as f64;
        (frame - self.origin as f64) / self.hop.max(1) as f64
    }

    /// `xForBin`: pixel coordinate where column position `bin` starts.
    pub fn x_for_bin(&self, view: &SurfaceView, bin: f64) -> f64 {
        let frame = self.origin as f64 + bin * self.hop.max(1) as f64;
        (frame - view.start_frame as f64) / view.zoom_level.max(1) as f64
    }

    /// Source frames `(first, last)` contributing to pixel column `x`,
    /// including the window overhang either side of the hop grid.
    pub fn source_frame_range(&self, view: &SurfaceView, x: i64) -> Option<(i64, i64)> {
        let (s0, s1) = self.x_bin_range(view, x)?;
        let hop = self.hop as i64;
        let overhang = (self.window_size as i64 - hop) / 2;
        let s0i = (s0 + BIN_EDGE_SLACK).floor() as i64;
        let s1i = s1.floor() as i64;
        let first = self.origin + s0i * hop - overhang;
        let last = self.origin + s1i * hop + hop + overhang - 1;
        Some((first, last))
    }
}

/// Peak-adjusted frequency range for a block of cells: the min/max of the
/// reassigned frequencies of every cell passing the peak and threshold
/// filters. `None` when no cell passes.
pub fn adjusted_frequency_range(
    cache: &SpectralCache,
    columns: RangeInclusive<usize>,
    bins: RangeInclusive<usize>,
    display: BinDisplay,
    raw_threshold: f32,
) -> Option<(f64, f64)> {
    let mut adjusted: Option<(f64, f64)> = None;
    for bin in bins {
        for column in columns.clone() {
            if display.peaks_only() && !cache.is_local_peak(column, bin) {
                continue;
            }
            if !cache.is_over_threshold(column, bin, raw_threshold) {
                continue;
            }
            if column + 1 >= cache.width() {
                continue;
            }
            let frequency = cache.estimate_stable_frequency(column, bin);
            adjusted = Some(match adjusted {
                None => (frequency, frequency),
                Some((low, high)) => (low.min(frequency), high.max(frequency)),
            });
        }
    }
    adjusted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::transform::TransformParams;
    use crate::dsp::{MemorySignal, SignalSource};
    use crate::render::SurfaceId;
    use std::sync::Arc;

    fn axis(sample_rate: f64, fft_size: usize, min: f64, max: f64, scale: BinScale) -> FrequencyAxis {
        FrequencyAxis {
            sample_rate,
            fft_size,
            min_frequency: min,
            max_frequency: max,
            scale,
        }
    }

    #[test]
    fn linear_axis_spans_dc_to_max() {
        let a = axis(16_000.0, 1024, 0.0, 8_000.0, BinScale::Linear);
        let h = 256.0;
        assert_eq!(a.effective_min_frequency(), 0.0);
        assert_eq!(a.effective_max_frequency(), 8_000.0);
        assert!((a.y_for_bin(0.0, h) - h).abs() < 1e-9);
        assert!(a.y_for_bin(512.0, h).abs() < 1e-9);
        assert!((a.frequency_for_y(h / 2.0, h) - 4_000.0).abs() < 1e-6);
        assert!((a.bin_for_y(0.0, h) * a.bin_width() - 8_000.0).abs() < 1e-6);
    }

    #[test]
    fn log_axis_midpoint_is_geometric_mean() {
        // 40 Hz bins, so both limits sit exactly on bin boundaries.
        let a = axis(40_960.0, 1024, 40.0, 2_000.0, BinScale::Log);
        assert_eq!(a.effective_min_frequency(), 40.0);
        assert_eq!(a.effective_max_frequency(), 2_000.0);
        let mid = a.frequency_for_y(150.0, 300.0);
        assert!((mid - (40.0f64 * 2_000.0).sqrt()).abs() < 0.01, "mid {mid}");
        assert!((mid - 1_020.0).abs() > 500.0);
    }

    #[test]
    fn bin_row_round_trip() {
        let h = 400.0;
        for scale in [BinScale::Linear, BinScale::Log] {
            let a = axis(44_100.0, 2048, 0.0, 0.0, scale);
            let first = if scale == BinScale::Log { 1 } else { 0 };
            for bin in first..=1024 {
                let y = a.y_for_bin(bin as f64, h);
                let back = a.bin_for_y(y, h);
                let back_y = a.y_for_bin(back, h);
                assert!((back_y - y).abs() < 1.0, "{scale:?} bin {bin}");
                assert!((back - bin as f64).abs() < 1e-6 * bin.max(1) as f64);
            }
        }
    }

    #[test]
    fn effective_limits_snap_to_bins() {
        let log = axis(48_000.0, 1024, 0.0, 0.0, BinScale::Log);
        assert_eq!(log.effective_min_frequency(), 46.875);
        assert_eq!(log.effective_max_frequency(), 24_000.0);

        let low = axis(48_000.0, 1024, 10.0, 30_000.0, BinScale::Linear);
        assert_eq!(low.effective_min_frequency(), 46.875);
        assert_eq!(low.effective_max_frequency(), 24_000.0);

        let snapped = axis(48_000.0, 1024, 100.0, 1_000.0, BinScale::Linear);
        assert_eq!(snapped.effective_min_frequency(), 2.0 * 46.875);
        assert_eq!(snapped.effective_max_frequency(), 21.0 * 46.875);
    }

    #[test]
    fn rows_cover_their_bins() {
        let a = axis(16_000.0, 1024, 0.0, 8_000.0, BinScale::Linear);
        assert_eq!(a.bin_span(511, 512, 513), Some(0..=1));
        assert_eq!(a.bin_span(0, 512, 513), Some(511..=512));
        assert_eq!(a.bin_span(512, 512, 513), None);
        assert_eq!(a.bin_span(-1, 512, 513), None);
        assert_eq!(a.y_frequency_range(511, 512, 513), Some((0.0, 31.25)));
    }

    #[test]
    fn time_axis_reports_out_of_range_pixels() {
        let t = TimeAxis {
            origin: 0,
            frame_count: 10_000,
            hop: 256,
            window_size: 1024,
            columns: 40,
        };
        let view = SurfaceView::new(SurfaceId(1), -1_024, 128, 200, 100);
        assert_eq!(t.x_bin_range(&view, 0), None);
        assert_eq!(t.x_bin_range(&view, 8), Some((0.0, 127.0 / 256.0)));
        assert_eq!(t.column_span(&view, 8), Some(0..=0));
        assert_eq!(t.column_span(&view, 11), Some(1..=1));
        assert_eq!(t.x_bin_range(&view, 100), None);
        assert_eq!(t.source_frame_range(&view, 8), Some((-384, 639)));

        assert!((t.bin_for_x(&view, 8.0) - 0.0).abs() < 1e-12);
        assert!((t.x_for_bin(&view, 2.0) - 12.0).abs() < 1e-12);
    }

    #[test]
    fn adjusted_range_tracks_reassigned_peak() {
        let samples = (0..16_384)
            .map(|n| (core::f32::consts::TAU * 1_010.0 * n as f32 / 8_000.0).sin())
            .collect();
        let source: Arc<dyn SignalSource> = Arc::new(MemorySignal::mono(samples, 8_000.0));
        let params = TransformParams {
            window_size: 256,
            hop_level: 2,
            ..TransformParams::default()
        };
        let cache = SpectralCache::new(source, params, 64 << 20);

        let (low, high) =
            adjusted_frequency_range(&cache, 10..=12, 30..=34, BinDisplay::PeakFrequencies, 1.0)
                .expect("peak passes the filters");
        assert!((low - 1_010.0).abs() < 3.0 && (high - 1_010.0).abs() < 3.0);

        assert_eq!(
            adjusted_frequency_range(&cache, 10..=12, 100..=110, BinDisplay::PeakBins, 1.0),
            None
        );
    }
}
