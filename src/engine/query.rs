//! Point queries for overlays and tooltips.

use super::SpectrogramEngine;
use crate::render::axis::{BinDisplay, adjusted_frequency_range};
use crate::render::{PixelRect, SurfaceView};
use crate::util::audio::musical::pitch_label;
use std::fmt;

/// Direction used when snapping a frame onto the analysis hop grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Snap {
    Left,
    Right,
    Nearest,
}

/// Numeric description of the transform cells behind one pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureDescription {
    /// Seconds on the source timeline read by the pixel's columns, window
    /// overhang included.
    pub time: (f64, f64),
    /// Hz covered by the pixel's bins.
    pub frequency: (f64, f64),
    pub pitch: (String, String),
    /// Reassigned frequency range of the peaks under the pixel, peak
    /// frequency display only.
    pub adjusted_frequency: Option<(f64, f64)>,
    pub adjusted_pitch: Option<(String, String)>,
    /// Magnitudes normalised by `fft_size / 2`.
    pub magnitude: (f32, f32),
    /// `None` stands for -Inf.
    pub db: (Option<f32>, Option<f32>),
    pub phase: (f32, f32),
}

impl SpectrogramEngine {
    /// Hop size of the current analysis, in frames.
    pub fn feature_resolution(&self) -> usize {
        self.transform_params().hop_size()
    }

    /// Moves `frame` onto the hop grid of the current analysis.
    pub fn snap_to_feature_frame(&self, frame: i64, snap: Snap) -> i64 {
        let hop = self.feature_resolution() as i64;
        let origin = self.source.start_frame();
        let offset = frame - origin;
        let left = offset.div_euclid(hop) * hop;
        let right = if left == offset { left } else { left + hop };
        let snapped = match snap {
            Snap::Left => left,
            Snap::Right => right,
            Snap::Nearest if offset - left > right - offset => right,
            Snap::Nearest => left,
        };
        origin + snapped
    }

    /// Describes the cells under pixel `(x, y)` of `view`, or `None` where
    /// the pixel shows no data.
    pub fn describe_feature(&self, view: &SurfaceView, x: i64, y: i64) -> Option<FeatureDescription> {
        let model = self.model()?;
        let cache = &model.cache;
        if cache.error().is_some() {
            return None;
        }

        let time_axis = self.time_axis(cache);
        let columns = time_axis.column_span(view, x)?;
        let (first_frame, last_frame) = time_axis.source_frame_range(view, x)?;
        let axis = self.frequency_axis();
        let bins = axis.bin_span(y, view.height, cache.height())?;
        let frequency = axis.y_frequency_range(y, view.height, cache.height())?;

        let display = self.display.bin_display;
        let half = cache.fft_size() as f32 / 2.0;
        let adjusted_frequency = if display == BinDisplay::PeakFrequencies {
            adjusted_frequency_range(
                cache,
                columns.clone(),
                bins.clone(),
                display,
                self.display.threshold * half,
            )
        } else {
            None
        };

        let mut magnitude: Option<(f32, f32)> = None;
        let mut phase: Option<(f32, f32)> = None;
        for column in columns {
            for bin in bins.clone() {
                if display.peaks_only() && !cache.is_local_peak(column, bin) {
                    continue;
                }
                let m = cache.magnitude(column, bin) / half;
                let p = cache.phase(column, bin);
                magnitude = Some(magnitude.map_or((m, m), |(lo, hi)| (lo.min(m), hi.max(m))));
                phase = Some(phase.map_or((p, p), |(lo, hi)| (lo.min(p), hi.max(p))));
            }
        }
        let magnitude = magnitude.unwrap_or_default();

        let sample_rate = self.sample_rate();
        let time = (first_frame as f64 / sample_rate, last_frame as f64 / sample_rate);

        let tuning = self.config.tuning_frequency;
        let pitches = |(lo, hi): (f64, f64)| (pitch_label(lo, tuning), pitch_label(hi, tuning));

        Some(FeatureDescription {
            time,
            frequency,
            pitch: pitches(frequency),
            adjusted_frequency,
            adjusted_pitch: adjusted_frequency.map(pitches),
            magnitude,
            db: (to_db(magnitude.0), to_db(magnitude.1)),
            phase: phase.unwrap_or_default(),
        })
    }

    /// Pixel rectangle of the transform cell under `(x, y)`.
    pub fn illumination_rect(&self, view: &SurfaceView, x: i64, y: i64) -> Option<PixelRect> {
        let model = self.model()?;
        let cache = &model.cache;
        let time = self.time_axis(cache);
        let column = *time.column_span(view, x)?.start();
        let axis = self.frequency_axis();
        axis.bin_span(y, view.height, cache.height())?;

        let width = view.width as f64;
        let height = view.height as f64;
        let bin = axis.bin_for_y(y as f64 + 0.5, height).floor().max(0.0);

        let left = time.x_for_bin(view, column as f64).floor().clamp(0.0, width);
        let right = time.x_for_bin(view, (column + 1) as f64).ceil().clamp(0.0, width);
        let top = axis.y_for_bin(bin + 1.0, height).floor().clamp(0.0, height);
        let bottom = axis.y_for_bin(bin, height).ceil().clamp(0.0, height);

        let rect = PixelRect::new(
            left as u32,
            top as u32,
            ((right - left) as u32).max(1),
            ((bottom - top) as u32).max(1),
        );
        Some(rect.intersect(&view.bounds()))
    }
}

fn to_db(magnitude: f32) -> Option<f32> {
    (magnitude > 0.0).then(|| 20.0 * magnitude.log10())
}

fn range_text(low: &str, high: &str) -> String {
    if low == high {
        low.to_owned()
    } else {
        format!("{low} - {high}")
    }
}

fn db_text(db: Option<f32>) -> String {
    db.map_or_else(|| "-Inf".to_owned(), |db| format!("{db:.2}"))
}

impl fmt::Display for FeatureDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hz = |v: f64| format!("{v:.2} Hz");
        writeln!(
            f,
            "Time:\t{}",
            range_text(&format!("{:.3} s", self.time.0), &format!("{:.3} s", self.time.1))
        )?;
        writeln!(
            f,
            "Bin Frequency:\t{}",
            range_text(&hz(self.frequency.0), &hz(self.frequency.1))
        )?;
        writeln!(f, "Bin Pitch:\t{}", range_text(&self.pitch.0, &self.pitch.1))?;
        if let Some((low, high)) = self.adjusted_frequency {
            writeln!(f, "Peak Frequency:\t{}", range_text(&hz(low), &hz(high)))?;
        }
        if let Some((low, high)) = &self.adjusted_pitch {
            writeln!(f, "Peak Pitch:\t{}", range_text(low, high))?;
        }
        writeln!(
            f,
            "dB:\t{}",
            range_text(&db_text(self.db.0), &db_text(self.db.1))
        )?;
        write!(
            f,
            "Phase:\t{}",
            range_text(&format!("{:.3}", self.phase.0), &format!("{:.3}", self.phase.1))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::MemorySignal;
    use crate::engine::{EngineConfig, VerticalAxisProvider};
    use crate::render::SurfaceId;
    use std::sync::Arc;

    fn engine() -> SpectrogramEngine {
        let samples = (0..16_384)
            .map(|n| (core::f32::consts::TAU * 1_000.0 * n as f32 / 8_000.0).sin())
            .collect();
        let mut engine =
            SpectrogramEngine::new(Arc::new(MemorySignal::mono(samples, 8_000.0)), EngineConfig::offline());
        // 0..4 kHz over 32 rows: 16 bins of 7.8125 Hz per row.
        engine.set_display_extents(0.0, 4_000.0).unwrap();
        engine
    }

    #[test]
    fn snapping_follows_hop_grid() {
        let engine = engine();
        assert_eq!(engine.feature_resolution(), 256);
        assert_eq!(engine.snap_to_feature_frame(300, Snap::Left), 256);
        assert_eq!(engine.snap_to_feature_frame(300, Snap::Right), 512);
        assert_eq!(engine.snap_to_feature_frame(300, Snap::Nearest), 256);
        assert_eq!(engine.snap_to_feature_frame(400, Snap::Nearest), 512);
        assert_eq!(engine.snap_to_feature_frame(512, Snap::Right), 512);
        assert_eq!(engine.snap_to_feature_frame(-10, Snap::Left), -256);
    }

    #[test]
    fn describes_sine_row() {
        let engine = engine();
        let view = SurfaceView::new(SurfaceId(1), 0, 256, 64, 32);
        // Row 23 covers bins 128..=144; 1 kHz is bin 128.
        let feature = engine.describe_feature(&view, 10, 23).unwrap();
        assert_eq!(feature.frequency.0, 1_000.0);
        // Column 10 starts at frame 2560; the 1024 window reaches 384 frames
        // either side of its 256-frame hop.
        assert!((feature.time.0 - 2_176.0 / 8_000.0).abs() < 1e-9);
        assert!((feature.time.1 - 3_199.0 / 8_000.0).abs() < 1e-9);
        assert!((feature.magnitude.1 - 0.5).abs() < 0.05, "{:?}", feature.magnitude);
        assert!(feature.db.1.is_some_and(|db| (db + 6.0).abs() < 1.0));
        assert!(feature.pitch.0.starts_with("B5"));
        assert!(feature.adjusted_frequency.is_none());

        let text = feature.to_string();
        assert!(text.contains("Bin Frequency:\t1000.00 Hz - "));
        assert!(text.starts_with("Time:\t0.272 s - 0.400 s"));
        assert!(!text.contains("Peak Frequency"));

        let past_end = SurfaceView::new(SurfaceId(1), 16_384, 256, 64, 32);
        assert!(engine.describe_feature(&past_end, 3, 23).is_none());
        assert!(engine.describe_feature(&view, 10, 40).is_none());
    }

    #[test]
    fn peak_frequency_mode_reports_reassigned_range() {
        let mut engine = engine();
        engine.set_bin_display(BinDisplay::PeakFrequencies).unwrap();
        // Keeps leakage noise out of the peak filter.
        engine.set_threshold(0.01).unwrap();
        let view = SurfaceView::new(SurfaceId(1), 0, 256, 64, 32);
        let feature = engine.describe_feature(&view, 10, 23).unwrap();
        let (low, high) = feature.adjusted_frequency.unwrap();
        assert!((low - 1_000.0).abs() < 1.0 && (high - 1_000.0).abs() < 1.0);
        assert!(feature.adjusted_pitch.is_some());
        assert!(feature.to_string().contains("Peak Frequency:\t"));
    }

    #[test]
    fn illumination_covers_one_cell() {
        let engine = engine();
        // Four pixels per column.
        let view = SurfaceView::new(SurfaceId(1), 0, 64, 64, 32);
        assert_eq!(
            engine.illumination_rect(&view, 41, 23),
            Some(PixelRect::new(40, 23, 4, 1))
        );
        let past_end = SurfaceView::new(SurfaceId(1), 16_384, 64, 64, 32);
        assert!(engine.illumination_rect(&past_end, 0, 0).is_none());
    }
}
