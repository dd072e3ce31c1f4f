//! Demand-driven short-time Fourier transform cache.
//!
//! Frames are computed lazily, either by the caller on first access or by an
//! optional background worker, and are immutable once stored. Replacing the
//! transform parameters means building a new cache; the old one (and its
//! worker) is simply dropped.

use super::SignalSource;
use super::window::WindowKind;
use crate::error::{EngineError, Result};
use crate::util::audio::{apply_window, princarg};
use parking_lot::Mutex;
use realfft::{RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex32;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use tracing::{debug, error};

pub const MAX_HOP_LEVEL: u32 = 5;
pub const MIN_WINDOW_SIZE: usize = 16;
pub const MAX_WINDOW_SIZE: usize = 1 << 16;
pub const MAX_OVERSAMPLING: usize = 8;

const WORKER_THREAD_NAME: &str = "openspectra-fft-worker";

/// Parameters that shape the transform itself. Changing any of them requires a
/// new [`SpectralCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformParams {
    pub window_size: usize,
    /// Discrete overlap selector: `hop = window_size >> hop_level`.
    pub hop_level: u32,
    pub window: WindowKind,
    /// Zero-padding factor: `fft_size = window_size * oversampling`.
    pub oversampling: usize,
    pub channel: usize,
}

impl Default for TransformParams {
    fn default() -> Self {
        Self {
            window_size: 1024,
            hop_level: 2,
            window: WindowKind::Hann,
            oversampling: 1,
            channel: 0,
        }
    }
}

impl TransformParams {
    #[inline]
    pub fn hop_size(&self) -> usize {
        (self.window_size >> self.hop_level).max(1)
    }

    #[inline]
    pub fn fft_size(&self) -> usize {
        self.window_size * self.oversampling.max(1)
    }

    /// Number of frequency bins, DC to Nyquist inclusive.
    #[inline]
    pub fn bin_count(&self) -> usize {
        self.fft_size() / 2 + 1
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_WINDOW_SIZE..=MAX_WINDOW_SIZE).contains(&self.window_size) {
            return Err(EngineError::invalid(
                "window size",
                format!(
                    "{} outside {MIN_WINDOW_SIZE}..={MAX_WINDOW_SIZE}",
                    self.window_size
                ),
            ));
        }
        if self.hop_level > MAX_HOP_LEVEL {
            return Err(EngineError::invalid(
                "window hop level",
                format!("{} outside 0..={MAX_HOP_LEVEL}", self.hop_level),
            ));
        }
        if !(1..=MAX_OVERSAMPLING).contains(&self.oversampling) {
            return Err(EngineError::invalid(
                "fft oversampling",
                format!("{} outside 1..={MAX_OVERSAMPLING}", self.oversampling),
            ));
        }
        Ok(())
    }
}

/// One analysed column: magnitude and phase for bins `0..=fft_size/2`.
#[derive(Debug, Clone)]
pub struct TransformFrame {
    pub magnitudes: Box<[f32]>,
    pub phases: Box<[f32]>,
}

#[derive(Debug)]
struct FrameStore {
    frames: Box<[OnceLock<TransformFrame>]>,
    computed: AtomicUsize,
    error: OnceLock<String>,
}

impl FrameStore {
    fn allocate(width: usize) -> std::result::Result<Self, String> {
        let mut frames = Vec::new();
        frames
            .try_reserve_exact(width)
            .map_err(|err| format!("frame table for {width} columns: {err}"))?;
        frames.resize_with(width, OnceLock::new);
        Ok(Self {
            frames: frames.into_boxed_slice(),
            computed: AtomicUsize::new(0),
            error: OnceLock::new(),
        })
    }

    fn failed(message: String) -> Self {
        let error = OnceLock::new();
        let _ = error.set(message);
        Self {
            frames: Box::new([]),
            computed: AtomicUsize::new(0),
            error,
        }
    }

    fn fill(&self, column: usize, analyzer: &mut FrameAnalyzer) -> Option<&TransformFrame> {
        if self.error.get().is_some() {
            return None;
        }
        let slot = self.frames.get(column)?;
        if let Some(frame) = slot.get() {
            return Some(frame);
        }

        match analyzer.analyze(column) {
            Ok(frame) => {
                if slot.set(frame).is_ok() {
                    self.computed.fetch_add(1, Ordering::AcqRel);
                }
                slot.get()
            }
            Err(message) => {
                if self.error.set(message.clone()).is_ok() {
                    error!("[transform] frame analysis failed: {message}");
                }
                None
            }
        }
    }
}

struct FrameAnalyzer {
    source: Arc<dyn SignalSource>,
    params: TransformParams,
    origin: i64,
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    samples: Vec<f32>,
    input: Vec<f32>,
    output: Vec<Complex32>,
    scratch: Vec<Complex32>,
}

impl std::fmt::Debug for FrameAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameAnalyzer")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl FrameAnalyzer {
    fn new(source: Arc<dyn SignalSource>, params: TransformParams) -> Self {
        let fft_size = params.fft_size();
        let fft = RealFftPlanner::<f32>::new().plan_fft_forward(fft_size);
        Self {
            origin: source.start_frame(),
            scratch: vec![Complex32::default(); fft.get_scratch_len()],
            output: fft.make_output_vec(),
            input: vec![0.0; fft_size],
            samples: vec![0.0; params.window_size],
            window: params.window.coefficients(params.window_size),
            source,
            params,
            fft,
        }
    }

    fn analyze(&mut self, column: usize) -> std::result::Result<TransformFrame, String> {
        let window_size = self.params.window_size;
        let fft_size = self.params.fft_size();
        let start = column_start_frame(self.origin, &self.params, column);

        self.source
            .read_samples(self.params.channel, start, &mut self.samples);
        apply_window(&mut self.samples, &self.window);

        // Centre the window in the zero-padded buffer, then rotate so the
        // window centre sits at index zero and phases refer to it.
        self.input.fill(0.0);
        let pad = (fft_size - window_size) / 2;
        self.input[pad..pad + window_size].copy_from_slice(&self.samples);
        self.input.rotate_left(fft_size / 2);

        self.fft
            .process_with_scratch(&mut self.input, &mut self.output, &mut self.scratch)
            .map_err(|err| format!("fft of column {column} failed: {err}"))?;

        let bins = self.output.len();
        let mut magnitudes = try_alloc(bins)?;
        let mut phases = try_alloc(bins)?;
        for (bin, value) in self.output.iter().enumerate() {
            magnitudes[bin] = value.norm();
            phases[bin] = value.arg();
        }

        Ok(TransformFrame {
            magnitudes,
            phases,
        })
    }
}

fn try_alloc(len: usize) -> std::result::Result<Box<[f32]>, String> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|err| format!("frame buffer of {len} bins: {err}"))?;
    buffer.resize(len, 0.0);
    Ok(buffer.into_boxed_slice())
}

/// First source frame read by analysis column `column`.
fn column_start_frame(origin: i64, params: &TransformParams, column: usize) -> i64 {
    let hop = params.hop_size() as i64;
    origin + column as i64 * hop - (params.window_size as i64 - hop) / 2
}

/// Lazily materialised STFT of one channel of a [`SignalSource`].
///
/// Reads never fail: columns or bins outside the model, and every query on a
/// cache whose allocation failed, return zero / `false`.
pub struct SpectralCache {
    params: TransformParams,
    sample_rate: f32,
    origin: i64,
    store: Arc<FrameStore>,
    analyzer: Mutex<FrameAnalyzer>,
    abandoned: Arc<AtomicBool>,
}

impl std::fmt::Debug for SpectralCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralCache")
            .field("params", &self.params)
            .field("width", &self.width())
            .field("completion", &self.completion())
            .field("error", &self.error())
            .finish_non_exhaustive()
    }
}

impl SpectralCache {
    /// Builds the frame table for `source`. If the estimated frame storage
    /// exceeds `budget_bytes` or allocation fails, the cache is created in an
    /// error state instead.
    pub fn new(source: Arc<dyn SignalSource>, params: TransformParams, budget_bytes: usize) -> Self {
        let hop = params.hop_size();
        let frame_count = source.frame_count();
        let width = frame_count.div_ceil(hop);
        let frame_bytes = params.bin_count() * 2 * std::mem::size_of::<f32>();
        let required = width.saturating_mul(frame_bytes);

        let store = if required > budget_bytes {
            FrameStore::failed(format!(
                "insufficient memory for {width} frames of {} bins ({required} bytes, budget {budget_bytes})",
                params.bin_count()
            ))
        } else {
            FrameStore::allocate(width).unwrap_or_else(FrameStore::failed)
        };

        if let Some(message) = store.error.get() {
            error!("[transform] failed to create frame store: {message}");
        } else {
            debug!(
                "[transform] created cache: {width} columns x {} bins (window {}, hop {}, fft {})",
                params.bin_count(),
                params.window_size,
                hop,
                params.fft_size()
            );
        }

        Self {
            sample_rate: source.sample_rate(),
            origin: source.start_frame(),
            analyzer: Mutex::new(FrameAnalyzer::new(Arc::clone(&source), params)),
            store: Arc::new(store),
            abandoned: Arc::new(AtomicBool::new(false)),
            params,
        }
    }

    /// Starts materialising every column on a background thread. The worker
    /// stops as soon as this cache is dropped.
    pub fn spawn_worker(&self) -> std::io::Result<()> {
        if self.error().is_some() {
            return Ok(());
        }
        let store = Arc::clone(&self.store);
        let abandoned = Arc::clone(&self.abandoned);
        let analyzer = {
            let guard = self.analyzer.lock();
            FrameAnalyzer::new(Arc::clone(&guard.source), self.params)
        };

        thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || run_worker(store, analyzer, abandoned))
            .map(|_| ())
    }

    pub fn params(&self) -> &TransformParams {
        &self.params
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn fft_size(&self) -> usize {
        self.params.fft_size()
    }

    pub fn hop_size(&self) -> usize {
        self.params.hop_size()
    }

    /// Number of analysis columns covering the source.
    pub fn width(&self) -> usize {
        self.store.frames.len()
    }

    /// Number of frequency bins per column.
    pub fn height(&self) -> usize {
        self.params.bin_count()
    }

    pub fn error(&self) -> Option<&str> {
        self.store.error.get().map(String::as_str)
    }

    pub fn is_ok(&self) -> bool {
        self.error().is_none()
    }

    /// Percentage of columns materialised so far. Reports 100 once nothing
    /// more will be computed (complete, empty or failed).
    pub fn completion(&self) -> u8 {
        let width = self.width();
        if width == 0 || self.error().is_some() {
            return 100;
        }
        let computed = self.store.computed.load(Ordering::Acquire).min(width);
        ((computed * 100) / width) as u8
    }

    pub fn bin_frequency(&self, bin: f64) -> f64 {
        bin * self.sample_rate as f64 / self.fft_size() as f64
    }

    /// First source frame covered by `column`'s analysis window.
    pub fn column_start_frame(&self, column: usize) -> i64 {
        column_start_frame(self.origin, &self.params, column)
    }

    /// Computes any missing columns in `columns`. Mutates the cache but never
    /// changes an already observable value.
    pub fn ensure_computed(&self, columns: Range<usize>) {
        let end = columns.end.min(self.width());
        if columns.start >= end || self.error().is_some() {
            return;
        }
        let mut analyzer = self.analyzer.lock();
        for column in columns.start..end {
            if self.store.fill(column, &mut analyzer).is_none() {
                break;
            }
        }
    }

    pub fn frame(&self, column: usize) -> Option<&TransformFrame> {
        if self.error().is_some() {
            return None;
        }
        let slot = self.store.frames.get(column)?;
        if let Some(frame) = slot.get() {
            return Some(frame);
        }
        let mut analyzer = self.analyzer.lock();
        self.store.fill(column, &mut analyzer)
    }

    /// Whether `column` is materialised, without computing it.
    pub fn has_frame(&self, column: usize) -> bool {
        self.error().is_none()
            && self
                .store
                .frames
                .get(column)
                .is_some_and(|slot| slot.get().is_some())
    }

    pub fn column_magnitudes(&self, column: usize) -> Option<&[f32]> {
        self.frame(column).map(|frame| &*frame.magnitudes)
    }

    pub fn column_phases(&self, column: usize) -> Option<&[f32]> {
        self.frame(column).map(|frame| &*frame.phases)
    }

    /// Raw (unnormalised) FFT magnitude.
    pub fn magnitude(&self, column: usize, bin: usize) -> f32 {
        self.column_magnitudes(column)
            .and_then(|mags| mags.get(bin).copied())
            .unwrap_or(0.0)
    }

    pub fn phase(&self, column: usize, bin: usize) -> f32 {
        self.column_phases(column)
            .and_then(|phases| phases.get(bin).copied())
            .unwrap_or(0.0)
    }

    /// True when the bin is non-zero and no smaller than any of its two
    /// neighbours on either side along the frequency axis.
    pub fn is_local_peak(&self, column: usize, bin: usize) -> bool {
        let Some(mags) = self.column_magnitudes(column) else {
            return false;
        };
        let Some(&value) = mags.get(bin) else {
            return false;
        };
        if value <= 0.0 {
            return false;
        }
        let lower = bin.saturating_sub(2)..bin;
        let upper = (bin + 1)..(bin + 3).min(mags.len());
        lower.chain(upper).all(|neighbour| mags[neighbour] <= value)
    }

    pub fn is_over_threshold(&self, column: usize, bin: usize, threshold: f32) -> bool {
        self.magnitude(column, bin) > threshold
    }

    /// Phase-vocoder frequency estimate for `bin` in Hz, using the phase
    /// advance to the next column. The deviation is confined to half a bin
    /// either side of the nominal centre; without a next column the nominal
    /// frequency is returned.
    pub fn estimate_stable_frequency(&self, column: usize, bin: usize) -> f64 {
        let nominal = self.bin_frequency(bin as f64);
        if column + 1 >= self.width() || bin >= self.height() {
            return nominal;
        }
        let (Some(current), Some(next)) = (self.column_phases(column), self.column_phases(column + 1))
        else {
            return nominal;
        };

        let fft_size = self.fft_size() as f64;
        let hop = self.hop_size() as f64;
        let old_phase = current[bin] as f64;
        let new_phase = next[bin] as f64;

        let expected = old_phase + core::f64::consts::TAU * bin as f64 * hop / fft_size;
        let phase_error = princarg(new_phase - expected);
        let deviation = (phase_error * fft_size / (core::f64::consts::TAU * hop))
            .clamp(-0.5, 0.5 - f64::EPSILON);

        self.bin_frequency(bin as f64 + deviation)
    }
}

impl Drop for SpectralCache {
    fn drop(&mut self) {
        self.abandoned.store(true, Ordering::Release);
    }
}

fn run_worker(store: Arc<FrameStore>, mut analyzer: FrameAnalyzer, abandoned: Arc<AtomicBool>) {
    debug!(
        "[transform] worker started for {} columns",
        store.frames.len()
    );
    for column in 0..store.frames.len() {
        if abandoned.load(Ordering::Acquire) {
            debug!("[transform] worker superseded at column {column}");
            return;
        }
        if store.fill(column, &mut analyzer).is_none() {
            return;
        }
    }
    debug!("[transform] worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::MemorySignal;
    use std::time::{Duration, Instant};

    const BUDGET: usize = 64 * 1024 * 1024;

    fn sine(freq: f32, sample_rate: f32, frames: usize) -> Arc<dyn SignalSource> {
        let samples = (0..frames)
            .map(|n| (core::f32::consts::TAU * freq * n as f32 / sample_rate).sin())
            .collect();
        Arc::new(MemorySignal::mono(samples, sample_rate))
    }

    fn params(window_size: usize, hop_level: u32) -> TransformParams {
        TransformParams {
            window_size,
            hop_level,
            ..TransformParams::default()
        }
    }

    #[test]
    fn hop_and_fft_sizes_follow_window() {
        for window_size in [16usize, 256, 1024, 4096, 65_536] {
            for hop_level in 0..=MAX_HOP_LEVEL {
                for oversampling in [1usize, 2, 4] {
                    let p = TransformParams {
                        window_size,
                        hop_level,
                        oversampling,
                        ..TransformParams::default()
                    };
                    assert!(p.validate().is_ok());
                    assert_eq!(p.hop_size(), window_size >> hop_level);
                    assert!(p.fft_size() >= window_size);
                }
            }
        }
    }

    #[test]
    fn rejects_out_of_range_parameters() {
        assert!(params(0, 0).validate().is_err());
        assert!(params(1024, 6).validate().is_err());
        let p = TransformParams {
            oversampling: 0,
            ..TransformParams::default()
        };
        assert!(matches!(
            p.validate(),
            Err(EngineError::InvalidParameter { name: "fft oversampling", .. })
        ));
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        // 250 Hz lands exactly on bin 32 of a 1024-point FFT at 8 kHz.
        let cache = SpectralCache::new(sine(250.0, 8_000.0, 8_192), params(1024, 2), BUDGET);
        let column = 4;
        let mags = cache.column_magnitudes(column).unwrap();
        let peak = mags
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(bin, _)| bin)
            .unwrap();
        assert_eq!(peak, 32);

        // Hann coherent gain 0.5: a unit sine reads 0.5 after 2/N scaling.
        let scaled = cache.magnitude(column, 32) * 2.0 / cache.fft_size() as f32;
        assert!((scaled - 0.5).abs() < 0.01, "scaled peak {scaled}");

        assert!(cache.is_local_peak(column, 32));
        assert!(!cache.is_local_peak(column, 31));
        assert!(!cache.is_local_peak(column, 33));
        assert!(!cache.is_local_peak(column, 30));
        assert!(cache.is_over_threshold(column, 32, 1.0));
        assert!(!cache.is_over_threshold(column, 200, 1.0));
    }

    #[test]
    fn out_of_range_reads_are_zero() {
        let cache = SpectralCache::new(sine(250.0, 8_000.0, 2_048), params(512, 1), BUDGET);
        assert_eq!(cache.width(), 8);
        assert_eq!(cache.magnitude(100, 3), 0.0);
        assert_eq!(cache.magnitude(0, 10_000), 0.0);
        assert!(!cache.is_local_peak(100, 3));
    }

    #[test]
    fn completion_is_monotonic_and_reaches_full() {
        let cache = SpectralCache::new(sine(440.0, 8_000.0, 16_000), params(256, 1), BUDGET);
        assert_eq!(cache.completion(), 0);

        let mut last = 0;
        let width = cache.width();
        for end in (0..=width).step_by(17) {
            cache.ensure_computed(0..end);
            let now = cache.completion();
            assert!(now >= last);
            last = now;
        }
        cache.ensure_computed(0..width);
        assert_eq!(cache.completion(), 100);
    }

    #[test]
    fn budget_overflow_degrades_to_empty_results() {
        let cache = SpectralCache::new(sine(440.0, 8_000.0, 16_000), params(1024, 2), 1024);
        assert!(!cache.is_ok());
        assert!(cache.error().unwrap().contains("insufficient memory"));
        assert_eq!(cache.magnitude(0, 10), 0.0);
        assert_eq!(cache.phase(0, 10), 0.0);
        assert!(cache.frame(0).is_none());
        assert_eq!(cache.completion(), 100);
        assert!(cache.spawn_worker().is_ok());
    }

    #[test]
    fn background_worker_materialises_everything() {
        let cache = SpectralCache::new(sine(440.0, 8_000.0, 32_000), params(512, 2), BUDGET);
        cache.spawn_worker().unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while cache.completion() < 100 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(cache.completion(), 100);
        assert!((0..cache.width()).all(|column| cache.has_frame(column)));
    }

    #[test]
    fn stable_frequency_refines_off_bin_sine() {
        // Bin spacing 31.25 Hz; 1010 Hz sits 0.32 bins above bin 32.
        let cache = SpectralCache::new(sine(1_010.0, 8_000.0, 8_192), params(256, 2), BUDGET);
        let estimate = cache.estimate_stable_frequency(10, 32);
        assert!((estimate - 1_010.0).abs() < 3.0, "estimate {estimate}");
        assert!((estimate - cache.bin_frequency(32.0)).abs() <= 31.25 * 0.5);
    }

    #[test]
    fn stable_frequency_falls_back_on_last_column() {
        let cache = SpectralCache::new(sine(1_010.0, 8_000.0, 4_096), params(256, 2), BUDGET);
        let last = cache.width() - 1;
        assert_eq!(cache.estimate_stable_frequency(last, 32), 1_000.0);
    }

    #[test]
    fn zero_padding_doubles_bin_count() {
        let p = TransformParams {
            oversampling: 4,
            ..params(256, 2)
        };
        let cache = SpectralCache::new(sine(1_000.0, 8_000.0, 4_096), p, BUDGET);
        assert_eq!(cache.height(), 513);
        assert_eq!(cache.column_magnitudes(3).unwrap().len(), 513);
    }
}
