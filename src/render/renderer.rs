//! Column renderer for one surface.
//!
//! Pixel columns are computed one at a time from the transform, normalised,
//! coloured and stored in the surface's [`SurfaceCache`]; what the cache
//! holds for the requested rect is then handed to the paint target. The
//! time-constrained variant checks its deadline between columns and always
//! makes progress by at least one column per call.

use super::axis::{BinDisplay, FrequencyAxis, TimeAxis};
use super::cache::SurfaceCache;
use super::colour::{ColourScale, ColourScaleKind};
use super::normalize::{Normalization, VisibleAreaScale};
use super::palette::Palette;
use super::{MagnitudeRange, PaintTarget, PixelRect, RenderResult, Rgba, SurfaceView};
use crate::dsp::peaks::PeakCache;
use crate::dsp::transform::SpectralCache;
use std::ops::{Range, RangeInclusive};
use std::time::Instant;
use tracing::trace;

/// Everything that decides what a pixel looks like, resolved from the
/// engine's display parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderParams {
    pub frequency: FrequencyAxis,
    pub bin_display: BinDisplay,
    pub normalization: Normalization,
    pub normalize_visible_area: bool,
    pub colour: ColourScale,
    pub palette: Box<Palette>,
    /// Multiplier applied to raw FFT magnitudes before normalisation.
    pub scale_factor: f32,
    /// Raw-magnitude threshold used to filter peak frequencies.
    pub raw_threshold: f32,
    /// Linearly interpolate between bins when a row spans less than one bin.
    pub interpolate: bool,
}

/// Data the renderer reads from. Borrowed per call so the engine can swap
/// transforms without touching renderers.
#[derive(Debug, Clone, Copy)]
pub struct RenderSources<'a> {
    pub transform: &'a SpectralCache,
    pub peaks: Option<&'a PeakCache>,
    pub time: TimeAxis,
}

// Rendered values for one pixel column, top row first.
struct ColumnValues {
    values: Vec<f32>,
    phases: Vec<f32>,
    range: MagnitudeRange,
}

#[derive(Debug, Default)]
struct ColumnScratch {
    column: Option<usize>,
    values: Vec<f32>,
}

#[derive(Debug)]
pub struct SurfaceRenderer {
    params: RenderParams,
    cache: SurfaceCache,
    visible_max: f32,
    scratch: ColumnScratch,
}

impl SurfaceRenderer {
    pub fn new(params: RenderParams) -> Self {
        Self {
            params,
            cache: SurfaceCache::new(),
            visible_max: 0.0,
            scratch: ColumnScratch::default(),
        }
    }

    /// Drops every cached pixel, e.g. after the source content changed.
    pub fn invalidate(&mut self) {
        self.cache.invalidate();
        self.visible_max = 0.0;
        self.scratch.column = None;
    }

    /// Magnitude range of the columns currently cached.
    pub fn cached_range(&self) -> MagnitudeRange {
        self.cache.valid_range()
    }

    pub fn largest_uncached_rect(&self, view: &SurfaceView) -> PixelRect {
        if self.cache.matches(view) {
            self.cache.largest_uncached_rect()
        } else {
            view.bounds()
        }
    }

    /// Renders all of `rect` with no time bound.
    pub fn render(
        &mut self,
        sources: &RenderSources<'_>,
        view: &SurfaceView,
        rect: PixelRect,
        target: &mut dyn PaintTarget,
    ) -> RenderResult {
        self.render_columns(sources, view, rect, None, target)
    }

    /// Renders as much of `rect` as fits before `deadline`, growing the
    /// cached run outwards from what is already valid.
    pub fn render_time_constrained(
        &mut self,
        sources: &RenderSources<'_>,
        view: &SurfaceView,
        rect: PixelRect,
        deadline: Instant,
        target: &mut dyn PaintTarget,
    ) -> RenderResult {
        self.render_columns(sources, view, rect, Some(deadline), target)
    }

    fn render_columns(
        &mut self,
        sources: &RenderSources<'_>,
        view: &SurfaceView,
        rect: PixelRect,
        deadline: Option<Instant>,
        target: &mut dyn PaintTarget,
    ) -> RenderResult {
        let request = rect.intersect(&view.bounds());
        if request.is_empty() {
            return RenderResult::default();
        }
        let full_height = PixelRect::new(request.x, 0, request.width, view.height);

        self.cache.sync_to(view);

        let mut range = MagnitudeRange::default();
        let mut computed = 0;
        let mut out_of_time = false;

        while !out_of_time {
            let (left, right) = match self.cache.missing_columns(&full_height) {
                Some(parts) => parts,
                None => {
                    self.cache.invalidate();
                    (request.x..request.x, full_height.columns())
                }
            };
            // One contiguous side per pass keeps every stored batch adjacent
            // to the valid run.
            let batch: Vec<u32> = if !right.is_empty() {
                right.collect()
            } else if !left.is_empty() {
                left.rev().collect()
            } else {
                break;
            };

            let mut columns = Vec::with_capacity(batch.len());
            for &x in &batch {
                if computed > 0 && deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    out_of_time = true;
                    break;
                }
                columns.push((x, self.compute_column(sources, view, x as i64)));
                computed += 1;
            }

            if self.uses_visible_area() {
                let batch_max = columns
                    .iter()
                    .map(|(_, column)| column.range)
                    .filter(MagnitudeRange::is_set)
                    .map(|range| range.max())
                    .fold(0.0, f32::max);
                if batch_max > self.visible_max {
                    trace!(
                        "[render] visible max {} -> {batch_max}, restarting cached run",
                        self.visible_max
                    );
                    self.visible_max = batch_max;
                    self.cache.invalidate();
                }
            }

            for (x, column) in columns {
                let pixels = self.colour_column(&column);
                range.sample(&column.range);
                self.cache.store_column(x, &pixels, column.range);
            }
        }

        let rendered = self.cache.blit(&request, target);
        RenderResult {
            rendered,
            range,
            computed_columns: computed,
        }
    }

    fn uses_visible_area(&self) -> bool {
        self.params.normalize_visible_area && self.params.normalization == Normalization::None
    }

    fn uses_peak_cache(&self, sources: &RenderSources<'_>, span: &RangeInclusive<usize>) -> Option<usize> {
        let peaks = sources.peaks?;
        let eligible = self.params.normalization == Normalization::None
            && !self.params.normalize_visible_area
            && self.params.bin_display == BinDisplay::AllBins
            && self.params.colour.kind != ColourScaleKind::Phase;
        let divisor = peaks.divisor();
        (eligible && span.end() + 1 - span.start() >= divisor).then_some(divisor)
    }

    fn colour_column(&self, column: &ColumnValues) -> Vec<Rgba> {
        let area = VisibleAreaScale::new(if self.uses_visible_area() {
            self.visible_max
        } else {
            0.0
        });
        column
            .values
            .iter()
            .zip(&column.phases)
            .map(|(&value, &phase)| {
                if value.is_nan() {
                    return Rgba::TRANSPARENT;
                }
                let mut scaled = [value];
                area.apply(&mut scaled);
                self.params.palette[self.params.colour.colour_for(scaled[0], phase) as usize]
            })
            .collect()
    }

    fn compute_column(&mut self, sources: &RenderSources<'_>, view: &SurfaceView, x: i64) -> ColumnValues {
        let height = view.height as usize;
        let mut column = ColumnValues {
            values: vec![0.0; height],
            phases: vec![0.0; height],
            range: MagnitudeRange::default(),
        };
        let Some(span) = sources.time.column_span(view, x) else {
            // Outside the signal: transparent, but counts as rendered.
            column.values.fill(f32::NAN);
            return column;
        };

        let transform = sources.transform;
        if let Some(divisor) = self.uses_peak_cache(sources, &span) {
            self.fill_from_peaks(sources, &span, divisor, view.height, &mut column);
        } else if self.params.bin_display == BinDisplay::PeakFrequencies {
            for s in span {
                self.fill_peak_frequencies(transform, s, view.height, &mut column);
            }
        } else {
            column.values.fill(f32::NEG_INFINITY);
            for s in span {
                self.fill_bins(transform, s, view.height, &mut column);
            }
            for value in column.values.iter_mut().filter(|v| **v == f32::NEG_INFINITY) {
                *value = 0.0;
            }
        }

        for &value in &column.values {
            column.range.sample_value(value);
        }
        column
    }

    fn load_column(&mut self, transform: &SpectralCache, s: usize) -> &[f32] {
        if self.scratch.column == Some(s) {
            return &self.scratch.values;
        }
        let bins = transform.height();
        let values = &mut self.scratch.values;
        values.clear();
        values.resize(bins, 0.0);

        if let Some(magnitudes) = transform.column_magnitudes(s) {
            let scale = self.params.scale_factor;
            let peaks_only = self.params.bin_display.peaks_only();
            for (bin, (value, &magnitude)) in values.iter_mut().zip(magnitudes).enumerate() {
                if peaks_only && !transform.is_local_peak(s, bin) {
                    continue;
                }
                *value = magnitude * scale;
            }
            let shown = displayed_bins(&self.params.frequency, bins);
            self.params.normalization.apply(&mut values[shown]);
        }

        self.scratch.column = Some(s);
        &self.scratch.values
    }

    fn fill_bins(&mut self, transform: &SpectralCache, s: usize, height: u32, column: &mut ColumnValues) {
        let axis = self.params.frequency;
        let interpolate = self.params.interpolate && self.params.bin_display == BinDisplay::AllBins;
        let want_phase = self.params.colour.kind == ColourScaleKind::Phase;
        let bins = transform.height();
        let values = self.load_column(transform, s);

        for y in 0..height as usize {
            let Some(span) = axis.bin_span(y as i64, height, bins) else {
                continue;
            };
            let (value, bin) = match axis.y_bin_range(y as i64, height) {
                Some((q0, q1)) if interpolate && q1 - q0 < 1.0 => {
                    interpolated(values, (q0 + q1) / 2.0)
                }
                _ => strongest(values, span),
            };
            if value > column.values[y] {
                column.values[y] = value;
                if want_phase {
                    column.phases[y] = transform.phase(s, bin);
                }
            }
        }
    }

    fn fill_peak_frequencies(
        &mut self,
        transform: &SpectralCache,
        s: usize,
        height: u32,
        column: &mut ColumnValues,
    ) {
        let axis = self.params.frequency;
        let raw_threshold = self.params.raw_threshold;
        let want_phase = self.params.colour.kind == ColourScaleKind::Phase;
        let shown = displayed_bins(&axis, transform.height());
        let values = self.load_column(transform, s);

        for bin in shown {
            let value = values[bin];
            if value <= 0.0 || !transform.is_over_threshold(s, bin, raw_threshold) {
                continue;
            }
            let frequency = transform.estimate_stable_frequency(s, bin);
            let y = axis.y_for_frequency(frequency, height as f64).floor();
            if y < 0.0 || y >= height as f64 {
                continue;
            }
            let y = y as usize;
            if value > column.values[y] {
                column.values[y] = value;
                if want_phase {
                    column.phases[y] = transform.phase(s, bin);
                }
            }
        }
    }

    fn fill_from_peaks(
        &mut self,
        sources: &RenderSources<'_>,
        span: &RangeInclusive<usize>,
        divisor: usize,
        height: u32,
        column: &mut ColumnValues,
    ) {
        let Some(peaks) = sources.peaks else {
            return;
        };
        let transform = sources.transform;
        let axis = self.params.frequency;
        let scale = self.params.scale_factor;
        let bins = transform.height();
        let time_blocks = (span.start() / divisor)..(span.end() / divisor + 1);
        peaks.ensure_computed(transform, time_blocks.clone());

        for y in 0..height as usize {
            let Some(rows) = axis.bin_span(y as i64, height, bins) else {
                continue;
            };
            let value = if rows.end() + 1 - rows.start() >= divisor {
                block_max(peaks, transform, time_blocks.clone(), &rows, divisor)
            } else {
                span.clone()
                    .filter_map(|s| transform.column_magnitudes(s))
                    .flat_map(|mags| mags[rows.clone()].iter().copied())
                    .fold(0.0, f32::max)
            };
            column.values[y] = value * scale;
        }
    }
}

fn block_max(
    peaks: &PeakCache,
    transform: &SpectralCache,
    time_blocks: Range<usize>,
    rows: &RangeInclusive<usize>,
    divisor: usize,
) -> f32 {
    let freq_blocks = (rows.start() / divisor)..=(rows.end() / divisor);
    time_blocks
        .flat_map(|tb| freq_blocks.clone().map(move |fb| (tb, fb)))
        .map(|(tb, fb)| peaks.get_max(transform, tb, fb))
        .fold(0.0, f32::max)
}

fn displayed_bins(axis: &FrequencyAxis, bins: usize) -> Range<usize> {
    let last = bins.saturating_sub(1);
    let low = axis.effective_min_bin().min(last);
    let high = axis.effective_max_bin().min(last);
    low..high + 1
}

fn strongest(values: &[f32], span: RangeInclusive<usize>) -> (f32, usize) {
    let start = *span.start();
    span.map(|bin| (values[bin], bin))
        .fold((f32::NEG_INFINITY, start), |best, cell| if cell.0 > best.0 { cell } else { best })
}

fn interpolated(values: &[f32], position: f64) -> (f32, usize) {
    let position = position.max(0.0);
    let low = (position.floor() as usize).min(values.len().saturating_sub(1));
    let high = (low + 1).min(values.len().saturating_sub(1));
    let t = (position - low as f64).clamp(0.0, 1.0) as f32;
    let value = values[low] + (values[high] - values[low]) * t;
    let nearest = if t < 0.5 { low } else { high };
    (value, nearest)
}
