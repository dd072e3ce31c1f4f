//! Spectrogram engine: one signal source, one transform model, many surfaces.
//!
//! The engine owns every cache. Hosts refer to their viewports only through
//! [`SurfaceId`]s and learn about changes through [`EngineEvent`]
//! subscriptions. Parameter setters validate first and leave state untouched
//! on error; a successful change invalidates the affected caches before the
//! next render can observe them.

pub mod config;
pub mod params;
pub mod query;

pub use config::EngineConfig;
pub use params::{AnalysisParams, DisplayParams, Smoothing};
pub use query::{FeatureDescription, Snap};

use crate::dsp::SignalSource;
use crate::dsp::peaks::PeakCache;
use crate::dsp::transform::{SpectralCache, TransformParams};
use crate::dsp::window::WindowKind;
use crate::error::{EngineError, Result};
use crate::render::axis::{BinDisplay, BinScale, FrequencyAxis, TimeAxis};
use crate::render::colour::{ColourScale, ColourScaleKind};
use crate::render::normalize::Normalization;
use crate::render::palette::{BuiltinPalettes, PaletteSource};
use crate::render::renderer::{RenderParams, RenderSources, SurfaceRenderer};
use crate::render::zoom::ZoomStepMapper;
use crate::render::{MagnitudeRange, PaintTarget, PixelRect, RenderResult, SurfaceId, SurfaceView};
use crate::settings::SpectrogramSettings;
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use std::ops::Range;
use std::sync::{Arc, mpsc};
use std::time::Instant;
use tracing::{debug, warn};

/// Change notifications delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ParametersChanged,
    /// A new transform model was built for the current parameters.
    TransformReplaced,
    /// Carries [`EngineError::TransformAllocationFailure`].
    TransformFailed(EngineError),
    VerticalZoomChanged(u32),
    /// `None` asks every surface to repaint.
    RepaintRequested(Option<SurfaceId>),
}

/// Paint-side capability consumed by host surfaces.
pub trait Renderable {
    /// Paints all of `rect`. Renders nothing while the model is unavailable.
    fn render(&mut self, view: &SurfaceView, rect: PixelRect, target: &mut dyn PaintTarget) -> RenderResult;

    /// Paints as much of `rect` as fits before `deadline`.
    fn render_time_constrained(
        &mut self,
        view: &SurfaceView,
        rect: PixelRect,
        deadline: Instant,
        target: &mut dyn PaintTarget,
    ) -> RenderResult;

    fn largest_uncached_rect(&self, view: &SurfaceView) -> PixelRect;

    /// Transform completion in percent.
    fn completion(&self) -> u8;

    /// [`EngineError::ModelNotReady`] while the source is loading,
    /// [`EngineError::TransformAllocationFailure`] once the transform failed.
    fn error(&self) -> Option<EngineError>;

    /// Dormant surfaces lose their cache; it is rebuilt on the next render.
    fn set_surface_dormant(&mut self, surface: SurfaceId, dormant: bool);
}

/// Range of values a vertical scale can show.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueExtents {
    pub min: f64,
    pub max: f64,
    pub logarithmic: bool,
    pub unit: &'static str,
}

/// Frequency-scale capability consumed by rulers and zoom controls.
pub trait VerticalAxisProvider {
    fn value_extents(&self) -> ValueExtents;
    fn display_extents(&self) -> (f64, f64);
    fn set_display_extents(&mut self, min: f64, max: f64) -> Result<()>;
    fn zoom_step_count(&self) -> u32;
    /// Step matching the maximum frequency the engine was created with.
    fn default_zoom_step(&self) -> u32;
    fn current_zoom_step(&self) -> u32;
    fn set_zoom_step(&mut self, step: u32) -> Result<()>;
}

struct TransformModel {
    cache: SpectralCache,
    peaks: PeakCache,
}

pub struct SpectrogramEngine {
    config: EngineConfig,
    source: Arc<dyn SignalSource>,
    palettes: Arc<dyn PaletteSource>,
    analysis: AnalysisParams,
    display: DisplayParams,
    initial_max_frequency: f64,
    model: Mutex<Option<Arc<TransformModel>>>,
    surfaces: FxHashMap<SurfaceId, SurfaceRenderer>,
    dormant: FxHashSet<SurfaceId>,
    zoom_step: u32,
    watchers: RwLock<Vec<mpsc::Sender<EngineEvent>>>,
}

impl std::fmt::Debug for SpectrogramEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrogramEngine")
            .field("config", &self.config)
            .field("analysis", &self.analysis)
            .field("display", &self.display)
            .field("surfaces", &self.surfaces.len())
            .field("zoom_step", &self.zoom_step)
            .finish_non_exhaustive()
    }
}

impl SpectrogramEngine {
    pub fn new(source: Arc<dyn SignalSource>, config: EngineConfig) -> Self {
        let display = DisplayParams::default();
        let mut engine = Self {
            config,
            source,
            palettes: Arc::new(BuiltinPalettes),
            analysis: AnalysisParams::default(),
            display,
            initial_max_frequency: display.max_frequency,
            model: Mutex::new(None),
            surfaces: FxHashMap::default(),
            dormant: FxHashSet::default(),
            zoom_step: 0,
            watchers: RwLock::new(Vec::new()),
        };
        engine.initial_max_frequency = engine.initial_max();
        engine.zoom_step = engine.compute_zoom_step();
        engine
    }

    pub fn with_settings(
        source: Arc<dyn SignalSource>,
        config: EngineConfig,
        settings: &SpectrogramSettings,
    ) -> Result<Self> {
        let mut engine = Self::new(source, config);
        engine.apply_settings(settings)?;
        engine.initial_max_frequency = engine.initial_max();
        engine.zoom_step = engine.compute_zoom_step();
        Ok(engine)
    }

    /// Replaces the palette table. Out-of-range colour maps are reset.
    pub fn with_palettes(mut self, palettes: Arc<dyn PaletteSource>) -> Self {
        self.palettes = palettes;
        if self.display.colour_map >= self.palettes.map_count() {
            self.display.colour_map = 0;
        }
        self.invalidate_surfaces();
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn analysis(&self) -> &AnalysisParams {
        &self.analysis
    }

    pub fn display(&self) -> &DisplayParams {
        &self.display
    }

    pub fn settings(&self) -> SpectrogramSettings {
        SpectrogramSettings {
            analysis: self.analysis,
            display: self.display,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.source.sample_rate() as f64
    }

    pub fn fft_size(&self) -> usize {
        self.analysis.fft_size(self.display.bin_display)
    }

    pub fn transform_params(&self) -> TransformParams {
        self.analysis.transform_params(self.display.bin_display)
    }

    pub fn frequency_axis(&self) -> FrequencyAxis {
        FrequencyAxis {
            sample_rate: self.sample_rate(),
            fft_size: self.fft_size(),
            min_frequency: self.display.min_frequency,
            max_frequency: self.display.max_frequency,
            scale: self.display.bin_scale,
        }
    }

    pub fn subscribe(&self) -> mpsc::Receiver<EngineEvent> {
        let (tx, rx) = mpsc::channel();
        self.watchers.write().push(tx);
        rx
    }

    /// Magnitude range of the columns `surface` currently has cached.
    pub fn surface_range(&self, surface: SurfaceId) -> Option<MagnitudeRange> {
        self.surfaces.get(&surface).map(SurfaceRenderer::cached_range)
    }

    pub fn is_dormant(&self, surface: SurfaceId) -> bool {
        self.dormant.contains(&surface)
    }

    /// Applies a complete parameter set, or nothing if any value is invalid.
    pub fn apply_settings(&mut self, settings: &SpectrogramSettings) -> Result<()> {
        self.check_analysis(&settings.analysis)?;
        self.check_display(&settings.display)?;
        if settings.analysis == self.analysis && settings.display == self.display {
            return Ok(());
        }
        self.analysis = settings.analysis;
        self.display = settings.display;
        self.parameters_changed();
        Ok(())
    }

    pub fn set_channel(&mut self, channel: usize) -> Result<()> {
        self.update_analysis(AnalysisParams { channel, ..self.analysis })
    }

    pub fn set_window_size(&mut self, window_size: usize) -> Result<()> {
        self.update_analysis(AnalysisParams {
            window_size,
            ..self.analysis
        })
    }

    pub fn set_window_hop_level(&mut self, hop_level: u32) -> Result<()> {
        self.update_analysis(AnalysisParams { hop_level, ..self.analysis })
    }

    pub fn set_window(&mut self, window: WindowKind) -> Result<()> {
        self.update_analysis(AnalysisParams { window, ..self.analysis })
    }

    pub fn set_smoothing(&mut self, smoothing: Smoothing) -> Result<()> {
        self.update_analysis(AnalysisParams { smoothing, ..self.analysis })
    }

    pub fn set_gain(&mut self, gain: f32) -> Result<()> {
        self.update_display(DisplayParams { gain, ..self.display })
    }

    pub fn set_threshold(&mut self, threshold: f32) -> Result<()> {
        self.update_display(DisplayParams { threshold, ..self.display })
    }

    pub fn set_min_frequency(&mut self, min_frequency: f64) -> Result<()> {
        self.update_display(DisplayParams {
            min_frequency,
            ..self.display
        })
    }

    pub fn set_max_frequency(&mut self, max_frequency: f64) -> Result<()> {
        self.update_display(DisplayParams {
            max_frequency,
            ..self.display
        })
    }

    pub fn set_bin_scale(&mut self, bin_scale: BinScale) -> Result<()> {
        self.update_display(DisplayParams { bin_scale, ..self.display })
    }

    /// May replace the transform: zero-padding only applies to all-bins display.
    pub fn set_bin_display(&mut self, bin_display: BinDisplay) -> Result<()> {
        self.update_display(DisplayParams {
            bin_display,
            ..self.display
        })
    }

    pub fn set_normalization(&mut self, normalization: Normalization) -> Result<()> {
        self.update_display(DisplayParams {
            normalization,
            ..self.display
        })
    }

    pub fn set_normalize_visible_area(&mut self, normalize_visible_area: bool) -> Result<()> {
        self.update_display(DisplayParams {
            normalize_visible_area,
            ..self.display
        })
    }

    pub fn set_colour_scale(&mut self, colour_scale: ColourScaleKind) -> Result<()> {
        self.update_display(DisplayParams {
            colour_scale,
            ..self.display
        })
    }

    pub fn set_colour_map(&mut self, colour_map: usize) -> Result<()> {
        self.update_display(DisplayParams {
            colour_map,
            ..self.display
        })
    }

    pub fn set_colour_rotation(&mut self, colour_rotation: u32) -> Result<()> {
        self.update_display(DisplayParams {
            colour_rotation,
            ..self.display
        })
    }

    /// The source's samples changed in `range` (or anywhere, for `None`).
    /// The whole model is rebuilt on next use; surfaces keep their render
    /// settings but lose every cached pixel.
    pub fn source_changed(&mut self, range: Option<Range<i64>>) {
        debug!("[engine] source content changed ({range:?}), discarding transform");
        *self.model.get_mut() = None;
        for renderer in self.surfaces.values_mut() {
            renderer.invalidate();
        }
        self.notify(EngineEvent::RepaintRequested(None));
    }

    fn check_analysis(&self, analysis: &AnalysisParams) -> Result<()> {
        analysis.validate()?;
        let channels = self.source.channel_count();
        if channels > 0 && analysis.channel >= channels {
            return Err(EngineError::invalid(
                "channel",
                format!("{} outside 0..{channels}", analysis.channel),
            ));
        }
        Ok(())
    }

    fn check_display(&self, display: &DisplayParams) -> Result<()> {
        display.validate()?;
        let maps = self.palettes.map_count();
        if display.colour_map >= maps {
            return Err(EngineError::invalid(
                "colour map",
                format!("{} outside 0..{maps}", display.colour_map),
            ));
        }
        Ok(())
    }

    fn update_analysis(&mut self, next: AnalysisParams) -> Result<()> {
        self.check_analysis(&next)?;
        if next != self.analysis {
            self.analysis = next;
            self.parameters_changed();
        }
        Ok(())
    }

    fn update_display(&mut self, next: DisplayParams) -> Result<()> {
        self.check_display(&next)?;
        if next != self.display {
            self.display = next;
            self.parameters_changed();
        }
        Ok(())
    }

    fn parameters_changed(&mut self) {
        let wanted = self.transform_params();
        let model = self.model.get_mut();
        if model.as_ref().is_some_and(|model| *model.cache.params() != wanted) {
            debug!("[engine] transform parameters changed, discarding model");
            *model = None;
        }
        self.invalidate_surfaces();
        self.notify(EngineEvent::ParametersChanged);
        self.update_zoom_step();
    }

    fn invalidate_surfaces(&mut self) {
        if !self.surfaces.is_empty() {
            debug!("[engine] invalidating {} surface caches", self.surfaces.len());
        }
        self.surfaces.clear();
    }

    fn notify(&self, event: EngineEvent) {
        self.watchers.write().retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Current transform model, built on first use. `None` until the source
    /// is ready.
    fn model(&self) -> Option<Arc<TransformModel>> {
        if !self.source.is_ready() {
            return None;
        }
        let mut slot = self.model.lock();
        if let Some(model) = slot.as_ref() {
            return Some(Arc::clone(model));
        }

        let cache = SpectralCache::new(
            Arc::clone(&self.source),
            self.transform_params(),
            self.config.frame_budget_bytes,
        );
        if self.config.background_worker
            && let Err(err) = cache.spawn_worker()
        {
            warn!("[engine] failed to start transform worker: {err}");
        }
        let failure = cache.error().map(allocation_failure);
        let peaks = PeakCache::new(&cache, self.config.peak_divisor);
        let model = Arc::new(TransformModel { cache, peaks });
        *slot = Some(Arc::clone(&model));
        drop(slot);

        self.notify(match failure {
            Some(err) => EngineEvent::TransformFailed(err),
            None => EngineEvent::TransformReplaced,
        });
        Some(model)
    }

    fn render_params(&self) -> RenderParams {
        let display = &self.display;
        let half = self.fft_size() as f32 / 2.0;
        let phase = display.colour_scale == ColourScaleKind::Phase;
        RenderParams {
            frequency: self.frequency_axis(),
            bin_display: display.bin_display,
            normalization: display.normalization,
            normalize_visible_area: display.normalize_visible_area,
            colour: ColourScale {
                kind: display.colour_scale,
                gain: display.gain,
                threshold: display.threshold,
                max_value: display.linear_ceiling(),
                rotation: display.colour_rotation,
            },
            palette: Box::new(self.palettes.palette(display.colour_map)),
            scale_factor: if phase { 1.0 } else { 1.0 / half },
            raw_threshold: display.threshold * half,
            interpolate: self.analysis.smoothing.interpolates(),
        }
    }

    fn time_axis(&self, cache: &SpectralCache) -> TimeAxis {
        let frames = self.source.frame_range();
        TimeAxis::from_cache(cache, frames.start, (frames.end - frames.start).max(0))
    }

    fn render_surface(
        &mut self,
        view: &SurfaceView,
        rect: PixelRect,
        deadline: Option<Instant>,
        target: &mut dyn PaintTarget,
    ) -> RenderResult {
        let Some(model) = self.model() else {
            return RenderResult::default();
        };
        if model.cache.error().is_some() {
            return RenderResult::default();
        }

        self.dormant.remove(&view.id);
        if !self.surfaces.contains_key(&view.id) {
            let renderer = SurfaceRenderer::new(self.render_params());
            self.surfaces.insert(view.id, renderer);
        }
        let sources = RenderSources {
            transform: &model.cache,
            peaks: Some(&model.peaks),
            time: self.time_axis(&model.cache),
        };
        let synchronous = self.config.synchronous_painting;
        let Some(renderer) = self.surfaces.get_mut(&view.id) else {
            return RenderResult::default();
        };

        let result = match deadline {
            Some(deadline) if !synchronous => {
                renderer.render_time_constrained(&sources, view, rect, deadline, target)
            }
            _ => renderer.render(&sources, view, rect, target),
        };

        if !renderer.largest_uncached_rect(view).is_empty() {
            self.notify(EngineEvent::RepaintRequested(Some(view.id)));
        }
        result
    }

    fn zoom_mapper(&self) -> ZoomStepMapper {
        ZoomStepMapper::new(self.sample_rate(), self.fft_size())
    }

    fn initial_max(&self) -> f64 {
        self.configured_extents().1
    }

    /// Configured `(min, max)` with "0 = Nyquist" resolved and both capped
    /// at Nyquist. Unlike [`VerticalAxisProvider::display_extents`] nothing is
    /// snapped to the bin grid.
    fn configured_extents(&self) -> (f64, f64) {
        let nyquist = self.sample_rate() / 2.0;
        let max = match self.display.max_frequency {
            max if max > 0.0 => max.min(nyquist),
            _ => nyquist,
        };
        (self.display.min_frequency.min(max), max)
    }

    fn compute_zoom_step(&self) -> u32 {
        let (min, max) = self.configured_extents();
        self.zoom_mapper().step_for_range(max - min)
    }

    fn update_zoom_step(&mut self) {
        let step = self.compute_zoom_step();
        if step != self.zoom_step {
            self.zoom_step = step;
            self.notify(EngineEvent::VerticalZoomChanged(step));
        }
    }
}

fn allocation_failure(message: &str) -> EngineError {
    EngineError::TransformAllocationFailure(message.to_owned())
}

impl Renderable for SpectrogramEngine {
    fn render(&mut self, view: &SurfaceView, rect: PixelRect, target: &mut dyn PaintTarget) -> RenderResult {
        self.render_surface(view, rect, None, target)
    }

    fn render_time_constrained(
        &mut self,
        view: &SurfaceView,
        rect: PixelRect,
        deadline: Instant,
        target: &mut dyn PaintTarget,
    ) -> RenderResult {
        self.render_surface(view, rect, Some(deadline), target)
    }

    fn largest_uncached_rect(&self, view: &SurfaceView) -> PixelRect {
        match self.surfaces.get(&view.id) {
            Some(renderer) => renderer.largest_uncached_rect(view),
            None => view.bounds(),
        }
    }

    fn completion(&self) -> u8 {
        self.model().map_or(0, |model| model.cache.completion())
    }

    fn error(&self) -> Option<EngineError> {
        match self.model() {
            Some(model) => model.cache.error().map(allocation_failure),
            None => Some(EngineError::ModelNotReady),
        }
    }

    fn set_surface_dormant(&mut self, surface: SurfaceId, dormant: bool) {
        if dormant {
            if self.surfaces.remove(&surface).is_some() {
                debug!("[engine] surface {} dormant, cache released", surface.0);
            }
            self.dormant.insert(surface);
        } else {
            self.dormant.remove(&surface);
        }
    }
}

impl VerticalAxisProvider for SpectrogramEngine {
    fn value_extents(&self) -> ValueExtents {
        ValueExtents {
            min: self.sample_rate() / self.fft_size() as f64,
            max: self.sample_rate() / 2.0,
            logarithmic: self.display.bin_scale == BinScale::Log,
            unit: "Hz",
        }
    }

    fn display_extents(&self) -> (f64, f64) {
        let axis = self.frequency_axis();
        (axis.effective_min_frequency(), axis.effective_max_frequency())
    }

    fn set_display_extents(&mut self, min: f64, max: f64) -> Result<()> {
        params::check_frequency("min frequency", min)?;
        params::check_frequency("max frequency", max)?;
        let nyquist = self.sample_rate() / 2.0;
        let (min, max) = (min.min(nyquist), max.min(nyquist));
        if min >= max {
            return Err(EngineError::invalid(
                "display extents",
                format!("{min} Hz is not below {max} Hz"),
            ));
        }
        self.update_display(DisplayParams {
            min_frequency: min,
            max_frequency: max,
            ..self.display
        })
    }

    fn zoom_step_count(&self) -> u32 {
        self.zoom_mapper().step_count()
    }

    fn default_zoom_step(&self) -> u32 {
        self.zoom_mapper().step_for_range(self.initial_max_frequency)
    }

    fn current_zoom_step(&self) -> u32 {
        self.zoom_step
    }

    fn set_zoom_step(&mut self, step: u32) -> Result<()> {
        let mapper = self.zoom_mapper();
        let (min, max) = self.configured_extents();
        let (min_frequency, max_frequency) =
            mapper.range_at_step(step.min(mapper.max_step()), min, max, self.display.bin_scale);
        self.update_display(DisplayParams {
            min_frequency,
            max_frequency,
            ..self.display
        })
    }
}
