//! Cached, progressively rendered STFT spectrogram engine.
//!
//! A [`SpectrogramEngine`] turns a [`SignalSource`] into colour images of its
//! short-time Fourier transform for any number of host surfaces, each with
//! its own pan/zoom state and pixel cache.

pub mod dsp;
pub mod engine;
pub mod error;
pub mod render;
pub mod settings;
pub mod util;

pub use dsp::{MemorySignal, SignalSource};
pub use engine::{
    EngineConfig, EngineEvent, Renderable, SpectrogramEngine, ValueExtents, VerticalAxisProvider,
};
pub use error::{EngineError, Result};
pub use render::{ImageBuffer, PaintTarget, PixelRect, RenderResult, Rgba, SurfaceId, SurfaceView};
pub use settings::{Preset, SpectrogramSettings};
