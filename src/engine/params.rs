//! Parameter groups held by the engine.
//!
//! [`AnalysisParams`] shape the transform: changing one of them replaces the
//! transform model. [`DisplayParams`] only change how the model is painted.

use crate::dsp::transform::{MAX_HOP_LEVEL, TransformParams};
use crate::dsp::window::WindowKind;
use crate::error::{EngineError, Result};
use crate::render::axis::{BinDisplay, BinScale};
use crate::render::colour::{ColourScaleKind, MAX_ROTATION};
use crate::render::normalize::Normalization;
use serde::{Deserialize, Serialize};

/// Zero-padding factor used by the padded smoothing modes.
pub const ZERO_PAD_OVERSAMPLING: usize = 4;

/// How coarse bins are smoothed for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Smoothing {
    None,
    #[default]
    Interpolated,
    ZeroPadded,
    ZeroPaddedAndInterpolated,
}

impl Smoothing {
    pub fn interpolates(self) -> bool {
        matches!(self, Smoothing::Interpolated | Smoothing::ZeroPaddedAndInterpolated)
    }

    pub fn zero_pads(self) -> bool {
        matches!(self, Smoothing::ZeroPadded | Smoothing::ZeroPaddedAndInterpolated)
    }

    /// FFT oversampling for this mode. Peak displays need exact bins, so
    /// they never zero-pad.
    pub fn oversampling(self, bin_display: BinDisplay) -> usize {
        if self.zero_pads() && bin_display == BinDisplay::AllBins {
            ZERO_PAD_OVERSAMPLING
        } else {
            1
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisParams {
    pub channel: usize,
    pub window_size: usize,
    pub hop_level: u32,
    pub window: WindowKind,
    pub smoothing: Smoothing,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        let transform = TransformParams::default();
        Self {
            channel: transform.channel,
            window_size: transform.window_size,
            hop_level: transform.hop_level,
            window: transform.window,
            smoothing: Smoothing::default(),
        }
    }
}

impl AnalysisParams {
    pub fn transform_params(&self, bin_display: BinDisplay) -> TransformParams {
        TransformParams {
            window_size: self.window_size,
            hop_level: self.hop_level.min(MAX_HOP_LEVEL),
            window: self.window,
            oversampling: self.smoothing.oversampling(bin_display),
            channel: self.channel,
        }
    }

    pub fn fft_size(&self, bin_display: BinDisplay) -> usize {
        self.transform_params(bin_display).fft_size()
    }

    pub fn validate(&self) -> Result<()> {
        TransformParams {
            hop_level: self.hop_level,
            ..self.transform_params(BinDisplay::AllBins)
        }
        .validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayParams {
    /// Hz; `0` shows from DC.
    pub min_frequency: f64,
    /// Hz; `0` shows up to Nyquist.
    pub max_frequency: f64,
    pub bin_scale: BinScale,
    pub bin_display: BinDisplay,
    pub normalization: Normalization,
    pub normalize_visible_area: bool,
    pub colour_scale: ColourScaleKind,
    pub colour_map: usize,
    pub gain: f32,
    /// Absolute magnitude floor, compared after gain.
    pub threshold: f32,
    pub colour_rotation: u32,
}

impl Default for DisplayParams {
    fn default() -> Self {
        Self {
            min_frequency: 10.0,
            max_frequency: 8_000.0,
            bin_scale: BinScale::Linear,
            bin_display: BinDisplay::AllBins,
            normalization: Normalization::None,
            normalize_visible_area: false,
            colour_scale: ColourScaleKind::Log,
            colour_map: 0,
            gain: 1.0,
            threshold: 0.0,
            colour_rotation: 0,
        }
    }
}

impl DisplayParams {
    /// Rejects values no setter would accept. `colour_map` is checked by the
    /// engine against its palette table.
    pub fn validate(&self) -> Result<()> {
        check_frequency("min frequency", self.min_frequency)?;
        check_frequency("max frequency", self.max_frequency)?;
        if !self.gain.is_finite() || self.gain < 0.0 {
            return Err(EngineError::invalid(
                "gain",
                format!("{} is not a finite non-negative value", self.gain),
            ));
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(EngineError::invalid(
                "threshold",
                format!("{} is not a finite non-negative value", self.threshold),
            ));
        }
        if self.colour_rotation > MAX_ROTATION {
            return Err(EngineError::invalid(
                "colour rotation",
                format!("{} outside 0..={MAX_ROTATION}", self.colour_rotation),
            ));
        }
        Ok(())
    }

    /// Ceiling of the linear colour scale. Unnormalised magnitudes rarely get
    /// near 1.0, so that case uses a low ceiling just above the threshold.
    pub fn linear_ceiling(&self) -> f32 {
        if self.colour_scale == ColourScaleKind::Linear
            && self.normalization == Normalization::None
            && !self.normalize_visible_area
        {
            (self.threshold + 0.1).max(0.1)
        } else {
            1.0
        }
    }
}

pub(crate) fn check_frequency(name: &'static str, hz: f64) -> Result<()> {
    if hz.is_finite() && hz >= 0.0 {
        Ok(())
    } else {
        Err(EngineError::invalid(
            name,
            format!("{hz} Hz is not a finite non-negative frequency"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_padding_only_for_all_bins() {
        let padded = Smoothing::ZeroPaddedAndInterpolated;
        assert_eq!(padded.oversampling(BinDisplay::AllBins), 4);
        assert_eq!(padded.oversampling(BinDisplay::PeakFrequencies), 1);
        assert_eq!(Smoothing::Interpolated.oversampling(BinDisplay::AllBins), 1);
        assert!(padded.interpolates() && !Smoothing::ZeroPadded.interpolates());

        let analysis = AnalysisParams {
            smoothing: Smoothing::ZeroPadded,
            ..AnalysisParams::default()
        };
        assert_eq!(analysis.fft_size(BinDisplay::AllBins), 4096);
        assert_eq!(analysis.fft_size(BinDisplay::PeakBins), 1024);
    }

    #[test]
    fn analysis_validation() {
        assert!(AnalysisParams::default().validate().is_ok());
        let bad = AnalysisParams {
            hop_level: 6,
            ..AnalysisParams::default()
        };
        assert!(matches!(bad.validate(), Err(EngineError::InvalidParameter { .. })));
        let tiny = AnalysisParams {
            window_size: 0,
            ..AnalysisParams::default()
        };
        assert!(tiny.validate().is_err());
    }

    #[test]
    fn display_validation_and_ceiling() {
        let mut display = DisplayParams::default();
        assert!(display.validate().is_ok());
        display.colour_rotation = 257;
        assert!(display.validate().is_err());
        display.colour_rotation = 0;
        display.gain = f32::NAN;
        assert!(display.validate().is_err());

        let linear = DisplayParams {
            colour_scale: ColourScaleKind::Linear,
            threshold: 0.25,
            ..DisplayParams::default()
        };
        assert!((linear.linear_ceiling() - 0.35).abs() < 1e-6);
        let normalised = DisplayParams {
            normalization: Normalization::Max1,
            ..linear
        };
        assert_eq!(normalised.linear_ceiling(), 1.0);
        assert_eq!(DisplayParams::default().linear_ceiling(), 1.0);
    }
}
