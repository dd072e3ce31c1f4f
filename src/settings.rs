//! Persisted spectrogram parameter sets and presets.

pub mod attributes;
pub mod persistence;

pub use attributes::Attributes;
pub use persistence::SettingsStore;

use crate::engine::params::{AnalysisParams, DisplayParams};
use crate::error::Result;
use crate::render::axis::{BinDisplay, BinScale};
use crate::render::colour::ColourScaleKind;
use crate::render::normalize::Normalization;
use crate::render::palette::ColourMap;
use serde::{Deserialize, Serialize};

/// Everything a spectrogram needs to be restored.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrogramSettings {
    pub analysis: AnalysisParams,
    pub display: DisplayParams,
}

impl SpectrogramSettings {
    /// Value checks that need no signal source. Channel and colour map
    /// bounds are checked by the engine.
    pub fn validate(&self) -> Result<()> {
        self.analysis.validate()?;
        self.display.validate()
    }

    pub fn fft_size(&self) -> usize {
        self.analysis.fft_size(self.display.bin_display)
    }

    pub fn to_attributes(&self) -> Attributes {
        attributes::write(self)
    }

    /// Reads a flat attribute set on top of the defaults.
    pub fn from_attributes(attributes: &Attributes) -> Self {
        attributes::read(attributes, Self::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    #[default]
    Default,
    FullRangeDb,
    MelodicRange,
    MelodicPeaks,
}

impl Preset {
    pub const ALL: &'static [Preset] = &[
        Preset::Default,
        Preset::FullRangeDb,
        Preset::MelodicRange,
        Preset::MelodicPeaks,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Preset::Default => "Default",
            Preset::FullRangeDb => "Full Range, dB",
            Preset::MelodicRange => "Melodic Range",
            Preset::MelodicPeaks => "Melodic Range, Peak Frequencies",
        }
    }

    pub fn settings(self) -> SpectrogramSettings {
        let base = SpectrogramSettings::default();
        match self {
            Preset::Default => base,
            Preset::FullRangeDb => SpectrogramSettings {
                display: DisplayParams {
                    max_frequency: 0.0,
                    ..base.display
                },
                ..base
            },
            Preset::MelodicRange => SpectrogramSettings {
                analysis: AnalysisParams {
                    window_size: 8192,
                    hop_level: 4,
                    ..base.analysis
                },
                display: DisplayParams {
                    min_frequency: 40.0,
                    max_frequency: 1_500.0,
                    bin_scale: BinScale::Log,
                    colour_scale: ColourScaleKind::Linear,
                    colour_map: ColourMap::Sunset.index(),
                    ..base.display
                },
            },
            Preset::MelodicPeaks => SpectrogramSettings {
                analysis: AnalysisParams {
                    window_size: 4096,
                    hop_level: 5,
                    ..base.analysis
                },
                display: DisplayParams {
                    min_frequency: 40.0,
                    max_frequency: 2_000.0,
                    bin_scale: BinScale::Log,
                    bin_display: BinDisplay::PeakFrequencies,
                    normalization: Normalization::Max1,
                    colour_scale: ColourScaleKind::Linear,
                    ..base.display
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        for &preset in Preset::ALL {
            assert!(preset.settings().validate().is_ok(), "{}", preset.name());
        }
        let peaks = Preset::MelodicPeaks.settings();
        assert_eq!(peaks.analysis.transform_params(peaks.display.bin_display).hop_size(), 128);
        assert_eq!(Preset::Default.settings(), SpectrogramSettings::default());
        assert_eq!(Preset::MelodicRange.settings().display.colour_map, 1);
    }

    #[test]
    fn json_uses_snake_case_and_defaults() {
        let json = serde_json::to_string(&Preset::MelodicPeaks.settings()).unwrap();
        assert!(json.contains("\"bin_display\":\"peak_frequencies\""));
        assert!(json.contains("\"normalization\":\"max1\""));

        let partial: SpectrogramSettings =
            serde_json::from_str(r#"{ "display": { "gain": 2.0 } }"#).unwrap();
        assert_eq!(partial.display.gain, 2.0);
        assert_eq!(partial.analysis, AnalysisParams::default());
        assert_eq!(partial.display.max_frequency, 8_000.0);
    }
}
