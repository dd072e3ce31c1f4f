//! Flat named-attribute form of [`SpectrogramSettings`].
//!
//! Keys and value spellings follow the long-standing session format,
//! including the legacy keys older writers produced.

use super::SpectrogramSettings;
use crate::dsp::transform::MAX_HOP_LEVEL;
use crate::render::axis::{BinDisplay, BinScale};
use crate::render::colour::ColourScaleKind;
use crate::render::normalize::Normalization;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;
use tracing::warn;

pub type Attributes = BTreeMap<String, String>;

// Overlap percentages accepted by the legacy `windowOverlap` key, indexed by
// hop level.
const LEGACY_OVERLAPS: [u32; 5] = [0, 25, 50, 75, 90];

pub fn write(settings: &SpectrogramSettings) -> Attributes {
    let analysis = &settings.analysis;
    let display = &settings.display;
    let flag = |value: bool| if value { "true" } else { "false" }.to_owned();

    let entries = [
        ("channel", analysis.channel.to_string()),
        ("windowSize", analysis.window_size.to_string()),
        ("windowHopLevel", analysis.hop_level.to_string()),
        ("gain", display.gain.to_string()),
        ("threshold", display.threshold.to_string()),
        ("minFrequency", (display.min_frequency.round() as i64).to_string()),
        ("maxFrequency", (display.max_frequency.round() as i64).to_string()),
        ("colourScale", display.colour_scale.index().to_string()),
        ("colourMap", display.colour_map.to_string()),
        ("colourRotation", display.colour_rotation.to_string()),
        ("frequencyScale", display.bin_scale.index().to_string()),
        ("binDisplay", display.bin_display.index().to_string()),
        (
            "columnNormalization",
            display.normalization.attribute_name().to_owned(),
        ),
        // Readers that predate `columnNormalization` still get peak mode.
        (
            "normalizeColumns",
            flag(display.normalization == Normalization::Max1),
        ),
        ("normalizeVisibleArea", flag(display.normalize_visible_area)),
    ];
    entries
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value))
        .collect()
}

/// Applies `attributes` on top of `base`. Unparseable or out-of-range
/// values are logged and skipped; the rest still apply.
pub fn read(attributes: &Attributes, base: SpectrogramSettings) -> SpectrogramSettings {
    let mut settings = base;

    assign(&mut settings, "channel", parse(attributes, "channel"), |s, v| {
        s.analysis.channel = v
    });
    assign(&mut settings, "windowSize", parse(attributes, "windowSize"), |s, v| {
        s.analysis.window_size = v
    });
    let hop_level = parse::<u32>(attributes, "windowHopLevel")
        .or_else(|| parse::<u32>(attributes, "windowOverlap").and_then(legacy_hop_level));
    assign(&mut settings, "windowHopLevel", hop_level, |s, v| {
        s.analysis.hop_level = v.min(MAX_HOP_LEVEL)
    });

    assign(&mut settings, "gain", parse(attributes, "gain"), |s, v| s.display.gain = v);
    assign(&mut settings, "threshold", parse(attributes, "threshold"), |s, v| {
        s.display.threshold = v
    });
    assign(&mut settings, "minFrequency", parse::<u32>(attributes, "minFrequency"), |s, v| {
        s.display.min_frequency = v as f64
    });
    assign(&mut settings, "maxFrequency", parse::<u32>(attributes, "maxFrequency"), |s, v| {
        s.display.max_frequency = v as f64
    });

    let colour_scale = parse(attributes, "colourScale").and_then(|index| {
        ColourScaleKind::from_index(index).or_else(|| {
            warn!("[settings] unknown colourScale {index}");
            None
        })
    });
    assign(&mut settings, "colourScale", colour_scale, |s, v| s.display.colour_scale = v);

    let colour_map = parse(attributes, "colourMap").or_else(|| parse(attributes, "colourScheme"));
    assign(&mut settings, "colourMap", colour_map, |s, v| s.display.colour_map = v);
    assign(&mut settings, "colourRotation", parse(attributes, "colourRotation"), |s, v| {
        s.display.colour_rotation = v
    });

    let bin_scale = parse(attributes, "frequencyScale").and_then(BinScale::from_index);
    assign(&mut settings, "frequencyScale", bin_scale, |s, v| s.display.bin_scale = v);
    let bin_display = parse(attributes, "binDisplay").and_then(BinDisplay::from_index);
    assign(&mut settings, "binDisplay", bin_display, |s, v| s.display.bin_display = v);

    let column_normalization = attributes
        .get("columnNormalization")
        .map(|value| value.trim())
        .filter(|value| !value.is_empty());
    let legacy = column_normalization.is_none();
    match column_normalization {
        Some(name) => match Normalization::from_attribute_name(name) {
            Some(normalization) => settings.display.normalization = normalization,
            None => warn!("[settings] unknown or unsupported columnNormalization {name:?}"),
        },
        None => {
            if flag(attributes, "normalizeColumns") {
                settings.display.normalization = Normalization::Max1;
            }
            if flag(attributes, "normalizeHybrid") {
                settings.display.normalization = Normalization::Hybrid;
            }
        }
    }
    settings.display.normalize_visible_area = flag(attributes, "normalizeVisibleArea");

    if legacy && settings.display.normalization == Normalization::Hybrid {
        // Old hybrid sessions were written with gain scaled up by fft/2.
        settings.display.gain /= (settings.fft_size() / 2).max(1) as f32;
    }

    settings
}

fn parse<T>(attributes: &Attributes, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = attributes.get(key)?.trim();
    raw.parse()
        .map_err(|err| warn!("[settings] ignoring {key}={raw:?}: {err}"))
        .ok()
}

fn flag(attributes: &Attributes, key: &str) -> bool {
    attributes
        .get(key)
        .is_some_and(|value| value.trim() == "true")
}

fn legacy_hop_level(overlap: u32) -> Option<u32> {
    LEGACY_OVERLAPS
        .iter()
        .position(|&percent| percent == overlap)
        .map(|level| level as u32)
}

fn assign<T>(
    settings: &mut SpectrogramSettings,
    key: &str,
    value: Option<T>,
    apply: impl FnOnce(&mut SpectrogramSettings, T),
) {
    let Some(value) = value else {
        return;
    };
    let mut candidate = *settings;
    apply(&mut candidate, value);
    match candidate.validate() {
        Ok(()) => *settings = candidate,
        Err(err) => warn!("[settings] ignoring {key}: {err}"),
    }
}
