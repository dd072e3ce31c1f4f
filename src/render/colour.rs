//! Magnitude / phase to palette index conversion.

use crate::util::audio::{amplitude_to_db, iec_meter_position};
use serde::{Deserialize, Serialize};

/// Palette index reserved for "below threshold".
pub const SILENCE_INDEX: u8 = 0;
pub const MAX_INDEX: u8 = 255;
/// Floor of the log scale; anything quieter is silence.
pub const LOG_FLOOR_DB: f32 = -100.0;
pub const MAX_ROTATION: u32 = 256;

// Usable (non-silence) palette slots.
const SLOTS: f32 = (MAX_INDEX - 1) as f32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColourScaleKind {
    Linear,
    Meter,
    #[default]
    Log,
    Phase,
}

impl ColourScaleKind {
    pub fn index(self) -> i64 {
        match self {
            ColourScaleKind::Linear => 0,
            ColourScaleKind::Meter => 1,
            ColourScaleKind::Log => 2,
            ColourScaleKind::Phase => 4,
        }
    }

    /// Accepts both the current and the historical numbering, in which `3`
    /// was a second dB scale.
    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(ColourScaleKind::Linear),
            1 => Some(ColourScaleKind::Meter),
            2 | 3 => Some(ColourScaleKind::Log),
            4 => Some(ColourScaleKind::Phase),
            _ => None,
        }
    }
}

/// Resolved colour scale for one render pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColourScale {
    pub kind: ColourScaleKind,
    pub gain: f32,
    pub threshold: f32,
    /// Value mapped to the top of the palette.
    pub max_value: f32,
    /// Cyclic shift of palette slots, `0..=256`.
    pub rotation: u32,
}

impl Default for ColourScale {
    fn default() -> Self {
        Self {
            kind: ColourScaleKind::default(),
            gain: 1.0,
            threshold: 0.0,
            max_value: 1.0,
            rotation: 0,
        }
    }
}

impl ColourScale {
    /// Palette index for an (already normalised) magnitude and its phase.
    pub fn colour_for(&self, magnitude: f32, phase: f32) -> u8 {
        let index = match self.kind {
            ColourScaleKind::Phase => phase_index(phase),
            _ => self.magnitude_index(magnitude),
        };
        self.rotate(index)
    }

    fn magnitude_index(&self, magnitude: f32) -> u8 {
        let value = magnitude * self.gain;
        if !value.is_finite() || value < self.threshold {
            return SILENCE_INDEX;
        }
        let max_value = self.max_value.max(f32::MIN_POSITIVE);
        let proportion = match self.kind {
            ColourScaleKind::Linear => value / max_value,
            ColourScaleKind::Meter => {
                iec_meter_position(amplitude_to_db(value / max_value, LOG_FLOOR_DB))
            }
            ColourScaleKind::Log => {
                let db = amplitude_to_db(value, LOG_FLOOR_DB);
                if db <= LOG_FLOOR_DB {
                    return SILENCE_INDEX;
                }
                let top = amplitude_to_db(max_value, LOG_FLOOR_DB);
                (db - LOG_FLOOR_DB) / (top - LOG_FLOOR_DB).max(f32::EPSILON)
            }
            ColourScaleKind::Phase => 0.0,
        };
        slot_index(proportion)
    }

    fn rotate(&self, index: u8) -> u8 {
        if index == SILENCE_INDEX {
            return index;
        }
        let slots = MAX_INDEX as u32;
        let rotated = (index as u32 - 1 + self.rotation.min(MAX_ROTATION)) % slots;
        (rotated + 1) as u8
    }
}

#[inline]
fn slot_index(proportion: f32) -> u8 {
    let proportion = proportion.clamp(0.0, 1.0);
    1 + (proportion * SLOTS).round() as u8
}

/// Maps `[-pi, pi]` cyclically onto the non-silence palette slots.
#[inline]
fn phase_index(phase: f32) -> u8 {
    use core::f32::consts::{PI, TAU};
    if !phase.is_finite() {
        return 1;
    }
    slot_index((phase + PI).rem_euclid(TAU) / TAU)
}
