//! Colour map table.
//!
//! Every map is 256 entries: slot 0 is the transparent silence colour, slots
//! `1..=255` run quiet -> loud.

use super::Rgba;
use serde::{Deserialize, Serialize};

pub const PALETTE_SIZE: usize = 256;

pub type Palette = [Rgba; PALETTE_SIZE];

/// Source of colour maps. Hosts can swap in their own table.
pub trait PaletteSource: Send + Sync {
    fn map_count(&self) -> usize;
    fn map_name(&self, map: usize) -> &str;
    /// Palette for `map`; out-of-range indices fall back to the first map.
    fn palette(&self, map: usize) -> Palette;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColourMap {
    #[default]
    Green,
    Sunset,
    WhiteOnBlack,
    BlackOnWhite,
    RedOnBlue,
    YellowOnBlack,
    BlueOnBlack,
    FruitSalad,
}

impl ColourMap {
    pub const ALL: &'static [ColourMap] = &[
        ColourMap::Green,
        ColourMap::Sunset,
        ColourMap::WhiteOnBlack,
        ColourMap::BlackOnWhite,
        ColourMap::RedOnBlue,
        ColourMap::YellowOnBlack,
        ColourMap::BlueOnBlack,
        ColourMap::FruitSalad,
    ];

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|&map| map == self).unwrap_or(0)
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            ColourMap::Green => "Green",
            ColourMap::Sunset => "Sunset",
            ColourMap::WhiteOnBlack => "White on Black",
            ColourMap::BlackOnWhite => "Black on White",
            ColourMap::RedOnBlue => "Red on Blue",
            ColourMap::YellowOnBlack => "Yellow on Black",
            ColourMap::BlueOnBlack => "Blue on Black",
            ColourMap::FruitSalad => "Fruit Salad",
        }
    }

    pub fn stops(self) -> &'static [Rgba] {
        match self {
            ColourMap::Green => green::STOPS,
            ColourMap::Sunset => sunset::STOPS,
            ColourMap::WhiteOnBlack => white_on_black::STOPS,
            ColourMap::BlackOnWhite => black_on_white::STOPS,
            ColourMap::RedOnBlue => red_on_blue::STOPS,
            ColourMap::YellowOnBlack => yellow_on_black::STOPS,
            ColourMap::BlueOnBlack => blue_on_black::STOPS,
            ColourMap::FruitSalad => fruit_salad::STOPS,
        }
    }

    pub fn palette(self) -> Palette {
        build_palette(self.stops())
    }

    /// Whether the quiet end of the map is light (affects overlay contrast).
    pub fn has_light_background(self) -> bool {
        matches!(self, ColourMap::BlackOnWhite)
    }
}

// Default palette definitions

/// Dark green through bright green to white.
pub mod green {
    use super::Rgba;
    pub const STOPS: &[Rgba] = &[
        Rgba::rgb(0, 0, 0),
        Rgba::rgb(0, 64, 16),
        Rgba::rgb(0, 160, 32),
        Rgba::rgb(128, 255, 64),
        Rgba::rgb(255, 255, 255),
    ];
}

/// Same heat map the meters use: purple, red, amber, white.
pub mod sunset {
    use super::Rgba;
    pub const STOPS: &[Rgba] = &[
        Rgba::rgb(0, 0, 0),
        Rgba::rgb(56, 27, 85),
        Rgba::rgb(155, 0, 0),
        Rgba::rgb(255, 188, 90),
        Rgba::rgb(255, 255, 255),
    ];
}

pub mod white_on_black {
    use super::Rgba;
    pub const STOPS: &[Rgba] = &[Rgba::rgb(0, 0, 0), Rgba::rgb(255, 255, 255)];
}

pub mod black_on_white {
    use super::Rgba;
    pub const STOPS: &[Rgba] = &[Rgba::rgb(255, 255, 255), Rgba::rgb(0, 0, 0)];
}

pub mod red_on_blue {
    use super::Rgba;
    pub const STOPS: &[Rgba] = &[
        Rgba::rgb(0, 0, 96),
        Rgba::rgb(96, 0, 160),
        Rgba::rgb(255, 0, 0),
        Rgba::rgb(255, 255, 0),
    ];
}

pub mod yellow_on_black {
    use super::Rgba;
    pub const STOPS: &[Rgba] = &[
        Rgba::rgb(0, 0, 0),
        Rgba::rgb(160, 0, 0),
        Rgba::rgb(255, 255, 0),
    ];
}

pub mod blue_on_black {
    use super::Rgba;
    pub const STOPS: &[Rgba] = &[
        Rgba::rgb(0, 0, 0),
        Rgba::rgb(0, 32, 160),
        Rgba::rgb(128, 224, 255),
    ];
}

/// Full hue wheel; useful with colour rotation and the phase scale.
pub mod fruit_salad {
    use super::Rgba;
    pub const STOPS: &[Rgba] = &[
        Rgba::rgb(0, 0, 255),
        Rgba::rgb(0, 255, 255),
        Rgba::rgb(0, 255, 0),
        Rgba::rgb(255, 255, 0),
        Rgba::rgb(255, 0, 0),
        Rgba::rgb(255, 0, 255),
        Rgba::rgb(0, 0, 255),
    ];
}

/// Samples a gradient at position `t` (0.0 to 1.0) using linear interpolation.
#[inline]
pub fn sample_gradient(stops: &[Rgba], t: f32) -> Rgba {
    let n = stops.len();
    match n {
        0 => Rgba::BLACK,
        1 => stops[0],
        _ => {
            let pos = t.clamp(0.0, 1.0) * (n - 1) as f32;
            let i = (pos as usize).min(n - 2);
            stops[i].mix(stops[i + 1], pos - i as f32)
        }
    }
}

pub fn build_palette(stops: &[Rgba]) -> Palette {
    let mut palette = [Rgba::TRANSPARENT; PALETTE_SIZE];
    let top = (PALETTE_SIZE - 2) as f32;
    for (slot, colour) in palette.iter_mut().enumerate().skip(1) {
        *colour = sample_gradient(stops, (slot - 1) as f32 / top);
    }
    palette
}

/// The built-in [`ColourMap`] table.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinPalettes;

impl PaletteSource for BuiltinPalettes {
    fn map_count(&self) -> usize {
        ColourMap::ALL.len()
    }

    fn map_name(&self, map: usize) -> &str {
        ColourMap::from_index(map).unwrap_or_default().name()
    }

    fn palette(&self, map: usize) -> Palette {
        ColourMap::from_index(map).unwrap_or_default().palette()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palettes_reserve_transparent_silence() {
        for &map in ColourMap::ALL {
            let palette = map.palette();
            assert_eq!(palette[0], Rgba::TRANSPARENT, "{}", map.name());
            assert!(palette[1..].iter().all(|c| c.a == 255));
            assert_eq!(palette[1], map.stops()[0]);
            assert_eq!(palette[255], *map.stops().last().unwrap());
        }
    }

    #[test]
    fn gradient_endpoints_and_midpoint() {
        let stops = [Rgba::BLACK, Rgba::WHITE];
        assert_eq!(sample_gradient(&stops, 0.0), Rgba::BLACK);
        assert_eq!(sample_gradient(&stops, 1.0), Rgba::WHITE);
        assert_eq!(sample_gradient(&stops, 0.5), Rgba::rgb(128, 128, 128));
        assert_eq!(sample_gradient(&[], 0.3), Rgba::BLACK);
    }

    #[test]
    fn builtin_table_falls_back_to_first_map() {
        let table = BuiltinPalettes;
        assert_eq!(table.map_count(), 8);
        assert_eq!(table.map_name(1), "Sunset");
        assert_eq!(table.palette(99), ColourMap::Green.palette());
        assert_eq!(ColourMap::FruitSalad.index(), 7);
        assert!(ColourMap::BlackOnWhite.has_light_background());
    }
}
