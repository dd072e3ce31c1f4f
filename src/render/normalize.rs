//! Column magnitude normalisation.
//!
//! Applied to a scratch copy of each column at paint time; the transform's
//! stored frames are never modified.

use serde::{Deserialize, Serialize};

/// Peak below which hybrid normalisation stops scaling up, so near-silent
/// columns taper towards silence instead of reaching full scale.
pub const HYBRID_FLOOR: f32 = 1.0e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    #[default]
    None,
    /// Each column divided by its own peak.
    Max1,
    /// Column peak used as divisor only above [`HYBRID_FLOOR`].
    Hybrid,
}

impl Normalization {
    /// Attribute spelling used by the flat parameter set.
    pub fn attribute_name(self) -> &'static str {
        match self {
            Normalization::None => "none",
            Normalization::Max1 => "peak",
            Normalization::Hybrid => "hybrid",
        }
    }

    pub fn from_attribute_name(name: &str) -> Option<Self> {
        match name {
            "none" => Some(Normalization::None),
            "peak" => Some(Normalization::Max1),
            "hybrid" => Some(Normalization::Hybrid),
            _ => None,
        }
    }

    /// Divisor applied to a column whose largest value is `peak`.
    pub fn column_divisor(self, peak: f32) -> f32 {
        match self {
            Normalization::None => 1.0,
            Normalization::Max1 => {
                if peak > 0.0 {
                    peak
                } else {
                    1.0
                }
            }
            Normalization::Hybrid => peak.max(HYBRID_FLOOR),
        }
    }

    /// Normalises `column` in place and returns its pre-normalisation peak.
    pub fn apply(self, column: &mut [f32]) -> f32 {
        let peak = column_peak(column);
        let divisor = self.column_divisor(peak);
        if divisor != 1.0 {
            let scale = divisor.recip();
            column.iter_mut().for_each(|value| *value *= scale);
        }
        peak
    }
}

#[inline]
pub fn column_peak(column: &[f32]) -> f32 {
    column.iter().copied().fold(0.0, f32::max)
}

/// Rescales columns against the largest magnitude seen in the visible area.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VisibleAreaScale {
    max: f32,
}

impl VisibleAreaScale {
    pub fn new(max: f32) -> Self {
        Self { max }
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn apply(&self, column: &mut [f32]) {
        if self.max > 0.0 {
            let scale = self.max.recip();
            column.iter_mut().for_each(|value| *value *= scale);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max1_peaks_at_unity() {
        let mut column = vec![0.02, 0.4, 0.1, 0.0];
        let peak = Normalization::Max1.apply(&mut column);
        assert_eq!(peak, 0.4);
        let max = column_peak(&column);
        assert!((max - 1.0).abs() < 1e-6);
        assert!((column[0] - 0.05).abs() < 1e-6);
    }

    #[test]
    fn none_leaves_values_untouched() {
        let original = vec![0.3, 0.01, 0.7];
        let mut column = original.clone();
        Normalization::None.apply(&mut column);
        assert_eq!(column, original);

        let mut silent = vec![0.0; 4];
        Normalization::Max1.apply(&mut silent);
        assert!(silent.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn hybrid_tapers_quiet_columns() {
        let mut loud = vec![0.5, 0.25];
        Normalization::Hybrid.apply(&mut loud);
        assert!((loud[0] - 1.0).abs() < 1e-6);

        // Peak a tenth of the floor ends a tenth of the way to full scale.
        let mut quiet = vec![HYBRID_FLOOR * 0.1, HYBRID_FLOOR * 0.05];
        Normalization::Hybrid.apply(&mut quiet);
        assert!((quiet[0] - 0.1).abs() < 1e-5);
        assert!((quiet[1] - 0.05).abs() < 1e-5);
    }

    #[test]
    fn attribute_names_round_trip() {
        for mode in [Normalization::None, Normalization::Max1, Normalization::Hybrid] {
            assert_eq!(Normalization::from_attribute_name(mode.attribute_name()), Some(mode));
        }
        assert_eq!(Normalization::from_attribute_name("sum"), None);
    }

    #[test]
    fn visible_area_rescales_to_area_max() {
        let mut column = vec![0.1, 0.2];
        VisibleAreaScale::new(0.4).apply(&mut column);
        assert!((column[1] - 0.5).abs() < 1e-6);
        VisibleAreaScale::default().apply(&mut column);
        assert!((column[1] - 0.5).abs() < 1e-6);
    }
}
