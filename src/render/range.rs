/// Running min/max of magnitudes observed while rendering a surface.
///
/// Display calibration only; nothing in the transform or normalisation math
/// reads it back.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MagnitudeRange {
    min: f32,
    max: f32,
    set: bool,
}

impl MagnitudeRange {
    pub fn new(min: f32, max: f32) -> Self {
        Self {
            min: min.min(max),
            max: max.max(min),
            set: true,
        }
    }

    pub fn is_set(&self) -> bool {
        self.set
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    /// Widens the range to include `value`. Returns whether it changed.
    pub fn sample_value(&mut self, value: f32) -> bool {
        if !value.is_finite() {
            return false;
        }
        if !self.set {
            *self = Self::new(value, value);
            return true;
        }
        let mut changed = false;
        if value < self.min {
            self.min = value;
            changed = true;
        }
        if value > self.max {
            self.max = value;
            changed = true;
        }
        changed
    }

    /// Merges another range into this one. Returns whether it changed.
    pub fn sample(&mut self, other: &MagnitudeRange) -> bool {
        if !other.set {
            return false;
        }
        let low = self.sample_value(other.min);
        let high = self.sample_value(other.max);
        low || high
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_widens_monotonically() {
        let mut range = MagnitudeRange::default();
        assert!(!range.is_set());
        assert!(range.sample_value(0.5));
        assert_eq!((range.min(), range.max()), (0.5, 0.5));
        assert!(range.sample(&MagnitudeRange::new(0.1, 0.3)));
        assert!(!range.sample(&MagnitudeRange::new(0.2, 0.4)));
        assert_eq!((range.min(), range.max()), (0.1, 0.5));
        assert!(!range.sample(&MagnitudeRange::default()));
        assert!(!range.sample_value(f32::NAN));

        range.reset();
        assert!(!range.is_set());
    }
}
