//! Discrete vertical zoom steps.
//!
//! Step 0 shows DC to Nyquist; each further step narrows the visible
//! frequency range by a factor of 2^(1/4), down to the first range narrower
//! than one FFT bin.

use super::axis::BinScale;

const STEP_TOLERANCE: f64 = 1.0e-5;
// Hard stop for degenerate inputs (e.g. a zero sample rate).
const STEP_LIMIT: u32 = 1_000;

#[inline]
fn step_ratio() -> f64 {
    2f64.sqrt().sqrt()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomStepMapper {
    nyquist: f64,
    bin_width: f64,
}

impl ZoomStepMapper {
    pub fn new(sample_rate: f64, fft_size: usize) -> Self {
        Self {
            nyquist: sample_rate / 2.0,
            bin_width: sample_rate / fft_size.max(1) as f64,
        }
    }

    /// Largest valid step: the first whose range is narrower than a bin.
    pub fn max_step(&self) -> u32 {
        let ratio = step_ratio();
        let mut width = self.nyquist;
        let mut step = 0;
        while width >= self.bin_width && step < STEP_LIMIT {
            width /= ratio;
            step += 1;
        }
        step
    }

    pub fn step_count(&self) -> u32 {
        self.max_step()
    }

    /// `rangeForStep`: visible frequency width in Hz at `step`.
    pub fn range_for_step(&self, step: u32) -> f64 {
        let ratio = step_ratio();
        (0..step.min(self.max_step())).fold(self.nyquist, |width, _| width / ratio)
    }

    /// `stepForRange`: the step whose range first fits within `width`.
    pub fn step_for_range(&self, width: f64) -> u32 {
        let ratio = step_ratio();
        let max_step = self.max_step();
        let mut current = self.nyquist;
        let mut step = 0;
        while current > width + STEP_TOLERANCE && step < max_step {
            current /= ratio;
            step += 1;
        }
        step
    }

    /// New `(min, max)` for `step`, keeping the midpoint of `(min, max)`
    /// fixed: arithmetic under a linear scale, geometric under a log scale.
    /// A range poking out of `[0, nyquist]` slides back inside with its width
    /// kept, so the result always maps back to `step`.
    pub fn range_at_step(&self, step: u32, min: f64, max: f64, scale: BinScale) -> (f64, f64) {
        let width = self.range_for_step(step);

        let (mut new_min, mut new_max) = match scale {
            BinScale::Log => {
                // Positive root of m^2 - width*m - min*max = 0.
                let new_max = (width + (width * width + 4.0 * min * max).sqrt()) / 2.0;
                (new_max - width, new_max)
            }
            BinScale::Linear => {
                let mid = (min + max) / 2.0;
                (mid - width / 2.0, mid + width / 2.0)
            }
        };

        if new_min < 0.0 {
            new_max -= new_min;
            new_min = 0.0;
        }
        if new_max > self.nyquist {
            new_min = (new_min - (new_max - self.nyquist)).max(0.0);
            new_max = self.nyquist;
        }

        (new_min, new_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_range_round_trip() {
        for (sample_rate, fft_size) in [(44_100.0, 1024), (48_000.0, 8192), (8_000.0, 64)] {
            let mapper = ZoomStepMapper::new(sample_rate, fft_size);
            for step in 0..=mapper.max_step() {
                assert_eq!(mapper.step_for_range(mapper.range_for_step(step)), step);
            }
        }
    }

    #[test]
    fn extreme_steps() {
        let mapper = ZoomStepMapper::new(48_000.0, 1024);
        assert_eq!(mapper.range_for_step(0), 24_000.0);
        let bin = 48_000.0 / 1024.0;
        let last = mapper.range_for_step(mapper.max_step());
        assert!(last < bin);
        assert!(mapper.range_for_step(mapper.max_step() - 1) >= bin);
        assert_eq!(mapper.range_for_step(u32::MAX), last);
        assert_eq!(mapper.step_for_range(0.0), mapper.max_step());
        assert_eq!(mapper.step_for_range(1.0e9), 0);
    }

    #[test]
    fn linear_zoom_preserves_midpoint() {
        let mapper = ZoomStepMapper::new(48_000.0, 1024);
        let (min, max) = mapper.range_at_step(8, 10_000.0, 12_000.0, BinScale::Linear);
        assert!(((min + max) / 2.0 - 11_000.0).abs() <= 1.0);
        assert!((max - min - 6_000.0).abs() <= 1.0);
    }

    #[test]
    fn log_zoom_preserves_geometric_midpoint() {
        let mapper = ZoomStepMapper::new(48_000.0, 1024);
        let (min, max) = mapper.range_at_step(16, 100.0, 1_000.0, BinScale::Log);
        let width = mapper.range_for_step(16);
        assert!((max - min - width).abs() <= 1.0);
        assert!(((min * max).sqrt() - 1_000.0f64.sqrt() * 10.0).abs() < 1.0);
    }

    #[test]
    fn zoom_clamps_to_signal_band() {
        let mapper = ZoomStepMapper::new(48_000.0, 1024);
        let (min, max) = mapper.range_at_step(4, 100.0, 300.0, BinScale::Linear);
        assert_eq!(min, 0.0);
        assert_eq!(max, 12_000.0);

        let (min, max) = mapper.range_at_step(0, 20_000.0, 23_000.0, BinScale::Linear);
        assert_eq!(min, 0.0);
        assert_eq!(max, 24_000.0);

        let (min, max) = mapper.range_at_step(6, 20_000.0, 23_000.0, BinScale::Linear);
        assert_eq!(max, 24_000.0);
        assert!((max - min - mapper.range_for_step(6)).abs() < 1e-9);
    }

    #[test]
    fn deepest_step_keeps_a_sub_hertz_range() {
        let mapper = ZoomStepMapper::new(8_000.0, 65_536);
        let deepest = mapper.max_step();
        let (min, max) = mapper.range_at_step(deepest, 1_990.0, 2_020.0, BinScale::Linear);
        assert!(min < max);
        assert!(max - min < 1.0);
        assert_eq!(mapper.step_for_range(max - min), deepest);
    }
}
