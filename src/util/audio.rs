pub mod musical;

// decibel conversion constants/utils

// Floor value (dB) below which amplitudes are reported as silence.
pub const DB_FLOOR: f32 = -140.0;

// Minimum amplitude value to avoid log(0) in dB conversions (-200 dB).
const AMPLITUDE_EPSILON: f32 = 1.0e-10;

// Natural log to amplitude decibel conversion factor: 20 / ln(10) ~= 8.685889638.
const LN_TO_AMPLITUDE_DB: f32 = 8.685_889_6;

// Convert a linear amplitude to decibels with a custom floor.
#[inline(always)]
pub fn amplitude_to_db(amplitude: f32, floor: f32) -> f32 {
    if amplitude > AMPLITUDE_EPSILON {
        (amplitude.ln() * LN_TO_AMPLITUDE_DB).max(floor)
    } else {
        floor
    }
}

// Convert dB to linear amplitude: 10^(db/20).
#[inline(always)]
pub fn db_to_amplitude(db: f32) -> f32 {
    const DB_TO_LOG2: f32 = 0.05 * core::f32::consts::LOG2_10;
    (db * DB_TO_LOG2).exp2()
}

/// Position (0..=1) of a dB value on an IEC 60268-18 style meter scale.
pub fn iec_meter_position(db: f32) -> f32 {
    let percent = if db < -70.0 {
        0.0
    } else if db < -60.0 {
        (db + 70.0) * 0.25
    } else if db < -50.0 {
        (db + 60.0) * 0.5 + 2.5
    } else if db < -40.0 {
        (db + 50.0) * 0.75 + 7.5
    } else if db < -30.0 {
        (db + 40.0) * 1.5 + 15.0
    } else if db < -20.0 {
        (db + 30.0) * 2.0 + 30.0
    } else {
        (db + 20.0) * 2.5 + 50.0
    };
    (percent / 100.0).clamp(0.0, 1.0)
}

/// Wraps a phase in radians into `[-pi, pi)`.
#[inline]
pub fn princarg(phase: f64) -> f64 {
    use core::f64::consts::{PI, TAU};
    (phase + PI).rem_euclid(TAU) - PI
}

#[inline]
pub fn apply_window(buffer: &mut [f32], window: &[f32]) {
    debug_assert_eq!(buffer.len(), window.len());
    for (sample, coeff) in buffer.iter_mut().zip(window.iter()) {
        *sample *= *coeff;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amplitude_db_conversions_invert() {
        for db in [-96.0f32, -40.0, -6.0, 0.0, 12.0] {
            let back = amplitude_to_db(db_to_amplitude(db), DB_FLOOR);
            assert!((back - db).abs() < 1e-3, "{db} -> {back}");
        }
        assert_eq!(amplitude_to_db(0.0, DB_FLOOR), DB_FLOOR);
    }

    #[test]
    fn meter_curve_is_monotonic_and_bounded() {
        let mut last = -1.0;
        for step in 0..=100 {
            let db = -80.0 + step as f32;
            let pos = iec_meter_position(db);
            assert!(pos >= last);
            assert!((0.0..=1.0).contains(&pos));
            last = pos;
        }
        assert_eq!(iec_meter_position(-90.0), 0.0);
        assert!((iec_meter_position(0.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn princarg_wraps_into_half_open_range() {
        use core::f64::consts::PI;
        assert!((princarg(3.0 * PI - 0.1) - (PI - 0.1)).abs() < 1e-9);
        assert!(princarg(PI - 1e-6) < PI);
        assert!((princarg(-0.5) + 0.5).abs() < 1e-12);
        assert!((princarg(2.0 * PI + 0.25) - 0.25).abs() < 1e-9);
    }
}
