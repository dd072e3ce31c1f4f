pub const DEFAULT_TUNING_HZ: f32 = 440.0;
const A4_MIDI: i32 = 69;
const SEMITONES_PER_OCTAVE: i32 = 12;
const MIDI_OCTAVE_OFFSET: i32 = 1;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Nearest 12-TET pitch for a frequency, with the residual in cents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pitch {
    pub midi_number: i32,
    pub name: &'static str,
    pub octave: i32,
    pub cents: f32,
}

impl Pitch {
    /// Resolves `freq_hz` against a concert-A tuning frequency.
    pub fn from_frequency(freq_hz: f64, tuning_hz: f32) -> Option<Self> {
        if freq_hz <= 0.0 || !freq_hz.is_finite() {
            return None;
        }
        let tuning = if tuning_hz > 0.0 && tuning_hz.is_finite() {
            tuning_hz as f64
        } else {
            DEFAULT_TUNING_HZ as f64
        };

        // midi = 69 + 12 * log2(freq / A4)
        let midi_float = A4_MIDI as f64 + SEMITONES_PER_OCTAVE as f64 * (freq_hz / tuning).log2();
        let midi_number = midi_float.round() as i32;
        let cents = ((midi_float - midi_number as f64) * 100.0) as f32;

        let note_index = midi_number.rem_euclid(SEMITONES_PER_OCTAVE) as usize;
        Some(Self {
            midi_number,
            name: NOTE_NAMES[note_index],
            octave: midi_number.div_euclid(SEMITONES_PER_OCTAVE) - MIDI_OCTAVE_OFFSET,
            cents,
        })
    }

    /// Label such as `A4` or `C#3+12c`; residuals under one cent are dropped.
    pub fn label(&self) -> String {
        let cents = self.cents.round() as i32;
        if cents == 0 {
            format!("{}{}", self.name, self.octave)
        } else {
            format!("{}{}{:+}c", self.name, self.octave, cents)
        }
    }
}

/// Pitch label for a frequency, empty when the frequency has no pitch.
pub fn pitch_label(freq_hz: f64, tuning_hz: f32) -> String {
    Pitch::from_frequency(freq_hz, tuning_hz)
        .map(|pitch| pitch.label())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concert_pitches_resolve() {
        let a4 = Pitch::from_frequency(440.0, 440.0).unwrap();
        assert_eq!((a4.name, a4.octave, a4.midi_number), ("A", 4, 69));
        assert_eq!(a4.label(), "A4");

        let c4 = Pitch::from_frequency(261.625_56, 440.0).unwrap();
        assert_eq!(c4.label(), "C4");
    }

    #[test]
    fn detuned_frequencies_report_cents() {
        let sharp = Pitch::from_frequency(440.0 * 2f64.powf(0.2 / 12.0), 440.0).unwrap();
        assert_eq!(sharp.name, "A");
        assert!((sharp.cents - 20.0).abs() < 0.5);
        assert_eq!(sharp.label(), "A4+20c");
    }

    #[test]
    fn alternate_tuning_shifts_reference() {
        let a = Pitch::from_frequency(432.0, 432.0).unwrap();
        assert_eq!(a.label(), "A4");
        assert!(pitch_label(0.0, 440.0).is_empty());
    }
}
