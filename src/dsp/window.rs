//! Analysis window shapes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Rectangular,
    Bartlett,
    #[default]
    Hann,
    Hamming,
    Blackman,
    Nuttall,
    BlackmanHarris,
}

impl WindowKind {
    pub const ALL: &'static [WindowKind] = &[
        WindowKind::Rectangular,
        WindowKind::Bartlett,
        WindowKind::Hann,
        WindowKind::Hamming,
        WindowKind::Blackman,
        WindowKind::Nuttall,
        WindowKind::BlackmanHarris,
    ];

    pub fn coefficients(self, len: usize) -> Vec<f32> {
        if len == 0 {
            return Vec::new();
        }
        let phase = |n: usize| (n as f32) * core::f32::consts::TAU / (len as f32);
        match self {
            WindowKind::Rectangular => vec![1.0; len],
            WindowKind::Bartlett => {
                let half = len as f32 / 2.0;
                (0..len)
                    .map(|n| 1.0 - ((n as f32 - half) / half).abs())
                    .collect()
            }
            WindowKind::Hann => (0..len).map(|n| 0.5 * (1.0 - phase(n).cos())).collect(),
            WindowKind::Hamming => (0..len).map(|n| 0.54 - 0.46 * phase(n).cos()).collect(),
            WindowKind::Blackman => cosine_sum(len, &[0.42, 0.5, 0.08]),
            WindowKind::Nuttall => cosine_sum(len, &[0.355_768, 0.487_396, 0.144_232, 0.012_604]),
            WindowKind::BlackmanHarris => {
                cosine_sum(len, &[0.358_75, 0.488_29, 0.141_28, 0.011_68])
            }
        }
    }
}

fn cosine_sum(len: usize, terms: &[f32]) -> Vec<f32> {
    (0..len)
        .map(|n| {
            let phase = (n as f32) * core::f32::consts::TAU / (len as f32);
            terms
                .iter()
                .enumerate()
                .map(|(k, a)| {
                    let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                    sign * a * (k as f32 * phase).cos()
                })
                .sum()
        })
        .collect()
}

impl std::fmt::Display for WindowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            WindowKind::Rectangular => "Rectangular",
            WindowKind::Bartlett => "Bartlett",
            WindowKind::Hann => "Hann",
            WindowKind::Hamming => "Hamming",
            WindowKind::Blackman => "Blackman",
            WindowKind::Nuttall => "Nuttall",
            WindowKind::BlackmanHarris => "Blackman-Harris",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tapered_windows_peak_in_the_middle() {
        for &kind in WindowKind::ALL {
            let coeffs = kind.coefficients(64);
            assert_eq!(coeffs.len(), 64);
            let mid = coeffs[32];
            assert!(coeffs.iter().all(|&c| c <= mid + 1e-5), "{kind}");
            assert!((mid - 1.0).abs() < 0.01, "{kind} mid = {mid}");
        }
    }

    #[test]
    fn hann_sums_to_half_its_length() {
        let sum: f32 = WindowKind::Hann.coefficients(1024).iter().sum();
        assert!((sum / 1024.0 - 0.5).abs() < 1e-4);
        assert!(WindowKind::Rectangular.coefficients(16).iter().all(|&c| c == 1.0));
        assert!(WindowKind::Blackman.coefficients(0).is_empty());
    }
}
