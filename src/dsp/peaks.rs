//! Max-pooled summary of a [`SpectralCache`] for zoomed-out rendering.

use super::transform::SpectralCache;
use std::ops::Range;
use std::sync::OnceLock;

pub const DEFAULT_DIVISOR: usize = 8;

/// `divisor x divisor` max-pooling over (column, bin) space.
///
/// A time block is summarised and stored only once every one of its columns
/// is materialised; until then queries fold over whatever is computed so the
/// result always equals the true maximum of the computed part of the block.
#[derive(Debug)]
pub struct PeakCache {
    divisor: usize,
    columns: usize,
    bin_blocks: usize,
    blocks: Box<[OnceLock<Box<[f32]>>]>,
}

impl PeakCache {
    pub fn new(source: &SpectralCache, divisor: usize) -> Self {
        let divisor = divisor.max(2);
        let columns = if source.is_ok() { source.width() } else { 0 };
        let time_blocks = columns.div_ceil(divisor);
        let mut blocks = Vec::with_capacity(time_blocks);
        blocks.resize_with(time_blocks, OnceLock::new);
        Self {
            divisor,
            columns,
            bin_blocks: source.height().div_ceil(divisor),
            blocks: blocks.into_boxed_slice(),
        }
    }

    pub fn divisor(&self) -> usize {
        self.divisor
    }

    /// Number of time blocks.
    pub fn width(&self) -> usize {
        self.blocks.len()
    }

    /// Number of frequency blocks.
    pub fn height(&self) -> usize {
        self.bin_blocks
    }

    pub fn get_max(&self, source: &SpectralCache, time_block: usize, freq_block: usize) -> f32 {
        if freq_block >= self.bin_blocks {
            return 0.0;
        }
        let Some(slot) = self.blocks.get(time_block) else {
            return 0.0;
        };
        if let Some(summary) = slot.get() {
            return summary[freq_block];
        }
        if let Some(summary) = self.summarise(source, time_block) {
            let _ = slot.set(summary);
            return slot.get().map_or(0.0, |summary| summary[freq_block]);
        }

        let bins = self.bin_range(source, freq_block);
        self.column_range(time_block)
            .filter(|&column| source.has_frame(column))
            .filter_map(|column| source.column_magnitudes(column))
            .flat_map(|mags| mags[bins.clone()].iter().copied())
            .fold(0.0, f32::max)
    }

    /// Materialises the source columns behind `time_blocks` and stores their
    /// summaries.
    pub fn ensure_computed(&self, source: &SpectralCache, time_blocks: Range<usize>) {
        let end = time_blocks.end.min(self.width());
        for time_block in time_blocks.start..end {
            let slot = &self.blocks[time_block];
            if slot.get().is_some() {
                continue;
            }
            source.ensure_computed(self.column_range(time_block));
            if let Some(summary) = self.summarise(source, time_block) {
                let _ = slot.set(summary);
            }
        }
    }

    fn column_range(&self, time_block: usize) -> Range<usize> {
        let start = time_block * self.divisor;
        start..(start + self.divisor).min(self.columns)
    }

    fn bin_range(&self, source: &SpectralCache, freq_block: usize) -> Range<usize> {
        let start = freq_block * self.divisor;
        start..(start + self.divisor).min(source.height())
    }

    fn summarise(&self, source: &SpectralCache, time_block: usize) -> Option<Box<[f32]>> {
        let columns = self.column_range(time_block);
        if !columns.clone().all(|column| source.has_frame(column)) {
            return None;
        }
        let mut summary = vec![0.0f32; self.bin_blocks];
        for column in columns {
            let mags = source.column_magnitudes(column)?;
            for (bin, &value) in mags.iter().enumerate() {
                let cell = &mut summary[bin / self.divisor];
                *cell = cell.max(value);
            }
        }
        Some(summary.into_boxed_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::transform::TransformParams;
    use crate::dsp::{MemorySignal, SignalSource};
    use std::sync::Arc;

    fn noisy_cache() -> SpectralCache {
        // Deterministic pseudo-noise so blocks have distinct maxima.
        let mut state = 0x1234_5678u32;
        let samples = (0..6_000)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32) * 2.0 - 1.0
            })
            .collect();
        let source: Arc<dyn SignalSource> = Arc::new(MemorySignal::mono(samples, 8_000.0));
        let params = TransformParams {
            window_size: 128,
            hop_level: 1,
            ..TransformParams::default()
        };
        SpectralCache::new(source, params, 16 * 1024 * 1024)
    }

    fn brute_max(cache: &SpectralCache, divisor: usize, tb: usize, fb: usize) -> f32 {
        let mut max = 0.0f32;
        for column in tb * divisor..((tb + 1) * divisor).min(cache.width()) {
            for bin in fb * divisor..((fb + 1) * divisor).min(cache.height()) {
                max = max.max(cache.magnitude(column, bin));
            }
        }
        max
    }

    #[test]
    fn summary_matches_brute_force() {
        let cache = noisy_cache();
        let peaks = PeakCache::new(&cache, DEFAULT_DIVISOR);
        assert_eq!(peaks.width(), cache.width().div_ceil(8));
        assert_eq!(peaks.height(), cache.height().div_ceil(8));

        peaks.ensure_computed(&cache, 0..peaks.width());
        for tb in 0..peaks.width() {
            for fb in 0..peaks.height() {
                assert_eq!(peaks.get_max(&cache, tb, fb), brute_max(&cache, 8, tb, fb));
            }
        }
        assert_eq!(peaks.get_max(&cache, peaks.width(), 0), 0.0);
        assert_eq!(peaks.get_max(&cache, 0, peaks.height()), 0.0);
    }

    #[test]
    fn partial_blocks_track_computed_columns() {
        let cache = noisy_cache();
        let peaks = PeakCache::new(&cache, 4);
        assert_eq!(peaks.get_max(&cache, 1, 2), 0.0);

        cache.ensure_computed(4..6);
        let partial = peaks.get_max(&cache, 1, 2);
        let expected = (4..6)
            .flat_map(|column| (8..12).map(move |bin| (column, bin)))
            .map(|(column, bin)| cache.magnitude(column, bin))
            .fold(0.0, f32::max);
        assert_eq!(partial, expected);

        cache.ensure_computed(4..8);
        assert_eq!(peaks.get_max(&cache, 1, 2), brute_max(&cache, 4, 1, 2));
        assert!(peaks.get_max(&cache, 1, 2) >= partial);
    }
}
