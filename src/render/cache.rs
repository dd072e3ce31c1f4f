//! Per-surface image cache.
//!
//! Holds the last rendered image for one surface together with the single
//! contiguous run of pixel columns that is currently valid. Panning shifts
//! the valid run instead of discarding it; any other geometry change drops it.

use super::{MagnitudeRange, PaintTarget, PixelRect, Rgba, SurfaceView};
use std::ops::Range;

#[derive(Debug, Clone, Default)]
pub struct SurfaceCache {
    width: u32,
    height: u32,
    start_frame: i64,
    zoom_level: u32,
    // Column-major: column `x` occupies `x * height .. (x + 1) * height`.
    pixels: Vec<Rgba>,
    columns: Vec<MagnitudeRange>,
    valid_left: u32,
    valid_width: u32,
}

impl SurfaceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&mut self) {
        self.valid_width = 0;
    }

    pub fn is_valid(&self) -> bool {
        self.valid_width > 0
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if (self.width, self.height) == (width, height) {
            return;
        }
        self.width = width;
        self.height = height;
        self.pixels = vec![Rgba::TRANSPARENT; width as usize * height as usize];
        self.columns = vec![MagnitudeRange::default(); width as usize];
        self.invalidate();
    }

    pub fn start_frame(&self) -> i64 {
        self.start_frame
    }

    pub fn zoom_level(&self) -> u32 {
        self.zoom_level
    }

    pub fn set_zoom_level(&mut self, zoom_level: u32) {
        if self.zoom_level != zoom_level {
            self.zoom_level = zoom_level;
            self.invalidate();
        }
    }

    pub fn valid_left(&self) -> u32 {
        self.valid_left
    }

    pub fn valid_right(&self) -> u32 {
        self.valid_left + self.valid_width
    }

    pub fn valid_area(&self) -> PixelRect {
        PixelRect::new(self.valid_left, 0, self.valid_width, self.height)
    }

    /// Whether the cache geometry matches `view` (size, zoom and start).
    pub fn matches(&self, view: &SurfaceView) -> bool {
        self.width == view.width
            && self.height == view.height
            && self.zoom_level == view.zoom_level
            && self.start_frame == view.start_frame
    }

    /// Brings the cache to `view`'s geometry, preserving what a pure pan
    /// leaves visible. Returns `true` if the cached pixels survived.
    pub fn sync_to(&mut self, view: &SurfaceView) -> bool {
        self.resize(view.width, view.height);
        self.set_zoom_level(view.zoom_level);
        self.scroll_to(view.start_frame);
        self.is_valid()
    }

    /// Sets a new start frame, moving still-visible valid columns with it.
    pub fn scroll_to(&mut self, new_start: i64) {
        let delta = new_start - self.start_frame;
        if delta == 0 {
            return;
        }
        self.start_frame = new_start;
        if !self.is_valid() {
            return;
        }

        let zoom = self.zoom_level.max(1) as i64;
        if delta % zoom != 0 {
            self.invalidate();
            return;
        }
        let dx = delta / zoom;
        if dx.unsigned_abs() >= self.width as u64 {
            self.invalidate();
            return;
        }

        let height = self.height as usize;
        let shift = dx.unsigned_abs() as usize;
        let left = self.valid_left as i64 - dx;
        let right = self.valid_right() as i64 - dx;
        let new_left = left.clamp(0, self.width as i64);
        let new_right = right.clamp(0, self.width as i64);

        if dx > 0 {
            // Content moves left.
            self.pixels.copy_within(shift * height.., 0);
            self.columns.copy_within(shift.., 0);
        } else {
            let keep = self.width as usize - shift;
            self.pixels.copy_within(..keep * height, shift * height);
            self.columns.copy_within(..keep, shift);
        }

        if new_right <= new_left {
            self.invalidate();
        } else {
            self.valid_left = new_left as u32;
            self.valid_width = (new_right - new_left) as u32;
        }
    }

    /// Columns of `request` not yet valid, split into the part left of the
    /// valid run and the part right of it. Each part touches the valid run
    /// (or, with an empty cache, is the whole request). A request separated
    /// from the valid run by a gap is returned as `None` so the caller can
    /// start afresh.
    pub fn missing_columns(&self, request: &PixelRect) -> Option<(Range<u32>, Range<u32>)> {
        let columns = request.columns();
        if !self.is_valid() {
            return Some((columns.start..columns.start, columns));
        }
        let (valid_left, valid_right) = (self.valid_left, self.valid_right());
        if columns.end < valid_left || columns.start > valid_right {
            return None;
        }
        let left = if columns.start < valid_left {
            columns.start..valid_left
        } else {
            valid_left..valid_left
        };
        let right = if columns.end > valid_right {
            valid_right..columns.end
        } else {
            valid_right..valid_right
        };
        Some((left, right))
    }

    /// Stores one rendered column. `x` must extend or lie inside the valid
    /// run; otherwise the cache restarts from this column.
    pub fn store_column(&mut self, x: u32, pixels: &[Rgba], range: MagnitudeRange) {
        if x >= self.width || pixels.len() != self.height as usize {
            return;
        }
        let height = self.height as usize;
        let start = x as usize * height;
        self.pixels[start..start + height].copy_from_slice(pixels);
        self.columns[x as usize] = range;

        if !self.is_valid() {
            self.valid_left = x;
            self.valid_width = 1;
        } else if x + 1 == self.valid_left {
            self.valid_left = x;
            self.valid_width += 1;
        } else if x == self.valid_right() {
            self.valid_width += 1;
        } else if !(self.valid_left..self.valid_right()).contains(&x) {
            self.valid_left = x;
            self.valid_width = 1;
        }
    }

    pub fn column_range(&self, x: u32) -> MagnitudeRange {
        self.columns.get(x as usize).copied().unwrap_or_default()
    }

    /// Combined magnitude range of every valid column.
    pub fn valid_range(&self) -> MagnitudeRange {
        let mut range = MagnitudeRange::default();
        for x in self.valid_left..self.valid_right() {
            range.sample(&self.column_range(x));
        }
        range
    }

    /// The larger of the uncached areas left and right of the valid run.
    pub fn largest_uncached_rect(&self) -> PixelRect {
        if !self.is_valid() {
            return PixelRect::new(0, 0, self.width, self.height);
        }
        let left = self.valid_left;
        let right = self.width - self.valid_right();
        if left == 0 && right == 0 {
            PixelRect::EMPTY
        } else if left > right {
            PixelRect::new(0, 0, left, self.height)
        } else {
            PixelRect::new(self.valid_right(), 0, right, self.height)
        }
    }

    /// Paints the cached part of `rect` into `target`; returns what was drawn.
    pub fn blit(&self, rect: &PixelRect, target: &mut dyn PaintTarget) -> PixelRect {
        let area = rect.intersect(&self.valid_area());
        if area.is_empty() {
            return PixelRect::EMPTY;
        }
        let height = self.height as usize;
        let mut block = Vec::with_capacity(area.width as usize * area.height as usize);
        for y in area.y..area.bottom() {
            for x in area.x..area.right() {
                block.push(self.pixels[x as usize * height + y as usize]);
            }
        }
        target.draw_block(area, &block);
        area
    }
}
