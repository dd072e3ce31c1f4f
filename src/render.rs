//! Pixel-space rendering of a spectral transform.

pub mod axis;
pub mod cache;
pub mod colour;
pub mod normalize;
pub mod palette;
pub mod range;
pub mod renderer;
pub mod zoom;

pub use range::MagnitudeRange;

use bytemuck::{Pod, Zeroable};
use std::ops::Range;

/// Opaque identity of a host viewport. The engine keys per-surface state on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u64);

/// Geometry of a surface at paint time: where it starts on the timeline, how
/// many frames one pixel column spans, and its pixel size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceView {
    pub id: SurfaceId,
    pub start_frame: i64,
    /// Frames per pixel column; always at least 1.
    pub zoom_level: u32,
    pub width: u32,
    pub height: u32,
}

impl SurfaceView {
    pub fn new(id: SurfaceId, start_frame: i64, zoom_level: u32, width: u32, height: u32) -> Self {
        Self {
            id,
            start_frame,
            zoom_level: zoom_level.max(1),
            width,
            height,
        }
    }

    #[inline]
    pub fn frame_for_x(&self, x: i64) -> i64 {
        self.start_frame + x * self.zoom_level.max(1) as i64
    }

    pub fn bounds(&self) -> PixelRect {
        PixelRect::new(0, 0, self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub const EMPTY: PixelRect = PixelRect {
        x: 0,
        y: 0,
        width: 0,
        height: 0,
    };

    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline]
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn columns(&self) -> Range<u32> {
        self.x..self.right()
    }

    pub fn intersect(&self, other: &PixelRect) -> PixelRect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x0 >= x1 || y0 >= y1 {
            return PixelRect::EMPTY;
        }
        PixelRect::new(x0, y0, x1 - x0, y1 - y0)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);
    pub const BLACK: Rgba = Rgba::rgb(0, 0, 0);
    pub const WHITE: Rgba = Rgba::rgb(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    pub fn mix(self, other: Rgba, factor: f32) -> Rgba {
        let t = factor.clamp(0.0, 1.0);
        let channel = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Rgba::new(
            channel(self.r, other.r),
            channel(self.g, other.g),
            channel(self.b, other.b),
            channel(self.a, other.a),
        )
    }
}

/// Consumer-provided drawable. Rendered blocks arrive row-major with a stride
/// of `rect.width` pixels.
pub trait PaintTarget {
    fn draw_block(&mut self, rect: PixelRect, pixels: &[Rgba]);
}

/// Simple owned RGBA image, usable as a [`PaintTarget`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    pixels: Vec<Rgba>,
}

impl ImageBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![Rgba::TRANSPARENT; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    pub fn pixels(&self) -> &[Rgba] {
        &self.pixels
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }
}

impl PaintTarget for ImageBuffer {
    fn draw_block(&mut self, rect: PixelRect, pixels: &[Rgba]) {
        let clipped = rect.intersect(&PixelRect::new(0, 0, self.width, self.height));
        if clipped.is_empty() {
            return;
        }
        let stride = rect.width as usize;
        for y in clipped.y..clipped.bottom() {
            let src_row = (y - rect.y) as usize * stride;
            let src = src_row + (clipped.x - rect.x) as usize;
            let dst = y as usize * self.width as usize + clipped.x as usize;
            let len = clipped.width as usize;
            if let Some(block) = pixels.get(src..src + len) {
                self.pixels[dst..dst + len].copy_from_slice(block);
            }
        }
    }
}

/// Outcome of one render call.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RenderResult {
    /// Sub-rect actually painted; may be smaller than requested.
    pub rendered: PixelRect,
    /// Magnitude range observed among the columns computed in this call.
    pub range: MagnitudeRange,
    /// Columns freshly computed (as opposed to replayed from the cache).
    pub computed_columns: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_intersection() {
        let a = PixelRect::new(0, 0, 10, 10);
        let b = PixelRect::new(5, 8, 10, 10);
        assert_eq!(a.intersect(&b), PixelRect::new(5, 8, 5, 2));
        assert!(a.intersect(&PixelRect::new(10, 0, 4, 4)).is_empty());
        assert_eq!(a.intersect(&a), a);
    }

    #[test]
    fn image_buffer_accepts_clipped_blocks() {
        let mut image = ImageBuffer::new(4, 4);
        let block = vec![Rgba::WHITE; 6];
        image.draw_block(PixelRect::new(2, 1, 3, 2), &block);
        assert_eq!(image.pixel(2, 1), Some(Rgba::WHITE));
        assert_eq!(image.pixel(3, 2), Some(Rgba::WHITE));
        assert_eq!(image.pixel(1, 1), Some(Rgba::TRANSPARENT));
        assert_eq!(image.as_bytes().len(), 4 * 4 * 4);
        // Row 1, column 2: red channel of the first white pixel.
        assert_eq!(image.as_bytes()[(4 + 2) * 4], 255);
    }

    #[test]
    fn view_frame_mapping() {
        let view = SurfaceView::new(SurfaceId(1), 1_000, 64, 100, 50);
        assert_eq!(view.frame_for_x(3), 1_192);
        assert_eq!(view.frame_for_x(-1), 936);
    }
}
