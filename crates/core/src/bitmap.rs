//! Pixel buffers.
//!
//! [`Bitmap`] is a row-major 32-bit RGBA buffer used for source frames, the
//! prepared frames of the pipeline and the delta buffer. [`IndexedBitmap`]
//! is the quantized counterpart that goes to the LZW compressor.

use crate::color::Rgba;
use crate::error::{EncodeError, Result};
use crate::palette::Palette;
use crate::rect::Rect;

/// Row-major RGBA pixel buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Vec<Rgba>,
}

impl Bitmap {
    /// Fully transparent bitmap.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, Rgba::TRANSPARENT)
    }

    pub fn filled(width: u32, height: u32, color: Rgba) -> Self {
        Bitmap { width, height, pixels: vec![color; width as usize * height as usize] }
    }

    pub fn from_pixels(width: u32, height: u32, pixels: Vec<Rgba>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(EncodeError::BufferSizeMismatch { width, height, expected, actual: pixels.len() });
        }
        Ok(Bitmap { width, height, pixels })
    }

    /// Build from `width * height * 4` bytes in RGBA order.
    pub fn from_rgba_bytes(width: u32, height: u32, bytes: &[u8]) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if bytes.len() != expected {
            return Err(EncodeError::BufferSizeMismatch { width, height, expected, actual: bytes.len() });
        }
        Ok(Bitmap { width, height, pixels: bytes.chunks_exact(4).map(Rgba::from_slice).collect() })
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> Rgba) -> Self {
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Bitmap { width, height, pixels }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bounds(&self) -> Rect {
        Rect::of_size(self.width, self.height)
    }

    pub fn pixels(&self) -> &[Rgba] {
        &self.pixels
    }

    #[inline]
    pub fn row(&self, y: u32) -> &[Rgba] {
        let w = self.width as usize;
        &self.pixels[y as usize * w..(y as usize + 1) * w]
    }

    #[inline]
    pub fn row_mut(&mut self, y: u32) -> &mut [Rgba] {
        let w = self.width as usize;
        &mut self.pixels[y as usize * w..(y as usize + 1) * w]
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> Rgba {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    #[inline]
    pub fn set_pixel(&mut self, x: u32, y: u32, color: Rgba) {
        self.pixels[y as usize * self.width as usize + x as usize] = color;
    }

    /// Fill `rect` (clipped to the bitmap) with `color`.
    pub fn fill_rect(&mut self, rect: Rect, color: Rgba) {
        let rect = rect.intersect(&self.bounds());
        for y in rect.y..rect.bottom() {
            self.row_mut(y)[rect.x as usize..rect.right() as usize].fill(color);
        }
    }

    /// Copy `rect` from a same-sized `source` into the same place of `self`.
    pub fn copy_rect_from(&mut self, source: &Bitmap, rect: Rect) {
        debug_assert_eq!((self.width, self.height), (source.width, source.height));
        let rect = rect.intersect(&self.bounds());
        let (l, r) = (rect.x as usize, rect.right() as usize);
        for y in rect.y..rect.bottom() {
            self.row_mut(y)[l..r].copy_from_slice(&source.row(y)[l..r]);
        }
    }

    /// New bitmap holding the `rect` part of `self`.
    pub fn crop(&self, rect: Rect) -> Bitmap {
        let rect = rect.intersect(&self.bounds());
        let mut pixels = Vec::with_capacity(rect.area() as usize);
        for y in rect.y..rect.bottom() {
            pixels.extend_from_slice(&self.row(y)[rect.x as usize..rect.right() as usize]);
        }
        Bitmap { width: rect.width, height: rect.height, pixels }
    }

    /// True when any pixel has alpha below `alpha_threshold`.
    pub fn has_transparency(&self, alpha_threshold: u8) -> bool {
        self.pixels.iter().any(|p| p.is_transparent(alpha_threshold))
    }

    /// Place `self` at the center of a `width`×`height` canvas filled with
    /// `padding`. Parts that do not fit are cut off evenly on both sides.
    pub fn centered(&self, width: u32, height: u32, padding: Rgba) -> Bitmap {
        let mut result = Bitmap::filled(width, height, padding);
        let (dx, sx) = center_offsets(self.width, width);
        let (dy, sy) = center_offsets(self.height, height);
        let w = self.width.min(width) as usize;
        let h = self.height.min(height);
        for row in 0..h {
            let src = &self.row(sy + row)[sx as usize..sx as usize + w];
            result.row_mut(dy + row)[dx as usize..dx as usize + w].copy_from_slice(src);
        }
        result
    }

    /// Bilinear resample to `width`×`height`, interpolating premultiplied
    /// values so transparent neighbours do not darken edges.
    pub fn resized(&self, width: u32, height: u32) -> Bitmap {
        if (width, height) == (self.width, self.height) {
            return self.clone();
        }
        if self.width == 0 || self.height == 0 {
            return Bitmap::new(width, height);
        }
        let scale_x = self.width as f32 / width as f32;
        let scale_y = self.height as f32 / height as f32;
        let max_x = (self.width - 1) as f32;
        let max_y = (self.height - 1) as f32;
        Bitmap::from_fn(width, height, |x, y| {
            let fx = ((x as f32 + 0.5) * scale_x - 0.5).clamp(0.0, max_x);
            let fy = ((y as f32 + 0.5) * scale_y - 0.5).clamp(0.0, max_y);
            let (x0, y0) = (fx.floor() as u32, fy.floor() as u32);
            let (x1, y1) = ((x0 + 1).min(self.width - 1), (y0 + 1).min(self.height - 1));
            let (tx, ty) = (fx - x0 as f32, fy - y0 as f32);
            let mut acc = [0f32; 4];
            for (px, w) in [
                (self.pixel(x0, y0), (1.0 - tx) * (1.0 - ty)),
                (self.pixel(x1, y0), tx * (1.0 - ty)),
                (self.pixel(x0, y1), (1.0 - tx) * ty),
                (self.pixel(x1, y1), tx * ty),
            ] {
                let a = px.a as f32 * w;
                acc[0] += px.r as f32 * a;
                acc[1] += px.g as f32 * a;
                acc[2] += px.b as f32 * a;
                acc[3] += a;
            }
            if acc[3] <= 0.0 {
                return Rgba::TRANSPARENT;
            }
            let ch = |v: f32| (v / acc[3]).round().clamp(0.0, 255.0) as u8;
            Rgba::new(ch(acc[0]), ch(acc[1]), ch(acc[2]), acc[3].round().clamp(0.0, 255.0) as u8)
        })
    }
}

/// (destination offset, source offset) for centering `src` within `dst`.
fn center_offsets(src: u32, dst: u32) -> (u32, u32) {
    if src <= dst { ((dst - src) / 2, 0) } else { (0, (src - dst) / 2) }
}

/// Row-major palette-indexed pixel buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedBitmap {
    width: u32,
    height: u32,
    indices: Vec<u8>,
    palette: Palette,
}

impl IndexedBitmap {
    pub fn new(width: u32, height: u32, indices: Vec<u8>, palette: Palette) -> Result<Self> {
        let expected = width as usize * height as usize;
        if indices.len() != expected {
            return Err(EncodeError::BufferSizeMismatch { width, height, expected, actual: indices.len() });
        }
        Ok(IndexedBitmap { width, height, indices, palette })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bounds(&self) -> Rect {
        Rect::of_size(self.width, self.height)
    }

    pub fn indices(&self) -> &[u8] {
        &self.indices
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let w = self.width as usize;
        &self.indices[y as usize * w..(y as usize + 1) * w]
    }

    #[inline]
    pub fn index_at(&self, x: u32, y: u32) -> u8 {
        self.indices[y as usize * self.width as usize + x as usize]
    }

    /// Palette color at `(x, y)`.
    pub fn color_at(&self, x: u32, y: u32) -> Rgba {
        self.palette.get(self.index_at(x, y)).unwrap_or(Rgba::TRANSPARENT)
    }

    pub fn has_transparency(&self) -> bool {
        match self.palette.transparent_index() {
            Some(ti) => self.indices.contains(&ti),
            None => false,
        }
    }

    /// New bitmap holding the `rect` part of `self`, sharing the palette.
    pub fn crop(&self, rect: Rect) -> IndexedBitmap {
        let rect = rect.intersect(&self.bounds());
        if rect == self.bounds() {
            return self.clone();
        }
        let mut indices = Vec::with_capacity(rect.area() as usize);
        for y in rect.y..rect.bottom() {
            indices.extend_from_slice(&self.row(y)[rect.x as usize..rect.right() as usize]);
        }
        IndexedBitmap { width: rect.width, height: rect.height, indices, palette: self.palette.clone() }
    }

    /// Smallest rectangle holding every non-transparent pixel. The full
    /// bounds without a transparent palette entry, empty when everything is
    /// transparent.
    pub fn content_bounds(&self) -> Rect {
        let Some(ti) = self.palette.transparent_index() else {
            return self.bounds();
        };
        let is_blank_row = |y: u32| self.row(y).iter().all(|&i| i == ti);
        let mut top = 0;
        while top < self.height && is_blank_row(top) {
            top += 1;
        }
        if top == self.height {
            return Rect::EMPTY;
        }
        let mut bottom = self.height;
        while bottom > top && is_blank_row(bottom - 1) {
            bottom -= 1;
        }
        let is_blank_col = |x: u32| (top..bottom).all(|y| self.index_at(x, y) == ti);
        let mut left = 0;
        while left < self.width && is_blank_col(left) {
            left += 1;
        }
        let mut right = self.width;
        while right > left && is_blank_col(right - 1) {
            right -= 1;
        }
        Rect::from_edges(left, top, right, bottom)
    }
}
