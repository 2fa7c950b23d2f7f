//! Dithering, applied by the quantizing session right before a color is
//! mapped to its palette index.
//!
//! Only position-based (ordered) dithering is offered: its result for a
//! pixel depends on nothing but the pixel and its screen coordinates, so an
//! unchanged pixel dithers the same way in every frame of an animation.

use crate::color::Rgba;
use crate::palette::Palette;

/// Adjusts an opaque color before nearest-entry lookup.
pub trait Ditherer {
    /// `x`/`y` are logical screen coordinates.
    fn adjust(&self, color: Rgba, x: u32, y: u32, palette: &Palette) -> Rgba;
}

const BAYER_8X8: [[u8; 8]; 8] = [
    [0, 32, 8, 40, 2, 34, 10, 42],
    [48, 16, 56, 24, 50, 18, 58, 26],
    [12, 44, 4, 36, 14, 46, 6, 38],
    [60, 28, 52, 20, 62, 30, 54, 22],
    [3, 35, 11, 43, 1, 33, 9, 41],
    [51, 19, 59, 27, 49, 17, 57, 25],
    [15, 47, 7, 39, 13, 45, 5, 37],
    [63, 31, 55, 23, 61, 29, 53, 21],
];

/// Ordered dithering with an 8×8 Bayer matrix.
#[derive(Debug, Clone, Copy)]
pub struct OrderedDitherer {
    /// Amplitude of the threshold offset in channel units; 0 picks it from
    /// the palette size.
    strength: f32,
}

impl OrderedDitherer {
    pub fn bayer8x8() -> Self {
        OrderedDitherer { strength: 0.0 }
    }

    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = strength.max(0.0);
        self
    }

    fn effective_strength(&self, palette: &Palette) -> f32 {
        if self.strength > 0.0 {
            return self.strength;
        }
        // Roughly the distance between neighbouring levels of a uniform
        // palette with the same number of entries.
        256.0 / (palette.len() as f32).cbrt()
    }
}

impl Default for OrderedDitherer {
    fn default() -> Self {
        Self::bayer8x8()
    }
}

impl Ditherer for OrderedDitherer {
    fn adjust(&self, color: Rgba, x: u32, y: u32, palette: &Palette) -> Rgba {
        let threshold = BAYER_8X8[(y % 8) as usize][(x % 8) as usize] as f32;
        let offset = ((threshold + 0.5) / 64.0 - 0.5) * self.effective_strength(palette);
        let ch = |c: u8| (c as f32 + offset).round().clamp(0.0, 255.0) as u8;
        Rgba::new(ch(color.r), ch(color.g), ch(color.b), color.a)
    }
}
