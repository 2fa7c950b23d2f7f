//! 32-bit RGBA color and the handful of color operations the encoder needs:
//! alpha blending onto an opaque back color, channel-wise comparison and
//! squared distance for nearest-palette-entry searches.

use serde::{Deserialize, Serialize};

/// Color space in which partially transparent pixels are blended onto the
/// back color before quantization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkingColorSpace {
    /// Blend the gamma-encoded sRGB channel values directly.
    #[default]
    Srgb,
    /// Convert to linear light, blend, convert back.
    Linear,
}

/// A straight (non-premultiplied) 8-bit RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    /// Fully transparent black, the value of a cleared delta buffer.
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);
    pub const BLACK: Rgba = Rgba::opaque(0, 0, 0);
    pub const WHITE: Rgba = Rgba::opaque(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Rgba { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Rgba { r, g, b, a: 255 }
    }

    /// Build from a `[r, g, b, a]` slice chunk.
    pub fn from_slice(px: &[u8]) -> Self {
        Rgba::new(px[0], px[1], px[2], px[3])
    }

    /// True when `a` falls below `alpha_threshold`. A threshold of 0 makes
    /// every color opaque.
    #[inline]
    pub fn is_transparent(self, alpha_threshold: u8) -> bool {
        self.a < alpha_threshold
    }

    /// Same color with alpha forced to 255.
    #[inline]
    pub fn to_opaque(self) -> Self {
        Rgba { a: 255, ..self }
    }

    /// Blend onto an opaque `back` color. The result is always opaque.
    pub fn blend_onto(self, back: Rgba, space: WorkingColorSpace) -> Rgba {
        match self.a {
            255 => self,
            0 => back.to_opaque(),
            a => {
                let alpha = a as f32 / 255.0;
                match space {
                    WorkingColorSpace::Srgb => Rgba::opaque(
                        mix_srgb(self.r, back.r, alpha),
                        mix_srgb(self.g, back.g, alpha),
                        mix_srgb(self.b, back.b, alpha),
                    ),
                    WorkingColorSpace::Linear => Rgba::opaque(
                        mix_linear(self.r, back.r, alpha),
                        mix_linear(self.g, back.g, alpha),
                        mix_linear(self.b, back.b, alpha),
                    ),
                }
            }
        }
    }

    /// Largest absolute difference over all four channels.
    #[inline]
    pub fn max_channel_diff(self, other: Rgba) -> u8 {
        self.r.abs_diff(other.r)
            .max(self.g.abs_diff(other.g))
            .max(self.b.abs_diff(other.b))
            .max(self.a.abs_diff(other.a))
    }

    /// Squared euclidean RGB distance (alpha ignored).
    #[inline]
    pub fn distance_sq(self, other: Rgba) -> u32 {
        let dr = self.r as i32 - other.r as i32;
        let dg = self.g as i32 - other.g as i32;
        let db = self.b as i32 - other.b as i32;
        (dr * dr + dg * dg + db * db) as u32
    }
}

fn mix_srgb(fg: u8, bg: u8, alpha: f32) -> u8 {
    let v = fg as f32 * alpha + bg as f32 * (1.0 - alpha);
    v.round().clamp(0.0, 255.0) as u8
}

fn mix_linear(fg: u8, bg: u8, alpha: f32) -> u8 {
    let v = srgb_to_linear(fg) * alpha + srgb_to_linear(bg) * (1.0 - alpha);
    linear_to_srgb(v)
}

fn srgb_to_linear(c: u8) -> f32 {
    let c = c as f32 / 255.0;
    if c <= 0.04045 { c / 12.92 } else { ((c + 0.055) / 1.055).powf(2.4) }
}

fn linear_to_srgb(l: f32) -> u8 {
    let c = if l <= 0.003_130_8 { l * 12.92 } else { 1.055 * l.powf(1.0 / 2.4) - 0.055 };
    (c * 255.0).round().clamp(0.0, 255.0) as u8
}
