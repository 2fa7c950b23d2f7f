//! Indexed color tables.
//!
//! A [`Palette`] holds 1..=256 entries plus the parameters that decide how
//! an arbitrary RGBA color maps onto it: the alpha threshold below which a
//! color becomes the transparent entry, and the back color partially
//! transparent colors are blended onto first.

use crate::color::{Rgba, WorkingColorSpace};
use crate::error::{EncodeError, Result};

/// Default alpha threshold: colors with alpha below 128 are transparent.
pub const DEFAULT_ALPHA_THRESHOLD: u8 = 128;

/// Maximum number of entries in a GIF color table.
pub const MAX_PALETTE_SIZE: usize = 256;

/// An indexed color table.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    entries: Vec<Rgba>,
    transparent_index: Option<u8>,
    back_color: Rgba,
    alpha_threshold: u8,
    color_space: WorkingColorSpace,
}

impl Palette {
    /// Create a palette from its entries. The first entry with zero alpha
    /// becomes the transparent index.
    pub fn new(entries: Vec<Rgba>) -> Result<Self> {
        if entries.is_empty() || entries.len() > MAX_PALETTE_SIZE {
            return Err(EncodeError::InvalidPalette(entries.len()));
        }
        let mut palette = Palette {
            entries,
            transparent_index: None,
            back_color: Rgba::BLACK,
            alpha_threshold: DEFAULT_ALPHA_THRESHOLD,
            color_space: WorkingColorSpace::Srgb,
        };
        palette.resolve_transparent_index();
        Ok(palette)
    }

    pub fn with_back_color(mut self, back_color: Rgba) -> Self {
        self.back_color = back_color.to_opaque();
        self
    }

    /// Set the alpha threshold. A threshold of 0 disables transparency even
    /// when the palette has a transparent entry.
    pub fn with_alpha_threshold(mut self, alpha_threshold: u8) -> Self {
        self.alpha_threshold = alpha_threshold;
        self.resolve_transparent_index();
        self
    }

    pub fn with_color_space(mut self, color_space: WorkingColorSpace) -> Self {
        self.color_space = color_space;
        self
    }

    fn resolve_transparent_index(&mut self) {
        self.transparent_index = if self.alpha_threshold == 0 {
            None
        } else {
            self.entries.iter().position(|c| c.a == 0).map(|i| i as u8)
        };
    }

    /// 216 web-safe colors followed by a gray ramp; the last entry is
    /// transparent when `transparent` is set.
    pub fn system_default_8bpp(transparent: bool) -> Self {
        let levels = [0u8, 51, 102, 153, 204, 255];
        let mut entries = Vec::with_capacity(MAX_PALETTE_SIZE);
        for &r in &levels {
            for &g in &levels {
                for &b in &levels {
                    entries.push(Rgba::opaque(r, g, b));
                }
            }
        }
        // 40 grays strictly between the web-safe levels
        let mut v = 0u32;
        while entries.len() < MAX_PALETTE_SIZE {
            v += 6;
            let g = v.min(255) as u8;
            if !levels.contains(&g) {
                entries.push(Rgba::opaque(g, g, g));
            }
        }
        if transparent {
            entries[MAX_PALETTE_SIZE - 1] = Rgba::TRANSPARENT;
        }
        Self::from_builtin(entries)
    }

    /// 256 shades of gray; the last entry is transparent when `transparent`
    /// is set (the ramp then has 255 steps).
    pub fn grayscale(transparent: bool) -> Self {
        let steps = if transparent { 255u32 } else { 256 };
        let mut entries: Vec<Rgba> = (0..steps)
            .map(|i| {
                let g = (i * 255 / (steps - 1)) as u8;
                Rgba::opaque(g, g, g)
            })
            .collect();
        if transparent {
            entries.push(Rgba::TRANSPARENT);
        }
        Self::from_builtin(entries)
    }

    /// Black and white, no transparency.
    pub fn black_and_white() -> Self {
        Self::from_builtin(vec![Rgba::BLACK, Rgba::WHITE]).with_alpha_threshold(0)
    }

    fn from_builtin(entries: Vec<Rgba>) -> Self {
        debug_assert!(!entries.is_empty() && entries.len() <= MAX_PALETTE_SIZE);
        let mut palette = Palette {
            entries,
            transparent_index: None,
            back_color: Rgba::BLACK,
            alpha_threshold: DEFAULT_ALPHA_THRESHOLD,
            color_space: WorkingColorSpace::Srgb,
        };
        palette.resolve_transparent_index();
        palette
    }

    pub fn entries(&self) -> &[Rgba] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, index: u8) -> Option<Rgba> {
        self.entries.get(index as usize).copied()
    }

    pub fn transparent_index(&self) -> Option<u8> {
        self.transparent_index
    }

    pub fn has_transparency(&self) -> bool {
        self.transparent_index.is_some()
    }

    pub fn back_color(&self) -> Rgba {
        self.back_color
    }

    pub fn alpha_threshold(&self) -> u8 {
        self.alpha_threshold
    }

    pub fn color_space(&self) -> WorkingColorSpace {
        self.color_space
    }

    /// The color a decoder will actually show for `color`: `None` when it
    /// maps to transparency, otherwise the color blended onto the back color.
    pub fn effective_color(&self, color: Rgba) -> Option<Rgba> {
        if self.transparent_index.is_some() && color.is_transparent(self.alpha_threshold) {
            return None;
        }
        Some(color.blend_onto(self.back_color, self.color_space))
    }

    /// Index of the entry closest to `color`.
    pub fn nearest_index(&self, color: Rgba) -> u8 {
        match self.effective_color(color) {
            None => self.transparent_index.unwrap_or(0),
            Some(c) => self.nearest_opaque_index(c),
        }
    }

    /// Nearest entry by RGB distance, never returning the transparent entry.
    pub(crate) fn nearest_opaque_index(&self, color: Rgba) -> u8 {
        let mut best = 0usize;
        let mut best_dist = u32::MAX;
        for (i, entry) in self.entries.iter().enumerate() {
            if Some(i as u8) == self.transparent_index {
                continue;
            }
            let d = entry.distance_sq(color);
            if d < best_dist {
                best = i;
                best_dist = d;
                if d == 0 {
                    break;
                }
            }
        }
        best as u8
    }

    /// Number of bits `n` so that `1 << n` entries hold the palette (min 1).
    pub fn table_size_bits(&self) -> u8 {
        let mut bits = 1u8;
        while (1usize << bits) < self.entries.len() {
            bits += 1;
        }
        bits
    }

    /// RGB triplets padded with black to the next power of two.
    pub fn color_table_bytes(&self) -> Vec<u8> {
        let size = 1usize << self.table_size_bits();
        let mut table = Vec::with_capacity(size * 3);
        for c in &self.entries {
            table.extend_from_slice(&[c.r, c.g, c.b]);
        }
        table.resize(size * 3, 0);
        table
    }

    /// Same entries and transparency, ignoring the mapping parameters.
    pub fn same_table(&self, other: &Palette) -> bool {
        self.entries == other.entries && self.transparent_index == other.transparent_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_sizes() {
        assert!(Palette::new(Vec::new()).is_err());
        assert!(Palette::new(vec![Rgba::BLACK; 257]).is_err());
        assert!(Palette::new(vec![Rgba::BLACK; 256]).is_ok());
    }

    #[test]
    fn test_system_default_palette() {
        let p = Palette::system_default_8bpp(true);
        assert_eq!(p.len(), 256);
        assert_eq!(p.transparent_index(), Some(255));
        let opaque = Palette::system_default_8bpp(false);
        assert_eq!(opaque.transparent_index(), None);
        assert_eq!(opaque.nearest_index(Rgba::opaque(255, 0, 0)), 5 * 36);
    }

    #[test]
    fn test_nearest_index_and_transparency() {
        let p = Palette::new(vec![Rgba::BLACK, Rgba::WHITE, Rgba::TRANSPARENT]).unwrap();
        assert_eq!(p.transparent_index(), Some(2));
        assert_eq!(p.nearest_index(Rgba::new(250, 240, 230, 255)), 1);
        assert_eq!(p.nearest_index(Rgba::new(250, 240, 230, 10)), 2);
        // Just above the threshold: blended onto black it is still nearer white
        assert_eq!(p.nearest_index(Rgba::new(255, 255, 255, 130)), 1);
        let p = p.with_alpha_threshold(0);
        assert_eq!(p.transparent_index(), None);
        assert_eq!(p.nearest_index(Rgba::new(250, 240, 230, 10)), 0);
    }

    #[test]
    fn test_color_table_padding() {
        let p = Palette::new(vec![Rgba::WHITE; 3]).unwrap();
        assert_eq!(p.table_size_bits(), 2);
        let bytes = p.color_table_bytes();
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[9..], &[0, 0, 0]);
        let single = Palette::new(vec![Rgba::WHITE]).unwrap();
        assert_eq!(single.color_table_bytes().len(), 6);
    }

    #[test]
    fn test_grayscale_ramp() {
        let p = Palette::grayscale(false);
        assert_eq!(p.len(), 256);
        assert_eq!(p.get(128), Some(Rgba::opaque(128, 128, 128)));
        let t = Palette::grayscale(true);
        assert_eq!(t.len(), 256);
        assert_eq!(t.get(254), Some(Rgba::WHITE));
        assert_eq!(t.transparent_index(), Some(255));
    }
}
