//! Quantizers: map RGBA pixels onto a GIF palette.
//!
//! The encoder only talks to the [`Quantizer`] and [`QuantizingSession`]
//! traits. Two implementations ship with the crate:
//!
//! - [`PredefinedColorsQuantizer`] — a fixed palette (web-safe system
//!   palette, grayscale, black and white, or custom colors)
//! - [`OptimizedPaletteQuantizer`] — a per-image palette: exact when the
//!   colors fit, otherwise trained with NeuQuant (`color_quant`)

use std::collections::HashMap;

use color_quant::NeuQuant;

use crate::bitmap::{Bitmap, IndexedBitmap};
use crate::color::{Rgba, WorkingColorSpace};
use crate::dither::Ditherer;
use crate::error::{EncodeError, Result};
use crate::palette::{Palette, DEFAULT_ALPHA_THRESHOLD, MAX_PALETTE_SIZE};
use crate::rect::Rect;

/// What the encoder needs to know about a quantizer up front. Resolved once
/// per animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantizerProperties {
    /// Whether produced palettes can carry a transparent entry.
    pub supports_transparency: bool,
    /// Opaque color partially transparent pixels are blended onto.
    pub back_color: Rgba,
    /// Alpha below which a pixel is transparent.
    pub alpha_threshold: u8,
    pub color_space: WorkingColorSpace,
}

impl QuantizerProperties {
    /// Alpha threshold as seen by the encoder: 0 (nothing is transparent)
    /// when the quantizer cannot produce transparency.
    pub fn effective_alpha_threshold(&self) -> u8 {
        if self.supports_transparency { self.alpha_threshold } else { 0 }
    }
}

/// A palette-producing color reducer.
pub trait Quantizer {
    fn properties(&self) -> QuantizerProperties;

    /// Start a session for the `region` of `source`. Optimizing quantizers
    /// build their palette from that region.
    fn initialize(&self, source: &Bitmap, region: Rect) -> Result<Box<dyn QuantizingSession>>;
}

/// Per-image mapping state.
pub trait QuantizingSession {
    fn palette(&self) -> &Palette;

    /// Palette index for `color`.
    fn index_of(&mut self, color: Rgba) -> u8;
}

/// Quantize the `region` of `source` into a region-sized indexed bitmap.
/// The ditherer, when given, sees logical screen coordinates.
pub fn quantize(
    source: &Bitmap,
    region: Rect,
    quantizer: &dyn Quantizer,
    ditherer: Option<&dyn Ditherer>,
) -> Result<IndexedBitmap> {
    let region = region.intersect(&source.bounds());
    let mut session = quantizer.initialize(source, region)?;
    let palette = session.palette().clone();
    let mut indices = Vec::with_capacity(region.area() as usize);
    for y in region.y..region.bottom() {
        let row = &source.row(y)[region.x as usize..region.right() as usize];
        for (dx, &px) in row.iter().enumerate() {
            let index = match (ditherer, palette.effective_color(px)) {
                (Some(d), Some(c)) => session.index_of(d.adjust(c, region.x + dx as u32, y, &palette)),
                _ => session.index_of(px),
            };
            indices.push(index);
        }
    }
    IndexedBitmap::new(region.width, region.height, indices, palette)
}

/// Nearest-entry mapping with a per-session cache.
struct PaletteSession {
    palette: Palette,
    cache: HashMap<Rgba, u8>,
}

impl PaletteSession {
    fn new(palette: Palette) -> Self {
        PaletteSession { palette, cache: HashMap::new() }
    }
}

impl QuantizingSession for PaletteSession {
    fn palette(&self) -> &Palette {
        &self.palette
    }

    fn index_of(&mut self, color: Rgba) -> u8 {
        match self.palette.effective_color(color) {
            None => self.palette.transparent_index().unwrap_or(0),
            Some(c) => {
                let palette = &self.palette;
                *self.cache.entry(c).or_insert_with(|| palette.nearest_opaque_index(c))
            }
        }
    }
}

// ─── Predefined colors ──────────────────────────────────────────────────────

/// Quantizer with a fixed palette.
#[derive(Debug, Clone)]
pub struct PredefinedColorsQuantizer {
    palette: Palette,
}

impl PredefinedColorsQuantizer {
    /// Web-safe 8 bpp palette. A non-zero `alpha_threshold` reserves the last
    /// entry for transparency.
    pub fn system_default_8bpp(back_color: Rgba, alpha_threshold: u8) -> Self {
        let palette = Palette::system_default_8bpp(alpha_threshold > 0);
        Self::from_palette(palette.with_back_color(back_color).with_alpha_threshold(alpha_threshold))
    }

    pub fn grayscale(back_color: Rgba, alpha_threshold: u8) -> Self {
        let palette = Palette::grayscale(alpha_threshold > 0);
        Self::from_palette(palette.with_back_color(back_color).with_alpha_threshold(alpha_threshold))
    }

    pub fn black_and_white(back_color: Rgba) -> Self {
        Self::from_palette(Palette::black_and_white().with_back_color(back_color))
    }

    /// Custom colors. A color with zero alpha acts as the transparent entry.
    pub fn from_colors(colors: Vec<Rgba>, back_color: Rgba, alpha_threshold: u8) -> Result<Self> {
        let palette = Palette::new(colors)?.with_back_color(back_color).with_alpha_threshold(alpha_threshold);
        Ok(Self::from_palette(palette))
    }

    pub fn from_palette(palette: Palette) -> Self {
        PredefinedColorsQuantizer { palette }
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }
}

impl Quantizer for PredefinedColorsQuantizer {
    fn properties(&self) -> QuantizerProperties {
        QuantizerProperties {
            supports_transparency: self.palette.has_transparency(),
            back_color: self.palette.back_color(),
            alpha_threshold: self.palette.alpha_threshold(),
            color_space: self.palette.color_space(),
        }
    }

    fn initialize(&self, _source: &Bitmap, _region: Rect) -> Result<Box<dyn QuantizingSession>> {
        Ok(Box::new(PaletteSession::new(self.palette.clone())))
    }
}

// ─── Optimized palette ──────────────────────────────────────────────────────

/// Below this many palette slots NeuQuant is not used; the most frequent
/// colors are kept instead.
const MIN_NEUQUANT_COLORS: usize = 16;
/// NeuQuant samples at least this many pixels per learning cycle.
const NEUQUANT_MIN_PIXELS_PER_SAMPLE: usize = 1000;

/// Quantizer building a palette for each quantized image.
#[derive(Debug, Clone)]
pub struct OptimizedPaletteQuantizer {
    max_colors: usize,
    back_color: Rgba,
    alpha_threshold: u8,
    color_space: WorkingColorSpace,
    /// NeuQuant sampling factor: 1 = every pixel, 30 = fastest.
    sample_factor: i32,
}

impl OptimizedPaletteQuantizer {
    /// `max_colors` must be in `2..=256`; the transparent entry, when needed,
    /// counts against it.
    pub fn new(max_colors: usize) -> Result<Self> {
        if !(2..=MAX_PALETTE_SIZE).contains(&max_colors) {
            return Err(EncodeError::InvalidPalette(max_colors));
        }
        Ok(OptimizedPaletteQuantizer {
            max_colors,
            back_color: Rgba::BLACK,
            alpha_threshold: DEFAULT_ALPHA_THRESHOLD,
            color_space: WorkingColorSpace::Srgb,
            sample_factor: 10,
        })
    }

    pub fn with_back_color(mut self, back_color: Rgba) -> Self {
        self.back_color = back_color.to_opaque();
        self
    }

    pub fn with_alpha_threshold(mut self, alpha_threshold: u8) -> Self {
        self.alpha_threshold = alpha_threshold;
        self
    }

    pub fn with_color_space(mut self, color_space: WorkingColorSpace) -> Self {
        self.color_space = color_space;
        self
    }

    pub fn with_sample_factor(mut self, sample_factor: i32) -> Self {
        self.sample_factor = sample_factor.clamp(1, 30);
        self
    }

    fn build_palette(&self, source: &Bitmap, region: Rect) -> Result<Palette> {
        let mut histogram: HashMap<Rgba, u32> = HashMap::new();
        let mut has_transparent = false;
        let mut opaque_pixels: Vec<Rgba> = Vec::with_capacity(region.area() as usize);
        for y in region.y..region.bottom() {
            for &px in &source.row(y)[region.x as usize..region.right() as usize] {
                if px.is_transparent(self.alpha_threshold) {
                    has_transparent = true;
                    continue;
                }
                let c = px.blend_onto(self.back_color, self.color_space);
                *histogram.entry(c).or_insert(0) += 1;
                opaque_pixels.push(c);
            }
        }

        let capacity = self.max_colors - has_transparent as usize;
        let mut entries: Vec<Rgba> = if histogram.len() <= capacity || capacity < MIN_NEUQUANT_COLORS {
            let mut by_count: Vec<(Rgba, u32)> = histogram.into_iter().collect();
            by_count.sort_by(|a, b| {
                b.1.cmp(&a.1).then_with(|| (a.0.r, a.0.g, a.0.b).cmp(&(b.0.r, b.0.g, b.0.b)))
            });
            by_count.truncate(capacity);
            by_count.into_iter().map(|(c, _)| c).collect()
        } else {
            let bytes: Vec<u8> = opaque_pixels.iter().flat_map(|c| [c.r, c.g, c.b, c.a]).collect();
            let sample_factor = if opaque_pixels.len() >= NEUQUANT_MIN_PIXELS_PER_SAMPLE * self.sample_factor as usize {
                self.sample_factor
            } else {
                1
            };
            let nq = NeuQuant::new(sample_factor, capacity, &bytes);
            log::trace!("NeuQuant palette: {} colors from {} pixels", capacity, opaque_pixels.len());
            nq.color_map_rgba().chunks_exact(4).map(|c| Rgba::opaque(c[0], c[1], c[2])).collect()
        };
        if has_transparent {
            entries.push(Rgba::TRANSPARENT);
        }
        if entries.is_empty() {
            entries.push(self.back_color);
        }
        Ok(Palette::new(entries)?
            .with_back_color(self.back_color)
            .with_alpha_threshold(self.alpha_threshold)
            .with_color_space(self.color_space))
    }
}

impl Quantizer for OptimizedPaletteQuantizer {
    fn properties(&self) -> QuantizerProperties {
        QuantizerProperties {
            supports_transparency: self.alpha_threshold > 0,
            back_color: self.back_color,
            alpha_threshold: self.alpha_threshold,
            color_space: self.color_space,
        }
    }

    fn initialize(&self, source: &Bitmap, region: Rect) -> Result<Box<dyn QuantizingSession>> {
        let palette = self.build_palette(source, region.intersect(&source.bounds()))?;
        Ok(Box::new(PaletteSession::new(palette)))
    }
}
