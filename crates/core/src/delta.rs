//! Delta planning between two same-sized frames.
//!
//! Both region searches start from the full frame and shrink it from the
//! top, then the bottom, then the left and the right edge, scanning whole
//! rows and columns and stopping at the first one that contains a hit. The
//! work is proportional to the unchanged border, not to the frame area,
//! which is the common case for small localized changes.

use crate::bitmap::Bitmap;
use crate::color::{Rgba, WorkingColorSpace};
use crate::context::{Cancelled, EncodeContext};
use crate::quantize::QuantizerProperties;
use crate::rect::Rect;

/// Decides whether two pixels look the same to the decoder.
///
/// Pixels below the alpha threshold are all equal to each other and differ
/// from every visible pixel. Visible pixels are blended onto the back color
/// and then compared channel by channel against `tolerance`.
#[derive(Debug, Clone, Copy)]
pub struct PixelComparer {
    tolerance: u8,
    alpha_threshold: u8,
    back_color: Rgba,
    color_space: WorkingColorSpace,
}

impl PixelComparer {
    pub fn new(tolerance: u8, alpha_threshold: u8, back_color: Rgba, color_space: WorkingColorSpace) -> Self {
        PixelComparer { tolerance, alpha_threshold, back_color: back_color.to_opaque(), color_space }
    }

    /// Comparer for frames quantized by a quantizer with `props`. Without
    /// transparency support every pixel is blended before comparison.
    pub fn for_quantizer(props: &QuantizerProperties, tolerance: u8) -> Self {
        Self::new(tolerance, props.effective_alpha_threshold(), props.back_color, props.color_space)
    }

    pub fn alpha_threshold(&self) -> u8 {
        self.alpha_threshold
    }

    #[inline]
    fn visible(&self, c: Rgba) -> Option<Rgba> {
        if c.is_transparent(self.alpha_threshold) {
            None
        } else {
            Some(c.blend_onto(self.back_color, self.color_space))
        }
    }

    #[inline]
    pub fn matches(&self, a: Rgba, b: Rgba) -> bool {
        if a == b {
            return true;
        }
        match (self.visible(a), self.visible(b)) {
            (None, None) => true,
            (Some(a), Some(b)) => a.max_channel_diff(b) <= self.tolerance,
            _ => false,
        }
    }
}

/// Shrink the full frame to the smallest rectangle containing every pixel
/// for which `hit(x, y)` holds. `None` when there is no hit.
fn shrink_to_hits(
    width: u32,
    height: u32,
    ctx: &dyn EncodeContext,
    hit: impl Fn(u32, u32) -> bool,
) -> Result<Option<Rect>, Cancelled> {
    let row_hit = |y: u32| (0..width).any(|x| hit(x, y));

    let mut top = 0;
    while top < height && !row_hit(top) {
        if ctx.is_cancelled() {
            return Err(Cancelled);
        }
        top += 1;
    }
    if top == height {
        return Ok(None);
    }

    // Row `top` has a hit, so this stops at `top + 1` at the latest
    let mut bottom = height;
    while bottom > top + 1 && !row_hit(bottom - 1) {
        if ctx.is_cancelled() {
            return Err(Cancelled);
        }
        bottom -= 1;
    }

    let col_hit = |x: u32| (top..bottom).any(|y| hit(x, y));
    let mut left = 0;
    while left < width && !col_hit(left) {
        left += 1;
    }
    let mut right = width;
    while right > left + 1 && !col_hit(right - 1) {
        right -= 1;
    }
    debug_assert!(left < width, "a row hit must also show up in a column");

    Ok(Some(Rect::from_edges(left, top, right, bottom)))
}

/// Smallest rectangle of `curr` that differs from `prev` beyond the
/// comparer's tolerance. Empty when the frames match everywhere.
pub fn find_changed_region(
    prev: &Bitmap,
    curr: &Bitmap,
    comparer: &PixelComparer,
    ctx: &dyn EncodeContext,
) -> Result<Rect, Cancelled> {
    debug_assert_eq!((prev.width(), prev.height()), (curr.width(), curr.height()));
    let found = shrink_to_hits(curr.width(), curr.height(), ctx, |x, y| {
        !comparer.matches(prev.pixel(x, y), curr.pixel(x, y))
    })?;
    Ok(found.unwrap_or(Rect::EMPTY))
}

/// Smallest rectangle where `next` has pixels below `alpha_threshold` that
/// are visible in `curr`: the area a decoder would have to erase.
pub fn find_newly_transparent_region(
    curr: &Bitmap,
    next: &Bitmap,
    alpha_threshold: u8,
    ctx: &dyn EncodeContext,
) -> Result<Option<Rect>, Cancelled> {
    debug_assert_eq!((curr.width(), curr.height()), (next.width(), next.height()));
    if alpha_threshold == 0 {
        return Ok(None);
    }
    shrink_to_hits(next.width(), next.height(), ctx, |x, y| {
        next.pixel(x, y).is_transparent(alpha_threshold) && !curr.pixel(x, y).is_transparent(alpha_threshold)
    })
}

/// Transparency delta: every pixel of `frame` that the decoder already shows
/// (according to `delta_buffer`) is made transparent; the remaining visible
/// pixels are recorded in the delta buffer.
pub fn mask_unchanged_pixels(
    delta_buffer: &mut Bitmap,
    frame: &mut Bitmap,
    comparer: &PixelComparer,
    ctx: &dyn EncodeContext,
) -> Result<(), Cancelled> {
    debug_assert_eq!((delta_buffer.width(), delta_buffer.height()), (frame.width(), frame.height()));
    let threshold = comparer.alpha_threshold();
    for y in 0..frame.height() {
        if ctx.is_cancelled() {
            return Err(Cancelled);
        }
        let shown = delta_buffer.row_mut(y);
        for (dst, src) in shown.iter_mut().zip(frame.row_mut(y).iter_mut()) {
            if comparer.matches(*dst, *src) {
                *src = Rgba::TRANSPARENT;
            } else if !src.is_transparent(threshold) {
                *dst = *src;
            }
        }
    }
    Ok(())
}
