//! Animation frame pipeline.
//!
//! Frames move through three stages, each holding at most one frame:
//!
//! 1. **prepare**: fit the caller's frame to the logical screen and resolve
//!    its delay. When no delta encoding is possible the frame is quantized
//!    right away.
//! 2. **generate**: pick an encoding strategy against the delta buffer,
//!    quantize, then look one frame ahead to choose the disposal method.
//! 3. **emit**: hand the finished [`GeneratedFrame`] to the caller.
//!
//! The delta buffer holds what a decoder shows after the last emitted frame.
//! It is only ever updated with content of frames that have been generated.

use std::iter::Peekable;
use std::time::Duration;

use crate::bitmap::{Bitmap, IndexedBitmap};
use crate::color::Rgba;
use crate::config::{validate_dimensions, AnimatedGifConfiguration, AnimationMode, SizeHandling};
use crate::context::{Cancelled, EncodeContext, ProgressKind, ProgressReporter};
use crate::delta::{self, PixelComparer};
use crate::dither::Ditherer;
use crate::error::{EncodeError, Result};
use crate::gif::{DisposalMethod, FrameControl};
use crate::quantize::{quantize, Quantizer, QuantizerProperties};
use crate::rect::Rect;

/// One input frame: a borrowed bitmap and how long it stays on screen.
#[derive(Debug, Clone, Copy)]
pub struct AnimationFrame<'a> {
    pub bitmap: &'a Bitmap,
    pub delay: Duration,
}

impl<'a> AnimationFrame<'a> {
    pub fn new(bitmap: &'a Bitmap, delay: Duration) -> Self {
        AnimationFrame { bitmap, delay }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum FrameImage {
    /// Quantized later, against the delta buffer.
    Rgba(Bitmap),
    /// Quantized eagerly; no delta path applies.
    Indexed(IndexedBitmap),
}

impl FrameImage {
    fn has_transparency(&self, alpha_threshold: u8) -> bool {
        match self {
            FrameImage::Rgba(bitmap) => alpha_threshold > 0 && bitmap.has_transparency(alpha_threshold),
            FrameImage::Indexed(image) => image.has_transparency(),
        }
    }
}

/// A frame fitted to the logical screen.
#[derive(Debug, Clone)]
pub(crate) struct PreparedFrame {
    image: FrameImage,
    /// Centiseconds.
    delay: u16,
    /// Position in the input sequence.
    index: usize,
    /// Replayed from the ping-pong stack.
    reversed: bool,
}

/// A frame ready to be written: indexed pixels, placement, timing and
/// disposal.
#[derive(Debug, Clone)]
pub struct GeneratedFrame {
    pub image: IndexedBitmap,
    pub left: u16,
    pub top: u16,
    /// Centiseconds.
    pub delay: u16,
    pub disposal: DisposalMethod,
}

impl GeneratedFrame {
    pub fn control(&self) -> FrameControl {
        FrameControl { left: self.left, top: self.top, delay: self.delay, disposal: self.disposal }
    }

    /// Placement on the logical screen.
    pub fn rect(&self) -> Rect {
        Rect::new(self.left as u32, self.top as u32, self.image.width(), self.image.height())
    }
}

/// Why a stage stopped early.
enum Halt {
    Cancelled,
    Failed(EncodeError),
}

impl From<Cancelled> for Halt {
    fn from(_: Cancelled) -> Self {
        Halt::Cancelled
    }
}

impl From<EncodeError> for Halt {
    fn from(e: EncodeError) -> Self {
        Halt::Failed(e)
    }
}

/// Output of the strategy step, before disposal is known.
struct Planned {
    image: IndexedBitmap,
    /// Screen position of `image`.
    origin: (u32, u32),
    /// Part of the screen the frame must cover, in screen coordinates.
    content: Rect,
    strategy: &'static str,
}

/// Turns input frames into generated frames. See the module docs.
pub struct FramePipeline<'a, I: Iterator<Item = AnimationFrame<'a>>> {
    source: Peekable<I>,
    quantizer: &'a dyn Quantizer,
    ditherer: Option<&'a dyn Ditherer>,
    ctx: &'a dyn EncodeContext,
    props: QuantizerProperties,
    comparer: PixelComparer,
    width: u32,
    height: u32,
    size_handling: SizeHandling,
    ping_pong: bool,
    allow_clipped_frames: bool,
    delta_enabled: bool,
    delta_buffer: Option<Bitmap>,
    lookahead: Option<PreparedFrame>,
    reverse_stack: Vec<PreparedFrame>,
    /// Frames pulled from `source` so far.
    discovered: usize,
    emitted: usize,
    report_progress: bool,
    exact_total: bool,
    cancelled: bool,
    finished: bool,
}

impl<'a, I: Iterator<Item = AnimationFrame<'a>>> FramePipeline<'a, I> {
    pub fn new(
        frames: I,
        config: &AnimatedGifConfiguration,
        quantizer: &'a dyn Quantizer,
        ditherer: Option<&'a dyn Ditherer>,
        ctx: &'a dyn EncodeContext,
    ) -> Result<Self> {
        config.validate()?;
        let mut source = frames.peekable();
        let first = source.peek().ok_or(EncodeError::EmptyAnimation)?;
        let (width, height) = screen_size(config, first.bitmap);
        validate_dimensions(width, height)?;

        let props = quantizer.properties();
        let delta_enabled =
            config.allow_delta_frames && (props.supports_transparency || config.allow_clipped_frames);
        let ping_pong = config.animation_mode == AnimationMode::PingPong;
        if config.allow_delta_frames && !delta_enabled {
            log::warn!("delta frames need transparency or clipping; encoding full frames");
        }

        let mut pipeline = FramePipeline {
            source,
            quantizer,
            ditherer,
            ctx,
            props,
            comparer: PixelComparer::for_quantizer(&props, config.delta_tolerance),
            width,
            height,
            size_handling: config.size_handling,
            ping_pong,
            allow_clipped_frames: config.allow_clipped_frames,
            delta_enabled,
            delta_buffer: None,
            lookahead: None,
            reverse_stack: Vec::new(),
            discovered: 0,
            emitted: 0,
            report_progress: config.report_overall_progress,
            exact_total: false,
            cancelled: false,
            finished: false,
        };

        if let Some(progress) = pipeline.progress() {
            let total = match pipeline.source.size_hint() {
                (lower, Some(upper)) if lower == upper => {
                    pipeline.exact_total = true;
                    pipeline.expected_frames(lower)
                }
                _ => 0,
            };
            progress.new_phase(ProgressKind::EncodingFrames, total);
        }

        log::debug!(
            "frame pipeline {}x{}: delta {}, transparency {}, clipping {}, ping-pong {}",
            width,
            height,
            delta_enabled,
            props.supports_transparency,
            config.allow_clipped_frames,
            ping_pong
        );
        Ok(pipeline)
    }

    pub fn screen_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Whether the pipeline stopped because the context was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Produce the next frame. `Ok(None)` when the animation is complete or
    /// the context was cancelled.
    pub fn next_frame(&mut self) -> Result<Option<GeneratedFrame>> {
        if self.finished {
            return Ok(None);
        }
        match self.generate() {
            Ok(Some(frame)) => {
                self.emitted += 1;
                if let Some(progress) = self.progress() {
                    progress.increment();
                }
                Ok(Some(frame))
            }
            Ok(None) => {
                self.release();
                if let Some(progress) = self.progress() {
                    progress.complete();
                }
                log::debug!("frame pipeline done after {} frames", self.emitted);
                Ok(None)
            }
            Err(Halt::Cancelled) => {
                self.release();
                self.cancelled = true;
                log::info!("encoding cancelled after {} frames", self.emitted);
                Ok(None)
            }
            Err(Halt::Failed(e)) => {
                self.release();
                Err(e)
            }
        }
    }

    fn release(&mut self) {
        self.finished = true;
        self.delta_buffer = None;
        self.lookahead = None;
        self.reverse_stack.clear();
    }

    fn progress(&self) -> Option<&'a dyn ProgressReporter> {
        let ctx = self.ctx;
        if self.report_progress {
            ctx.progress()
        } else {
            None
        }
    }

    fn expected_frames(&self, forward: usize) -> usize {
        if self.ping_pong && forward > 2 {
            2 * forward - 2
        } else {
            forward
        }
    }

    fn check(&self) -> std::result::Result<(), Cancelled> {
        if self.ctx.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    // ─── Stage 1: prepare ───────────────────────────────────────────────

    fn prepare_next(&mut self) -> std::result::Result<Option<PreparedFrame>, Halt> {
        self.check()?;
        if let Some(frame) = self.source.next() {
            let index = self.discovered;
            self.discovered += 1;
            if !self.exact_total {
                if let Some(progress) = self.progress() {
                    progress.set_max(self.expected_frames(self.discovered));
                }
            }
            return self.prepare(index, frame).map(Some);
        }
        if self.ping_pong {
            return Ok(self.reverse_stack.pop());
        }
        Ok(None)
    }

    fn prepare(&self, index: usize, frame: AnimationFrame<'a>) -> std::result::Result<PreparedFrame, Halt> {
        let delay = delay_centiseconds(index, frame.delay)?;
        let source = frame.bitmap;
        let fitted = if (source.width(), source.height()) == (self.width, self.height) {
            source.clone()
        } else {
            match self.size_handling {
                SizeHandling::ErrorIfDiffers => {
                    return Err(size_mismatch(index, source, self.width, self.height).into());
                }
                SizeHandling::Center => {
                    let padding =
                        if self.props.supports_transparency { Rgba::TRANSPARENT } else { self.props.back_color };
                    source.centered(self.width, self.height, padding)
                }
                SizeHandling::Resize => source.resized(self.width, self.height),
            }
        };
        self.check()?;

        let image = if self.delta_enabled {
            FrameImage::Rgba(fitted)
        } else {
            FrameImage::Indexed(quantize(&fitted, fitted.bounds(), self.quantizer, self.ditherer)?)
        };
        Ok(PreparedFrame { image, delay, index, reversed: false })
    }

    // ─── Stage 2: generate ──────────────────────────────────────────────

    fn generate(&mut self) -> std::result::Result<Option<GeneratedFrame>, Halt> {
        let current = match self.lookahead.take() {
            Some(frame) => frame,
            None => match self.prepare_next()? {
                Some(frame) => frame,
                None => return Ok(None),
            },
        };
        self.check()?;

        let delay = current.delay;
        let index = current.index;
        let reversed = current.reversed;
        // Snapshot before the frame is masked or consumed. The first and the
        // last forward frame are never replayed.
        let replay = (self.ping_pong && !reversed && index > 0 && self.source.peek().is_some())
            .then(|| PreparedFrame { reversed: true, ..current.clone() });

        let planned = self.plan(current)?;
        self.check()?;

        if let Some(replay) = replay {
            self.reverse_stack.push(replay);
        }
        let next = self.prepare_next()?;

        let mut content = planned.content;
        let disposal = self.choose_disposal(next.as_ref(), &mut content)?;
        self.lookahead = next;

        if content.is_empty() {
            content = Rect::center_pixel(self.width, self.height);
        }
        let (ox, oy) = planned.origin;
        let image = planned.image.crop(content.relative_to(ox, oy));
        debug_assert_eq!((image.width(), image.height()), (content.width, content.height));

        log::debug!(
            "frame {}{}: {} {}x{} at ({}, {}), {:?}, {} cs",
            index,
            if reversed { " (replay)" } else { "" },
            planned.strategy,
            content.width,
            content.height,
            content.x,
            content.y,
            disposal,
            delay
        );

        Ok(Some(GeneratedFrame { image, left: content.x as u16, top: content.y as u16, delay, disposal }))
    }

    /// Pick the encoding strategy for `frame` and quantize it.
    fn plan(&mut self, frame: PreparedFrame) -> std::result::Result<Planned, Halt> {
        let mut bitmap = match frame.image {
            FrameImage::Indexed(image) => return Ok(self.full_frame(image, "full")),
            FrameImage::Rgba(bitmap) => bitmap,
        };

        let Some(buffer) = self.delta_buffer.as_mut() else {
            // First frame: draw everything and start tracking the screen
            let image = quantize(&bitmap, bitmap.bounds(), self.quantizer, self.ditherer)?;
            if self.delta_enabled {
                self.delta_buffer = Some(bitmap);
            }
            return Ok(self.full_frame(image, "full"));
        };

        if self.props.supports_transparency {
            delta::mask_unchanged_pixels(buffer, &mut bitmap, &self.comparer, self.ctx)?;
            let image = quantize(&bitmap, bitmap.bounds(), self.quantizer, self.ditherer)?;
            return Ok(self.full_frame(image, "transparency delta"));
        }

        let changed = delta::find_changed_region(buffer, &bitmap, &self.comparer, self.ctx)?;
        let region = if changed.is_empty() { Rect::center_pixel(self.width, self.height) } else { changed };
        buffer.copy_rect_from(&bitmap, region);
        let image = quantize(&bitmap, region, self.quantizer, self.ditherer)?;
        Ok(Planned { image, origin: (region.x, region.y), content: region, strategy: "clipped delta" })
    }

    fn full_frame(&self, image: IndexedBitmap, strategy: &'static str) -> Planned {
        let content = if self.allow_clipped_frames { image.content_bounds() } else { image.bounds() };
        Planned { image, origin: (0, 0), content, strategy }
    }

    /// Disposal for the frame being generated, given the frame after it.
    /// May grow `content` to the area that has to be erased.
    fn choose_disposal(
        &mut self,
        next: Option<&PreparedFrame>,
        content: &mut Rect,
    ) -> std::result::Result<DisposalMethod, Halt> {
        let Some(next) = next else {
            return Ok(DisposalMethod::DoNotDispose);
        };
        if !self.props.supports_transparency {
            return Ok(DisposalMethod::DoNotDispose);
        }
        let threshold = self.props.effective_alpha_threshold();

        let Some(buffer) = self.delta_buffer.as_mut() else {
            // Nothing tracks where the transparency is
            return Ok(if next.image.has_transparency(threshold) {
                DisposalMethod::RestoreToBackground
            } else {
                DisposalMethod::DoNotDispose
            });
        };

        let FrameImage::Rgba(next_bitmap) = &next.image else {
            return Ok(DisposalMethod::DoNotDispose);
        };
        match delta::find_newly_transparent_region(buffer, next_bitmap, threshold, self.ctx)? {
            Some(erase) => {
                *content = content.union(&erase);
                // The decoder clears the whole frame area
                buffer.fill_rect(*content, Rgba::TRANSPARENT);
                Ok(DisposalMethod::RestoreToBackground)
            }
            None => Ok(DisposalMethod::DoNotDispose),
        }
    }
}

impl<'a, I: Iterator<Item = AnimationFrame<'a>>> Iterator for FramePipeline<'a, I> {
    type Item = Result<GeneratedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}

/// Logical screen size: configured, or the first frame's.
pub(crate) fn screen_size(config: &AnimatedGifConfiguration, first: &Bitmap) -> (u32, u32) {
    config.screen_size.unwrap_or((first.width(), first.height()))
}

/// Delays are stored in hundredths of a second, rounded to the nearest.
pub(crate) fn delay_centiseconds(index: usize, delay: Duration) -> Result<u16> {
    let cs = (delay.as_micros() + 5_000) / 10_000;
    u16::try_from(cs).map_err(|_| EncodeError::DelayOutOfRange { index, delay })
}

fn size_mismatch(index: usize, frame: &Bitmap, screen_width: u32, screen_height: u32) -> EncodeError {
    EncodeError::FrameSizeMismatch {
        index,
        width: frame.width(),
        height: frame.height(),
        screen_width,
        screen_height,
    }
}

/// Check every frame up front so that contract violations surface before
/// any output is written.
pub(crate) fn validate_frames(frames: &[AnimationFrame<'_>], config: &AnimatedGifConfiguration) -> Result<()> {
    config.validate()?;
    let first = frames.first().ok_or(EncodeError::EmptyAnimation)?;
    let (width, height) = screen_size(config, first.bitmap);
    validate_dimensions(width, height)?;
    for (index, frame) in frames.iter().enumerate() {
        delay_centiseconds(index, frame.delay)?;
        let size = (frame.bitmap.width(), frame.bitmap.height());
        if size.0 == 0 || size.1 == 0 {
            return Err(EncodeError::InvalidDimensions { width: size.0, height: size.1 });
        }
        if config.size_handling == SizeHandling::ErrorIfDiffers && size != (width, height) {
            return Err(size_mismatch(index, frame.bitmap, width, height));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CancellationToken, LogProgress, TaskContext, Uncancellable};
    use crate::quantize::PredefinedColorsQuantizer;

    const RED: Rgba = Rgba::opaque(255, 0, 0);

    fn with_transparency() -> PredefinedColorsQuantizer {
        PredefinedColorsQuantizer::system_default_8bpp(Rgba::BLACK, 128)
    }

    fn opaque_only() -> PredefinedColorsQuantizer {
        PredefinedColorsQuantizer::system_default_8bpp(Rgba::BLACK, 0)
    }

    fn frames(bitmaps: &[Bitmap], cs: u64) -> Vec<AnimationFrame<'_>> {
        bitmaps.iter().map(|b| AnimationFrame::new(b, Duration::from_millis(cs * 10))).collect()
    }

    fn run(
        bitmaps: &[Bitmap],
        config: &AnimatedGifConfiguration,
        quantizer: &dyn Quantizer,
    ) -> Vec<GeneratedFrame> {
        let input = frames(bitmaps, 5);
        FramePipeline::new(input.into_iter(), config, quantizer, None, &Uncancellable)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_newly_transparent_pixel_forces_restore() {
        let first = Bitmap::filled(4, 4, Rgba::WHITE);
        let mut second = first.clone();
        second.set_pixel(0, 0, RED);
        let mut third = second.clone();
        third.set_pixel(3, 3, Rgba::TRANSPARENT);

        let out = run(&[first, second, third], &AnimatedGifConfiguration::default(), &with_transparency());
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].disposal, DisposalMethod::DoNotDispose);
        assert_eq!(out[1].disposal, DisposalMethod::RestoreToBackground);
        // Frame 1 only changed (0, 0) but has to cover the pixel erased next
        assert!(out[1].rect().contains(0, 0));
        assert!(out[1].rect().contains(3, 3));
        assert_eq!(out[2].disposal, DisposalMethod::DoNotDispose);
    }

    #[test]
    fn test_identical_frame_becomes_center_pixel() {
        let bitmaps = vec![Bitmap::filled(6, 4, RED); 2];
        for quantizer in [with_transparency(), opaque_only()] {
            let out = run(&bitmaps, &AnimatedGifConfiguration::default(), &quantizer);
            assert_eq!(out.len(), 2);
            assert_eq!(out[0].rect(), Rect::of_size(6, 4));
            assert_eq!(out[1].rect(), Rect::new(3, 2, 1, 1));
        }
    }

    #[test]
    fn test_tolerance_ignores_small_changes() {
        let gray = Rgba::opaque(100, 100, 100);
        let first = Bitmap::filled(6, 4, gray);
        let mut second = first.clone();
        second.set_pixel(1, 1, Rgba::opaque(104, 100, 100));
        second.set_pixel(4, 2, Rgba::opaque(200, 100, 100));
        let config = AnimatedGifConfiguration { delta_tolerance: 5, ..Default::default() };
        for quantizer in [with_transparency(), opaque_only()] {
            let out = run(&[first.clone(), second.clone()], &config, &quantizer);
            assert_eq!(out[1].rect(), Rect::new(4, 2, 1, 1));
        }

        // Without tolerance both changes are transmitted
        let out = run(&[first, second], &AnimatedGifConfiguration::default(), &opaque_only());
        assert_eq!(out[1].rect(), Rect::new(1, 1, 4, 2));
    }

    #[test]
    fn test_transparent_full_frame_becomes_center_pixel() {
        let frames = [Bitmap::filled(5, 3, RED), Bitmap::new(5, 3)];
        let config = AnimatedGifConfiguration { allow_delta_frames: false, ..Default::default() };
        let out = run(&frames, &config, &with_transparency());
        assert_eq!(out[0].disposal, DisposalMethod::RestoreToBackground);
        assert_eq!(out[1].rect(), Rect::new(2, 1, 1, 1));
        assert_eq!(Some(out[1].image.index_at(0, 0)), out[1].image.palette().transparent_index());
    }

    #[test]
    fn test_clipped_delta_without_transparency() {
        let first = Bitmap::filled(8, 8, Rgba::WHITE);
        let mut second = first.clone();
        second.fill_rect(Rect::new(2, 3, 2, 2), RED);
        let out = run(&[first, second], &AnimatedGifConfiguration::default(), &opaque_only());
        assert_eq!(out[1].rect(), Rect::new(2, 3, 2, 2));
        let red = out[1].image.palette().nearest_index(RED);
        assert!(out[1].image.indices().iter().all(|&i| i == red));
        assert_eq!(out[1].disposal, DisposalMethod::DoNotDispose);
    }

    #[test]
    fn test_transparency_delta_masks_unchanged_pixels() {
        let first = Bitmap::filled(5, 5, Rgba::WHITE);
        let mut second = first.clone();
        second.set_pixel(1, 1, RED);
        second.set_pixel(3, 2, RED);
        let out = run(&[first, second], &AnimatedGifConfiguration::default(), &with_transparency());
        let frame = &out[1];
        assert_eq!(frame.rect(), Rect::new(1, 1, 3, 2));
        let ti = frame.image.palette().transparent_index().unwrap();
        assert_ne!(frame.image.index_at(0, 0), ti);
        assert_eq!(frame.image.index_at(1, 0), ti);
        assert_ne!(frame.image.index_at(2, 1), ti);
    }

    #[test]
    fn test_delta_disabled_emits_full_frames() {
        let first = Bitmap::filled(4, 4, Rgba::WHITE);
        let mut second = first.clone();
        second.set_pixel(1, 1, RED);
        let config = AnimatedGifConfiguration { allow_delta_frames: false, ..Default::default() };
        let out = run(&[first, second], &config, &opaque_only());
        assert!(out.iter().all(|f| f.rect() == Rect::of_size(4, 4)));
    }

    #[test]
    fn test_delta_disabled_restores_before_any_transparency() {
        let first = Bitmap::filled(4, 4, Rgba::WHITE);
        let mut second = first.clone();
        second.set_pixel(2, 2, Rgba::TRANSPARENT);
        let config = AnimatedGifConfiguration { allow_delta_frames: false, ..Default::default() };
        let out = run(&[first.clone(), second, first], &config, &with_transparency());
        assert_eq!(out[0].disposal, DisposalMethod::RestoreToBackground);
        assert_eq!(out[1].disposal, DisposalMethod::DoNotDispose);
        assert_eq!(out[2].disposal, DisposalMethod::DoNotDispose);
    }

    #[test]
    fn test_no_clipping_keeps_full_screen() {
        let mut first = Bitmap::new(6, 6);
        first.fill_rect(Rect::new(2, 2, 2, 2), RED);
        let config = AnimatedGifConfiguration { allow_clipped_frames: false, ..Default::default() };
        let out = run(&[first.clone(), first], &config, &with_transparency());
        assert!(out.iter().all(|f| f.rect() == Rect::of_size(6, 6)));
    }

    #[test]
    fn test_ping_pong_replays_in_reverse() {
        let bitmaps: Vec<Bitmap> = [Rgba::WHITE, RED, Rgba::BLACK, Rgba::opaque(0, 0, 255)]
            .iter()
            .map(|&c| Bitmap::filled(3, 3, c))
            .collect();
        let mut input = frames(&bitmaps, 1);
        for (i, frame) in input.iter_mut().enumerate() {
            frame.delay = Duration::from_millis(10 * (i as u64 + 1));
        }
        let config = AnimatedGifConfiguration {
            animation_mode: AnimationMode::PingPong,
            allow_delta_frames: false,
            ..Default::default()
        };
        let quantizer = opaque_only();
        let out: Vec<GeneratedFrame> = FramePipeline::new(input.into_iter(), &config, &quantizer, None, &Uncancellable)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        let n = bitmaps.len();
        assert_eq!(out.len(), 2 * n - 2);
        for k in 0..n - 2 {
            assert_eq!(out[n + k].image, out[n - 2 - k].image);
            assert_eq!(out[n + k].delay, out[n - 2 - k].delay);
        }
        assert_eq!(out.iter().map(|f| f.delay).collect::<Vec<_>>(), vec![1, 2, 3, 4, 3, 2]);
    }

    #[test]
    fn test_ping_pong_stack_holds_inner_frames_only() {
        let bitmaps: Vec<Bitmap> = (0..4).map(|i| Bitmap::filled(2, 2, Rgba::opaque(0, 0, i * 60))).collect();
        let config = AnimatedGifConfiguration {
            animation_mode: AnimationMode::PingPong,
            allow_delta_frames: false,
            ..Default::default()
        };
        let quantizer = opaque_only();
        let input = frames(&bitmaps, 1);
        let mut pipeline = FramePipeline::new(input.into_iter(), &config, &quantizer, None, &Uncancellable).unwrap();
        let mut depths = Vec::new();
        while pipeline.next_frame().unwrap().is_some() {
            depths.push(pipeline.reverse_stack.len());
        }
        assert_eq!(depths, vec![0, 1, 2, 1, 0, 0]);
    }

    #[test]
    fn test_ping_pong_short_sequences() {
        let config = AnimatedGifConfiguration { animation_mode: AnimationMode::PingPong, ..Default::default() };
        let quantizer = with_transparency();
        assert_eq!(run(&[Bitmap::filled(2, 2, RED)], &config, &quantizer).len(), 1);
        let two = vec![Bitmap::filled(2, 2, RED), Bitmap::filled(2, 2, Rgba::WHITE)];
        assert_eq!(run(&two, &config, &quantizer).len(), 2);
    }

    #[test]
    fn test_progress_counts_ping_pong_frames() {
        let bitmaps: Vec<Bitmap> = (0..5).map(|i| Bitmap::filled(2, 2, Rgba::opaque(i * 50, 0, 0))).collect();
        let config = AnimatedGifConfiguration {
            animation_mode: AnimationMode::PingPong,
            report_overall_progress: true,
            ..Default::default()
        };
        let progress = LogProgress::new();
        let ctx = TaskContext::new(CancellationToken::new()).with_progress(&progress);
        let quantizer = with_transparency();
        let input = frames(&bitmaps, 2);
        let mut pipeline = FramePipeline::new(input.into_iter(), &config, &quantizer, None, &ctx).unwrap();
        assert_eq!(progress.max(), 8);
        let mut count = 0;
        while pipeline.next_frame().unwrap().is_some() {
            count += 1;
            assert_eq!(progress.current(), count);
        }
        assert_eq!(count, 8);
        assert!(progress.is_completed());
    }

    #[test]
    fn test_progress_grows_for_unknown_length() {
        let bitmaps: Vec<Bitmap> = (0..3).map(|i| Bitmap::filled(2, 2, Rgba::opaque(0, i * 60, 0))).collect();
        let config = AnimatedGifConfiguration { report_overall_progress: true, ..Default::default() };
        let progress = LogProgress::new();
        let ctx = TaskContext::new(CancellationToken::new()).with_progress(&progress);
        let quantizer = with_transparency();
        // `filter` hides the exact length
        let input = bitmaps.iter().map(|b| AnimationFrame::new(b, Duration::ZERO)).filter(|_| true);
        let mut pipeline = FramePipeline::new(input, &config, &quantizer, None, &ctx).unwrap();
        assert_eq!(progress.max(), 0);
        pipeline.next_frame().unwrap();
        // The first frame plus its lookahead
        assert_eq!(progress.max(), 2);
        while pipeline.next_frame().unwrap().is_some() {}
        assert_eq!(progress.max(), 3);
    }

    #[test]
    fn test_cancellation_stops_without_error() {
        let bitmaps = vec![Bitmap::filled(2, 2, RED); 4];
        let token = CancellationToken::new();
        let ctx = TaskContext::new(token.clone());
        let quantizer = with_transparency();
        let config = AnimatedGifConfiguration::default();
        let input = frames(&bitmaps, 1);
        let mut pipeline = FramePipeline::new(input.into_iter(), &config, &quantizer, None, &ctx).unwrap();
        assert!(pipeline.next_frame().unwrap().is_some());
        token.cancel();
        assert!(pipeline.next_frame().unwrap().is_none());
        assert!(pipeline.is_cancelled());
        assert!(pipeline.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_size_handling() {
        let small = Bitmap::filled(2, 2, RED);
        let big = Bitmap::filled(4, 4, Rgba::WHITE);
        let quantizer = with_transparency();

        let input = frames(std::slice::from_ref(&big), 1).into_iter().chain(frames(std::slice::from_ref(&small), 1));
        let config = AnimatedGifConfiguration::default();
        let result: Result<Vec<_>> =
            FramePipeline::new(input, &config, &quantizer, None, &Uncancellable).unwrap().collect();
        assert!(matches!(result, Err(EncodeError::FrameSizeMismatch { index: 1, width: 2, .. })));

        let config = AnimatedGifConfiguration {
            screen_size: Some((4, 4)),
            size_handling: SizeHandling::Center,
            allow_delta_frames: false,
            ..Default::default()
        };
        let out = run(std::slice::from_ref(&small), &config, &quantizer);
        // Transparent padding is trimmed away again
        assert_eq!(out[0].rect(), Rect::new(1, 1, 2, 2));

        let out = run(std::slice::from_ref(&small), &config, &opaque_only());
        assert_eq!(out[0].rect(), Rect::of_size(4, 4));
        assert_eq!(out[0].image.color_at(0, 0), Rgba::BLACK);

        let config = AnimatedGifConfiguration {
            screen_size: Some((4, 4)),
            size_handling: SizeHandling::Resize,
            ..Default::default()
        };
        let out = run(std::slice::from_ref(&small), &config, &quantizer);
        assert_eq!(out[0].rect(), Rect::of_size(4, 4));
        assert_eq!(out[0].image.color_at(3, 3), RED);
    }

    #[test]
    fn test_delay_rounding() {
        assert_eq!(delay_centiseconds(0, Duration::from_millis(34)).unwrap(), 3);
        assert_eq!(delay_centiseconds(0, Duration::from_millis(35)).unwrap(), 4);
        assert_eq!(delay_centiseconds(0, Duration::from_secs(655)).unwrap(), 65500);
        assert!(matches!(
            delay_centiseconds(7, Duration::from_secs(656)),
            Err(EncodeError::DelayOutOfRange { index: 7, .. })
        ));
    }

    #[test]
    fn test_validate_frames() {
        let a = Bitmap::filled(3, 3, RED);
        let b = Bitmap::filled(2, 3, RED);
        let config = AnimatedGifConfiguration::default();
        assert!(matches!(validate_frames(&[], &config), Err(EncodeError::EmptyAnimation)));
        assert!(validate_frames(&frames(std::slice::from_ref(&a), 1), &config).is_ok());
        let mixed = vec![AnimationFrame::new(&a, Duration::ZERO), AnimationFrame::new(&b, Duration::ZERO)];
        assert!(matches!(validate_frames(&mixed, &config), Err(EncodeError::FrameSizeMismatch { index: 1, .. })));
        let centered = AnimatedGifConfiguration { size_handling: SizeHandling::Center, ..Default::default() };
        assert!(validate_frames(&mixed, &centered).is_ok());
    }
}
