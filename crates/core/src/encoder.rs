//! Public encoding entry points.
//!
//! Both functions validate their input completely before the first byte is
//! written, and return `Ok(false)` when the context is cancelled.

use std::io::Write;

use crate::bitmap::Bitmap;
use crate::config::{validate_dimensions, AnimatedGifConfiguration};
use crate::context::{EncodeContext, ProgressKind};
use crate::dither::Ditherer;
use crate::error::Result;
use crate::gif::GifWriter;
use crate::pipeline::{validate_frames, AnimationFrame, FramePipeline};
use crate::quantize::{quantize, Quantizer};

/// Encode a single still image.
pub fn encode_image<W: Write>(
    image: &Bitmap,
    out: W,
    quantizer: &dyn Quantizer,
    ditherer: Option<&dyn Ditherer>,
    ctx: &dyn EncodeContext,
) -> Result<bool> {
    validate_dimensions(image.width(), image.height())?;
    let progress = ctx.progress();
    if let Some(progress) = progress {
        progress.new_phase(ProgressKind::SavingImage, 1);
    }

    let indexed = quantize(image, image.bounds(), quantizer, ditherer)?;
    if ctx.is_cancelled() {
        return Ok(false);
    }

    let mut writer = GifWriter::new(out, image.width() as u16, image.height() as u16);
    writer.write_image(&indexed)?;
    writer.finish()?;

    if let Some(progress) = progress {
        progress.complete();
    }
    log::info!("encoded {}x{} image, {} colors", image.width(), image.height(), indexed.palette().len());
    Ok(true)
}

/// Encode an animation. Frames are written as soon as they are generated;
/// the trailer is written only when every frame made it.
pub fn encode_animation<'a, W: Write>(
    frames: impl IntoIterator<Item = AnimationFrame<'a>>,
    out: W,
    config: &AnimatedGifConfiguration,
    quantizer: &'a dyn Quantizer,
    ditherer: Option<&'a dyn Ditherer>,
    ctx: &'a dyn EncodeContext,
) -> Result<bool> {
    let frames: Vec<AnimationFrame<'a>> = frames.into_iter().collect();
    validate_frames(&frames, config)?;

    let mut pipeline = FramePipeline::new(frames.into_iter(), config, quantizer, ditherer, ctx)?;
    let (width, height) = pipeline.screen_size();
    let mut writer = GifWriter::new(out, width as u16, height as u16)
        .with_repeat(config.animation_mode.repeat_count())
        .with_comment(config.comment.clone())
        .with_compression(config.compression_mode);

    while let Some(frame) = pipeline.next_frame()? {
        writer.write_frame(&frame.image, frame.control())?;
    }
    if pipeline.is_cancelled() {
        return Ok(false);
    }

    let frame_count = writer.frames_written();
    writer.finish()?;
    log::info!("encoded {}x{} animation, {} frames", width, height, frame_count);
    Ok(true)
}
