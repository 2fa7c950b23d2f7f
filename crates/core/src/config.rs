//! Animation encoding options.
//!
//! Every field has a default, so a configuration file only needs to name
//! the options it changes.

use serde::{Deserialize, Serialize};

use crate::error::{EncodeError, Result};
use crate::lzw::CompressionMode;

/// What to do with frames whose size differs from the logical screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SizeHandling {
    /// Reject the animation.
    #[default]
    ErrorIfDiffers,
    /// Center the frame; uncovered area is transparent, or the back color
    /// when the quantizer has no transparency.
    Center,
    /// Resample the frame to the screen size.
    Resize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnimationMode {
    /// No looping extension; decoders play the frames once.
    PlayOnce,
    /// Loop `n` extra times; 0 loops forever.
    Repeat(u16),
    /// Play forward then backward, forever.
    PingPong,
}

impl Default for AnimationMode {
    fn default() -> Self {
        AnimationMode::Repeat(0)
    }
}

impl AnimationMode {
    /// Value of the looping extension, if one is written.
    pub fn repeat_count(self) -> Option<u16> {
        match self {
            AnimationMode::PlayOnce => None,
            AnimationMode::Repeat(n) => Some(n),
            AnimationMode::PingPong => Some(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimatedGifConfiguration {
    /// Logical screen size; the first frame's size when `None`.
    pub screen_size: Option<(u32, u32)>,
    pub size_handling: SizeHandling,
    pub animation_mode: AnimationMode,
    /// Encode only what changed since the previous frame.
    pub allow_delta_frames: bool,
    /// Allow frames smaller than the logical screen.
    pub allow_clipped_frames: bool,
    /// Largest per-channel difference still treated as unchanged.
    pub delta_tolerance: u8,
    pub compression_mode: CompressionMode,
    pub report_overall_progress: bool,
    /// Written as a comment extension.
    pub comment: Option<String>,
}

impl Default for AnimatedGifConfiguration {
    fn default() -> Self {
        AnimatedGifConfiguration {
            screen_size: None,
            size_handling: SizeHandling::default(),
            animation_mode: AnimationMode::default(),
            allow_delta_frames: true,
            allow_clipped_frames: true,
            delta_tolerance: 0,
            compression_mode: CompressionMode::default(),
            report_overall_progress: false,
            comment: None,
        }
    }
}

impl AnimatedGifConfiguration {
    pub fn validate(&self) -> Result<()> {
        if let Some((width, height)) = self.screen_size {
            validate_dimensions(width, height)?;
        }
        if let Some(comment) = &self.comment {
            if !comment.is_ascii() {
                return Err(EncodeError::InvalidConfiguration("comment must be ASCII".into()));
            }
        }
        Ok(())
    }
}

/// GIF stores dimensions in 16 bits and needs at least one pixel.
pub fn validate_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 || width > u16::MAX as u32 || height > u16::MAX as u32 {
        return Err(EncodeError::InvalidDimensions { width, height });
    }
    Ok(())
}
