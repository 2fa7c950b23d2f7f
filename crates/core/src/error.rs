//! Error type shared by every encoding entry point.
//!
//! Caller contract violations are reported before a single byte reaches the
//! output sink. Failures of the sink itself surface unchanged as
//! [`EncodeError::Io`]. Cancellation is not an error and never shows up here.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while encoding a GIF stream.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EncodeError {
    /// The frame sequence contained no frames.
    #[error("No frames to encode")]
    EmptyAnimation,

    /// Dimensions are zero or larger than GIF's 16-bit limit.
    #[error("Invalid dimensions: {width}x{height}")]
    InvalidDimensions {
        /// The invalid width.
        width: u32,
        /// The invalid height.
        height: u32,
    },

    /// A frame differs from the logical screen and the size handling
    /// policy does not allow adjusting it.
    #[error("Frame {index} is {width}x{height} but the logical screen is {screen_width}x{screen_height}")]
    FrameSizeMismatch {
        /// Zero-based index of the offending input frame.
        index: usize,
        /// Frame width.
        width: u32,
        /// Frame height.
        height: u32,
        /// Logical screen width.
        screen_width: u32,
        /// Logical screen height.
        screen_height: u32,
    },

    /// A frame delay does not fit the 16-bit centisecond field.
    #[error("Delay of frame {index} ({delay:?}) exceeds 655.35 seconds")]
    DelayOutOfRange {
        /// Zero-based index of the offending input frame.
        index: usize,
        /// The requested delay.
        delay: Duration,
    },

    /// A palette is empty or has more than 256 entries.
    #[error("Invalid palette: {0} entries (expected 1..=256)")]
    InvalidPalette(usize),

    /// A pixel buffer does not match its declared dimensions.
    #[error("Pixel buffer holds {actual} values, {width}x{height} needs {expected}")]
    BufferSizeMismatch {
        /// Declared width.
        width: u32,
        /// Declared height.
        height: u32,
        /// Number of values implied by the dimensions.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The output sink failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EncodeError>;
