//! # animgif-core
//!
//! GIF89a encoder for still images and size-optimized animations.
//!
//! The interesting part is the animation frame pipeline: for every frame it
//! decides which pixels actually have to be transmitted (the whole frame, a
//! clipped rectangle, or a transparency-masked delta against what the decoder
//! already shows), which disposal method the decoder must apply, and then
//! compresses the indexed pixels with GIF's variable-width LZW.
//!
//! ## Architecture
//!
//! - [`delta`] — region searches between two frames and pixel comparison
//! - [`pipeline::FramePipeline`] — prepare / generate / emit state machine
//!   with one frame of lookahead
//! - [`lzw`] — hash-addressed LZW code table and sub-block bit packer
//! - [`gif::GifWriter`] — GIF89a block serializer
//! - [`encode_image`] / [`encode_animation`] — validated entry points
//!
//! Color reduction is pluggable through the [`Quantizer`] and [`Ditherer`]
//! traits; [`PredefinedColorsQuantizer`], [`OptimizedPaletteQuantizer`] and
//! [`OrderedDitherer`] are provided.
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use animgif_core::{encode_animation, AnimatedGifConfiguration, AnimationFrame, Bitmap, Rgba,
//!                    PredefinedColorsQuantizer, Uncancellable};
//!
//! let frames: Vec<Bitmap> = (0..4u8).map(|i| Bitmap::filled(8, 8, Rgba::opaque(i * 51, 0, 0))).collect();
//! let input = frames.iter().map(|b| AnimationFrame::new(b, Duration::from_millis(100)));
//! let quantizer = PredefinedColorsQuantizer::system_default_8bpp(Rgba::BLACK, 128);
//! let mut gif = Vec::new();
//! let done = encode_animation(input, &mut gif, &AnimatedGifConfiguration::default(),
//!                             &quantizer, None, &Uncancellable).unwrap();
//! assert!(done);
//! assert_eq!(&gif[..6], b"GIF89a");
//! ```

pub mod bitmap;
pub mod color;
pub mod config;
pub mod context;
pub mod delta;
pub mod dither;
pub mod encoder;
pub mod error;
pub mod gif;
pub mod lzw;
pub mod palette;
pub mod pipeline;
pub mod quantize;
pub mod rect;

pub use bitmap::{Bitmap, IndexedBitmap};
pub use color::{Rgba, WorkingColorSpace};
pub use config::{AnimatedGifConfiguration, AnimationMode, SizeHandling};
pub use context::{CancellationToken, EncodeContext, LogProgress, ProgressKind, ProgressReporter, TaskContext, Uncancellable};
pub use dither::{Ditherer, OrderedDitherer};
pub use encoder::{encode_animation, encode_image};
pub use error::{EncodeError, Result};
pub use gif::DisposalMethod;
pub use lzw::CompressionMode;
pub use palette::Palette;
pub use pipeline::{AnimationFrame, FramePipeline, GeneratedFrame};
pub use quantize::{OptimizedPaletteQuantizer, PredefinedColorsQuantizer, Quantizer, QuantizingSession};
pub use rect::Rect;
