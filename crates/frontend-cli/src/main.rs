//! Command line frontend: PNG frame sequences to animated GIF.
//!
//! ```text
//! animgif out.gif frame1.png frame2.png ... [options]
//! ```
//!
//! Options override the values of a `--config` JSON file, which in turn
//! overrides the built-in defaults. Set `RUST_LOG=debug` to see per-frame
//! decisions (strategy, rectangle, disposal).

mod png;

use std::env;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::process;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use animgif_core::{
    encode_animation, encode_image, AnimatedGifConfiguration, AnimationFrame, AnimationMode, Bitmap,
    CancellationToken, CompressionMode, Ditherer, LogProgress, OptimizedPaletteQuantizer,
    PredefinedColorsQuantizer, Quantizer, Rgba, SizeHandling, TaskContext,
};

/// Options that take a value; everything else starting with `--` is a flag.
const VALUE_OPTIONS: &[&str] = &[
    "--delay",
    "--repeat",
    "--tolerance",
    "--size",
    "--palette",
    "--colors",
    "--compression",
    "--comment",
    "--config",
    "--back",
];

fn print_usage(program: &str) {
    eprintln!("animgif - PNG frames to animated GIF");
    eprintln!("Usage: {} <out.gif> <frame.png>... [options]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --delay MS           Delay per frame in milliseconds (default 100)");
    eprintln!("  --repeat N           Loop N extra times, 0 = forever (default)");
    eprintln!("  --once               Play once, no looping extension");
    eprintln!("  --pingpong           Play forward, then backward");
    eprintln!("  --tolerance N        Per-channel difference treated as unchanged (0-255)");
    eprintln!("  --no-delta           Always encode whole frames");
    eprintln!("  --no-clip            Never encode frames smaller than the screen");
    eprintln!("  --size WxH           Logical screen size (default: first frame)");
    eprintln!("  --center             Center frames of a different size");
    eprintln!("  --resize             Resample frames of a different size");
    eprintln!("  --palette P          optimized (default), system, grayscale, bw");
    eprintln!("  --colors N           Palette size for --palette optimized (2-256)");
    eprintln!("  --back RRGGBB        Color translucent pixels are blended onto");
    eprintln!("  --no-alpha           Blend everything onto the back color");
    eprintln!("  --dither             Ordered 8x8 dithering");
    eprintln!("  --compression M      auto (default), noclear, fixed, none");
    eprintln!("  --comment TEXT       Store a comment in the file");
    eprintln!("  --config FILE        JSON configuration file");
    eprintln!("  --progress           Log overall progress");
}

fn option<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter().position(|a| a == name).and_then(|i| args.get(i + 1)).map(String::as_str)
}

fn flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}

fn parsed<T: std::str::FromStr>(args: &[String], name: &str) -> Result<Option<T>> {
    match option(args, name) {
        Some(v) => v.parse().map(Some).map_err(|_| anyhow::anyhow!("invalid value for {}: {}", name, v)),
        None => Ok(None),
    }
}

/// Positional arguments: everything that is neither an option nor an
/// option's value.
fn positional(args: &[String]) -> Vec<&str> {
    let mut result = Vec::new();
    let mut i = 1;
    while i < args.len() {
        let a = args[i].as_str();
        if VALUE_OPTIONS.contains(&a) {
            i += 2;
            continue;
        }
        if !a.starts_with("--") {
            result.push(a);
        }
        i += 1;
    }
    result
}

fn parse_size(s: &str) -> Result<(u32, u32)> {
    let (w, h) = s.split_once(['x', 'X']).context("size must look like WIDTHxHEIGHT")?;
    Ok((w.parse().context("bad width")?, h.parse().context("bad height")?))
}

fn parse_color(s: &str) -> Result<Rgba> {
    let hex = s.trim_start_matches('#');
    if hex.len() != 6 {
        bail!("color must look like RRGGBB");
    }
    let v = u32::from_str_radix(hex, 16).context("bad color")?;
    Ok(Rgba::opaque((v >> 16) as u8, (v >> 8) as u8, v as u8))
}

fn build_config(args: &[String]) -> Result<AnimatedGifConfiguration> {
    let mut config = match option(args, "--config") {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path))?
        }
        None => AnimatedGifConfiguration::default(),
    };

    if let Some(n) = parsed::<u16>(args, "--repeat")? {
        config.animation_mode = AnimationMode::Repeat(n);
    }
    if flag(args, "--once") {
        config.animation_mode = AnimationMode::PlayOnce;
    }
    if flag(args, "--pingpong") {
        config.animation_mode = AnimationMode::PingPong;
    }
    if let Some(t) = parsed::<u8>(args, "--tolerance")? {
        config.delta_tolerance = t;
    }
    if flag(args, "--no-delta") {
        config.allow_delta_frames = false;
    }
    if flag(args, "--no-clip") {
        config.allow_clipped_frames = false;
    }
    if let Some(size) = option(args, "--size") {
        config.screen_size = Some(parse_size(size)?);
    }
    if flag(args, "--center") {
        config.size_handling = SizeHandling::Center;
    }
    if flag(args, "--resize") {
        config.size_handling = SizeHandling::Resize;
    }
    if let Some(mode) = option(args, "--compression") {
        config.compression_mode = match mode {
            "auto" => CompressionMode::Auto,
            "noclear" => CompressionMode::DoNotClear,
            "fixed" => CompressionMode::DoNotIncreaseBitSize,
            "none" => CompressionMode::Uncompressed,
            other => bail!("unknown compression mode: {}", other),
        };
    }
    if let Some(comment) = option(args, "--comment") {
        config.comment = Some(comment.to_string());
    }
    if flag(args, "--progress") {
        config.report_overall_progress = true;
    }
    config.validate()?;
    Ok(config)
}

fn build_quantizer(args: &[String]) -> Result<Box<dyn Quantizer>> {
    let back = option(args, "--back").map(parse_color).transpose()?.unwrap_or(Rgba::BLACK);
    let alpha_threshold = if flag(args, "--no-alpha") { 0 } else { 128 };
    let quantizer: Box<dyn Quantizer> = match option(args, "--palette").unwrap_or("optimized") {
        "optimized" => {
            let colors = parsed::<usize>(args, "--colors")?.unwrap_or(256);
            Box::new(
                OptimizedPaletteQuantizer::new(colors)?
                    .with_back_color(back)
                    .with_alpha_threshold(alpha_threshold),
            )
        }
        "system" => Box::new(PredefinedColorsQuantizer::system_default_8bpp(back, alpha_threshold)),
        "grayscale" => Box::new(PredefinedColorsQuantizer::grayscale(back, alpha_threshold)),
        "bw" => Box::new(PredefinedColorsQuantizer::black_and_white(back)),
        other => bail!("unknown palette: {}", other),
    };
    Ok(quantizer)
}

fn load_frame(path: &str) -> Result<Bitmap> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path))?;
    let image = png::decode_png(&data).with_context(|| format!("decoding {}", path))?;
    Ok(Bitmap::from_rgba_bytes(image.width, image.height, &image.rgba)?)
}

fn run(args: &[String]) -> Result<()> {
    let paths = positional(args);
    let (out_path, frame_paths) = match paths.split_first() {
        Some((out, frames)) if !frames.is_empty() => (*out, frames),
        _ => {
            print_usage(&args[0]);
            process::exit(1);
        }
    };
    if Path::new(out_path).extension().and_then(|e| e.to_str()) == Some("png") {
        bail!("the first argument is the output file, got {}", out_path);
    }

    let config = build_config(args)?;
    let quantizer = build_quantizer(args)?;
    let ordered = animgif_core::OrderedDitherer::bayer8x8();
    let ditherer: Option<&dyn Ditherer> = if flag(args, "--dither") { Some(&ordered) } else { None };
    let delay = Duration::from_millis(parsed::<u64>(args, "--delay")?.unwrap_or(100));

    let bitmaps = frame_paths.iter().map(|p| load_frame(p)).collect::<Result<Vec<_>>>()?;
    log::info!("loaded {} frame(s) from {} file(s)", bitmaps.len(), frame_paths.len());

    let progress = LogProgress::new();
    let ctx = TaskContext::new(CancellationToken::new()).with_progress(&progress);
    let file = File::create(out_path).with_context(|| format!("creating {}", out_path))?;
    let out = BufWriter::new(file);

    if bitmaps.len() == 1 && config.animation_mode == AnimationMode::PlayOnce {
        encode_image(&bitmaps[0], out, quantizer.as_ref(), ditherer, &ctx)?;
    } else {
        let frames = bitmaps.iter().map(|b| AnimationFrame::new(b, delay));
        encode_animation(frames, out, &config, quantizer.as_ref(), ditherer, &ctx)?;
    }

    let size = std::fs::metadata(out_path).map(|m| m.len()).unwrap_or(0);
    println!("{}: {} frame(s), {} bytes", out_path, bitmaps.len(), size);
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 || flag(&args, "--help") || flag(&args, "-h") {
        print_usage(args.first().map(String::as_str).unwrap_or("animgif"));
        process::exit(if args.len() < 3 { 1 } else { 0 });
    }
    run(&args)
}
