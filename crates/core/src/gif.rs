//! GIF89a block writer.
//!
//! Writes the header lazily: the first frame's palette becomes the global
//! color table, and later frames carry a local table only when their palette
//! differs from it.

use std::io::{self, Write};

use crate::bitmap::IndexedBitmap;
use crate::lzw::{self, CompressionMode};
use crate::palette::Palette;

const EXTENSION_INTRODUCER: u8 = 0x21;
const GRAPHIC_CONTROL_LABEL: u8 = 0xF9;
const COMMENT_LABEL: u8 = 0xFE;
const APPLICATION_LABEL: u8 = 0xFF;
const IMAGE_SEPARATOR: u8 = 0x2C;
const TRAILER: u8 = 0x3B;

/// What the decoder does with a frame's area before drawing the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DisposalMethod {
    #[default]
    Unspecified = 0,
    DoNotDispose = 1,
    RestoreToBackground = 2,
    RestoreToPrevious = 3,
}

/// Per-frame parameters that go into the graphic control extension and the
/// image descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameControl {
    pub left: u16,
    pub top: u16,
    /// Centiseconds.
    pub delay: u16,
    pub disposal: DisposalMethod,
}

/// Logical screen parameters fixed when the first frame is written.
#[derive(Debug, Clone)]
struct LogicalScreen {
    global_palette: Palette,
}

pub struct GifWriter<W: Write> {
    out: W,
    width: u16,
    height: u16,
    repeat: Option<u16>,
    comment: Option<String>,
    compression: CompressionMode,
    screen: Option<LogicalScreen>,
    frames: usize,
}

impl<W: Write> GifWriter<W> {
    pub fn new(out: W, width: u16, height: u16) -> Self {
        GifWriter {
            out,
            width,
            height,
            repeat: None,
            comment: None,
            compression: CompressionMode::Auto,
            screen: None,
            frames: 0,
        }
    }

    /// `Some(0)` loops forever, `Some(n)` repeats n extra times, `None`
    /// writes no looping extension at all.
    pub fn with_repeat(mut self, repeat: Option<u16>) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment.filter(|c| !c.is_empty());
        self
    }

    pub fn with_compression(mut self, compression: CompressionMode) -> Self {
        self.compression = compression;
        self
    }

    pub fn frames_written(&self) -> usize {
        self.frames
    }

    /// Write one animation frame. Every animation frame gets a graphic
    /// control extension.
    pub fn write_frame(&mut self, image: &IndexedBitmap, control: FrameControl) -> io::Result<()> {
        self.ensure_header(image.palette())?;
        write_graphic_control(&mut self.out, image.palette(), control)?;
        self.write_image_block(image, control.left, control.top)
    }

    /// Write a still image. A graphic control extension is written only when
    /// it is needed for transparency.
    pub fn write_image(&mut self, image: &IndexedBitmap) -> io::Result<()> {
        self.ensure_header(image.palette())?;
        if image.palette().has_transparency() {
            let control = FrameControl { left: 0, top: 0, delay: 0, disposal: DisposalMethod::Unspecified };
            write_graphic_control(&mut self.out, image.palette(), control)?;
        }
        self.write_image_block(image, 0, 0)
    }

    /// Write the trailer and hand back the sink.
    pub fn finish(mut self) -> io::Result<W> {
        if self.screen.is_none() {
            // No frames: still produce a structurally valid file
            self.write_header(&Palette::black_and_white())?;
        }
        self.out.write_all(&[TRAILER])?;
        self.out.flush()?;
        Ok(self.out)
    }

    fn ensure_header(&mut self, palette: &Palette) -> io::Result<()> {
        if self.screen.is_none() {
            self.write_header(palette)?;
        }
        Ok(())
    }

    fn write_header(&mut self, global_palette: &Palette) -> io::Result<()> {
        let bits = global_palette.table_size_bits();
        let out = &mut self.out;
        out.write_all(b"GIF89a")?;
        out.write_all(&self.width.to_le_bytes())?;
        out.write_all(&self.height.to_le_bytes())?;
        // Global table present, color resolution and table size both from
        // the table bits, not sorted
        let packed = 0x80 | ((bits - 1) << 4) | (bits - 1);
        let background = global_palette.transparent_index().unwrap_or(0);
        out.write_all(&[packed, background, 0])?;
        out.write_all(&global_palette.color_table_bytes())?;

        if let Some(repeat) = self.repeat {
            out.write_all(&[EXTENSION_INTRODUCER, APPLICATION_LABEL, 0x0B])?;
            out.write_all(b"NETSCAPE2.0")?;
            out.write_all(&[0x03, 0x01])?;
            out.write_all(&repeat.to_le_bytes())?;
            out.write_all(&[0])?;
        }

        if let Some(comment) = &self.comment {
            out.write_all(&[EXTENSION_INTRODUCER, COMMENT_LABEL])?;
            for chunk in comment.as_bytes().chunks(255) {
                out.write_all(&[chunk.len() as u8])?;
                out.write_all(chunk)?;
            }
            out.write_all(&[0])?;
        }

        log::debug!(
            "gif header: {}x{}, {} global colors, repeat {:?}",
            self.width,
            self.height,
            global_palette.len(),
            self.repeat
        );
        self.screen = Some(LogicalScreen { global_palette: global_palette.clone() });
        Ok(())
    }

    fn write_image_block(&mut self, image: &IndexedBitmap, left: u16, top: u16) -> io::Result<()> {
        let palette = image.palette();
        let local = match &self.screen {
            Some(screen) => !screen.global_palette.same_table(palette),
            None => true,
        };
        let bits = palette.table_size_bits();

        let out = &mut self.out;
        out.write_all(&[IMAGE_SEPARATOR])?;
        out.write_all(&left.to_le_bytes())?;
        out.write_all(&top.to_le_bytes())?;
        out.write_all(&(image.width() as u16).to_le_bytes())?;
        out.write_all(&(image.height() as u16).to_le_bytes())?;
        if local {
            out.write_all(&[0x80 | (bits - 1)])?;
            out.write_all(&palette.color_table_bytes())?;
        } else {
            out.write_all(&[0])?;
        }

        lzw::write_image_data(out, image.indices(), lzw::min_code_size(bits), self.compression)?;
        self.frames += 1;
        Ok(())
    }
}

fn write_graphic_control<W: Write>(out: &mut W, palette: &Palette, control: FrameControl) -> io::Result<()> {
    let transparent = palette.transparent_index();
    let packed = ((control.disposal as u8) << 2) | transparent.is_some() as u8;
    out.write_all(&[EXTENSION_INTRODUCER, GRAPHIC_CONTROL_LABEL, 0x04, packed])?;
    out.write_all(&control.delay.to_le_bytes())?;
    out.write_all(&[transparent.unwrap_or(0), 0])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::color::Rgba;
    use crate::lzw::tests::{decode, read_sub_blocks};

    #[derive(Debug, Clone, Default)]
    pub(crate) struct ParsedFrame {
        pub left: u16,
        pub top: u16,
        pub width: u16,
        pub height: u16,
        pub has_control: bool,
        pub delay: u16,
        pub disposal: u8,
        pub transparent: Option<u8>,
        pub local_table: Option<Vec<[u8; 3]>>,
        pub indices: Vec<u8>,
    }

    #[derive(Debug, Clone, Default)]
    pub(crate) struct ParsedGif {
        pub width: u16,
        pub height: u16,
        pub color_resolution: u8,
        pub background: u8,
        pub global_table: Option<Vec<[u8; 3]>>,
        pub repeat: Option<u16>,
        pub comments: Vec<String>,
        pub frames: Vec<ParsedFrame>,
    }

    fn read_table(data: &[u8], pos: &mut usize, bits: u8) -> Vec<[u8; 3]> {
        let count = 1usize << (bits + 1);
        let table = data[*pos..*pos + count * 3].chunks(3).map(|c| [c[0], c[1], c[2]]).collect();
        *pos += count * 3;
        table
    }

    /// Walks every block of a GIF file, decoding the image data.
    pub(crate) fn parse(data: &[u8]) -> ParsedGif {
        assert_eq!(&data[..6], b"GIF89a");
        let mut gif = ParsedGif {
            width: u16::from_le_bytes([data[6], data[7]]),
            height: u16::from_le_bytes([data[8], data[9]]),
            ..Default::default()
        };
        let packed = data[10];
        gif.color_resolution = (packed >> 4) & 0x07;
        gif.background = data[11];
        let mut pos = 13;
        if packed & 0x80 != 0 {
            gif.global_table = Some(read_table(data, &mut pos, packed & 0x07));
        }

        let mut pending: Option<ParsedFrame> = None;
        loop {
            match data[pos] {
                TRAILER => {
                    assert_eq!(pos + 1, data.len(), "bytes after trailer");
                    return gif;
                }
                EXTENSION_INTRODUCER => {
                    let label = data[pos + 1];
                    pos += 2;
                    let (body, used) = read_sub_blocks(&data[pos..]);
                    pos += used;
                    match label {
                        GRAPHIC_CONTROL_LABEL => {
                            assert_eq!(body.len(), 4);
                            pending = Some(ParsedFrame {
                                has_control: true,
                                disposal: (body[0] >> 2) & 0x07,
                                delay: u16::from_le_bytes([body[1], body[2]]),
                                transparent: (body[0] & 1 == 1).then_some(body[3]),
                                ..Default::default()
                            });
                        }
                        APPLICATION_LABEL => {
                            assert_eq!(&body[..11], b"NETSCAPE2.0");
                            assert_eq!(body[11], 0x01);
                            gif.repeat = Some(u16::from_le_bytes([body[12], body[13]]));
                        }
                        COMMENT_LABEL => gif.comments.push(String::from_utf8(body).unwrap()),
                        other => panic!("unexpected extension {:#x}", other),
                    }
                }
                IMAGE_SEPARATOR => {
                    let mut frame = pending.take().unwrap_or_default();
                    let word = |at: usize| u16::from_le_bytes([data[at], data[at + 1]]);
                    frame.left = word(pos + 1);
                    frame.top = word(pos + 3);
                    frame.width = word(pos + 5);
                    frame.height = word(pos + 7);
                    let packed = data[pos + 9];
                    pos += 10;
                    if packed & 0x80 != 0 {
                        frame.local_table = Some(read_table(data, &mut pos, packed & 0x07));
                    }
                    let min_code_size = data[pos];
                    pos += 1;
                    let (payload, used) = read_sub_blocks(&data[pos..]);
                    pos += used;
                    frame.indices = decode(min_code_size, &payload).0;
                    assert_eq!(frame.indices.len(), frame.width as usize * frame.height as usize);
                    gif.frames.push(frame);
                }
                other => panic!("unexpected block {:#x} at {}", other, pos),
            }
        }
    }

    /// Plays the animation and returns the canvas after each frame;
    /// transparent canvas pixels are `Rgba::TRANSPARENT`.
    pub(crate) fn render(gif: &ParsedGif) -> Vec<Vec<Rgba>> {
        let (w, h) = (gif.width as usize, gif.height as usize);
        let mut canvas = vec![Rgba::TRANSPARENT; w * h];
        let mut shown = Vec::new();
        let mut previous: Option<&ParsedFrame> = None;
        for frame in &gif.frames {
            if let Some(prev) = previous.filter(|p| p.disposal == DisposalMethod::RestoreToBackground as u8) {
                for y in prev.top as usize..(prev.top + prev.height) as usize {
                    for x in prev.left as usize..(prev.left + prev.width) as usize {
                        canvas[y * w + x] = Rgba::TRANSPARENT;
                    }
                }
            }
            let table = frame.local_table.as_ref().or(gif.global_table.as_ref()).unwrap();
            for (i, &index) in frame.indices.iter().enumerate() {
                if Some(index) == frame.transparent {
                    continue;
                }
                let x = frame.left as usize + i % frame.width as usize;
                let y = frame.top as usize + i / frame.width as usize;
                assert!(x < w && y < h, "frame outside the logical screen");
                let [r, g, b] = table[index as usize];
                canvas[y * w + x] = Rgba::opaque(r, g, b);
            }
            shown.push(canvas.clone());
            previous = Some(frame);
        }
        shown
    }

    fn two_color(indices: Vec<u8>, width: u32, height: u32, transparent: bool) -> IndexedBitmap {
        let mut colors = vec![Rgba::BLACK, Rgba::WHITE];
        if transparent {
            colors.push(Rgba::TRANSPARENT);
        }
        IndexedBitmap::new(width, height, indices, Palette::new(colors).unwrap()).unwrap()
    }

    fn control(delay: u16, disposal: DisposalMethod) -> FrameControl {
        FrameControl { left: 0, top: 0, delay, disposal }
    }

    #[test]
    fn test_header_bytes() {
        let image = two_color(vec![0, 1, 1, 0], 2, 2, false);
        let mut writer = GifWriter::new(Vec::new(), 2, 2).with_repeat(Some(0));
        writer.write_frame(&image, control(10, DisposalMethod::DoNotDispose)).unwrap();
        let data = writer.finish().unwrap();

        assert_eq!(&data[..13], &[b'G', b'I', b'F', b'8', b'9', b'a', 2, 0, 2, 0, 0x80, 0, 0]);
        assert_eq!(&data[13..19], &[0, 0, 0, 255, 255, 255]);
        assert_eq!(&data[19..22], &[0x21, 0xFF, 0x0B]);
        assert_eq!(&data[22..33], b"NETSCAPE2.0");
        assert_eq!(&data[33..38], &[0x03, 0x01, 0x00, 0x00, 0x00]);
        // Graphic control: do not dispose, no transparency, 10 cs
        assert_eq!(&data[38..46], &[0x21, 0xF9, 0x04, 0x04, 10, 0, 0, 0]);
        assert_eq!(data[46], IMAGE_SEPARATOR);
        assert_eq!(*data.last().unwrap(), TRAILER);
    }

    #[test]
    fn test_global_table_reused_and_local_table_written() {
        let a = two_color(vec![0, 1], 2, 1, false);
        let b = two_color(vec![1, 0], 2, 1, false);
        let red_first = Palette::new(vec![Rgba::opaque(255, 0, 0), Rgba::BLACK]).unwrap();
        let other = IndexedBitmap::new(2, 1, vec![0, 1], red_first).unwrap();
        let mut writer = GifWriter::new(Vec::new(), 2, 1).with_repeat(Some(3));
        for image in [&a, &b, &other] {
            writer.write_frame(image, control(5, DisposalMethod::DoNotDispose)).unwrap();
        }
        assert_eq!(writer.frames_written(), 3);
        let gif = parse(&writer.finish().unwrap());
        assert_eq!(gif.repeat, Some(3));
        assert_eq!(gif.frames.len(), 3);
        assert!(gif.frames[0].local_table.is_none());
        assert!(gif.frames[1].local_table.is_none());
        assert_eq!(gif.frames[2].local_table.as_ref().unwrap()[0], [255, 0, 0]);
        assert_eq!(gif.frames[1].indices, vec![1, 0]);
    }

    #[test]
    fn test_transparency_and_disposal_flags() {
        let image = two_color(vec![2, 1, 0, 2], 2, 2, true);
        let mut writer = GifWriter::new(Vec::new(), 4, 4).with_repeat(Some(0));
        let ctl = FrameControl { left: 1, top: 2, delay: 300, disposal: DisposalMethod::RestoreToBackground };
        writer.write_frame(&image, ctl).unwrap();
        let gif = parse(&writer.finish().unwrap());
        assert_eq!(gif.background, 2);
        let frame = &gif.frames[0];
        assert_eq!((frame.left, frame.top, frame.width, frame.height), (1, 2, 2, 2));
        assert_eq!(frame.delay, 300);
        assert_eq!(frame.disposal, 2);
        assert_eq!(frame.transparent, Some(2));
        // Three colors are padded to a four-entry table
        assert_eq!(gif.global_table.as_ref().unwrap().len(), 4);
        assert_eq!(gif.color_resolution, 1);
    }

    #[test]
    fn test_still_image_control_extension_only_with_transparency() {
        let mut writer = GifWriter::new(Vec::new(), 2, 1);
        writer.write_image(&two_color(vec![0, 1], 2, 1, false)).unwrap();
        let gif = parse(&writer.finish().unwrap());
        assert_eq!(gif.repeat, None);
        assert!(!gif.frames[0].has_control);

        let mut writer = GifWriter::new(Vec::new(), 2, 1);
        writer.write_image(&two_color(vec![2, 1], 2, 1, true)).unwrap();
        let gif = parse(&writer.finish().unwrap());
        assert!(gif.frames[0].has_control);
        assert_eq!(gif.frames[0].transparent, Some(2));
    }

    #[test]
    fn test_comment_after_looping_extension() {
        let long = "x".repeat(300);
        let mut writer = GifWriter::new(Vec::new(), 1, 1).with_repeat(Some(0)).with_comment(Some(long.clone()));
        writer.write_frame(&two_color(vec![1], 1, 1, false), control(0, DisposalMethod::DoNotDispose)).unwrap();
        let data = writer.finish().unwrap();
        let netscape = data.windows(11).position(|w| w == b"NETSCAPE2.0").unwrap();
        let comment = data.windows(2).position(|w| w == [0x21, 0xFE]).unwrap();
        assert!(netscape < comment);
        assert_eq!(parse(&data).comments, vec![long]);
    }

    #[test]
    fn test_render_applies_disposal() {
        let full = two_color(vec![1, 1, 1, 1], 2, 2, true);
        let hole = two_color(vec![2, 2, 2, 0], 2, 2, true);
        let mut writer = GifWriter::new(Vec::new(), 2, 2).with_repeat(Some(0));
        writer.write_frame(&full, control(1, DisposalMethod::RestoreToBackground)).unwrap();
        writer.write_frame(&hole, control(1, DisposalMethod::DoNotDispose)).unwrap();
        let shown = render(&parse(&writer.finish().unwrap()));
        assert_eq!(shown[0], vec![Rgba::WHITE; 4]);
        assert_eq!(shown[1], vec![Rgba::TRANSPARENT, Rgba::TRANSPARENT, Rgba::TRANSPARENT, Rgba::BLACK]);
    }
}
