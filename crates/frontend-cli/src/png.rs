//! Minimal PNG decoder for frame input.
//!
//! Handles 8-bit, non-interlaced images of every color type (gray, RGB,
//! palette, gray+alpha, RGBA) and returns straight RGBA bytes. Chunk CRCs
//! are verified; ancillary chunks other than `tRNS` are skipped.

use anyhow::{bail, ensure, Context, Result};

const SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Decoded image: width, height and `width * height * 4` RGBA bytes.
pub struct DecodedPng {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

struct Header {
    width: u32,
    height: u32,
    color_type: u8,
}

impl Header {
    fn channels(&self) -> usize {
        match self.color_type {
            0 | 3 => 1,
            4 => 2,
            2 => 3,
            _ => 4,
        }
    }
}

pub fn decode_png(data: &[u8]) -> Result<DecodedPng> {
    ensure!(data.len() >= 8 && data[..8] == SIGNATURE, "not a PNG file");

    let mut header: Option<Header> = None;
    let mut palette: Vec<[u8; 4]> = Vec::new();
    let mut gray_key: Option<u16> = None;
    let mut rgb_key: Option<[u16; 3]> = None;
    let mut idat = Vec::new();

    let mut pos = 8;
    loop {
        ensure!(pos + 12 <= data.len(), "truncated chunk at offset {}", pos);
        let len = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        let kind = &data[pos + 4..pos + 8];
        ensure!(pos + 12 + len <= data.len(), "truncated {} chunk", String::from_utf8_lossy(kind));
        let body = &data[pos + 8..pos + 8 + len];
        let stored = u32::from_be_bytes([
            data[pos + 8 + len],
            data[pos + 9 + len],
            data[pos + 10 + len],
            data[pos + 11 + len],
        ]);
        ensure!(crc32(kind, body) == stored, "CRC mismatch in {} chunk", String::from_utf8_lossy(kind));
        pos += 12 + len;

        match kind {
            b"IHDR" => {
                ensure!(len == 13, "bad IHDR length");
                let width = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
                let height = u32::from_be_bytes([body[4], body[5], body[6], body[7]]);
                let (depth, color_type, interlace) = (body[8], body[9], body[12]);
                ensure!(depth == 8, "unsupported bit depth {}", depth);
                ensure!(matches!(color_type, 0 | 2 | 3 | 4 | 6), "bad color type {}", color_type);
                ensure!(interlace == 0, "interlaced PNG is not supported");
                ensure!(width > 0 && height > 0, "empty image");
                header = Some(Header { width, height, color_type });
            }
            b"PLTE" => {
                palette = body.chunks_exact(3).map(|c| [c[0], c[1], c[2], 255]).collect();
            }
            b"tRNS" => match header.as_ref().map(|h| h.color_type) {
                Some(3) => {
                    for (entry, &alpha) in palette.iter_mut().zip(body) {
                        entry[3] = alpha;
                    }
                }
                Some(0) if len >= 2 => gray_key = Some(u16::from_be_bytes([body[0], body[1]])),
                Some(2) if len >= 6 => {
                    let sample = |i: usize| u16::from_be_bytes([body[i], body[i + 1]]);
                    rgb_key = Some([sample(0), sample(2), sample(4)]);
                }
                _ => {}
            },
            b"IDAT" => idat.extend_from_slice(body),
            b"IEND" => break,
            _ => {}
        }
    }

    let header = header.context("missing IHDR chunk")?;
    let raw = miniz_oxide::inflate::decompress_to_vec_zlib(&idat)
        .map_err(|e| anyhow::anyhow!("inflate failed: {:?}", e))?;

    let bpp = header.channels();
    let stride = header.width as usize * bpp;
    let rows = header.height as usize;
    ensure!(raw.len() >= rows * (stride + 1), "image data too short");
    let pixels = unfilter(&raw, stride, rows, bpp)?;

    let mut rgba = Vec::with_capacity(header.width as usize * rows * 4);
    for px in pixels.chunks_exact(bpp) {
        match header.color_type {
            0 => {
                let a = if gray_key == Some(px[0] as u16) { 0 } else { 255 };
                rgba.extend_from_slice(&[px[0], px[0], px[0], a]);
            }
            2 => {
                let a = if rgb_key == Some([px[0] as u16, px[1] as u16, px[2] as u16]) { 0 } else { 255 };
                rgba.extend_from_slice(&[px[0], px[1], px[2], a]);
            }
            3 => match palette.get(px[0] as usize) {
                Some(entry) => rgba.extend_from_slice(entry),
                None => bail!("palette index {} out of range", px[0]),
            },
            4 => rgba.extend_from_slice(&[px[0], px[0], px[0], px[1]]),
            _ => rgba.extend_from_slice(px),
        }
    }

    Ok(DecodedPng { width: header.width, height: header.height, rgba })
}

/// Undo the per-row filters. `raw` holds a filter byte before every row.
fn unfilter(raw: &[u8], stride: usize, rows: usize, bpp: usize) -> Result<Vec<u8>> {
    let mut out = vec![0u8; stride * rows];
    for y in 0..rows {
        let filter = raw[y * (stride + 1)];
        let line = &raw[y * (stride + 1) + 1..(y + 1) * (stride + 1)];
        let (done, rest) = out.split_at_mut(y * stride);
        let prior: &[u8] = if y == 0 { &[] } else { &done[(y - 1) * stride..] };
        let cur = &mut rest[..stride];
        for x in 0..stride {
            let a = if x >= bpp { cur[x - bpp] as i16 } else { 0 };
            let b = prior.get(x).copied().unwrap_or(0) as i16;
            let c = if x >= bpp { prior.get(x - bpp).copied().unwrap_or(0) as i16 } else { 0 };
            let predicted = match filter {
                0 => 0,
                1 => a,
                2 => b,
                3 => (a + b) / 2,
                4 => paeth(a, b, c),
                other => bail!("bad filter type {} in row {}", other, y),
            };
            cur[x] = line[x].wrapping_add(predicted as u8);
        }
    }
    Ok(out)
}

fn paeth(a: i16, b: i16, c: i16) -> i16 {
    let p = a + b - c;
    let (pa, pb, pc) = ((p - a).abs(), (p - b).abs(), (p - c).abs());
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

// CRC-32 (PNG/zlib)
fn crc32(chunk_type: &[u8], data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFFFFFF;
    for &b in chunk_type.iter().chain(data.iter()) {
        crc ^= b as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB88320;
            } else {
                crc >>= 1;
            }
        }
    }
    crc ^ 0xFFFFFFFF
}
