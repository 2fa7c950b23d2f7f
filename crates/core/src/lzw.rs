//! Variable-width LZW compression as used by GIF image data.
//!
//! Output goes straight into 255-byte data sub-blocks, so a whole frame is
//! never buffered in compressed form.

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

const MAX_CODE_SIZE: u8 = 12;
const MAX_CODES: u16 = 1 << MAX_CODE_SIZE;

/// Open-addressing hash size; a prime somewhat above `MAX_CODES`.
const TABLE_SIZE: usize = 5003;
const EMPTY: i32 = 0;

/// How the encoder manages its code table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompressionMode {
    /// Grow codes up to 12 bits and clear the table when it fills up.
    #[default]
    Auto,
    /// Keep using the full table once it has 4096 entries.
    DoNotClear,
    /// Never grow codes past the initial width; clear instead.
    DoNotIncreaseBitSize,
    /// Emit every index as a literal code of the initial width.
    Uncompressed,
}

/// String table: maps (prefix code, next index) to the code of that string.
/// Each slot is `(match_key, code)`; a key of `EMPTY` marks a free slot.
struct CodeTable {
    slots: Box<[(i32, i32)]>,
    shift: u32,
}

impl CodeTable {
    fn new() -> Self {
        // Spread the index bits over the table size
        let mut shift = 0;
        let mut size = TABLE_SIZE;
        while size < 65536 {
            size *= 2;
            shift += 1;
        }
        CodeTable { slots: vec![(EMPTY, 0); TABLE_SIZE].into_boxed_slice(), shift: 8 - shift }
    }

    fn clear(&mut self) {
        self.slots.fill((EMPTY, 0));
    }

    /// `Ok(code)` when the string is known, otherwise `Err(slot)` with the
    /// free slot to insert it into.
    #[inline]
    fn find(&self, prefix: u16, index: u8) -> Result<u16, usize> {
        let key = match_key(prefix, index);
        let mut slot = (((index as usize) << self.shift) ^ prefix as usize) % TABLE_SIZE;
        let step = if slot == 0 { 1 } else { TABLE_SIZE - slot };
        loop {
            match self.slots[slot] {
                (k, code) if k == key => return Ok(code as u16),
                (EMPTY, _) => return Err(slot),
                _ => slot = (slot + TABLE_SIZE - step) % TABLE_SIZE,
            }
        }
    }

    #[inline]
    fn insert(&mut self, slot: usize, prefix: u16, index: u8, code: u16) {
        self.slots[slot] = (match_key(prefix, index), code as i32);
    }
}

/// Never `EMPTY`.
#[inline]
fn match_key(prefix: u16, index: u8) -> i32 {
    ((index as i32) << MAX_CODE_SIZE) + prefix as i32 + 1
}

/// Packs codes LSB-first into length-prefixed sub-blocks.
struct BitPacker<'w, W: Write> {
    out: &'w mut W,
    acc: u32,
    bits: u8,
    block: [u8; 255],
    len: usize,
}

impl<'w, W: Write> BitPacker<'w, W> {
    fn new(out: &'w mut W) -> Self {
        BitPacker { out, acc: 0, bits: 0, block: [0; 255], len: 0 }
    }

    fn push(&mut self, code: u16, width: u8) -> io::Result<()> {
        self.acc |= (code as u32) << self.bits;
        self.bits += width;
        while self.bits >= 8 {
            self.push_byte(self.acc as u8)?;
            self.acc >>= 8;
            self.bits -= 8;
        }
        Ok(())
    }

    fn push_byte(&mut self, byte: u8) -> io::Result<()> {
        self.block[self.len] = byte;
        self.len += 1;
        if self.len == self.block.len() {
            self.flush_block()?;
        }
        Ok(())
    }

    fn flush_block(&mut self) -> io::Result<()> {
        if self.len > 0 {
            self.out.write_all(&[self.len as u8])?;
            self.out.write_all(&self.block[..self.len])?;
            self.len = 0;
        }
        Ok(())
    }

    /// Flush pending bits and write the block terminator.
    fn finish(mut self) -> io::Result<()> {
        if self.bits > 0 {
            self.push_byte(self.acc as u8)?;
            self.acc = 0;
            self.bits = 0;
        }
        self.flush_block()?;
        self.out.write_all(&[0])
    }
}

struct LzwEncoder<'w, W: Write> {
    packer: BitPacker<'w, W>,
    table: CodeTable,
    min_code_size: u8,
    code_size: u8,
    clear_code: u16,
    next_free: u16,
    clear_pending: bool,
}

impl<'w, W: Write> LzwEncoder<'w, W> {
    fn new(out: &'w mut W, min_code_size: u8) -> Self {
        let clear_code = 1 << min_code_size;
        LzwEncoder {
            packer: BitPacker::new(out),
            table: CodeTable::new(),
            min_code_size,
            code_size: min_code_size + 1,
            clear_code,
            next_free: clear_code + 2,
            clear_pending: false,
        }
    }

    fn end_code(&self) -> u16 {
        self.clear_code + 1
    }

    /// Write `code` at the current width, then adjust the width for the
    /// next code the same way a decoder will.
    fn emit(&mut self, code: u16) -> io::Result<()> {
        self.packer.push(code, self.code_size)?;
        if self.clear_pending {
            self.code_size = self.min_code_size + 1;
            self.clear_pending = false;
        } else if self.next_free > (1 << self.code_size) - 1 && self.code_size < MAX_CODE_SIZE {
            self.code_size += 1;
        }
        Ok(())
    }

    fn clear_block(&mut self) -> io::Result<()> {
        log::trace!("LZW table reset at code {}", self.next_free);
        self.table.clear();
        self.next_free = self.clear_code + 2;
        self.clear_pending = true;
        self.emit(self.clear_code)
    }

    fn compress(&mut self, indices: &[u8], mode: CompressionMode) -> io::Result<()> {
        self.emit(self.clear_code)?;
        let (&first, rest) = match indices.split_first() {
            Some(split) => split,
            None => return self.emit(self.end_code()),
        };

        let limit = match mode {
            CompressionMode::DoNotIncreaseBitSize => (1 << (self.min_code_size + 1)) - 1,
            _ => MAX_CODES,
        };

        let mut prefix = first as u16;
        for &index in rest {
            match self.table.find(prefix, index) {
                Ok(code) => prefix = code,
                Err(slot) => {
                    self.emit(prefix)?;
                    if self.next_free < limit {
                        self.table.insert(slot, prefix, index, self.next_free);
                        self.next_free += 1;
                    } else if mode != CompressionMode::DoNotClear {
                        self.clear_block()?;
                    }
                    prefix = index as u16;
                }
            }
        }
        self.emit(prefix)?;
        self.emit(self.end_code())
    }

    /// Every index becomes one literal code. A clear code is inserted before
    /// the decoder's table would force a wider code.
    fn store(&mut self, indices: &[u8]) -> io::Result<()> {
        self.emit(self.clear_code)?;
        let run = (1usize << self.code_size) - self.next_free as usize;
        for (i, chunk) in indices.chunks(run).enumerate() {
            if i > 0 {
                self.clear_block()?;
            }
            for &index in chunk {
                self.emit(index as u16)?;
            }
        }
        self.emit(self.end_code())
    }

    fn finish(self) -> io::Result<()> {
        self.packer.finish()
    }
}

/// Compress `indices` into GIF image data: the minimum code size byte,
/// the data sub-blocks and the block terminator.
///
/// `min_code_size` must be in 2..=8 and every index must be below
/// `1 << min_code_size`.
pub fn write_image_data<W: Write>(
    out: &mut W,
    indices: &[u8],
    min_code_size: u8,
    mode: CompressionMode,
) -> io::Result<()> {
    debug_assert!((2..=8).contains(&min_code_size));
    debug_assert!(indices.iter().all(|&i| (i as u32) < 1 << min_code_size));
    out.write_all(&[min_code_size])?;
    let mut encoder = LzwEncoder::new(out, min_code_size);
    match mode {
        CompressionMode::Uncompressed => encoder.store(indices)?,
        _ => encoder.compress(indices, mode)?,
    }
    encoder.finish()
}

/// Smallest valid minimum code size for a palette of `table_size_bits`.
pub fn min_code_size(table_size_bits: u8) -> u8 {
    table_size_bits.clamp(2, 8)
}
