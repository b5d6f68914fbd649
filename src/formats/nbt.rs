//! NBT document plumbing shared by the formats.
//!
//! Parsing and writing go through `quartz_nbt`. Before a document is handed to
//! it, a structural pass checks that every declared array, list and string
//! length fits inside the input, so a hostile length field fails as
//! `CorruptData` instead of turning into a huge allocation.

use crate::error::{Result, SchematicError};
use flate2::read::GzDecoder;
use quartz_nbt::io::Flavor;
use quartz_nbt::NbtCompound;
use std::io::{Cursor, Read};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Largest inflated document accepted from a gzip stream (256 MiB).
pub const MAX_INFLATED_BYTES: u64 = 256 * 1024 * 1024;

const MAX_DEPTH: usize = 512;

const TAG_END: u8 = 0;
const TAG_COMPOUND: u8 = 10;

/// Parses a gzip-compressed or raw NBT document.
pub(crate) fn read_root(data: &[u8]) -> Result<NbtCompound> {
    read_root_limited(data, MAX_INFLATED_BYTES)
}

fn read_root_limited(data: &[u8], limit: u64) -> Result<NbtCompound> {
    if !data.starts_with(&GZIP_MAGIC) {
        return read_compound(data).map(|(root, _)| root);
    }

    let mut raw = Vec::new();
    GzDecoder::new(data)
        .take(limit + 1)
        .read_to_end(&mut raw)
        .map_err(|e| SchematicError::corrupt(format!("failed to inflate NBT: {}", e)))?;
    if raw.len() as u64 > limit {
        return Err(SchematicError::corrupt(format!(
            "inflated NBT exceeds {} bytes",
            limit
        )));
    }
    read_compound(&raw).map(|(root, _)| root)
}

/// Reads the root compound at the front of `data` and returns it together with
/// the number of bytes it occupied.
pub(crate) fn read_compound(data: &[u8]) -> Result<(NbtCompound, usize)> {
    let len = scan_root(data)?;
    let (root, _) = quartz_nbt::io::read_nbt(&mut Cursor::new(&data[..len]), Flavor::Uncompressed)
        .map_err(|e| SchematicError::corrupt(format!("malformed NBT: {}", e)))?;
    Ok((root, len))
}

/// Appends `compound` as an uncompressed document with an empty root name.
pub(crate) fn write_compound(buf: &mut Vec<u8>, compound: &NbtCompound) -> Result<()> {
    quartz_nbt::io::write_nbt(buf, None, compound, Flavor::Uncompressed)
        .map_err(|e| SchematicError::corrupt(format!("failed to encode NBT: {}", e)))
}

fn scan_root(data: &[u8]) -> Result<usize> {
    let mut scan = Scan { data, pos: 0 };
    if scan.u8()? != TAG_COMPOUND {
        return Err(SchematicError::corrupt("NBT root is not a compound"));
    }
    let name_len = scan.u16()? as usize;
    scan.skip(name_len)?;
    scan.body(TAG_COMPOUND, 0)?;
    Ok(scan.pos)
}

struct Scan<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Scan<'_> {
    fn skip(&mut self, len: usize) -> Result<()> {
        self.pos = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| SchematicError::corrupt("NBT data ends early"))?;
        Ok(())
    }

    fn bytes<const N: usize>(&mut self) -> Result<[u8; N]> {
        let start = self.pos;
        self.skip(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[start..self.pos]);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.bytes()?))
    }

    fn len(&mut self) -> Result<usize> {
        let len = i32::from_be_bytes(self.bytes()?);
        usize::try_from(len)
            .map_err(|_| SchematicError::corrupt(format!("negative NBT length {}", len)))
    }

    fn array(&mut self, element_size: usize) -> Result<()> {
        let len = self.len()?;
        let bytes = len
            .checked_mul(element_size)
            .ok_or_else(|| SchematicError::corrupt("NBT array length overflows"))?;
        self.skip(bytes)
    }

    fn body(&mut self, tag: u8, depth: usize) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(SchematicError::corrupt("NBT nested too deeply"));
        }
        match tag {
            1 => self.skip(1),
            2 => self.skip(2),
            3 | 5 => self.skip(4),
            4 | 6 => self.skip(8),
            7 => self.array(1),
            8 => {
                let len = self.u16()? as usize;
                self.skip(len)
            }
            9 => {
                let element = self.u8()?;
                let len = self.len()?;
                if element == TAG_END {
                    return match len {
                        0 => Ok(()),
                        _ => Err(SchematicError::corrupt("non-empty NBT list of end tags")),
                    };
                }
                // Every element takes at least one byte.
                if len > self.data.len() - self.pos {
                    return Err(SchematicError::corrupt("NBT list longer than its data"));
                }
                for _ in 0..len {
                    self.body(element, depth + 1)?;
                }
                Ok(())
            }
            TAG_COMPOUND => loop {
                let child = self.u8()?;
                if child == TAG_END {
                    return Ok(());
                }
                let name_len = self.u16()? as usize;
                self.skip(name_len)?;
                self.body(child, depth + 1)?;
            },
            11 => self.array(4),
            12 => self.array(8),
            other => Err(SchematicError::corrupt(format!("unknown NBT tag {}", other))),
        }
    }
}
