//! Native binary schematic format (`.scaf`).
//!
//! Layout, all integers big-endian:
//!
//! ```text
//! "SCAF" u16:version u16:width u16:height u16:depth i32:offset_x i32:offset_y i32:offset_z
//! u32:palette_len { str:name u16:prop_count { str:key str:value }* }*
//! u8:index_width u32:compressed_len zlib(indices, index_width bytes each)
//! u32:block_entity_count { u16:x u16:y u16:z str:id nbt:payload }*
//! ```
//!
//! Strings are a u16 byte length followed by UTF-8. Only the index array is
//! compressed. Each payload is an uncompressed NBT compound with an empty root
//! name. Block entities are written in (y, z, x) order and payload keys are
//! sorted, so equal regions always encode to identical bytes. Payloads that are
//! not in that form (unsorted or repeated keys) are rejected on read.

use crate::block_entity::{compound_from_map, map_from_compound, BlockEntity, NbtValue};
use crate::block_state::BlockState;
use crate::error::{Result, SchematicError};
use crate::formats::manager::{SchematicExporter, SchematicImporter};
use crate::formats::nbt;
use crate::palette::{index_width_for, Palette};
use crate::region::{validate_dimensions, Region};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use smol_str::SmolStr;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, trace};

pub const MAGIC: &[u8; 4] = b"SCAF";
pub const VERSION: u16 = 1;

/// Smallest block entity record: position, empty id, empty root compound.
const MIN_BLOCK_ENTITY_BYTES: usize = 6 + 2 + 4;

pub struct ScafFormat;

impl SchematicImporter for ScafFormat {
    fn name(&self) -> String {
        "scaf".to_string()
    }

    fn detect(&self, data: &[u8]) -> bool {
        data.len() >= 4 && &data[0..4] == MAGIC
    }

    fn read(&self, data: &[u8]) -> Result<Region> {
        from_bytes(data)
    }
}

impl SchematicExporter for ScafFormat {
    fn name(&self) -> String {
        "scaf".to_string()
    }

    fn extensions(&self) -> Vec<String> {
        vec!["scaf".to_string()]
    }

    fn write(&self, region: &Region) -> Result<Vec<u8>> {
        to_bytes(region)
    }
}

// ── Encoding ─────────────────────────────────────────────────────────────────

pub fn to_bytes(region: &Region) -> Result<Vec<u8>> {
    let (width, height, depth) = region.get_dimensions();
    let mut buf = Vec::with_capacity(64 + region.palette().len() * 24);
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&VERSION.to_be_bytes());
    for dim in [width, height, depth] {
        buf.extend_from_slice(&(dim as u16).to_be_bytes());
    }
    let (ox, oy, oz) = region.offset();
    for component in [ox, oy, oz] {
        buf.extend_from_slice(&component.to_be_bytes());
    }

    let palette = region.palette();
    buf.extend_from_slice(&(palette.len() as u32).to_be_bytes());
    for (_, block) in palette.iter() {
        write_block_state(&mut buf, block)?;
    }

    let index_width = palette.index_width();
    let compressed = compress_indices(region.blocks(), index_width)?;
    buf.push(index_width);
    buf.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
    buf.extend_from_slice(&compressed);

    let block_entities = region.sorted_block_entities();
    buf.extend_from_slice(&(block_entities.len() as u32).to_be_bytes());
    for ((x, y, z), block_entity) in block_entities {
        for component in [x, y, z] {
            buf.extend_from_slice(&(component as u16).to_be_bytes());
        }
        write_string(&mut buf, &block_entity.id)?;
        nbt::write_compound(&mut buf, &compound_from_map(&block_entity.nbt))?;
    }

    debug!(
        width,
        height,
        depth,
        palette = palette.len(),
        bytes = buf.len(),
        "encoded schematic"
    );
    Ok(buf)
}

pub fn write_to<W: Write>(region: &Region, writer: &mut W) -> Result<()> {
    writer.write_all(&to_bytes(region)?)?;
    Ok(())
}

pub fn save_to_file(region: &Region, path: impl AsRef<Path>) -> Result<()> {
    std::fs::write(path, to_bytes(region)?)?;
    Ok(())
}

fn compress_indices(blocks: &[u32], index_width: u8) -> Result<Vec<u8>> {
    let mut raw = Vec::with_capacity(blocks.len() * index_width as usize);
    match index_width {
        1 => raw.extend(blocks.iter().map(|&b| b as u8)),
        2 => {
            for &b in blocks {
                raw.extend_from_slice(&(b as u16).to_be_bytes());
            }
        }
        _ => {
            for &b in blocks {
                raw.extend_from_slice(&b.to_be_bytes());
            }
        }
    }
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw)?;
    Ok(encoder.finish()?)
}

fn write_string(buf: &mut Vec<u8>, value: &str) -> Result<()> {
    let len = u16::try_from(value.len()).map_err(|_| {
        SchematicError::corrupt(format!("string of {} bytes is too long to encode", value.len()))
    })?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(value.as_bytes());
    Ok(())
}

fn write_block_state(buf: &mut Vec<u8>, block: &BlockState) -> Result<()> {
    write_string(buf, &block.name)?;
    let count = u16::try_from(block.properties.len())
        .map_err(|_| SchematicError::corrupt(format!("too many properties on {}", block.name)))?;
    buf.extend_from_slice(&count.to_be_bytes());
    for (key, value) in &block.properties {
        write_string(buf, key)?;
        write_string(buf, value)?;
    }
    Ok(())
}

// ── Decoding ─────────────────────────────────────────────────────────────────

/// Cursor over an in-memory schematic; running off the end is `CorruptData`.
struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        ByteReader { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                SchematicError::corrupt(format!(
                    "unexpected end of data at byte {} (needed {} more)",
                    self.pos, len
                ))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| SchematicError::corrupt(format!("invalid UTF-8 string: {}", e)))
    }

    /// Element count that must still fit in the remaining input at `min_size` bytes each.
    fn len(&mut self, min_size: usize) -> Result<usize> {
        let len = self.u32()? as usize;
        if len.saturating_mul(min_size) > self.remaining() {
            return Err(SchematicError::corrupt(format!(
                "declared length {} exceeds remaining data",
                len
            )));
        }
        Ok(len)
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

pub fn from_bytes(data: &[u8]) -> Result<Region> {
    let mut reader = ByteReader::new(data);

    let magic = reader
        .take(4)
        .map_err(|_| SchematicError::UnsupportedVersion("missing schematic header".to_string()))?;
    if magic != MAGIC {
        return Err(SchematicError::UnsupportedVersion(format!(
            "unrecognized magic bytes {:02x?}",
            magic
        )));
    }
    let version = reader
        .u16()
        .map_err(|_| SchematicError::UnsupportedVersion("missing format version".to_string()))?;
    if version != VERSION {
        return Err(SchematicError::UnsupportedVersion(format!(
            "format version {} (expected {})",
            version, VERSION
        )));
    }

    let width = reader.u16()? as i32;
    let height = reader.u16()? as i32;
    let depth = reader.u16()? as i32;
    let volume = validate_dimensions(width as i64, height as i64, depth as i64)?;
    let offset = (reader.i32()?, reader.i32()?, reader.i32()?);

    let palette_len = reader.len(4)?;
    let mut entries = Vec::with_capacity(palette_len);
    for _ in 0..palette_len {
        entries.push(read_block_state(&mut reader)?);
    }
    let palette = Palette::from_entries(entries)?;

    let index_width = reader.u8()?;
    if index_width != index_width_for(palette.len()) {
        return Err(SchematicError::corrupt(format!(
            "index width {} does not match palette of {} entries",
            index_width,
            palette.len()
        )));
    }
    let compressed_len = reader.u32()? as usize;
    let compressed = reader.take(compressed_len)?;
    let blocks = decompress_indices(compressed, index_width, volume)?;
    trace!(volume, index_width, "decoded block indices");

    let entity_count = reader.len(MIN_BLOCK_ENTITY_BYTES)?;
    let mut block_entities = HashMap::with_capacity(entity_count);
    for _ in 0..entity_count {
        let pos = (
            reader.u16()? as i32,
            reader.u16()? as i32,
            reader.u16()? as i32,
        );
        let id = reader.string()?;
        let nbt = read_payload(&mut reader)?;
        if block_entities.insert(pos, BlockEntity { id, nbt }).is_some() {
            return Err(SchematicError::corrupt(format!(
                "duplicate block entity at {:?}",
                pos
            )));
        }
    }

    if reader.remaining() != 0 {
        return Err(SchematicError::corrupt(format!(
            "{} trailing bytes after schematic",
            reader.remaining()
        )));
    }

    debug!(width, height, depth, palette = palette.len(), "decoded schematic");
    Region::from_parts((width, height, depth), offset, palette, blocks, block_entities)
}

/// Reads a whole schematic from a blocking stream.
pub fn read_from<R: Read>(reader: &mut R) -> Result<Region> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    from_bytes(&data)
}

pub fn load_from_file(path: impl AsRef<Path>) -> Result<Region> {
    from_bytes(&std::fs::read(path)?)
}

fn decompress_indices(compressed: &[u8], index_width: u8, volume: usize) -> Result<Vec<u32>> {
    let expected = volume * index_width as usize;
    let mut raw = Vec::with_capacity(expected);
    // One extra byte is enough to detect oversized payloads without inflating them fully.
    ZlibDecoder::new(compressed)
        .take(expected as u64 + 1)
        .read_to_end(&mut raw)
        .map_err(|e| SchematicError::corrupt(format!("failed to decompress block data: {}", e)))?;
    if raw.len() != expected {
        return Err(SchematicError::corrupt(format!(
            "block data holds {} bytes, expected {}",
            raw.len(),
            expected
        )));
    }

    let blocks = match index_width {
        1 => raw.iter().map(|&b| b as u32).collect(),
        2 => raw
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]) as u32)
            .collect(),
        _ => raw
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    };
    Ok(blocks)
}

fn read_block_state(reader: &mut ByteReader<'_>) -> Result<BlockState> {
    let name = reader.string()?;
    if name.is_empty() {
        return Err(SchematicError::corrupt("palette entry with empty name"));
    }
    let count = reader.u16()? as usize;
    let mut properties: Vec<(SmolStr, SmolStr)> = Vec::with_capacity(count);
    for _ in 0..count {
        let key = SmolStr::from(reader.string()?);
        let value = SmolStr::from(reader.string()?);
        properties.push((key, value));
    }
    Ok(BlockState::new(name).with_properties(properties))
}

fn read_payload(reader: &mut ByteReader<'_>) -> Result<HashMap<String, NbtValue>> {
    let (compound, len) = nbt::read_compound(reader.rest())?;
    let raw = reader.take(len)?;
    let map = map_from_compound(&compound);

    let mut canonical = Vec::with_capacity(len);
    nbt::write_compound(&mut canonical, &compound_from_map(&map))?;
    if canonical != raw {
        return Err(SchematicError::corrupt(
            "block entity payload has repeated or unsorted keys",
        ));
    }
    Ok(map)
}
