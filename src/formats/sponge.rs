//! Read-only support for Sponge (WorldEdit `.schem`) schematics, versions 1 and 2.

use crate::block_entity::BlockEntity;
use crate::block_state::BlockState;
use crate::error::{Result, SchematicError};
use crate::formats::manager::SchematicImporter;
use crate::formats::nbt::read_root;
use crate::palette::Palette;
use crate::region::{validate_dimensions, Region};
use quartz_nbt::{NbtCompound, NbtList, NbtTag};
use std::collections::HashMap;
use tracing::{debug, warn};

const MAX_VARINT_BYTES: usize = 5;

pub struct SpongeFormat;

impl SchematicImporter for SpongeFormat {
    fn name(&self) -> String {
        "sponge".to_string()
    }

    fn detect(&self, data: &[u8]) -> bool {
        match read_root(data) {
            Ok(root) => root.contains_key("Palette") && root.contains_key("BlockData"),
            Err(_) => false,
        }
    }

    fn read(&self, data: &[u8]) -> Result<Region> {
        from_sponge(data)
    }
}

fn short_dimension(root: &NbtCompound, key: &str) -> Result<i64> {
    root.get::<_, i16>(key)
        // Stored as a signed short but meant as unsigned.
        .map(|v| v as u16 as i64)
        .map_err(|e| SchematicError::corrupt(format!("missing {}: {}", key, e)))
}

/// Parses a gzip-compressed (or raw) Sponge schematic into a region.
///
/// Gzip input inflating past [`MAX_INFLATED_BYTES`](crate::formats::nbt::MAX_INFLATED_BYTES)
/// is rejected as corrupt.
pub fn from_sponge(data: &[u8]) -> Result<Region> {
    let root = read_root(data)?;

    let version = root.get::<_, i32>("Version").unwrap_or(1);
    if version > 2 {
        return Err(SchematicError::UnsupportedVersion(format!(
            "Sponge schematic version {}",
            version
        )));
    }

    let width = short_dimension(&root, "Width")?;
    let height = short_dimension(&root, "Height")?;
    let depth = short_dimension(&root, "Length")?;
    let volume = validate_dimensions(width, height, depth)?;

    let offset = read_offset(&root);
    let (palette, mapping) = read_palette(&root)?;

    let block_data = root
        .get::<_, &[i8]>("BlockData")
        .map_err(|e| SchematicError::corrupt(format!("missing BlockData: {}", e)))?;
    let blocks = decode_block_data(block_data, volume, &mapping)?;

    let block_entities = read_block_entities(&root)?;

    debug!(
        version,
        width,
        height,
        depth,
        palette = palette.len(),
        block_entities = block_entities.len(),
        "imported Sponge schematic"
    );
    Region::from_parts(
        (width as i32, height as i32, depth as i32),
        offset,
        palette,
        blocks,
        block_entities,
    )
}

fn read_offset(root: &NbtCompound) -> (i32, i32, i32) {
    match root.get::<_, &NbtCompound>("Metadata") {
        Ok(metadata) => (
            metadata.get::<_, i32>("WEOffsetX").unwrap_or(0),
            metadata.get::<_, i32>("WEOffsetY").unwrap_or(0),
            metadata.get::<_, i32>("WEOffsetZ").unwrap_or(0),
        ),
        Err(_) => (0, 0, 0),
    }
}

/// Builds a palette with air at index 0 plus a table from file ids to palette indices.
fn read_palette(root: &NbtCompound) -> Result<(Palette, Vec<u32>)> {
    let nbt_palette = root
        .get::<_, &NbtCompound>("Palette")
        .map_err(|e| SchematicError::corrupt(format!("missing Palette: {}", e)))?;

    let entries = nbt_palette.inner();
    if let Ok(max) = root.get::<_, i32>("PaletteMax") {
        if max < 0 || max as usize != entries.len() {
            return Err(SchematicError::corrupt(format!(
                "PaletteMax {} does not match palette size {}",
                max,
                entries.len()
            )));
        }
    }

    let mut by_id: Vec<Option<BlockState>> = vec![None; entries.len()];
    for (key, tag) in entries.iter() {
        let id = match tag {
            NbtTag::Int(id) if *id >= 0 && (*id as usize) < by_id.len() => *id as usize,
            _ => {
                return Err(SchematicError::corrupt(format!(
                    "palette entry {} has invalid id",
                    key
                )))
            }
        };
        if by_id[id].is_some() {
            return Err(SchematicError::corrupt(format!("palette id {} used twice", id)));
        }
        by_id[id] = Some(key.parse::<BlockState>()?);
    }

    let mut palette = Palette::new();
    let mut mapping = Vec::with_capacity(by_id.len());
    for block in by_id {
        // Ids are unique and in range, so every slot is filled.
        let block = block.ok_or_else(|| SchematicError::corrupt("palette ids are not contiguous"))?;
        mapping.push(palette.intern(&block));
    }
    Ok((palette, mapping))
}

fn decode_block_data(data: &[i8], volume: usize, mapping: &[u32]) -> Result<Vec<u32>> {
    let mut blocks = Vec::with_capacity(volume);
    let mut i = 0;
    while i < data.len() {
        let mut value: u32 = 0;
        let mut length = 0;
        loop {
            let byte = *data
                .get(i)
                .ok_or_else(|| SchematicError::corrupt("BlockData ends inside a varint"))?
                as u8;
            i += 1;
            value |= ((byte & 0x7f) as u32) << (7 * length);
            length += 1;
            if byte & 0x80 == 0 {
                break;
            }
            if length >= MAX_VARINT_BYTES {
                return Err(SchematicError::corrupt("BlockData varint is too long"));
            }
        }

        let index = *mapping.get(value as usize).ok_or_else(|| {
            SchematicError::corrupt(format!("BlockData references unknown palette id {}", value))
        })?;
        if blocks.len() == volume {
            return Err(SchematicError::corrupt("BlockData holds more blocks than the volume"));
        }
        blocks.push(index);
    }

    if blocks.len() != volume {
        return Err(SchematicError::corrupt(format!(
            "BlockData holds {} blocks, expected {}",
            blocks.len(),
            volume
        )));
    }
    Ok(blocks)
}

fn read_block_entities(root: &NbtCompound) -> Result<HashMap<(i32, i32, i32), BlockEntity>> {
    // v2 renamed TileEntities to BlockEntities.
    let list = match root
        .get::<_, &NbtList>("BlockEntities")
        .or_else(|_| root.get::<_, &NbtList>("TileEntities"))
    {
        Ok(list) => list,
        Err(_) => return Ok(HashMap::new()),
    };

    let mut block_entities = HashMap::with_capacity(list.len());
    for tag in list.iter() {
        let NbtTag::Compound(compound) = tag else {
            warn!("skipping non-compound block entity entry");
            continue;
        };
        let (block_entity, pos) = BlockEntity::from_nbt(compound).map_err(SchematicError::corrupt)?;
        if block_entities.insert(pos, block_entity).is_some() {
            return Err(SchematicError::corrupt(format!(
                "duplicate block entity at {:?}",
                pos
            )));
        }
    }
    Ok(block_entities)
}
