//! Read-only support for MCEdit / WorldEdit `.schematic` files (the "Alpha"
//! material set that predates block state palettes).
//!
//! Cells are stored as numeric legacy ids plus a 4-bit data value. Ids above
//! 255 carry their high nibble in `AddBlocks`, two cells per byte: even cells
//! use the low nibble, odd cells the high one. A [`LegacyTable`] turns
//! `(id, data)` pairs into block states.

use crate::block_entity::{BlockEntity, NbtValue};
use crate::block_state::BlockState;
use crate::error::{Result, SchematicError};
use crate::formats::manager::SchematicImporter;
use crate::formats::nbt::read_root;
use crate::palette::{Palette, AIR_INDEX};
use crate::region::{validate_dimensions, Region};
use quartz_nbt::{NbtCompound, NbtList, NbtTag};
use rustc_hash::FxHashMap;
use std::collections::HashMap;
use tracing::{debug, warn};

type LegacyEntry = (u16, Option<u8>, &'static str, &'static [(&'static str, &'static str)]);

/// Ids every pre-flattening build uses. Anything else needs a caller table.
const CLASSIC_BLOCKS: &[LegacyEntry] = &[
    (0, None, "minecraft:air", &[]),
    (1, None, "minecraft:stone", &[]),
    (1, Some(1), "minecraft:granite", &[]),
    (1, Some(2), "minecraft:polished_granite", &[]),
    (1, Some(3), "minecraft:diorite", &[]),
    (1, Some(4), "minecraft:polished_diorite", &[]),
    (1, Some(5), "minecraft:andesite", &[]),
    (1, Some(6), "minecraft:polished_andesite", &[]),
    (2, None, "minecraft:grass_block", &[("snowy", "false")]),
    (3, None, "minecraft:dirt", &[]),
    (3, Some(1), "minecraft:coarse_dirt", &[]),
    (3, Some(2), "minecraft:podzol", &[("snowy", "false")]),
    (4, None, "minecraft:cobblestone", &[]),
    (5, None, "minecraft:oak_planks", &[]),
    (5, Some(1), "minecraft:spruce_planks", &[]),
    (5, Some(2), "minecraft:birch_planks", &[]),
    (5, Some(3), "minecraft:jungle_planks", &[]),
    (5, Some(4), "minecraft:acacia_planks", &[]),
    (5, Some(5), "minecraft:dark_oak_planks", &[]),
    (7, None, "minecraft:bedrock", &[]),
    (8, None, "minecraft:water", &[("level", "0")]),
    (9, None, "minecraft:water", &[("level", "0")]),
    (10, None, "minecraft:lava", &[("level", "0")]),
    (11, None, "minecraft:lava", &[("level", "0")]),
    (12, None, "minecraft:sand", &[]),
    (12, Some(1), "minecraft:red_sand", &[]),
    (13, None, "minecraft:gravel", &[]),
    (14, None, "minecraft:gold_ore", &[]),
    (15, None, "minecraft:iron_ore", &[]),
    (16, None, "minecraft:coal_ore", &[]),
    (17, None, "minecraft:oak_log", &[("axis", "y")]),
    (17, Some(1), "minecraft:spruce_log", &[("axis", "y")]),
    (17, Some(2), "minecraft:birch_log", &[("axis", "y")]),
    (17, Some(3), "minecraft:jungle_log", &[("axis", "y")]),
    (18, None, "minecraft:oak_leaves", &[("persistent", "true")]),
    (20, None, "minecraft:glass", &[]),
    (24, None, "minecraft:sandstone", &[]),
    (35, None, "minecraft:white_wool", &[]),
    (35, Some(1), "minecraft:orange_wool", &[]),
    (35, Some(2), "minecraft:magenta_wool", &[]),
    (35, Some(3), "minecraft:light_blue_wool", &[]),
    (35, Some(4), "minecraft:yellow_wool", &[]),
    (35, Some(5), "minecraft:lime_wool", &[]),
    (35, Some(6), "minecraft:pink_wool", &[]),
    (35, Some(7), "minecraft:gray_wool", &[]),
    (35, Some(8), "minecraft:light_gray_wool", &[]),
    (35, Some(9), "minecraft:cyan_wool", &[]),
    (35, Some(10), "minecraft:purple_wool", &[]),
    (35, Some(11), "minecraft:blue_wool", &[]),
    (35, Some(12), "minecraft:brown_wool", &[]),
    (35, Some(13), "minecraft:green_wool", &[]),
    (35, Some(14), "minecraft:red_wool", &[]),
    (35, Some(15), "minecraft:black_wool", &[]),
    (41, None, "minecraft:gold_block", &[]),
    (42, None, "minecraft:iron_block", &[]),
    (45, None, "minecraft:bricks", &[]),
    (47, None, "minecraft:bookshelf", &[]),
    (48, None, "minecraft:mossy_cobblestone", &[]),
    (49, None, "minecraft:obsidian", &[]),
    (54, None, "minecraft:chest", &[("facing", "north")]),
    (56, None, "minecraft:diamond_ore", &[]),
    (57, None, "minecraft:diamond_block", &[]),
    (58, None, "minecraft:crafting_table", &[]),
    (73, None, "minecraft:redstone_ore", &[("lit", "false")]),
    (79, None, "minecraft:ice", &[]),
    (80, None, "minecraft:snow_block", &[]),
    (82, None, "minecraft:clay", &[]),
    (87, None, "minecraft:netherrack", &[]),
    (88, None, "minecraft:soul_sand", &[]),
    (89, None, "minecraft:glowstone", &[]),
    (98, None, "minecraft:stone_bricks", &[]),
    (98, Some(1), "minecraft:mossy_stone_bricks", &[]),
    (98, Some(2), "minecraft:cracked_stone_bricks", &[]),
    (98, Some(3), "minecraft:chiseled_stone_bricks", &[]),
    (112, None, "minecraft:nether_bricks", &[]),
    (121, None, "minecraft:end_stone", &[]),
    (133, None, "minecraft:emerald_block", &[]),
    (152, None, "minecraft:redstone_block", &[]),
    (155, None, "minecraft:quartz_block", &[]),
    (172, None, "minecraft:terracotta", &[]),
    (173, None, "minecraft:coal_block", &[]),
    (174, None, "minecraft:packed_ice", &[]),
];

/// Maps legacy `(id, data)` pairs to block states.
///
/// A lookup tries the exact pair first, then the id with any data value.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyTable {
    entries: FxHashMap<(u16, Option<u8>), BlockState>,
}

impl Default for LegacyTable {
    fn default() -> Self {
        let mut table = LegacyTable::empty();
        for &(id, data, name, properties) in CLASSIC_BLOCKS {
            let block = properties
                .iter()
                .fold(BlockState::new(name), |block, &(k, v)| block.with_property(k, v));
            table = table.with(id, data, block);
        }
        table
    }
}

impl LegacyTable {
    pub fn empty() -> Self {
        LegacyTable {
            entries: FxHashMap::default(),
        }
    }

    /// Loads a table such as `{"1": "minecraft:stone", "1:1": "minecraft:granite"}`.
    ///
    /// Keys are `id` or `id:data` with data in `0..16`; values use the
    /// `name[key=value,...]` block state syntax.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: HashMap<String, String> = serde_json::from_str(json)
            .map_err(|e| SchematicError::corrupt(format!("invalid legacy table: {}", e)))?;
        let mut table = LegacyTable::empty();
        for (key, value) in raw {
            let (id, data) = parse_key(&key)?;
            table = table.with(id, data, value.parse()?);
        }
        Ok(table)
    }

    /// Adds or replaces a mapping. `data: None` matches any data value.
    pub fn with(mut self, id: u16, data: Option<u8>, block: BlockState) -> Self {
        self.entries.insert((id, data), block);
        self
    }

    /// Entries of `other` win over entries already here.
    pub fn merged(mut self, other: LegacyTable) -> Self {
        self.entries.extend(other.entries);
        self
    }

    pub fn lookup(&self, id: u16, data: u8) -> Option<&BlockState> {
        self.entries
            .get(&(id, Some(data)))
            .or_else(|| self.entries.get(&(id, None)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_key(key: &str) -> Result<(u16, Option<u8>)> {
    let invalid = || SchematicError::corrupt(format!("invalid legacy table key '{}'", key));
    let (id, data) = match key.split_once(':') {
        Some((id, data)) => (id, Some(data)),
        None => (key, None),
    };
    let id = id.trim().parse::<u16>().map_err(|_| invalid())?;
    let data = match data {
        Some(data) => Some(
            data.trim()
                .parse::<u8>()
                .ok()
                .filter(|d| *d < 16)
                .ok_or_else(invalid)?,
        ),
        None => None,
    };
    Ok((id, data))
}

#[derive(Debug, Clone, Default)]
pub struct McEditFormat {
    table: LegacyTable,
}

impl McEditFormat {
    pub fn new(table: LegacyTable) -> Self {
        McEditFormat { table }
    }

    pub fn table(&self) -> &LegacyTable {
        &self.table
    }
}

impl SchematicImporter for McEditFormat {
    fn name(&self) -> String {
        "mcedit".to_string()
    }

    fn detect(&self, data: &[u8]) -> bool {
        match read_root(data) {
            Ok(root) => root.contains_key("Blocks") && root.contains_key("Materials"),
            Err(_) => false,
        }
    }

    fn read(&self, data: &[u8]) -> Result<Region> {
        from_mcedit(data, &self.table)
    }
}

fn short_dimension(root: &NbtCompound, key: &str) -> Result<i64> {
    root.get::<_, i16>(key)
        .map(|v| v as u16 as i64)
        .map_err(|e| SchematicError::corrupt(format!("missing {}: {}", key, e)))
}

fn cell_array<'a>(root: &'a NbtCompound, key: &str, volume: usize) -> Result<&'a [i8]> {
    let values = root
        .get::<_, &[i8]>(key)
        .map_err(|e| SchematicError::corrupt(format!("missing {}: {}", key, e)))?;
    if values.len() != volume {
        return Err(SchematicError::corrupt(format!(
            "{} holds {} entries, expected {}",
            key,
            values.len(),
            volume
        )));
    }
    Ok(values)
}

/// Legacy id of cell `index`, with the high nibble from `AddBlocks`.
fn legacy_id(blocks: &[i8], add_blocks: &[i8], index: usize) -> u16 {
    let low = blocks[index] as u8 as u16;
    let high = match add_blocks.get(index >> 1) {
        Some(&packed) if index & 1 == 0 => packed as u8 as u16 & 0x0F,
        Some(&packed) => (packed as u8 as u16) >> 4,
        None => 0,
    };
    (high << 8) | low
}

/// Parses a gzip-compressed (or raw) MCEdit schematic, resolving legacy ids
/// through `table`. Ids the table does not know become air.
pub fn from_mcedit(data: &[u8], table: &LegacyTable) -> Result<Region> {
    let root = read_root(data)?;

    let materials = root
        .get::<_, &str>("Materials")
        .map_err(|e| SchematicError::corrupt(format!("missing Materials: {}", e)))?;
    if materials != "Alpha" {
        return Err(SchematicError::UnsupportedVersion(format!(
            "MCEdit materials {}",
            materials
        )));
    }

    let width = short_dimension(&root, "Width")?;
    let height = short_dimension(&root, "Height")?;
    let depth = short_dimension(&root, "Length")?;
    let volume = validate_dimensions(width, height, depth)?;

    let ids = cell_array(&root, "Blocks", volume)?;
    let block_data = cell_array(&root, "Data", volume)?;
    let add_blocks = root.get::<_, &[i8]>("AddBlocks").unwrap_or(&[]);
    let offset = (
        root.get::<_, i32>("WEOffsetX").unwrap_or(0),
        root.get::<_, i32>("WEOffsetY").unwrap_or(0),
        root.get::<_, i32>("WEOffsetZ").unwrap_or(0),
    );

    let mut palette = Palette::new();
    let mut resolved: FxHashMap<(u16, u8), Option<u32>> = FxHashMap::default();
    let mut blocks = Vec::with_capacity(volume);
    let mut unknown = 0usize;
    for index in 0..volume {
        let id = legacy_id(ids, add_blocks, index);
        let data = block_data[index] as u8 & 0x0F;
        let entry = *resolved
            .entry((id, data))
            .or_insert_with(|| table.lookup(id, data).map(|block| palette.intern(block)));
        match entry {
            Some(palette_index) => blocks.push(palette_index),
            None => {
                if id != 0 {
                    unknown += 1;
                }
                blocks.push(AIR_INDEX);
            }
        }
    }
    if unknown > 0 {
        let mut ids: Vec<(u16, u8)> = resolved
            .iter()
            .filter(|(key, entry)| key.0 != 0 && entry.is_none())
            .map(|(key, _)| *key)
            .collect();
        ids.sort_unstable();
        warn!(cells = unknown, ?ids, "unknown legacy ids imported as air");
    }

    let block_entities = read_tile_entities(&root)?;

    debug!(
        width,
        height,
        depth,
        palette = palette.len(),
        block_entities = block_entities.len(),
        "imported MCEdit schematic"
    );
    Region::from_parts(
        (width as i32, height as i32, depth as i32),
        offset,
        palette,
        blocks,
        block_entities,
    )
}

/// Tile entities carry their position as separate `x`/`y`/`z` ints.
fn read_tile_entities(root: &NbtCompound) -> Result<HashMap<(i32, i32, i32), BlockEntity>> {
    let Ok(list) = root.get::<_, &NbtList>("TileEntities") else {
        return Ok(HashMap::new());
    };

    let mut block_entities = HashMap::with_capacity(list.len());
    for tag in list.iter() {
        let NbtTag::Compound(compound) = tag else {
            warn!("skipping non-compound tile entity entry");
            continue;
        };
        let id = compound
            .get::<_, &str>("id")
            .map_err(|e| SchematicError::corrupt(format!("tile entity without id: {}", e)))?;
        let coordinate = |axis: &str| {
            compound.get::<_, i32>(axis).map_err(|e| {
                SchematicError::corrupt(format!("tile entity {} without {}: {}", id, axis, e))
            })
        };
        let pos = (coordinate("x")?, coordinate("y")?, coordinate("z")?);
        let nbt = compound
            .inner()
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), "id" | "x" | "y" | "z"))
            .map(|(key, value)| (key.clone(), NbtValue::from_tag(value)))
            .collect();
        let block_entity = BlockEntity {
            id: id.to_string(),
            nbt,
        };
        if block_entities.insert(pos, block_entity).is_some() {
            return Err(SchematicError::corrupt(format!(
                "duplicate tile entity at {:?}",
                pos
            )));
        }
    }
    Ok(block_entities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quartz_nbt::io::Flavor;

    fn encode(root: &NbtCompound) -> Vec<u8> {
        let mut buf = Vec::new();
        quartz_nbt::io::write_nbt(&mut buf, Some("Schematic"), root, Flavor::GzCompressed).unwrap();
        buf
    }

    /// 2x1x2 schematic: stone, id 300 / granite, chest.
    fn sample_root() -> NbtCompound {
        let mut root = NbtCompound::new();
        root.insert("Width", 2i16);
        root.insert("Height", 1i16);
        root.insert("Length", 2i16);
        root.insert("Materials", "Alpha".to_string());
        root.insert("Blocks", NbtTag::ByteArray(vec![1, 44, 1, 54]));
        root.insert("Data", NbtTag::ByteArray(vec![0, 0, 1, 0]));
        // Cell 1 is odd, so its high id nibble sits in the top of byte 0.
        root.insert("AddBlocks", NbtTag::ByteArray(vec![0x10, 0x00]));
        root.insert("WEOffsetX", 4i32);
        root.insert("WEOffsetY", -1i32);
        root.insert("WEOffsetZ", 0i32);

        let mut chest = NbtCompound::new();
        chest.insert("id", "Chest".to_string());
        chest.insert("x", 1i32);
        chest.insert("y", 0i32);
        chest.insert("z", 1i32);
        chest.insert("Lock", "key".to_string());
        let mut tile_entities = NbtList::new();
        tile_entities.push(chest);
        root.insert("TileEntities", tile_entities);
        root
    }

    #[test]
    fn test_import_with_default_table() {
        let data = encode(&sample_root());
        assert!(McEditFormat::default().detect(&data));

        let region = McEditFormat::default().read(&data).unwrap();
        assert_eq!(region.get_dimensions(), (2, 1, 2));
        assert_eq!(region.offset(), (4, -1, 0));
        assert_eq!(region.get_block(0, 0, 0).unwrap().name, "minecraft:stone");
        // Id 300 is not in the default table.
        assert!(region.get_block(1, 0, 0).unwrap().is_air());
        assert_eq!(region.get_block(0, 0, 1).unwrap().name, "minecraft:granite");
        assert_eq!(region.get_block(1, 0, 1).unwrap().name, "minecraft:chest");

        let chest = region.get_block_entity(1, 0, 1).unwrap().unwrap();
        assert_eq!(chest.id, "Chest");
        assert_eq!(chest.nbt.len(), 1);
        assert_eq!(chest.get("Lock"), Some(&NbtValue::String("key".to_string())));
    }

    #[test]
    fn test_caller_table_resolves_extended_ids() {
        let table = LegacyTable::from_json(
            r#"{"300": "mod:widget[powered=true]", "1": "minecraft:stone", "54": "minecraft:chest"}"#,
        )
        .unwrap();
        let region = from_mcedit(&encode(&sample_root()), &table).unwrap();

        let widget = region.get_block(1, 0, 0).unwrap();
        assert_eq!(widget.name, "mod:widget");
        assert_eq!(widget.get_property("powered").map(|v| v.as_str()), Some("true"));
        // No "1:1" entry, so the bare id applies.
        assert_eq!(region.get_block(0, 0, 1).unwrap().name, "minecraft:stone");
    }

    #[test]
    fn test_even_cells_use_low_add_nibble() {
        let mut root = sample_root();
        root.insert("Width", 2i16);
        root.insert("Length", 1i16);
        root.insert("Blocks", NbtTag::ByteArray(vec![5, 5]));
        root.insert("Data", NbtTag::ByteArray(vec![0, 0]));
        root.insert("AddBlocks", NbtTag::ByteArray(vec![0x32]));
        root.insert("TileEntities", NbtList::new());

        let table = LegacyTable::empty()
            .with(0x205, None, BlockState::new("test:even"))
            .with(0x305, None, BlockState::new("test:odd"));
        let region = from_mcedit(&encode(&root), &table).unwrap();
        assert_eq!(region.get_block(0, 0, 0).unwrap().name, "test:even");
        assert_eq!(region.get_block(1, 0, 0).unwrap().name, "test:odd");
    }

    #[test]
    fn test_offsets_are_optional() {
        let mut root = NbtCompound::new();
        for (key, tag) in sample_root().inner() {
            if !key.starts_with("WEOffset") {
                root.insert(key.clone(), tag.clone());
            }
        }
        let region = from_mcedit(&encode(&root), &LegacyTable::default()).unwrap();
        assert_eq!(region.offset(), (0, 0, 0));
    }

    #[test]
    fn test_rejects_other_materials() {
        let mut root = sample_root();
        root.insert("Materials", "Pocket".to_string());
        assert!(matches!(
            from_mcedit(&encode(&root), &LegacyTable::default()),
            Err(SchematicError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn test_rejects_short_arrays() {
        let mut root = sample_root();
        root.insert("Data", NbtTag::ByteArray(vec![0, 0, 0]));
        assert!(matches!(
            from_mcedit(&encode(&root), &LegacyTable::default()),
            Err(SchematicError::CorruptData(_))
        ));
    }

    #[test]
    fn test_rejects_duplicate_tile_entities() {
        let mut root = sample_root();
        let mut tile_entities = NbtList::new();
        for _ in 0..2 {
            let mut sign = NbtCompound::new();
            sign.insert("id", "Sign".to_string());
            sign.insert("x", 0i32);
            sign.insert("y", 0i32);
            sign.insert("z", 0i32);
            tile_entities.push(sign);
        }
        root.insert("TileEntities", tile_entities);
        assert!(matches!(
            from_mcedit(&encode(&root), &LegacyTable::default()),
            Err(SchematicError::CorruptData(_))
        ));
    }

    #[test]
    fn test_legacy_table_keys() {
        assert!(LegacyTable::from_json(r#"{"1:16": "minecraft:stone"}"#).is_err());
        assert!(LegacyTable::from_json(r#"{"stone": "minecraft:stone"}"#).is_err());
        assert!(LegacyTable::from_json(r#"{"1": "minecraft:stone[facing"}"#).is_err());

        let table = LegacyTable::default()
            .merged(LegacyTable::from_json(r#"{"1:1": "test:pink_stone"}"#).unwrap());
        assert_eq!(table.lookup(1, 1).unwrap().name, "test:pink_stone");
        assert_eq!(table.lookup(1, 9).unwrap().name, "minecraft:stone");
        assert_eq!(table.lookup(0, 0), Some(&BlockState::air()));
        assert!(table.lookup(4000, 0).is_none());
    }

    #[test]
    fn test_sponge_input_is_not_detected() {
        let mut root = NbtCompound::new();
        root.insert("Palette", NbtCompound::new());
        root.insert("BlockData", NbtTag::ByteArray(vec![]));
        assert!(!McEditFormat::default().detect(&encode(&root)));
        assert!(!McEditFormat::default().detect(b"not a schematic"));
    }
}
