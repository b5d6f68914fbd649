use crate::block_entity::BlockEntity;
use crate::block_state::BlockState;
use crate::bounding_box::BoundingBox;
use crate::error::{Result, SchematicError};
use crate::palette::{Palette, AIR_INDEX};
use crate::world::BlockPosition;
use std::collections::HashMap;

/// Largest extent the schematic format can express on any axis.
pub const MAX_DIMENSION: i32 = u16::MAX as i32;

/// Palette-compressed block storage for a bounded box.
///
/// Coordinates are local: `(0, 0, 0)` is the minimum corner and every axis
/// runs to `dimension - 1`. `offset` is added to the caller's anchor when the
/// region is placed into a world.
#[derive(Debug, Clone)]
pub struct Region {
    size: (i32, i32, i32),
    offset: (i32, i32, i32),
    palette: Palette,
    blocks: Vec<u32>,
    block_entities: HashMap<(i32, i32, i32), BlockEntity>,

    // ── Cached fields for hot-path indexing ──
    bbox: BoundingBox,
    cached_width: i32,
    cached_width_x_depth: i32,
}

pub(crate) fn validate_dimensions(width: i64, height: i64, depth: i64) -> Result<usize> {
    let limit = MAX_DIMENSION as i64;
    let in_range = |v: i64| (1..=limit).contains(&v);
    if !(in_range(width) && in_range(height) && in_range(depth)) {
        return Err(SchematicError::dimensions(width, height, depth));
    }
    let volume = width * height * depth;
    if volume > i32::MAX as i64 {
        return Err(SchematicError::dimensions(width, height, depth));
    }
    Ok(volume as usize)
}

impl Region {
    /// Creates an all-air region. Every axis must be in `1..=65535` and the
    /// volume must fit in an `i32`.
    pub fn new(width: i32, height: i32, depth: i32) -> Result<Self> {
        let volume = validate_dimensions(width as i64, height as i64, depth as i64)?;
        Ok(Region::from_validated(
            (width, height, depth),
            Palette::new(),
            vec![AIR_INDEX; volume],
        ))
    }

    fn from_validated(size: (i32, i32, i32), palette: Palette, blocks: Vec<u32>) -> Self {
        let bbox = BoundingBox::from_position_and_size((0, 0, 0), size);
        Region {
            size,
            offset: (0, 0, 0),
            palette,
            blocks,
            block_entities: HashMap::new(),
            bbox,
            cached_width: size.0,
            cached_width_x_depth: size.0 * size.2,
        }
    }

    /// Assembles a region from decoded parts, checking every storage invariant.
    pub(crate) fn from_parts(
        size: (i32, i32, i32),
        offset: (i32, i32, i32),
        palette: Palette,
        blocks: Vec<u32>,
        block_entities: HashMap<(i32, i32, i32), BlockEntity>,
    ) -> Result<Self> {
        let volume = validate_dimensions(size.0 as i64, size.1 as i64, size.2 as i64)?;
        if blocks.len() != volume {
            return Err(SchematicError::corrupt(format!(
                "expected {} block indices, found {}",
                volume,
                blocks.len()
            )));
        }
        if let Some(&bad) = blocks.iter().find(|&&i| !palette.contains_index(i)) {
            return Err(SchematicError::corrupt(format!(
                "block index {} exceeds palette size {}",
                bad,
                palette.len()
            )));
        }

        let mut region = Region::from_validated(size, palette, blocks);
        for &(x, y, z) in block_entities.keys() {
            if !region.is_in_region(x, y, z) {
                return Err(SchematicError::corrupt(format!(
                    "block entity at ({}, {}, {}) lies outside the region",
                    x, y, z
                )));
            }
        }
        region.block_entities = block_entities;
        region.offset = offset;
        Ok(region)
    }

    #[inline(always)]
    pub fn coords_to_index(&self, x: i32, y: i32, z: i32) -> usize {
        (x + z * self.cached_width + y * self.cached_width_x_depth) as usize
    }

    #[inline(always)]
    pub fn index_to_coords(&self, index: usize) -> (i32, i32, i32) {
        self.bbox.index_to_coords(index)
    }

    #[inline(always)]
    pub fn is_in_region(&self, x: i32, y: i32, z: i32) -> bool {
        self.bbox.contains((x, y, z))
    }

    fn checked_index(&self, x: i32, y: i32, z: i32) -> Result<usize> {
        if !self.is_in_region(x, y, z) {
            return Err(SchematicError::OutOfBounds { x, y, z });
        }
        Ok(self.coords_to_index(x, y, z))
    }

    pub fn get_block(&self, x: i32, y: i32, z: i32) -> Result<&BlockState> {
        let index = self.checked_index(x, y, z)?;
        self.palette.resolve(self.blocks[index])
    }

    pub fn set_block(&mut self, x: i32, y: i32, z: i32, block: &BlockState) -> Result<()> {
        let index = self.checked_index(x, y, z)?;
        self.blocks[index] = self.palette.intern(block);
        Ok(())
    }

    pub fn get_block_index(&self, x: i32, y: i32, z: i32) -> Result<u32> {
        let index = self.checked_index(x, y, z)?;
        Ok(self.blocks[index])
    }

    /// Writes a raw palette index; the index must already exist in the palette.
    pub fn set_block_index(&mut self, x: i32, y: i32, z: i32, palette_index: u32) -> Result<()> {
        let index = self.checked_index(x, y, z)?;
        if !self.palette.contains_index(palette_index) {
            return Err(SchematicError::OutOfRange {
                index: palette_index,
                len: self.palette.len(),
            });
        }
        self.blocks[index] = palette_index;
        Ok(())
    }

    pub fn get_block_entity(&self, x: i32, y: i32, z: i32) -> Result<Option<&BlockEntity>> {
        self.checked_index(x, y, z)?;
        Ok(self.block_entities.get(&(x, y, z)))
    }

    /// Attaches auxiliary data to a cell, returning whatever was there before.
    pub fn set_block_entity(
        &mut self,
        x: i32,
        y: i32,
        z: i32,
        block_entity: BlockEntity,
    ) -> Result<Option<BlockEntity>> {
        self.checked_index(x, y, z)?;
        Ok(self.block_entities.insert((x, y, z), block_entity))
    }

    pub fn remove_block_entity(&mut self, x: i32, y: i32, z: i32) -> Result<Option<BlockEntity>> {
        self.checked_index(x, y, z)?;
        Ok(self.block_entities.remove(&(x, y, z)))
    }

    pub fn block_entities(&self) -> &HashMap<(i32, i32, i32), BlockEntity> {
        &self.block_entities
    }

    /// Block entities ordered by (y, z, x), the same order cells are stored in.
    pub fn sorted_block_entities(&self) -> Vec<((i32, i32, i32), &BlockEntity)> {
        let mut entries: Vec<_> = self
            .block_entities
            .iter()
            .map(|(&pos, be)| (pos, be))
            .collect();
        entries.sort_by_key(|&((x, y, z), _)| (y, z, x));
        entries
    }

    pub fn offset(&self) -> (i32, i32, i32) {
        self.offset
    }

    pub fn set_offset(&mut self, x: i32, y: i32, z: i32) {
        self.offset = (x, y, z);
    }

    pub fn get_dimensions(&self) -> (i32, i32, i32) {
        self.size
    }

    pub fn volume(&self) -> usize {
        self.blocks.len()
    }

    /// Local bounds, always anchored at the origin.
    pub fn get_bounding_box(&self) -> BoundingBox {
        self.bbox
    }

    /// World-space box this region occupies when placed at `anchor`, or
    /// `None` if part of it falls outside the i32 coordinate space.
    pub fn world_bounds(&self, anchor: BlockPosition) -> Option<BoundingBox> {
        let origin = anchor.checked_offset(self.offset.0, self.offset.1, self.offset.2)?;
        self.bbox.translate(origin.x, origin.y, origin.z)
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn blocks(&self) -> &[u32] {
        &self.blocks
    }

    /// Every cell with its resolved state, in storage order.
    pub fn iter_blocks(&self) -> impl Iterator<Item = ((i32, i32, i32), &BlockState)> + '_ {
        let entries = self.palette.entries();
        self.blocks
            .iter()
            .enumerate()
            .map(move |(index, &p)| (self.index_to_coords(index), &entries[p as usize]))
    }

    pub fn count_non_air(&self) -> usize {
        self.blocks.iter().filter(|&&b| b != AIR_INDEX).count()
    }

    pub fn count_block_types(&self) -> HashMap<BlockState, usize> {
        let mut counts = vec![0usize; self.palette.len()];
        for &b in &self.blocks {
            counts[b as usize] += 1;
        }
        self.palette
            .iter()
            .filter(|&(index, _)| counts[index as usize] > 0)
            .map(|(index, block)| (block.clone(), counts[index as usize]))
            .collect()
    }
}

/// Regions compare by content: same dimensions, offset, resolved state per
/// cell and block entities. Palette order is irrelevant.
impl PartialEq for Region {
    fn eq(&self, other: &Self) -> bool {
        if self.size != other.size
            || self.offset != other.offset
            || self.block_entities != other.block_entities
        {
            return false;
        }
        let ours = self.palette.entries();
        let theirs = other.palette.entries();
        self.blocks
            .iter()
            .zip(&other.blocks)
            .all(|(&a, &b)| ours[a as usize] == theirs[b as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_entity::NbtValue;

    #[test]
    fn test_region_creation() {
        let region = Region::new(2, 3, 4).unwrap();
        assert_eq!(region.get_dimensions(), (2, 3, 4));
        assert_eq!(region.volume(), 24);
        assert_eq!(region.palette().len(), 1);
        assert!(region.blocks().iter().all(|&b| b == AIR_INDEX));
        assert_eq!(region.count_non_air(), 0);
    }

    #[test]
    fn test_invalid_dimensions() {
        assert!(matches!(
            Region::new(0, 1, 1),
            Err(SchematicError::InvalidDimensions { .. })
        ));
        assert!(Region::new(1, -3, 1).is_err());
        assert!(Region::new(MAX_DIMENSION + 1, 1, 1).is_err());
        assert!(matches!(
            Region::new(MAX_DIMENSION, MAX_DIMENSION, MAX_DIMENSION),
            Err(SchematicError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_set_and_get_block() {
        let mut region = Region::new(2, 2, 2).unwrap();
        let stone = BlockState::new("minecraft:stone");

        region.set_block(0, 0, 0, &stone).unwrap();
        assert_eq!(region.get_block(0, 0, 0).unwrap(), &stone);
        assert!(region.get_block(1, 1, 1).unwrap().is_air());
        assert!(matches!(
            region.get_block(2, 2, 2),
            Err(SchematicError::OutOfBounds { x: 2, y: 2, z: 2 })
        ));
        assert!(region.set_block(-1, 0, 0, &stone).is_err());
    }

    #[test]
    fn test_set_block_interns_once() {
        let mut region = Region::new(4, 1, 1).unwrap();
        let stone = BlockState::new("minecraft:stone");
        for x in 0..4 {
            region.set_block(x, 0, 0, &stone).unwrap();
        }
        assert_eq!(region.palette().len(), 2);
        assert_eq!(region.count_non_air(), 4);
    }

    #[test]
    fn test_set_block_index_validates_palette() {
        let mut region = Region::new(1, 1, 1).unwrap();
        assert!(matches!(
            region.set_block_index(0, 0, 0, 3),
            Err(SchematicError::OutOfRange { index: 3, len: 1 })
        ));
        region.set_block_index(0, 0, 0, AIR_INDEX).unwrap();
    }

    #[test]
    fn test_coords_to_index() {
        let region = Region::new(3, 4, 5).unwrap();
        assert_eq!(region.coords_to_index(0, 0, 0), 0);
        assert_eq!(region.coords_to_index(1, 0, 0), 1);
        assert_eq!(region.coords_to_index(0, 0, 1), 3);
        assert_eq!(region.coords_to_index(0, 1, 0), 15);
        assert_eq!(region.index_to_coords(59), (2, 3, 4));
    }

    #[test]
    fn test_block_entities() {
        let mut region = Region::new(2, 2, 2).unwrap();
        let chest = BlockEntity::new("minecraft:chest")
            .with_nbt_data("Lock", NbtValue::String("key".to_string()));

        assert!(region.set_block_entity(1, 1, 1, chest.clone()).unwrap().is_none());
        assert_eq!(region.get_block_entity(1, 1, 1).unwrap(), Some(&chest));
        assert_eq!(region.get_block_entity(0, 0, 0).unwrap(), None);
        assert!(region
            .set_block_entity(2, 0, 0, BlockEntity::new("minecraft:chest"))
            .is_err());

        assert_eq!(region.remove_block_entity(1, 1, 1).unwrap(), Some(chest));
        assert!(region.block_entities().is_empty());
    }

    #[test]
    fn test_count_block_types() {
        let mut region = Region::new(3, 1, 1).unwrap();
        let stone = BlockState::new("minecraft:stone");
        region.set_block(0, 0, 0, &stone).unwrap();
        region.set_block(2, 0, 0, &stone).unwrap();

        let counts = region.count_block_types();
        assert_eq!(counts.get(&stone), Some(&2));
        assert_eq!(counts.get(&BlockState::air()), Some(&1));
    }

    #[test]
    fn test_equality_ignores_palette_order() {
        let stone = BlockState::new("minecraft:stone");
        let dirt = BlockState::new("minecraft:dirt");

        let mut a = Region::new(2, 1, 1).unwrap();
        a.set_block(0, 0, 0, &stone).unwrap();
        a.set_block(1, 0, 0, &dirt).unwrap();

        let mut b = Region::new(2, 1, 1).unwrap();
        b.set_block(1, 0, 0, &dirt).unwrap();
        b.set_block(0, 0, 0, &stone).unwrap();

        assert_ne!(a.palette().entries(), b.palette().entries());
        assert_eq!(a, b);

        b.set_offset(1, 0, 0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_from_parts_validation() {
        let palette = Palette::new();
        assert!(matches!(
            Region::from_parts((2, 1, 1), (0, 0, 0), palette.clone(), vec![0], HashMap::new()),
            Err(SchematicError::CorruptData(_))
        ));
        assert!(matches!(
            Region::from_parts((1, 1, 1), (0, 0, 0), palette.clone(), vec![5], HashMap::new()),
            Err(SchematicError::CorruptData(_))
        ));

        let mut entities = HashMap::new();
        entities.insert((1, 0, 0), BlockEntity::new("minecraft:chest"));
        assert!(matches!(
            Region::from_parts((1, 1, 1), (0, 0, 0), palette, vec![0], entities),
            Err(SchematicError::CorruptData(_))
        ));
    }

    #[test]
    fn test_world_bounds_applies_offset() {
        let mut region = Region::new(3, 2, 1).unwrap();
        region.set_offset(-1, 0, 2);
        let bounds = region.world_bounds(BlockPosition::new(10, 64, 10)).unwrap();
        assert_eq!(bounds.min, (9, 64, 12));
        assert_eq!(bounds.max, (11, 65, 12));

        region.set_offset(i32::MAX - 1, 0, 0);
        assert_eq!(region.world_bounds(BlockPosition::new(0, 0, 0)), None);
        assert_eq!(region.world_bounds(BlockPosition::new(1, 0, 0)), None);
        assert!(region.world_bounds(BlockPosition::new(-2, 0, 0)).is_some());
    }
}
