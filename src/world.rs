use crate::block_entity::BlockEntity;
use crate::block_state::BlockState;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Side length of a chunk column in X and Z.
pub const CHUNK_SIZE: i32 = 16;

/// Absolute block coordinate in a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPosition {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPosition {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        BlockPosition { x, y, z }
    }

    /// `None` when the shifted position leaves the i32 coordinate space.
    pub fn checked_offset(&self, dx: i32, dy: i32, dz: i32) -> Option<Self> {
        Some(BlockPosition::new(
            self.x.checked_add(dx)?,
            self.y.checked_add(dy)?,
            self.z.checked_add(dz)?,
        ))
    }

    pub fn chunk(&self) -> ChunkPosition {
        ChunkPosition::containing(self.x, self.z)
    }
}

impl From<(i32, i32, i32)> for BlockPosition {
    fn from((x, y, z): (i32, i32, i32)) -> Self {
        BlockPosition::new(x, y, z)
    }
}

impl fmt::Display for BlockPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Chunk column coordinate (block coordinate divided by 16, rounded down).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkPosition {
    pub x: i32,
    pub z: i32,
}

impl ChunkPosition {
    pub fn containing(block_x: i32, block_z: i32) -> Self {
        ChunkPosition {
            x: block_x.div_euclid(CHUNK_SIZE),
            z: block_z.div_euclid(CHUNK_SIZE),
        }
    }
}

impl fmt::Display for ChunkPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.x, self.z)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    #[error("Chunk {0} is not loaded")]
    ChunkNotLoaded(ChunkPosition),
    #[error("Position {0} is outside the world")]
    OutOfWorld(BlockPosition),
    #[error("World rejected block at {0}: {1}")]
    Rejected(BlockPosition, String),
}

/// Capabilities a host world must expose for copy and placement.
///
/// The world is shared with other actors, so nothing here promises that a
/// read stays valid until the next call.
pub trait BlockWorld {
    /// Current block, or `None` if the position cannot be read (unloaded, ungenerated).
    fn get_block(&self, pos: BlockPosition) -> Option<BlockState>;

    fn set_block(&mut self, pos: BlockPosition, block: &BlockState) -> Result<(), WorldError>;

    fn is_chunk_loaded(&self, chunk: ChunkPosition) -> bool;

    fn get_block_entity(&self, _pos: BlockPosition) -> Option<BlockEntity> {
        None
    }

    fn set_block_entity(
        &mut self,
        _pos: BlockPosition,
        _block_entity: &BlockEntity,
    ) -> Result<(), WorldError> {
        Ok(())
    }

    /// Buildable Y range as `(min, max)` with `max` exclusive; `None` means unbounded.
    fn height_range(&self) -> Option<(i32, i32)> {
        None
    }

    /// Dry-run check used by atomic placement. `chunk_loaded` is the cached
    /// chunk status so callers can avoid one lookup per block.
    fn can_place(&self, pos: BlockPosition, chunk_loaded: bool) -> Result<(), WorldError> {
        if !chunk_loaded {
            return Err(WorldError::ChunkNotLoaded(pos.chunk()));
        }
        match self.height_range() {
            Some((min, max)) if pos.y < min || pos.y >= max => Err(WorldError::OutOfWorld(pos)),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct ChunkColumn {
    blocks: FxHashMap<(i32, i32, i32), BlockState>,
    block_entities: FxHashMap<(i32, i32, i32), BlockEntity>,
}

/// Chunk-partitioned world held entirely in memory.
///
/// Only explicitly loaded chunks accept writes; reads from unloaded chunks
/// return `None`. Useful for tests and for hosts that stage edits offline.
#[derive(Debug, Clone)]
pub struct MemoryWorld {
    chunks: FxHashMap<ChunkPosition, ChunkColumn>,
    min_y: i32,
    max_y: i32,
    rejected: FxHashSet<BlockPosition>,
    pub set_calls: usize,
}

impl Default for MemoryWorld {
    fn default() -> Self {
        MemoryWorld::new(-64, 320)
    }
}

impl MemoryWorld {
    pub fn new(min_y: i32, max_y: i32) -> Self {
        MemoryWorld {
            chunks: FxHashMap::default(),
            min_y,
            max_y,
            rejected: FxHashSet::default(),
            set_calls: 0,
        }
    }

    pub fn load_chunk(&mut self, chunk: ChunkPosition) {
        self.chunks.entry(chunk).or_default();
    }

    /// Loads every chunk column overlapped by the given box.
    pub fn load_area(&mut self, bounds: &crate::BoundingBox) {
        for chunk in bounds.chunk_span() {
            self.load_chunk(chunk);
        }
    }

    /// Drops the chunk and everything stored in it.
    pub fn unload_chunk(&mut self, chunk: ChunkPosition) {
        self.chunks.remove(&chunk);
    }

    /// Makes `set_block` fail at this position regardless of chunk state.
    pub fn reject(&mut self, pos: BlockPosition) {
        self.rejected.insert(pos);
    }

    pub fn loaded_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Number of non-air blocks stored across all loaded chunks.
    pub fn block_count(&self) -> usize {
        self.chunks.values().map(|c| c.blocks.len()).sum()
    }

    fn key(pos: BlockPosition) -> (i32, i32, i32) {
        (pos.x, pos.y, pos.z)
    }
}

impl BlockWorld for MemoryWorld {
    fn get_block(&self, pos: BlockPosition) -> Option<BlockState> {
        let chunk = self.chunks.get(&pos.chunk())?;
        Some(
            chunk
                .blocks
                .get(&Self::key(pos))
                .cloned()
                .unwrap_or_else(BlockState::air),
        )
    }

    fn set_block(&mut self, pos: BlockPosition, block: &BlockState) -> Result<(), WorldError> {
        self.set_calls += 1;
        if self.rejected.contains(&pos) {
            return Err(WorldError::Rejected(pos, "position is protected".to_string()));
        }
        if pos.y < self.min_y || pos.y >= self.max_y {
            return Err(WorldError::OutOfWorld(pos));
        }
        let chunk = self
            .chunks
            .get_mut(&pos.chunk())
            .ok_or(WorldError::ChunkNotLoaded(pos.chunk()))?;

        let key = Self::key(pos);
        chunk.block_entities.remove(&key);
        if block.is_air() {
            chunk.blocks.remove(&key);
        } else {
            chunk.blocks.insert(key, block.clone());
        }
        Ok(())
    }

    fn is_chunk_loaded(&self, chunk: ChunkPosition) -> bool {
        self.chunks.contains_key(&chunk)
    }

    fn get_block_entity(&self, pos: BlockPosition) -> Option<BlockEntity> {
        self.chunks
            .get(&pos.chunk())?
            .block_entities
            .get(&Self::key(pos))
            .cloned()
    }

    fn set_block_entity(
        &mut self,
        pos: BlockPosition,
        block_entity: &BlockEntity,
    ) -> Result<(), WorldError> {
        let chunk = self
            .chunks
            .get_mut(&pos.chunk())
            .ok_or(WorldError::ChunkNotLoaded(pos.chunk()))?;
        chunk
            .block_entities
            .insert(Self::key(pos), block_entity.clone());
        Ok(())
    }

    fn height_range(&self) -> Option<(i32, i32)> {
        Some((self.min_y, self.max_y))
    }

    fn can_place(&self, pos: BlockPosition, chunk_loaded: bool) -> Result<(), WorldError> {
        if self.rejected.contains(&pos) {
            return Err(WorldError::Rejected(pos, "position is protected".to_string()));
        }
        if !chunk_loaded {
            return Err(WorldError::ChunkNotLoaded(pos.chunk()));
        }
        if pos.y < self.min_y || pos.y >= self.max_y {
            return Err(WorldError::OutOfWorld(pos));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_of_negative_coordinates() {
        assert_eq!(ChunkPosition::containing(-1, -16), ChunkPosition { x: -1, z: -1 });
        assert_eq!(ChunkPosition::containing(-17, 15), ChunkPosition { x: -2, z: 0 });
        assert_eq!(ChunkPosition::containing(16, 31), ChunkPosition { x: 1, z: 1 });
    }

    #[test]
    fn test_memory_world_requires_loaded_chunk() {
        let mut world = MemoryWorld::default();
        let pos = BlockPosition::new(3, 64, 3);
        let stone = BlockState::new("minecraft:stone");

        assert_eq!(world.get_block(pos), None);
        assert_eq!(
            world.set_block(pos, &stone),
            Err(WorldError::ChunkNotLoaded(ChunkPosition { x: 0, z: 0 }))
        );

        world.load_chunk(pos.chunk());
        assert_eq!(world.get_block(pos), Some(BlockState::air()));
        world.set_block(pos, &stone).unwrap();
        assert_eq!(world.get_block(pos), Some(stone));
        assert_eq!(world.set_calls, 2);
    }

    #[test]
    fn test_memory_world_height_limits() {
        let mut world = MemoryWorld::new(0, 256);
        world.load_chunk(ChunkPosition { x: 0, z: 0 });
        let stone = BlockState::new("minecraft:stone");
        assert!(world.set_block(BlockPosition::new(0, 255, 0), &stone).is_ok());
        assert_eq!(
            world.set_block(BlockPosition::new(0, 256, 0), &stone),
            Err(WorldError::OutOfWorld(BlockPosition::new(0, 256, 0)))
        );
        assert!(world.set_block(BlockPosition::new(0, -1, 0), &stone).is_err());
    }

    #[test]
    fn test_setting_block_clears_block_entity() {
        let mut world = MemoryWorld::default();
        let pos = BlockPosition::new(0, 0, 0);
        world.load_chunk(pos.chunk());
        world
            .set_block(pos, &BlockState::new("minecraft:chest"))
            .unwrap();
        world
            .set_block_entity(pos, &BlockEntity::new("minecraft:chest"))
            .unwrap();
        assert!(world.get_block_entity(pos).is_some());

        world.set_block(pos, &BlockState::air()).unwrap();
        assert!(world.get_block_entity(pos).is_none());
        assert_eq!(world.block_count(), 0);
    }
}
