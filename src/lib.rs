//! Schematic engine: palette-compressed block regions, a compact binary
//! codec, geometric transforms with block state remapping, and chunk-grouped
//! placement into a host world.

mod block_entity;
mod block_state;
pub mod bounding_box;
mod error;
pub mod formats;
mod palette;
pub mod placement;
mod region;
pub mod transforms;
pub mod world;

pub use block_entity::{BlockEntity, NbtValue};
pub use block_state::{BlockState, AIR_NAME};
pub use bounding_box::BoundingBox;
pub use error::{Result, SchematicError};
pub use formats::schem::{from_bytes, load_from_file, read_from, save_to_file, to_bytes, write_to};
pub use palette::{Palette, AIR_INDEX};
pub use placement::{copy_from_world, is_placeable, place, PlacementOptions, PlacementReport};
pub use region::{Region, MAX_DIMENSION};
pub use transforms::{Axis, PropertyKind, RemapTable, Rotation, Transform};
pub use world::{BlockPosition, BlockWorld, ChunkPosition, MemoryWorld, WorldError};
