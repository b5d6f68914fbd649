//! Writing regions into a [`BlockWorld`] and reading them back out.

use crate::block_state::BlockState;
use crate::bounding_box::BoundingBox;
use crate::error::{Result, SchematicError};
use crate::palette::AIR_INDEX;
use crate::region::Region;
use crate::world::{BlockPosition, BlockWorld, ChunkPosition};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

/// How a region is written into a world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementOptions {
    /// Leave world cells alone where the region holds air.
    #[serde(default)]
    pub skip_air: bool,
    /// Validate every cell before touching the world and abort on any failure.
    #[serde(default)]
    pub atomic: bool,
    #[serde(default = "default_true")]
    pub place_block_entities: bool,
    /// When set, only these states are placed; everything else counts as skipped.
    #[serde(default)]
    pub mask: Option<FxHashSet<BlockState>>,
}

fn default_true() -> bool {
    true
}

impl Default for PlacementOptions {
    fn default() -> Self {
        PlacementOptions {
            skip_air: false,
            atomic: false,
            place_block_entities: default_true(),
            mask: None,
        }
    }
}

impl PlacementOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn skip_air(mut self, skip_air: bool) -> Self {
        self.skip_air = skip_air;
        self
    }

    pub fn atomic(mut self, atomic: bool) -> Self {
        self.atomic = atomic;
        self
    }

    pub fn place_block_entities(mut self, place: bool) -> Self {
        self.place_block_entities = place;
        self
    }

    pub fn with_mask(mut self, states: impl IntoIterator<Item = BlockState>) -> Self {
        self.mask = Some(states.into_iter().collect());
        self
    }

    fn wants(&self, index: u32, block: &BlockState) -> bool {
        if self.skip_air && index == AIR_INDEX {
            return false;
        }
        match &self.mask {
            Some(mask) => mask.contains(block),
            None => true,
        }
    }
}

/// Outcome of a placement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlacementReport {
    /// Blocks the world accepted.
    pub placed: usize,
    pub skipped: usize,
    /// Blocks that were not written, in the order they were attempted.
    ///
    /// Cells whose world position falls outside the i32 coordinate space are
    /// listed first, clamped to the nearest representable position.
    pub failed: Vec<BlockPosition>,
    /// Positions whose block was placed but whose block entity the world refused.
    pub failed_block_entities: Vec<BlockPosition>,
    pub chunks_touched: usize,
}

impl PlacementReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.failed_block_entities.is_empty()
    }

    /// Turns a report with failures into `PlacementFailure`, listing failed
    /// blocks before failed block entities.
    pub fn into_result(self) -> Result<PlacementReport> {
        if self.is_complete() {
            return Ok(self);
        }
        let mut failed = self.failed;
        failed.extend(self.failed_block_entities);
        Err(SchematicError::PlacementFailure { failed })
    }
}

struct PlannedCell {
    local: (i32, i32, i32),
    pos: BlockPosition,
    index: u32,
}

struct Plan {
    /// Cells to write, grouped by chunk column in ascending chunk order.
    /// Within a column they keep storage order (y, z, x).
    chunks: BTreeMap<ChunkPosition, Vec<PlannedCell>>,
    skipped: usize,
    /// Wanted cells with no representable world position.
    unaddressable: Vec<BlockPosition>,
}

fn plan(region: &Region, anchor: BlockPosition, options: &PlacementOptions) -> Result<Plan> {
    let (ox, oy, oz) = region.offset();
    let origin = (
        i64::from(anchor.x) + i64::from(ox),
        i64::from(anchor.y) + i64::from(oy),
        i64::from(anchor.z) + i64::from(oz),
    );
    let palette = region.palette();

    let mut plan = Plan {
        chunks: BTreeMap::new(),
        skipped: 0,
        unaddressable: Vec::new(),
    };
    for (i, &index) in region.blocks().iter().enumerate() {
        let block = palette.resolve(index)?;
        if !options.wants(index, block) {
            plan.skipped += 1;
            continue;
        }
        let local = region.index_to_coords(i);
        let (x, y, z) = (
            origin.0 + i64::from(local.0),
            origin.1 + i64::from(local.1),
            origin.2 + i64::from(local.2),
        );
        match (i32::try_from(x), i32::try_from(y), i32::try_from(z)) {
            (Ok(x), Ok(y), Ok(z)) => {
                let pos = BlockPosition::new(x, y, z);
                plan.chunks
                    .entry(pos.chunk())
                    .or_default()
                    .push(PlannedCell { local, pos, index });
            }
            _ => {
                let pos = BlockPosition::new(clamp(x), clamp(y), clamp(z));
                trace!(?local, "world position out of range");
                plan.unaddressable.push(pos);
            }
        }
    }
    Ok(plan)
}

fn clamp(v: i64) -> i32 {
    v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Writes `region` into `world` with its minimum corner at `anchor + offset`.
///
/// Without `atomic`, cells the world rejects are collected in the report and
/// the rest are still placed. With `atomic`, every cell is checked through
/// [`BlockWorld::can_place`] first and nothing is written if any check fails.
/// The world may change between the two passes; sets that fail anyway are
/// reported like in the non-atomic case.
pub fn place<W: BlockWorld + ?Sized>(
    region: &Region,
    world: &mut W,
    anchor: BlockPosition,
    options: &PlacementOptions,
) -> Result<PlacementReport> {
    let Plan {
        chunks,
        skipped,
        unaddressable,
    } = plan(region, anchor, options)?;
    debug!(
        %anchor,
        chunks = chunks.len(),
        skipped,
        unaddressable = unaddressable.len(),
        atomic = options.atomic,
        "placing region"
    );

    if options.atomic {
        let mut failed = unaddressable.clone();
        for (chunk, cells) in &chunks {
            let loaded = world.is_chunk_loaded(*chunk);
            for cell in cells {
                if let Err(e) = world.can_place(cell.pos, loaded) {
                    trace!(pos = %cell.pos, error = %e, "validation failed");
                    failed.push(cell.pos);
                }
            }
        }
        if !failed.is_empty() {
            warn!(failed = failed.len(), "atomic placement aborted before writing");
            return Err(SchematicError::PlacementFailure { failed });
        }
    }

    let palette = region.palette();
    let mut report = PlacementReport {
        skipped,
        failed: unaddressable,
        chunks_touched: chunks.len(),
        ..Default::default()
    };
    for cells in chunks.values() {
        for cell in cells {
            let block = palette.resolve(cell.index)?;
            if let Err(e) = world.set_block(cell.pos, block) {
                trace!(pos = %cell.pos, error = %e, "world rejected block");
                report.failed.push(cell.pos);
                continue;
            }
            report.placed += 1;

            if !options.place_block_entities {
                continue;
            }
            let (x, y, z) = cell.local;
            if let Some(block_entity) = region.get_block_entity(x, y, z)? {
                if let Err(e) = world.set_block_entity(cell.pos, block_entity) {
                    warn!(pos = %cell.pos, error = %e, "failed to apply block entity");
                    report.failed_block_entities.push(cell.pos);
                }
            }
        }
    }

    if !report.is_complete() {
        warn!(
            placed = report.placed,
            failed = report.failed.len(),
            failed_block_entities = report.failed_block_entities.len(),
            "placement finished with failures"
        );
    }
    Ok(report)
}

/// Whether the placed region would fit inside the world's buildable height
/// and the i32 coordinate space.
pub fn is_placeable<W: BlockWorld + ?Sized>(
    region: &Region,
    world: &W,
    anchor: BlockPosition,
) -> bool {
    let Some(bounds) = region.world_bounds(anchor) else {
        return false;
    };
    match world.height_range() {
        Some((min, max)) => bounds.min.1 >= min && bounds.max.1 < max,
        None => true,
    }
}

/// Captures the cells inside `bounds` into a new region with a zero offset.
///
/// Unreadable cells come back as air. Boxes larger than a region can hold
/// fail with `InvalidDimensions` before the world is read.
pub fn copy_from_world<W: BlockWorld + ?Sized>(world: &W, bounds: &BoundingBox) -> Result<Region> {
    bounds.volume()?;
    let (width, height, depth) = bounds.get_dimensions();
    let mut region = Region::new(width, height, depth)?;
    let (min_x, min_y, min_z) = bounds.min;

    let mut unreadable = 0usize;
    for (x, y, z) in bounds.iter() {
        let pos = BlockPosition::new(x, y, z);
        let (lx, ly, lz) = (x - min_x, y - min_y, z - min_z);
        match world.get_block(pos) {
            Some(block) if !block.is_air() => region.set_block(lx, ly, lz, &block)?,
            Some(_) => {}
            None => unreadable += 1,
        }
        if let Some(block_entity) = world.get_block_entity(pos) {
            region.set_block_entity(lx, ly, lz, block_entity)?;
        }
    }

    debug!(
        width,
        height,
        depth,
        palette = region.palette().len(),
        unreadable,
        "copied region from world"
    );
    Ok(region)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::MemoryWorld;

    fn stone() -> BlockState {
        BlockState::new("minecraft:stone")
    }

    #[test]
    fn test_options_from_json() {
        let options = PlacementOptions::from_json(r#"{"skip_air": true}"#).unwrap();
        assert!(options.skip_air);
        assert!(!options.atomic);
        assert!(options.place_block_entities);
        assert!(options.mask.is_none());

        let masked = PlacementOptions::from_json(
            r#"{"mask": [{"name": "minecraft:stone", "properties": []}]}"#,
        )
        .unwrap();
        assert!(masked.mask.unwrap().contains(&stone()));
    }

    #[test]
    fn test_chunk_grouping_order() {
        let mut region = Region::new(20, 1, 1).unwrap();
        for x in 0..20 {
            region.set_block(x, 0, 0, &stone()).unwrap();
        }
        let Plan {
            chunks,
            skipped,
            unaddressable,
        } = plan(&region, BlockPosition::new(-4, 0, 0), &PlacementOptions::new()).unwrap();
        assert_eq!(skipped, 0);
        assert!(unaddressable.is_empty());
        let keys: Vec<ChunkPosition> = chunks.keys().copied().collect();
        assert_eq!(
            keys,
            vec![ChunkPosition { x: -1, z: 0 }, ChunkPosition { x: 0, z: 0 }]
        );
        assert_eq!(chunks[&ChunkPosition { x: -1, z: 0 }].len(), 4);
        assert_eq!(chunks[&ChunkPosition { x: 0, z: 0 }].len(), 16);
    }

    #[test]
    fn test_mask_limits_placed_states() {
        let mut region = Region::new(3, 1, 1).unwrap();
        region.set_block(0, 0, 0, &stone()).unwrap();
        region
            .set_block(1, 0, 0, &BlockState::new("minecraft:dirt"))
            .unwrap();

        let mut world = MemoryWorld::default();
        world.load_chunk(ChunkPosition { x: 0, z: 0 });
        let options = PlacementOptions::new().with_mask([stone()]);
        let report = place(&region, &mut world, BlockPosition::new(0, 0, 0), &options).unwrap();

        assert_eq!(report.placed, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(world.get_block(BlockPosition::new(1, 0, 0)), Some(BlockState::air()));
    }

    #[test]
    fn test_is_placeable() {
        let region = Region::new(1, 10, 1).unwrap();
        let world = MemoryWorld::new(0, 64);
        assert!(is_placeable(&region, &world, BlockPosition::new(0, 54, 0)));
        assert!(!is_placeable(&region, &world, BlockPosition::new(0, 55, 0)));
        assert!(!is_placeable(&region, &world, BlockPosition::new(0, -1, 0)));

        let mut far = Region::new(2, 1, 1).unwrap();
        far.set_offset(i32::MAX - 1, 0, 0);
        assert!(!is_placeable(&far, &world, BlockPosition::new(1, 10, 0)));
        assert!(is_placeable(&far, &world, BlockPosition::new(-1, 10, 0)));
    }

    #[test]
    fn test_plan_clamps_unaddressable_cells() {
        let mut region = Region::new(3, 1, 1).unwrap();
        region.set_offset(i32::MAX - 1, 0, 0);
        let plan = plan(&region, BlockPosition::new(1, 0, 0), &PlacementOptions::new()).unwrap();

        let placeable: usize = plan.chunks.values().map(Vec::len).sum();
        assert_eq!(placeable, 1);
        assert_eq!(
            plan.unaddressable,
            vec![
                BlockPosition::new(i32::MAX, 0, 0),
                BlockPosition::new(i32::MAX, 0, 0)
            ]
        );
    }

    #[test]
    fn test_report_into_result() {
        let ok = PlacementReport::default();
        assert!(ok.is_complete());
        assert!(ok.into_result().is_ok());

        let failed = PlacementReport {
            failed: vec![BlockPosition::new(1, 2, 3)],
            ..Default::default()
        };
        assert!(matches!(
            failed.into_result(),
            Err(SchematicError::PlacementFailure { failed }) if failed.len() == 1
        ));

        let entity_only = PlacementReport {
            placed: 1,
            failed_block_entities: vec![BlockPosition::new(4, 5, 6)],
            ..Default::default()
        };
        assert!(!entity_only.is_complete());
        assert!(matches!(
            entity_only.into_result(),
            Err(SchematicError::PlacementFailure { failed })
                if failed == vec![BlockPosition::new(4, 5, 6)]
        ));
    }
}
