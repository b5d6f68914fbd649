//! Rotation, mirroring and translation of regions.
//!
//! Rotations turn clockwise when viewed from above (+Y looking down), which
//! maps a cell `(x, y, z)` of a `w x h x d` region to `(d - 1 - z, y, x)` in
//! the resulting `d x h x w` region. Transforms are applied in a fixed order:
//! rotation, then mirroring, then translation.

use crate::block_state::BlockState;
use crate::error::{Result, SchematicError};
use crate::palette::Palette;
use crate::region::Region;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    None,
    Clockwise90,
    Clockwise180,
    Clockwise270,
}

impl Rotation {
    /// Accepts any multiple of 90, including negative (counter-clockwise) values.
    pub fn from_degrees(degrees: i32) -> Result<Self> {
        if degrees % 90 != 0 {
            return Err(SchematicError::UnsupportedTransform(format!(
                "rotation by {} degrees is not a multiple of 90",
                degrees
            )));
        }
        Ok(Rotation::from_quarter_turns(degrees.rem_euclid(360) / 90))
    }

    pub fn from_quarter_turns(turns: i32) -> Self {
        match turns.rem_euclid(4) {
            0 => Rotation::None,
            1 => Rotation::Clockwise90,
            2 => Rotation::Clockwise180,
            _ => Rotation::Clockwise270,
        }
    }

    pub fn quarter_turns(self) -> i32 {
        match self {
            Rotation::None => 0,
            Rotation::Clockwise90 => 1,
            Rotation::Clockwise180 => 2,
            Rotation::Clockwise270 => 3,
        }
    }

    pub fn degrees(self) -> i32 {
        self.quarter_turns() * 90
    }

    /// Rotation equivalent to applying `self` and then `other`.
    pub fn then(self, other: Rotation) -> Rotation {
        Rotation::from_quarter_turns(self.quarter_turns() + other.quarter_turns())
    }

    fn swaps_horizontal(self) -> bool {
        self.quarter_turns() % 2 == 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// A composed geometric transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transform {
    pub rotation: Rotation,
    pub mirror_x: bool,
    pub mirror_y: bool,
    pub mirror_z: bool,
    /// Accumulated shift, kept wide so composing translations cannot wrap.
    /// [`apply`] rejects a result that does not fit the offset range.
    pub translation: (i64, i64, i64),
}

impl Transform {
    pub fn new() -> Self {
        Transform::default()
    }

    pub fn rotate(mut self, rotation: Rotation) -> Self {
        self.rotation = self.rotation.then(rotation);
        self
    }

    pub fn rotate_degrees(self, degrees: i32) -> Result<Self> {
        Ok(self.rotate(Rotation::from_degrees(degrees)?))
    }

    /// Toggles mirroring on `axis`; mirroring twice cancels out.
    pub fn mirror(mut self, axis: Axis) -> Self {
        match axis {
            Axis::X => self.mirror_x = !self.mirror_x,
            Axis::Y => self.mirror_y = !self.mirror_y,
            Axis::Z => self.mirror_z = !self.mirror_z,
        }
        self
    }

    pub fn translate(mut self, dx: i32, dy: i32, dz: i32) -> Self {
        self.translation = (
            self.translation.0.saturating_add(dx.into()),
            self.translation.1.saturating_add(dy.into()),
            self.translation.2.saturating_add(dz.into()),
        );
        self
    }

    /// True when the transform leaves cell layout untouched (translation only).
    pub fn is_translation_only(&self) -> bool {
        self.rotation == Rotation::None && !self.mirror_x && !self.mirror_y && !self.mirror_z
    }

    /// Dimensions of a `size` region after this transform.
    pub fn transformed_size(&self, size: (i32, i32, i32)) -> (i32, i32, i32) {
        if self.rotation.swaps_horizontal() {
            (size.2, size.1, size.0)
        } else {
            size
        }
    }

    /// Maps a cell of a `size` region to its cell in the transformed region.
    pub fn map_position(
        &self,
        size: (i32, i32, i32),
        (x, y, z): (i32, i32, i32),
    ) -> (i32, i32, i32) {
        let (x, y, z) = self.map_point(size, (x.into(), y.into(), z.into()));
        // Cells map to cells, which fit in the i32 dimensions.
        (x as i32, y as i32, z as i32)
    }

    /// Same mapping for any point, inside the region or not. Offsets follow
    /// the blocks they refer to this way.
    fn map_point(&self, size: (i32, i32, i32), (x, y, z): (i64, i64, i64)) -> (i64, i64, i64) {
        let (w, _, d) = (i64::from(size.0), i64::from(size.1), i64::from(size.2));
        let (rx, ry, rz) = match self.rotation {
            Rotation::None => (x, y, z),
            Rotation::Clockwise90 => (d - 1 - z, y, x),
            Rotation::Clockwise180 => (w - 1 - x, y, d - 1 - z),
            Rotation::Clockwise270 => (z, y, w - 1 - x),
        };
        let (nw, nh, nd) = self.transformed_size(size);
        let (nw, nh, nd) = (i64::from(nw), i64::from(nh), i64::from(nd));
        (
            if self.mirror_x { nw - 1 - rx } else { rx },
            if self.mirror_y { nh - 1 - ry } else { ry },
            if self.mirror_z { nd - 1 - rz } else { rz },
        )
    }
}

/// How a block property's value reacts to rotation and mirroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    /// `north`/`east`/`south`/`west`, plus `up`/`down` which only a Y mirror changes.
    Cardinal,
    /// `x`/`y`/`z`; quarter turns swap `x` and `z`.
    Axis,
    /// Sixteen-step rotation `0..=15`, 0 facing south, increasing clockwise.
    Rotation16,
    /// `top`/`bottom`, swapped by a Y mirror.
    Half,
}

/// Direction remap table keyed by property name.
///
/// Properties not listed here, and values a kind does not recognize, are
/// left untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemapTable {
    pub properties: HashMap<String, PropertyKind>,
}

impl Default for RemapTable {
    fn default() -> Self {
        RemapTable::empty()
            .with("facing", PropertyKind::Cardinal)
            .with("horizontal_facing", PropertyKind::Cardinal)
            .with("axis", PropertyKind::Axis)
            .with("rotation", PropertyKind::Rotation16)
            .with("half", PropertyKind::Half)
    }
}

impl RemapTable {
    pub fn empty() -> Self {
        RemapTable {
            properties: HashMap::new(),
        }
    }

    /// Loads a table such as `{"properties": {"facing": "cardinal"}}`.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn with(mut self, property: impl Into<String>, kind: PropertyKind) -> Self {
        self.properties.insert(property.into(), kind);
        self
    }

    pub fn kind_of(&self, property: &str) -> Option<PropertyKind> {
        self.properties.get(property).copied()
    }

    /// Returns `block` with every known directional property adjusted for `transform`.
    pub fn remap_block(&self, block: &BlockState, transform: &Transform) -> BlockState {
        if block.properties.is_empty() || transform.is_translation_only() {
            return block.clone();
        }
        let mut remapped = block.clone();
        for (key, value) in remapped.properties.iter_mut() {
            if let Some(kind) = self.kind_of(key.as_str()) {
                if let Some(new_value) = remap_value(kind, value.as_str(), transform) {
                    *value = new_value;
                }
            }
        }
        remapped
    }
}

const CARDINALS: [&str; 4] = ["north", "east", "south", "west"];

fn remap_value(kind: PropertyKind, value: &str, transform: &Transform) -> Option<SmolStr> {
    match kind {
        PropertyKind::Cardinal => {
            let mut value = value;
            if let Some(i) = CARDINALS.iter().position(|&c| c == value) {
                let turns = transform.rotation.quarter_turns() as usize;
                value = CARDINALS[(i + turns) % 4];
            }
            value = match value {
                "east" if transform.mirror_x => "west",
                "west" if transform.mirror_x => "east",
                "north" if transform.mirror_z => "south",
                "south" if transform.mirror_z => "north",
                "up" if transform.mirror_y => "down",
                "down" if transform.mirror_y => "up",
                other => other,
            };
            Some(SmolStr::new(value))
        }
        PropertyKind::Axis => match value {
            "x" if transform.rotation.swaps_horizontal() => Some(SmolStr::new("z")),
            "z" if transform.rotation.swaps_horizontal() => Some(SmolStr::new("x")),
            _ => None,
        },
        PropertyKind::Rotation16 => {
            let mut r: i32 = value.parse().ok().filter(|r| (0..16).contains(r))?;
            r = (r + 4 * transform.rotation.quarter_turns()) % 16;
            if transform.mirror_x {
                r = (16 - r) % 16;
            }
            if transform.mirror_z {
                r = (24 - r) % 16;
            }
            Some(SmolStr::new(r.to_string()))
        }
        PropertyKind::Half => match value {
            "top" if transform.mirror_y => Some(SmolStr::new("bottom")),
            "bottom" if transform.mirror_y => Some(SmolStr::new("top")),
            _ => None,
        },
    }
}

/// Produces a transformed copy of `region`. The input is never modified.
pub fn apply(region: &Region, transform: &Transform, table: &RemapTable) -> Result<Region> {
    if transform.is_translation_only() {
        let mut copy = region.clone();
        let (ox, oy, oz) = region.offset();
        let (tx, ty, tz) = transform.translation;
        let (x, y, z) = narrow_offset((i64::from(ox) + tx, i64::from(oy) + ty, i64::from(oz) + tz))?;
        copy.set_offset(x, y, z);
        return Ok(copy);
    }

    let size = region.get_dimensions();
    let new_size = transform.transformed_size(size);
    debug!(
        ?size,
        ?new_size,
        rotation = transform.rotation.degrees(),
        "transforming region"
    );

    // Directional properties are remapped once per palette entry.
    let mut palette = Palette::new();
    let index_map: Vec<u32> = region
        .palette()
        .entries()
        .iter()
        .map(|block| palette.intern(&table.remap_block(block, transform)))
        .collect();

    let (nw, _, nd) = new_size;
    let source = region.blocks();
    let mut blocks = vec![0u32; source.len()];
    for (index, &palette_index) in source.iter().enumerate() {
        let (x, y, z) = transform.map_position(size, region.index_to_coords(index));
        let target = (x + z * nw + y * nw * nd) as usize;
        blocks[target] = index_map[palette_index as usize];
    }

    let block_entities = region
        .block_entities()
        .iter()
        .map(|(&pos, be)| (transform.map_position(size, pos), be.clone()))
        .collect();

    let (ox, oy, oz) = region.offset();
    let (ax, ay, az) = transform.map_point(size, (-i64::from(ox), -i64::from(oy), -i64::from(oz)));
    let (tx, ty, tz) = transform.translation;
    let offset = narrow_offset((tx - ax, ty - ay, tz - az))?;

    Region::from_parts(new_size, offset, palette, blocks, block_entities)
}

fn narrow_offset((x, y, z): (i64, i64, i64)) -> Result<(i32, i32, i32)> {
    match (i32::try_from(x), i32::try_from(y), i32::try_from(z)) {
        (Ok(x), Ok(y), Ok(z)) => Ok((x, y, z)),
        _ => Err(SchematicError::UnsupportedTransform(format!(
            "resulting offset ({}, {}, {}) is outside the i32 range",
            x, y, z
        ))),
    }
}

/// Shifts the placement offset in place; cells are untouched. Fails without
/// changing anything when the new offset would leave the i32 range.
pub fn translate(region: &mut Region, dx: i32, dy: i32, dz: i32) -> Result<()> {
    let (x, y, z) = region.offset();
    let (x, y, z) = narrow_offset((
        i64::from(x) + i64::from(dx),
        i64::from(y) + i64::from(dy),
        i64::from(z) + i64::from(dz),
    ))?;
    region.set_offset(x, y, z);
    Ok(())
}

/// Rotates clockwise about the vertical axis by a multiple of 90 degrees,
/// remapping properties with [`RemapTable::default`].
pub fn rotate_y(region: &Region, degrees: i32) -> Result<Region> {
    let transform = Transform::new().rotate_degrees(degrees)?;
    apply(region, &transform, &RemapTable::default())
}

pub fn mirror(region: &Region, axis: Axis) -> Result<Region> {
    apply(region, &Transform::new().mirror(axis), &RemapTable::default())
}

impl Region {
    pub fn rotate_y(&self, degrees: i32) -> Result<Region> {
        rotate_y(self, degrees)
    }

    pub fn flip(&self, axis: Axis) -> Result<Region> {
        mirror(self, axis)
    }

    pub fn transformed(&self, transform: &Transform, table: &RemapTable) -> Result<Region> {
        apply(self, transform, table)
    }
}
