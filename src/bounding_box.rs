use crate::error::{Result, SchematicError};
use crate::world::ChunkPosition;
use serde::{Deserialize, Serialize};

/// Axis-aligned box with inclusive `min`/`max` corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: (i32, i32, i32),
    pub max: (i32, i32, i32),
}

impl Default for BoundingBox {
    fn default() -> Self {
        BoundingBox::new((0, 0, 0), (0, 0, 0))
    }
}

impl BoundingBox {
    /// Builds a box from any two opposite corners.
    pub fn new(a: (i32, i32, i32), b: (i32, i32, i32)) -> Self {
        BoundingBox {
            min: (a.0.min(b.0), a.1.min(b.1), a.2.min(b.2)),
            max: (a.0.max(b.0), a.1.max(b.1), a.2.max(b.2)),
        }
    }

    /// `size` must be at least 1 on every axis.
    pub fn from_position_and_size(position: (i32, i32, i32), size: (i32, i32, i32)) -> Self {
        BoundingBox {
            min: position,
            max: (
                position.0 + size.0 - 1,
                position.1 + size.1 - 1,
                position.2 + size.2 - 1,
            ),
        }
    }

    pub fn to_position_and_size(&self) -> ((i32, i32, i32), (i32, i32, i32)) {
        (self.min, self.get_dimensions())
    }

    /// Extent on each axis, clamped to `i32::MAX`. Use [`volume`](Self::volume)
    /// to find out whether the box is small enough to hold as a region.
    pub fn get_dimensions(&self) -> (i32, i32, i32) {
        (
            span(self.min.0, self.max.0),
            span(self.min.1, self.max.1),
            span(self.min.2, self.max.2),
        )
    }

    /// Number of cells, or `InvalidDimensions` when it does not fit in an `i32`.
    pub fn volume(&self) -> Result<i32> {
        let width = self.max.0 as i64 - self.min.0 as i64 + 1;
        let height = self.max.1 as i64 - self.min.1 as i64 + 1;
        let depth = self.max.2 as i64 - self.min.2 as i64 + 1;
        width
            .checked_mul(height)
            .and_then(|v| v.checked_mul(depth))
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| SchematicError::dimensions(width, height, depth))
    }

    #[inline(always)]
    pub fn contains(&self, (x, y, z): (i32, i32, i32)) -> bool {
        x >= self.min.0
            && x <= self.max.0
            && y >= self.min.1
            && y <= self.max.1
            && z >= self.min.2
            && z <= self.max.2
    }

    pub fn contains_box(&self, other: &BoundingBox) -> bool {
        self.contains(other.min) && self.contains(other.max)
    }

    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let min = (
            self.min.0.max(other.min.0),
            self.min.1.max(other.min.1),
            self.min.2.max(other.min.2),
        );
        let max = (
            self.max.0.min(other.max.0),
            self.max.1.min(other.max.1),
            self.max.2.min(other.max.2),
        );
        if min.0 > max.0 || min.1 > max.1 || min.2 > max.2 {
            return None;
        }
        Some(BoundingBox { min, max })
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.intersection(other).is_some()
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min: (
                self.min.0.min(other.min.0),
                self.min.1.min(other.min.1),
                self.min.2.min(other.min.2),
            ),
            max: (
                self.max.0.max(other.max.0),
                self.max.1.max(other.max.1),
                self.max.2.max(other.max.2),
            ),
        }
    }

    /// `None` when a corner would leave the i32 coordinate space.
    pub fn translate(&self, dx: i32, dy: i32, dz: i32) -> Option<BoundingBox> {
        Some(BoundingBox {
            min: (
                self.min.0.checked_add(dx)?,
                self.min.1.checked_add(dy)?,
                self.min.2.checked_add(dz)?,
            ),
            max: (
                self.max.0.checked_add(dx)?,
                self.max.1.checked_add(dy)?,
                self.max.2.checked_add(dz)?,
            ),
        })
    }

    /// Linear index of `(x, y, z)`, x fastest, then z, then y.
    #[inline(always)]
    pub fn coords_to_index(&self, x: i32, y: i32, z: i32) -> usize {
        let (w, _, l) = self.get_dimensions();
        let dx = x - self.min.0;
        let dy = y - self.min.1;
        let dz = z - self.min.2;
        (dx + dz * w + dy * w * l) as usize
    }

    #[inline(always)]
    pub fn index_to_coords(&self, index: usize) -> (i32, i32, i32) {
        let (w, _, l) = self.get_dimensions();
        let w = w as usize;
        let wl = w * l as usize;
        let dx = (index % w) as i32;
        let dy = (index / wl) as i32;
        let dz = ((index / w) % l as usize) as i32;
        (dx + self.min.0, dy + self.min.1, dz + self.min.2)
    }

    /// Iterates every coordinate in index order (y, then z, then x).
    pub fn iter(&self) -> impl Iterator<Item = (i32, i32, i32)> {
        let BoundingBox { min, max } = *self;
        (min.1..=max.1).flat_map(move |y| {
            (min.2..=max.2).flat_map(move |z| (min.0..=max.0).map(move |x| (x, y, z)))
        })
    }

    /// Chunk columns (16x16 in X/Z) overlapped by this box, X-major.
    pub fn chunk_span(&self) -> Vec<ChunkPosition> {
        let lower = ChunkPosition::containing(self.min.0, self.min.2);
        let upper = ChunkPosition::containing(self.max.0, self.max.2);
        let mut chunks = Vec::with_capacity(
            ((upper.x - lower.x + 1) as usize) * ((upper.z - lower.z + 1) as usize),
        );
        for x in lower.x..=upper.x {
            for z in lower.z..=upper.z {
                chunks.push(ChunkPosition { x, z });
            }
        }
        chunks
    }
}

fn span(min: i32, max: i32) -> i32 {
    let span = i64::from(max) - i64::from(min) + 1;
    i32::try_from(span).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_corners() {
        let bb = BoundingBox::new((5, -2, 3), (1, 4, -7));
        assert_eq!(bb.min, (1, -2, -7));
        assert_eq!(bb.max, (5, 4, 3));
        assert_eq!(bb.get_dimensions(), (5, 7, 11));
    }

    #[test]
    fn test_volume() {
        assert_eq!(BoundingBox::new((0, 0, 0), (0, 0, 0)).volume().unwrap(), 1);
        assert_eq!(
            BoundingBox::from_position_and_size((3, 3, 3), (2, 3, 4))
                .volume()
                .unwrap(),
            24
        );
    }

    #[test]
    fn test_volume_overflow() {
        let bb = BoundingBox::new((0, 0, 0), (65535, 65535, 65535));
        assert!(matches!(
            bb.volume(),
            Err(SchematicError::InvalidDimensions { .. })
        ));
        let extreme = BoundingBox::new((i32::MIN, 0, 0), (i32::MAX, 0, 0));
        assert!(extreme.volume().is_err());
    }

    #[test]
    fn test_dimensions_of_huge_box_saturate() {
        let bb = BoundingBox::new((0, 0, 0), (i32::MAX, 0, 0));
        assert_eq!(bb.get_dimensions(), (i32::MAX, 1, 1));
        let full = BoundingBox::new((i32::MIN, -1, 0), (i32::MAX, 1, 0));
        assert_eq!(full.get_dimensions(), (i32::MAX, 3, 1));
    }

    #[test]
    fn test_translate_checks_overflow() {
        let bb = BoundingBox::new((0, 0, 0), (3, 3, 3));
        assert_eq!(
            bb.translate(-1, 2, 0),
            Some(BoundingBox::new((-1, 2, 0), (2, 5, 3)))
        );
        assert_eq!(bb.translate(i32::MAX - 2, 0, 0), None);
        assert_eq!(
            bb.translate(0, 0, i32::MIN),
            Some(BoundingBox::new((0, 0, i32::MIN), (3, 3, i32::MIN + 3)))
        );
    }

    #[test]
    fn test_intersection_with_self() {
        let bb = BoundingBox::new((-4, 0, 2), (8, 10, 6));
        assert_eq!(bb.intersection(&bb), Some(bb));
    }

    #[test]
    fn test_intersection_commutative() {
        let a = BoundingBox::new((0, 0, 0), (10, 10, 10));
        let b = BoundingBox::new((5, -5, 8), (15, 3, 20));
        let c = BoundingBox::new((11, 0, 0), (12, 1, 1));

        assert_eq!(a.intersection(&b), b.intersection(&a));
        assert_eq!(
            a.intersection(&b),
            Some(BoundingBox::new((5, 0, 8), (10, 3, 10)))
        );
        assert_eq!(a.intersection(&c), None);
        assert_eq!(c.intersection(&a), None);
    }

    #[test]
    fn test_union_contains_both() {
        let a = BoundingBox::new((0, 0, 0), (2, 2, 2));
        let b = BoundingBox::new((-3, 1, 5), (1, 4, 6));
        let u = a.union(&b);
        assert!(u.contains_box(&a));
        assert!(u.contains_box(&b));
    }

    #[test]
    fn test_index_roundtrip() {
        let bb = BoundingBox::from_position_and_size((-2, 5, 7), (3, 4, 5));
        for (i, pos) in bb.iter().enumerate() {
            assert_eq!(bb.coords_to_index(pos.0, pos.1, pos.2), i);
            assert_eq!(bb.index_to_coords(i), pos);
        }
        assert_eq!(bb.iter().count(), 60);
    }

    #[test]
    fn test_chunk_span() {
        let bb = BoundingBox::new((-1, 0, 0), (16, 0, 15));
        let chunks = bb.chunk_span();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], ChunkPosition { x: -1, z: 0 });
        assert_eq!(chunks[2], ChunkPosition { x: 1, z: 0 });
    }
}
