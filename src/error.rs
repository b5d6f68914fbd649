use crate::world::BlockPosition;

/// Error type shared by the palette, region, codec, transform and placement code.
#[derive(Debug, thiserror::Error)]
pub enum SchematicError {
    #[error("Coordinate ({x}, {y}, {z}) is outside the region")]
    OutOfBounds { x: i32, y: i32, z: i32 },
    #[error("Palette index {index} out of range (palette has {len} entries)")]
    OutOfRange { index: u32, len: usize },
    #[error("Unsupported schematic version: {0}")]
    UnsupportedVersion(String),
    #[error("Invalid dimensions {width}x{height}x{depth}")]
    InvalidDimensions { width: i64, height: i64, depth: i64 },
    #[error("Corrupt schematic data: {0}")]
    CorruptData(String),
    #[error("Unsupported transform: {0}")]
    UnsupportedTransform(String),
    #[error("Placement failed for {} block(s)", failed.len())]
    PlacementFailure { failed: Vec<BlockPosition> },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SchematicError {
    pub(crate) fn corrupt(message: impl Into<String>) -> Self {
        SchematicError::CorruptData(message.into())
    }

    pub(crate) fn dimensions(width: i64, height: i64, depth: i64) -> Self {
        SchematicError::InvalidDimensions {
            width,
            height,
            depth,
        }
    }
}

pub type Result<T> = std::result::Result<T, SchematicError>;
