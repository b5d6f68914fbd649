use crate::block_state::BlockState;
use crate::error::{Result, SchematicError};
use rustc_hash::FxHashMap;

/// Index of the reserved empty block in every palette.
pub const AIR_INDEX: u32 = 0;

/// Deduplicating `index <-> BlockState` table.
///
/// Indices are contiguous and handed out in first-seen order; index 0 is air.
#[derive(Debug, Clone)]
pub struct Palette {
    entries: Vec<BlockState>,
    lookup: FxHashMap<BlockState, u32>,
}

impl Default for Palette {
    fn default() -> Self {
        Palette::new()
    }
}

impl Palette {
    pub fn new() -> Self {
        let air = BlockState::air();
        let mut lookup = FxHashMap::default();
        lookup.insert(air.clone(), AIR_INDEX);
        Palette {
            entries: vec![air],
            lookup,
        }
    }

    /// Rebuilds a palette in the exact order it was stored in.
    ///
    /// The first entry must be air and no state may appear twice.
    pub fn from_entries(entries: Vec<BlockState>) -> Result<Self> {
        match entries.first() {
            None => return Err(SchematicError::corrupt("palette is empty")),
            Some(first) if !first.is_air() => {
                return Err(SchematicError::corrupt(format!(
                    "palette index 0 must be air, found {}",
                    first
                )))
            }
            Some(_) => {}
        }

        let mut lookup = FxHashMap::default();
        lookup.reserve(entries.len());
        for (index, block) in entries.iter().enumerate() {
            if lookup.insert(block.clone(), index as u32).is_some() {
                return Err(SchematicError::corrupt(format!(
                    "duplicate palette entry {}",
                    block
                )));
            }
        }
        Ok(Palette { entries, lookup })
    }

    pub fn intern(&mut self, block: &BlockState) -> u32 {
        if let Some(&index) = self.lookup.get(block) {
            return index;
        }
        let index = self.entries.len() as u32;
        self.entries.push(block.clone());
        self.lookup.insert(block.clone(), index);
        index
    }

    pub fn resolve(&self, index: u32) -> Result<&BlockState> {
        self.entries
            .get(index as usize)
            .ok_or(SchematicError::OutOfRange {
                index,
                len: self.entries.len(),
            })
    }

    pub fn index_of(&self, block: &BlockState) -> Option<u32> {
        self.lookup.get(block).copied()
    }

    pub fn contains_index(&self, index: u32) -> bool {
        (index as usize) < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Never true for a palette built through this type; air is always present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &BlockState)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, block)| (index as u32, block))
    }

    pub fn entries(&self) -> &[BlockState] {
        &self.entries
    }

    /// Smallest fixed integer width (1, 2 or 4 bytes) that addresses every entry.
    pub fn index_width(&self) -> u8 {
        index_width_for(self.entries.len())
    }
}

pub(crate) fn index_width_for(len: usize) -> u8 {
    if len <= u8::MAX as usize + 1 {
        1
    } else if len <= u16::MAX as usize + 1 {
        2
    } else {
        4
    }
}
