use quartz_nbt::{NbtCompound, NbtList, NbtTag};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Structured value stored in block entity payloads.
///
/// `Boolean` has no NBT tag of its own and is written as a `Byte`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum NbtValue {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Boolean(bool),
    ByteArray(Vec<i8>),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
    List(Vec<NbtValue>),
    Compound(HashMap<String, NbtValue>),
}

impl NbtValue {
    pub(crate) fn from_tag(tag: &NbtTag) -> NbtValue {
        match tag {
            NbtTag::Byte(b) => NbtValue::Byte(*b),
            NbtTag::Short(s) => NbtValue::Short(*s),
            NbtTag::Int(i) => NbtValue::Int(*i),
            NbtTag::Long(l) => NbtValue::Long(*l),
            NbtTag::Float(f) => NbtValue::Float(*f),
            NbtTag::Double(d) => NbtValue::Double(*d),
            NbtTag::String(s) => NbtValue::String(s.clone()),
            NbtTag::ByteArray(arr) => NbtValue::ByteArray(arr.clone()),
            NbtTag::IntArray(arr) => NbtValue::IntArray(arr.clone()),
            NbtTag::LongArray(arr) => NbtValue::LongArray(arr.clone()),
            NbtTag::List(list) => NbtValue::List(list.iter().map(NbtValue::from_tag).collect()),
            NbtTag::Compound(compound) => NbtValue::Compound(map_from_compound(compound)),
        }
    }

    pub fn to_tag(&self) -> NbtTag {
        match self {
            NbtValue::Byte(b) => NbtTag::Byte(*b),
            NbtValue::Short(s) => NbtTag::Short(*s),
            NbtValue::Int(i) => NbtTag::Int(*i),
            NbtValue::Long(l) => NbtTag::Long(*l),
            NbtValue::Float(f) => NbtTag::Float(*f),
            NbtValue::Double(d) => NbtTag::Double(*d),
            NbtValue::String(s) => NbtTag::String(s.clone()),
            NbtValue::Boolean(b) => NbtTag::Byte(if *b { 1 } else { 0 }),
            NbtValue::ByteArray(arr) => NbtTag::ByteArray(arr.clone()),
            NbtValue::IntArray(arr) => NbtTag::IntArray(arr.clone()),
            NbtValue::LongArray(arr) => NbtTag::LongArray(arr.clone()),
            NbtValue::List(list) => {
                NbtTag::List(NbtList::from(list.iter().map(NbtValue::to_tag).collect::<Vec<_>>()))
            }
            NbtValue::Compound(map) => NbtTag::Compound(compound_from_map(map)),
        }
    }
}

/// Builds a compound with keys inserted in sorted order, so that writing it
/// is deterministic.
pub(crate) fn compound_from_map(map: &HashMap<String, NbtValue>) -> NbtCompound {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    let mut compound = NbtCompound::new();
    for key in keys {
        compound.insert(key.clone(), map[key].to_tag());
    }
    compound
}

pub(crate) fn map_from_compound(compound: &NbtCompound) -> HashMap<String, NbtValue> {
    compound
        .inner()
        .iter()
        .map(|(key, value)| (key.clone(), NbtValue::from_tag(value)))
        .collect()
}

/// Auxiliary data attached to a single cell (container contents, sign text, ...).
///
/// Block entities carry no position of their own: the owning region keys them
/// by local coordinate, so transforms only have to move the map key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockEntity {
    pub id: String,
    pub nbt: HashMap<String, NbtValue>,
}

impl BlockEntity {
    pub fn new(id: impl Into<String>) -> Self {
        BlockEntity {
            id: id.into(),
            nbt: HashMap::new(),
        }
    }

    pub fn with_nbt_data(mut self, key: impl Into<String>, value: NbtValue) -> Self {
        self.nbt.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&NbtValue> {
        self.nbt.get(key)
    }

    /// Reads a Sponge-style block entity compound, returning the entity and its
    /// `Pos` triple. Everything other than `Id`/`id` and `Pos` becomes payload.
    pub fn from_nbt(nbt: &NbtCompound) -> Result<(Self, (i32, i32, i32)), String> {
        let id = match nbt.get::<_, &str>("Id") {
            Ok(id) => id.to_string(),
            Err(_) => nbt
                .get::<_, &str>("id")
                .map_err(|e| format!("Failed to get block entity id: {}", e))?
                .to_string(),
        };

        let pos = nbt
            .get::<_, &[i32]>("Pos")
            .map_err(|e| format!("Failed to get block entity position: {}", e))?;
        if pos.len() != 3 {
            return Err(format!("Invalid block entity position length: {}", pos.len()));
        }

        let nbt_map = nbt
            .inner()
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), "Id" | "id" | "Pos"))
            .map(|(key, value)| (key.clone(), NbtValue::from_tag(value)))
            .collect();

        Ok((BlockEntity { id, nbt: nbt_map }, (pos[0], pos[1], pos[2])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_block_entity() {
        let chest = BlockEntity::new("minecraft:chest")
            .with_nbt_data("CustomName", NbtValue::String("Loot".to_string()));
        assert_eq!(chest.id, "minecraft:chest");
        assert_eq!(
            chest.get("CustomName"),
            Some(&NbtValue::String("Loot".to_string()))
        );
    }

    #[test]
    fn test_from_nbt_strips_id_and_pos() {
        let mut compound = NbtCompound::new();
        compound.insert("Id", "minecraft:sign".to_string());
        compound.insert("Pos", NbtTag::IntArray(vec![1, 2, 3]));
        compound.insert("Text1", "hello".to_string());

        let (be, pos) = BlockEntity::from_nbt(&compound).unwrap();
        assert_eq!(be.id, "minecraft:sign");
        assert_eq!(pos, (1, 2, 3));
        assert_eq!(be.nbt.len(), 1);
        assert_eq!(be.get("Text1"), Some(&NbtValue::String("hello".to_string())));
    }

    #[test]
    fn test_compound_keys_are_sorted() {
        let mut map = HashMap::new();
        map.insert("zeta".to_string(), NbtValue::Int(1));
        map.insert("alpha".to_string(), NbtValue::Boolean(true));
        map.insert("mid".to_string(), NbtValue::List(vec![NbtValue::Short(4)]));

        let compound = compound_from_map(&map);
        let keys: Vec<&str> = compound.inner().keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["alpha", "mid", "zeta"]);

        let back = map_from_compound(&compound);
        assert_eq!(back["alpha"], NbtValue::Byte(1));
        assert_eq!(back["mid"], NbtValue::List(vec![NbtValue::Short(4)]));
    }

    #[test]
    fn test_from_nbt_requires_position() {
        let mut compound = NbtCompound::new();
        compound.insert("Id", "minecraft:sign".to_string());
        assert!(BlockEntity::from_nbt(&compound).is_err());
    }
}
