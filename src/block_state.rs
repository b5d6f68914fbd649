use crate::error::{Result, SchematicError};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

pub const AIR_NAME: &str = "minecraft:air";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockState {
    pub name: SmolStr,
    pub properties: Vec<(SmolStr, SmolStr)>,
}

impl fmt::Display for BlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.properties.is_empty() {
            write!(f, "[")?;
            for (i, (key, value)) in self.properties.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{}={}", key, value)?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

impl Hash for BlockState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        for (k, v) in &self.properties {
            k.hash(state);
            v.hash(state);
        }
    }
}

/// Parses the `namespace:id[key=value,...]` notation used by Sponge palettes
/// and by [`fmt::Display`].
impl FromStr for BlockState {
    type Err = SchematicError;

    fn from_str(input: &str) -> Result<Self> {
        let input = input.trim();
        let Some(open) = input.find('[') else {
            if input.is_empty() {
                return Err(SchematicError::corrupt("empty block state"));
            }
            return Ok(BlockState::new(input));
        };

        let name = &input[..open];
        let rest = &input[open + 1..];
        let body = rest
            .strip_suffix(']')
            .ok_or_else(|| SchematicError::corrupt(format!("unterminated block state: {input}")))?;
        if name.is_empty() {
            return Err(SchematicError::corrupt(format!("missing block name: {input}")));
        }

        let mut block = BlockState::new(name);
        for pair in body.split(',').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                SchematicError::corrupt(format!("malformed property '{pair}' in {input}"))
            })?;
            block.set_property(key.trim(), value.trim());
        }
        Ok(block)
    }
}

impl BlockState {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        BlockState {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    /// The reserved empty block, always palette index 0.
    pub fn air() -> Self {
        BlockState::new(AIR_NAME)
    }

    pub fn is_air(&self) -> bool {
        self.name == AIR_NAME && self.properties.is_empty()
    }

    pub fn get_name(&self) -> &str {
        self.name.as_str()
    }

    pub fn with_property(mut self, key: impl Into<SmolStr>, value: impl Into<SmolStr>) -> Self {
        self.set_property(key, value);
        self
    }

    pub fn with_properties(mut self, properties: Vec<(SmolStr, SmolStr)>) -> Self {
        self.properties = properties;
        self
    }

    pub fn set_property(&mut self, key: impl Into<SmolStr>, value: impl Into<SmolStr>) {
        let key = key.into();
        let value = value.into();
        for (k, v) in &mut self.properties {
            if *k == key {
                *v = value;
                return;
            }
        }
        self.properties.push((key, value));
    }

    pub fn remove_property(&mut self, key: &str) {
        self.properties.retain(|(k, _)| k != key);
    }

    pub fn get_property(&self, key: &str) -> Option<&SmolStr> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}
