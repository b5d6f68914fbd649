pub mod manager;
pub mod mcedit;
pub(crate) mod nbt;
pub mod schem;
pub mod sponge;

pub use manager::{get_manager, FormatManager, SchematicExporter, SchematicImporter};
