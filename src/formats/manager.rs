use crate::error::{Result, SchematicError};
use crate::region::Region;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::debug;

pub trait SchematicImporter: Send + Sync {
    fn name(&self) -> String;
    fn detect(&self, data: &[u8]) -> bool;
    fn read(&self, data: &[u8]) -> Result<Region>;
}

pub trait SchematicExporter: Send + Sync {
    fn name(&self) -> String;
    fn extensions(&self) -> Vec<String>;
    fn write(&self, region: &Region) -> Result<Vec<u8>>;
}

pub struct FormatManager {
    importers: Vec<Box<dyn SchematicImporter>>,
    exporters: Vec<Box<dyn SchematicExporter>>,
}

impl Default for FormatManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatManager {
    pub fn new() -> Self {
        Self {
            importers: Vec::new(),
            exporters: Vec::new(),
        }
    }

    /// Importers are consulted in registration order.
    pub fn register_importer<I: SchematicImporter + 'static>(&mut self, importer: I) {
        self.importers.push(Box::new(importer));
    }

    pub fn register_exporter<E: SchematicExporter + 'static>(&mut self, exporter: E) {
        self.exporters.push(Box::new(exporter));
    }

    pub fn detect_format(&self, data: &[u8]) -> Option<String> {
        self.importers
            .iter()
            .find(|importer| importer.detect(data))
            .map(|importer| importer.name())
    }

    pub fn read(&self, data: &[u8]) -> Result<Region> {
        for importer in &self.importers {
            if importer.detect(data) {
                debug!(format = %importer.name(), bytes = data.len(), "reading schematic");
                return importer.read(data);
            }
        }
        Err(SchematicError::UnsupportedVersion("unknown format".to_string()))
    }

    pub fn write(&self, format: &str, region: &Region) -> Result<Vec<u8>> {
        for exporter in &self.exporters {
            if exporter.name().eq_ignore_ascii_case(format) {
                return exporter.write(region);
            }
        }
        Err(SchematicError::UnsupportedVersion(format!(
            "unsupported export format: {}",
            format
        )))
    }

    /// Picks the exporter from the file extension of `path`.
    pub fn write_auto(&self, path: &str, region: &Region) -> Result<Vec<u8>> {
        let extension = std::path::Path::new(path)
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();

        for exporter in &self.exporters {
            if exporter.extensions().contains(&extension) {
                return exporter.write(region);
            }
        }
        Err(SchematicError::UnsupportedVersion(format!(
            "no exporter for extension .{}",
            extension
        )))
    }

    pub fn list_importers(&self) -> Vec<String> {
        self.importers.iter().map(|i| i.name()).collect()
    }

    pub fn list_exporters(&self) -> Vec<String> {
        self.exporters.iter().map(|e| e.name()).collect()
    }
}

pub static MANAGER: OnceLock<Arc<Mutex<FormatManager>>> = OnceLock::new();

pub fn get_manager() -> Arc<Mutex<FormatManager>> {
    MANAGER
        .get_or_init(|| {
            let mut manager = FormatManager::new();
            manager.register_importer(crate::formats::schem::ScafFormat);
            manager.register_exporter(crate::formats::schem::ScafFormat);
            // NBT-based detection parses the document, so it goes after the magic-byte check.
            manager.register_importer(crate::formats::sponge::SpongeFormat);
            manager.register_importer(crate::formats::mcedit::McEditFormat::default());
            Arc::new(Mutex::new(manager))
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_state::BlockState;

    #[test]
    fn test_registered_formats() {
        let manager = get_manager();
        let manager = manager.lock().unwrap();
        assert_eq!(manager.list_importers(), vec!["scaf", "sponge", "mcedit"]);
        assert_eq!(manager.list_exporters(), vec!["scaf"]);
    }

    #[test]
    fn test_write_auto_and_read_back() {
        let mut region = Region::new(2, 2, 2).unwrap();
        region
            .set_block(1, 1, 1, &BlockState::new("minecraft:glass"))
            .unwrap();

        let manager = get_manager();
        let manager = manager.lock().unwrap();
        let bytes = manager.write_auto("build/tower.SCAF", &region).unwrap();
        assert_eq!(manager.detect_format(&bytes).as_deref(), Some("scaf"));
        assert_eq!(manager.read(&bytes).unwrap(), region);
    }

    #[test]
    fn test_unknown_input() {
        let manager = get_manager();
        let manager = manager.lock().unwrap();
        assert_eq!(manager.detect_format(b"hello"), None);
        assert!(matches!(
            manager.read(b"hello"),
            Err(SchematicError::UnsupportedVersion(_))
        ));
        assert!(manager.write("litematic", &Region::new(1, 1, 1).unwrap()).is_err());
        assert!(manager
            .write_auto("out.nbt", &Region::new(1, 1, 1).unwrap())
            .is_err());
    }
}
