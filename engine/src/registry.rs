// registry.rs — Block schema registry
//
// Loads descriptor files, builds each block schema once, and indexes it under
// every (block id, revision) key the descriptor lists. Instances are created
// from the shared `Arc<BlockSchema>`.
//
// Registering a descriptor whose fingerprint matches the schema already held
// under its keys is a no-op. A different descriptor under an existing key is
// a conflict.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::descriptor::{Descriptor, DescriptorReadError};
use crate::schema::{load, BlockKey, BlockSchema, SchemaError};

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: DescriptorReadError,
    },

    #[error("{}: {source}", .path.display())]
    Schema { path: PathBuf, source: SchemaError },

    #[error(
        "conflicting descriptors for block {key}: first loaded from {}, redefined in {}",
        .first.display(),
        .second.display()
    )]
    Conflict {
        key: BlockKey,
        first: PathBuf,
        second: PathBuf,
    },
}

// ── Registry ────────────────────────────────────────────────────────────────

struct Entry {
    schema: Arc<BlockSchema>,
    origin: PathBuf,
}

#[derive(Default)]
pub struct SchemaRegistry {
    entries: Vec<Entry>,
    by_key: HashMap<BlockKey, usize>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load one descriptor file and register its schema.
    pub fn load_descriptor(&mut self, path: &Path) -> Result<Arc<BlockSchema>, RegistryError> {
        let descriptor = Descriptor::from_path(path).map_err(|source| RegistryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let result = load(&descriptor);
        for diag in result.diagnostics.iter().filter(|d| !d.is_error()) {
            tracing::warn!(path = %path.display(), "{}", diag);
        }
        let schema = result.schema.ok_or_else(|| RegistryError::Schema {
            path: path.to_path_buf(),
            source: SchemaError {
                block: descriptor.name.clone(),
                diagnostics: result.diagnostics,
            },
        })?;
        self.insert(schema, path)
    }

    /// Load every `*.json` file in `dir`, in file-name order. Returns the
    /// number of files loaded.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, RegistryError> {
        let read_err = |source: std::io::Error| RegistryError::Read {
            path: dir.to_path_buf(),
            source: source.into(),
        };
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(read_err)? {
            let path = entry.map_err(read_err)?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();
        for path in &paths {
            self.load_descriptor(path)?;
        }
        tracing::debug!(dir = %dir.display(), count = paths.len(), "loaded block descriptors");
        Ok(paths.len())
    }

    /// Register a built schema. `origin` names where it came from.
    pub fn insert(
        &mut self,
        schema: BlockSchema,
        origin: &Path,
    ) -> Result<Arc<BlockSchema>, RegistryError> {
        let mut existing = None;
        for key in schema.keys() {
            if let Some(&index) = self.by_key.get(key) {
                let entry = &self.entries[index];
                if entry.schema.fingerprint() != schema.fingerprint() {
                    return Err(RegistryError::Conflict {
                        key: *key,
                        first: entry.origin.clone(),
                        second: origin.to_path_buf(),
                    });
                }
                existing = Some(index);
            }
        }
        if let Some(index) = existing {
            // Identical descriptor: register any keys it adds, keep the first copy.
            for key in schema.keys() {
                self.by_key.entry(*key).or_insert(index);
            }
            return Ok(self.entries[index].schema.clone());
        }

        let index = self.entries.len();
        let schema = Arc::new(schema);
        for key in schema.keys() {
            self.by_key.insert(*key, index);
        }
        tracing::debug!(block = schema.name(), fingerprint = %schema.fingerprint_hex(), "registered block schema");
        self.entries.push(Entry {
            schema: schema.clone(),
            origin: origin.to_path_buf(),
        });
        Ok(schema)
    }

    pub fn lookup(&self, key: BlockKey) -> Option<&Arc<BlockSchema>> {
        self.by_key.get(&key).map(|&index| &self.entries[index].schema)
    }

    /// Schema registered under `name`; the highest revision wins when
    /// several are registered.
    pub fn lookup_name(&self, name: &str) -> Option<&Arc<BlockSchema>> {
        self.entries
            .iter()
            .map(|entry| &entry.schema)
            .filter(|schema| schema.name() == name || schema.instance_name() == name)
            .max_by_key(|schema| schema.keys().iter().map(|k| k.revision).max())
    }

    pub fn schemas(&self) -> impl Iterator<Item = &Arc<BlockSchema>> {
        self.entries.iter().map(|entry| &entry.schema)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn build(json: &str) -> BlockSchema {
        BlockSchema::from_descriptor(&Descriptor::from_json(json).unwrap()).unwrap()
    }

    const V0: &str = r#"{ "name": "Gain", "ids": [{ "id": "B1", "revision": 0 }],
        "args": [{ "name": "g", "type": "int", "value": "1" }] }"#;
    const V0_CHANGED: &str = r#"{ "name": "Gain", "ids": [{ "id": "B1", "revision": 0 }],
        "args": [{ "name": "g", "type": "int", "value": "2" }] }"#;
    const V1: &str = r#"{ "name": "Gain", "ids": [{ "id": "B1", "revision": 1 }],
        "args": [{ "name": "g", "type": "int", "value": "4" }] }"#;

    #[test]
    fn identical_reregistration_is_noop() {
        let mut reg = SchemaRegistry::new();
        let a = reg.insert(build(V0), Path::new("a.json")).unwrap();
        let b = reg.insert(build(V0), Path::new("b.json")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn conflicting_descriptor_rejected() {
        let mut reg = SchemaRegistry::new();
        reg.insert(build(V0), Path::new("a.json")).unwrap();
        let err = reg.insert(build(V0_CHANGED), Path::new("b.json")).unwrap_err();
        match err {
            RegistryError::Conflict { key, first, second } => {
                assert_eq!(key, BlockKey::new(0xB1, 0));
                assert_eq!(first, PathBuf::from("a.json"));
                assert_eq!(second, PathBuf::from("b.json"));
            }
            other => panic!("expected conflict, got: {}", other),
        }
    }

    #[test]
    fn lookup_by_key_and_name() {
        let mut reg = SchemaRegistry::new();
        reg.insert(build(V0), Path::new("a.json")).unwrap();
        reg.insert(build(V1), Path::new("b.json")).unwrap();
        assert_eq!(reg.len(), 2);
        let r0 = reg.lookup(BlockKey::new(0xB1, 0)).unwrap();
        assert_eq!(r0.args()[0].default.to_string(), "1");
        let latest = reg.lookup_name("Gain").unwrap();
        assert_eq!(latest.keys()[0].revision, 1);
        assert!(reg.lookup(BlockKey::new(0xB2, 0)).is_none());
        assert!(reg.lookup_name("Fft").is_none());
    }

    #[test]
    fn load_dir_reports_bad_descriptor() {
        let dir = std::env::temp_dir().join("nocs_registry_bad_descriptor");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.json"), V0).unwrap();
        std::fs::write(
            dir.join("b.json"),
            r#"{ "name": "Bad", "ids": [{ "id": "B2" }],
                 "args": [{ "name": "x", "type": "int", "value": "1", "check": "FROB($x)" }] }"#,
        )
        .unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let mut reg = SchemaRegistry::new();
        let err = reg.load_dir(&dir).unwrap_err();
        match &err {
            RegistryError::Schema { path, source } => {
                assert!(path.ends_with("b.json"));
                assert_eq!(source.block, "Bad");
            }
            other => panic!("expected schema error, got: {}", other),
        }
        assert_eq!(reg.len(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }
}
