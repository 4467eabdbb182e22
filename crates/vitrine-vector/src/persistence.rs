//! Persistence for the vector store.
//!
//! A persisted store is a directory holding two files:
//!
//! - `products.index`: the serialized ANN index (rkyv for [`FlatIndex`])
//! - `metadata.json`: the product table, tombstones, dimension, build
//!   timestamp, backend name, and a Blake3 hash of the index bytes
//!
//! Both files are written to temporary names and renamed into place: the
//! index first, then the metadata. If a write is interrupted between the
//! two renames, the staged `metadata.json.tmp` still matches the new index
//! and loading picks it up.
//!
//! Loading never fails. Anything missing, unreadable, or inconsistent
//! produces an empty store and a warning, so a service can always start.

use std::collections::{BTreeSet, HashMap};
use std::ffi::OsString;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vitrine_core::{Error, ProductRecord, Result};

use crate::ann::{AnnIndex, FlatIndex};
use crate::store::VectorStore;
use crate::types::VectorConfig;

/// File name of the serialized index.
pub const INDEX_FILE: &str = "products.index";

/// File name of the metadata sidecar.
pub const METADATA_FILE: &str = "metadata.json";

/// Suffix of files staged for an atomic rename.
const STAGING_SUFFIX: &str = "tmp";

/// Sidecar stored next to the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Embedding dimension.
    pub dimension: usize,

    /// Build timestamp.
    pub built_at: chrono::DateTime<chrono::Utc>,

    /// Index backend name.
    pub backend: String,

    /// Blake3 hash of the index file.
    pub content_hash: String,

    /// Product table, slot order.
    pub records: Vec<ProductRecord>,

    /// Tombstoned slots.
    #[serde(default)]
    pub tombstones: Vec<usize>,
}

/// Save index metadata to a JSON file.
pub fn save_metadata(metadata_path: &Path, metadata: &IndexMetadata) -> Result<()> {
    let json = serde_json::to_string_pretty(metadata)?;
    write_synced(metadata_path, json.as_bytes())
}

/// Path a file is staged under before being renamed to `path`.
pub fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".");
    name.push(STAGING_SUFFIX);
    path.with_file_name(name)
}

/// Write `bytes` to `path` and flush them to disk.
fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| Error::io_with_path(e, path))?;
    file.write_all(bytes).map_err(|e| Error::io_with_path(e, path))?;
    file.sync_all().map_err(|e| Error::io_with_path(e, path))?;
    Ok(())
}

fn rename(from: &Path, to: &Path) -> Result<()> {
    std::fs::rename(from, to).map_err(|e| Error::io_with_path(e, to))
}

/// Make completed renames in `dir` durable. Best effort.
fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}

/// Load index metadata from a JSON file.
pub fn load_metadata(metadata_path: &Path) -> Result<IndexMetadata> {
    let json = std::fs::read_to_string(metadata_path)
        .map_err(|e| Error::io_with_path(e, metadata_path))?;
    let metadata: IndexMetadata = serde_json::from_str(&json)?;
    Ok(metadata)
}

/// Blake3 hex digest of raw bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

impl VectorStore {
    /// Write the store to `dir`, creating it if needed.
    pub fn persist(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| Error::io_with_path(e, dir))?;

        let bytes = self.index.to_bytes()?;
        let index_path = dir.join(INDEX_FILE);
        let metadata_path = dir.join(METADATA_FILE);
        let metadata = IndexMetadata {
            dimension: self.config.dimension,
            built_at: chrono::Utc::now(),
            backend: self.index.name().to_string(),
            content_hash: content_hash(&bytes),
            records: self.records.clone(),
            tombstones: self.tombstones.iter().copied().collect(),
        };

        let staged_metadata = staging_path(&metadata_path);
        let staged_index = staging_path(&index_path);
        save_metadata(&staged_metadata, &metadata)?;
        write_synced(&staged_index, &bytes)?;
        rename(&staged_index, &index_path)?;
        rename(&staged_metadata, &metadata_path)?;
        sync_dir(dir);

        log::info!(
            "Persisted {} products ({} slots) to {}",
            self.len(),
            self.records.len(),
            dir.display()
        );
        Ok(())
    }

    /// Load a store from `dir`, or an empty one if that is not possible.
    pub fn load(dir: impl AsRef<Path>, config: VectorConfig) -> Self {
        let dir = dir.as_ref();
        match Self::try_load(dir, config.clone()) {
            Ok(store) => {
                log::info!(
                    "Loaded {} products from {}",
                    store.len(),
                    dir.display()
                );
                store
            }
            Err(e) => {
                log::warn!(
                    "Could not load vector index from {}: {e}; starting empty",
                    dir.display()
                );
                Self::new(config)
            }
        }
    }

    /// Load a store from `dir`, reporting why it could not be loaded.
    pub fn try_load(dir: impl AsRef<Path>, config: VectorConfig) -> Result<Self> {
        let dir = dir.as_ref();
        let index_path = dir.join(INDEX_FILE);
        let bytes = std::fs::read(&index_path).map_err(|e| Error::io_with_path(e, &index_path))?;
        let metadata = matching_metadata(dir, &bytes)?;

        if metadata.dimension != config.dimension {
            return Err(Error::dimension(config.dimension, metadata.dimension));
        }
        if metadata.backend != "flat" {
            return Err(Error::invalid_data(format!(
                "unsupported index backend '{}'",
                metadata.backend
            )));
        }

        let mut index = FlatIndex::new(config.dimension);
        index.restore(&bytes)?;
        if index.len() != metadata.records.len() {
            return Err(Error::invalid_data(format!(
                "index holds {} vectors but metadata lists {} records",
                index.len(),
                metadata.records.len()
            )));
        }

        let slots = metadata.records.len();
        let tombstones: BTreeSet<usize> = metadata.tombstones.into_iter().collect();
        if tombstones.iter().any(|&pos| pos >= slots) {
            return Err(Error::invalid_data("tombstone refers to a missing slot"));
        }

        let mut id_map = HashMap::with_capacity(slots);
        for (position, record) in metadata.records.iter().enumerate() {
            if tombstones.contains(&position) {
                continue;
            }
            if id_map.insert(record.id.clone(), position).is_some() {
                return Err(Error::invalid_data(format!(
                    "duplicate live product id '{}'",
                    record.id
                )));
            }
        }

        Ok(Self {
            config,
            index: Box::new(index),
            records: metadata.records,
            tombstones,
            id_map,
        })
    }
}

/// The metadata describing `index_bytes`: the live sidecar, or the staged
/// one left behind by an interrupted [`VectorStore::persist`].
fn matching_metadata(dir: &Path, index_bytes: &[u8]) -> Result<IndexMetadata> {
    let hash = content_hash(index_bytes);
    let metadata_path = dir.join(METADATA_FILE);
    let live = load_metadata(&metadata_path);
    if let Ok(metadata) = &live
        && metadata.content_hash == hash
    {
        return live;
    }

    let staged_path = staging_path(&metadata_path);
    if let Ok(staged) = load_metadata(&staged_path)
        && staged.content_hash == hash
    {
        log::warn!(
            "Index in {} was written without its metadata; using {}",
            dir.display(),
            staged_path.display()
        );
        return Ok(staged);
    }

    live?;
    Err(Error::invalid_data("index content hash does not match metadata"))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SearchFilters;
    use tempfile::tempdir;

    fn sample_store() -> VectorStore {
        let mut store = VectorStore::new(VectorConfig::with_dimension(2));
        store
            .insert(
                &[1.0, 0.0],
                ProductRecord::new("a", "Alpha").with_text_embedding(vec![1.0, 0.0]),
            )
            .unwrap();
        store.insert(&[0.0, 1.0], ProductRecord::new("b", "Beta")).unwrap();
        store.insert(&[0.6, 0.8], ProductRecord::new("c", "Gamma")).unwrap();
        store.remove("b").unwrap();
        store
    }

    #[test]
    fn test_persist_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let original = sample_store();
        original.persist(dir.path()).unwrap();

        assert!(dir.path().join(INDEX_FILE).exists());
        assert!(dir.path().join(METADATA_FILE).exists());

        let loaded = VectorStore::try_load(dir.path(), VectorConfig::with_dimension(2)).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.tombstone_count(), 1);
        assert!(!loaded.contains("b"));
        assert_eq!(
            loaded.get_by_id("a").unwrap().text_embedding.as_deref(),
            Some(&[1.0, 0.0][..])
        );

        let hits = loaded.search(&[1.0, 0.0], 2, &SearchFilters::none()).unwrap();
        assert_eq!(hits[0].record.id, "a");
        assert_eq!(hits[1].record.id, "c");
    }

    #[test]
    fn test_metadata_records_build_info() {
        let dir = tempdir().unwrap();
        sample_store().persist(dir.path()).unwrap();

        let metadata = load_metadata(&dir.path().join(METADATA_FILE)).unwrap();
        assert_eq!(metadata.dimension, 2);
        assert_eq!(metadata.backend, "flat");
        assert_eq!(metadata.records.len(), 3);
        assert_eq!(metadata.tombstones, vec![1]);
        assert_eq!(metadata.content_hash.len(), 64);
    }

    #[test]
    fn test_load_missing_directory_is_empty() {
        let dir = tempdir().unwrap();
        let store = VectorStore::load(dir.path().join("nope"), VectorConfig::with_dimension(2));
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_corrupt_index_is_empty() {
        let dir = tempdir().unwrap();
        sample_store().persist(dir.path()).unwrap();
        std::fs::write(dir.path().join(INDEX_FILE), b"garbage").unwrap();

        assert!(VectorStore::try_load(dir.path(), VectorConfig::with_dimension(2)).is_err());
        let store = VectorStore::load(dir.path(), VectorConfig::with_dimension(2));
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_invalid_metadata_is_empty() {
        let dir = tempdir().unwrap();
        sample_store().persist(dir.path()).unwrap();
        std::fs::write(dir.path().join(METADATA_FILE), "not valid json").unwrap();

        let store = VectorStore::load(dir.path(), VectorConfig::with_dimension(2));
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_dimension_change_is_empty() {
        let dir = tempdir().unwrap();
        sample_store().persist(dir.path()).unwrap();

        let err = VectorStore::try_load(dir.path(), VectorConfig::with_dimension(4)).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
        assert!(VectorStore::load(dir.path(), VectorConfig::with_dimension(4)).is_empty());
    }

    #[test]
    fn test_load_inconsistent_record_count() {
        let dir = tempdir().unwrap();
        sample_store().persist(dir.path()).unwrap();

        let path = dir.path().join(METADATA_FILE);
        let mut metadata = load_metadata(&path).unwrap();
        metadata.records.pop();
        metadata.tombstones.clear();
        save_metadata(&path, &metadata).unwrap();

        assert!(VectorStore::try_load(dir.path(), VectorConfig::with_dimension(2)).is_err());
    }

    #[test]
    fn test_persist_leaves_no_staged_files() {
        let dir = tempdir().unwrap();
        sample_store().persist(dir.path()).unwrap();
        sample_store().persist(dir.path()).unwrap();

        assert!(!staging_path(&dir.path().join(INDEX_FILE)).exists());
        assert!(!staging_path(&dir.path().join(METADATA_FILE)).exists());
        assert_eq!(
            staging_path(&dir.path().join(METADATA_FILE)),
            dir.path().join("metadata.json.tmp")
        );
    }

    #[test]
    fn test_load_recovers_interrupted_persist() {
        let dir = tempdir().unwrap();
        sample_store().persist(dir.path()).unwrap();

        // A second persist that renamed the index but not the metadata.
        let mut grown = sample_store();
        grown.insert(&[0.0, 1.0], ProductRecord::new("d", "Delta")).unwrap();
        let staging = tempdir().unwrap();
        grown.persist(staging.path()).unwrap();
        std::fs::copy(staging.path().join(INDEX_FILE), dir.path().join(INDEX_FILE)).unwrap();
        std::fs::copy(
            staging.path().join(METADATA_FILE),
            staging_path(&dir.path().join(METADATA_FILE)),
        )
        .unwrap();

        let loaded = VectorStore::try_load(dir.path(), VectorConfig::with_dimension(2)).unwrap();
        assert_eq!(loaded.len(), 3);
        assert!(loaded.contains("d"));
    }

    #[test]
    fn test_load_prefers_live_metadata_over_stale_staging() {
        let dir = tempdir().unwrap();
        sample_store().persist(dir.path()).unwrap();
        // A persist interrupted before the index rename.
        std::fs::write(staging_path(&dir.path().join(METADATA_FILE)), "{}").unwrap();

        let loaded = VectorStore::try_load(dir.path(), VectorConfig::with_dimension(2)).unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn test_load_hash_mismatch_without_staging() {
        let dir = tempdir().unwrap();
        sample_store().persist(dir.path()).unwrap();
        let mut other = sample_store();
        other.insert(&[0.0, 1.0], ProductRecord::new("d", "Delta")).unwrap();
        std::fs::write(dir.path().join(INDEX_FILE), other.index.to_bytes().unwrap()).unwrap();

        let err = VectorStore::try_load(dir.path(), VectorConfig::with_dimension(2)).unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn test_save_metadata_invalid_path() {
        let path = Path::new("/nonexistent/dir/metadata.json");
        let metadata = IndexMetadata {
            dimension: 2,
            built_at: chrono::Utc::now(),
            backend: "flat".into(),
            content_hash: String::new(),
            records: Vec::new(),
            tombstones: Vec::new(),
        };
        assert!(save_metadata(path, &metadata).is_err());
    }
}
