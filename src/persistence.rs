//! Layout persistence
//!
//! Two small maps survive between sessions, both keyed by the bound root
//! type name: the set of expanded qualified paths, and the favorites map
//! from qualified path to sort index. Stores are injected into the tree;
//! nothing here is global.

use crate::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Qualified path to favorite sort index; `None` marks a not-yet-placed favorite
pub type FavoritesMap = BTreeMap<String, Option<u32>>;

/// Backing store for per-type layout state
pub trait LayoutStore: Send {
    /// Expanded paths saved for a type, `None` if nothing was ever saved
    fn expanded_paths(&self, type_name: &str) -> Option<Vec<String>>;

    /// Replace the expanded paths saved for a type
    fn set_expanded_paths(&mut self, type_name: &str, paths: Vec<String>) -> Result<()>;

    /// Favorites saved for a type
    fn favorites(&self, type_name: &str) -> FavoritesMap;

    /// Replace the favorites saved for a type
    fn set_favorites(&mut self, type_name: &str, favorites: FavoritesMap) -> Result<()>;
}

/// Serialized form of every type's layout state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutDocument {
    /// Expanded paths per type
    #[serde(default)]
    pub expanded: BTreeMap<String, Vec<String>>,
    /// Favorites per type
    #[serde(default)]
    pub favorites: BTreeMap<String, StoredFavorites>,
}

/// Favorites as written to disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredFavorites {
    /// Path to sort index
    Indexed(FavoritesMap),
    /// Older files list paths only; the position is the index
    Legacy(Vec<String>),
}

impl StoredFavorites {
    /// Normalize into a [`FavoritesMap`]
    pub fn to_map(&self) -> FavoritesMap {
        match self {
            StoredFavorites::Indexed(map) => map.clone(),
            StoredFavorites::Legacy(paths) => paths
                .iter()
                .enumerate()
                .map(|(i, path)| (path.clone(), Some(i as u32)))
                .collect(),
        }
    }
}

impl LayoutDocument {
    fn expanded_paths(&self, type_name: &str) -> Option<Vec<String>> {
        self.expanded.get(type_name).cloned()
    }

    fn favorites(&self, type_name: &str) -> FavoritesMap {
        self.favorites
            .get(type_name)
            .map(StoredFavorites::to_map)
            .unwrap_or_default()
    }

    fn set_favorites(&mut self, type_name: &str, favorites: FavoritesMap) {
        if favorites.is_empty() {
            self.favorites.remove(type_name);
        } else {
            self.favorites
                .insert(type_name.to_string(), StoredFavorites::Indexed(favorites));
        }
    }
}

/// In-process store; clones share state
#[derive(Debug, Clone, Default)]
pub struct MemoryLayoutStore {
    document: Arc<RwLock<LayoutDocument>>,
}

impl MemoryLayoutStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything stored
    pub fn document(&self) -> LayoutDocument {
        self.document.read().clone()
    }
}

impl LayoutStore for MemoryLayoutStore {
    fn expanded_paths(&self, type_name: &str) -> Option<Vec<String>> {
        self.document.read().expanded_paths(type_name)
    }

    fn set_expanded_paths(&mut self, type_name: &str, paths: Vec<String>) -> Result<()> {
        self.document.write().expanded.insert(type_name.to_string(), paths);
        Ok(())
    }

    fn favorites(&self, type_name: &str) -> FavoritesMap {
        self.document.read().favorites(type_name)
    }

    fn set_favorites(&mut self, type_name: &str, favorites: FavoritesMap) -> Result<()> {
        self.document.write().set_favorites(type_name, favorites);
        Ok(())
    }
}

/// Store backed by a pretty-printed JSON file, rewritten on every change
#[derive(Debug)]
pub struct JsonFileLayoutStore {
    path: PathBuf,
    document: LayoutDocument,
}

impl JsonFileLayoutStore {
    /// Open a store file
    ///
    /// A missing file starts empty. A file that fails to parse also starts
    /// empty and is overwritten on the next change.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let document = if path.exists() {
            let content = fs::read_to_string(&path)?;
            match serde_json::from_str(&content) {
                Ok(document) => document,
                Err(e) => {
                    tracing::warn!("Discarding unreadable layout file {}: {}", path.display(), e);
                    LayoutDocument::default()
                }
            }
        } else {
            tracing::debug!("Layout file {} does not exist yet", path.display());
            LayoutDocument::default()
        };

        Ok(Self { path, document })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(&self.document)?;
        fs::write(&self.path, content)?;
        tracing::debug!("Saved layout file {}", self.path.display());
        Ok(())
    }
}

impl LayoutStore for JsonFileLayoutStore {
    fn expanded_paths(&self, type_name: &str) -> Option<Vec<String>> {
        self.document.expanded_paths(type_name)
    }

    fn set_expanded_paths(&mut self, type_name: &str, paths: Vec<String>) -> Result<()> {
        self.document.expanded.insert(type_name.to_string(), paths);
        self.save()
    }

    fn favorites(&self, type_name: &str) -> FavoritesMap {
        self.document.favorites(type_name)
    }

    fn set_favorites(&mut self, type_name: &str, favorites: FavoritesMap) -> Result<()> {
        self.document.set_favorites(type_name, favorites);
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_clones_share_state() {
        let mut store = MemoryLayoutStore::new();
        let observer = store.clone();

        store
            .set_expanded_paths("Actor", vec!["Display".to_string()])
            .unwrap();

        assert_eq!(observer.expanded_paths("Actor"), Some(vec!["Display".to_string()]));
        assert_eq!(observer.expanded_paths("Pawn"), None);
    }

    #[test]
    fn test_json_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("layout").join("inspector.json");

        let mut favorites = FavoritesMap::new();
        favorites.insert("Stats.Health".to_string(), Some(0));
        favorites.insert("Tags".to_string(), None);

        {
            let mut store = JsonFileLayoutStore::open(&path).unwrap();
            store.set_favorites("Pawn", favorites.clone()).unwrap();
            store
                .set_expanded_paths("Pawn", vec!["Stats.Location".to_string()])
                .unwrap();
        }

        let store = JsonFileLayoutStore::open(&path).unwrap();
        assert_eq!(store.favorites("Pawn"), favorites);
        assert_eq!(
            store.expanded_paths("Pawn"),
            Some(vec!["Stats.Location".to_string()])
        );
    }

    #[test]
    fn test_legacy_favorites_use_position() {
        let document: LayoutDocument =
            serde_json::from_str(r#"{"favorites": {"Pawn": ["B", "A"]}}"#).unwrap();

        let map = document.favorites("Pawn");
        assert_eq!(map.get("B"), Some(&Some(0)));
        assert_eq!(map.get("A"), Some(&Some(1)));
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let store = JsonFileLayoutStore::open(&path).unwrap();
        assert!(store.favorites("Pawn").is_empty());
        assert_eq!(store.expanded_paths("Pawn"), None);
    }
}
