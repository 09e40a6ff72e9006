//! Catalog persistence.
//!
//! The catalog is stored as pretty-printed JSON (an array of
//! `{ "category", "detail_url" }` objects) so it diffs cleanly between runs.
//! Saves go through a temporary file and a rename: a catalog on disk is
//! either the previous one or the complete new one, never a mix.

use std::path::{Path, PathBuf};

use wine_harvest_catalog_models::Catalog;

/// Directory, under the data directory, holding catalogs.
pub const CATALOG_DIR: &str = "url";

/// Errors reading or writing a persisted catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogStoreError {
    /// Filesystem failure.
    #[error("catalog I/O error at {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not a valid catalog.
    #[error("malformed catalog {path}: {source}")]
    Json {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// A catalog file on disk.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    path: PathBuf,
}

impl CatalogStore {
    /// Store backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The conventional store for `retailer`: `<data_dir>/url/<retailer>_listings.json`.
    #[must_use]
    pub fn for_retailer(data_dir: &Path, retailer: &str) -> Self {
        Self::new(
            data_dir
                .join(CATALOG_DIR)
                .join(format!("{retailer}_listings.json")),
        )
    }

    /// Path of the catalog file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a persisted catalog exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Reads the persisted catalog verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogStoreError`] if the file cannot be read or parsed.
    pub fn load(&self) -> Result<Catalog, CatalogStoreError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|source| self.io_error(source))?;
        serde_json::from_str(&raw).map_err(|source| CatalogStoreError::Json {
            path: self.path.clone(),
            source,
        })
    }

    /// Replaces the persisted catalog with `catalog`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogStoreError`] if the file cannot be written.
    pub fn save(&self, catalog: &Catalog) -> Result<(), CatalogStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }

        let json =
            serde_json::to_string_pretty(catalog).map_err(|source| CatalogStoreError::Json {
                path: self.path.clone(),
                source,
            })?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json + "\n").map_err(|source| CatalogStoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| self.io_error(source))?;

        log::debug!(
            "Saved {} catalog entries to {}",
            catalog.len(),
            self.path.display()
        );
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> CatalogStoreError {
        CatalogStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use wine_harvest_catalog_models::CatalogEntry;

    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("wine_harvest_catalog_store_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn saves_and_loads_verbatim() {
        let dir = scratch_dir("roundtrip");
        let store = CatalogStore::for_retailer(&dir, "decantalo");
        assert!(!store.exists());

        let catalog: Catalog = vec![
            CatalogEntry::new("red", "https://shop.test/p/2"),
            CatalogEntry::new("red", "https://shop.test/p/1"),
            CatalogEntry::new("white", "https://shop.test/p/2"),
        ]
        .into();
        store.save(&catalog).unwrap();

        assert!(store.exists());
        assert_eq!(store.path(), dir.join("url").join("decantalo_listings.json"));
        assert_eq!(store.load().unwrap(), catalog);
        assert!(!store.path().with_extension("json.tmp").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn file_is_human_readable() {
        let dir = scratch_dir("readable");
        let store = CatalogStore::for_retailer(&dir, "morrisons");
        let catalog: Catalog = vec![CatalogEntry::new("rose", "https://shop.test/p/9")].into();
        store.save(&catalog).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"category\": \"rose\""));
        assert!(raw.lines().count() > 3);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = scratch_dir("malformed");
        std::fs::create_dir_all(&dir).unwrap();
        let store = CatalogStore::new(dir.join("broken.json"));
        std::fs::write(store.path(), "{ not a catalog").unwrap();

        assert!(matches!(store.load(), Err(CatalogStoreError::Json { .. })));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
