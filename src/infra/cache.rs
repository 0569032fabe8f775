//! Persistent on-disk catalog snapshot with TTL + version tracking.

use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::RawCatalog;

const CACHE_DIR: &str = "uex-trader";
const CACHE_FILENAME: &str = "catalog_cache.json";

/// Bumped whenever the cached record layout changes.
pub const CATALOG_SCHEMA_VERSION: &str = "uex-catalog-3";

/// Cached catalog with TTL + version tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogCache {
    /// Layout tag of the records below.
    pub version: String,
    /// Unix timestamp (seconds) when this cache was created.
    pub cached_at: u64,
    pub catalog: RawCatalog,
}

impl CatalogCache {
    /// Create a new cache with current timestamp.
    pub fn new(catalog: RawCatalog) -> Self {
        let cached_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            version: CATALOG_SCHEMA_VERSION.to_string(),
            cached_at,
            catalog,
        }
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.age() > ttl
    }

    /// Fresh enough and written by this layout version.
    pub fn is_usable(&self, ttl: Duration) -> bool {
        self.version == CATALOG_SCHEMA_VERSION && !self.is_expired(ttl)
    }

    /// Get cache age as Duration.
    pub fn age(&self) -> Duration {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Duration::from_secs(now.saturating_sub(self.cached_at))
    }

    /// Human-readable age string.
    pub fn age_string(&self) -> String {
        let secs = self.age().as_secs();
        if secs < 60 {
            format!("{secs}s")
        } else if secs < 3600 {
            format!("{}m", secs / 60)
        } else if secs < 86400 {
            format!("{}h", secs / 3600)
        } else {
            format!("{}d", secs / 86400)
        }
    }
}

/// Default cache file path (in app data directory).
pub fn default_cache_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CACHE_DIR)
        .join(CACHE_FILENAME)
}

/// Load the catalog cache from disk, if it exists and parses.
pub fn load_catalog_cache(path: &Path) -> Option<CatalogCache> {
    if !path.exists() {
        debug!(path = %path.display(), "no catalog cache found");
        return None;
    }

    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<CatalogCache>(&content) {
            Ok(cache) => {
                debug!(path = %path.display(), age = %cache.age_string(), "loaded catalog cache");
                Some(cache)
            }
            Err(e) => {
                warn!(error = %e, "failed to parse catalog cache");
                None
            }
        },
        Err(e) => {
            warn!(error = %e, "failed to read catalog cache");
            None
        }
    }
}

/// Save the catalog cache to disk.
pub fn save_catalog_cache(path: &Path, cache: &CatalogCache) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string(cache)?; // compact, not pretty (can be large)
    fs::write(path, content)?;
    info!(
        tradeports = cache.catalog.tradeports.len(),
        ships = cache.catalog.ships.len(),
        path = %path.display(),
        "saved catalog cache"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::fixtures::stanton;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CACHE_FILENAME);

        save_catalog_cache(&path, &CatalogCache::new(stanton())).unwrap();
        let loaded = load_catalog_cache(&path).unwrap();

        assert_eq!(loaded.catalog, stanton());
        assert!(loaded.is_usable(Duration::from_secs(60)));
    }

    #[test]
    fn stale_or_foreign_caches_are_rejected() {
        let mut cache = CatalogCache::new(stanton());
        cache.cached_at -= 7200;
        assert!(cache.is_expired(Duration::from_secs(3600)));
        assert!(!cache.is_usable(Duration::from_secs(3600)));
        assert_eq!(cache.age_string(), "2h");

        let mut cache = CatalogCache::new(stanton());
        cache.version = "uex-catalog-1".into();
        assert!(!cache.is_usable(Duration::from_secs(3600)));
    }

    #[test]
    fn garbage_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CACHE_FILENAME);
        fs::write(&path, "{not json").unwrap();
        assert!(load_catalog_cache(&path).is_none());
        assert!(load_catalog_cache(&dir.path().join("missing.json")).is_none());
    }
}
