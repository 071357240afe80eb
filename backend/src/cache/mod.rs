//! Snapshot cache - keep the normalized dataset between requests
//!
//! The cache is keyed by the resolved snapshot path and its last-modified
//! time. A newer snapshot in the directory, or a rewrite of the current one,
//! triggers a reload; otherwise the cached dataset is returned as is.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::api::logs::log_info;
use crate::error::{SnapshotError, SnapshotResult};
use crate::snapshot::find_latest_snapshot;
use crate::transform::pipeline::{load_dataset, Dataset};

/// Identity of a snapshot file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotKey {
    pub path: PathBuf,
    pub modified: SystemTime,
}

impl SnapshotKey {
    /// Stat `path` and build its key.
    pub fn of(path: &Path) -> SnapshotResult<Self> {
        let modified = fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|e| SnapshotError::data_load(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            modified,
        })
    }
}

/// Cached dataset plus the key it was loaded under.
struct CacheEntry {
    key: SnapshotKey,
    dataset: Arc<Dataset>,
}

/// Process-wide cache of the normalized snapshot.
#[derive(Default)]
pub struct SnapshotCache {
    entry: Option<CacheEntry>,
    loads: u64,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dataset for the newest snapshot in `dir`, loading it if needed.
    pub fn get_or_load(&mut self, dir: &Path) -> SnapshotResult<Arc<Dataset>> {
        let path = find_latest_snapshot(dir)?;
        self.get_or_load_file(&path)
    }

    /// Dataset for a specific snapshot file, loading it if needed.
    pub fn get_or_load_file(&mut self, path: &Path) -> SnapshotResult<Arc<Dataset>> {
        let key = SnapshotKey::of(path)?;

        if let Some(entry) = &self.entry {
            if entry.key == key {
                return Ok(Arc::clone(&entry.dataset));
            }
            log_info(format!(
                "Snapshot changed ({}), reloading",
                key.path.display()
            ));
        }

        let dataset = Arc::new(load_dataset(path)?);
        self.loads += 1;
        log_info(format!(
            "Cached {} ({} records, load #{})",
            key.path.display(),
            dataset.records.len(),
            self.loads
        ));
        self.entry = Some(CacheEntry {
            key,
            dataset: Arc::clone(&dataset),
        });
        Ok(dataset)
    }

    /// Drop the cached dataset.
    pub fn clear(&mut self) {
        self.entry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::time::Duration;
    use tempfile::tempdir;

    fn write_snapshot(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn bump_mtime(path: &Path, secs: u64) {
        let file = OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(secs)).unwrap();
    }

    #[test]
    fn test_second_call_hits_cache() {
        let dir = tempdir().unwrap();
        write_snapshot(dir.path(), "all_batterie_speicher_2024-01-01.json", r#"[{"Bruttoleistung": 1000}]"#);

        let mut cache = SnapshotCache::new();
        let first = cache.get_or_load(dir.path()).unwrap();
        let second = cache.get_or_load(dir.path()).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.loads, 1);
    }

    #[test]
    fn test_reload_on_mtime_change() {
        let dir = tempdir().unwrap();
        let path = write_snapshot(dir.path(), "all_batterie_speicher_2024-01-01.json", r#"[{"Bruttoleistung": 1000}]"#);

        let mut cache = SnapshotCache::new();
        assert_eq!(cache.get_or_load(dir.path()).unwrap().records.len(), 1);

        fs::write(&path, r#"[{"Bruttoleistung": 1000}, {"Bruttoleistung": 2000}]"#).unwrap();
        bump_mtime(&path, 60);

        assert_eq!(cache.get_or_load(dir.path()).unwrap().records.len(), 2);
        assert_eq!(cache.loads, 2);
    }

    #[test]
    fn test_reload_on_newer_snapshot() {
        let dir = tempdir().unwrap();
        write_snapshot(dir.path(), "all_batterie_speicher_2024-01-01.json", "[]");

        let mut cache = SnapshotCache::new();
        assert!(cache.get_or_load(dir.path()).unwrap().records.is_empty());

        let newer = write_snapshot(dir.path(), "all_batterie_speicher_2024-02-01.json", r#"[{}]"#);
        let dataset = cache.get_or_load(dir.path()).unwrap();
        assert_eq!(dataset.records.len(), 1);
        assert_eq!(cache.entry.as_ref().unwrap().key.path, newer);
    }

    #[test]
    fn test_clear_forces_reload() {
        let dir = tempdir().unwrap();
        write_snapshot(dir.path(), "all_batterie_speicher_2024-01-01.json", "[]");

        let mut cache = SnapshotCache::new();
        cache.get_or_load(dir.path()).unwrap();
        cache.clear();
        assert!(cache.entry.is_none());

        cache.get_or_load(dir.path()).unwrap();
        assert_eq!(cache.loads, 2);
    }

    #[test]
    fn test_errors_leave_cache_untouched() {
        let dir = tempdir().unwrap();
        let mut cache = SnapshotCache::new();
        assert!(matches!(
            cache.get_or_load(dir.path()),
            Err(SnapshotError::NoDataAvailable { .. })
        ));

        write_snapshot(dir.path(), "all_batterie_speicher_2024-01-01.json", "{}");
        assert!(matches!(
            cache.get_or_load(dir.path()),
            Err(SnapshotError::DataLoad { .. })
        ));
        assert!(cache.entry.is_none());
    }
}
