//! Snapshot discovery and loading.
//!
//! Snapshots are JSON files named `<prefix><descriptor>.json`, where the
//! prefix is one of [`SNAPSHOT_PREFIXES`] and the descriptor starts with a
//! sortable timestamp. The newest snapshot is the one with the greatest
//! descriptor; selecting an undated one logs a warning.

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::api::logs::log_warning;
use crate::error::{SnapshotError, SnapshotResult};
use crate::models::RawRecord;

/// Prefix written by the fetcher.
pub const ALL_PREFIX: &str = "all_batterie_speicher_";

/// Prefix of older dashboard exports.
pub const DASHBOARD_PREFIX: &str = "dashboard_batterie_speicher_";

pub const SNAPSHOT_PREFIXES: [&str; 2] = [ALL_PREFIX, DASHBOARD_PREFIX];

pub const SNAPSHOT_EXTENSION: &str = ".json";

/// Descriptor part of a snapshot file name, or `None` if the name does not
/// follow the convention.
pub fn snapshot_descriptor(name: &str) -> Option<&str> {
    if !name.ends_with(SNAPSHOT_EXTENSION) {
        return None;
    }
    SNAPSHOT_PREFIXES
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))
}

pub fn is_snapshot_name(name: &str) -> bool {
    snapshot_descriptor(name).is_some()
}

/// Whether the descriptor starts with a timestamp. Undated descriptors such
/// as `all_tech_>=10000kW_10000kWh` sort after every dated one.
pub fn is_dated_descriptor(descriptor: &str) -> bool {
    descriptor.starts_with(|c: char| c.is_ascii_digit())
}

/// Pick the newest snapshot name from a directory listing.
///
/// Names are compared by descriptor first so both prefixes share one
/// timeline; equal descriptors fall back to the full name.
pub fn select_latest<'a, I, S>(names: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a S>,
    S: AsRef<str> + 'a + ?Sized,
{
    names
        .into_iter()
        .map(|name: &'a S| -> &'a str { name.as_ref() })
        .filter_map(|name| snapshot_descriptor(name).map(|d| (d, name)))
        .max()
        .map(|(_, name)| name)
}

/// Locate the newest snapshot file in `dir`.
pub fn find_latest_snapshot(dir: &Path) -> SnapshotResult<PathBuf> {
    let no_data = || SnapshotError::NoDataAvailable { dir: dir.to_path_buf() };

    let entries = fs::read_dir(dir).map_err(|_| no_data())?;
    let names: Vec<String> = entries
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();

    let latest = select_latest(&names).ok_or_else(no_data)?;
    if !snapshot_descriptor(latest).is_some_and(is_dated_descriptor) {
        log_warning(format!(
            "Newest snapshot {} has no timestamp and outranks every dated snapshot in {}",
            latest,
            dir.display()
        ));
    }
    Ok(dir.join(latest))
}

/// Read a snapshot file into raw records.
///
/// The top-level value must be an array of objects.
pub fn load_records(path: &Path) -> SnapshotResult<Vec<RawRecord>> {
    let content = fs::read_to_string(path).map_err(|e| SnapshotError::data_load(path, e))?;
    parse_records(&content).map_err(|reason| SnapshotError::data_load(path, reason))
}

/// Parse snapshot content into raw records.
pub fn parse_records(content: &str) -> Result<Vec<RawRecord>, String> {
    let value: Value = serde_json::from_str(content).map_err(|e| format!("Invalid JSON: {}", e))?;

    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(format!(
                "Expected a top-level array, found {}",
                json_kind(&other)
            ))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Ok(RawRecord::new(map)),
            other => Err(format!("Element {} is {}, expected an object", i, json_kind(&other))),
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_select_latest_by_descriptor() {
        let names = vec![
            "dashboard_batterie_speicher_2024-01-01.json".to_string(),
            "all_batterie_speicher_2024-03-05.json".to_string(),
        ];
        assert_eq!(select_latest(&names), Some("all_batterie_speicher_2024-03-05.json"));
    }

    #[test]
    fn test_select_ignores_foreign_files() {
        let names = vec![
            "notes.json",
            "all_batterie_speicher_2024-01-01.json.tmp",
            "all_batterie_speicher_2023-12-31.json",
            "zzz_batterie_speicher_2030-01-01.json",
            "all_batterie_speicher_2024-02-01.csv",
        ];
        assert_eq!(select_latest(&names), Some("all_batterie_speicher_2023-12-31.json"));
    }

    #[test]
    fn test_select_none_matching() {
        let names: Vec<&str> = vec!["readme.md", "data.json"];
        assert_eq!(select_latest(&names), None);
        assert_eq!(select_latest(&Vec::<String>::new()), None);
    }

    #[test]
    fn test_select_tie_breaks_on_full_name() {
        let names = vec![
            "all_batterie_speicher_2024-01-01.json",
            "dashboard_batterie_speicher_2024-01-01.json",
        ];
        assert_eq!(select_latest(&names), Some("dashboard_batterie_speicher_2024-01-01.json"));
    }

    #[test]
    fn test_find_latest_in_dir() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("all_batterie_speicher_2024-01-01.json"), "[]").unwrap();
        fs::write(dir.path().join("all_batterie_speicher_2024-06-01.json"), "[]").unwrap();
        fs::write(dir.path().join("other.json"), "[]").unwrap();

        let latest = find_latest_snapshot(dir.path()).unwrap();
        assert_eq!(latest, dir.path().join("all_batterie_speicher_2024-06-01.json"));
    }

    #[test]
    fn test_dated_descriptor() {
        assert!(is_dated_descriptor("2024-01-01"));
        assert!(is_dated_descriptor("20240305_101500"));
        assert!(!is_dated_descriptor("all_tech_>=10000kW_10000kWh"));
        assert!(!is_dated_descriptor(">=10000kW"));
        assert!(!is_dated_descriptor(""));
    }

    #[test]
    fn test_undated_snapshot_selected_with_warning() {
        use crate::api::logs::{LogLevel, LOG_BROADCASTER};
        use tokio::sync::broadcast::error::TryRecvError;

        let legacy = "all_batterie_speicher_all_tech_>=10000kW_10000kWh.json";
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("all_batterie_speicher_2024-06-01.json"), "[]").unwrap();
        fs::write(dir.path().join(legacy), "[]").unwrap();

        let mut rx = LOG_BROADCASTER.subscribe();
        let latest = find_latest_snapshot(dir.path()).unwrap();
        assert_eq!(latest, dir.path().join(legacy));

        let mut warned = false;
        loop {
            match rx.try_recv() {
                Ok(entry) => {
                    warned |= entry.level == LogLevel::Warning && entry.message.contains(legacy);
                }
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        assert!(warned);
    }

    #[test]
    fn test_find_latest_no_data() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("other.json"), "[]").unwrap();

        let err = find_latest_snapshot(dir.path()).unwrap_err();
        assert!(matches!(err, SnapshotError::NoDataAvailable { .. }));

        let err = find_latest_snapshot(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, SnapshotError::NoDataAvailable { .. }));
    }

    #[test]
    fn test_load_records_keeps_all_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("all_batterie_speicher_2024-01-01.json");
        fs::write(
            &path,
            r#"[{"Bruttoleistung": "5000", "Unbekannt": [1, 2]}, {"EinheitName": "Speicher Süd"}]"#,
        )
        .unwrap();

        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("Unbekannt"), Some(&serde_json::json!([1, 2])));
        assert_eq!(records[1].get("EinheitName"), Some(&serde_json::json!("Speicher Süd")));
    }

    #[test]
    fn test_load_errors() {
        let dir = tempdir().unwrap();

        let malformed = dir.path().join("a.json");
        fs::write(&malformed, "[{").unwrap();
        assert!(matches!(load_records(&malformed), Err(SnapshotError::DataLoad { .. })));

        let object = dir.path().join("b.json");
        fs::write(&object, r#"{"Data": []}"#).unwrap();
        let err = load_records(&object).unwrap_err();
        assert!(err.to_string().contains("top-level array"));

        let scalar_items = dir.path().join("c.json");
        fs::write(&scalar_items, "[1]").unwrap();
        assert!(matches!(load_records(&scalar_items), Err(SnapshotError::DataLoad { .. })));

        let missing = dir.path().join("missing.json");
        assert!(matches!(load_records(&missing), Err(SnapshotError::DataLoad { .. })));
    }
}
