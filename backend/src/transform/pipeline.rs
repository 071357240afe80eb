//! High-level pipeline: snapshot file → normalized dataset → dashboard view.
//!
//! # Example
//!
//! ```rust,ignore
//! use mastr_battery::{load_latest, build_view, FilterQuery};
//! use std::path::Path;
//!
//! let dataset = load_latest(Path::new("data"))?;
//! let view = build_view(&dataset.records, &FilterQuery::default());
//! println!("{} units, {:.1} MW", view.summary.total_units, view.summary.total_power_mw);
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::api::logs::{log_info, log_success, log_warning};
use crate::error::SnapshotResult;
use crate::models::NormalizedRecord;
use crate::snapshot::{find_latest_snapshot, load_records};
use super::aggregate::{summarize, Summary};
use super::filter::{apply_filters, FilterQuery};
use super::normalize::normalize_records;

/// A loaded and normalized snapshot.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub path: PathBuf,
    pub records: Vec<NormalizedRecord>,
    pub loaded_at: DateTime<Utc>,
}

impl Dataset {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Load and normalize one snapshot file.
pub fn load_dataset(path: &Path) -> SnapshotResult<Dataset> {
    log_info(format!("📖 Loading snapshot {}", path.display()));
    let raw = load_records(path)?;
    log_success(format!("Read {} registry records", raw.len()));

    let records = normalize_records(&raw);
    report_coverage(&records);

    Ok(Dataset {
        path: path.to_path_buf(),
        records,
        loaded_at: Utc::now(),
    })
}

/// Locate the newest snapshot in `dir` and load it.
pub fn load_latest(dir: &Path) -> SnapshotResult<Dataset> {
    let path = find_latest_snapshot(dir)?;
    load_dataset(&path)
}

/// Log how many records lack the inputs the dashboard relies on.
fn report_coverage(records: &[NormalizedRecord]) {
    let without_power = records.iter().filter(|r| r.power_mw.is_none()).count();
    let without_capacity = records.iter().filter(|r| r.capacity_mwh.is_none()).count();
    let without_coordinates = records.iter().filter(|r| !r.has_coordinates()).count();

    if without_power > 0 {
        log_warning(format!("{} records without usable Bruttoleistung", without_power));
    }
    if without_capacity > 0 {
        log_warning(format!("{} records without usable NutzbareSpeicherkapazitaet", without_capacity));
    }
    if without_coordinates > 0 {
        log_info(format!("{} records without coordinates (hidden on the map)", without_coordinates));
    }
    log_success(format!("Normalized {} records", records.len()));
}

/// Filtered records plus their summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct View<'a> {
    pub records: Vec<&'a NormalizedRecord>,
    pub summary: Summary,
}

/// Apply the query and summarize the result.
pub fn build_view<'a>(records: &'a [NormalizedRecord], query: &FilterQuery) -> View<'a> {
    let filtered = apply_filters(records, &query.to_criteria());
    let summary = summarize(filtered.iter().copied());
    View {
        records: filtered,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const SNAPSHOT: &str = r#"[
        {"EinheitName": "Speicher A", "Bruttoleistung": "5000", "NutzbareSpeicherkapazitaet": "20000",
         "Batterietechnologie": 727, "BetriebsStatusName": "In Betrieb", "Bundesland": "Bayern",
         "Breitengrad": "48.1", "Laengengrad": "11.5", "InbetriebnahmeDatum": "/Date(1704067200000)/"},
        {"EinheitName": "Speicher B", "Bruttoleistung": null, "NutzbareSpeicherkapazitaet": "1500",
         "Batterietechnologie": 999, "BetriebsStatusName": "In Planung", "Bundesland": "Brandenburg"}
    ]"#;

    #[test]
    fn test_load_latest_end_to_end() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("dashboard_batterie_speicher_2024-01-01.json"), "[]").unwrap();
        fs::write(dir.path().join("all_batterie_speicher_2024-03-05.json"), SNAPSHOT).unwrap();

        let dataset = load_latest(dir.path()).unwrap();
        assert_eq!(dataset.file_name(), "all_batterie_speicher_2024-03-05.json");
        assert_eq!(dataset.records.len(), 2);
        assert_eq!(dataset.records[0].duration_hours, 4.0);
        assert_eq!(dataset.records[1].duration_hours, 0.0);
        assert_eq!(dataset.records[1].technology_name, "Unbekannt");
    }

    #[test]
    fn test_build_view() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("all_batterie_speicher_2024-03-05.json");
        fs::write(&path, SNAPSHOT).unwrap();
        let dataset = load_dataset(&path).unwrap();

        let query = FilterQuery {
            status: Some("In Betrieb".into()),
            ..Default::default()
        };
        let view = build_view(&dataset.records, &query);
        assert_eq!(view.records.len(), 1);
        assert_eq!(view.summary.total_units, 1);
        assert!((view.summary.total_power_mw - 5.0).abs() < 1e-9);

        let query = FilterQuery {
            bundesland: Some("Hessen".into()),
            ..Default::default()
        };
        let view = build_view(&dataset.records, &query);
        assert!(view.records.is_empty());
        assert_eq!(view.summary.average_capacity_mwh, 0.0);
    }
}
