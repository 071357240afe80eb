//! REST API response types.
//!
//! Every data response carries the [`SnapshotInfo`] of the file it was
//! computed from, so clients can tell when the underlying data changed.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::dashboard::{ChartData, FilterOptions, MapPoint};
use crate::error::{ServerError, SnapshotError};
use crate::models::NormalizedRecord;
use crate::transform::aggregate::Summary;
use crate::transform::pipeline::Dataset;

/// Which snapshot a response was computed from.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotInfo {
    pub file_name: String,
    pub loaded_at: DateTime<Utc>,
    pub record_count: usize,
}

impl From<&Dataset> for SnapshotInfo {
    fn from(dataset: &Dataset) -> Self {
        Self {
            file_name: dataset.file_name(),
            loaded_at: dataset.loaded_at,
            record_count: dataset.records.len(),
        }
    }
}

/// Filtered records with their summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsResponse {
    pub snapshot: SnapshotInfo,
    pub matched: usize,
    pub summary: Summary,
    pub records: Vec<NormalizedRecord>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub snapshot: SnapshotInfo,
    pub summary: Summary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapResponse {
    pub snapshot: SnapshotInfo,
    /// Matching records left out for lack of coordinates.
    pub without_coordinates: usize,
    pub points: Vec<MapPoint>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartsResponse {
    pub snapshot: SnapshotInfo,
    pub charts: ChartData,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsResponse {
    pub snapshot: SnapshotInfo,
    pub options: FilterOptions,
}

/// Create an error body
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
    })
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Snapshot(SnapshotError::NoDataAvailable { .. }) => StatusCode::NOT_FOUND,
            ServerError::Snapshot(SnapshotError::DataLoad { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(error_response(&self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_status_mapping() {
        let missing: ServerError = SnapshotError::NoDataAvailable { dir: PathBuf::from(".") }.into();
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);

        let broken: ServerError = SnapshotError::data_load("x.json", "not an array").into();
        assert_eq!(broken.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(ServerError::BadRequest("min > max".into()).status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_body() {
        let body = error_response("No battery data files found");
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"], "No battery data files found");
    }

    #[test]
    fn test_snapshot_info_from_dataset() {
        let dataset = Dataset {
            path: PathBuf::from("/data/all_batterie_speicher_2024-03-05.json"),
            records: Vec::new(),
            loaded_at: Utc::now(),
        };
        let info = SnapshotInfo::from(&dataset);
        assert_eq!(info.file_name, "all_batterie_speicher_2024-03-05.json");
        assert_eq!(info.record_count, 0);
    }
}
