//! HTTP server for the battery storage dashboard.
//!
//! Serves the filtered views of the newest snapshot as JSON. Data endpoints
//! accept the [`FilterQuery`] fields as query parameters; a query that does
//! not parse or validate is answered with 400 and the JSON error body.
//!
//! # API Endpoints
//!
//! | Method | Path              | Description                          |
//! |--------|-------------------|--------------------------------------|
//! | GET    | `/health`         | Health check                         |
//! | GET    | `/api/snapshot`   | Snapshot currently served            |
//! | GET    | `/api/records`    | Filtered records and summary         |
//! | GET    | `/api/summary`    | Summary of the filtered records      |
//! | GET    | `/api/map`        | Map points of the filtered records   |
//! | GET    | `/api/charts`     | Chart series of the filtered records |
//! | GET    | `/api/options`    | Filter choices and numeric bounds    |
//! | POST   | `/api/reload`     | Drop the cache and reload            |
//! | GET    | `/api/logs`       | SSE stream for real-time logs        |

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{header, Method},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{
    convert::Infallible,
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, LOG_BROADCASTER};
use super::types::{
    ChartsResponse, MapResponse, OptionsResponse, RecordsResponse, SnapshotInfo, SummaryResponse,
};
use crate::cache::SnapshotCache;
use crate::dashboard::{chart_data, filter_options, map_points};
use crate::error::{ServerError, ServerResult};
use crate::transform::filter::FilterQuery;
use crate::transform::pipeline::{build_view, Dataset};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub cache: Arc<Mutex<SnapshotCache>>,
}

impl AppState {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            cache: Arc::new(Mutex::new(SnapshotCache::new())),
        }
    }

    /// Newest snapshot, from cache when unchanged on disk.
    async fn dataset(&self) -> ServerResult<Arc<Dataset>> {
        self.load(false).await
    }

    /// Drop the cached dataset and load again.
    async fn reload(&self) -> ServerResult<Arc<Dataset>> {
        self.load(true).await
    }

    /// Reading and normalizing a snapshot blocks, so it runs off the async workers.
    async fn load(&self, fresh: bool) -> ServerResult<Arc<Dataset>> {
        let state = self.clone();
        tokio::task::spawn_blocking(move || state.load_blocking(fresh))
            .await
            .map_err(|e| ServerError::Internal(format!("snapshot load task failed: {}", e)))?
    }

    fn load_blocking(&self, fresh: bool) -> ServerResult<Arc<Dataset>> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| ServerError::Internal("snapshot cache lock poisoned".into()))?;
        if fresh {
            cache.clear();
        }
        cache.get_or_load(&self.data_dir).map_err(|e| {
            log_error(e.to_string());
            ServerError::from(e)
        })
    }
}

/// Unwrap the filter query, turning parse and validation failures into 400s.
fn filter_query(query: Result<Query<FilterQuery>, QueryRejection>) -> ServerResult<FilterQuery> {
    let Query(query) = query.map_err(|rejection| ServerError::BadRequest(rejection.body_text()))?;
    query.validate()?;
    Ok(query)
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/snapshot", get(snapshot_info))
        .route("/api/records", get(records))
        .route("/api/summary", get(summary))
        .route("/api/map", get(map))
        .route("/api/charts", get(charts))
        .route("/api/options", get(options))
        .route("/api/reload", post(reload))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(data_dir: PathBuf, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(AppState::new(data_dir.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 MaStR battery server running on http://localhost:{}", port);
    println!("   Data directory: {}", data_dir.display());
    println!("   GET  /api/records  - Filtered records + summary");
    println!("   GET  /api/map      - Map points");
    println!("   GET  /api/charts   - Chart series");
    println!("   GET  /api/options  - Filter options");
    println!("   POST /api/reload   - Reload snapshot");
    println!("   GET  /api/logs     - SSE log stream");
    println!("   GET  /health       - Health check");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "mastr-battery",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn snapshot_info(State(state): State<AppState>) -> ServerResult<Json<SnapshotInfo>> {
    let dataset = state.dataset().await?;
    Ok(Json(SnapshotInfo::from(dataset.as_ref())))
}

async fn records(
    State(state): State<AppState>,
    query: Result<Query<FilterQuery>, QueryRejection>,
) -> ServerResult<Json<RecordsResponse>> {
    let query = filter_query(query)?;
    let dataset = state.dataset().await?;
    let view = build_view(&dataset.records, &query);

    Ok(Json(RecordsResponse {
        snapshot: SnapshotInfo::from(dataset.as_ref()),
        matched: view.records.len(),
        summary: view.summary,
        records: view.records.into_iter().cloned().collect(),
    }))
}

async fn summary(
    State(state): State<AppState>,
    query: Result<Query<FilterQuery>, QueryRejection>,
) -> ServerResult<Json<SummaryResponse>> {
    let query = filter_query(query)?;
    let dataset = state.dataset().await?;
    let view = build_view(&dataset.records, &query);

    Ok(Json(SummaryResponse {
        snapshot: SnapshotInfo::from(dataset.as_ref()),
        summary: view.summary,
    }))
}

async fn map(
    State(state): State<AppState>,
    query: Result<Query<FilterQuery>, QueryRejection>,
) -> ServerResult<Json<MapResponse>> {
    let query = filter_query(query)?;
    let dataset = state.dataset().await?;
    let view = build_view(&dataset.records, &query);
    let points = map_points(view.records.iter().copied());

    Ok(Json(MapResponse {
        snapshot: SnapshotInfo::from(dataset.as_ref()),
        without_coordinates: view.records.len() - points.len(),
        points,
    }))
}

async fn charts(
    State(state): State<AppState>,
    query: Result<Query<FilterQuery>, QueryRejection>,
) -> ServerResult<Json<ChartsResponse>> {
    let query = filter_query(query)?;
    let dataset = state.dataset().await?;
    let view = build_view(&dataset.records, &query);

    Ok(Json(ChartsResponse {
        snapshot: SnapshotInfo::from(dataset.as_ref()),
        charts: chart_data(&view.records),
    }))
}

async fn options(State(state): State<AppState>) -> ServerResult<Json<OptionsResponse>> {
    let dataset = state.dataset().await?;

    Ok(Json(OptionsResponse {
        snapshot: SnapshotInfo::from(dataset.as_ref()),
        options: filter_options(&dataset.records),
    }))
}

async fn reload(State(state): State<AppState>) -> ServerResult<Json<SnapshotInfo>> {
    let dataset = state.reload().await?;
    Ok(Json(SnapshotInfo::from(dataset.as_ref())))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    // Lagged receivers skip what they missed
    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    const SNAPSHOT: &str = r#"[
        {"EinheitName": "Groß", "Bruttoleistung": "50000", "NutzbareSpeicherkapazitaet": "100000",
         "Batterietechnologie": 727, "BetriebsStatusName": "In Betrieb", "Bundesland": "Brandenburg",
         "Breitengrad": "52.4", "Laengengrad": "13.0"},
        {"EinheitName": "Mittel", "Bruttoleistung": "5000", "NutzbareSpeicherkapazitaet": "5000",
         "Batterietechnologie": 729, "BetriebsStatusName": "In Planung", "Bundesland": "Bayern"},
        {"EinheitName": "Klein", "Bruttoleistung": "800", "NutzbareSpeicherkapazitaet": "1600",
         "Batterietechnologie": 727, "BetriebsStatusName": "In Betrieb", "Bundesland": "Bayern",
         "Breitengrad": "48.1", "Laengengrad": "11.5"}
    ]"#;

    async fn spawn(dir: &Path) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(AppState::new(dir));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn get_json(url: &str) -> (u16, Value) {
        let response = reqwest::get(url).await.unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    #[tokio::test]
    async fn test_no_snapshot_is_404() {
        let dir = tempdir().unwrap();
        let base = spawn(dir.path()).await;

        let (status, body) = get_json(&format!("{}/api/records", base)).await;
        assert_eq!(status, 404);
        assert_eq!(body["status"], "error");
        assert!(body["error"].as_str().unwrap().contains("No battery data files found"));
    }

    #[tokio::test]
    async fn test_broken_snapshot_is_500() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("all_batterie_speicher_2024-01-01.json"), "{\"Data\": []}").unwrap();
        let base = spawn(dir.path()).await;

        let (status, body) = get_json(&format!("{}/api/summary", base)).await;
        assert_eq!(status, 500);
        assert!(body.get("summary").is_none());
    }

    #[tokio::test]
    async fn test_records_with_filters() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("all_batterie_speicher_2024-01-01.json"), SNAPSHOT).unwrap();
        let base = spawn(dir.path()).await;

        let (status, body) = get_json(&format!("{}/api/records?status=In%20Betrieb&power_min=1", base)).await;
        assert_eq!(status, 200);
        assert_eq!(body["matched"], 1);
        assert_eq!(body["records"][0]["EinheitName"], "Groß");
        assert_eq!(body["summary"]["totalUnits"], 1);
        assert_eq!(body["snapshot"]["recordCount"], 3);

        let (_, all) = get_json(&format!("{}/api/records?bundesland=All", base)).await;
        assert_eq!(all["matched"], 3);
    }

    #[tokio::test]
    async fn test_map_and_charts() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("all_batterie_speicher_2024-01-01.json"), SNAPSHOT).unwrap();
        let base = spawn(dir.path()).await;

        let (_, map) = get_json(&format!("{}/api/map?bundesland=Bayern", base)).await;
        assert_eq!(map["points"].as_array().unwrap().len(), 1);
        assert_eq!(map["withoutCoordinates"], 1);

        let (_, charts) = get_json(&format!("{}/api/charts", base)).await;
        assert_eq!(charts["charts"]["topBundeslaender"][0]["label"], "Bayern");
        assert_eq!(charts["charts"]["topBundeslaender"][0]["count"], 2);
    }

    #[tokio::test]
    async fn test_options_and_reload() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("all_batterie_speicher_2024-01-01.json"), SNAPSHOT).unwrap();
        let base = spawn(dir.path()).await;

        let (_, options) = get_json(&format!("{}/api/options", base)).await;
        assert_eq!(options["options"]["categorical"]["federal_state"], json!(["Bayern", "Brandenburg"]));

        fs::write(dir.path().join("all_batterie_speicher_2024-06-01.json"), "[]").unwrap();
        let response = reqwest::Client::new()
            .post(format!("{}/api/reload", base))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let info: Value = response.json().await.unwrap();
        assert_eq!(info["fileName"], "all_batterie_speicher_2024-06-01.json");
        assert_eq!(info["recordCount"], 0);
    }

    #[tokio::test]
    async fn test_malformed_query_is_json_400() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("all_batterie_speicher_2024-01-01.json"), SNAPSHOT).unwrap();
        let base = spawn(dir.path()).await;

        let (status, body) = get_json(&format!("{}/api/records?power_min=abc", base)).await;
        assert_eq!(status, 400);
        assert_eq!(body["status"], "error");
        assert!(body["error"].as_str().unwrap().contains("query string"));

        for path in ["map", "charts", "summary"] {
            let (status, body) = get_json(&format!("{}/api/{}?capacity_max=viel", base, path)).await;
            assert_eq!(status, 400);
            assert_eq!(body["status"], "error");
        }
    }

    #[tokio::test]
    async fn test_invalid_ranges_are_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("all_batterie_speicher_2024-01-01.json"), SNAPSHOT).unwrap();
        let base = spawn(dir.path()).await;

        let (status, body) = get_json(&format!("{}/api/records?power_min=10&power_max=1", base)).await;
        assert_eq!(status, 400);
        assert_eq!(body["status"], "error");
        assert!(body["error"].as_str().unwrap().contains("power_min (10) is greater than power_max (1)"));

        let (status, body) = get_json(&format!("{}/api/summary?power_min=NaN", base)).await;
        assert_eq!(status, 400);
        assert_eq!(body["status"], "error");

        let (status, _) = get_json(&format!("{}/api/records?power_min=1&power_max=1", base)).await;
        assert_eq!(status, 200);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_load() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("all_batterie_speicher_2024-01-01.json"), SNAPSHOT).unwrap();
        let state = AppState::new(dir.path());

        let loads: Vec<_> = (0..8)
            .map(|_| {
                let state = state.clone();
                tokio::spawn(async move { state.dataset().await })
            })
            .collect();

        let mut datasets = Vec::new();
        for load in loads {
            datasets.push(load.await.unwrap().unwrap());
        }
        assert!(datasets.iter().all(|d| Arc::ptr_eq(d, &datasets[0])));
        assert_eq!(datasets[0].records.len(), 3);
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempdir().unwrap();
        let base = spawn(dir.path()).await;
        let (status, body) = get_json(&format!("{}/health", base)).await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");
    }
}
