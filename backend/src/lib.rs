//! # MaStR battery - German battery storage registry pipeline
//!
//! Fetches large battery storage units from the Marktstammdatenregister,
//! stores them as timestamped JSON snapshots, and turns the newest snapshot
//! into filtered dashboard views.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  MaStR API  │────▶│  Snapshot   │────▶│  Normalize  │────▶│ Filter/Agg  │
//! │   (paged)   │     │ (JSON file) │     │  (derived)  │     │  (views)    │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mastr_battery::{load_latest, build_view, FilterQuery};
//!
//! let dataset = load_latest(Path::new("."))?;
//! let view = build_view(&dataset.records, &FilterQuery::default());
//! println!("{} units, {:.1} MWh", view.summary.total_units, view.summary.total_capacity_mwh);
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types per layer
//! - [`config`] - Environment configuration
//! - [`models`] - Raw and normalized records, technology and size tables
//! - [`snapshot`] - Snapshot naming, selection and loading
//! - [`transform`] - Normalization, filtering, aggregation
//! - [`cache`] - Path + mtime keyed dataset cache
//! - [`dashboard`] - Map, table, chart and filter option views
//! - [`fetch`] - MaStR registry client
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Snapshots
pub mod snapshot;
pub mod fetch;

// Transformation
pub mod transform;

// Caching
pub mod cache;

// Views
pub mod dashboard;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, ExportError, FetchError, FetchResult, FilterError, ServerError, ServerResult, SnapshotError,
    SnapshotResult,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    BatteryTechnology, NormalizedRecord, RawRecord, SizeBucket, SizeCategory, SizeUnit,
    UNKNOWN_TECHNOLOGY,
};

// =============================================================================
// Re-exports - Snapshots
// =============================================================================

pub use snapshot::{find_latest_snapshot, is_snapshot_name, load_records, select_latest};

// =============================================================================
// Re-exports - Transform
// =============================================================================

pub use transform::{
    apply_filters, build_view, load_dataset, load_latest, normalize_record, normalize_records,
    parse_registry_date, summarize, Criterion, Dataset, FilterQuery, Summary, View,
};

// =============================================================================
// Re-exports - Cache, views, fetch
// =============================================================================

pub use cache::SnapshotCache;
pub use config::AppConfig;
pub use dashboard::{chart_data, export_csv, filter_options, map_points, table_rows};
pub use fetch::{fetch_snapshot, FetchOptions, FetchProfile, MastrClient};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
