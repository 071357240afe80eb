//! MaStR registry client.
//!
//! Pages through the public "erweiterte Einheiten" endpoint with an OData
//! style filter and writes the concatenated units as one snapshot file.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mastr_battery::fetch::{MastrClient, FetchOptions, fetch_snapshot};
//!
//! let client = MastrClient::from_config(&AppConfig::from_env()?)?;
//! let path = fetch_snapshot(&client, &FetchOptions::default(), Path::new(".")).await?;
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::logs::{log_info, log_success, log_warning};
use crate::config::{AppConfig, DEFAULT_MIN_CAPACITY_KWH, DEFAULT_MIN_POWER_KW, DEFAULT_PAGE_SIZE, MASTR_BASE_URL};
use crate::error::{FetchError, FetchResult};
use crate::models::{fields, BatteryTechnology};
use crate::snapshot::{ALL_PREFIX, SNAPSHOT_EXTENSION};

/// Per-request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Header carrying the API key.
const API_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Page size used when checking a single technology code.
pub const TECHNOLOGY_CHECK_PAGE_SIZE: usize = 10;

/// Codes worth checking: the known battery table and the codes right after it.
pub const TECHNOLOGY_CHECK_CODES: RangeInclusive<i64> = 727..=740;

/// Placeholder value that counts as "no key configured".
const API_KEY_PLACEHOLDER: &str = "YOUR_API_KEY";

/// Storage technology code for batteries (as opposed to pumped hydro etc.).
const BATTERY_STORAGE_TECHNOLOGY: u32 = 524;

/// Operating status code for "in Betrieb".
const STATUS_IN_OPERATION: u32 = 35;

/// Which registry query to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FetchProfile {
    /// All battery storage units, every battery technology.
    AllTechnologies,
    /// Lithium batteries currently in operation.
    LithiumInOperation,
}

/// Query thresholds and paging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchOptions {
    /// Minimum gross power in kW (inclusive).
    pub min_power_kw: u64,
    /// Minimum usable capacity in kWh (inclusive).
    pub min_capacity_kwh: u64,
    /// Units per page.
    pub page_size: usize,
    pub profile: FetchProfile,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            min_power_kw: DEFAULT_MIN_POWER_KW,
            min_capacity_kwh: DEFAULT_MIN_CAPACITY_KWH,
            page_size: DEFAULT_PAGE_SIZE,
            profile: FetchProfile::AllTechnologies,
        }
    }
}

impl FetchOptions {
    /// OData style filter string for the registry.
    ///
    /// The registry only offers `gt`, so inclusive minimums are sent as
    /// `> min - 1`.
    pub fn filter(&self) -> String {
        let mut flt = format!(
            "Bruttoleistung der Einheit~gt~{}~and~Nutzbare Speicherkapazität in kWh~gt~{}",
            self.min_power_kw.saturating_sub(1),
            self.min_capacity_kwh.saturating_sub(1),
        );
        match self.profile {
            FetchProfile::AllTechnologies => {
                flt.push_str(&format!("~and~Stromspeichertechnologie~eq~{}", BATTERY_STORAGE_TECHNOLOGY));
            }
            FetchProfile::LithiumInOperation => {
                flt.push_str(&format!(
                    "~and~Batterietechnologie~eq~{}~and~Betriebs-Status~eq~{}",
                    BatteryTechnology::Lithium.code(),
                    STATUS_IN_OPERATION
                ));
            }
        }
        flt
    }

    /// Snapshot file name for a fetch started at `at`.
    ///
    /// The timestamp comes first so names sort by recency.
    pub fn snapshot_name(&self, at: DateTime<Utc>) -> String {
        let profile = match self.profile {
            FetchProfile::AllTechnologies => "all_tech",
            FetchProfile::LithiumInOperation => "lithium",
        };
        format!(
            "{}{}_{}_{:08}kW_{:08}kWh{}",
            ALL_PREFIX,
            at.format("%Y-%m-%dT%H%M%SZ"),
            profile,
            self.min_power_kw,
            self.min_capacity_kwh,
            SNAPSHOT_EXTENSION
        )
    }
}

/// Response envelope of the registry endpoint.
#[derive(Debug, Deserialize)]
struct PageEnvelope {
    #[serde(rename = "Data", default)]
    data: Option<Vec<Value>>,
}

/// Client for the MaStR public unit endpoint.
#[derive(Clone)]
pub struct MastrClient {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl MastrClient {
    /// Create a new client with an explicit API key.
    pub fn new(api_key: impl Into<String>) -> FetchResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            api_key: api_key.into(),
            base_url: MASTR_BASE_URL.to_string(),
            http,
        })
    }

    /// Create a client from the configured key and endpoint.
    pub fn from_config(config: &AppConfig) -> FetchResult<Self> {
        match config.api_key.as_deref() {
            Some(key) if key != API_KEY_PLACEHOLDER => {
                Ok(Self::new(key)?.with_base_url(config.base_url.clone()))
            }
            _ => Err(FetchError::MissingApiKey),
        }
    }

    /// Point the client at another endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch a single page (1-based).
    pub async fn fetch_page(&self, filter: &str, page: u32, page_size: usize) -> FetchResult<Vec<Value>> {
        let response = self
            .http
            .get(&self.base_url)
            .header(API_KEY_HEADER, &self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[
                ("filter", filter.to_string()),
                ("page", page.to_string()),
                ("pageSize", page_size.to_string()),
            ])
            .send()
            .await
            .map_err(|e| FetchError::Request { page, message: e.to_string() })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { page, status: status.as_u16() });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Request { page, message: e.to_string() })?;

        let envelope: PageEnvelope = serde_json::from_str(&body)
            .map_err(|e| FetchError::InvalidBody { page, message: e.to_string() })?;

        Ok(envelope.data.unwrap_or_default())
    }

    /// Fetch every page until one comes back shorter than the page size.
    pub async fn fetch_all(&self, options: &FetchOptions) -> FetchResult<Vec<Value>> {
        let filter = options.filter();
        let page_size = options.page_size.max(1);
        log_info(format!("Using filter: {}", filter));

        let mut units = Vec::new();
        let mut page: u32 = 1;

        loop {
            log_info(format!("Fetching page {}...", page));
            let batch = self.fetch_page(&filter, page, page_size).await?;
            let batch_len = batch.len();
            log_info(format!("Page {}: Retrieved {} units", page, batch_len));
            units.extend(batch);

            if batch_len < page_size {
                log_info(format!(
                    "Last page reached (got {} units, page size was {})",
                    batch_len, page_size
                ));
                break;
            }
            page += 1;
        }

        log_success(format!("Total units retrieved: {}", units.len()));

        if options.profile == FetchProfile::AllTechnologies {
            let total = units.len();
            units = keep_battery_technologies(units);
            if units.len() < total {
                log_warning(format!(
                    "{} units dropped with a non-battery technology code",
                    total - units.len()
                ));
            }
        }

        Ok(units)
    }
}

/// Result of querying the registry for a single technology code.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnologyCheck {
    pub code: i64,
    /// Units on the first page, at most [`TECHNOLOGY_CHECK_PAGE_SIZE`].
    pub units: usize,
    /// First unit returned, if any.
    pub sample: Option<Value>,
}

impl TechnologyCheck {
    pub fn found(&self) -> bool {
        self.units > 0
    }
}

impl MastrClient {
    /// Ask the registry whether any unit carries `code` as battery technology.
    pub async fn check_technology(&self, code: i64) -> FetchResult<TechnologyCheck> {
        let filter = format!("Batterietechnologie~eq~{}", code);
        let units = self.fetch_page(&filter, 1, TECHNOLOGY_CHECK_PAGE_SIZE).await?;
        Ok(TechnologyCheck {
            code,
            units: units.len(),
            sample: units.into_iter().next(),
        })
    }

    /// Check each code in turn. A failing code does not stop the others.
    pub async fn check_technologies<I>(&self, codes: I) -> Vec<(i64, FetchResult<TechnologyCheck>)>
    where
        I: IntoIterator<Item = i64>,
    {
        let mut results = Vec::new();
        for code in codes {
            let result = self.check_technology(code).await;
            match &result {
                Ok(check) if check.found() => log_success(format!("Code {}: Found {} units", code, check.units)),
                Ok(_) => log_info(format!("Code {}: No units found", code)),
                Err(e) => log_warning(format!("Code {}: {}", code, e)),
            }
            results.push((code, result));
        }
        results
    }
}

/// Keep units whose `Batterietechnologie` is one of the known battery codes.
pub fn keep_battery_technologies(units: Vec<Value>) -> Vec<Value> {
    units
        .into_iter()
        .filter(|unit| {
            unit.get(fields::BATTERY_TECHNOLOGY)
                .and_then(BatteryTechnology::code_of)
                .is_some_and(BatteryTechnology::is_battery_code)
        })
        .collect()
}

/// Write records to `dir/name` atomically.
///
/// The data goes to a `.tmp` sibling first and is renamed into place, so a
/// half-written file never matches the snapshot naming convention.
pub fn write_snapshot(dir: &Path, name: &str, records: &[Value]) -> FetchResult<PathBuf> {
    fs::create_dir_all(dir)?;

    let target = dir.join(name);
    let temp = dir.join(format!("{}.tmp", name));
    let content = serde_json::to_string_pretty(records)?;

    fs::write(&temp, content)?;
    if let Err(e) = fs::rename(&temp, &target) {
        let _ = fs::remove_file(&temp);
        return Err(e.into());
    }
    Ok(target)
}

/// Fetch all pages and store them as a new snapshot in `dir`.
pub async fn fetch_snapshot(client: &MastrClient, options: &FetchOptions, dir: &Path) -> FetchResult<PathBuf> {
    let started = Utc::now();
    log_info(format!(
        "Starting MaStR fetch from {}: Bruttoleistung >= {} kW, Speicherkapazität >= {} kWh, profile {:?}",
        client.base_url(),
        options.min_power_kw,
        options.min_capacity_kwh,
        options.profile
    ));

    let units = client.fetch_all(options).await?;
    let path = write_snapshot(dir, &options.snapshot_name(started), &units)?;

    log_success(format!("Retrieved {} units → {}", units.len(), path.display()));
    Ok(path)
}
