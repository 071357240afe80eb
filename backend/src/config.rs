//! Runtime configuration.
//!
//! Values come from the process environment, after loading a `.env` file
//! if one is present. CLI flags override whatever is read here.

use std::env;
use std::path::PathBuf;

use crate::error::ConfigError;

/// MaStR endpoint for extended public unit data.
pub const MASTR_BASE_URL: &str = "https://www.marktstammdatenregister.de/MaStR/Einheit/EinheitJson/GetErweiterteOeffentlicheEinheitStromerzeugung";

/// Default minimum gross power for a fetch, in kW.
pub const DEFAULT_MIN_POWER_KW: u64 = 10_000;

/// Default minimum usable capacity for a fetch, in kWh.
pub const DEFAULT_MIN_CAPACITY_KWH: u64 = 10_000;

/// Default number of units per registry page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Default HTTP port for `serve`.
pub const DEFAULT_PORT: u16 = 3000;

/// Default snapshot directory.
pub const DEFAULT_DATA_DIR: &str = ".";

/// Application settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Directory holding snapshot files.
    pub data_dir: PathBuf,
    /// Port for the HTTP server.
    pub port: u16,
    /// Registry API key, only needed for `fetch`.
    pub api_key: Option<String>,
    /// Registry endpoint.
    pub base_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            port: DEFAULT_PORT,
            api_key: None,
            base_url: MASTR_BASE_URL.to_string(),
        }
    }
}

impl AppConfig {
    /// Load `.env` and read `MASTR_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(dir) = read("MASTR_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(port) = read("MASTR_PORT") {
            config.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidValue { key: "MASTR_PORT", value: port })?;
        }
        if let Some(url) = read("MASTR_BASE_URL") {
            config.base_url = url;
        }
        config.api_key = read("MASTR_API_KEY");

        Ok(config)
    }
}
