use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::{info, warn};

/// Origin used when `PHOTOPORT_API_BASE` is not set (local development API).
pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000";
pub const DEFAULT_PROBE_WORKERS: usize = 4;
pub const MAX_PROBE_WORKERS: usize = 16;
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_CONTACT_EMAIL: &str = "hello@photoport.example";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Origin for the photo API and relative media paths. May be empty.
    pub api_base: String,
    /// Folder slug sent as `?folder=`.
    pub folder: Option<String>,
    /// Page size sent as `?limit=`.
    pub page_limit: Option<u32>,
    pub probe_workers: usize,
    pub fetch_timeout: Duration,
    pub contact_email: String,
    pub avatar_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            folder: None,
            page_limit: None,
            probe_workers: DEFAULT_PROBE_WORKERS,
            fetch_timeout: Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS),
            contact_email: DEFAULT_CONTACT_EMAIL.to_string(),
            avatar_path: None,
        }
    }
}

impl Config {
    /// Read configuration from `PHOTOPORT_*` environment variables.
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_base = match lookup("PHOTOPORT_API_BASE") {
            Some(base) => base.trim().to_string(),
            None => {
                warn!("PHOTOPORT_API_BASE not set, using default: {DEFAULT_API_BASE}");
                DEFAULT_API_BASE.to_string()
            }
        };

        let probe_workers = try_parse(&lookup, "PHOTOPORT_PROBE_WORKERS", DEFAULT_PROBE_WORKERS)
            .clamp(1, MAX_PROBE_WORKERS);
        let timeout_ms = try_parse(&lookup, "PHOTOPORT_FETCH_TIMEOUT_MS", DEFAULT_FETCH_TIMEOUT_MS)
            .max(1);

        let config = Self {
            api_base,
            folder: non_empty(lookup("PHOTOPORT_FOLDER")),
            page_limit: optional_parse(&lookup, "PHOTOPORT_PAGE_LIMIT").filter(|l| *l > 0),
            probe_workers,
            fetch_timeout: Duration::from_millis(timeout_ms),
            contact_email: non_empty(lookup("PHOTOPORT_CONTACT_EMAIL"))
                .unwrap_or_else(|| DEFAULT_CONTACT_EMAIL.to_string()),
            avatar_path: non_empty(lookup("PHOTOPORT_AVATAR")).map(PathBuf::from),
        };

        info!(
            api_base = %config.api_base,
            folder = ?config.folder,
            probe_workers = config.probe_workers,
            "Loaded configuration"
        );
        config
    }

    /// URL of the photo list endpoint.
    pub fn photos_endpoint(&self) -> String {
        format!("{}/api/photos/", self.api_base.trim_end_matches('/'))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn optional_parse<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = non_empty(lookup(key))?;
    raw.parse()
        .map_err(|e| {
            warn!("Invalid {key} value {raw:?}: {e}");
        })
        .ok()
}

fn try_parse<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    optional_parse(lookup, key).unwrap_or_else(|| {
        info!("{key} not set or invalid, using default: {default}");
        default
    })
}
