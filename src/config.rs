// src/config.rs
//! Runtime configuration.
//!
//! Sources, lowest precedence first:
//! 1) built-in defaults;
//! 2) TOML file at `$NOTAM_CONFIG_PATH`, else `config/notam.toml` if present
//!    (keys are the env names in lower case, e.g. `airport_code = "KBLM"`);
//! 3) environment variables (after `.env` is loaded by the binary).
//!
//! A missing destination, airport code, pager URL or source credentials is
//! an error: the relay refuses to start rather than page into the void.

use anyhow::{anyhow, bail, Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::notify::DEFAULT_MAX_CHARS;
use crate::seen::DEFAULT_SEEN_CAP;

pub const ENV_CONFIG_PATH: &str = "NOTAM_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/notam.toml";
pub const DEFAULT_SEEN_STATE_PATH: &str = "state/seen_notams.json";
pub const DEFAULT_FAA_API_BASE_URL: &str = "https://external-api.faa.gov";
pub const DEFAULT_NOTAM_SEARCH_URL: &str = "https://notams.aim.faa.gov/notamSearch/search";

#[derive(Debug, Clone)]
pub struct Config {
    pub airport_code: String,
    pub poll_interval: Duration,
    pub destination: String,
    pub startup_probe: bool,
    pub seen_cap: usize,
    pub seen_state_path: PathBuf,
    pub delivery_delay: Duration,
    pub seed_on_cold_start: bool,
    pub allow_unstable_ids: bool,
    pub transport: TransportConfig,
    pub source: SourceConfig,
}

#[derive(Debug, Clone)]
pub enum TransportConfig {
    Pager(PagerConfig),
    /// Dry run: messages go to the log only.
    Log { max_chars: usize },
}

#[derive(Debug, Clone)]
pub struct PagerConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub max_chars: usize,
    pub timeout: Duration,
    pub retries: u8,
}

#[derive(Debug, Clone)]
pub enum SourceConfig {
    FaaApi(FaaApiConfig),
    NotamSearch(NotamSearchConfig),
    Fixture { path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct FaaApiConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub timeout: Duration,
    pub retries: u8,
    pub page_size: u32,
}

#[derive(Debug, Clone)]
pub struct NotamSearchConfig {
    pub url: String,
    pub timeout: Duration,
    pub retries: u8,
}

impl SourceConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceConfig::FaaApi(_) => "faa-api",
            SourceConfig::NotamSearch(_) => "notam-search",
            SourceConfig::Fixture { .. } => "fixture",
        }
    }
}

impl Config {
    /// Env + optional TOML file.
    pub fn load() -> Result<Self> {
        let file = load_file_values()?;
        Self::from_lookup(|key| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .or_else(|| file.get(&key.to_ascii_lowercase()).cloned())
        })
    }

    /// Build from an arbitrary key lookup (env-style upper-case keys).
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let airport_code = get("AIRPORT_CODE")
            .map(|s| s.to_ascii_uppercase())
            .ok_or_else(|| anyhow!("AIRPORT_CODE is required"))?;
        let destination =
            get("PAGER_DESTINATION").ok_or_else(|| anyhow!("PAGER_DESTINATION is required"))?;

        let max_chars = parse_or(&get, "PAGER_MAX_CHARS", DEFAULT_MAX_CHARS)?;
        let transport = match get("PAGER_TRANSPORT").as_deref().unwrap_or("pager") {
            "pager" => TransportConfig::Pager(PagerConfig {
                api_url: get("PAGER_API_URL")
                    .ok_or_else(|| anyhow!("PAGER_API_URL is required for the pager transport"))?,
                api_key: get("PAGER_API_KEY"),
                max_chars,
                timeout: Duration::from_secs(parse_or(&get, "PAGER_TIMEOUT_SECS", 10)?),
                retries: parse_or(&get, "PAGER_RETRIES", 2)?,
            }),
            "log" => TransportConfig::Log { max_chars },
            other => bail!("unsupported PAGER_TRANSPORT '{other}' (expected pager|log)"),
        };

        let source_timeout = Duration::from_secs(parse_or(&get, "SOURCE_TIMEOUT_SECS", 30)?);
        let source_retries: u8 = parse_or(&get, "SOURCE_RETRIES", 3)?;
        let source = match get("NOTAM_SOURCE").as_deref().unwrap_or("faa-api") {
            "faa-api" => SourceConfig::FaaApi(FaaApiConfig {
                base_url: get("FAA_API_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_FAA_API_BASE_URL.to_string()),
                client_id: get("FAA_CLIENT_ID")
                    .ok_or_else(|| anyhow!("FAA_CLIENT_ID is required for the faa-api source"))?,
                client_secret: get("FAA_CLIENT_SECRET").ok_or_else(|| {
                    anyhow!("FAA_CLIENT_SECRET is required for the faa-api source")
                })?,
                timeout: source_timeout,
                retries: source_retries,
                page_size: parse_or(&get, "SOURCE_PAGE_SIZE", 50)?,
            }),
            "notam-search" => SourceConfig::NotamSearch(NotamSearchConfig {
                url: get("NOTAM_SEARCH_URL")
                    .unwrap_or_else(|| DEFAULT_NOTAM_SEARCH_URL.to_string()),
                timeout: source_timeout,
                retries: source_retries,
            }),
            "fixture" => SourceConfig::Fixture {
                path: get("FIXTURE_PATH")
                    .map(PathBuf::from)
                    .ok_or_else(|| anyhow!("FIXTURE_PATH is required for the fixture source"))?,
            },
            other => bail!("unsupported NOTAM_SOURCE '{other}' (expected faa-api|notam-search|fixture)"),
        };

        let poll_interval_ms: u64 = parse_or(&get, "POLL_INTERVAL_MS", 300_000)?;
        if poll_interval_ms == 0 {
            bail!("POLL_INTERVAL_MS must be greater than zero");
        }

        // A cold start with the probe on seeds the first fetch, so the probe
        // is the only page. Without the probe a cold start redelivers all.
        let startup_probe = parse_bool_or(&get, "STARTUP_PROBE", false)?;

        Ok(Self {
            airport_code,
            poll_interval: Duration::from_millis(poll_interval_ms),
            destination,
            startup_probe,
            seen_cap: parse_or(&get, "SEEN_CAP", DEFAULT_SEEN_CAP)?.max(1),
            seen_state_path: get("SEEN_STATE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SEEN_STATE_PATH)),
            delivery_delay: Duration::from_millis(parse_or(&get, "DELIVERY_DELAY_MS", 2_000)?),
            seed_on_cold_start: parse_bool_or(&get, "SEED_ON_COLD_START", startup_probe)?,
            allow_unstable_ids: parse_bool_or(&get, "ALLOW_UNSTABLE_IDS", true)?,
            transport,
            source,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(v) => v
            .parse::<T>()
            .map_err(|e| anyhow!("invalid {key}='{v}': {e}")),
        None => Ok(default),
    }
}

fn parse_bool_or<G>(get: &G, key: &str, default: bool) -> Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => bail!("invalid {key}='{v}': expected a boolean"),
        },
    }
}

/// Read the optional TOML config file into lower-case key/value strings.
fn load_file_values() -> Result<HashMap<String, String>> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
        }
        return load_file_values_from(&pb);
    }
    let default = PathBuf::from(DEFAULT_CONFIG_PATH);
    if default.exists() {
        return load_file_values_from(&default);
    }
    Ok(HashMap::new())
}

pub fn load_file_values_from(path: &Path) -> Result<HashMap<String, String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    parse_toml_values(&content).with_context(|| format!("parsing {}", path.display()))
}

fn parse_toml_values(s: &str) -> Result<HashMap<String, String>> {
    let table: toml::Table = toml::from_str(s)?;
    let mut out = HashMap::with_capacity(table.len());
    for (k, v) in table {
        let value = match v {
            toml::Value::String(s) => s,
            toml::Value::Integer(i) => i.to_string(),
            toml::Value::Float(f) => f.to_string(),
            toml::Value::Boolean(b) => b.to_string(),
            other => bail!("config key '{k}' must be a scalar, got {}", other.type_str()),
        };
        out.insert(k.to_ascii_lowercase(), value);
    }
    Ok(out)
}
