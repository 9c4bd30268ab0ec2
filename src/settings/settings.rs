use anyhow::{Result, anyhow};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub http: Http,
    pub log: Log,
    pub storage: Storage,
    pub token: Token,
    pub reaper: Reaper,
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub address: String,
    pub request_timeout_ms: u64,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Memory,
    Real,
}

#[derive(Deserialize)]
pub struct Storage {
    pub backend: Backend,
    pub mysql_dsn: String,
    pub redis_dsn: String,
    pub max_connections: u32,
    pub op_timeout_ms: u64,
}

// DSNs carry passwords and settings get logged at startup.
impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("backend", &self.backend)
            .field("mysql_dsn", &"<redacted>")
            .field("redis_dsn", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .field("op_timeout_ms", &self.op_timeout_ms)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
pub struct Token {
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Reaper {
    pub interval_secs: u64,
}

impl Http {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Storage {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

impl Reaper {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

/// Environment overrides look like `TOLLGATE__STORAGE__REDIS_DSN`.
pub const ENV_PREFIX: &str = "TOLLGATE";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .set_default("http.address", "127.0.0.1:8080")?
        .set_default("http.request_timeout_ms", 5_000)?
        .set_default("log.filter", "info")?
        .set_default("storage.backend", "memory")?
        .set_default("storage.mysql_dsn", "")?
        .set_default("storage.redis_dsn", "")?
        .set_default("storage.max_connections", 10)?
        .set_default("storage.op_timeout_ms", 500)?
        .set_default("token.access_ttl_secs", 24 * 60 * 60)?
        .set_default("token.refresh_ttl_secs", 7 * 24 * 60 * 60)?
        .set_default("reaper.interval_secs", 60 * 60)?
        .add_source(File::with_name(path))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    if settings.token.access_ttl_secs == 0
        || settings.token.refresh_ttl_secs <= settings.token.access_ttl_secs
    {
        return Err(anyhow!(
            "refresh_ttl_secs must exceed access_ttl_secs, and both must be positive"
        ));
    }
    if settings.reaper.interval_secs == 0 {
        return Err(anyhow!("reaper.interval_secs must be positive"));
    }

    Ok(settings)
}
