use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::auth::{Principal, Role};
use crate::engine::{EngineError, FixedHours};

const PREFIX: &str = "COURTSIDE_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub key: String,
    pub value: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid value for {}: {:?}", self.key, self.value)
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub store_timeout: Duration,
    /// WAL appends since the last compaction that trigger the next one.
    pub compact_threshold: u64,
    pub opening_hours: FixedHours,
    /// `(token, principal)` pairs for the static identity provider.
    pub tokens: Vec<(String, Principal)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            store_timeout: Duration::from_millis(5000),
            compact_threshold: 1000,
            opening_hours: FixedHours::default(),
            tokens: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value source. Unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            let key = format!("{PREFIX}{name}");
            lookup(&key).map(|value| (key, value))
        };
        let mut config = Config::default();

        if let Some((_, dir)) = get("DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(kv) = get("METRICS_PORT") {
            config.metrics_port = Some(parse(kv)?);
        }
        if let Some(kv) = get("STORE_TIMEOUT_MS") {
            config.store_timeout = Duration::from_millis(parse(kv)?);
        }
        if let Some(kv) = get("COMPACT_THRESHOLD") {
            config.compact_threshold = parse(kv)?;
        }

        let open = get("OPEN_HOUR");
        let close = get("CLOSE_HOUR");
        if open.is_some() || close.is_some() {
            let open_hour = open.clone().map(parse).transpose()?.unwrap_or(8);
            let close_hour = close.clone().map(parse).transpose()?.unwrap_or(22);
            config.opening_hours = FixedHours::new(open_hour, close_hour).map_err(|e| {
                let offending = match e {
                    EngineError::Invalid { field: "close_hour", .. } => close.clone(),
                    _ => open.clone().or(close.clone()),
                };
                let (key, value) = offending.unwrap_or_default();
                ConfigError { key, value }
            })?;
        }

        if let Some((key, value)) = get("TOKENS") {
            config.tokens = parse_tokens(&value).ok_or(ConfigError { key, value })?;
        }
        Ok(config)
    }
}

fn parse<T: FromStr>((key, value): (String, String)) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError { key, value })
}

/// `token=subject:role[,token=subject:role...]`. Blank entries are skipped.
fn parse_tokens(value: &str) -> Option<Vec<(String, Principal)>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (token, identity) = entry.split_once('=')?;
            let (subject, role) = identity.split_once(':')?;
            let (token, subject, role) = (token.trim(), subject.trim(), role.trim());
            if token.is_empty() || subject.is_empty() || role.is_empty() {
                return None;
            }
            Some((
                token.to_string(),
                Principal {
                    subject: subject.to_string(),
                    role: Role::from_claim(role),
                },
            ))
        })
        .collect()
}
