//! Runtime configuration read from the environment; flags override it in `main`.

use std::fmt;
use std::time::Duration;

use api::HttpApiConfig;
use realtime::RealtimeConfig;
use services::PoolConfig;

pub const DEFAULT_API_URL: &str = "http://localhost:8080/api";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid { key: &'static str, raw: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid { key, raw } => write!(f, "invalid {key} value: {raw}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_url: String,
    pub token: Option<String>,
    pub realtime: RealtimeConfig,
    pub pool: PoolConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_owned(),
            token: None,
            realtime: RealtimeConfig::default(),
            pool: PoolConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reads `DRILL_API_URL`, `DRILL_WS_URL`, `DRILL_TOKEN`, `DRILL_PAGE_SIZE`,
    /// `DRILL_LOW_WATERMARK` and `DRILL_COMPLETION_DELAY_MS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = non_empty(lookup("DRILL_API_URL")) {
            config.api_url = url;
        }
        if let Some(url) = non_empty(lookup("DRILL_WS_URL")) {
            config.realtime.ws_url = url;
        }
        config.token = non_empty(lookup("DRILL_TOKEN"));
        if let Some(raw) = non_empty(lookup("DRILL_PAGE_SIZE")) {
            config.pool.page_size = parse_positive("DRILL_PAGE_SIZE", &raw)?;
        }
        if let Some(raw) = non_empty(lookup("DRILL_LOW_WATERMARK")) {
            config.pool.low_watermark = raw
                .parse()
                .map_err(|_| ConfigError::Invalid { key: "DRILL_LOW_WATERMARK", raw })?;
        }
        if let Some(raw) = non_empty(lookup("DRILL_COMPLETION_DELAY_MS")) {
            let millis: u64 = raw
                .parse()
                .map_err(|_| ConfigError::Invalid { key: "DRILL_COMPLETION_DELAY_MS", raw })?;
            config.realtime.completion_delay = Duration::from_millis(millis);
        }
        Ok(config)
    }

    pub fn http(&self) -> Result<HttpApiConfig, ConfigError> {
        HttpApiConfig::parse(&self.api_url).map_err(|_| ConfigError::Invalid {
            key: "api url",
            raw: self.api_url.clone(),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

pub fn parse_positive(key: &'static str, raw: &str) -> Result<u32, ConfigError> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| ConfigError::Invalid {
            key,
            raw: raw.to_owned(),
        })
}
