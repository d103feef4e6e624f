use chrono_tz::Tz;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Allowed CORS origins. Required unless cors_permissive is true.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Explicitly allow all origins (development only). Defaults to false.
    #[serde(default)]
    pub cors_permissive: bool,
    /// Site and line the board tracks
    #[serde(default)]
    pub stop: StopConfig,
    /// Upstream fetch configuration
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Grouping and capacity policy for the departure board
    #[serde(default)]
    pub board: BoardConfig,
    /// Refresh loop configuration
    #[serde(default)]
    pub refresh: RefreshConfig,
}

/// Which stop and line the board tracks
#[derive(Debug, Clone, Deserialize)]
pub struct StopConfig {
    /// SL Transport site id (default: 1285, Stora Essingen)
    #[serde(default = "StopConfig::default_site_id")]
    pub site_id: String,
    /// Line designation to keep (default: "1")
    #[serde(default = "StopConfig::default_line")]
    pub line: String,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            site_id: Self::default_site_id(),
            line: Self::default_line(),
        }
    }
}

impl StopConfig {
    fn default_site_id() -> String {
        "1285".to_string()
    }
    fn default_line() -> String {
        "1".to_string()
    }
}

/// Configuration for fetching departures from the SL Transport API
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Base URL of the SL Transport API
    #[serde(default = "FetchConfig::default_base_url")]
    pub base_url: String,
    /// Forecast window in minutes passed to the API (default: 60)
    #[serde(default = "FetchConfig::default_forecast_minutes")]
    pub forecast_minutes: u32,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "FetchConfig::default_timeout_secs")]
    pub timeout_secs: u64,
    /// Fallback proxies tried in order after the direct endpoint fails
    #[serde(default = "FetchConfig::default_proxies")]
    pub proxies: Vec<ProxyConfig>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            forecast_minutes: Self::default_forecast_minutes(),
            timeout_secs: Self::default_timeout_secs(),
            proxies: Self::default_proxies(),
        }
    }
}

impl FetchConfig {
    fn default_base_url() -> String {
        "https://transport.integration.sl.se/v1".to_string()
    }
    fn default_forecast_minutes() -> u32 {
        60
    }
    fn default_timeout_secs() -> u64 {
        30
    }
    fn default_proxies() -> Vec<ProxyConfig> {
        vec![
            ProxyConfig {
                prefix: "https://api.allorigins.win/get?url=".to_string(),
                response: ProxyMode::Wrapped,
            },
            ProxyConfig {
                prefix: "https://cors-anywhere.herokuapp.com/".to_string(),
                response: ProxyMode::Direct,
            },
            ProxyConfig {
                prefix: "https://api.codetabs.com/v1/proxy?quest=".to_string(),
                response: ProxyMode::Direct,
            },
        ]
    }
}

/// One fallback proxy: the target URL is appended to the prefix as-is
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    pub prefix: String,
    /// Shape of the body the proxy returns (default: direct)
    #[serde(default)]
    pub response: ProxyMode,
}

/// How a proxy returns the upstream body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyMode {
    /// Body is the upstream payload unchanged
    #[default]
    Direct,
    /// Body is `{"contents": "<upstream payload as a JSON string>"}`
    Wrapped,
}

/// Grouping and capacity policy for the departure board
#[derive(Debug, Clone, Deserialize)]
pub struct BoardConfig {
    /// Which departure field decides group membership (default: destination)
    #[serde(default)]
    pub group_by: GroupBy,
    /// Expected group keys, matched in this order
    #[serde(default = "BoardConfig::default_expected_groups")]
    pub expected_groups: Vec<String>,
    /// Maximum departures kept per group (default: 2)
    #[serde(default = "BoardConfig::default_per_group")]
    pub per_group: usize,
    /// Minimum departures delivered overall, topped up from leftovers (default: 4)
    #[serde(default = "BoardConfig::default_min_total")]
    pub min_total: usize,
    /// Placeholder shown when the provider omits the destination
    #[serde(default = "BoardConfig::default_unknown_destination")]
    pub unknown_destination: String,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            group_by: GroupBy::default(),
            expected_groups: Self::default_expected_groups(),
            per_group: Self::default_per_group(),
            min_total: Self::default_min_total(),
            unknown_destination: Self::default_unknown_destination(),
        }
    }
}

impl BoardConfig {
    fn default_expected_groups() -> Vec<String> {
        vec!["Fridhemsplan".to_string(), "Stora Essingen".to_string()]
    }
    fn default_per_group() -> usize {
        2
    }
    fn default_min_total() -> usize {
        4
    }
    fn default_unknown_destination() -> String {
        "Okänd destination".to_string()
    }
}

/// Grouping axis, fixed per deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    /// Keys match destination names case-insensitively by substring
    #[default]
    Destination,
    /// Keys match the direction field exactly
    Direction,
}

/// Refresh loop configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    /// Interval in seconds between refresh cycles (default: 30)
    #[serde(default = "RefreshConfig::default_interval_secs")]
    pub interval_secs: u64,
    /// Timezone used for generated timestamps (default: Europe/Stockholm)
    #[serde(default = "RefreshConfig::default_timezone")]
    pub timezone: Tz,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: Self::default_interval_secs(),
            timezone: Self::default_timezone(),
        }
    }
}

impl RefreshConfig {
    fn default_interval_secs() -> u64 {
        30
    }
    fn default_timezone() -> Tz {
        chrono_tz::Europe::Stockholm
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
}
