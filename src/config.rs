use std::collections::HashSet;
use std::path::Path;

use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::model::{AssetSpec, Interval, Lookback};

const ENV_INGEST_URL: &str = "TELEGRAM_INGEST_URL";
const ENV_CHAT_ID: &str = "PROVIDER_GROUP_ID";

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_base_url() -> String {
    "https://query1.finance.yahoo.com".into()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_requests_per_second() -> u32 {
    4
}

fn default_user_agent() -> String {
    concat!("market-pulse/", env!("CARGO_PKG_VERSION")).into()
}

fn default_batch_interval() -> String {
    "60m".into()
}

fn default_batch_lookback() -> String {
    "60d".into()
}

fn default_rsi_period() -> usize {
    14
}

fn default_ingest_url() -> String {
    "http://localhost:3000/api/telegram/ingest".into()
}

fn default_chat_name() -> String {
    "PROVIDER_GROUP".into()
}

fn default_source() -> String {
    "PROVIDER".into()
}

/// The asset table used when no `[[assets]]` entries are configured.
pub fn default_assets() -> Vec<AssetSpec> {
    [
        ("Gold", "GC=F"),
        ("Silver", "SI=F"),
        ("Platinum", "PL=F"),
        ("WTI_Oil", "CL=F"),
        ("EURUSD", "EURUSD=X"),
        ("GBPUSD", "GBPUSD=X"),
        ("USDJPY", "JPY=X"),
        ("AUDUSD", "AUDUSD=X"),
        ("NZDUSD", "NZDUSD=X"),
        ("USDCAD", "CAD=X"),
        ("USDCHF", "CHF=X"),
        ("USDMXN", "MXN=X"),
        ("USDZAR", "ZAR=X"),
        ("USDHKD", "HKD=X"),
        ("USDTRY", "TRY=X"),
        ("USDSEK", "SEK=X"),
        ("USDNOK", "NOK=X"),
        ("USDCNH", "CNH=X"),
        ("USDSGD", "SGD=X"),
        ("USDINR", "INR=X"),
        ("USDPLN", "PLN=X"),
        ("USDTHB", "THB=X"),
        ("USDIDR", "IDR=X"),
        ("USDHUF", "HUF=X"),
    ]
    .into_iter()
    .map(|(name, symbol)| AssetSpec::new(name, symbol))
    .collect()
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default = "default_assets")]
    pub assets: Vec<AssetSpec>,
    #[serde(default)]
    pub relay: RelayConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            provider: ProviderConfig::default(),
            batch: BatchConfig::default(),
            assets: default_assets(),
            relay: RelayConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            requests_per_second: default_requests_per_second(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_batch_interval")]
    pub interval: String,
    #[serde(default = "default_batch_lookback")]
    pub lookback: String,
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            interval: default_batch_interval(),
            lookback: default_batch_lookback(),
            rsi_period: default_rsi_period(),
        }
    }
}

/// Parsed form of `[batch]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchSettings {
    pub interval: Interval,
    pub lookback: Lookback,
    pub rsi_period: usize,
}

impl BatchConfig {
    pub fn settings(&self) -> Result<BatchSettings, Report<ConfigError>> {
        let interval = Interval::parse(&self.interval).ok_or_else(|| {
            Report::new(ConfigError::Validation {
                field: format!("batch.interval: unknown interval \"{}\"", self.interval),
            })
        })?;
        let lookback = Lookback::parse(&self.lookback).ok_or_else(|| {
            Report::new(ConfigError::Validation {
                field: format!("batch.lookback: unknown lookback \"{}\"", self.lookback),
            })
        })?;
        if self.rsi_period == 0 {
            return Err(Report::new(ConfigError::Validation {
                field: "batch.rsi_period must be > 0".into(),
            }));
        }
        Ok(BatchSettings {
            interval,
            lookback,
            rsi_period: self.rsi_period,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_ingest_url")]
    pub ingest_url: String,
    /// Chat whose messages are relayed; required by relay mode.
    pub chat_id: Option<i64>,
    #[serde(default = "default_chat_name")]
    pub chat_name: String,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ingest_url: default_ingest_url(),
            chat_id: None,
            chat_name: default_chat_name(),
            source: default_source(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RelayConfig {
    pub fn require_chat_id(&self) -> Result<i64, Report<ConfigError>> {
        self.chat_id.ok_or_else(|| {
            Report::new(ConfigError::Missing {
                name: format!("relay.chat_id (or {ENV_CHAT_ID})"),
            })
        })
    }
}

/// Load configuration from `path`, or use built-in defaults when `None`.
///
/// Environment overrides are applied afterwards, then the result is validated.
pub fn load(path: Option<&Path>) -> Result<AppConfig, Report<ConfigError>> {
    let mut config = match path {
        Some(path) => read_file(path)?,
        None => AppConfig::default(),
    };

    apply_env(&mut config, |name| std::env::var(name).ok())?;
    validate(&config)?;

    Ok(config)
}

fn read_file(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    toml::from_str(&content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })
}

fn apply_env(
    config: &mut AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), Report<ConfigError>> {
    if let Some(url) = lookup(ENV_INGEST_URL) {
        config.relay.ingest_url = url;
    }
    if let Some(raw) = lookup(ENV_CHAT_ID) {
        let chat_id = raw.trim().parse::<i64>().change_context(ConfigError::Validation {
            field: format!("{ENV_CHAT_ID}: \"{raw}\" is not an integer chat id"),
        })?;
        config.relay.chat_id = Some(chat_id);
    }
    Ok(())
}

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_log_format(config)?;
    validate_provider(config)?;
    config.batch.settings()?;
    validate_assets(config)?;
    Ok(())
}

fn validate_log_format(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    match config.general.log_format.as_str() {
        "text" | "json" => Ok(()),
        other => Err(Report::new(ConfigError::Validation {
            field: format!("general.log_format \"{other}\" is not \"text\" or \"json\""),
        })),
    }
}

fn validate_provider(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if config.provider.requests_per_second == 0 {
        return Err(Report::new(ConfigError::Validation {
            field: "provider.requests_per_second must be > 0".into(),
        }));
    }
    if config.provider.timeout_secs == 0 {
        return Err(Report::new(ConfigError::Validation {
            field: "provider.timeout_secs must be > 0".into(),
        }));
    }
    Ok(())
}

fn validate_assets(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let mut seen = HashSet::new();
    for asset in &config.assets {
        if asset.display_name.trim().is_empty() || asset.provider_symbol.trim().is_empty() {
            return Err(Report::new(ConfigError::Validation {
                field: format!(
                    "assets[name={:?}, symbol={:?}]: name and symbol must be non-empty",
                    asset.display_name, asset.provider_symbol
                ),
            }));
        }
        if !seen.insert(asset.display_name.as_str()) {
            return Err(Report::new(ConfigError::Validation {
                field: format!("assets: duplicate name \"{}\"", asset.display_name),
            }));
        }
    }
    Ok(())
}
