//! Settings: TOML file, then environment overrides, then CLI flags.
//!
//! Every section is defaulted, so an empty (or missing) file is a valid
//! configuration apart from the client credentials.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::BatchParams;
use crate::domain::{CloudFilter, RenderRecipe, TimeWindow};
use crate::retry::RetryPolicy;

pub const DEFAULT_TOKEN_URL: &str =
    "https://identity.dataspace.copernicus.eu/auth/realms/CDSE/protocol/openid-connect/token";
pub const DEFAULT_BASE_URL: &str = "https://sh.dataspace.copernicus.eu";

/// Longest accepted lookback window.
pub const MAX_LOOKBACK_DAYS: u32 = 365;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

fn invalid(key: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        message: message.into(),
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    pub timeout_secs: u64,

    /// Refresh this long before the token expires.
    pub margin_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            timeout_secs: 30,
            margin_secs: 60,
        }
    }
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("token_url", &self.token_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("margin_secs", &self.margin_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub collection: String,
    pub catalog_timeout_secs: u64,
    pub render_timeout_secs: u64,

    /// Items per catalog page.
    pub page_limit: u32,

    /// Stop following `next` tokens after this many pages.
    pub max_pages: u32,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            collection: "sentinel-2-l2a".to_string(),
            catalog_timeout_secs: 60,
            render_timeout_secs: 90,
            page_limit: 50,
            max_pages: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub lookback_days: u32,
    pub cloud_ceiling: Option<f64>,
    pub allow_unknown_cloud: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            cloud_ceiling: None,
            allow_unknown_cloud: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let standard = RetryPolicy::standard();
        Self {
            max_attempts: standard.max_attempts,
            base_delay_ms: standard.base_delay.as_millis() as u64,
            multiplier: standard.multiplier,
            max_delay_ms: standard.max_delay.as_millis() as u64,
            jitter: standard.jitter,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    pub concurrency: usize,
    pub deadline_secs: Option<u64>,
    pub aoi_timeout_secs: Option<u64>,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            deadline_secs: None,
            aoi_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub aoi_file: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            aoi_file: PathBuf::from("data/aois.json"),
            output_dir: PathBuf::from("output"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub auth: AuthSettings,
    pub api: ApiSettings,
    pub search: SearchSettings,
    pub retry: RetrySettings,
    pub batch: BatchSettings,
    pub paths: PathSettings,
    pub recipe: RenderRecipe,
}

impl Settings {
    /// Load `path` (when given) and apply process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Environment variables win over file values.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_empty("SH_CLIENT_ID") {
            self.auth.client_id = v;
        }
        if let Some(v) = non_empty("SH_CLIENT_SECRET") {
            self.auth.client_secret = v;
        }
        if let Some(v) = non_empty("SH_TOKEN_URL") {
            self.auth.token_url = v;
        }
        if let Some(v) = non_empty("SH_BASE_URL") {
            self.api.base_url = v;
        }
        if let Some(v) = non_empty("OUTPUT_DIR") {
            self.paths.output_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty("AOI_FILE") {
            self.paths.aoi_file = PathBuf::from(v);
        }
    }

    /// `require_credentials` is false for commands that never call the
    /// remote APIs (`aois`, `status`).
    pub fn validate(&self, require_credentials: bool) -> Result<(), ConfigError> {
        if require_credentials {
            if self.auth.client_id.trim().is_empty() {
                return Err(invalid("auth.client_id", "missing (set SH_CLIENT_ID)"));
            }
            if self.auth.client_secret.trim().is_empty() {
                return Err(invalid("auth.client_secret", "missing (set SH_CLIENT_SECRET)"));
            }
        }
        if self.batch.concurrency == 0 {
            return Err(invalid("batch.concurrency", "must be at least 1"));
        }
        if !(1..=MAX_LOOKBACK_DAYS).contains(&self.search.lookback_days) {
            return Err(invalid(
                "search.lookback_days",
                format!("must be within 1..={MAX_LOOKBACK_DAYS}"),
            ));
        }
        if let Some(ceiling) = self.search.cloud_ceiling
            && !(0.0..=100.0).contains(&ceiling)
        {
            return Err(invalid("search.cloud_ceiling", format!("{ceiling} is outside 0..=100")));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(invalid("retry.jitter", "must be within 0..=1"));
        }
        if self.retry.multiplier < 1.0 {
            return Err(invalid("retry.multiplier", "must be >= 1"));
        }
        if self.api.page_limit == 0 || self.api.max_pages == 0 {
            return Err(invalid("api.page_limit", "page limit and max pages must be positive"));
        }
        self.recipe.validate().map_err(|m| invalid("recipe", m))?;
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            multiplier: self.retry.multiplier,
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            jitter: self.retry.jitter,
        }
    }

    pub fn cloud_filter(&self) -> CloudFilter {
        CloudFilter {
            ceiling: self.search.cloud_ceiling,
            allow_unknown: self.search.allow_unknown_cloud,
        }
    }

    pub fn window(&self, now: DateTime<Utc>) -> TimeWindow {
        TimeWindow::lookback(now, chrono::Duration::days(i64::from(self.search.lookback_days)))
    }

    pub fn batch_params(&self, now: DateTime<Utc>) -> BatchParams {
        BatchParams {
            window: self.window(now),
            cloud: self.cloud_filter(),
            recipe: self.recipe.clone(),
            concurrency_limit: self.batch.concurrency,
            deadline: self.batch.deadline_secs.map(Duration::from_secs),
            aoi_timeout: self.batch.aoi_timeout_secs.map(Duration::from_secs),
        }
    }
}
