use crate::retry::RetryPolicy;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // path to credentials database file
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Concurrent resolution workers per batch.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    /// Page size for source catalog listings.
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
    /// Page size requested when reading the liked-items counter.
    #[serde(default = "default_liked_count_limit")]
    pub liked_count_limit: usize,
    /// Rate attempts per item before it is reported as failed.
    #[serde(default = "default_like_max_attempts")]
    pub like_max_attempts: u32,
    #[serde(default = "default_playlist_description")]
    pub playlist_description: String,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

/// Backoff policies per retry site.
/// Fields missing from a `[retry.<site>]` table keep that site's default.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(from = "RetryTables")]
pub struct RetryConfig {
    pub search: RetryPolicy,
    pub liked_count: RetryPolicy,
    pub create_playlist: RetryPolicy,
}

#[derive(Debug, Default, Deserialize)]
struct RetryTables {
    #[serde(default)]
    search: PolicyOverrides,
    #[serde(default)]
    liked_count: PolicyOverrides,
    #[serde(default)]
    create_playlist: PolicyOverrides,
}

#[derive(Debug, Default, Deserialize)]
struct PolicyOverrides {
    max_attempts: Option<u32>,
    initial_delay_ms: Option<u64>,
    multiplier: Option<f64>,
    max_delay_ms: Option<u64>,
}

impl PolicyOverrides {
    fn over(self, base: RetryPolicy) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(base.max_attempts),
            initial_delay_ms: self.initial_delay_ms.unwrap_or(base.initial_delay_ms),
            multiplier: self.multiplier.unwrap_or(base.multiplier),
            max_delay_ms: self.max_delay_ms.or(base.max_delay_ms),
        }
    }
}

impl From<RetryTables> for RetryConfig {
    fn from(t: RetryTables) -> Self {
        Self {
            search: t.search.over(default_search_retry()),
            liked_count: t.liked_count.over(default_liked_count_retry()),
            create_playlist: t.create_playlist.over(default_create_playlist_retry()),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            search: default_search_retry(),
            liked_count: default_liked_count_retry(),
            create_playlist: default_create_playlist_retry(),
        }
    }
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("music-library-migrate")
}

fn default_db_path() -> PathBuf { data_dir().join("credentials.db") }
fn default_log_dir() -> PathBuf { data_dir().join("logs") }
fn default_num_workers() -> usize { crate::resolve::NUM_WORKERS }
fn default_page_limit() -> usize { 50 }
fn default_liked_count_limit() -> usize { 5 }
fn default_like_max_attempts() -> u32 { 5 }
fn default_playlist_description() -> String { "Imported from Spotify".into() }
fn default_http_timeout() -> u64 { 30 }
fn default_search_retry() -> RetryPolicy { RetryPolicy::with_attempts(20) }
fn default_liked_count_retry() -> RetryPolicy { RetryPolicy::with_attempts(20) }
fn default_create_playlist_retry() -> RetryPolicy { RetryPolicy::with_attempts(5) }

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_dir: default_log_dir(),
            num_workers: default_num_workers(),
            page_limit: default_page_limit(),
            liked_count_limit: default_liked_count_limit(),
            like_max_attempts: default_like_max_attempts(),
            playlist_description: default_playlist_description(),
            http_timeout_secs: default_http_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    pub fn from_path(path: &std::path::Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Default config file location: `<config dir>/music-library-migrate/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("music-library-migrate").join("config.toml"))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.num_workers == 0 {
            anyhow::bail!("num_workers must be at least 1");
        }
        if self.page_limit == 0 {
            anyhow::bail!("page_limit must be at least 1");
        }
        for (name, p) in [
            ("search", &self.retry.search),
            ("liked_count", &self.retry.liked_count),
            ("create_playlist", &self.retry.create_playlist),
        ] {
            if p.max_attempts == 0 {
                anyhow::bail!("retry.{}.max_attempts must be at least 1", name);
            }
            if !(p.multiplier.is_finite() && p.multiplier >= 1.0) {
                anyhow::bail!("retry.{}.multiplier must be >= 1.0", name);
            }
        }
        Ok(())
    }
}
