use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{DATA_API_BASE, GAMMA_API_BASE};

/// Default config file path.
pub const CONFIG_PATH: &str = "config.toml";

/// Top-level application config deserialized from `config.toml`.
///
/// Every section is optional; a missing file yields the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub wallets: WalletsConfig,
}

/// External data sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub data_api_base: String,
    pub gamma_api_base: String,
    /// Per-request timeout for market metadata lookups.
    pub metadata_timeout_secs: u64,
    /// Per-request timeout for trade pages.
    pub trades_timeout_secs: u64,
    /// Trades requested per wallet.
    pub trade_limit: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            data_api_base: DATA_API_BASE.to_string(),
            gamma_api_base: GAMMA_API_BASE.to_string(),
            metadata_timeout_secs: 3,
            trades_timeout_secs: 10,
            trade_limit: 100,
        }
    }
}

/// TTL tier of the lookup cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub market_ttl_secs: u64,
    pub trades_ttl_secs: u64,
    /// Maximum number of cached entries per tier.
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            market_ttl_secs: 300,
            trades_ttl_secs: 300,
            max_capacity: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Wallet fetches and market resolutions in flight at once.
    pub max_concurrency: usize,
    /// An outcome priced at or below this, or at or above `1 - this`,
    /// marks its market resolved.
    pub extreme_price_threshold: f64,
    /// Default interval for `watch`.
    pub refresh_interval_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            extreme_price_threshold: 0.05,
            refresh_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletsConfig {
    /// Wallet list file. Defaults to `~/.sharpscout/wallets.json`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl WalletsConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_wallets_path)
    }
}

fn default_wallets_path() -> PathBuf {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".sharpscout").join("wallets.json")
}

impl AppConfig {
    /// Load config from the given TOML file path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Like [`AppConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write config to the given TOML file path.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.http.trade_limit, 100);
        assert_eq!(config.http.metadata_timeout_secs, 3);
        assert_eq!(config.cache.market_ttl_secs, 300);
        assert_eq!(config.scan.max_concurrency, 4);
        assert!((config.scan.extreme_price_threshold - 0.05).abs() < 1e-12);
        assert!(config.wallets.path.is_none());
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [cache]
            trades_ttl_secs = 30

            [scan]
            max_concurrency = 1

            [wallets]
            path = "/tmp/wallets.json"
            "#,
        )
        .unwrap();
        assert_eq!(config.cache.trades_ttl_secs, 30);
        assert_eq!(config.cache.market_ttl_secs, 300);
        assert_eq!(config.scan.max_concurrency, 1);
        assert_eq!(config.scan.refresh_interval_secs, 60);
        assert_eq!(
            config.wallets.resolved_path(),
            PathBuf::from("/tmp/wallets.json")
        );
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = AppConfig::default();
        config.http.trade_limit = 25;
        config.save(&path).unwrap();
        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.http.trade_limit, 25);
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.http.data_api_base, DATA_API_BASE);
    }
}
