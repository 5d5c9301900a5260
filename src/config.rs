//! Configuration management for geonft.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::enforcer::nft_path;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/geonft/config.yaml";

/// nft identifiers are limited in length
const MAX_SET_NAME_LEN: usize = 64;

/// Whether `name` can be used as an nftables set name prefix.
pub fn is_valid_set_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    name.len() <= MAX_SET_NAME_LEN && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the db-ip CSV files
    pub database_path: PathBuf,

    /// Directory the generated `<set_name>.nft` is written to
    pub output_dir: PathBuf,

    /// Set name prefix; the sets are `<set_name>_ipv4` and `<set_name>_ipv6`
    pub set_name: String,

    /// Path of the nft binary
    pub nft_binary: String,

    /// Refuse fallback databases older than this many days (unset: any age)
    pub max_dataset_age_days: Option<u64>,

    /// Database download settings
    pub download: DownloadConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("/var/lib/dbip"),
            output_dir: PathBuf::from("/etc"),
            set_name: "geo_set".to_string(),
            nft_binary: nft_path().to_string(),
            max_dataset_age_days: None,
            download: DownloadConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load `path`, falling back to the defaults when the default
    /// location does not exist. An explicitly given file must exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() && path == Path::new(DEFAULT_CONFIG_PATH) {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !is_valid_set_name(&self.set_name) {
            anyhow::bail!(
                "Invalid set_name '{}'. Use letters, digits and '_', starting with a letter (max {} chars)",
                self.set_name,
                MAX_SET_NAME_LEN
            );
        }

        if self.nft_binary.trim().is_empty() {
            anyhow::bail!("nft_binary must not be empty");
        }

        if self.download.enabled && !self.download.base_url.starts_with("https://") {
            anyhow::bail!(
                "Download base_url must use HTTPS: {}",
                self.download.base_url
            );
        }

        if self.download.timeout_secs == 0 {
            anyhow::bail!("Download timeout_secs must be greater than 0");
        }

        Ok(())
    }

    /// Path of the generated artifact.
    pub fn artifact_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.nft", self.set_name))
    }

    pub fn max_dataset_age(&self) -> Option<Duration> {
        self.max_dataset_age_days
            .map(|days| Duration::from_secs(days * 86_400))
    }
}

/// Database download settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Fetch the current month's databases before generating
    pub enabled: bool,

    /// Where the gzipped databases are published
    pub base_url: String,

    /// Per-file HTTP timeout
    pub timeout_secs: u64,

    /// Delete databases of previous months once the current one is present
    pub cleanup: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://download.db-ip.com/free/".to_string(),
            timeout_secs: 300,
            cleanup: true,
        }
    }
}

impl DownloadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.set_name, "geo_set");
        assert_eq!(config.database_path, PathBuf::from("/var/lib/dbip"));
        assert_eq!(config.artifact_path(), PathBuf::from("/etc/geo_set.nft"));
        assert!(config.max_dataset_age().is_none());
        assert!(config.download.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serialize_deserialize() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.set_name, config.set_name);
        assert_eq!(parsed.download.base_url, config.download.base_url);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let parsed: Config =
            serde_yaml::from_str("set_name: blocked\nmax_dataset_age_days: 62\ndownload:\n  cleanup: false\n")
                .unwrap();
        assert_eq!(parsed.set_name, "blocked");
        assert_eq!(parsed.max_dataset_age(), Some(Duration::from_secs(62 * 86_400)));
        assert!(!parsed.download.cleanup);
        assert!(parsed.download.enabled);
        assert_eq!(parsed.output_dir, PathBuf::from("/etc"));
    }

    #[test]
    fn test_valid_set_name() {
        assert!(is_valid_set_name("geo_set"));
        assert!(is_valid_set_name("G1"));
        assert!(!is_valid_set_name(""));
        assert!(!is_valid_set_name("1geo"));
        assert!(!is_valid_set_name("_geo"));
        assert!(!is_valid_set_name("geo-set"));
        assert!(!is_valid_set_name("geo set"));
        assert!(!is_valid_set_name("geo;flush ruleset"));
        assert!(!is_valid_set_name(&"a".repeat(65)));
    }

    #[test]
    fn test_config_validation_invalid_set_name() {
        let config = Config {
            set_name: "bad name".to_string(),
            ..Default::default()
        };
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid set_name"));
    }

    #[test]
    fn test_config_validation_http_url_rejected() {
        let config = Config {
            download: DownloadConfig {
                base_url: "http://download.db-ip.com/free/".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("HTTPS"));
    }

    #[test]
    fn test_http_url_allowed_when_download_disabled() {
        let config = Config {
            download: DownloadConfig {
                enabled: false,
                base_url: "http://mirror.local/".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "set_name: geo_block\noutput_dir: /tmp/out\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.artifact_path(), PathBuf::from("/tmp/out/geo_block.nft"));
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "set_name: 'bad;name'\n").unwrap();
        assert!(Config::load(&path).is_err());

        fs::write(&path, "set_name: [unclosed\n").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_load_or_default_explicit_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load_or_default(dir.path().join("missing.yaml")).is_err());
    }
}
