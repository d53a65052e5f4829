use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

/// A feed registered on start-up if it is not already stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFeed {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,

    #[serde(default = "default_feed_delay")]
    pub feed_delay_secs: u64,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,

    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,

    #[serde(default = "default_max_entries")]
    pub max_entries_per_feed: usize,

    #[serde(default = "default_article_list_limit")]
    pub article_list_limit: usize,

    #[serde(default)]
    pub feeds: Vec<SeedFeed>,

    #[serde(default)]
    pub keywords: Vec<String>,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("feedwatch");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("news.db").to_string_lossy().to_string()
}

fn default_scan_interval() -> u64 {
    1800
}

fn default_feed_delay() -> u64 {
    2
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_error_backoff() -> u64 {
    60
}

fn default_stop_timeout() -> u64 {
    5
}

fn default_max_entries() -> usize {
    20
}

fn default_article_list_limit() -> usize {
    20
}

fn default_seed_feeds() -> Vec<SeedFeed> {
    vec![
        SeedFeed {
            name: "BBC News".to_string(),
            url: "http://feeds.bbci.co.uk/news/rss.xml".to_string(),
        },
        SeedFeed {
            name: "CNN".to_string(),
            url: "http://rss.cnn.com/rss/edition.rss".to_string(),
        },
    ]
}

fn default_seed_keywords() -> Vec<String> {
    ["technology", "AI", "Python", "programming", "tech"]
        .iter()
        .map(|k| k.to_string())
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            scan_interval_secs: default_scan_interval(),
            feed_delay_secs: default_feed_delay(),
            fetch_timeout_secs: default_fetch_timeout(),
            error_backoff_secs: default_error_backoff(),
            stop_timeout_secs: default_stop_timeout(),
            max_entries_per_feed: default_max_entries(),
            article_list_limit: default_article_list_limit(),
            feeds: default_seed_feeds(),
            keywords: default_seed_keywords(),
        }
    }
}

impl Config {
    /// Loads the config from the default location, writing defaults on first run.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&content)?;
            config.check()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(config_path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("feedwatch")
            .join("config.toml")
    }

    fn check(&self) -> Result<()> {
        if self.scan_interval_secs == 0 {
            return Err(AppError::Config(
                "scan_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(AppError::Config(
                "fetch_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.stop_timeout_secs == 0 {
            return Err(AppError::Config(
                "stop_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_entries_per_feed == 0 {
            return Err(AppError::Config(
                "max_entries_per_feed must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: Config = toml::from_str(r#"db_path = "/tmp/x.db""#).unwrap();
        assert_eq!(config.db_path, "/tmp/x.db");
        assert_eq!(config.scan_interval_secs, 1800);
        assert_eq!(config.feed_delay_secs, 2);
        assert_eq!(config.max_entries_per_feed, 20);
        assert!(config.feeds.is_empty());
        assert!(config.keywords.is_empty());
    }

    #[test]
    fn seeds_parse_from_toml() {
        let config: Config = toml::from_str(
            r#"
            keywords = ["rust", "AI"]

            [[feeds]]
            name = "Example"
            url = "https://example.com/feed.xml"
            "#,
        )
        .unwrap();
        assert_eq!(config.keywords, vec!["rust", "AI"]);
        assert_eq!(
            config.feeds,
            vec![SeedFeed {
                name: "Example".to_string(),
                url: "https://example.com/feed.xml".to_string(),
            }]
        );
    }

    #[test]
    fn load_writes_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.keywords.len(), 5);

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.feeds, config.feeds);
        assert_eq!(reloaded.scan_interval_secs, config.scan_interval_secs);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "scan_interval_secs = 0\n").unwrap();

        assert!(matches!(Config::load_from(&path), Err(AppError::Config(_))));
    }

    #[test]
    fn zero_stop_timeout_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "stop_timeout_secs = 0\n").unwrap();

        match Config::load_from(&path) {
            Err(AppError::Config(msg)) => assert!(msg.contains("stop_timeout_secs")),
            other => panic!("expected a config error, got {other:?}"),
        }
    }
}
