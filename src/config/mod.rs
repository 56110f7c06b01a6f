use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::app::{FelixError, Result};

pub const DEFAULT_FETCH_INTERVAL: Duration = Duration::from_secs(65 * 60);
pub const DEFAULT_USER_AGENT: &str = "felix";
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_CLEANUP_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_FEED_OUTPUT_MAX_AGE: Duration = Duration::from_secs(6 * 60 * 60);
pub const DEFAULT_PORT: u16 = 6554;

const DEFAULT_DUPLICATES_WINDOW: usize = 100;

/// Main configuration, read from a YAML file at startup.
///
/// Missing keys fall back to their defaults; an unreadable or invalid file
/// is fatal.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    #[serde(deserialize_with = "duration_string::deserialize")]
    pub fetch_interval: Duration,
    pub user_agent: String,
    #[serde(deserialize_with = "duration_string::deserialize")]
    pub cleanup_interval: Duration,
    #[serde(deserialize_with = "duration_string::deserialize")]
    pub cleanup_max_age: Duration,
    #[serde(deserialize_with = "duration_string::deserialize")]
    pub feed_output_max_age: Duration,
    pub port: u16,
    pub feeds: Vec<FeedConfig>,
    pub item_filters: Vec<ItemFilterConfig>,
    pub link_filters: Vec<LinkFilterConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fetch_interval: DEFAULT_FETCH_INTERVAL,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            cleanup_max_age: DEFAULT_CLEANUP_MAX_AGE,
            feed_output_max_age: DEFAULT_FEED_OUTPUT_MAX_AGE,
            port: DEFAULT_PORT,
            feeds: Vec::new(),
            item_filters: Vec::new(),
            link_filters: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FelixError::Config(format!("could not read {}: {e}", path.display()))
        })?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| FelixError::Config(format!("could not parse config: {e}")))
    }
}

/// Configuration of a single feed. Only `rss` feeds are supported.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedConfig {
    #[serde(rename = "type")]
    pub feed_type: String,
    pub url: String,
    #[serde(default, deserialize_with = "duration_string::deserialize_option")]
    pub fetch_interval: Option<Duration>,
}

/// Item filter configuration. The `type` key selects the variant; the
/// remaining keys are decoded into it.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ItemFilterConfig {
    Title { titles: Vec<String> },
}

/// Link filter configuration, keyed by `type` like [`ItemFilterConfig`].
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LinkFilterConfig {
    Domain {
        domains: Vec<String>,
    },
    Regex {
        exprs: Vec<String>,
    },
    FilenameAsTitle {
        #[serde(default, rename = "trimExt")]
        trim_ext: bool,
    },
    ExpandUploadedLinks,
    Duplicates {
        #[serde(default = "default_duplicates_window")]
        size: usize,
    },
}

fn default_duplicates_window() -> usize {
    DEFAULT_DUPLICATES_WINDOW
}

/// Go-style duration strings: a number with a `s`, `m`, `h` or `d` suffix,
/// or raw seconds.
pub mod duration_string {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn parse(s: &str) -> Result<Duration, String> {
        let s = s.trim().to_lowercase();

        let secs = if let Some(days) = s.strip_suffix('d') {
            days.parse::<u64>()
                .map(|d| d * 86400)
                .map_err(|_| format!("Invalid days: {days}"))?
        } else if let Some(hours) = s.strip_suffix('h') {
            hours
                .parse::<u64>()
                .map(|h| h * 3600)
                .map_err(|_| format!("Invalid hours: {hours}"))?
        } else if let Some(minutes) = s.strip_suffix('m') {
            minutes
                .parse::<u64>()
                .map(|m| m * 60)
                .map_err(|_| format!("Invalid minutes: {minutes}"))?
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map_err(|_| format!("Invalid seconds: {secs}"))?
        } else {
            s.parse::<u64>()
                .map_err(|_| format!("Invalid duration: {s}. Use a format like 65m, 1h or 1d"))?
        };

        Ok(Duration::from_secs(secs))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }

    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        s.map(|s| parse(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
