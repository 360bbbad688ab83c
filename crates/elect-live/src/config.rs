//! Configuration of the live data layer.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LiveError, Result};
use crate::fetch::cachebust_token;

/// Environment variable that disables the curtain when non-empty.
pub const DISABLE_CURTAIN_ENV: &str = "ELECT_DISABLE_CURTAIN";

/// Environment variable holding a manual directory override.
pub const OVERRIDE_DIRECTORY_ENV: &str = "ELECT_OVERRIDE_DIRECTORY";

/// Where to find the results and how often to look.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Origin of the results server.
    pub base_url: String,
    /// Path of the pointer file.
    pub latest_file_path: String,
    /// Path under which snapshot directories are published.
    pub data_file_base: String,
    /// Seconds between pointer file polls.
    pub poll_interval_secs: u64,
    /// Width of the cache-busting window, in seconds.
    pub cachebust_window_secs: u64,
    /// Request timeout in seconds. Transport defaults apply when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    /// Show results even while the operators hold them back.
    pub disable_curtain: bool,
    /// Fixed snapshot directory, bypassing the pointer file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_directory: Option<String>,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            latest_file_path: "/data/latest.json".to_string(),
            data_file_base: "/data".to_string(),
            poll_interval_secs: 60,
            cachebust_window_secs: 30,
            request_timeout_secs: None,
            disable_curtain: false,
            override_directory: None,
        }
    }
}

impl LiveConfig {
    /// Load a TOML configuration file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            LiveError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&text)?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    #[must_use]
    pub fn apply_env(self) -> Self {
        self.apply_env_with(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`.
    ///
    /// Any non-empty value of [`DISABLE_CURTAIN_ENV`] disables the curtain,
    /// `"0"` and `"false"` included.
    #[must_use]
    pub fn apply_env_with(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if lookup(DISABLE_CURTAIN_ENV).is_some_and(|value| !value.is_empty()) {
            self.disable_curtain = true;
        }
        if let Some(directory) = lookup(OVERRIDE_DIRECTORY_ENV).filter(|d| !d.is_empty()) {
            self.override_directory = Some(directory);
        }
        self
    }

    /// Check the configuration for values that cannot work.
    pub fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.base_url)
            .map_err(|e| LiveError::Config(format!("invalid base_url {:?}: {e}", self.base_url)))?;
        if self.poll_interval_secs == 0 {
            return Err(LiveError::Config(
                "poll_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.cachebust_window_secs == 0 {
            return Err(LiveError::Config(
                "cachebust_window_secs must be greater than 0".to_string(),
            ));
        }
        if self.request_timeout_secs == Some(0) {
            return Err(LiveError::Config(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Interval between pointer file polls.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Width of the cache-busting window.
    #[must_use]
    pub fn cachebust_window(&self) -> Duration {
        Duration::from_secs(self.cachebust_window_secs)
    }

    /// Request timeout, if configured.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// URL of the pointer file for a request made at `now`.
    #[must_use]
    pub fn latest_file_url(&self, now: DateTime<Utc>) -> String {
        format!(
            "{}{}?cachebust={}",
            self.base(),
            self.latest_file_path,
            cachebust_token(now, self.cachebust_window())
        )
    }

    /// URL of a data file. `path` is the resource path,
    /// `/{directory}{logical path}`.
    #[must_use]
    pub fn data_file_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base(), self.data_file_base, path)
    }

    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = LiveConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.cachebust_window(), Duration::from_secs(30));
        assert!(config.request_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_urls() {
        let config = LiveConfig {
            base_url: "https://results.example/".to_string(),
            ..LiveConfig::default()
        };
        let now = Utc.timestamp_millis_opt(60_000).unwrap();
        assert_eq!(
            config.latest_file_url(now),
            "https://results.example/data/latest.json?cachebust=2"
        );
        assert_eq!(
            config.data_file_url("/20190324T2000/SummaryJSON.json"),
            "https://results.example/data/20190324T2000/SummaryJSON.json"
        );
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "base_url = \"https://results.example\"").unwrap();
        writeln!(file, "poll_interval_secs = 15").unwrap();

        let config = LiveConfig::load(file.path()).unwrap();
        assert_eq!(config.base_url, "https://results.example");
        assert_eq!(config.poll_interval_secs, 15);
        assert_eq!(config.latest_file_path, "/data/latest.json");
    }

    #[test]
    fn test_toml_round_trip() {
        let config = LiveConfig {
            request_timeout_secs: Some(10),
            override_directory: Some("20190324T2000".to_string()),
            ..LiveConfig::default()
        };
        let text = toml::to_string(&config).unwrap();
        assert_eq!(toml::from_str::<LiveConfig>(&text).unwrap(), config);
    }

    #[test]
    fn test_load_errors() {
        let missing = LiveConfig::load(Path::new("/nonexistent/elect-live.toml"));
        assert!(matches!(missing, Err(LiveError::Config(_))));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "poll_interval_secs = \"soon\"").unwrap();
        assert!(matches!(
            LiveConfig::load(file.path()),
            Err(LiveError::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (DISABLE_CURTAIN_ENV, "0"),
            (OVERRIDE_DIRECTORY_ENV, "20190324T1900"),
        ]);
        let config =
            LiveConfig::default().apply_env_with(|name| env.get(name).map(|v| v.to_string()));
        assert!(config.disable_curtain);
        assert_eq!(config.override_directory.as_deref(), Some("20190324T1900"));

        let config = LiveConfig::default()
            .apply_env_with(|name| (name == DISABLE_CURTAIN_ENV).then(String::new));
        assert!(!config.disable_curtain);
    }

    #[test]
    fn test_validate_rejects() {
        let bad_url = LiveConfig {
            base_url: "not a url".to_string(),
            ..LiveConfig::default()
        };
        assert!(matches!(bad_url.validate(), Err(LiveError::Config(_))));

        let zero_poll = LiveConfig {
            poll_interval_secs: 0,
            ..LiveConfig::default()
        };
        assert!(zero_poll.validate().is_err());
    }
}
