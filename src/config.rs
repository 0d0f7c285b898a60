use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ConfigError;
use crate::watcher::{MAX_CYCLE_TIMEOUT, WatcherSettings};
use crate::watcher::schedule::Schedule;

// =============================================================================
// Defaults
// =============================================================================

/// Hourly, on the hour
pub const DEFAULT_CRON: &str = "0 * * * *";

pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Overall cycle timeout in seconds (10 minutes)
pub const DEFAULT_CYCLE_TIMEOUT_SECS: u64 = 600;

/// Per-image resolution timeout in seconds
pub const DEFAULT_IMAGE_TIMEOUT_SECS: u64 = 60;

/// Per-request registry HTTP timeout in seconds
pub const DEFAULT_REGISTRY_TIMEOUT_SECS: u64 = 15;

pub const DEFAULT_WATCHER_NAME: &str = "local";

/// Top-level configuration file
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    /// Provider id to raw credential object, validated by each provider
    pub registries: BTreeMap<String, Value>,
    pub watchers: BTreeMap<String, WatcherConfig>,
    pub registry_timeout: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            registries: BTreeMap::new(),
            watchers: BTreeMap::from([(DEFAULT_WATCHER_NAME.to_string(), WatcherConfig::default())]),
            registry_timeout: DEFAULT_REGISTRY_TIMEOUT_SECS,
        }
    }
}

impl AppConfig {
    /// Load the configuration file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Ok(serde_json::from_str(&content)?)
    }

    pub fn registry_timeout(&self) -> Duration {
        Duration::from_secs(self.registry_timeout)
    }
}

/// One watcher per container runtime endpoint
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct WatcherConfig {
    /// Docker socket path; local defaults when absent
    pub socket: Option<String>,
    pub cron: Option<String>,
    /// Seconds between cycles, exclusive with `cron`
    pub interval: Option<u64>,
    pub watch_by_default: bool,
    pub watch_at_start: bool,
    pub include_tags: Option<String>,
    pub exclude_tags: Option<String>,
    pub max_concurrency: usize,
    pub cycle_timeout: u64,
    pub image_timeout: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            socket: None,
            cron: None,
            interval: None,
            watch_by_default: true,
            watch_at_start: true,
            include_tags: None,
            exclude_tags: None,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            cycle_timeout: DEFAULT_CYCLE_TIMEOUT_SECS,
            image_timeout: DEFAULT_IMAGE_TIMEOUT_SECS,
        }
    }
}

impl WatcherConfig {
    pub fn validate(
        &self,
        name: &str,
        registry_timeout: Duration,
    ) -> Result<WatcherSettings, ConfigError> {
        let schedule = match (&self.cron, self.interval) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::watcher(
                    name,
                    "cron and interval are mutually exclusive",
                ));
            }
            (None, Some(0)) => return Err(ConfigError::watcher(name, "interval must be positive")),
            (None, Some(secs)) => Schedule::Interval(Duration::from_secs(secs)),
            (cron, None) => {
                let expression = cron.as_deref().unwrap_or(DEFAULT_CRON);
                Schedule::cron(expression).map_err(|e| {
                    ConfigError::watcher(name, format!("invalid cron {:?}: {}", expression, e))
                })?
            }
        };

        for (field, pattern) in [
            ("includeTags", &self.include_tags),
            ("excludeTags", &self.exclude_tags),
        ] {
            if let Some(pattern) = pattern
                && let Err(e) = regex::Regex::new(pattern)
            {
                return Err(ConfigError::watcher(name, format!("invalid {}: {}", field, e)));
            }
        }

        if self.max_concurrency == 0 {
            return Err(ConfigError::watcher(name, "maxConcurrency must be at least 1"));
        }

        let cycle_timeout = Duration::from_secs(self.cycle_timeout);
        let image_timeout = Duration::from_secs(self.image_timeout);
        if cycle_timeout > MAX_CYCLE_TIMEOUT {
            return Err(ConfigError::watcher(
                name,
                format!("cycleTimeout must not exceed {} seconds", MAX_CYCLE_TIMEOUT.as_secs()),
            ));
        }
        if image_timeout.is_zero() || image_timeout >= cycle_timeout {
            return Err(ConfigError::watcher(
                name,
                "imageTimeout must be positive and shorter than cycleTimeout",
            ));
        }
        if registry_timeout >= image_timeout {
            return Err(ConfigError::watcher(
                name,
                "registryTimeout must be shorter than imageTimeout",
            ));
        }

        Ok(WatcherSettings {
            name: name.to_string(),
            schedule,
            watch_at_start: self.watch_at_start,
            watch_by_default: self.watch_by_default,
            include_tags: self.include_tags.clone(),
            exclude_tags: self.exclude_tags.clone(),
            max_concurrency: self.max_concurrency,
            cycle_timeout,
            image_timeout,
        })
    }
}

/// Returns the path to the configuration directory for tagwatch.
/// Uses $XDG_CONFIG_HOME/tagwatch if XDG_CONFIG_HOME is set,
/// otherwise falls back to ~/.config/tagwatch,
/// or ./tagwatch if neither is available.
pub fn config_dir() -> PathBuf {
    config_dir_with_env(std::env::var("XDG_CONFIG_HOME").ok(), dirs::home_dir())
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("config.json")
}

fn config_dir_with_env(xdg_config_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let config_dir = xdg_config_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));

    config_dir.join("tagwatch")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;
    use std::io::Write;

    const REGISTRY_TIMEOUT: Duration = Duration::from_secs(15);

    #[test]
    fn app_config_from_partial_object_uses_defaults_for_missing_fields() {
        let result = serde_json::from_value::<AppConfig>(json!({
            "registries": {
                "hub": { "login": "me", "token": "secret" }
            }
        }))
        .unwrap();

        assert_eq!(result.registry_timeout, DEFAULT_REGISTRY_TIMEOUT_SECS);
        assert_eq!(result.watchers, AppConfig::default().watchers);
        assert_eq!(result.registries["hub"], json!({ "login": "me", "token": "secret" }));
    }

    #[test]
    fn watcher_config_from_full_object_parses_all_fields() {
        let result = serde_json::from_value::<WatcherConfig>(json!({
            "socket": "/var/run/docker.sock",
            "interval": 300,
            "watchByDefault": false,
            "watchAtStart": false,
            "includeTags": "^\\d+\\.\\d+\\.\\d+$",
            "excludeTags": "rc",
            "maxConcurrency": 2,
            "cycleTimeout": 120,
            "imageTimeout": 30
        }))
        .unwrap();

        assert_eq!(
            result,
            WatcherConfig {
                socket: Some("/var/run/docker.sock".to_string()),
                cron: None,
                interval: Some(300),
                watch_by_default: false,
                watch_at_start: false,
                include_tags: Some(r"^\d+\.\d+\.\d+$".to_string()),
                exclude_tags: Some("rc".to_string()),
                max_concurrency: 2,
                cycle_timeout: 120,
                image_timeout: 30,
            }
        );
    }

    #[test]
    fn validate_defaults_to_hourly_cron() {
        let settings = WatcherConfig::default()
            .validate("local", REGISTRY_TIMEOUT)
            .unwrap();

        assert!(matches!(settings.schedule, Schedule::Cron(_)));
        assert_eq!(settings.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert_eq!(settings.image_timeout, Duration::from_secs(60));
    }

    #[test]
    fn validate_uses_interval_seconds() {
        let config = WatcherConfig {
            interval: Some(90),
            ..Default::default()
        };

        let settings = config.validate("local", REGISTRY_TIMEOUT).unwrap();

        assert!(matches!(settings.schedule, Schedule::Interval(d) if d == Duration::from_secs(90)));
    }

    #[rstest]
    #[case::cron_and_interval(WatcherConfig { cron: Some("0 * * * *".into()), interval: Some(60), ..Default::default() })]
    #[case::zero_interval(WatcherConfig { interval: Some(0), ..Default::default() })]
    #[case::bad_cron(WatcherConfig { cron: Some("whenever".into()), ..Default::default() })]
    #[case::bad_include(WatcherConfig { include_tags: Some("(".into()), ..Default::default() })]
    #[case::zero_concurrency(WatcherConfig { max_concurrency: 0, ..Default::default() })]
    #[case::image_not_shorter_than_cycle(WatcherConfig { cycle_timeout: 60, image_timeout: 60, ..Default::default() })]
    #[case::cycle_timeout_too_large(WatcherConfig { interval: Some(60), cycle_timeout: u64::MAX, ..Default::default() })]
    #[case::registry_not_shorter_than_image(WatcherConfig { image_timeout: 15, ..Default::default() })]
    fn validate_rejects_invalid_watcher(#[case] config: WatcherConfig) {
        let error = config.validate("edge", REGISTRY_TIMEOUT).unwrap_err();

        assert!(matches!(error, ConfigError::InvalidWatcher { watcher, .. } if watcher == "edge"));
    }

    #[test]
    fn load_returns_defaults_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();

        let config = AppConfig::load(&dir.path().join("config.json")).unwrap();

        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn load_parses_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"registryTimeout": 5, "watchers": {{"edge": {{"interval": 60}}}}}}"#
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();

        assert_eq!(config.registry_timeout(), Duration::from_secs(5));
        assert_eq!(config.watchers["edge"].interval, Some(60));
        assert!(!config.watchers.contains_key(DEFAULT_WATCHER_NAME));
    }

    #[test]
    fn load_reports_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let error = AppConfig::load(file.path()).unwrap_err();

        assert!(matches!(error, ConfigError::Parse(_)));
    }

    #[test]
    fn config_dir_with_env_uses_xdg_config_home_when_set() {
        let path = config_dir_with_env(
            Some("/tmp/test-config".to_string()),
            Some(PathBuf::from("/home/user")),
        );

        assert_eq!(path, PathBuf::from("/tmp/test-config/tagwatch"));
    }

    #[test]
    fn config_dir_with_env_falls_back_to_home_config() {
        let path = config_dir_with_env(None, Some(PathBuf::from("/home/user")));

        assert_eq!(path, PathBuf::from("/home/user/.config/tagwatch"));
    }

    #[test]
    fn config_dir_with_env_falls_back_to_current_dir_when_no_dirs_available() {
        let path = config_dir_with_env(None, None);
        assert_eq!(path, PathBuf::from("./tagwatch"));
    }
}
