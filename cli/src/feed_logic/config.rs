use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lib_dashboard::ingestors::{GeneratorConfig, PollingConfig, SocketConfig};
use lib_dashboard::model::{DashboardFilter, TimeRange};

const DEFAULT_CONFIG_FILE: &str = "dashboard_feed.conf";

/// Where dashboard events come from.
#[derive(ValueEnum, Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeedSource {
    /// Random demo data, no backend needed.
    #[default]
    Demo,
    /// The backend's WebSocket feed.
    Live,
}

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Headless runner for the e-commerce dashboard feed", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "DASHBOARD_SOURCE", value_enum, help = "Event source: demo or live.")]
    pub source: Option<FeedSource>,

    #[clap(long, env = "DASHBOARD_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "DASHBOARD_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "DASHBOARD_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "DASHBOARD_WS_URL", help = "Dashboard WebSocket feed URL.")]
    pub ws_url: Option<String>,

    #[clap(long, env = "DASHBOARD_RECONNECT_BASE_MS", help = "Delay in milliseconds before the first reconnect attempt.")]
    pub reconnect_base_ms: Option<u64>,

    #[clap(long, env = "DASHBOARD_MAX_RECONNECT_ATTEMPTS", help = "Reconnect attempts before giving up.")]
    pub max_reconnect_attempts: Option<u32>,

    #[clap(long, env = "DASHBOARD_TICK_PERIOD_MS", help = "Demo generator tick period in milliseconds.")]
    pub tick_period_ms: Option<u64>,

    #[clap(long, env = "DASHBOARD_API_URL", help = "REST base URL for the fallback poller. Polling is off when unset.")]
    pub api_url: Option<String>,

    #[clap(long, env = "DASHBOARD_SUMMARY_INTERVAL_SECS", help = "Seconds between printed state summaries.")]
    pub summary_interval_secs: Option<u64>,

    #[clap(long, env = "DASHBOARD_TIME_RANGE", help = "Initial sales window (1h, 24h, 7d, 30d).")]
    pub time_range: Option<TimeRange>,

    #[clap(long, env = "DASHBOARD_CATEGORY", help = "Initial category filter.")]
    pub category: Option<String>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            source: other.source.or(self.source),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            ws_url: other.ws_url.or(self.ws_url),
            reconnect_base_ms: other.reconnect_base_ms.or(self.reconnect_base_ms),
            max_reconnect_attempts: other.max_reconnect_attempts.or(self.max_reconnect_attempts),
            tick_period_ms: other.tick_period_ms.or(self.tick_period_ms),
            api_url: other.api_url.or(self.api_url),
            summary_interval_secs: other.summary_interval_secs.or(self.summary_interval_secs),
            time_range: other.time_range.or(self.time_range),
            category: other.category.or(self.category),
        }
    }

    fn defaults() -> Config {
        let socket = SocketConfig::default();
        let generator = GeneratorConfig::default();
        Config {
            source: Some(FeedSource::Demo),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            ws_url: Some(socket.url),
            reconnect_base_ms: Some(socket.reconnect_base.as_millis() as u64),
            max_reconnect_attempts: Some(socket.max_reconnect_attempts),
            tick_period_ms: Some(generator.tick_period.as_millis() as u64),
            summary_interval_secs: Some(10),
            time_range: Some(TimeRange::default()),
            ..Default::default()
        }
    }
}

/// Fully resolved runner settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub source: FeedSource,
    pub socket: SocketConfig,
    pub generator: GeneratorConfig,
    pub api_url: Option<String>,
    pub polling: PollingConfig,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub summary_interval: Duration,
    pub filter: DashboardFilter,
}

impl From<Config> for Settings {
    fn from(config: Config) -> Self {
        let socket_defaults = SocketConfig::default();
        let generator_defaults = GeneratorConfig::default();
        Settings {
            source: config.source.unwrap_or_default(),
            socket: SocketConfig {
                url: config.ws_url.unwrap_or(socket_defaults.url),
                reconnect_base: config
                    .reconnect_base_ms
                    .map(Duration::from_millis)
                    .unwrap_or(socket_defaults.reconnect_base),
                max_reconnect_attempts: config
                    .max_reconnect_attempts
                    .unwrap_or(socket_defaults.max_reconnect_attempts),
                ..socket_defaults
            },
            generator: GeneratorConfig {
                tick_period: config
                    .tick_period_ms
                    .map(Duration::from_millis)
                    .unwrap_or(generator_defaults.tick_period),
                ..generator_defaults
            },
            api_url: config.api_url,
            polling: PollingConfig::default(),
            log_dir: config.log_dir.unwrap_or_else(|| PathBuf::from("./logs")),
            log_level: config.log_level.unwrap_or_else(|| "info".to_string()),
            summary_interval: Duration::from_secs(config.summary_interval_secs.unwrap_or(10).max(1)),
            filter: DashboardFilter {
                time_range: config.time_range.unwrap_or_default(),
                category: config.category,
            },
        }
    }
}

fn read_file_config(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config = serde_json::from_str::<Config>(&text)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(Some(config))
}

/// Layers defaults, the JSON config file and CLI/env arguments, in that order.
pub fn resolve(cli_args: Config) -> Result<Settings> {
    let config_file_path = cli_args
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = Config::defaults();
    if let Some(file_config) = read_file_config(&config_file_path)? {
        current_config = current_config.merge(file_config);
    }
    current_config = current_config.merge(cli_args);

    Ok(current_config.into())
}

pub fn load_config() -> Result<Settings> {
    resolve(Config::parse())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Config {
        let mut argv = vec!["dashboard_feed"];
        argv.extend_from_slice(extra);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_match_the_library_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.conf");
        let settings = resolve(args(&["--config-path", missing.to_str().unwrap()])).unwrap();

        assert_eq!(settings.source, FeedSource::Demo);
        assert_eq!(settings.socket.url, "ws://localhost:3001/ws");
        assert_eq!(settings.socket.reconnect_base, Duration::from_millis(3000));
        assert_eq!(settings.socket.max_reconnect_attempts, 10);
        assert_eq!(settings.generator.tick_period, Duration::from_secs(3));
        assert_eq!(settings.filter, DashboardFilter::default());
        assert!(settings.api_url.is_none());
    }

    #[test]
    fn cli_overrides_file_which_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashboard_feed.conf");
        fs::write(
            &path,
            r#"{ "source": "live", "wsUrl": "ws://feed.internal/ws", "tickPeriodMs": 500, "timeRange": "7d" }"#,
        )
        .unwrap();

        let settings = resolve(args(&[
            "--config-path",
            path.to_str().unwrap(),
            "--tick-period-ms",
            "250",
            "--category",
            "Fitness",
        ]))
        .unwrap();

        assert_eq!(settings.source, FeedSource::Live);
        assert_eq!(settings.socket.url, "ws://feed.internal/ws");
        assert_eq!(settings.generator.tick_period, Duration::from_millis(250));
        assert_eq!(settings.filter.time_range, TimeRange::Week);
        assert_eq!(settings.filter.category.as_deref(), Some("Fitness"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.conf");
        fs::write(&path, "{ not json").unwrap();
        assert!(resolve(args(&["--config-path", path.to_str().unwrap()])).is_err());
    }

    #[test]
    fn unknown_time_range_is_rejected_by_the_parser() {
        assert!(Config::try_parse_from(["dashboard_feed", "--time-range", "2w"]).is_err());
    }
}
