// Service configuration
//
// One explicit object handed to every component constructor. Nothing below
// the binary reads the process environment directly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use tracing::warn;

use crate::downloader::tools::{find_ytdlp, ToolCommand};

/// Path segment the static file server exposes artifacts under.
pub const FILES_ROUTE: &str = "files";

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DOWNLOADS_DIR: &str = "/tmp/downloads";

lazy_static! {
    static ref FILESIZE_RE: Regex = Regex::new(r"^\d+(?:\.\d+)?[KkMmGg]?$").unwrap();
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("failed to prepare downloads directory")]
    DownloadsDir(#[source] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory artifacts are written to and served from
    pub downloads_dir: PathBuf,
    /// Public origin download links are built from
    pub base_url: String,
    /// Maximum artifact age before the sweeper deletes it
    pub retention: Duration,
    pub sweep_interval: Duration,
    /// How to launch yt-dlp
    pub tool: ToolCommand,
    /// Passed as `--ffmpeg-location` when set
    pub ffmpeg_location: Option<PathBuf>,
    /// yt-dlp `--max-filesize` value, e.g. `200M`
    pub max_filesize: String,
    pub socket_timeout: Duration,
    pub retries: u32,
    pub fragment_retries: u32,
    /// Ceiling for the metadata dump
    pub info_timeout: Duration,
    /// Window for the first progress line
    pub idle_timeout: Duration,
    /// Window for the whole transfer, counted from the first progress line
    pub active_timeout: Duration,
    /// Time between the termination signal and the forced kill
    pub termination_grace: Duration,
    /// Artifacts smaller than this are treated as corrupt
    pub min_artifact_bytes: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            downloads_dir: PathBuf::from(DEFAULT_DOWNLOADS_DIR),
            base_url: format!("http://localhost:{}", DEFAULT_PORT),
            retention: Duration::from_secs(2 * 60 * 60),
            sweep_interval: Duration::from_secs(30 * 60),
            tool: ToolCommand::new(find_ytdlp()),
            ffmpeg_location: None,
            max_filesize: "200M".to_string(),
            socket_timeout: Duration::from_secs(60),
            retries: 2,
            fragment_retries: 2,
            info_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(120),
            active_timeout: Duration::from_secs(300),
            termination_grace: Duration::from_secs(5),
            min_artifact_bytes: 1024,
        }
    }
}

impl ServiceConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(dir) = get("DOWNLOADS_DIR") {
            config.downloads_dir = PathBuf::from(dir);
        }

        let port = match get("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                name: "PORT",
                value: raw,
                reason: "expected a port number",
            })?,
            None => DEFAULT_PORT,
        };
        config.base_url = get("BASE_URL").unwrap_or_else(|| format!("http://localhost:{}", port));

        if let Some(raw) = get("FILE_RETENTION_HOURS") {
            let hours = raw.parse::<f64>().ok().filter(|h| h.is_finite() && *h > 0.0);
            config.retention = match hours {
                Some(hours) => Duration::from_secs_f64(hours * 3600.0),
                None => {
                    return Err(ConfigError::InvalidValue {
                        name: "FILE_RETENTION_HOURS",
                        value: raw,
                        reason: "expected a positive number of hours",
                    })
                }
            };
        }

        if let Some(minutes) = parse_positive(&get, "CLEANUP_INTERVAL_MINUTES")? {
            config.sweep_interval = Duration::from_secs(minutes * 60);
        }

        if let Some(raw) = get("MAX_FILE_SIZE") {
            if !FILESIZE_RE.is_match(&raw) {
                return Err(ConfigError::InvalidValue {
                    name: "MAX_FILE_SIZE",
                    value: raw,
                    reason: "expected a size such as 200M",
                });
            }
            config.max_filesize = raw;
        }

        if let Some(bin) = get("YTDLP_BIN") {
            config.tool = ToolCommand::new(bin);
        } else if let Some(python) = get("YTDLP_PYTHON") {
            config.tool = ToolCommand::python_module(python);
        }

        config.ffmpeg_location = get("FFMPEG_LOCATION").map(PathBuf::from);

        if let Some(secs) = parse_positive(&get, "INFO_TIMEOUT_SECS")? {
            config.info_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_positive(&get, "IDLE_TIMEOUT_SECS")? {
            config.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_positive(&get, "ACTIVE_TIMEOUT_SECS")? {
            config.active_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub fn with_downloads_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.downloads_dir = dir.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_tool(mut self, tool: ToolCommand) -> Self {
        self.tool = tool;
        self
    }

    pub fn with_ffmpeg_location(mut self, location: Option<PathBuf>) -> Self {
        self.ffmpeg_location = location;
        self
    }

    pub fn with_max_filesize(mut self, max_filesize: impl Into<String>) -> Self {
        self.max_filesize = max_filesize.into();
        self
    }

    pub fn with_info_timeout(mut self, timeout: Duration) -> Self {
        self.info_timeout = timeout;
        self
    }

    /// Set the idle and active download windows.
    pub fn with_timeouts(mut self, idle: Duration, active: Duration) -> Self {
        self.idle_timeout = idle;
        self.active_timeout = active;
        self
    }

    pub fn with_termination_grace(mut self, grace: Duration) -> Self {
        self.termination_grace = grace;
        self
    }

    pub fn with_min_artifact_bytes(mut self, bytes: u64) -> Self {
        self.min_artifact_bytes = bytes;
        self
    }

    /// Public link for an artifact: `{base_url}/files/{filename}`.
    pub fn download_url(&self, filename: &str) -> String {
        format!("{}/{}/{}", self.base_url.trim_end_matches('/'), FILES_ROUTE, filename)
    }

    /// Create the artifact directory if it does not exist yet.
    pub async fn prepare_downloads_dir(&self) -> Result<(), ConfigError> {
        tokio::fs::create_dir_all(&self.downloads_dir)
            .await
            .map_err(ConfigError::DownloadsDir)?;
        set_dir_mode(&self.downloads_dir).await;
        Ok(())
    }
}

fn parse_positive<G>(get: &G, name: &'static str) -> Result<Option<u64>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        None => Ok(None),
        Some(raw) => match raw.parse::<u64>() {
            Ok(value) if value > 0 => Ok(Some(value)),
            _ => Err(ConfigError::InvalidValue {
                name,
                value: raw,
                reason: "expected a positive integer",
            }),
        },
    }
}

#[cfg(unix)]
async fn set_dir_mode(dir: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o755)).await {
        warn!(error = %e, "could not set downloads directory permissions");
    }
}

#[cfg(not(unix))]
async fn set_dir_mode(_dir: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_service_limits() {
        let config = ServiceConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.downloads_dir, PathBuf::from("/tmp/downloads"));
        assert_eq!(config.base_url, "http://localhost:3000");
        assert_eq!(config.retention, Duration::from_secs(7200));
        assert_eq!(config.sweep_interval, Duration::from_secs(1800));
        assert_eq!(config.max_filesize, "200M");
        assert_eq!(config.idle_timeout, Duration::from_secs(120));
        assert_eq!(config.active_timeout, Duration::from_secs(300));
        assert_eq!(config.min_artifact_bytes, 1024);
    }

    #[test]
    fn builders_override_individual_limits() {
        let config = ServiceConfig::default()
            .with_retention(Duration::from_secs(60))
            .with_sweep_interval(Duration::from_secs(5))
            .with_max_filesize("1G")
            .with_info_timeout(Duration::from_secs(10))
            .with_min_artifact_bytes(1);
        assert_eq!(config.retention, Duration::from_secs(60));
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert_eq!(config.max_filesize, "1G");
        assert_eq!(config.info_timeout, Duration::from_secs(10));
        assert_eq!(config.min_artifact_bytes, 1);
        assert_eq!(config.idle_timeout, Duration::from_secs(120));
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("DOWNLOADS_DIR", "/srv/media"),
            ("PORT", "8080"),
            ("FILE_RETENTION_HOURS", "0.5"),
            ("CLEANUP_INTERVAL_MINUTES", "5"),
            ("MAX_FILE_SIZE", "500M"),
            ("YTDLP_PYTHON", "/venv/bin/python"),
            ("IDLE_TIMEOUT_SECS", "180"),
        ]))
        .unwrap();
        assert_eq!(config.downloads_dir, PathBuf::from("/srv/media"));
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.retention, Duration::from_secs(1800));
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.max_filesize, "500M");
        assert_eq!(config.tool, ToolCommand::python_module("/venv/bin/python"));
        assert_eq!(config.idle_timeout, Duration::from_secs(180));
    }

    #[test]
    fn explicit_base_url_wins_over_port() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("BASE_URL", "https://dl.example.com/"),
        ]))
        .unwrap();
        assert_eq!(config.download_url("a.mp4"), "https://dl.example.com/files/a.mp4");
    }

    #[test]
    fn malformed_values_are_rejected() {
        for (name, value) in [
            ("PORT", "eighty"),
            ("FILE_RETENTION_HOURS", "-1"),
            ("CLEANUP_INTERVAL_MINUTES", "0"),
            ("MAX_FILE_SIZE", "lots"),
            ("ACTIVE_TIMEOUT_SECS", "5m"),
        ] {
            let err = ServiceConfig::from_lookup(lookup(&[(name, value)])).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { name: n, .. } if n == name),
                "{} should be rejected",
                name
            );
        }
    }

    #[tokio::test]
    async fn prepares_nested_downloads_dir() {
        let root = tempfile::tempdir().unwrap();
        let config = ServiceConfig::default().with_downloads_dir(root.path().join("a").join("b"));
        config.prepare_downloads_dir().await.unwrap();
        assert!(config.downloads_dir.is_dir());
    }
}
