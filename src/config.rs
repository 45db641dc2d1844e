//! Typed configuration, loaded once from TOML and validated at startup.
//!
//! Every section has defaults so an empty file (or no file) is a valid
//! starting point; `validate` is where missing required values fail.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::mount::MountKind;

const MB: f64 = 1024.0 * 1024.0;
const DEFAULT_MIN_FILE_SIZE_MB: f64 = 10.0;
const MAX_MIN_FILE_SIZE_MB: f64 = 10_000.0;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("could not determine a state directory, set [snapshots] dir")]
    NoStateDir,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub plex: PlexConfig,
    pub scan: ScanConfig,
    pub dispatch: DispatchConfig,
    pub snapshots: SnapshotConfig,
    pub daemon: DaemonConfig,
    pub logging: LoggingConfig,
    pub mounts: Vec<MountOverride>,
    pub path_mappings: Vec<PathMapping>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlexConfig {
    pub enabled: bool,
    pub url: Option<String>,
    pub token: Option<String>,
    #[serde(deserialize_with = "duration_str")]
    pub timeout: Duration,
}

impl Default for PlexConfig {
    fn default() -> Self {
        PlexConfig {
            enabled: true,
            url: None,
            token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// tree roots to watch
    pub roots: Vec<PathBuf>,
    pub exclude: Vec<PathBuf>,
    pub min_file_size_mb: f64,
    pub min_workers: usize,
    pub max_workers: usize,
    /// files stat'ed between tuning decisions
    pub batch_size: usize,
    #[serde(deserialize_with = "duration_str")]
    pub batch_delay: Duration,
    #[serde(deserialize_with = "duration_str")]
    pub max_batch_delay: Duration,
    /// overall deadline for one tree's scan
    #[serde(deserialize_with = "duration_str")]
    pub timeout: Duration,
    pub max_files: Option<usize>,
    pub max_file_size_mb: Option<f64>,
    pub error_threshold: u32,
    pub recovery_threshold: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            roots: Vec::new(),
            exclude: Vec::new(),
            min_file_size_mb: DEFAULT_MIN_FILE_SIZE_MB,
            min_workers: 2,
            max_workers: 10,
            batch_size: 500,
            batch_delay: Duration::from_millis(100),
            max_batch_delay: Duration::from_secs(5),
            timeout: Duration::from_secs(30 * 60),
            max_files: None,
            max_file_size_mb: None,
            error_threshold: 3,
            recovery_threshold: 10,
        }
    }
}

impl ScanConfig {
    /// Threshold in bytes. Negative values mean no threshold, absurd ones
    /// (over 10000 MB) are treated as a typo and replaced by the default.
    pub fn min_file_size_bytes(&self) -> u64 {
        let mb = if !self.min_file_size_mb.is_finite() || self.min_file_size_mb > MAX_MIN_FILE_SIZE_MB {
            DEFAULT_MIN_FILE_SIZE_MB
        } else {
            self.min_file_size_mb.max(0.0)
        };
        (mb * MB) as u64
    }

    pub fn max_file_size_bytes(&self) -> Option<u64> {
        self.max_file_size_mb
            .filter(|mb| mb.is_finite() && *mb > 0.0)
            .map(|mb| (mb * MB) as u64)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// file budget per batch of refresh calls
    pub batch_size: usize,
    pub merge_directories: bool,
    pub max_directory_depth: usize,
    pub retries: u32,
    #[serde(deserialize_with = "duration_str")]
    pub retry_delay: Duration,
    #[serde(deserialize_with = "duration_str")]
    pub call_delay: Duration,
    #[serde(deserialize_with = "duration_str")]
    pub batch_delay: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            batch_size: 10,
            merge_directories: true,
            max_directory_depth: 5,
            retries: 3,
            retry_delay: Duration::from_secs(2),
            call_delay: Duration::from_millis(500),
            batch_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SnapshotConfig {
    pub dir: Option<PathBuf>,
    #[serde(deserialize_with = "duration_str")]
    pub retention: Duration,
    pub max_count: usize,
    pub write_attempts: u32,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        SnapshotConfig {
            dir: None,
            retention: Duration::from_secs(7 * 24 * 60 * 60),
            max_count: 10,
            write_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    #[serde(deserialize_with = "duration_str")]
    pub interval: Duration,
    /// deadline for one tree's scan, diff, resolve and dispatch
    #[serde(deserialize_with = "duration_str")]
    pub tree_timeout: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        DaemonConfig {
            interval: Duration::from_secs(10 * 60),
            tree_timeout: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MountOverride {
    pub path: PathBuf,
    pub kind: MountKind,
}

/// Rewrites a path as the scanner sees it into the path the media server
/// sees (the two often differ when one of them runs in a container).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathMapping {
    pub host: PathBuf,
    pub container: PathBuf,
}

fn duration_str<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
}

impl Config {
    /// Load from `path`, or from the default location if it exists, or fall
    /// back to defaults. Environment overrides are applied afterwards.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path().filter(|p| p.exists()),
        };

        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::Read { path: path.clone(), source })?;
                Config::from_toml(&text, &path)?
            }
            None => Config::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Container deployments configure through the environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("PLEX_URL").filter(|v| !v.trim().is_empty()) {
            self.plex.url = Some(url.trim().to_string());
        }
        if let Some(token) = lookup("PLEX_TOKEN").filter(|v| !v.trim().is_empty()) {
            self.plex.token = Some(token.trim().to_string());
        }
        if let Some(paths) = lookup("MOUNT_PATHS") {
            let roots = split_path_list(&paths);
            if !roots.is_empty() {
                self.scan.roots = roots;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.plex.enabled {
            if self.plex.url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                return Err(ConfigError::Invalid("plex.url is required when plex is enabled".into()));
            }
            if self.plex.token.as_deref().map_or(true, |t| t.trim().is_empty()) {
                return Err(ConfigError::Invalid("plex.token is required when plex is enabled".into()));
            }
        }

        let scan = &self.scan;
        if scan.min_workers == 0 {
            return Err(ConfigError::Invalid("scan.min_workers must be at least 1".into()));
        }
        if scan.min_workers > scan.max_workers {
            return Err(ConfigError::Invalid(format!(
                "scan.min_workers ({}) exceeds scan.max_workers ({})",
                scan.min_workers, scan.max_workers
            )));
        }
        if scan.batch_size == 0 || self.dispatch.batch_size == 0 {
            return Err(ConfigError::Invalid("batch sizes must be at least 1".into()));
        }
        if scan.batch_delay > scan.max_batch_delay {
            return Err(ConfigError::Invalid("scan.batch_delay exceeds scan.max_batch_delay".into()));
        }
        if self.dispatch.max_directory_depth == 0 {
            return Err(ConfigError::Invalid("dispatch.max_directory_depth must be at least 1".into()));
        }
        Ok(())
    }

    /// `validate` plus the checks that only matter for the daemon.
    pub fn validate_for_daemon(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.scan.roots.is_empty() {
            return Err(ConfigError::Invalid("scan.roots is empty, nothing to watch".into()));
        }
        Ok(())
    }

    pub fn state_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.snapshots.dir {
            return Ok(dir.clone());
        }
        directories::ProjectDirs::from("", "", "mediawatch")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or(ConfigError::NoStateDir)
    }

    pub fn mount_overrides(&self) -> Vec<(PathBuf, MountKind)> {
        self.mounts.iter().map(|m| (m.path.clone(), m.kind)).collect()
    }
}

fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "mediawatch")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Split a list of paths on commas, semicolons, newlines or spaces.
/// Surrounding quotes are stripped.
pub fn split_path_list(raw: &str) -> Vec<PathBuf> {
    raw.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .map(|p| p.trim().trim_matches(|c| c == '"' || c == '\''))
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect()
}
