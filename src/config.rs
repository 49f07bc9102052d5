//! Shared configuration for both peers.
//!
//! Loaded from an optional TOML file; the binary layers command-line and
//! environment overrides on top. `segment-size` and `hash-algorithm` must
//! agree on both sides.

use crate::error::{Result, SyncError};
use crate::hash::HashAlgorithm;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "syncer.toml";

pub const DEFAULT_IP: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 9050;
pub const DEFAULT_SEGMENT_SIZE: usize = 4096;
pub const DEFAULT_PARALLELISM: usize = 10;
pub const DEFAULT_SNAPSHOT_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_LOCK_RETRY_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_LISTEN_BACKLOG: u32 = 32;

/// Upper bound on `segment-size`; the receiver allocates one segment buffer
/// per connection.
pub const MAX_SEGMENT_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Config {
    /// Watched root (client)
    pub directory_path: Option<PathBuf>,

    /// Mirror root (server)
    pub output_directory: Option<PathBuf>,

    pub ip: String,

    pub port: u16,

    pub segment_size: usize,

    /// Client admission limit
    pub degree_of_parallelism: usize,

    #[serde(
        rename = "snapshot_interval",
        deserialize_with = "lenient_interval"
    )]
    pub snapshot_interval_ms: u64,

    pub hash_algorithm: HashAlgorithm,

    pub lock_retry_interval_ms: u64,

    /// Attempts before giving up on a locked source file; absent means wait
    /// forever.
    pub lock_retry_limit: Option<u32>,

    pub listen_backlog: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            directory_path: None,
            output_directory: None,
            ip: DEFAULT_IP.to_string(),
            port: DEFAULT_PORT,
            segment_size: DEFAULT_SEGMENT_SIZE,
            degree_of_parallelism: DEFAULT_PARALLELISM,
            snapshot_interval_ms: DEFAULT_SNAPSHOT_INTERVAL_MS,
            hash_algorithm: HashAlgorithm::default(),
            lock_retry_interval_ms: DEFAULT_LOCK_RETRY_INTERVAL_MS,
            lock_retry_limit: None,
            listen_backlog: DEFAULT_LISTEN_BACKLOG,
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| SyncError::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(SyncError::io_at("read config", path))?;
        Self::from_toml(&text)
    }

    /// Load `path`, or `syncer.toml` from the working directory if it exists,
    /// or fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.segment_size == 0 || self.segment_size > MAX_SEGMENT_SIZE {
            return Err(SyncError::Config(format!(
                "segment-size must be between 1 and {} bytes, got {}",
                MAX_SEGMENT_SIZE, self.segment_size
            )));
        }
        if self.degree_of_parallelism == 0 {
            return Err(SyncError::Config(
                "degree-of-parallelism must be at least 1".to_string(),
            ));
        }
        if self.ip.is_empty() {
            return Err(SyncError::Config("ip must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn watch_root(&self) -> Result<&Path> {
        self.directory_path
            .as_deref()
            .ok_or_else(|| SyncError::Config("directory-path is required".to_string()))
    }

    pub fn mirror_root(&self) -> Result<&Path> {
        self.output_directory
            .as_deref()
            .ok_or_else(|| SyncError::Config("output-directory is required".to_string()))
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms)
    }

    pub fn lock_retry_interval(&self) -> Duration {
        Duration::from_millis(self.lock_retry_interval_ms)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawInterval {
    Millis(i64),
    Text(String),
    Other(serde::de::IgnoredAny),
}

/// `snapshot_interval` falls back to the default when non-numeric or not
/// positive instead of rejecting the whole file.
fn lenient_interval<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let parsed = match RawInterval::deserialize(deserializer)? {
        RawInterval::Millis(ms) if ms > 0 => Some(ms as u64),
        RawInterval::Text(s) => s.trim().parse::<u64>().ok().filter(|ms| *ms > 0),
        _ => None,
    };
    Ok(parsed.unwrap_or_else(|| {
        tracing::warn!(
            "Invalid snapshot_interval, using default of {}ms",
            DEFAULT_SNAPSHOT_INTERVAL_MS
        );
        DEFAULT_SNAPSHOT_INTERVAL_MS
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.degree_of_parallelism, 10);
        assert_eq!(config.snapshot_interval(), Duration::from_millis(5000));
        assert_eq!(config.lock_retry_limit, None);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Xxh3_128);
        config.validate().unwrap();
    }

    #[test]
    fn test_recognized_keys() {
        let config = Config::from_toml(
            r#"
            directory-path = "/data/in"
            output-directory = "/data/out"
            ip = "10.0.0.2"
            port = 7000
            segment-size = 5
            degree-of-parallelism = 3
            snapshot_interval = 250
            hash-algorithm = "blake3"
            lock-retry-limit = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.watch_root().unwrap(), Path::new("/data/in"));
        assert_eq!(config.mirror_root().unwrap(), Path::new("/data/out"));
        assert_eq!(config.ip, "10.0.0.2");
        assert_eq!(config.port, 7000);
        assert_eq!(config.segment_size, 5);
        assert_eq!(config.degree_of_parallelism, 3);
        assert_eq!(config.snapshot_interval_ms, 250);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Blake3);
        assert_eq!(config.lock_retry_limit, Some(4));
    }

    #[test]
    fn test_invalid_snapshot_interval_falls_back() {
        for raw in ["\"soon\"", "0", "-5", "true"] {
            let config = Config::from_toml(&format!("snapshot_interval = {}", raw)).unwrap();
            assert_eq!(config.snapshot_interval_ms, DEFAULT_SNAPSHOT_INTERVAL_MS, "{}", raw);
        }
        let config = Config::from_toml("snapshot_interval = \"1500\"").unwrap();
        assert_eq!(config.snapshot_interval_ms, 1500);
    }

    #[test]
    fn test_validate_rejects_zero_segment_size() {
        let config = Config {
            segment_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }

    #[test]
    fn test_missing_roots_are_config_errors() {
        let config = Config::default();
        assert!(config.watch_root().is_err());
        assert!(config.mirror_root().is_err());
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(Config::from_toml("segment_sise = 5").is_err());
    }
}
