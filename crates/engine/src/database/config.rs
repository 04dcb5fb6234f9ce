//! Database configuration via `stratalock.toml`
//!
//! `Database::open(dir)` creates a default `stratalock.toml` in the directory
//! on first open and reads it on every open. Edit the file and reopen to
//! change settings.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use stratalock_core::{Error, Result};

/// Config file name placed in the database directory.
pub const CONFIG_FILE_NAME: &str = "stratalock.toml";

/// Backing store implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// `UnifiedStore`: one BTreeMap behind an RwLock
    Unified,
    /// `ShardedStore`: DashMap with per-shard locking
    Sharded,
}

/// Lock manager configuration loaded from `stratalock.toml`.
///
/// # Example
///
/// ```toml
/// store = "unified"
/// deadlock_detection = true
/// detection_interval_ms = 100
/// # lock_wait_timeout_ms = 5000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockConfig {
    /// Store implementation: `"unified"` or `"sharded"`.
    #[serde(default = "default_store_str")]
    pub store: String,
    /// Run the background deadlock detector.
    #[serde(default = "default_deadlock_detection")]
    pub deadlock_detection: bool,
    /// Detector period in milliseconds. Must be greater than zero.
    #[serde(default = "default_detection_interval_ms")]
    pub detection_interval_ms: u64,
    /// Upper bound for blocking waits (`get_wait`/`put_wait`). Unbounded if absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_wait_timeout_ms: Option<u64>,
}

fn default_store_str() -> String {
    "unified".to_string()
}

fn default_deadlock_detection() -> bool {
    true
}

fn default_detection_interval_ms() -> u64 {
    100
}

/// Whole milliseconds in `d`, clamped to `u64::MAX`
pub(crate) fn saturating_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            store: default_store_str(),
            deadlock_detection: default_deadlock_detection(),
            detection_interval_ms: default_detection_interval_ms(),
            lock_wait_timeout_ms: None,
        }
    }
}

impl LockConfig {
    /// Enable or disable the background detector.
    pub fn with_deadlock_detection(mut self, enabled: bool) -> Self {
        self.deadlock_detection = enabled;
        self
    }

    /// Set the detector period.
    pub fn with_detection_interval(mut self, interval: Duration) -> Self {
        self.detection_interval_ms = saturating_millis(interval);
        self
    }

    /// Bound blocking waits.
    pub fn with_lock_wait_timeout(mut self, timeout: Duration) -> Self {
        self.lock_wait_timeout_ms = Some(saturating_millis(timeout));
        self
    }

    /// Select the store implementation.
    pub fn with_store(mut self, kind: StoreKind) -> Self {
        self.store = match kind {
            StoreKind::Unified => "unified",
            StoreKind::Sharded => "sharded",
        }
        .to_string();
        self
    }

    /// Parse the store string into a `StoreKind`.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not `"unified"` or `"sharded"`.
    pub fn store_kind(&self) -> Result<StoreKind> {
        match self.store.as_str() {
            "unified" => Ok(StoreKind::Unified),
            "sharded" => Ok(StoreKind::Sharded),
            other => Err(Error::InvalidConfig(format!(
                "Invalid store '{}' in {}. Expected \"unified\" or \"sharded\".",
                other, CONFIG_FILE_NAME
            ))),
        }
    }

    /// Check every field.
    pub fn validate(&self) -> Result<()> {
        self.store_kind()?;
        if self.detection_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "detection_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Detector period as a `Duration`.
    pub fn detection_interval(&self) -> Duration {
        Duration::from_millis(self.detection_interval_ms)
    }

    /// Blocking-wait bound as a `Duration`.
    pub fn lock_wait_timeout(&self) -> Option<Duration> {
        self.lock_wait_timeout_ms.map(Duration::from_millis)
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# StrataLock configuration
#
# Store implementation: "unified" (default) or "sharded"
#   "unified" = single BTreeMap behind a reader-writer lock, sorted iteration
#   "sharded" = DashMap, per-shard locking for write-heavy workloads
store = "unified"

# Run the background deadlock detector (default: true).
# When disabled, call Database::resolve_deadlocks() yourself.
deadlock_detection = true

# How often the detector scans the waits-for graph, in milliseconds (default: 100)
detection_interval_ms = 100

# Upper bound for blocking waits in milliseconds (default: wait forever).
# The polling API (check_lock) never waits.
# lock_wait_timeout_ms = 5000
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: LockConfig = toml::from_str(&content).map_err(|e| {
            Error::InvalidConfig(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::InvalidConfig(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_valid() {
        let config = LockConfig::default();
        assert_eq!(config.store_kind().unwrap(), StoreKind::Unified);
        assert!(config.deadlock_detection);
        assert_eq!(config.detection_interval(), Duration::from_millis(100));
        assert!(config.lock_wait_timeout().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn parse_sharded() {
        let config: LockConfig = toml::from_str("store = \"sharded\"").unwrap();
        assert_eq!(config.store_kind().unwrap(), StoreKind::Sharded);
    }

    #[test]
    fn parse_invalid_store_returns_error() {
        let config: LockConfig = toml::from_str("store = \"redis\"").unwrap();
        assert!(matches!(config.store_kind(), Err(Error::InvalidConfig(_))));
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config: LockConfig = toml::from_str("detection_interval_ms = 0").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("detection_interval_ms"));
    }

    #[test]
    fn default_toml_parses_correctly() {
        let config: LockConfig = toml::from_str(LockConfig::default_toml()).unwrap();
        assert_eq!(config, LockConfig::default());
    }

    #[test]
    fn write_default_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        assert!(!path.exists());

        LockConfig::write_default_if_missing(&path).unwrap();
        assert!(path.exists());

        let config = LockConfig::from_file(&path).unwrap();
        assert_eq!(config.store, "unified");
    }

    #[test]
    fn write_default_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        std::fs::write(&path, "store = \"sharded\"\n").unwrap();
        LockConfig::write_default_if_missing(&path).unwrap();

        let config = LockConfig::from_file(&path).unwrap();
        assert_eq!(config.store, "sharded");
    }

    #[test]
    fn from_file_with_missing_field_uses_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        // Empty config file: all fields take their defaults
        std::fs::write(&path, "").unwrap();

        let config = LockConfig::from_file(&path).unwrap();
        assert_eq!(config, LockConfig::default());
    }

    #[test]
    fn from_file_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "store = [1, 2").unwrap();

        let err = LockConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn from_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = LockConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, Error::IoError(_)));
    }

    #[test]
    fn write_to_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let config = LockConfig::default()
            .with_store(StoreKind::Sharded)
            .with_deadlock_detection(false)
            .with_detection_interval(Duration::from_millis(25))
            .with_lock_wait_timeout(Duration::from_secs(2));

        config.write_to_file(&path).unwrap();
        let loaded = LockConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.lock_wait_timeout(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn huge_durations_saturate() {
        let config = LockConfig::default()
            .with_detection_interval(Duration::MAX)
            .with_lock_wait_timeout(Duration::MAX);
        assert_eq!(config.detection_interval_ms, u64::MAX);
        assert_eq!(config.lock_wait_timeout_ms, Some(u64::MAX));
        assert_eq!(saturating_millis(Duration::from_millis(250)), 250);
    }

    #[test]
    fn timeout_omitted_when_unset() {
        let toml_str = toml::to_string_pretty(&LockConfig::default()).unwrap();
        assert!(!toml_str.contains("lock_wait_timeout_ms"));
    }
}
