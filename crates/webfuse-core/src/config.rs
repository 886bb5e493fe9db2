//! Toolkit-wide configuration.
//!
//! Built once at startup and handed to every component that needs a
//! directory root. Nothing in the workspace reads directory locations from
//! ambient global state.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "webfuse";

/// Directory roots and logging settings for the toolkit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebfuseConfig {
    /// Writable data root (staging files, caches).
    pub data_dir: PathBuf,
    /// Plugin directory.
    pub plugins_dir: PathBuf,
    /// Third-party library directory.
    pub libraries_dir: PathBuf,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging settings consumed by the root crate's subscriber bootstrap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG` when set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit JSON lines instead of the human-readable format.
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

impl Default for WebfuseConfig {
    fn default() -> Self {
        let root = dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(APP_DIR_NAME);
        Self::from_root(root)
    }
}

impl WebfuseConfig {
    /// Lay out the standard `data/`, `plugins/` and `libraries/` directories
    /// under one root.
    pub fn from_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            data_dir: root.join("data"),
            plugins_dir: root.join("plugins"),
            libraries_dir: root.join("libraries"),
            logging: LoggingConfig::default(),
        }
    }

    /// Load a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| CoreError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
        log::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Persist the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> CoreResult<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|e| CoreError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
        if let Some(parent) = path.parent() {
            crate::fs::ensure_dir(parent)?;
        }
        std::fs::write(path, json).map_err(|e| CoreError::io(path, e))
    }

    /// Create every configured directory that does not exist yet.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        for dir in [&self.data_dir, &self.plugins_dir, &self.libraries_dir] {
            crate::fs::ensure_dir(dir)?;
        }
        Ok(())
    }

    /// Directory for temporary staging files (`<data_dir>/tmp`).
    pub fn staging_dir(&self) -> PathBuf {
        self.data_dir.join("tmp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_root_layout() {
        let cfg = WebfuseConfig::from_root("/opt/webfuse");
        assert_eq!(cfg.data_dir, PathBuf::from("/opt/webfuse/data"));
        assert_eq!(cfg.plugins_dir, PathBuf::from("/opt/webfuse/plugins"));
        assert_eq!(cfg.libraries_dir, PathBuf::from("/opt/webfuse/libraries"));
        assert_eq!(cfg.staging_dir(), PathBuf::from("/opt/webfuse/data/tmp"));
    }

    #[test]
    fn logging_defaults_apply_when_missing() {
        let json = r#"{"dataDir":"/d","pluginsDir":"/p","librariesDir":"/l"}"#;
        let cfg: WebfuseConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.logging, LoggingConfig::default());
        assert_eq!(cfg.logging.filter, "info");
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("webfuse.json");
        let mut cfg = WebfuseConfig::from_root(dir.path());
        cfg.logging.json = true;
        cfg.save(&path).unwrap();

        let loaded = WebfuseConfig::load(&path).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn load_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = WebfuseConfig::load(&path).unwrap_err();
        assert!(matches!(err, CoreError::Json { .. }));
    }

    #[test]
    fn ensure_dirs_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = WebfuseConfig::from_root(dir.path().join("root"));
        cfg.ensure_dirs().unwrap();
        assert!(cfg.data_dir.is_dir());
        assert!(cfg.plugins_dir.is_dir());
        assert!(cfg.libraries_dir.is_dir());
    }
}
