use crate::app_dirs::AppDirs;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub save_debounce_ms: u64,
    pub top_mistakes: usize,
    pub db_path: Option<PathBuf>,
    pub history_path: Option<PathBuf>,
    pub record_history: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            save_debounce_ms: 120,
            top_mistakes: 5,
            db_path: None,
            history_path: None,
            record_history: true,
        }
    }
}

impl Config {
    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .or_else(AppDirs::db_path)
            .unwrap_or_else(|| PathBuf::from("typing_progress.db"))
    }

    pub fn resolved_history_path(&self) -> PathBuf {
        self.history_path
            .clone()
            .or_else(AppDirs::history_path)
            .unwrap_or_else(|| PathBuf::from("typing_history.csv"))
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> Result<(), ConfigError>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::config_path()
            .unwrap_or_else(|| PathBuf::from("typing_engine_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    /// Missing or malformed files load the defaults.
    fn load(&self) -> Config {
        if let Ok(bytes) = fs::read(&self.path) {
            match serde_json::from_slice::<Config>(&bytes) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "ignoring malformed config")
                }
            }
        }
        Config::default()
    }

    fn save(&self, cfg: &Config) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config::default();
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn save_and_load_custom_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config {
            save_debounce_ms: 250,
            top_mistakes: 3,
            db_path: Some(dir.path().join("p.db")),
            history_path: Some(dir.path().join("h.csv")),
            record_history: false,
        };
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
        assert_eq!(loaded.save_debounce(), Duration::from_millis(250));
        assert_eq!(loaded.resolved_db_path(), dir.path().join("p.db"));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"top_mistakes": 8}"#).unwrap();
        let cfg = FileConfigStore::with_path(&path).load();
        assert_eq!(cfg.top_mistakes, 8);
        assert_eq!(cfg.save_debounce_ms, 120);
        assert!(cfg.record_history);
    }

    #[test]
    fn malformed_or_missing_config_loads_defaults() {
        let dir = tempdir().unwrap();
        let missing = FileConfigStore::with_path(dir.path().join("nope.json"));
        assert_eq!(missing.load(), Config::default());

        let path = dir.path().join("bad.json");
        fs::write(&path, "{{{").unwrap();
        assert_eq!(FileConfigStore::with_path(&path).load(), Config::default());
    }
}
