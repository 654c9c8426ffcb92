//! `AppConfig` struct, TOML loading and on-disk locations.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Top-level application configuration.
#[derive(Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AppConfig {
    /// XMLTV import settings.
    #[serde(default)]
    pub import: ImportConfig,
}

/// XMLTV import configuration.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
#[allow(clippy::module_name_repetitions)]
pub struct ImportConfig {
    /// Feed imported when `import` is run without a file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed: Option<PathBuf>,
    /// Write programs in paced chunks unless `--foreground` is given.
    pub background_priority: bool,
    /// Programs per transaction when writing in the background.
    pub background_chunk_size: usize,
    /// Pause between background chunks, in milliseconds.
    pub background_delay_ms: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            feed: None,
            background_priority: true,
            background_chunk_size: 50,
            background_delay_ms: 20,
        }
    }
}

impl ImportConfig {
    /// Pause between background chunks.
    #[must_use]
    pub const fn background_delay(&self) -> Duration {
        Duration::from_millis(self.background_delay_ms)
    }
}

impl AppConfig {
    /// Loads config from a TOML file. Returns default if file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }
}

/// Where the config file and the guide database live.
///
/// `--dir` places both in one directory. Otherwise they follow the XDG
/// base directories under an `epgsync` subdirectory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    /// TOML config file.
    pub config_file: PathBuf,
    /// `SQLite` guide database.
    pub database: PathBuf,
}

impl DataPaths {
    const APP_DIR: &'static str = "epgsync";
    const CONFIG_FILE: &'static str = "config.toml";
    const DATABASE_FILE: &'static str = "epgsync.db";

    /// Resolves both locations from `--dir` or the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` is `None` and neither the XDG variables
    /// nor `HOME` are set.
    pub fn resolve(dir: Option<&Path>) -> Result<Self> {
        Self::resolve_with(dir, |key| std::env::var_os(key))
    }

    fn resolve_with(
        dir: Option<&Path>,
        env: impl Fn(&str) -> Option<OsString>,
    ) -> Result<Self> {
        if let Some(dir) = dir {
            return Ok(Self {
                config_file: dir.join(Self::CONFIG_FILE),
                database: dir.join(Self::DATABASE_FILE),
            });
        }

        let base = |xdg: &str, fallback: &[&str]| -> Result<PathBuf> {
            if let Some(path) = env(xdg).filter(|v| !v.is_empty()) {
                return Ok(PathBuf::from(path));
            }
            let Some(home) = env("HOME").filter(|v| !v.is_empty()) else {
                bail!("neither {xdg} nor HOME is set; pass --dir");
            };
            Ok(fallback.iter().fold(PathBuf::from(home), |p, part| p.join(part)))
        };

        Ok(Self {
            config_file: base("XDG_CONFIG_HOME", &[".config"])?
                .join(Self::APP_DIR)
                .join(Self::CONFIG_FILE),
            database: base("XDG_DATA_HOME", &[".local", "share"])?
                .join(Self::APP_DIR)
                .join(Self::DATABASE_FILE),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_default_config() {
        // Arrange & Act
        let config = AppConfig::default();

        // Assert
        assert_eq!(config.import.feed, None);
        assert!(config.import.background_priority);
        assert_eq!(config.import.background_chunk_size, 50);
        assert_eq!(config.import.background_delay(), Duration::from_millis(20));
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");

        // Act
        let config = AppConfig::load(&path).unwrap();

        // Assert
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_serialize_and_load() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = AppConfig {
            import: ImportConfig {
                feed: Some(PathBuf::from("/srv/epg/guide.xml")),
                background_priority: false,
                background_chunk_size: 200,
                background_delay_ms: 0,
            },
        };

        // Act
        std::fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();
        let loaded = AppConfig::load(&path).unwrap();

        // Assert
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_partial_import_table() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[import]\nfeed = \"guide.xml\"\n").unwrap();

        // Act
        let config = AppConfig::load(&path).unwrap();

        // Assert
        assert_eq!(config.import.feed, Some(PathBuf::from("guide.xml")));
        assert!(config.import.background_priority);
        assert_eq!(config.import.background_delay_ms, 20);
    }

    #[test]
    fn test_load_empty_file() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "").unwrap();

        // Act
        let config = AppConfig::load(&path).unwrap();

        // Assert
        assert_eq!(config, AppConfig::default());
    }

    fn env_of(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<OsString> {
        let vars: Vec<(String, OsString)> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), OsString::from(v)))
            .collect();
        move |key: &str| vars.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    #[test]
    fn test_data_paths_share_dir_override() {
        // Arrange
        let dir = PathBuf::from("/srv/guide");

        // Act
        let paths = DataPaths::resolve_with(Some(dir.as_path()), env_of(&[])).unwrap();

        // Assert
        assert_eq!(paths.config_file, PathBuf::from("/srv/guide/config.toml"));
        assert_eq!(paths.database, PathBuf::from("/srv/guide/epgsync.db"));
    }

    #[test]
    fn test_data_paths_fall_back_to_home() {
        // Arrange
        let env = env_of(&[("HOME", "/home/viewer"), ("XDG_DATA_HOME", "")]);

        // Act
        let paths = DataPaths::resolve_with(None, env).unwrap();

        // Assert
        assert_eq!(
            paths.config_file,
            PathBuf::from("/home/viewer/.config/epgsync/config.toml")
        );
        assert_eq!(
            paths.database,
            PathBuf::from("/home/viewer/.local/share/epgsync/epgsync.db")
        );
    }

    #[test]
    fn test_data_paths_prefer_xdg_dirs() {
        // Arrange
        let env = env_of(&[
            ("HOME", "/home/viewer"),
            ("XDG_CONFIG_HOME", "/etc/xdg-user"),
            ("XDG_DATA_HOME", "/var/lib/viewer"),
        ]);

        // Act
        let paths = DataPaths::resolve_with(None, env).unwrap();

        // Assert
        assert_eq!(paths.config_file, PathBuf::from("/etc/xdg-user/epgsync/config.toml"));
        assert_eq!(paths.database, PathBuf::from("/var/lib/viewer/epgsync/epgsync.db"));
    }

    #[test]
    fn test_data_paths_without_home_errors() {
        // Arrange & Act
        let result = DataPaths::resolve_with(None, env_of(&[]));

        // Assert
        let err = result.unwrap_err().to_string();
        assert!(err.contains("XDG_CONFIG_HOME"));
    }
}
