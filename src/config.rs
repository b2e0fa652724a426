//! User configuration stored as TOML.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BookshellError, Result};

/// Directory name used under the platform config and data dirs.
const APP_DIR: &str = "bookshell";

/// Root folder created on the drive by `setup`.
pub const DEFAULT_ROOT_FOLDER: &str = "Bookshell_Files";

/// Settings read from `config.toml`. Every field is optional on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service account or authorized-user JSON file.
    pub credentials: Option<PathBuf>,
    pub root_folder_id: Option<String>,
    pub root_folder_name: String,
    /// Where `pull` saves books.
    pub download_dir: Option<PathBuf>,
    pub cache_path: Option<PathBuf>,
    pub page_width: Option<usize>,
    pub page_height: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials: None,
            root_folder_id: None,
            root_folder_name: DEFAULT_ROOT_FOLDER.to_string(),
            download_dir: None,
            cache_path: None,
            page_width: None,
            page_height: None,
        }
    }
}

impl Config {
    /// `<config_dir>/bookshell/config.toml`.
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|d| d.join(APP_DIR).join("config.toml"))
            .ok_or_else(|| BookshellError::ConfigError("cannot locate a config directory".to_string()))
    }

    /// Read the config; a missing file gives the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)
                .map_err(|e| BookshellError::ConfigError(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| BookshellError::ConfigError(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Configured cache path or `<data_dir>/bookshell/library.json`.
    pub fn cache_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.cache_path {
            return Ok(path.clone());
        }
        dirs::data_dir()
            .map(|d| d.join(APP_DIR).join("library.json"))
            .ok_or_else(|| BookshellError::ConfigError("cannot locate a data directory".to_string()))
    }

    /// Configured download dir or `~/Bookshell`.
    pub fn download_dir(&self) -> Result<PathBuf> {
        if let Some(path) = &self.download_dir {
            return Ok(path.clone());
        }
        dirs::home_dir()
            .map(|d| d.join("Bookshell"))
            .ok_or_else(|| BookshellError::ConfigError("cannot locate the home directory".to_string()))
    }

    pub fn credentials(&self) -> Result<&Path> {
        self.credentials.as_deref().ok_or_else(|| {
            BookshellError::ConfigError(
                "no credentials file configured (use --credentials or run `bookshell setup`)".to_string(),
            )
        })
    }

    pub fn root_folder_id(&self) -> Result<&str> {
        self.root_folder_id.as_deref().ok_or_else(|| {
            BookshellError::ConfigError(
                "no library folder configured (use --folder or run `bookshell setup`)".to_string(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.root_folder_name, DEFAULT_ROOT_FOLDER);
        assert!(config.root_folder_id().is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config {
            credentials: Some(PathBuf::from("/home/me/token.json")),
            root_folder_id: Some("root123".to_string()),
            page_height: Some(30),
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.root_folder_id().unwrap(), "root123");
    }

    #[test]
    fn test_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "root_folder_id = \"abc\"\ncache_path = \"/tmp/lib.json\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.root_folder_id.as_deref(), Some("abc"));
        assert_eq!(config.cache_path().unwrap(), PathBuf::from("/tmp/lib.json"));
        assert_eq!(config.root_folder_name, DEFAULT_ROOT_FOLDER);
    }

    #[test]
    fn test_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "root_folder_id = [").unwrap();
        assert!(matches!(Config::load(&path), Err(BookshellError::ConfigError(_))));
    }
}
