use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Where `store.json` and the session token live
    pub data_dir: PathBuf,
    /// Root of the local blob disk, defaults to `<data_dir>/files`
    pub attachments_dir: Option<PathBuf>,
    pub project_detail_ttl_secs: u64,
    pub team_listing_ttl_secs: u64,
    pub max_upload_bytes: u64,
    pub allowed_extensions: Vec<String>,
    pub log_filter: String,
    /// Copies of `store.json` kept in `backups/`, 0 disables them
    pub kept_backups: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .map(|d| d.join("taskhub"))
                .unwrap_or_else(|| PathBuf::from(".taskhub")),
            attachments_dir: None,
            project_detail_ttl_secs: 600,
            team_listing_ttl_secs: 300,
            max_upload_bytes: 10_240 * 1024,
            allowed_extensions: [
                "jpeg", "jpg", "png", "gif", "pdf", "doc", "docx", "xlsx", "pptx", "txt", "zip",
                "rar",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            log_filter: String::from("taskhub=info"),
            kept_backups: 5,
        }
    }
}

impl Settings {
    /// Reads `path` if given, otherwise `<config_dir>/taskhub/config.toml`
    /// when it exists, otherwise the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match dirs::config_dir().map(|d| d.join("taskhub").join("config.toml")) {
                Some(p) if p.exists() => p,
                _ => return Ok(Settings::default()),
            },
        };

        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadFailed {
            path: path.clone(),
            source: e,
        })?;
        Self::from_toml(&content).map_err(|e| ConfigError::ParseFailed { path, source: e })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.json")
    }

    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join("session")
    }

    pub fn attachments_dir(&self) -> PathBuf {
        self.attachments_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("files"))
    }

    pub fn project_detail_ttl(&self) -> Duration {
        Duration::from_secs(self.project_detail_ttl_secs)
    }

    pub fn team_listing_ttl(&self) -> Duration {
        Duration::from_secs(self.team_listing_ttl_secs)
    }

    pub fn is_allowed_extension(&self, extension: &str) -> bool {
        self.allowed_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(extension))
    }
}
