// src/config.rs

//! Layered configuration: defaults, then a TOML file, then environment.
//!
//! Environment variables use the `GVA_` prefix and `__` between sections,
//! e.g. `GVA_SERVER__PORT=4000`. The conventional `GITHUB_CLIENT_ID`,
//! `GITHUB_CLIENT_SECRET` and `GITHUB_CALLBACK_URL` are honored as well.

use crate::analyzer::DEFAULT_COMMIT_LIMIT;
use crate::error::{Error, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const APP_DIR: &str = "git-version-analyzer";
pub const CONFIG_FILENAME: &str = "git-version-analyzer.toml";
pub const ENV_PREFIX: &str = "GVA_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            max_upload_bytes: 100 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub commit_limit: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            commit_limit: DEFAULT_COMMIT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root for uploads, extractions and the clone cache
    pub work_dir: PathBuf,
    pub identity_file: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let work_dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(APP_DIR);
        Self {
            work_dir,
            identity_file: None,
        }
    }
}

impl StorageConfig {
    pub fn uploads_dir(&self) -> PathBuf {
        self.work_dir.join("uploads")
    }

    pub fn extracted_dir(&self) -> PathBuf {
        self.work_dir.join("extracted")
    }

    pub fn clones_dir(&self) -> PathBuf {
        self.work_dir.join("github-clones")
    }

    /// Identity file in the per-user application data directory
    pub fn identity_path(&self) -> PathBuf {
        self.identity_file.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| self.work_dir.clone())
                .join(APP_DIR)
                .join("identity.json")
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
    pub api_base: String,
    pub oauth_base: String,
    pub scopes: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            callback_url: "http://localhost:3001/auth/github/callback".to_string(),
            api_base: "https://api.github.com".to_string(),
            oauth_base: "https://github.com".to_string(),
            scopes: "read:user,repo".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub unrar_program: String,
    pub sevenzip_program: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            unrar_program: "unrar".to_string(),
            sevenzip_program: "7z".to_string(),
        }
    }
}

/// Where the OAuth callback sends the browser afterwards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedirectConfig {
    pub success_url: String,
    pub failure_url: String,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            success_url: "http://localhost:3000/auth-success".to_string(),
            failure_url: "http://localhost:3000/login".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub analysis: AnalysisConfig,
    pub storage: StorageConfig,
    pub github: GitHubConfig,
    pub extraction: ExtractionConfig,
    pub redirect: RedirectConfig,
}

impl AppConfig {
    /// Loads from defaults, the given or default TOML file, and the environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(AppConfig::default()));

        match config_path {
            Some(path) if !path.exists() => {
                return Err(Error::Config(format!(
                    "configuration file {} does not exist",
                    path.display()
                )));
            }
            Some(path) => {
                debug!("Loading configuration from {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
            None => {
                if let Some(path) = default_config_path() {
                    debug!("Loading configuration from {}", path.display());
                    figment = figment.merge(Toml::file(path));
                }
            }
        }

        figment = figment
            .merge(
                Env::prefixed("GITHUB_")
                    .only(&["client_id", "client_secret", "callback_url"])
                    .map(|key| format!("github.{}", key).into()),
            )
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: AppConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::Config("server port cannot be 0".to_string()));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(Error::Config("max_upload_bytes must be positive".to_string()));
        }
        if self.analysis.commit_limit == 0 {
            return Err(Error::Config("commit_limit must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn default_config_path() -> Option<PathBuf> {
    let candidates = [
        std::env::current_dir().ok().map(|d| d.join(CONFIG_FILENAME)),
        dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml")),
    ];
    candidates.into_iter().flatten().find(|p| p.exists())
}
