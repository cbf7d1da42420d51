use std::path::PathBuf;

use morgue_core::PipelineConfig;
use serde::{Deserialize, Serialize};

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub database: FileDatabaseConfig,
    #[serde(default)]
    pub tmdb: FileTmdbConfig,
    #[serde(default)]
    pub sources: FileSourcesConfig,
    #[serde(default)]
    pub generation: FileGenerationConfig,
    /// Humantime string such as `"90s"` or `"5m"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<PipelineConfig>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileDatabaseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileTmdbConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileSourcesConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wiki_api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encyclopedia_api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spoiler_base_url: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    /// Kept raw so a malformed port is reported instead of ignored.
    pub server_port: Option<String>,
    pub database_url: Option<String>,
    pub tmdb_api_key: Option<String>,
    pub tmdb_base_url: Option<String>,
    pub tmdb_region: Option<String>,
    pub wiki_api_url: Option<String>,
    pub encyclopedia_api_url: Option<String>,
    pub spoiler_base_url: Option<String>,
    pub generation_api_url: Option<String>,
    pub generation_api_key: Option<String>,
    pub generation_model: Option<String>,
    pub poll_interval: Option<String>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::gather_with(|name| std::env::var(name).ok())
    }

    /// Read every recognised variable through `lookup`. Blank values count
    /// as unset.
    pub fn gather_with<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Self {
            config_path: var("MORGUE_CONFIG_PATH").map(PathBuf::from),
            server_host: var("SERVER_HOST"),
            server_port: var("SERVER_PORT"),
            database_url: var("DATABASE_URL"),
            tmdb_api_key: var("TMDB_API_KEY"),
            tmdb_base_url: var("TMDB_BASE_URL"),
            tmdb_region: var("TMDB_REGION"),
            wiki_api_url: var("WIKI_API_URL"),
            encyclopedia_api_url: var("ENCYCLOPEDIA_API_URL"),
            spoiler_base_url: var("SPOILER_BASE_URL"),
            generation_api_url: var("GENERATION_API_URL"),
            generation_api_key: var("GENERATION_API_KEY"),
            generation_model: var("GENERATION_MODEL"),
            poll_interval: var("POLL_INTERVAL"),
        }
    }
}
