use std::{path::PathBuf, time::Duration};

use morgue_core::PipelineConfig;

pub const DEFAULT_WIKI_API_URL: &str = "https://listofdeaths.fandom.com/api.php";
pub const DEFAULT_ENCYCLOPEDIA_API_URL: &str = "https://en.wikipedia.org/w/api.php";
pub const DEFAULT_SPOILER_BASE_URL: &str = "https://themoviespoiler.com/movies";
pub const DEFAULT_GENERATION_API_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_GENERATION_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TMDB_REGION: &str = "US";

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub tmdb: TmdbConfig,
    pub sources: SourcesConfig,
    /// `None` disables every generation-backed step.
    pub generation: Option<GenerationConfig>,
    pub pipeline: PipelineConfig,
    pub metadata: ConfigMetadata,
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        self.pipeline.queue.poll_interval()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &redact_url(&self.url))
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct TmdbConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub region: String,
}

impl std::fmt::Debug for TmdbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TmdbConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("region", &self.region)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcesConfig {
    pub wiki_api_url: String,
    pub encyclopedia_api_url: String,
    pub spoiler_base_url: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct GenerationConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

impl std::fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .finish()
    }
}

/// Where the configuration came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push(&mut self, message: impl Into<String>) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint(&mut self, message: impl Into<String>, hint: impl Into<String>) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Drop the password component so URLs can be logged.
pub fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("***"));
            }
            url.to_string()
        }
        Err(_) => "<unparseable>".to_string(),
    }
}
