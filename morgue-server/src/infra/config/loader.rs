use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use once_cell::sync::Lazy;
use thiserror::Error;
use url::Url;

use super::{
    models::{
        Config, ConfigMetadata, ConfigWarnings, DEFAULT_ENCYCLOPEDIA_API_URL,
        DEFAULT_GENERATION_API_URL, DEFAULT_GENERATION_MODEL, DEFAULT_SPOILER_BASE_URL,
        DEFAULT_TMDB_REGION, DEFAULT_WIKI_API_URL, DatabaseConfig, GenerationConfig,
        ServerConfig, SourcesConfig, TmdbConfig,
    },
    sources::{EnvConfig, FileConfig},
};

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("morgue.toml"),
        PathBuf::from("config/morgue.toml"),
    ]
});

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Load `.env`, then the TOML file, then the process environment.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                dotenvy::Error::Io(_) => Ok(false),
                _ => Err(err),
            })?,
        };

        self.resolve(EnvConfig::gather(), env_file_loaded)
    }

    /// Like [`ConfigLoader::load`] but reads variables through `lookup`
    /// instead of the process environment, and never touches `.env`.
    pub fn load_with_env<F>(&self, lookup: F) -> Result<ConfigLoad, ConfigLoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.resolve(EnvConfig::gather_with(lookup), false)
    }

    fn resolve(
        &self,
        env: EnvConfig,
        env_file_loaded: bool,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env)?;
        let (config, warnings) = compose_config(
            file_config,
            env,
            ConfigMetadata {
                config_path,
                env_file_loaded,
            },
        )?;
        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        // An explicitly named file must exist; defaults are optional.
        let explicit = self
            .options
            .config_path
            .clone()
            .or_else(|| env.config_path.clone());

        let path = match explicit {
            Some(path) if !path.exists() => {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            Some(path) => path,
            None => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
            {
                Some(path) => path.clone(),
                None => return Ok((None, None)),
            },
        };

        let file_config = read_file_config(&path)?;
        Ok((Some(file_config), Some(path)))
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents = fs::read_to_string(path).map_err(|err| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source: err,
    })?;
    toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source: err,
    })
}

fn compose_config(
    file_config: Option<FileConfig>,
    env: EnvConfig,
    metadata: ConfigMetadata,
) -> Result<(Config, ConfigWarnings), ConfigLoadError> {
    let mut warnings = ConfigWarnings::default();

    if metadata.config_path.is_none() {
        warnings.push_with_hint(
            "No morgue.toml detected; using environment variables and defaults",
            "Set MORGUE_CONFIG_PATH or create morgue.toml to tune the pipeline",
        );
    }

    let FileConfig {
        server: file_server,
        database: file_database,
        tmdb: file_tmdb,
        sources: file_sources,
        generation: file_generation,
        poll_interval: file_poll_interval,
        pipeline: file_pipeline,
    } = file_config.unwrap_or_default();

    let port = match env.server_port.as_deref() {
        Some(raw) => raw
            .parse::<u16>()
            .map_err(|_| ConfigLoadError::InvalidPort {
                value: raw.to_string(),
            })?,
        None => file_server.port.unwrap_or(3000),
    };
    let server = ServerConfig {
        host: env
            .server_host
            .or(file_server.host)
            .unwrap_or_else(|| "0.0.0.0".to_string()),
        port,
    };

    let database_url = env
        .database_url
        .or(file_database.url)
        .ok_or(ConfigLoadError::MissingSetting {
            name: "DATABASE_URL",
        })?;
    validate_database_url(&database_url)?;
    let database = DatabaseConfig { url: database_url };

    let tmdb = TmdbConfig {
        api_key: env
            .tmdb_api_key
            .or(file_tmdb.api_key)
            .ok_or(ConfigLoadError::MissingSetting {
                name: "TMDB_API_KEY",
            })?,
        base_url: env.tmdb_base_url.or(file_tmdb.base_url),
        region: env
            .tmdb_region
            .or(file_tmdb.region)
            .unwrap_or_else(|| DEFAULT_TMDB_REGION.to_string()),
    };

    let sources = SourcesConfig {
        wiki_api_url: env
            .wiki_api_url
            .or(file_sources.wiki_api_url)
            .unwrap_or_else(|| DEFAULT_WIKI_API_URL.to_string()),
        encyclopedia_api_url: env
            .encyclopedia_api_url
            .or(file_sources.encyclopedia_api_url)
            .unwrap_or_else(|| DEFAULT_ENCYCLOPEDIA_API_URL.to_string()),
        spoiler_base_url: env
            .spoiler_base_url
            .or(file_sources.spoiler_base_url)
            .unwrap_or_else(|| DEFAULT_SPOILER_BASE_URL.to_string()),
    };

    let generation = match env.generation_api_key.or(file_generation.api_key) {
        Some(api_key) => Some(GenerationConfig {
            api_url: env
                .generation_api_url
                .or(file_generation.api_url)
                .unwrap_or_else(|| DEFAULT_GENERATION_API_URL.to_string()),
            api_key,
            model: env
                .generation_model
                .or(file_generation.model)
                .unwrap_or_else(|| DEFAULT_GENERATION_MODEL.to_string()),
        }),
        None => {
            warnings.push_with_hint(
                "Generation service not configured; enrichment and narrative extraction are disabled",
                "Set GENERATION_API_KEY (and optionally GENERATION_API_URL / GENERATION_MODEL)",
            );
            None
        }
    };

    let mut pipeline = file_pipeline.unwrap_or_default();
    if let Some(raw) = env.poll_interval.or(file_poll_interval) {
        pipeline.queue.poll_interval_secs = parse_poll_interval(&raw)?.as_secs();
    }

    Ok((
        Config {
            server,
            database,
            tmdb,
            sources,
            generation,
            pipeline,
            metadata,
        },
        warnings,
    ))
}

fn validate_database_url(raw: &str) -> Result<(), ConfigLoadError> {
    let url = Url::parse(raw)
        .map_err(|source| ConfigLoadError::InvalidDatabaseUrl { source })?;
    match url.scheme() {
        "postgres" | "postgresql" => Ok(()),
        other => Err(ConfigLoadError::UnsupportedDatabaseScheme {
            scheme: other.to_string(),
        }),
    }
}

fn parse_poll_interval(raw: &str) -> Result<Duration, ConfigLoadError> {
    let interval = humantime::parse_duration(raw).map_err(|source| {
        ConfigLoadError::InvalidDuration {
            name: "POLL_INTERVAL",
            value: raw.to_string(),
            source,
        }
    })?;
    if interval < Duration::from_secs(1) {
        return Err(ConfigLoadError::PollIntervalTooShort {
            value: raw.to_string(),
        });
    }
    Ok(interval)
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{name} must be set")]
    MissingSetting { name: &'static str },
    #[error("invalid database URL")]
    InvalidDatabaseUrl {
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported database scheme '{scheme}'; expected postgres:// or postgresql://")]
    UnsupportedDatabaseScheme { scheme: String },
    #[error("invalid SERVER_PORT '{value}'")]
    InvalidPort { value: String },
    #[error("invalid {name} '{value}'")]
    InvalidDuration {
        name: &'static str,
        value: String,
        #[source]
        source: humantime::DurationError,
    },
    #[error("POLL_INTERVAL '{value}' is shorter than one second")]
    PollIntervalTooShort { value: String },
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}
