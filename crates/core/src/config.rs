use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub agent: AgentConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
    pub seed_on_startup: bool,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub lock_retry_delay_ms: u64,
    pub low_stock_threshold: i64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai", alias = "open_ai")]
    OpenAi,
    Anthropic,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub seed_on_startup: Option<bool>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://shelfwise.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
                seed_on_startup: true,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
            },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 8080 },
            agent: AgentConfig { lock_retry_delay_ms: 100, low_stock_threshold: 5 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    /// Layers defaults, then the TOML file, then `SHELFWISE_*` variables, then
    /// explicit overrides, and validates the result.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        match resolve_config_path(options.config_path.as_deref()) {
            Some(path) => config.apply_patch(read_patch(&path)?),
            None if options.require_file => {
                let expected =
                    options.config_path.clone().unwrap_or_else(|| PathBuf::from("shelfwise.toml"));
                return Err(ConfigError::MissingConfigFile(expected));
            }
            None => {}
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;
        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        let ConfigPatch { database, llm, server, agent, logging } = patch;

        if let Some(database) = database {
            assign(&mut self.database.url, database.url);
            assign(&mut self.database.max_connections, database.max_connections);
            assign(&mut self.database.timeout_secs, database.timeout_secs);
            assign(&mut self.database.seed_on_startup, database.seed_on_startup);
        }
        if let Some(llm) = llm {
            assign(&mut self.llm.provider, llm.provider);
            assign_some(&mut self.llm.api_key, llm.api_key.map(SecretString::from));
            assign_some(&mut self.llm.base_url, llm.base_url);
            assign(&mut self.llm.model, llm.model);
            assign(&mut self.llm.timeout_secs, llm.timeout_secs);
        }
        if let Some(server) = server {
            assign(&mut self.server.bind_address, server.bind_address);
            assign(&mut self.server.port, server.port);
        }
        if let Some(agent) = agent {
            assign(&mut self.agent.lock_retry_delay_ms, agent.lock_retry_delay_ms);
            assign(&mut self.agent.low_stock_threshold, agent.low_stock_threshold);
        }
        if let Some(logging) = logging {
            assign(&mut self.logging.level, logging.level);
            assign(&mut self.logging.format, logging.format);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        assign(&mut self.database.url, env_value("SHELFWISE_DATABASE_URL")?);
        assign(
            &mut self.database.max_connections,
            env_value("SHELFWISE_DATABASE_MAX_CONNECTIONS")?,
        );
        assign(&mut self.database.timeout_secs, env_value("SHELFWISE_DATABASE_TIMEOUT_SECS")?);
        assign(
            &mut self.database.seed_on_startup,
            env_value("SHELFWISE_DATABASE_SEED_ON_STARTUP")?,
        );

        if let Some(provider) = read_env("SHELFWISE_LLM_PROVIDER") {
            self.llm.provider = provider.parse()?;
        }
        assign_some(
            &mut self.llm.api_key,
            read_env("SHELFWISE_LLM_API_KEY").map(SecretString::from),
        );
        assign_some(&mut self.llm.base_url, read_env("SHELFWISE_LLM_BASE_URL"));
        assign(&mut self.llm.model, read_env("SHELFWISE_LLM_MODEL"));
        assign(&mut self.llm.timeout_secs, env_value("SHELFWISE_LLM_TIMEOUT_SECS")?);

        assign(&mut self.server.bind_address, read_env("SHELFWISE_SERVER_BIND_ADDRESS"));
        assign(&mut self.server.port, env_value("SHELFWISE_SERVER_PORT")?);

        assign(
            &mut self.agent.lock_retry_delay_ms,
            env_value("SHELFWISE_AGENT_LOCK_RETRY_DELAY_MS")?,
        );
        assign(
            &mut self.agent.low_stock_threshold,
            env_value("SHELFWISE_AGENT_LOW_STOCK_THRESHOLD")?,
        );

        // The short `SHELFWISE_LOG_*` spellings are accepted as aliases.
        assign(
            &mut self.logging.level,
            read_env("SHELFWISE_LOGGING_LEVEL").or_else(|| read_env("SHELFWISE_LOG_LEVEL")),
        );
        if let Some(format) =
            read_env("SHELFWISE_LOGGING_FORMAT").or_else(|| read_env("SHELFWISE_LOG_FORMAT"))
        {
            self.logging.format = format.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        assign(&mut self.database.url, overrides.database_url);
        assign(&mut self.database.seed_on_startup, overrides.seed_on_startup);
        assign(&mut self.logging.level, overrides.log_level);
        assign(&mut self.llm.provider, overrides.llm_provider);
        assign(&mut self.llm.model, overrides.llm_model);
        assign_some(&mut self.llm.api_key, overrides.llm_api_key.map(SecretString::from));
        assign_some(&mut self.llm.base_url, overrides.llm_base_url);
        assign(&mut self.server.port, overrides.server_port);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let database = &self.database;
        let url = database.url.trim();
        require(
            url.starts_with("sqlite:") || url == ":memory:",
            "database.url must point at SQLite (`sqlite://path`, `sqlite::memory:` or `:memory:`)",
        )?;
        require(database.max_connections > 0, "database.max_connections must be at least 1")?;
        require(
            (1..=300).contains(&database.timeout_secs),
            "database.timeout_secs must be between 1 and 300",
        )?;

        let llm = &self.llm;
        require((1..=300).contains(&llm.timeout_secs), "llm.timeout_secs must be between 1 and 300")?;
        require(!llm.model.trim().is_empty(), "llm.model must not be empty")?;
        match llm.provider {
            LlmProvider::OpenAi | LlmProvider::Anthropic => require(
                llm.api_key.as_ref().is_some_and(|key| !key.expose_secret().trim().is_empty()),
                "llm.api_key must be set when llm.provider is openai or anthropic",
            )?,
            LlmProvider::Ollama => require(
                llm.base_url.as_deref().is_some_and(|url| !url.trim().is_empty()),
                "llm.base_url must be set when llm.provider is ollama",
            )?,
        }
        if let Some(base_url) = llm.base_url.as_deref() {
            require(
                base_url.starts_with("http://") || base_url.starts_with("https://"),
                "llm.base_url must be an http:// or https:// URL",
            )?;
        }

        require(self.server.port != 0, "server.port must not be 0")?;
        require(!self.server.bind_address.trim().is_empty(), "server.bind_address must not be empty")?;

        require(
            self.agent.lock_retry_delay_ms <= 5_000,
            "agent.lock_retry_delay_ms must not exceed 5000",
        )?;
        require(
            self.agent.low_stock_threshold >= 0,
            "agent.low_stock_threshold must not be negative",
        )?;

        require(
            LOG_LEVELS.contains(&self.logging.level.trim().to_ascii_lowercase().as_str()),
            "logging.level must be one of trace, debug, info, warn or error",
        )
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn require(condition: bool, message: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::Validation(message.to_string()))
    }
}

fn assign<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn assign_some<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    match explicit_path {
        Some(path) => path.is_file().then(|| path.to_path_buf()),
        None => ["shelfwise.toml", "config/shelfwise.toml"]
            .into_iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.is_file()),
    }
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&expand_env_references(&raw)?)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Replaces every `${NAME}` with the value of environment variable `NAME`.
fn expand_env_references(input: &str) -> Result<String, ConfigError> {
    let mut expanded = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        expanded.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let end = after_open.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let name = &after_open[..end];
        let value = env::var(name)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: name.to_string() })?;
        expanded.push_str(&value);
        rest = &after_open[end + 1..];
    }
    expanded.push_str(rest);

    Ok(expanded)
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn env_value<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    read_env(key)
        .map(|value| {
            value.parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
                key: key.to_string(),
                value,
            })
        })
        .transpose()
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    agent: Option<AgentPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
    seed_on_startup: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    lock_retry_delay_ms: Option<u64>,
    low_stock_threshold: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
