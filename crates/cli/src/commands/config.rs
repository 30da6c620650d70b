use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use shelfwise_core::config::{AppConfig, LoadOptions};
use toml::Value;

use crate::commands::CommandResult;

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Field {
    fn new(key: &'static str, value: impl Into<String>, env_keys: &'static [&'static str]) -> Self {
        Self { key, value: value.into(), env_keys }
    }
}

pub fn run(options: LoadOptions) -> CommandResult {
    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };

    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn fields(config: &AppConfig) -> Vec<Field> {
    vec![
        Field::new("database.url", &config.database.url, &["SHELFWISE_DATABASE_URL"]),
        Field::new(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["SHELFWISE_DATABASE_MAX_CONNECTIONS"],
        ),
        Field::new(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["SHELFWISE_DATABASE_TIMEOUT_SECS"],
        ),
        Field::new(
            "database.seed_on_startup",
            config.database.seed_on_startup.to_string(),
            &["SHELFWISE_DATABASE_SEED_ON_STARTUP"],
        ),
        Field::new("llm.provider", config.llm.provider.as_str(), &["SHELFWISE_LLM_PROVIDER"]),
        Field::new("llm.model", &config.llm.model, &["SHELFWISE_LLM_MODEL"]),
        Field::new(
            "llm.base_url",
            config.llm.base_url.as_deref().unwrap_or("<unset>"),
            &["SHELFWISE_LLM_BASE_URL"],
        ),
        Field::new("llm.api_key", redact_secret(config.llm.api_key.as_ref()), &["SHELFWISE_LLM_API_KEY"]),
        Field::new(
            "llm.timeout_secs",
            config.llm.timeout_secs.to_string(),
            &["SHELFWISE_LLM_TIMEOUT_SECS"],
        ),
        Field::new(
            "server.bind_address",
            &config.server.bind_address,
            &["SHELFWISE_SERVER_BIND_ADDRESS"],
        ),
        Field::new("server.port", config.server.port.to_string(), &["SHELFWISE_SERVER_PORT"]),
        Field::new(
            "agent.lock_retry_delay_ms",
            config.agent.lock_retry_delay_ms.to_string(),
            &["SHELFWISE_AGENT_LOCK_RETRY_DELAY_MS"],
        ),
        Field::new(
            "agent.low_stock_threshold",
            config.agent.low_stock_threshold.to_string(),
            &["SHELFWISE_AGENT_LOW_STOCK_THRESHOLD"],
        ),
        Field::new(
            "logging.level",
            &config.logging.level,
            &["SHELFWISE_LOGGING_LEVEL", "SHELFWISE_LOG_LEVEL"],
        ),
        Field::new(
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            &["SHELFWISE_LOGGING_FORMAT", "SHELFWISE_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from("shelfwise.toml"), PathBuf::from("config/shelfwise.toml")]
        .into_iter()
        .find(|candidate| candidate.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

/// Keeps a recognizable key prefix such as `sk-` and hides the rest.
fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.split_once('-') {
        Some((prefix, _)) if prefix.len() <= 4 => format!("{prefix}-***"),
        _ => "<redacted>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::{contains_path, redact_secret};

    #[test]
    fn api_keys_keep_only_their_prefix() {
        let key = SecretString::from("sk-ant-very-secret".to_string());

        assert_eq!(redact_secret(Some(&key)), "sk-***");
        assert_eq!(redact_secret(None), "<unset>");
        assert_eq!(
            redact_secret(Some(&SecretString::from("plainsecretvalue".to_string()))),
            "<redacted>"
        );
    }

    #[test]
    fn dotted_paths_resolve_through_nested_tables() {
        let doc: toml::Value = "[llm]\nmodel = \"gpt-4o\"\n".parse().expect("toml");

        assert!(contains_path(&doc, "llm.model"));
        assert!(!contains_path(&doc, "llm.api_key"));
        assert!(!contains_path(&doc, "database.url"));
    }
}
