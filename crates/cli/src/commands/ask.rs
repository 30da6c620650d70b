use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use shelfwise_agent::{
    AgentRuntime, AgentSettings, CompletionService, HttpCompletionClient, PipelineStage,
    ScriptedCompletionService, UnavailableKnowledgeBase,
};
use shelfwise_core::config::LoadOptions;
use shelfwise_db::{connect_from_config, migrations, SeedDataset, SqlLibraryStore};
use tracing::info;

use crate::commands::{async_runtime, load_config, CommandResult, Failure};

#[derive(Clone, Debug, Default)]
pub struct AskOptions {
    pub text: String,
    pub offline: bool,
    /// JSON array of completion responses, consumed in order. Required with `offline`.
    pub script: Option<PathBuf>,
}

/// Runs a single pipeline turn and reports the full outcome under `data`.
pub fn run(options: LoadOptions, ask: AskOptions) -> CommandResult {
    let text = ask.text.trim();
    if text.is_empty() {
        return CommandResult::failure("ask", "invalid_input", "request text must not be empty", 2);
    }

    let config = match load_config("ask", options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let completion: Arc<dyn CompletionService> = if ask.offline {
        let Some(path) = ask.script.as_deref() else {
            return CommandResult::failure(
                "ask",
                "invalid_input",
                "--offline requires --script <file> with scripted completion responses",
                2,
            );
        };
        match load_script(path) {
            Ok(responses) => Arc::new(ScriptedCompletionService::new(responses)),
            Err(error) => {
                return CommandResult::failure("ask", "script_load", format!("{error:#}"), 2);
            }
        }
    } else {
        match HttpCompletionClient::from_config(&config.llm) {
            Ok(client) => Arc::new(client),
            Err(error) => {
                return CommandResult::failure("ask", "completion_client", format!("{error:#}"), 3);
            }
        }
    };

    let runtime = match async_runtime("ask") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_from_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        if config.database.seed_on_startup {
            SeedDataset::load(&pool)
                .await
                .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        }

        let agent = AgentRuntime::new(
            completion,
            Arc::new(SqlLibraryStore::new(pool.clone())),
            Arc::new(UnavailableKnowledgeBase),
            AgentSettings::from_config(&config.agent),
        );
        let outcome = agent.process(text).await;
        info!(
            event_name = "cli.ask.completed",
            correlation_id = %outcome.correlation_id,
            stage = outcome.stage.as_str(),
            operations = outcome.operation_calls.len(),
            "ask turn completed"
        );

        pool.close().await;
        Ok::<_, Failure>(outcome)
    });

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(failure) => return CommandResult::from_failure("ask", failure),
    };

    let data = serde_json::to_value(&outcome).ok();
    if outcome.stage == PipelineStage::Errored {
        CommandResult::failure_with("ask", "pipeline", outcome.final_text, 7, data)
    } else {
        CommandResult::success_with("ask", outcome.final_text, data)
    }
}

/// String entries are used verbatim; any other JSON value is sent as its
/// serialized text, so planner output can be written as plain JSON.
fn load_script(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read script `{}`", path.display()))?;
    let entries: Vec<Value> = serde_json::from_str(&raw)
        .with_context(|| format!("script `{}` must be a JSON array", path.display()))?;
    if entries.is_empty() {
        bail!("script `{}` holds no responses", path.display());
    }

    Ok(entries
        .into_iter()
        .map(|entry| match entry {
            Value::String(text) => text,
            other => other.to_string(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::load_script;

    #[test]
    fn script_entries_accept_text_and_structured_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("script.json");
        fs::write(
            &path,
            r#"["plain reply", {"needs_tools": false}, [{"tool_name": "list_customers"}]]"#,
        )
        .expect("write script");

        let responses = load_script(&path).expect("script loads");

        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0], "plain reply");
        assert_eq!(responses[1], r#"{"needs_tools":false}"#);
        assert!(responses[2].starts_with("[{"));
    }

    #[test]
    fn empty_or_malformed_scripts_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let empty = dir.path().join("empty.json");
        let malformed = dir.path().join("malformed.json");
        fs::write(&empty, "[]").expect("write");
        fs::write(&malformed, "{\"not\": \"a list\"}").expect("write");

        let empty_error = load_script(&empty).expect_err("empty script");
        let malformed_error = load_script(&malformed).expect_err("malformed script");

        assert!(empty_error.to_string().contains("holds no responses"));
        assert!(format!("{malformed_error:#}").contains("must be a JSON array"));
        assert!(load_script(&dir.path().join("missing.json")).is_err());
    }
}
