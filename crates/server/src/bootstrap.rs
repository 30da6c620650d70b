use std::sync::Arc;

use shelfwise_agent::{
    AgentRuntime, AgentSettings, CompletionService, HttpCompletionClient, UnavailableKnowledgeBase,
};
use shelfwise_core::config::{AppConfig, ConfigError};
use shelfwise_db::{
    connect_from_config, migrations, DbPool, RepositoryError, SeedDataset, SqlLibraryStore,
};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub agent_runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("seed dataset failed to load: {0}")]
    Seed(#[source] RepositoryError),
    #[error("completion client could not be built: {0:#}")]
    Completion(anyhow::Error),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let completion =
        HttpCompletionClient::from_config(&config.llm).map_err(BootstrapError::Completion)?;
    info!(
        event_name = "system.bootstrap.completion_client",
        correlation_id = "bootstrap",
        provider = completion.provider().as_str(),
        model = completion.model(),
        "completion client configured"
    );
    bootstrap_with_completion(config, Arc::new(completion)).await
}

/// Builds the application around an already constructed completion service.
pub async fn bootstrap_with_completion(
    config: AppConfig,
    completion: Arc<dyn CompletionService>,
) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    if config.database.seed_on_startup {
        let seeded = SeedDataset::load(&db_pool).await.map_err(BootstrapError::Seed)?;
        info!(
            event_name = "system.bootstrap.seeded",
            correlation_id = "bootstrap",
            skipped = seeded.skipped,
            books = seeded.books,
            customers = seeded.customers,
            "seed dataset checked"
        );
    }

    let agent_runtime = AgentRuntime::new(
        completion,
        Arc::new(SqlLibraryStore::new(db_pool.clone())),
        Arc::new(UnavailableKnowledgeBase),
        AgentSettings::from_config(&config.agent),
    );

    Ok(Application { config, db_pool, agent_runtime: Arc::new(agent_runtime) })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use shelfwise_agent::ScriptedCompletionService;
    use shelfwise_core::config::{AppConfig, ConfigOverrides, LlmProvider, LoadOptions};

    use super::{bootstrap_with_completion, bootstrap_with_config, BootstrapError};

    #[test]
    fn hosted_provider_without_api_key_fails_config_load() {
        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                llm_provider: Some(LlmProvider::OpenAi),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        let message = BootstrapError::from(result.err().expect("missing api key")).to_string();
        assert!(message.contains("llm.api_key"), "{message}");
    }

    #[tokio::test]
    async fn unreachable_database_fails_bootstrap() {
        let mut config = AppConfig::default();
        config.database.url = "sqlite:///nonexistent-dir/shelfwise.db".to_string();
        config.database.timeout_secs = 1;

        let result = bootstrap_with_config(config).await;

        assert!(matches!(result, Err(BootstrapError::DatabaseConnect(_))));
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_seeds_the_catalog() {
        let mut config = AppConfig::default();
        config.database.url = "sqlite::memory:".to_string();
        config.database.max_connections = 1;

        let app = bootstrap_with_completion(config, Arc::new(ScriptedCompletionService::default()))
            .await
            .expect("bootstrap should succeed");

        let (titles,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM catalog_item")
            .fetch_one(&app.db_pool)
            .await
            .expect("catalog should be queryable");
        assert_eq!(titles, 10);
        assert!(app.agent_runtime.usage_history().is_empty());
    }
}
