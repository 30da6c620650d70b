use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use shelfwise_db::DbPool;
use tracing::warn;

#[derive(Clone)]
pub struct HealthState {
    pub db_pool: DbPool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Ready,
    /// Reachable but holding no catalog data yet.
    Empty,
    Degraded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: CheckStatus,
    pub detail: String,
}

impl HealthCheck {
    fn new(status: CheckStatus, detail: impl Into<String>) -> Self {
        Self { status, detail: detail.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: CheckStatus,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub catalog: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

/// 503 when the database or the schema is unreachable. An empty catalog is
/// reported but still healthy.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let catalog = if database.status == CheckStatus::Ready {
        catalog_check(&state.db_pool).await
    } else {
        HealthCheck::new(CheckStatus::Degraded, "skipped: database unavailable")
    };

    let healthy =
        database.status == CheckStatus::Ready && catalog.status != CheckStatus::Degraded;
    let payload = HealthResponse {
        status: if healthy { CheckStatus::Ready } else { CheckStatus::Degraded },
        service: HealthCheck::new(CheckStatus::Ready, "shelfwise-server accepting requests"),
        database,
        catalog,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck::new(CheckStatus::Ready, "database query succeeded"),
        Err(error) => {
            warn!(event_name = "system.health.database", error = %error, "database check failed");
            HealthCheck::new(CheckStatus::Degraded, format!("database query failed: {error}"))
        }
    }
}

async fn catalog_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT COUNT(1) FROM catalog_item").fetch_one(pool).await {
        Ok(0) => HealthCheck::new(CheckStatus::Empty, "catalog holds no titles"),
        Ok(titles) => HealthCheck::new(CheckStatus::Ready, format!("{titles} catalog titles")),
        Err(error) => {
            warn!(event_name = "system.health.catalog", error = %error, "catalog check failed");
            HealthCheck::new(CheckStatus::Degraded, format!("catalog query failed: {error}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use shelfwise_db::{connect_with_settings, migrations, SeedDataset};

    use super::{health, CheckStatus, HealthState};

    #[tokio::test]
    async fn seeded_database_is_ready() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        SeedDataset::load(&pool).await.expect("seed");

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool.clone() })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, CheckStatus::Ready);
        assert_eq!(payload.catalog.detail, "10 catalog titles");

        pool.close().await;
    }

    #[tokio::test]
    async fn missing_schema_is_degraded() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.database.status, CheckStatus::Ready);
        assert_eq!(payload.catalog.status, CheckStatus::Degraded);
    }

    #[tokio::test]
    async fn closed_pool_is_service_unavailable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        pool.close().await;

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.database.status, CheckStatus::Degraded);
        assert_eq!(payload.service.status, CheckStatus::Ready);
    }
}
