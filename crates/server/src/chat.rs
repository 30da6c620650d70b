use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shelfwise_agent::{AgentRuntime, RequestAnalysis, TurnOutcome, UsageRecord};
use shelfwise_core::errors::{ApplicationError, DomainError, InterfaceError};
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct ChatState {
    pub agent: Arc<AgentRuntime>,
}

pub fn router(agent: Arc<AgentRuntime>) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/usage", axum::routing::get(usage_history).delete(clear_usage_history))
        .with_state(ChatState { agent })
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolCallView {
    pub tool_name: String,
    pub input_args: Value,
    pub output: String,
    pub success: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub session_id: String,
    pub correlation_id: String,
    pub tool_calls: Vec<ToolCallView>,
    pub analysis: RequestAnalysis,
}

impl ChatResponse {
    fn from_outcome(session_id: String, outcome: TurnOutcome) -> Self {
        let tool_calls = outcome
            .operation_calls
            .into_iter()
            .zip(outcome.operation_results)
            .map(|(call, result)| ToolCallView {
                tool_name: call.name,
                input_args: call.parameters,
                output: result.output,
                success: result.success,
            })
            .collect();

        Self {
            message: outcome.final_text,
            session_id,
            correlation_id: outcome.correlation_id,
            tool_calls,
            analysis: outcome.analysis,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub detail: String,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.0.user_message(),
            detail: self.0.message().to_string(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// No session state is kept; the id is echoed back, or minted when absent.
pub async fn chat(
    State(state): State<ChatState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let session_id = request
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if request.message.trim().is_empty() {
        let error = ApplicationError::Domain(DomainError::InvariantViolation(
            "message must not be empty".to_string(),
        ));
        return Err(ApiError(error.into_interface(session_id)));
    }

    let outcome = state.agent.process(request.message.trim()).await;
    info!(
        event_name = "server.chat.responded",
        correlation_id = %outcome.correlation_id,
        session_id = %session_id,
        stage = outcome.stage.as_str(),
        operations = outcome.operation_calls.len(),
        "chat turn completed"
    );

    Ok(Json(ChatResponse::from_outcome(session_id, outcome)))
}

pub async fn usage_history(State(state): State<ChatState>) -> Json<Vec<UsageRecord>> {
    Json(state.agent.usage_history())
}

pub async fn clear_usage_history(State(state): State<ChatState>) -> StatusCode {
    state.agent.clear_usage_history();
    info!(event_name = "server.usage.cleared", "usage history cleared");
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        extract::State,
        http::{Request, StatusCode},
        response::IntoResponse,
        Json,
    };
    use rust_decimal::Decimal;
    use serde_json::{json, Value};
    use shelfwise_agent::{
        AgentRuntime, AgentSettings, ScriptedCompletionService, UnavailableKnowledgeBase,
    };
    use shelfwise_core::domain::catalog::CatalogItem;
    use shelfwise_db::InMemoryLibraryStore;
    use tower::ServiceExt;

    use super::{chat, clear_usage_history, router, usage_history, ChatRequest, ChatState};

    fn agent(responses: Vec<String>) -> Arc<AgentRuntime> {
        let store = InMemoryLibraryStore::new(
            vec![CatalogItem::new("X", "Book X", "Author X", Decimal::new(1000, 2), 5)
                .expect("item")],
            Vec::new(),
        );
        Arc::new(AgentRuntime::new(
            Arc::new(ScriptedCompletionService::new(responses)),
            Arc::new(store),
            Arc::new(UnavailableKnowledgeBase),
            AgentSettings::default(),
        ))
    }

    fn restock_script() -> Vec<String> {
        vec![
            json!({"needs_tools": true, "tools_needed": ["restock_book"], "action_type": "inventory"})
                .to_string(),
            json!([{"tool_name": "restock_book", "parameters": {"isbn": "X", "quantity": 2}}])
                .to_string(),
            "Book X now has 7 copies.".to_string(),
        ]
    }

    #[tokio::test]
    async fn chat_reports_tool_calls_with_their_arguments() {
        let state = ChatState { agent: agent(restock_script()) };

        let Json(response) = chat(
            State(state.clone()),
            Json(ChatRequest {
                session_id: Some("session-1".to_string()),
                message: "restock Book X by 2".to_string(),
            }),
        )
        .await
        .expect("chat succeeds");

        assert_eq!(response.message, "Book X now has 7 copies.");
        assert_eq!(response.session_id, "session-1");
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].tool_name, "restock_book");
        assert_eq!(response.tool_calls[0].input_args, json!({"isbn": "X", "quantity": 2}));
        assert!(response.tool_calls[0].success);

        let Json(history) = usage_history(State(state.clone())).await;
        assert_eq!(history.len(), 1);
        assert_eq!(clear_usage_history(State(state.clone())).await, StatusCode::NO_CONTENT);
        assert!(state.agent.usage_history().is_empty());
    }

    #[tokio::test]
    async fn blank_message_is_a_bad_request() {
        let state = ChatState { agent: agent(Vec::new()) };

        let error = chat(
            State(state),
            Json(ChatRequest { session_id: None, message: "   ".to_string() }),
        )
        .await
        .expect_err("blank message");

        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chat_route_accepts_json_bodies() {
        let app = router(agent(restock_script()));

        let response = app
            .oneshot(
                Request::post("/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"message": "restock Book X by 2"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), 64 * 1024).await.expect("body");
        let body: Value = serde_json::from_slice(&bytes).expect("json body");
        assert_eq!(body["tool_calls"][0]["tool_name"], json!("restock_book"));
        assert_eq!(body["analysis"]["needs_tools"], json!(true));
        assert!(!body["session_id"].as_str().unwrap_or_default().is_empty());
    }
}
