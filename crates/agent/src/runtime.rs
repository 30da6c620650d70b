use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use shelfwise_core::config::AgentConfig;
use shelfwise_db::{CatalogRepository, LibraryStore, LockRetryPolicy};

use crate::executor::{OperationCall, OperationExecutor, OperationResult, UsageLog, UsageRecord};
use crate::extract::extract_json;
use crate::knowledge::KnowledgeBase;
use crate::llm::CompletionService;
use crate::operations::OperationKind;
use crate::prompts;

pub const HIGH_TRAFFIC_MESSAGE: &str = "I'm experiencing high database traffic right now. Please try your request again in a few moments. The system should be available shortly.";

const DEFAULT_REASONING: &str = "Analysis completed";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Received,
    Analyzed,
    Planned,
    Executed,
    Responded,
    Errored,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Analyzed => "analyzed",
            Self::Planned => "planned",
            Self::Executed => "executed",
            Self::Responded => "responded",
            Self::Errored => "errored",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    Order,
    Search,
    Inventory,
    Knowledge,
    #[default]
    Other,
    Error,
}

impl ActionCategory {
    /// Unrecognized labels fall back to `Other`.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "order" => Self::Order,
            "search" => Self::Search,
            "inventory" => Self::Inventory,
            "knowledge" => Self::Knowledge,
            "error" => Self::Error,
            _ => Self::Other,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestAnalysis {
    #[serde(rename = "needs_tools")]
    pub needs_operations: bool,
    #[serde(rename = "tools_needed")]
    pub operations_needed: Vec<OperationKind>,
    pub reasoning: String,
    pub action_type: ActionCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RequestAnalysis {
    pub fn failed(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            needs_operations: false,
            operations_needed: Vec::new(),
            reasoning: format!("Error during analysis: {reason}"),
            action_type: ActionCategory::Error,
            error: Some(reason),
        }
    }

    /// Missing fields take their defaults; unknown operation names are dropped.
    pub fn from_object(fields: &Map<String, Value>) -> Self {
        let needs_operations = match fields.get("needs_tools") {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(text)) => text.trim().eq_ignore_ascii_case("true"),
            _ => false,
        };

        let mut operations_needed = Vec::new();
        let names = fields.get("tools_needed").and_then(Value::as_array).into_iter().flatten();
        for name in names.filter_map(Value::as_str) {
            match OperationKind::from_name(name) {
                Some(kind) if !operations_needed.contains(&kind) => operations_needed.push(kind),
                Some(_) => {}
                None => warn!(
                    event_name = "agent.analysis.unknown_operation",
                    operation = name,
                    "analysis named an unknown operation"
                ),
            }
        }

        let reasoning = fields
            .get("reasoning")
            .and_then(Value::as_str)
            .filter(|text| !text.trim().is_empty())
            .unwrap_or(DEFAULT_REASONING)
            .to_string();
        let action_type = fields
            .get("action_type")
            .and_then(Value::as_str)
            .map(ActionCategory::parse)
            .unwrap_or_default();

        Self { needs_operations, operations_needed, reasoning, action_type, error: None }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TurnOutcome {
    pub correlation_id: String,
    pub stage: PipelineStage,
    pub final_text: String,
    pub analysis: RequestAnalysis,
    pub operation_calls: Vec<OperationCall>,
    pub operation_results: Vec<OperationResult>,
    pub needed_operations: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AgentSettings {
    pub retry_policy: LockRetryPolicy,
    pub low_stock_threshold: i64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self { retry_policy: LockRetryPolicy::default(), low_stock_threshold: 5 }
    }
}

impl AgentSettings {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            retry_policy: LockRetryPolicy::with_delay_ms(config.lock_retry_delay_ms),
            low_stock_threshold: config.low_stock_threshold,
        }
    }
}

/// One orchestrator per process or worker. Turns may run concurrently; they
/// share the store and the usage log only.
pub struct AgentRuntime {
    completion: Arc<dyn CompletionService>,
    store: Arc<dyn LibraryStore>,
    executor: OperationExecutor,
    usage: UsageLog,
}

impl AgentRuntime {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        store: Arc<dyn LibraryStore>,
        knowledge: Arc<dyn KnowledgeBase>,
        settings: AgentSettings,
    ) -> Self {
        let executor = OperationExecutor::new(store.clone(), knowledge)
            .with_retry_policy(settings.retry_policy)
            .with_low_stock_threshold(settings.low_stock_threshold);
        Self { completion, store, executor, usage: UsageLog::new() }
    }

    pub fn usage_history(&self) -> Vec<UsageRecord> {
        self.usage.snapshot()
    }

    pub fn clear_usage_history(&self) {
        self.usage.clear();
    }

    /// Runs one turn to completion. Never fails: any stage error turns into
    /// an apologetic answer with the reason kept in the analysis.
    pub async fn process(&self, user_text: &str) -> TurnOutcome {
        let correlation_id = Uuid::new_v4().to_string();
        log_stage(&correlation_id, PipelineStage::Received);

        match self.run_turn(user_text, &correlation_id).await {
            Ok(outcome) => outcome,
            Err(turn_error) => {
                let reason = format!("{turn_error:#}");
                error!(
                    event_name = "agent.pipeline.errored",
                    correlation_id = %correlation_id,
                    error = %reason,
                    "turn failed"
                );
                TurnOutcome {
                    final_text: format!(
                        "I encountered an error while processing your request: {reason}. Please try again."
                    ),
                    analysis: RequestAnalysis::failed(reason),
                    correlation_id,
                    stage: PipelineStage::Errored,
                    operation_calls: Vec::new(),
                    operation_results: Vec::new(),
                    needed_operations: false,
                }
            }
        }
    }

    async fn run_turn(&self, user_text: &str, correlation_id: &str) -> Result<TurnOutcome> {
        let analysis = self.analyze(user_text, correlation_id).await;
        log_stage(correlation_id, PipelineStage::Analyzed);

        let mut calls = Vec::new();
        let mut results = Vec::new();
        if analysis.needs_operations && !analysis.operations_needed.is_empty() {
            calls = self.plan(user_text, &analysis.operations_needed, correlation_id).await?;
            log_stage(correlation_id, PipelineStage::Planned);

            if !calls.is_empty() {
                results = self.executor.execute(&calls, &self.usage).await;
                log_stage(correlation_id, PipelineStage::Executed);
            }
        }

        let final_text = self.respond(user_text, &analysis, &results, correlation_id).await?;
        log_stage(correlation_id, PipelineStage::Responded);

        Ok(TurnOutcome {
            correlation_id: correlation_id.to_string(),
            stage: PipelineStage::Responded,
            final_text,
            needed_operations: analysis.needs_operations,
            analysis,
            operation_calls: calls,
            operation_results: results,
        })
    }

    async fn analyze(&self, user_text: &str, correlation_id: &str) -> RequestAnalysis {
        let response = match self.completion.complete(&prompts::analysis_prompt(user_text)).await {
            Ok(response) => response,
            Err(completion_error) => {
                warn!(
                    event_name = "agent.analysis.degraded",
                    correlation_id,
                    error = %format!("{completion_error:#}"),
                    "analysis completion failed"
                );
                return RequestAnalysis::failed(format!("{completion_error:#}"));
            }
        };

        let Some(fields) = extract_json(&response).into_object() else {
            warn!(
                event_name = "agent.analysis.degraded",
                correlation_id,
                "analysis response held no JSON object"
            );
            return RequestAnalysis::failed("could not extract JSON from the analysis response");
        };

        let analysis = RequestAnalysis::from_object(&fields);
        info!(
            event_name = "agent.analysis.completed",
            correlation_id,
            needs_operations = analysis.needs_operations,
            operations = ?analysis.operations_needed,
            action_type = ?analysis.action_type,
            "request analyzed"
        );
        analysis
    }

    /// The catalog read completes before the completion call is made.
    async fn plan(
        &self,
        user_text: &str,
        operations: &[OperationKind],
        correlation_id: &str,
    ) -> Result<Vec<OperationCall>> {
        let titles = self.store.list_titles().await.context("reading catalog titles")?;
        let prompt = prompts::planning_prompt(user_text, operations, &titles);

        let response = match self.completion.complete(&prompt).await {
            Ok(response) => response,
            Err(completion_error) => {
                warn!(
                    event_name = "agent.plan.degraded",
                    correlation_id,
                    error = %format!("{completion_error:#}"),
                    "planning completion failed, continuing with an empty plan"
                );
                return Ok(Vec::new());
            }
        };

        let calls = extract_json(&response)
            .into_list()
            .iter()
            .filter_map(OperationCall::from_plan_item)
            .collect::<Vec<_>>();
        info!(
            event_name = "agent.plan.completed",
            correlation_id,
            calls = calls.len(),
            "operation calls planned"
        );
        Ok(calls)
    }

    async fn respond(
        &self,
        user_text: &str,
        analysis: &RequestAnalysis,
        results: &[OperationResult],
        correlation_id: &str,
    ) -> Result<String> {
        if results.iter().any(OperationResult::reports_contention) {
            warn!(
                event_name = "agent.respond.high_traffic",
                correlation_id,
                "storage contention reported, skipping synthesis"
            );
            return Ok(HIGH_TRAFFIC_MESSAGE.to_string());
        }

        let prompt = prompts::synthesis_prompt(user_text, &analysis.reasoning, results);
        let response =
            self.completion.complete(&prompt).await.context("generating the final response")?;
        Ok(response.trim().to_string())
    }
}

fn log_stage(correlation_id: &str, stage: PipelineStage) {
    info!(
        event_name = "agent.pipeline.stage",
        correlation_id,
        stage = stage.as_str(),
        "pipeline stage reached"
    );
}
