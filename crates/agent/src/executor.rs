use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use shelfwise_db::repositories::is_lock_message;
use shelfwise_db::{LibraryStore, LockRetryPolicy};

use crate::knowledge::KnowledgeBase;
use crate::operations::{handlers, Operation, OperationContext, OperationKind};

/// One planned call as the planner wrote it. The name is unresolved until
/// execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationCall {
    #[serde(rename = "tool_name")]
    pub name: String,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl OperationCall {
    pub fn new(name: impl Into<String>, parameters: Value) -> Self {
        Self { name: name.into(), parameters, reasoning: None }
    }

    /// Non-object plan entries yield `None`; a missing name yields a call that
    /// fails as unknown.
    pub fn from_plan_item(item: &Value) -> Option<Self> {
        let fields = item.as_object()?;
        let name = fields.get("tool_name").and_then(Value::as_str).unwrap_or_default();
        let parameters =
            fields.get("parameters").cloned().unwrap_or_else(|| Value::Object(Map::new()));
        let reasoning = fields.get("reasoning").and_then(Value::as_str).map(str::to_string);

        Some(Self { name: name.to_string(), parameters, reasoning })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    #[serde(rename = "tool_name")]
    pub name: String,
    #[serde(rename = "result")]
    pub output: String,
    pub success: bool,
}

impl OperationResult {
    /// True when the output carries a storage lock or busy indicator.
    pub fn reports_contention(&self) -> bool {
        is_lock_message(&self.output) || self.output.to_ascii_lowercase().contains("system busy")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub call: OperationCall,
    pub result: OperationResult,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only record of executed calls, shared by concurrent turns.
#[derive(Debug, Default)]
pub struct UsageLog {
    records: RwLock<Vec<UsageRecord>>,
}

impl UsageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, call: OperationCall, result: OperationResult) {
        let record = UsageRecord { call, result, recorded_at: Utc::now() };
        self.records.write().unwrap_or_else(PoisonError::into_inner).push(record);
    }

    /// A copy; later appends do not show up in it.
    pub fn snapshot(&self) -> Vec<UsageRecord> {
        self.records.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn clear(&self) {
        self.records.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone)]
pub struct OperationExecutor {
    store: Arc<dyn LibraryStore>,
    knowledge: Arc<dyn KnowledgeBase>,
    retry_policy: LockRetryPolicy,
    low_stock_threshold: i64,
}

impl OperationExecutor {
    pub fn new(store: Arc<dyn LibraryStore>, knowledge: Arc<dyn KnowledgeBase>) -> Self {
        Self { store, knowledge, retry_policy: LockRetryPolicy::default(), low_stock_threshold: 5 }
    }

    pub fn with_retry_policy(mut self, retry_policy: LockRetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_low_stock_threshold(mut self, low_stock_threshold: i64) -> Self {
        self.low_stock_threshold = low_stock_threshold;
        self
    }

    /// Runs every call in order. Each call is independent and each one is
    /// appended to `usage`, whatever its outcome.
    pub async fn execute(&self, calls: &[OperationCall], usage: &UsageLog) -> Vec<OperationResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let result = self.execute_one(call).await;
            usage.append(call.clone(), result.clone());
            results.push(result);
        }
        results
    }

    async fn execute_one(&self, call: &OperationCall) -> OperationResult {
        let failed = |output: String| OperationResult {
            name: call.name.clone(),
            output,
            success: false,
        };

        let Some(kind) = OperationKind::from_name(&call.name) else {
            warn!(
                event_name = "agent.operation.unknown",
                operation = %call.name,
                "unknown operation"
            );
            return failed(format!("Unknown operation: {}", call.name));
        };

        let operation = match Operation::decode(kind, &call.parameters) {
            Ok(operation) => operation,
            Err(error) => {
                warn!(
                    event_name = "agent.operation.invalid_parameters",
                    operation = kind.name(),
                    error = %error,
                    "operation parameters rejected"
                );
                return failed(format!("Invalid parameters for {kind}: {error}"));
            }
        };

        let ctx = OperationContext {
            store: self.store.as_ref(),
            knowledge: self.knowledge.as_ref(),
            retry_policy: self.retry_policy,
            low_stock_threshold: self.low_stock_threshold,
        };

        match handlers::run(&operation, &ctx).await {
            Ok(output) => {
                if output.success {
                    info!(
                        event_name = "agent.operation.completed",
                        operation = kind.name(),
                        "operation completed"
                    );
                } else {
                    warn!(
                        event_name = "agent.operation.failed",
                        operation = kind.name(),
                        reason = %output.message,
                        "operation reported a failure"
                    );
                }
                OperationResult {
                    name: call.name.clone(),
                    output: output.message,
                    success: output.success,
                }
            }
            Err(error) => {
                warn!(
                    event_name = "agent.operation.error",
                    operation = kind.name(),
                    error = %format!("{error:#}"),
                    "operation raised an error"
                );
                failed(format!("Error executing operation {kind}: {error:#}"))
            }
        }
    }
}
