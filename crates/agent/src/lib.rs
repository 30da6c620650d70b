//! Agent runtime: turns a natural-language library request into catalog
//! operations and a single reply.
//!
//! # Architecture
//!
//! Every turn walks a fixed pipeline:
//! 1. **Analysis** - the completion service decides whether operations are needed
//! 2. **Planning** - it proposes concrete [`executor::OperationCall`]s, given the
//!    live title to ISBN mapping and each operation's parameter contract
//! 3. **Execution** (`executor`) - calls are validated and run in order against
//!    the store; every call lands in the usage log
//! 4. **Synthesis** - results are rendered into one user-facing message
//!
//! Completion output is never trusted: [`extract`] normalizes it into an
//! explicit sum type and every stage degrades instead of failing.
//!
//! # Key Types
//!
//! - `AgentRuntime` - the orchestrator (see `runtime`)
//! - `CompletionService` - pluggable text completion (OpenAI/Anthropic/Ollama)
//! - `OperationKind` - the fixed operation catalog
//!
//! # Safety Principle
//!
//! The model only chooses operations and arguments. Stock levels, totals and
//! validation are decided by the store and the order transaction.

pub mod executor;
pub mod extract;
pub mod knowledge;
pub mod llm;
pub mod operations;
pub mod prompts;
pub mod runtime;

pub use executor::{OperationCall, OperationExecutor, OperationResult, UsageLog, UsageRecord};
pub use extract::{extract_json, Extracted};
pub use knowledge::{KnowledgeBase, KnowledgePassage, UnavailableKnowledgeBase};
pub use llm::{CompletionService, HttpCompletionClient, ScriptedCompletionService};
pub use operations::{Operation, OperationKind, ValidationError};
pub use runtime::{
    ActionCategory, AgentRuntime, AgentSettings, PipelineStage, RequestAnalysis, TurnOutcome,
};
