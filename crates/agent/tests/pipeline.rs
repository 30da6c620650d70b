use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;

use shelfwise_agent::{
    runtime::HIGH_TRAFFIC_MESSAGE, ActionCategory, AgentRuntime, AgentSettings, OperationKind,
    PipelineStage, ScriptedCompletionService, UnavailableKnowledgeBase,
};
use shelfwise_core::domain::catalog::{
    BookFilter, CatalogItem, InventorySummary, Isbn, PriceChange, StockChange,
};
use shelfwise_core::domain::customer::{Customer, CustomerId};
use shelfwise_core::domain::order::{OrderDetails, OrderId, OrderRequest, PlacedOrder};
use shelfwise_db::{
    CatalogRepository, CustomerRepository, InMemoryLibraryStore, LibraryStore, LockRetryPolicy,
    OrderPlacementError, OrderRepository, RepositoryError,
};

fn library() -> InMemoryLibraryStore {
    InMemoryLibraryStore::new(
        vec![
            CatalogItem::new("X", "Book X", "Author X", Decimal::new(1000, 2), 5).expect("item"),
            CatalogItem::new(
                "9780134685991",
                "Clean Code",
                "Robert C. Martin",
                Decimal::new(4299, 2),
                22,
            )
            .expect("item"),
        ],
        vec![Customer {
            id: CustomerId(1),
            name: "Alice Johnson".to_string(),
            email: "alice.johnson@email.com".to_string(),
        }],
    )
}

fn settings() -> AgentSettings {
    AgentSettings {
        retry_policy: LockRetryPolicy { max_retries: 1, delay: Duration::from_millis(1) },
        low_stock_threshold: 5,
    }
}

fn runtime(
    store: Arc<dyn LibraryStore>,
    completion: Arc<ScriptedCompletionService>,
) -> AgentRuntime {
    AgentRuntime::new(completion, store, Arc::new(UnavailableKnowledgeBase), settings())
}

fn analysis(tools: &[&str], action_type: &str) -> String {
    json!({
        "needs_tools": true,
        "tools_needed": tools,
        "reasoning": "catalog change requested",
        "action_type": action_type
    })
    .to_string()
}

#[tokio::test]
async fn restock_request_runs_every_stage() {
    let store = Arc::new(library());
    let completion = Arc::new(ScriptedCompletionService::new([
        format!("```json\n{}\n```", analysis(&["restock_book"], "inventory")),
        "Sure! [{\"tool_name\":\"restock_book\",\"parameters\":{\"isbn\":\"X\",\"quantity\":2}}] Done."
            .to_string(),
        "  I've added two copies of Book X; there are now 7 on the shelf.  ".to_string(),
    ]));
    let agent = runtime(store.clone(), completion.clone());

    let outcome = agent.process("Please restock Book X with 2 copies").await;

    assert_eq!(outcome.stage, PipelineStage::Responded);
    assert_eq!(outcome.final_text, "I've added two copies of Book X; there are now 7 on the shelf.");
    assert!(outcome.needed_operations);
    assert_eq!(outcome.analysis.operations_needed, vec![OperationKind::RestockBook]);
    assert_eq!(outcome.analysis.action_type, ActionCategory::Inventory);
    assert_eq!(outcome.operation_calls.len(), 1);
    assert!(outcome.operation_results[0].success);
    assert!(outcome.operation_results[0].output.contains("New stock: 7"));

    let item = store.find_by_isbn(&Isbn("X".to_string())).await.expect("lookup");
    assert_eq!(item.map(|item| item.stock), Some(7));
    assert_eq!(agent.usage_history().len(), 1);

    let prompts = completion.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[1].contains("\"clean code\": 9780134685991"));
    assert!(prompts[2].contains("Result: Successfully restocked 'Book X'!"));
}

#[tokio::test]
async fn unknown_operation_in_plan_does_not_stop_the_rest() {
    let store = Arc::new(library());
    let completion = Arc::new(ScriptedCompletionService::new([
        analysis(&["list_customers"], "other"),
        json!([
            {"tool_name": "summon_dragon", "parameters": {}},
            {"tool_name": "list_customers", "parameters": {}}
        ])
        .to_string(),
        "Alice Johnson is our only customer.".to_string(),
    ]));
    let agent = runtime(store, completion);

    let outcome = agent.process("who are our customers?").await;

    assert_eq!(outcome.operation_results.len(), 2);
    assert!(!outcome.operation_results[0].success);
    assert_eq!(outcome.operation_results[0].output, "Unknown operation: summon_dragon");
    assert!(outcome.operation_results[1].success);
    assert!(outcome.operation_results[1].output.contains("**Alice Johnson** (ID: 1)"));
    assert_eq!(agent.usage_history().len(), 2);
}

/// Every order placement fails with the same error.
struct FailingOrders {
    inner: InMemoryLibraryStore,
    failure: fn() -> OrderPlacementError,
    placements: AtomicU32,
}

impl FailingOrders {
    fn new(failure: fn() -> OrderPlacementError) -> Self {
        Self { inner: library(), failure, placements: AtomicU32::new(0) }
    }
}

#[async_trait]
impl CatalogRepository for FailingOrders {
    async fn find_by_isbn(&self, isbn: &Isbn) -> Result<Option<CatalogItem>, RepositoryError> {
        self.inner.find_by_isbn(isbn).await
    }

    async fn search(&self, filter: &BookFilter) -> Result<Vec<CatalogItem>, RepositoryError> {
        self.inner.search(filter).await
    }

    async fn list_titles(&self) -> Result<Vec<(Isbn, String)>, RepositoryError> {
        self.inner.list_titles().await
    }

    async fn restock(
        &self,
        isbn: &Isbn,
        quantity: i64,
    ) -> Result<Option<StockChange>, RepositoryError> {
        self.inner.restock(isbn, quantity).await
    }

    async fn update_price(
        &self,
        isbn: &Isbn,
        new_price: Decimal,
    ) -> Result<Option<PriceChange>, RepositoryError> {
        self.inner.update_price(isbn, new_price).await
    }

    async fn inventory_summary(&self, threshold: i64) -> Result<InventorySummary, RepositoryError> {
        self.inner.inventory_summary(threshold).await
    }
}

#[async_trait]
impl CustomerRepository for FailingOrders {
    async fn find_by_id(&self, id: CustomerId) -> Result<Option<Customer>, RepositoryError> {
        self.inner.find_by_id(id).await
    }

    async fn list(&self) -> Result<Vec<Customer>, RepositoryError> {
        self.inner.list().await
    }
}

#[async_trait]
impl OrderRepository for FailingOrders {
    async fn find_order(&self, id: OrderId) -> Result<Option<OrderDetails>, RepositoryError> {
        self.inner.find_order(id).await
    }

    async fn max_order_id(&self) -> Result<Option<OrderId>, RepositoryError> {
        self.inner.max_order_id().await
    }

    async fn place_order_once(
        &self,
        _request: &OrderRequest,
    ) -> Result<PlacedOrder, OrderPlacementError> {
        self.placements.fetch_add(1, Ordering::SeqCst);
        Err((self.failure)())
    }
}

#[tokio::test]
async fn lock_contention_short_circuits_synthesis() {
    let store = Arc::new(FailingOrders::new(|| {
        OrderPlacementError::Busy("database is locked".to_string())
    }));
    let completion = Arc::new(ScriptedCompletionService::new([
        analysis(&["create_order"], "order"),
        json!([{
            "tool_name": "create_order",
            "parameters": {"customer_id": 1, "items": [{"isbn": "X", "quantity": 1}]}
        }])
        .to_string(),
    ]));
    let agent = runtime(store.clone(), completion.clone());

    let outcome = agent.process("Sell one Book X to Alice").await;

    assert_eq!(outcome.final_text, HIGH_TRAFFIC_MESSAGE);
    assert_eq!(outcome.stage, PipelineStage::Responded);
    assert!(!outcome.operation_results[0].success);
    assert!(outcome.operation_results[0].output.contains("system busy, retry later"));
    assert_eq!(completion.prompts().len(), 2, "synthesis must not be called");
    assert_eq!(store.placements.load(Ordering::SeqCst), 2);
    assert_eq!(store.inner.order_count().await, 0);
}

#[tokio::test]
async fn inconsistent_order_is_a_failed_result_and_is_not_retried() {
    let store = Arc::new(FailingOrders::new(|| {
        OrderPlacementError::Inconsistent("order 7 was not found after insert".to_string())
    }));
    let completion = Arc::new(ScriptedCompletionService::new([
        analysis(&["create_order"], "order"),
        json!([{
            "tool_name": "create_order",
            "parameters": {"customer_id": 1, "items": [{"isbn": "X", "quantity": 1}]}
        }])
        .to_string(),
        "I could not confirm that order, nothing was charged.".to_string(),
    ]));
    let agent = runtime(store.clone(), completion.clone());

    let outcome = agent.process("Sell one Book X to Alice").await;

    assert_eq!(outcome.stage, PipelineStage::Responded);
    assert_eq!(outcome.final_text, "I could not confirm that order, nothing was charged.");
    let result = &outcome.operation_results[0];
    assert!(!result.success);
    assert!(result.output.starts_with("Error executing operation create_order"), "{}", result.output);
    assert!(result.output.contains("order transaction inconsistency"));
    assert_eq!(store.placements.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unparsable_analysis_degrades_to_no_operations() {
    let store = Arc::new(library());
    let completion = Arc::new(ScriptedCompletionService::new([
        "I am not sure what you mean.",
        "Hello! How can I help with the library today?",
    ]));
    let agent = runtime(store, completion.clone());

    let outcome = agent.process("hi").await;

    assert_eq!(outcome.stage, PipelineStage::Responded);
    assert_eq!(outcome.final_text, "Hello! How can I help with the library today?");
    assert!(!outcome.needed_operations);
    assert_eq!(outcome.analysis.action_type, ActionCategory::Error);
    assert!(outcome.analysis.error.is_some());
    assert!(outcome.operation_calls.is_empty());
    assert_eq!(completion.prompts().len(), 2);
}

#[tokio::test]
async fn planning_failure_continues_with_an_empty_plan() {
    let store = Arc::new(library());
    let completion = Arc::new(ScriptedCompletionService::new([analysis(&["find_books"], "search")]));
    completion.push_failure("planner timed out");
    completion.push_response("I couldn't look that up just now.");
    let agent = runtime(store, completion);

    let outcome = agent.process("find books by Author X").await;

    assert_eq!(outcome.stage, PipelineStage::Responded);
    assert!(outcome.needed_operations);
    assert!(outcome.operation_calls.is_empty());
    assert!(outcome.operation_results.is_empty());
    assert!(agent.usage_history().is_empty());
}

#[tokio::test]
async fn synthesis_failure_ends_the_turn_in_the_errored_state() {
    let store = Arc::new(library());
    let completion = Arc::new(ScriptedCompletionService::new([
        analysis(&["inventory_summary"], "inventory"),
        json!({"tool_name": "inventory_summary", "parameters": {}}).to_string(),
    ]));
    completion.push_failure("connection reset");
    let agent = runtime(store, completion);

    let outcome = agent.process("how is our stock?").await;

    assert_eq!(outcome.stage, PipelineStage::Errored);
    assert!(outcome.final_text.starts_with("I encountered an error while processing your request:"));
    assert!(outcome.final_text.contains("connection reset"));
    assert!(!outcome.needed_operations);
    assert!(outcome.operation_calls.is_empty());
    assert!(outcome.operation_results.is_empty());
    assert_eq!(outcome.analysis.action_type, ActionCategory::Error);
    assert_eq!(agent.usage_history().len(), 1);
}

#[tokio::test]
async fn usage_history_is_a_copy_and_can_be_cleared() {
    let store = Arc::new(library());
    let completion = Arc::new(ScriptedCompletionService::new([
        analysis(&["find_books", "inventory_summary"], "search"),
        json!([
            {"tool_name": "find_books", "parameters": {"title": "clean"}},
            {"tool_name": "inventory_summary", "parameters": {}},
            {"tool_name": "restock_book", "parameters": {"isbn": "X", "quantity": 0}}
        ])
        .to_string(),
        "Done.".to_string(),
    ]));
    let agent = runtime(store, completion);

    agent.process("show clean code and stock levels").await;
    let history = agent.usage_history();
    agent.clear_usage_history();

    assert_eq!(history.len(), 3);
    assert!(!history[2].result.success);
    assert!(agent.usage_history().is_empty());
}
