use std::fmt::Write as _;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tracing::info;

use shelfwise_core::domain::catalog::{BookFilter, InventorySummary, Isbn};
use shelfwise_core::domain::order::{OrderId, OrderRequest};
use shelfwise_db::{
    CatalogRepository, CustomerRepository, LibraryStore, LockRetryPolicy, OrderPlacementError,
    OrderRepository, OrderTransaction, RepositoryError,
};

use super::Operation;
use crate::knowledge::KnowledgeBase;

const KNOWLEDGE_RESULT_LIMIT: usize = 4;

/// Text shown to the synthesis step, with the success flag of the call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandlerOutput {
    pub message: String,
    pub success: bool,
}

impl HandlerOutput {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self { message: message.into(), success: true }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { message: message.into(), success: false }
    }
}

pub struct OperationContext<'a> {
    pub store: &'a dyn LibraryStore,
    pub knowledge: &'a dyn KnowledgeBase,
    pub retry_policy: LockRetryPolicy,
    pub low_stock_threshold: i64,
}

/// Domain failures come back as failed outputs; `Err` means the storage or
/// knowledge layer itself failed.
pub async fn run(operation: &Operation, ctx: &OperationContext<'_>) -> Result<HandlerOutput> {
    match operation {
        Operation::FindBooks(filter) => find_books(ctx, filter).await,
        Operation::CreateOrder(request) => create_order(ctx, request).await,
        Operation::RestockBook { isbn, quantity } => restock_book(ctx, isbn, *quantity).await,
        Operation::UpdatePrice { isbn, new_price } => update_price(ctx, isbn, *new_price).await,
        Operation::OrderStatus { order_id } => order_status(ctx, *order_id).await,
        Operation::InventorySummary => inventory_summary(ctx).await,
        Operation::SearchKnowledgeBase { query } => search_knowledge_base(ctx, query).await,
        Operation::ListCustomers => list_customers(ctx).await,
    }
}

async fn find_books(ctx: &OperationContext<'_>, filter: &BookFilter) -> Result<HandlerOutput> {
    let books = ctx.store.search(filter).await.context("searching for books")?;
    if books.is_empty() {
        return Ok(HandlerOutput::succeeded("No books found matching your criteria."));
    }

    let mut text = format!("Found {} book(s):\n\n", books.len());
    for book in &books {
        let stock_status = if book.in_stock() {
            format!(" (In stock: {})", book.stock)
        } else {
            " (OUT OF STOCK)".to_string()
        };
        let _ = writeln!(text, "- **{}** by {}", book.title, book.author);
        let _ =
            writeln!(text, "  ISBN: {}, Price: {}{stock_status}\n", book.isbn, money(book.price));
    }

    info!(event_name = "agent.operation.find_books", matches = books.len(), "catalog searched");
    Ok(HandlerOutput::succeeded(text))
}

async fn create_order(ctx: &OperationContext<'_>, request: &OrderRequest) -> Result<HandlerOutput> {
    let attempt = match OrderTransaction::new(ctx.store, ctx.retry_policy).place(request).await {
        Ok(attempt) => attempt,
        Err(OrderPlacementError::Rejected(rejection)) => {
            return Ok(HandlerOutput::failed(format!("Error: {rejection}")));
        }
        Err(other) => return Err(other.into()),
    };
    let placed = attempt.placed;

    let mut text = format!(
        "Order #{} created successfully for {}!\n\n**Order Details:**\nTotal Amount: {}\n\n**Items:**\n",
        placed.order.id,
        placed.customer_name,
        money(placed.order.total_amount)
    );
    for line in &placed.lines {
        let _ = writeln!(text, "- {} (ISBN: {})", line.title, line.isbn);
        let _ = writeln!(
            text,
            "  Quantity: {}, Price: {} each",
            line.quantity,
            money(line.unit_price)
        );
    }
    for line in &placed.lines {
        let _ = write!(
            text,
            "\nStock updated: '{}' now has {} copies in stock.",
            line.title, line.remaining_stock
        );
    }

    Ok(HandlerOutput::succeeded(text))
}

async fn restock_book(
    ctx: &OperationContext<'_>,
    isbn: &Isbn,
    quantity: i64,
) -> Result<HandlerOutput> {
    let change = match ctx.store.restock(isbn, quantity).await {
        Ok(Some(change)) => change,
        Ok(None) => {
            return Ok(HandlerOutput::failed(format!("Error: Book with ISBN {isbn} not found.")));
        }
        Err(overflow @ RepositoryError::StockOverflow { .. }) => {
            return Ok(HandlerOutput::failed(format!("Error: {overflow}")));
        }
        Err(error) => return Err(anyhow::Error::new(error).context("restocking book")),
    };

    info!(
        event_name = "agent.operation.restocked",
        isbn = %change.isbn,
        added = change.added,
        new_stock = change.new_stock,
        "book restocked"
    );
    Ok(HandlerOutput::succeeded(format!(
        "Successfully restocked '{}'!\n\nAdded {} copies to inventory.\nPrevious stock: {}\nNew stock: {}",
        change.title, change.added, change.previous_stock, change.new_stock
    )))
}

async fn update_price(
    ctx: &OperationContext<'_>,
    isbn: &Isbn,
    new_price: Decimal,
) -> Result<HandlerOutput> {
    let Some(change) =
        ctx.store.update_price(isbn, new_price).await.context("updating book price")?
    else {
        return Ok(HandlerOutput::failed(format!("Error: Book with ISBN {isbn} not found.")));
    };

    let delta = change.delta();
    let sign = if delta.is_sign_negative() && !delta.is_zero() { '-' } else { '+' };
    info!(
        event_name = "agent.operation.price_updated",
        isbn = %change.isbn,
        old_price = %change.old_price,
        new_price = %change.new_price,
        "book price updated"
    );
    Ok(HandlerOutput::succeeded(format!(
        "Price updated successfully for '{}'!\n\nOld price: {}\nNew price: {}\nPrice change: ${sign}{:.2}",
        change.title,
        money(change.old_price),
        money(change.new_price),
        delta.abs()
    )))
}

async fn order_status(ctx: &OperationContext<'_>, order_id: OrderId) -> Result<HandlerOutput> {
    let Some(details) = ctx.store.find_order(order_id).await.context("checking order status")?
    else {
        let hint = match ctx.store.max_order_id().await.context("reading highest order id")? {
            Some(max_id) => format!("The highest order ID in the system is {max_id}."),
            None => "There are no orders in the system yet.".to_string(),
        };
        return Ok(HandlerOutput::failed(format!(
            "Order #{order_id} not found. {hint} Please check the order number and try again."
        )));
    };

    if details.lines.is_empty() {
        return Ok(HandlerOutput::failed(format!(
            "Error: Order #{order_id} exists but has no items."
        )));
    }

    let order = &details.order;
    let mut text = format!("**Order #{} Status**\n\n", order.id);
    let _ = writeln!(text, "**Customer:** {} ({})", details.customer.name, details.customer.email);
    let _ = writeln!(text, "**Order Date:** {}", order.created_at.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(text, "**Status:** {}", order.status.as_str().to_uppercase());
    let _ = writeln!(text, "**Total Amount:** {}\n", money(order.total_amount));
    let _ = writeln!(text, "**Items ({}):**", details.lines.len());
    for line in &details.lines {
        let _ = writeln!(text, "- {} by {}", line.title, line.author);
        let _ = writeln!(
            text,
            "  ISBN: {}, Qty: {}, Price: {} each",
            line.isbn,
            line.quantity,
            money(line.unit_price)
        );
    }

    Ok(HandlerOutput::succeeded(text))
}

async fn inventory_summary(ctx: &OperationContext<'_>) -> Result<HandlerOutput> {
    let summary = ctx
        .store
        .inventory_summary(ctx.low_stock_threshold)
        .await
        .context("generating inventory summary")?;
    Ok(HandlerOutput::succeeded(render_inventory(&summary)))
}

fn render_inventory(summary: &InventorySummary) -> String {
    let mut text = String::from("**Inventory Summary**\n\n");
    let _ = writeln!(text, "**Total Books:** {} unique titles", summary.total_titles);
    let _ = writeln!(text, "**Total Copies:** {} in stock", summary.total_copies);
    let _ = writeln!(text, "**Total Inventory Value:** {}", money(summary.total_value));
    let _ = writeln!(text, "**Average Book Price:** {}\n", money(summary.average_price));

    if !summary.low_stock.is_empty() {
        let _ = writeln!(text, "**Low Stock Alert ({} books):**", summary.low_stock.len());
        for book in &summary.low_stock {
            let _ = writeln!(
                text,
                "- {} (ISBN: {}) - Only {} left!",
                book.title, book.isbn, book.stock
            );
        }
        text.push('\n');
    }

    if !summary.out_of_stock.is_empty() {
        let _ = writeln!(text, "**Out of Stock ({} books):**", summary.out_of_stock.len());
        for book in &summary.out_of_stock {
            let _ = writeln!(text, "- {} (ISBN: {})", book.title, book.isbn);
        }
        text.push('\n');
    }

    if summary.low_stock.is_empty() && summary.out_of_stock.is_empty() {
        text.push_str("All books have sufficient stock levels.");
    }
    text
}

async fn search_knowledge_base(ctx: &OperationContext<'_>, query: &str) -> Result<HandlerOutput> {
    let passages = ctx
        .knowledge
        .search(query, KNOWLEDGE_RESULT_LIMIT)
        .await
        .context("searching knowledge base")?;

    if passages.is_empty() {
        return Ok(HandlerOutput::succeeded(format!(
            "**Knowledge Base Search for: '{query}'**\n\n\
             The RAG system is currently being set up. When fully implemented, this tool will:\n\
             - Search through all uploaded PDF documents\n\
             - Retrieve relevant information about programming concepts, patterns, and best practices\n\
             - Provide detailed explanations from authoritative sources\n\n\
             For now, I can help you with library management tasks like finding books, creating orders, and checking inventory."
        )));
    }

    let mut text =
        format!("**Found {} relevant document(s) for: '{query}'**\n\n", passages.len());
    for (index, passage) in passages.iter().enumerate() {
        let page = passage.page.map(|page| page.to_string()).unwrap_or_else(|| "N/A".to_string());
        let _ = writeln!(text, "**Result {}** (Source: {}, Page: {page}):", index + 1, passage.source);
        let _ = writeln!(text, "{}\n", passage.content);
    }
    Ok(HandlerOutput::succeeded(text))
}

async fn list_customers(ctx: &OperationContext<'_>) -> Result<HandlerOutput> {
    let customers = ctx.store.list().await.context("listing customers")?;
    if customers.is_empty() {
        return Ok(HandlerOutput::succeeded("No customers found in the system."));
    }

    let mut text = String::from("**Customers List**\n\n");
    for customer in &customers {
        let _ = writeln!(text, "**{}** (ID: {})", customer.name, customer.id);
        let _ = writeln!(text, "Email: {}\n", customer.email);
    }
    Ok(HandlerOutput::succeeded(text))
}

fn money(amount: Decimal) -> String {
    format!("${:.2}", amount)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use shelfwise_core::domain::catalog::{BookFilter, CatalogItem, Isbn};
    use shelfwise_core::domain::customer::{Customer, CustomerId};
    use shelfwise_core::domain::order::{OrderId, OrderLineRequest, OrderRequest};
    use shelfwise_db::{InMemoryLibraryStore, LockRetryPolicy};

    use super::{money, run, OperationContext};
    use crate::knowledge::UnavailableKnowledgeBase;
    use crate::operations::Operation;

    fn store() -> InMemoryLibraryStore {
        InMemoryLibraryStore::new(
            vec![
                CatalogItem::new("X", "Book X", "Author X", Decimal::new(1000, 2), 5)
                    .expect("item"),
                CatalogItem::new("Y", "Book Y", "Author Y", Decimal::new(4999, 2), 0)
                    .expect("item"),
            ],
            vec![Customer {
                id: CustomerId(1),
                name: "Alice Johnson".to_string(),
                email: "alice.johnson@email.com".to_string(),
            }],
        )
    }

    fn context<'a>(store: &'a InMemoryLibraryStore) -> OperationContext<'a> {
        OperationContext {
            store,
            knowledge: &UnavailableKnowledgeBase,
            retry_policy: LockRetryPolicy::default(),
            low_stock_threshold: 5,
        }
    }

    #[tokio::test]
    async fn order_confirmation_lists_total_and_new_stock() {
        let store = store();
        let request = OrderRequest {
            customer_id: CustomerId(1),
            lines: vec![OrderLineRequest { isbn: Isbn("X".to_string()), quantity: 3 }],
        };

        let output = run(&Operation::CreateOrder(request), &context(&store)).await.expect("ran");

        assert!(output.success);
        assert!(output.message.starts_with("Order #1 created successfully for Alice Johnson!"));
        assert!(output.message.contains("Total Amount: $30.00"));
        assert!(output.message.contains("'Book X' now has 2 copies in stock."));
    }

    #[tokio::test]
    async fn insufficient_stock_is_a_failed_result_not_an_error() {
        let store = store();
        let request = OrderRequest {
            customer_id: CustomerId(1),
            lines: vec![OrderLineRequest { isbn: Isbn("X".to_string()), quantity: 6 }],
        };

        let output = run(&Operation::CreateOrder(request), &context(&store)).await.expect("ran");

        assert!(!output.success);
        assert!(output.message.contains("available 5, requested 6"), "{}", output.message);
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn overflowing_quantities_come_back_as_failed_results() {
        let store = store();
        let ctx = context(&store);

        let overflowing = Operation::RestockBook { isbn: Isbn("X".to_string()), quantity: i64::MAX };
        let restock = run(&overflowing, &ctx).await.expect("ran");
        assert!(!restock.success);
        assert!(restock.message.contains("would overflow its stock of 5"), "{}", restock.message);

        let doubled = OrderRequest {
            customer_id: CustomerId(1),
            lines: vec![
                OrderLineRequest { isbn: Isbn("X".to_string()), quantity: i64::MAX },
                OrderLineRequest { isbn: Isbn("X".to_string()), quantity: i64::MAX },
            ],
        };
        let order = run(&Operation::CreateOrder(doubled), &ctx).await.expect("ran");
        assert!(!order.success);
        assert!(order.message.contains("must be at most 1000000"), "{}", order.message);
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn missing_order_reports_the_highest_existing_id() {
        let store = store();
        let ctx = context(&store);

        let empty = run(&Operation::OrderStatus { order_id: OrderId(9) }, &ctx).await.expect("ran");
        assert!(empty.message.contains("There are no orders in the system yet."));

        let request = OrderRequest {
            customer_id: CustomerId(1),
            lines: vec![OrderLineRequest { isbn: Isbn("X".to_string()), quantity: 1 }],
        };
        run(&Operation::CreateOrder(request), &ctx).await.expect("order");

        let missing =
            run(&Operation::OrderStatus { order_id: OrderId(9) }, &ctx).await.expect("ran");
        assert!(!missing.success);
        assert!(missing.message.contains("The highest order ID in the system is 1."));

        let found = run(&Operation::OrderStatus { order_id: OrderId(1) }, &ctx).await.expect("ran");
        assert!(found.success);
        assert!(found.message.contains("**Status:** COMPLETED"));
        assert!(found.message.contains("ISBN: X, Qty: 1, Price: $10.00 each"));
    }

    #[tokio::test]
    async fn price_change_is_signed() {
        let store = store();
        let output = run(
            &Operation::UpdatePrice { isbn: Isbn("X".to_string()), new_price: Decimal::new(750, 2) },
            &context(&store),
        )
        .await
        .expect("ran");

        assert!(output.message.contains("Old price: $10.00"));
        assert!(output.message.contains("Price change: $-2.50"), "{}", output.message);
    }

    #[tokio::test]
    async fn search_hides_out_of_stock_titles_by_default() {
        let store = store();
        let ctx = context(&store);

        let in_stock = run(&Operation::FindBooks(BookFilter::default()), &ctx).await.expect("ran");
        assert!(in_stock.message.starts_with("Found 1 book(s):"));

        let all = BookFilter { in_stock: false, ..BookFilter::default() };
        let everything = run(&Operation::FindBooks(all), &ctx).await.expect("ran");
        assert!(everything.message.contains("Book Y** by Author Y"));
        assert!(everything.message.contains("(OUT OF STOCK)"));
    }

    #[tokio::test]
    async fn inventory_summary_flags_out_of_stock_titles() {
        let store = store();

        let output = run(&Operation::InventorySummary, &context(&store)).await.expect("ran");

        assert!(output.message.contains("**Total Books:** 2 unique titles"));
        assert!(output.message.contains("- Book Y (ISBN: Y) - Only 0 left!"));
        assert!(output.message.contains("**Out of Stock (1 books):**"));
    }

    #[tokio::test]
    async fn knowledge_search_without_an_index_explains_itself() {
        let store = store();
        let output = run(
            &Operation::SearchKnowledgeBase { query: "SOLID".to_string() },
            &context(&store),
        )
        .await
        .expect("ran");

        assert!(output.success);
        assert!(output.message.contains("Knowledge Base Search for: 'SOLID'"));
    }

    #[test]
    fn money_always_shows_cents() {
        assert_eq!(money(Decimal::new(5, 0)), "$5.00");
        assert_eq!(money(Decimal::new(14247, 2)), "$142.47");
    }
}
