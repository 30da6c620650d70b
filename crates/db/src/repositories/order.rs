use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};
use tracing::{error, info};

use shelfwise_core::domain::catalog::{CatalogItem, Isbn};
use shelfwise_core::domain::customer::CustomerId;
use shelfwise_core::domain::order::{
    Order, OrderDetailLine, OrderDetails, OrderId, OrderLine, OrderLineRequest, OrderRejection,
    OrderRequest, OrderStatus, PlacedLine, PlacedOrder,
};

use super::catalog::fetch_item;
use super::customer::fetch_customer;
use super::{parse_decimal, OrderPlacementError, OrderRepository, RepositoryError, SqlLibraryStore};

#[async_trait::async_trait]
impl OrderRepository for SqlLibraryStore {
    async fn find_order(&self, id: OrderId) -> Result<Option<OrderDetails>, RepositoryError> {
        let mut conn = self.pool().acquire().await?;

        let Some(order) = load_order(&mut conn, id).await? else {
            return Ok(None);
        };
        let customer = fetch_customer(&mut conn, order.customer_id).await?.ok_or_else(|| {
            RepositoryError::Decode(format!(
                "order {} references missing customer {}",
                order.id, order.customer_id
            ))
        })?;

        let rows = sqlx::query(
            "SELECT ol.isbn, ci.title, ci.author, ol.quantity, ol.unit_price
             FROM order_line ol
             JOIN catalog_item ci ON ci.isbn = ol.isbn
             WHERE ol.order_id = ?
             ORDER BY ol.id ASC",
        )
        .bind(id.0)
        .fetch_all(&mut *conn)
        .await?;
        let lines = rows.iter().map(detail_line_from_row).collect::<Result<Vec<_>, _>>()?;

        Ok(Some(OrderDetails { order, customer, lines }))
    }

    async fn max_order_id(&self) -> Result<Option<OrderId>, RepositoryError> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM customer_order")
            .fetch_one(self.pool())
            .await?;
        Ok(max.map(OrderId))
    }

    async fn place_order_once(
        &self,
        request: &OrderRequest,
    ) -> Result<PlacedOrder, OrderPlacementError> {
        // Write lock up front: a concurrent order waits here instead of failing at commit.
        let mut tx = self.pool().begin_with("BEGIN IMMEDIATE").await?;

        let customer = fetch_customer(&mut tx, request.customer_id)
            .await?
            .ok_or(OrderRejection::CustomerNotFound(request.customer_id))?;

        request.check_shape()?;
        let requested = request.aggregated_lines()?;
        let mut priced: Vec<(OrderLineRequest, CatalogItem)> = Vec::with_capacity(requested.len());
        for line in requested {
            let item = fetch_item(&mut tx, &line.isbn)
                .await?
                .ok_or_else(|| OrderRejection::ItemNotFound(line.isbn.clone()))?;
            if line.quantity > item.stock {
                return Err(OrderRejection::InsufficientStock {
                    isbn: item.isbn,
                    title: item.title,
                    available: item.stock,
                    requested: line.quantity,
                }
                .into());
            }
            priced.push((line, item));
        }

        let total_amount: Decimal =
            priced.iter().map(|(line, item)| item.price * Decimal::from(line.quantity)).sum();

        let order_id = sqlx::query(
            "INSERT INTO customer_order (customer_id, status, total_amount, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(customer.id.0)
        .bind(OrderStatus::Completed.as_str())
        .bind(total_amount.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        let order_id = OrderId(order_id);

        let mut placed_lines = Vec::with_capacity(priced.len());
        for (line, item) in priced {
            sqlx::query(
                "INSERT INTO order_line (order_id, isbn, quantity, unit_price) VALUES (?, ?, ?, ?)",
            )
            .bind(order_id.0)
            .bind(line.isbn.as_str())
            .bind(line.quantity)
            .bind(item.price.to_string())
            .execute(&mut *tx)
            .await?;

            let decremented = sqlx::query(
                "UPDATE catalog_item SET stock = stock - ? WHERE isbn = ? AND stock >= ?",
            )
            .bind(line.quantity)
            .bind(line.isbn.as_str())
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;
            if decremented.rows_affected() != 1 {
                tx.rollback().await?;
                error!(
                    event_name = "db.order.stock_moved",
                    isbn = %line.isbn,
                    "stock changed underneath the order transaction"
                );
                return Err(OrderPlacementError::Inconsistent(format!(
                    "stock for ISBN {} changed during the order transaction",
                    line.isbn
                )));
            }

            placed_lines.push(PlacedLine {
                isbn: item.isbn,
                title: item.title,
                quantity: line.quantity,
                unit_price: item.price,
                remaining_stock: item.stock - line.quantity,
            });
        }

        let confirmed = load_order(&mut tx, order_id).await?;
        let order = match confirmed {
            Some(order) if order.lines.len() == placed_lines.len() => order,
            _ => {
                tx.rollback().await?;
                error!(
                    event_name = "db.order.confirmation_missing",
                    order_id = order_id.0,
                    "order could not be re-read after insert"
                );
                return Err(OrderPlacementError::Inconsistent(format!(
                    "order {order_id} was not found after insert"
                )));
            }
        };

        tx.commit().await?;

        info!(
            event_name = "db.order.placed",
            order_id = order.id.0,
            customer_id = customer.id.0,
            line_count = order.lines.len(),
            total_amount = %order.total_amount,
            "order placed"
        );

        Ok(PlacedOrder { order, customer_name: customer.name, lines: placed_lines })
    }
}

async fn load_order(
    conn: &mut SqliteConnection,
    id: OrderId,
) -> Result<Option<Order>, RepositoryError> {
    let Some(row) = sqlx::query(
        "SELECT id, customer_id, status, total_amount, created_at FROM customer_order WHERE id = ?",
    )
    .bind(id.0)
    .fetch_optional(&mut *conn)
    .await?
    else {
        return Ok(None);
    };

    let line_rows = sqlx::query(
        "SELECT order_id, isbn, quantity, unit_price
         FROM order_line
         WHERE order_id = ?
         ORDER BY id ASC",
    )
    .bind(id.0)
    .fetch_all(&mut *conn)
    .await?;
    let lines = line_rows.iter().map(line_from_row).collect::<Result<Vec<_>, _>>()?;

    order_from_row(&row, lines).map(Some)
}

fn order_from_row(row: &SqliteRow, lines: Vec<OrderLine>) -> Result<Order, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = status_raw
        .parse::<OrderStatus>()
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;
    let total_raw = row.try_get::<String, _>("total_amount")?;

    Ok(Order {
        id: OrderId(row.try_get("id")?),
        customer_id: CustomerId(row.try_get("customer_id")?),
        status,
        total_amount: parse_decimal("total_amount", &total_raw)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        lines,
    })
}

fn line_from_row(row: &SqliteRow) -> Result<OrderLine, RepositoryError> {
    let unit_price_raw = row.try_get::<String, _>("unit_price")?;
    Ok(OrderLine {
        order_id: OrderId(row.try_get("order_id")?),
        isbn: Isbn(row.try_get("isbn")?),
        quantity: row.try_get("quantity")?,
        unit_price: parse_decimal("unit_price", &unit_price_raw)?,
    })
}

fn detail_line_from_row(row: &SqliteRow) -> Result<OrderDetailLine, RepositoryError> {
    let unit_price_raw = row.try_get::<String, _>("unit_price")?;
    Ok(OrderDetailLine {
        isbn: Isbn(row.try_get("isbn")?),
        title: row.try_get("title")?,
        author: row.try_get("author")?,
        quantity: row.try_get("quantity")?,
        unit_price: parse_decimal("unit_price", &unit_price_raw)?,
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
