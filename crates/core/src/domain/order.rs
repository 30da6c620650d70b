use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::catalog::{Isbn, MAX_QUANTITY};
use crate::domain::customer::{Customer, CustomerId};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub i64);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(DomainError::InvariantViolation(format!("unknown order status `{other}`"))),
        }
    }
}

/// Unit price is captured when the order is placed and never follows later catalog changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub order_id: OrderId,
    pub isbn: Isbn,
    pub quantity: i64,
    pub unit_price: Decimal,
}

impl OrderLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<OrderLine>,
}

impl Order {
    pub fn computed_total(&self) -> Decimal {
        self.lines.iter().map(OrderLine::line_total).sum()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub isbn: Isbn,
    pub quantity: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub customer_id: CustomerId,
    pub lines: Vec<OrderLineRequest>,
}

impl OrderRequest {
    /// Checks that need no storage access: at least one line, every quantity
    /// between 1 and [`MAX_QUANTITY`].
    pub fn check_shape(&self) -> Result<(), OrderRejection> {
        if self.lines.is_empty() {
            return Err(OrderRejection::EmptyOrder);
        }
        for line in &self.lines {
            if line.quantity <= 0 {
                return Err(OrderRejection::InvalidQuantity {
                    isbn: line.isbn.clone(),
                    quantity: line.quantity,
                });
            }
            if line.quantity > MAX_QUANTITY {
                return Err(OrderRejection::QuantityTooLarge {
                    isbn: line.isbn.clone(),
                    quantity: line.quantity,
                });
            }
        }
        Ok(())
    }

    /// Merges repeated ISBNs so the stock check sees the combined quantity.
    /// First-seen order is kept. A merged quantity above [`MAX_QUANTITY`] is rejected.
    pub fn aggregated_lines(&self) -> Result<Vec<OrderLineRequest>, OrderRejection> {
        let mut merged: Vec<OrderLineRequest> = Vec::with_capacity(self.lines.len());
        for line in &self.lines {
            match merged.iter_mut().find(|existing| existing.isbn == line.isbn) {
                Some(existing) => {
                    let total = existing.quantity.saturating_add(line.quantity);
                    if total > MAX_QUANTITY {
                        return Err(OrderRejection::QuantityTooLarge {
                            isbn: line.isbn.clone(),
                            quantity: total,
                        });
                    }
                    existing.quantity = total;
                }
                None => merged.push(line.clone()),
            }
        }
        Ok(merged)
    }
}

/// Validation failures of an order placement. Nothing is persisted when one is returned.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderRejection {
    #[error("customer not found: customer with ID {0} does not exist")]
    CustomerNotFound(CustomerId),
    #[error("item not found: no book with ISBN {0}")]
    ItemNotFound(Isbn),
    #[error("invalid quantity for ISBN {isbn}: {quantity} (must be greater than zero)")]
    InvalidQuantity { isbn: Isbn, quantity: i64 },
    #[error("invalid quantity for ISBN {isbn}: {quantity} (must be at most 1000000)")]
    QuantityTooLarge { isbn: Isbn, quantity: i64 },
    #[error(
        "insufficient stock for '{title}' (ISBN {isbn}): available {available}, requested {requested}"
    )]
    InsufficientStock { isbn: Isbn, title: String, available: i64, requested: i64 },
    #[error("invalid order: at least one item is required")]
    EmptyOrder,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedLine {
    pub isbn: Isbn,
    pub title: String,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub remaining_stock: i64,
}

/// Confirmation of a committed order, re-read from storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub order: Order,
    pub customer_name: String,
    pub lines: Vec<PlacedLine>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetailLine {
    pub isbn: Isbn,
    pub title: String,
    pub author: String,
    pub quantity: i64,
    pub unit_price: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order: Order,
    pub customer: Customer,
    pub lines: Vec<OrderDetailLine>,
}
