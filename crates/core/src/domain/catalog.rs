use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Upper bound for a single restock or order-line quantity.
pub const MAX_QUANTITY: i64 = 1_000_000;

/// ISBN-like catalog key. Stored verbatim; no checksum validation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Isbn(pub String);

impl Isbn {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Isbn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub isbn: Isbn,
    pub title: String,
    pub author: String,
    pub price: Decimal,
    pub stock: i64,
}

impl CatalogItem {
    pub fn new(
        isbn: impl Into<String>,
        title: impl Into<String>,
        author: impl Into<String>,
        price: Decimal,
        stock: i64,
    ) -> Result<Self, DomainError> {
        if price.is_sign_negative() && !price.is_zero() {
            return Err(DomainError::InvariantViolation(format!(
                "catalog price must not be negative (got {price})"
            )));
        }
        if stock < 0 {
            return Err(DomainError::InvariantViolation(format!(
                "catalog stock must not be negative (got {stock})"
            )));
        }

        Ok(Self { isbn: Isbn(isbn.into()), title: title.into(), author: author.into(), price, stock })
    }

    pub fn in_stock(&self) -> bool {
        self.stock > 0
    }

    pub fn stock_value(&self) -> Decimal {
        self.price * Decimal::from(self.stock)
    }
}

/// Filter for catalog searches. Text fields match case-insensitive substrings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookFilter {
    pub title: Option<String>,
    pub author: Option<String>,
    pub max_price: Option<Decimal>,
    pub in_stock: bool,
}

impl Default for BookFilter {
    fn default() -> Self {
        Self { title: None, author: None, max_price: None, in_stock: true }
    }
}

impl BookFilter {
    pub fn matches(&self, item: &CatalogItem) -> bool {
        let contains = |haystack: &str, needle: &Option<String>| match needle {
            Some(needle) => haystack.to_lowercase().contains(&needle.to_lowercase()),
            None => true,
        };

        contains(&item.title, &self.title)
            && contains(&item.author, &self.author)
            && self.max_price.map(|max| item.price <= max).unwrap_or(true)
            && (!self.in_stock || item.in_stock())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub isbn: Isbn,
    pub title: String,
    pub added: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceChange {
    pub isbn: Isbn,
    pub title: String,
    pub old_price: Decimal,
    pub new_price: Decimal,
}

impl PriceChange {
    pub fn delta(&self) -> Decimal {
        self.new_price - self.old_price
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySummary {
    pub total_titles: i64,
    pub total_copies: i64,
    pub total_value: Decimal,
    pub average_price: Decimal,
    pub low_stock: Vec<CatalogItem>,
    pub out_of_stock: Vec<CatalogItem>,
}

impl InventorySummary {
    /// Aggregates a full catalog snapshot. Low stock is `stock < threshold`, ascending.
    pub fn from_items(items: &[CatalogItem], low_stock_threshold: i64) -> Self {
        let total_titles = items.len() as i64;
        let total_copies = items.iter().map(|item| item.stock).sum();
        let total_value = items.iter().map(CatalogItem::stock_value).sum();
        let average_price = if items.is_empty() {
            Decimal::ZERO
        } else {
            (items.iter().map(|item| item.price).sum::<Decimal>() / Decimal::from(total_titles))
                .round_dp(2)
        };

        let mut low_stock = items
            .iter()
            .filter(|item| item.stock < low_stock_threshold)
            .cloned()
            .collect::<Vec<_>>();
        low_stock.sort_by(|a, b| a.stock.cmp(&b.stock).then_with(|| a.title.cmp(&b.title)));

        let mut out_of_stock =
            items.iter().filter(|item| item.stock == 0).cloned().collect::<Vec<_>>();
        out_of_stock.sort_by(|a, b| a.title.cmp(&b.title));

        Self { total_titles, total_copies, total_value, average_price, low_stock, out_of_stock }
    }
}
