use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use shelfwise_core::domain::catalog::{
    BookFilter, CatalogItem, InventorySummary, Isbn, PriceChange, StockChange,
};
use shelfwise_core::domain::customer::{Customer, CustomerId};
use shelfwise_core::domain::order::{
    OrderDetails, OrderId, OrderRejection, OrderRequest, PlacedOrder,
};

pub mod catalog;
pub mod customer;
pub mod memory;
pub mod order;

pub use memory::InMemoryLibraryStore;

/// Substrings SQLite uses when a write could not take its lock.
pub const LOCK_INDICATORS: &[&str] =
    &["database is locked", "database is busy", "database table is locked"];

pub fn is_lock_message(text: &str) -> bool {
    let lowered = text.to_ascii_lowercase();
    LOCK_INDICATORS.iter().any(|indicator| lowered.contains(indicator))
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("database is busy: {0}")]
    Busy(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("restocking ISBN {isbn} by {quantity} would overflow its stock of {stock}")]
    StockOverflow { isbn: Isbn, stock: i64, quantity: i64 },
}

impl RepositoryError {
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(error: sqlx::Error) -> Self {
        if is_busy_error(&error) {
            Self::Busy(error.to_string())
        } else {
            Self::Database(error)
        }
    }
}

/// `SQLITE_BUSY` (5) and `SQLITE_LOCKED` (6), including their extended variants,
/// plus pool exhaustion.
fn is_busy_error(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(database_error) => {
            let busy_code = database_error
                .code()
                .and_then(|code| code.parse::<i64>().ok())
                .map(|code| matches!(code & 0xff, 5 | 6))
                .unwrap_or(false);
            busy_code || is_lock_message(database_error.message())
        }
        _ => false,
    }
}

#[derive(Debug, Error)]
pub enum OrderPlacementError {
    #[error(transparent)]
    Rejected(#[from] OrderRejection),
    #[error("system busy, retry later: {0}")]
    Busy(String),
    #[error("order transaction inconsistency: {0}")]
    Inconsistent(String),
    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for OrderPlacementError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Busy(reason) => Self::Busy(reason),
            other => Self::Repository(other),
        }
    }
}

impl From<sqlx::Error> for OrderPlacementError {
    fn from(error: sqlx::Error) -> Self {
        RepositoryError::from(error).into()
    }
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn find_by_isbn(&self, isbn: &Isbn) -> Result<Option<CatalogItem>, RepositoryError>;

    /// Matches ordered by title.
    async fn search(&self, filter: &BookFilter) -> Result<Vec<CatalogItem>, RepositoryError>;

    /// `(isbn, title)` for every catalog item, ordered by title.
    async fn list_titles(&self) -> Result<Vec<(Isbn, String)>, RepositoryError>;

    async fn restock(
        &self,
        isbn: &Isbn,
        quantity: i64,
    ) -> Result<Option<StockChange>, RepositoryError>;

    async fn update_price(
        &self,
        isbn: &Isbn,
        new_price: Decimal,
    ) -> Result<Option<PriceChange>, RepositoryError>;

    async fn inventory_summary(
        &self,
        low_stock_threshold: i64,
    ) -> Result<InventorySummary, RepositoryError>;
}

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn find_by_id(&self, id: CustomerId) -> Result<Option<Customer>, RepositoryError>;
    async fn list(&self) -> Result<Vec<Customer>, RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_order(&self, id: OrderId) -> Result<Option<OrderDetails>, RepositoryError>;

    async fn max_order_id(&self) -> Result<Option<OrderId>, RepositoryError>;

    /// One all-or-nothing placement attempt. Lock contention is reported as
    /// [`OrderPlacementError::Busy`] and left to the caller to retry.
    async fn place_order_once(
        &self,
        request: &OrderRequest,
    ) -> Result<PlacedOrder, OrderPlacementError>;
}

pub trait LibraryStore: CatalogRepository + CustomerRepository + OrderRepository {}

impl<T> LibraryStore for T where T: CatalogRepository + CustomerRepository + OrderRepository {}

/// SQLite-backed store. The trait impls live in the sibling modules.
#[derive(Clone)]
pub struct SqlLibraryStore {
    pool: crate::DbPool,
}

impl SqlLibraryStore {
    pub fn new(pool: crate::DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &crate::DbPool {
        &self.pool
    }
}

pub(crate) fn parse_decimal(column: &str, value: &str) -> Result<Decimal, RepositoryError> {
    value.trim().parse::<Decimal>().map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}
