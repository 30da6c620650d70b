//! Domain model, configuration and error taxonomy shared by every shelfwise crate.

pub mod config;
pub mod domain;
pub mod errors;

pub use chrono;
pub use rust_decimal;

pub use domain::catalog::{
    BookFilter, CatalogItem, InventorySummary, Isbn, PriceChange, StockChange,
};
pub use domain::customer::{Customer, CustomerId};
pub use domain::order::{
    Order, OrderDetailLine, OrderDetails, OrderId, OrderLine, OrderLineRequest, OrderRejection,
    OrderRequest, OrderStatus, PlacedLine, PlacedOrder,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
