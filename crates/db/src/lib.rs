pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;
pub mod transaction;

pub use connection::{connect, connect_from_config, connect_with_settings, DbPool};
pub use fixtures::{SeedDataset, SeedResult, VerificationResult};
pub use repositories::{
    CatalogRepository, CustomerRepository, InMemoryLibraryStore, LibraryStore,
    OrderPlacementError, OrderRepository, RepositoryError, SqlLibraryStore,
};
pub use transaction::{LockRetryPolicy, OrderAttempt, OrderTransaction};
