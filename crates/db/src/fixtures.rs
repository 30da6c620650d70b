use serde::Serialize;
use tracing::info;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// `(isbn, expected stock after the historical orders)`.
const SEED_BOOKS: &[(&str, i64)] = &[
    ("9780134685991", 22),
    ("9780201633610", 17),
    ("9780135957059", 29),
    ("9780321125217", 11),
    ("9780134757599", 22),
    ("9780134494166", 15),
    ("9780136554828", 8),
    ("9780132350884", 20),
    ("9780321942067", 14),
    ("9780137054899", 28),
];

const SEED_CUSTOMER_EMAILS: &[&str] = &[
    "alice.johnson@email.com",
    "bob.smith@email.com",
    "carol.davis@email.com",
    "david.wilson@email.com",
    "eva.brown@email.com",
    "frank.miller@email.com",
];

/// `(order id, customer id, line count)`.
const SEED_ORDERS: &[(i64, i64, i64)] = &[(1, 1, 1), (2, 2, 1), (3, 3, 1), (4, 4, 1)];

/// Demo catalog: ten software titles, six customers and four historical orders.
pub struct SeedDataset;

impl SeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/seed_data.sql");

    /// Loads the dataset unless the catalog already holds data.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let existing: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM catalog_item").fetch_one(pool).await?;
        if existing > 0 {
            info!(event_name = "db.seed.skipped", existing_items = existing, "catalog already seeded");
            return Ok(SeedResult { skipped: true, ..SeedResult::expected() });
        }

        let mut tx = pool.begin().await?;
        sqlx::raw_sql(Self::SQL).execute(&mut *tx).await?;
        tx.commit().await?;

        info!(event_name = "db.seed.loaded", "seed dataset loaded");
        Ok(SeedResult::expected())
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for &(isbn, stock) in SEED_BOOKS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM catalog_item WHERE isbn = ?1 AND stock = ?2)",
            )
            .bind(isbn)
            .bind(stock)
            .fetch_one(pool)
            .await?;
            checks.push((format!("book {isbn}"), present == 1));
        }

        for &email in SEED_CUSTOMER_EMAILS {
            let present: i64 =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM customer WHERE email = ?1)")
                    .bind(email)
                    .fetch_one(pool)
                    .await?;
            checks.push((format!("customer {email}"), present == 1));
        }

        for &(order_id, customer_id, line_count) in SEED_ORDERS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM customer_order WHERE id = ?1 AND customer_id = ?2)",
            )
            .bind(order_id)
            .bind(customer_id)
            .fetch_one(pool)
            .await?;
            checks.push((format!("order {order_id}"), present == 1));

            let lines: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM order_line WHERE order_id = ?1")
                    .bind(order_id)
                    .fetch_one(pool)
                    .await?;
            checks.push((format!("order {order_id} lines"), lines == line_count));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes every row the dataset owns, orders first.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM order_line").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM customer_order").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM customer").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM catalog_item").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeedResult {
    pub skipped: bool,
    pub books: usize,
    pub customers: usize,
    pub orders: usize,
}

impl SeedResult {
    fn expected() -> Self {
        Self {
            skipped: false,
            books: SEED_BOOKS.len(),
            customers: SEED_CUSTOMER_EMAILS.len(),
            orders: SEED_ORDERS.len(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(String, bool)>,
}

impl VerificationResult {
    pub fn failed_checks(&self) -> Vec<&str> {
        self.checks.iter().filter(|(_, ok)| !ok).map(|(label, _)| label.as_str()).collect()
    }
}
