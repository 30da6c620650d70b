use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use super::{run_pending, MIGRATOR};
    use crate::{connect_with_settings, DbPool};

    const TABLES: &[&str] = &["catalog_item", "customer", "customer_order", "order_line"];

    async fn migrated_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");
        pool
    }

    async fn schema_objects(pool: &DbPool) -> Vec<String> {
        sqlx::query_scalar(
            "SELECT type || ':' || name FROM sqlite_master
             WHERE name NOT LIKE 'sqlite_%' AND name != '_sqlx_migrations'
             ORDER BY name",
        )
        .fetch_all(pool)
        .await
        .expect("read sqlite_master")
    }

    #[tokio::test]
    async fn baseline_creates_tables_and_lookup_indexes() {
        let pool = migrated_pool().await;
        let objects = schema_objects(&pool).await;

        for table in TABLES {
            assert!(objects.contains(&format!("table:{table}")), "missing table {table}");
        }
        assert!(objects.contains(&"index:idx_order_line_order_id".to_string()));
        assert!(objects.contains(&"index:idx_customer_order_customer_id".to_string()));
    }

    #[tokio::test]
    async fn negative_stock_and_unknown_status_are_rejected() {
        let pool = migrated_pool().await;

        let negative_stock = sqlx::query(
            "INSERT INTO catalog_item (isbn, title, author, price, stock) VALUES ('X', 'T', 'A', '1.00', -1)",
        )
        .execute(&pool)
        .await;
        sqlx::query("INSERT INTO customer (name, email) VALUES ('Ann', 'ann@example.com')")
            .execute(&pool)
            .await
            .expect("customer insert");
        let bad_status = sqlx::query(
            "INSERT INTO customer_order (customer_id, status, total_amount) VALUES (1, 'shipped', '0.00')",
        )
        .execute(&pool)
        .await;

        assert!(negative_stock.is_err());
        assert!(bad_status.is_err());
    }

    #[tokio::test]
    async fn rerunning_is_a_no_op_and_undo_removes_everything() {
        let pool = migrated_pool().await;
        let before = schema_objects(&pool).await;

        run_pending(&pool).await.expect("second run");
        assert_eq!(schema_objects(&pool).await, before);

        MIGRATOR.undo(&pool, 0).await.expect("undo");
        assert!(schema_objects(&pool).await.is_empty());

        run_pending(&pool).await.expect("reapply");
        assert_eq!(schema_objects(&pool).await, before);
    }
}
