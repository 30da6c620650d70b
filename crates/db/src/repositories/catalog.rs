use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use shelfwise_core::domain::catalog::{
    BookFilter, CatalogItem, InventorySummary, Isbn, PriceChange, StockChange,
};

use super::{parse_decimal, CatalogRepository, RepositoryError, SqlLibraryStore};

const ITEM_COLUMNS: &str = "isbn, title, author, price, stock";

#[async_trait::async_trait]
impl CatalogRepository for SqlLibraryStore {
    async fn find_by_isbn(&self, isbn: &Isbn) -> Result<Option<CatalogItem>, RepositoryError> {
        let mut conn = self.pool().acquire().await?;
        fetch_item(&mut conn, isbn).await
    }

    async fn search(&self, filter: &BookFilter) -> Result<Vec<CatalogItem>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS}
             FROM catalog_item
             WHERE (?1 IS NULL OR instr(lower(title), lower(?1)) > 0)
               AND (?2 IS NULL OR instr(lower(author), lower(?2)) > 0)
               AND (?3 = 0 OR stock > 0)
             ORDER BY title ASC"
        ))
        .bind(filter.title.as_deref())
        .bind(filter.author.as_deref())
        .bind(filter.in_stock)
        .fetch_all(self.pool())
        .await?;

        // Prices are stored as decimal text, so the price bound is applied here.
        let items = rows.iter().map(item_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(items.into_iter().filter(|item| filter.matches(item)).collect())
    }

    async fn list_titles(&self) -> Result<Vec<(Isbn, String)>, RepositoryError> {
        let rows = sqlx::query("SELECT isbn, title FROM catalog_item ORDER BY title ASC")
            .fetch_all(self.pool())
            .await?;

        rows.iter()
            .map(|row| Ok((Isbn(row.try_get("isbn")?), row.try_get("title")?)))
            .collect()
    }

    async fn restock(
        &self,
        isbn: &Isbn,
        quantity: i64,
    ) -> Result<Option<StockChange>, RepositoryError> {
        let mut tx = self.pool().begin_with("BEGIN IMMEDIATE").await?;

        let Some(item) = fetch_item(&mut tx, isbn).await? else {
            return Ok(None);
        };
        let overflow =
            || RepositoryError::StockOverflow { isbn: isbn.clone(), stock: item.stock, quantity };
        let new_stock = item.stock.checked_add(quantity).ok_or_else(overflow)?;

        // An overflowing sum would be stored as REAL; the bound keeps the column integral.
        let updated = sqlx::query(
            "UPDATE catalog_item SET stock = stock + ?1 WHERE isbn = ?2 AND stock <= ?3 - ?1",
        )
        .bind(quantity)
        .bind(isbn.as_str())
        .bind(i64::MAX)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() != 1 {
            return Err(overflow());
        }

        tx.commit().await?;

        Ok(Some(StockChange {
            isbn: item.isbn,
            title: item.title,
            added: quantity,
            previous_stock: item.stock,
            new_stock,
        }))
    }

    async fn update_price(
        &self,
        isbn: &Isbn,
        new_price: Decimal,
    ) -> Result<Option<PriceChange>, RepositoryError> {
        let mut tx = self.pool().begin().await?;

        let Some(item) = fetch_item(&mut tx, isbn).await? else {
            return Ok(None);
        };

        sqlx::query("UPDATE catalog_item SET price = ? WHERE isbn = ?")
            .bind(new_price.to_string())
            .bind(isbn.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(PriceChange {
            isbn: item.isbn,
            title: item.title,
            old_price: item.price,
            new_price,
        }))
    }

    async fn inventory_summary(
        &self,
        low_stock_threshold: i64,
    ) -> Result<InventorySummary, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM catalog_item"))
            .fetch_all(self.pool())
            .await?;
        let items = rows.iter().map(item_from_row).collect::<Result<Vec<_>, _>>()?;

        Ok(InventorySummary::from_items(&items, low_stock_threshold))
    }
}

pub(crate) async fn fetch_item(
    conn: &mut SqliteConnection,
    isbn: &Isbn,
) -> Result<Option<CatalogItem>, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM catalog_item WHERE isbn = ?"))
        .bind(isbn.as_str())
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(item_from_row).transpose()
}

pub(crate) fn item_from_row(row: &SqliteRow) -> Result<CatalogItem, RepositoryError> {
    let price_raw = row.try_get::<String, _>("price")?;
    Ok(CatalogItem {
        isbn: Isbn(row.try_get("isbn")?),
        title: row.try_get("title")?,
        author: row.try_get("author")?,
        price: parse_decimal("price", &price_raw)?,
        stock: row.try_get("stock")?,
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use shelfwise_core::domain::catalog::{BookFilter, Isbn};

    use crate::repositories::{CatalogRepository, RepositoryError, SqlLibraryStore};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        sqlx::query(
            "INSERT INTO catalog_item (isbn, title, author, price, stock) VALUES
                ('111', 'Clean Code', 'Robert C. Martin', '47.49', 3),
                ('222', 'Accelerate', 'Nicole Forsgren', '39.95', 0),
                ('333', 'Release It!', 'Michael Nygard', '41.00', 9)",
        )
        .execute(&pool)
        .await
        .expect("insert catalog");
        pool
    }

    #[tokio::test]
    async fn search_filters_by_author_price_and_stock() {
        let store = SqlLibraryStore::new(setup_pool().await);

        let by_author = store
            .search(&BookFilter { author: Some("MARTIN".to_string()), ..BookFilter::default() })
            .await
            .expect("search");
        assert_eq!(by_author.len(), 1);
        assert_eq!(by_author[0].price, Decimal::new(4749, 2));

        let cheap = store
            .search(&BookFilter {
                max_price: Some(Decimal::new(4500, 2)),
                in_stock: false,
                ..BookFilter::default()
            })
            .await
            .expect("search");
        let titles = cheap.iter().map(|item| item.title.as_str()).collect::<Vec<_>>();
        assert_eq!(titles, vec!["Accelerate", "Release It!"]);

        let in_stock = store.search(&BookFilter::default()).await.expect("search");
        assert!(in_stock.iter().all(|item| item.stock > 0));
        assert_eq!(in_stock.len(), 2);
    }

    #[tokio::test]
    async fn restock_and_price_update_report_previous_values() {
        let store = SqlLibraryStore::new(setup_pool().await);
        let isbn = Isbn("222".to_string());

        let change = store.restock(&isbn, 4).await.expect("restock").expect("known isbn");
        assert_eq!((change.previous_stock, change.new_stock), (0, 4));

        let price = store
            .update_price(&isbn, Decimal::new(3500, 2))
            .await
            .expect("update price")
            .expect("known isbn");
        assert_eq!(price.old_price, Decimal::new(3995, 2));
        assert_eq!(price.delta(), Decimal::new(-495, 2));

        let stored = store.find_by_isbn(&isbn).await.expect("find").expect("present");
        assert_eq!(stored.stock, 4);
        assert_eq!(stored.price, Decimal::new(3500, 2));
    }

    #[tokio::test]
    async fn overflowing_restock_is_refused_and_stock_stays_integral() {
        let pool = setup_pool().await;
        let store = SqlLibraryStore::new(pool.clone());
        let isbn = Isbn("111".to_string());

        let error = store.restock(&isbn, i64::MAX).await.expect_err("overflow");
        assert!(matches!(error, RepositoryError::StockOverflow { stock: 3, .. }));

        let stock_type: String =
            sqlx::query_scalar("SELECT typeof(stock) FROM catalog_item WHERE isbn = '111'")
                .fetch_one(&pool)
                .await
                .expect("typeof");
        assert_eq!(stock_type, "integer");
        let stored = store.find_by_isbn(&isbn).await.expect("find").expect("present");
        assert_eq!(stored.stock, 3);
    }

    #[tokio::test]
    async fn unknown_isbn_is_reported_as_none() {
        let store = SqlLibraryStore::new(setup_pool().await);
        let missing = Isbn("999".to_string());

        assert!(store.restock(&missing, 1).await.expect("restock").is_none());
        assert!(store.update_price(&missing, Decimal::ONE).await.expect("price").is_none());
    }

    #[tokio::test]
    async fn inventory_summary_lists_low_and_out_of_stock_items() {
        let store = SqlLibraryStore::new(setup_pool().await);

        let summary = store.inventory_summary(5).await.expect("summary");

        assert_eq!(summary.total_titles, 3);
        assert_eq!(summary.total_copies, 12);
        let low = summary.low_stock.iter().map(|item| item.isbn.0.as_str()).collect::<Vec<_>>();
        assert_eq!(low, vec!["222", "111"]);
        assert_eq!(summary.out_of_stock.len(), 1);
    }
}
