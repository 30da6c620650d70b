use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use shelfwise_core::domain::customer::{Customer, CustomerId};

use super::{CustomerRepository, RepositoryError, SqlLibraryStore};

#[async_trait::async_trait]
impl CustomerRepository for SqlLibraryStore {
    async fn find_by_id(&self, id: CustomerId) -> Result<Option<Customer>, RepositoryError> {
        let mut conn = self.pool().acquire().await?;
        fetch_customer(&mut conn, id).await
    }

    async fn list(&self) -> Result<Vec<Customer>, RepositoryError> {
        let rows = sqlx::query("SELECT id, name, email FROM customer ORDER BY id ASC")
            .fetch_all(self.pool())
            .await?;

        rows.iter().map(customer_from_row).collect()
    }
}

pub(crate) async fn fetch_customer(
    conn: &mut SqliteConnection,
    id: CustomerId,
) -> Result<Option<Customer>, RepositoryError> {
    let row = sqlx::query("SELECT id, name, email FROM customer WHERE id = ?")
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(customer_from_row).transpose()
}

fn customer_from_row(row: &SqliteRow) -> Result<Customer, RepositoryError> {
    Ok(Customer {
        id: CustomerId(row.try_get("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
    })
}
