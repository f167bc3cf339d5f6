//! Read-only lookups into entities owned by the surrounding CRUD layer.
use super::Pool;
use crate::error::BorrowResult;
use crate::model::Student;
use async_trait::async_trait;
use sqlx::Row;
use tracing::instrument;

#[async_trait]
pub trait BookLookup: Send + Sync {
    async fn exists_by_id(&self, book_id: i64) -> BorrowResult<bool>;
}

#[async_trait]
pub trait StudentLookup: Send + Sync {
    async fn exists_by_id(&self, student_id: i64) -> BorrowResult<bool>;

    async fn by_account_id(&self, account_id: i64) -> BorrowResult<Option<Student>>;
}

#[async_trait]
pub trait AccountLookup: Send + Sync {
    async fn exists_by_id(&self, account_id: i64) -> BorrowResult<bool>;
}

/// Lookups answered straight from the `books`, `students` and `accounts` tables.
#[derive(Debug, Clone)]
pub struct SqlCatalog {
    pool: Pool,
}

impl SqlCatalog {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn exists(&self, sql: &str, id: i64) -> BorrowResult<bool> {
        let found = sqlx::query_scalar::<_, i64>(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl BookLookup for SqlCatalog {
    #[instrument(skip(self))]
    async fn exists_by_id(&self, book_id: i64) -> BorrowResult<bool> {
        self.exists("SELECT 1 FROM books WHERE id = ?", book_id).await
    }
}

#[async_trait]
impl StudentLookup for SqlCatalog {
    #[instrument(skip(self))]
    async fn exists_by_id(&self, student_id: i64) -> BorrowResult<bool> {
        self.exists("SELECT 1 FROM students WHERE id = ?", student_id)
            .await
    }

    #[instrument(skip(self))]
    async fn by_account_id(&self, account_id: i64) -> BorrowResult<Option<Student>> {
        let row = sqlx::query("SELECT id, name, npm, account_id FROM students WHERE account_id = ?")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(Student {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            npm: row.try_get("npm")?,
            account_id: row.try_get("account_id")?,
        }))
    }
}

#[async_trait]
impl AccountLookup for SqlCatalog {
    #[instrument(skip(self))]
    async fn exists_by_id(&self, account_id: i64) -> BorrowResult<bool> {
        self.exists("SELECT 1 FROM accounts WHERE id = ?", account_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_catalog() -> SqlCatalog {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        sqlx::query("INSERT INTO accounts (id, email) VALUES (3, 'ana@example.com')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO students (id, name, npm, account_id) VALUES (7, 'Ana', '5001', 3)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO books (id, title) VALUES (101, 'Dune')")
            .execute(&pool)
            .await
            .unwrap();
        SqlCatalog::new(pool)
    }

    #[tokio::test]
    async fn existence_checks() {
        let catalog = setup_catalog().await;
        assert!(BookLookup::exists_by_id(&catalog, 101).await.unwrap());
        assert!(!BookLookup::exists_by_id(&catalog, 102).await.unwrap());
        assert!(StudentLookup::exists_by_id(&catalog, 7).await.unwrap());
        assert!(!StudentLookup::exists_by_id(&catalog, 8).await.unwrap());
        assert!(AccountLookup::exists_by_id(&catalog, 3).await.unwrap());
        assert!(!AccountLookup::exists_by_id(&catalog, 4).await.unwrap());
    }

    #[tokio::test]
    async fn student_by_account() {
        let catalog = setup_catalog().await;
        let student = catalog.by_account_id(3).await.unwrap().unwrap();
        assert_eq!(student.id, 7);
        assert_eq!(student.npm, "5001");
        assert!(catalog.by_account_id(99).await.unwrap().is_none());
    }
}
