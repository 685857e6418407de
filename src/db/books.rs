//! Book repository.

use serde::Serialize;
use sqlx::SqlitePool;

use super::DbError;

/// A catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub published_year: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

type BookRow = (i64, String, String, Option<String>, Option<i64>, i64, i64);

fn row_to_book(row: BookRow) -> Book {
    Book {
        id: row.0,
        title: row.1,
        author: row.2,
        isbn: row.3,
        published_year: row.4,
        created_at: row.5,
        updated_at: row.6,
    }
}

/// Repository for book operations.
pub struct BookRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> BookRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// All books, id ascending.
    pub async fn list(&self) -> Result<Vec<Book>, DbError> {
        let rows = sqlx::query_as::<_, BookRow>(
            r#"
            SELECT id, title, author, isbn, published_year, created_at, updated_at
            FROM books
            ORDER BY id
            "#,
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_book).collect())
    }

    pub async fn find(&self, id: i64) -> Result<Option<Book>, DbError> {
        let row = sqlx::query_as::<_, BookRow>(
            r#"
            SELECT id, title, author, isbn, published_year, created_at, updated_at
            FROM books
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(row_to_book))
    }

    pub async fn create(
        &self,
        title: &str,
        author: &str,
        isbn: Option<&str>,
        published_year: Option<i64>,
    ) -> Result<Book, DbError> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO books (title, author, isbn, published_year, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(title)
        .bind(author)
        .bind(isbn)
        .bind(published_year)
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(Book {
            id: result.last_insert_rowid(),
            title: title.to_string(),
            author: author.to_string(),
            isbn: isbn.map(String::from),
            published_year,
            created_at: now,
            updated_at: now,
        })
    }

    /// Full replace. `None` when no such book exists.
    pub async fn update(
        &self,
        id: i64,
        title: &str,
        author: &str,
        isbn: Option<&str>,
        published_year: Option<i64>,
    ) -> Result<Option<Book>, DbError> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            UPDATE books
            SET title = ?, author = ?, isbn = ?, published_year = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(title)
        .bind(author)
        .bind(isbn)
        .bind(published_year)
        .bind(now)
        .bind(id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find(id).await
    }

    /// `true` when a row was deleted.
    pub async fn delete(&self, id: i64) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM books WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    #[tokio::test]
    async fn create_then_find_roundtrips() {
        let db = Database::new(":memory:").await.unwrap();
        let created = db
            .books()
            .create("Neuromancer", "William Gibson", Some("0-441-56956-0"), Some(1984))
            .await
            .unwrap();
        assert!(created.id > 0);

        let found = db.books().find(created.id).await.unwrap().unwrap();
        assert_eq!(found, created);
        assert_eq!(found.title, "Neuromancer");
        assert_eq!(found.published_year, Some(1984));
    }

    #[tokio::test]
    async fn list_is_ordered_by_id() {
        let db = Database::new(":memory:").await.unwrap();
        db.books().create("First", "A", None, None).await.unwrap();
        db.books().create("Second", "B", None, None).await.unwrap();
        db.books().create("Third", "C", None, None).await.unwrap();

        let all = db.books().list().await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|pair| pair[0].id < pair[1].id));
        assert_eq!(all[0].title, "First");
    }

    #[tokio::test]
    async fn update_replaces_fields_and_bumps_updated_at() {
        let db = Database::new(":memory:").await.unwrap();
        let created = db
            .books()
            .create("Draft", "Unknown", None, None)
            .await
            .unwrap();

        let updated = db
            .books()
            .update(created.id, "Final", "Known", Some("isbn-1"), Some(2001))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "Final");
        assert_eq!(updated.isbn.as_deref(), Some("isbn-1"));
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn missing_ids_yield_none_or_false() {
        let db = Database::new(":memory:").await.unwrap();
        assert!(db.books().find(999).await.unwrap().is_none());
        assert!(db.books().update(999, "X", "Y", None, None).await.unwrap().is_none());
        assert!(!db.books().delete(999).await.unwrap());
    }

    #[tokio::test]
    async fn delete_removes_the_row() {
        let db = Database::new(":memory:").await.unwrap();
        let created = db.books().create("Gone", "Soon", None, None).await.unwrap();
        assert!(db.books().delete(created.id).await.unwrap());
        assert!(db.books().find(created.id).await.unwrap().is_none());
    }
}
