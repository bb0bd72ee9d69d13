use crate::models::CleanedLink;
use crate::record::CleanedUrls;
use anyhow::{Context, Result};
use sqlx::{any::AnyPoolOptions, Any, Pool};
use tracing::debug;

/// Durable home of the cleaned-URL record. Written by the host after each
/// message; read back only to seed the in-memory record at startup.
#[derive(Clone)]
pub struct Db {
    pub pool: Pool<Any>,
}

impl Db {
    pub async fn new(database_url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .with_context(|| format!("Failed to open database {}", database_url))?;

        let db = Self { pool };
        db.init().await?;
        Ok(db)
    }

    /// Private in-memory SQLite database, for tests.
    pub async fn open_memory() -> Result<Self> {
        sqlx::any::install_default_drivers();

        // Every SQLite memory connection is its own database, so pin one.
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.init().await?;
        Ok(db)
    }

    async fn init(&self) -> Result<()> {
        let is_sqlite = self.pool.connect_options().database_url.scheme() == "sqlite";

        let create_cleaned_urls = if is_sqlite {
            "CREATE TABLE IF NOT EXISTS cleaned_urls (
                original_url TEXT PRIMARY KEY,
                cleaned_url TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )"
        } else {
            "CREATE TABLE IF NOT EXISTS cleaned_urls (
                original_url TEXT PRIMARY KEY,
                cleaned_url TEXT NOT NULL,
                updated_at BIGINT NOT NULL
            )"
        };

        sqlx::query(create_cleaned_urls)
            .execute(&self.pool)
            .await
            .context("Failed to create cleaned_urls table")?;
        Ok(())
    }

    pub async fn upsert_cleaned_url(&self, original: &str, cleaned: &str) -> Result<()> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)?
            .as_secs() as i64;

        sqlx::query(
            "INSERT INTO cleaned_urls (original_url, cleaned_url, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(original_url) DO UPDATE SET cleaned_url = excluded.cleaned_url, updated_at = excluded.updated_at"
        )
        .bind(original)
        .bind(cleaned)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_cleaned_urls(&self, entries: &[(String, String)]) -> Result<()> {
        for (original, cleaned) in entries {
            self.upsert_cleaned_url(original, cleaned).await?;
        }
        debug!(count = entries.len(), "Persisted cleaned URLs");
        Ok(())
    }

    /// Seeds the in-memory record. A fresh database yields an empty one.
    pub async fn load_cleaned_urls(&self) -> Result<CleanedUrls> {
        let rows = sqlx::query_as::<_, CleanedLink>(
            "SELECT original_url, cleaned_url, updated_at FROM cleaned_urls",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(CleanedUrls::from_entries(
            rows.into_iter().map(|r| (r.original_url, r.cleaned_url)),
        ))
    }

    pub async fn get_cleaned_url(&self, original: &str) -> Result<Option<CleanedLink>> {
        let link = sqlx::query_as::<_, CleanedLink>(
            "SELECT original_url, cleaned_url, updated_at FROM cleaned_urls WHERE original_url = ?",
        )
        .bind(original)
        .fetch_optional(&self.pool)
        .await?;
        Ok(link)
    }

    pub async fn count(&self) -> Result<i64> {
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cleaned_urls")
            .fetch_one(&self.pool)
            .await?;
        Ok(total.0)
    }
}
