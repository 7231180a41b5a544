//! PostgreSQL implementation of link repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;

use crate::domain::entities::{NewLink, ShortLink};
use crate::domain::repositories::LinkRepository;
use crate::error::AppError;

const LINK_COLUMNS: &str =
    "id, original_url, short_code, owner, clicks, created_at, expires_at, active";

/// PostgreSQL repository for link storage and retrieval.
///
/// Uses bound parameters for every value; `created_at` and `id` are assigned
/// by the database.
pub struct PgLinkRepository {
    pool: Arc<PgPool>,
}

impl PgLinkRepository {
    /// Creates a new repository with a database connection pool.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LinkRepository for PgLinkRepository {
    async fn create(&self, new_link: NewLink) -> Result<ShortLink, AppError> {
        let sql = format!(
            r#"
            INSERT INTO links (original_url, short_code, owner, expires_at, active)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {LINK_COLUMNS}
            "#
        );

        let link = sqlx::query_as::<_, ShortLink>(&sql)
            .bind(&new_link.original_url)
            .bind(&new_link.short_code)
            .bind(new_link.owner)
            .bind(new_link.expires_at)
            .bind(new_link.active)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(link)
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<ShortLink>, AppError> {
        let sql = format!("SELECT {LINK_COLUMNS} FROM links WHERE short_code = $1");

        let link = sqlx::query_as::<_, ShortLink>(&sql)
            .bind(code)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(link)
    }

    async fn increment_clicks(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE links SET clicks = clicks + 1 WHERE id = $1")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_active(&self, code: &str, active: bool) -> Result<Option<ShortLink>, AppError> {
        let sql = format!(
            "UPDATE links SET active = $2 WHERE short_code = $1 RETURNING {LINK_COLUMNS}"
        );

        let link = sqlx::query_as::<_, ShortLink>(&sql)
            .bind(code)
            .bind(active)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(link)
    }

    async fn set_expiry(
        &self,
        code: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<ShortLink>, AppError> {
        let sql = format!(
            "UPDATE links SET expires_at = $2 WHERE short_code = $1 RETURNING {LINK_COLUMNS}"
        );

        let link = sqlx::query_as::<_, ShortLink>(&sql)
            .bind(code)
            .bind(expires_at)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(link)
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }
}
