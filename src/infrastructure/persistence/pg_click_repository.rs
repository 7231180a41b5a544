//! PostgreSQL implementation of the click ledger.

use async_trait::async_trait;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::debug;

use crate::domain::entities::{ClickOutcome, DeadLetter, LedgerSummary, NewClick};
use crate::domain::repositories::ClickRepository;
use crate::error::AppError;

/// PostgreSQL click ledger.
///
/// The ledger row and the counter increment share one transaction, and the
/// unique `event_id` column turns a redelivered event into a no-op.
pub struct PgClickRepository {
    pool: Arc<PgPool>,
}

impl PgClickRepository {
    /// Creates a new repository with a database connection pool.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

fn link_missing(link_id: i64) -> AppError {
    AppError::not_found("Link not found", json!({ "link_id": link_id }))
}

#[async_trait]
impl ClickRepository for PgClickRepository {
    async fn apply_click(&self, click: NewClick) -> Result<ClickOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO link_clicks (event_id, link_id, client_ip, user_agent, referer, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&click.event_id)
        .bind(click.link_id)
        .bind(&click.client_ip)
        .bind(&click.user_agent)
        .bind(&click.referer)
        .bind(click.occurred_at)
        .execute(&mut *tx)
        .await;

        let inserted = match inserted {
            Ok(result) => result.rows_affected(),
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                return Err(link_missing(click.link_id));
            }
            Err(e) => return Err(e.into()),
        };

        if inserted == 0 {
            tx.rollback().await?;
            debug!(event_id = %click.event_id, "Click already in ledger");
            return Ok(ClickOutcome::Duplicate);
        }

        let updated = sqlx::query("UPDATE links SET clicks = clicks + 1 WHERE id = $1")
            .bind(click.link_id)
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(link_missing(click.link_id));
        }

        tx.commit().await?;
        Ok(ClickOutcome::Applied)
    }

    async fn record_dead_letter(&self, dead_letter: DeadLetter) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO click_dead_letters (source, message_id, payload, reason, attempts)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&dead_letter.source)
        .bind(&dead_letter.message_id)
        .bind(&dead_letter.payload)
        .bind(&dead_letter.reason)
        .bind(dead_letter.attempts)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn list_dead_letters(&self, limit: i64) -> Result<Vec<DeadLetter>, AppError> {
        let rows = sqlx::query_as::<_, DeadLetter>(
            r#"
            SELECT source, message_id, payload, reason, attempts
            FROM click_dead_letters
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit.max(0))
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows)
    }

    async fn ledger_summary(&self) -> Result<LedgerSummary, AppError> {
        let (links, total_clicks, ledger_rows, dead_letters): (i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM links),
                    (SELECT COALESCE(SUM(clicks), 0)::BIGINT FROM links),
                    (SELECT COUNT(*) FROM link_clicks),
                    (SELECT COUNT(*) FROM click_dead_letters)
                "#,
            )
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(LedgerSummary {
            links,
            total_clicks,
            ledger_rows,
            dead_letters,
        })
    }
}
