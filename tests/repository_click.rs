//! PostgreSQL click ledger tests. Run with a database:
//! `DATABASE_URL=postgres://... cargo test -- --ignored`

use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use shortlink_relay::domain::entities::{ClickOutcome, DeadLetter, NewClick, NewLink};
use shortlink_relay::domain::repositories::{ClickRepository, LinkRepository};
use shortlink_relay::error::AppError;
use shortlink_relay::infrastructure::persistence::{PgClickRepository, PgLinkRepository};

fn click(event_id: &str, link_id: i64) -> NewClick {
    NewClick {
        event_id: event_id.to_string(),
        link_id,
        client_ip: Some("203.0.113.5".to_string()),
        user_agent: Some("test-agent".to_string()),
        referer: None,
        occurred_at: Utc::now(),
    }
}

async fn seed(pool: &Arc<PgPool>, code: &str) -> i64 {
    PgLinkRepository::new(pool.clone())
        .create(NewLink::new("https://example.com", code))
        .await
        .unwrap()
        .id
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_apply_click_is_idempotent(pool: PgPool) {
    let pool = Arc::new(pool);
    let link_id = seed(&pool, "clk123").await;
    let repo = PgClickRepository::new(pool.clone());

    assert_eq!(
        repo.apply_click(click("evt-1", link_id)).await.unwrap(),
        ClickOutcome::Applied
    );
    assert_eq!(
        repo.apply_click(click("evt-1", link_id)).await.unwrap(),
        ClickOutcome::Duplicate
    );
    assert_eq!(
        repo.apply_click(click("evt-2", link_id)).await.unwrap(),
        ClickOutcome::Applied
    );

    let clicks: i64 = sqlx::query_scalar("SELECT clicks FROM links WHERE id = $1")
        .bind(link_id)
        .fetch_one(&*pool)
        .await
        .unwrap();
    assert_eq!(clicks, 2);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM link_clicks WHERE link_id = $1")
        .bind(link_id)
        .fetch_one(&*pool)
        .await
        .unwrap();
    assert_eq!(rows, 2);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_apply_click_unknown_link(pool: PgPool) {
    let repo = PgClickRepository::new(Arc::new(pool));

    let err = repo.apply_click(click("evt-x", 424242)).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_dead_letters_and_summary(pool: PgPool) {
    let pool = Arc::new(pool);
    let link_id = seed(&pool, "sum123").await;
    let repo = PgClickRepository::new(pool);

    repo.apply_click(click("evt-1", link_id)).await.unwrap();
    for id in ["1-0", "2-0"] {
        repo.record_dead_letter(DeadLetter {
            source: "clicks:0".to_string(),
            message_id: id.to_string(),
            payload: "{}".to_string(),
            reason: "malformed payload".to_string(),
            attempts: 1,
        })
        .await
        .unwrap();
    }

    let recent = repo.list_dead_letters(1).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].message_id, "2-0");

    let summary = repo.ledger_summary().await.unwrap();
    assert_eq!(summary.links, 1);
    assert_eq!(summary.total_clicks, 1);
    assert_eq!(summary.ledger_rows, 1);
    assert_eq!(summary.dead_letters, 2);
}
