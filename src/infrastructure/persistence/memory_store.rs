//! In-process link store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::json;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::domain::entities::{
    ClickOutcome, DeadLetter, LedgerSummary, NewClick, NewLink, ShortLink,
};
use crate::domain::repositories::{ClickRepository, LinkRepository};
use crate::error::AppError;

/// Link store and click ledger held in memory.
///
/// Implements both [`LinkRepository`] and [`ClickRepository`] with the same
/// guarantees as the PostgreSQL repositories: unique short codes, atomic
/// counter increments and one ledger row per `event_id`. Nothing survives
/// a restart.
#[derive(Default)]
pub struct InMemoryLinkStore {
    links: DashMap<String, ShortLink>,
    codes_by_id: DashMap<i64, String>,
    ledger: DashMap<String, NewClick>,
    dead_letters: Mutex<Vec<DeadLetter>>,
    next_id: AtomicI64,
}

impl InMemoryLinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger rows recorded for a link.
    pub fn ledger_rows_for(&self, link_id: i64) -> usize {
        self.ledger
            .iter()
            .filter(|row| row.value().link_id == link_id)
            .count()
    }

    fn update<F>(&self, code: &str, apply: F) -> Option<ShortLink>
    where
        F: FnOnce(&mut ShortLink),
    {
        self.links.get_mut(code).map(|mut link| {
            apply(link.value_mut());
            link.value().clone()
        })
    }

    fn bump(&self, id: i64) -> bool {
        let Some(code) = self.codes_by_id.get(&id).map(|c| c.value().clone()) else {
            return false;
        };
        self.update(&code, |link| link.clicks += 1).is_some()
    }

    fn dead_letters(&self) -> std::sync::MutexGuard<'_, Vec<DeadLetter>> {
        self.dead_letters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LinkRepository for InMemoryLinkStore {
    async fn create(&self, new_link: NewLink) -> Result<ShortLink, AppError> {
        match self.links.entry(new_link.short_code.clone()) {
            Entry::Occupied(_) => Err(AppError::conflict(
                "Unique constraint violation",
                json!({ "constraint": "links_short_code_key" }),
            )),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                let link = ShortLink {
                    id,
                    original_url: new_link.original_url,
                    short_code: new_link.short_code,
                    owner: new_link.owner,
                    clicks: 0,
                    created_at: Utc::now(),
                    expires_at: new_link.expires_at,
                    active: new_link.active,
                };
                self.codes_by_id.insert(id, link.short_code.clone());
                slot.insert(link.clone());
                Ok(link)
            }
        }
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<ShortLink>, AppError> {
        Ok(self.links.get(code).map(|link| link.value().clone()))
    }

    async fn increment_clicks(&self, id: i64) -> Result<bool, AppError> {
        Ok(self.bump(id))
    }

    async fn set_active(&self, code: &str, active: bool) -> Result<Option<ShortLink>, AppError> {
        Ok(self.update(code, |link| link.active = active))
    }

    async fn set_expiry(
        &self,
        code: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<ShortLink>, AppError> {
        Ok(self.update(code, |link| link.expires_at = expires_at))
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[async_trait]
impl ClickRepository for InMemoryLinkStore {
    async fn apply_click(&self, click: NewClick) -> Result<ClickOutcome, AppError> {
        // The ledger slot stays locked until the counter moved, so a
        // concurrent duplicate cannot slip in between.
        match self.ledger.entry(click.event_id.clone()) {
            Entry::Occupied(_) => Ok(ClickOutcome::Duplicate),
            Entry::Vacant(slot) => {
                if !self.bump(click.link_id) {
                    return Err(AppError::not_found(
                        "Link not found",
                        json!({ "link_id": click.link_id }),
                    ));
                }
                slot.insert(click);
                Ok(ClickOutcome::Applied)
            }
        }
    }

    async fn record_dead_letter(&self, dead_letter: DeadLetter) -> Result<(), AppError> {
        self.dead_letters().push(dead_letter);
        Ok(())
    }

    async fn list_dead_letters(&self, limit: i64) -> Result<Vec<DeadLetter>, AppError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self.dead_letters().iter().rev().take(limit).cloned().collect())
    }

    async fn ledger_summary(&self) -> Result<LedgerSummary, AppError> {
        Ok(LedgerSummary {
            links: self.links.len() as i64,
            total_clicks: self.links.iter().map(|l| l.clicks).sum(),
            ledger_rows: self.ledger.len() as i64,
            dead_letters: self.dead_letters().len() as i64,
        })
    }
}
