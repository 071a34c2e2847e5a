// src/ledger/mod.rs

//! Persistent dedup ledger.
//!
//! Records which item ids have already been notified, with the time each was
//! recorded. The whole state is one JSON document:
//!
//! ```json
//! {
//!   "sent_ads": { "445772": "2026-10-19T08:30:00.000000Z" },
//!   "last_updated": "2026-10-19T08:30:00.000000Z"
//! }
//! ```
//!
//! Every persist rewrites the full document through the backing store, which
//! replaces it atomically. Loading never fails: a missing or unreadable
//! document starts an empty ledger.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::Item;
use crate::storage::LedgerStore;

/// On-disk shape of the ledger. Unknown keys are ignored.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LedgerState {
    #[serde(default)]
    pub sent_ads: BTreeMap<String, String>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

/// Ledger summary for logs and the `stats` command.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LedgerStats {
    pub total_marked: usize,
    pub marked_last_24h: usize,
    pub location: String,
    pub backing_store_exists: bool,
}

/// Set of already-notified item ids backed by a [`LedgerStore`].
pub struct Ledger {
    store: Box<dyn LedgerStore>,
    entries: HashMap<String, String>,
}

impl Ledger {
    /// Load the ledger from its store, starting empty on any read or parse
    /// failure.
    pub async fn load(store: Box<dyn LedgerStore>) -> Self {
        let entries = match store.read().await {
            Ok(Some(bytes)) => match serde_json::from_slice::<LedgerState>(&bytes) {
                Ok(state) => {
                    log::info!(
                        "Loaded {} marked items from {}",
                        state.sent_ads.len(),
                        store.location()
                    );
                    state.sent_ads.into_iter().collect()
                }
                Err(e) => {
                    log::warn!(
                        "Ledger at {} is unreadable ({}), starting empty",
                        store.location(),
                        e
                    );
                    HashMap::new()
                }
            },
            Ok(None) => {
                log::warn!("No ledger at {}, starting empty", store.location());
                HashMap::new()
            }
            Err(e) => {
                log::warn!(
                    "Failed to read ledger at {} ({}), starting empty",
                    store.location(),
                    e
                );
                HashMap::new()
            }
        };

        Self { store, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_marked(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Keep the items whose ids are not yet recorded, preserving order.
    pub fn filter_unmarked(&self, items: Vec<Item>) -> Vec<Item> {
        let total = items.len();
        let fresh: Vec<Item> = items
            .into_iter()
            .filter(|item| !self.is_marked(item.id()))
            .collect();
        log::info!("Filtered {} items -> {} new", total, fresh.len());
        fresh
    }

    /// Record the items as notified now and persist once.
    pub async fn mark_many(&mut self, items: &[Item]) -> Result<()> {
        self.mark_many_at(items, Utc::now()).await
    }

    /// Record the items with the given timestamp and persist once.
    ///
    /// Ids already present get their timestamp refreshed. The in-memory set
    /// keeps the marks even when the persist fails.
    pub async fn mark_many_at(&mut self, items: &[Item], now: DateTime<Utc>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        let stamp = format_timestamp(now);
        for item in items {
            self.entries.insert(item.id().to_string(), stamp.clone());
        }
        log::info!("Marked {} items as sent", items.len());
        self.persist_at(now).await
    }

    /// Drop records older than the retention window.
    pub async fn prune(&mut self, retention_days: u32) -> Result<usize> {
        self.prune_at(retention_days, Utc::now()).await
    }

    /// Drop records whose timestamp is not after `now - retention_days`.
    ///
    /// Records with unparsable timestamps are kept. Persists only when
    /// something was removed.
    pub async fn prune_at(&mut self, retention_days: u32, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now - Duration::days(i64::from(retention_days));
        let before = self.entries.len();

        self.entries
            .retain(|_, stamp| parse_timestamp(stamp).is_none_or(|ts| ts > cutoff));

        let removed = before - self.entries.len();
        if removed > 0 {
            log::info!(
                "Pruned {} records older than {} days",
                removed,
                retention_days
            );
            self.persist_at(now).await?;
        }
        Ok(removed)
    }

    pub async fn stats(&self) -> LedgerStats {
        self.stats_at(Utc::now()).await
    }

    /// Summarize the ledger relative to `now`.
    pub async fn stats_at(&self, now: DateTime<Utc>) -> LedgerStats {
        let day_ago = now - Duration::hours(24);
        let marked_last_24h = self
            .entries
            .values()
            .filter_map(|stamp| parse_timestamp(stamp))
            .filter(|ts| *ts > day_ago)
            .count();

        LedgerStats {
            total_marked: self.entries.len(),
            marked_last_24h,
            location: self.store.location(),
            backing_store_exists: self.store.exists().await,
        }
    }

    /// Forget every record and remove the backing document.
    pub async fn reset(&mut self) -> Result<()> {
        self.entries.clear();
        self.store
            .delete()
            .await
            .map_err(|e| AppError::persistence(format!("{}: {}", self.store.location(), e)))?;
        log::info!("Ledger reset: {}", self.store.location());
        Ok(())
    }

    async fn persist_at(&self, now: DateTime<Utc>) -> Result<()> {
        let state = LedgerState {
            sent_ads: self
                .entries
                .iter()
                .map(|(id, stamp)| (id.clone(), stamp.clone()))
                .collect(),
            last_updated: Some(format_timestamp(now)),
        };
        let bytes = serde_json::to_vec_pretty(&state)?;

        self.store.write(&bytes).await.map_err(|e| {
            log::error!("Failed to persist ledger to {}: {}", self.store.location(), e);
            AppError::persistence(format!("{}: {}", self.store.location(), e))
        })
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 timestamp, or a naive ISO-8601 one read as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    raw.parse::<NaiveDateTime>().ok().map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;
    use crate::storage::LocalStore;
    use crate::test_utils::{MemoryStore, item};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, h, m, 0).unwrap()
    }

    fn document(entries: &[(&str, &str)]) -> Vec<u8> {
        let sent_ads: BTreeMap<String, String> = entries
            .iter()
            .map(|(id, ts)| (id.to_string(), ts.to_string()))
            .collect();
        serde_json::to_vec(&serde_json::json!({ "sent_ads": sent_ads })).unwrap()
    }

    #[tokio::test]
    async fn test_missing_document_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::new(tmp.path().join("sent_ads.json"));
        let ledger = Ledger::load(Box::new(store.clone())).await;

        assert!(ledger.is_empty());
        assert!(!store.exists().await);
    }

    #[tokio::test]
    async fn test_corrupt_document_starts_empty() {
        let ledger = Ledger::load(Box::new(MemoryStore::with_document(b"{not json"))).await;
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_keys_are_ignored() {
        let store = MemoryStore::with_document(
            br#"{"sent_ads": {"1": "2026-10-19T08:00:00"}, "version": 3, "owner": "bot"}"#,
        );
        let ledger = Ledger::load(Box::new(store)).await;
        assert!(ledger.is_marked("1"));
    }

    #[tokio::test]
    async fn test_filter_preserves_order() {
        let store = MemoryStore::with_document(&document(&[("2", "2026-10-19T08:00:00Z")]));
        let ledger = Ledger::load(Box::new(store)).await;

        let fresh = ledger.filter_unmarked(vec![item("3"), item("2"), item("1")]);
        let ids: Vec<&str> = fresh.iter().map(Item::id).collect();
        assert_eq!(ids, vec!["3", "1"]);
    }

    #[tokio::test]
    async fn test_marking_is_idempotent() {
        let store = MemoryStore::new();
        let mut ledger = Ledger::load(Box::new(store.clone())).await;

        ledger.mark_many_at(&[item("7")], at(8, 0)).await.unwrap();
        ledger.mark_many_at(&[item("7")], at(9, 0)).await.unwrap();

        assert_eq!(ledger.len(), 1);
        assert!(ledger.is_marked("7"));

        let saved: LedgerState = serde_json::from_slice(&store.document().unwrap()).unwrap();
        assert_eq!(saved.sent_ads.len(), 1);
        assert_eq!(saved.sent_ads["7"], format_timestamp(at(9, 0)));
    }

    #[tokio::test]
    async fn test_mark_many_persists_once() {
        let store = MemoryStore::new();
        let mut ledger = Ledger::load(Box::new(store.clone())).await;

        ledger
            .mark_many_at(&[item("1"), item("2"), item("3")], at(8, 0))
            .await
            .unwrap();
        ledger.mark_many_at(&[], at(8, 1)).await.unwrap();

        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_persisted_document_shape() {
        let store = MemoryStore::new();
        let mut ledger = Ledger::load(Box::new(store.clone())).await;
        ledger.mark_many_at(&[item("42")], at(8, 30)).await.unwrap();

        let value: serde_json::Value = serde_json::from_slice(&store.document().unwrap()).unwrap();
        assert_eq!(value["sent_ads"]["42"], "2026-10-19T08:30:00.000000Z");
        assert_eq!(value["last_updated"], "2026-10-19T08:30:00.000000Z");
    }

    #[tokio::test]
    async fn test_failed_persist_keeps_marks_in_memory() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let mut ledger = Ledger::load(Box::new(store.clone())).await;

        let err = ledger.mark_many_at(&[item("5")], at(8, 0)).await.unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
        assert!(ledger.is_marked("5"));
        assert!(store.document().is_none());
    }

    #[tokio::test]
    async fn test_interrupted_write_leaves_previous_state() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::new(tmp.path().join("sent_ads.json"));

        let mut ledger = Ledger::load(Box::new(store.clone())).await;
        ledger.mark_many_at(&[item("A")], at(8, 0)).await.unwrap();

        // Killed after writing part of the next document, before the rename.
        std::fs::write(store.temp_path(), br#"{"sent_ads": {"A": "2026-10-19T08:00:00Z", "B"#)
            .unwrap();

        let reloaded = Ledger::load(Box::new(store.clone())).await;
        assert!(reloaded.is_marked("A"));
        assert!(!reloaded.is_marked("B"));
        assert_eq!(reloaded.len(), 1);
    }

    #[tokio::test]
    async fn test_reload_round_trips_through_disk() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::new(tmp.path().join("sent_ads.json"));

        let mut ledger = Ledger::load(Box::new(store.clone())).await;
        ledger
            .mark_many_at(&[item("A"), item("B")], at(8, 0))
            .await
            .unwrap();

        let reloaded = Ledger::load(Box::new(store)).await;
        assert!(reloaded.is_marked("A"));
        assert!(reloaded.is_marked("B"));
    }

    #[tokio::test]
    async fn test_prune_keeps_malformed_timestamps() {
        let store = MemoryStore::with_document(&document(&[
            ("old", "2026-10-01T08:00:00Z"),
            ("garbled", "yesterday-ish"),
            ("fresh", "2026-10-18T08:00:00Z"),
        ]));
        let mut ledger = Ledger::load(Box::new(store)).await;

        let removed = ledger.prune_at(7, at(8, 0)).await.unwrap();

        assert_eq!(removed, 1);
        assert!(!ledger.is_marked("old"));
        assert!(ledger.is_marked("garbled"));
        assert!(ledger.is_marked("fresh"));
    }

    #[tokio::test]
    async fn test_prune_cutoff_is_exclusive() {
        let now = at(8, 0);
        let cutoff = now - Duration::days(7);
        let store = MemoryStore::with_document(&document(&[
            ("past_cutoff", &format_timestamp(cutoff - Duration::seconds(1))),
            ("on_cutoff", &format_timestamp(cutoff)),
            ("just_after", &format_timestamp(cutoff + Duration::seconds(1))),
            ("six_days", &format_timestamp(now - Duration::days(6))),
        ]));
        let mut ledger = Ledger::load(Box::new(store)).await;

        assert_eq!(ledger.prune_at(7, now).await.unwrap(), 2);
        assert!(!ledger.is_marked("past_cutoff"));
        assert!(!ledger.is_marked("on_cutoff"));
        assert!(ledger.is_marked("just_after"));
        assert!(ledger.is_marked("six_days"));
    }

    #[tokio::test]
    async fn test_prune_reads_naive_timestamps_as_utc() {
        let store = MemoryStore::with_document(&document(&[
            ("naive_old", "2026-10-10T07:59:59.123456"),
            ("naive_new", "2026-10-18T12:00:00"),
        ]));
        let mut ledger = Ledger::load(Box::new(store)).await;

        assert_eq!(ledger.prune_at(7, at(8, 0)).await.unwrap(), 1);
        assert!(ledger.is_marked("naive_new"));
    }

    #[tokio::test]
    async fn test_prune_without_removals_does_not_write() {
        let store = MemoryStore::with_document(&document(&[("1", "2026-10-18T08:00:00Z")]));
        let mut ledger = Ledger::load(Box::new(store.clone())).await;

        assert_eq!(ledger.prune_at(7, at(8, 0)).await.unwrap(), 0);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_stats_count_last_day() {
        let store = MemoryStore::with_document(&document(&[
            ("a", "2026-10-19T07:00:00Z"),
            ("b", "2026-10-18T09:00:00Z"),
            ("c", "2026-10-17T09:00:00Z"),
            ("d", "not a date"),
        ]));
        let ledger = Ledger::load(Box::new(store)).await;

        let stats = ledger.stats_at(at(8, 0)).await;
        assert_eq!(stats.total_marked, 4);
        assert_eq!(stats.marked_last_24h, 2);
        assert_eq!(stats.location, "memory://ledger");
        assert!(stats.backing_store_exists);
    }

    #[tokio::test]
    async fn test_reset_removes_document() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::new(tmp.path().join("sent_ads.json"));
        let mut ledger = Ledger::load(Box::new(store.clone())).await;
        ledger.mark_many_at(&[item("1")], at(8, 0)).await.unwrap();

        ledger.reset().await.unwrap();

        assert!(ledger.is_empty());
        assert!(!store.exists().await);
        assert!(Ledger::load(Box::new(store)).await.is_empty());
    }
}
