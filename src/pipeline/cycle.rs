// src/pipeline/cycle.rs

//! One reconciliation cycle.
//!
//! ```text
//! Idle -> Collecting -> Filtering -> Delivering -> Committing -> Pruning -> Idle
//!                           │ (nothing new)                        ▲
//!                           └──────────────────────────────────────┘
//! ```
//!
//! Failed sources are logged and skipped. The cycle itself never fails:
//! errors end up in the [`CycleReport`] and pruning always runs.

use std::collections::HashSet;

use serde::Serialize;

use crate::delivery::{DeliveryEngine, DeliveryOutcome, DeliveryReport};
use crate::error::Result;
use crate::ledger::{Ledger, LedgerStats};
use crate::models::{CommitPolicy, Config, Item};
use crate::services::ListingSource;

/// Where the watcher currently is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Collecting,
    Filtering,
    Delivering,
    Committing,
    Pruning,
}

/// Counters for one cycle.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CycleReport {
    pub collected: usize,
    pub new_items: usize,
    pub sent: usize,
    pub degraded: usize,
    pub failed: usize,
    pub committed: usize,
    pub pruned: usize,
    pub sources_failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Select the items to record after a batch.
///
/// `Prefix` keeps the leading run of successes, so a failed item and
/// everything after it are offered again next cycle.
pub fn committable(reports: &[DeliveryReport], policy: CommitPolicy) -> Vec<Item> {
    match policy {
        CommitPolicy::Prefix => reports
            .iter()
            .take_while(|r| r.outcome.is_success())
            .map(|r| r.item.clone())
            .collect(),
        CommitPolicy::AllSuccessful => reports
            .iter()
            .filter(|r| r.outcome.is_success())
            .map(|r| r.item.clone())
            .collect(),
    }
}

/// Ties a listing source, the delivery engine and the ledger together.
pub struct Watcher {
    source: Box<dyn ListingSource>,
    engine: DeliveryEngine,
    ledger: Ledger,
    endpoints: Vec<String>,
    retention_days: u32,
    commit_policy: CommitPolicy,
    dry_run: bool,
    phase: CyclePhase,
}

impl Watcher {
    pub fn new(
        source: Box<dyn ListingSource>,
        engine: DeliveryEngine,
        ledger: Ledger,
        config: &Config,
        dry_run: bool,
    ) -> Self {
        Self {
            source,
            engine,
            ledger,
            endpoints: config.source.urls.clone(),
            retention_days: config.ledger.retention_days,
            commit_policy: config.ledger.commit_policy,
            dry_run,
            phase: CyclePhase::Idle,
        }
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub async fn test_connection(&self) -> bool {
        self.engine.test_connection().await
    }

    pub async fn stats(&self) -> LedgerStats {
        self.ledger.stats().await
    }

    fn enter(&mut self, phase: CyclePhase) {
        log::debug!("Cycle phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Run one full cycle and report what happened.
    pub async fn run_cycle(&mut self) -> CycleReport {
        log::info!(
            "Starting cycle over {} endpoints{}",
            self.endpoints.len(),
            if self.dry_run { " (dry run)" } else { "" }
        );
        let mut report = CycleReport::default();

        if let Err(e) = self.reconcile(&mut report).await {
            log::error!("Cycle failed: {}", e);
            report.error = Some(e.to_string());
        }

        self.enter(CyclePhase::Pruning);
        match self.ledger.prune(self.retention_days).await {
            Ok(pruned) => report.pruned = pruned,
            Err(e) => {
                log::error!("Prune failed: {}", e);
                report.error.get_or_insert_with(|| e.to_string());
            }
        }

        self.enter(CyclePhase::Idle);
        log::info!(
            "Cycle complete: {} collected, {} new, {} sent, {} degraded, {} failed, {} recorded",
            report.collected,
            report.new_items,
            report.sent,
            report.degraded,
            report.failed,
            report.committed
        );
        report
    }

    async fn reconcile(&mut self, report: &mut CycleReport) -> Result<()> {
        self.enter(CyclePhase::Collecting);
        let mut candidates = Vec::new();
        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            match self.source.scrape(endpoint).await {
                Ok(items) => {
                    for item in items {
                        // First occurrence wins.
                        if seen.insert(item.id().to_string()) {
                            candidates.push(item);
                        } else {
                            log::debug!("Dropping repeated item {} from {}", item.id(), endpoint);
                        }
                    }
                }
                Err(e) => {
                    log::error!("Skipping source {}: {}", endpoint, e);
                    report.sources_failed += 1;
                }
            }
        }
        report.collected = candidates.len();

        self.enter(CyclePhase::Filtering);
        let fresh = self.ledger.filter_unmarked(candidates);
        report.new_items = fresh.len();
        if fresh.is_empty() {
            log::info!("No new items");
            return Ok(());
        }

        self.enter(CyclePhase::Delivering);
        let reports = self.engine.deliver_batch(fresh, self.dry_run).await;
        for r in &reports {
            match r.outcome {
                DeliveryOutcome::Sent => report.sent += 1,
                DeliveryOutcome::SentDegraded => report.degraded += 1,
                DeliveryOutcome::Failed(_) => report.failed += 1,
            }
        }

        self.enter(CyclePhase::Committing);
        if self.dry_run {
            log::info!("Dry run: not recording {} items", reports.len());
            return Ok(());
        }
        let items = committable(&reports, self.commit_policy);
        if items.len() < report.sent + report.degraded {
            log::warn!(
                "Recording {} of {} delivered items; the rest follow a failure and will be retried",
                items.len(),
                report.sent + report.degraded
            );
        }
        self.ledger.mark_many(&items).await?;
        report.committed = items.len();
        Ok(())
    }
}
