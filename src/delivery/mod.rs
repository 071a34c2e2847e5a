// src/delivery/mod.rs

//! Paced, retrying delivery of items to a notifier channel.
//!
//! ## Guarantees
//!
//! - Consecutive channel calls are at least `min_interval` apart, retries
//!   and the plain fallback included
//! - Each item ends in exactly one [`DeliveryOutcome`]
//! - Dry runs render and log every item without calling the channel

pub mod retry;

use std::time::Duration;

use serde::Serialize;
use tokio::time::{Instant, sleep, sleep_until};

use crate::models::{DeliveryConfig, Item};
use crate::notify::{ChannelError, NotifierChannel, OutboundMessage, plain_message, rich_message};

pub use retry::{RetryPolicy, Step};

/// Why a delivery was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    RateLimitedExhausted,
    TimeoutExhausted,
    TransportRejected,
    Unknown,
}

/// Final state of one item's delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent,
    /// Delivered in the plain fallback rendering
    SentDegraded,
    Failed(FailureReason),
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Sent | Self::SentDegraded)
    }
}

/// Outcome of one item within a batch.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub item: Item,
    pub outcome: DeliveryOutcome,
    pub retries: u32,
}

/// Delivers items one at a time through a [`NotifierChannel`].
pub struct DeliveryEngine {
    channel: Box<dyn NotifierChannel>,
    policy: RetryPolicy,
    min_interval: Duration,
    item_pause: Duration,
    progress_every: usize,
    last_call: Option<Instant>,
}

impl DeliveryEngine {
    pub fn new(channel: Box<dyn NotifierChannel>, config: &DeliveryConfig) -> Self {
        Self {
            channel,
            policy: RetryPolicy::from_config(config),
            min_interval: Duration::from_millis(config.min_interval_ms),
            item_pause: Duration::from_millis(config.item_pause_ms),
            progress_every: config.progress_every.max(1),
            last_call: None,
        }
    }

    /// Probe the channel; `false` when it is unreachable or misconfigured.
    pub async fn test_connection(&self) -> bool {
        match self.channel.identity_probe().await {
            Ok(identity) => {
                log::info!("Connected to notifier channel as {}", identity);
                true
            }
            Err(e) => {
                log::error!("Notifier channel check failed: {}", e);
                false
            }
        }
    }

    /// Deliver items in order, one report per item.
    pub async fn deliver_batch(&mut self, items: Vec<Item>, dry_run: bool) -> Vec<DeliveryReport> {
        let total = items.len();
        let mut reports = Vec::with_capacity(total);
        if total == 0 {
            return reports;
        }
        log::info!(
            "Delivering {} items{}",
            total,
            if dry_run { " (dry run)" } else { "" }
        );

        for (index, item) in items.into_iter().enumerate() {
            let (outcome, retries) = self.deliver_one(&item, dry_run).await;
            reports.push(DeliveryReport {
                item,
                outcome,
                retries,
            });

            let done = index + 1;
            if done % self.progress_every == 0 || done == total {
                log_progress(&reports, total);
            }
            if done < total {
                sleep(self.item_pause).await;
            }
        }

        reports
    }

    /// Drive one item through the rich/plain/retry state machine.
    ///
    /// Returns the outcome and the number of retries spent.
    pub async fn deliver_one(&mut self, item: &Item, dry_run: bool) -> (DeliveryOutcome, u32) {
        let rich = rich_message(item);
        if dry_run {
            self.pace().await;
            log::info!("[dry run] Would send item {}:\n{}", item.id(), rich.text);
            return (DeliveryOutcome::Sent, 0);
        }
        let plain = plain_message(item);

        let mut retries = 0;
        let mut step = Step::TryRich;
        loop {
            step = match step {
                Step::TryRich => match self.send(&rich).await {
                    Ok(()) => {
                        log::info!("Sent item {}: {}", item.id(), item.title());
                        return (DeliveryOutcome::Sent, retries);
                    }
                    Err(ChannelError::Rejected(reason)) => {
                        log::warn!(
                            "Formatted message for item {} rejected ({}), retrying as plain text",
                            item.id(),
                            reason
                        );
                        Step::TryPlain
                    }
                    Err(e) => self.policy.after_error(&e, retries),
                },
                Step::TryPlain => match self.send(&plain).await {
                    Ok(()) => {
                        log::info!("Sent item {} as plain text", item.id());
                        return (DeliveryOutcome::SentDegraded, retries);
                    }
                    Err(e) => self.policy.after_error(&e, retries),
                },
                Step::Retry(wait) => {
                    retries += 1;
                    log::warn!(
                        "Retrying item {} in {:?} (retry {}/{})",
                        item.id(),
                        wait,
                        retries,
                        self.policy.max_retries
                    );
                    sleep(wait).await;
                    Step::TryRich
                }
                Step::GiveUp(reason) => {
                    log::error!(
                        "Giving up on item {} after {} retries: {:?}",
                        item.id(),
                        retries,
                        reason
                    );
                    return (DeliveryOutcome::Failed(reason), retries);
                }
            };
        }
    }

    /// Wait out the cooldown since the previous call and claim the next slot.
    ///
    /// Dry runs go through here as well, so they keep the live pacing.
    async fn pace(&mut self) {
        if let Some(last) = self.last_call {
            sleep_until(last + self.min_interval).await;
        }
        self.last_call = Some(Instant::now());
    }

    /// One paced channel call.
    async fn send(&mut self, message: &OutboundMessage) -> Result<(), ChannelError> {
        self.pace().await;
        let result = self.channel.deliver(message).await;
        self.last_call = Some(Instant::now());
        if let Err(e) = &result {
            log::debug!("Channel call failed: {}", e);
        }
        result
    }
}

fn log_progress(reports: &[DeliveryReport], total: usize) {
    let count = |wanted: fn(&DeliveryOutcome) -> bool| {
        reports.iter().filter(|r| wanted(&r.outcome)).count()
    };
    log::info!(
        "Progress: {}/{} processed ({} sent, {} degraded, {} failed)",
        reports.len(),
        total,
        count(|o| *o == DeliveryOutcome::Sent),
        count(|o| *o == DeliveryOutcome::SentDegraded),
        count(|o| !o.is_success()),
    );
}
