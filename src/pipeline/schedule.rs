// src/pipeline/schedule.rs

//! Periodic cycle runner with graceful shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::pipeline::Watcher;

/// Shutdown flag shared between the signal listener and the scheduler.
///
/// A trigger during a cycle lets that cycle finish; no new cycle starts.
#[derive(Clone, Default)]
pub struct Shutdown {
    triggered: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        if !self.is_triggered() {
            self.notify.notified().await;
        }
    }

    /// Trigger on SIGINT, or SIGTERM on Unix.
    pub fn listen_for_signals(&self) -> JoinHandle<()> {
        let shutdown = self.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            log::info!("Shutdown signal received, stopping after the current cycle");
            shutdown.trigger();
        })
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            log::warn!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Run a cycle now and then every `period` until shutdown.
///
/// Cycles never overlap; a cycle that overruns the period delays the next
/// tick instead of triggering a burst. Returns the number of cycles run.
pub async fn run_scheduled(watcher: &mut Watcher, period: Duration, shutdown: &Shutdown) -> usize {
    log::info!("Scheduler started, checking every {:?}", period);
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut cycles = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.wait() => {}
        }
        if shutdown.is_triggered() {
            break;
        }

        watcher.run_cycle().await;
        cycles += 1;
    }

    log::info!("Scheduler stopped after {} cycles", cycles);
    cycles
}
