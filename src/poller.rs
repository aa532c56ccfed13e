//! Background poll loop
//!
//! Fetches the feed, replaces the snapshot store on success and keeps the
//! previous snapshot on failure. Runs until the cancellation token fires.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{errors::FetchError, feed::FeedSource, store::SnapshotStore};

/// Result of a single fetch cycle
#[derive(Debug)]
pub enum CycleOutcome {
    /// Store replaced with this many vehicles
    Replaced { vehicles: usize },
    /// Fetch failed, store left untouched
    Skipped { error: FetchError },
}

/// Counters describing poll loop health
#[derive(Debug, Default)]
pub struct PollStats {
    cycles: AtomicU64,
    failures: AtomicU64,
    consecutive_failures: AtomicU32,
    last_success: ArcSwapOption<DateTime<Utc>>,
    last_error: ArcSwapOption<String>,
}

/// Point-in-time copy of [`PollStats`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollStatsSnapshot {
    pub cycles: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl PollStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_success(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.last_success.store(Some(Arc::new(Utc::now())));
        self.last_error.store(None);
    }

    fn record_failure(&self, error: &FetchError) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        self.last_error.store(Some(Arc::new(error.to_string())));
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> PollStatsSnapshot {
        PollStatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures(),
            last_success: self.last_success.load_full().map(|t| *t),
            last_error: self.last_error.load_full().map(|e| e.as_ref().clone()),
        }
    }
}

/// Periodic feed poller
pub struct Poller<S> {
    source: S,
    store: Arc<SnapshotStore>,
    stats: Arc<PollStats>,
    interval: Duration,
    max_backoff: Duration,
}

impl<S: FeedSource> Poller<S> {
    /// Create a poller sleeping a fixed `interval` between cycles
    pub fn new(source: S, store: Arc<SnapshotStore>, interval: Duration) -> Self {
        Self {
            source,
            store,
            stats: Arc::new(PollStats::new()),
            interval,
            max_backoff: interval,
        }
    }

    /// Allow the sleep to double after each consecutive failure, up to `max`
    pub fn with_max_backoff(mut self, max: Duration) -> Self {
        self.max_backoff = max.max(self.interval);
        self
    }

    pub fn stats(&self) -> Arc<PollStats> {
        Arc::clone(&self.stats)
    }

    /// Run one fetch cycle
    pub async fn poll_once(&self) -> CycleOutcome {
        match self.source.fetch_snapshot().await {
            Ok(records) => {
                let vehicles = records.len();
                self.store.replace(records);
                self.stats.record_success();
                info!("Snapshot replaced: {} vehicles", vehicles);
                CycleOutcome::Replaced { vehicles }
            }
            Err(error) => {
                self.stats.record_failure(&error);
                error!(
                    kind = error.kind(),
                    consecutive_failures = self.stats.consecutive_failures(),
                    "Error fetching feed, keeping previous snapshot: {}",
                    error
                );
                CycleOutcome::Skipped { error }
            }
        }
    }

    /// Sleep before the next cycle
    ///
    /// The poll interval, doubled for each consecutive failure and capped at
    /// the maximum backoff.
    pub fn next_delay(&self) -> Duration {
        let failures = self.stats.consecutive_failures();
        if failures == 0 {
            return self.interval;
        }
        let factor = 1u32 << failures.min(16);
        self.interval.saturating_mul(factor).min(self.max_backoff)
    }

    /// Poll until `cancel` fires; the first cycle runs immediately
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "Poller started: interval={:?}, max_backoff={:?}",
            self.interval, self.max_backoff
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.poll_once() => {}
            }

            let delay = self.next_delay();
            debug!("Next poll in {:?}", delay);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Poller stopped");
    }
}
