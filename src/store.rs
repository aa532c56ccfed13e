//! In-memory snapshot of the latest vehicle positions
//!
//! The store holds exactly one complete snapshot at a time. The poll loop
//! is the single writer; HTTP handlers read concurrently.
//!
//! ```text
//! [replace()] → build Arc<Snapshot> → [ArcSwap::store()]
//! [read_all()] → [ArcSwap::load_full()] → Arc<Snapshot> (immutable)
//! ```
//!
//! A reader holding an `Arc<Snapshot>` keeps seeing the snapshot it loaded
//! even if a replace happens meanwhile; it never observes records from two
//! fetch cycles.

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};

use crate::models::VehicleRecord;

/// All vehicles as of one successful fetch
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub records: Vec<VehicleRecord>,
    /// When the snapshot was installed, None before the first fetch
    pub fetched_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Snapshot store with atomic replace
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: ArcSwap<Snapshot>,
}

impl SnapshotStore {
    /// Create a store holding the empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard the current snapshot and install `records` in its place
    pub fn replace(&self, records: Vec<VehicleRecord>) {
        let snapshot = Snapshot {
            records,
            fetched_at: Some(Utc::now()),
        };
        self.current.store(Arc::new(snapshot));
    }

    /// Current snapshot (lock-free)
    pub fn read_all(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }
}
