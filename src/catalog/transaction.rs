//! Catalog snapshots.
//!
//! DDL is autocommit: every catalog change gets a fresh commit timestamp, and a
//! transaction sees exactly the changes committed at or before its snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

/// Commit timestamp.
pub type Timestamp = u64;

/// A read snapshot of the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction {
    id: u64,
    snapshot: Timestamp,
}

impl Transaction {
    /// Creates a transaction reading at `snapshot`.
    #[must_use]
    pub fn new(id: u64, snapshot: Timestamp) -> Self {
        Transaction { id, snapshot }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the snapshot timestamp.
    #[must_use]
    pub fn snapshot(&self) -> Timestamp {
        self.snapshot
    }

    /// Returns true if a version created at `created_at` and dropped at
    /// `dropped_at` is visible to this transaction.
    #[must_use]
    pub fn can_see(&self, created_at: Timestamp, dropped_at: Option<Timestamp>) -> bool {
        created_at <= self.snapshot && dropped_at.map_or(true, |dropped| dropped > self.snapshot)
    }
}

/// Hands out transaction IDs, snapshots and commit timestamps.
#[derive(Debug, Default)]
pub struct TransactionManager {
    next_id: AtomicU64,
    last_commit: AtomicU64,
}

impl TransactionManager {
    /// Creates a manager with no commits yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a manager continuing after `last_commit` (used when reopening a
    /// persisted catalog).
    #[must_use]
    pub fn resume(last_commit: Timestamp) -> Self {
        TransactionManager {
            next_id: AtomicU64::new(0),
            last_commit: AtomicU64::new(last_commit),
        }
    }

    /// Starts a transaction at the latest committed snapshot.
    pub fn begin(&self) -> Transaction {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Transaction::new(id, self.last_commit.load(Ordering::Acquire))
    }

    /// Allocates the next commit timestamp.
    pub fn next_commit_ts(&self) -> Timestamp {
        self.last_commit.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns the latest committed timestamp.
    #[must_use]
    pub fn last_commit_ts(&self) -> Timestamp {
        self.last_commit.load(Ordering::Acquire)
    }
}
