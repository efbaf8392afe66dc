//! Bounded in-memory journal of finished executions.
//!
//! The journal is a sliding window: once it holds `capacity` entries the
//! oldest is evicted for each new one. Identifiers come from a counter
//! that only ever moves forward, so ids stay unique across evictions and
//! clears for the lifetime of the process.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// One finished execution, as served by the history endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub id: u64,
    /// Seconds since the Unix epoch, fractional part included.
    pub timestamp: f64,
    pub language: String,
    pub code: String,
    /// Captured stdout; empty unless the run succeeded.
    pub output: String,
    /// Error text; empty for successful runs.
    pub error: String,
    /// Wall-clock seconds from validation through sandbox teardown.
    pub duration: f64,
}

/// Thread-safe execution history with FIFO eviction.
pub struct ExecutionJournal {
    entries: Mutex<VecDeque<HistoryEntry>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl ExecutionJournal {
    pub fn new(capacity: usize) -> Self {
        // A window of zero would evict entries as they are appended.
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            next_id: AtomicU64::new(1),
            capacity,
        }
    }

    /// Record a finished execution and return the stored entry. The id is
    /// taken while holding the lock, so id order matches insertion order.
    pub async fn append(
        &self,
        language: &str,
        code: &str,
        output: &str,
        error: &str,
        duration: f64,
    ) -> HistoryEntry {
        let mut entries = self.entries.lock().await;
        let entry = HistoryEntry {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            timestamp: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
            language: language.to_string(),
            code: code.to_string(),
            output: output.to_string(),
            error: error.to_string(),
            duration,
        };
        entries.push_back(entry.clone());
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        entry
    }

    /// Snapshot of the journal, most recent execution first.
    pub async fn list_newest_first(&self) -> Vec<HistoryEntry> {
        let entries = self.entries.lock().await;
        entries.iter().rev().cloned().collect()
    }

    /// Drop all entries. The id counter is not reset: entries recorded
    /// after a clear continue the old sequence.
    pub async fn clear(&self) {
        let mut entries = self.entries.lock().await;
        entries.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
