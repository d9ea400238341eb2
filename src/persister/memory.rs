//! In-memory persister keyed by request identity

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::request::PollyRequest;
use crate::Result;

use super::{Persister, RecordingEntry};

/// Persister holding entries in a concurrent map
#[derive(Default)]
pub struct MemoryPersister {
    /// Map of request identity to entry
    entries: DashMap<String, RecordingEntry>,
    /// Lookup hit counter
    hits: AtomicUsize,
    /// Lookup miss counter
    misses: AtomicUsize,
}

impl MemoryPersister {
    /// Create an empty persister
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an entry, replacing any entry with the same identity
    pub fn save_recording_entry(&self, entry: RecordingEntry) {
        debug!(
            "Saved recording entry: {} {} ({})",
            entry.request.method, entry.request.url, entry.id
        );
        self.entries.insert(entry.id.clone(), entry);
    }

    /// Look up an entry by request identity
    #[must_use]
    pub fn lookup(&self, id: &str) -> Option<RecordingEntry> {
        if let Some(entry) = self.entries.get(id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(entry.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Get lookup statistics
    #[must_use]
    pub fn stats(&self) -> PersisterStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        PersisterStats {
            hits,
            misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            size: self.entries.len(),
        }
    }

    /// Get the number of stored entries
    #[must_use]
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Remove every entry and reset counters
    pub fn clear(&self) {
        self.entries.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

#[async_trait]
impl Persister for MemoryPersister {
    async fn find_recording_entry(&self, request: &PollyRequest) -> Result<Option<RecordingEntry>> {
        Ok(request.id().and_then(|id| self.lookup(id)))
    }
}

/// Lookup statistics
#[derive(Debug, Clone, Copy)]
pub struct PersisterStats {
    /// Lookup hits
    pub hits: usize,
    /// Lookup misses
    pub misses: usize,
    /// Hit rate (0.0 to 1.0)
    pub hit_rate: f64,
    /// Number of stored entries
    pub size: usize,
}
