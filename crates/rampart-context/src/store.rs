//! Bounded diagnostic context store
//!
//! Keeps captured [`DiagnosticContext`] payloads keyed by an explicit
//! [`ContextId`]:
//! - Capacity bound with insertion-order eviction (oldest inserted first)
//! - No access-based reordering; reads never change eviction order
//! - Age bound (TTL) checked on read and enforced by a periodic sweep

use crate::snapshot::DiagnosticContext;
use indexmap::IndexMap;
use parking_lot::Mutex;
use rampart_core::{ContextConfig, ContextId};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Store statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextStats {
    /// Entries currently held
    pub entry_count: usize,
    /// Total saves
    pub saves: u64,
    /// Entries evicted for capacity
    pub capacity_evictions: u64,
    /// Entries removed because they outlived the TTL
    pub expired: u64,
    /// Successful restores
    pub hits: u64,
    /// Restores that found nothing (absent or expired)
    pub misses: u64,
}

#[derive(Debug)]
struct Entry {
    payload: DiagnosticContext,
    inserted_at: Instant,
}

#[derive(Debug)]
struct Inner {
    capacity: usize,
    ttl: Duration,
    entries: Mutex<IndexMap<ContextId, Entry>>,
    stats: Mutex<ContextStats>,
}

impl Inner {
    fn sweep_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| now.saturating_duration_since(e.inserted_at) < self.ttl);
        let removed = before - entries.len();

        let mut stats = self.stats.lock();
        stats.expired += removed as u64;
        stats.entry_count = entries.len();
        removed
    }
}

/// Diagnostic context store with a background TTL sweeper
#[derive(Debug)]
pub struct DiagnosticContextStore {
    inner: Arc<Inner>,
    sweep_interval: Duration,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl DiagnosticContextStore {
    /// Create store from configuration
    #[must_use]
    pub fn new(config: ContextConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                capacity: config.capacity.max(1),
                ttl: config.ttl(),
                entries: Mutex::new(IndexMap::new()),
                stats: Mutex::new(ContextStats::default()),
            }),
            sweep_interval: config.sweep_interval(),
            sweeper: Mutex::new(None),
        }
    }

    /// Create store with explicit capacity and TTL
    #[must_use]
    pub fn with_limits(capacity: usize, ttl: Duration) -> Self {
        Self::new(ContextConfig {
            capacity,
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
            ..ContextConfig::default()
        })
    }

    /// Start the periodic TTL sweep. Idempotent; must run inside a tokio runtime.
    pub fn init(&self) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let period = self.sweep_interval;
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let removed = inner.sweep_at(Instant::now());
                if removed > 0 {
                    tracing::debug!(removed, "swept expired diagnostic contexts");
                }
            }
        }));
        tracing::debug!(interval_ms = period.as_millis(), "context sweeper started");
    }

    /// Stop the periodic sweep. Entries are kept.
    pub fn teardown(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
            tracing::debug!("context sweeper stopped");
        }
    }

    /// Whether the sweeper task is live
    #[must_use]
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Insert or replace a context.
    ///
    /// Replacing moves the entry to the newest position. Returns the id evicted
    /// to make room, if any.
    pub fn save_context(&self, id: ContextId, payload: DiagnosticContext) -> Option<ContextId> {
        let mut entries = self.inner.entries.lock();
        entries.shift_remove(&id);
        entries.insert(
            id,
            Entry {
                payload,
                inserted_at: Instant::now(),
            },
        );

        let evicted = if entries.len() > self.inner.capacity {
            entries.shift_remove_index(0).map(|(key, _)| key)
        } else {
            None
        };

        let mut stats = self.inner.stats.lock();
        stats.saves += 1;
        stats.entry_count = entries.len();
        if let Some(key) = &evicted {
            stats.capacity_evictions += 1;
            tracing::trace!(context_id = %key, "evicted oldest diagnostic context");
        }
        evicted
    }

    /// Payload for `id`, or `None` if absent or older than the TTL
    #[must_use]
    pub fn restore_context(&self, id: &ContextId) -> Option<DiagnosticContext> {
        let now = Instant::now();
        let entries = self.inner.entries.lock();
        let found = entries
            .get(id)
            .filter(|e| now.saturating_duration_since(e.inserted_at) < self.inner.ttl)
            .map(|e| e.payload.clone());
        drop(entries);

        let mut stats = self.inner.stats.lock();
        if found.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        found
    }

    /// Remove a context; returns whether it was present
    pub fn remove(&self, id: &ContextId) -> bool {
        let mut entries = self.inner.entries.lock();
        let removed = entries.shift_remove(id).is_some();
        self.inner.stats.lock().entry_count = entries.len();
        removed
    }

    /// Remove every entry older than the TTL; returns how many were removed
    pub fn sweep(&self) -> usize {
        self.inner.sweep_at(Instant::now())
    }

    /// Drop all entries
    pub fn clear(&self) {
        let mut entries = self.inner.entries.lock();
        entries.clear();
        self.inner.stats.lock().entry_count = 0;
    }

    /// Whether a live (unexpired) entry exists
    #[must_use]
    pub fn contains(&self, id: &ContextId) -> bool {
        let now = Instant::now();
        self.inner
            .entries
            .lock()
            .get(id)
            .is_some_and(|e| now.saturating_duration_since(e.inserted_at) < self.inner.ttl)
    }

    /// Entries held, including expired ones not yet swept
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Whether the store holds nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids in eviction order (oldest first)
    #[must_use]
    pub fn ids(&self) -> Vec<ContextId> {
        self.inner.entries.lock().keys().cloned().collect()
    }

    /// Maximum retained entries
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Retention window
    #[inline]
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Statistics snapshot
    #[must_use]
    pub fn stats(&self) -> ContextStats {
        *self.inner.stats.lock()
    }
}

impl Default for DiagnosticContextStore {
    fn default() -> Self {
        Self::new(ContextConfig::default())
    }
}

impl Drop for DiagnosticContextStore {
    fn drop(&mut self) {
        self.teardown();
    }
}
