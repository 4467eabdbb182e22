//! In-process cache backend.
//!
//! An expired entry is dropped when it is next read, when a pattern scan
//! walks over it, or by the sweep that writes trigger once per
//! [`SWEEP_INTERVAL`] or when the map doubles in size. A TTL too large to
//! represent as an instant never expires. Expiry uses `tokio::time::Instant`
//! so tests can drive it with paused time.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use vitrine_core::{Error, Result};

use crate::backend::CacheBackend;
use crate::types::BackendStats;

/// Minimum time between two write-triggered sweeps.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Map size below which only the interval triggers a sweep.
const MIN_SWEEP_LEN: usize = 1024;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    /// `None` never expires.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

#[derive(Debug)]
struct Table {
    entries: HashMap<String, Entry>,
    next_sweep: Option<Instant>,
    sweep_len: usize,
}

impl Default for Table {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            next_sweep: None,
            sweep_len: MIN_SWEEP_LEN,
        }
    }
}

impl Table {
    fn sweep_due(&self, now: Instant) -> bool {
        self.entries.len() >= self.sweep_len || self.next_sweep.is_none_or(|at| now >= at)
    }

    /// Drop expired entries; returns how many were dropped.
    fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        self.next_sweep = now.checked_add(SWEEP_INTERVAL);
        self.sweep_len = (self.entries.len() * 2).max(MIN_SWEEP_LEN);
        before - self.entries.len()
    }
}

#[derive(Debug, Default)]
struct Inner {
    table: Mutex<Table>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// TTL-aware in-memory backend. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries held, including ones that have expired but were not
    /// yet evicted.
    pub fn raw_len(&self) -> usize {
        self.inner.table.lock().entries.len()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        let mut table = self.inner.table.lock();
        let entries = &mut table.entries;
        let value = match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        };
        drop(table);

        let counter = if value.is_some() {
            &self.inner.hits
        } else {
            &self.inner.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let expires_at = now.checked_add(ttl);
        let mut table = self.inner.table.lock();
        if table.sweep_due(now) {
            let dropped = table.sweep(now);
            if dropped > 0 {
                log::debug!("Memory cache swept {dropped} expired keys");
            }
        }
        table
            .entries
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete_matching(&self, pattern: &str) -> Result<usize> {
        let matcher = glob::Pattern::new(pattern)
            .map_err(|e| Error::invalid_input(format!("bad cache pattern '{pattern}': {e}")))?;
        let now = Instant::now();

        let mut table = self.inner.table.lock();
        let entries = &mut table.entries;
        let before = entries.len();
        let mut removed = 0;
        entries.retain(|key, entry| {
            if !entry.is_live(now) {
                return false;
            }
            if matcher.matches(key) {
                removed += 1;
                return false;
            }
            true
        });
        log::debug!(
            "Memory cache removed {removed} keys matching {pattern} ({} expired)",
            before - entries.len() - removed
        );
        Ok(removed)
    }

    async fn stats(&self) -> Result<BackendStats> {
        let now = Instant::now();
        let keys = self
            .inner
            .table
            .lock()
            .entries
            .values()
            .filter(|e| e.is_live(now))
            .count();
        Ok(BackendStats {
            keys,
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
