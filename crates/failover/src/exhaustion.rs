//! Cooldown tracking for credentials and endpoints.
//!
//! Keys are either `"provider:credential"` or an endpoint entry id
//! (`"provider"` / `"provider/model"`). Entries expire lazily: an expired
//! entry is removed by the lookup that notices it.

use crate::clock::Clock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// One key in cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExhaustionEntry {
    pub exhausted_at: Instant,
    pub cooldown: Duration,
}

impl ExhaustionEntry {
    fn remaining(&self, now: Instant) -> Option<Duration> {
        let elapsed = now.saturating_duration_since(self.exhausted_at);
        self.cooldown.checked_sub(elapsed).filter(|d| !d.is_zero())
    }
}

/// In-memory cooldown map. Never persisted: a restart clears every cooldown.
pub struct ExhaustionRegistry {
    entries: HashMap<String, ExhaustionEntry>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ExhaustionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExhaustionRegistry")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

impl ExhaustionRegistry {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            clock,
        }
    }

    /// Put `key` into cooldown starting now.
    ///
    /// Overwrites any previous entry: a fresh failure restarts the cooldown
    /// rather than extending it.
    pub fn mark_exhausted(&mut self, key: &str, cooldown: Duration) {
        let entry = ExhaustionEntry {
            exhausted_at: self.clock.now(),
            cooldown,
        };
        tracing::debug!(key, cooldown_ms = cooldown.as_millis(), "marked exhausted");
        self.entries.insert(key.to_string(), entry);
    }

    /// Whether `key` is still inside its cooldown window. Prunes the entry
    /// once it has expired.
    pub fn is_exhausted(&mut self, key: &str) -> bool {
        self.remaining(key).is_some()
    }

    /// Remaining cooldown of `key`, pruning it if expired.
    pub fn remaining(&mut self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let entry = self.entries.get(key)?;
        match entry.remaining(now) {
            Some(left) => Some(left),
            None => {
                self.entries.remove(key);
                tracing::debug!(key, "cooldown expired");
                None
            }
        }
    }

    /// Remove one key.
    pub fn clear(&mut self, key: &str) {
        self.entries.remove(key);
    }

    /// Remove every key.
    pub fn clear_all(&mut self) {
        if !self.entries.is_empty() {
            tracing::info!(cleared = self.entries.len(), "cleared all cooldowns");
        }
        self.entries.clear();
    }

    /// Live entries with their remaining cooldown, sorted by key. Prunes
    /// expired entries.
    pub fn snapshot(&mut self) -> Vec<(String, Duration)> {
        let now = self.clock.now();
        self.entries.retain(|_, e| e.remaining(now).is_some());
        let mut live: Vec<(String, Duration)> = self
            .entries
            .iter()
            .filter_map(|(k, e)| e.remaining(now).map(|left| (k.clone(), left)))
            .collect();
        live.sort_by(|a, b| a.0.cmp(&b.0));
        live
    }

    /// Number of stored entries, expired ones included until pruned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
