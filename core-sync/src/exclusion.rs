//! # Exclusion Cache
//!
//! Remembers items that should not be resent on every cycle.
//!
//! ## Skip set
//!
//! Items the remote catalogue could not resolve. The whole set shares one
//! `last_skipped_sync` timestamp; while it is younger than the expiry window
//! the entries are honored, and once it is older the set is cleared so every
//! previously skipped item is tried again.
//!
//! ## Already-exists set
//!
//! Items the remote service matched by a title fallback the local side cannot
//! reproduce. Entries are kept until the local item they describe disappears,
//! and are only evicted when a single local provider is registered.
//!
//! Both sets match local items by exact signature (title, year and raw
//! external identifier), so editing an item locally makes it eligible again.
//! The cache only computes deltas; loading and saving the state is the job of
//! [`ExclusionRepository`](crate::repository::ExclusionRepository).

use bridge_traits::{ItemSignature, LocalItem};
use chrono::{DateTime, Duration, Utc};
use core_runtime::config::SKIP_EXPIRY_DAYS;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One item the remote catalogue could not resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipEntry {
    #[serde(flatten)]
    pub item: ItemSignature,
    pub skipped_at: DateTime<Utc>,
}

/// Persisted exclusion memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExclusionState {
    #[serde(default)]
    pub last_skipped_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    pub skipped: Vec<SkipEntry>,
    #[serde(default)]
    pub already_exists: Vec<ItemSignature>,
}

#[derive(Debug, Clone)]
pub struct ExclusionCache {
    state: ExclusionState,
    expiry: Duration,
}

impl ExclusionCache {
    pub fn new(state: ExclusionState) -> Self {
        Self::with_expiry(state, Duration::days(SKIP_EXPIRY_DAYS))
    }

    pub fn with_expiry(state: ExclusionState, expiry: Duration) -> Self {
        Self { state, expiry }
    }

    pub fn state(&self) -> &ExclusionState {
        &self.state
    }

    pub fn into_state(self) -> ExclusionState {
        self.state
    }

    pub fn skipped_count(&self) -> usize {
        self.state.skipped.len()
    }

    pub fn already_exists_count(&self) -> usize {
        self.state.already_exists.len()
    }

    pub fn has_already_exists(&self) -> bool {
        !self.state.already_exists.is_empty()
    }

    /// When the current skip set stops being honored
    pub fn next_retry_at(&self) -> Option<DateTime<Utc>> {
        self.state.last_skipped_sync.map(|at| at + self.expiry)
    }

    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.state.last_skipped_sync {
            Some(at) => now - at >= self.expiry,
            None => true,
        }
    }

    /// Clears the skip set and restarts its window when the window has elapsed.
    ///
    /// Returns `true` if the set was reset.
    pub fn expire_if_stale(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_stale(now) {
            return false;
        }

        if !self.state.skipped.is_empty() {
            debug!(
                cleared = self.state.skipped.len(),
                "Skip window elapsed, previously skipped items are eligible again"
            );
        }
        self.state.skipped.clear();
        self.state.last_skipped_sync = Some(now);
        true
    }

    /// Whether `item` is in an unexpired skip set.
    ///
    /// Expires the set first, so a stale set is cleared as a side effect.
    pub fn should_skip(&mut self, item: &LocalItem, now: DateTime<Utc>) -> bool {
        if self.expire_if_stale(now) {
            return false;
        }
        self.state.skipped.iter().any(|entry| entry.item.describes(item))
    }

    /// Records items the remote service skipped.
    ///
    /// Existing entries are refreshed in place. The set's own timestamp is
    /// only set when it has none.
    pub fn record_skipped(&mut self, items: &[ItemSignature], now: DateTime<Utc>) {
        if items.is_empty() {
            return;
        }

        for item in items {
            match self.state.skipped.iter_mut().find(|entry| &entry.item == item) {
                Some(entry) => entry.skipped_at = now,
                None => self.state.skipped.push(SkipEntry {
                    item: item.clone(),
                    skipped_at: now,
                }),
            }
        }

        if self.state.last_skipped_sync.is_none() {
            self.state.last_skipped_sync = Some(now);
        }
    }

    pub fn should_skip_already_exists(&self, item: &LocalItem) -> bool {
        self.state
            .already_exists
            .iter()
            .any(|entry| entry.describes(item))
    }

    pub fn record_already_exists(&mut self, items: &[ItemSignature]) {
        for item in items {
            if !self.state.already_exists.contains(item) {
                self.state.already_exists.push(item.clone());
            }
        }
    }

    /// Evicts already-exists entries that no longer describe any current item.
    ///
    /// Does nothing unless exactly one local provider is registered. Returns
    /// the number of evicted entries.
    pub fn reconcile(&mut self, current: &[LocalItem], provider_count: usize) -> usize {
        if provider_count != 1 {
            return 0;
        }

        let before = self.state.already_exists.len();
        self.state.already_exists.retain(|entry| {
            let present = current.iter().any(|item| entry.describes(item));
            if !present {
                debug!(item = %entry, "Removing already-exists entry");
            }
            present
        });
        before - self.state.already_exists.len()
    }
}
