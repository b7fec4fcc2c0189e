//! # Library Index Builder
//!
//! Turns the raw local collection into the list a sync cycle works on.
//!
//! Filters run in a fixed order, each over the previous result:
//!
//! 1. Paths under a blocked folder (case-insensitive substring)
//! 2. Items whose file is on the blocked-filename list
//! 3. Items in the unexpired skip set
//! 4. Items in the already-exists set, after evicting entries whose item is gone
//!
//! A store failure aborts the build; nothing is filtered partially.

use crate::exclusion::ExclusionCache;
use crate::{Result, SyncError};
use bridge_traits::{LocalItem, LocalItemId, LocalLibraryStore};
use chrono::{DateTime, Utc};
use core_runtime::config::LibrarySyncSettings;
use core_runtime::logging::strip_path;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Items removed by each filter stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub total: usize,
    pub blocked_folder: usize,
    pub blocked_filename: usize,
    pub skipped: usize,
    pub already_exists: usize,
    /// Already-exists entries evicted before filtering
    pub evicted: usize,
}

#[derive(Debug, Clone, Default)]
pub struct LibraryIndex {
    pub items: Vec<LocalItem>,
    pub stats: IndexStats,
}

pub struct LibraryIndexBuilder {
    store: Arc<dyn LocalLibraryStore>,
    settings: LibrarySyncSettings,
}

impl LibraryIndexBuilder {
    pub fn new(store: Arc<dyn LocalLibraryStore>, settings: LibrarySyncSettings) -> Self {
        Self { store, settings }
    }

    fn in_blocked_folder(&self, item: &LocalItem) -> bool {
        let path = item.path.to_lowercase();
        self.settings
            .blocked_folders
            .iter()
            .filter(|folder| !folder.trim().is_empty())
            .any(|folder| path.contains(&folder.to_lowercase()))
    }

    async fn blocked_filename_ids(&self) -> Result<HashSet<LocalItemId>> {
        if self.settings.blocked_filenames.is_empty() {
            return Ok(HashSet::new());
        }

        let ids = self
            .store
            .resolve_blocked_filename_ids(&self.settings.blocked_filenames)
            .await
            .map_err(SyncError::from_store)?;
        Ok(ids.into_iter().collect())
    }

    /// Filters `raw` down to the items eligible for this cycle.
    pub async fn build(
        &self,
        raw: Vec<LocalItem>,
        cache: &mut ExclusionCache,
        now: DateTime<Utc>,
    ) -> Result<LibraryIndex> {
        let mut stats = IndexStats {
            total: raw.len(),
            ..Default::default()
        };

        let mut items: Vec<LocalItem> = raw
            .into_iter()
            .filter(|item| {
                let blocked = self.in_blocked_folder(item);
                if blocked {
                    debug!(path = %strip_path(&item.path), "Ignoring item in blocked folder");
                }
                !blocked
            })
            .collect();
        stats.blocked_folder = stats.total - items.len();

        let blocked_ids = self.blocked_filename_ids().await?;
        if !blocked_ids.is_empty() {
            let before = items.len();
            items.retain(|item| !blocked_ids.contains(&item.id));
            stats.blocked_filename = before - items.len();
        }

        cache.expire_if_stale(now);
        let before = items.len();
        items.retain(|item| {
            let skip = cache.should_skip(item, now);
            if skip {
                debug!(item = %item.signature(), "Skipping item the remote catalogue could not resolve");
            }
            !skip
        });
        stats.skipped = before - items.len();
        if stats.skipped > 0 {
            info!(
                skipped = stats.skipped,
                next_check = ?cache.next_retry_at(),
                "Skipping items with unresolvable data"
            );
        }

        stats.evicted = cache.reconcile(&items, self.settings.local_provider_count);
        let before = items.len();
        items.retain(|item| {
            let exists = cache.should_skip_already_exists(item);
            if exists {
                debug!(item = %item.signature(), "Skipping item already matched remotely");
            }
            !exists
        });
        stats.already_exists = before - items.len();

        info!(
            available = items.len(),
            total = stats.total,
            "Local items available to sync"
        );

        Ok(LibraryIndex { items, stats })
    }
}
