//! # Reconciliation Engine
//!
//! Computes one cycle's [`SyncPlan`] from the filtered local collection and the
//! remote library snapshot, together with the corrections the local store
//! should receive.
//!
//! ## Algorithm
//!
//! - `to_collection` starts as every local item, `to_seen` as every watched one.
//! - For each remote item, all matching local items are found. With no match,
//!   a remote item still in the collection is queued for removal.
//! - The first matching local item is corrected from remote state: a missing
//!   or invalid external identifier is filled in, and the watched flag follows
//!   the remote play count unless the remote item is marked unseen.
//! - A remote item in the collection removes all its matches from
//!   `to_collection`; one that is seen or marked unseen removes them from
//!   `to_seen`.
//!
//! Reconciliation itself is pure. The caller persists the returned
//! [`LocalCorrection`]s.

use crate::identity::{find_local_match, matches, normalize_external_id};
use bridge_traits::{LocalItem, LocalItemId, RemoteItem};
use tracing::{debug, info};

/// The batches one cycle sends to the remote service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub to_collection: Vec<LocalItem>,
    pub to_seen: Vec<LocalItem>,
    pub to_remove_remotely: Vec<RemoteItem>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.to_collection.is_empty()
            && self.to_seen.is_empty()
            && self.to_remove_remotely.is_empty()
    }
}

/// A change to write back to the local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalCorrection {
    SetExternalId {
        id: LocalItemId,
        title: String,
        external_id: String,
    },
    SetWatched {
        id: LocalItemId,
        title: String,
        watched: bool,
    },
}

impl LocalCorrection {
    pub fn item_id(&self) -> LocalItemId {
        match self {
            LocalCorrection::SetExternalId { id, .. } | LocalCorrection::SetWatched { id, .. } => {
                *id
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub plan: SyncPlan,
    pub corrections: Vec<LocalCorrection>,
}

/// Reconciles `local` against `remote`.
pub fn reconcile(local: &[LocalItem], remote: &[RemoteItem]) -> Reconciliation {
    let mut items = local.to_vec();
    let mut to_collection = vec![true; items.len()];
    let mut to_seen: Vec<bool> = items.iter().map(|item| item.watched).collect();
    let mut to_remove_remotely = Vec::new();
    let mut corrections = Vec::new();

    for remote_item in remote {
        let Some(first) = find_local_match(
            &items,
            &remote_item.title,
            remote_item.year,
            &remote_item.external_id,
        ) else {
            if remote_item.in_collection {
                to_remove_remotely.push(remote_item.clone());
            }
            continue;
        };

        correct_local(&mut items[first], remote_item, &mut corrections);

        if remote_item.in_collection {
            for (idx, item) in items.iter().enumerate() {
                if matches(item, remote_item) {
                    to_collection[idx] = false;
                }
            }
        }
    }

    for remote_item in remote.iter().filter(|r| r.has_seen_state()) {
        for (idx, item) in items.iter().enumerate() {
            if to_seen[idx] && matches(item, remote_item) {
                to_seen[idx] = false;
            }
        }
    }

    let plan = SyncPlan {
        to_collection: select(&items, &to_collection),
        to_seen: select(&items, &to_seen),
        to_remove_remotely,
    };

    debug!(
        to_collection = plan.to_collection.len(),
        to_seen = plan.to_seen.len(),
        to_remove = plan.to_remove_remotely.len(),
        corrections = corrections.len(),
        "Reconciled local library against remote snapshot"
    );

    Reconciliation { plan, corrections }
}

fn correct_local(item: &mut LocalItem, remote: &RemoteItem, out: &mut Vec<LocalCorrection>) {
    if normalize_external_id(&item.external_id).is_none() {
        if let Some(remote_id) = normalize_external_id(&remote.external_id) {
            info!(title = %item.title, external_id = %remote_id, "Filling in missing external id");
            item.external_id = remote_id.clone();
            out.push(LocalCorrection::SetExternalId {
                id: item.id,
                title: item.title.clone(),
                external_id: remote_id,
            });
        }
    }

    let watched = if remote.play_count > 0 && !remote.unseen_override && !item.watched {
        info!(title = %item.title, "Item is watched remotely, marking watched");
        Some(true)
    } else if remote.unseen_override && item.watched {
        info!(title = %item.title, "Item is marked unseen remotely, marking unwatched");
        Some(false)
    } else {
        None
    };

    if let Some(watched) = watched {
        item.watched = watched;
        out.push(LocalCorrection::SetWatched {
            id: item.id,
            title: item.title.clone(),
            watched,
        });
    }
}

fn select(items: &[LocalItem], keep: &[bool]) -> Vec<LocalItem> {
    items
        .iter()
        .zip(keep)
        .filter(|(_, keep)| **keep)
        .map(|(item, _)| item.clone())
        .collect()
}
