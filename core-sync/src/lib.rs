//! # Library Sync Module
//!
//! Reconciles the local media library with the user's remote tracking
//! account.
//!
//! ## Overview
//!
//! A sync cycle filters the local library, fetches the remote library,
//! computes what to send and which local flags to correct, and sends the
//! result as batches. Per-item outcomes the remote service reports
//! (unresolvable items, items matched by title) are remembered between cycles
//! so they are not resubmitted every time.
//!
//! ## Components
//!
//! - **Identity Matcher** (`identity`): Decides whether a local and a remote item are the same title
//! - **Exclusion Cache** (`exclusion`): Skip set with expiry and the already-exists set
//! - **Repository** (`repository`): Persists the exclusion state between cycles
//! - **Library Index Builder** (`index`): Filters the local library for a cycle
//! - **Reconciliation Engine** (`reconcile`): Computes the sync plan and local corrections
//! - **Sync Job State Machine** (`job`): Lifecycle record of one cycle
//! - **Sync Coordinator** (`coordinator`): Runs single-flight cycles, on demand or periodically

pub mod coordinator;
pub mod error;
pub mod exclusion;
pub mod identity;
pub mod index;
pub mod job;
pub mod reconcile;
pub mod repository;

pub use coordinator::SyncCoordinator;
pub use error::{Result, SyncError};
pub use exclusion::{ExclusionCache, ExclusionState, SkipEntry};
pub use identity::{find_local_match, is_valid_external_id, matches, normalize_external_id};
pub use index::{IndexStats, LibraryIndex, LibraryIndexBuilder};
pub use job::{SyncCycleStats, SyncJob, SyncJobId, SyncPhase, SyncStatus, SyncTrigger};
pub use reconcile::{reconcile, LocalCorrection, Reconciliation, SyncPlan};
pub use repository::{ExclusionRepository, SettingsExclusionRepository, EXCLUSION_STATE_KEY};
