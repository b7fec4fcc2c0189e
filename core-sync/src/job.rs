//! # Sync Job State Machine
//!
//! Tracks one library sync cycle from trigger to outcome.
//!
//! ## State Machine
//!
//! ```text
//! Pending → Running → Completed
//!     ↓         ↓
//!     └──────→ Failed
//! ```
//!
//! While running, the job also records which phase of the cycle it is in, so
//! a failure can be attributed to the step that caused it.
//!
//! ## Usage
//!
//! ```rust
//! use core_sync::{SyncCycleStats, SyncJob, SyncPhase, SyncStatus, SyncTrigger};
//!
//! let mut job = SyncJob::new(SyncTrigger::Manual).start()?;
//! job.advance(SyncPhase::FetchingRemote)?;
//!
//! let job = job.complete(SyncCycleStats {
//!     to_collection: 3,
//!     ..Default::default()
//! })?;
//! assert_eq!(job.status, SyncStatus::Completed);
//! # Ok::<(), core_sync::SyncError>(())
//! ```

use crate::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncJobId(Uuid);

impl SyncJobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SyncJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SyncJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Status Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Running,
    Completed,
    /// The cycle aborted; nothing was saved
    Failed,
}

impl SyncStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Completed | SyncStatus::Failed)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SyncStatus::Pending | SyncStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Running => "running",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What started the cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncTrigger {
    Manual,
    Scheduled,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::Manual => "manual",
            SyncTrigger::Scheduled => "scheduled",
        }
    }
}

impl std::fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Step of a running cycle, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Initializing,
    LoadingLibrary,
    FetchingRemote,
    Reconciling,
    SendingCollection,
    SendingSeen,
    CleaningRemote,
    Done,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Initializing => "initializing",
            SyncPhase::LoadingLibrary => "loading_library",
            SyncPhase::FetchingRemote => "fetching_remote",
            SyncPhase::Reconciling => "reconciling",
            SyncPhase::SendingCollection => "sending_collection",
            SyncPhase::SendingSeen => "sending_seen",
            SyncPhase::CleaningRemote => "cleaning_remote",
            SyncPhase::Done => "done",
        }
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Outcome counters of a completed cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCycleStats {
    /// Items sent to the remote collection
    pub to_collection: u64,
    /// Items sent as seen
    pub to_seen: u64,
    /// Items removed from the remote collection
    pub removed: u64,
    /// Items the remote service could not resolve this cycle
    pub skipped: u64,
    /// Items the remote service matched by fallback this cycle
    pub already_exists: u64,
    pub watched_corrections: u64,
    pub ids_enriched: u64,
}

impl SyncCycleStats {
    /// Items sent in any batch
    pub fn total_sent(&self) -> u64 {
        self.to_collection + self.to_seen + self.removed
    }
}

// ============================================================================
// Sync Job Entity
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: SyncJobId,
    pub trigger: SyncTrigger,
    pub status: SyncStatus,
    pub phase: SyncPhase,
    /// Only available when completed
    pub stats: Option<SyncCycleStats>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncJob {
    pub fn new(trigger: SyncTrigger) -> Self {
        Self {
            id: SyncJobId::new(),
            trigger,
            status: SyncStatus::Pending,
            phase: SyncPhase::Initializing,
            stats: None,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Start the job
    ///
    /// # Errors
    ///
    /// Returns an error if the job is not in `Pending` state
    pub fn start(mut self) -> Result<Self> {
        self.validate_transition(SyncStatus::Running)?;
        self.status = SyncStatus::Running;
        self.started_at = Some(Utc::now());
        self.phase = SyncPhase::LoadingLibrary;
        Ok(self)
    }

    /// Move a running job to `phase`
    ///
    /// # Errors
    ///
    /// Returns an error if the job is not in `Running` state
    pub fn advance(&mut self, phase: SyncPhase) -> Result<()> {
        if self.status != SyncStatus::Running {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: phase.as_str().to_string(),
                reason: "Job must be running to change phase".to_string(),
            });
        }

        self.phase = phase;
        Ok(())
    }

    /// Mark the job as completed with statistics
    ///
    /// # Errors
    ///
    /// Returns an error if the job is not in `Running` state
    pub fn complete(mut self, stats: SyncCycleStats) -> Result<Self> {
        self.validate_transition(SyncStatus::Completed)?;
        self.status = SyncStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.stats = Some(stats);
        self.phase = SyncPhase::Done;
        Ok(self)
    }

    /// Mark the job as failed. The phase is kept so the failing step stays visible.
    ///
    /// # Errors
    ///
    /// Returns an error if the job is already in a terminal state
    pub fn fail(mut self, error_message: String) -> Result<Self> {
        self.validate_transition(SyncStatus::Failed)?;
        self.status = SyncStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error_message = Some(error_message);
        Ok(self)
    }

    /// Returns None if the job hasn't started or finished yet
    pub fn duration_secs(&self) -> Option<u64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds().max(0) as u64),
            _ => None,
        }
    }

    fn validate_transition(&self, to: SyncStatus) -> Result<()> {
        let valid = matches!(
            (self.status, to),
            (SyncStatus::Pending, SyncStatus::Running)
                | (SyncStatus::Pending, SyncStatus::Failed)
                | (SyncStatus::Running, SyncStatus::Completed)
                | (SyncStatus::Running, SyncStatus::Failed)
        );

        if !valid {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!(
                    "Cannot transition from {} to {}",
                    self.status.as_str(),
                    to.as_str()
                ),
            });
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_job_id_new() {
        let id1 = SyncJobId::new();
        let id2 = SyncJobId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_sync_status_flags() {
        assert!(SyncStatus::Pending.is_active());
        assert!(SyncStatus::Running.is_active());
        assert!(SyncStatus::Completed.is_terminal());
        assert!(SyncStatus::Failed.is_terminal());
        assert!(!SyncStatus::Running.is_terminal());
    }

    #[test]
    fn test_stats_total_sent() {
        let stats = SyncCycleStats {
            to_collection: 4,
            to_seen: 2,
            removed: 1,
            skipped: 3,
            ..Default::default()
        };
        assert_eq!(stats.total_sent(), 7);
    }

    #[test]
    fn test_sync_job_new() {
        let job = SyncJob::new(SyncTrigger::Scheduled);

        assert_eq!(job.status, SyncStatus::Pending);
        assert_eq!(job.trigger, SyncTrigger::Scheduled);
        assert_eq!(job.phase, SyncPhase::Initializing);
        assert!(job.started_at.is_none());
        assert!(job.duration_secs().is_none());
    }

    #[test]
    fn test_start_twice_fails() {
        let job = SyncJob::new(SyncTrigger::Manual).start().unwrap();
        assert_eq!(job.phase, SyncPhase::LoadingLibrary);
        assert!(job.start().is_err());
    }

    #[test]
    fn test_advance_requires_running() {
        let mut job = SyncJob::new(SyncTrigger::Manual);
        assert!(job.advance(SyncPhase::Reconciling).is_err());

        let mut job = job.start().unwrap();
        job.advance(SyncPhase::Reconciling).unwrap();
        assert_eq!(job.phase, SyncPhase::Reconciling);
    }

    #[test]
    fn test_complete() {
        let stats = SyncCycleStats {
            to_collection: 10,
            watched_corrections: 2,
            ..Default::default()
        };
        let job = SyncJob::new(SyncTrigger::Manual)
            .start()
            .unwrap()
            .complete(stats)
            .unwrap();

        assert_eq!(job.status, SyncStatus::Completed);
        assert_eq!(job.phase, SyncPhase::Done);
        assert_eq!(job.stats, Some(stats));
        assert!(job.duration_secs().is_some());
    }

    #[test]
    fn test_complete_requires_running() {
        let job = SyncJob::new(SyncTrigger::Manual);
        assert!(job.complete(SyncCycleStats::default()).is_err());
    }

    #[test]
    fn test_fail_keeps_phase() {
        let mut job = SyncJob::new(SyncTrigger::Manual).start().unwrap();
        job.advance(SyncPhase::FetchingRemote).unwrap();

        let job = job.fail("Remote service error: 503".to_string()).unwrap();

        assert_eq!(job.status, SyncStatus::Failed);
        assert_eq!(job.phase, SyncPhase::FetchingRemote);
        assert_eq!(job.error_message.as_deref(), Some("Remote service error: 503"));
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_terminal_states_cannot_transition() {
        let completed = SyncJob::new(SyncTrigger::Manual)
            .start()
            .unwrap()
            .complete(SyncCycleStats::default())
            .unwrap();

        assert!(completed.clone().start().is_err());
        assert!(completed.clone().fail("late".to_string()).is_err());

        let mut completed = completed;
        assert!(completed.advance(SyncPhase::SendingSeen).is_err());
    }

    #[test]
    fn test_phases_are_ordered() {
        assert!(SyncPhase::LoadingLibrary < SyncPhase::FetchingRemote);
        assert!(SyncPhase::SendingSeen < SyncPhase::CleaningRemote);
        assert_eq!(SyncPhase::CleaningRemote.to_string(), "cleaning_remote");
    }
}
