//! # Exclusion State Repository
//!
//! Persists the exclusion memory between sync cycles.
//!
//! ## Overview
//!
//! The state is loaded once at the start of a cycle and saved once at its
//! end. Cycles that abort never save, so a failed cycle leaves the previous
//! state untouched.

use crate::exclusion::ExclusionState;
use crate::{Result, SyncError};
use async_trait::async_trait;
use bridge_traits::SettingsStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Settings key holding the serialized exclusion state
pub const EXCLUSION_STATE_KEY: &str = "sync.exclusions";

// ============================================================================
// Repository Trait
// ============================================================================

/// Repository trait for exclusion state persistence
#[async_trait]
pub trait ExclusionRepository: Send + Sync {
    /// Load the stored state, or an empty state when none exists
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be read
    async fn load(&self) -> Result<ExclusionState>;

    /// Replace the stored state
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be written
    async fn save(&self, state: &ExclusionState) -> Result<()>;

    /// Forget everything
    async fn clear(&self) -> Result<()>;
}

// ============================================================================
// Settings Store Implementation
// ============================================================================

/// Stores the state as a JSON document in the host's `SettingsStore`
pub struct SettingsExclusionRepository {
    store: Arc<dyn SettingsStore>,
}

impl SettingsExclusionRepository {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ExclusionRepository for SettingsExclusionRepository {
    async fn load(&self) -> Result<ExclusionState> {
        let raw = self
            .store
            .get_string(EXCLUSION_STATE_KEY)
            .await
            .map_err(|e| SyncError::Persistence(e.to_string()))?;

        let Some(raw) = raw else {
            return Ok(ExclusionState::default());
        };

        match serde_json::from_str(&raw) {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable exclusion state");
                Ok(ExclusionState::default())
            }
        }
    }

    async fn save(&self, state: &ExclusionState) -> Result<()> {
        let raw =
            serde_json::to_string(state).map_err(|e| SyncError::Persistence(e.to_string()))?;

        self.store
            .set_string(EXCLUSION_STATE_KEY, &raw)
            .await
            .map_err(|e| SyncError::Persistence(e.to_string()))?;

        debug!(
            skipped = state.skipped.len(),
            already_exists = state.already_exists.len(),
            "Saved exclusion state"
        );
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.store
            .delete(EXCLUSION_STATE_KEY)
            .await
            .map_err(|e| SyncError::Persistence(e.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================
