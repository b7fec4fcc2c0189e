//! Watch progress computation.
//!
//! Progress is `position / duration * 100`. When the player cannot report a
//! duration, the library runtime of the item stands in for it.

use bridge_traits::PlaybackSource;

/// One reading of the player's position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    pub position_secs: f64,
    pub duration_secs: f64,
    /// Percent watched, clamped to 0-100
    pub percent: f64,
}

impl ProgressSample {
    pub fn new(position_secs: f64, player_duration_secs: f64, runtime_minutes: u32) -> Self {
        let duration_secs = effective_duration_secs(player_duration_secs, runtime_minutes);
        Self {
            position_secs,
            duration_secs,
            percent: compute_progress(position_secs, duration_secs),
        }
    }

    /// Samples the live player.
    pub fn read(source: &dyn PlaybackSource, runtime_minutes: u32) -> Self {
        Self::new(source.current_position(), source.duration(), runtime_minutes)
    }

    /// Whole percent, as sent to the remote service
    pub fn progress(&self) -> u8 {
        self.percent.floor() as u8
    }

    pub fn duration_minutes(&self) -> u32 {
        (self.duration_secs / 60.0).floor() as u32
    }

    pub fn reached(&self, threshold_percent: f64) -> bool {
        self.percent >= threshold_percent
    }
}

/// Player duration, or the library runtime when the player reports none.
pub fn effective_duration_secs(player_duration_secs: f64, runtime_minutes: u32) -> f64 {
    if player_duration_secs > 0.0 {
        player_duration_secs
    } else {
        f64::from(runtime_minutes) * 60.0
    }
}

/// Percent of `duration_secs` covered by `position_secs`.
///
/// An unknown duration yields 0.
pub fn compute_progress(position_secs: f64, duration_secs: f64) -> f64 {
    if duration_secs <= 0.0 || !position_secs.is_finite() {
        return 0.0;
    }
    (position_secs / duration_secs * 100.0).clamp(0.0, 100.0)
}
