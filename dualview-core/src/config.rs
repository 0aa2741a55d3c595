//! Synchronization toggles and engine tuning.

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Process-wide synchronization toggles set by the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SyncConfig {
    /// Mirror ROI edits onto the other side.
    pub synchronize_roi: bool,
    /// Keep slice positions in lockstep.
    pub synchronize_stack: bool,
    /// `left_index - right_index`, written only by stack calibration.
    pub delta_stack_index: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            synchronize_roi: true,
            synchronize_stack: true,
            delta_stack_index: 0,
        }
    }
}

impl SyncConfig {
    /// Creates a configuration with both toggles enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the ROI synchronization toggle.
    #[must_use]
    pub fn with_synchronize_roi(mut self, enabled: bool) -> Self {
        self.synchronize_roi = enabled;
        self
    }

    /// Sets the stack synchronization toggle.
    #[must_use]
    pub fn with_synchronize_stack(mut self, enabled: bool) -> Self {
        self.synchronize_stack = enabled;
        self
    }

    /// Sets the slice offset between the sides.
    #[must_use]
    pub fn with_delta_stack_index(mut self, delta: i64) -> Self {
        self.delta_stack_index = delta;
        self
    }

    /// ROI mirroring needs both toggles: copies are placed on the slice the
    /// other side is showing.
    #[must_use]
    pub fn is_roi_sync_active(&self) -> bool {
        self.synchronize_roi && self.synchronize_stack
    }
}

/// Bounded polling used to confirm an asynchronous slice load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StackPollPolicy {
    /// Maximum number of reads of the other side's slice index.
    pub attempts: u32,
    /// Delay between two reads, in milliseconds.
    pub interval_ms: u64,
}

impl Default for StackPollPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval_ms: 50,
        }
    }
}

impl StackPollPolicy {
    /// Delay between two reads.
    #[must_use]
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.interval_ms)
    }
}

/// Configuration of the comparison engine.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    pub sync: SyncConfig,
    /// Polygons below this area (pixel²) only qualify when closable.
    pub roi_area_epsilon: f64,
    pub stack_poll: StackPollPolicy,
    /// Method selector forwarded to the registration service.
    pub registration_method: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            roi_area_epsilon: 0.1,
            stack_poll: StackPollPolicy::default(),
            registration_method: "4".to_string(),
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the synchronization toggles.
    #[must_use]
    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    /// Sets the qualifying area threshold.
    #[must_use]
    pub fn with_roi_area_epsilon(mut self, epsilon: f64) -> Self {
        self.roi_area_epsilon = epsilon;
        self
    }

    /// Sets the slice-load polling policy.
    #[must_use]
    pub fn with_stack_poll(mut self, attempts: u32, interval_ms: u64) -> Self {
        self.stack_poll = StackPollPolicy {
            attempts,
            interval_ms,
        };
        self
    }

    /// Sets the registration method selector.
    #[must_use]
    pub fn with_registration_method(mut self, method: impl Into<String>) -> Self {
        self.registration_method = method.into();
        self
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a negative or non-finite area epsilon or
    /// a zero poll attempt count.
    pub fn validate(&self) -> Result<()> {
        if !(self.roi_area_epsilon.is_finite() && self.roi_area_epsilon >= 0.0) {
            return Err(Error::Config(format!(
                "roi_area_epsilon must be a non-negative number, got {}",
                self.roi_area_epsilon
            )));
        }
        if self.stack_poll.attempts == 0 {
            return Err(Error::Config(
                "stack_poll.attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::default();
        assert!(config.sync.is_roi_sync_active());
        assert_eq!(config.sync.delta_stack_index, 0);
        assert!((config.roi_area_epsilon - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.stack_poll.attempts, 10);
        assert_eq!(config.stack_poll.interval().as_millis(), 50);
        assert_eq!(config.registration_method, "4");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_engine_config_builders() {
        let config = EngineConfig::new()
            .with_sync(SyncConfig::new().with_synchronize_stack(false))
            .with_roi_area_epsilon(2.5)
            .with_stack_poll(3, 5)
            .with_registration_method("rigid");

        assert!(!config.sync.is_roi_sync_active());
        assert!((config.roi_area_epsilon - 2.5).abs() < f64::EPSILON);
        assert_eq!(config.stack_poll.attempts, 3);
        assert_eq!(config.registration_method, "rigid");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(EngineConfig::new()
            .with_roi_area_epsilon(-1.0)
            .validate()
            .is_err());
        assert!(EngineConfig::new().with_stack_poll(0, 50).validate().is_err());
    }
}
