//! Simulation configuration
//!
//! Loaded from RON, every field optional:
//!
//! ```
//! use rewind_core::SimulationConfig;
//!
//! let config = SimulationConfig::from_ron_str("(timestep: 0.05, snapshot_window: 120)").unwrap();
//! assert_eq!(config.timestep, 0.05);
//! assert_eq!(config.snapshot_window, 120);
//! assert_eq!(config.input_history, 300);
//! ```

use crate::error::{Error, Result};
use crate::movement::MovementConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Tick rate, buffer capacities and movement tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fixed timestep, seconds
    pub timestep: f64,
    /// Slots of local input and predicted-position history
    pub input_history: usize,
    /// Maximum inputs resent while unacknowledged
    pub outstanding_inputs: usize,
    /// Frame snapshots retained for rewind
    pub snapshot_window: usize,
    /// The authority broadcasts its clock every this many ticks
    pub clock_sync_interval: u32,
    /// Catch-up passes longer than this many ticks are logged as stalls
    pub stall_warning_ticks: u32,
    pub movement: MovementConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            timestep: 0.3,
            input_history: 300,
            outstanding_inputs: 30,
            snapshot_window: 60,
            clock_sync_interval: 1,
            stall_warning_ticks: 10,
            movement: MovementConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Parse a RON document and validate it
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let config: Self = ron::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_ron_str(&content)
    }

    /// Set the timestep
    pub fn with_timestep(mut self, timestep: f64) -> Self {
        self.timestep = timestep;
        self
    }

    /// Reject values the netcode cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.timestep.is_finite() && self.timestep > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "timestep must be positive, got {}",
                self.timestep
            )));
        }

        let capacities = [
            ("input_history", self.input_history),
            ("outstanding_inputs", self.outstanding_inputs),
            ("snapshot_window", self.snapshot_window),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{name} must be at least 1")));
            }
        }

        if self.clock_sync_interval == 0 {
            return Err(Error::InvalidConfig(
                "clock_sync_interval must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Seconds of history covered by the snapshot window
    pub fn rewind_window(&self) -> f64 {
        self.snapshot_window as f64 * self.timestep
    }
}
