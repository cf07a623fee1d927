//! Replicated fixed-timestep clock
//!
//! A single [`ServerClock`] exists per simulation. The authority advances it
//! from real elapsed time and replicates it; clients overwrite theirs from
//! [`ClockSync`](crate::ClockSync) messages and catch up locally.

use serde::{Deserialize, Serialize};

/// Authoritative frame number
pub type Frame = u32;

/// Fixed-timestep simulation clock
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ServerClock {
    /// Number of completed authoritative ticks
    pub frame_number: Frame,
    /// Real time accumulated since the last completed tick, in seconds
    pub since_last_tick: f64,
    /// Shared network time, in seconds
    pub network_time: f64,
}

impl ServerClock {
    /// Create a clock at frame 0 and network time 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate elapsed real time
    ///
    /// Negative or non-finite values are ignored.
    pub fn accumulate(&mut self, elapsed: f64) {
        if elapsed.is_finite() && elapsed > 0.0 {
            self.since_last_tick += elapsed;
            self.network_time += elapsed;
        }
    }

    /// Whether enough time accumulated to run another tick
    pub fn is_tick_due(&self, timestep: f64) -> bool {
        self.since_last_tick > timestep
    }

    /// Nominal network time at which the pending tick boundary was crossed
    ///
    /// Catch-up ticks run in the same pass each get their own, evenly spaced time.
    pub fn tick_time(&self, timestep: f64) -> f64 {
        self.network_time - (self.since_last_tick - timestep)
    }

    /// A copy of this clock stamped for the tick about to run
    pub fn tick_stamp(&self, timestep: f64) -> ServerClock {
        ServerClock {
            frame_number: self.frame_number,
            since_last_tick: 0.0,
            network_time: self.tick_time(timestep),
        }
    }

    /// Mark one tick as completed: advance the frame and consume one timestep
    pub fn complete_tick(&mut self, timestep: f64) {
        self.frame_number = self.frame_number.wrapping_add(1);
        self.since_last_tick -= timestep;
    }
}
