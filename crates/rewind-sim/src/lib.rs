//! Rewind Sim - Authoritative tick scheduling and lag compensation
//!
//! ## Architecture
//!
//! ```text
//! Simulation (owns the replicated ServerClock)
//!  │
//!  ├── SimulationHandle ← passed to participants on registration
//!  │    └── Participant[] in registration order
//!  │
//!  └── per tick: participants → PhysicsWorld::sync_transforms → LagCompensator::record
//! ```
//!
//! ## Key Components
//!
//! - [`Simulation`]: fixed-timestep scheduler with multi-tick catch-up
//! - [`SimulationHandle`]: shared registry, safe to mutate from inside a tick
//! - [`Participant`]: anything ticked by the simulation
//! - [`LagCompensator`]: per-tick pose snapshots and transactional rewind

mod error;
pub mod lag;
mod simulation;

pub use error::{Error, Result};
pub use lag::{FrameSnapshot, LagCompensator, Rewind, Rewound};
pub use simulation::{
    Participant, ParticipantId, Simulation, SimulationHandle, SimulationMode, TickContext, TickEnv,
};
