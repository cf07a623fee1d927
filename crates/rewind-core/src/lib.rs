//! Rewind Core - Data model and deterministic movement for latency-tolerant netcode
//!
//! This crate provides the types shared by every side of a simulation:
//! - Identity types (`EntityId`, `BodyHandle`, `InputId`)
//! - Input samples and replicated entity state
//! - The replicated fixed-timestep `ServerClock`
//! - The deterministic movement function used for prediction, authority and replay
//! - The `PhysicsWorld` collaborator interface plus a flat reference world
//! - Protocol messages (`InputBatch`, `StateUpdate`, `ClockSync`, fire/hit events)
//! - RON-loadable `SimulationConfig`

mod config;
mod error;
mod identity;
mod input;
pub mod movement;
pub mod physics;
mod protocol;
mod state;
pub mod time;

pub use config::SimulationConfig;
pub use error::{Error, Result};
pub use identity::{BodyHandle, EntityId, InputId};
pub use input::{InputCommand, InputSample};
pub use movement::{apply_input, MovementConfig};
pub use physics::{CollisionFlags, FlatWorld, PhysicsWorld, Ray, RayHit, Sweep};
pub use protocol::{
    Channel, ClockSync, FireEvent, HitEvent, InputBatch, Message, Outbox, StateUpdate,
};
pub use state::{EntityState, Pose, RenderPose};
pub use time::{Frame, ServerClock};

pub use glam::{Quat, Vec3};
