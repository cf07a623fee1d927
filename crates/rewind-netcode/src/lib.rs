//! Rewind Netcode - Prediction, reconciliation and lag compensation for player entities
//!
//! - **Prediction**: the local player's inputs are applied immediately
//! - **Reconciliation**: authoritative states are adopted and unacknowledged inputs replayed
//! - **Interpolation**: remote entities blend toward each received state
//! - **Authority**: the server applies received inputs once, in order, and publishes state
//! - **Hit resolution**: shots are evaluated against rewound body poses
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────── Client ────────────────┐        ┌──────────────── Server ─────────────────┐
//! │ InputSource → LocalPredictor ──────────┼ Input ─▶ ServerAuthority → StateUpdate ────────┐ │
//! │                    ▲                    │        │        │                              │ │
//! │                    └── reconcile ◀──────┼─ State ┼────────┼──────────────────────────────┘ │
//! │ RemoteObserver ◀── interpolate ◀────────┼─ State │        ▼                                │
//! │                                        │  Fire ─▶ resolve_fire ← LagCompensator          │
//! └────────────────────────────────────────┘        └─────────────────────────────────────────┘
//! ```
//!
//! Every role is hosted by a [`PredictedEntity`], which the simulation ticks
//! as a [`Participant`](rewind_sim::Participant).

mod authority;
mod combat;
mod entity;
mod error;
mod interpolation;
mod prediction;
mod transport;

pub use authority::{SelfHosted, ServerAuthority};
pub use combat::resolve_fire;
pub use entity::{BatchReport, EntityCore, PredictedEntity, Role, UpdateOutcome};
pub use error::{Error, Result};
pub use interpolation::{PoseInterpolator, RemoteObserver};
pub use prediction::{InputSource, LocalPredictor};
pub use transport::{decode, drain_incoming, encode, flush, Address, Connection, LoopbackConnection};
