//! Deterministic character movement
//!
//! [`apply_input`] is the single movement function shared by local prediction,
//! authoritative simulation and reconciliation replay. Given the same state,
//! input sample, timestep and world response it produces bit-identical output,
//! so it must stay free of hidden state, randomness and wall-clock reads.
//!
//! Conventions: forward is `+Z` and right is `+X` in body space.

use crate::identity::BodyHandle;
use crate::input::InputSample;
use crate::physics::{PhysicsWorld, Sweep};
use crate::state::EntityState;
use glam::{EulerRot, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Tuning for [`apply_input`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Cap on horizontal velocity magnitude
    pub max_speed: f32,
    /// Multiplier applied to velocity when computing the sweep displacement
    pub displacement_scale: f32,
    /// Yaw rate per unit of horizontal look input, degrees per second
    pub yaw_speed: f32,
    /// Pitch rate per unit of vertical look input, degrees per second
    pub pitch_speed: f32,
    /// Maximum absolute pitch, degrees
    pub pitch_limit: f32,
    /// Vertical velocity set by a grounded jump
    pub jump_velocity: f32,
    /// Downward acceleration
    pub gravity: f32,
    /// Height of the aim origin above the body position
    pub eye_height: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            max_speed: 3.0,
            displacement_scale: 3.0,
            yaw_speed: 90.0,
            pitch_speed: 45.0,
            pitch_limit: 89.0,
            jump_velocity: 3.0,
            gravity: 5.0,
            eye_height: 0.6,
        }
    }
}

/// Apply one input sample to `state`, moving `body` through `world`
///
/// Steps, in order: yaw from the horizontal look delta, clamped pitch from the
/// vertical look delta, jump and gravity, horizontal velocity from the input
/// axes against the current forward/right basis, horizontal speed clamp, the
/// collision sweep, and finally zeroing vertical velocity on a downward contact
/// while still descending.
pub fn apply_input(
    state: &mut EntityState,
    body: BodyHandle,
    input: &InputSample,
    dt: f32,
    config: &MovementConfig,
    world: &mut dyn PhysicsWorld,
) -> Sweep {
    let command = &input.command;

    let yaw = (command.look_horizontal * config.yaw_speed * dt).to_radians();
    state.body_orientation = (state.body_orientation * Quat::from_rotation_y(yaw)).normalize();

    let limit = config.pitch_limit.to_radians();
    let pitch = pitch_of(state.look_orientation)
        + (-command.look_vertical * config.pitch_speed * dt).to_radians();
    state.look_orientation = Quat::from_rotation_x(pitch.clamp(-limit, limit));

    if state.grounded && command.jump {
        state.velocity.y = config.jump_velocity;
    }
    state.velocity.y -= config.gravity * dt;

    let forward = state.body_orientation * Vec3::Z;
    let right = state.body_orientation * Vec3::X;
    let planar = forward * command.vertical + right * command.horizontal;
    state.velocity.x = planar.x;
    state.velocity.z = planar.z;

    let magnitude = (state.velocity.x * state.velocity.x + state.velocity.z * state.velocity.z).sqrt();
    if magnitude > config.max_speed {
        state.velocity.x = state.velocity.x / magnitude * config.max_speed;
        state.velocity.z = state.velocity.z / magnitude * config.max_speed;
    }

    let displacement = state.velocity * dt * config.displacement_scale;
    let sweep = world.sweep_move(body, state.position, displacement);
    state.position = sweep.position;
    state.grounded = sweep.flags.below;
    if sweep.flags.below && state.velocity.y < 0.0 {
        state.velocity.y = 0.0;
    }

    sweep
}

fn pitch_of(look: Quat) -> f32 {
    look.to_euler(EulerRot::XYZ).0
}
