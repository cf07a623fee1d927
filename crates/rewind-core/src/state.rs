//! Replicated entity state and poses

use crate::identity::InputId;
use crate::time::Frame;
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Position and orientation of a body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Pose {
    /// Create a pose
    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Blend toward `other`: linear for position, spherical for orientation
    pub fn interpolate(&self, other: &Pose, alpha: f32) -> Pose {
        Pose {
            position: self.position.lerp(other.position, alpha),
            orientation: self.orientation.slerp(other.orientation, alpha),
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Quat::IDENTITY)
    }
}

/// Kinematic and bookkeeping state of one controlled body
///
/// The authority owns the authoritative copy; clients hold a predicted copy
/// plus the last authoritative copy they received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Yaw-only body rotation
    pub body_orientation: Quat,
    /// Pitch-only rotation of the look direction, relative to the body
    pub look_orientation: Quat,
    /// Ground contact reported by the last sweep
    pub grounded: bool,
    /// Authoritative frame this state was produced on
    pub server_frame: Frame,
    /// Network time this state was produced at
    pub network_time: f64,
    /// Highest input applied by the authority, `None` before the first one
    pub last_input_processed: Option<InputId>,
}

impl EntityState {
    /// A resting state at `position`
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// The body pose tracked by physics and lag compensation
    pub fn body_pose(&self) -> Pose {
        Pose::new(self.position, self.body_orientation)
    }

    /// World-space aim direction (body yaw then look pitch)
    pub fn aim_direction(&self) -> Vec3 {
        (self.body_orientation * self.look_orientation) * Vec3::Z
    }

    /// Whether the kinematic fields match exactly
    pub fn same_kinematics(&self, other: &EntityState) -> bool {
        self.position == other.position
            && self.velocity == other.velocity
            && self.body_orientation == other.body_orientation
            && self.look_orientation == other.look_orientation
            && self.grounded == other.grounded
    }
}

impl Default for EntityState {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            body_orientation: Quat::IDENTITY,
            look_orientation: Quat::IDENTITY,
            grounded: false,
            server_frame: 0,
            network_time: 0.0,
            last_input_processed: None,
        }
    }
}

/// What presentation draws for an entity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPose {
    pub position: Vec3,
    pub body_orientation: Quat,
    pub look_orientation: Quat,
}

impl RenderPose {
    /// Blend toward `other`: linear for position, spherical for orientations
    pub fn interpolate(&self, other: &RenderPose, alpha: f32) -> RenderPose {
        RenderPose {
            position: self.position.lerp(other.position, alpha),
            body_orientation: self.body_orientation.slerp(other.body_orientation, alpha),
            look_orientation: self.look_orientation.slerp(other.look_orientation, alpha),
        }
    }
}

impl From<&EntityState> for RenderPose {
    fn from(state: &EntityState) -> Self {
        Self {
            position: state.position,
            body_orientation: state.body_orientation,
            look_orientation: state.look_orientation,
        }
    }
}
