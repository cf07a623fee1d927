//! Player input samples

use crate::identity::InputId;
use crate::time::Frame;
use serde::{Deserialize, Serialize};

/// One raw device reading, before it is stamped with an ID
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InputCommand {
    /// Strafe axis in `[-1, 1]`
    pub horizontal: f32,
    /// Forward axis in `[-1, 1]`
    pub vertical: f32,
    /// Yaw delta
    pub look_horizontal: f32,
    /// Pitch delta
    pub look_vertical: f32,
    pub jump: bool,
    pub fire: bool,
}

impl InputCommand {
    /// Create a movement-only command; axes are clamped to `[-1, 1]`
    pub fn movement(horizontal: f32, vertical: f32) -> Self {
        Self {
            horizontal,
            vertical,
            ..Self::default()
        }
        .sanitized()
    }

    /// Set the look deltas
    pub fn with_look(mut self, look_horizontal: f32, look_vertical: f32) -> Self {
        self.look_horizontal = look_horizontal;
        self.look_vertical = look_vertical;
        self.sanitized()
    }

    /// Set the jump flag
    pub fn with_jump(mut self, jump: bool) -> Self {
        self.jump = jump;
        self
    }

    /// Set the fire flag
    pub fn with_fire(mut self, fire: bool) -> Self {
        self.fire = fire;
        self
    }

    /// Clamp the movement axes into `[-1, 1]` and zero any non-finite value
    pub fn sanitized(mut self) -> Self {
        self.horizontal = clamp_axis(self.horizontal);
        self.vertical = clamp_axis(self.vertical);
        self.look_horizontal = finite_or_zero(self.look_horizontal);
        self.look_vertical = finite_or_zero(self.look_vertical);
        self
    }
}

/// An input command stamped by its controller
///
/// Immutable once created; `input_id` is strictly increasing per sender.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InputSample {
    pub input_id: InputId,
    pub command: InputCommand,
    /// Network time at capture, in seconds
    pub capture_time: f64,
    /// Authoritative frame the controller believed current at capture
    pub server_frame: Frame,
}

impl InputSample {
    /// Stamp a command
    pub fn new(input_id: InputId, command: InputCommand, capture_time: f64, server_frame: Frame) -> Self {
        Self {
            input_id,
            command: command.sanitized(),
            capture_time,
            server_frame,
        }
    }

    /// The sample with its command sanitized and a finite capture time
    ///
    /// Samples decoded off the wire never went through [`InputSample::new`].
    pub fn sanitized(self) -> Self {
        Self {
            command: self.command.sanitized(),
            capture_time: if self.capture_time.is_finite() { self.capture_time } else { 0.0 },
            ..self
        }
    }
}

fn clamp_axis(value: f32) -> f32 {
    finite_or_zero(value).clamp(-1.0, 1.0)
}

fn finite_or_zero(value: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
