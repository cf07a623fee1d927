//! Pose interpolation for remote entities
//!
//! Observers never snap to a received state. Each new state starts a blend
//! from whatever is currently drawn toward the new pose, spread over the
//! server time that elapsed between the previous state and the new one.

use crate::entity::{EntityCore, Role, UpdateOutcome};
use rewind_core::{EntityState, PhysicsWorld, RenderPose};
use rewind_sim::TickContext;
use tracing::trace;

/// Blends a rendered pose toward a target over a time window
#[derive(Debug, Clone)]
pub struct PoseInterpolator {
    from: RenderPose,
    to: RenderPose,
    window: f64,
    elapsed: f64,
    current: RenderPose,
}

impl PoseInterpolator {
    /// Start at rest on `pose`
    pub fn new(pose: RenderPose) -> Self {
        Self {
            from: pose,
            to: pose,
            window: 0.0,
            elapsed: 0.0,
            current: pose,
        }
    }

    /// Blend from the current pose toward `target` over `window` seconds
    pub fn retarget(&mut self, target: RenderPose, window: f64) {
        self.from = self.current;
        self.to = target;
        self.window = window.max(0.0);
        self.elapsed = 0.0;
        if self.window == 0.0 {
            self.current = target;
        }
    }

    /// Jump to `pose` with no blend
    pub fn snap(&mut self, pose: RenderPose) {
        *self = Self::new(pose);
    }

    /// Advance render time
    pub fn advance(&mut self, dt: f64) {
        if dt <= 0.0 || !dt.is_finite() {
            return;
        }
        self.elapsed = (self.elapsed + dt).min(self.window);
        self.current = self.from.interpolate(&self.to, self.alpha());
    }

    /// Progress through the current window, from 0 to 1
    pub fn alpha(&self) -> f32 {
        if self.window > 0.0 {
            (self.elapsed / self.window) as f32
        } else {
            1.0
        }
    }

    /// Pose to draw now
    pub fn current(&self) -> RenderPose {
        self.current
    }

    /// Pose being blended toward
    pub fn target(&self) -> RenderPose {
        self.to
    }
}

/// Role of an entity controlled elsewhere and only displayed here
///
/// The first state received is adopted directly since there is nothing to
/// blend from. Every later state is interpolated toward, never snapped to.
#[derive(Debug, Clone, Default)]
pub struct RemoteObserver {
    interpolator: Option<PoseInterpolator>,
}

impl RemoteObserver {
    /// Create an observer that has not received any state yet
    pub fn new() -> Self {
        Self::default()
    }

    /// The interpolator, once the first state arrived
    pub fn interpolator(&self) -> Option<&PoseInterpolator> {
        self.interpolator.as_ref()
    }
}

impl Role for RemoteObserver {
    fn tick(&mut self, _core: &mut EntityCore, _ctx: &mut TickContext<'_>) {}

    fn on_state_update(
        &mut self,
        core: &mut EntityCore,
        state: &EntityState,
        world: &mut dyn PhysicsWorld,
    ) -> UpdateOutcome {
        let target = RenderPose::from(state);
        let outcome = match self.interpolator.as_mut() {
            None => {
                self.interpolator = Some(PoseInterpolator::new(target));
                UpdateOutcome::Snapped
            }
            Some(_) if state.network_time <= core.state.network_time => {
                trace!(entity = %core.id, frame = state.server_frame, "stale state update ignored");
                return UpdateOutcome::Stale;
            }
            Some(interpolator) => {
                let window = state.network_time - core.state.network_time;
                interpolator.retarget(target, window);
                UpdateOutcome::Interpolating { window }
            }
        };

        core.state = state.clone();
        core.sync_body(world);
        outcome
    }

    fn advance_render(&mut self, _core: &EntityCore, dt: f64) {
        if let Some(interpolator) = self.interpolator.as_mut() {
            interpolator.advance(dt);
        }
    }

    fn render_pose(&self, core: &EntityCore) -> RenderPose {
        self.interpolator
            .as_ref()
            .map_or_else(|| RenderPose::from(&core.state), PoseInterpolator::current)
    }
}
