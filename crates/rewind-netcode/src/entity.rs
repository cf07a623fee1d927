//! Predicted entity: shared state plus an interchangeable role
//!
//! Every networked body is a [`PredictedEntity`]: an [`EntityCore`] holding
//! the replicated state and the movement function, composed with one
//! [`Role`] chosen at construction:
//!
//! - [`LocalPredictor`](crate::LocalPredictor): captures input, predicts, reconciles
//! - [`RemoteObserver`](crate::RemoteObserver): interpolates toward received states
//! - [`ServerAuthority`](crate::ServerAuthority): applies received inputs, publishes state
//! - [`SelfHosted`](crate::SelfHosted): captures input and is authoritative for it

use glam::Vec3;
use rewind_core::{
    apply_input, BodyHandle, EntityId, EntityState, InputBatch, InputId, InputSample,
    MovementConfig, PhysicsWorld, RenderPose, StateUpdate, Sweep,
};
use rewind_sim::{Participant, TickContext};

/// State and movement shared by every role
#[derive(Debug, Clone)]
pub struct EntityCore {
    pub id: EntityId,
    pub body: BodyHandle,
    pub state: EntityState,
    pub movement: MovementConfig,
}

impl EntityCore {
    /// Create a core for `body`, starting at `state`
    pub fn new(id: EntityId, body: BodyHandle, state: EntityState, movement: MovementConfig) -> Self {
        Self {
            id,
            body,
            state,
            movement,
        }
    }

    /// Run the movement function for one input and keep the body pose in step
    pub fn apply(&mut self, input: &InputSample, dt: f32, world: &mut dyn PhysicsWorld) -> Sweep {
        let sweep = apply_input(&mut self.state, self.body, input, dt, &self.movement, world);
        self.sync_body(world);
        sweep
    }

    /// Write the current state's pose to the physics body
    pub fn sync_body(&self, world: &mut dyn PhysicsWorld) {
        world.set_pose(self.body, self.state.body_pose());
    }

    /// Where shots originate
    pub fn eye_position(&self) -> Vec3 {
        self.state.position + Vec3::Y * self.movement.eye_height
    }

    /// Authoritative state message for this entity
    pub fn state_update(&self) -> StateUpdate {
        StateUpdate {
            entity_id: self.id,
            state: self.state.clone(),
        }
    }
}

/// What happened to a received state update
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The role does not consume state updates
    Ignored,
    /// Older than what was already applied
    Stale,
    /// Snapped to the authority and replayed the unacknowledged inputs
    Reconciled {
        replayed: usize,
        /// Distance between the predicted and authoritative positions at the acknowledged input
        prediction_error: Option<f32>,
    },
    /// Local history could not cover the acknowledgement; prediction restarted from the authority
    Resynced {
        acknowledged: Option<InputId>,
        next_input_id: InputId,
    },
    /// First state: taken as-is
    Snapped,
    /// Blending toward the new state over `window` seconds
    Interpolating { window: f64 },
}

/// Accounting for one received input batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Samples queued for the next tick
    pub accepted: usize,
    /// Duplicates or samples at or below the high-water mark
    pub stale: usize,
    /// Queued samples evicted because the pending queue was full
    pub evicted: usize,
}

/// Per-role behaviour of a [`PredictedEntity`]
pub trait Role {
    /// Run one fixed tick
    fn tick(&mut self, core: &mut EntityCore, ctx: &mut TickContext<'_>);

    /// Handle an authoritative state for this entity
    fn on_state_update(
        &mut self,
        _core: &mut EntityCore,
        _state: &EntityState,
        _world: &mut dyn PhysicsWorld,
    ) -> UpdateOutcome {
        UpdateOutcome::Ignored
    }

    /// Handle inputs sent by this entity's controller; `received_at` is local network time
    fn on_input_batch(&mut self, _core: &mut EntityCore, _batch: &InputBatch, _received_at: f64) -> BatchReport {
        BatchReport::default()
    }

    /// Advance presentation by `dt` seconds of render time
    fn advance_render(&mut self, _core: &EntityCore, _dt: f64) {}

    /// The pose presentation should draw
    fn render_pose(&self, core: &EntityCore) -> RenderPose {
        RenderPose::from(&core.state)
    }
}

/// A networked body driven by its role
#[derive(Debug)]
pub struct PredictedEntity<R> {
    core: EntityCore,
    role: R,
}

impl<R: Role> PredictedEntity<R> {
    /// Compose a core with a role
    pub fn new(core: EntityCore, role: R) -> Self {
        Self { core, role }
    }

    /// Entity identifier
    pub fn id(&self) -> EntityId {
        self.core.id
    }

    /// Shared core
    pub fn core(&self) -> &EntityCore {
        &self.core
    }

    /// Current state
    pub fn state(&self) -> &EntityState {
        &self.core.state
    }

    /// The role
    pub fn role(&self) -> &R {
        &self.role
    }

    /// Mutable access to the role
    pub fn role_mut(&mut self) -> &mut R {
        &mut self.role
    }

    /// Deliver a state update; updates for other entities are ignored
    pub fn on_state_update(&mut self, update: &StateUpdate, world: &mut dyn PhysicsWorld) -> UpdateOutcome {
        if update.entity_id != self.core.id {
            return UpdateOutcome::Ignored;
        }
        self.role.on_state_update(&mut self.core, &update.state, world)
    }

    /// Deliver an input batch; batches from other senders are ignored
    pub fn on_input_batch(&mut self, batch: &InputBatch, received_at: f64) -> BatchReport {
        if batch.sender != self.core.id {
            return BatchReport::default();
        }
        self.role.on_input_batch(&mut self.core, batch, received_at)
    }

    /// Advance presentation
    pub fn advance_render(&mut self, dt: f64) {
        self.role.advance_render(&self.core, dt);
    }

    /// The pose presentation should draw
    pub fn render_pose(&self) -> RenderPose {
        self.role.render_pose(&self.core)
    }
}

impl<R: Role> Participant for PredictedEntity<R> {
    fn tick(&mut self, ctx: &mut TickContext<'_>) {
        self.role.tick(&mut self.core, ctx);
    }
}
