//! Server-side roles
//!
//! [`ServerAuthority`] owns an entity controlled by a remote client: it
//! queues the inputs it receives, applies them on the next tick through the
//! shared movement function and publishes the resulting state. Inputs are
//! sanitized on arrival. Shots are built from the authority's own pose right
//! after the firing input is applied; the client's [`FireEvent`] carries no
//! weight here.
//!
//! [`SelfHosted`] is the entity of a player running the authority locally.

use crate::entity::{BatchReport, EntityCore, Role};
use crate::prediction::InputSource;
use rewind_core::{FireEvent, InputBatch, InputId, InputSample, Message, SimulationConfig};
use rewind_sim::TickContext;
use std::collections::VecDeque;
use tracing::{debug, trace};

/// Weight of a new one-way delay sample in the smoothed latency
const LATENCY_SMOOTHING: f64 = 0.2;

/// Role of a remotely controlled entity on the authority
#[derive(Debug)]
pub struct ServerAuthority {
    /// Inputs received but not yet applied, in id order
    pending: VecDeque<InputSample>,
    capacity: usize,
    /// Smoothed one-way delay of input batches, seconds
    latency: Option<f64>,
    /// Shots fired by applied inputs, waiting for resolution
    shots: Vec<FireEvent>,
}

impl ServerAuthority {
    /// Create an authority role
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            pending: VecDeque::new(),
            capacity: config.input_history,
            latency: None,
            shots: Vec::new(),
        }
    }

    /// Inputs waiting for the next tick
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Smoothed one-way input latency, if any batch arrived yet
    pub fn latency(&self) -> Option<f64> {
        self.latency
    }

    /// Network time a shot should be evaluated at
    pub fn rewind_time_for(&self, fire: &FireEvent) -> f64 {
        fire.capture_time - self.latency.unwrap_or(0.0)
    }

    /// Take the shots fired since the last call, oldest first
    pub fn take_shots(&mut self) -> Vec<FireEvent> {
        std::mem::take(&mut self.shots)
    }

    fn high_water_mark(&self, core: &EntityCore) -> Option<InputId> {
        let queued = self.pending.back().map(|sample| sample.input_id);
        core.state.last_input_processed.max(queued)
    }

    fn observe_latency(&mut self, sent_at: f64, received_at: f64) {
        let sample = (received_at - sent_at).max(0.0);
        if !sample.is_finite() {
            return;
        }
        self.latency = Some(match self.latency {
            Some(current) => current + (sample - current) * LATENCY_SMOOTHING,
            None => sample,
        });
    }
}

impl Role for ServerAuthority {
    fn tick(&mut self, core: &mut EntityCore, ctx: &mut TickContext<'_>) {
        let dt = ctx.dt();
        let applied = self.pending.len();
        while let Some(sample) = self.pending.pop_front() {
            core.apply(&sample, dt, ctx.world);
            core.state.last_input_processed = core.state.last_input_processed.max(Some(sample.input_id));
            if sample.command.fire {
                self.shots.push(FireEvent {
                    shooter: core.id,
                    input_id: sample.input_id,
                    origin: core.eye_position(),
                    direction: core.state.aim_direction(),
                    // a client cannot ask for a rewind into the future
                    capture_time: sample.capture_time.min(ctx.clock.network_time),
                    server_frame: ctx.clock.frame_number,
                });
            }
        }

        core.state.server_frame = ctx.clock.frame_number;
        core.state.network_time = ctx.clock.network_time;
        if applied > 0 {
            trace!(
                entity = %core.id,
                applied,
                last = ?core.state.last_input_processed,
                "inputs applied"
            );
        }
        ctx.outbox.push(Message::State(core.state_update()));
    }

    fn on_input_batch(&mut self, core: &mut EntityCore, batch: &InputBatch, received_at: f64) -> BatchReport {
        self.observe_latency(batch.sent_at, received_at);

        let mut report = BatchReport::default();
        for sample in &batch.samples {
            if self
                .high_water_mark(core)
                .is_some_and(|mark| sample.input_id <= mark)
            {
                report.stale += 1;
                continue;
            }

            self.pending.push_back(sample.sanitized());
            report.accepted += 1;
            if self.pending.len() > self.capacity {
                self.pending.pop_front();
                report.evicted += 1;
            }
        }

        if report.stale > 0 {
            trace!(entity = %core.id, stale = report.stale, "duplicate inputs dropped");
        }
        if report.evicted > 0 {
            debug!(entity = %core.id, evicted = report.evicted, "pending input queue overflowed");
        }
        report
    }
}

/// Role of the local player's entity when this process is the authority
///
/// Captures and applies input like a predictor, but its state is already
/// authoritative: every tick publishes it with its own newest input as the
/// acknowledgement.
pub struct SelfHosted<S> {
    source: S,
    next_input_id: InputId,
}

impl<S: InputSource> SelfHosted<S> {
    /// Create a self-hosted role polling `source`
    pub fn new(source: S) -> Self {
        Self {
            source,
            next_input_id: 0,
        }
    }

    /// Id the next captured input will get
    pub fn next_input_id(&self) -> InputId {
        self.next_input_id
    }
}

impl<S: InputSource> Role for SelfHosted<S> {
    fn tick(&mut self, core: &mut EntityCore, ctx: &mut TickContext<'_>) {
        let sample = InputSample::new(
            self.next_input_id,
            self.source.capture(),
            ctx.clock.network_time,
            ctx.clock.frame_number,
        );
        self.next_input_id = self.next_input_id.wrapping_add(1);

        core.apply(&sample, ctx.dt(), ctx.world);
        core.state.last_input_processed = Some(sample.input_id);
        core.state.server_frame = ctx.clock.frame_number;
        core.state.network_time = ctx.clock.network_time;

        if sample.command.fire {
            ctx.outbox.push(Message::Fire(FireEvent {
                shooter: core.id,
                input_id: sample.input_id,
                origin: core.eye_position(),
                direction: core.state.aim_direction(),
                capture_time: sample.capture_time,
                server_frame: sample.server_frame,
            }));
        }
        ctx.outbox.push(Message::State(core.state_update()));
    }
}

impl<S> std::fmt::Debug for SelfHosted<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelfHosted")
            .field("next_input_id", &self.next_input_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::PredictedEntity;
    use approx::assert_relative_eq;
    use rewind_core::{
        EntityId, EntityState, FlatWorld, InputCommand, MovementConfig, Outbox, Pose, ServerClock,
    };
    use rewind_sim::{Participant, SimulationHandle};

    const ENTITY: EntityId = EntityId(3);

    fn entity<R: Role>(world: &mut FlatWorld, role: R) -> PredictedEntity<R> {
        let body = world.spawn(Pose::default(), 0.0);
        PredictedEntity::new(
            EntityCore::new(ENTITY, body, EntityState::default(), MovementConfig::default()),
            role,
        )
    }

    fn batch(ids: impl IntoIterator<Item = InputId>, sent_at: f64) -> InputBatch {
        InputBatch {
            sender: ENTITY,
            sent_at,
            samples: ids
                .into_iter()
                .map(|id| InputSample::new(id, InputCommand::movement(0.0, 1.0), 0.0, 0))
                .collect(),
        }
    }

    fn tick<R: Role>(world: &mut FlatWorld, outbox: &mut Outbox, entity: &mut PredictedEntity<R>, frame: u32) {
        let handle = SimulationHandle::default();
        let mut ctx = TickContext {
            clock: ServerClock {
                frame_number: frame,
                since_last_tick: 0.0,
                network_time: frame as f64 * 0.3,
            },
            timestep: 0.3,
            world,
            outbox,
            simulation: &handle,
        };
        entity.tick(&mut ctx);
    }

    #[test]
    fn test_overlapping_batches_are_deduplicated() {
        let config = SimulationConfig::default();
        let mut world = FlatWorld::default();
        let mut server = entity(&mut world, ServerAuthority::new(&config));

        let first = server.on_input_batch(&batch(0..3, 0.0), 0.1);
        assert_eq!(first.accepted, 3);
        let second = server.on_input_batch(&batch(0..5, 0.0), 0.1);
        assert_eq!(second, BatchReport { accepted: 2, stale: 3, evicted: 0 });
        assert_eq!(server.role().pending(), 5);
    }

    #[test]
    fn test_last_input_processed_never_regresses() {
        let config = SimulationConfig::default();
        let mut world = FlatWorld::default();
        let mut outbox = Outbox::new();
        let mut server = entity(&mut world, ServerAuthority::new(&config));

        // applied in order, then duplicated and out-of-order batches
        let deliveries = [
            batch(0..4, 0.0),
            batch(2..6, 0.0),
            batch(0..3, 0.0),
            batch(5..6, 0.0),
            batch(4..9, 0.0),
            batch(1..2, 0.0),
        ];
        let mut previous = None;
        for (frame, delivery) in deliveries.iter().enumerate() {
            server.on_input_batch(delivery, 0.0);
            tick(&mut world, &mut outbox, &mut server, frame as u32);
            let current = server.state().last_input_processed;
            assert!(current >= previous, "{current:?} < {previous:?}");
            previous = current;
        }
        assert_eq!(previous, Some(8));
    }

    #[test]
    fn test_first_input_id_zero_is_applied() {
        let config = SimulationConfig::default();
        let mut world = FlatWorld::default();
        let mut outbox = Outbox::new();
        let mut server = entity(&mut world, ServerAuthority::new(&config));

        server.on_input_batch(&batch([0], 0.0), 0.0);
        tick(&mut world, &mut outbox, &mut server, 0);
        assert_eq!(server.state().last_input_processed, Some(0));
        assert!(server.state().position.z > 0.0);
    }

    #[test]
    fn test_publishes_state_each_tick() {
        let config = SimulationConfig::default();
        let mut world = FlatWorld::default();
        let mut outbox = Outbox::new();
        let mut server = entity(&mut world, ServerAuthority::new(&config));

        tick(&mut world, &mut outbox, &mut server, 4);
        let messages: Vec<_> = outbox.drain().collect();
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            Message::State(update) => {
                assert_eq!(update.entity_id, ENTITY);
                assert_eq!(update.state.server_frame, 4);
                assert_eq!(update.state.last_input_processed, None);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_pending_queue_evicts_oldest() {
        let config = SimulationConfig {
            input_history: 4,
            ..SimulationConfig::default()
        };
        let mut world = FlatWorld::default();
        let mut server = entity(&mut world, ServerAuthority::new(&config));

        let report = server.on_input_batch(&batch(0..6, 0.0), 0.0);
        assert_eq!(report.accepted, 6);
        assert_eq!(report.evicted, 2);
        assert_eq!(server.role().pending(), 4);
    }

    #[test]
    fn test_latency_and_rewind_time() {
        let config = SimulationConfig::default();
        let mut world = FlatWorld::default();
        let mut server = entity(&mut world, ServerAuthority::new(&config));

        server.on_input_batch(&batch([0], 1.0), 1.5);
        assert_relative_eq!(server.role().latency().unwrap(), 0.5);
        server.on_input_batch(&batch([1], 2.0), 2.0);
        assert_relative_eq!(server.role().latency().unwrap(), 0.4, epsilon = 1e-9);

        let fire = FireEvent {
            shooter: ENTITY,
            input_id: 1,
            origin: glam::Vec3::ZERO,
            direction: glam::Vec3::Z,
            capture_time: 10.0,
            server_frame: 33,
        };
        assert_relative_eq!(server.role().rewind_time_for(&fire), 9.6, epsilon = 1e-9);
    }

    #[test]
    fn test_decoded_input_is_sanitized() {
        let config = SimulationConfig::default();
        let mut world = FlatWorld::default();
        let mut outbox = Outbox::new();
        let mut server = entity(&mut world, ServerAuthority::new(&config));

        let forged = InputSample {
            input_id: 0,
            command: InputCommand {
                horizontal: 50.0,
                look_horizontal: f32::NAN,
                ..InputCommand::default()
            },
            capture_time: 0.0,
            server_frame: 0,
        };
        let batch = InputBatch {
            sender: ENTITY,
            sent_at: 0.0,
            samples: vec![forged],
        };
        server.on_input_batch(&batch, 0.0);
        tick(&mut world, &mut outbox, &mut server, 0);

        let state = server.state();
        assert!(state.position.is_finite());
        assert!(state.body_orientation.is_finite());
        assert!(state.look_orientation.is_finite());
        let max_step = config.movement.max_speed * 0.3;
        assert!(state.position.x > 0.0);
        assert!(state.position.x <= max_step + 1e-5);
    }

    #[test]
    fn test_shots_come_from_the_authoritys_own_pose() {
        let config = SimulationConfig::default();
        let mut world = FlatWorld::default();
        let mut outbox = Outbox::new();
        let mut server = entity(&mut world, ServerAuthority::new(&config));

        let samples = vec![
            InputSample::new(0, InputCommand::movement(0.0, 1.0), 0.0, 0),
            InputSample::new(1, InputCommand::movement(1.0, 0.0).with_fire(true), 100.0, 0),
        ];
        server.on_input_batch(&InputBatch { sender: ENTITY, sent_at: 0.0, samples }, 0.0);
        assert!(server.role_mut().take_shots().is_empty());
        tick(&mut world, &mut outbox, &mut server, 2);

        let shots = server.role_mut().take_shots();
        assert_eq!(shots.len(), 1);
        let shot = shots[0];
        assert_eq!(shot.shooter, ENTITY);
        assert_eq!(shot.input_id, 1);
        assert_eq!(shot.origin, server.core().eye_position());
        assert_eq!(shot.direction, server.state().aim_direction());
        assert_eq!(shot.server_frame, 2);
        assert_relative_eq!(shot.capture_time, 0.6, epsilon = 1e-9);
        assert!(server.role_mut().take_shots().is_empty());
        // shots stay on the authority
        assert!(outbox.drain().all(|m| matches!(m, Message::State(_))));
    }

    #[test]
    fn test_self_hosted_acknowledges_its_own_inputs() {
        let mut world = FlatWorld::default();
        let mut outbox = Outbox::new();
        let mut host = entity(
            &mut world,
            SelfHosted::new(|| InputCommand::movement(1.0, 0.0).with_fire(true)),
        );

        tick(&mut world, &mut outbox, &mut host, 0);
        tick(&mut world, &mut outbox, &mut host, 1);

        assert_eq!(host.state().last_input_processed, Some(1));
        assert!(host.state().position.x > 0.0);
        let messages: Vec<_> = outbox.drain().collect();
        assert!(matches!(messages[0], Message::Fire(_)));
        assert!(matches!(messages[1], Message::State(_)));
        assert_eq!(messages.len(), 4);
    }
}
