//! Client-side prediction and reconciliation
//!
//! The local controller applies each captured input immediately, remembers
//! it in a fixed input history and keeps every unacknowledged input in a
//! small outstanding queue that is resent whole every tick.
//!
//! When an authoritative state arrives the controller snaps to it and
//! replays, in order, every input the authority has not applied yet.

use crate::entity::{EntityCore, Role, UpdateOutcome};
use glam::Vec3;
use rewind_core::{
    EntityState, FireEvent, InputBatch, InputCommand, InputId, InputSample, Message, PhysicsWorld,
    SimulationConfig,
};
use rewind_history::RingHistoryBuffer;
use rewind_sim::TickContext;
use std::collections::VecDeque;
use tracing::{debug, trace, warn};

/// Source of raw device input, polled once per tick
pub trait InputSource {
    /// Read the current input
    fn capture(&mut self) -> InputCommand;
}

impl<F> InputSource for F
where
    F: FnMut() -> InputCommand,
{
    fn capture(&mut self) -> InputCommand {
        self()
    }
}

/// Role of the entity controlled by the local player
pub struct LocalPredictor<S> {
    source: S,
    dt: f32,
    next_input_id: InputId,
    /// Every input applied locally, in id order
    inputs: RingHistoryBuffer<InputSample>,
    /// Predicted position after each entry of `inputs`
    positions: RingHistoryBuffer<Vec3>,
    /// Inputs not yet acknowledged, oldest first
    outstanding: VecDeque<InputSample>,
    outstanding_capacity: usize,
    /// Last authoritative state applied
    authoritative: Option<EntityState>,
}

impl<S: InputSource> LocalPredictor<S> {
    /// Create a predictor polling `source`
    pub fn new(source: S, config: &SimulationConfig) -> Self {
        Self {
            source,
            dt: config.timestep as f32,
            next_input_id: 0,
            inputs: RingHistoryBuffer::new(config.input_history),
            positions: RingHistoryBuffer::new(config.input_history),
            outstanding: VecDeque::with_capacity(config.outstanding_inputs),
            outstanding_capacity: config.outstanding_inputs,
            authoritative: None,
        }
    }

    /// Id the next captured input will get
    pub fn next_input_id(&self) -> InputId {
        self.next_input_id
    }

    /// Inputs awaiting acknowledgement, oldest first
    pub fn outstanding(&self) -> impl Iterator<Item = &InputSample> + '_ {
        self.outstanding.iter()
    }

    /// Number of inputs awaiting acknowledgement
    pub fn outstanding_len(&self) -> usize {
        self.outstanding.len()
    }

    /// Last authoritative state applied
    pub fn authoritative(&self) -> Option<&EntityState> {
        self.authoritative.as_ref()
    }

    /// The batch that would be sent now
    pub fn batch(&self, core: &EntityCore, sent_at: f64) -> InputBatch {
        InputBatch {
            sender: core.id,
            sent_at,
            samples: self.outstanding.iter().copied().collect(),
        }
    }

    fn is_stale(&self, state: &EntityState) -> bool {
        self.authoritative.as_ref().is_some_and(|prev| {
            state.last_input_processed < prev.last_input_processed
                || (state.last_input_processed == prev.last_input_processed
                    && state.server_frame <= prev.server_frame)
        })
    }

    fn acknowledge(&mut self, acknowledged: Option<InputId>) {
        let Some(acknowledged) = acknowledged else {
            return;
        };
        while self
            .outstanding
            .front()
            .is_some_and(|sample| sample.input_id <= acknowledged)
        {
            self.outstanding.pop_front();
        }
    }

    /// Inputs applied locally but not yet by the authority
    ///
    /// `None` when the acknowledgement is ahead of local history or the
    /// replay would reach past what the history still holds.
    fn unacknowledged_count(&self, acknowledged: Option<InputId>) -> Option<usize> {
        let first_pending = match acknowledged {
            Some(id) => id.checked_add(1)?,
            None => 0,
        };
        let count = self.next_input_id.checked_sub(first_pending)? as usize;
        (count <= self.inputs.retained()).then_some(count)
    }

    fn resync(&mut self, core: &mut EntityCore, state: &EntityState, world: &mut dyn PhysicsWorld) -> UpdateOutcome {
        let acknowledged = state.last_input_processed;
        if let Some(id) = acknowledged {
            self.next_input_id = self.next_input_id.max(id.saturating_add(1));
        }
        self.outstanding.clear();
        core.state = state.clone();
        core.sync_body(world);

        warn!(
            entity = %core.id,
            acknowledged = ?acknowledged,
            next_input_id = self.next_input_id,
            "acknowledgement outside local history, resynchronized"
        );
        UpdateOutcome::Resynced {
            acknowledged,
            next_input_id: self.next_input_id,
        }
    }
}

impl<S: InputSource> Role for LocalPredictor<S> {
    fn tick(&mut self, core: &mut EntityCore, ctx: &mut TickContext<'_>) {
        let command = self.source.capture();
        let sample = InputSample::new(
            self.next_input_id,
            command,
            ctx.clock.network_time,
            ctx.clock.frame_number,
        );
        self.next_input_id = self.next_input_id.wrapping_add(1);

        core.apply(&sample, self.dt, ctx.world);
        self.inputs.add_value(sample);
        self.positions.add_value(core.state.position);

        self.outstanding.push_back(sample);
        if self.outstanding.len() > self.outstanding_capacity {
            if let Some(evicted) = self.outstanding.pop_front() {
                trace!(entity = %core.id, input = evicted.input_id, "outstanding queue full, oldest input dropped");
            }
        }

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
        ctx.outbox
            .push(Message::Input(self.batch(core, ctx.clock.network_time)));
    }

    fn on_state_update(
        &mut self,
        core: &mut EntityCore,
        state: &EntityState,
        world: &mut dyn PhysicsWorld,
    ) -> UpdateOutcome {
        if self.is_stale(state) {
            trace!(entity = %core.id, frame = state.server_frame, "stale state update ignored");
            return UpdateOutcome::Stale;
        }
        self.authoritative = Some(state.clone());

        let acknowledged = state.last_input_processed;
        self.acknowledge(acknowledged);

        let Some(pending) = self.unacknowledged_count(acknowledged) else {
            return self.resync(core, state, world);
        };

        // predicted position right after the acknowledged input, if still held
        let prediction_error = acknowledged
            .filter(|_| pending < self.positions.retained())
            .map(|_| {
                let predicted = *self.positions.at_offset(-(pending as isize) - 1);
                predicted.distance(state.position)
            });

        core.state = state.clone();
        core.sync_body(world);

        for back in (1..=pending).rev() {
            let offset = -(back as isize);
            let sample = *self.inputs.at_offset(offset);
            core.apply(&sample, self.dt, world);
            let slot = self.positions.index(offset);
            if let Some(position) = self.positions.get_mut(slot) {
                *position = core.state.position;
            }
        }

        debug!(
            entity = %core.id,
            acknowledged = ?acknowledged,
            replayed = pending,
            error = ?prediction_error,
            "reconciled"
        );
        UpdateOutcome::Reconciled {
            replayed: pending,
            prediction_error,
        }
    }
}

impl<S> std::fmt::Debug for LocalPredictor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalPredictor")
            .field("next_input_id", &self.next_input_id)
            .field("outstanding", &self.outstanding.len())
            .finish()
    }
}
