//! Simulation - Fixed-timestep scheduler and participant registry
//!
//! The simulation owns the single replicated [`ServerClock`]. Each call to
//! [`Simulation::update`] accumulates real time and runs as many ticks as are
//! due, so a stalled frame is followed by a burst of catch-up ticks.
//!
//! Participants are reached through a [`SimulationHandle`] rather than a
//! global. The registry is copied before each tick pass: participants added
//! during a pass first tick on the next one, participants removed during a
//! pass are skipped for the rest of it.

use crate::error::{Error, Result};
use crate::lag::LagCompensator;
use indexmap::IndexMap;
use rewind_core::{ClockSync, Message, Outbox, PhysicsWorld, ServerClock, SimulationConfig};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, warn};

/// Unique identifier for a registered participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantId(pub u64);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Participant({})", self.0)
    }
}

/// Anything driven by the simulation tick
pub trait Participant {
    /// Run one fixed tick
    fn tick(&mut self, ctx: &mut TickContext<'_>);

    /// Called once when registered
    fn attached(&mut self, _simulation: &SimulationHandle, _id: ParticipantId) {}
}

/// What a participant sees during its tick
pub struct TickContext<'a> {
    /// Clock stamped for this tick: the frame being simulated and its nominal time
    pub clock: ServerClock,
    /// Fixed timestep, seconds
    pub timestep: f64,
    pub world: &'a mut dyn PhysicsWorld,
    pub outbox: &'a mut Outbox,
    pub simulation: &'a SimulationHandle,
}

impl TickContext<'_> {
    /// Timestep as the movement function consumes it
    pub fn dt(&self) -> f32 {
        self.timestep as f32
    }
}

/// Borrowed collaborators for one update
pub struct TickEnv<'a> {
    pub world: &'a mut dyn PhysicsWorld,
    pub outbox: &'a mut Outbox,
    /// Records a snapshot after every tick when present
    pub lag: Option<&'a mut LagCompensator>,
}

impl<'a> TickEnv<'a> {
    /// Environment without lag compensation
    pub fn new(world: &'a mut dyn PhysicsWorld, outbox: &'a mut Outbox) -> Self {
        Self {
            world,
            outbox,
            lag: None,
        }
    }

    /// Record tick snapshots into `lag`
    pub fn with_lag(mut self, lag: &'a mut LagCompensator) -> Self {
        self.lag = Some(lag);
        self
    }
}

type SharedParticipant = Rc<RefCell<dyn Participant>>;

#[derive(Default)]
struct Registry {
    participants: IndexMap<ParticipantId, SharedParticipant>,
    next_id: u64,
}

/// Shared handle to the participant registry
///
/// Cheap to clone. Registration and removal are allowed at any time,
/// including from inside a participant's tick.
#[derive(Clone, Default)]
pub struct SimulationHandle {
    registry: Rc<RefCell<Registry>>,
}

impl SimulationHandle {
    /// Register a participant; it is ticked after those registered before it
    pub fn register<P: Participant + 'static>(&self, participant: Rc<RefCell<P>>) -> ParticipantId {
        let id = {
            let mut registry = self.registry.borrow_mut();
            let id = ParticipantId(registry.next_id);
            registry.next_id += 1;
            let shared: SharedParticipant = participant.clone();
            registry.participants.insert(id, shared);
            id
        };

        match participant.try_borrow_mut() {
            Ok(mut p) => p.attached(self, id),
            Err(_) => warn!(participant = %id, "registered while borrowed, attach hook skipped"),
        }
        debug!(participant = %id, "registered");
        id
    }

    /// Remove a participant, preserving the order of the others
    pub fn unregister(&self, id: ParticipantId) -> Result<()> {
        self.registry
            .borrow_mut()
            .participants
            .shift_remove(&id)
            .map(|_| debug!(participant = %id, "unregistered"))
            .ok_or(Error::UnknownParticipant(id))
    }

    /// Whether `id` is currently registered
    pub fn contains(&self, id: ParticipantId) -> bool {
        self.registry.borrow().participants.contains_key(&id)
    }

    /// Number of registered participants
    pub fn len(&self) -> usize {
        self.registry.borrow().participants.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<(ParticipantId, SharedParticipant)> {
        self.registry
            .borrow()
            .participants
            .iter()
            .map(|(id, p)| (*id, Rc::clone(p)))
            .collect()
    }
}

impl fmt::Debug for SimulationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationHandle")
            .field("participants", &self.len())
            .finish()
    }
}

/// Which side of the connection this simulation runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationMode {
    /// Owns the clock and broadcasts it
    Authority,
    /// Follows the authority's clock
    Replica,
}

/// Fixed-timestep tick scheduler
pub struct Simulation {
    config: SimulationConfig,
    mode: SimulationMode,
    clock: ServerClock,
    handle: SimulationHandle,
    ticks_since_sync: u32,
}

impl Simulation {
    /// Create a simulation at frame 0
    pub fn new(config: SimulationConfig, mode: SimulationMode) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            mode,
            clock: ServerClock::new(),
            handle: SimulationHandle::default(),
            ticks_since_sync: 0,
        })
    }

    /// A handle to the participant registry
    pub fn handle(&self) -> SimulationHandle {
        self.handle.clone()
    }

    /// Register a participant
    pub fn register<P: Participant + 'static>(&self, participant: Rc<RefCell<P>>) -> ParticipantId {
        self.handle.register(participant)
    }

    /// Unregister a participant
    pub fn unregister(&self, id: ParticipantId) -> Result<()> {
        self.handle.unregister(id)
    }

    /// The replicated clock
    pub fn clock(&self) -> &ServerClock {
        &self.clock
    }

    /// Configuration in use
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Which side this simulation runs on
    pub fn mode(&self) -> SimulationMode {
        self.mode
    }

    /// Advance by `elapsed` seconds of real time, returning how many ticks ran
    pub fn update(&mut self, elapsed: f64, env: &mut TickEnv<'_>) -> u32 {
        self.clock.accumulate(elapsed);
        self.run_due_ticks(env)
    }

    /// Adopt a clock received from the authority and catch up
    ///
    /// `delay` is the time the message spent in transit; it is added to the
    /// received `since_last_tick` so the catch-up loop reaches the frame the
    /// authority has already simulated.
    pub fn apply_clock_sync(&mut self, sync: &ClockSync, delay: f64, env: &mut TickEnv<'_>) -> u32 {
        self.clock = ServerClock {
            frame_number: sync.frame_number,
            since_last_tick: sync.since_last_tick,
            network_time: sync.network_time,
        };
        self.clock.accumulate(delay);
        debug!(
            frame = sync.frame_number,
            network_time = sync.network_time,
            delay,
            "clock synchronized"
        );
        self.run_due_ticks(env)
    }

    fn run_due_ticks(&mut self, env: &mut TickEnv<'_>) -> u32 {
        let timestep = self.config.timestep;
        let mut ran = 0u32;
        while self.clock.is_tick_due(timestep) {
            let stamp = self.clock.tick_stamp(timestep);
            self.run_tick(stamp, env);
            self.clock.complete_tick(timestep);
            ran += 1;
        }

        if ran > self.config.stall_warning_ticks {
            warn!(
                ticks = ran,
                frame = self.clock.frame_number,
                "long catch-up after stall"
            );
        }

        if self.mode == SimulationMode::Authority && ran > 0 {
            self.ticks_since_sync += ran;
            if self.ticks_since_sync >= self.config.clock_sync_interval {
                self.ticks_since_sync = 0;
                env.outbox.push(Message::Clock(ClockSync::from(&self.clock)));
            }
        }
        ran
    }

    fn run_tick(&mut self, stamp: ServerClock, env: &mut TickEnv<'_>) {
        let timestep = self.config.timestep;
        for (id, participant) in self.handle.snapshot() {
            if !self.handle.contains(id) {
                continue;
            }
            let Ok(mut participant) = participant.try_borrow_mut() else {
                warn!(participant = %id, frame = stamp.frame_number, "re-entrant tick skipped");
                continue;
            };

            let mut ctx = TickContext {
                clock: stamp,
                timestep,
                world: &mut *env.world,
                outbox: &mut *env.outbox,
                simulation: &self.handle,
            };
            participant.tick(&mut ctx);
        }

        env.world.sync_transforms();
        if let Some(lag) = env.lag.as_deref_mut() {
            lag.record(stamp.frame_number, stamp.network_time, &*env.world);
        }
    }
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("mode", &self.mode)
            .field("clock", &self.clock)
            .field("participants", &self.handle.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rewind_core::FlatWorld;
    use rewind_core::Frame;

    /// Records the frames it was ticked on into a shared log
    struct Recorder {
        name: &'static str,
        log: Rc<RefCell<Vec<(&'static str, Frame)>>>,
    }

    impl Participant for Recorder {
        fn tick(&mut self, ctx: &mut TickContext<'_>) {
            self.log.borrow_mut().push((self.name, ctx.clock.frame_number));
        }
    }

    fn recorder(name: &'static str, log: &Rc<RefCell<Vec<(&'static str, Frame)>>>) -> Rc<RefCell<Recorder>> {
        Rc::new(RefCell::new(Recorder {
            name,
            log: Rc::clone(log),
        }))
    }

    fn config(timestep: f64) -> SimulationConfig {
        SimulationConfig::default().with_timestep(timestep)
    }

    #[test]
    fn test_catch_up_after_stall() {
        let mut world = FlatWorld::default();
        let mut outbox = Outbox::new();
        let mut sim = Simulation::new(config(0.25), SimulationMode::Replica).unwrap();
        let log = Rc::default();
        sim.register(recorder("a", &log));

        let mut env = TickEnv::new(&mut world, &mut outbox);
        assert_eq!(sim.update(0.1, &mut env), 0);
        assert_eq!(sim.update(1.0, &mut env), 4);

        assert_eq!(sim.clock().frame_number, 4);
        assert_relative_eq!(sim.clock().since_last_tick, 0.1, epsilon = 1e-9);
        let frames: Vec<_> = log.borrow().iter().map(|(_, f)| *f).collect();
        assert_eq!(frames, vec![0, 1, 2, 3]);
        // replicas never broadcast the clock
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_registration_order() {
        let mut world = FlatWorld::default();
        let mut outbox = Outbox::new();
        let mut sim = Simulation::new(config(0.1), SimulationMode::Replica).unwrap();
        let log = Rc::default();
        let a = sim.register(recorder("a", &log));
        sim.register(recorder("b", &log));
        sim.register(recorder("c", &log));
        sim.unregister(a).unwrap();

        sim.update(0.15, &mut TickEnv::new(&mut world, &mut outbox));
        assert_eq!(*log.borrow(), vec![("b", 0), ("c", 0)]);
        assert!(matches!(sim.unregister(a), Err(Error::UnknownParticipant(_))));
    }

    /// Unregisters a victim and registers a newcomer from inside its tick
    struct Mutator {
        victim: ParticipantId,
        newcomer: Option<Rc<RefCell<Recorder>>>,
    }

    impl Participant for Mutator {
        fn tick(&mut self, ctx: &mut TickContext<'_>) {
            if let Some(newcomer) = self.newcomer.take() {
                ctx.simulation.unregister(self.victim).unwrap();
                ctx.simulation.register(newcomer);
            }
        }
    }

    #[test]
    fn test_registry_mutation_during_tick() {
        let mut world = FlatWorld::default();
        let mut outbox = Outbox::new();
        let mut sim = Simulation::new(config(0.1), SimulationMode::Replica).unwrap();
        let log = Rc::default();

        let victim = ParticipantId(1);
        sim.register(Rc::new(RefCell::new(Mutator {
            victim,
            newcomer: Some(recorder("late", &log)),
        })));
        assert_eq!(sim.register(recorder("victim", &log)), victim);

        let mut env = TickEnv::new(&mut world, &mut outbox);
        sim.update(0.15, &mut env);
        // removed mid-pass: skipped; added mid-pass: waits for the next pass
        assert!(log.borrow().is_empty());

        sim.update(0.1, &mut env);
        assert_eq!(*log.borrow(), vec![("late", 1)]);
        assert_eq!(sim.handle().len(), 2);
    }

    #[test]
    fn test_authority_broadcasts_clock() {
        let mut world = FlatWorld::default();
        let mut outbox = Outbox::new();
        let mut cfg = config(0.1);
        cfg.clock_sync_interval = 2;
        let mut sim = Simulation::new(cfg, SimulationMode::Authority).unwrap();

        let mut env = TickEnv::new(&mut world, &mut outbox);
        sim.update(0.15, &mut env);
        assert!(env.outbox.is_empty());
        sim.update(0.1, &mut env);

        let messages: Vec<_> = outbox.drain().collect();
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            Message::Clock(sync) => assert_eq!(sync.frame_number, 2),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_clock_sync_catches_up_to_authority() {
        let mut world = FlatWorld::default();
        let mut outbox = Outbox::new();
        let mut authority = Simulation::new(config(0.3), SimulationMode::Authority).unwrap();
        let mut replica = Simulation::new(config(0.3), SimulationMode::Replica).unwrap();

        let mut env = TickEnv::new(&mut world, &mut outbox);
        authority.update(1.0, &mut env);
        let sync = ClockSync::from(authority.clock());

        // message arrives 0.7s later; the authority kept ticking meanwhile
        let delay = 0.7;
        authority.update(delay, &mut env);
        replica.apply_clock_sync(&sync, delay, &mut env);

        assert_eq!(replica.clock().frame_number, authority.clock().frame_number);
        assert_relative_eq!(replica.clock().network_time, authority.clock().network_time, epsilon = 1e-9);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let cfg = config(-1.0);
        assert!(matches!(
            Simulation::new(cfg, SimulationMode::Authority),
            Err(Error::Core(_))
        ));
    }
}
