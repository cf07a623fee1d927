//! Loopback Arena Example
//!
//! Runs an authoritative server and one predicting client in the same
//! process, connected by an in-memory link that delays every message and
//! duplicates datagrams. The client controls player 1; player 2 is hosted on
//! the server and shows up on the client as an interpolated observer.
//!
//! ```text
//! cargo run -p loopback_arena [config.ron]
//! RUST_LOG=rewind_netcode=debug cargo run -p loopback_arena
//! ```

use rewind_core::{
    EntityId, EntityState, FlatWorld, InputCommand, Message, Outbox, PhysicsWorld, Pose,
    SimulationConfig, Vec3,
};
use rewind_netcode::{
    drain_incoming, flush, resolve_fire, EntityCore, LocalPredictor, LoopbackConnection,
    PredictedEntity, RemoteObserver, SelfHosted, ServerAuthority, UpdateOutcome,
};
use rewind_sim::{LagCompensator, Simulation, SimulationMode, TickEnv};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CLIENT_PLAYER: EntityId = EntityId(1);
const HOSTED_PLAYER: EntityId = EntityId(2);
const RENDER_DT: f64 = 1.0 / 60.0;
const ONE_WAY_DELAY: f64 = 0.45;
const DURATION: f64 = 12.0;
const BODY_RADIUS: f32 = 0.5;

type Source = Box<dyn FnMut() -> InputCommand>;

/// Messages waiting out the simulated link delay
#[derive(Default)]
struct DelayLine {
    queue: VecDeque<(f64, Message)>,
}

impl DelayLine {
    fn push(&mut self, now: f64, message: Message) {
        self.queue.push_back((now + ONE_WAY_DELAY, message));
    }

    fn due(&mut self, now: f64) -> Vec<Message> {
        let mut due = Vec::new();
        while self.queue.front().is_some_and(|(at, _)| *at <= now) {
            if let Some((_, message)) = self.queue.pop_front() {
                due.push(message);
            }
        }
        due
    }
}

/// Circles forward and left, firing every 12th input
fn client_input() -> Source {
    let mut n = 0u32;
    Box::new(move || {
        n += 1;
        InputCommand::movement(0.0, 1.0)
            .with_look(4.0, 0.0)
            .with_fire(n % 12 == 0)
    })
}

/// Strafes back and forth across the arena
fn hosted_input() -> Source {
    let mut n = 0u32;
    Box::new(move || {
        n += 1;
        let direction = if (n / 10) % 2 == 0 { 1.0 } else { -1.0 };
        InputCommand::movement(direction, 0.0)
    })
}

fn spawn(world: &mut FlatWorld, id: EntityId, at: Vec3, config: &SimulationConfig) -> EntityCore {
    let body = world.spawn(Pose::new(at, Default::default()), BODY_RADIUS);
    let mut state = EntityState::at(at);
    state.position.y = world.ground_height() + BODY_RADIUS;
    EntityCore::new(id, body, state, config.movement.clone())
}

fn load_config() -> SimulationConfig {
    let Some(path) = std::env::args().nth(1) else {
        return SimulationConfig::default();
    };
    match SimulationConfig::load(&path) {
        Ok(config) => {
            info!(%path, "loaded configuration");
            config
        }
        Err(e) => {
            warn!(%path, error = %e, "falling back to default configuration");
            SimulationConfig::default()
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Rewind Loopback Arena ===\n");
    let config = load_config();
    info!(
        timestep = config.timestep,
        rewind_window = config.rewind_window(),
        "simulation configured"
    );
    let (client_link, server_link) = LoopbackConnection::pair("client", "server");
    let client_link = client_link.duplicate_unreliable(true);
    let server_link = server_link.duplicate_unreliable(true);

    // Server side
    let mut server_world = FlatWorld::new(0.0);
    let mut server_outbox = Outbox::new();
    let mut server_sim = Simulation::new(config.clone(), SimulationMode::Authority)?;
    let mut lag = LagCompensator::new(config.timestep, config.snapshot_window);

    let remote = spawn(&mut server_world, CLIENT_PLAYER, Vec3::ZERO, &config);
    lag.track(remote.body);
    let remote = Rc::new(RefCell::new(PredictedEntity::new(remote, ServerAuthority::new(&config))));
    server_sim.register(Rc::clone(&remote));

    let hosted = spawn(&mut server_world, HOSTED_PLAYER, Vec3::new(0.0, 0.0, 8.0), &config);
    lag.track(hosted.body);
    let hosted = Rc::new(RefCell::new(PredictedEntity::new(hosted, SelfHosted::new(hosted_input()))));
    server_sim.register(Rc::clone(&hosted));

    // Client side
    let mut client_world = FlatWorld::new(0.0);
    let mut client_outbox = Outbox::new();
    let mut client_sim = Simulation::new(config.clone(), SimulationMode::Replica)?;

    let local = spawn(&mut client_world, CLIENT_PLAYER, Vec3::ZERO, &config);
    let local = Rc::new(RefCell::new(PredictedEntity::new(
        local,
        LocalPredictor::new(client_input(), &config),
    )));
    client_sim.register(Rc::clone(&local));

    let observed = spawn(&mut client_world, HOSTED_PLAYER, Vec3::new(0.0, 0.0, 8.0), &config);
    let observed = Rc::new(RefCell::new(PredictedEntity::new(observed, RemoteObserver::new())));

    let mut to_server = DelayLine::default();
    let mut to_client = DelayLine::default();
    let mut now = 0.0;
    let mut next_report = 1.0;
    let mut replayed = 0usize;
    let mut resyncs = 0usize;
    let mut hits = 0usize;
    let mut shots = 0usize;

    while now < DURATION {
        now += RENDER_DT;

        // client frame
        client_sim.update(RENDER_DT, &mut TickEnv::new(&mut client_world, &mut client_outbox));
        flush(&mut client_outbox, &client_link)?;

        // server frame
        for message in drain_incoming(&server_link)? {
            to_server.push(now, message);
        }
        for message in to_server.due(now) {
            match message {
                Message::Input(batch) => {
                    let received_at = server_sim.clock().network_time;
                    remote.borrow_mut().on_input_batch(&batch, received_at);
                }
                // shots are rebuilt by the authority when it applies the input
                Message::Fire(_) => {}
                _ => {}
            }
        }
        server_sim.update(
            RENDER_DT,
            &mut TickEnv::new(&mut server_world, &mut server_outbox).with_lag(&mut lag),
        );
        let fired = remote.borrow_mut().role_mut().take_shots();
        for shot in fired {
            let (rewind_to, shooter) = {
                let remote = remote.borrow();
                (remote.role().rewind_time_for(&shot), remote.core().body)
            };
            let hit = resolve_fire(
                &shot,
                Some(shooter),
                rewind_to,
                server_sim.clock(),
                &lag,
                &mut server_world,
                50.0,
            );
            server_outbox.push(Message::Hit(hit));
        }
        flush(&mut server_outbox, &server_link)?;

        // client receives
        for message in drain_incoming(&client_link)? {
            to_client.push(now, message);
        }
        for message in to_client.due(now) {
            match message {
                Message::State(update) => {
                    let outcome = local.borrow_mut().on_state_update(&update, &mut client_world);
                    match outcome {
                        UpdateOutcome::Reconciled { replayed: n, .. } => replayed += n,
                        UpdateOutcome::Resynced { .. } => resyncs += 1,
                        _ => {}
                    }
                    observed.borrow_mut().on_state_update(&update, &mut client_world);
                }
                Message::Clock(sync) => {
                    client_sim.apply_clock_sync(
                        &sync,
                        ONE_WAY_DELAY,
                        &mut TickEnv::new(&mut client_world, &mut client_outbox),
                    );
                }
                Message::Hit(hit) => {
                    shots += 1;
                    if hit.target.is_some() {
                        hits += 1;
                    }
                }
                _ => {}
            }
        }
        observed.borrow_mut().advance_render(RENDER_DT);

        if now >= next_report {
            next_report += 1.0;
            let local = local.borrow();
            let authoritative_gap = local
                .role()
                .authoritative()
                .map_or(0.0, |state| state.position.distance(local.state().position));
            println!(
                "t={:>5.2}s frame={:>3} outstanding={:>2} ahead_of_server={:.2} observed_at=({:.2}, {:.2})",
                now,
                client_sim.clock().frame_number,
                local.role().outstanding_len(),
                authoritative_gap,
                observed.borrow().render_pose().position.x,
                observed.borrow().render_pose().position.z,
            );
        }
    }

    let server_state = remote.borrow().state().clone();
    let client_state = local.borrow().state().clone();
    println!("\n=== Summary ===");
    println!("Server frame: {}", server_sim.clock().frame_number);
    println!("Inputs acknowledged: {:?}", server_state.last_input_processed);
    println!("Inputs replayed during reconciliation: {}", replayed);
    println!("Resyncs: {}", resyncs);
    println!("Shots resolved: {} ({} hits)", shots, hits);
    println!(
        "Hosted player on server: ({:.2}, {:.2})",
        hosted.borrow().state().position.x,
        hosted.borrow().state().position.z
    );
    println!(
        "Prediction lead over last acknowledged state: {:.2}",
        client_state.position.distance(server_state.position)
    );
    println!(
        "Live pose of client player on server: {:?}",
        server_world.pose(remote.borrow().core().body).map(|p| p.position)
    );

    Ok(())
}
