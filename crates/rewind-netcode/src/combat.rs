//! Lag-compensated hit resolution

use glam::Vec3;
use rewind_core::{BodyHandle, FireEvent, HitEvent, PhysicsWorld, Ray, ServerClock};
use rewind_sim::{LagCompensator, Rewind};
use tracing::debug;

/// Evaluate a shot against the world as it was at `rewind_to`
///
/// `clock` is the authority's live clock. The shooter's own body is ignored
/// by the raycast. Shots with no usable direction miss without rewinding.
pub fn resolve_fire(
    fire: &FireEvent,
    shooter_body: Option<BodyHandle>,
    rewind_to: f64,
    clock: &ServerClock,
    lag: &LagCompensator,
    world: &mut dyn PhysicsWorld,
    max_distance: f32,
) -> HitEvent {
    let miss = HitEvent {
        shooter: fire.shooter,
        input_id: fire.input_id,
        target: None,
        point: None,
        evaluated_frame: clock.frame_number,
    };
    if !fire.origin.is_finite() || !fire.direction.is_finite() || fire.direction == Vec3::ZERO {
        debug!(shooter = %fire.shooter, input = fire.input_id, "shot without direction ignored");
        return miss;
    }

    let ray = Ray::new(fire.origin, fire.direction);
    let rewound = lag.rewind_and_query(world, clock.network_time, rewind_to, |world| {
        world.raycast(&ray, max_distance, shooter_body)
    });

    let evaluated_frame = match rewound.rewind {
        Rewind::Live => clock.frame_number,
        Rewind::Historical { frame, .. } => frame,
    };
    let hit = HitEvent {
        target: rewound.value.map(|hit| hit.body),
        point: rewound.value.map(|hit| hit.point),
        evaluated_frame,
        ..miss
    };
    debug!(
        shooter = %fire.shooter,
        input = fire.input_id,
        target = ?hit.target,
        frame = evaluated_frame,
        "shot resolved"
    );
    hit
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_core::{EntityId, FlatWorld, Pose, Quat};

    const TIMESTEP: f64 = 0.3;

    fn fire_at(direction: Vec3) -> FireEvent {
        FireEvent {
            shooter: EntityId(1),
            input_id: 12,
            origin: Vec3::ZERO,
            direction,
            capture_time: 0.0,
            server_frame: 0,
        }
    }

    /// Target crosses in front of the shooter during frames 2..4, then leaves
    fn setup() -> (FlatWorld, LagCompensator, BodyHandle, BodyHandle, ServerClock) {
        let mut world = FlatWorld::new(-10.0);
        let shooter = world.spawn(Pose::default(), 0.5);
        let target = world.spawn(Pose::default(), 0.5);
        let mut lag = LagCompensator::new(TIMESTEP, 60);
        lag.track(shooter);
        lag.track(target);

        for frame in 0..8u32 {
            let x = if (2..4).contains(&frame) { 0.0 } else { 30.0 };
            world.set_pose(target, Pose::new(Vec3::new(x, 0.0, 10.0), Quat::IDENTITY));
            world.sync_transforms();
            lag.record(frame, (frame + 1) as f64 * TIMESTEP, &world);
        }
        let clock = ServerClock {
            frame_number: 8,
            since_last_tick: 0.1,
            network_time: 8.0 * TIMESTEP + 0.1,
        };
        (world, lag, shooter, target, clock)
    }

    #[test]
    fn test_hit_in_the_past() {
        let (mut world, lag, shooter, target, clock) = setup();
        let fire = fire_at(Vec3::Z);

        let hit = resolve_fire(&fire, Some(shooter), 3.0 * TIMESTEP, &clock, &lag, &mut world, 100.0);
        assert_eq!(hit.target, Some(target));
        assert_eq!(hit.evaluated_frame, 2);
        assert!(hit.point.unwrap().abs_diff_eq(Vec3::new(0.0, 0.0, 9.5), 1e-4));
        assert_eq!(world.pose(target).unwrap().position.x, 30.0);
    }

    #[test]
    fn test_live_miss() {
        let (mut world, lag, shooter, _, clock) = setup();
        let hit = resolve_fire(&fire_at(Vec3::Z), Some(shooter), clock.network_time, &clock, &lag, &mut world, 100.0);
        assert_eq!(hit.target, None);
        assert_eq!(hit.evaluated_frame, 8);
    }

    #[test]
    fn test_zero_direction_misses() {
        let (mut world, lag, shooter, _, clock) = setup();
        let hit = resolve_fire(&fire_at(Vec3::ZERO), Some(shooter), 0.9, &clock, &lag, &mut world, 100.0);
        assert_eq!(hit.target, None);
        assert_eq!(hit.input_id, 12);
    }
}
