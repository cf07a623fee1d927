//! Collision collaborator interface
//!
//! Collision resolution is not implemented here. The netcode only needs a
//! sweep-move that reports contacts, access to body poses, a forced
//! re-evaluation hook so queries see freshly written poses, and a raycast.
//!
//! [`FlatWorld`] is a small reference implementation (ground plane plus
//! sphere bodies) used by tests and the demo.

use crate::identity::BodyHandle;
use crate::state::Pose;
use glam::Vec3;

/// Contacts reported by a sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollisionFlags {
    pub below: bool,
    pub above: bool,
    pub sides: bool,
}

impl CollisionFlags {
    /// Whether any contact was reported
    pub fn any(&self) -> bool {
        self.below || self.above || self.sides
    }
}

/// Result of a sweep-move
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sweep {
    /// Where the body ended up
    pub position: Vec3,
    pub flags: CollisionFlags,
}

/// A ray with a normalized direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// Create a ray, normalizing `direction` (zero directions stay zero)
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    /// Point at distance `t` along the ray
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Closest body hit by a raycast
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub body: BodyHandle,
    pub point: Vec3,
    pub distance: f32,
}

/// The physics collaborator used by movement and lag compensation
pub trait PhysicsWorld {
    /// Move `body` from `from` by `displacement`, resolving collisions
    ///
    /// The body is left at the returned position.
    fn sweep_move(&mut self, body: BodyHandle, from: Vec3, displacement: Vec3) -> Sweep;

    /// Current pose of a body
    fn pose(&self, body: BodyHandle) -> Option<Pose>;

    /// Teleport a body; queries only observe it after [`PhysicsWorld::sync_transforms`]
    fn set_pose(&mut self, body: BodyHandle, pose: Pose);

    /// Zero-duration re-evaluation so queries reflect the poses written so far
    fn sync_transforms(&mut self);

    /// Closest body along `ray` within `max_distance`, skipping `ignore`
    fn raycast(&self, ray: &Ray, max_distance: f32, ignore: Option<BodyHandle>) -> Option<RayHit>;
}

#[derive(Debug, Clone)]
struct FlatBody {
    radius: f32,
    pose: Pose,
    /// Position seen by queries, refreshed on sync
    query_position: Vec3,
    alive: bool,
}

/// Ground plane with sphere bodies
#[derive(Debug, Clone)]
pub struct FlatWorld {
    ground_height: f32,
    bodies: Vec<FlatBody>,
}

impl FlatWorld {
    /// Create a world whose ground plane is at `ground_height`
    pub fn new(ground_height: f32) -> Self {
        Self {
            ground_height,
            bodies: Vec::new(),
        }
    }

    /// Add a sphere body; it is immediately visible to queries
    pub fn spawn(&mut self, pose: Pose, radius: f32) -> BodyHandle {
        let handle = BodyHandle(self.bodies.len() as u32);
        self.bodies.push(FlatBody {
            radius,
            pose,
            query_position: pose.position,
            alive: true,
        });
        handle
    }

    /// Remove a body; its handle is never reissued
    pub fn despawn(&mut self, body: BodyHandle) {
        if let Some(b) = self.bodies.get_mut(body.0 as usize) {
            b.alive = false;
        }
    }

    /// Height of the ground plane
    pub fn ground_height(&self) -> f32 {
        self.ground_height
    }

    fn body(&self, handle: BodyHandle) -> Option<&FlatBody> {
        self.bodies.get(handle.0 as usize).filter(|b| b.alive)
    }

    fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut FlatBody> {
        self.bodies.get_mut(handle.0 as usize).filter(|b| b.alive)
    }
}

impl Default for FlatWorld {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl PhysicsWorld for FlatWorld {
    fn sweep_move(&mut self, body: BodyHandle, from: Vec3, displacement: Vec3) -> Sweep {
        let radius = self.body(body).map_or(0.0, |b| b.radius);
        let floor = self.ground_height + radius;

        let mut position = from + displacement;
        let mut flags = CollisionFlags::default();
        if position.y <= floor {
            position.y = floor;
            flags.below = displacement.y <= 0.0;
        }

        if let Some(b) = self.body_mut(body) {
            b.pose.position = position;
        }
        Sweep { position, flags }
    }

    fn pose(&self, body: BodyHandle) -> Option<Pose> {
        self.body(body).map(|b| b.pose)
    }

    fn set_pose(&mut self, body: BodyHandle, pose: Pose) {
        if let Some(b) = self.body_mut(body) {
            b.pose = pose;
        }
    }

    fn sync_transforms(&mut self) {
        for body in self.bodies.iter_mut().filter(|b| b.alive) {
            body.query_position = body.pose.position;
        }
    }

    fn raycast(&self, ray: &Ray, max_distance: f32, ignore: Option<BodyHandle>) -> Option<RayHit> {
        self.bodies
            .iter()
            .enumerate()
            .filter(|(_, b)| b.alive)
            .map(|(i, b)| (BodyHandle(i as u32), b))
            .filter(|(handle, _)| Some(*handle) != ignore)
            .filter_map(|(handle, b)| {
                let distance = ray_sphere(ray, b.query_position, b.radius)?;
                (distance <= max_distance).then(|| RayHit {
                    body: handle,
                    point: ray.at(distance),
                    distance,
                })
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

/// Distance along `ray` to the first intersection with a sphere, if in front of the origin
fn ray_sphere(ray: &Ray, center: Vec3, radius: f32) -> Option<f32> {
    let offset = ray.origin - center;
    let b = offset.dot(ray.direction);
    let c = offset.length_squared() - radius * radius;
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }

    let root = discriminant.sqrt();
    let near = -b - root;
    let far = -b + root;
    if near >= 0.0 {
        Some(near)
    } else if far >= 0.0 {
        Some(far)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sweep_lands_on_ground() {
        let mut world = FlatWorld::new(0.0);
        let body = world.spawn(Pose::new(Vec3::new(0.0, 2.0, 0.0), glam::Quat::IDENTITY), 0.5);

        let sweep = world.sweep_move(body, Vec3::new(0.0, 2.0, 0.0), Vec3::new(1.0, -5.0, 0.0));
        assert!(sweep.flags.below);
        assert_relative_eq!(sweep.position.y, 0.5);
        assert_relative_eq!(sweep.position.x, 1.0);
        assert_eq!(world.pose(body).unwrap().position, sweep.position);
    }

    #[test]
    fn test_sweep_upward_reports_no_ground() {
        let mut world = FlatWorld::new(0.0);
        let body = world.spawn(Pose::default(), 0.0);
        let sweep = world.sweep_move(body, Vec3::ZERO, Vec3::new(0.0, 1.0, 0.0));
        assert!(!sweep.flags.any());
    }

    #[test]
    fn test_raycast_sees_poses_only_after_sync() {
        let mut world = FlatWorld::new(-10.0);
        let target = world.spawn(Pose::new(Vec3::new(0.0, 0.0, 5.0), glam::Quat::IDENTITY), 1.0);
        let ray = Ray::new(Vec3::ZERO, Vec3::Z);

        let hit = world.raycast(&ray, 100.0, None).unwrap();
        assert_eq!(hit.body, target);
        assert_relative_eq!(hit.distance, 4.0);

        world.set_pose(target, Pose::new(Vec3::new(10.0, 0.0, 5.0), glam::Quat::IDENTITY));
        assert!(world.raycast(&ray, 100.0, None).is_some());

        world.sync_transforms();
        assert!(world.raycast(&ray, 100.0, None).is_none());
    }

    #[test]
    fn test_raycast_ignores_and_picks_closest() {
        let mut world = FlatWorld::new(-10.0);
        let shooter = world.spawn(Pose::default(), 0.5);
        let far = world.spawn(Pose::new(Vec3::new(0.0, 0.0, 9.0), glam::Quat::IDENTITY), 0.5);
        let near = world.spawn(Pose::new(Vec3::new(0.0, 0.0, 4.0), glam::Quat::IDENTITY), 0.5);
        let ray = Ray::new(Vec3::ZERO, Vec3::Z);

        assert_eq!(world.raycast(&ray, 100.0, None).unwrap().body, shooter);
        assert_eq!(world.raycast(&ray, 100.0, Some(shooter)).unwrap().body, near);
        assert!(world.raycast(&ray, 3.0, Some(shooter)).is_none());

        world.despawn(near);
        assert_eq!(world.raycast(&ray, 100.0, Some(shooter)).unwrap().body, far);
    }
}
