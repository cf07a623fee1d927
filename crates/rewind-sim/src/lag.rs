//! Lag compensation
//!
//! After every authoritative tick the [`LagCompensator`] records the pose of
//! each tracked body into a fixed window of [`FrameSnapshot`]s. A query for a
//! past network time finds the two snapshots bracketing it, blends every body
//! between them, temporarily moves the live bodies there, runs the query and
//! puts the live poses back.
//!
//! Tracked bodies keep a stable slot for as long as they are tracked, so slot
//! `i` of every retained snapshot refers to the same body. Freed slots are
//! reused by later registrations.

use crate::error::{Error, Result};
use rewind_core::{BodyHandle, Frame, PhysicsWorld, Pose};
use rewind_history::RingHistoryBuffer;
use tracing::{debug, trace};

/// Poses of every tracked body at the end of one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameSnapshot {
    pub frame_index: Frame,
    pub network_time: f64,
    /// Indexed by tracked slot; `None` for free slots
    pub bodies: Vec<Option<(BodyHandle, Pose)>>,
}

impl FrameSnapshot {
    /// Recorded pose of the body in `slot`, if it is still `body`
    fn pose_in(&self, slot: usize, body: BodyHandle) -> Option<Pose> {
        match self.bodies.get(slot) {
            Some(Some((recorded, pose))) if *recorded == body => Some(*pose),
            _ => None,
        }
    }
}

/// Where a rewind request landed
#[derive(Debug, Clone, PartialEq)]
pub enum Rewind {
    /// The requested time is inside the tick being simulated; live poses are used
    Live,
    /// Bodies were moved to historical poses
    Historical {
        /// Older frame of the bracketing pair
        frame: Frame,
        /// Blend factor from `frame` toward the following frame
        alpha: f32,
        /// The request was older than the retained window
        clamped: bool,
        poses: Vec<(BodyHandle, Pose)>,
    },
}

impl Rewind {
    /// Whether live state was used
    pub fn is_live(&self) -> bool {
        matches!(self, Rewind::Live)
    }

    /// Historical pose applied to `body`, if any
    pub fn pose_of(&self, body: BodyHandle) -> Option<Pose> {
        match self {
            Rewind::Live => None,
            Rewind::Historical { poses, .. } => poses
                .iter()
                .find(|(handle, _)| *handle == body)
                .map(|(_, pose)| *pose),
        }
    }
}

/// Result of [`LagCompensator::rewind_and_query`]
#[derive(Debug, Clone, PartialEq)]
pub struct Rewound<R> {
    pub value: R,
    pub rewind: Rewind,
}

/// Per-tick pose recorder and rewind engine
#[derive(Debug)]
pub struct LagCompensator {
    timestep: f64,
    slots: Vec<Option<BodyHandle>>,
    free_slots: Vec<usize>,
    history: RingHistoryBuffer<FrameSnapshot>,
}

impl LagCompensator {
    /// Create a compensator retaining `window` snapshots taken every `timestep` seconds
    pub fn new(timestep: f64, window: usize) -> Self {
        Self {
            timestep,
            slots: Vec::new(),
            free_slots: Vec::new(),
            history: RingHistoryBuffer::new(window),
        }
    }

    /// Start recording `body`, returning its slot
    pub fn track(&mut self, body: BodyHandle) -> usize {
        if let Some(slot) = self.slot_of(body) {
            return slot;
        }

        let slot = match self.free_slots.pop() {
            Some(slot) => {
                self.slots[slot] = Some(body);
                slot
            }
            None => {
                self.slots.push(Some(body));
                self.slots.len() - 1
            }
        };
        debug!(%body, slot, "tracking body");
        slot
    }

    /// Stop recording `body`; its slot becomes free for reuse
    pub fn untrack(&mut self, body: BodyHandle) -> Result<usize> {
        let slot = self.slot_of(body).ok_or(Error::UntrackedBody(body))?;
        self.slots[slot] = None;
        self.free_slots.push(slot);
        debug!(%body, slot, "untracked body");
        Ok(slot)
    }

    /// Slot of a tracked body
    pub fn slot_of(&self, body: BodyHandle) -> Option<usize> {
        self.slots.iter().position(|s| *s == Some(body))
    }

    /// Number of tracked bodies
    pub fn tracked(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Number of snapshots currently retained
    pub fn retained(&self) -> usize {
        self.history.retained()
    }

    /// Most recent snapshot
    pub fn latest(&self) -> Option<&FrameSnapshot> {
        self.history.latest()
    }

    /// Record the current pose of every tracked body
    pub fn record(&mut self, frame_index: Frame, network_time: f64, world: &dyn PhysicsWorld) {
        let bodies = self
            .slots
            .iter()
            .map(|slot| slot.and_then(|body| world.pose(body).map(|pose| (body, pose))))
            .collect();
        self.history.add_value(FrameSnapshot {
            frame_index,
            network_time,
            bodies,
        });
        trace!(frame = frame_index, network_time, "snapshot recorded");
    }

    /// Work out the historical poses for `target_time`, given the live network time `now`
    pub fn sample(&self, now: f64, target_time: f64) -> Rewind {
        let retained = self.history.retained();
        if retained == 0 || !(now - target_time).is_finite() {
            return Rewind::Live;
        }

        let frame_diff = ((now - target_time) / self.timestep).floor() as i64 + 1;
        if frame_diff <= 1 {
            return Rewind::Live;
        }

        let oldest = self.snapshot(retained);
        let clamped = target_time < oldest.network_time || frame_diff > retained as i64;
        if retained == 1 || clamped {
            if clamped {
                debug!(target_time, oldest = oldest.network_time, "rewind clamped to oldest snapshot");
            }
            return self.historical(oldest, oldest, 0.0, clamped);
        }

        // `older` is `back` snapshots behind the write cursor, `newer` one after it
        let mut back = (frame_diff as usize).clamp(2, retained);
        while back < retained && target_time < self.snapshot(back).network_time {
            back += 1;
        }
        while back > 2 && target_time > self.snapshot(back - 1).network_time {
            back -= 1;
        }

        let older = self.snapshot(back);
        let newer = self.snapshot(back - 1);
        if target_time >= newer.network_time {
            return self.historical(newer, newer, 0.0, false);
        }

        let span = newer.network_time - older.network_time;
        let alpha = if span > 0.0 {
            ((target_time - older.network_time) / span).clamp(0.0, 1.0) as f32
        } else {
            0.0
        };
        self.historical(older, newer, alpha, false)
    }

    /// Run `query` against the world as it was at `target_time`
    ///
    /// Live poses of the rewound bodies are saved first and restored after
    /// the query, each followed by a transform sync so queries and the next
    /// tick both see the intended poses.
    pub fn rewind_and_query<R>(
        &self,
        world: &mut dyn PhysicsWorld,
        now: f64,
        target_time: f64,
        query: impl FnOnce(&dyn PhysicsWorld) -> R,
    ) -> Rewound<R> {
        let rewind = self.sample(now, target_time);
        if rewind.is_live() {
            return Rewound {
                value: query(&*world),
                rewind,
            };
        }
        let poses = match &rewind {
            Rewind::Historical { poses, .. } => poses.as_slice(),
            Rewind::Live => &[],
        };

        let live: Vec<_> = poses
            .iter()
            .filter_map(|(body, _)| world.pose(*body).map(|pose| (*body, pose)))
            .collect();
        for (body, pose) in poses {
            world.set_pose(*body, *pose);
        }
        world.sync_transforms();

        let value = query(&*world);

        for (body, pose) in live {
            world.set_pose(body, pose);
        }
        world.sync_transforms();

        debug!(now, target_time, bodies = poses.len(), "rewound query");
        Rewound { value, rewind }
    }

    fn snapshot(&self, back: usize) -> &FrameSnapshot {
        self.history.at_offset(-(back as isize))
    }

    fn historical(&self, older: &FrameSnapshot, newer: &FrameSnapshot, alpha: f32, clamped: bool) -> Rewind {
        let poses = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(slot, body)| {
                let body = (*body)?;
                let pose = match (older.pose_in(slot, body), newer.pose_in(slot, body)) {
                    (Some(a), Some(b)) => a.interpolate(&b, alpha),
                    (Some(a), None) => a,
                    (None, Some(b)) => b,
                    (None, None) => return None,
                };
                Some((body, pose))
            })
            .collect();

        Rewind::Historical {
            frame: older.frame_index,
            alpha,
            clamped,
            poses,
        }
    }
}
