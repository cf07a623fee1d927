//! Network message schemas and the per-process outbox
//!
//! Messages are plain serde types. Wire encoding belongs to the transport;
//! each message only declares which logical channel it travels on.

use crate::identity::{BodyHandle, EntityId, InputId};
use crate::input::InputSample;
use crate::state::EntityState;
use crate::time::{Frame, ServerClock};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Logical delivery channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Frequent, small, loss-tolerant traffic
    Unreliable,
    /// Rare messages that must arrive
    Reliable,
}

/// Every outstanding input of one sender, resent each tick
///
/// Consecutive batches overlap; receivers must drop duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputBatch {
    pub sender: EntityId,
    /// Sender network time when the batch was sent
    pub sent_at: f64,
    /// Samples in increasing `input_id` order
    pub samples: Vec<InputSample>,
}

impl InputBatch {
    /// Number of samples carried
    pub fn count(&self) -> usize {
        self.samples.len()
    }
}

/// Authoritative state of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub entity_id: EntityId,
    pub state: EntityState,
}

/// Replicated clock
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClockSync {
    pub frame_number: Frame,
    pub since_last_tick: f64,
    pub network_time: f64,
}

impl From<&ServerClock> for ClockSync {
    fn from(clock: &ServerClock) -> Self {
        Self {
            frame_number: clock.frame_number,
            since_last_tick: clock.since_last_tick,
            network_time: clock.network_time,
        }
    }
}

/// A shot fired by a controller
///
/// Controllers announce their shots with it; the authority rebuilds its own
/// from the applied input and resolves those.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FireEvent {
    pub shooter: EntityId,
    pub input_id: InputId,
    pub origin: Vec3,
    pub direction: Vec3,
    /// Network time of the input that fired
    pub capture_time: f64,
    pub server_frame: Frame,
}

/// Authoritative outcome of a [`FireEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitEvent {
    pub shooter: EntityId,
    pub input_id: InputId,
    /// Body hit, if any
    pub target: Option<BodyHandle>,
    pub point: Option<Vec3>,
    /// Frame the shot was evaluated against
    pub evaluated_frame: Frame,
}

/// Any message exchanged between peers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Input(InputBatch),
    State(StateUpdate),
    Clock(ClockSync),
    Fire(FireEvent),
    Hit(HitEvent),
}

impl Message {
    /// The channel this message travels on
    pub fn channel(&self) -> Channel {
        match self {
            Message::Input(_) | Message::State(_) | Message::Clock(_) => Channel::Unreliable,
            Message::Fire(_) | Message::Hit(_) => Channel::Reliable,
        }
    }
}

/// Messages produced during a tick, waiting to be handed to the transport
#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<Message>,
}

impl Outbox {
    /// Create an empty outbox
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Take every queued message in push order
    pub fn drain(&mut self) -> impl Iterator<Item = Message> + '_ {
        self.messages.drain(..)
    }

    /// Queued messages
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of queued messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels() {
        let input = Message::Input(InputBatch {
            sender: EntityId(1),
            sent_at: 0.0,
            samples: vec![],
        });
        let fire = Message::Fire(FireEvent {
            shooter: EntityId(1),
            input_id: 3,
            origin: Vec3::ZERO,
            direction: Vec3::Z,
            capture_time: 0.0,
            server_frame: 0,
        });
        let clock = Message::Clock(ClockSync::from(&ServerClock::new()));

        assert_eq!(input.channel(), Channel::Unreliable);
        assert_eq!(clock.channel(), Channel::Unreliable);
        assert_eq!(fire.channel(), Channel::Reliable);
    }

    #[test]
    fn test_outbox_drain_keeps_order() {
        let mut outbox = Outbox::new();
        for frame in 0..3 {
            outbox.push(Message::Clock(ClockSync {
                frame_number: frame,
                since_last_tick: 0.0,
                network_time: 0.0,
            }));
        }
        assert_eq!(outbox.len(), 3);

        let frames: Vec<_> = outbox
            .drain()
            .map(|m| match m {
                Message::Clock(sync) => sync.frame_number,
                other => panic!("unexpected message {other:?}"),
            })
            .collect();
        assert_eq!(frames, vec![0, 1, 2]);
        assert!(outbox.is_empty());
    }
}
