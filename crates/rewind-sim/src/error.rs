//! Error types for rewind-sim

use crate::simulation::ParticipantId;
use rewind_core::BodyHandle;
use thiserror::Error;

/// Result type for rewind-sim operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in rewind-sim
#[derive(Debug, Error)]
pub enum Error {
    /// Participant is not registered
    #[error("participant {0} is not registered")]
    UnknownParticipant(ParticipantId),

    /// Body is not tracked by the lag compensator
    #[error("{0} is not tracked")]
    UntrackedBody(BodyHandle),

    /// Configuration error
    #[error("core error: {0}")]
    Core(#[from] rewind_core::Error),
}
