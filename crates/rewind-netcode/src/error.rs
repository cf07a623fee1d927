//! Error types for rewind-netcode

use thiserror::Error;

/// Netcode error type
#[derive(Debug, Error)]
pub enum Error {
    /// Message could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// The peer closed the connection
    #[error("Connection closed")]
    Disconnected,

    /// Simulation error
    #[error("Simulation error: {0}")]
    Sim(#[from] rewind_sim::Error),
}

/// Result type for netcode operations
pub type Result<T> = std::result::Result<T, Error>;
