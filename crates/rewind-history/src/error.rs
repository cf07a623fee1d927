//! Error types for rewind-history

use thiserror::Error;

/// Ring buffer error type
#[derive(Debug, Error)]
pub enum Error {
    /// Copy-out target is too small for the requested range
    #[error("destination holds {available} entries, range needs {required}")]
    InsufficientDestinationCapacity { required: usize, available: usize },

    /// An absolute index outside the buffer was supplied
    #[error("index {index} is outside a buffer of capacity {capacity}")]
    IndexOutOfRange { index: usize, capacity: usize },
}

/// Result type for ring buffer operations
pub type Result<T> = std::result::Result<T, Error>;
