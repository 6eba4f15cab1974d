//! Error types shared across the mirage workspace

use crate::memory::MemoryId;

/// Result type for device and observer operations
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Errors that can occur while observing device execution
///
/// Every variant indicates a broken precondition in the host simulator's
/// event stream. Observers propagate these to the host, which treats them
/// as fatal and aborts the simulation.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// No live allocation is tracked for this (memory, base) pair
    #[error("no live allocation for {memory} at base {base:#x}")]
    UnknownBuffer { memory: MemoryId, base: u64 },

    /// Shadow access out of bounds
    #[error("shadow access out of bounds: offset {offset} + size {size} > buffer size {buffer_size}")]
    ShadowOutOfBounds {
        offset: usize,
        size: usize,
        buffer_size: usize,
    },

    /// Store payload shorter than the access it describes
    #[error("store data size mismatch: access covers {expected} bytes, payload carries {actual}")]
    StoreSizeMismatch { expected: usize, actual: usize },

    /// Invalid memory address
    #[error("invalid memory address: {0:#x}")]
    InvalidAddress(u64),

    /// An operation required a kernel invocation but none is active
    #[error("no kernel invocation is active")]
    NoActiveKernel,
}
