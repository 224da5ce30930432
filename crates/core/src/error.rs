//! Error types for the tsgate core library.

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur at the engine and sink boundaries
#[derive(Debug, Error)]
pub enum Error {
    /// Engine creation or teardown failure
    #[error("Engine error: {0}")]
    Engine(String),

    /// Sink open/release failure
    #[error("Sink error: {0}")]
    Sink(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
