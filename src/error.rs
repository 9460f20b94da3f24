//! Error types for the engine host.
//!
//! All errors are strongly typed using thiserror. The router converts every
//! error raised during dispatch into an error reply; nothing here is allowed
//! to escape and terminate the host worker.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type HostResult<T> = Result<T, HostError>;

/// Top-level error for command dispatch and host operation.
#[derive(Debug, Error)]
pub enum HostError {
    /// A non-load command arrived while no engine instance exists.
    #[error("engine is not loaded; issue a LOAD command first")]
    NotLoaded,

    /// A command's kind matched none of the recognized kinds, or its
    /// payload could not be decoded for the kind it named.
    #[error("unrecognized command '{kind}'")]
    UnknownCommand {
        /// The kind string as it appeared on the wire.
        kind: String,
    },

    /// A failure surfaced by the engine itself. Opaque to this layer and
    /// passed through unmodified.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Asset resolution failed while servicing a load.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The host's inbound command queue is full.
    #[error("command queue is full (capacity: {capacity})")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// The host worker has shut down.
    #[error("engine host is shut down")]
    Disconnected,
}

/// Errors surfaced by an engine instance.
///
/// The host never interprets these beyond relaying them; their content is
/// engine-defined.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine module instantiation failed.
    #[error("engine instantiation failed: {message}")]
    Instantiation {
        /// Engine-supplied description.
        message: String,
    },

    /// A synchronous execution invocation failed.
    #[error("execution failed: {message}")]
    Execution {
        /// Engine-supplied description.
        message: String,
    },

    /// A virtual-filesystem primitive failed.
    #[error("filesystem {op} failed for '{path}': {message}")]
    Filesystem {
        /// The primitive that failed (e.g. `readFile`).
        op: &'static str,
        /// The path handed to the primitive.
        path: String,
        /// Engine-supplied description.
        message: String,
    },
}

/// Errors produced by an asset resolver.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The asset could not be fetched.
    #[error("failed to fetch '{url}': {message}")]
    Fetch {
        /// The requested location.
        url: String,
        /// Resolver-supplied description.
        message: String,
    },

    /// The location shape is not something this resolver understands.
    #[error("unsupported location '{url}'")]
    Unsupported {
        /// The requested location.
        url: String,
    },
}
