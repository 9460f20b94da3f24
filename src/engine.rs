//! The capability surface of the opaque computation engine.
//!
//! The engine itself is an external collaborator, loaded as an opaque binary
//! module. This module defines the narrow trait the host drives it through:
//! synchronous execution, virtual-filesystem primitives, timeout
//! configuration, logger/progress registration, and result/reset state.

use crate::error::EngineError;
use crate::protocol::{LogRecord, ProgressUpdate};

/// Timeout value meaning "no timeout".
pub const NO_TIMEOUT: i64 = -1;

/// Callback receiving engine log records.
pub type LogSink = Box<dyn Fn(LogRecord) + Send>;

/// Callback receiving engine progress updates.
pub type ProgressSink = Box<dyn Fn(ProgressUpdate) + Send>;

/// A single engine instance.
///
/// The host owns exactly one of these per worker lifetime, created by an
/// [`EngineModule`]. Execution is not reentrant: a call to [`Engine::exec`]
/// must fully complete (or fail) and the instance be [`Engine::reset`]
/// before the result/timeout state may be reused.
pub trait Engine: Send {
    /// Configures the execution timeout in milliseconds. [`NO_TIMEOUT`]
    /// disables it. Timeout enforcement is the engine's own responsibility.
    fn set_timeout(&mut self, timeout_ms: i64);

    /// Runs the engine synchronously with the given arguments, blocking
    /// until it finishes or its configured timeout halts it.
    fn exec(&mut self, args: &[String]) -> Result<(), EngineError>;

    /// The exit code left by the most recent execution.
    fn exit_code(&self) -> i32;

    /// Clears residual result and timeout state after an execution.
    fn reset(&mut self);

    /// Registers the callback receiving the engine's log records.
    fn set_logger(&mut self, sink: LogSink);

    /// Registers the callback receiving the engine's progress updates.
    fn set_progress(&mut self, sink: ProgressSink);

    /// Writes a buffer at `path` in the engine's virtual filesystem.
    fn write_file(&mut self, path: &str, data: &[u8]) -> Result<(), EngineError>;

    /// Reads the raw bytes of the file at `path`.
    fn read_file(&mut self, path: &str) -> Result<Vec<u8>, EngineError>;

    /// Unlinks the file at `path`.
    fn delete_file(&mut self, path: &str) -> Result<(), EngineError>;

    /// Renames `old_path` to `new_path`.
    fn rename(&mut self, old_path: &str, new_path: &str) -> Result<(), EngineError>;

    /// Creates a directory at `path`.
    fn create_dir(&mut self, path: &str) -> Result<(), EngineError>;

    /// Lists the directory entries at `path`, in the engine's own order,
    /// including the self and parent entries.
    fn list_dir(&mut self, path: &str) -> Result<Vec<String>, EngineError>;

    /// Removes the empty directory at `path`.
    fn delete_dir(&mut self, path: &str) -> Result<(), EngineError>;
}

/// Maps a filename requested by the engine's internals to a resolved
/// location. The second argument is the engine-supplied default prefix for
/// fallback resolution.
pub type LocateFn<'a> = &'a (dyn Fn(&str, &str) -> String + 'a);

/// Factory for engine instances.
///
/// Implementations load the engine's primary code from a (possibly
/// blob-resolved) location and construct an instance. The `locate` callback
/// lets the engine's own bootstrapping find its binary payload and
/// secondary-worker code.
pub trait EngineModule: Send {
    /// Instantiates an engine from its resolved primary code location.
    fn instantiate(
        &self,
        core_location: &str,
        locate: LocateFn<'_>,
    ) -> Result<Box<dyn Engine>, EngineError>;
}
