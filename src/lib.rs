//! # enginehost - worker-side engine dispatch
//!
//! A command dispatcher that owns the lifecycle of a single heavyweight
//! computation engine instance inside an isolated worker context and exposes
//! its capabilities across an asynchronous message boundary: synchronous
//! execution, virtual-filesystem access, and log/progress notification.
//!
//! ## Core pieces
//!
//! - **[`EngineHost`]**: the runtime — a dedicated worker thread, a bounded
//!   inbound command queue, and a bounded outbound stream of replies and
//!   notifications.
//! - **[`Command`] / [`Reply`]**: correlated request/reply pairs; every
//!   command produces exactly one reply carrying its id, success or failure.
//! - **[`Notification`]**: uncorrelated fire-and-forget events (engine log
//!   lines, progress fractions, asset-download progress).
//! - **[`Engine`] / [`EngineModule`] / [`AssetResolver`]**: the traits the
//!   external collaborators plug in through.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use enginehost::{Command, EngineHost, HostConfig, LoadConfig};
//!
//! let host = EngineHost::start(HostConfig::default(), resolver, module);
//! host.submit(1, Command::Load(LoadConfig::new("file:///pkg/engine-core.js")))?;
//! let outbound = host.outbound();
//! // outbound now yields the LOAD reply, then any notifications.
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod engine;
pub mod error;
pub mod host;
pub mod mock;
pub mod protocol;
pub mod resolver;
pub mod router;

mod handlers;
mod loader;

// Re-export primary types at crate root for convenience
pub use engine::{Engine, EngineModule, LocateFn, LogSink, ProgressSink, NO_TIMEOUT};
pub use error::{EngineError, HostError, HostResult, ResolveError};
pub use host::{EngineHost, HostConfig, NotifySender};
pub use protocol::{
    Command, CorrelationId, DownloadProgress, Encoding, Envelope, ExecPayload, FileData,
    LoadConfig, LogRecord, Notification, Outbound, PathPayload, ProgressUpdate, ReadFilePayload,
    RenamePayload, Reply, ReplyBody, WriteFilePayload,
};
pub use resolver::{AssetKind, AssetResolver, FileResolver};
pub use router::HostContext;
