//! Wire protocol for the engine host.
//!
//! Both directions share one envelope shape: `{ id, type, data }`. Inbound
//! envelopes carry commands; outbound envelopes carry either a correlated
//! reply (echoing the command's kind and id) or an uncorrelated notification
//! (no id). Every command produces exactly one reply, success or failure.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::HostError;

/// Identifies an in-flight command so its reply can be matched to it.
pub type CorrelationId = u64;

/// Kind strings as they appear on the wire.
pub mod kind {
    #![allow(missing_docs)]

    pub const LOAD: &str = "LOAD";
    pub const EXEC: &str = "EXEC";
    pub const WRITE_FILE: &str = "WRITE_FILE";
    pub const READ_FILE: &str = "READ_FILE";
    pub const DELETE_FILE: &str = "DELETE_FILE";
    pub const RENAME: &str = "RENAME";
    pub const CREATE_DIR: &str = "CREATE_DIR";
    pub const LIST_DIR: &str = "LIST_DIR";
    pub const DELETE_DIR: &str = "DELETE_DIR";

    pub const ERROR: &str = "ERROR";
    pub const LOG: &str = "LOG";
    pub const PROGRESS: &str = "PROGRESS";
    pub const DOWNLOAD: &str = "DOWNLOAD";
}

/// The shared message envelope.
///
/// Replies and commands carry an `id`; notifications omit it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Correlation id, absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CorrelationId>,

    /// Command or notification kind.
    #[serde(rename = "type")]
    pub kind: String,

    /// Kind-specific payload.
    #[serde(default)]
    pub data: Value,
}

/// Configuration consumed by a LOAD command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadConfig {
    /// Location of the engine's primary code.
    pub core_url: String,

    /// Location of the engine's binary payload. Derived from `core_url`
    /// when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wasm_url: Option<String>,

    /// Location of the engine's secondary-worker code. Derived from
    /// `core_url` when absent; only used when `thread` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_url: Option<String>,

    /// Resolve every location into a local blob before use.
    #[serde(default = "default_blob")]
    pub blob: bool,

    /// Enable the engine's multi-threaded mode.
    #[serde(default)]
    pub thread: bool,
}

fn default_blob() -> bool {
    true
}

impl LoadConfig {
    /// A configuration with only the primary code location set, all other
    /// fields at their defaults.
    #[must_use]
    pub fn new(core_url: impl Into<String>) -> Self {
        Self {
            core_url: core_url.into(),
            wasm_url: None,
            worker_url: None,
            blob: true,
            thread: false,
        }
    }
}

/// Payload of an EXEC command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecPayload {
    /// Argument list handed verbatim to the engine.
    pub args: Vec<String>,

    /// Timeout in milliseconds; -1 means no timeout.
    #[serde(default = "default_timeout")]
    pub timeout: i64,
}

fn default_timeout() -> i64 {
    crate::engine::NO_TIMEOUT
}

/// Encoding requested for READ_FILE results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Decode the file contents as UTF-8 text.
    Utf8,
    /// Return the raw bytes.
    #[default]
    Binary,
}

/// Payload of a WRITE_FILE command. Writes are always raw binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteFilePayload {
    /// Destination path inside the engine's virtual filesystem.
    pub path: String,
    /// The bytes to write.
    pub data: Vec<u8>,
}

/// Payload of a READ_FILE command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadFilePayload {
    /// Path inside the engine's virtual filesystem.
    pub path: String,
    /// Requested result encoding.
    #[serde(default)]
    pub encoding: Encoding,
}

/// Payload of a RENAME command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenamePayload {
    /// Existing path.
    pub old_path: String,
    /// New path.
    pub new_path: String,
}

/// Single-path payload shared by DELETE_FILE, CREATE_DIR, LIST_DIR and
/// DELETE_DIR.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathPayload {
    /// Path inside the engine's virtual filesystem.
    pub path: String,
}

/// A fully decoded inbound command.
///
/// The enum is closed: every recognized kind has a variant, and the
/// "no matching kind" case exists only for malformed envelopes, surfaced as
/// [`HostError::UnknownCommand`] during decoding.
#[derive(Debug, Clone)]
pub enum Command {
    /// Instantiate (or replace) the engine.
    Load(LoadConfig),
    /// Run the engine synchronously.
    Exec(ExecPayload),
    /// Write a buffer into the virtual filesystem.
    WriteFile(WriteFilePayload),
    /// Read a file from the virtual filesystem.
    ReadFile(ReadFilePayload),
    /// Unlink a file.
    DeleteFile(PathPayload),
    /// Rename a file or directory.
    Rename(RenamePayload),
    /// Create a directory.
    CreateDir(PathPayload),
    /// List a directory's entries.
    ListDir(PathPayload),
    /// Remove an empty directory.
    DeleteDir(PathPayload),
}

impl Command {
    /// The wire kind this command echoes in its reply.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Command::Load(_) => kind::LOAD,
            Command::Exec(_) => kind::EXEC,
            Command::WriteFile(_) => kind::WRITE_FILE,
            Command::ReadFile(_) => kind::READ_FILE,
            Command::DeleteFile(_) => kind::DELETE_FILE,
            Command::Rename(_) => kind::RENAME,
            Command::CreateDir(_) => kind::CREATE_DIR,
            Command::ListDir(_) => kind::LIST_DIR,
            Command::DeleteDir(_) => kind::DELETE_DIR,
        }
    }

    /// Decodes an inbound envelope into a typed command.
    ///
    /// An unrecognized kind, or a payload that does not decode for the kind
    /// it names, yields [`HostError::UnknownCommand`].
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, HostError> {
        let unknown = || HostError::UnknownCommand {
            kind: envelope.kind.clone(),
        };
        let data = envelope.data.clone();
        match envelope.kind.as_str() {
            kind::LOAD => serde_json::from_value(data).map(Command::Load),
            kind::EXEC => serde_json::from_value(data).map(Command::Exec),
            kind::WRITE_FILE => serde_json::from_value(data).map(Command::WriteFile),
            kind::READ_FILE => serde_json::from_value(data).map(Command::ReadFile),
            kind::DELETE_FILE => serde_json::from_value(data).map(Command::DeleteFile),
            kind::RENAME => serde_json::from_value(data).map(Command::Rename),
            kind::CREATE_DIR => serde_json::from_value(data).map(Command::CreateDir),
            kind::LIST_DIR => serde_json::from_value(data).map(Command::ListDir),
            kind::DELETE_DIR => serde_json::from_value(data).map(Command::DeleteDir),
            _ => return Err(unknown()),
        }
        .map_err(|_| unknown())
    }
}

/// File contents returned by READ_FILE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileData {
    /// UTF-8 text, per the requested encoding.
    Text(String),
    /// Raw bytes. The backing buffer is transferred, never duplicated.
    Binary(Vec<u8>),
}

/// Result payload of a successfully dispatched command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyBody {
    /// LOAD result: whether this was the first successful load.
    Loaded {
        /// True exactly once per host lifetime.
        first: bool,
    },
    /// EXEC result.
    Exited {
        /// Engine exit code; 0 conventionally denotes success.
        code: i32,
    },
    /// Success marker for commands with no interesting result.
    Done,
    /// READ_FILE result.
    File(FileData),
    /// LIST_DIR result, in the engine's own order (includes the self and
    /// parent entries).
    Listing {
        /// Directory-entry names.
        entries: Vec<String>,
    },
    /// Error description for failed commands.
    Error {
        /// Human-readable description of the failure.
        message: String,
    },
}

/// A correlated reply, exactly one per command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// The originating command's correlation id.
    pub id: CorrelationId,
    /// Echo of the command kind, or [`kind::ERROR`].
    pub kind: &'static str,
    /// Result or error payload.
    pub body: ReplyBody,
    /// Set when `body` carries a raw binary buffer whose backing memory
    /// should be handed over rather than duplicated by the transport.
    pub transfer: bool,
}

impl Reply {
    /// Builds an error reply for the given failure, preserving the id.
    #[must_use]
    pub fn error(id: CorrelationId, err: &HostError) -> Self {
        Self {
            id,
            kind: kind::ERROR,
            body: ReplyBody::Error {
                message: err.to_string(),
            },
            transfer: false,
        }
    }
}

/// A structured log record emitted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// The engine-defined stream or level (e.g. `stdout`, `stderr`).
    #[serde(rename = "type")]
    pub stream: String,
    /// The log line.
    pub message: String,
}

/// A progress update emitted by the engine during execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Completion fraction in `[0, 1]`.
    pub progress: f64,
    /// Engine-defined elapsed media/computation time.
    pub time: f64,
}

/// Download progress reported by the asset resolver during a load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// The location being fetched.
    pub url: String,
    /// Bytes received so far.
    pub received: u64,
    /// Total bytes, when known up front.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// True on the final report for this location.
    pub done: bool,
}

/// An uncorrelated, fire-and-forget outbound message.
#[derive(Debug, Clone)]
pub enum Notification {
    /// A log line from the engine.
    Log(LogRecord),
    /// A progress fraction from the engine.
    Progress(ProgressUpdate),
    /// Asset-download progress from the resolver.
    Download(DownloadProgress),
}

/// Any message the host emits.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// A correlated reply.
    Reply(Reply),
    /// An uncorrelated notification.
    Notification(Notification),
}

impl Outbound {
    /// Serializes this message into the wire envelope.
    ///
    /// In-process consumers should prefer the typed message: converting a
    /// binary reply to JSON necessarily re-encodes the buffer, forfeiting
    /// the ownership transfer the typed path provides.
    #[must_use]
    pub fn to_envelope(&self) -> Envelope {
        match self {
            Outbound::Reply(reply) => Envelope {
                id: Some(reply.id),
                kind: reply.kind.to_string(),
                data: reply_data(&reply.body),
            },
            Outbound::Notification(Notification::Log(record)) => Envelope {
                id: None,
                kind: kind::LOG.to_string(),
                data: json!(record),
            },
            Outbound::Notification(Notification::Progress(update)) => Envelope {
                id: None,
                kind: kind::PROGRESS.to_string(),
                data: json!(update),
            },
            Outbound::Notification(Notification::Download(progress)) => Envelope {
                id: None,
                kind: kind::DOWNLOAD.to_string(),
                data: json!(progress),
            },
        }
    }
}

fn reply_data(body: &ReplyBody) -> Value {
    match body {
        ReplyBody::Loaded { first } => json!(first),
        ReplyBody::Exited { code } => json!(code),
        ReplyBody::Done => json!(true),
        ReplyBody::File(FileData::Text(text)) => json!(text),
        ReplyBody::File(FileData::Binary(bytes)) => json!(bytes),
        ReplyBody::Listing { entries } => json!(entries),
        ReplyBody::Error { message } => json!(message),
    }
}
