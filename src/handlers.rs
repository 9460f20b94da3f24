//! Command handlers: pure translations from typed payloads to typed results
//! against the engine instance.
//!
//! Path validation and existence checks are entirely the engine's business;
//! its errors propagate unmodified to the router.

use crate::engine::Engine;
use crate::error::{EngineError, HostResult};
use crate::protocol::{Encoding, FileData, ReplyBody};

/// Holds the engine's execution slot for the duration of one invocation.
///
/// Reset is unconditional: the slot is released on drop, so residual
/// result/timeout state is cleared even when execution fails.
struct ExecSlot<'a> {
    engine: &'a mut dyn Engine,
}

impl<'a> ExecSlot<'a> {
    fn acquire(engine: &'a mut dyn Engine, timeout_ms: i64) -> Self {
        engine.set_timeout(timeout_ms);
        Self { engine }
    }

    fn run(&mut self, args: &[String]) -> Result<(), EngineError> {
        self.engine.exec(args)
    }

    fn exit_code(&self) -> i32 {
        self.engine.exit_code()
    }
}

impl Drop for ExecSlot<'_> {
    fn drop(&mut self) {
        self.engine.reset();
    }
}

/// Runs the engine synchronously and returns its exit code.
pub(crate) fn exec(engine: &mut dyn Engine, args: &[String], timeout_ms: i64) -> HostResult<ReplyBody> {
    let mut slot = ExecSlot::acquire(engine, timeout_ms);
    slot.run(args)?;
    let code = slot.exit_code();
    Ok(ReplyBody::Exited { code })
}

pub(crate) fn write_file(engine: &mut dyn Engine, path: &str, data: &[u8]) -> HostResult<ReplyBody> {
    engine.write_file(path, data)?;
    Ok(ReplyBody::Done)
}

pub(crate) fn read_file(
    engine: &mut dyn Engine,
    path: &str,
    encoding: Encoding,
) -> HostResult<ReplyBody> {
    let bytes = engine.read_file(path)?;
    let data = match encoding {
        Encoding::Binary => FileData::Binary(bytes),
        Encoding::Utf8 => {
            let text = String::from_utf8(bytes).map_err(|e| EngineError::Filesystem {
                op: "readFile",
                path: path.to_string(),
                message: format!("not valid UTF-8: {e}"),
            })?;
            FileData::Text(text)
        }
    };
    Ok(ReplyBody::File(data))
}

pub(crate) fn delete_file(engine: &mut dyn Engine, path: &str) -> HostResult<ReplyBody> {
    engine.delete_file(path)?;
    Ok(ReplyBody::Done)
}

pub(crate) fn rename(engine: &mut dyn Engine, old_path: &str, new_path: &str) -> HostResult<ReplyBody> {
    engine.rename(old_path, new_path)?;
    Ok(ReplyBody::Done)
}

pub(crate) fn create_dir(engine: &mut dyn Engine, path: &str) -> HostResult<ReplyBody> {
    engine.create_dir(path)?;
    Ok(ReplyBody::Done)
}

pub(crate) fn list_dir(engine: &mut dyn Engine, path: &str) -> HostResult<ReplyBody> {
    let entries = engine.list_dir(path)?;
    Ok(ReplyBody::Listing { entries })
}

pub(crate) fn delete_dir(engine: &mut dyn Engine, path: &str) -> HostResult<ReplyBody> {
    engine.delete_dir(path)?;
    Ok(ReplyBody::Done)
}
