//! Command routing.
//!
//! The router is the host's state machine: `unloaded` until the first
//! successful load, `loaded` for the rest of the worker's life. Every
//! inbound command produces exactly one reply carrying its correlation id,
//! whatever happens in between.

use log::{debug, warn};

use crate::engine::{Engine, EngineModule};
use crate::error::{HostError, HostResult};
use crate::handlers;
use crate::host::NotifySender;
use crate::loader;
use crate::protocol::{Command, CorrelationId, FileData, Reply, ReplyBody};
use crate::resolver::AssetResolver;

/// Everything a dispatch needs: the collaborators, the engine slot, and the
/// notification channel.
///
/// The engine slot is owned here, not in any ambient state; construction of
/// an instance happens exactly once per load under the worker's serialized
/// dispatch.
pub struct HostContext {
    pub(crate) resolver: Box<dyn AssetResolver>,
    pub(crate) module: Box<dyn EngineModule>,
    pub(crate) engine: Option<Box<dyn Engine>>,
    pub(crate) notify: NotifySender,
}

impl HostContext {
    pub(crate) fn new(
        resolver: Box<dyn AssetResolver>,
        module: Box<dyn EngineModule>,
        notify: NotifySender,
    ) -> Self {
        Self {
            resolver,
            module,
            engine: None,
            notify,
        }
    }

    /// Whether an engine instance currently exists.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.engine.is_some()
    }

    pub(crate) fn engine_mut(&mut self) -> HostResult<&mut (dyn Engine + 'static)> {
        self.engine
            .as_deref_mut()
            .map_or(Err(HostError::NotLoaded), Ok)
    }
}

/// Dispatches one command and produces its reply.
///
/// Never panics and never lets a handler failure escape: every error becomes
/// an error reply with the original id.
pub(crate) fn dispatch(ctx: &mut HostContext, id: CorrelationId, command: Command) -> Reply {
    let kind = command.kind();
    debug!("dispatching {kind} (id {id})");
    match run(ctx, command) {
        Ok(body) => {
            // Raw binary buffers are handed over, not duplicated.
            let transfer = matches!(body, ReplyBody::File(FileData::Binary(_)));
            Reply {
                id,
                kind,
                body,
                transfer,
            }
        }
        Err(err) => {
            warn!("{kind} (id {id}) failed: {err}");
            Reply::error(id, &err)
        }
    }
}

fn run(ctx: &mut HostContext, command: Command) -> HostResult<ReplyBody> {
    // Nothing runs before load completes.
    if !ctx.is_loaded() && !matches!(command, Command::Load(_)) {
        return Err(HostError::NotLoaded);
    }
    match command {
        Command::Load(config) => {
            let first = loader::load(ctx, config)?;
            Ok(ReplyBody::Loaded { first })
        }
        Command::Exec(payload) => {
            handlers::exec(ctx.engine_mut()?, &payload.args, payload.timeout)
        }
        Command::WriteFile(payload) => {
            handlers::write_file(ctx.engine_mut()?, &payload.path, &payload.data)
        }
        Command::ReadFile(payload) => {
            handlers::read_file(ctx.engine_mut()?, &payload.path, payload.encoding)
        }
        Command::DeleteFile(payload) => handlers::delete_file(ctx.engine_mut()?, &payload.path),
        Command::Rename(payload) => {
            handlers::rename(ctx.engine_mut()?, &payload.old_path, &payload.new_path)
        }
        Command::CreateDir(payload) => handlers::create_dir(ctx.engine_mut()?, &payload.path),
        Command::ListDir(payload) => handlers::list_dir(ctx.engine_mut()?, &payload.path),
        Command::DeleteDir(payload) => handlers::delete_dir(ctx.engine_mut()?, &payload.path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockModule, MockResolver};
    use crate::protocol::{kind, Encoding, ExecPayload, LoadConfig, PathPayload, ReadFilePayload, WriteFilePayload};
    use crate::test_support::test_notify;

    fn unloaded_ctx() -> HostContext {
        HostContext::new(
            Box::new(MockResolver::new()),
            Box::new(MockModule::new()),
            test_notify().0,
        )
    }

    fn loaded_ctx() -> HostContext {
        let mut ctx = unloaded_ctx();
        let reply = dispatch(
            &mut ctx,
            0,
            Command::Load(LoadConfig::new("file:///engine-core.js")),
        );
        assert_eq!(reply.body, ReplyBody::Loaded { first: true });
        ctx
    }

    #[test]
    fn non_load_commands_fail_fixed_while_unloaded() {
        let mut ctx = unloaded_ctx();
        let commands = vec![
            Command::Exec(ExecPayload {
                args: vec!["noop".to_string()],
                timeout: crate::engine::NO_TIMEOUT,
            }),
            Command::WriteFile(WriteFilePayload {
                path: "/a".to_string(),
                data: vec![1],
            }),
            Command::ReadFile(ReadFilePayload {
                path: "/a".to_string(),
                encoding: Encoding::Binary,
            }),
            Command::DeleteFile(PathPayload {
                path: "/a".to_string(),
            }),
            Command::ListDir(PathPayload {
                path: "/".to_string(),
            }),
        ];
        for (i, command) in commands.into_iter().enumerate() {
            let id = i as CorrelationId + 10;
            let reply = dispatch(&mut ctx, id, command);
            assert_eq!(reply.id, id);
            assert_eq!(reply.kind, kind::ERROR);
            let ReplyBody::Error { message } = &reply.body else {
                panic!("expected an error body");
            };
            assert_eq!(message, &HostError::NotLoaded.to_string());
        }
        assert!(!ctx.is_loaded());
    }

    #[test]
    fn load_transitions_to_loaded_and_stays() {
        let mut ctx = loaded_ctx();
        assert!(ctx.is_loaded());
        let reply = dispatch(
            &mut ctx,
            1,
            Command::Load(LoadConfig::new("file:///engine-core.js")),
        );
        assert_eq!(reply.body, ReplyBody::Loaded { first: false });
        assert!(ctx.is_loaded());
    }

    #[test]
    fn handler_failure_becomes_error_reply_with_same_id() {
        let mut ctx = loaded_ctx();
        let reply = dispatch(
            &mut ctx,
            42,
            Command::ReadFile(ReadFilePayload {
                path: "/missing".to_string(),
                encoding: Encoding::Binary,
            }),
        );
        assert_eq!(reply.id, 42);
        assert_eq!(reply.kind, kind::ERROR);
        // The worker survives; the next command is serviced normally.
        let reply = dispatch(
            &mut ctx,
            43,
            Command::WriteFile(WriteFilePayload {
                path: "/ok".to_string(),
                data: vec![1, 2, 3],
            }),
        );
        assert_eq!(reply.id, 43);
        assert_eq!(reply.body, ReplyBody::Done);
    }

    #[test]
    fn binary_read_is_marked_for_transfer() {
        let mut ctx = loaded_ctx();
        let bytes = vec![0_u8, 255, 7];
        dispatch(
            &mut ctx,
            1,
            Command::WriteFile(WriteFilePayload {
                path: "/clip.bin".to_string(),
                data: bytes.clone(),
            }),
        );
        let reply = dispatch(
            &mut ctx,
            2,
            Command::ReadFile(ReadFilePayload {
                path: "/clip.bin".to_string(),
                encoding: Encoding::Binary,
            }),
        );
        assert!(reply.transfer);
        assert_eq!(reply.body, ReplyBody::File(FileData::Binary(bytes)));
    }

    #[test]
    fn text_read_is_sent_by_value() {
        let mut ctx = loaded_ctx();
        dispatch(
            &mut ctx,
            1,
            Command::WriteFile(WriteFilePayload {
                path: "/notes.txt".to_string(),
                data: b"hello".to_vec(),
            }),
        );
        let reply = dispatch(
            &mut ctx,
            2,
            Command::ReadFile(ReadFilePayload {
                path: "/notes.txt".to_string(),
                encoding: Encoding::Utf8,
            }),
        );
        assert!(!reply.transfer);
        assert_eq!(
            reply.body,
            ReplyBody::File(FileData::Text("hello".to_string()))
        );
    }
}
