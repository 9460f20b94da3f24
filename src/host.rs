//! The host runtime: a dedicated worker thread that drains inbound commands,
//! dispatches them against the engine, and emits replies and notifications
//! on a bounded outbound channel.
//!
//! Commands are processed one at a time, to completion, in arrival order.
//! This serializes loads by construction: two load commands can never
//! interleave their resolution steps, so the "first" flag and the installed
//! instance are always well-defined.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::debug;

use crate::engine::EngineModule;
use crate::error::{HostError, HostResult};
use crate::protocol::{
    Command, CorrelationId, DownloadProgress, Envelope, LogRecord, Notification, Outbound,
    ProgressUpdate, Reply,
};
use crate::resolver::AssetResolver;
use crate::router::{self, HostContext};

/// Host runtime configuration.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Maximum queued inbound commands before submission applies
    /// backpressure.
    pub command_queue_capacity: usize,
    /// Maximum queued outbound messages. Notifications are dropped (and
    /// counted) when this fills; replies block the worker instead.
    pub outbound_queue_capacity: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            command_queue_capacity: 64,
            outbound_queue_capacity: 1024,
        }
    }
}

/// Fire-and-forget emission channel for engine and resolver events.
///
/// Cloned into the engine's logger/progress callbacks at instantiation time
/// and used by the loader for download progress. Emission never blocks: a
/// saturated outbound channel drops the notification and bumps a counter.
#[derive(Clone)]
pub struct NotifySender {
    tx: Sender<Outbound>,
    dropped: Arc<AtomicU64>,
}

impl NotifySender {
    pub(crate) fn new(tx: Sender<Outbound>, dropped: Arc<AtomicU64>) -> Self {
        Self { tx, dropped }
    }

    /// Emits an engine log record.
    pub fn log(&self, record: LogRecord) {
        self.send(Notification::Log(record));
    }

    /// Emits an engine progress update.
    pub fn progress(&self, update: ProgressUpdate) {
        self.send(Notification::Progress(update));
    }

    /// Emits resolver download progress.
    pub fn download(&self, progress: DownloadProgress) {
        self.send(Notification::Download(progress));
    }

    fn send(&self, notification: Notification) {
        if self
            .tx
            .try_send(Outbound::Notification(notification))
            .is_err()
        {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// An inbound message queued for the worker.
///
/// `command` is `Err` when envelope decoding already failed; the worker
/// still answers it with a correlated error reply.
#[derive(Debug)]
pub struct InboundMessage {
    id: CorrelationId,
    command: HostResult<Command>,
}

/// The engine host.
///
/// Owns the worker thread and both channel endpoints. Dropping the host (or
/// calling [`EngineHost::shutdown`]) closes the inbound channel; the worker
/// drains what is queued and exits.
pub struct EngineHost {
    cmd_tx: Option<Sender<InboundMessage>>,
    outbound_rx: Receiver<Outbound>,
    dropped_notifications: Arc<AtomicU64>,
    command_queue_capacity: usize,
    join: Option<JoinHandle<()>>,
}

impl EngineHost {
    /// Starts the host worker with the given collaborators.
    #[must_use]
    pub fn start(
        config: HostConfig,
        resolver: Box<dyn AssetResolver>,
        module: Box<dyn EngineModule>,
    ) -> Self {
        let command_queue_capacity = config.command_queue_capacity.max(1);
        let outbound_queue_capacity = config.outbound_queue_capacity.max(1);

        let (cmd_tx, cmd_rx) = bounded::<InboundMessage>(command_queue_capacity);
        let (out_tx, outbound_rx) = bounded::<Outbound>(outbound_queue_capacity);

        let dropped_notifications = Arc::new(AtomicU64::new(0));
        let notify = NotifySender::new(out_tx.clone(), Arc::clone(&dropped_notifications));

        let join = thread::Builder::new()
            .name("enginehost-worker".to_string())
            .spawn(move || worker_loop(resolver, module, notify, &cmd_rx, &out_tx))
            .expect("failed to spawn enginehost worker");

        Self {
            cmd_tx: Some(cmd_tx),
            outbound_rx,
            dropped_notifications,
            command_queue_capacity,
            join: Some(join),
        }
    }

    /// Submits a typed command for dispatch.
    ///
    /// Non-blocking; a full queue yields [`HostError::QueueFull`].
    pub fn submit(&self, id: CorrelationId, command: Command) -> HostResult<()> {
        self.enqueue(InboundMessage {
            id,
            command: Ok(command),
        })
    }

    /// Submits a raw wire envelope.
    ///
    /// Decoding failures are not surfaced here: they travel through the
    /// worker and come back as a correlated error reply, like any other
    /// dispatch failure. An envelope without an id is answered with id 0.
    pub fn submit_envelope(&self, envelope: &Envelope) -> HostResult<()> {
        self.enqueue(InboundMessage {
            id: envelope.id.unwrap_or_default(),
            command: Command::from_envelope(envelope),
        })
    }

    fn enqueue(&self, message: InboundMessage) -> HostResult<()> {
        let Some(tx) = self.cmd_tx.as_ref() else {
            return Err(HostError::Disconnected);
        };
        match tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(HostError::QueueFull {
                capacity: self.command_queue_capacity,
            }),
            Err(TrySendError::Disconnected(_)) => Err(HostError::Disconnected),
        }
    }

    /// The outbound message stream: replies and notifications, in emission
    /// order. Clone freely; crossbeam receivers share the queue.
    #[must_use]
    pub fn outbound(&self) -> Receiver<Outbound> {
        self.outbound_rx.clone()
    }

    /// Notifications dropped so far because the outbound channel was full.
    #[must_use]
    pub fn dropped_notifications(&self) -> u64 {
        self.dropped_notifications.load(Ordering::Relaxed)
    }

    /// Closes the inbound channel, lets the worker drain queued commands,
    /// and joins it.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        drop(self.cmd_tx.take());
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for EngineHost {
    fn drop(&mut self) {
        self.close();
    }
}

fn worker_loop(
    resolver: Box<dyn AssetResolver>,
    module: Box<dyn EngineModule>,
    notify: NotifySender,
    cmd_rx: &Receiver<InboundMessage>,
    out_tx: &Sender<Outbound>,
) {
    let mut ctx = HostContext::new(resolver, module, notify);
    while let Ok(message) = cmd_rx.recv() {
        let reply = match message.command {
            Ok(command) => router::dispatch(&mut ctx, message.id, command),
            Err(err) => {
                debug!("rejecting undecodable command {}: {err}", message.id);
                Reply::error(message.id, &err)
            }
        };
        // Replies are never dropped: every command gets exactly one.
        if out_tx.send(Outbound::Reply(reply)).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockModule, MockResolver};
    use crate::protocol::{kind, ExecPayload, LoadConfig, ReplyBody};
    use std::time::Duration;

    fn recv_reply(rx: &Receiver<Outbound>) -> Reply {
        loop {
            match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                Outbound::Reply(reply) => return reply,
                Outbound::Notification(_) => {}
            }
        }
    }

    #[test]
    fn processes_commands_in_arrival_order() {
        let host = EngineHost::start(
            HostConfig::default(),
            Box::new(MockResolver::new()),
            Box::new(MockModule::new()),
        );
        let rx = host.outbound();

        host.submit(1, Command::Load(LoadConfig::new("file:///engine-core.js")))
            .unwrap();
        host.submit(
            2,
            Command::Exec(ExecPayload {
                args: vec!["noop".to_string()],
                timeout: crate::engine::NO_TIMEOUT,
            }),
        )
        .unwrap();

        let first = recv_reply(&rx);
        let second = recv_reply(&rx);
        assert_eq!(first.id, 1);
        assert_eq!(first.kind, kind::LOAD);
        assert_eq!(second.id, 2);
        assert_eq!(second.body, ReplyBody::Exited { code: 0 });
    }

    #[test]
    fn submit_after_shutdown_is_disconnected() {
        let mut host = EngineHost::start(
            HostConfig::default(),
            Box::new(MockResolver::new()),
            Box::new(MockModule::new()),
        );
        host.close();
        let err = host
            .submit(1, Command::Load(LoadConfig::new("file:///engine-core.js")))
            .unwrap_err();
        assert!(matches!(err, HostError::Disconnected));
    }

    #[test]
    fn shutdown_drains_queued_commands() {
        let host = EngineHost::start(
            HostConfig::default(),
            Box::new(MockResolver::new()),
            Box::new(MockModule::new()),
        );
        let rx = host.outbound();
        host.submit(1, Command::Load(LoadConfig::new("file:///engine-core.js")))
            .unwrap();
        host.shutdown();
        assert_eq!(recv_reply(&rx).id, 1);
    }
}
