//! Command dispatcher - turns commands into frames and correlates replies.
//!
//! Every dispatch registers its pending operation with the [`Router`]
//! before the frame is queued, so a fast reply cannot be missed:
//! - post and critical commands are acknowledged on the shared status
//!   stream, so they take the next slot in the status bucket and fail
//!   when the acknowledgement is an `_err` frame;
//! - get and status commands wait for the next frame carrying their own
//!   event name;
//! - async commands get no reply and resolve as soon as they are queued.
//!
//! Registration and queuing happen under one lock, so status slots are
//! taken in the same order the frames reach the board. A wait that times
//! out gives its slot back.

mod command;
mod commands;

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

pub use command::{resolve_call, CallTarget, CommandRecord};
pub use commands::{ChannelModeTable, ValueOptions};

use crate::codec::Arg;
use crate::error::{DyioError, Result};
use crate::promise::Promise;
use crate::protocol::{decode, BoardId, Lookup, MethodType};
use crate::router::{Event, EventPayload, HandlerId, Router, STATUS};
use crate::writer::WriterHandle;

/// A dispatched command and its reply registration.
#[derive(Clone)]
pub struct PendingOperation {
    promise: Promise<Event>,
    registration: Option<(String, HandlerId)>,
}

impl PendingOperation {
    pub fn promise(&self) -> &Promise<Event> {
        &self.promise
    }

    pub fn into_promise(self) -> Promise<Event> {
        self.promise
    }

    /// Event the reply is correlated on (`status` for post and critical),
    /// or `None` for async commands.
    pub fn awaiting(&self) -> Option<&str> {
        self.registration.as_ref().map(|(event, _)| event.as_str())
    }

    pub fn is_pending(&self) -> bool {
        self.promise.is_pending()
    }
}

impl std::fmt::Debug for PendingOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingOperation")
            .field("awaiting", &self.awaiting())
            .field("state", &self.promise.state())
            .finish()
    }
}

/// Sends commands and hands back promises for their replies. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    router: Router,
    writer: WriterHandle,
    board_id: Arc<RwLock<BoardId>>,
    command_timeout: Option<Duration>,
    send_order: Arc<tokio::sync::Mutex<()>>,
}

impl Dispatcher {
    pub fn new(
        router: Router,
        writer: WriterHandle,
        board_id: Arc<RwLock<BoardId>>,
        command_timeout: Option<Duration>,
    ) -> Self {
        Self {
            router,
            writer,
            board_id,
            command_timeout,
            send_order: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn lookup(&self) -> &Arc<Lookup> {
        self.router.lookup()
    }

    /// Board id stamped on outgoing frames.
    pub fn board_id(&self) -> BoardId {
        *self.board_id.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_board_id(&self, board_id: BoardId) {
        *self.board_id.write().unwrap_or_else(PoisonError::into_inner) = board_id;
    }

    /// Dispatch by name: `get_channel_modes`, `set_channel_mode`, `ping`, ...
    ///
    /// Fails immediately with [`DyioError::UnknownCommand`] when the name
    /// does not resolve to an rpc code.
    pub async fn call(
        &self,
        name: &str,
        method: Option<MethodType>,
        args: &[Arg],
    ) -> Result<PendingOperation> {
        let target = resolve_call(self.lookup(), name, method)?;
        self.dispatch(CommandRecord::from_target(target, args)).await
    }

    /// Send a command and return the pending operation for its reply.
    pub async fn dispatch(&self, record: CommandRecord) -> Result<PendingOperation> {
        let encoded = record.encode(self.board_id())?;
        let name = self.lookup().event_name(record.rpc().as_bytes());

        if record.method() == MethodType::Async {
            let frame = decode(&encoded)
                .ok_or_else(|| DyioError::Protocol("Encoded frame too short".to_string()))?;
            self.writer.send_encoded(encoded).await?;
            tracing::debug!("Dispatched async {}", name);
            return Ok(PendingOperation {
                promise: Promise::resolved(Event {
                    name,
                    frame,
                    payload: EventPayload::Dispatched,
                }),
                registration: None,
            });
        }

        let promise = pending_promise(&name);
        let correlated = record.method() == MethodType::Post || record.method() == MethodType::Critical;

        let pending = promise.clone();
        let lookup = self.lookup().clone();
        let order = self.send_order.lock().await;
        let registration = if correlated {
            let id = self.router.once_status(move |success, event| {
                let pending = pending.clone();
                let lookup = lookup.clone();
                async move {
                    if success {
                        pending.succeed(event);
                    } else {
                        let err = event
                            .remote_error()
                            .cloned()
                            .unwrap_or_else(|| lookup.remote_error(u8::MAX, u8::MAX));
                        pending.fail(err);
                    }
                    Ok(())
                }
            });
            (STATUS.to_string(), id)
        } else {
            let id = self.router.once(&name, move |event| {
                let pending = pending.clone();
                async move {
                    pending.succeed(event);
                    Ok(())
                }
            });
            (name.clone(), id)
        };

        if let Err(e) = self.writer.send_encoded(encoded).await {
            self.router.remove(&registration.0, registration.1);
            return Err(e);
        }
        drop(order);

        tracing::debug!(
            "Dispatched {} {} ({} arg group(s)), awaiting {}",
            record.method(),
            name,
            record.args().len(),
            registration.0
        );
        Ok(PendingOperation {
            promise,
            registration: Some(registration),
        })
    }

    /// Dispatch and wait for the reply, bounded by the command timeout if set.
    pub async fn request(&self, record: CommandRecord) -> Result<Event> {
        let pending = self.dispatch(record).await?;
        self.wait(&pending).await
    }

    /// Wait for a reply, bounded by the command timeout if set.
    ///
    /// On timeout the reply registration is withdrawn, so the late reply
    /// (if any) cannot settle a later command. The promise stays pending.
    pub async fn wait(&self, pending: &PendingOperation) -> Result<Event> {
        let result = match self.command_timeout {
            Some(timeout) => pending.promise.wait_timeout(timeout).await,
            None => pending.promise.wait().await,
        };
        if matches!(result, Err(DyioError::Timeout)) && self.cancel(pending) {
            tracing::debug!("Withdrew unanswered {:?}", pending.awaiting());
        }
        result
    }

    /// Withdraw the reply registration of a still-pending operation.
    /// Returns `false` if the reply was already routed or none was expected.
    pub fn cancel(&self, pending: &PendingOperation) -> bool {
        match &pending.registration {
            Some((event, id)) if pending.is_pending() => self.router.remove(event, *id),
            _ => false,
        }
    }
}

/// A pending promise whose default resolver logs failures before running
/// the caller's continuations.
fn pending_promise(name: &str) -> Promise<Event> {
    let promise = Promise::new();
    let name = name.to_string();
    promise.set_default_resolver(move |settled, continuations| {
        if let Err(err) = &settled {
            tracing::debug!("{} failed: {}", name, err);
        }
        for continuation in continuations {
            continuation(settled.clone());
        }
    });
    promise
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promise::PromiseState;
    use crate::protocol::{encode_groups, rpc, FrameBuffer, RpcName};
    use crate::writer::{spawn_writer_task, WriterConfig};
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    struct Harness {
        dispatcher: Dispatcher,
        board: DuplexStream,
        frames: FrameBuffer,
    }

    impl Harness {
        fn new() -> Self {
            let (host, board) = duplex(4096);
            let (writer, _task) = spawn_writer_task(host, WriterConfig::default());
            let (router, _failures) = Router::new(Arc::new(Lookup::new()));
            let dispatcher = Dispatcher::new(
                router,
                writer,
                Arc::new(RwLock::new(BoardId::BROADCAST)),
                Some(Duration::from_secs(1)),
            );
            Self {
                dispatcher,
                board,
                frames: FrameBuffer::new(),
            }
        }

        async fn next_sent(&mut self) -> crate::protocol::Frame {
            let mut buf = [0u8; 512];
            loop {
                let n = self.board.read(&mut buf).await.unwrap();
                if let Some(frame) = self.frames.push(&buf[..n]).into_iter().next() {
                    return frame;
                }
            }
        }

        fn reply(&self, name: RpcName, method: MethodType, payload: &[u8]) {
            let bytes = encode_groups(name, method, BoardId::BROADCAST, 0x80, &[payload]).unwrap();
            self.dispatcher.router().incoming(&decode(&bytes).unwrap());
        }
    }

    #[tokio::test]
    async fn test_get_correlates_by_event_name() {
        let mut h = Harness::new();
        let promise = h
            .dispatcher
            .call("get_firmware_revision", None, &[])
            .await
            .unwrap();

        let sent = h.next_sent().await;
        assert_eq!(sent.rpc_name(), Some(rpc::FIRMWARE_REVISION));
        assert_eq!(sent.method, MethodType::Get);

        h.reply(rpc::READY, MethodType::Status, &[]);
        h.reply(rpc::FIRMWARE_REVISION, MethodType::Post, &[3, 8, 2, 0, 1, 9]);

        let event = h.dispatcher.wait(&promise).await.unwrap();
        assert_eq!(event.name, "firmware_revision");
    }

    #[tokio::test]
    async fn test_post_correlates_on_status() {
        let h = Harness::new();
        let promise = h
            .dispatcher
            .call("set_channel_mode", None, &[Arg::from(3u8), Arg::from(2u8), Arg::from(false)])
            .await
            .unwrap();

        h.reply(rpc::READY, MethodType::Status, &[]);
        let event = h.dispatcher.wait(&promise).await.unwrap();
        assert_eq!(event.name, "ready");
    }

    #[tokio::test]
    async fn test_error_status_fails_promise() {
        let h = Harness::new();
        let promise = h.dispatcher.call("critical_info", None, &[Arg::from("bot")]).await.unwrap();

        h.reply(rpc::ERROR, MethodType::Status, &[3, 3]);
        match h.dispatcher.wait(&promise).await {
            Err(DyioError::Remote(err)) => {
                assert_eq!(err.zone_name, "config");
                assert_eq!(err.section_name, "invalid_name_string");
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_async_resolves_immediately() {
        let mut h = Harness::new();
        let pending = h.dispatcher.call("async_ping", None, &[]).await.unwrap();
        assert_eq!(pending.awaiting(), None);

        match pending.promise().state() {
            PromiseState::Succeeded(event) => assert_eq!(event.payload, EventPayload::Dispatched),
            other => panic!("unexpected state {:?}", other),
        }
        assert_eq!(h.next_sent().await.method, MethodType::Async);
        assert_eq!(h.dispatcher.router().subscriber_count("status"), 0);
    }

    #[tokio::test]
    async fn test_unknown_command_fails_fast() {
        let h = Harness::new();
        let result = h.dispatcher.call("get_everything", None, &[]).await;
        assert!(matches!(result, Err(DyioError::UnknownCommand(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_request_times_out() {
        let h = Harness::new();
        let record = CommandRecord::new(rpc::POWER, MethodType::Get, &[]);
        let result = h.dispatcher.request(record).await;
        assert!(matches!(result, Err(DyioError::Timeout)));
        assert_eq!(h.dispatcher.router().subscriber_count("power"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_post_does_not_take_next_reply() {
        let h = Harness::new();
        let args = [Arg::from(3u8), Arg::from(2u8), Arg::from(false)];

        let first = h.dispatcher.call("set_channel_mode", None, &args).await.unwrap();
        assert_eq!(first.awaiting(), Some("status"));
        assert!(matches!(h.dispatcher.wait(&first).await, Err(DyioError::Timeout)));
        assert_eq!(h.dispatcher.router().subscriber_count("status"), 0);

        let second = h.dispatcher.call("set_channel_mode", None, &args).await.unwrap();
        h.reply(rpc::ERROR, MethodType::Status, &[2, 1]);
        match h.dispatcher.wait(&second).await {
            Err(DyioError::Remote(err)) => assert_eq!(err.section_name, "mode_not_set"),
            other => panic!("unexpected result {:?}", other),
        }
        assert!(first.is_pending());
    }

    #[tokio::test]
    async fn test_cancel_after_reply_is_a_no_op() {
        let h = Harness::new();
        let pending = h.dispatcher.call("ping", None, &[]).await.unwrap();
        h.reply(rpc::READY, MethodType::Status, &[]);
        h.dispatcher.wait(&pending).await.unwrap();
        assert!(!h.dispatcher.cancel(&pending));
    }
}
