//! Session builder and lifecycle.
//!
//! The [`SessionBuilder`] configures a connection; [`SessionBuilder::connect`]
//! takes any byte stream to the board and brings the session up:
//! 1. Spawn the writer task and the read loop
//! 2. Power-on handshake (seeds voltage and bank states)
//! 3. Ask the board to expect a heartbeat, then start sending one
//! 4. Resync: firmware, info and the channel-mode table
//!
//! # Example
//!
//! ```ignore
//! use dyio_client::{ChannelMode, Session};
//!
//! #[tokio::main]
//! async fn main() -> dyio_client::Result<()> {
//!     let port = open_serial_port("/dev/ttyACM0")?;
//!     let session = Session::builder()
//!         .heartbeat_period(std::time::Duration::from_millis(1000))
//!         .connect(port)
//!         .await?;
//!
//!     let mut led = session.channel(4, ChannelMode::DigitalOut, false).await?;
//!     led.set_value(1).await?;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::channel::{Bank, BankState, BoardContext, Channel, ChannelMode, CHANNEL_COUNT};
use crate::config::SessionConfig;
use crate::dispatcher::{CommandRecord, Dispatcher, PendingOperation};
use crate::error::{DyioError, Result};
use crate::protocol::{rpc, BoardId, FrameBuffer, Lookup, MethodType};
use crate::router::{ChannelModeEntry, FirmwareRevision, HandlerFailure, PowerState, Router};
use crate::writer::{spawn_writer_task, WriterConfig};

/// Default keep-alive period.
pub const DEFAULT_HEARTBEAT_PERIOD: Duration = Duration::from_millis(3000);

const READ_BUFFER_SIZE: usize = 4096;
const EVENT_CAPACITY: usize = 16;

/// Session-level notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The transport reached EOF or failed. Nothing is retried.
    Unbound { reason: String },
}

/// Builder for configuring and connecting a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    board_id: BoardId,
    heartbeat_period: Duration,
    brownout_detection: bool,
    writer_config: WriterConfig,
    command_timeout: Option<Duration>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            board_id: BoardId::BROADCAST,
            heartbeat_period: DEFAULT_HEARTBEAT_PERIOD,
            brownout_detection: true,
            writer_config: WriterConfig::default(),
            command_timeout: None,
        }
    }

    /// Build from a loaded configuration.
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        let mut builder = Self::new()
            .board_id(config.board_id.parse()?)
            .heartbeat_period(Duration::from_millis(config.heartbeat_period_ms))
            .brownout_detection(config.brownout_detection)
            .channel_capacity(config.channel_capacity);
        if let Some(ms) = config.command_timeout_ms {
            builder = builder.command_timeout(Duration::from_millis(ms));
        }
        Ok(builder)
    }

    /// Board id stamped on outgoing frames until resync adopts the board's own.
    ///
    /// Default: broadcast
    pub fn board_id(mut self, board_id: BoardId) -> Self {
        self.board_id = board_id;
        self
    }

    /// Keep-alive period. Zero disables the local keep-alive sender.
    ///
    /// Default: 3 seconds
    pub fn heartbeat_period(mut self, period: Duration) -> Self {
        self.heartbeat_period = period;
        self
    }

    /// Whether servo modes are refused on banks running from the regulator.
    ///
    /// Default: true
    pub fn brownout_detection(mut self, enabled: bool) -> Self {
        self.brownout_detection = enabled;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.writer_config.channel_capacity = capacity;
        self
    }

    /// Bound every command wait. Without it an unanswered command waits
    /// forever.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Connect over `stream` and bring the session up.
    pub async fn connect<S>(self, stream: S) -> Result<Session>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (writer, writer_task) = spawn_writer_task(write_half, self.writer_config);

        let (router, failures) = Router::new(Arc::new(Lookup::new()));
        let board_id = Arc::new(RwLock::new(self.board_id));
        let dispatcher = Dispatcher::new(router.clone(), writer, board_id, self.command_timeout);

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let reader_task = tokio::spawn(read_loop(read_half, router, events.clone()));

        let session = Session {
            core: Arc::new(SessionCore {
                dispatcher,
                state: RwLock::new(BoardState::default()),
                brownout_detection: self.brownout_detection,
            }),
            heartbeat: Mutex::new(None),
            events,
            failures: Mutex::new(Some(failures)),
            reader_task,
            writer_task,
        };

        session.power_on().await?;

        let period_ms = u16::try_from(self.heartbeat_period.as_millis()).unwrap_or(u16::MAX);
        session.core.dispatcher.start_heartbeat(period_ms).await?;
        session.launch_heartbeat(self.heartbeat_period);

        session.resync().await?;
        tracing::debug!("Session bound to {}", session.board_id());
        Ok(session)
    }

    /// Connect, then run `continuation` with the session once resync is done.
    pub async fn connect_with<S, F, Fut, T>(self, stream: S, continuation: F) -> Result<T>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let session = self.connect(stream).await?;
        continuation(session).await
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
pub(crate) struct BoardState {
    firmware: Option<FirmwareRevision>,
    info: Option<String>,
    power: Option<PowerState>,
    channels: Vec<ChannelModeEntry>,
}

/// The part of a session channels hold on to (weakly).
pub(crate) struct SessionCore {
    pub(crate) dispatcher: Dispatcher,
    state: RwLock<BoardState>,
    brownout_detection: bool,
}

impl SessionCore {
    pub(crate) fn board_context(&self) -> BoardContext {
        BoardContext {
            brownout_detection: self.brownout_detection,
            banks: self.read_state().power.map(|power| power.banks),
        }
    }

    /// Keep the cached channel table in step with a channel's applied mode.
    pub(crate) fn record_mode(&self, channel: u8, mode: ChannelMode) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = state.channels.get_mut(usize::from(channel)) {
            entry.code = mode.code();
            entry.mode = mode;
            entry.editable = true;
        }
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, BoardState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, BoardState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A live connection to one board.
///
/// Dropping the session stops the heartbeat, the read loop and the writer.
pub struct Session {
    core: Arc<SessionCore>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<SessionEvent>,
    failures: Mutex<Option<mpsc::UnboundedReceiver<HandlerFailure>>>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<Result<()>>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.core.dispatcher
    }

    pub fn router(&self) -> &Router {
        self.core.dispatcher.router()
    }

    pub fn board_id(&self) -> BoardId {
        self.core.dispatcher.board_id()
    }

    /// Change the board id used for outgoing frames.
    ///
    /// Accepts anything convertible to a [`BoardId`]: a colon-hex string,
    /// a byte slice or an integer. On error the current id is kept.
    pub fn set_board_id<I>(&self, id: I) -> Result<()>
    where
        I: TryInto<BoardId, Error = DyioError>,
    {
        self.core.dispatcher.set_board_id(id.try_into()?);
        Ok(())
    }

    pub fn firmware(&self) -> Option<FirmwareRevision> {
        self.core.read_state().firmware
    }

    pub fn info(&self) -> Option<String> {
        self.core.read_state().info.clone()
    }

    /// Last power-on reply.
    pub fn power(&self) -> Option<PowerState> {
        self.core.read_state().power
    }

    pub fn battery_voltage(&self) -> Option<f64> {
        self.power().map(|power| power.voltage)
    }

    pub fn bank_state(&self, bank: Bank) -> Option<BankState> {
        self.power().map(|power| power.banks[bank.index()])
    }

    /// Bank state by index: 0 for bank A, 1 for bank B.
    pub fn bank_state_at(&self, index: usize) -> Option<BankState> {
        Bank::from_index(index).and_then(|bank| self.bank_state(bank))
    }

    pub fn brownout_detection(&self) -> bool {
        self.core.brownout_detection
    }

    /// Channel-mode table as of the last resync, updated by channel handles.
    pub fn channel_modes(&self) -> Vec<ChannelModeEntry> {
        self.core.read_state().channels.clone()
    }

    /// Open a handle on channel `number`, putting it into `mode`.
    pub async fn channel(&self, number: u8, mode: ChannelMode, locked: bool) -> Result<Channel> {
        Channel::open(Arc::downgrade(&self.core), number, mode, locked).await
    }

    /// Repeat the power-on handshake and cache the reply.
    pub async fn power_on(&self) -> Result<PowerState> {
        let power = self.core.dispatcher.power_on().await?;
        tracing::debug!(
            "Power on: {:.3} V, banks {:?}",
            power.voltage,
            power.banks
        );
        self.core.write_state().power = Some(power);
        Ok(power)
    }

    /// Refresh firmware and info if unknown, then the channel-mode table.
    ///
    /// Channels reporting an unmapped mode are put back into `digital_in`.
    pub async fn resync(&self) -> Result<()> {
        let dispatcher = &self.core.dispatcher;

        if self.firmware().is_none() {
            let firmware = dispatcher.get_firmware_revision().await?;
            self.core.write_state().firmware = Some(firmware);
        }
        if self.info().is_none() {
            let info = dispatcher.get_info().await?;
            self.core.write_state().info = Some(info);
        }

        let table = dispatcher.get_channel_modes().await?;
        if table.board_id != dispatcher.board_id() {
            tracing::debug!("Adopting board id {}", table.board_id);
            dispatcher.set_board_id(table.board_id);
        }

        let count = table.entries.len();
        if count == 0 {
            return Err(DyioError::InsufficientChannels(count));
        }
        if count > CHANNEL_COUNT {
            return Err(DyioError::Protocol(format!(
                "Board reported {} channels, at most {} supported",
                count, CHANNEL_COUNT
            )));
        }

        for (channel, entry) in table.entries.iter().enumerate() {
            if !entry.editable {
                tracing::warn!(
                    "Channel {} reported unmapped mode 0x{:02x}, resetting to {}",
                    channel,
                    entry.code,
                    ChannelMode::DigitalIn
                );
                // count <= CHANNEL_COUNT, so the index fits
                dispatcher
                    .set_channel_mode(channel as u8, ChannelMode::DigitalIn, false)
                    .await?;
            }
        }

        let entries = table
            .entries
            .into_iter()
            .map(|entry| ChannelModeEntry {
                code: entry.mode.code(),
                editable: true,
                ..entry
            })
            .collect();
        self.core.write_state().channels = entries;
        Ok(())
    }

    /// Start sending a ping every `period`, replacing any running keep-alive.
    pub fn launch_heartbeat(&self, period: Duration) {
        if period.is_zero() {
            self.cancel_heartbeat();
            return;
        }

        let dispatcher = self.core.dispatcher.clone();
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last = None;
            loop {
                ticker.tick().await;
                tracing::trace!("Heartbeat");
                if let Err(e) = send_heartbeat(&dispatcher, &mut last).await {
                    tracing::debug!("Heartbeat stopped: {}", e);
                    break;
                }
            }
        });

        let previous = self
            .heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Stop the keep-alive. Returns `false` if none was running.
    pub fn cancel_heartbeat(&self) -> bool {
        let running = self
            .heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match running {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    /// Subscribe to session-level events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Take the receiver of failed router handlers. Only the first call
    /// gets it.
    pub fn take_handler_failures(&self) -> Option<mpsc::UnboundedReceiver<HandlerFailure>> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Whether the read loop is still running.
    pub fn is_bound(&self) -> bool {
        !self.reader_task.is_finished()
    }

    /// Close the session, stopping every background task.
    pub fn close(self) {
        tracing::debug!("Closing session for {}", self.board_id());
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel_heartbeat();
        self.reader_task.abort();
        self.writer_task.abort();
    }
}

/// One keep-alive tick. The ping is a post, so it takes its own slot in the
/// status bucket like any other post. A ping still unanswered from the
/// previous tick gives its slot back.
async fn send_heartbeat(dispatcher: &Dispatcher, last: &mut Option<PendingOperation>) -> Result<()> {
    if let Some(previous) = last.take() {
        if dispatcher.cancel(&previous) {
            tracing::debug!("Heartbeat ping went unanswered");
        }
    }
    let ping = CommandRecord::new(rpc::PING, MethodType::Post, &[]);
    *last = Some(dispatcher.dispatch(ping).await?);
    Ok(())
}

/// Read loop - splits the byte stream into frames and routes them.
async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: R,
    router: Router,
    events: broadcast::Sender<SessionEvent>,
) {
    let mut frames = FrameBuffer::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    let reason = loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break "Transport closed".to_string(),
            Ok(n) => n,
            Err(e) => {
                tracing::error!("Read loop error: {}", e);
                break e.to_string();
            }
        };

        for frame in frames.push(&buf[..n]) {
            if let Err(e) = frame.validate() {
                tracing::warn!("{} frame {}: {}", frame.method, frame.rpc_str(), e);
            }
            tracing::debug!("Received {} {}", frame.method, frame.rpc_str());
            router.incoming(&frame);
        }
    };

    tracing::debug!("Session unbound: {}", reason);
    let _ = events.send(SessionEvent::Unbound { reason });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Arg;
    use crate::protocol::{decode, encode_groups, Frame, RpcName};

    fn quiet_dispatcher() -> (Dispatcher, tokio::io::DuplexStream) {
        let (host, board) = tokio::io::duplex(4096);
        let (writer, _task) = spawn_writer_task(host, WriterConfig::default());
        let (router, _failures) = Router::new(Arc::new(Lookup::new()));
        let dispatcher = Dispatcher::new(
            router,
            writer,
            Arc::new(RwLock::new(BoardId::BROADCAST)),
            Some(Duration::from_secs(1)),
        );
        (dispatcher, board)
    }

    fn status(name: RpcName, payload: &[u8]) -> Frame {
        let bytes = encode_groups(name, MethodType::Status, BoardId::BROADCAST, 0x80, &[payload]).unwrap();
        decode(&bytes).unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let builder = SessionBuilder::default();
        assert!(builder.board_id.is_broadcast());
        assert_eq!(builder.heartbeat_period, DEFAULT_HEARTBEAT_PERIOD);
        assert!(builder.brownout_detection);
        assert_eq!(builder.writer_config.channel_capacity, 1024);
        assert_eq!(builder.command_timeout, None);
    }

    #[test]
    fn test_builder_configuration() {
        let builder = Session::builder()
            .board_id(BoardId::new([1, 2, 3, 4, 5, 6]))
            .heartbeat_period(Duration::from_millis(500))
            .brownout_detection(false)
            .channel_capacity(64)
            .command_timeout(Duration::from_secs(2));

        assert_eq!(builder.board_id.to_string(), "01:02:03:04:05:06");
        assert_eq!(builder.heartbeat_period, Duration::from_millis(500));
        assert!(!builder.brownout_detection);
        assert_eq!(builder.writer_config.channel_capacity, 64);
        assert_eq!(builder.command_timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_builder_from_config() {
        let config = SessionConfig::from_json_str(
            r#"{"board_id": "74:f7:26:00:00:1a", "command_timeout_ms": 250}"#,
        )
        .unwrap();
        let builder = SessionBuilder::from_config(&config).unwrap();
        assert_eq!(builder.board_id.to_string(), "74:f7:26:00:00:1a");
        assert_eq!(builder.command_timeout, Some(Duration::from_millis(250)));
        assert_eq!(builder.heartbeat_period, DEFAULT_HEARTBEAT_PERIOD);
    }

    #[test]
    fn test_builder_from_config_rejects_bad_board_id() {
        let config = SessionConfig::from_json_str(r#"{"board_id": "nope"}"#).unwrap();
        assert!(matches!(
            SessionBuilder::from_config(&config),
            Err(DyioError::InvalidBoardId(_))
        ));
    }

    #[tokio::test]
    async fn test_read_loop_reports_unbound_on_eof() {
        let (host, board) = tokio::io::duplex(64);
        let (router, _failures) = Router::new(Arc::new(Lookup::new()));
        let (events, mut rx) = broadcast::channel(4);

        let task = tokio::spawn(read_loop(host, router, events));
        drop(board);
        task.await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            SessionEvent::Unbound {
                reason: "Transport closed".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_heartbeat_ping_keeps_status_replies_aligned() {
        let (dispatcher, _board) = quiet_dispatcher();
        let router = dispatcher.router().clone();

        let mut last = None;
        send_heartbeat(&dispatcher, &mut last).await.unwrap();
        let post = dispatcher
            .call("set_channel_mode", None, &[Arg::from(3u8), Arg::from(2u8), Arg::from(false)])
            .await
            .unwrap();
        assert_eq!(router.subscriber_count("status"), 2);

        // The ping's acknowledgement, then the post's error.
        router.incoming(&status(rpc::READY, &[]));
        router.incoming(&status(rpc::ERROR, &[2, 1]));

        match dispatcher.wait(&post).await {
            Err(DyioError::Remote(err)) => assert_eq!(err.section_name, "mode_not_set"),
            other => panic!("unexpected result {:?}", other),
        }
        let ping = last.unwrap();
        assert_eq!(ping.promise().wait().await.unwrap().name, "ready");
    }

    #[tokio::test]
    async fn test_unanswered_heartbeat_gives_slot_back() {
        let (dispatcher, _board) = quiet_dispatcher();

        let mut last = None;
        send_heartbeat(&dispatcher, &mut last).await.unwrap();
        send_heartbeat(&dispatcher, &mut last).await.unwrap();
        send_heartbeat(&dispatcher, &mut last).await.unwrap();

        assert_eq!(dispatcher.router().subscriber_count("status"), 1);
        assert!(last.unwrap().is_pending());
    }
}
