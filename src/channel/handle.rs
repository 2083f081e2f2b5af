//! Per-channel handle: cached mode, lock and async flags, value access and
//! change notifications.
//!
//! A [`Channel`] is owned by whatever peripheral code created it and keeps
//! only a weak reference to its session; once the session is gone every
//! board operation fails with [`DyioError::SessionClosed`].

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use bytes::Bytes;

use super::mode::ChannelMode;
use super::validation::{validate_mode, CHANNEL_COUNT};
use crate::dispatcher::ValueOptions;
use crate::error::{DyioError, Result};
use crate::router::{channel_value, BoxFuture, EventPayload, HandlerId, HandlerResult};
use crate::session::SessionCore;

const CHANNEL_VALUES: &str = "channel_values";

/// A reported change of one channel's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelChange {
    pub channel: u8,
    pub raw: Bytes,
    /// `raw` decoded for the channel's mode at the time of the report.
    pub value: i64,
}

/// Identifies a change handler, for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChangeHandlerId(u64);

type ChangeHandler = Arc<dyn Fn(ChannelChange) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

struct ChangeState {
    channel: u8,
    mode: ChannelMode,
    last: Option<Bytes>,
    next: VecDeque<(ChangeHandlerId, ChangeHandler)>,
    every: Vec<(ChangeHandlerId, ChangeHandler)>,
    next_id: u64,
}

impl ChangeState {
    fn is_empty(&self) -> bool {
        self.next.is_empty() && self.every.is_empty()
    }

    /// Record a reported group; returns the handlers to run if it changed.
    fn observe(&mut self, raw: &Bytes) -> Option<(ChannelChange, Vec<ChangeHandler>)> {
        if self.last.as_ref() == Some(raw) {
            return None;
        }
        self.last = Some(raw.clone());

        let mut handlers = Vec::with_capacity(self.every.len() + 1);
        if let Some((_, handler)) = self.next.pop_front() {
            handlers.push(handler);
        }
        handlers.extend(self.every.iter().map(|(_, handler)| handler.clone()));

        let change = ChannelChange {
            channel: self.channel,
            raw: raw.clone(),
            value: channel_value(raw, self.mode),
        };
        Some((change, handlers))
    }
}

/// One configurable I/O line on the board.
pub struct Channel {
    session: Weak<SessionCore>,
    number: u8,
    mode: ChannelMode,
    locked: bool,
    async_enabled: bool,
    duration: u32,
    changes: Arc<Mutex<ChangeState>>,
    subscription: Option<HandlerId>,
}

impl Channel {
    /// Create a handle and put the board channel into `mode`.
    pub(crate) async fn open(
        session: Weak<SessionCore>,
        number: u8,
        mode: ChannelMode,
        locked: bool,
    ) -> Result<Self> {
        if usize::from(number) >= CHANNEL_COUNT {
            return Err(DyioError::InvalidChannel(number));
        }

        let mut channel = Self {
            session,
            number,
            mode,
            locked,
            async_enabled: false,
            duration: 0,
            changes: Arc::new(Mutex::new(ChangeState {
                channel: number,
                mode,
                last: None,
                next: VecDeque::new(),
                every: Vec::new(),
                next_id: 0,
            })),
            subscription: None,
        };
        channel.set_mode(mode).await?;
        Ok(channel)
    }

    #[inline]
    pub fn number(&self) -> u8 {
        self.number
    }

    /// Cached mode.
    #[inline]
    pub fn mode(&self) -> ChannelMode {
        self.mode
    }

    /// Validate `mode` against the channel's wiring, send it, then re-read
    /// the mode the board actually applied.
    ///
    /// On a validation error nothing is sent and the cached mode is kept.
    pub async fn set_mode(&mut self, mode: ChannelMode) -> Result<()> {
        let session = self.session()?;
        validate_mode(mode, self.number, &session.board_context())?;

        session
            .dispatcher
            .set_channel_mode(self.number, mode, self.async_enabled)
            .await?;
        tracing::debug!("Channel {} set to {}", self.number, mode);

        let applied = session
            .dispatcher
            .get_channel_mode(self.number)
            .await?
            .unwrap_or(mode);
        self.cache_mode(&session, applied);
        Ok(())
    }

    /// Re-read the mode from the board.
    pub async fn mode_refreshed(&mut self) -> Result<ChannelMode> {
        let session = self.session()?;
        if let Some(mode) = session.dispatcher.get_channel_mode(self.number).await? {
            self.cache_mode(&session, mode);
        } else {
            tracing::warn!("Channel {} reported an unmapped mode", self.number);
        }
        Ok(self.mode)
    }

    /// Whether the cached mode can push value changes.
    pub fn has_async(&self) -> bool {
        self.mode.supports_async()
    }

    #[inline]
    pub fn is_async(&self) -> bool {
        self.async_enabled
    }

    /// Turn async notifications on or off. The flag travels with the mode,
    /// so the current mode is sent again.
    pub async fn set_async(&mut self, enabled: bool) -> Result<()> {
        let previous = std::mem::replace(&mut self.async_enabled, enabled);
        let result = self.set_mode(self.mode).await;
        if result.is_err() {
            self.async_enabled = previous;
        }
        result
    }

    /// Advisory lock flag. Nothing here enforces it.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn toggle_lock(&mut self) {
        self.locked = !self.locked;
    }

    /// Duration sent with servo and counter value writes.
    #[inline]
    pub fn duration(&self) -> u32 {
        self.duration
    }

    pub fn set_duration(&mut self, duration: u32) {
        self.duration = duration;
    }

    /// Read the value from the board, decoded for the cached mode.
    pub async fn value(&self) -> Result<i64> {
        let raw = self
            .session()?
            .dispatcher
            .get_channel_value(self.number)
            .await?;
        Ok(channel_value(&raw, self.mode))
    }

    /// Write a value, with the cached duration where the mode takes one.
    pub async fn set_value(&self, value: i64) -> Result<()> {
        let options = ValueOptions::for_mode(self.mode, self.duration);
        self.session()?
            .dispatcher
            .set_channel_value(self.number, value, options)
            .await?;
        Ok(())
    }

    /// Last value group seen by change tracking.
    pub fn last_value(&self) -> Option<Bytes> {
        self.changes().last.clone()
    }

    /// Run `handler` on the next change only.
    pub fn on_next_change<F, Fut>(&mut self, handler: F) -> Result<ChangeHandlerId>
    where
        F: Fn(ChannelChange) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.add_change_handler(handler, true)
    }

    /// Run `handler` on every change.
    pub fn on_every_change<F, Fut>(&mut self, handler: F) -> Result<ChangeHandlerId>
    where
        F: Fn(ChannelChange) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.add_change_handler(handler, false)
    }

    /// Remove a change handler. Change tracking stops with the last one.
    pub fn no_more_changes(&mut self, id: ChangeHandlerId) -> bool {
        let (found, empty) = {
            let mut changes = self.changes();
            let before = changes.next.len() + changes.every.len();
            changes.next.retain(|(h, _)| *h != id);
            changes.every.retain(|(h, _)| *h != id);
            (
                before != changes.next.len() + changes.every.len(),
                changes.is_empty(),
            )
        };
        if empty {
            self.unsubscribe();
        }
        found
    }

    fn add_change_handler<F, Fut>(&mut self, handler: F, once: bool) -> Result<ChangeHandlerId>
    where
        F: Fn(ChannelChange) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.subscribe()?;

        let handler: ChangeHandler =
            Arc::new(move |change| -> BoxFuture<'static, HandlerResult> { Box::pin(handler(change)) });
        let mut changes = self.changes();
        changes.next_id += 1;
        let id = ChangeHandlerId(changes.next_id);
        if once {
            changes.next.push_back((id, handler));
        } else {
            changes.every.push((id, handler));
        }
        Ok(id)
    }

    fn subscribe(&mut self) -> Result<()> {
        if self.subscription.is_some() {
            return Ok(());
        }

        let session = self.session()?;
        let changes = self.changes.clone();
        let index = usize::from(self.number);
        let router = session.dispatcher.router();
        let id = router.always_supervising(CHANNEL_VALUES, move |event, supervisor| {
            let changes = changes.clone();
            async move {
                let EventPayload::ChannelValues(groups) = &event.payload else {
                    return Ok(());
                };
                let Some(raw) = groups.get(index) else {
                    return Ok(());
                };

                let observed = changes
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .observe(raw);
                if let Some((change, handlers)) = observed {
                    let label = format!("channel_{}_change", change.channel);
                    for handler in handlers {
                        supervisor.spawn(label.clone(), handler(change.clone()));
                    }
                }
                Ok(())
            }
        });
        self.subscription = Some(id);
        Ok(())
    }

    fn unsubscribe(&mut self) {
        if let Some(id) = self.subscription.take() {
            if let Some(session) = self.session.upgrade() {
                session.dispatcher.router().remove(CHANNEL_VALUES, id);
            }
        }
    }

    fn cache_mode(&mut self, session: &SessionCore, mode: ChannelMode) {
        self.mode = mode;
        self.changes().mode = mode;
        session.record_mode(self.number, mode);
    }

    fn session(&self) -> Result<Arc<SessionCore>> {
        self.session.upgrade().ok_or(DyioError::SessionClosed)
    }

    fn changes(&self) -> MutexGuard<'_, ChangeState> {
        self.changes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("number", &self.number)
            .field("mode", &self.mode)
            .field("locked", &self.locked)
            .field("async_enabled", &self.async_enabled)
            .field("duration", &self.duration)
            .finish()
    }
}
