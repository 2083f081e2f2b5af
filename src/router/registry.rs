//! Subscription registry: one-shot queues and persistent lists per event.
//!
//! Subscriptions are addressed with directive strings made of a prefix and
//! an event name, optionally followed by `_event` / `_events`:
//!
//! | Prefix | Effect |
//! |---|---|
//! | `next_`, `one_` | one-shot: runs on the next matching frame only |
//! | `every_`, `all_` | persistent: runs on every matching frame |
//! | `no_more_` | removes a handler from both lists |
//!
//! The name `status` addresses the status bucket, which sees every
//! status-class frame regardless of its rpc.
//!
//! # Example
//!
//! ```
//! use dyio_client::router::{Directive, SubscriptionKind};
//!
//! let directive = Directive::parse("every_channel_values_events").unwrap();
//! assert_eq!(directive.kind, SubscriptionKind::Always);
//! assert_eq!(directive.event, "channel_values");
//! ```

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::event::Event;
use crate::error::{DyioError, Result};

/// Event name of the status bucket.
pub const STATUS: &str = "status";

/// Result type for handler functions.
pub type HandlerResult = Result<()>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Handler for named events.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, event: Event) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, event: Event) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self)(event))
    }
}

/// Handler for the status bucket. `success` is false for `_err` frames.
pub trait StatusHandler: Send + Sync + 'static {
    fn call(&self, success: bool, event: Event) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> StatusHandler for F
where
    F: Fn(bool, Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, success: bool, event: Event) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self)(success, event))
    }
}

/// Identifies one registration, for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a directive does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    Once,
    Always,
    Remove,
}

/// A parsed subscription directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub kind: SubscriptionKind,
    pub event: String,
}

const PREFIXES: &[(&str, SubscriptionKind)] = &[
    ("no_more_", SubscriptionKind::Remove),
    ("next_", SubscriptionKind::Once),
    ("one_", SubscriptionKind::Once),
    ("every_", SubscriptionKind::Always),
    ("all_", SubscriptionKind::Always),
];

impl Directive {
    /// Parse `next_power_event`, `every_channel_values_events`,
    /// `no_more_status_events` and the like.
    pub fn parse(directive: &str) -> Result<Self> {
        let (kind, rest) = PREFIXES
            .iter()
            .find_map(|(prefix, kind)| directive.strip_prefix(prefix).map(|rest| (*kind, rest)))
            .ok_or_else(|| DyioError::InvalidSubscription(directive.to_string()))?;

        let event = rest
            .strip_suffix("_events")
            .or_else(|| rest.strip_suffix("_event"))
            .unwrap_or(rest);

        if event.is_empty() {
            return Err(DyioError::InvalidSubscription(directive.to_string()));
        }

        Ok(Self {
            kind,
            event: event.to_string(),
        })
    }

    #[inline]
    pub fn is_status(&self) -> bool {
        self.event == STATUS
    }
}

type Entry<H> = (HandlerId, Arc<H>);

/// Handlers picked for one frame, in invocation order.
pub(crate) struct Selected {
    pub handlers: Vec<Entry<dyn Handler>>,
    pub status: Vec<Entry<dyn StatusHandler>>,
}

/// The once/always tables for named events plus the status bucket.
#[derive(Default)]
pub(crate) struct Registry {
    once: HashMap<String, VecDeque<Entry<dyn Handler>>>,
    always: HashMap<String, Vec<Entry<dyn Handler>>>,
    status_once: VecDeque<Entry<dyn StatusHandler>>,
    status_always: Vec<Entry<dyn StatusHandler>>,
    next_id: u64,
}

impl Registry {
    pub fn next_id(&mut self) -> HandlerId {
        self.next_id += 1;
        HandlerId(self.next_id)
    }

    pub fn add(&mut self, kind: SubscriptionKind, event: &str, handler: Arc<dyn Handler>) -> HandlerId {
        let id = self.next_id();
        self.insert(kind, event, id, handler);
        id
    }

    /// Insert under an id taken from [`Registry::next_id`].
    pub fn insert(&mut self, kind: SubscriptionKind, event: &str, id: HandlerId, handler: Arc<dyn Handler>) {
        match kind {
            SubscriptionKind::Once => self
                .once
                .entry(event.to_string())
                .or_default()
                .push_back((id, handler)),
            SubscriptionKind::Always | SubscriptionKind::Remove => self
                .always
                .entry(event.to_string())
                .or_default()
                .push((id, handler)),
        }
    }

    pub fn add_status(&mut self, kind: SubscriptionKind, handler: Arc<dyn StatusHandler>) -> HandlerId {
        let id = self.next_id();
        match kind {
            SubscriptionKind::Once => self.status_once.push_back((id, handler)),
            SubscriptionKind::Always | SubscriptionKind::Remove => {
                self.status_always.push((id, handler))
            }
        }
        id
    }

    /// Remove `id` from both lists of `event`. Returns whether it was found.
    pub fn remove(&mut self, event: &str, id: HandlerId) -> bool {
        if event == STATUS {
            let before = self.status_once.len() + self.status_always.len();
            self.status_once.retain(|(h, _)| *h != id);
            self.status_always.retain(|(h, _)| *h != id);
            return before != self.status_once.len() + self.status_always.len();
        }

        let mut found = false;
        if let Some(queue) = self.once.get_mut(event) {
            let before = queue.len();
            queue.retain(|(h, _)| *h != id);
            found |= queue.len() != before;
        }
        if let Some(list) = self.always.get_mut(event) {
            let before = list.len();
            list.retain(|(h, _)| *h != id);
            found |= list.len() != before;
        }
        found
    }

    /// Pop the next one-shot handler and snapshot the persistent ones.
    pub fn select(&mut self, event: &str, is_status: bool) -> Selected {
        let mut handlers = Vec::new();
        if let Some(entry) = self.once.get_mut(event).and_then(VecDeque::pop_front) {
            handlers.push(entry);
        }
        if let Some(list) = self.always.get(event) {
            handlers.extend(list.iter().cloned());
        }

        let mut status = Vec::new();
        if is_status {
            if let Some(entry) = self.status_once.pop_front() {
                status.push(entry);
            }
            status.extend(self.status_always.iter().cloned());
        }

        Selected { handlers, status }
    }

    /// Number of registrations for `event`, one-shot and persistent.
    pub fn count(&self, event: &str) -> usize {
        if event == STATUS {
            return self.status_once.len() + self.status_always.len();
        }
        self.once.get(event).map_or(0, VecDeque::len)
            + self.always.get(event).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Arc<dyn Handler> {
        Arc::new(|_event: Event| async { Ok::<(), DyioError>(()) })
    }

    #[test]
    fn test_directive_prefixes_and_suffixes() {
        let cases = [
            ("next_power_event", SubscriptionKind::Once, "power"),
            ("one_ready", SubscriptionKind::Once, "ready"),
            ("every_channel_values_events", SubscriptionKind::Always, "channel_values"),
            ("all_channel_value_events", SubscriptionKind::Always, "channel_value"),
            ("no_more_status_events", SubscriptionKind::Remove, "status"),
        ];
        for (text, kind, event) in cases {
            let directive = Directive::parse(text).unwrap();
            assert_eq!(directive.kind, kind, "{}", text);
            assert_eq!(directive.event, event, "{}", text);
        }
    }

    #[test]
    fn test_directive_rejects_bad_input() {
        assert!(matches!(
            Directive::parse("later_power_event"),
            Err(DyioError::InvalidSubscription(_))
        ));
        assert!(Directive::parse("next_").is_err());
        assert!(Directive::parse("power").is_err());
    }

    #[test]
    fn test_select_pops_one_once_handler() {
        let mut registry = Registry::default();
        let first = registry.add(SubscriptionKind::Once, "power", noop());
        let second = registry.add(SubscriptionKind::Once, "power", noop());
        let always = registry.add(SubscriptionKind::Always, "power", noop());

        let selected = registry.select("power", false);
        let ids: Vec<_> = selected.handlers.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![first, always]);

        let selected = registry.select("power", false);
        let ids: Vec<_> = selected.handlers.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![second, always]);

        assert_eq!(registry.count("power"), 1);
    }

    #[test]
    fn test_status_bucket_only_for_status_frames() {
        let mut registry = Registry::default();
        registry.add_status(
            SubscriptionKind::Once,
            Arc::new(|_ok: bool, _event: Event| async { Ok::<(), DyioError>(()) }),
        );

        assert!(registry.select("ready", false).status.is_empty());
        assert_eq!(registry.select("ready", true).status.len(), 1);
        assert!(registry.select("ready", true).status.is_empty());
    }

    #[test]
    fn test_remove_from_both_lists() {
        let mut registry = Registry::default();
        let once = registry.add(SubscriptionKind::Once, "channel_values", noop());
        let always = registry.add(SubscriptionKind::Always, "channel_values", noop());

        assert!(registry.remove("channel_values", once));
        assert!(registry.remove("channel_values", always));
        assert!(!registry.remove("channel_values", always));
        assert_eq!(registry.count("channel_values"), 0);
    }
}
