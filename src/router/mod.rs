//! Event router - demultiplexes decoded frames to subscribers.
//!
//! Each incoming frame is named through the [`Lookup`] tables, parsed by the
//! response parser for that name, and handed to:
//! - the next one-shot handler registered for the name (FIFO),
//! - every persistent handler for the name, in registration order,
//! - for status-class frames, the status bucket as well.
//!
//! Every invocation runs as its own tokio task. [`Router::incoming`] never
//! waits on a handler, and a failing or panicking handler is reported as a
//! [`HandlerFailure`] without affecting the others.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use dyio_client::protocol::Lookup;
//! use dyio_client::router::{Event, Router};
//!
//! let (router, _failures) = Router::new(Arc::new(Lookup::new()));
//! router
//!     .handle("every_channel_values_events", |event: Event| async move {
//!         println!("{} groups", event.frame.payload.len() / 4);
//!         Ok(())
//!     })
//!     .unwrap();
//! ```

mod event;
mod parse;
mod registry;

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use event::{ChannelModeEntry, Event, EventPayload, FirmwareRevision, PowerState};
pub use parse::{channel_value, parse_channel_modes, parse_channel_values, parse_power};
pub use registry::{
    BoxFuture, Directive, Handler, HandlerId, HandlerResult, StatusHandler, SubscriptionKind,
    STATUS,
};

use crate::error::{DyioError, Result};
use crate::protocol::{rpc, Frame, Lookup};
use registry::Registry;

/// A handler task that returned an error or panicked.
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    /// Event the handler was registered for (`status` for the status bucket).
    pub event: String,
    pub handler: HandlerId,
    pub error: String,
    pub panicked: bool,
}

struct Inner {
    lookup: Arc<Lookup>,
    registry: Mutex<Registry>,
    failures: mpsc::UnboundedSender<HandlerFailure>,
}

/// Routes frames to registered handlers. Cheap to clone.
#[derive(Clone)]
pub struct Router {
    inner: Arc<Inner>,
}

impl Router {
    /// Create a router and the receiving end of its failure channel.
    pub fn new(lookup: Arc<Lookup>) -> (Self, mpsc::UnboundedReceiver<HandlerFailure>) {
        let (failures, failures_rx) = mpsc::unbounded_channel();
        let router = Self {
            inner: Arc::new(Inner {
                lookup,
                registry: Mutex::new(Registry::default()),
                failures,
            }),
        };
        (router, failures_rx)
    }

    pub fn lookup(&self) -> &Arc<Lookup> {
        &self.inner.lookup
    }

    /// Run `handler` on the next `event` frame only.
    pub fn once<F, Fut>(&self, event: &str, handler: F) -> HandlerId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry()
            .add(SubscriptionKind::Once, event, Arc::new(handler))
    }

    /// Run `handler` on every `event` frame.
    pub fn always<F, Fut>(&self, event: &str, handler: F) -> HandlerId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry()
            .add(SubscriptionKind::Always, event, Arc::new(handler))
    }

    /// Like [`Router::always`], but the handler also gets a [`Supervisor`]
    /// for the tasks it fans out to.
    pub(crate) fn always_supervising<F, Fut>(&self, event: &str, handler: F) -> HandlerId
    where
        F: Fn(Event, Supervisor) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let mut registry = self.registry();
        let id = registry.next_id();
        let supervisor = Supervisor {
            failures: self.inner.failures.clone(),
            handler: id,
        };
        let handler = move |event: Event| handler(event, supervisor.clone());
        registry.insert(SubscriptionKind::Always, event, id, Arc::new(handler));
        id
    }

    /// Run `handler` on the next status-class frame.
    pub fn once_status<F, Fut>(&self, handler: F) -> HandlerId
    where
        F: Fn(bool, Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry()
            .add_status(SubscriptionKind::Once, Arc::new(handler))
    }

    /// Run `handler` on every status-class frame.
    pub fn always_status<F, Fut>(&self, handler: F) -> HandlerId
    where
        F: Fn(bool, Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry()
            .add_status(SubscriptionKind::Always, Arc::new(handler))
    }

    /// Register a named-event handler with a directive such as
    /// `next_power_event` or `every_channel_values_events`.
    pub fn handle<F, Fut>(&self, directive: &str, handler: F) -> Result<HandlerId>
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let parsed = Directive::parse(directive)?;
        if parsed.kind == SubscriptionKind::Remove || parsed.is_status() {
            return Err(DyioError::InvalidSubscription(directive.to_string()));
        }
        Ok(self
            .registry()
            .add(parsed.kind, &parsed.event, Arc::new(handler)))
    }

    /// Register a status handler with `next_status_event` / `every_status_events`.
    pub fn handle_status<F, Fut>(&self, directive: &str, handler: F) -> Result<HandlerId>
    where
        F: Fn(bool, Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let parsed = Directive::parse(directive)?;
        if parsed.kind == SubscriptionKind::Remove || !parsed.is_status() {
            return Err(DyioError::InvalidSubscription(directive.to_string()));
        }
        Ok(self.registry().add_status(parsed.kind, Arc::new(handler)))
    }

    /// Remove a handler with a `no_more_<event>_events` directive.
    pub fn no_more(&self, directive: &str, id: HandlerId) -> Result<bool> {
        let parsed = Directive::parse(directive)?;
        if parsed.kind != SubscriptionKind::Remove {
            return Err(DyioError::InvalidSubscription(directive.to_string()));
        }
        Ok(self.remove(&parsed.event, id))
    }

    /// Remove a handler from both lists of `event`.
    pub fn remove(&self, event: &str, id: HandlerId) -> bool {
        self.registry().remove(event, id)
    }

    /// Handlers currently registered for `event`.
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.registry().count(event)
    }

    /// Name and parse a frame without routing it.
    pub fn event_for(&self, frame: &Frame) -> Event {
        let lookup = &self.inner.lookup;
        let name = lookup.event_name(&frame.rpc);
        let payload = parse::parse_payload(&name, frame, lookup);
        Event {
            name,
            frame: frame.clone(),
            payload,
        }
    }

    /// Deliver a frame. Handlers are selected now, in arrival order, and run
    /// on their own tasks.
    pub fn incoming(&self, frame: &Frame) {
        let event = self.event_for(frame);
        let is_status = frame.is_status();
        let selected = self.registry().select(&event.name, is_status);

        tracing::debug!(
            "Routing {} ({}) to {} handler(s), {} status handler(s)",
            event.name,
            frame.method,
            selected.handlers.len(),
            selected.status.len()
        );

        if is_status {
            let success = frame.rpc_name() != Some(rpc::ERROR);
            for (id, handler) in selected.status {
                let event = event.clone();
                let task = tokio::spawn(async move { handler.call(success, event).await });
                supervise(self.inner.failures.clone(), STATUS.to_string(), id, task);
            }
        }

        for (id, handler) in selected.handlers {
            let name = event.name.clone();
            let event = event.clone();
            let task = tokio::spawn(async move { handler.call(event).await });
            supervise(self.inner.failures.clone(), name, id, task);
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Spawns follow-up tasks for a router handler, reporting their failures
/// under that handler's id.
#[derive(Clone)]
pub(crate) struct Supervisor {
    failures: mpsc::UnboundedSender<HandlerFailure>,
    handler: HandlerId,
}

impl Supervisor {
    pub(crate) fn spawn<Fut>(&self, event: String, task: Fut)
    where
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        supervise(self.failures.clone(), event, self.handler, tokio::spawn(task));
    }
}

fn supervise(
    failures: mpsc::UnboundedSender<HandlerFailure>,
    event: String,
    handler: HandlerId,
    task: JoinHandle<HandlerResult>,
) {
    tokio::spawn(async move {
        let (error, panicked) = match task.await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => (e.to_string(), false),
            Err(join) if join.is_panic() => (panic_message(join.into_panic()), true),
            Err(_) => return,
        };

        tracing::error!("Handler {} for {} failed: {}", handler, event, error);
        let _ = failures.send(HandlerFailure {
            event,
            handler,
            error,
            panicked,
        });
    });
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}
