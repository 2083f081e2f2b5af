//! Single-resolution deferred result for a dispatched command.
//!
//! A [`Promise`] moves from pending to succeeded or failed exactly once;
//! later resolution attempts are no-ops. Resolution runs as a two-stage
//! pipeline:
//!
//! 1. the default resolver, installed once by the dispatcher, receives the
//!    settled value together with every attached continuation and decides
//!    how to invoke them;
//! 2. the user continuations themselves.
//!
//! The default resolver only runs when at least one continuation is
//! attached, and never more than once. Callers that want the value inline
//! `await` it with [`Promise::wait`] instead.
//!
//! # Example
//!
//! ```
//! use dyio_client::promise::{Promise, PromiseState};
//!
//! let promise: Promise<u8> = Promise::new();
//! assert!(promise.succeed(7));
//! assert!(!promise.fail(dyio_client::protocol::Lookup::new().remote_error(0, 1)));
//! assert!(matches!(promise.state(), PromiseState::Succeeded(7)));
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;

use crate::error::{DyioError, Result};
use crate::protocol::RemoteError;

/// Settled value handed to continuations.
pub type Settled<T> = std::result::Result<T, RemoteError>;

/// User continuation.
pub type Continuation<T> = Box<dyn FnOnce(Settled<T>) + Send>;

/// Privileged first stage: gets the settled value and all continuations.
pub type DefaultResolver<T> = Box<dyn FnOnce(Settled<T>, Vec<Continuation<T>>) + Send>;

/// Observable promise state.
#[derive(Debug, Clone, PartialEq)]
pub enum PromiseState<T> {
    Pending,
    Succeeded(T),
    Failed(RemoteError),
}

impl<T> PromiseState<T> {
    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self, PromiseState::Pending)
    }
}

struct Hooks<T> {
    default_resolver: Option<DefaultResolver<T>>,
    resolver_installed: bool,
    continuations: Vec<Continuation<T>>,
}

struct Shared<T> {
    state: watch::Sender<PromiseState<T>>,
    hooks: Mutex<Hooks<T>>,
}

/// Deferred result of one round trip. Cheap to clone; clones share state.
pub struct Promise<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Promise<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a pending promise.
    pub fn new() -> Self {
        let (state, _) = watch::channel(PromiseState::Pending);
        Self {
            shared: Arc::new(Shared {
                state,
                hooks: Mutex::new(Hooks {
                    default_resolver: None,
                    resolver_installed: false,
                    continuations: Vec::new(),
                }),
            }),
        }
    }

    /// Create a promise that has already succeeded.
    pub fn resolved(value: T) -> Self {
        let promise = Self::new();
        promise.succeed(value);
        promise
    }

    /// Install the default resolver. Only the first installation is kept.
    pub fn set_default_resolver<F>(&self, resolver: F) -> bool
    where
        F: FnOnce(Settled<T>, Vec<Continuation<T>>) + Send + 'static,
    {
        let mut hooks = self.hooks();
        if hooks.resolver_installed {
            return false;
        }
        hooks.resolver_installed = true;
        hooks.default_resolver = Some(Box::new(resolver));
        true
    }

    /// Attach a continuation. Runs immediately if already settled.
    pub fn then<F>(&self, continuation: F)
    where
        F: FnOnce(Settled<T>) + Send + 'static,
    {
        let mut hooks = self.hooks();
        match self.settled() {
            None => hooks.continuations.push(Box::new(continuation)),
            Some(settled) => {
                let resolver = hooks.default_resolver.take();
                drop(hooks);
                run_pipeline(settled, resolver, vec![Box::new(continuation)]);
            }
        }
    }

    /// Resolve as succeeded. Returns `false` if already settled.
    pub fn succeed(&self, value: T) -> bool {
        self.settle(PromiseState::Succeeded(value))
    }

    /// Resolve as failed. Returns `false` if already settled.
    pub fn fail(&self, error: RemoteError) -> bool {
        self.settle(PromiseState::Failed(error))
    }

    /// Current state snapshot.
    pub fn state(&self) -> PromiseState<T> {
        self.shared.state.borrow().clone()
    }

    pub fn is_pending(&self) -> bool {
        self.shared.state.borrow().is_pending()
    }

    /// Wait until the promise settles.
    pub async fn wait(&self) -> Result<T> {
        let mut rx = self.shared.state.subscribe();
        let state = rx
            .wait_for(|state| !state.is_pending())
            .await
            .map_err(|_| DyioError::SessionClosed)?
            .clone();
        match state {
            PromiseState::Succeeded(value) => Ok(value),
            PromiseState::Failed(err) => Err(DyioError::Remote(err)),
            PromiseState::Pending => Err(DyioError::SessionClosed),
        }
    }

    /// Wait until the promise settles or `timeout` elapses.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<T> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| DyioError::Timeout)?
    }

    fn settle(&self, next: PromiseState<T>) -> bool {
        let transitioned = self.shared.state.send_if_modified(|state| {
            if state.is_pending() {
                *state = next;
                true
            } else {
                false
            }
        });
        if !transitioned {
            return false;
        }

        let (resolver, continuations) = {
            let mut hooks = self.hooks();
            if hooks.continuations.is_empty() {
                return true;
            }
            (
                hooks.default_resolver.take(),
                std::mem::take(&mut hooks.continuations),
            )
        };

        if let Some(settled) = self.settled() {
            run_pipeline(settled, resolver, continuations);
        }
        true
    }

    fn settled(&self) -> Option<Settled<T>> {
        match &*self.shared.state.borrow() {
            PromiseState::Pending => None,
            PromiseState::Succeeded(value) => Some(Ok(value.clone())),
            PromiseState::Failed(err) => Some(Err(err.clone())),
        }
    }

    fn hooks(&self) -> MutexGuard<'_, Hooks<T>> {
        self.shared
            .hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for Promise<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("state", &*self.shared.state.borrow())
            .finish()
    }
}

fn run_pipeline<T: Clone>(
    settled: Settled<T>,
    resolver: Option<DefaultResolver<T>>,
    continuations: Vec<Continuation<T>>,
) {
    match resolver {
        Some(resolver) => resolver(settled, continuations),
        None => {
            for continuation in continuations {
                continuation(settled.clone());
            }
        }
    }
}
