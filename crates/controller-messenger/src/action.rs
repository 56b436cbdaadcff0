//! # Actions
//!
//! An action is a named request/response operation with exactly one handler.
//! Handlers are either synchronous (run eagerly inside `call`) or
//! asynchronous (their future is handed back to the caller, who decides
//! whether to await it).

use crate::error::MessengerError;
use futures::future::{self, BoxFuture, FutureExt};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Synchronous action handler.
pub type SyncHandlerFn = dyn Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync;

/// Asynchronous action handler.
pub type AsyncHandlerFn = dyn Fn(Vec<Value>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync;

/// A registered handler.
#[derive(Clone)]
pub(crate) enum ActionHandler {
    Sync(Arc<SyncHandlerFn>),
    Async(Arc<AsyncHandlerFn>),
}

impl ActionHandler {
    pub(crate) fn from_sync<F>(handler: F) -> Self
    where
        F: Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        ActionHandler::Sync(Arc::new(handler))
    }

    pub(crate) fn from_async<F, Fut>(handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        ActionHandler::Async(Arc::new(move |args| handler(args).boxed()))
    }

    /// Invoke the handler exactly once.
    ///
    /// Synchronous handlers run before this returns; asynchronous handlers
    /// are started and their future wrapped.
    pub(crate) fn invoke(&self, action: &str, args: Vec<Value>, catch_panics: bool) -> ActionCall {
        match self {
            ActionHandler::Sync(handler) => {
                let result = if catch_panics {
                    std::panic::catch_unwind(AssertUnwindSafe(|| handler(&args)))
                        .unwrap_or_else(|panic| Err(panic_to_error(panic.as_ref())))
                } else {
                    handler(&args)
                };
                ActionCall::ready(action, result.map_err(|source| wrap(action, source)))
            }
            ActionHandler::Async(handler) => {
                let fut = if catch_panics {
                    match std::panic::catch_unwind(AssertUnwindSafe(|| handler(args))) {
                        Ok(fut) => fut,
                        Err(panic) => {
                            return ActionCall::ready(
                                action,
                                Err(wrap(action, panic_to_error(panic.as_ref()))),
                            )
                        }
                    }
                } else {
                    handler(args)
                };
                let action_name = action.to_string();
                let fut = if catch_panics {
                    AssertUnwindSafe(fut)
                        .catch_unwind()
                        .map(|outcome| {
                            outcome.unwrap_or_else(|panic| Err(panic_to_error(panic.as_ref())))
                        })
                        .boxed()
                } else {
                    fut
                };
                let mapped = fut.map(move |result| result.map_err(|source| wrap(&action_name, source)));
                ActionCall::pending(action, mapped.boxed())
            }
        }
    }
}

fn wrap(action: &str, source: anyhow::Error) -> MessengerError {
    MessengerError::ActionHandler {
        action: action.to_string(),
        source,
    }
}

/// Turn a caught panic payload into an error.
pub(crate) fn panic_to_error(panic: &(dyn std::any::Any + Send)) -> anyhow::Error {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    anyhow::anyhow!("panicked: {message}")
}

/// The eventual result of an action call.
///
/// Resolves immediately for synchronous handlers. No cancellation is built
/// in; wrap in `tokio::time::timeout` when a deadline is needed.
#[must_use = "an ActionCall does nothing for async handlers unless awaited"]
pub struct ActionCall {
    action: String,
    inner: BoxFuture<'static, Result<Value, MessengerError>>,
}

impl ActionCall {
    pub(crate) fn ready(action: &str, result: Result<Value, MessengerError>) -> Self {
        Self {
            action: action.to_string(),
            inner: future::ready(result).boxed(),
        }
    }

    pub(crate) fn pending(
        action: &str,
        inner: BoxFuture<'static, Result<Value, MessengerError>>,
    ) -> Self {
        Self {
            action: action.to_string(),
            inner,
        }
    }

    /// Run `on_failure` once if the handler reports an error.
    pub(crate) fn on_handler_failure<F>(self, on_failure: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let inner = self
            .inner
            .map(move |result| {
                if let Err(MessengerError::ActionHandler { .. }) = &result {
                    on_failure();
                }
                result
            })
            .boxed();
        Self {
            action: self.action,
            inner,
        }
    }

    /// Name of the called action.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Take the result if it is already available.
    ///
    /// Always `Some` for synchronous handlers.
    pub fn now_or_never(self) -> Option<Result<Value, MessengerError>> {
        FutureExt::now_or_never(self.inner)
    }

    /// Await and deserialize the result.
    pub async fn into_typed<T>(self) -> Result<T, MessengerError>
    where
        T: serde::de::DeserializeOwned,
    {
        let action = self.action.clone();
        let value = self.await?;
        serde_json::from_value(value).map_err(|e| MessengerError::InvalidPayload {
            name: action,
            reason: e.to_string(),
        })
    }
}

impl Future for ActionCall {
    type Output = Result<Value, MessengerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl fmt::Debug for ActionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionCall")
            .field("action", &self.action)
            .finish_non_exhaustive()
    }
}
