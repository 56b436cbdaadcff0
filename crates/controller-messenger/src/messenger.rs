//! # Messenger
//!
//! Central registry of named actions and named events.
//!
//! - An action has exactly one handler; `call` dispatches to it.
//! - An event has zero or more subscribers; `publish` fans out to all of them
//!   in subscription order, isolating each subscriber's failure.
//!
//! The registries are the only shared mutable state. Locks are held only
//! while reading or editing a registry, never while user code runs, so
//! handlers and subscribers may re-enter the messenger freely.

use crate::action::{panic_to_error, ActionCall, ActionHandler};
use crate::error::MessengerError;
use crate::naming;
use crate::restricted::RestrictedMessenger;
use crate::subscriber::{
    EventCallback, InitialPayloadFn, PublishReport, Selector, SelectorState, SubscriberFailure,
    Subscription, SubscriptionId,
};
use controller_telemetry::metrics::{self, CallOutcome};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Per-instance messenger settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessengerConfig {
    /// Catch panics in handlers, selectors and subscribers and report them
    /// as failures instead of unwinding through `call`/`publish`.
    pub catch_panics: bool,
    /// Update the Prometheus counters in `controller_telemetry::metrics`.
    pub record_metrics: bool,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            catch_panics: true,
            record_metrics: true,
        }
    }
}

struct Inner {
    config: MessengerConfig,
    actions: RwLock<HashMap<String, ActionHandler>>,
    events: RwLock<HashMap<String, Vec<Arc<Subscription>>>>,
    initial_payloads: RwLock<HashMap<String, Arc<InitialPayloadFn>>>,
    next_subscription_id: AtomicU64,
    events_published: AtomicU64,
}

/// The message bus.
///
/// Cloning is cheap and yields a handle to the same registries. There is no
/// global instance: create one at startup and pass it (or restricted views of
/// it) to every controller.
#[derive(Clone)]
pub struct Messenger {
    inner: Arc<Inner>,
}

enum Delivery {
    Notified,
    Skipped,
    Failed(anyhow::Error),
}

impl Messenger {
    /// Create a messenger with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MessengerConfig::default())
    }

    /// Create a messenger with explicit settings.
    #[must_use]
    pub fn with_config(config: MessengerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                actions: RwLock::new(HashMap::new()),
                events: RwLock::new(HashMap::new()),
                initial_payloads: RwLock::new(HashMap::new()),
                next_subscription_id: AtomicU64::new(1),
                events_published: AtomicU64::new(0),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> MessengerConfig {
        self.inner.config
    }

    // =========================================================================
    // ACTIONS
    // =========================================================================

    /// Register the handler for `action`.
    ///
    /// # Errors
    ///
    /// `DuplicateActionName` if a handler is already registered; the existing
    /// handler stays active.
    pub fn register_action_handler<F>(
        &self,
        action: impl Into<String>,
        handler: F,
    ) -> Result<(), MessengerError>
    where
        F: Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.insert_handler(action.into(), ActionHandler::from_sync(handler))
    }

    /// Register an asynchronous handler for `action`.
    ///
    /// # Errors
    ///
    /// `DuplicateActionName` if a handler is already registered.
    pub fn register_async_action_handler<F, Fut>(
        &self,
        action: impl Into<String>,
        handler: F,
    ) -> Result<(), MessengerError>
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.insert_handler(action.into(), ActionHandler::from_async(handler))
    }

    fn insert_handler(&self, action: String, handler: ActionHandler) -> Result<(), MessengerError> {
        let mut actions = self.inner.actions.write();
        if actions.contains_key(&action) {
            warn!(action = %action, "Rejected duplicate action handler");
            return Err(MessengerError::DuplicateActionName { action });
        }
        debug!(action = %action, "Action handler registered");
        actions.insert(action, handler);
        Ok(())
    }

    /// Remove the handler for `action`.
    ///
    /// Silent no-op if none is registered; returns whether one was removed.
    pub fn unregister_action_handler(&self, action: &str) -> bool {
        let removed = self.inner.actions.write().remove(action).is_some();
        if removed {
            debug!(action = %action, "Action handler unregistered");
        }
        removed
    }

    /// Remove every handler in `namespace`. Returns how many were removed.
    pub(crate) fn unregister_namespace(&self, namespace: &str) -> usize {
        let mut actions = self.inner.actions.write();
        let before = actions.len();
        actions.retain(|name, _| !naming::in_namespace(name, namespace));
        before - actions.len()
    }

    /// Remove every action handler.
    pub fn clear_action_handlers(&self) {
        self.inner.actions.write().clear();
    }

    #[must_use]
    pub fn has_action_handler(&self, action: &str) -> bool {
        self.inner.actions.read().contains_key(action)
    }

    /// Call `action` with `args`.
    ///
    /// The handler is invoked exactly once before this returns. The returned
    /// `ActionCall` resolves to the handler's result, or to
    /// `ActionHandlerError` wrapping its failure.
    ///
    /// # Errors
    ///
    /// `NoHandlerForAction` if nothing is registered under `action`.
    pub fn call(&self, action: &str, args: Vec<Value>) -> Result<ActionCall, MessengerError> {
        let handler = self.inner.actions.read().get(action).cloned();
        let Some(handler) = handler else {
            self.record_call(action, CallOutcome::NoHandler);
            return Err(MessengerError::NoHandlerForAction {
                action: action.to_string(),
            });
        };

        self.record_call(action, CallOutcome::Dispatched);
        let call = handler.invoke(action, args, self.inner.config.catch_panics);
        if !self.inner.config.record_metrics {
            return Ok(call);
        }
        let action = action.to_string();
        Ok(call.on_handler_failure(move || {
            metrics::record_action_call(&action, CallOutcome::Failed)
        }))
    }

    /// Call `action`, await it and deserialize the result into `T`.
    ///
    /// # Errors
    ///
    /// Any error from `call`, the handler's failure, or `InvalidPayload` when
    /// the result does not deserialize.
    pub async fn call_as<T>(&self, action: &str, args: Vec<Value>) -> Result<T, MessengerError>
    where
        T: serde::de::DeserializeOwned,
    {
        self.call(action, args)?.into_typed().await
    }

    fn record_call(&self, action: &str, outcome: CallOutcome) {
        if self.inner.config.record_metrics {
            metrics::record_action_call(action, outcome);
        }
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    /// Publish `payload` to every current subscriber of `event`.
    ///
    /// The subscriber list is snapshotted before the first callback runs:
    /// subscriptions added or removed during the fan-out take effect from
    /// the next publish. A subscriber that fails or panics is logged and
    /// listed in the report; the remaining subscribers are still notified.
    pub fn publish(&self, event: &str, payload: Vec<Value>) -> PublishReport {
        let subscribers: Vec<Arc<Subscription>> = self
            .inner
            .events
            .read()
            .get(event)
            .cloned()
            .unwrap_or_default();

        self.inner.events_published.fetch_add(1, Ordering::Relaxed);
        if self.inner.config.record_metrics {
            metrics::record_publish(event);
        }

        let mut report = PublishReport::default();
        for subscription in &subscribers {
            match self.deliver(subscription, &payload) {
                Delivery::Notified => report.notified += 1,
                Delivery::Skipped => report.skipped += 1,
                Delivery::Failed(err) => {
                    error!(
                        event = %event,
                        subscription = %subscription.id,
                        error = %format!("{err:#}"),
                        "Subscriber failed, continuing fan-out"
                    );
                    if self.inner.config.record_metrics {
                        metrics::record_subscriber_failure(event);
                    }
                    report.failures.push(SubscriberFailure {
                        subscription: subscription.id,
                        reason: format!("{err:#}"),
                    });
                }
            }
        }

        debug!(
            event = %event,
            notified = report.notified,
            skipped = report.skipped,
            failed = report.failures.len(),
            "Event published"
        );
        report
    }

    fn deliver(&self, subscription: &Subscription, payload: &[Value]) -> Delivery {
        let run = || -> anyhow::Result<bool> {
            if let Some(selector) = &subscription.selector {
                if !selector.changed(payload) {
                    return Ok(false);
                }
            }
            (subscription.callback)(payload)?;
            Ok(true)
        };

        let outcome = if self.inner.config.catch_panics {
            std::panic::catch_unwind(AssertUnwindSafe(run))
                .unwrap_or_else(|panic| Err(panic_to_error(panic.as_ref())))
        } else {
            run()
        };

        match outcome {
            Ok(true) => Delivery::Notified,
            Ok(false) => Delivery::Skipped,
            Err(err) => Delivery::Failed(err),
        }
    }

    /// Selector result for the event's current initial payload.
    ///
    /// A failing getter or selector leaves the subscription unseeded, so the
    /// first publish fires.
    fn seed_selector(
        &self,
        event: &str,
        selector: &Arc<Selector>,
        getter: &Arc<InitialPayloadFn>,
    ) -> Option<Value> {
        let seed = || selector(&getter());
        if !self.inner.config.catch_panics {
            return Some(seed());
        }
        match std::panic::catch_unwind(AssertUnwindSafe(seed)) {
            Ok(value) => Some(value),
            Err(panic) => {
                warn!(
                    event = %event,
                    error = %panic_to_error(panic.as_ref()),
                    "Selector seeding failed; first publish will notify"
                );
                None
            }
        }
    }

    /// Subscribe `callback` to `event`.
    pub fn subscribe<F>(&self, event: impl Into<String>, callback: F) -> SubscriptionId
    where
        F: Fn(&[Value]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add_subscription(event.into(), None, Arc::new(callback), None)
    }

    /// Subscribe `callback` to `event`, invoking it only when `selector`'s
    /// result changes.
    ///
    /// Results are compared structurally (`serde_json::Value` equality). The
    /// starting value comes from the event's initial payload when one is
    /// registered; otherwise the first publish always fires.
    pub fn subscribe_with_selector<S, F>(
        &self,
        event: impl Into<String>,
        selector: S,
        callback: F,
    ) -> SubscriptionId
    where
        S: Fn(&[Value]) -> Value + Send + Sync + 'static,
        F: Fn(&[Value]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add_subscription(event.into(), None, Arc::new(callback), Some(Arc::new(selector)))
    }

    /// Subscribe an asynchronous callback.
    ///
    /// `publish` does not wait for it: the future is spawned on the current
    /// tokio runtime and the fan-out moves on. Errors from the spawned task
    /// are logged. Publishing outside a runtime reports a failure for this
    /// subscriber.
    pub fn subscribe_async<F, Fut>(&self, event: impl Into<String>, callback: F) -> SubscriptionId
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.add_subscription(event.into(), None, spawning_callback(callback), None)
    }

    pub(crate) fn add_subscription(
        &self,
        event: String,
        owner: Option<String>,
        callback: Arc<EventCallback>,
        selector: Option<Arc<Selector>>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_subscription_id.fetch_add(1, Ordering::Relaxed));

        let selector = selector.map(|selector| {
            let getter = self.inner.initial_payloads.read().get(&event).cloned();
            let initial = getter.and_then(|getter| self.seed_selector(&event, &selector, &getter));
            SelectorState::new(selector, initial)
        });

        let subscription = Arc::new(Subscription {
            id,
            owner,
            callback,
            selector,
        });

        debug!(event = %event, subscription = %id, "Subscription created");
        self.inner
            .events
            .write()
            .entry(event)
            .or_default()
            .push(subscription);
        id
    }

    /// Remove one subscription.
    ///
    /// # Errors
    ///
    /// `SubscriberNotFound` if `subscription` is not registered for `event`.
    pub fn unsubscribe(&self, event: &str, subscription: SubscriptionId) -> Result<(), MessengerError> {
        let mut events = self.inner.events.write();
        let removed = match events.get_mut(event) {
            Some(list) => {
                let before = list.len();
                list.retain(|s| s.id != subscription);
                let removed = list.len() != before;
                if list.is_empty() {
                    events.remove(event);
                }
                removed
            }
            None => false,
        };

        if !removed {
            return Err(MessengerError::SubscriberNotFound {
                event: event.to_string(),
                subscription,
            });
        }
        debug!(event = %event, subscription = %subscription, "Subscription removed");
        Ok(())
    }

    /// Remove every subscription to `event`. Returns how many were removed.
    pub fn clear_event_subscriptions(&self, event: &str) -> usize {
        self.inner
            .events
            .write()
            .remove(event)
            .map_or(0, |list| list.len())
    }

    /// Remove every subscription to every event.
    pub fn clear_subscriptions(&self) {
        self.inner.events.write().clear();
    }

    /// Remove every subscription created by the restricted view `owner`.
    pub(crate) fn remove_owned_subscriptions(&self, owner: &str) -> usize {
        let mut events = self.inner.events.write();
        let mut removed = 0;
        for list in events.values_mut() {
            let before = list.len();
            list.retain(|s| s.owner.as_deref() != Some(owner));
            removed += before - list.len();
        }
        events.retain(|_, list| !list.is_empty());
        removed
    }

    /// Register a getter for the current payload of `event`.
    ///
    /// Selector-bound subscriptions created afterwards are seeded from it, so
    /// their first notification reflects a real change. Replaces any earlier
    /// getter.
    pub fn register_initial_event_payload<F>(&self, event: impl Into<String>, getter: F)
    where
        F: Fn() -> Vec<Value> + Send + Sync + 'static,
    {
        self.inner
            .initial_payloads
            .write()
            .insert(event.into(), Arc::new(getter));
    }

    pub(crate) fn remove_initial_payloads(&self, namespace: &str) {
        self.inner
            .initial_payloads
            .write()
            .retain(|event, _| !naming::in_namespace(event, namespace));
    }

    /// Number of subscriptions to `event`.
    #[must_use]
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.inner.events.read().get(event).map_or(0, Vec::len)
    }

    /// Total number of `publish` calls.
    #[must_use]
    pub fn events_published(&self) -> u64 {
        self.inner.events_published.load(Ordering::Relaxed)
    }

    // =========================================================================
    // RESTRICTION
    // =========================================================================

    /// Build a capability-scoped view for the controller `name`.
    ///
    /// The view may call only `allowed_actions`, subscribe only to
    /// `allowed_events`, and publish or register only under `name:`.
    pub fn get_restricted<A, E>(
        &self,
        name: impl Into<String>,
        allowed_actions: A,
        allowed_events: E,
    ) -> RestrictedMessenger
    where
        A: IntoIterator,
        A::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        RestrictedMessenger::new(
            self.clone(),
            name.into(),
            allowed_actions.into_iter().map(Into::into).collect(),
            allowed_events.into_iter().map(Into::into).collect(),
        )
    }
}

/// Wrap an async subscriber in a synchronous callback that spawns it.
pub(crate) fn spawning_callback<F, Fut>(callback: F) -> Arc<EventCallback>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |payload: &[Value]| -> anyhow::Result<()> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| anyhow::anyhow!("async subscriber needs a tokio runtime: {e}"))?;
        let fut = callback(payload.to_vec());
        handle.spawn(async move {
            if let Err(err) = fut.await {
                error!(error = %format!("{err:#}"), "Async subscriber failed");
            }
        });
        Ok(())
    })
}

impl Default for Messenger {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Messenger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Messenger")
            .field("actions", &self.inner.actions.read().len())
            .field("events", &self.inner.events.read().len())
            .field("events_published", &self.events_published())
            .finish()
    }
}
