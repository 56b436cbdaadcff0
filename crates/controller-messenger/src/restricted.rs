//! # Restricted Messenger
//!
//! Capability-scoped view over a [`Messenger`], handed to exactly one
//! controller. This is the only enforcement point for least privilege:
//!
//! | Operation | Allowed when |
//! |-----------|--------------|
//! | `call` | action is in `allowed_actions` |
//! | `subscribe` / `unsubscribe` | event is in `allowed_events` |
//! | `publish`, `register_*`, `clear_event_subscriptions` | name is under `<owner>:` |
//!
//! Rejected operations fail before reaching the messenger.

use crate::action::ActionCall;
use crate::error::MessengerError;
use crate::messenger::{spawning_callback, Messenger};
use crate::naming;
use crate::subscriber::{PublishReport, SubscriptionId};
use controller_telemetry::metrics;
use serde_json::Value;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// A messenger view limited to an allow-list of actions and events plus its
/// owner's namespace.
///
/// Immutable after construction. Cloning shares the same allow-lists.
#[derive(Clone)]
pub struct RestrictedMessenger {
    messenger: Messenger,
    name: Arc<str>,
    allowed_actions: Arc<BTreeSet<String>>,
    allowed_events: Arc<BTreeSet<String>>,
}

impl RestrictedMessenger {
    pub(crate) fn new(
        messenger: Messenger,
        name: String,
        allowed_actions: BTreeSet<String>,
        allowed_events: BTreeSet<String>,
    ) -> Self {
        debug!(
            owner = %name,
            actions = allowed_actions.len(),
            events = allowed_events.len(),
            "Restricted messenger created"
        );
        Self {
            messenger,
            name: name.into(),
            allowed_actions: Arc::new(allowed_actions),
            allowed_events: Arc::new(allowed_events),
        }
    }

    /// Name of the owning controller; also its namespace.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn allowed_actions(&self) -> impl Iterator<Item = &str> {
        self.allowed_actions.iter().map(String::as_str)
    }

    pub fn allowed_events(&self) -> impl Iterator<Item = &str> {
        self.allowed_events.iter().map(String::as_str)
    }

    #[must_use]
    pub fn is_action_allowed(&self, action: &str) -> bool {
        self.allowed_actions.contains(action)
    }

    #[must_use]
    pub fn is_event_allowed(&self, event: &str) -> bool {
        self.allowed_events.contains(event)
    }

    // =========================================================================
    // CAPABILITY CHECKS
    // =========================================================================

    fn check_action(&self, action: &str) -> Result<(), MessengerError> {
        if self.is_action_allowed(action) {
            return Ok(());
        }
        self.deny("action", action);
        Err(MessengerError::ActionNotAllowed {
            owner: self.name.to_string(),
            action: action.to_string(),
        })
    }

    fn check_event(&self, event: &str) -> Result<(), MessengerError> {
        if self.is_event_allowed(event) {
            return Ok(());
        }
        self.deny("event", event);
        Err(MessengerError::EventNotAllowed {
            owner: self.name.to_string(),
            event: event.to_string(),
        })
    }

    fn check_namespace(&self, name: &str) -> Result<(), MessengerError> {
        if naming::in_namespace(name, &self.name) {
            return Ok(());
        }
        self.deny("namespace", name);
        Err(MessengerError::NamespaceViolation {
            owner: self.name.to_string(),
            name: name.to_string(),
        })
    }

    fn deny(&self, kind: &str, target: &str) {
        warn!(owner = %self.name, kind = kind, target = %target, "Restricted messenger denied access");
        if self.messenger.config().record_metrics {
            metrics::record_capability_denial(&self.name, kind);
        }
    }

    // =========================================================================
    // ACTIONS
    // =========================================================================

    /// Register a handler for an action in this view's namespace.
    ///
    /// # Errors
    ///
    /// `NamespaceViolation` outside `<owner>:`, `DuplicateActionName` if taken.
    pub fn register_action_handler<F>(
        &self,
        action: impl Into<String>,
        handler: F,
    ) -> Result<(), MessengerError>
    where
        F: Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let action = action.into();
        self.check_namespace(&action)?;
        self.messenger.register_action_handler(action, handler)
    }

    /// Register an asynchronous handler for an action in this view's namespace.
    ///
    /// # Errors
    ///
    /// `NamespaceViolation` outside `<owner>:`, `DuplicateActionName` if taken.
    pub fn register_async_action_handler<F, Fut>(
        &self,
        action: impl Into<String>,
        handler: F,
    ) -> Result<(), MessengerError>
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let action = action.into();
        self.check_namespace(&action)?;
        self.messenger.register_async_action_handler(action, handler)
    }

    /// Remove a handler in this view's namespace. Silent if absent.
    ///
    /// # Errors
    ///
    /// `NamespaceViolation` outside `<owner>:`.
    pub fn unregister_action_handler(&self, action: &str) -> Result<bool, MessengerError> {
        self.check_namespace(action)?;
        Ok(self.messenger.unregister_action_handler(action))
    }

    /// Call an allowed action.
    ///
    /// # Errors
    ///
    /// `ActionNotAllowed` without touching the messenger, otherwise as
    /// [`Messenger::call`].
    pub fn call(&self, action: &str, args: Vec<Value>) -> Result<ActionCall, MessengerError> {
        self.check_action(action)?;
        self.messenger.call(action, args)
    }

    /// Call an allowed action and deserialize its result.
    ///
    /// # Errors
    ///
    /// As [`RestrictedMessenger::call`], plus `InvalidPayload`.
    pub async fn call_as<T>(&self, action: &str, args: Vec<Value>) -> Result<T, MessengerError>
    where
        T: serde::de::DeserializeOwned,
    {
        self.check_action(action)?;
        self.messenger.call_as(action, args).await
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    /// Publish an event in this view's namespace.
    ///
    /// # Errors
    ///
    /// `NamespaceViolation` outside `<owner>:`. Subscriber failures are in
    /// the report, never an error.
    pub fn publish(&self, event: &str, payload: Vec<Value>) -> Result<PublishReport, MessengerError> {
        self.check_namespace(event)?;
        Ok(self.messenger.publish(event, payload))
    }

    /// Subscribe to an allowed event.
    ///
    /// # Errors
    ///
    /// `EventNotAllowed`.
    pub fn subscribe<F>(&self, event: &str, callback: F) -> Result<SubscriptionId, MessengerError>
    where
        F: Fn(&[Value]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.check_event(event)?;
        Ok(self.messenger.add_subscription(
            event.to_string(),
            Some(self.name.to_string()),
            Arc::new(callback),
            None,
        ))
    }

    /// Subscribe to an allowed event, firing only when `selector` changes.
    ///
    /// # Errors
    ///
    /// `EventNotAllowed`.
    pub fn subscribe_with_selector<S, F>(
        &self,
        event: &str,
        selector: S,
        callback: F,
    ) -> Result<SubscriptionId, MessengerError>
    where
        S: Fn(&[Value]) -> Value + Send + Sync + 'static,
        F: Fn(&[Value]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.check_event(event)?;
        Ok(self.messenger.add_subscription(
            event.to_string(),
            Some(self.name.to_string()),
            Arc::new(callback),
            Some(Arc::new(selector)),
        ))
    }

    /// Subscribe an asynchronous callback to an allowed event.
    ///
    /// # Errors
    ///
    /// `EventNotAllowed`.
    pub fn subscribe_async<F, Fut>(&self, event: &str, callback: F) -> Result<SubscriptionId, MessengerError>
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.check_event(event)?;
        Ok(self.messenger.add_subscription(
            event.to_string(),
            Some(self.name.to_string()),
            spawning_callback(callback),
            None,
        ))
    }

    /// Remove a subscription to an allowed event.
    ///
    /// # Errors
    ///
    /// `EventNotAllowed`, or `SubscriberNotFound`.
    pub fn unsubscribe(&self, event: &str, subscription: SubscriptionId) -> Result<(), MessengerError> {
        self.check_event(event)?;
        self.messenger.unsubscribe(event, subscription)
    }

    /// Drop every subscriber of an event in this view's namespace.
    ///
    /// # Errors
    ///
    /// `NamespaceViolation` outside `<owner>:`.
    pub fn clear_event_subscriptions(&self, event: &str) -> Result<usize, MessengerError> {
        self.check_namespace(event)?;
        Ok(self.messenger.clear_event_subscriptions(event))
    }

    /// Register the current-payload getter for an event in this namespace.
    ///
    /// # Errors
    ///
    /// `NamespaceViolation` outside `<owner>:`.
    pub fn register_initial_event_payload<F>(&self, event: &str, getter: F) -> Result<(), MessengerError>
    where
        F: Fn() -> Vec<Value> + Send + Sync + 'static,
    {
        self.check_namespace(event)?;
        self.messenger.register_initial_event_payload(event, getter);
        Ok(())
    }

    /// Remove everything this view registered: its subscriptions, its
    /// namespace's action handlers and initial payload getters.
    ///
    /// Used at controller shutdown so no callbacks leak.
    pub fn clear_registrations(&self) -> ClearedRegistrations {
        let cleared = ClearedRegistrations {
            subscriptions: self.messenger.remove_owned_subscriptions(&self.name),
            action_handlers: self.messenger.unregister_namespace(&self.name),
        };
        self.messenger.remove_initial_payloads(&self.name);
        debug!(
            owner = %self.name,
            subscriptions = cleared.subscriptions,
            action_handlers = cleared.action_handlers,
            "Restricted messenger registrations cleared"
        );
        cleared
    }
}

/// Counts returned by [`RestrictedMessenger::clear_registrations`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearedRegistrations {
    pub subscriptions: usize,
    pub action_handlers: usize,
}

impl std::fmt::Debug for RestrictedMessenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestrictedMessenger")
            .field("name", &self.name)
            .field("allowed_actions", &self.allowed_actions)
            .field("allowed_events", &self.allowed_events)
            .finish_non_exhaustive()
    }
}
