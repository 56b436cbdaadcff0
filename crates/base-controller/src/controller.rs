//! # Messenger-Integrated Controller
//!
//! A controller whose state is observed through the bus instead of direct
//! listeners. On construction it registers `<name>:getState` and the initial
//! payload of `<name>:stateChange`; every effective update publishes
//! `<name>:stateChange` with `[new_state, patches]`.
//!
//! State snapshots are immutable: an update clones the current state into a
//! draft, applies the change, and swaps in a fresh `Arc`. Readers holding the
//! previous snapshot keep seeing it unchanged.

use crate::component::MessengerIntegrated;
use crate::error::ControllerError;
use crate::metadata::{get_anonymized_state, get_persistent_state, StateMetadata};
use crate::patch::{diff, Patch};
use controller_messenger::{namespaced, ClearedRegistrations, RestrictedMessenger};
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Name of the state-change event of `controller`.
#[must_use]
pub fn state_change_event(controller: &str) -> String {
    namespaced(controller, "stateChange")
}

/// Name of the state getter action of `controller`.
#[must_use]
pub fn get_state_action(controller: &str) -> String {
    namespaced(controller, "getState")
}

struct Snapshot<S> {
    typed: Arc<S>,
    json: Value,
}

/// Base for controllers that talk to the bus through a [`RestrictedMessenger`].
///
/// The controller's name is the name of its restricted view. Cloning yields
/// another handle to the same controller.
pub struct BaseController<S> {
    messenger: RestrictedMessenger,
    snapshot: Arc<RwLock<Arc<Snapshot<S>>>>,
    // Serializes updates; never held while subscribers run.
    update_lock: Arc<Mutex<()>>,
    metadata: Arc<StateMetadata>,
}

impl<S> Clone for BaseController<S> {
    fn clone(&self) -> Self {
        Self {
            messenger: self.messenger.clone(),
            snapshot: self.snapshot.clone(),
            update_lock: self.update_lock.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

impl<S> BaseController<S>
where
    S: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Create the controller and register its bus surface.
    ///
    /// # Errors
    ///
    /// `StateSerialization`/`StateNotObject` if `state` is not a key-value
    /// object, `DuplicateActionName` if `<name>:getState` is already taken.
    pub fn new(
        messenger: RestrictedMessenger,
        state: S,
        metadata: StateMetadata,
    ) -> Result<Self, ControllerError> {
        let name = messenger.name().to_string();
        let json = to_state_json(&name, &state)?;
        let snapshot = Arc::new(RwLock::new(Arc::new(Snapshot {
            typed: Arc::new(state),
            json,
        })));

        let getter = snapshot.clone();
        messenger.register_action_handler(get_state_action(&name), move |_| {
            Ok(getter.read().json.clone())
        })?;

        let initial = snapshot.clone();
        messenger.register_initial_event_payload(&state_change_event(&name), move || {
            vec![initial.read().json.clone(), Value::Array(Vec::new())]
        })?;

        debug!(controller = %name, "Controller registered");
        Ok(Self {
            messenger,
            snapshot,
            update_lock: Arc::new(Mutex::new(())),
            metadata: Arc::new(metadata),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.messenger.name()
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> Arc<S> {
        self.snapshot.read().typed.clone()
    }

    /// Current state as JSON.
    #[must_use]
    pub fn state_json(&self) -> Value {
        self.snapshot.read().json.clone()
    }

    #[must_use]
    pub fn metadata(&self) -> &StateMetadata {
        &self.metadata
    }

    /// The controller's own restricted view, for registering further actions
    /// or talking to other controllers.
    #[must_use]
    pub fn messenger(&self) -> &RestrictedMessenger {
        &self.messenger
    }

    /// Apply `recipe` to a draft of the current state.
    ///
    /// Always publishes `<name>:stateChange` with `[state, patches]` and
    /// returns the patches, which are empty when nothing changed.
    /// Calling `update` from inside `recipe` deadlocks.
    ///
    /// Updates commit one at a time, but the publish happens after the
    /// commit lock is released. Two threads updating the same controller may
    /// therefore deliver their events in the opposite order of their commits.
    ///
    /// # Errors
    ///
    /// `StateSerialization`/`StateNotObject` if the draft no longer
    /// serializes to an object; the stored state is left untouched.
    pub fn update<F>(&self, recipe: F) -> Result<Vec<Patch>, ControllerError>
    where
        F: FnOnce(&mut S),
    {
        let guard = self.update_lock.lock();
        let current = self.snapshot.read().clone();

        let mut draft = S::clone(&current.typed);
        recipe(&mut draft);
        let json = to_state_json(self.name(), &draft)?;

        self.commit(guard, &current.json, draft, json)
    }

    /// Merge `partial` into the current state, key by key.
    ///
    /// # Errors
    ///
    /// `StateSerialization` if the merged object does not deserialize as `S`.
    pub fn update_partial(&self, partial: Map<String, Value>) -> Result<Vec<Patch>, ControllerError> {
        let guard = self.update_lock.lock();
        let current = self.snapshot.read().clone();

        let mut merged = current.json.clone();
        if let Value::Object(map) = &mut merged {
            map.extend(partial);
        }
        let draft: S = serde_json::from_value(merged)
            .map_err(|e| ControllerError::serialization(self.name(), e))?;
        let json = to_state_json(self.name(), &draft)?;

        self.commit(guard, &current.json, draft, json)
    }

    fn commit(
        &self,
        guard: MutexGuard<'_, ()>,
        previous: &Value,
        next: S,
        json: Value,
    ) -> Result<Vec<Patch>, ControllerError> {
        let patches = diff(previous, &json);
        let encoded = serde_json::to_value(&patches)
            .map_err(|e| ControllerError::serialization(self.name(), e))?;
        *self.snapshot.write() = Arc::new(Snapshot {
            typed: Arc::new(next),
            json: json.clone(),
        });
        drop(guard);

        let event = state_change_event(self.name());
        let report = self.messenger.publish(&event, vec![json, encoded])?;
        if !report.is_clean() {
            warn!(
                controller = %self.name(),
                failures = report.failures.len(),
                "State change delivered with subscriber failures"
            );
        }
        debug!(controller = %self.name(), patches = patches.len(), "State updated");
        Ok(patches)
    }

    /// The persisted subset of the current state.
    ///
    /// # Errors
    ///
    /// `MissingMetadata` for a property without metadata.
    pub fn persistent_state(&self) -> Result<Value, ControllerError> {
        get_persistent_state(self.name(), &self.state_json(), &self.metadata)
    }

    /// The anonymized subset of the current state.
    ///
    /// # Errors
    ///
    /// `MissingMetadata` for a property without metadata.
    pub fn anonymized_state(&self) -> Result<Value, ControllerError> {
        get_anonymized_state(self.name(), &self.state_json(), &self.metadata)
    }

    /// Drop every subscriber of `<name>:stateChange` and everything this
    /// controller's view registered.
    ///
    /// # Errors
    ///
    /// Only if the view is not named after the controller, which
    /// construction rules out.
    pub fn destroy(&self) -> Result<ClearedRegistrations, ControllerError> {
        let listeners = self
            .messenger
            .clear_event_subscriptions(&state_change_event(self.name()))?;
        let mut cleared = self.messenger.clear_registrations();
        cleared.subscriptions += listeners;
        debug!(
            controller = %self.name(),
            subscriptions = cleared.subscriptions,
            action_handlers = cleared.action_handlers,
            "Controller destroyed"
        );
        Ok(cleared)
    }
}

impl<S> MessengerIntegrated for BaseController<S>
where
    S: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        BaseController::name(self)
    }

    fn state_value(&self) -> Value {
        self.state_json()
    }
}

impl<S> std::fmt::Debug for BaseController<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseController")
            .field("name", &self.messenger.name())
            .field("state", &self.snapshot.read().json)
            .finish_non_exhaustive()
    }
}

fn to_state_json<S: Serialize>(controller: &str, state: &S) -> Result<Value, ControllerError> {
    let json = serde_json::to_value(state).map_err(|e| ControllerError::serialization(controller, e))?;
    if !json.is_object() {
        return Err(ControllerError::StateNotObject {
            controller: controller.to_string(),
        });
    }
    Ok(json)
}
