//! # Composable Controller
//!
//! Mirrors the state of a fixed list of child controllers under their names
//! and republishes every absorbed child change as its own `stateChange`.
//!
//! ```text
//!   A:stateChange ──┐
//!                   ├──► ComposableController ──► ComposableController:stateChange
//!   B (listener) ───┘      { A: {...}, B: {...} }
//! ```
//!
//! Children are never mutated; the mirror is a read-only projection.

use base_controller::{
    state_change_event, BaseController, ControllerError, LegacyController, ListenerId,
    MessengerIntegrated, PropertyMetadata, StateMetadata, StatefulComponent,
};
use controller_messenger::{ClearedRegistrations, RestrictedMessenger};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Conventional name of the composable controller's restricted view.
pub const COMPOSABLE_CONTROLLER_NAME: &str = "ComposableController";

/// Child name → child state.
pub type ComposableState = Map<String, Value>;

/// Aggregates child controller state into one tree.
#[derive(Clone)]
pub struct ComposableController {
    controller: BaseController<ComposableState>,
    children: Arc<[String]>,
    legacy_listeners: Arc<[(LegacyController, ListenerId)]>,
}

impl ComposableController {
    /// Compose `children`, observed through `messenger`.
    ///
    /// `messenger` must allow `<child>:stateChange` for every
    /// messenger-integrated child.
    ///
    /// # Errors
    ///
    /// `InvalidControllerList` for an unnamed child, a duplicate name, or a
    /// state that is not a key-value object. `EventNotAllowed` if a child's
    /// state-change event is missing from the view's allow-list; nothing
    /// stays registered in that case.
    pub fn new(
        children: Vec<StatefulComponent>,
        messenger: RestrictedMessenger,
    ) -> Result<Self, ControllerError> {
        let mut names = Vec::with_capacity(children.len());
        let mut seen = HashSet::new();
        let mut state = ComposableState::new();
        let mut metadata = StateMetadata::new();

        for (position, child) in children.iter().enumerate() {
            let name = child.name();
            if name.is_empty() {
                return Err(ControllerError::InvalidControllerList(format!(
                    "child at position {position} has no name"
                )));
            }
            if !seen.insert(name.to_string()) {
                return Err(ControllerError::InvalidControllerList(format!(
                    "duplicate controller name '{name}'"
                )));
            }
            let child_state = child.state_value();
            if !child_state.is_object() {
                return Err(ControllerError::InvalidControllerList(format!(
                    "state of '{name}' is not a key-value object"
                )));
            }
            names.push(name.to_string());
            state.insert(name.to_string(), child_state);
            metadata = metadata.with(name, PropertyMetadata::new(true, true));
        }

        let controller = BaseController::new(messenger, state, metadata)?;

        let mut legacy_listeners = Vec::new();
        for child in &children {
            let outcome = match child {
                StatefulComponent::MessengerIntegrated(integrated) => {
                    Self::observe_integrated(&controller, integrated.name()).map(|_| ())
                }
                StatefulComponent::Legacy(legacy) => {
                    legacy_listeners.push((legacy.clone(), Self::observe_legacy(&controller, legacy)));
                    Ok(())
                }
            };
            if let Err(err) = outcome {
                for (legacy, id) in &legacy_listeners {
                    legacy.unsubscribe(*id);
                }
                controller.destroy()?;
                return Err(err);
            }
        }

        debug!(
            controller = %controller.name(),
            children = names.len(),
            "Composable controller ready"
        );
        Ok(Self {
            controller,
            children: names.into(),
            legacy_listeners: legacy_listeners.into(),
        })
    }

    /// State-change events a view must allow to compose `children`.
    pub fn required_events(children: &[StatefulComponent]) -> Vec<String> {
        children
            .iter()
            .filter(|child| matches!(child, StatefulComponent::MessengerIntegrated(_)))
            .map(|child| state_change_event(child.name()))
            .collect()
    }

    fn observe_integrated(
        controller: &BaseController<ComposableState>,
        child: &str,
    ) -> Result<controller_messenger::SubscriptionId, ControllerError> {
        let target = controller.clone();
        let name = child.to_string();
        let id = controller.messenger().subscribe(
            &state_change_event(child),
            move |payload| -> anyhow::Result<()> {
                let state = payload
                    .first()
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("state change of '{name}' carried no state"))?;
                absorb(&target, &name, state)?;
                Ok(())
            },
        )?;
        Ok(id)
    }

    fn observe_legacy(
        controller: &BaseController<ComposableState>,
        legacy: &LegacyController,
    ) -> ListenerId {
        let target = controller.clone();
        let name = legacy.name().to_string();
        legacy.subscribe(move |state| -> anyhow::Result<()> {
            absorb(&target, &name, Value::Object(state.clone()))?;
            Ok(())
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.controller.name()
    }

    /// Child names in composition order.
    pub fn children(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(String::as_str)
    }

    /// Child name → latest child state.
    #[must_use]
    pub fn state(&self) -> Arc<ComposableState> {
        self.controller.state()
    }

    /// Every child's properties merged into one map.
    ///
    /// Children are merged in composition order, so on a key collision the
    /// later child's value wins.
    #[must_use]
    pub fn flat_state(&self) -> Map<String, Value> {
        let state = self.controller.state();
        let mut flat = Map::new();
        for name in self.children.iter() {
            if let Some(Value::Object(child)) = state.get(name) {
                flat.extend(child.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        flat
    }

    #[must_use]
    pub fn messenger(&self) -> &RestrictedMessenger {
        self.controller.messenger()
    }

    /// Stop observing children and remove this controller's bus surface.
    ///
    /// # Errors
    ///
    /// As [`BaseController::destroy`].
    pub fn destroy(&self) -> Result<ClearedRegistrations, ControllerError> {
        for (legacy, id) in self.legacy_listeners.iter() {
            legacy.unsubscribe(*id);
        }
        self.controller.destroy()
    }
}

fn absorb(
    controller: &BaseController<ComposableState>,
    child: &str,
    state: Value,
) -> Result<(), ControllerError> {
    if !state.is_object() {
        warn!(controller = %controller.name(), child = %child, "Ignoring non-object child state");
        return Err(ControllerError::StateNotObject {
            controller: child.to_string(),
        });
    }
    controller.update(|mirror| {
        mirror.insert(child.to_string(), state);
    })?;
    Ok(())
}

impl MessengerIntegrated for ComposableController {
    fn name(&self) -> &str {
        self.controller.name()
    }

    fn state_value(&self) -> Value {
        self.controller.state_json()
    }
}

impl From<ComposableController> for StatefulComponent {
    fn from(controller: ComposableController) -> Self {
        StatefulComponent::MessengerIntegrated(Arc::new(controller))
    }
}

impl std::fmt::Debug for ComposableController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposableController")
            .field("name", &self.name())
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}
