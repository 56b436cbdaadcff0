//! Controller capability variants accepted by composition.

use crate::controller::BaseController;
use crate::legacy::LegacyController;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// A controller observed through `<name>:stateChange` on the bus.
pub trait MessengerIntegrated: Send + Sync {
    fn name(&self) -> &str;

    /// Current state as JSON.
    fn state_value(&self) -> Value;
}

/// Either controller generation, resolved when a controller is composed.
#[derive(Clone)]
pub enum StatefulComponent {
    /// Observed through a direct listener.
    Legacy(LegacyController),
    /// Observed through the messenger.
    MessengerIntegrated(Arc<dyn MessengerIntegrated>),
}

impl StatefulComponent {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            StatefulComponent::Legacy(controller) => controller.name(),
            StatefulComponent::MessengerIntegrated(controller) => controller.name(),
        }
    }

    #[must_use]
    pub fn state_value(&self) -> Value {
        match self {
            StatefulComponent::Legacy(controller) => {
                Value::Object(controller.state().as_ref().clone())
            }
            StatefulComponent::MessengerIntegrated(controller) => controller.state_value(),
        }
    }
}

impl From<LegacyController> for StatefulComponent {
    fn from(controller: LegacyController) -> Self {
        StatefulComponent::Legacy(controller)
    }
}

impl<S> From<BaseController<S>> for StatefulComponent
where
    S: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn from(controller: BaseController<S>) -> Self {
        StatefulComponent::MessengerIntegrated(Arc::new(controller))
    }
}

impl std::fmt::Debug for StatefulComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatefulComponent::Legacy(controller) => {
                f.debug_tuple("Legacy").field(&controller.name()).finish()
            }
            StatefulComponent::MessengerIntegrated(controller) => f
                .debug_tuple("MessengerIntegrated")
                .field(&controller.name())
                .finish(),
        }
    }
}
