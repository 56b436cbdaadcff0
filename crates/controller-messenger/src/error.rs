//! Error types for the messenger.

use crate::subscriber::SubscriptionId;
use thiserror::Error;

/// Errors raised by the messenger and its restricted views.
///
/// Registration and capability errors (`DuplicateActionName`,
/// `ActionNotAllowed`, `EventNotAllowed`, `NamespaceViolation`) are
/// programmer errors and surface immediately. `ActionHandler` carries the
/// handler's own failure back to the caller of `call`.
#[derive(Debug, Error)]
pub enum MessengerError {
    #[error("A handler for {action} has already been registered")]
    DuplicateActionName { action: String },

    #[error("A handler for {action} has not been registered")]
    NoHandlerForAction { action: String },

    #[error("Handler for {action} failed: {source}")]
    ActionHandler {
        action: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Action {action} is not in the allow list of {owner}")]
    ActionNotAllowed { owner: String, action: String },

    #[error("Event {event} is not in the allow list of {owner}")]
    EventNotAllowed { owner: String, event: String },

    #[error("{owner} may only use names in its own namespace, got {name}")]
    NamespaceViolation { owner: String, name: String },

    #[error("Subscription {subscription} is not registered for {event}")]
    SubscriberNotFound {
        event: String,
        subscription: SubscriptionId,
    },

    #[error("Unexpected payload for {name}: {reason}")]
    InvalidPayload { name: String, reason: String },
}

impl MessengerError {
    /// True for errors that indicate a wiring mistake rather than a runtime failure.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            MessengerError::DuplicateActionName { .. }
                | MessengerError::ActionNotAllowed { .. }
                | MessengerError::EventNotAllowed { .. }
                | MessengerError::NamespaceViolation { .. }
        )
    }
}
