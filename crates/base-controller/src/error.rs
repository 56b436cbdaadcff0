//! Error types for controllers.

use crate::patch::PatchError;
use controller_messenger::MessengerError;
use thiserror::Error;

/// Errors raised while constructing, updating or composing controllers.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Messenger(#[from] MessengerError),

    #[error("Invalid controller list: {0}")]
    InvalidControllerList(String),

    #[error("State of {controller} could not be converted: {source}")]
    StateSerialization {
        controller: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("State of {controller} must be a key-value object")]
    StateNotObject { controller: String },

    #[error("No metadata found for '{property}'")]
    MissingMetadata { property: String },

    #[error(transparent)]
    Patch(#[from] PatchError),
}

impl ControllerError {
    pub(crate) fn serialization(controller: &str, source: serde_json::Error) -> Self {
        ControllerError::StateSerialization {
            controller: controller.to_string(),
            source,
        }
    }
}
