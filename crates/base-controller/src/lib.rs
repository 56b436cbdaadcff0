//! # Base Controller
//!
//! The lifecycle contract shared by every controller: it holds a state
//! object, applies updates, and notifies on change.
//!
//! Two generations are supported:
//!
//! - [`LegacyController`]: key-value state, direct listener list, no bus.
//! - [`BaseController`]: typed state, observed through the messenger. It
//!   registers `<name>:getState` and publishes `<name>:stateChange` with
//!   `[new_state, patches]` on every effective update.
//!
//! [`StatefulComponent`] names both so a composing controller can accept
//! either.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod component;
pub mod controller;
pub mod error;
pub mod legacy;
pub mod metadata;
pub mod patch;

pub use component::{MessengerIntegrated, StatefulComponent};
pub use controller::{get_state_action, state_change_event, BaseController};
pub use error::ControllerError;
pub use legacy::{LegacyController, LegacyOptions, ListenerId, StateListener, StateMap};
pub use metadata::{
    get_anonymized_state, get_persistent_state, MetadataFlag, PropertyMetadata, StateMetadata,
};
pub use patch::{apply_patches, diff, Patch, PatchError, PatchOp, PathSegment};
