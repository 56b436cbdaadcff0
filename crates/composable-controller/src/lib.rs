//! # Composable Controller
//!
//! Aggregates the state of several child controllers, legacy or
//! messenger-integrated, into one tree keyed by child name, and exposes a
//! flattened view merging every child's properties.
//!
//! ## Usage
//!
//! ```rust
//! use base_controller::{BaseController, StateMetadata, StatefulComponent};
//! use composable_controller::{ComposableController, COMPOSABLE_CONTROLLER_NAME};
//! use controller_messenger::Messenger;
//! use serde_json::json;
//!
//! let messenger = Messenger::new();
//! let view = messenger.get_restricted("Gas", Vec::<String>::new(), Vec::<String>::new());
//! let gas = BaseController::new(view, json!({"fee": 1}), StateMetadata::new()).unwrap();
//!
//! let children: Vec<StatefulComponent> = vec![gas.clone().into()];
//! let view = messenger.get_restricted(
//!     COMPOSABLE_CONTROLLER_NAME,
//!     Vec::<String>::new(),
//!     ComposableController::required_events(&children),
//! );
//! let composable = ComposableController::new(children, view).unwrap();
//!
//! gas.update(|state| state["fee"] = json!(2)).unwrap();
//! assert_eq!(composable.flat_state()["fee"], json!(2));
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod composable;

pub use composable::{ComposableController, ComposableState, COMPOSABLE_CONTROLLER_NAME};
