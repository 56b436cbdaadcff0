//! # Controller Messenger
//!
//! In-process message bus connecting mutually-unaware controllers.
//!
//! ## Model
//!
//! - **Actions**: uniquely named request/response operations, one handler each.
//! - **Events**: named broadcasts, zero or more subscribers each.
//! - **Restricted views**: each controller gets a [`RestrictedMessenger`] that
//!   may only call the actions and subscribe to the events it was granted,
//!   and may only publish or register under its own `<Name>:` namespace.
//!
//! ```text
//! ┌──────────────┐                        ┌──────────────┐
//! │ Controller A │  publish("A:changed")  │ Controller B │
//! │  (view "A")  │ ──────┐                │  (view "B")  │
//! └──────────────┘       │                └──────────────┘
//!                        ▼                        ↑
//!                  ┌──────────────┐               │
//!                  │  Messenger   │ ──────────────┘
//!                  │              │  subscribe("A:changed")
//!                  └──────────────┘
//! ```
//!
//! ## Dispatch
//!
//! - `publish` snapshots the subscriber list and notifies in subscription
//!   order. A failing or panicking subscriber is logged and reported in the
//!   [`PublishReport`]; the loop always completes.
//! - `call` invokes the single handler and returns an [`ActionCall`] future;
//!   synchronous handlers resolve immediately.
//!
//! ## Usage
//!
//! ```rust
//! use controller_messenger::Messenger;
//! use serde_json::json;
//!
//! let messenger = Messenger::new();
//! let counter = messenger.get_restricted("Counter", Vec::<String>::new(), Vec::<String>::new());
//! let reader = messenger.get_restricted("Reader", ["Counter:get"], ["Counter:changed"]);
//!
//! counter
//!     .register_action_handler("Counter:get", |_| Ok(json!(42)))
//!     .unwrap();
//! let value = reader
//!     .call("Counter:get", vec![])
//!     .unwrap()
//!     .now_or_never()
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(value, json!(42));
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod action;
pub mod error;
pub mod messenger;
pub mod naming;
pub mod restricted;
pub mod subscriber;

// Re-export main types
pub use action::ActionCall;
pub use error::MessengerError;
pub use messenger::{Messenger, MessengerConfig};
pub use naming::{namespaced, split_name, NAMESPACE_SEPARATOR};
pub use restricted::{ClearedRegistrations, RestrictedMessenger};
pub use subscriber::{PublishReport, SubscriberFailure, SubscriptionId};

/// Payload type carried by events and action arguments.
pub use serde_json::Value;
