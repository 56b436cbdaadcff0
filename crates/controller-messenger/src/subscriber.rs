//! # Event Subscriptions
//!
//! Subscriber entries, selector bookkeeping and the publish report.

use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Event subscriber callback. Returning `Err` is reported, never propagated.
pub type EventCallback = dyn Fn(&[Value]) -> anyhow::Result<()> + Send + Sync;

/// Derives the value a selector-bound subscriber cares about from a payload.
pub type Selector = dyn Fn(&[Value]) -> Value + Send + Sync;

/// Produces the current payload of an event, used to seed selectors.
pub type InitialPayloadFn = dyn Fn() -> Vec<Value> + Send + Sync;

/// Handle identifying one subscription.
///
/// Closures cannot be compared, so `unsubscribe` takes this id instead of the
/// callback itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Selector plus the last value it produced.
pub(crate) struct SelectorState {
    selector: Arc<Selector>,
    last: Mutex<Option<Value>>,
}

impl SelectorState {
    pub(crate) fn new(selector: Arc<Selector>, initial: Option<Value>) -> Self {
        Self {
            selector,
            last: Mutex::new(initial),
        }
    }

    /// Evaluate the selector and record the result.
    ///
    /// Returns `true` when the value differs (structurally) from the stored one.
    pub(crate) fn changed(&self, payload: &[Value]) -> bool {
        let next = (self.selector)(payload);
        let mut last = self.last.lock();
        if last.as_ref() == Some(&next) {
            return false;
        }
        *last = Some(next);
        true
    }
}

/// One entry in an event's subscriber list.
pub(crate) struct Subscription {
    pub(crate) id: SubscriptionId,
    /// Namespace of the restricted view that created it, if any.
    pub(crate) owner: Option<String>,
    pub(crate) callback: Arc<EventCallback>,
    pub(crate) selector: Option<SelectorState>,
}

/// Why a subscriber did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberFailure {
    pub subscription: SubscriptionId,
    pub reason: String,
}

/// Outcome of a single `publish`.
///
/// Failures are isolated per subscriber; this report is the side channel
/// through which they surface (they are also logged).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers whose callback ran to completion.
    pub notified: usize,
    /// Selector-bound subscribers skipped because their value was unchanged.
    pub skipped: usize,
    pub failures: Vec<SubscriberFailure>,
}

impl PublishReport {
    /// True when no subscriber failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Subscribers that were invoked, successfully or not.
    #[must_use]
    pub fn invoked(&self) -> usize {
        self.notified + self.failures.len()
    }
}
