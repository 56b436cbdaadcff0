//! # Legacy Controller
//!
//! The unmessaged controller generation: state and configuration are plain
//! key-value maps, and changes are pushed to direct listeners instead of the
//! bus. Kept so older controllers can still be composed next to
//! messenger-integrated ones.

use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Key-value state or configuration of a legacy controller.
pub type StateMap = Map<String, Value>;

/// Callback receiving the full state after every notification.
pub type StateListener = dyn Fn(&StateMap) -> anyhow::Result<()> + Send + Sync;

/// Handle for removing a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Construction parameters for a [`LegacyController`].
#[derive(Debug, Clone, Default)]
pub struct LegacyOptions {
    pub name: String,
    pub default_config: StateMap,
    pub default_state: StateMap,
    /// Merged over `default_config`.
    pub config: StateMap,
    /// Merged over `default_state`.
    pub state: StateMap,
}

impl LegacyOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_default_state(mut self, state: StateMap) -> Self {
        self.default_state = state;
        self
    }

    #[must_use]
    pub fn with_default_config(mut self, config: StateMap) -> Self {
        self.default_config = config;
        self
    }

    #[must_use]
    pub fn with_state(mut self, state: StateMap) -> Self {
        self.state = state;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: StateMap) -> Self {
        self.config = config;
        self
    }
}

struct Inner {
    name: String,
    default_config: StateMap,
    default_state: StateMap,
    config: RwLock<StateMap>,
    state: RwLock<Arc<StateMap>>,
    disabled: AtomicBool,
    listeners: RwLock<Vec<(ListenerId, Arc<StateListener>)>>,
    next_listener: AtomicU64,
}

/// Controller that notifies direct listeners of state changes.
///
/// Cloning yields another handle to the same controller.
#[derive(Clone)]
pub struct LegacyController {
    inner: Arc<Inner>,
}

impl LegacyController {
    /// Build the controller from defaults plus initial values.
    ///
    /// Initial configuration and state are merged over the defaults. No
    /// listener exists yet, so nothing is notified.
    pub fn new(options: LegacyOptions) -> Self {
        let LegacyOptions {
            name,
            default_config,
            default_state,
            config,
            state,
        } = options;

        let mut initial_config = default_config.clone();
        initial_config.extend(config);
        let mut initial_state = default_state.clone();
        initial_state.extend(state);

        debug!(controller = %name, "Legacy controller initialized");
        Self {
            inner: Arc::new(Inner {
                name,
                default_config,
                default_state,
                config: RwLock::new(initial_config),
                state: RwLock::new(Arc::new(initial_state)),
                disabled: AtomicBool::new(false),
                listeners: RwLock::new(Vec::new()),
                next_listener: AtomicU64::new(0),
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> Arc<StateMap> {
        self.inner.state.read().clone()
    }

    #[must_use]
    pub fn config(&self) -> StateMap {
        self.inner.config.read().clone()
    }

    #[must_use]
    pub fn default_config(&self) -> &StateMap {
        &self.inner.default_config
    }

    #[must_use]
    pub fn default_state(&self) -> &StateMap {
        &self.inner.default_state
    }

    #[must_use]
    pub fn disabled(&self) -> bool {
        self.inner.disabled.load(Ordering::Acquire)
    }

    /// A disabled controller keeps updating its state but stops notifying.
    pub fn set_disabled(&self, disabled: bool) {
        self.inner.disabled.store(disabled, Ordering::Release);
    }

    /// Update the configuration.
    ///
    /// With `full_update`, `config` replaces (`overwrite`) or is merged over
    /// the current configuration. Without it, only keys already present are
    /// updated and unknown keys are ignored.
    pub fn configure(&self, config: StateMap, overwrite: bool, full_update: bool) {
        let mut current = self.inner.config.write();
        if full_update {
            if overwrite {
                *current = config;
            } else {
                current.extend(config);
            }
        } else {
            for (key, value) in config {
                if let Some(slot) = current.get_mut(&key) {
                    *slot = value;
                }
            }
        }
    }

    /// Replace (`overwrite`) or merge into the state, then notify.
    pub fn update(&self, state: StateMap, overwrite: bool) {
        {
            let mut current = self.inner.state.write();
            let next = if overwrite {
                state
            } else {
                let mut merged = StateMap::clone(&current);
                merged.extend(state);
                merged
            };
            *current = Arc::new(next);
        }
        self.notify();
    }

    /// Call every listener with the current state, unless disabled.
    ///
    /// Listeners run in subscription order over a snapshot of the list. A
    /// failing or panicking listener is logged and the rest still run.
    /// Returns how many listeners succeeded.
    pub fn notify(&self) -> usize {
        if self.disabled() {
            return 0;
        }
        let state = self.state();
        let listeners: Vec<(ListenerId, Arc<StateListener>)> = self.inner.listeners.read().clone();

        let mut delivered = 0;
        for (id, listener) in listeners {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| listener(&state)))
                .unwrap_or_else(|_| Err(anyhow::anyhow!("listener panicked")));
            match outcome {
                Ok(()) => delivered += 1,
                Err(err) => error!(
                    controller = %self.inner.name,
                    listener = id.0,
                    error = %format!("{err:#}"),
                    "State listener failed"
                ),
            }
        }
        delivered
    }

    /// Add a listener called on every notification.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&StateMap) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }
}

impl fmt::Debug for LegacyController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LegacyController")
            .field("name", &self.inner.name)
            .field("state", &self.inner.state.read())
            .field("disabled", &self.disabled())
            .finish_non_exhaustive()
    }
}
