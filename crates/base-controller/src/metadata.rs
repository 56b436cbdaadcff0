//! # State Metadata
//!
//! Per-property flags describing how a controller's state may leave the
//! controller: whether a property is persisted and whether it is safe to
//! include in anonymized diagnostics. Either flag can be a plain boolean or
//! a function deriving a reduced value.

use crate::error::ControllerError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Derives the exported form of a property.
pub type StateDeriver = dyn Fn(&Value) -> Value + Send + Sync;

/// Whether (and how) a property is included.
#[derive(Clone)]
pub enum MetadataFlag {
    Include(bool),
    Derive(Arc<StateDeriver>),
}

impl MetadataFlag {
    pub fn derive<F>(deriver: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        MetadataFlag::Derive(Arc::new(deriver))
    }

    fn project(&self, value: &Value) -> Option<Value> {
        match self {
            MetadataFlag::Include(true) => Some(value.clone()),
            MetadataFlag::Include(false) => None,
            MetadataFlag::Derive(deriver) => Some(deriver(value)),
        }
    }
}

impl From<bool> for MetadataFlag {
    fn from(include: bool) -> Self {
        MetadataFlag::Include(include)
    }
}

impl fmt::Debug for MetadataFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataFlag::Include(include) => write!(f, "Include({include})"),
            MetadataFlag::Derive(_) => f.write_str("Derive(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PropertyMetadata {
    pub persist: MetadataFlag,
    pub anonymous: MetadataFlag,
}

impl PropertyMetadata {
    pub fn new(persist: impl Into<MetadataFlag>, anonymous: impl Into<MetadataFlag>) -> Self {
        Self {
            persist: persist.into(),
            anonymous: anonymous.into(),
        }
    }
}

/// Metadata for every top-level state property.
#[derive(Debug, Clone, Default)]
pub struct StateMetadata {
    properties: BTreeMap<String, PropertyMetadata>,
}

impl StateMetadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, property: impl Into<String>, metadata: PropertyMetadata) -> Self {
        self.properties.insert(property.into(), metadata);
        self
    }

    pub fn get(&self, property: &str) -> Option<&PropertyMetadata> {
        self.properties.get(property)
    }

    pub fn properties(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    fn derive_state<F>(&self, state: &Value, controller: &str, flag: F) -> Result<Value, ControllerError>
    where
        F: Fn(&PropertyMetadata) -> &MetadataFlag,
    {
        let Value::Object(map) = state else {
            return Err(ControllerError::StateNotObject {
                controller: controller.to_string(),
            });
        };

        let mut derived = Map::new();
        for (property, value) in map {
            let metadata = self
                .get(property)
                .ok_or_else(|| ControllerError::MissingMetadata {
                    property: property.clone(),
                })?;
            if let Some(projected) = flag(metadata).project(value) {
                derived.insert(property.clone(), projected);
            }
        }
        Ok(Value::Object(derived))
    }
}

/// The subset of `state` that should be persisted.
///
/// # Errors
///
/// `MissingMetadata` for a property without metadata, `StateNotObject` if
/// `state` is not an object.
pub fn get_persistent_state(
    controller: &str,
    state: &Value,
    metadata: &StateMetadata,
) -> Result<Value, ControllerError> {
    metadata.derive_state(state, controller, |m| &m.persist)
}

/// The subset of `state` that is safe to share anonymously.
///
/// # Errors
///
/// As [`get_persistent_state`].
pub fn get_anonymized_state(
    controller: &str,
    state: &Value,
    metadata: &StateMetadata,
) -> Result<Value, ControllerError> {
    metadata.derive_state(state, controller, |m| &m.anonymous)
}
