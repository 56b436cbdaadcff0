//! Action and event names.
//!
//! Names follow `"<ControllerName>:<eventOrActionName>"`: colon-delimited,
//! case-sensitive, unique per messenger.

/// Separator between the namespace and the local part of a name.
pub const NAMESPACE_SEPARATOR: char = ':';

/// Join a namespace and a local name.
#[must_use]
pub fn namespaced(namespace: &str, local: &str) -> String {
    format!("{namespace}{NAMESPACE_SEPARATOR}{local}")
}

/// Split a full name into `(namespace, local)`.
///
/// Returns `None` when there is no separator or either side is empty.
#[must_use]
pub fn split_name(full: &str) -> Option<(&str, &str)> {
    let (namespace, local) = full.split_once(NAMESPACE_SEPARATOR)?;
    if namespace.is_empty() || local.is_empty() {
        return None;
    }
    Some((namespace, local))
}

/// Whether `full` lives in `namespace`.
#[must_use]
pub fn in_namespace(full: &str, namespace: &str) -> bool {
    matches!(split_name(full), Some((ns, _)) if ns == namespace)
}
