//! # State Patches
//!
//! Structural diff between two JSON snapshots, expressed as a list of
//! `add`/`replace`/`remove` operations. A subscriber holding a mirror of the
//! old snapshot reaches the new one by applying the patches in order.
//!
//! Serialized form: `{"op": "replace", "path": ["accounts", 0], "value": ...}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors from applying patches.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("Patch path {path:?} does not exist in the target")]
    InvalidPath { path: Vec<PathSegment> },

    #[error("Patch {op:?} at {path:?} is missing its value")]
    MissingValue { op: PatchOp, path: Vec<PathSegment> },
}

/// One step of a patch path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Replace,
    Remove,
}

/// A single change between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub op: PatchOp,
    pub path: Vec<PathSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Patch {
    fn add(path: Vec<PathSegment>, value: Value) -> Self {
        Self {
            op: PatchOp::Add,
            path,
            value: Some(value),
        }
    }

    fn replace(path: Vec<PathSegment>, value: Value) -> Self {
        Self {
            op: PatchOp::Replace,
            path,
            value: Some(value),
        }
    }

    fn remove(path: Vec<PathSegment>) -> Self {
        Self {
            op: PatchOp::Remove,
            path,
            value: None,
        }
    }
}

/// Compute the patches turning `old` into `new`.
///
/// Objects and arrays are diffed recursively; any other change, including a
/// change of type, becomes a `replace` at that path. Empty when equal.
#[must_use]
pub fn diff(old: &Value, new: &Value) -> Vec<Patch> {
    let mut patches = Vec::new();
    let mut path = Vec::new();
    diff_into(old, new, &mut path, &mut patches);
    patches
}

fn diff_into(old: &Value, new: &Value, path: &mut Vec<PathSegment>, out: &mut Vec<Patch>) {
    if old == new {
        return;
    }

    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            for key in old_map.keys() {
                if !new_map.contains_key(key) {
                    path.push(PathSegment::Key(key.clone()));
                    out.push(Patch::remove(path.clone()));
                    path.pop();
                }
            }
            for (key, new_value) in new_map {
                path.push(PathSegment::Key(key.clone()));
                match old_map.get(key) {
                    Some(old_value) => diff_into(old_value, new_value, path, out),
                    None => out.push(Patch::add(path.clone(), new_value.clone())),
                }
                path.pop();
            }
        }
        (Value::Array(old_items), Value::Array(new_items)) => {
            let common = old_items.len().min(new_items.len());
            for index in 0..common {
                path.push(PathSegment::Index(index));
                diff_into(&old_items[index], &new_items[index], path, out);
                path.pop();
            }
            // Trailing removals go highest index first so they apply in order.
            for index in (common..old_items.len()).rev() {
                path.push(PathSegment::Index(index));
                out.push(Patch::remove(path.clone()));
                path.pop();
            }
            for (index, item) in new_items.iter().enumerate().skip(common) {
                path.push(PathSegment::Index(index));
                out.push(Patch::add(path.clone(), item.clone()));
                path.pop();
            }
        }
        _ => out.push(Patch::replace(path.clone(), new.clone())),
    }
}

/// Apply `patches` to `target` in order.
///
/// # Errors
///
/// `InvalidPath` when a path does not resolve, `MissingValue` for an
/// add/replace without a value. `target` may be partially patched on error.
pub fn apply_patches(target: &mut Value, patches: &[Patch]) -> Result<(), PatchError> {
    for patch in patches {
        apply_patch(target, patch)?;
    }
    Ok(())
}

fn apply_patch(target: &mut Value, patch: &Patch) -> Result<(), PatchError> {
    let invalid = || PatchError::InvalidPath {
        path: patch.path.clone(),
    };
    let value = || {
        patch.value.clone().ok_or_else(|| PatchError::MissingValue {
            op: patch.op,
            path: patch.path.clone(),
        })
    };

    let Some((last, parents)) = patch.path.split_last() else {
        return match patch.op {
            PatchOp::Replace | PatchOp::Add => {
                *target = value()?;
                Ok(())
            }
            PatchOp::Remove => Err(invalid()),
        };
    };

    let mut parent = target;
    for segment in parents {
        parent = match (parent, segment) {
            (Value::Object(map), PathSegment::Key(key)) => map.get_mut(key).ok_or_else(invalid)?,
            (Value::Array(items), PathSegment::Index(index)) => {
                items.get_mut(*index).ok_or_else(invalid)?
            }
            _ => return Err(invalid()),
        };
    }

    match (parent, last, patch.op) {
        (Value::Object(map), PathSegment::Key(key), PatchOp::Add | PatchOp::Replace) => {
            map.insert(key.clone(), value()?);
        }
        (Value::Object(map), PathSegment::Key(key), PatchOp::Remove) => {
            map.remove(key).ok_or_else(invalid)?;
        }
        (Value::Array(items), PathSegment::Index(index), PatchOp::Add) => {
            if *index > items.len() {
                return Err(invalid());
            }
            items.insert(*index, value()?);
        }
        (Value::Array(items), PathSegment::Index(index), PatchOp::Replace) => {
            let slot = items.get_mut(*index).ok_or_else(invalid)?;
            *slot = value()?;
        }
        (Value::Array(items), PathSegment::Index(index), PatchOp::Remove) => {
            if *index >= items.len() {
                return Err(invalid());
            }
            items.remove(*index);
        }
        _ => return Err(invalid()),
    }
    Ok(())
}
