//! JSON document helpers shared by the pipeline stages.
//!
//! Specs and configuration files are handled as untyped [`serde_json::Value`]
//! trees so that unknown keys survive a load/transform/store cycle untouched.

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::PushError;

/// Deep-merge `overlay` onto `target`.
///
/// Objects are merged key by key, recursively. Every other value in
/// `overlay` replaces the value in `target`.
pub fn deep_merge(target: &mut Value, overlay: &Value) {
    match (target, overlay) {
        (Value::Object(target), Value::Object(overlay)) => merge_objects(target, overlay),
        (target, overlay) => *target = overlay.clone(),
    }
}

/// Deep-merge the keys of `overlay` into `target`.
pub fn merge_objects(target: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match target.get_mut(key) {
            Some(existing) if existing.is_object() && value.is_object() => {
                deep_merge(existing, value)
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Walk a dotted path (`a.b.c`) through nested objects.
pub fn find<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| match current {
        Value::Object(obj) => obj.get(*key),
        Value::Array(arr) => key.parse::<usize>().ok().and_then(|i| arr.get(i)),
        _ => None,
    })
}

/// Whether a path has a YAML extension.
pub fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Load a JSON or YAML document, chosen by file extension.
pub fn load_document(path: &Path) -> Result<Value, PushError> {
    let content = std::fs::read_to_string(path).map_err(|e| PushError::io_at(path, e))?;
    parse_document(&content, path)
}

/// Parse document content, using the path only to pick the format and for messages.
pub fn parse_document(content: &str, path: &Path) -> Result<Value, PushError> {
    if is_yaml(path) {
        serde_yaml::from_str(content).map_err(|e| {
            PushError::ConfigParse(format!("failed to parse {}: {}", path.display(), e))
        })
    } else {
        serde_json::from_str(content).map_err(|e| {
            PushError::ConfigParse(format!("failed to parse {}: {}", path.display(), e))
        })
    }
}

/// Store a value as pretty-printed JSON.
pub fn store_json(value: &Value, path: &Path) -> Result<(), PushError> {
    let mut content = serde_json::to_string_pretty(value)?;
    content.push('\n');
    std::fs::write(path, content).map_err(|e| PushError::io_at(path, e))
}

/// Return the first existing `<dir>/<stem>.<ext>` for json, yaml and yml.
pub fn find_document(dir: &Path, stem: &str) -> Option<std::path::PathBuf> {
    ["json", "yaml", "yml"]
        .iter()
        .map(|ext| dir.join(format!("{}.{}", stem, ext)))
        .find(|p| p.is_file())
}
