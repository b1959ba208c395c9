//! Api namespace mutation and validation.

use std::sync::LazyLock;

use regex_lite::Regex;

use crate::error::PushError;

static NAMESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]*$").expect("namespace regex is valid"));

/// Check that a namespace is non-empty and only uses letters, digits, `_` and `-`.
pub fn validate(namespace: &str) -> Result<(), PushError> {
    if namespace.is_empty() || !NAMESPACE.is_match(namespace) {
        return Err(PushError::InvalidNamespace(namespace.to_string()));
    }
    Ok(())
}

/// Append a release version: `shop` + `V2` is `shop-v2`.
pub fn with_version(namespace: &str, version: &str) -> String {
    format!("{}-{}", namespace, version.to_lowercase())
}

/// Append the pushing user's stamp.
pub fn with_stamp(namespace: &str, stamp: &str) -> String {
    format!("{}-{}", namespace, stamp)
}

/// Final form: lowercased.
pub fn finalize(namespace: &str) -> String {
    namespace.to_lowercase()
}
