//! Wildcard-driven per-service overrides.
//!
//! A rule looks like `{matches: "/orders/*", apply: {...}}`. When the
//! service endpoint matches the wildcard (or the rule has no `matches`), the
//! `apply` mapping is deep-merged onto the service spec.

use regex_lite::Regex;
use serde_json::{Map, Value};

use crate::error::PushError;
use crate::json::merge_objects;

/// Endpoint wildcard: `*` is any run of characters, `?` is one character.
#[derive(Debug, Clone)]
pub struct Wildcard {
    regex: Regex,
}

impl Wildcard {
    pub fn new(pattern: &str) -> Result<Self, PushError> {
        let mut source = String::with_capacity(pattern.len() + 8);
        source.push('^');
        for c in pattern.chars() {
            match c {
                '*' => source.push_str(".*"),
                '?' => source.push('.'),
                c => source.push_str(&regex_lite::escape(c.encode_utf8(&mut [0; 4]))),
            }
        }
        source.push('$');

        let regex = Regex::new(&source).map_err(|e| {
            PushError::ConfigParse(format!("invalid wildcard '{}': {}", pattern, e))
        })?;
        Ok(Self { regex })
    }

    /// Whether the whole endpoint matches.
    pub fn matches(&self, endpoint: &str) -> bool {
        self.regex.is_match(endpoint)
    }
}

/// One override rule.
#[derive(Debug, Clone)]
pub struct OverrideRule {
    /// `None` applies to every service.
    pub matches: Option<Wildcard>,
    pub apply: Map<String, Value>,
}

impl OverrideRule {
    /// Parse a rule from its configuration form.
    pub fn from_value(value: &Value) -> Result<Self, PushError> {
        let Value::Object(rule) = value else {
            return Err(PushError::ConfigParse(
                "override rule must be a mapping".to_string(),
            ));
        };

        let matches = match rule.get("matches") {
            None | Some(Value::Null) => None,
            Some(Value::String(pattern)) => Some(Wildcard::new(pattern)?),
            Some(_) => {
                return Err(PushError::ConfigParse(
                    "override rule 'matches' must be a string".to_string(),
                ))
            }
        };

        let apply = match rule.get("apply") {
            Some(Value::Object(apply)) => apply.clone(),
            _ => {
                return Err(PushError::ConfigParse(
                    "override rule 'apply' must be a mapping".to_string(),
                ))
            }
        };

        Ok(Self { matches, apply })
    }

    pub fn applies_to(&self, endpoint: &str) -> bool {
        self.matches.as_ref().map_or(true, |w| w.matches(endpoint))
    }
}

/// Apply every matching rule to a service, in order. Returns how many applied.
pub fn apply_rules(service: &mut Map<String, Value>, rules: &[OverrideRule]) -> usize {
    let mut applied = 0;
    for rule in rules {
        let endpoint = service
            .get("endpoint")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if rule.applies_to(&endpoint) {
            merge_objects(service, &rule.apply);
            applied += 1;
        }
    }
    applied
}
