//! `//@` marker extraction from service scripts.
//!
//! A script may annotate itself with structured comments:
//!
//! ```text
//! //@ <Param> name id | required
//! //@ Identifier of the order
//! //@ to fetch/
//! ```
//!
//! A line whose remainder starts with `<tag>` declares a new marker; its
//! `|`-separated properties are `key value` pairs, a bare key meaning `true`.
//! Any other marker line continues the `comment` of the last marker. A
//! trailing `/` joins without a newline.

use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::PushError;

/// Prefix of marker lines, after leading whitespace.
pub const MARKER_PREFIX: &str = "//@";

/// A marker attached to a service spec.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    /// 1-based line number in the script.
    pub line: String,
    /// Lowercased tag.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Marker {
    fn append_comment(&mut self, text: &str) {
        let piece = match text.strip_suffix('/') {
            Some(joined) => joined.to_string(),
            None => format!("{}\n", text),
        };
        match &mut self.comment {
            Some(comment) => comment.push_str(&piece),
            None => self.comment = Some(piece),
        }
    }
}

/// One classified marker line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerLine<'a> {
    /// `<tag> props...`
    Declaration {
        line: usize,
        tag: &'a str,
        properties: &'a str,
    },
    /// Free text continuing the previous marker's comment.
    Continuation { line: usize, text: &'a str },
}

impl<'a> MarkerLine<'a> {
    /// Classify a source line. Returns `None` for lines that are not markers.
    pub fn classify(line: usize, source: &'a str) -> Option<Self> {
        let rest = source.trim_start().strip_prefix(MARKER_PREFIX)?.trim();

        if let Some(inner) = rest.strip_prefix('<') {
            if let Some(gt) = inner.find('>') {
                if gt > 0 {
                    return Some(MarkerLine::Declaration {
                        line,
                        tag: &inner[..gt],
                        properties: inner[gt + 1..].trim(),
                    });
                }
            }
        }

        Some(MarkerLine::Continuation { line, text: rest })
    }
}

/// Iterate over the marker lines of a script, with 1-based line numbers.
pub fn tokenize(script: &str) -> impl Iterator<Item = MarkerLine<'_>> {
    script
        .lines()
        .enumerate()
        .filter_map(|(i, l)| MarkerLine::classify(i + 1, l))
}

fn parse_properties(text: &str) -> Map<String, Value> {
    let mut props = Map::new();
    for part in text.split('|').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once(char::is_whitespace) {
            Some((key, value)) if !value.trim().is_empty() => {
                props.insert(key.to_string(), Value::String(value.trim().to_string()));
            }
            Some((key, _)) => {
                props.insert(key.to_string(), Value::Bool(true));
            }
            None => {
                props.insert(part.to_string(), Value::Bool(true));
            }
        }
    }
    props
}

/// Parse every marker of a script.
pub fn parse(script: &str) -> Vec<Marker> {
    let mut markers: Vec<Marker> = Vec::new();
    for token in tokenize(script) {
        match token {
            MarkerLine::Declaration {
                line,
                tag,
                properties,
            } => markers.push(Marker {
                line: line.to_string(),
                kind: tag.to_lowercase(),
                properties: parse_properties(properties),
                comment: None,
            }),
            MarkerLine::Continuation { text, .. } => {
                if let Some(last) = markers.last_mut() {
                    last.append_comment(text);
                }
            }
        }
    }
    markers
}

/// When a service spec is written back after extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StorePolicy {
    /// Only when at least one marker was found.
    #[default]
    WhenFound,
    /// Every time extraction runs.
    Always,
}

impl StorePolicy {
    pub fn should_store(self, found: usize) -> bool {
        match self {
            StorePolicy::WhenFound => found > 0,
            StorePolicy::Always => true,
        }
    }
}

/// Read `script` and append its markers to the service's `markers` list.
///
/// Returns the number of markers found. The service is left untouched when
/// there are none.
pub fn extract(service: &mut Map<String, Value>, script: &Path) -> Result<usize, PushError> {
    let source = std::fs::read_to_string(script).map_err(|e| PushError::io_at(script, e))?;
    let markers = parse(&source);
    if markers.is_empty() {
        return Ok(0);
    }

    let found = markers.len();
    let entry = service
        .entry("markers")
        .or_insert_with(|| Value::Array(Vec::new()));
    if !entry.is_array() {
        *entry = Value::Array(Vec::new());
    }
    if let Value::Array(list) = entry {
        for marker in markers {
            list.push(serde_json::to_value(marker)?);
        }
    }

    tracing::debug!(
        script = %script.display(),
        markers = found,
        "Extracted markers"
    );
    Ok(found)
}
