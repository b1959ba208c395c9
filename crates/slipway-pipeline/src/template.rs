//! Template substitution over JSON trees.
//!
//! String values may embed `{% expr %}` tokens. An expression is a list of
//! alternatives separated by `|`; the first one that resolves wins:
//!
//! - `'text'` is a literal;
//! - `Namespace.key.path` looks a value up in a bound namespace;
//! - `Fn.now`, `Fn.uuid` and `Fn.rand[.<len>]` call a built-in function.
//!
//! Tokens that resolve to nothing are kept as literal text. A string made of
//! a single token takes the resolved value with its JSON type.

use chrono::Utc;
use rand::distr::Alphanumeric;
use rand::Rng;
use serde_json::{Map, Value};

use crate::json::find;

const OPEN: &str = "{%";
const CLOSE: &str = "%}";
const FUNCTIONS: &str = "Fn";

/// Named values visible to template expressions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    namespaces: Map<String, Value>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a namespace, replacing any previous binding with that name.
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.bind(name, value);
        self
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.namespaces.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.namespaces.get(name)
    }

    /// Resolve one expression. Returns `None` when no alternative resolves.
    pub fn resolve(&self, expr: &str) -> Option<Value> {
        expr.split('|')
            .map(str::trim)
            .filter(|alt| !alt.is_empty())
            .find_map(|alt| self.resolve_alternative(alt))
    }

    fn resolve_alternative(&self, alt: &str) -> Option<Value> {
        if let Some(literal) = alt
            .strip_prefix('\'')
            .and_then(|rest| rest.strip_suffix('\''))
        {
            return Some(Value::String(literal.to_string()));
        }

        let mut path = alt.split('.');
        let namespace = path.next()?;
        let rest: Vec<&str> = path.collect();

        if namespace == FUNCTIONS {
            return call_function(&rest);
        }

        match find(self.namespaces.get(namespace)?, &rest)? {
            Value::Null => None,
            value => Some(value.clone()),
        }
    }
}

fn call_function(path: &[&str]) -> Option<Value> {
    match path {
        ["now"] => Some(Value::String(
            Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        )),
        ["uuid"] => Some(Value::String(uuid::Uuid::new_v4().to_string())),
        ["rand"] => Some(Value::String(random_token(DEFAULT_RAND_LEN))),
        ["rand", len] => match len.parse::<usize>() {
            Ok(n) if (1..=MAX_RAND_LEN).contains(&n) => Some(Value::String(random_token(n))),
            _ => None,
        },
        _ => None,
    }
}

const DEFAULT_RAND_LEN: usize = 8;
const MAX_RAND_LEN: usize = 64;

fn random_token(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Piece of a templated string.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    /// Expression plus the raw token text, kept for unresolved tokens.
    Token { expr: &'a str, raw: &'a str },
}

fn segments(text: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };
        if start > 0 {
            out.push(Segment::Text(&rest[..start]));
        }
        let raw_len = start + OPEN.len() + end + CLOSE.len();
        out.push(Segment::Token {
            expr: after_open[..end].trim(),
            raw: &rest[start..raw_len],
        });
        rest = &rest[raw_len..];
    }
    if !rest.is_empty() {
        out.push(Segment::Text(rest));
    }
    out
}

/// Render one string. Returns `None` when the string has no token.
pub fn render(text: &str, bindings: &Bindings) -> Option<Value> {
    let parts = segments(text);
    if !parts.iter().any(|p| matches!(p, Segment::Token { .. })) {
        return None;
    }

    if let [Segment::Token { expr, raw }] = parts.as_slice() {
        return Some(
            bindings
                .resolve(expr)
                .unwrap_or_else(|| Value::String((*raw).to_string())),
        );
    }

    let mut out = String::with_capacity(text.len());
    for part in parts {
        match part {
            Segment::Text(t) => out.push_str(t),
            Segment::Token { expr, raw } => match bindings.resolve(expr) {
                Some(Value::String(s)) => out.push_str(&s),
                Some(other) => out.push_str(&other.to_string()),
                None => out.push_str(raw),
            },
        }
    }
    Some(Value::String(out))
}

/// Substitute tokens everywhere in `tree`. Object keys are left as is.
pub fn transform_in_place(tree: &mut Value, bindings: &Bindings) {
    match tree {
        Value::String(s) => {
            if let Some(rendered) = render(s, bindings) {
                *tree = rendered;
            }
        }
        Value::Array(items) => items
            .iter_mut()
            .for_each(|item| transform_in_place(item, bindings)),
        Value::Object(obj) => obj
            .values_mut()
            .for_each(|v| transform_in_place(v, bindings)),
        _ => {}
    }
}

/// Return a transformed copy of `tree`.
pub fn transform(tree: &Value, bindings: &Bindings) -> Value {
    let mut out = tree.clone();
    transform_in_place(&mut out, bindings);
    out
}
