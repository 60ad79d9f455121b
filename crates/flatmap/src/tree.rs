//! Untyped resource trees
//!
//! `Tree` is the tagged-variant form of an arbitrary resource body. JSON
//! numbers and booleans are carried in their textual form since every
//! consumer of the flat representation works on strings.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Nested resource content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tree {
    /// A terminal value in textual form
    Scalar(String),
    /// An explicit null, also used for holes when expanding sparse sequences
    Null,
    /// An ordered sequence
    Sequence(Vec<Tree>),
    /// A keyed mapping
    Mapping(BTreeMap<String, Tree>),
}

impl Tree {
    /// An empty mapping
    #[must_use]
    pub fn mapping() -> Self {
        Tree::Mapping(BTreeMap::new())
    }

    /// Returns the child stored under `key` when this is a mapping.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Tree> {
        match self {
            Tree::Mapping(fields) => fields.get(key),
            _ => None,
        }
    }

    /// Walks a sequence of mapping keys.
    #[must_use]
    pub fn pointer(&self, keys: &[&str]) -> Option<&Tree> {
        keys.iter().try_fold(self, |node, key| node.get(key))
    }

    /// Returns the scalar text, if this is a scalar.
    #[must_use]
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Tree::Scalar(value) => Some(value),
            _ => None,
        }
    }
}

impl From<&Value> for Tree {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Tree::Null,
            Value::Bool(flag) => Tree::Scalar(flag.to_string()),
            Value::Number(number) => Tree::Scalar(number.to_string()),
            Value::String(text) => Tree::Scalar(text.clone()),
            Value::Array(items) => Tree::Sequence(items.iter().map(Tree::from).collect()),
            Value::Object(fields) => Tree::Mapping(
                fields
                    .iter()
                    .map(|(key, child)| (key.clone(), Tree::from(child)))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for Tree {
    fn from(value: Value) -> Self {
        Tree::from(&value)
    }
}

impl From<&str> for Tree {
    fn from(value: &str) -> Self {
        Tree::Scalar(value.to_string())
    }
}

impl From<&Tree> for Value {
    fn from(tree: &Tree) -> Self {
        match tree {
            Tree::Scalar(text) => Value::String(text.clone()),
            Tree::Null => Value::Null,
            Tree::Sequence(items) => Value::Array(items.iter().map(Value::from).collect()),
            Tree::Mapping(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(key, child)| (key.clone(), Value::from(child)))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }
}
