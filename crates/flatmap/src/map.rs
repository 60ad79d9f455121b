//! Flattened representation of a [`Tree`]

use crate::error::FlatMapError;
use crate::path::{DEFAULT_SEPARATOR, LENGTH_KEY, PathPattern, join_path, split_key};
use crate::tree::Tree;
use std::collections::BTreeMap;
use std::fmt;

/// Value stored at a flattened path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Leaf {
    /// Scalar text
    Scalar(String),
    /// Explicit null
    Null,
    /// Length of the sequence owning this `#` entry
    Len(usize),
    /// Marker for a nested mapping without keys
    EmptyMapping,
}

impl Leaf {
    fn into_tree(self) -> Tree {
        match self {
            Leaf::Scalar(text) => Tree::Scalar(text),
            Leaf::Null => Tree::Null,
            Leaf::Len(len) => Tree::Scalar(len.to_string()),
            Leaf::EmptyMapping => Tree::mapping(),
        }
    }
}

impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leaf::Scalar(text) => f.write_str(text),
            Leaf::Null => f.write_str("null"),
            Leaf::Len(len) => write!(f, "{len}"),
            Leaf::EmptyMapping => f.write_str("{}"),
        }
    }
}

/// Map from separator-joined paths to leaf values.
///
/// Entries are kept sorted by path, which makes iteration deterministic.
/// Path segments are escaped as described in [`crate::path`], so
/// `metadata.annotations.app\\.kubernetes\\.io/name` is a three segment path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatMap {
    entries: BTreeMap<String, Leaf>,
    separator: String,
}

impl Default for FlatMap {
    fn default() -> Self {
        Self::new()
    }
}

impl FlatMap {
    /// Empty map using the `.` separator
    #[must_use]
    pub fn new() -> Self {
        Self::with_separator(DEFAULT_SEPARATOR)
    }

    /// Empty map using `separator`. An empty separator falls back to `.`.
    #[must_use]
    pub fn with_separator(separator: impl Into<String>) -> Self {
        let separator = separator.into();
        Self {
            entries: BTreeMap::new(),
            separator: if separator.is_empty() {
                DEFAULT_SEPARATOR.to_string()
            } else {
                separator
            },
        }
    }

    /// Flattens `tree` with the default separator.
    #[must_use]
    pub fn flatten(tree: &Tree) -> Self {
        Self::flatten_with_separator(tree, DEFAULT_SEPARATOR)
    }

    /// Flattens `tree` joining path segments with `separator`.
    #[must_use]
    pub fn flatten_with_separator(tree: &Tree, separator: impl Into<String>) -> Self {
        let mut map = Self::with_separator(separator);
        let mut path = Vec::new();
        flatten_into(tree, &mut path, &mut map);
        map
    }

    /// Flattens a JSON document.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        Self::flatten(&Tree::from(value))
    }

    /// Separator joining path segments
    #[must_use]
    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Leaf stored at `path`
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Leaf> {
        self.entries.get(path)
    }

    /// Whether `path` is stored
    #[must_use]
    pub fn contains_path(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Stores `leaf` at `path`, returning the previous leaf.
    pub fn insert(&mut self, path: impl Into<String>, leaf: Leaf) -> Option<Leaf> {
        self.entries.insert(path.into(), leaf)
    }

    /// Number of stored paths
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no path is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in path order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Leaf)> {
        self.entries.iter().map(|(path, leaf)| (path.as_str(), leaf))
    }

    /// Relocates `from` and everything below it to `to`.
    ///
    /// Both paths may contain up to two `*` wildcards. Each wildcard in
    /// `from` binds the concrete array index of a matching entry, and the
    /// bound indices are substituted into the wildcards of `to` in order.
    /// Entries that do not match are left untouched; nothing matching is a
    /// no-op. Existing entries at a destination path are overwritten.
    ///
    /// # Errors
    ///
    /// Fails when either path does not parse or the wildcard counts differ.
    pub fn move_path(&mut self, from: &str, to: &str) -> Result<(), FlatMapError> {
        let source = PathPattern::parse(from, &self.separator)?;
        let target = PathPattern::parse(to, &self.separator)?;
        if source.wildcards() != target.wildcards() {
            return Err(FlatMapError::WildcardMismatch {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let relocations: Vec<(String, String)> = self
            .entries
            .keys()
            .filter_map(|key| {
                let segments = split_key(key, &self.separator);
                let matched = source.match_prefix(&segments)?;
                let mut destination = target.fill(&matched.captures);
                destination.extend_from_slice(&segments[matched.consumed..]);
                Some((key.clone(), join_path(&destination, &self.separator)))
            })
            .collect();

        // Detach every match before writing so a destination inside the
        // source subtree cannot be picked up twice.
        let detached: Vec<(String, Leaf)> = relocations
            .into_iter()
            .filter_map(|(key, destination)| {
                self.entries.remove(&key).map(|leaf| (destination, leaf))
            })
            .collect();
        self.entries.extend(detached);
        Ok(())
    }

    /// Removes `prefix` and everything below it.
    ///
    /// Wildcards behave as in [`FlatMap::move_path`]: `items.*.name` removes
    /// the `name` subtree of every element of `items`.
    ///
    /// # Errors
    ///
    /// Fails when the path does not parse.
    pub fn delete_path(&mut self, prefix: &str) -> Result<(), FlatMapError> {
        let pattern = PathPattern::parse(prefix, &self.separator)?;
        let separator = self.separator.clone();
        self.entries
            .retain(|key, _| pattern.match_prefix(&split_key(key, &separator)).is_none());
        Ok(())
    }

    /// Rebuilds the nested tree.
    ///
    /// A node with a `#` length entry becomes a sequence of that length;
    /// indices without an entry become [`Tree::Null`].
    #[must_use]
    pub fn expand(&self) -> Tree {
        let mut root = Node::Branch(BTreeMap::new());
        for (key, leaf) in &self.entries {
            insert_node(&mut root, &split_key(key, &self.separator), leaf.clone());
        }
        root.into_tree()
    }
}

impl<'a> IntoIterator for &'a FlatMap {
    type Item = (&'a String, &'a Leaf);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Leaf>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn flatten_into(tree: &Tree, path: &mut Vec<String>, map: &mut FlatMap) {
    match tree {
        Tree::Scalar(text) => {
            map.entries
                .insert(join_path(path.iter(), &map.separator), Leaf::Scalar(text.clone()));
        }
        Tree::Null => {
            map.entries.insert(join_path(path.iter(), &map.separator), Leaf::Null);
        }
        Tree::Mapping(fields) if fields.is_empty() && !path.is_empty() => {
            map.entries
                .insert(join_path(path.iter(), &map.separator), Leaf::EmptyMapping);
        }
        Tree::Mapping(fields) => {
            for (key, child) in fields {
                path.push(key.clone());
                flatten_into(child, path, map);
                path.pop();
            }
        }
        Tree::Sequence(items) => {
            path.push(LENGTH_KEY.to_string());
            map.entries
                .insert(join_path(path.iter(), &map.separator), Leaf::Len(items.len()));
            path.pop();
            for (index, item) in items.iter().enumerate() {
                path.push(index.to_string());
                flatten_into(item, path, map);
                path.pop();
            }
        }
    }
}

enum Node {
    Leaf(Leaf),
    Branch(BTreeMap<String, Node>),
}

fn insert_node(node: &mut Node, segments: &[String], leaf: Leaf) {
    let Some((head, tail)) = segments.split_first() else {
        *node = Node::Leaf(leaf);
        return;
    };
    if let Node::Leaf(_) = node {
        *node = Node::Branch(BTreeMap::new());
    }
    if let Node::Branch(children) = node {
        let child = children
            .entry(head.clone())
            .or_insert_with(|| Node::Branch(BTreeMap::new()));
        insert_node(child, tail, leaf);
    }
}

impl Node {
    fn into_tree(self) -> Tree {
        match self {
            Node::Leaf(leaf) => leaf.into_tree(),
            Node::Branch(mut children) => {
                let len = match children.get(LENGTH_KEY) {
                    Some(Node::Leaf(Leaf::Len(len))) => Some(*len),
                    _ => None,
                };
                match len {
                    Some(len) => Tree::Sequence(
                        (0..len)
                            .map(|index| {
                                children
                                    .remove(&index.to_string())
                                    .map_or(Tree::Null, Node::into_tree)
                            })
                            .collect(),
                    ),
                    None => Tree::Mapping(
                        children
                            .into_iter()
                            .map(|(key, child)| (key, child.into_tree()))
                            .collect(),
                    ),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scalar(text: &str) -> Leaf {
        Leaf::Scalar(text.to_string())
    }

    #[test]
    fn test_flatten_layout() {
        let map = FlatMap::from_json(&json!({
            "a": {"b": "x"},
            "list": ["p", {"q": 1}],
            "none": null,
            "empty": {}
        }));
        assert_eq!(map.get("a.b"), Some(&scalar("x")));
        assert_eq!(map.get("list.#"), Some(&Leaf::Len(2)));
        assert_eq!(map.get("list.0"), Some(&scalar("p")));
        assert_eq!(map.get("list.1.q"), Some(&scalar("1")));
        assert_eq!(map.get("none"), Some(&Leaf::Null));
        assert_eq!(map.get("empty"), Some(&Leaf::EmptyMapping));
        assert_eq!(map.len(), 6);
    }

    #[test]
    fn test_move_exact_key() {
        let mut map = FlatMap::from_json(&json!({"a": {"b": "x", "c": "y"}}));
        map.move_path("a.b", "z").unwrap();
        assert_eq!(map.get("z"), Some(&scalar("x")));
        assert!(!map.contains_path("a.b"));
        assert_eq!(map.get("a.c"), Some(&scalar("y")));
    }

    #[test]
    fn test_move_is_segment_aligned() {
        let mut map = FlatMap::from_json(&json!({"a": {"b": {"c": "1"}, "bc": "2"}}));
        map.move_path("a.b", "x").unwrap();
        assert_eq!(map.get("x.c"), Some(&scalar("1")));
        assert_eq!(map.get("a.bc"), Some(&scalar("2")));
    }

    #[test]
    fn test_move_without_match_is_noop() {
        let mut map = FlatMap::from_json(&json!({"a": "1"}));
        let before = map.clone();
        map.move_path("missing.path", "other").unwrap();
        assert_eq!(map, before);
    }

    #[test]
    fn test_move_into_own_subtree() {
        let mut map = FlatMap::from_json(&json!({"a": {"b": "1"}}));
        map.move_path("a", "a.inner").unwrap();
        assert_eq!(map.expand(), Tree::from(json!({"a": {"inner": {"b": "1"}}})));
    }

    #[test]
    fn test_move_wildcard_preserves_index() {
        let mut map = FlatMap::from_json(&json!({
            "items": [{"name": "a", "v": 1}, {"name": "b", "v": 2}]
        }));
        map.move_path("items.*.name", "items.*.id").unwrap();
        assert_eq!(
            map.expand(),
            Tree::from(json!({"items": [{"id": "a", "v": "1"}, {"id": "b", "v": "2"}]}))
        );
    }

    #[test]
    fn test_move_wildcard_subtree() {
        let mut map = FlatMap::from_json(&json!({
            "items": [{"meta": {"x": "1", "y": "2"}}, {"meta": {"x": "3"}}]
        }));
        map.move_path("items.*.meta", "items.*.info").unwrap();
        assert_eq!(map.get("items.0.info.x"), Some(&scalar("1")));
        assert_eq!(map.get("items.0.info.y"), Some(&scalar("2")));
        assert_eq!(map.get("items.1.info.x"), Some(&scalar("3")));
        assert!(!map.contains_path("items.0.meta.x"));
        assert_eq!(map.get("items.#"), Some(&Leaf::Len(2)));
    }

    #[test]
    fn test_move_nested_wildcards() {
        let mut map = FlatMap::from_json(&json!({
            "rows": [{"cells": [{"v": "a"}, {"v": "b"}]}, {"cells": [{"v": "c"}]}]
        }));
        map.move_path("rows.*.cells.*.v", "rows.*.cells.*.value").unwrap();
        assert_eq!(
            map.expand(),
            Tree::from(json!({
                "rows": [
                    {"cells": [{"value": "a"}, {"value": "b"}]},
                    {"cells": [{"value": "c"}]}
                ]
            }))
        );
    }

    #[test]
    fn test_move_rejects_wildcard_mismatch() {
        let mut map = FlatMap::from_json(&json!({"items": ["a"]}));
        assert!(matches!(
            map.move_path("items.*", "flat"),
            Err(FlatMapError::WildcardMismatch { .. })
        ));
    }

    #[test]
    fn test_delete_prefix() {
        let mut map = FlatMap::from_json(&json!({"a": {"b": {"c": "1"}, "bc": "2"}}));
        map.delete_path("a.b").unwrap();
        assert!(!map.contains_path("a.b.c"));
        assert_eq!(map.get("a.bc"), Some(&scalar("2")));
    }

    #[test]
    fn test_delete_nested_wildcards() {
        let mut map = FlatMap::from_json(&json!({
            "rows": [{"cells": [{"v": "a", "k": "1"}]}, {"cells": [{"v": "b", "k": "2"}]}]
        }));
        map.delete_path("rows.*.cells.*.v").unwrap();
        assert!(!map.contains_path("rows.0.cells.0.v"));
        assert!(!map.contains_path("rows.1.cells.0.v"));
        assert_eq!(map.get("rows.1.cells.0.k"), Some(&scalar("2")));
    }

    #[test]
    fn test_expand_sparse_sequence_has_holes() {
        let mut map = FlatMap::new();
        map.insert("list.#", Leaf::Len(3));
        map.insert("list.2", scalar("last"));
        assert_eq!(
            map.expand(),
            Tree::from(json!({"list": [null, null, "last"]}))
        );
    }

    #[test]
    fn test_custom_separator_round_trip() {
        let tree = Tree::from(json!({"a": {"b": ["x", "y"]}}));
        let map = FlatMap::flatten_with_separator(&tree, "/");
        assert_eq!(map.get("a/b/#"), Some(&Leaf::Len(2)));
        assert_eq!(map.expand(), tree);
    }

    #[test]
    fn test_dotted_keys_are_escaped() {
        let mut map = FlatMap::from_json(&json!({
            "metadata": {"labels": {"app.kubernetes.io/name": "db", "app": {"kubernetes": "x"}}}
        }));
        assert_eq!(
            map.get("metadata.labels.app\\.kubernetes\\.io/name"),
            Some(&scalar("db"))
        );
        assert_eq!(map.get("metadata.labels.app.kubernetes"), Some(&scalar("x")));

        map.move_path("metadata.labels.app\\.kubernetes\\.io/name", "spec.name")
            .unwrap();
        assert_eq!(map.get("spec.name"), Some(&scalar("db")));
        map.delete_path("metadata.labels.app").unwrap();
        assert_eq!(map.expand(), Tree::from(json!({"spec": {"name": "db"}})));
    }

    #[test]
    fn test_root_scalar_and_sequence() {
        let scalar_tree = Tree::Scalar("v".to_string());
        assert_eq!(FlatMap::flatten(&scalar_tree).expand(), scalar_tree);

        let sequence = Tree::from(json!(["a", ["b"]]));
        let map = FlatMap::flatten(&sequence);
        assert_eq!(map.get("1.#"), Some(&Leaf::Len(1)));
        assert_eq!(map.expand(), sequence);
    }
}
