//! Hierarchical key-path maps
//!
//! Flattens nested resource trees into a map from path strings to leaf
//! values, supports relocating and deleting whole subtrees (including
//! across every element of an array via `*` wildcards) and expands the
//! result back into a tree.
//!
//! # Example
//!
//! ```
//! use flatmap::{FlatMap, Leaf, Tree};
//! use serde_json::json;
//!
//! let tree = Tree::from(json!({"spec": {"items": [{"name": "a"}, {"name": "b"}]}}));
//! let mut map = FlatMap::flatten(&tree);
//! assert_eq!(map.get("spec.items.#"), Some(&Leaf::Len(2)));
//!
//! map.move_path("spec.items.*.name", "spec.items.*.id").unwrap();
//! assert_eq!(map.get("spec.items.1.id"), Some(&Leaf::Scalar("b".to_string())));
//! ```
//!
//! # Layout
//!
//! - Mappings contribute one path segment per key.
//! - Sequences contribute a `#` entry holding their length plus one numeric
//!   segment per element.
//! - Scalars and nulls terminate a path. Empty nested mappings are kept as an
//!   explicit leaf so that `expand(flatten(t)) == t`.
//! - Keys containing the separator or the `\` escape, and empty keys, are
//!   escaped (see [`path`]).

pub mod error;
pub mod map;
pub mod path;
pub mod tree;

pub use error::FlatMapError;
pub use map::{FlatMap, Leaf};
pub use path::{
    DEFAULT_SEPARATOR, ESCAPE, LENGTH_KEY, MAX_WILDCARDS, PathPattern, Segment, WILDCARD,
    escape_segment, join_path, split_key,
};
pub use tree::Tree;
