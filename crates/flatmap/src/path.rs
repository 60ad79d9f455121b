//! Key path patterns
//!
//! A pattern is a list of segments parsed from a separator-joined path. A
//! `*` segment stands for "any array index at this position". Matching walks
//! the segment list recursively: the first segment is resolved against the
//! first key segment and the remainder is delegated to the next call.
//!
//! Keys may themselves contain the separator (`app.kubernetes.io/name`), so
//! segments are escaped when joined:
//!
//! | segment text                   | written as |
//! |--------------------------------|------------|
//! | `\`                            | `\\`       |
//! | first separator character `c`  | `\c`       |
//! | empty                          | `\0`       |
//!
//! A literal `*` key is written `\*` in a pattern.

use crate::error::FlatMapError;

/// Segment standing for any array index
pub const WILDCARD: &str = "*";

/// Segment holding the length of a sequence
pub const LENGTH_KEY: &str = "#";

/// Separator used unless another one is configured
pub const DEFAULT_SEPARATOR: &str = ".";

/// Wildcards allowed in one pattern: one collection plus one nested collection
pub const MAX_WILDCARDS: usize = 2;

/// Escape character of joined keys
pub const ESCAPE: char = '\\';

/// Escaped form of an empty segment
const EMPTY_SEGMENT: &str = "\\0";

/// One parsed path segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// A literal key
    Key(String),
    /// Any array index
    Wildcard,
}

/// Result of matching a pattern against the start of a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixMatch<'k> {
    /// Indices bound to the pattern wildcards, in order
    pub captures: Vec<&'k str>,
    /// Number of key segments consumed by the pattern
    pub consumed: usize,
}

/// A parsed key path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Parses `path` using `separator`.
    ///
    /// # Errors
    ///
    /// Fails on an empty path, an empty segment or more than
    /// [`MAX_WILDCARDS`] wildcards.
    pub fn parse(path: &str, separator: &str) -> Result<Self, FlatMapError> {
        if path.is_empty() {
            return Err(FlatMapError::EmptyPath);
        }

        let mut segments = Vec::new();
        for raw in split_raw(path, separator) {
            if raw.is_empty() {
                return Err(FlatMapError::EmptySegment {
                    path: path.to_string(),
                });
            }
            segments.push(if raw == WILDCARD {
                Segment::Wildcard
            } else {
                Segment::Key(unescape(raw, separator))
            });
        }

        let pattern = Self { segments };
        let found = pattern.wildcards();
        if found > MAX_WILDCARDS {
            return Err(FlatMapError::TooManyWildcards {
                path: path.to_string(),
                found,
                max: MAX_WILDCARDS,
            });
        }
        Ok(pattern)
    }

    /// Parsed segments
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of wildcard segments
    #[must_use]
    pub fn wildcards(&self) -> usize {
        self.segments
            .iter()
            .filter(|segment| matches!(segment, Segment::Wildcard))
            .count()
    }

    /// Matches the pattern against the leading segments of `key`.
    ///
    /// The match is segment-aligned: `a.b` matches `a.b` and `a.b.c` but not
    /// `a.bc`. Wildcards only bind numeric segments, so a `#` length entry is
    /// never captured.
    #[must_use]
    pub fn match_prefix<'k, S: AsRef<str>>(&self, key: &'k [S]) -> Option<PrefixMatch<'k>> {
        let mut captures = Vec::new();
        let consumed = match_segments(&self.segments, key, &mut captures)?;
        Some(PrefixMatch { captures, consumed })
    }

    /// Unescaped segments of the pattern, substituting captured indices for
    /// wildcards in order.
    ///
    /// Wildcards without a matching capture are rendered literally.
    #[must_use]
    pub fn fill(&self, captures: &[&str]) -> Vec<String> {
        let mut captures = captures.iter();
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Key(key) => key.clone(),
                Segment::Wildcard => captures
                    .next()
                    .map_or_else(|| WILDCARD.to_string(), |index| (*index).to_string()),
            })
            .collect()
    }
}

fn match_segments<'k, S: AsRef<str>>(
    pattern: &[Segment],
    key: &'k [S],
    captures: &mut Vec<&'k str>,
) -> Option<usize> {
    let Some((first, rest)) = pattern.split_first() else {
        return Some(0);
    };
    let (head, tail) = key.split_first()?;
    let head = head.as_ref();
    match first {
        Segment::Key(expected) if expected == head => {}
        Segment::Wildcard if is_index(head) => captures.push(head),
        _ => return None,
    }
    match_segments(rest, tail, captures).map(|consumed| consumed + 1)
}

/// Escapes one segment for use in a `separator`-joined key.
#[must_use]
pub fn escape_segment(segment: &str, separator: &str) -> String {
    if segment.is_empty() {
        return EMPTY_SEGMENT.to_string();
    }
    // A multi-character separator cannot form across a segment boundary
    // while its first character is always escaped.
    let lead = non_empty(separator).chars().next();
    let mut escaped = String::with_capacity(segment.len());
    for next in segment.chars() {
        if next == ESCAPE || Some(next) == lead {
            escaped.push(ESCAPE);
        }
        escaped.push(next);
    }
    escaped
}

/// Escapes and joins `segments`; no segments is the empty root key.
#[must_use]
pub fn join_path<I>(segments: I, separator: &str) -> String
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    segments
        .into_iter()
        .map(|segment| escape_segment(segment.as_ref(), separator))
        .collect::<Vec<_>>()
        .join(separator)
}

/// Splits a stored key into unescaped segments; the empty key is the root.
#[must_use]
pub fn split_key(key: &str, separator: &str) -> Vec<String> {
    if key.is_empty() {
        return Vec::new();
    }
    split_raw(key, separator)
        .into_iter()
        .map(|raw| unescape(raw, separator))
        .collect()
}

/// Splits on every separator not preceded by an escape, keeping escapes.
fn split_raw<'p>(path: &'p str, separator: &str) -> Vec<&'p str> {
    let separator = non_empty(separator);
    let mut segments = Vec::new();
    let mut start = 0;
    let mut position = 0;
    while position < path.len() {
        let rest = &path[position..];
        if rest.starts_with(separator) {
            segments.push(&path[start..position]);
            position += separator.len();
            start = position;
        } else if let Some(escaped) = rest.strip_prefix(ESCAPE) {
            position += ESCAPE.len_utf8();
            if escaped.starts_with(separator) {
                position += separator.len();
            } else if let Some(next) = escaped.chars().next() {
                position += next.len_utf8();
            }
        } else {
            position += rest.chars().next().map_or(1, char::len_utf8);
        }
    }
    segments.push(&path[start..]);
    segments
}

fn unescape(raw: &str, separator: &str) -> String {
    if raw == EMPTY_SEGMENT {
        return String::new();
    }
    let separator = non_empty(separator);
    let mut segment = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(next) = rest.chars().next() {
        rest = &rest[next.len_utf8()..];
        if next != ESCAPE {
            segment.push(next);
        } else if let Some(after) = rest.strip_prefix(separator) {
            segment.push_str(separator);
            rest = after;
        } else if let Some(escaped) = rest.chars().next() {
            segment.push(escaped);
            rest = &rest[escaped.len_utf8()..];
        } else {
            segment.push(ESCAPE);
        }
    }
    segment
}

fn non_empty(separator: &str) -> &str {
    if separator.is_empty() {
        DEFAULT_SEPARATOR
    } else {
        separator
    }
}

pub(crate) fn is_index(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|byte| byte.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(path: &str) -> PathPattern {
        PathPattern::parse(path, DEFAULT_SEPARATOR).unwrap()
    }

    #[test]
    fn test_parse_segments() {
        let pattern = parse("spec.items.*.name");
        assert_eq!(
            pattern.segments(),
            &[
                Segment::Key("spec".to_string()),
                Segment::Key("items".to_string()),
                Segment::Wildcard,
                Segment::Key("name".to_string()),
            ]
        );
        assert_eq!(pattern.wildcards(), 1);
    }

    #[test]
    fn test_parse_rejects_bad_paths() {
        assert_eq!(
            PathPattern::parse("", DEFAULT_SEPARATOR),
            Err(FlatMapError::EmptyPath)
        );
        assert!(matches!(
            PathPattern::parse("a..b", DEFAULT_SEPARATOR),
            Err(FlatMapError::EmptySegment { .. })
        ));
        assert!(matches!(
            PathPattern::parse("a.*.b.*.c.*", DEFAULT_SEPARATOR),
            Err(FlatMapError::TooManyWildcards { found: 3, .. })
        ));
    }

    #[test]
    fn test_match_is_segment_aligned() {
        let pattern = parse("a.b");
        assert_eq!(pattern.match_prefix(&["a", "b"]).map(|m| m.consumed), Some(2));
        assert_eq!(pattern.match_prefix(&["a", "b", "c"]).map(|m| m.consumed), Some(2));
        assert!(pattern.match_prefix(&["a", "bc"]).is_none());
        assert!(pattern.match_prefix(&["a"]).is_none());
    }

    #[test]
    fn test_wildcard_binds_indices_only() {
        let pattern = parse("items.*.name");
        let matched = pattern.match_prefix(&["items", "3", "name"]).unwrap();
        assert_eq!(matched.captures, vec!["3"]);
        assert!(pattern.match_prefix(&["items", "#"]).is_none());
        assert!(pattern.match_prefix(&["items", "x", "name"]).is_none());
    }

    #[test]
    fn test_nested_wildcards_capture_in_order() {
        let pattern = parse("rows.*.cells.*");
        let matched = pattern
            .match_prefix(&["rows", "1", "cells", "4", "value"])
            .unwrap();
        assert_eq!(matched.captures, vec!["1", "4"]);
        assert_eq!(matched.consumed, 4);
        assert_eq!(
            parse("grid.*.*").fill(&matched.captures),
            vec!["grid".to_string(), "1".to_string(), "4".to_string()]
        );
    }

    #[test]
    fn test_escaped_separator_stays_in_segment() {
        let key = join_path(&["metadata", "annotations", "app.kubernetes.io/name"], ".");
        assert_eq!(key, "metadata.annotations.app\\.kubernetes\\.io/name");
        assert_eq!(
            split_key(&key, "."),
            vec!["metadata", "annotations", "app.kubernetes.io/name"]
        );

        let pattern = parse("metadata.annotations.app\\.kubernetes\\.io/name");
        assert_eq!(pattern.segments().len(), 3);
        assert!(pattern.match_prefix(&split_key(&key, ".")).is_some());
    }

    #[test]
    fn test_escape_character_and_empty_segment() {
        let segments = ["dir\\file", "", "x"];
        let key = join_path(&segments, "/");
        assert_eq!(key, "dir\\\\file/\\0/x");
        assert_eq!(split_key(&key, "/"), segments);
        assert_eq!(split_key(&join_path(&[""], "."), "."), vec![""]);
        assert!(split_key("", ".").is_empty());
    }

    #[test]
    fn test_escaped_star_is_a_literal_key() {
        let pattern = parse("a.\\*");
        assert_eq!(pattern.wildcards(), 0);
        assert!(pattern.match_prefix(&["a", "*"]).is_some());
        assert!(pattern.match_prefix(&["a", "0"]).is_none());
    }

    #[test]
    fn test_custom_separator() {
        let pattern = PathPattern::parse("a/*/b", "/").unwrap();
        assert_eq!(pattern.wildcards(), 1);
        assert!(pattern.match_prefix(&["a", "0", "b"]).is_some());
    }
}
