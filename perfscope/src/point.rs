//! # Point Registry
//!
//! A point is a static instrumentation site. Each site registers itself once
//! (typically through a `OnceLock` at the call site) and receives a small
//! [`PointId`] that is cheap to store in every sample it produces.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{PerfError, PerfResult};

/// Identifier of a registered [`Point`]; 0 is reserved as "no point".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PointId(pub u16);

impl PointId {
    /// Largest valid point id.
    pub const MAX: u16 = u16::MAX;
    /// The reserved invalid id.
    pub const NONE: PointId = PointId(0);

    /// Returns `true` for any id other than the reserved 0.
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Index into dense per-point tables.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u16> for PointId {
    fn from(value: u16) -> Self {
        PointId(value)
    }
}

impl From<PointId> for u16 {
    fn from(id: PointId) -> Self {
        id.0
    }
}

/// What a point measures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PointKind {
    /// A timed region opened and closed by the recorder.
    Scope,
    /// A scalar value sampled once per call.
    Counter,
}

/// A function signature split into its parts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FuncName {
    /// Everything before the function name (may be empty).
    pub return_type: String,
    /// Qualified function name.
    pub name: String,
    /// Parenthesized argument list, including the parentheses (may be empty).
    pub args: String,
}

impl FuncName {
    /// Splits a signature such as `"void Foo::bar(int, float) const"`.
    ///
    /// The return type ends at the first whitespace outside any bracket pair;
    /// when there is no such whitespace the whole input is the name.
    pub fn parse(full: &str) -> Self {
        let bytes = full.as_bytes();
        let mut pos = 0;
        let mut depth = 0i32;
        let mut split = None;

        while pos < bytes.len() {
            let c = bytes[pos];
            pos += 1;
            match c {
                b'(' | b'<' | b'[' => depth += 1,
                b')' | b'>' | b']' => depth -= 1,
                c if c.is_ascii_whitespace() && depth == 0 => {
                    split = Some(pos);
                    break;
                }
                _ => {}
            }
        }

        let (return_type, rest) = match split {
            Some(split) => {
                let rest = full[split..].trim_start();
                if rest.is_empty() {
                    ("", full)
                } else {
                    (full[..split].trim_end(), rest)
                }
            }
            None => ("", full),
        };

        let args_start = rest.find('(').unwrap_or(rest.len());
        Self {
            return_type: return_type.to_string(),
            name: rest[..args_start].to_string(),
            args: rest[args_start..].to_string(),
        }
    }
}

/// Extracts the tag from a `"...#tag"` style string.
///
/// `"#"` yields an empty tag, `"value#"` yields `"value"` and `"x#tag"` yields
/// `"tag"`; input without `#` is returned as is.
pub fn parse_tag(input: &str) -> &str {
    match input.find('#') {
        None => input,
        Some(pos) if pos + 1 == input.len() => &input[..pos],
        Some(pos) => &input[pos + 1..],
    }
}

/// Immutable descriptor of an instrumentation site.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Point {
    /// Parsed function signature of the enclosing function.
    pub func: FuncName,
    /// Source file.
    pub file: String,
    /// Free-form tag distinguishing several points in one function.
    pub tag: String,
    /// Source line.
    pub line: u32,
    /// What the point measures.
    pub kind: PointKind,
}

impl Point {
    /// Label used when presenting the point: the tag, else the function name.
    pub fn display_name(&self) -> &str {
        if self.tag.is_empty() {
            &self.func.name
        } else {
            &self.tag
        }
    }
}

/// Append-only table of every registered point.
///
/// Shared between all recorders and the collector; registration takes a short
/// write lock, lookups a read lock.
#[derive(Debug, Default)]
pub struct PointRegistry {
    points: RwLock<Vec<Arc<Point>>>,
}

impl PointRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new point and returns its fresh id.
    ///
    /// Every call allocates a new id; a call site must register only once.
    pub fn register(
        &self,
        kind: PointKind,
        file: &str,
        function: &str,
        tag: &str,
        line: u32,
    ) -> PerfResult<PointId> {
        let mut points = self.points.write();
        if points.len() >= PointId::MAX as usize {
            warn!("point registry is full ({} points)", points.len());
            return Err(PerfError::CapacityExceeded {
                what: "points",
                limit: PointId::MAX as usize,
            });
        }

        points.push(Arc::new(Point {
            func: FuncName::parse(function),
            file: file.to_string(),
            tag: parse_tag(tag).to_string(),
            line,
            kind,
        }));
        let id = PointId(points.len() as u16);
        debug!("registered point {} at {file}:{line}", id.0);
        Ok(id)
    }

    /// Looks up a point; returns `None` for 0 and for unknown ids.
    pub fn point(&self, id: PointId) -> Option<Arc<Point>> {
        if !id.is_valid() {
            return None;
        }
        self.points.read().get(id.index() - 1).cloned()
    }

    /// Number of registered points.
    pub fn len(&self) -> usize {
        self.points.read().len()
    }

    /// Returns `true` if nothing was registered yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all points together with their ids.
    pub fn points(&self) -> Vec<(PointId, Arc<Point>)> {
        self.points
            .read()
            .iter()
            .enumerate()
            .map(|(idx, point)| (PointId(idx as u16 + 1), point.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_signature() {
        let func = FuncName::parse("std::vector<int> Foo::bar(int, float) const");
        assert_eq!(func.return_type, "std::vector<int>");
        assert_eq!(func.name, "Foo::bar");
        assert_eq!(func.args, "(int, float) const");
    }

    #[test]
    fn parse_signature_without_return_type() {
        let func = FuncName::parse("app::render::draw_frame");
        assert_eq!(func.return_type, "");
        assert_eq!(func.name, "app::render::draw_frame");
        assert_eq!(func.args, "");

        let func = FuncName::parse("update(f32)");
        assert_eq!(func.name, "update");
        assert_eq!(func.args, "(f32)");
    }

    #[test]
    fn bracketed_whitespace_does_not_split() {
        let func = FuncName::parse("Map<K, V> lookup(K key)");
        assert_eq!(func.return_type, "Map<K, V>");
        assert_eq!(func.name, "lookup");
        assert_eq!(func.args, "(K key)");
    }

    #[test]
    fn tags() {
        assert_eq!(parse_tag("#"), "");
        assert_eq!(parse_tag("num_draws#"), "num_draws");
        assert_eq!(parse_tag("#shadows"), "shadows");
        assert_eq!(parse_tag("plain"), "plain");
    }

    #[test]
    fn register_returns_fresh_ids() {
        let registry = PointRegistry::new();
        let a = registry
            .register(PointKind::Scope, "a.rs", "fn_a", "#", 1)
            .expect("register a");
        let b = registry
            .register(PointKind::Scope, "a.rs", "fn_a", "#", 1)
            .expect("register b");
        assert_ne!(a, b);
        assert!(a.is_valid() && b.is_valid());
        assert_eq!(registry.len(), 2);

        let point = registry.point(a).expect("point a");
        assert_eq!(point.func.name, "fn_a");
        assert_eq!(point.kind, PointKind::Scope);
        assert_eq!(point.display_name(), "fn_a");
    }

    #[test]
    fn unknown_points_resolve_to_none() {
        let registry = PointRegistry::new();
        assert!(registry.point(PointId::NONE).is_none());
        assert!(registry.point(PointId(7)).is_none());
    }

    #[test]
    fn registry_is_capped() {
        let registry = PointRegistry::new();
        for line in 0..PointId::MAX as u32 {
            registry
                .register(PointKind::Counter, "c.rs", "count", "#", line)
                .expect("within capacity");
        }
        let err = registry
            .register(PointKind::Counter, "c.rs", "count", "#", 0)
            .expect_err("capacity must be enforced");
        assert!(matches!(err, PerfError::CapacityExceeded { .. }));
    }
}
