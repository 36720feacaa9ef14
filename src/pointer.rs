//! JSON Pointer parsing and resolution over `serde_json::Value` trees.
//!
//! Paths are `/`-separated strings (`/content/0/settings/title`). Each
//! segment is tagged at parse time: digit-only segments without leading
//! zeros become array indexes, everything else an object key. RFC 6901
//! escapes (`~1` for `/`, `~0` for `~`) are decoded on parse and re-encoded
//! on display.

use std::fmt;

use serde_json::Value;

use crate::error::PatchError;

/// One step of a pointer path, tagged by the container it expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Object member lookup.
    Key(String),
    /// Array element lookup.
    Index(usize),
}

impl Segment {
    fn parse(raw: &str) -> Segment {
        if is_index_literal(raw) {
            if let Ok(index) = raw.parse::<usize>() {
                return Segment::Index(index);
            }
        }
        Segment::Key(unescape(raw))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => f.write_str(&escape(key)),
            Segment::Index(index) => write!(f, "{index}"),
        }
    }
}

// "0" or digits without a leading zero; anything else is a key.
fn is_index_literal(raw: &str) -> bool {
    match raw.as_bytes() {
        [] => false,
        [b'0'] => true,
        [b'0', ..] => false,
        bytes => bytes.iter().all(u8::is_ascii_digit),
    }
}

fn unescape(raw: &str) -> String {
    raw.replace("~1", "/").replace("~0", "~")
}

pub(crate) fn escape(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

/// A parsed pointer path. The empty path addresses the document root.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PointerPath {
    segments: Vec<Segment>,
}

impl PointerPath {
    /// Parses a pointer string. Non-empty paths must start with `/`.
    pub fn parse(raw: &str) -> Result<PointerPath, PatchError> {
        if raw.is_empty() {
            return Ok(PointerPath::default());
        }

        let Some(rest) = raw.strip_prefix('/') else {
            return Err(PatchError::InvalidPath {
                path: raw.to_string(),
                reason: "must start with `/`".to_string(),
            });
        };

        Ok(PointerPath {
            segments: rest.split('/').map(Segment::parse).collect(),
        })
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// True for the empty path, which addresses the whole document.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for PointerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

/// Where a pointer lands in a document: the parent container, the final
/// segment, and whether the addressed value currently exists.
#[derive(Debug, Clone)]
pub struct Resolved<'a> {
    pub parent: &'a Value,
    pub segment: Segment,
    pub exists: bool,
}

impl<'a> Resolved<'a> {
    /// The addressed value, when it exists.
    #[must_use]
    pub fn value(&self) -> Option<&'a Value> {
        match (self.parent, &self.segment) {
            (Value::Object(map), Segment::Key(key)) => map.get(key),
            (Value::Object(map), Segment::Index(index)) => map.get(&index.to_string()),
            (Value::Array(items), Segment::Index(index)) => items.get(*index),
            _ => None,
        }
    }
}

/// Resolves `path` against `document` without mutating anything.
///
/// Intermediate segments must land on containers; a segment that resolves to
/// a scalar or a missing member fails with [`PatchError::InvalidPath`]. The
/// final segment never fails for being absent: absence is reported through
/// `exists` so callers can distinguish replace/remove targets from add
/// targets. The root path has no parent and is not resolvable.
pub fn resolve<'a>(document: &'a Value, path: &PointerPath) -> Result<Resolved<'a>, PatchError> {
    let Some((last, intermediate)) = path.segments().split_last() else {
        return Err(PatchError::InvalidPath {
            path: path.to_string(),
            reason: "the root is not addressable through a parent".to_string(),
        });
    };

    let mut parent = document;
    for segment in intermediate {
        parent = step(parent, segment).map_err(|reason| PatchError::InvalidPath {
            path: path.to_string(),
            reason,
        })?;
    }

    let exists = match (parent, last) {
        (Value::Object(map), Segment::Key(key)) => map.contains_key(key),
        (Value::Object(map), Segment::Index(index)) => map.contains_key(&index.to_string()),
        (Value::Array(items), Segment::Index(index)) => *index < items.len(),
        (Value::Array(_), Segment::Key(key)) => {
            return Err(PatchError::InvalidPath {
                path: path.to_string(),
                reason: format!("array segment `{}` must be a non-negative integer", escape(key)),
            });
        }
        _ => {
            return Err(PatchError::InvalidPath {
                path: path.to_string(),
                reason: "cannot address into a scalar".to_string(),
            });
        }
    };

    Ok(Resolved {
        parent,
        segment: last.clone(),
        exists,
    })
}

fn step<'a>(value: &'a Value, segment: &Segment) -> Result<&'a Value, String> {
    match (value, segment) {
        (Value::Object(map), Segment::Key(key)) => map
            .get(key)
            .ok_or_else(|| format!("missing object member `{}`", escape(key))),
        (Value::Object(map), Segment::Index(index)) => map
            .get(&index.to_string())
            .ok_or_else(|| format!("missing object member `{index}`")),
        (Value::Array(items), Segment::Index(index)) => {
            let len = items.len();
            items
                .get(*index)
                .ok_or_else(|| format!("index {index} is out of bounds for array of length {len}"))
        }
        (Value::Array(_), Segment::Key(key)) => Err(format!(
            "array segment `{}` must be a non-negative integer",
            escape(key)
        )),
        _ => Err("cannot address through a scalar".to_string()),
    }
}

/// Mutable walk used by the applier. Same admission rules as [`step`];
/// errors return the human reason, the caller attaches the full path.
pub(crate) fn walk_mut<'a>(
    document: &'a mut Value,
    segments: &[Segment],
) -> Result<&'a mut Value, String> {
    let mut current = document;
    for segment in segments {
        current = match (current, segment) {
            (Value::Object(map), Segment::Key(key)) => map
                .get_mut(key)
                .ok_or_else(|| format!("missing object member `{}`", escape(key)))?,
            (Value::Object(map), Segment::Index(index)) => map
                .get_mut(&index.to_string())
                .ok_or_else(|| format!("missing object member `{index}`"))?,
            (Value::Array(items), Segment::Index(index)) => {
                let len = items.len();
                items.get_mut(*index).ok_or_else(|| {
                    format!("index {index} is out of bounds for array of length {len}")
                })?
            }
            (Value::Array(_), Segment::Key(key)) => {
                return Err(format!(
                    "array segment `{}` must be a non-negative integer",
                    escape(key)
                ));
            }
            _ => return Err("cannot address through a scalar".to_string()),
        };
    }
    Ok(current)
}
