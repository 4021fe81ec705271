//! Tolerant field extraction for the JSON registry
//!
//! The registry has gone through several field-name generations. Rather than
//! probing fields ad hoc, every logical field is described by a prioritized
//! list of [`Candidate`]s: a path into the JSON tree plus the [`Shape`] the
//! value must have. The first candidate whose value exists *and* has the
//! expected shape wins. Supporting a renamed field is a one-line change to the
//! tables below.

use serde_json::Value;

/// Expected JSON shape of a candidate value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    List,
    Object,
    Str,
    Bool,
    /// A string of digits or a non-negative JSON integer
    Numeric,
    /// A non-empty list, or a non-blank string of separated items
    ListOrDelimited,
}

impl Shape {
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Shape::List => value.is_array(),
            Shape::Object => value.is_object(),
            Shape::Str => value.is_string(),
            Shape::Bool => value.is_boolean(),
            Shape::Numeric => match value {
                Value::Number(n) => n.is_u64(),
                Value::String(s) => {
                    let s = s.trim();
                    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
                }
                _ => false,
            },
            Shape::ListOrDelimited => match value {
                Value::Array(items) => !items.is_empty(),
                Value::String(s) => !s.trim().is_empty(),
                _ => false,
            },
        }
    }
}

/// One (path, shape) alternative for a logical field
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub path: &'static [&'static str],
    pub shape: Shape,
}

const fn candidate(path: &'static [&'static str], shape: Shape) -> Candidate {
    Candidate { path, shape }
}

/// Top-level list of package entries
pub const PACKAGE_LIST: &[Candidate] = &[
    candidate(&["mods"], Shape::List),
    candidate(&["packages"], Shape::List),
    candidate(&["workshop", "items"], Shape::List),
];

/// Numeric external identifier of a package entry
pub const SOURCE_ID: &[Candidate] = &[
    candidate(&["workshopId"], Shape::Numeric),
    candidate(&["sourceId"], Shape::Numeric),
    candidate(&["workshop_id"], Shape::Numeric),
    candidate(&["id"], Shape::Numeric),
];

/// Names probed for a source id, used in error hints when none has the right shape
pub const SOURCE_ID_FIELDS: &[&str] = &["workshopId", "sourceId", "workshop_id", "id"];

/// Human-readable package name
pub const PACKAGE_NAME: &[Candidate] = &[
    candidate(&["name"], Shape::Str),
    candidate(&["title"], Shape::Str),
];

/// Sub-unit list of a package entry
pub const SUB_UNIT_LIST: &[Candidate] = &[
    candidate(&["mods"], Shape::List),
    candidate(&["subUnits"], Shape::List),
    candidate(&["units"], Shape::List),
];

/// Sub-unit identifier
pub const SUB_UNIT_ID: &[Candidate] = &[
    candidate(&["id"], Shape::Str),
    candidate(&["modId"], Shape::Str),
];

/// Sub-unit enabled flag
pub const ENABLED: &[Candidate] = &[
    candidate(&["enabled"], Shape::Bool),
    candidate(&["active"], Shape::Bool),
];

/// Declared prerequisites of a sub-unit
pub const REQUIRES: &[Candidate] = &[
    candidate(&["requires"], Shape::ListOrDelimited),
    candidate(&["require"], Shape::ListOrDelimited),
];

/// Operator-declared `Map=` entries, in order
pub const MAP_NAMES: &[Candidate] = &[
    candidate(&["maps", "mapNamesOrdered"], Shape::ListOrDelimited),
    candidate(&["maps", "mapNames"], Shape::ListOrDelimited),
    candidate(&["mods", "mapNamesOrdered"], Shape::ListOrDelimited),
    candidate(&["mods", "mapNames"], Shape::ListOrDelimited),
    candidate(&["map", "names"], Shape::ListOrDelimited),
];

/// Separators accepted in a delimited prerequisite list
pub const LIST_SEPARATORS: &[char] = &[';', ','];

/// Map names contain commas ("Muldraugh, KY"), so only `;` separates them
pub const MAP_NAME_SEPARATORS: &[char] = &[';'];

/// Follow `path` through nested objects
pub fn get_nested<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(root, |cur, key| cur.as_object()?.get(*key))
}

/// First candidate value that exists and has the expected shape
pub fn extract<'a>(root: &'a Value, candidates: &[Candidate]) -> Option<(&'a Value, Candidate)> {
    candidates.iter().find_map(|c| {
        get_nested(root, c.path)
            .filter(|v| c.shape.matches(v))
            .map(|v| (v, *c))
    })
}

/// Extract a value expected to be a list of strings or a delimited string
///
/// Items are trimmed, blanks dropped, duplicates removed keeping the first.
pub fn extract_string_list(
    root: &Value,
    candidates: &[Candidate],
    separators: &[char],
) -> Vec<String> {
    match extract(root, candidates) {
        Some((Value::Array(items), _)) => unique_preserve_order(items.iter().map(scalar_text)),
        Some((Value::String(s), _)) => unique_preserve_order(
            s.split(separators).map(|part| part.to_string()),
        ),
        _ => Vec::new(),
    }
}

/// Parse a numeric-shaped value into a u64
pub fn as_numeric(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Render a scalar JSON value as plain text (strings without quotes)
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Human-readable location of a candidate relative to a parent location
pub fn location(parent: &str, candidate: &Candidate) -> String {
    let mut out = parent.to_string();
    for key in candidate.path {
        out.push('.');
        out.push_str(key);
    }
    out
}

/// Trim, drop blanks and remove duplicates, keeping first occurrences
pub fn unique_preserve_order<I>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let item = item.trim().to_string();
        if item.is_empty() || !seen.insert(item.clone()) {
            continue;
        }
        out.push(item);
    }
    out
}
