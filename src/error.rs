use crate::conflicts::{Coordinate, NamespaceId};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Maximum number of cycle members listed in an error message.
pub const CYCLE_SAMPLE_SIZE: usize = 10;

/// Maximum number of conflicting claim values listed in an error message.
pub const CONFLICT_SAMPLE_SIZE: usize = 10;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("{what} not found: {}", path.display())]
    MissingInput { what: &'static str, path: PathBuf },

    #[error("Schema violation at {location}: {message}")]
    SchemaViolation { location: String, message: String },

    #[error("Dependency error: '{unit}' requires '{requires}', but '{requires}' is not enabled\n\n\
             Hint: enable '{requires}' in the registry (or add 'Mod ID: {requires}' to the \
             block document), or disable '{unit}'.")]
    DependencyViolation { unit: String, requires: String },

    #[error("Dependency cycle detected among {} sub-unit(s): {}", nodes.len(), sample(nodes))]
    CycleDetected { nodes: Vec<String> },

    #[error("{} map cell(s) claimed by more than one package:\n{}\n\n\
             Hint: two maps covering the same cell corrupt the world on load. \
             Disable one of the packages before starting the server.",
             conflicts.len(), describe(conflicts, |(x, y)| format!("({},{})", x, y)))]
    CoordinateConflict {
        conflicts: BTreeMap<Coordinate, Vec<String>>,
    },

    #[error("{} tiledef file number(s) claimed by more than one package:\n{}",
             conflicts.len(), describe(conflicts, |n| format!("fileNumber {}", n)))]
    NamespaceConflict {
        conflicts: BTreeMap<NamespaceId, Vec<String>>,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Usage(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Process exit code for this error: 2 for usage errors, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Usage(_) => 2,
            _ => 1,
        }
    }

    /// The complete set of sub-units left unresolved by a cycle.
    pub fn cycle_members(&self) -> Option<&[String]> {
        match self {
            Error::CycleDetected { nodes } => Some(nodes),
            _ => None,
        }
    }
}

fn sample(nodes: &[String]) -> String {
    let mut out = nodes
        .iter()
        .take(CYCLE_SAMPLE_SIZE)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if nodes.len() > CYCLE_SAMPLE_SIZE {
        out.push_str(" ...");
    }
    out
}

fn describe<K, F>(conflicts: &BTreeMap<K, Vec<String>>, key: F) -> String
where
    F: Fn(&K) -> String,
{
    let mut lines: Vec<String> = conflicts
        .iter()
        .take(CONFLICT_SAMPLE_SIZE)
        .map(|(k, owners)| format!("  {}: {}", key(k), owners.join(", ")))
        .collect();
    if conflicts.len() > CONFLICT_SAMPLE_SIZE {
        lines.push(format!(
            "  ... and {} more",
            conflicts.len() - CONFLICT_SAMPLE_SIZE
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_is_bounded() {
        let nodes: Vec<String> = (0..25).map(|i| format!("mod{}", i)).collect();
        let err = Error::CycleDetected {
            nodes: nodes.clone(),
        };

        let msg = err.to_string();
        assert!(msg.contains("25 sub-unit(s)"));
        assert!(msg.contains("mod9"));
        assert!(!msg.contains("mod10,"));
        assert!(msg.ends_with("..."));
        assert_eq!(err.cycle_members().unwrap().len(), 25);
    }

    #[test]
    fn test_dependency_violation_names_both() {
        let err = Error::DependencyViolation {
            unit: "X".to_string(),
            requires: "Y".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'X' requires 'Y'"));
        assert!(msg.contains("not enabled"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::Usage("missing --ini".into()).exit_code(), 2);
        assert_eq!(Error::CycleDetected { nodes: vec![] }.exit_code(), 1);
        assert_eq!(
            Error::MissingInput {
                what: "registry",
                path: PathBuf::from("/nope"),
            }
            .exit_code(),
            1
        );
    }

    #[test]
    fn test_coordinate_conflict_message() {
        let mut conflicts = BTreeMap::new();
        conflicts.insert((5, 7), vec!["A [1]".to_string(), "B [2]".to_string()]);
        let msg = Error::CoordinateConflict { conflicts }.to_string();
        assert!(msg.contains("(5,7): A [1], B [2]"));
    }
}
