//! Namespace and coordinate conflict detection
//!
//! Claims are grouped by value across distinct packages. Sub-units of one
//! package never conflict with each other: a package's claims are a set.

use crate::registry::SourceId;
use crate::scanner::ScanIndex;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

/// A map cell `(x, y)` in cell units
pub type Coordinate = (i32, i32);

/// A tiledef file number
pub type NamespaceId = u32;

/// Claims held by one active package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageClaims {
    pub label: String,
    pub namespace: BTreeSet<NamespaceId>,
    pub coordinates: BTreeSet<Coordinate>,
}

/// Claim values held by more than one package, with the owners in input order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictReport {
    pub namespace: BTreeMap<NamespaceId, Vec<String>>,
    pub coordinates: BTreeMap<Coordinate, Vec<String>>,
}

impl ConflictReport {
    pub fn is_empty(&self) -> bool {
        self.namespace.is_empty() && self.coordinates.is_empty()
    }
}

/// How namespace conflicts are treated; coordinate conflicts are always fatal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Warn,
    Fatal,
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" | "warning" => Ok(Severity::Warn),
            "fatal" | "error" => Ok(Severity::Fatal),
            other => Err(Error::Usage(format!(
                "Invalid severity '{}': expected 'warn' or 'fatal'",
                other
            ))),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warn => write!(f, "warn"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}

fn group<K: Ord + Copy>(claims: impl Iterator<Item = (K, String)>) -> BTreeMap<K, Vec<String>> {
    let mut owners: BTreeMap<K, Vec<String>> = BTreeMap::new();
    for (value, label) in claims {
        let entry = owners.entry(value).or_default();
        if !entry.contains(&label) {
            entry.push(label);
        }
    }
    owners.retain(|_, labels| labels.len() > 1);
    owners
}

/// Group claims by value and keep the values with more than one owner
///
/// Both kinds are always computed.
pub fn detect(packages: &[PackageClaims]) -> ConflictReport {
    let namespace = group(
        packages
            .iter()
            .flat_map(|p| p.namespace.iter().map(move |n| (*n, p.label.clone()))),
    );
    let coordinates = group(
        packages
            .iter()
            .flat_map(|p| p.coordinates.iter().map(move |c| (*c, p.label.clone()))),
    );
    ConflictReport {
        namespace,
        coordinates,
    }
}

/// Gather the claims of every active package from a scan
///
/// A package is active when it is listed in `active_packages` or owns one of
/// the `active_units`. Only active sub-units contribute their claims; claims
/// not owned by any sub-unit count for every active package. A sub-unit ID
/// shipped again by a later package still counts toward that package.
pub fn collect_claims(
    index: &ScanIndex,
    active_units: &[String],
    active_packages: &[SourceId],
) -> Vec<PackageClaims> {
    let active: HashSet<&str> = active_units.iter().map(String::as_str).collect();

    index
        .packages
        .iter()
        .filter_map(|package| {
            let units: Vec<_> = package
                .units
                .iter()
                .filter(|id| active.contains(id.as_str()))
                .filter_map(|id| index.units.get(id))
                .chain(
                    package
                        .shadowed
                        .iter()
                        .filter(|unit| active.contains(unit.id.as_str())),
                )
                .collect();
            if units.is_empty() && !active_packages.contains(&package.source_id) {
                return None;
            }

            let mut claims = PackageClaims {
                label: package.label.clone(),
                namespace: BTreeSet::new(),
                coordinates: package.unowned_coordinates.clone(),
            };
            for unit in units {
                claims.namespace.extend(unit.namespace_claims.iter().copied());
                claims.coordinates.extend(unit.coordinate_claims.iter().copied());
            }
            Some(claims)
        })
        .collect()
}

/// Apply the severity policy
///
/// Coordinate conflicts abort. Namespace conflicts abort under
/// [`Severity::Fatal`], otherwise they come back as warning lines.
pub fn enforce(report: &ConflictReport, namespace: Severity) -> Result<Vec<String>> {
    if !report.coordinates.is_empty() {
        return Err(Error::CoordinateConflict {
            conflicts: report.coordinates.clone(),
        });
    }
    if report.namespace.is_empty() {
        return Ok(Vec::new());
    }
    if namespace == Severity::Fatal {
        return Err(Error::NamespaceConflict {
            conflicts: report.namespace.clone(),
        });
    }

    let warnings = report
        .namespace
        .iter()
        .map(|(number, owners)| {
            format!(
                "tiledef fileNumber {} claimed by: {}",
                number,
                owners.join(", ")
            )
        })
        .collect::<Vec<_>>();
    for warning in &warnings {
        tracing::warn!("{}", warning);
    }
    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(label: &str, namespace: &[u32], coordinates: &[(i32, i32)]) -> PackageClaims {
        PackageClaims {
            label: label.to_string(),
            namespace: namespace.iter().copied().collect(),
            coordinates: coordinates.iter().copied().collect(),
        }
    }

    #[test]
    fn test_no_conflicts() {
        let report = detect(&[claims("A", &[1], &[(0, 0)]), claims("B", &[2], &[(0, 1)])]);
        assert!(report.is_empty());
    }

    #[test]
    fn test_coordinate_conflict_both_orders() {
        let a = claims("Bedford [1]", &[], &[(5, 7), (1, 1)]);
        let b = claims("Raven Creek [2]", &[], &[(5, 7)]);

        for input in [vec![a.clone(), b.clone()], vec![b.clone(), a.clone()]] {
            let report = detect(&input);
            let owners = &report.coordinates[&(5, 7)];
            assert_eq!(owners.len(), 2);
            assert!(owners.contains(&"Bedford [1]".to_string()));
            assert!(owners.contains(&"Raven Creek [2]".to_string()));
            assert_eq!(report.coordinates.len(), 1);
        }
    }

    #[test]
    fn test_both_kinds_computed_independently() {
        let report = detect(&[
            claims("A", &[254], &[(5, 7)]),
            claims("B", &[254], &[(5, 7)]),
            claims("C", &[300], &[]),
        ]);
        assert_eq!(report.namespace[&254], vec!["A", "B"]);
        assert_eq!(report.coordinates[&(5, 7)], vec!["A", "B"]);
        assert!(!report.namespace.contains_key(&300));
    }

    #[test]
    fn test_same_label_counts_once() {
        let report = detect(&[claims("A", &[9], &[]), claims("A", &[9], &[])]);
        assert!(report.is_empty());
    }

    #[test]
    fn test_enforce_coordinate_always_fatal() {
        let report = detect(&[claims("A", &[], &[(5, 7)]), claims("B", &[], &[(5, 7)])]);
        let err = enforce(&report, Severity::Warn).unwrap_err();
        assert!(matches!(err, Error::CoordinateConflict { .. }));
        assert!(err.to_string().contains("(5,7): A, B"));
    }

    #[test]
    fn test_enforce_namespace_policy() {
        let report = detect(&[claims("A", &[254], &[]), claims("B", &[254], &[])]);

        let warnings = enforce(&report, Severity::Warn).unwrap();
        assert_eq!(warnings, vec!["tiledef fileNumber 254 claimed by: A, B"]);

        let err = enforce(&report, Severity::Fatal).unwrap_err();
        assert!(matches!(err, Error::NamespaceConflict { .. }));
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("WARN".parse::<Severity>().unwrap(), Severity::Warn);
        assert_eq!("fatal".parse::<Severity>().unwrap(), Severity::Fatal);
        assert!("maybe".parse::<Severity>().is_err());
    }
}
