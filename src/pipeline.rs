//! Resolve, check and project the load set
//!
//! [`resolve`] is pure apart from reading its inputs: it loads the registry
//! snapshot, scans the package directories, sorts the activation order and
//! applies the conflict policy. Any failure there aborts before a single byte
//! is written. [`project`] computes every output in memory first and only
//! then writes, each file atomically and only when its content changed.
//!
//! # Examples
//!
//! ```no_run
//! use modsync::pipeline::{self, ProjectOptions, ResolveOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let resolve = ResolveOptions {
//!     registry: "mods.json".into(),
//!     scan_root: "workshop/content/108600".into(),
//!     ..Default::default()
//! };
//! let project = ProjectOptions {
//!     ini: "servertest.ini".into(),
//!     ..Default::default()
//! };
//!
//! let report = pipeline::sync(&resolve, &project)?;
//! println!("{} mod(s) active, changed: {}", report.order.len(), report.changed());
//! # Ok(())
//! # }
//! ```

use crate::blocks::{self, BlockDocument, BlockInputs};
use crate::config::ProjectionConfig;
use crate::conflicts::{self, ConflictReport, Severity};
use crate::fsutil::{self, Change};
use crate::graph::DependencyGraph;
use crate::ini;
use crate::maps::{self, MapCheck, ProvidedMap};
use crate::registry::{self, Registry, RegistryFormat, SourceId};
use crate::resolver::{self, Move, Resolution};
use crate::scanner::{self, ProgressCallback, ScanIndex, ScanOptions};
use crate::{Error, Result};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Bookkeeping key under `resolution` in the JSON registry
pub const PROJECTION_KEY: &str = "projection";

/// Inputs and policy for [`resolve`]
#[derive(Clone, Default)]
pub struct ResolveOptions {
    pub registry: PathBuf,
    /// Registry format; detected from the extension when `None`
    pub format: Option<RegistryFormat>,
    pub scan_root: PathBuf,
    /// Missing package directories are errors instead of warnings
    pub strict: bool,
    pub namespace_conflicts: Severity,
    pub require_mod_ids: bool,
    pub require_workshop_ids: bool,
    pub progress: Option<ProgressCallback>,
}

/// Outputs for [`project`]
#[derive(Debug, Clone, Default)]
pub struct ProjectOptions {
    pub ini: PathBuf,
    /// Block document to rewrite; defaults to the registry itself when the
    /// registry is a block document
    pub blocks: Option<PathBuf>,
    pub spawnregions: Option<PathBuf>,
    pub projection: ProjectionConfig,
    /// Compute and report, write nothing
    pub dry_run: bool,
}

/// A resolved, conflict-checked load set
#[derive(Debug, Clone)]
pub struct Resolved {
    pub registry: Registry,
    pub registry_path: PathBuf,
    pub scan_root: PathBuf,
    pub index: ScanIndex,
    pub resolution: Resolution,
    /// Packages with at least one enabled sub-unit, in registry order
    pub active_packages: Vec<SourceId>,
    /// Packages listed in `WorkshopItems=`, in registry order
    pub tracked_packages: Vec<SourceId>,
    pub conflicts: ConflictReport,
    /// Non-fatal findings (namespace conflicts, skipped packages)
    pub warnings: Vec<String>,
}

impl Resolved {
    /// Final activation order
    pub fn order(&self) -> &[String] {
        self.resolution.order()
    }

    /// Source IDs written to `WorkshopItems=`
    pub fn workshop_items(&self) -> &[SourceId] {
        &self.tracked_packages
    }

    pub fn provided_maps(&self) -> Vec<ProvidedMap> {
        maps::provided_maps(&self.index, self.order(), &self.active_packages)
    }
}

/// What a sync did (or, in a dry run, would do)
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub order: Vec<String>,
    pub moves: Vec<Move>,
    pub workshop_items: Vec<SourceId>,
    pub map_names: Vec<String>,
    pub conflicts: ConflictReport,
    pub warnings: Vec<String>,
    pub ini: Change,
    pub blocks: Option<Change>,
    pub spawnregions: Option<Change>,
    pub registry: Change,
    pub dry_run: bool,
}

impl SyncReport {
    /// True when any output was (or would be) rewritten
    pub fn changed(&self) -> bool {
        self.ini.is_written()
            || self.registry.is_written()
            || self.blocks.is_some_and(Change::is_written)
            || self.spawnregions.is_some_and(Change::is_written)
    }
}

/// Load, scan, sort and conflict-check
pub fn resolve(options: &ResolveOptions) -> Result<Resolved> {
    let format = options
        .format
        .unwrap_or_else(|| RegistryFormat::detect(&options.registry));
    let registry = Registry::load_as(&options.registry, format)?;

    let declared_order = registry.enabled_order();
    let active_packages = registry.enabled_packages();
    if options.require_mod_ids && declared_order.is_empty() {
        return Err(Error::SchemaViolation {
            location: options.registry.display().to_string(),
            message: "registry enables no mod IDs".to_string(),
        });
    }
    if options.require_workshop_ids && active_packages.is_empty() {
        return Err(Error::SchemaViolation {
            location: options.registry.display().to_string(),
            message: "registry enables no workshop items".to_string(),
        });
    }
    tracing::info!(
        units = declared_order.len(),
        packages = active_packages.len(),
        "registry loaded"
    );

    let scan_options = ScanOptions {
        strict: options.strict,
        progress: options.progress.clone(),
    };
    let index = scanner::scan(&options.scan_root, &active_packages, &scan_options)?;

    let mut warnings: Vec<String> = index
        .missing
        .iter()
        .map(|id| format!("Workshop ID {}: not found under scan root, skipped", id))
        .collect();

    let mut requires = registry.declared_requires();
    for unit in index.units.values() {
        if unit.requires.is_empty() {
            continue;
        }
        let entry = requires.entry(unit.id.clone()).or_default();
        for prerequisite in &unit.requires {
            if !entry.contains(prerequisite) {
                entry.push(prerequisite.clone());
            }
        }
    }

    let graph = DependencyGraph::build(&declared_order, &requires, |id| {
        index.is_known(id) || registry.declares(id)
    })?;
    tracing::debug!(nodes = graph.len(), edges = graph.edge_count(), "dependency graph built");

    let resolution = resolver::resolve(&graph)?;
    for moved in resolution.moves() {
        tracing::info!("reordered {}", moved);
    }

    let claims = conflicts::collect_claims(&index, resolution.order(), &active_packages);
    let report = conflicts::detect(&claims);
    warnings.extend(conflicts::enforce(&report, options.namespace_conflicts)?);

    let tracked_packages = registry.tracked_packages();
    Ok(Resolved {
        registry,
        registry_path: options.registry.clone(),
        scan_root: options.scan_root.clone(),
        index,
        resolution,
        tracked_packages,
        active_packages,
        conflicts: report,
        warnings,
    })
}

/// `Mods=` value: prefixed IDs joined by the separator
pub fn mods_value(order: &[String], projection: &ProjectionConfig) -> String {
    order
        .iter()
        .map(|id| format!("{}{}", projection.mod_prefix, id.trim_start_matches('\\')))
        .collect::<Vec<_>>()
        .join(&projection.separator)
}

/// Key updates applied to the server INI
pub fn ini_updates(
    resolved: &Resolved,
    map_names: &[String],
    projection: &ProjectionConfig,
) -> Vec<(String, String)> {
    let workshop_items = resolved
        .workshop_items()
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(&projection.separator);

    let mut updates = vec![
        (
            projection.mods_key.clone(),
            mods_value(resolved.order(), projection),
        ),
        (projection.workshop_key.clone(), workshop_items),
    ];
    if projection.write_map {
        updates.push((projection.map_key.clone(), map_names.join(";")));
    }
    if let Some(name) = &projection.public_name {
        updates.push(("PublicName".to_string(), name.clone()));
    }
    updates
}

fn config_digest(text: &str) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(text.as_bytes())))
}

fn bookkeeping_entry(resolved: &Resolved, map_names: &[String], ini_text: &str) -> Value {
    let namespace_conflicts: Vec<Value> = resolved
        .conflicts
        .namespace
        .iter()
        .map(|(number, owners)| json!({ "fileNumber": number, "packages": owners }))
        .collect();
    let workshop_items: Vec<String> = resolved
        .workshop_items()
        .iter()
        .map(|id| id.to_string())
        .collect();

    json!({
        "activationOrder": resolved.order(),
        "workshopItems": workshop_items,
        "mapNames": map_names,
        "namespaceConflicts": namespace_conflicts,
        "configDigest": config_digest(ini_text),
    })
}

/// Packages whose content directory exists under the scan root
fn packages_on_disk(scan_root: &Path, ids: impl IntoIterator<Item = SourceId>) -> HashSet<SourceId> {
    ids.into_iter()
        .filter(|id| {
            let dir = scan_root.join(id.to_string());
            dir.is_dir() && !fsutil::is_symlink(&dir)
        })
        .collect()
}

/// Compute every output, then write the ones that changed
pub fn project(resolved: &Resolved, options: &ProjectOptions) -> Result<SyncReport> {
    let projection = &options.projection;
    let provided = resolved.provided_maps();
    let map_names = maps::map_list(
        &resolved.registry.map_names,
        &provided,
        &projection.vanilla_maps,
    );

    let current_ini = ini::load(&options.ini)?;
    let new_ini = ini::rewrite_keys(
        &current_ini,
        &ini_updates(resolved, &map_names, projection),
    );

    let blocks_path = options.blocks.clone().or_else(|| {
        (resolved.registry.format == RegistryFormat::Blocks).then(|| resolved.registry_path.clone())
    });
    let mut warnings = resolved.warnings.clone();
    let block_plan = match blocks_path {
        Some(path) => {
            let existing = BlockDocument::load_or_default(&path)?;
            let packages: Vec<SourceId> = resolved
                .registry
                .packages
                .iter()
                .map(|p| p.source_id)
                .collect();
            let mut owners = resolved.registry.declared_owners();
            owners.extend(resolved.index.owners());
            let on_disk = packages_on_disk(
                &resolved.scan_root,
                existing.source_ids().into_iter().chain(packages.iter().copied()),
            );

            let rewrite = blocks::rewrite(
                &existing,
                &BlockInputs {
                    packages: &packages,
                    order: resolved.order(),
                    owners: &owners,
                    on_disk: &on_disk,
                },
            );
            for warning in &rewrite.warnings {
                tracing::warn!("{}", warning);
            }
            warnings.extend(rewrite.warnings.iter().cloned());
            Some((path, rewrite.document))
        }
        None => None,
    };

    let spawn_plan = options
        .spawnregions
        .as_ref()
        .map(|path| (path, maps::render_spawn_regions(&map_names, &provided)));

    let new_registry = resolved.registry.record(
        PROJECTION_KEY,
        bookkeeping_entry(resolved, &map_names, &new_ini),
    );

    // Everything is computed; from here on only writes happen
    let dry_run = options.dry_run;
    let ini_change = ini::save(&options.ini, &new_ini, dry_run)?;
    let blocks_change = block_plan
        .map(|(path, document)| document.save_to(&path, dry_run))
        .transpose()?;
    let spawn_change = spawn_plan
        .map(|(path, lua)| fsutil::write_if_changed(path, lua.as_bytes(), dry_run))
        .transpose()?;
    let registry_change = match new_registry {
        Some(raw) => registry::save(&resolved.registry_path, &raw, dry_run)?,
        None => Change::Unchanged,
    };

    tracing::info!(
        ini = ?ini_change,
        registry = ?registry_change,
        dry_run,
        "projection finished"
    );

    Ok(SyncReport {
        order: resolved.order().to_vec(),
        moves: resolved.resolution.moves().to_vec(),
        workshop_items: resolved.workshop_items().to_vec(),
        map_names,
        conflicts: resolved.conflicts.clone(),
        warnings,
        ini: ini_change,
        blocks: blocks_change,
        spawnregions: spawn_change,
        registry: registry_change,
        dry_run,
    })
}

/// Full run: [`resolve`] then [`project`]
pub fn sync(resolve_options: &ResolveOptions, project_options: &ProjectOptions) -> Result<SyncReport> {
    let resolved = resolve(resolve_options)?;
    project(&resolved, project_options)
}

/// Check the INI's existing map entries against what the active packages provide
pub fn check_maps(resolved: &Resolved, ini_text: &str, projection: &ProjectionConfig) -> MapCheck {
    let entries = ini::read_value(ini_text, &projection.map_key)
        .map(|value| ini::split_list(&value))
        .unwrap_or_default();
    maps::check_entries(&entries, &resolved.provided_maps(), &projection.vanilla_maps)
}

/// INI entries compared with the registry's enabled set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Coverage {
    /// In the INI but not enabled in the registry
    pub unknown_mods: Vec<String>,
    /// Enabled in the registry but absent from the INI
    pub missing_mods: Vec<String>,
    pub unknown_items: Vec<String>,
    pub missing_items: Vec<String>,
}

impl Coverage {
    /// The INI is covered by the registry; `exact` also requires the converse
    pub fn is_ok(&self, exact: bool) -> bool {
        self.unknown_mods.is_empty()
            && self.unknown_items.is_empty()
            && (!exact || (self.missing_mods.is_empty() && self.missing_items.is_empty()))
    }
}

fn difference(left: &[String], right: &[String]) -> Vec<String> {
    let right: HashSet<&str> = right.iter().map(String::as_str).collect();
    left.iter()
        .filter(|item| !right.contains(item.as_str()))
        .cloned()
        .collect()
}

/// Compare the INI's mods and workshop keys with the registry
pub fn verify_coverage(registry: &Registry, ini_text: &str, projection: &ProjectionConfig) -> Coverage {
    let read = |key: &str| {
        ini::read_value(ini_text, key)
            .map(|value| ini::split_list(&value))
            .unwrap_or_default()
    };
    let ini_mods = read(&projection.mods_key);
    let ini_items = read(&projection.workshop_key);

    let enabled_mods = registry.enabled_order();
    let enabled_items: Vec<String> = registry
        .tracked_packages()
        .iter()
        .map(|id| id.to_string())
        .collect();

    Coverage {
        unknown_mods: difference(&ini_mods, &enabled_mods),
        missing_mods: difference(&enabled_mods, &ini_mods),
        unknown_items: difference(&ini_items, &enabled_items),
        missing_items: difference(&enabled_items, &ini_items),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mods_value_prefix_not_doubled() {
        let projection = ProjectionConfig::default();
        let order = vec!["a".to_string(), "\\b".to_string()];
        assert_eq!(mods_value(&order, &projection), "\\a;\\b");
    }

    #[test]
    fn test_config_digest_format() {
        let digest = config_digest("Mods=a\n");
        assert!(digest.starts_with("sha256:"));
        assert_eq!(digest.len(), "sha256:".len() + 64);
    }

    #[test]
    fn test_verify_coverage() {
        let registry = Registry::from_json(json!({
            "mods": [
                { "workshopId": "1", "mods": [{ "id": "a", "enabled": true }, { "id": "b", "enabled": false }] },
                { "workshopId": "2", "mods": [{ "id": "c", "enabled": true }] }
            ]
        }))
        .unwrap();
        let projection = ProjectionConfig::default();

        let covered = verify_coverage(&registry, "Mods=\\a\nWorkshopItems=1\n", &projection);
        assert!(covered.is_ok(false));
        assert!(!covered.is_ok(true));
        assert_eq!(covered.missing_mods, vec!["c"]);
        assert_eq!(covered.missing_items, vec!["2"]);

        let stray = verify_coverage(&registry, "Mods=\\a;\\b\nWorkshopItems=1;2\n", &projection);
        assert_eq!(stray.unknown_mods, vec!["b"]);
        assert!(!stray.is_ok(false));
    }
}
