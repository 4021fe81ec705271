//! On-disk metadata scanner
//!
//! Walks each package directory under the scan root (`<root>/<sourceId>`) and
//! discovers, independently of the registry:
//!
//! - sub-units, one per `mod.info` (`id=`, `name=`, `require=`, `tiledef=`)
//! - map folders (`media/maps/<MapName>` containing `map.info` or a `.lotheader`)
//! - coordinate claims, encoded as `X_Y.lotheader` file names
//!
//! Symlinked files and directories are never followed or counted; servers
//! carry case-compatibility links that would otherwise double every claim.
//!
//! # Examples
//!
//! ```no_run
//! use modsync::scanner::{scan, ScanOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let index = scan("workshop/content/108600".as_ref(), &[2392709985], &ScanOptions::default())?;
//! for unit in index.units.values() {
//!     println!("{} requires {:?}", unit.id, unit.requires);
//! }
//! # Ok(())
//! # }
//! ```

use crate::conflicts::{Coordinate, NamespaceId};
use crate::fsutil;
use crate::registry::{normalize_unit_id, SourceId};
use crate::{Error, Result};
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use walkdir::WalkDir;

/// Progress callback for scanning
///
/// Called with:
/// - `message`: Description of the current step (e.g., "Scanning 2392709985")
/// - `current`: Packages scanned so far
/// - `total`: Packages to scan
pub type ProgressCallback = Arc<dyn Fn(&str, u64, u64) + Send + Sync>;

/// Locations probed, relative to each ancestor directory, when looking for the
/// `mod.info` that owns a map folder or claim file.
pub const MOD_INFO_PROBES: &[&str] = &[
    "mod.info",
    "42/mod.info",
    "42.0/mod.info",
    "common/mod.info",
    "common/42.0/mod.info",
];

fn mod_info_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(\w+)\s*=\s*(.*?)\s*$").expect("valid regex"))
}

fn lotheader_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(-?\d+)_(-?\d+)\.lotheader$").expect("valid regex")
    })
}

/// A map folder shipped by a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapFolder {
    pub name: String,
    pub path: PathBuf,
}

/// Metadata observed on disk for one sub-unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitMetadata {
    pub id: String,
    pub source_id: SourceId,
    pub name: Option<String>,
    pub requires: Vec<String>,
    pub namespace_claims: BTreeSet<NamespaceId>,
    pub coordinate_claims: BTreeSet<Coordinate>,
    pub maps: Vec<MapFolder>,
}

/// What one package directory contains
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageScan {
    pub source_id: SourceId,
    /// `"<first mod name> [<sourceId>]"`, or the bare source ID
    pub label: String,
    pub root: PathBuf,
    /// Sub-units in discovery order (only those first seen in this package)
    pub units: Vec<String>,
    /// Claims not attributable to any `mod.info`
    pub unowned_coordinates: BTreeSet<Coordinate>,
    pub unowned_maps: Vec<MapFolder>,
    /// Sub-units whose ID an earlier package already ships; their claims
    /// still belong to this package
    pub shadowed: Vec<UnitMetadata>,
}

/// Everything the scanner observed
#[derive(Debug, Clone, Default)]
pub struct ScanIndex {
    pub packages: Vec<PackageScan>,
    pub units: HashMap<String, UnitMetadata>,
    /// Requested packages with no directory under the scan root
    pub missing: Vec<SourceId>,
}

impl ScanIndex {
    /// True when metadata for the sub-unit has been observed
    pub fn is_known(&self, unit: &str) -> bool {
        self.units.contains_key(unit)
    }

    /// Package that ships each observed sub-unit
    pub fn owners(&self) -> HashMap<String, SourceId> {
        self.units
            .values()
            .map(|u| (u.id.clone(), u.source_id))
            .collect()
    }

    /// Packages whose directory exists
    pub fn on_disk(&self) -> HashSet<SourceId> {
        self.packages.iter().map(|p| p.source_id).collect()
    }

    pub fn package(&self, source_id: SourceId) -> Option<&PackageScan> {
        self.packages.iter().find(|p| p.source_id == source_id)
    }

    /// Display label for a package, falling back to the bare ID
    pub fn label(&self, source_id: SourceId) -> String {
        self.package(source_id)
            .map(|p| p.label.clone())
            .unwrap_or_else(|| source_id.to_string())
    }
}

/// Scanner behaviour
#[derive(Clone, Default)]
pub struct ScanOptions {
    /// Fail on a missing package directory instead of skipping it
    pub strict: bool,
    pub progress: Option<ProgressCallback>,
}

/// Scan the given packages under `root`
pub fn scan(root: &Path, packages: &[SourceId], options: &ScanOptions) -> Result<ScanIndex> {
    if !root.is_dir() {
        return Err(Error::MissingInput {
            what: "scan root",
            path: root.to_path_buf(),
        });
    }

    let mut index = ScanIndex::default();
    let total = packages.len() as u64;

    for (done, source_id) in packages.iter().enumerate() {
        if let Some(ref cb) = options.progress {
            cb(&format!("Scanning {}", source_id), done as u64, total);
        }

        let dir = root.join(source_id.to_string());
        if !dir.is_dir() || fsutil::is_symlink(&dir) {
            if options.strict {
                return Err(Error::MissingInput {
                    what: "package directory",
                    path: dir,
                });
            }
            tracing::warn!(source_id, path = %dir.display(), "package directory not found; skipping (not downloaded yet?)");
            index.missing.push(*source_id);
            continue;
        }

        let (package, units) = scan_package(&dir, *source_id)?;
        let mut kept = Vec::new();
        let mut shadowed = Vec::new();
        for unit in units {
            if let Some(existing) = index.units.get(&unit.id) {
                tracing::warn!(
                    unit = %unit.id,
                    first = existing.source_id,
                    duplicate = source_id,
                    "sub-unit shipped by more than one package; keeping the first"
                );
                shadowed.push(unit);
                continue;
            }
            kept.push(unit.id.clone());
            index.units.insert(unit.id.clone(), unit);
        }
        index.packages.push(PackageScan {
            units: kept,
            shadowed,
            ..package
        });
    }

    if let Some(ref cb) = options.progress {
        cb("Scan complete", total, total);
    }

    tracing::debug!(
        packages = index.packages.len(),
        units = index.units.len(),
        missing = index.missing.len(),
        "scan finished"
    );
    Ok(index)
}

#[derive(Debug, Default)]
struct ModInfo {
    id: String,
    name: Option<String>,
    requires: Vec<String>,
    tiledefs: Vec<NamespaceId>,
}

fn parse_mod_info(text: &str) -> ModInfo {
    let mut info = ModInfo::default();
    for line in text.lines() {
        let line = line.trim_end_matches(['\r', '\0']);
        let Some(caps) = mod_info_line_re().captures(line) else {
            continue;
        };
        let value = caps[2].trim();
        match caps[1].to_ascii_lowercase().as_str() {
            "id" if info.id.is_empty() => info.id = normalize_unit_id(value),
            "name" if info.name.is_none() && !value.is_empty() => {
                info.name = Some(value.to_string())
            }
            "require" => info.requires.extend(
                value
                    .split(',')
                    .map(normalize_unit_id)
                    .filter(|r| !r.is_empty()),
            ),
            "tiledef" => {
                // tiledef=<packName> <fileNumber>
                if let Some(number) = value
                    .split_whitespace()
                    .nth(1)
                    .and_then(|n| n.parse::<NamespaceId>().ok())
                {
                    info.tiledefs.push(number);
                }
            }
            _ => {}
        }
    }
    info
}

fn is_named(path: &Path, name: &str) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().eq_ignore_ascii_case(name))
        .unwrap_or(false)
}

fn is_map_candidate(dir: &Path) -> bool {
    let parent = dir.parent();
    let grandparent = parent.and_then(Path::parent);
    matches!((parent, grandparent), (Some(p), Some(g)) if is_named(p, "maps") && is_named(g, "media"))
}

/// A map folder must contain `map.info` or at least one real `.lotheader`
fn is_map_dir(dir: &Path) -> Result<bool> {
    if dir.join("map.info").is_file() {
        return Ok(true);
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if fsutil::is_symlink(&path) || !path.is_file() {
            continue;
        }
        if lotheader_re().is_match(&path.file_name().unwrap_or_default().to_string_lossy()) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn owner_of(path: &Path, package_root: &Path, infos: &HashMap<PathBuf, String>) -> Option<String> {
    for ancestor in path.ancestors().skip(1) {
        for probe in MOD_INFO_PROBES {
            if let Some(id) = infos.get(&ancestor.join(probe)) {
                return Some(id.clone());
            }
        }
        if ancestor == package_root {
            break;
        }
    }
    None
}

/// Scan one package directory
///
/// Returns the package summary (with every discovered sub-unit listed) and the
/// per-sub-unit metadata, merged across duplicate `mod.info` variants.
pub fn scan_package(dir: &Path, source_id: SourceId) -> Result<(PackageScan, Vec<UnitMetadata>)> {
    let mut mod_infos: Vec<(PathBuf, ModInfo)> = Vec::new();
    let mut lotheaders: Vec<(PathBuf, Coordinate)> = Vec::new();
    let mut map_dirs: Vec<PathBuf> = Vec::new();

    let walker = WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(fsutil::not_symlink);

    for entry in walker {
        let entry = entry.map_err(|e| Error::Other(format!("Failed to scan {}: {}", dir.display(), e)))?;
        let path = entry.path();
        let file_type = entry.file_type();

        if file_type.is_dir() {
            if is_map_candidate(path) {
                map_dirs.push(path.to_path_buf());
            }
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy();
        if file_name.eq_ignore_ascii_case("mod.info") {
            let info = parse_mod_info(&fsutil::read_text_lossy(path)?);
            if info.id.is_empty() {
                tracing::debug!(path = %path.display(), "mod.info without id; ignoring");
                continue;
            }
            mod_infos.push((path.to_path_buf(), info));
        } else if let Some(caps) = lotheader_re().captures(&file_name) {
            if let (Ok(x), Ok(y)) = (caps[1].parse::<i32>(), caps[2].parse::<i32>()) {
                lotheaders.push((path.to_path_buf(), (x, y)));
            }
        }
    }

    let info_paths: HashMap<PathBuf, String> = mod_infos
        .iter()
        .map(|(path, info)| (path.clone(), info.id.clone()))
        .collect();

    // Merge mod.info variants of the same sub-unit
    let mut order: Vec<String> = Vec::new();
    let mut units: HashMap<String, UnitMetadata> = HashMap::new();
    for (_, info) in &mod_infos {
        let unit = units.entry(info.id.clone()).or_insert_with(|| {
            order.push(info.id.clone());
            UnitMetadata {
                id: info.id.clone(),
                source_id,
                name: None,
                requires: Vec::new(),
                namespace_claims: BTreeSet::new(),
                coordinate_claims: BTreeSet::new(),
                maps: Vec::new(),
            }
        });
        if unit.name.is_none() {
            unit.name = info.name.clone();
        }
        for req in &info.requires {
            if !unit.requires.contains(req) {
                unit.requires.push(req.clone());
            }
        }
        unit.namespace_claims.extend(info.tiledefs.iter().copied());
    }

    let mut unowned_coordinates = BTreeSet::new();
    for (path, coord) in lotheaders {
        match owner_of(&path, dir, &info_paths).and_then(|id| units.get_mut(&id)) {
            Some(unit) => {
                unit.coordinate_claims.insert(coord);
            }
            None => {
                unowned_coordinates.insert(coord);
            }
        }
    }

    let mut unowned_maps = Vec::new();
    for map_dir in map_dirs {
        if !is_map_dir(&map_dir)? {
            continue;
        }
        let name = map_dir
            .file_name()
            .map(|n| n.to_string_lossy().trim().to_string())
            .unwrap_or_default();
        if name.is_empty() {
            continue;
        }
        let folder = MapFolder {
            name,
            path: map_dir.clone(),
        };
        match owner_of(&map_dir, dir, &info_paths).and_then(|id| units.get_mut(&id)) {
            Some(unit) => {
                if !unit.maps.iter().any(|m| m.name == folder.name) {
                    unit.maps.push(folder);
                }
            }
            None => unowned_maps.push(folder),
        }
    }

    let label = mod_infos
        .iter()
        .find_map(|(_, info)| info.name.as_deref())
        .map(|name| format!("{} [{}]", name, source_id))
        .unwrap_or_else(|| source_id.to_string());

    let package = PackageScan {
        source_id,
        label,
        root: dir.to_path_buf(),
        units: order.clone(),
        unowned_coordinates,
        unowned_maps,
        shadowed: Vec::new(),
    };
    let units = order
        .iter()
        .filter_map(|id| units.remove(id))
        .collect();

    Ok((package, units))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_parse_mod_info() {
        let info = parse_mod_info(
            "name=Raven Creek\r\nID=\\RavenCreek\nrequire=\\tsarslib, modoptions,\n\
             tiledef=ravencreek_tiles 254\ntiledef=broken\ntiledef=more 255\nid=Ignored\n",
        );
        assert_eq!(info.id, "RavenCreek");
        assert_eq!(info.name.as_deref(), Some("Raven Creek"));
        assert_eq!(info.requires, vec!["tsarslib", "modoptions"]);
        assert_eq!(info.tiledefs, vec![254, 255]);
    }

    #[test]
    fn test_scan_package_discovers_units_and_claims() {
        let dir = TempDir::new().unwrap();
        let item = dir.path().join("100");
        let mod_root = item.join("mods").join("RavenCreek");
        write(&mod_root.join("mod.info"), "name=Raven Creek\nid=RavenCreek\nrequire=tsarslib\ntiledef=rc 254\n");
        write(&mod_root.join("media/maps/RavenCreek/map.info"), "title=Raven Creek\n");
        write(&mod_root.join("media/maps/RavenCreek/10_20.lotheader"), "");
        write(&mod_root.join("media/maps/RavenCreek/-1_3.LOTHEADER"), "");
        write(&mod_root.join("media/maps/RavenCreek/notes.txt"), "");

        let (package, units) = scan_package(&item, 100).unwrap();

        assert_eq!(package.label, "Raven Creek [100]");
        assert_eq!(package.units, vec!["RavenCreek"]);
        assert_eq!(units.len(), 1);
        let unit = &units[0];
        assert_eq!(unit.requires, vec!["tsarslib"]);
        assert_eq!(unit.namespace_claims, BTreeSet::from([254]));
        assert_eq!(unit.coordinate_claims, BTreeSet::from([(10, 20), (-1, 3)]));
        assert_eq!(unit.maps.len(), 1);
        assert_eq!(unit.maps[0].name, "RavenCreek");
    }

    #[test]
    fn test_b42_layout_ownership_and_merge() {
        // mod.info under 42/ and common/, maps under common/
        let dir = TempDir::new().unwrap();
        let item = dir.path().join("200");
        let mod_root = item.join("mods").join("Bedford");
        write(&mod_root.join("42/mod.info"), "id=Bedford\nrequire=A\ntiledef=bf 300\n");
        write(&mod_root.join("common/mod.info"), "id=Bedford\nrequire=B\ntiledef=bf 300\n");
        write(&mod_root.join("common/media/maps/Bedford Falls/5_7.lotheader"), "");

        let (package, units) = scan_package(&item, 200).unwrap();

        assert_eq!(package.units, vec!["Bedford"]);
        assert_eq!(package.label, "200");
        assert_eq!(units[0].requires, vec!["A", "B"]);
        assert_eq!(units[0].namespace_claims.len(), 1);
        assert_eq!(units[0].coordinate_claims, BTreeSet::from([(5, 7)]));
        assert_eq!(units[0].maps[0].name, "Bedford Falls");
        assert!(package.unowned_coordinates.is_empty());
    }

    #[test]
    fn test_unowned_claims() {
        let dir = TempDir::new().unwrap();
        let item = dir.path().join("300");
        write(&item.join("media/maps/Loose/1_1.lotheader"), "");

        let (package, units) = scan_package(&item, 300).unwrap();
        assert!(units.is_empty());
        assert_eq!(package.unowned_coordinates, BTreeSet::from([(1, 1)]));
        assert_eq!(package.unowned_maps[0].name, "Loose");
    }

    #[test]
    fn test_directory_without_map_markers_is_not_a_map() {
        let dir = TempDir::new().unwrap();
        let item = dir.path().join("400");
        write(&item.join("mods/X/mod.info"), "id=X\n");
        write(&item.join("mods/X/media/maps/Empty/readme.txt"), "");

        let (_, units) = scan_package(&item, 400).unwrap();
        assert!(units[0].maps.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_ignored() {
        let dir = TempDir::new().unwrap();
        let item = dir.path().join("500");
        let maps = item.join("mods/M/media/maps");
        write(&item.join("mods/M/mod.info"), "id=M\n");
        write(&maps.join("Town/2_2.lotheader"), "");
        std::os::unix::fs::symlink(maps.join("Town"), maps.join("town")).unwrap();
        std::os::unix::fs::symlink(
            maps.join("Town/2_2.lotheader"),
            maps.join("Town/3_3.lotheader"),
        )
        .unwrap();

        let (_, units) = scan_package(&item, 500).unwrap();
        assert_eq!(units[0].maps.len(), 1);
        assert_eq!(units[0].coordinate_claims, BTreeSet::from([(2, 2)]));
    }

    #[test]
    fn test_scan_missing_root() {
        let dir = TempDir::new().unwrap();
        let err = scan(&dir.path().join("nope"), &[1], &ScanOptions::default()).unwrap_err();
        assert!(matches!(err, Error::MissingInput { what: "scan root", .. }));
    }

    #[test]
    fn test_scan_missing_package_strict_and_lenient() {
        let dir = TempDir::new().unwrap();

        let lenient = scan(dir.path(), &[42], &ScanOptions::default()).unwrap();
        assert_eq!(lenient.missing, vec![42]);

        let strict = ScanOptions {
            strict: true,
            progress: None,
        };
        let err = scan(dir.path(), &[42], &strict).unwrap_err();
        assert!(matches!(err, Error::MissingInput { what: "package directory", .. }));
    }

    #[test]
    fn test_duplicate_unit_across_packages_keeps_first() {
        let dir = TempDir::new().unwrap();
        write(&dir.path().join("1/mods/A/mod.info"), "id=Shared\n");
        write(&dir.path().join("2/mods/B/mod.info"), "id=Shared\n");

        let index = scan(dir.path(), &[1, 2], &ScanOptions::default()).unwrap();
        assert_eq!(index.units["Shared"].source_id, 1);
        assert!(index.package(2).unwrap().units.is_empty());
        assert_eq!(index.package(2).unwrap().shadowed[0].source_id, 2);
        assert!(index.is_known("Shared"));
        assert_eq!(index.label(2), "2");
    }

    #[test]
    fn test_progress_callback() {
        let dir = TempDir::new().unwrap();
        write(&dir.path().join("1/mods/A/mod.info"), "id=A\n");
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let options = ScanOptions {
            strict: false,
            progress: Some(Arc::new(move |msg: &str, cur: u64, total: u64| {
                sink.lock().unwrap().push((msg.to_string(), cur, total));
            })),
        };

        scan(dir.path(), &[1], &options).unwrap();
        let calls = calls.lock().unwrap();
        assert_eq!(calls.first().unwrap().0, "Scanning 1");
        assert_eq!(calls.last().unwrap().1, 1);
    }
}
