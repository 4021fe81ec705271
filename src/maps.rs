//! `Map=` list assembly and the server spawn-regions file

use crate::registry::SourceId;
use crate::scanner::{MapFolder, ScanIndex};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;

/// Stock maps appended after workshop maps
pub const VANILLA_MAPS: &[&str] = &[
    "Muldraugh, KY",
    "Riverside, KY",
    "Rosewood, KY",
    "West Point, KY",
    "Louisville, KY",
];

/// A map folder shipped by an active package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvidedMap {
    pub name: String,
    pub path: PathBuf,
    pub source_id: SourceId,
    /// Package label of the provider
    pub provider: String,
}

impl ProvidedMap {
    fn new(folder: &MapFolder, source_id: SourceId, provider: &str) -> Self {
        Self {
            name: folder.name.clone(),
            path: folder.path.clone(),
            source_id,
            provider: provider.to_string(),
        }
    }
}

/// Map folders of enabled sub-units, plus unowned map folders of active packages
pub fn provided_maps(
    index: &ScanIndex,
    active_units: &[String],
    active_packages: &[SourceId],
) -> Vec<ProvidedMap> {
    let active: HashSet<&str> = active_units.iter().map(String::as_str).collect();
    let mut maps = Vec::new();

    for package in &index.packages {
        let mut package_active = active_packages.contains(&package.source_id);
        for id in package.units.iter().filter(|id| active.contains(id.as_str())) {
            package_active = true;
            if let Some(unit) = index.units.get(id) {
                maps.extend(
                    unit.maps
                        .iter()
                        .map(|m| ProvidedMap::new(m, package.source_id, &package.label)),
                );
            }
        }
        if package_active {
            maps.extend(
                package
                    .unowned_maps
                    .iter()
                    .map(|m| ProvidedMap::new(m, package.source_id, &package.label)),
            );
        }
    }
    maps
}

/// Compute the `Map=` entries
///
/// Operator-declared names win outright. Otherwise: provided map names,
/// sorted and unique, followed by the vanilla maps not already listed.
pub fn map_list(declared: &[String], provided: &[ProvidedMap], vanilla: &[String]) -> Vec<String> {
    if !declared.is_empty() {
        return declared.to_vec();
    }

    let names: BTreeSet<&str> = provided.iter().map(|m| m.name.as_str()).collect();
    let mut list: Vec<String> = names.into_iter().map(str::to_string).collect();
    for name in vanilla {
        if !list.contains(name) {
            list.push(name.clone());
        }
    }
    list
}

/// Render `function SpawnRegions() ... end` for the listed maps
///
/// Each map that ships `spawnregions.lua` (preferred) or `spawnpoints.lua` gets
/// one entry; maps without either are skipped.
pub fn render_spawn_regions(map_names: &[String], provided: &[ProvidedMap]) -> String {
    let mut out = String::from("function SpawnRegions()\n\treturn {\n");
    for name in map_names {
        let Some(map) = provided.iter().find(|m| &m.name == name) else {
            continue;
        };
        let file = ["spawnregions.lua", "spawnpoints.lua"]
            .into_iter()
            .find(|f| {
                let path = map.path.join(f);
                path.is_file() && !crate::fsutil::is_symlink(&path)
            });
        if let Some(file) = file {
            out.push_str(&format!(
                "\t\t{{ name = \"{}\", file = \"media/maps/{}/{}\" }},\n",
                name, name, file
            ));
        }
    }
    out.push_str("\t}\nend\n");
    out
}

/// Result of checking existing `Map=` entries against the active packages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapCheck {
    /// Entries neither vanilla nor provided by an active package
    pub missing: Vec<String>,
    /// Entries provided by more than one package
    pub duplicated: BTreeMap<String, Vec<String>>,
}

pub fn check_entries(entries: &[String], provided: &[ProvidedMap], vanilla: &[String]) -> MapCheck {
    let mut check = MapCheck::default();
    for entry in entries {
        let mut providers: Vec<String> = Vec::new();
        for map in provided.iter().filter(|m| &m.name == entry) {
            if !providers.contains(&map.provider) {
                providers.push(map.provider.clone());
            }
        }
        if providers.is_empty() {
            if !vanilla.contains(entry) {
                check.missing.push(entry.clone());
            }
        } else if providers.len() > 1 {
            check.duplicated.insert(entry.clone(), providers);
        }
    }
    check
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn vanilla() -> Vec<String> {
        VANILLA_MAPS.iter().map(|s| s.to_string()).collect()
    }

    fn provided(name: &str, provider: &str, path: PathBuf) -> ProvidedMap {
        ProvidedMap {
            name: name.to_string(),
            path,
            source_id: 1,
            provider: provider.to_string(),
        }
    }

    #[test]
    fn test_map_list_sorted_then_vanilla() {
        let maps = vec![
            provided("Raven Creek", "A", PathBuf::new()),
            provided("Bedford Falls", "B", PathBuf::new()),
            provided("Raven Creek", "A", PathBuf::new()),
        ];
        let list = map_list(&[], &maps, &vanilla());
        assert_eq!(list[..2], ["Bedford Falls".to_string(), "Raven Creek".to_string()]);
        assert_eq!(list.len(), 7);
        assert_eq!(list[2], "Muldraugh, KY");
    }

    #[test]
    fn test_declared_names_win() {
        let declared = vec!["Custom".to_string(), "Muldraugh, KY".to_string()];
        let maps = vec![provided("Other", "A", PathBuf::new())];
        assert_eq!(map_list(&declared, &maps, &vanilla()), declared);
    }

    #[test]
    fn test_spawn_regions_prefers_spawnregions() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("A");
        let b = dir.path().join("B");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();
        fs::write(a.join("spawnregions.lua"), "").unwrap();
        fs::write(a.join("spawnpoints.lua"), "").unwrap();
        fs::write(b.join("spawnpoints.lua"), "").unwrap();

        let maps = vec![provided("A", "p", a), provided("B", "p", b)];
        let names = vec!["A".to_string(), "B".to_string(), "Muldraugh, KY".to_string()];
        let lua = render_spawn_regions(&names, &maps);

        assert_eq!(
            lua,
            "function SpawnRegions()\n\treturn {\n\
             \t\t{ name = \"A\", file = \"media/maps/A/spawnregions.lua\" },\n\
             \t\t{ name = \"B\", file = \"media/maps/B/spawnpoints.lua\" },\n\
             \t}\nend\n"
        );
    }

    #[test]
    fn test_check_entries() {
        let maps = vec![
            provided("Shared", "A [1]", PathBuf::new()),
            provided("Shared", "B [2]", PathBuf::new()),
            provided("Solo", "A [1]", PathBuf::new()),
        ];
        let entries: Vec<String> = ["Solo", "Shared", "Gone", "Riverside, KY"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let check = check_entries(&entries, &maps, &vanilla());
        assert_eq!(check.missing, vec!["Gone"]);
        assert_eq!(check.duplicated["Shared"], vec!["A [1]", "B [2]"]);
    }
}
