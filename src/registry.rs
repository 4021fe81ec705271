//! Registry reader: the canonical load set
//!
//! The registry lists packages (Workshop items), each owning an ordered set of
//! sub-units (mod IDs) with an enabled flag. It is loaded once per run as an
//! immutable snapshot; the only mutation is a single bookkeeping write at the
//! end of a run (see [`Registry::record`]).
//!
//! Two sources are supported:
//!
//! - a JSON document (`mods.json`), read through the tolerant candidate
//!   tables in [`crate::schema`]; unknown fields survive a save untouched
//! - a block-format document (`mods.txt`), where every listed entry is enabled
//!
//! # Examples
//!
//! ```no_run
//! use modsync::Registry;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Registry::load("mods.json")?;
//! println!("{} enabled mod(s)", registry.enabled_order().len());
//! # Ok(())
//! # }
//! ```

use crate::blocks::BlockDocument;
use crate::fsutil::{self, Change};
use crate::schema::{self, Candidate};
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Numeric external identifier of a package (Workshop item ID)
pub type SourceId = u64;

/// Name of the free-form bookkeeping object in the JSON registry
pub const BOOKKEEPING_KEY: &str = "resolution";

/// Name of the timestamp field in the JSON registry
pub const GENERATED_AT_KEY: &str = "generatedAt";

/// The smallest activatable content item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubUnit {
    pub id: String,
    pub enabled: bool,
    /// Prerequisites declared in the registry itself (merged with scanned ones)
    pub requires: Vec<String>,
}

impl SubUnit {
    pub fn enabled(id: &str) -> Self {
        Self {
            id: id.to_string(),
            enabled: true,
            requires: Vec::new(),
        }
    }
}

/// One distributable unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub source_id: SourceId,
    pub name: Option<String>,
    pub sub_units: Vec<SubUnit>,
}

impl Package {
    /// Enabled sub-units in declared order
    pub fn enabled_units(&self) -> impl Iterator<Item = &SubUnit> {
        self.sub_units.iter().filter(|u| u.enabled)
    }

    pub fn has_enabled_units(&self) -> bool {
        self.sub_units.iter().any(|u| u.enabled)
    }
}

/// Where a registry snapshot is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryFormat {
    Json,
    Blocks,
}

impl RegistryFormat {
    /// `.json` files are JSON registries; anything else is a block document
    pub fn detect(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => RegistryFormat::Json,
            _ => RegistryFormat::Blocks,
        }
    }
}

/// Immutable snapshot of the registry for one run
#[derive(Debug, Clone)]
pub struct Registry {
    pub format: RegistryFormat,
    pub packages: Vec<Package>,
    /// Declared sub-units not attributable to any package
    pub unattributed: Vec<SubUnit>,
    pub generated_at: Option<String>,
    /// Operator-declared `Map=` entries, if any
    pub map_names: Vec<String>,
    raw: Value,
}

impl Registry {
    /// Load a registry, choosing the format from the file extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        Self::load_as(path, RegistryFormat::detect(path))
    }

    /// Load a registry in an explicit format
    pub fn load_as<P: AsRef<Path>>(path: P, format: RegistryFormat) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::MissingInput {
                what: "registry",
                path: path.to_path_buf(),
            });
        }

        match format {
            RegistryFormat::Json => {
                let content = fsutil::read_text_lossy(path)?;
                let value: Value = serde_json::from_str(&content).map_err(|e| {
                    Error::SchemaViolation {
                        location: format!("{} line {} column {}", path.display(), e.line(), e.column()),
                        message: e.to_string(),
                    }
                })?;
                Self::from_json(value)
            }
            RegistryFormat::Blocks => Ok(Self::from_blocks(&BlockDocument::load(path)?)),
        }
    }

    /// Build a snapshot from a JSON registry document
    pub fn from_json(raw: Value) -> Result<Self> {
        if !raw.is_object() {
            return Err(Error::SchemaViolation {
                location: "$".to_string(),
                message: "expected a JSON object at the top level".to_string(),
            });
        }

        let (list, found) = schema::extract(&raw, schema::PACKAGE_LIST).ok_or_else(|| {
            Error::SchemaViolation {
                location: "$.mods".to_string(),
                message: "expected a list of package entries".to_string(),
            }
        })?;
        let list_location = schema::location("$", &found);

        let mut packages = Vec::new();
        for (index, entry) in list.as_array().into_iter().flatten().enumerate() {
            let location = format!("{}[{}]", list_location, index);
            packages.push(parse_package(entry, &location)?);
        }

        let generated_at = raw
            .get(GENERATED_AT_KEY)
            .and_then(Value::as_str)
            .map(str::to_string);
        let map_names =
            schema::extract_string_list(&raw, schema::MAP_NAMES, schema::MAP_NAME_SEPARATORS);

        Ok(Self {
            format: RegistryFormat::Json,
            packages,
            unattributed: Vec::new(),
            generated_at,
            map_names,
            raw,
        })
    }

    /// Build a snapshot from a block-format document; every entry is enabled
    pub fn from_blocks(doc: &BlockDocument) -> Self {
        let packages = doc
            .blocks
            .iter()
            .map(|block| Package {
                source_id: block.source_id,
                name: None,
                sub_units: block.entries.iter().map(|id| SubUnit::enabled(id)).collect(),
            })
            .collect();

        Self {
            format: RegistryFormat::Blocks,
            packages,
            unattributed: doc.orphans.iter().map(|id| SubUnit::enabled(id)).collect(),
            generated_at: None,
            map_names: Vec::new(),
            raw: Value::Null,
        }
    }

    /// Enabled sub-unit IDs in declared order, first occurrence wins
    pub fn enabled_order(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        for unit in self.all_enabled() {
            if seen.insert(unit.id.as_str()) {
                order.push(unit.id.clone());
            } else {
                tracing::warn!(unit = %unit.id, "sub-unit is enabled more than once; keeping the first");
            }
        }
        order
    }

    /// Source IDs of packages with at least one enabled sub-unit, in declared order
    pub fn enabled_packages(&self) -> Vec<SourceId> {
        let mut seen = HashSet::new();
        self.packages
            .iter()
            .filter(|p| p.has_enabled_units())
            .filter(|p| seen.insert(p.source_id))
            .map(|p| p.source_id)
            .collect()
    }

    /// Source IDs projected to `WorkshopItems=`
    ///
    /// A block document tracks every package it has a block for, empty or
    /// not, so the server downloads new items before their mod IDs are known.
    /// A JSON registry tracks packages with at least one enabled sub-unit.
    pub fn tracked_packages(&self) -> Vec<SourceId> {
        match self.format {
            RegistryFormat::Json => self.enabled_packages(),
            RegistryFormat::Blocks => {
                let mut seen = HashSet::new();
                self.packages
                    .iter()
                    .map(|p| p.source_id)
                    .filter(|id| seen.insert(*id))
                    .collect()
            }
        }
    }

    /// Package that declares each enabled sub-unit (first declaration wins)
    pub fn declared_owners(&self) -> HashMap<String, SourceId> {
        let mut owners = HashMap::new();
        for package in &self.packages {
            for unit in package.enabled_units() {
                owners.entry(unit.id.clone()).or_insert(package.source_id);
            }
        }
        owners
    }

    /// Prerequisites declared in the registry, keyed by enabled sub-unit
    pub fn declared_requires(&self) -> HashMap<String, Vec<String>> {
        let mut requires: HashMap<String, Vec<String>> = HashMap::new();
        for unit in self.all_enabled() {
            if !unit.requires.is_empty() {
                requires
                    .entry(unit.id.clone())
                    .or_default()
                    .extend(unit.requires.iter().cloned());
            }
        }
        requires
    }

    /// True when any package lists the sub-unit, enabled or not
    pub fn declares(&self, unit: &str) -> bool {
        self.packages
            .iter()
            .flat_map(|p| p.sub_units.iter())
            .chain(self.unattributed.iter())
            .any(|u| u.id == unit)
    }

    /// Look up a package by source ID
    pub fn package(&self, source_id: SourceId) -> Option<&Package> {
        self.packages.iter().find(|p| p.source_id == source_id)
    }

    /// The free-form bookkeeping object, if the registry has one
    pub fn bookkeeping(&self) -> Option<&Map<String, Value>> {
        self.raw.get(BOOKKEEPING_KEY).and_then(Value::as_object)
    }

    /// Produce the document with `resolution.<key>` set to `entry`
    ///
    /// Returns `None` when the registry is not a JSON document or the entry is
    /// already recorded verbatim, so unchanged runs never touch the file. When
    /// a new document is produced, `generatedAt` is refreshed.
    pub fn record(&self, key: &str, entry: Value) -> Option<Value> {
        if self.format != RegistryFormat::Json {
            return None;
        }
        if self.bookkeeping().and_then(|b| b.get(key)) == Some(&entry) {
            return None;
        }

        let mut raw = self.raw.clone();
        let root = raw.as_object_mut()?;
        root.insert(
            GENERATED_AT_KEY.to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
        let slot = root
            .entry(BOOKKEEPING_KEY.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        if let Some(bookkeeping) = slot.as_object_mut() {
            bookkeeping.insert(key.to_string(), entry);
        }
        Some(raw)
    }

    fn all_enabled(&self) -> impl Iterator<Item = &SubUnit> {
        self.packages
            .iter()
            .flat_map(|p| p.enabled_units())
            .chain(self.unattributed.iter().filter(|u| u.enabled))
    }
}

/// Serialize a registry document the way it is stored on disk
pub fn to_json_string(raw: &Value) -> Result<String> {
    let mut text = serde_json::to_string_pretty(raw)?;
    text.push('\n');
    Ok(text)
}

/// Atomically save a registry document produced by [`Registry::record`]
pub fn save<P: AsRef<Path>>(path: P, raw: &Value, dry_run: bool) -> Result<Change> {
    fsutil::write_if_changed(path.as_ref(), to_json_string(raw)?.as_bytes(), dry_run)
}

fn field<'a>(entry: &'a Value, candidates: &[Candidate]) -> Option<&'a Value> {
    schema::extract(entry, candidates).map(|(v, _)| v)
}

fn parse_package(entry: &Value, location: &str) -> Result<Package> {
    if !entry.is_object() {
        return Err(Error::SchemaViolation {
            location: location.to_string(),
            message: "expected a package object".to_string(),
        });
    }

    let source_id = field(entry, schema::SOURCE_ID)
        .and_then(schema::as_numeric)
        .ok_or_else(|| Error::SchemaViolation {
            location: location.to_string(),
            message: format!(
                "missing numeric source id (looked for {})",
                schema::SOURCE_ID_FIELDS.join(", ")
            ),
        })?;

    let name = field(entry, schema::PACKAGE_NAME)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let mut sub_units = Vec::new();
    if let Some((list, found)) = schema::extract(entry, schema::SUB_UNIT_LIST) {
        let list_location = schema::location(location, &found);
        for (index, unit) in list.as_array().into_iter().flatten().enumerate() {
            let unit_location = format!("{}[{}]", list_location, index);
            if let Some(unit) = parse_sub_unit(unit, &unit_location)? {
                sub_units.push(unit);
            }
        }
    }

    Ok(Package {
        source_id,
        name,
        sub_units,
    })
}

fn parse_sub_unit(entry: &Value, location: &str) -> Result<Option<SubUnit>> {
    if !entry.is_object() {
        return Err(Error::SchemaViolation {
            location: location.to_string(),
            message: "expected a sub-unit object".to_string(),
        });
    }

    let id = field(entry, schema::SUB_UNIT_ID)
        .and_then(Value::as_str)
        .map(normalize_unit_id)
        .unwrap_or_default();
    if id.is_empty() {
        tracing::warn!(location, "skipping sub-unit without an id");
        return Ok(None);
    }

    let enabled = field(entry, schema::ENABLED)
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let requires = schema::extract_string_list(entry, schema::REQUIRES, schema::LIST_SEPARATORS)
        .iter()
        .map(|r| normalize_unit_id(r))
        .filter(|r| !r.is_empty())
        .collect();

    Ok(Some(SubUnit {
        id,
        enabled,
        requires,
    }))
}

/// Strip surrounding whitespace and leading backslashes from a mod ID
pub fn normalize_unit_id(raw: &str) -> String {
    raw.trim().trim_start_matches('\\').trim().to_string()
}
