//! User configuration management
//!
//! Configuration is stored in TOML format at `~/.modsync/config.toml`
//! (or `$MODSYNC_CONFIG_DIR/config.toml`). Every section is optional; command
//! line flags override whatever is configured here.
//!
//! # Examples
//!
//! ```no_run
//! use modsync::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = Config::load()?;
//! println!("Mods key: {}", config.projection.mods_key);
//!
//! config.set("policy.namespace_conflicts", "fatal")?;
//! config.save()?;
//! # Ok(())
//! # }
//! ```

use crate::conflicts::Severity;
use crate::maps::VANILLA_MAPS;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "MODSYNC_CONFIG_DIR";

/// User configuration file (`~/.modsync/config.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Default input and output locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Failure policy
    #[serde(default)]
    pub policy: PolicyConfig,

    /// How the resolved load set is written into the server INI
    #[serde(default)]
    pub projection: ProjectionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Registry document (`mods.json` or a block document)
    pub registry: Option<String>,

    /// Workshop content root holding one directory per workshop item
    pub scan_root: Option<String>,

    /// Server INI to rewrite
    pub ini: Option<String>,

    /// Block document (`mods.txt`) to keep in sync
    pub blocks: Option<String>,

    /// Generated spawn-regions Lua file
    pub spawnregions: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Fail when a package directory is missing under the scan root
    #[serde(default)]
    pub strict_inputs: bool,

    /// Severity of tiledef file number collisions
    #[serde(default)]
    pub namespace_conflicts: Severity,

    /// Fail when the registry enables no sub-units
    #[serde(default)]
    pub require_mod_ids: bool,

    /// Fail when the registry enables no packages
    #[serde(default)]
    pub require_workshop_ids: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionConfig {
    #[serde(default = "default_mods_key")]
    pub mods_key: String,

    #[serde(default = "default_workshop_key")]
    pub workshop_key: String,

    #[serde(default = "default_map_key")]
    pub map_key: String,

    /// Rewrite the map key at all
    #[serde(default = "default_write_map")]
    pub write_map: bool,

    /// Prefix added to every sub-unit ID in the mods key
    #[serde(default = "default_mod_prefix")]
    pub mod_prefix: String,

    #[serde(default = "default_separator")]
    pub separator: String,

    /// Stock maps appended after workshop maps
    #[serde(default = "default_vanilla_maps")]
    pub vanilla_maps: Vec<String>,

    /// Written to `PublicName=` when set
    #[serde(default)]
    pub public_name: Option<String>,
}

fn default_mods_key() -> String {
    "Mods".to_string()
}

fn default_workshop_key() -> String {
    "WorkshopItems".to_string()
}

fn default_map_key() -> String {
    "Map".to_string()
}

fn default_write_map() -> bool {
    true
}

fn default_mod_prefix() -> String {
    "\\".to_string()
}

fn default_separator() -> String {
    ";".to_string()
}

fn default_vanilla_maps() -> Vec<String> {
    VANILLA_MAPS.iter().map(|m| m.to_string()).collect()
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            mods_key: default_mods_key(),
            workshop_key: default_workshop_key(),
            map_key: default_map_key(),
            write_map: default_write_map(),
            mod_prefix: default_mod_prefix(),
            separator: default_separator(),
            vanilla_maps: default_vanilla_maps(),
            public_name: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default tracing filter (e.g. "info", "modsync=debug")
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Keys accepted by [`Config::set`]
pub const SETTABLE_KEYS: &[&str] = &[
    "paths.registry",
    "paths.scan_root",
    "paths.ini",
    "paths.blocks",
    "paths.spawnregions",
    "policy.strict_inputs",
    "policy.namespace_conflicts",
    "policy.require_mod_ids",
    "policy.require_workshop_ids",
    "projection.mods_key",
    "projection.workshop_key",
    "projection.map_key",
    "projection.write_map",
    "projection.mod_prefix",
    "projection.separator",
    "projection.vanilla_maps",
    "projection.public_name",
    "logging.level",
];

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value.parse::<bool>().map_err(|_| {
        Error::Usage(format!(
            "Invalid boolean value for {}: '{}'. Use 'true' or 'false'",
            key, value
        ))
    })
}

fn optional(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl Config {
    /// Get the default config file path
    ///
    /// Uses MODSYNC_CONFIG_DIR if set, otherwise ~/.modsync/config.toml
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(config_dir) = std::env::var(CONFIG_DIR_ENV) {
            return Ok(PathBuf::from(config_dir).join("config.toml"));
        }

        let home = dirs::home_dir()
            .ok_or_else(|| Error::Other("Could not find home directory".to_string()))?;

        Ok(home.join(".modsync").join("config.toml"))
    }

    /// Load config from file, or the defaults if it doesn't exist
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        crate::fsutil::write_atomic(&path, content.as_bytes())
    }

    /// Set one dotted key from its string form
    ///
    /// An empty value clears optional settings. `projection.vanilla_maps`
    /// takes a `;`-separated list.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "paths.registry" => self.paths.registry = optional(value),
            "paths.scan_root" => self.paths.scan_root = optional(value),
            "paths.ini" => self.paths.ini = optional(value),
            "paths.blocks" => self.paths.blocks = optional(value),
            "paths.spawnregions" => self.paths.spawnregions = optional(value),
            "policy.strict_inputs" => self.policy.strict_inputs = parse_bool(key, value)?,
            "policy.namespace_conflicts" => self.policy.namespace_conflicts = value.parse()?,
            "policy.require_mod_ids" => self.policy.require_mod_ids = parse_bool(key, value)?,
            "policy.require_workshop_ids" => {
                self.policy.require_workshop_ids = parse_bool(key, value)?
            }
            "projection.mods_key" => self.projection.mods_key = value.to_string(),
            "projection.workshop_key" => self.projection.workshop_key = value.to_string(),
            "projection.map_key" => self.projection.map_key = value.to_string(),
            "projection.write_map" => self.projection.write_map = parse_bool(key, value)?,
            "projection.mod_prefix" => self.projection.mod_prefix = value.to_string(),
            "projection.separator" => self.projection.separator = value.to_string(),
            "projection.vanilla_maps" => {
                self.projection.vanilla_maps = value
                    .split(';')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(str::to_string)
                    .collect()
            }
            "projection.public_name" => self.projection.public_name = optional(value),
            "logging.level" => self.logging.level = value.to_string(),
            _ => {
                return Err(Error::Usage(format!(
                    "Unknown configuration key '{}'. Available keys: {}",
                    key,
                    SETTABLE_KEYS.join(", ")
                )))
            }
        }
        Ok(())
    }
}

/// Expand `~` and `$VAR` in a configured path
pub fn expand_path(raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw)
        .map_err(|e| Error::Usage(format!("Cannot expand path '{}': {}", raw, e)))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.projection.mods_key, "Mods");
        assert_eq!(config.projection.mod_prefix, "\\");
        assert_eq!(config.projection.vanilla_maps.len(), 5);
        assert_eq!(config.policy.namespace_conflicts, Severity::Warn);
        assert!(!config.policy.strict_inputs);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            "[policy]\nnamespace_conflicts = \"fatal\"\n[projection]\nseparator = \",\"\n",
        )
        .unwrap();
        assert_eq!(config.policy.namespace_conflicts, Severity::Fatal);
        assert_eq!(config.projection.separator, ",");
        assert_eq!(config.projection.workshop_key, "WorkshopItems");
        assert!(config.projection.write_map);
    }

    #[test]
    fn test_set_keys() {
        let mut config = Config::default();
        config.set("paths.ini", "~/Zomboid/Server/servertest.ini").unwrap();
        config.set("policy.strict_inputs", "true").unwrap();
        config.set("projection.vanilla_maps", "A; B;").unwrap();
        config.set("projection.public_name", "").unwrap();

        assert_eq!(config.paths.ini.as_deref(), Some("~/Zomboid/Server/servertest.ini"));
        assert!(config.policy.strict_inputs);
        assert_eq!(config.projection.vanilla_maps, vec!["A", "B"]);
        assert!(config.projection.public_name.is_none());
    }

    #[test]
    fn test_set_rejects_bad_input() {
        let mut config = Config::default();
        assert!(matches!(config.set("nope", "1"), Err(Error::Usage(_))));
        assert!(matches!(config.set("policy.strict_inputs", "yes"), Err(Error::Usage(_))));
        assert!(config.set("policy.namespace_conflicts", "sometimes").is_err());
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let mut config = Config::default();
        config.set("paths.registry", "/srv/mods.json").unwrap();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.paths.registry.as_deref(), Some("/srv/mods.json"));
    }

    #[test]
    fn test_expand_path_plain() {
        assert_eq!(expand_path("/srv/x").unwrap(), PathBuf::from("/srv/x"));
    }
}
