//! modsync - load-set resolution for Project Zomboid dedicated servers
//!
//! modsync decides which Workshop mods a server loads, in what order, and
//! whether they can coexist, then writes that decision into the server INI.
//! It provides:
//!
//! - A tolerant reader for the canonical registry (`mods.json` or `mods.txt`)
//! - An on-disk scanner for `mod.info` metadata, map folders and map cells
//! - A stable dependency sort that keeps the operator's order whenever legal
//! - Map-cell and tiledef collision detection
//! - A minimal-diff, idempotent INI rewrite with atomic writes
//!
//! # Examples
//!
//! ```no_run
//! use modsync::pipeline::{self, ResolveOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let resolved = pipeline::resolve(&ResolveOptions {
//!     registry: "mods.json".into(),
//!     scan_root: "/steam/steamapps/workshop/content/108600".into(),
//!     ..Default::default()
//! })?;
//!
//! println!("Mods={}", resolved.order().join(";"));
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`registry`] - Load the registry snapshot and record bookkeeping
//! - [`schema`] - Prioritized field candidates for the JSON registry
//! - [`blocks`] - The `Workshop ID:` / `Mod ID:` block document
//! - [`scanner`] - Discover sub-units and claims on disk
//! - [`graph`] - Dependency graph over enabled sub-units
//! - [`resolver`] - Stable topological sort with cycle detection
//! - [`conflicts`] - Coordinate and namespace collision detection
//! - [`ini`] - Continuation-aware key rewrite
//! - [`maps`] - `Map=` list and spawn-regions file
//! - [`pipeline`] - resolve, check and project
//! - [`config`] - User configuration
//! - [`error`] - Error types and exit codes

pub mod blocks;
pub mod config;
pub mod conflicts;
pub mod error;
pub mod fsutil;
pub mod graph;
pub mod ini;
pub mod logging;
pub mod maps;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod scanner;
pub mod schema;

pub use blocks::BlockDocument;
pub use config::Config;
pub use conflicts::{ConflictReport, Coordinate, NamespaceId, Severity};
pub use error::{Error, Result};
pub use fsutil::Change;
pub use graph::DependencyGraph;
pub use pipeline::{ProjectOptions, ResolveOptions, Resolved, SyncReport};
pub use registry::{Package, Registry, RegistryFormat, SourceId, SubUnit};
pub use resolver::{resolve, Move, Resolution};
pub use scanner::{ProgressCallback, ScanIndex};
