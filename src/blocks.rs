//! Block-format load-set document (`mods.txt`)
//!
//! The document groups sub-units by the package that ships them:
//!
//! ```text
//! Workshop ID: 2392709985      <- starts a block
//! Mod ID: tsarslib             <- zero or more entries
//! ---                          <- ends the block
//! ```
//!
//! Blank lines and `#` comments are ignored. `Header:` / `Entry:` are accepted
//! as synonyms. Entries that appear outside any block form the orphan section,
//! which is kept at the end of the file under a comment marker.
//!
//! Removing a block is the operator's way to stop tracking a package; a
//! rewrite never drops a block on its own, even when it has no entries left.

use crate::fsutil::{self, Change};
use crate::registry::{normalize_unit_id, SourceId};
use crate::{Error, Result};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;

/// Comment line that introduces the orphan section
pub const ORPHAN_MARKER: &str = "# Mod IDs not yet attributed to any downloaded workshop item";

/// Block terminator line
pub const TERMINATOR: &str = "---";

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:workshop\s+id|header)\s*:\s*(\S+)").expect("valid regex")
    })
}

fn entry_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(?:mod\s+id|entry)\s*:\s*(.+)").expect("valid regex"))
}

/// One package block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub source_id: SourceId,
    pub entries: Vec<String>,
}

/// Parsed block-format document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockDocument {
    pub blocks: Vec<Block>,
    /// Entries not attributable to any block
    pub orphans: Vec<String>,
}

impl BlockDocument {
    /// Parse document text
    ///
    /// A repeated header continues the earlier block of the same package.
    pub fn parse(text: &str) -> Result<Self> {
        let mut doc = BlockDocument::default();
        let mut current: Option<usize> = None;

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim_matches(|c: char| c.is_whitespace() || c == '\0');
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line == TERMINATOR {
                current = None;
                continue;
            }

            if let Some(caps) = header_re().captures(line) {
                let source_id = caps[1].parse::<SourceId>().map_err(|_| Error::SchemaViolation {
                    location: format!("line {}", index + 1),
                    message: format!("'{}' is not a numeric workshop id", &caps[1]),
                })?;
                current = Some(match doc.blocks.iter().position(|b| b.source_id == source_id) {
                    Some(existing) => existing,
                    None => {
                        doc.blocks.push(Block {
                            source_id,
                            entries: Vec::new(),
                        });
                        doc.blocks.len() - 1
                    }
                });
                continue;
            }

            if let Some(caps) = entry_re().captures(line) {
                let id = normalize_unit_id(&caps[1]);
                if id.is_empty() {
                    continue;
                }
                let entries = match current {
                    Some(i) => &mut doc.blocks[i].entries,
                    None => &mut doc.orphans,
                };
                if !entries.contains(&id) {
                    entries.push(id);
                }
                continue;
            }

            tracing::debug!(line = index + 1, "ignoring unrecognised line in block document");
        }

        Ok(doc)
    }

    /// Load a block document from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::MissingInput {
                what: "block document",
                path: path.to_path_buf(),
            });
        }
        Self::parse(&fsutil::read_text_lossy(path)?)
    }

    /// Load a block document, treating a missing file as empty
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Canonical text form
    pub fn render(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        for block in &self.blocks {
            lines.push(format!("Workshop ID: {}", block.source_id));
            lines.extend(block.entries.iter().map(|id| format!("Mod ID: {}", id)));
            lines.push(TERMINATOR.to_string());
            lines.push(String::new());
        }
        if !self.orphans.is_empty() {
            lines.push(ORPHAN_MARKER.to_string());
            lines.extend(self.orphans.iter().map(|id| format!("Mod ID: {}", id)));
            lines.push(TERMINATOR.to_string());
            lines.push(String::new());
        }

        let mut text = lines.join("\n").trim_end_matches('\n').to_string();
        text.push('\n');
        text
    }

    /// Write the canonical form, skipping the write when it is byte-identical
    pub fn save_to<P: AsRef<Path>>(&self, path: P, dry_run: bool) -> Result<Change> {
        fsutil::write_if_changed(path.as_ref(), self.render().as_bytes(), dry_run)
    }

    /// All source IDs with a block, in document order
    pub fn source_ids(&self) -> Vec<SourceId> {
        self.blocks.iter().map(|b| b.source_id).collect()
    }
}

/// Result of projecting an activation order onto a block document
#[derive(Debug, Clone)]
pub struct BlockRewrite {
    pub document: BlockDocument,
    /// Empty blocks whose package is not on disk
    pub warnings: Vec<String>,
}

/// Inputs for [`rewrite`]
pub struct BlockInputs<'a> {
    /// Registry packages that must have a block (appended when absent)
    pub packages: &'a [SourceId],
    /// Final activation order
    pub order: &'a [String],
    /// Owning package of each sub-unit (scanned owner first, declared second)
    pub owners: &'a HashMap<String, SourceId>,
    /// Packages whose content directory exists on disk
    pub on_disk: &'a HashSet<SourceId>,
}

/// Rebuild a block document from the resolved activation order
///
/// Only sub-units present in `order` are written, so content discovered on
/// disk but never declared is never added. Every existing block survives,
/// possibly empty.
pub fn rewrite(existing: &BlockDocument, inputs: &BlockInputs<'_>) -> BlockRewrite {
    let mut ids = existing.source_ids();
    for source_id in inputs.packages {
        if !ids.contains(source_id) {
            ids.push(*source_id);
        }
    }
    let known: HashSet<SourceId> = ids.iter().copied().collect();

    let mut grouped: HashMap<SourceId, Vec<String>> = HashMap::new();
    let mut orphans = Vec::new();
    for unit in inputs.order {
        match inputs.owners.get(unit).filter(|owner| known.contains(owner)) {
            Some(owner) => grouped.entry(*owner).or_default().push(unit.clone()),
            None => orphans.push(unit.clone()),
        }
    }

    let mut warnings = Vec::new();
    let blocks = ids
        .into_iter()
        .map(|source_id| {
            let entries = grouped.remove(&source_id).unwrap_or_default();
            if entries.is_empty() && !inputs.on_disk.contains(&source_id) {
                warnings.push(format!(
                    "Workshop ID {}: empty block, not in cache - remove its block to stop tracking it",
                    source_id
                ));
            }
            Block { source_id, entries }
        })
        .collect();

    BlockRewrite {
        document: BlockDocument { blocks, orphans },
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
# Server mods
Workshop ID: 2392709985
Mod ID: tsarslib
---

Workshop ID: 2169435993
Mod ID: modoptions
mod id: \\ModManager
---

Header: 3000000002
---
";

    fn owners(pairs: &[(&str, SourceId)]) -> HashMap<String, SourceId> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_parse_blocks() {
        let doc = BlockDocument::parse(SAMPLE).unwrap();

        assert_eq!(doc.blocks.len(), 3);
        assert_eq!(doc.blocks[0].entries, vec!["tsarslib"]);
        assert_eq!(doc.blocks[1].entries, vec!["modoptions", "ModManager"]);
        assert!(doc.blocks[2].entries.is_empty());
        assert!(doc.orphans.is_empty());
    }

    #[test]
    fn test_parse_orphans_and_repeated_headers() {
        let text = "Mod ID: Early\nWorkshop ID: 1\nEntry: A\n---\nWorkshop ID: 1\nMod ID: B\nMod ID: A\n---\n# trailing\nMod ID: Late\n";
        let doc = BlockDocument::parse(text).unwrap();

        assert_eq!(doc.blocks.len(), 1);
        assert_eq!(doc.blocks[0].entries, vec!["A", "B"]);
        assert_eq!(doc.orphans, vec!["Early", "Late"]);
    }

    #[test]
    fn test_parse_rejects_non_numeric_header() {
        let err = BlockDocument::parse("Workshop ID: 12\n---\nWorkshop ID: abc\n").unwrap_err();
        match err {
            Error::SchemaViolation { location, .. } => assert_eq!(location, "line 3"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_render_is_canonical() {
        let doc = BlockDocument::parse(SAMPLE).unwrap();
        let rendered = doc.render();

        assert_eq!(
            rendered,
            "Workshop ID: 2392709985\nMod ID: tsarslib\n---\n\n\
             Workshop ID: 2169435993\nMod ID: modoptions\nMod ID: ModManager\n---\n\n\
             Workshop ID: 3000000002\n---\n"
        );
        assert_eq!(BlockDocument::parse(&rendered).unwrap(), doc);
    }

    #[test]
    fn test_render_orphans() {
        let doc = BlockDocument {
            blocks: vec![],
            orphans: vec!["X".to_string()],
        };
        assert_eq!(doc.render(), format!("{}\nMod ID: X\n---\n", ORPHAN_MARKER));
    }

    #[test]
    fn test_rewrite_reorders_and_drops_unresolved() {
        let existing = BlockDocument::parse("Workshop ID: 1\nMod ID: B\nMod ID: A\nMod ID: Gone\n---\n").unwrap();
        let order = vec!["A".to_string(), "B".to_string()];
        let owners = owners(&[("A", 1), ("B", 1), ("Gone", 1)]);
        let on_disk = HashSet::from([1]);

        let result = rewrite(
            &existing,
            &BlockInputs {
                packages: &[1],
                order: &order,
                owners: &owners,
                on_disk: &on_disk,
            },
        );
        assert_eq!(result.document.blocks[0].entries, vec!["A", "B"]);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_rewrite_never_adds_undeclared_units() {
        // "Extra" is owned by package 1 on disk but not part of the order
        let existing = BlockDocument::parse("Workshop ID: 1\nMod ID: A\n---\n").unwrap();
        let order = vec!["A".to_string()];
        let owners = owners(&[("A", 1), ("Extra", 1)]);
        let on_disk = HashSet::from([1]);

        let result = rewrite(
            &existing,
            &BlockInputs {
                packages: &[1],
                order: &order,
                owners: &owners,
                on_disk: &on_disk,
            },
        );
        assert_eq!(result.document.blocks[0].entries, vec!["A"]);
    }

    #[test]
    fn test_rewrite_preserves_empty_blocks() {
        let existing = BlockDocument::parse("Workshop ID: 1\nMod ID: A\n---\nWorkshop ID: 2\n---\n").unwrap();
        let order = vec!["A".to_string()];
        let owners = owners(&[("A", 1)]);
        let on_disk = HashSet::from([1]);

        let first = rewrite(
            &existing,
            &BlockInputs {
                packages: &[1],
                order: &order,
                owners: &owners,
                on_disk: &on_disk,
            },
        );
        assert_eq!(first.document.blocks.len(), 2);
        assert!(first.document.blocks[1].entries.is_empty());
        assert_eq!(first.warnings.len(), 1);
        assert!(first.warnings[0].contains("Workshop ID 2"));

        // A second pass over the rewritten document is stable
        let second = rewrite(
            &first.document,
            &BlockInputs {
                packages: &[1],
                order: &order,
                owners: &owners,
                on_disk: &on_disk,
            },
        );
        assert_eq!(second.document.render(), first.document.render());
    }

    #[test]
    fn test_rewrite_moves_unowned_units_to_orphans() {
        let existing = BlockDocument::parse("Workshop ID: 1\nMod ID: A\n---\nMod ID: Stray\n").unwrap();
        let order = vec!["A".to_string(), "Stray".to_string()];
        let owners = owners(&[("A", 1), ("Stray", 99)]);
        let on_disk = HashSet::from([1]);

        let result = rewrite(
            &existing,
            &BlockInputs {
                packages: &[],
                order: &order,
                owners: &owners,
                on_disk: &on_disk,
            },
        );
        assert_eq!(result.document.orphans, vec!["Stray"]);
        assert!(result.document.render().contains(ORPHAN_MARKER));
    }

    #[test]
    fn test_save_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mods.txt");
        let doc = BlockDocument::parse(SAMPLE).unwrap();

        assert_eq!(doc.save_to(&path, false).unwrap(), Change::Written);
        assert_eq!(doc.save_to(&path, false).unwrap(), Change::Unchanged);
        assert_eq!(fs::read_to_string(&path).unwrap(), doc.render());
    }

    #[test]
    fn test_load_missing() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            BlockDocument::load(dir.path().join("mods.txt")),
            Err(Error::MissingInput { .. })
        ));
        assert_eq!(
            BlockDocument::load_or_default(dir.path().join("mods.txt")).unwrap(),
            BlockDocument::default()
        );
    }
}
