//! Filesystem helpers shared by every component that touches disk
//!
//! - [`write_atomic`] writes through a sibling temporary file and renames it
//!   over the target, so readers only ever observe the old or the new content.
//! - [`is_symlink`] is the single filter applied at every directory/file
//!   enumeration point; case-compatibility symlinks must never be counted.
//! - [`read_text_lossy`] reads a text file, replacing invalid UTF-8.

use crate::{Error, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::DirEntry;

/// Outcome of a projection onto a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// The computed content equals the existing content; nothing was written
    Unchanged,
    /// The file was (or, in a dry run, would be) rewritten
    Written,
}

impl Change {
    pub fn is_written(self) -> bool {
        self == Change::Written
    }
}

/// Returns true when the path itself is a symbolic link (the link is not followed)
pub fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

/// `walkdir` filter: keep every entry that is not a symlink
pub fn not_symlink(entry: &DirEntry) -> bool {
    !entry.path_is_symlink()
}

/// Read a text file, replacing invalid UTF-8 sequences
pub fn read_text_lossy(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "modsync".to_string());
    path.with_file_name(format!(".{}.modsync.tmp", name))
}

/// Write `contents` to `path` atomically (temporary sibling, fsync, rename)
///
/// An existing file's permission bits carry over to the replacement. On
/// failure the temporary file is removed and the original is untouched.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = temp_sibling(path);
    let to_write_error = |source| Error::Write {
        path: path.to_path_buf(),
        source,
    };

    let result = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
        if let Ok(existing) = fs::metadata(path) {
            fs::set_permissions(&tmp, existing.permissions())?;
        }
        fs::rename(&tmp, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(to_write_error(e));
    }
    Ok(())
}

/// Write only when the content differs from what is on disk
pub fn write_if_changed(path: &Path, contents: &[u8], dry_run: bool) -> Result<Change> {
    if let Ok(existing) = fs::read(path) {
        if existing == contents {
            return Ok(Change::Unchanged);
        }
    }
    if !dry_run {
        write_atomic(path, contents)?;
    }
    Ok(Change::Written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("server.ini");
        fs::write(&path, "old").unwrap();

        write_atomic(&path, b"new").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        assert!(!temp_sibling(&path).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("servertest.ini");
        fs::write(&path, "Mods=\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        write_atomic(&path, b"Mods=\\tsarslib\n").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
        assert_eq!(fs::read_to_string(&path).unwrap(), "Mods=\\tsarslib\n");
    }

    #[test]
    fn test_write_atomic_missing_dir_fails_cleanly() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("server.ini");

        let err = write_atomic(&path, b"x").unwrap_err();
        assert!(matches!(err, Error::Write { .. }));
    }

    #[test]
    fn test_write_if_changed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mods.txt");

        assert_eq!(write_if_changed(&path, b"a\n", false).unwrap(), Change::Written);
        assert_eq!(write_if_changed(&path, b"a\n", false).unwrap(), Change::Unchanged);
        assert_eq!(write_if_changed(&path, b"b\n", true).unwrap(), Change::Written);
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_is_symlink() {
        let dir = TempDir::new().unwrap();
        let real = dir.path().join("Maps");
        fs::create_dir(&real).unwrap();
        let link = dir.path().join("maps");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        assert!(!is_symlink(&real));
        assert!(is_symlink(&link));
        assert!(!is_symlink(&dir.path().join("absent")));
    }

    #[test]
    fn test_read_text_lossy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mod.info");
        fs::write(&path, b"id=A\xff\n").unwrap();

        let text = read_text_lossy(&path).unwrap();
        assert!(text.starts_with("id=A"));
    }
}
