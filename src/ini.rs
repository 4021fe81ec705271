//! Minimal-diff rewrite of the server INI
//!
//! A target key's line is replaced by a single `Key=value` line. Any
//! continuation lines of the old value (non-blank, not `#` comments, not
//! themselves `Key=` assignments) are dropped with it. Every other line is
//! kept byte for byte; keys never seen are appended in the given order.

use crate::fsutil::{self, Change};
use crate::{Error, Result};
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

fn assignment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*([A-Za-z][A-Za-z0-9_]*)\s*=").expect("valid regex"))
}

/// Key of an assignment line, as written
fn assigned_key(line: &str) -> Option<&str> {
    assignment_re()
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn is_continuation(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && !trimmed.starts_with('#') && assigned_key(line).is_none()
}

fn line_ending(line: &str) -> &'static str {
    if line.ends_with("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

/// Rewrite `updates` (key, value) in `text`
///
/// Keys match case-insensitively; the replacement uses the caller's spelling.
/// A key assigned more than once keeps only its first line. NUL bytes are
/// stripped first. Applying the same updates twice yields identical output.
pub fn rewrite_keys(text: &str, updates: &[(String, String)]) -> String {
    let text = text.replace('\0', "");
    let target = |key: &str| {
        updates
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(key))
    };

    let mut out = String::with_capacity(text.len());
    let mut written: HashSet<usize> = HashSet::new();
    let mut skipping = false;

    for line in text.split_inclusive('\n') {
        if skipping {
            if is_continuation(line) {
                continue;
            }
            skipping = false;
        }

        match assigned_key(line).and_then(target) {
            Some(idx) => {
                if written.insert(idx) {
                    let (key, value) = &updates[idx];
                    out.push_str(key);
                    out.push('=');
                    out.push_str(value);
                    out.push_str(line_ending(line));
                }
                skipping = true;
            }
            None => out.push_str(line),
        }
    }

    for (idx, (key, value)) in updates.iter().enumerate() {
        if written.contains(&idx) {
            continue;
        }
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(key);
        out.push('=');
        out.push_str(value);
        out.push('\n');
    }

    out
}

/// Value of `key`, with continuation lines joined by `;`
pub fn read_value(text: &str, key: &str) -> Option<String> {
    let mut lines = text.lines().map(|l| l.trim_end_matches('\0'));
    while let Some(line) = lines.next() {
        if !assigned_key(line).is_some_and(|k| k.eq_ignore_ascii_case(key)) {
            continue;
        }
        let mut value = line
            .split_once('=')
            .map(|(_, v)| v.trim().to_string())
            .unwrap_or_default();
        for next in lines.by_ref() {
            if !is_continuation(next) {
                break;
            }
            if !value.is_empty() && !value.ends_with(';') {
                value.push(';');
            }
            value.push_str(next.trim());
        }
        return Some(value);
    }
    None
}

/// Split a list value on `;`, dropping blanks and leading backslashes
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(|item| item.trim().trim_start_matches('\\').trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Read the INI file; it must exist
pub fn load(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(Error::MissingInput {
            what: "server INI",
            path: path.to_path_buf(),
        });
    }
    fsutil::read_text_lossy(path)
}

/// Write the rewritten INI back, atomically and only when it changed
pub fn save(path: &Path, text: &str, dry_run: bool) -> Result<Change> {
    fsutil::write_if_changed(path, text.as_bytes(), dry_run)
}
