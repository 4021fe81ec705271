pub mod check;
pub mod config;
pub mod sync;
pub mod verify;

use crate::InputArgs;
use indicatif::{ProgressBar, ProgressStyle};
use modsync::config::expand_path;
use modsync::conflicts::Severity;
use modsync::pipeline::ResolveOptions;
use modsync::{Config, ProgressCallback};
use std::path::PathBuf;
use std::sync::Arc;

/// A path from the command line, else from config, else a usage error
pub(crate) fn require_path(
    flag: Option<PathBuf>,
    configured: &Option<String>,
    what: &str,
    config_key: &str,
) -> modsync::Result<PathBuf> {
    optional_path(flag, configured)?.ok_or_else(|| {
        modsync::Error::Usage(format!(
            "No {} given. Pass --{} or run: modsync config set {} <path>",
            what,
            config_key.rsplit('.').next().unwrap_or(config_key).replace('_', "-"),
            config_key
        ))
    })
}

pub(crate) fn optional_path(
    flag: Option<PathBuf>,
    configured: &Option<String>,
) -> modsync::Result<Option<PathBuf>> {
    match (flag, configured) {
        (Some(path), _) => Ok(Some(path)),
        (None, Some(raw)) => expand_path(raw).map(Some),
        (None, None) => Ok(None),
    }
}

/// Merge command line inputs over the configured defaults
pub(crate) fn resolve_options(
    inputs: InputArgs,
    config: &Config,
    quiet: bool,
) -> modsync::Result<ResolveOptions> {
    let registry = require_path(
        inputs.registry,
        &config.paths.registry,
        "registry",
        "paths.registry",
    )?;
    let scan_root = require_path(
        inputs.scan_root,
        &config.paths.scan_root,
        "scan root",
        "paths.scan_root",
    )?;

    let strict = if inputs.strict {
        true
    } else if inputs.lenient {
        false
    } else {
        config.policy.strict_inputs
    };
    let namespace_conflicts = if inputs.fatal_namespace {
        Severity::Fatal
    } else {
        config.policy.namespace_conflicts
    };

    Ok(ResolveOptions {
        registry,
        format: inputs.format.map(Into::into),
        scan_root,
        strict,
        namespace_conflicts,
        require_mod_ids: config.policy.require_mod_ids,
        require_workshop_ids: config.policy.require_workshop_ids,
        progress: if quiet { None } else { Some(scan_progress()) },
    })
}

/// Progress bar over the workshop items being scanned
fn scan_progress() -> ProgressCallback {
    let bar = ProgressBar::new(0);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
    {
        bar.set_style(style.progress_chars("=> "));
    }

    Arc::new(move |msg: &str, current: u64, total: u64| {
        bar.set_length(total);
        bar.set_position(current);
        if current >= total {
            bar.finish_and_clear();
        } else {
            bar.set_message(msg.to_string());
        }
    })
}

pub(crate) fn print_warnings(warnings: &[String]) {
    if warnings.is_empty() {
        return;
    }
    println!("Warnings:");
    for warning in warnings {
        println!("  ⚠ {}", warning);
    }
    println!();
}
