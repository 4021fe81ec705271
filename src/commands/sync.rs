use anyhow::Result;
use modsync::pipeline::{self, ProjectOptions};
use modsync::{Change, Config, RegistryFormat};
use std::path::{Path, PathBuf};

pub struct SyncArgs {
    pub inputs: crate::InputArgs,
    pub ini: Option<PathBuf>,
    pub blocks: Option<PathBuf>,
    pub spawnregions: Option<PathBuf>,
    pub public_name: Option<String>,
    pub no_map: bool,
    pub dry_run: bool,
    pub quiet: bool,
}

fn describe(change: Change, dry_run: bool) -> &'static str {
    match (change, dry_run) {
        (Change::Unchanged, _) => "unchanged",
        (Change::Written, false) => "updated",
        (Change::Written, true) => "would update",
    }
}

fn print_change(label: &str, path: &Path, change: Change, dry_run: bool) {
    println!("  {:<16} {} ({})", label, describe(change, dry_run), path.display());
}

pub fn run(args: SyncArgs) -> Result<()> {
    let config = Config::load()?;

    let ini = super::require_path(args.ini, &config.paths.ini, "server INI", "paths.ini")?;
    let blocks = super::optional_path(args.blocks, &config.paths.blocks)?;
    let spawnregions = super::optional_path(args.spawnregions, &config.paths.spawnregions)?;

    let mut projection = config.projection.clone();
    if args.no_map {
        projection.write_map = false;
    }
    if args.public_name.is_some() {
        projection.public_name = args.public_name;
    }

    let resolve_options = super::resolve_options(args.inputs, &config, args.quiet)?;
    let project_options = ProjectOptions {
        ini: ini.clone(),
        blocks: blocks.clone(),
        spawnregions: spawnregions.clone(),
        projection,
        dry_run: args.dry_run,
    };

    let resolved = pipeline::resolve(&resolve_options)?;
    let report = pipeline::project(&resolved, &project_options)?;

    println!(
        "Resolved {} mod{} from {} workshop item{}",
        report.order.len(),
        if report.order.len() == 1 { "" } else { "s" },
        report.workshop_items.len(),
        if report.workshop_items.len() == 1 { "" } else { "s" }
    );
    println!();

    if !report.moves.is_empty() {
        println!("Reordered to satisfy dependencies:");
        for moved in &report.moves {
            println!("  {}", moved);
        }
        println!();
    }

    super::print_warnings(&report.warnings);

    println!("Outputs:");
    print_change("Server INI", &ini, report.ini, report.dry_run);
    if let Some(change) = report.blocks {
        let path = blocks.as_ref().unwrap_or(&resolved.registry_path);
        print_change("Block document", path, change, report.dry_run);
    }
    if let (Some(change), Some(path)) = (report.spawnregions, spawnregions.as_ref()) {
        print_change("Spawn regions", path, change, report.dry_run);
    }
    if resolved.registry.format == RegistryFormat::Json {
        print_change("Registry", &resolved.registry_path, report.registry, report.dry_run);
    }
    println!();

    if report.dry_run {
        println!("Dry run: nothing was written.");
    } else if report.changed() {
        println!("✓ Sync complete");
    } else {
        println!("✓ No changes");
    }

    Ok(())
}
