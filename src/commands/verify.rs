use anyhow::Result;
use modsync::pipeline;
use modsync::{ini, Config, Registry, RegistryFormat};
use std::path::PathBuf;

fn print_list(title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("{} ({}):", title, items.len());
    for item in items {
        println!("  - {}", item);
    }
    println!();
}

pub fn run(
    registry: Option<PathBuf>,
    format: Option<RegistryFormat>,
    ini_path: Option<PathBuf>,
    exact: bool,
) -> Result<()> {
    let config = Config::load()?;
    let registry_path =
        super::require_path(registry, &config.paths.registry, "registry", "paths.registry")?;
    let ini_path = super::require_path(ini_path, &config.paths.ini, "server INI", "paths.ini")?;

    let registry = match format {
        Some(format) => Registry::load_as(&registry_path, format)?,
        None => Registry::load(&registry_path)?,
    };
    let text = ini::load(&ini_path)?;
    let coverage = pipeline::verify_coverage(&registry, &text, &config.projection);

    let mods_key = &config.projection.mods_key;
    let workshop_key = &config.projection.workshop_key;
    print_list(
        &format!("{}= entries not enabled in the registry", mods_key),
        &coverage.unknown_mods,
    );
    print_list(
        &format!("{}= entries not enabled in the registry", workshop_key),
        &coverage.unknown_items,
    );
    if exact {
        print_list(
            &format!("Enabled mods missing from {}=", mods_key),
            &coverage.missing_mods,
        );
        print_list(
            &format!("Enabled workshop items missing from {}=", workshop_key),
            &coverage.missing_items,
        );
    }

    if !coverage.is_ok(exact) {
        anyhow::bail!(
            "{} does not match the registry {}",
            ini_path.display(),
            registry_path.display()
        );
    }

    println!(
        "✓ {} matches the registry{}",
        ini_path.display(),
        if exact { " exactly" } else { "" }
    );
    Ok(())
}
