use anyhow::Result;
use modsync::pipeline;
use modsync::{ini, Config};
use std::path::PathBuf;

pub fn run(inputs: crate::InputArgs, ini_path: Option<PathBuf>, quiet: bool) -> Result<()> {
    let config = Config::load()?;
    let ini_path = super::optional_path(ini_path, &config.paths.ini)?;
    let options = super::resolve_options(inputs, &config, quiet)?;

    let resolved = pipeline::resolve(&options)?;

    println!("Activation order ({}):", resolved.order().len());
    for (position, id) in resolved.order().iter().enumerate() {
        println!("  {:>3}. {}", position + 1, id);
    }
    println!();

    if !resolved.resolution.moves().is_empty() {
        println!("Reordered to satisfy dependencies:");
        for moved in resolved.resolution.moves() {
            println!("  {}", moved);
        }
        println!();
    }

    let mut warnings = resolved.warnings.clone();
    if let Some(path) = ini_path {
        let text = ini::load(&path)?;
        let check = pipeline::check_maps(&resolved, &text, &config.projection);

        for (name, providers) in &check.duplicated {
            warnings.push(format!(
                "map '{}' is provided by more than one package: {}",
                name,
                providers.join(", ")
            ));
        }
        if !check.missing.is_empty() {
            super::print_warnings(&warnings);
            anyhow::bail!(
                "{} lists {} map(s) no active mod provides: {}",
                path.display(),
                check.missing.len(),
                check.missing.join("; ")
            );
        }
    }

    super::print_warnings(&warnings);
    println!("✓ No blocking conflicts");

    Ok(())
}
