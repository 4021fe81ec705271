use anyhow::Result;
use modsync::config::SETTABLE_KEYS;
use modsync::Config;

pub fn run(action: &crate::ConfigAction) -> Result<()> {
    use crate::ConfigAction;

    match action {
        ConfigAction::Show => show_config(),
        ConfigAction::Set { key, value } => set_config(key, value),
        ConfigAction::Path => {
            println!("{}", Config::default_path()?.display());
            Ok(())
        }
    }
}

fn show_config() -> Result<()> {
    let config = Config::load()?;
    let config_path = Config::default_path()?;

    println!("# {}", config_path.display());
    if !config_path.exists() {
        println!("# (file not found, showing defaults)");
    }
    println!();
    print!("{}", toml::to_string_pretty(&config)?);
    println!();
    println!("# Modify settings:");
    println!("#   modsync config set <key> <value>");
    println!("#");
    println!("# Available keys:");
    for key in SETTABLE_KEYS {
        println!("#   {}", key);
    }

    Ok(())
}

fn set_config(key: &str, value: &str) -> Result<()> {
    let mut config = Config::load()?;
    config.set(key, value)?;
    config.save()?;

    if value.is_empty() {
        println!("✓ {} = <cleared>", key);
    } else {
        println!("✓ {} = \"{}\"", key, value);
    }
    Ok(())
}
