use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use std::path::PathBuf;

mod commands;

/// modsync - resolve, check and project a Project Zomboid server's mod load set
#[derive(Parser)]
#[command(name = "modsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Show debug diagnostics
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only show warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Json,
    Blocks,
}

impl From<FormatArg> for modsync::RegistryFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Json => modsync::RegistryFormat::Json,
            FormatArg::Blocks => modsync::RegistryFormat::Blocks,
        }
    }
}

/// Registry and scan inputs shared by `sync` and `check`
#[derive(Args, Clone)]
struct InputArgs {
    /// Registry document (mods.json, or a mods.txt block document)
    #[arg(long)]
    registry: Option<PathBuf>,

    /// Registry format (default: json for *.json, blocks otherwise)
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Workshop content root containing one directory per workshop item
    #[arg(long)]
    scan_root: Option<PathBuf>,

    /// Skip workshop items missing under the scan root
    #[arg(long, conflicts_with = "strict")]
    lenient: bool,

    /// Fail when a workshop item is missing under the scan root
    #[arg(long)]
    strict: bool,

    /// Treat tiledef file number collisions as fatal
    #[arg(long)]
    fatal_namespace: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the load set and write it into the server INI
    Sync {
        #[command(flatten)]
        inputs: InputArgs,

        /// Server INI to rewrite
        #[arg(long)]
        ini: Option<PathBuf>,

        /// Block document (mods.txt) to keep in sync
        #[arg(long)]
        blocks: Option<PathBuf>,

        /// Write a spawn-regions Lua file for the active maps
        #[arg(long)]
        spawnregions: Option<PathBuf>,

        /// Also set PublicName= in the INI
        #[arg(long)]
        public_name: Option<String>,

        /// Leave the Map= key untouched
        #[arg(long)]
        no_map: bool,

        /// Show what would change without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Resolve and check for conflicts without writing anything
    Check {
        #[command(flatten)]
        inputs: InputArgs,

        /// Also check the INI's Map= entries against the active mods
        #[arg(long)]
        ini: Option<PathBuf>,
    },

    /// Verify the INI only lists mods and workshop items the registry enables
    Verify {
        /// Registry document
        #[arg(long)]
        registry: Option<PathBuf>,

        /// Registry format (default: json for *.json, blocks otherwise)
        #[arg(long, value_enum)]
        format: Option<FormatArg>,

        /// Server INI to verify
        #[arg(long)]
        ini: Option<PathBuf>,

        /// Also require every enabled mod and workshop item to be listed
        #[arg(long)]
        exact: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., policy.namespace_conflicts)
        key: String,
        /// Configuration value
        value: String,
    },

    /// Print the configuration file path
    Path,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        "debug".to_string()
    } else if cli.quiet {
        "warn".to_string()
    } else {
        modsync::Config::load()
            .map(|c| c.logging.level)
            .unwrap_or_else(|_| "info".to_string())
    };
    modsync::logging::init(&level);

    let result = match cli.command {
        Commands::Sync {
            inputs,
            ini,
            blocks,
            spawnregions,
            public_name,
            no_map,
            dry_run,
        } => commands::sync::run(commands::sync::SyncArgs {
            inputs,
            ini,
            blocks,
            spawnregions,
            public_name,
            no_map,
            dry_run,
            quiet: cli.quiet,
        }),
        Commands::Check { inputs, ini } => commands::check::run(inputs, ini, cli.quiet),
        Commands::Verify {
            registry,
            format,
            ini,
            exact,
        } => commands::verify::run(registry, format.map(Into::into), ini, exact),
        Commands::Config { action } => commands::config::run(&action),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "modsync", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        let code = e
            .downcast_ref::<modsync::Error>()
            .map(modsync::Error::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}
