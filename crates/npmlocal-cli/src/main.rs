#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

mod commands;
mod logging;

use clap::Parser;
use miette::Result;
use npmlocal_core::{Config, InstallMode, DEFAULT_INSTALL_DIR};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "npmlocal")]
#[command(author, version, about = "Install local packages by copy or symlink", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Options shared by `add` and `install`.
#[derive(clap::Args, Debug)]
struct InstallArgs {
    /// Project receiving the packages
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    project_dir: PathBuf,

    /// Install directory, relative to the project
    #[arg(short, long, value_name = "DIR", default_value = DEFAULT_INSTALL_DIR)]
    install_dir: String,

    /// Install mode for packages without a `copy:`/`link:` prefix
    #[arg(short, long, value_parser = parse_mode)]
    mode: Option<InstallMode>,

    /// Reinstall even when the recorded version is current
    #[arg(short, long)]
    force: bool,

    /// Keep installed packages in sync until Ctrl-C
    #[arg(short, long)]
    watch: bool,

    /// Look for package.json in parent directories
    #[arg(long)]
    find_up: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Install local packages: `[copy:|link:]<path>[@<version>]`
    Add {
        /// Packages to install
        #[arg(required = true, value_name = "PACKAGE")]
        packages: Vec<String>,

        #[command(flatten)]
        args: InstallArgs,
    },

    /// Install the given packages, or reinstall those recorded in package.json
    Install {
        /// Packages to install (default: `local.dependencies` of package.json)
        #[arg(value_name = "PACKAGE")]
        packages: Vec<String>,

        #[command(flatten)]
        args: InstallArgs,
    },

    /// Copy `local.dependencies` into `dependencies` as `^<version>`
    #[command(name = "local-to-npm", alias = "transfer")]
    LocalToNpm {
        /// Project to update
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        project_dir: PathBuf,

        /// Look for package.json in parent directories
        #[arg(long)]
        find_up: bool,
    },
}

fn parse_mode(s: &str) -> Result<InstallMode, String> {
    s.parse().map_err(|e: npmlocal_core::Error| e.to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine working directory
    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::new(cwd)
        .with_verbosity(cli.verbose)
        .with_quiet(cli.quiet)
        .with_json(cli.json);

    logging::init(&config);

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(config.json),
        Some(Commands::Add { packages, args } | Commands::Install { packages, args }) => {
            let action = commands::install::InstallAction {
                project_dir: args.project_dir,
                packages,
                install_dir: args.install_dir,
                mode: args.mode,
                force: args.force,
                watch: args.watch,
                find_up: args.find_up,
                verbose: config.verbosity,
            };
            commands::install::run(action, &config.cwd, config.json)
        }
        Some(Commands::LocalToNpm {
            project_dir,
            find_up,
        }) => commands::local_to_npm::run(&project_dir, find_up, &config.cwd, config.json),
    }
}
