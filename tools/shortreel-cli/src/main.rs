//! Shortreel CLI: assemble vertical short-form videos from scripts.
//!
//! Usage:
//!   shortreel render <SCRIPT>     Render a script to an MP4
//!   shortreel validate <SCRIPT>   Check a script without rendering
//!   shortreel check               Check ffmpeg, fonts, and the temp root
//!   shortreel init <PATH>         Write a sample script

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use shortreel_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "shortreel",
    about = "Assemble vertical short-form videos from JSON scripts",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a script into a video
    Render {
        /// Path to the script JSON
        script: PathBuf,

        /// Output file path (defaults to <output_dir>/<script id>.mp4)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output width
        #[arg(long)]
        width: Option<u32>,

        /// Output height
        #[arg(long)]
        height: Option<u32>,

        /// Output frame rate
        #[arg(long)]
        fps: Option<u32>,
    },

    /// Validate a script without rendering it
    Validate {
        /// Path to the script JSON
        script: PathBuf,
    },

    /// Check system capabilities
    Check,

    /// Write a sample script
    Init {
        /// Where to write the script
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load(),
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    // Initialize logging
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    shortreel_common::logging::init_logging(&logging)?;

    match cli.command {
        Commands::Render {
            script,
            output,
            width,
            height,
            fps,
        } => commands::render::run(config, script, output, width, height, fps).await,
        Commands::Validate { script } => commands::validate::run(&config, script),
        Commands::Check => commands::check::run(&config).await,
        Commands::Init { path, force } => commands::init::run(path, force),
    }
}
