//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod check;
mod extract;
mod process;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use docflow::config::{Config, Settings};

#[derive(Parser)]
#[command(name = "docflow")]
#[command(about = "Extract text from PDF, slide decks and spreadsheets, with OCR")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true, env = "DOCFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Print the normalized text of a document
    Extract {
        /// Document to read (.pdf, .ppt/.pptx, .xls/.xlsx)
        file: PathBuf,
        /// Run OCR over embedded images
        #[arg(short, long)]
        scan_images: bool,
        /// Print a JSON report with status and diagnostics
        #[arg(long)]
        json: bool,
    },

    /// Extract text, extract topics and store the text
    Process {
        /// Documents to process
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Run OCR over embedded images
        #[arg(short, long)]
        scan_images: bool,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check OCR backends and the topic extraction service
    Check,
}

/// Load the config file named on the command line, or discover one.
async fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Ok(Config::load_from_path(&path).await?),
        None => Ok(Config::load().await),
    }
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config).await?;
    let settings = Settings::from_config(&config);

    match cli.command {
        Commands::Extract {
            file,
            scan_images,
            json,
        } => extract::cmd_extract(&settings, &file, scan_images, json).await,
        Commands::Process {
            files,
            scan_images,
            json,
        } => process::cmd_process(&settings, files, scan_images, json).await,
        Commands::Check => check::cmd_check(&settings, &config).await,
    }
}
