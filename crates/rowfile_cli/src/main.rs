//! rowfile CLI
//!
//! Command-line tools for inspecting and maintaining a SQLite-backed
//! rowfile store.
//!
//! # Commands
//!
//! - `list` - List stored files by extension
//! - `cat` - Write a file's bytes to stdout
//! - `stat` - Show size and chunk layout of a file
//! - `rm` - Delete a file
//! - `destroy` - Drop all rowfile tables

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// rowfile command-line store tools.
#[derive(Parser)]
#[command(name = "rowfile")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the SQLite database
    #[arg(global = true, short, long)]
    db: Option<PathBuf>,

    /// Table name prefix
    #[arg(global = true, long, default_value = "rowfile")]
    prefix: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored files with an extension
    List {
        /// Extension to list, without the dot
        #[arg(short, long, default_value = "")]
        extension: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Write a file's content to stdout
    Cat {
        /// File name
        name: String,
    },

    /// Show file size and chunk layout
    Stat {
        /// File name
        name: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Delete a file
    Rm {
        /// File name
        name: String,
    },

    /// Drop all tables of the store
    Destroy {
        /// Confirm the destruction
        #[arg(long)]
        yes: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("rowfile CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("rowfile core v{}", rowfile_core::VERSION);
        return Ok(());
    }

    let db = cli.db.ok_or("Database path required (--db)")?;
    let target = commands::Target::new(db, cli.prefix);

    match cli.command {
        Commands::List { extension, format } => {
            commands::list::run(&target, &extension, &format)?;
        }
        Commands::Cat { name } => {
            commands::cat::run(&target, &name)?;
        }
        Commands::Stat { name, format } => {
            commands::stat::run(&target, &name, &format)?;
        }
        Commands::Rm { name } => {
            commands::rm::run(&target, &name)?;
        }
        Commands::Destroy { yes } => {
            if !yes {
                return Err("refusing to destroy without --yes".into());
            }
            commands::destroy::run(&target)?;
        }
        Commands::Version => unreachable!("handled above"),
    }

    Ok(())
}
