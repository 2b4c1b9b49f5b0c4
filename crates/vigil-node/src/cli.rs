use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Vigil - committee health and round coordination
#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Vigil devnet node and utilities")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a single-node devnet
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "vigil.json")]
        config: PathBuf,
    },

    /// Write a sample configuration
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "vigil.json")]
        output: PathBuf,
    },

    /// Generate a new keypair
    Keygen {
        /// Output file for secret key
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
