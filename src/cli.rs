use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "chronovault")]
#[command(version, about = "Chronovault - open time-locked capsules sealed on chain", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start an interactive session with the vault keeper
    Chat,

    /// Look up a single capsule and report whether it can be opened
    Lookup {
        /// Capsule id
        id: u64,
    },

    /// Encrypt a payload so it can be pinned to storage and sealed in a capsule
    Seal {
        /// File to encrypt
        file: PathBuf,

        /// Password that will open the capsule
        #[arg(short, long)]
        password: String,

        /// Output file (defaults to <file>.sealed)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Write a default configuration file
    Init {
        /// Directory to initialize (defaults to current directory)
        path: Option<PathBuf>,
    },
}
