// src/cli.rs

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file (TOML); `GVA_*` environment variables override it
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging for this crate
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze a local folder, or list the repositories beneath it
    Analyze {
        path: PathBuf,

        /// Number of recent commits to report
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Extract an archive into the work directory
    Extract {
        archive: PathBuf,

        /// Analyze the extracted tree
        #[arg(short, long)]
        analyze: bool,

        #[arg(long)]
        json: bool,
    },

    /// Show size and type of an archive without extracting it
    ArchiveInfo { archive: PathBuf },

    /// Clone a repository into the clone cache and analyze it
    Clone {
        url: String,

        /// Display name, defaults to the last URL segment
        #[arg(short, long)]
        name: Option<String>,

        /// Fetch the whole history instead of depth 1
        #[arg(long)]
        full: bool,

        /// Keep the clone after analysis
        #[arg(long)]
        keep: bool,

        #[arg(long)]
        json: bool,
    },

    /// Remove one cached clone, or all of them
    Cleanup {
        path: Option<PathBuf>,

        #[arg(long, conflicts_with = "path")]
        all: bool,
    },

    /// Run the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Sign in with GitHub, manually, or as a guest
    Login {
        #[arg(long, conflicts_with = "manual")]
        guest: bool,

        #[arg(long)]
        manual: bool,

        #[arg(long, requires = "manual")]
        email: Option<String>,

        /// GitHub username for a manual login
        #[arg(long, requires = "manual")]
        github: Option<String>,
    },

    /// Forget the persisted identity
    Logout,

    /// Show the persisted identity
    Whoami,

    /// Prompt for a folder or archive and analyze it
    Interactive,
}
