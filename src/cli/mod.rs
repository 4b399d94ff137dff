use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Create a new package from specified files and directories.
    #[command(alias = "p")]
    Pack {
        /// One or more input files or directories to add to the package.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// The path for the output package file (e.g., tree.pkg).
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Unpack a package into a directory.
    #[command(alias = "x")]
    Unpack {
        /// The package file to unpack.
        #[arg(required = true)]
        archive: PathBuf,

        /// The directory entries are recreated in. Defaults to the current directory.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the contents of a package without unpacking it.
    #[command(alias = "l")]
    List {
        /// The package file to list contents of.
        #[arg(required = true)]
        archive: PathBuf,
    },
}

/// Parses command-line arguments using `clap` and returns the command to execute.
///
/// This is the main entry point for the CLI logic.
/// It handles parsing and returns a `Commands` enum variant, or an error if parsing fails.
pub fn run() -> Result<Commands, Box<dyn std::error::Error>> {
    let args = Args::parse();
    Ok(args.command)
}
