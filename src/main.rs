//! Main entry point for the dirpak CLI app

use dirpak::cli::{self, Commands};
use dirpak::{extract, pack};

fn main() -> std::process::ExitCode {
    if let Err(e) = run_app() {
        if e.downcast_ref::<clap::Error>().is_none() {
            eprintln!("Error: {}", e);
        }
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

fn run_app() -> Result<(), Box<dyn std::error::Error>> {
    let command = cli::run()?;

    match &command {
        Commands::Pack { inputs, output } => {
            pack::create_package(output, inputs)?;
        }
        Commands::Unpack { archive, output } => {
            let out_dir = match output {
                Some(path) => path.clone(),
                None => std::env::current_dir()?,
            };
            extract::unpack_package(archive, &out_dir)?;
        }
        Commands::List { archive } => {
            extract::list_package(archive)?;
        }
    }

    Ok(())
}
