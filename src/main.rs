//! StickShift - profile compiler for game-controller input remapping.
//!
//! Compiles declarative remapping profiles (virtual controls, shift
//! levels, actions) into the runtime documents the execution daemon
//! consumes.

use clap::{Parser, Subcommand};
use stickshift::cli::{CompileArgs, ExitCode, InspectArgs, NamesArgs, ValidateArgs};
use stickshift::constants::APP_NAME;

/// StickShift - profile compiler for game-controller input remapping
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile a profile into its runtime document
    Compile(CompileArgs),
    /// Validate a profile document
    Validate(ValidateArgs),
    /// Show a summary of a profile document
    Inspect(InspectArgs),
    /// List known key and axis names
    Names(NamesArgs),
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Compile(args) => args.execute(),
        Commands::Validate(args) => args.execute(),
        Commands::Inspect(args) => args.execute(),
        Commands::Names(args) => args.execute(),
    };

    match result {
        Ok(()) => std::process::exit(ExitCode::Success as i32),
        Err(error) => {
            eprintln!("{APP_NAME}: {error}");
            std::process::exit(error.exit_code() as i32);
        }
    }
}
