//! voltile CLI - Command-line interface
//!
//! Drives the voltile tile cache over synthetic volumes: renders a slice
//! view, scrolls through slices with prefetching, and manages the
//! configuration file.

mod commands;
mod error;

use clap::{Parser, Subcommand};
use commands::config::ConfigCommands;
use commands::render::RenderArgs;

#[derive(Parser)]
#[command(name = "voltile")]
#[command(version = voltile::VERSION)]
#[command(about = "Tiled render cache for 5D volume slice views", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a slice of a synthetic volume and scroll through it
    Render(RenderArgs),

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Render(args) => commands::render::run(args),
        Commands::Config(command) => commands::config::run(command),
    };

    if let Err(e) = result {
        e.exit();
    }
}
