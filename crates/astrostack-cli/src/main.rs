mod commands;
mod progress;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "astrostack", about = "Deep-sky photo alignment and stacking tool")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Align frames to a reference frame and write an alignment file
    Align(commands::align::AlignArgs),
    /// Stack aligned frames into one image
    Stack(commands::stack::StackArgs),
    /// Combine dark or flat frames into a master calibration frame
    Master(commands::master::MasterArgs),
    /// Identify hot pixels from dark frames
    HotPixels(commands::hot_pixels::HotPixelsArgs),
    /// Print or save the default project config
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Align(args) => commands::align::run(args),
        Commands::Stack(args) => commands::stack::run(args),
        Commands::Master(args) => commands::master::run(args),
        Commands::HotPixels(args) => commands::hot_pixels::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
