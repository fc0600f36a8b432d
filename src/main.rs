mod core;
mod decoder;
mod renderer;
mod shared;
mod sync;
mod ui;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;

use crate::core::config::{AppConfig, ConfigOverrides};
use crate::decoder::{CameraSource, SyntheticSource, VideoSource};
use crate::renderer::DisplayManager;
use crate::utils::logger;

#[derive(Parser)]
#[command(author, version, about = "Live camera feed as falling-rain character art", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the camera feed in the terminal
    Live {
        #[command(flatten)]
        overrides: ConfigOverrides,
    },
    /// Render a moving test pattern, no camera needed
    Demo {
        #[command(flatten)]
        overrides: ConfigOverrides,
    },
    /// Print a single frame to stdout and exit (test pattern unless --camera is given)
    Snapshot {
        #[command(flatten)]
        overrides: ConfigOverrides,
    },
    /// Print the effective configuration as JSON
    PrintConfig {
        #[command(flatten)]
        overrides: ConfigOverrides,
    },
    /// Query the terminal size as crossterm sees it
    TerminalSize,
}

fn init_thread_pool(config: &AppConfig) -> Result<()> {
    let threads = config.threads.unwrap_or_else(num_cpus::get);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("render-{}", i))
        .build_global()
        .context("Failed to build render thread pool")?;
    logger::debug(&format!("Render pool: {} threads", threads));
    Ok(())
}

fn camera_source(config: &AppConfig) -> Box<dyn VideoSource> {
    let resolution = config.resolution();
    Box::new(CameraSource::new(
        config.camera_index,
        resolution.width,
        resolution.height,
    ))
}

fn synthetic_source(config: &AppConfig) -> Box<dyn VideoSource> {
    let resolution = config.resolution();
    Box::new(SyntheticSource::new(resolution.width, resolution.height))
}

fn main() -> Result<()> {
    logger::init();

    // Reset terminal state left over from a previous crash
    let _ = crossterm::terminal::disable_raw_mode();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Live { overrides } => {
            let config = overrides.resolve()?;
            init_thread_pool(&config)?;
            ui::interactive::run_live(&config, camera_source(&config))?;
        }
        Commands::Demo { overrides } => {
            let config = overrides.resolve()?;
            init_thread_pool(&config)?;
            ui::interactive::run_live(&config, synthetic_source(&config))?;
        }
        Commands::Snapshot { overrides } => {
            let config = overrides.resolve()?;
            init_thread_pool(&config)?;
            let source = if overrides.camera.is_some() {
                camera_source(&config)
            } else {
                synthetic_source(&config)
            };
            let mut out = ui::interactive::run_snapshot(&config, source, std::io::stdout().lock())?;
            out.flush()?;
        }
        Commands::PrintConfig { overrides } => {
            let config = overrides.resolve()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::TerminalSize => {
            let (cols, rows) = DisplayManager::terminal_size_chars()?;
            println!("{}x{}", cols, rows);
        }
    }

    Ok(())
}
