//! scenecast CLI - metadata extraction and MP4 rendering for `.blend` files
//!
//! Every invocation ends with exactly one JSON record on stderr and an exit
//! code that encodes the outcome.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use scenecast_cli::commands;
use scenecast_cli::logging;
use scenecast_engine::progress::DEFAULT_PROGRESS_PATH;
use scenecast_engine::render::DEFAULT_OUTPUT_PATH;
use scenecast_engine::{BlenderEngineConfig, RenderConfig};

/// Default input file for commands that take a `.blend` path.
const DEFAULT_INPUT_PATH: &str = "/tmp/uploaded.blend";

/// scenecast - crash-tolerant Blender scene inspection and rendering
#[derive(Parser)]
#[command(name = "scenecast")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the Blender executable
    #[arg(long, global = true, env = "BLENDER_PATH")]
    blender: Option<PathBuf>,

    /// Path to the Blender bridge script (default: embedded copy)
    #[arg(long, global = true, env = "SCENECAST_BLENDER_BRIDGE")]
    bridge: Option<PathBuf>,

    /// Log filter directive, e.g. `debug` (default: logging off)
    #[arg(long, global = true, env = "SCENECAST_LOG")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract frame range and frame rate from a .blend file
    Extract {
        /// Path to the .blend file
        #[arg(default_value = DEFAULT_INPUT_PATH)]
        path: PathBuf,
    },

    /// Render the animation of a .blend file to MP4
    Render {
        /// Path to the .blend file
        #[arg(default_value = DEFAULT_INPUT_PATH)]
        path: PathBuf,

        /// Output video path
        #[arg(short, long, default_value = DEFAULT_OUTPUT_PATH)]
        output: PathBuf,

        /// Progress file kept current during the render
        #[arg(long, default_value = DEFAULT_PROGRESS_PATH)]
        progress_file: PathBuf,
    },

    /// Inspect the raw header of a .blend file without starting Blender
    Header {
        /// Path to the .blend file
        #[arg(default_value = DEFAULT_INPUT_PATH)]
        path: PathBuf,
    },

    /// Print the current render progress record
    Progress {
        /// Progress file written by `render`
        #[arg(long, default_value = DEFAULT_PROGRESS_PATH)]
        progress_file: PathBuf,
    },
}

impl Cli {
    fn engine_config(&self) -> BlenderEngineConfig {
        let mut config = BlenderEngineConfig::default();
        if let Some(path) = &self.blender {
            config = config.blender_path(path.clone());
        }
        if let Some(path) = &self.bridge {
            config = config.bridge_path(path.clone());
        }
        config
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // A bad filter leaves logging off rather than adding a second record.
    let _ = logging::init_logging(cli.log_level.as_deref());

    let engine_config = cli.engine_config();

    match cli.command {
        Commands::Extract { path } => commands::extract::run(&path, engine_config),
        Commands::Render {
            path,
            output,
            progress_file,
        } => {
            let config = RenderConfig::default()
                .output_path(output)
                .progress_path(progress_file)
                .shield_signals(true);
            commands::render::run(&path, engine_config, &config)
        }
        Commands::Header { path } => commands::header::run(&path),
        Commands::Progress { progress_file } => commands::progress::run(&progress_file),
    }
}
