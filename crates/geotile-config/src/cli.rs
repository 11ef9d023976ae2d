//! Command-line argument parsing for the geotile demo.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// geotile command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "geotile", about = "Headless quadtree tile engine flight")]
pub struct CliArgs {
    /// Deepest tile level.
    #[arg(long)]
    pub max_level: Option<u32>,

    /// Split distance of the top-level tiles in meters.
    #[arg(long)]
    pub split_distance: Option<f64>,

    /// Keep merged tiles cached for reuse.
    #[arg(long)]
    pub cache_tiles: Option<bool>,

    /// Number of frames to simulate.
    #[arg(long)]
    pub frames: Option<u32>,

    /// Worker thread count (0 = auto).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(level) = args.max_level {
            self.body.max_level = level;
        }
        if let Some(distance) = args.split_distance {
            self.body.split_distance = distance;
        }
        if let Some(cache) = args.cache_tiles {
            self.body.cache_tiles = cache;
        }
        if let Some(frames) = args.frames {
            self.demo.frames = frames;
        }
        if let Some(workers) = args.workers {
            self.jobs.worker_threads = workers;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
