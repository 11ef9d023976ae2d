//! Headless flight over a procedurally generated planet.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI
//! flags. Run with `cargo run -p geotile-demo -- --frames 120`.

mod flight;
mod synthetic;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use geotile_config::{CliArgs, Config};
use geotile_engine::{Body, JobManager, MaxSplitsPerFrame, SplitCallback, WorkerPool};
use geotile_geo::Extents;
use tracing::{debug, error, info};

use crate::flight::{Descent, LevelHistogram};
use crate::synthetic::{Graticule, NoiseTerrain, ReliefImagery};

const FRAME_TIME: Duration = Duration::from_millis(16);
const SPLITS_PER_FRAME: usize = 16;

fn main() {
    let args = CliArgs::parse();

    let config_dir = args
        .config
        .clone()
        .or_else(Config::default_dir)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    geotile_log::init_logging(Some(&log_dir), config.debug.log_to_file, Some(&config));

    if let Err(e) = run(&config) {
        error!("demo failed: {e}");
        std::process::exit(1);
    }
}

fn run(config: &Config) -> Result<(), Box<dyn Error>> {
    let body = Body::from_config(&config.body)?;
    let pool = Arc::new(WorkerPool::from_config(&config.jobs)?);
    info!(workers = pool.thread_count(), "Job pool started");
    let manager: Arc<dyn JobManager> = pool.clone();
    body.set_job_manager(Some(manager));
    let limiter: Arc<dyn SplitCallback> = Arc::new(MaxSplitsPerFrame::new(SPLITS_PER_FRAME));
    body.set_split_callback(Some(limiter));

    let demo = &config.demo;
    let terrain = Arc::new(NoiseTerrain::new(demo.seed, demo.terrain_amplitude_m));
    body.raster_append(Arc::new(ReliefImagery::new(terrain.clone())));
    body.raster_append(Arc::new(Graticule::new(15.0)));
    body.elevation_append(terrain);

    body.add_tile(Extents::new(-180.0, -90.0, 0.0, 90.0));
    body.add_tile(Extents::new(0.0, -90.0, 180.0, 90.0));

    let descent = Descent::new(demo.start_altitude_m, demo.end_altitude_m, demo.frames);
    let started = Instant::now();
    let mut total_splits = 0;
    let mut total_merges = 0;
    let mut total_jobs = 0;

    for frame in 0..demo.frames {
        let altitude = descent.altitude(frame);
        let eye = body.lat_lon_height_to_xyz(demo.target_latitude, demo.target_longitude, altitude);
        let report = body.cull(eye)?;
        let purged = body.post_render();

        total_splits += report.splits;
        total_merges += report.merges;
        total_jobs += report.jobs_submitted;

        if frame % 30 == 0 || frame + 1 == demo.frames {
            let mut histogram = LevelHistogram::default();
            for key in &report.drawn {
                if let Some(tile) = body.tile(*key) {
                    histogram.record(tile.level());
                }
            }
            info!(
                frame,
                altitude_m = altitude as u64,
                drawn = histogram.total(),
                deepest = histogram.deepest().unwrap_or(0),
                tiles = body.tile_count(),
                in_flight = pool.pending(),
                purged,
                levels = %histogram.summary(),
                "Frame"
            );
        }
        if report.outcomes_discarded > 0 {
            debug!(frame, discarded = report.outcomes_discarded, "Stale job results dropped");
        }

        std::thread::sleep(FRAME_TIME);
    }

    info!(
        frames = demo.frames,
        elapsed_ms = started.elapsed().as_millis() as u64,
        splits = total_splits,
        merges = total_merges,
        jobs = total_jobs,
        "Flight complete"
    );

    if !demo.save_body_to.is_empty() {
        body.save_ron(&PathBuf::from(&demo.save_body_to))?;
    }

    body.set_job_manager(None);
    Ok(())
}
