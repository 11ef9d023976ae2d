//! Configuration system for geotile.
//!
//! Provides runtime-configurable settings that persist to disk as RON files.
//! Supports CLI overrides via clap, hot-reload detection, and forward/backward
//! compatible serialization.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    BodyConfig, CONFIG_FILE_NAME, Config, DebugConfig, DemoConfig, JobsConfig, LandConfig, LandKind,
    WGS_84_RADIUS_EQUATOR, WGS_84_RADIUS_POLAR,
};
pub use error::ConfigError;
