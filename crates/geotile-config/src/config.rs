//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Equatorial radius of the WGS-84 ellipsoid in meters.
pub const WGS_84_RADIUS_EQUATOR: f64 = 6_378_137.0;

/// Polar radius of the WGS-84 ellipsoid in meters.
pub const WGS_84_RADIUS_POLAR: f64 = 6_356_752.314_245;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Tile-engine body settings.
    pub body: BodyConfig,
    /// Background job settings.
    pub jobs: JobsConfig,
    /// Headless demo flight settings.
    pub demo: DemoConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Shape of the surface the tiles are draped over.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LandKind {
    /// Oblate ellipsoid defined by equatorial and polar radii.
    Ellipsoid,
    /// Equirectangular plane, useful for small regions.
    Flat,
}

/// Land model configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LandConfig {
    /// Which land model to build.
    pub kind: LandKind,
    /// Equatorial radius in meters.
    pub equatorial_radius_m: f64,
    /// Polar radius in meters.
    pub polar_radius_m: f64,
}

/// Body-wide tile settings. These are the scalar settings that persist with a body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BodyConfig {
    /// Land model.
    pub land: LandConfig,
    /// Deepest level a tile may reach.
    pub max_level: u32,
    /// Distance (meters) below which a top-level tile splits. Halves per level.
    pub split_distance: f64,
    /// Mesh rows per tile before the land model adjusts it.
    pub mesh_rows: u32,
    /// Mesh columns per tile before the land model adjusts it.
    pub mesh_columns: u32,
    /// Imagery width per tile in pixels.
    pub image_width: u32,
    /// Imagery height per tile in pixels.
    pub image_height: u32,
    /// Keep merged children around for reuse instead of deleting them.
    pub cache_tiles: bool,
    /// Hang skirts below tile edges to hide cracks between levels.
    pub use_skirts: bool,
    /// Uniform scale applied to all cartesian positions.
    pub scale: f64,
    /// Global switch; when false no tile splits.
    pub allow_split: bool,
    /// When true, split tiles are never merged.
    pub keep_detail: bool,
}

/// Background job configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct JobsConfig {
    /// Worker thread count (0 = derive from the number of CPUs).
    pub worker_threads: usize,
    /// Maximum number of queued jobs before submissions are rejected.
    pub queue_capacity: usize,
}

/// Headless demo configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DemoConfig {
    /// Number of frames to simulate.
    pub frames: u32,
    /// Camera altitude at the first frame in meters.
    pub start_altitude_m: f64,
    /// Camera altitude at the last frame in meters.
    pub end_altitude_m: f64,
    /// Latitude the camera descends towards.
    pub target_latitude: f64,
    /// Longitude the camera descends towards.
    pub target_longitude: f64,
    /// Seed for the synthetic terrain and imagery layers.
    pub seed: u32,
    /// Peak height of the synthetic terrain in meters.
    pub terrain_amplitude_m: f64,
    /// Where to write the persisted body when the flight ends (empty = skip).
    pub save_body_to: String,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Write a JSON log file next to the config.
    pub log_to_file: bool,
}

// --- Default implementations ---

impl Default for LandConfig {
    fn default() -> Self {
        Self {
            kind: LandKind::Ellipsoid,
            equatorial_radius_m: WGS_84_RADIUS_EQUATOR,
            polar_radius_m: WGS_84_RADIUS_POLAR,
        }
    }
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            land: LandConfig::default(),
            max_level: 50,
            split_distance: WGS_84_RADIUS_EQUATOR * 2.5,
            mesh_rows: 17,
            mesh_columns: 17,
            image_width: 256,
            image_height: 256,
            cache_tiles: false,
            use_skirts: true,
            scale: 1.0,
            allow_split: true,
            keep_detail: false,
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            queue_capacity: 256,
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            frames: 240,
            start_altitude_m: 20_000_000.0,
            end_altitude_m: 5_000.0,
            target_latitude: 40.76,
            target_longitude: -111.89,
            seed: 7,
            terrain_amplitude_m: 4_000.0,
            save_body_to: String::new(),
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: false,
        }
    }
}

// --- Load / Save / Reload ---

/// File name of the config inside its directory.
pub const CONFIG_FILE_NAME: &str = "config.ron";

impl Config {
    /// Path of the config file inside `config_dir`.
    pub fn path_in(config_dir: &Path) -> PathBuf {
        config_dir.join(CONFIG_FILE_NAME)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `config.ron` from `config_dir`, writing the defaults there first
    /// if it does not exist yet.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = Self::path_in(config_dir);
        if !path.exists() {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", path.display());
            return Ok(config);
        }
        let config = Self::read(&path)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write this config to `config_dir` as pretty RON.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let text = ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;
        std::fs::write(Self::path_in(config_dir), text).map_err(ConfigError::WriteError)
    }

    /// Re-read the file; `Some` only when its content differs from `self`.
    ///
    /// A file that no longer validates is an error and leaves `self` in charge.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let fresh = Self::read(&Self::path_in(config_dir))?;
        if fresh == *self {
            return Ok(None);
        }
        log::info!("Config reloaded with changes");
        Ok(Some(fresh))
    }

    /// Reject values that parse but cannot drive a body.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let body = &self.body;
        if body.mesh_rows < 2 || body.mesh_columns < 2 {
            return Err(ConfigError::InvalidValue {
                field: "body.mesh_rows",
                reason: format!(
                    "mesh must be at least 2x2, got {}x{}",
                    body.mesh_rows, body.mesh_columns
                ),
            });
        }
        if body.image_width == 0 || body.image_height == 0 {
            return Err(ConfigError::InvalidValue {
                field: "body.image_width",
                reason: "image size must be non-zero".to_string(),
            });
        }
        if !(body.scale.is_finite() && body.scale > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "body.scale",
                reason: format!("scale must be positive, got {}", body.scale),
            });
        }
        if !(body.split_distance.is_finite() && body.split_distance > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "body.split_distance",
                reason: format!("split distance must be positive, got {}", body.split_distance),
            });
        }
        if body.land.polar_radius_m <= 0.0 || body.land.equatorial_radius_m <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "body.land",
                reason: "radii must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Default config directory (`<platform config dir>/geotile`), if one exists.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("geotile"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(!ron_str.is_empty());
        assert!(ron_str.contains("max_level: 50"));
        assert!(ron_str.contains("mesh_rows: 17"));
    }

    #[test]
    fn test_missing_field_uses_default() {
        // Config missing the `jobs` section entirely
        let ron_str = "(body: (max_level: 12), debug: ())";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.jobs, JobsConfig::default());
        assert_eq!(config.body.max_level, 12);
        assert_eq!(config.body.mesh_rows, 17);
    }

    #[test]
    fn test_unknown_sections_are_ignored() {
        let config: Config = ron::from_str("(future_setting: 4, body: (keep_detail: true))").unwrap();
        assert!(config.body.keep_detail);
    }

    #[test]
    fn test_land_kind_parses() {
        let ron_str = "(body: (land: (kind: Flat)))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.body.land.kind, LandKind::Flat);
        assert_eq!(config.body.land.equatorial_radius_m, WGS_84_RADIUS_EQUATOR);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.body.max_level = 18;
        config.body.cache_tiles = true;
        config.jobs.worker_threads = 3;

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(Config::path_in(dir.path()).exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.body.split_distance = 1000.0;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(result.is_some());
        assert_eq!(result.unwrap().body.split_distance, 1000.0);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_reload_keeps_invalid_file_out() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        std::fs::write(Config::path_in(dir.path()), "(body: (image_width: 0))").unwrap();
        assert!(matches!(
            config.reload(dir.path()),
            Err(ConfigError::InvalidValue { field: "body.image_width", .. })
        ));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_tiny_mesh() {
        let mut config = Config::default();
        config.body.mesh_columns = 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "body.mesh_rows", .. })
        ));
    }

    #[test]
    fn test_load_rejects_zero_scale() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.ron"), "(body: (scale: 0.0))").unwrap();
        let result = Config::load_or_create(dir.path());
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "body.scale", .. })
        ));
    }

    #[test]
    fn test_garbage_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(Config::path_in(dir.path()), "{{not valid}}").unwrap();
        assert!(matches!(
            Config::load_or_create(dir.path()),
            Err(ConfigError::ParseError(_))
        ));
    }
}
