//! Body settings and the RON form a body is saved in.
//!
//! Only the scalar settings and the extents of the top-level tiles persist.
//! Layers, callbacks, and the job manager are runtime wiring and must be
//! re-attached by the host after loading.

use std::path::Path;
use std::sync::Arc;

use geotile_config::{BodyConfig, LandConfig, LandKind};
use geotile_geo::{Ellipsoid, Extents, Flat, GeoError, ImageSize, LandModel, MeshSize};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::BodyError;

/// Scalar settings of a body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodySettings {
    /// Deepest level a tile may reach.
    pub max_level: u32,
    /// Split distance given to new top-level tiles.
    pub split_distance: f64,
    /// Requested mesh resolution; the land model may raise it.
    pub mesh_size: MeshSize,
    /// Imagery resolution per tile.
    pub image_size: ImageSize,
    /// Keep merged children for reuse.
    pub cache_tiles: bool,
    /// Hang skirts below tile edges.
    pub use_skirts: bool,
    /// Uniform scale on cartesian output.
    pub scale: f64,
    /// Global split switch.
    pub allow_split: bool,
    /// Never merge split tiles.
    pub keep_detail: bool,
}

impl Default for BodySettings {
    fn default() -> Self {
        Self::from(&BodyConfig::default())
    }
}

impl From<&BodyConfig> for BodySettings {
    fn from(config: &BodyConfig) -> Self {
        Self {
            max_level: config.max_level,
            split_distance: config.split_distance,
            mesh_size: MeshSize::new(config.mesh_rows, config.mesh_columns),
            image_size: ImageSize::new(config.image_width, config.image_height),
            cache_tiles: config.cache_tiles,
            use_skirts: config.use_skirts,
            scale: config.scale,
            allow_split: config.allow_split,
            keep_detail: config.keep_detail,
        }
    }
}

/// Build the land model described by `config`.
pub fn land_from_config(config: &LandConfig) -> Result<Arc<dyn LandModel>, GeoError> {
    Ok(match config.kind {
        LandKind::Ellipsoid => Arc::new(Ellipsoid::new(config.equatorial_radius_m, config.polar_radius_m)?),
        LandKind::Flat => Arc::new(Flat::new(config.equatorial_radius_m)?),
    })
}

/// Saved form of a body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedBody {
    /// Scalar settings.
    pub settings: BodySettings,
    /// Extents of each top-level tile, in insertion order.
    pub tiles: Vec<Extents>,
}

impl PersistedBody {
    /// Serialize to pretty RON.
    pub fn to_ron_string(&self) -> Result<String, BodyError> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    /// Parse from RON.
    pub fn from_ron_str(s: &str) -> Result<Self, BodyError> {
        Ok(ron::from_str(s)?)
    }

    /// Write to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), BodyError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_ron_string()?)?;
        info!(path = %path.display(), tiles = self.tiles.len(), "saved body");
        Ok(())
    }

    /// Read from `path`.
    pub fn load(path: &Path) -> Result<Self, BodyError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }
}
