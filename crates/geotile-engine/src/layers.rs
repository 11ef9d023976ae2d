//! Raster, elevation, and vector layers attached to a body.
//!
//! Layers are shared handles (`Arc<dyn ...>`); a group keeps them in the order
//! they were appended and identifies them by pointer on removal.

use std::sync::Arc;

use geotile_geo::{Extents, ImageSize, MeshSize};
use image::{RgbaImage, imageops};
use tracing::debug;

use crate::error::LayerError;
use crate::mesh::HeightGrid;
use crate::tile::TileKey;

/// A source of imagery and/or elevation.
pub trait RasterLayer: Send + Sync {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// Coverage of the layer; `None` means the whole globe.
    fn extents(&self) -> Option<Extents> {
        None
    }

    /// Render imagery for `extents` at `size`. `level` is the requesting tile's depth.
    fn texture(&self, extents: &Extents, size: ImageSize, level: u32) -> Result<RgbaImage, LayerError> {
        let _ = (extents, size, level);
        Err(LayerError::NoImagery {
            layer: self.name().to_string(),
        })
    }

    /// Height in meters at a point, or `None` where the layer has no data.
    fn elevation_at(&self, lat: f64, lon: f64) -> Option<f64> {
        let _ = (lat, lon);
        None
    }
}

/// Coverage of a layer, defaulting to the whole globe.
pub fn layer_extents(layer: &dyn RasterLayer) -> Extents {
    layer.extents().unwrap_or(Extents::GLOBAL)
}

/// A consumer of tile lifecycle events, such as vector overlays draped on the terrain.
///
/// Notifications are delivered with the body unlocked and may call back into it.
pub trait VectorLayer: Send + Sync {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// The body was asked to refresh vector data.
    fn update_notify(&self);

    /// `child` (a descendant of `parent`) is no longer drawn.
    fn tile_removed(&self, child: TileKey, parent: TileKey);
}

/// Ordered raster layers. Later layers draw over earlier ones; for elevation
/// the last layer with data wins.
#[derive(Clone, Default)]
pub struct LayerGroup {
    layers: Vec<Arc<dyn RasterLayer>>,
}

/// Layers composited into tile imagery.
pub type RasterGroup = LayerGroup;

/// Layers sampled for tile heights.
pub type ElevationGroup = LayerGroup;

impl LayerGroup {
    /// Create an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layer on top.
    pub fn append(&mut self, layer: Arc<dyn RasterLayer>) {
        self.layers.push(layer);
    }

    /// Remove a layer by identity. Returns whether it was present.
    pub fn remove(&mut self, layer: &Arc<dyn RasterLayer>) -> bool {
        let before = self.layers.len();
        self.layers.retain(|l| !Arc::ptr_eq(l, layer));
        self.layers.len() != before
    }

    /// Whether `layer` is in the group.
    pub fn contains(&self, layer: &Arc<dyn RasterLayer>) -> bool {
        self.layers.iter().any(|l| Arc::ptr_eq(l, layer))
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether the group is empty.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Drop every layer.
    pub fn clear(&mut self) {
        self.layers.clear();
    }

    /// Layers in draw order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn RasterLayer>> {
        self.layers.iter()
    }

    /// Composite every intersecting layer, first to last, into one image.
    ///
    /// Layer images of the wrong size are resampled. If any intersecting layer
    /// fails the whole composite fails, so the tile stays dirty and retries.
    pub fn compose(&self, extents: &Extents, size: ImageSize, level: u32) -> Result<RgbaImage, LayerError> {
        let mut canvas = RgbaImage::new(size.width, size.height);
        for layer in &self.layers {
            if !layer_extents(layer.as_ref()).intersects(extents) {
                continue;
            }
            let mut img = layer.texture(extents, size, level)?;
            if img.dimensions() != (size.width, size.height) {
                debug!(
                    layer = layer.name(),
                    from = ?img.dimensions(),
                    to = ?(size.width, size.height),
                    "resampling layer image"
                );
                img = imageops::resize(&img, size.width, size.height, imageops::FilterType::Triangle);
            }
            imageops::overlay(&mut canvas, &img, 0, 0);
        }
        Ok(canvas)
    }

    /// Height at a point: the last layer reporting a strictly positive value wins, else zero.
    pub fn elevation_at(&self, lat: f64, lon: f64) -> f64 {
        self.layers
            .iter()
            .rev()
            .filter(|layer| layer_extents(layer.as_ref()).contains_point(lon, lat))
            .filter_map(|layer| layer.elevation_at(lat, lon))
            .find(|h| *h > 0.0)
            .unwrap_or(0.0)
    }

    /// Sample [`LayerGroup::elevation_at`] over a tile's mesh grid.
    pub fn sample_heights(&self, extents: &Extents, size: MeshSize) -> HeightGrid {
        if self.layers.is_empty() {
            return HeightGrid::flat(size);
        }
        HeightGrid::sample(extents, size, |lat, lon| self.elevation_at(lat, lon))
    }
}

impl std::fmt::Debug for LayerGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.layers.iter().map(|l| l.name())).finish()
    }
}

/// Vector layers notified about tile lifecycle.
#[derive(Clone, Default)]
pub struct VectorGroup {
    layers: Vec<Arc<dyn VectorLayer>>,
}

impl VectorGroup {
    /// Add a layer.
    pub fn append(&mut self, layer: Arc<dyn VectorLayer>) {
        self.layers.push(layer);
    }

    /// Remove a layer by identity.
    pub fn remove(&mut self, layer: &Arc<dyn VectorLayer>) -> bool {
        let before = self.layers.len();
        self.layers.retain(|l| !Arc::ptr_eq(l, layer));
        self.layers.len() != before
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether the group is empty.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Drop every layer.
    pub fn clear(&mut self) {
        self.layers.clear();
    }

    /// Tell every layer that `child` of `parent` was removed from the draw set.
    pub fn tile_removed(&self, child: TileKey, parent: TileKey) {
        for layer in &self.layers {
            layer.tile_removed(child, parent);
        }
    }

    /// Tell every layer to refresh.
    pub fn update_notify(&self) {
        for layer in &self.layers {
            layer.update_notify();
        }
    }
}

impl std::fmt::Debug for VectorGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.layers.iter().map(|l| l.name())).finish()
    }
}
