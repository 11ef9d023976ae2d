//! Mesh and image resolutions.

use serde::{Deserialize, Serialize};

/// Mesh resolution in grid points.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeshSize {
    /// Points along latitude.
    pub rows: u32,
    /// Points along longitude.
    pub columns: u32,
}

impl MeshSize {
    /// A mesh needs at least two points per axis to form a cell.
    pub const MIN_POINTS: u32 = 2;

    /// Create a mesh size, clamping each axis to [`MeshSize::MIN_POINTS`].
    pub fn new(rows: u32, columns: u32) -> Self {
        Self {
            rows: rows.max(Self::MIN_POINTS),
            columns: columns.max(Self::MIN_POINTS),
        }
    }

    /// Total number of grid points.
    pub fn point_count(&self) -> usize {
        self.rows as usize * self.columns as usize
    }

    /// Number of grid cells.
    pub fn cell_count(&self) -> usize {
        (self.rows as usize - 1) * (self.columns as usize - 1)
    }
}

impl Default for MeshSize {
    fn default() -> Self {
        Self::new(17, 17)
    }
}

/// Image resolution in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl ImageSize {
    /// Create an image size; zero dimensions are bumped to one pixel.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }
}

impl Default for ImageSize {
    fn default() -> Self {
        Self::new(256, 256)
    }
}
