use std::time::Instant;

use crossbeam_channel::Sender;
use geotile_geo::{Extents, ImageSize, MeshSize};
use image::RgbaImage;
use tracing::trace;

use crate::error::LayerError;
use crate::jobs::Job;
use crate::layers::{ElevationGroup, RasterGroup};
use crate::mesh::HeightGrid;
use crate::tile::{DirtyFlags, TileKey};

/// Builds imagery and heights for one tile from snapshots of the body's layers.
///
/// Everything the job needs is copied or shared at submit time, so it runs
/// without touching the body. The result goes back as a [`JobOutcome`].
pub struct BuildRaster {
    pub(crate) ticket: u64,
    pub(crate) tile: TileKey,
    pub(crate) revision: u64,
    pub(crate) wants: DirtyFlags,
    pub(crate) extents: Extents,
    pub(crate) level: u32,
    pub(crate) image_size: ImageSize,
    pub(crate) mesh_size: MeshSize,
    pub(crate) rasters: RasterGroup,
    pub(crate) elevation: ElevationGroup,
    pub(crate) sender: Sender<JobOutcome>,
}

impl BuildRaster {
    /// The tile this job builds for.
    pub fn tile(&self) -> TileKey {
        self.tile
    }

    /// Submission ticket; the body accepts only the newest ticket per tile.
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Coverage being built.
    pub fn extents(&self) -> Extents {
        self.extents
    }

    /// Run the build and return the outcome without sending it.
    pub fn build(&self) -> JobOutcome {
        let start = Instant::now();
        let image = self
            .wants
            .contains(DirtyFlags::IMAGE)
            .then(|| self.rasters.compose(&self.extents, self.image_size, self.level));
        let heights = self
            .wants
            .contains(DirtyFlags::VERTICES)
            .then(|| self.elevation.sample_heights(&self.extents, self.mesh_size));
        JobOutcome {
            ticket: self.ticket,
            tile: self.tile,
            revision: self.revision,
            wants: self.wants,
            image,
            heights,
            build_time_us: start.elapsed().as_micros() as u64,
        }
    }
}

impl Job for BuildRaster {
    fn name(&self) -> &str {
        "build-raster"
    }

    fn execute(self: Box<Self>) {
        let outcome = self.build();
        trace!(tile = %self.tile, ticket = self.ticket, us = outcome.build_time_us, "raster built");
        // The body may be gone; nothing to deliver to then.
        let _ = self.sender.send(outcome);
    }
}

/// Result of a [`BuildRaster`] job.
#[derive(Debug)]
pub struct JobOutcome {
    /// Ticket of the job that produced this.
    pub ticket: u64,
    /// Target tile.
    pub tile: TileKey,
    /// Tile revision at submit time.
    pub revision: u64,
    /// Flags the job was asked to satisfy.
    pub wants: DirtyFlags,
    /// Composited imagery, if requested.
    pub image: Option<Result<RgbaImage, LayerError>>,
    /// Sampled heights, if requested.
    pub heights: Option<HeightGrid>,
    /// Time spent building, in microseconds.
    pub build_time_us: u64,
}
