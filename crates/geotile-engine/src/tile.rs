//! Tile data: one node of a body's quadtree.

use std::sync::Arc;

use bitflags::bitflags;
use geotile_geo::{Extents, ImageSize, MeshSize, Quadrant};
use image::RgbaImage;

use crate::mesh::{HeightGrid, TileMesh};

/// Generational handle to a tile in a body's arena.
///
/// A key whose tile has been purged never resolves again, even when the slot
/// is reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub(crate) slot: u32,
    pub(crate) generation: u32,
}

impl std::fmt::Display for TileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tile#{}v{}", self.slot, self.generation)
    }
}

bitflags! {
    /// Outstanding work on a tile.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct DirtyFlags: u8 {
        /// Imagery must be re-composited.
        const IMAGE = 1 << 0;
        /// Heights must be re-sampled and the mesh rebuilt.
        const VERTICES = 1 << 1;
        /// Children must be discarded and re-created on demand.
        const CHILDREN = 1 << 2;
    }
}

impl DirtyFlags {
    /// Flags a raster job can clear.
    pub const RASTER: DirtyFlags = DirtyFlags::IMAGE.union(DirtyFlags::VERTICES);
}

/// Sub-rectangle of an image in normalized coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TexCoords {
    /// Left edge.
    pub u0: f64,
    /// Bottom edge.
    pub v0: f64,
    /// Right edge.
    pub u1: f64,
    /// Top edge.
    pub v1: f64,
}

impl TexCoords {
    /// The whole image.
    pub const FULL: TexCoords = TexCoords {
        u0: 0.0,
        v0: 0.0,
        u1: 1.0,
        v1: 1.0,
    };

    /// The part of this window covering `quadrant` of the tile.
    pub fn quadrant(&self, quadrant: Quadrant) -> TexCoords {
        let um = (self.u0 + self.u1) * 0.5;
        let vm = (self.v0 + self.v1) * 0.5;
        match quadrant {
            Quadrant::LowerLeft => TexCoords { u0: self.u0, v0: self.v0, u1: um, v1: vm },
            Quadrant::LowerRight => TexCoords { u0: um, v0: self.v0, u1: self.u1, v1: vm },
            Quadrant::UpperLeft => TexCoords { u0: self.u0, v0: vm, u1: um, v1: self.v1 },
            Quadrant::UpperRight => TexCoords { u0: um, v0: vm, u1: self.u1, v1: self.v1 },
        }
    }

    /// Map normalized tile position `(u, v)` into this window.
    pub fn lerp(&self, u: f64, v: f64) -> (f64, f64) {
        (
            self.u0 + u * (self.u1 - self.u0),
            self.v0 + v * (self.v1 - self.v0),
        )
    }
}

impl Default for TexCoords {
    fn default() -> Self {
        Self::FULL
    }
}

/// Observable lifecycle state of a tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileState {
    /// Drawn directly, nothing outstanding.
    LeafClean,
    /// Drawn directly, with work outstanding.
    LeafDirty(DirtyFlags),
    /// Children exist but the tile is still drawn until all four own imagery.
    SplitPending,
    /// Children are drawn instead of this tile.
    Split,
}

/// A raster job the tile is waiting on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct JobTicket {
    pub id: u64,
    pub revision: u64,
    pub wants: DirtyFlags,
    /// Wanted flags marked again after submission; the result cannot clear them.
    pub remarked: DirtyFlags,
}

/// One quadtree node. Obtain snapshots through [`Body::tile`](crate::Body::tile).
///
/// Image and mesh payloads are shared, so cloning a tile is cheap.
#[derive(Clone, Debug)]
pub struct Tile {
    pub(crate) parent: Option<TileKey>,
    pub(crate) quadrant: Option<Quadrant>,
    pub(crate) level: u32,
    pub(crate) extents: Extents,
    pub(crate) mesh_size: MeshSize,
    pub(crate) image_size: ImageSize,
    pub(crate) split_distance: f64,
    pub(crate) flags: DirtyFlags,
    /// Bumped every time the tile is dirtied; lets late job results detect staleness.
    pub(crate) revision: u64,
    pub(crate) children: Option<[TileKey; 4]>,
    pub(crate) children_active: bool,
    /// Set while the tile wants its children drawn; cached children of a merged tile have it clear.
    pub(crate) wants_split: bool,
    pub(crate) image: Option<Arc<RgbaImage>>,
    pub(crate) tex_coords: TexCoords,
    pub(crate) owns_image: bool,
    pub(crate) heights: Option<Arc<HeightGrid>>,
    pub(crate) mesh: Option<Arc<TileMesh>>,
    pub(crate) mesh_stale: bool,
    pub(crate) job: Option<JobTicket>,
    pub(crate) retired: bool,
}

impl Tile {
    pub(crate) fn new(
        parent: Option<(TileKey, Quadrant)>,
        level: u32,
        extents: Extents,
        mesh_size: MeshSize,
        image_size: ImageSize,
        split_distance: f64,
    ) -> Self {
        Self {
            parent: parent.map(|(key, _)| key),
            quadrant: parent.map(|(_, q)| q),
            level,
            extents,
            mesh_size,
            image_size,
            split_distance,
            flags: DirtyFlags::RASTER,
            revision: 0,
            children: None,
            children_active: false,
            wants_split: false,
            image: None,
            tex_coords: TexCoords::FULL,
            owns_image: false,
            heights: None,
            mesh: None,
            mesh_stale: true,
            job: None,
            retired: false,
        }
    }

    /// Add `flags`; returns `true` when anything changed.
    ///
    /// Only flags the in-flight job is producing make its result stale, and
    /// only for those flags.
    pub(crate) fn mark(&mut self, flags: DirtyFlags) -> bool {
        if let Some(job) = &mut self.job
            && job.wants.intersects(flags)
        {
            job.remarked |= job.wants & flags;
            self.revision += 1;
        }
        if flags.contains(DirtyFlags::VERTICES) {
            self.mesh_stale = true;
        }
        let before = self.flags;
        self.flags.insert(flags);
        before != self.flags
    }

    /// Quadtree depth; top-level tiles are level 0.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Geographic coverage.
    pub fn extents(&self) -> Extents {
        self.extents
    }

    /// Mesh grid resolution.
    pub fn mesh_size(&self) -> MeshSize {
        self.mesh_size
    }

    /// Image resolution requested from raster layers.
    pub fn image_size(&self) -> ImageSize {
        self.image_size
    }

    /// Eye distance below which this tile wants to split.
    pub fn split_distance(&self) -> f64 {
        self.split_distance
    }

    /// Outstanding work.
    pub fn dirty_flags(&self) -> DirtyFlags {
        self.flags
    }

    /// Parent tile, `None` for top-level tiles.
    pub fn parent(&self) -> Option<TileKey> {
        self.parent
    }

    /// Position within the parent.
    pub fn quadrant(&self) -> Option<Quadrant> {
        self.quadrant
    }

    /// The four children, if any exist (active or cached).
    pub fn children(&self) -> Option<[TileKey; 4]> {
        self.children
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TileState {
        match self.children {
            Some(_) if self.children_active => TileState::Split,
            Some(_) if self.wants_split => TileState::SplitPending,
            _ if self.flags.is_empty() => TileState::LeafClean,
            _ => TileState::LeafDirty(self.flags),
        }
    }

    /// Current image: the tile's own, or an ancestor's shown through [`Tile::tex_coords`].
    pub fn image(&self) -> Option<&Arc<RgbaImage>> {
        self.image.as_ref()
    }

    /// Window of [`Tile::image`] covering this tile.
    pub fn tex_coords(&self) -> TexCoords {
        self.tex_coords
    }

    /// Whether the image was built for this tile rather than inherited.
    pub fn has_own_image(&self) -> bool {
        self.owns_image
    }

    /// Sampled heights, once a raster job has delivered them.
    pub fn heights(&self) -> Option<&Arc<HeightGrid>> {
        self.heights.as_ref()
    }

    /// Current mesh.
    pub fn mesh(&self) -> Option<&Arc<TileMesh>> {
        self.mesh.as_ref()
    }

    /// Whether a raster job is in flight.
    pub fn job_in_flight(&self) -> bool {
        self.job.is_some()
    }

    /// Whether the tile is awaiting deletion.
    pub fn is_retired(&self) -> bool {
        self.retired
    }
}
