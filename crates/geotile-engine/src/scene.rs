//! Hook into the host's scene graph.

use geotile_geo::Extents;

use crate::tile::TileKey;

/// Receives top-level tiles as they join and leave the body.
///
/// Children are reached through the body's draw list each frame and are not
/// announced individually. Calls arrive after the body has released its lock,
/// so implementations may query the body.
pub trait SceneAttachment: Send + Sync {
    /// A top-level tile was added.
    fn attach(&self, tile: TileKey, extents: &Extents);

    /// A top-level tile was removed.
    fn detach(&self, tile: TileKey);
}

/// A scene that ignores everything; the default for bodies without a renderer.
#[derive(Clone, Copy, Debug, Default)]
pub struct DetachedScene;

impl SceneAttachment for DetachedScene {
    fn attach(&self, _tile: TileKey, _extents: &Extents) {}

    fn detach(&self, _tile: TileKey) {}
}
