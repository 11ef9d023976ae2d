//! Geospatial tile engine.
//!
//! A [`Body`] covers a planet (or any land model) with top-level tiles. Each
//! frame the host calls [`Body::cull`] with the eye position; tiles close to
//! the eye split into four children, distant ones merge back. Imagery and
//! heights for each tile are composited from [`RasterLayer`]s by
//! [`BuildRaster`] jobs running on a [`JobManager`], and results are folded
//! back into the tree on the next cull.
//!
//! ```no_run
//! use std::sync::Arc;
//! use geotile_engine::{Body, BodySettings, WorkerPool};
//! use geotile_geo::{Ellipsoid, Extents};
//!
//! let body = Body::new(Arc::new(Ellipsoid::wgs84()), BodySettings::default());
//! body.set_job_manager(Some(Arc::new(WorkerPool::with_defaults().unwrap())));
//! body.add_tile(Extents::new(-180.0, -90.0, 0.0, 90.0));
//! body.add_tile(Extents::new(0.0, -90.0, 180.0, 90.0));
//!
//! let eye = body.lat_lon_height_to_xyz(40.76, -111.89, 10_000.0);
//! let frame = body.cull(eye).unwrap();
//! for key in &frame.drawn {
//!     let _tile = body.tile(*key);
//! }
//! body.post_render();
//! ```

mod body;
mod dirty;
pub mod error;
pub mod jobs;
pub mod layers;
pub mod mesh;
mod persist;
pub mod scene;
pub mod split;
mod store;
mod tile;

pub use body::{Body, FrameReport};
pub use error::{BodyError, JobError, LayerError};
pub use jobs::{BuildRaster, Job, JobManager, JobOutcome, ManualJobManager, WorkerPool};
pub use layers::{ElevationGroup, LayerGroup, RasterGroup, RasterLayer, VectorGroup, VectorLayer};
pub use mesh::{HeightGrid, TileMesh, TileVertex};
pub use persist::{BodySettings, PersistedBody, land_from_config};
pub use scene::{DetachedScene, SceneAttachment};
pub use split::{MaxSplitsPerFrame, NeverSplit, PassThrough, SplitCallback};
pub use tile::{DirtyFlags, TexCoords, Tile, TileKey, TileState};
