//! Geographic primitives for the tile engine: extents, mesh/image sizes, and
//! land models converting between lat/lon/height and cartesian space.

mod error;
mod extents;
mod land_model;
mod size;

pub use error::GeoError;
pub use extents::{Extents, Quadrant};
pub use land_model::{Ellipsoid, Flat, LandModel};
pub use size::{ImageSize, MeshSize};
