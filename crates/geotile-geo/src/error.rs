//! Geometry error types.

use thiserror::Error;

/// Errors raised when constructing geographic primitives.
#[derive(Debug, Error, PartialEq)]
pub enum GeoError {
    /// A coordinate was NaN or infinite.
    #[error("non-finite coordinate in extents ({min_lon}, {min_lat}, {max_lon}, {max_lat})")]
    NonFinite {
        /// Minimum longitude as given.
        min_lon: f64,
        /// Minimum latitude as given.
        min_lat: f64,
        /// Maximum longitude as given.
        max_lon: f64,
        /// Maximum latitude as given.
        max_lat: f64,
    },

    /// Ellipsoid radii must be positive and finite.
    #[error("invalid radii: equatorial {equatorial}, polar {polar}")]
    InvalidRadii {
        /// Equatorial radius.
        equatorial: f64,
        /// Polar radius.
        polar: f64,
    },
}
