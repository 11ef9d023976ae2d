//! Land models: the shape tiles are draped over.
//!
//! A [`LandModel`] converts geodetic coordinates (degrees, meters) to cartesian
//! positions and back, picks a mesh resolution for a tile's extents, and builds
//! local-to-world frames. [`Ellipsoid`] is the planetary model (earth-centred,
//! earth-fixed axes with +Z through the north pole); [`Flat`] is an
//! equirectangular plane for small regions.

use std::f64::consts::PI;
use std::fmt::Debug;

use glam::{DMat4, DVec3};

use crate::{Extents, GeoError, MeshSize};

/// Boundary contract between the tile engine and the surface shape.
pub trait LandModel: Send + Sync + Debug {
    /// Geodetic `(lat, lon, height)` in degrees/meters to cartesian meters.
    fn lat_lon_height_to_xyz(&self, lat: f64, lon: f64, height: f64) -> DVec3;

    /// Cartesian meters back to `(lat, lon, height)`.
    fn xyz_to_lat_lon_height(&self, point: DVec3) -> (f64, f64, f64);

    /// Mesh resolution for a tile covering `extents`, given the body's requested size.
    fn mesh_size(&self, extents: &Extents, requested: MeshSize) -> MeshSize;

    /// Local frame at a surface point: columns are east, north, up (rotated
    /// clockwise by `heading` degrees about up) and the point itself.
    fn planet_rotation_matrix(&self, lat: f64, lon: f64, elevation: f64, heading: f64) -> DMat4;

    /// Characteristic size in meters (used to derive split distances).
    fn size(&self) -> f64;
}

/// Longest arc, in degrees, a single mesh cell may span on an ellipsoid.
const MAX_DEGREES_PER_CELL: f64 = 10.0;

const INVERSE_MAX_ITERATIONS: usize = 16;
const INVERSE_TOLERANCE: f64 = 1e-14;

/// An oblate ellipsoid of revolution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ellipsoid {
    equatorial: f64,
    polar: f64,
    e2: f64,
}

impl Ellipsoid {
    /// Create an ellipsoid from its equatorial and polar radii in meters.
    pub fn new(equatorial: f64, polar: f64) -> Result<Self, GeoError> {
        if !(equatorial.is_finite() && polar.is_finite() && equatorial > 0.0 && polar > 0.0) {
            return Err(GeoError::InvalidRadii { equatorial, polar });
        }
        let e2 = 1.0 - (polar * polar) / (equatorial * equatorial);
        Ok(Self {
            equatorial,
            polar,
            e2,
        })
    }

    /// The WGS-84 reference ellipsoid.
    pub fn wgs84() -> Self {
        Self {
            equatorial: 6_378_137.0,
            polar: 6_356_752.314_245,
            e2: 6.694_379_990_14e-3,
        }
    }

    /// A sphere of the given radius.
    pub fn sphere(radius: f64) -> Result<Self, GeoError> {
        Self::new(radius, radius)
    }

    /// Equatorial radius in meters.
    pub fn equatorial_radius(&self) -> f64 {
        self.equatorial
    }

    /// Polar radius in meters.
    pub fn polar_radius(&self) -> f64 {
        self.polar
    }

    /// Prime vertical radius of curvature at geodetic latitude `phi` (radians).
    fn prime_vertical(&self, phi: f64) -> f64 {
        let s = phi.sin();
        self.equatorial / (1.0 - self.e2 * s * s).sqrt()
    }

    /// Unit surface normal at the given geodetic latitude/longitude (degrees).
    pub fn surface_normal(&self, lat: f64, lon: f64) -> DVec3 {
        let (phi, lambda) = (lat.to_radians(), lon.to_radians());
        DVec3::new(
            phi.cos() * lambda.cos(),
            phi.cos() * lambda.sin(),
            phi.sin(),
        )
    }
}

impl Default for Ellipsoid {
    fn default() -> Self {
        Self::wgs84()
    }
}

impl LandModel for Ellipsoid {
    fn lat_lon_height_to_xyz(&self, lat: f64, lon: f64, height: f64) -> DVec3 {
        let (phi, lambda) = (lat.to_radians(), lon.to_radians());
        let n = self.prime_vertical(phi);
        DVec3::new(
            (n + height) * phi.cos() * lambda.cos(),
            (n + height) * phi.cos() * lambda.sin(),
            (n * (1.0 - self.e2) + height) * phi.sin(),
        )
    }

    fn xyz_to_lat_lon_height(&self, point: DVec3) -> (f64, f64, f64) {
        let p = (point.x * point.x + point.y * point.y).sqrt();
        let lambda = point.y.atan2(point.x);

        // Fixed-point iteration on latitude; the height formula below stays
        // well-conditioned at the poles where p -> 0.
        let mut phi = point.z.atan2(p * (1.0 - self.e2));
        for _ in 0..INVERSE_MAX_ITERATIONS {
            let n = self.prime_vertical(phi);
            let h = p * phi.cos() + point.z * phi.sin() - self.equatorial * self.equatorial / n;
            let next = point.z.atan2(p * (1.0 - self.e2 * n / (n + h)));
            let done = (next - phi).abs() < INVERSE_TOLERANCE;
            phi = next;
            if done {
                break;
            }
        }

        let n = self.prime_vertical(phi);
        let height = p * phi.cos() + point.z * phi.sin() - self.equatorial * self.equatorial / n;
        (phi.to_degrees(), lambda.to_degrees(), height)
    }

    fn mesh_size(&self, extents: &Extents, requested: MeshSize) -> MeshSize {
        let needed = |span: f64| (span / MAX_DEGREES_PER_CELL).ceil() as u32 + 1;
        MeshSize::new(
            requested.rows.max(needed(extents.height())),
            requested.columns.max(needed(extents.width())),
        )
    }

    fn planet_rotation_matrix(&self, lat: f64, lon: f64, elevation: f64, heading: f64) -> DMat4 {
        let (phi, lambda) = (lat.to_radians(), lon.to_radians());
        let up = self.surface_normal(lat, lon);
        let east = DVec3::new(-lambda.sin(), lambda.cos(), 0.0);
        let north = DVec3::new(
            -phi.sin() * lambda.cos(),
            -phi.sin() * lambda.sin(),
            phi.cos(),
        );
        let origin = self.lat_lon_height_to_xyz(lat, lon, elevation);
        local_frame(east, north, up, origin, heading)
    }

    fn size(&self) -> f64 {
        self.equatorial
    }
}

/// An equirectangular plane: x = lon, y = lat (both scaled to meters), z = height.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Flat {
    meters_per_degree: f64,
}

impl Flat {
    /// A plane whose degree spacing matches a sphere of `radius` meters at the equator.
    pub fn new(radius: f64) -> Result<Self, GeoError> {
        if !(radius.is_finite() && radius > 0.0) {
            return Err(GeoError::InvalidRadii {
                equatorial: radius,
                polar: radius,
            });
        }
        Ok(Self {
            meters_per_degree: 2.0 * PI * radius / 360.0,
        })
    }

    /// Meters covered by one degree along either axis.
    pub fn meters_per_degree(&self) -> f64 {
        self.meters_per_degree
    }
}

impl LandModel for Flat {
    fn lat_lon_height_to_xyz(&self, lat: f64, lon: f64, height: f64) -> DVec3 {
        DVec3::new(
            lon * self.meters_per_degree,
            lat * self.meters_per_degree,
            height,
        )
    }

    fn xyz_to_lat_lon_height(&self, point: DVec3) -> (f64, f64, f64) {
        (
            point.y / self.meters_per_degree,
            point.x / self.meters_per_degree,
            point.z,
        )
    }

    fn mesh_size(&self, _extents: &Extents, requested: MeshSize) -> MeshSize {
        MeshSize::new(requested.rows, requested.columns)
    }

    fn planet_rotation_matrix(&self, lat: f64, lon: f64, elevation: f64, heading: f64) -> DMat4 {
        let origin = self.lat_lon_height_to_xyz(lat, lon, elevation);
        local_frame(DVec3::X, DVec3::Y, DVec3::Z, origin, heading)
    }

    fn size(&self) -> f64 {
        self.meters_per_degree * 360.0
    }
}

/// Build a frame from east/north/up axes, rotating the horizontal axes
/// clockwise (seen from above) by `heading` degrees.
fn local_frame(east: DVec3, north: DVec3, up: DVec3, origin: DVec3, heading: f64) -> DMat4 {
    let (s, c) = heading.to_radians().sin_cos();
    let x = east * c - north * s;
    let y = east * s + north * c;
    DMat4::from_cols(
        x.extend(0.0),
        y.extend(0.0),
        up.extend(0.0),
        origin.extend(1.0),
    )
}
