//! Geographic bounding rectangles.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::GeoError;

/// Position of a child inside its parent's extents.
///
/// Order matches [`Extents::quarter`]: lower-left, lower-right, upper-left, upper-right.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Quadrant {
    /// Western half, southern half.
    LowerLeft = 0,
    /// Eastern half, southern half.
    LowerRight = 1,
    /// Western half, northern half.
    UpperLeft = 2,
    /// Eastern half, northern half.
    UpperRight = 3,
}

impl Quadrant {
    /// All quadrants in child order.
    pub const ALL: [Quadrant; 4] = [
        Quadrant::LowerLeft,
        Quadrant::LowerRight,
        Quadrant::UpperLeft,
        Quadrant::UpperRight,
    ];

    /// Index into a four-element child array.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// A geographic rectangle in degrees: `(min_lon, min_lat)` to `(max_lon, max_lat)`.
///
/// `min <= max` holds on both axes. Serialized as a `(min_lon, min_lat, max_lon, max_lat)`
/// tuple; deserialization re-validates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "(f64, f64, f64, f64)", into = "(f64, f64, f64, f64)")]
pub struct Extents {
    min_lon: f64,
    min_lat: f64,
    max_lon: f64,
    max_lat: f64,
}

impl Extents {
    /// The whole globe.
    pub const GLOBAL: Extents = Extents {
        min_lon: -180.0,
        min_lat: -90.0,
        max_lon: 180.0,
        max_lat: 90.0,
    };

    /// Create extents, swapping coordinates where min and max are reversed.
    ///
    /// # Panics
    ///
    /// Panics if any coordinate is not finite. Use [`Extents::try_new`] for untrusted input.
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        match Self::try_new(min_lon, min_lat, max_lon, max_lat) {
            Ok(extents) => extents,
            Err(e) => panic!("{e}"),
        }
    }

    /// Create extents from untrusted input.
    pub fn try_new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self, GeoError> {
        if ![min_lon, min_lat, max_lon, max_lat]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(GeoError::NonFinite {
                min_lon,
                min_lat,
                max_lon,
                max_lat,
            });
        }
        Ok(Self {
            min_lon: min_lon.min(max_lon),
            min_lat: min_lat.min(max_lat),
            max_lon: min_lon.max(max_lon),
            max_lat: min_lat.max(max_lat),
        })
    }

    /// Minimum longitude.
    pub fn min_lon(&self) -> f64 {
        self.min_lon
    }

    /// Minimum latitude.
    pub fn min_lat(&self) -> f64 {
        self.min_lat
    }

    /// Maximum longitude.
    pub fn max_lon(&self) -> f64 {
        self.max_lon
    }

    /// Maximum latitude.
    pub fn max_lat(&self) -> f64 {
        self.max_lat
    }

    /// Longitude span in degrees.
    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Latitude span in degrees.
    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Center as `(lon, lat)`.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lon + self.max_lon) * 0.5,
            (self.min_lat + self.max_lat) * 0.5,
        )
    }

    /// Closed-interval overlap test; extents that only touch along an edge intersect.
    pub fn intersects(&self, other: &Extents) -> bool {
        self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
            && self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
    }

    /// Whether `(lon, lat)` lies inside or on the border.
    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    /// Whether `other` lies entirely inside these extents.
    pub fn contains(&self, other: &Extents) -> bool {
        other.min_lon >= self.min_lon
            && other.max_lon <= self.max_lon
            && other.min_lat >= self.min_lat
            && other.max_lat <= self.max_lat
    }

    /// Smallest extents covering both.
    pub fn expand(&self, other: &Extents) -> Extents {
        Extents {
            min_lon: self.min_lon.min(other.min_lon),
            min_lat: self.min_lat.min(other.min_lat),
            max_lon: self.max_lon.max(other.max_lon),
            max_lat: self.max_lat.max(other.max_lat),
        }
    }

    /// Split into four quadrants ordered as [`Quadrant::ALL`].
    ///
    /// The midpoint is computed once so neighbouring quadrants share edges bit-for-bit.
    pub fn quarter(&self) -> [Extents; 4] {
        let (mid_lon, mid_lat) = self.center();
        [
            Extents {
                min_lon: self.min_lon,
                min_lat: self.min_lat,
                max_lon: mid_lon,
                max_lat: mid_lat,
            },
            Extents {
                min_lon: mid_lon,
                min_lat: self.min_lat,
                max_lon: self.max_lon,
                max_lat: mid_lat,
            },
            Extents {
                min_lon: self.min_lon,
                min_lat: mid_lat,
                max_lon: mid_lon,
                max_lat: self.max_lat,
            },
            Extents {
                min_lon: mid_lon,
                min_lat: mid_lat,
                max_lon: self.max_lon,
                max_lat: self.max_lat,
            },
        ]
    }

    /// Map normalized `(u, v)` in `[0, 1]²` to `(lon, lat)`.
    pub fn lerp(&self, u: f64, v: f64) -> (f64, f64) {
        (
            self.min_lon + u * self.width(),
            self.min_lat + v * self.height(),
        )
    }
}

impl Default for Extents {
    fn default() -> Self {
        Self::GLOBAL
    }
}

impl TryFrom<(f64, f64, f64, f64)> for Extents {
    type Error = GeoError;

    fn try_from((min_lon, min_lat, max_lon, max_lat): (f64, f64, f64, f64)) -> Result<Self, Self::Error> {
        Self::try_new(min_lon, min_lat, max_lon, max_lat)
    }
}

impl From<Extents> for (f64, f64, f64, f64) {
    fn from(e: Extents) -> Self {
        (e.min_lon, e.min_lat, e.max_lon, e.max_lat)
    }
}

impl fmt::Display for Extents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.4}, {:.4}] x [{:.4}, {:.4}]",
            self.min_lon, self.max_lon, self.min_lat, self.max_lat
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_swapped_corners() {
        let e = Extents::new(10.0, 20.0, -10.0, -20.0);
        assert_eq!(e.min_lon(), -10.0);
        assert_eq!(e.min_lat(), -20.0);
        assert_eq!(e.max_lon(), 10.0);
        assert_eq!(e.max_lat(), 20.0);
    }

    #[test]
    fn test_try_new_rejects_nan() {
        assert!(Extents::try_new(f64::NAN, 0.0, 1.0, 1.0).is_err());
        assert!(Extents::try_new(0.0, 0.0, f64::INFINITY, 1.0).is_err());
    }

    #[test]
    fn test_quarters_cover_parent_exactly() {
        let cases = [
            Extents::GLOBAL,
            Extents::new(-180.0, -90.0, 0.0, 90.0),
            Extents::new(-111.93, 40.71, -111.82, 40.79),
            Extents::new(0.1, 0.2, 0.30000000000000004, 0.7),
        ];
        for parent in cases {
            let q = parent.quarter();
            let union = q[1..].iter().fold(q[0], |acc, e| acc.expand(e));
            assert_eq!(union, parent, "union of quarters must equal {parent}");

            // Shared edges are bit-identical.
            assert_eq!(q[0].max_lon(), q[1].min_lon());
            assert_eq!(q[2].max_lon(), q[3].min_lon());
            assert_eq!(q[0].max_lat(), q[2].min_lat());
            assert_eq!(q[1].max_lat(), q[3].min_lat());
        }
    }

    #[test]
    fn test_quarters_overlap_only_on_edges() {
        let q = Extents::new(-20.0, -10.0, 20.0, 10.0).quarter();
        for i in 0..4 {
            for j in (i + 1)..4 {
                let a = q[i];
                let b = q[j];
                let overlap_w = a.max_lon().min(b.max_lon()) - a.min_lon().max(b.min_lon());
                let overlap_h = a.max_lat().min(b.max_lat()) - a.min_lat().max(b.min_lat());
                assert!(
                    overlap_w <= 0.0 || overlap_h <= 0.0,
                    "quadrants {i} and {j} overlap with positive area"
                );
            }
        }
    }

    #[test]
    fn test_quadrant_order() {
        let q = Extents::new(0.0, 0.0, 2.0, 2.0).quarter();
        assert_eq!(q[Quadrant::LowerLeft.index()], Extents::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(q[Quadrant::LowerRight.index()], Extents::new(1.0, 0.0, 2.0, 1.0));
        assert_eq!(q[Quadrant::UpperLeft.index()], Extents::new(0.0, 1.0, 1.0, 2.0));
        assert_eq!(q[Quadrant::UpperRight.index()], Extents::new(1.0, 1.0, 2.0, 2.0));
    }

    #[test]
    fn test_intersects_includes_touching_edges() {
        let a = Extents::new(0.0, 0.0, 10.0, 10.0);
        assert!(a.intersects(&Extents::new(10.0, 0.0, 20.0, 10.0)));
        assert!(a.intersects(&Extents::new(5.0, 5.0, 6.0, 6.0)));
        assert!(!a.intersects(&Extents::new(10.5, 0.0, 20.0, 10.0)));
        assert!(!a.intersects(&Extents::new(0.0, -5.0, 10.0, -0.1)));
    }

    #[test]
    fn test_contains_point_and_extents() {
        let a = Extents::new(-10.0, -10.0, 10.0, 10.0);
        assert!(a.contains_point(0.0, 0.0));
        assert!(a.contains_point(10.0, -10.0));
        assert!(!a.contains_point(10.1, 0.0));
        assert!(a.contains(&Extents::new(-1.0, -1.0, 1.0, 1.0)));
        assert!(!a.contains(&Extents::new(-1.0, -1.0, 11.0, 1.0)));
    }

    #[test]
    fn test_lerp_corners() {
        let e = Extents::new(-180.0, -90.0, 0.0, 90.0);
        assert_eq!(e.lerp(0.0, 0.0), (-180.0, -90.0));
        assert_eq!(e.lerp(1.0, 1.0), (0.0, 90.0));
        assert_eq!(e.lerp(0.5, 0.5), (-90.0, 0.0));
    }

    #[test]
    fn test_serializes_as_tuple() {
        let e = Extents::new(-180.0, -90.0, 0.0, 90.0);
        let ron_str = ron::to_string(&e).unwrap();
        assert_eq!(ron_str, "(-180.0,-90.0,0.0,90.0)");
        let back: Extents = ron::from_str(&ron_str).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn test_deserialize_normalizes() {
        let e: Extents = ron::from_str("(10.0, 10.0, 0.0, 0.0)").unwrap();
        assert_eq!(e, Extents::new(0.0, 0.0, 10.0, 10.0));
    }
}
