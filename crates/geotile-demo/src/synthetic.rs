//! Procedural layers so the demo runs without any data on disk.

use std::sync::Arc;

use geotile_engine::{LayerError, RasterLayer};
use geotile_geo::{Extents, ImageSize};
use glam::DVec3;
use image::{Rgba, RgbaImage};
use noise::{NoiseFn, Simplex};

/// Fractal simplex terrain sampled on the unit sphere, so there is no seam at
/// the antimeridian.
pub struct NoiseTerrain {
    noise: Simplex,
    amplitude: f64,
    octaves: u32,
    base_frequency: f64,
}

impl NoiseTerrain {
    /// Terrain peaking around `amplitude` meters.
    pub fn new(seed: u32, amplitude: f64) -> Self {
        Self {
            noise: Simplex::new(seed),
            amplitude,
            octaves: 7,
            base_frequency: 1.5,
        }
    }

    /// Height in meters; negative values are sea floor.
    pub fn height(&self, lat: f64, lon: f64) -> f64 {
        let (lat, lon) = (lat.to_radians(), lon.to_radians());
        let p = DVec3::new(lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin());

        let mut total = 0.0;
        let mut frequency = self.base_frequency;
        let mut amplitude = 1.0;
        for _ in 0..self.octaves {
            let q = p * frequency;
            total += self.noise.get([q.x, q.y, q.z]) * amplitude;
            frequency *= 2.0;
            amplitude *= 0.5;
        }
        total * self.amplitude
    }
}

impl RasterLayer for NoiseTerrain {
    fn name(&self) -> &str {
        "noise-terrain"
    }

    fn elevation_at(&self, lat: f64, lon: f64) -> Option<f64> {
        Some(self.height(lat, lon))
    }
}

/// Hypsometric tinting of a [`NoiseTerrain`].
pub struct ReliefImagery {
    terrain: Arc<NoiseTerrain>,
}

impl ReliefImagery {
    pub fn new(terrain: Arc<NoiseTerrain>) -> Self {
        Self { terrain }
    }
}

fn tint(height: f64, amplitude: f64) -> Rgba<u8> {
    let t = (height / amplitude.max(1.0)).clamp(-1.0, 1.0);
    let lerp = |a: u8, b: u8, t: f64| (a as f64 + (b as f64 - a as f64) * t) as u8;
    if t < 0.0 {
        let d = -t;
        Rgba([lerp(40, 5, d), lerp(90, 20, d), lerp(170, 80, d), 255])
    } else if t < 0.5 {
        let u = t * 2.0;
        Rgba([lerp(60, 150, u), lerp(130, 120, u), lerp(50, 70, u), 255])
    } else {
        let u = (t - 0.5) * 2.0;
        Rgba([lerp(150, 245, u), lerp(120, 245, u), lerp(70, 250, u), 255])
    }
}

impl RasterLayer for ReliefImagery {
    fn name(&self) -> &str {
        "relief"
    }

    fn texture(&self, extents: &Extents, size: ImageSize, _level: u32) -> Result<RgbaImage, LayerError> {
        let amplitude = self.terrain.amplitude;
        Ok(RgbaImage::from_fn(size.width, size.height, |x, y| {
            // Row zero is the northern edge.
            let u = (x as f64 + 0.5) / size.width as f64;
            let v = 1.0 - (y as f64 + 0.5) / size.height as f64;
            let (lon, lat) = extents.lerp(u, v);
            tint(self.terrain.height(lat, lon), amplitude)
        }))
    }
}

/// Translucent latitude/longitude lines every `spacing` degrees.
pub struct Graticule {
    spacing: f64,
}

impl Graticule {
    pub fn new(spacing: f64) -> Self {
        Self {
            spacing: spacing.max(1e-6),
        }
    }

    fn on_line(&self, value: f64, pixel_span: f64) -> bool {
        let offset = value.rem_euclid(self.spacing);
        offset <= pixel_span * 0.5 || self.spacing - offset <= pixel_span * 0.5
    }
}

impl RasterLayer for Graticule {
    fn name(&self) -> &str {
        "graticule"
    }

    fn texture(&self, extents: &Extents, size: ImageSize, _level: u32) -> Result<RgbaImage, LayerError> {
        let lon_span = extents.width() / size.width as f64;
        let lat_span = extents.height() / size.height as f64;
        Ok(RgbaImage::from_fn(size.width, size.height, |x, y| {
            let u = (x as f64 + 0.5) / size.width as f64;
            let v = 1.0 - (y as f64 + 0.5) / size.height as f64;
            let (lon, lat) = extents.lerp(u, v);
            if self.on_line(lon, lon_span) || self.on_line(lat, lat_span) {
                Rgba([255, 255, 255, 96])
            } else {
                Rgba([0, 0, 0, 0])
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terrain_is_deterministic() {
        let a = NoiseTerrain::new(7, 4000.0);
        let b = NoiseTerrain::new(7, 4000.0);
        for (lat, lon) in [(0.0, 0.0), (40.76, -111.89), (-33.9, 151.2)] {
            assert_eq!(a.height(lat, lon), b.height(lat, lon));
            assert!(a.height(lat, lon).abs() <= 8000.0);
        }
    }

    #[test]
    fn test_terrain_has_no_antimeridian_seam() {
        let terrain = NoiseTerrain::new(3, 4000.0);
        let west = terrain.height(12.0, -180.0);
        let east = terrain.height(12.0, 180.0);
        assert!((west - east).abs() < 1e-6);
    }

    #[test]
    fn test_relief_fills_requested_size() {
        let imagery = ReliefImagery::new(Arc::new(NoiseTerrain::new(1, 4000.0)));
        let img = imagery
            .texture(&Extents::new(-10.0, -10.0, 10.0, 10.0), ImageSize::new(16, 8), 3)
            .unwrap();
        assert_eq!(img.dimensions(), (16, 8));
        assert!(img.pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn test_graticule_is_mostly_transparent() {
        let grid = Graticule::new(10.0);
        let img = grid
            .texture(&Extents::new(0.0, 0.0, 40.0, 40.0), ImageSize::new(40, 40), 0)
            .unwrap();
        let lit = img.pixels().filter(|p| p[3] > 0).count();
        assert!(lit > 0);
        assert!(lit < 40 * 40 / 2);
    }

    #[test]
    fn test_tint_ramp() {
        assert!(tint(-4000.0, 4000.0)[2] > tint(-4000.0, 4000.0)[0]);
        assert_eq!(tint(4000.0, 4000.0), Rgba([245, 245, 250, 255]));
    }
}
