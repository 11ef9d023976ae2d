//! Tile meshes: a lat/lon grid lifted through the land model, with optional
//! skirts hanging below the edges to hide cracks between levels.

use bytemuck::{Pod, Zeroable};
use geotile_geo::{Extents, MeshSize};
use glam::DVec3;
use static_assertions::const_assert_eq;

use crate::tile::TexCoords;

/// Interleaved vertex uploaded by the host renderer.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct TileVertex {
    /// Position relative to [`TileMesh::origin`].
    pub position: [f32; 3],
    /// Unit surface normal.
    pub normal: [f32; 3],
    /// Texture coordinates into the tile's current image.
    pub uv: [f32; 2],
}

const_assert_eq!(std::mem::size_of::<TileVertex>(), 32);

/// Heights in meters sampled at every mesh grid point, row-major from the
/// south-west corner.
#[derive(Clone, Debug, PartialEq)]
pub struct HeightGrid {
    size: MeshSize,
    heights: Vec<f64>,
}

impl HeightGrid {
    /// A grid of zeros.
    pub fn flat(size: MeshSize) -> Self {
        Self {
            size,
            heights: vec![0.0; size.point_count()],
        }
    }

    /// Sample `height_at(lat, lon)` at every grid point of `extents`.
    pub fn sample(extents: &Extents, size: MeshSize, mut height_at: impl FnMut(f64, f64) -> f64) -> Self {
        let mut heights = Vec::with_capacity(size.point_count());
        for row in 0..size.rows {
            for column in 0..size.columns {
                let (lon, lat) = grid_lon_lat(extents, size, row, column);
                heights.push(height_at(lat, lon));
            }
        }
        Self { size, heights }
    }

    /// Grid resolution.
    pub fn size(&self) -> MeshSize {
        self.size
    }

    /// Height at a grid point; out-of-range indices read as zero.
    pub fn get(&self, row: u32, column: u32) -> f64 {
        if row >= self.size.rows || column >= self.size.columns {
            return 0.0;
        }
        self.heights[(row * self.size.columns + column) as usize]
    }

    /// Largest sampled height.
    pub fn max_height(&self) -> f64 {
        self.heights.iter().copied().fold(0.0, f64::max)
    }
}

/// Depth of edge skirts for a tile at `level`: 25 km at the top, shrinking
/// 150 m per level, never below `10 * f64::EPSILON`.
pub fn skirt_depth(level: u32) -> f64 {
    (25_000.0 - 150.0 * level as f64).max(10.0 * f64::EPSILON)
}

fn grid_lon_lat(extents: &Extents, size: MeshSize, row: u32, column: u32) -> (f64, f64) {
    let u = column as f64 / (size.columns - 1) as f64;
    let v = row as f64 / (size.rows - 1) as f64;
    extents.lerp(u, v)
}

/// Renderable geometry for one tile.
#[derive(Clone, Debug)]
pub struct TileMesh {
    /// Grid resolution of the surface part.
    pub size: MeshSize,
    /// World-space anchor; vertex positions are relative to it.
    pub origin: DVec3,
    /// Surface vertices followed by skirt vertices.
    pub vertices: Vec<TileVertex>,
    /// Triangle list: surface first, then skirts.
    pub indices: Vec<u32>,
    /// Number of leading indices that belong to the surface.
    pub surface_index_count: usize,
    corners: [DVec3; 4],
    center: DVec3,
}

impl TileMesh {
    /// Build a mesh for `extents`.
    ///
    /// * `to_xyz` - maps `(lat, lon, height)` to body-local cartesian space.
    /// * `heights` - sampled heights; `None` builds a flat mesh on the surface.
    /// * `tex` - window of the tile's image the surface maps to.
    /// * `skirt` - skirt depth in meters, or `None` for no skirts.
    pub fn build(
        to_xyz: &dyn Fn(f64, f64, f64) -> DVec3,
        extents: &Extents,
        size: MeshSize,
        heights: Option<&HeightGrid>,
        tex: TexCoords,
        skirt: Option<f64>,
    ) -> Self {
        let rows = size.rows;
        let columns = size.columns;
        let index = |row: u32, column: u32| (row * columns + column) as usize;
        let height = |row: u32, column: u32| heights.map_or(0.0, |h| h.get(row, column));

        let mut world = Vec::with_capacity(size.point_count());
        for row in 0..rows {
            for column in 0..columns {
                let (lon, lat) = grid_lon_lat(extents, size, row, column);
                world.push(to_xyz(lat, lon, height(row, column)));
            }
        }

        let origin = world[index(rows / 2, columns / 2)];
        let mut vertices = Vec::with_capacity(world.len() + 2 * (rows + columns) as usize);
        for row in 0..rows {
            for column in 0..columns {
                let p = world[index(row, column)];
                let east = world[index(row, (column + 1).min(columns - 1))]
                    - world[index(row, column.saturating_sub(1))];
                let north =
                    world[index((row + 1).min(rows - 1), column)] - world[index(row.saturating_sub(1), column)];
                let mut normal = east.cross(north).normalize_or_zero();
                if normal == DVec3::ZERO {
                    // Degenerate at the poles; fall back to the vertical.
                    let (lon, lat) = grid_lon_lat(extents, size, row, column);
                    normal = (p - to_xyz(lat, lon, height(row, column) - 1.0)).normalize_or_zero();
                }
                let (s, t) = tex.lerp(
                    column as f64 / (columns - 1) as f64,
                    row as f64 / (rows - 1) as f64,
                );
                vertices.push(TileVertex {
                    position: (p - origin).as_vec3().to_array(),
                    normal: normal.as_vec3().to_array(),
                    uv: [s as f32, t as f32],
                });
            }
        }

        let mut indices = Vec::with_capacity(size.cell_count() * 6);
        for row in 0..rows - 1 {
            for column in 0..columns - 1 {
                let a = index(row, column) as u32;
                let b = index(row, column + 1) as u32;
                let c = index(row + 1, column) as u32;
                let d = index(row + 1, column + 1) as u32;
                indices.extend_from_slice(&[a, b, d, a, d, c]);
            }
        }
        let surface_index_count = indices.len();

        if let Some(depth) = skirt {
            let edges: [Vec<(u32, u32)>; 4] = [
                (0..columns).map(|c| (0, c)).collect(),
                (0..columns).map(|c| (rows - 1, c)).collect(),
                (0..rows).map(|r| (r, 0)).collect(),
                (0..rows).map(|r| (r, columns - 1)).collect(),
            ];
            for edge in edges {
                let first = vertices.len() as u32;
                for &(row, column) in &edge {
                    let (lon, lat) = grid_lon_lat(extents, size, row, column);
                    let top = vertices[index(row, column)];
                    let low = to_xyz(lat, lon, height(row, column) - depth);
                    vertices.push(TileVertex {
                        position: (low - origin).as_vec3().to_array(),
                        ..top
                    });
                }
                for k in 0..edge.len() - 1 {
                    let a = index(edge[k].0, edge[k].1) as u32;
                    let b = index(edge[k + 1].0, edge[k + 1].1) as u32;
                    let a_low = first + k as u32;
                    let b_low = a_low + 1;
                    indices.extend_from_slice(&[a, b, b_low, a, b_low, a_low]);
                }
            }
        }

        Self {
            size,
            origin,
            vertices,
            indices,
            surface_index_count,
            corners: [
                world[index(0, 0)],
                world[index(0, columns - 1)],
                world[index(rows - 1, 0)],
                world[index(rows - 1, columns - 1)],
            ],
            center: origin,
        }
    }

    /// Squared distance from `eye` to the nearest of the four corners and the center.
    pub fn smallest_distance_squared(&self, eye: DVec3) -> f64 {
        self.corners
            .iter()
            .chain(std::iter::once(&self.center))
            .map(|p| p.distance_squared(eye))
            .fold(f64::INFINITY, f64::min)
    }

    /// World-space corners: south-west, south-east, north-west, north-east.
    pub fn corners(&self) -> [DVec3; 4] {
        self.corners
    }

    /// Whether skirts were generated.
    pub fn has_skirts(&self) -> bool {
        self.indices.len() > self.surface_index_count
    }

    /// Nearest crossing of the segment `p0 -> p1` with the surface triangles,
    /// as a fraction of the way from `p0`. Skirts are ignored.
    pub fn intersect_segment(&self, p0: DVec3, p1: DVec3) -> Option<f64> {
        let start = p0 - self.origin;
        let dir = p1 - p0;
        let vertex = |i: u32| self.vertices.get(i as usize).map(|v| DVec3::from(v.position.map(f64::from)));
        self.indices[..self.surface_index_count]
            .chunks_exact(3)
            .filter_map(|tri| {
                let a = vertex(tri[0])?;
                let b = vertex(tri[1])?;
                let c = vertex(tri[2])?;
                segment_triangle(start, dir, a, b, c)
            })
            .min_by(f64::total_cmp)
    }
}

/// Two-sided segment/triangle test; returns `t` in `[0, 1]` along `dir`.
fn segment_triangle(start: DVec3, dir: DVec3, a: DVec3, b: DVec3, c: DVec3) -> Option<f64> {
    let ab = b - a;
    let ac = c - a;
    let p = dir.cross(ac);
    let det = ab.dot(p);
    if det.abs() <= f64::EPSILON * ab.length() * ac.length() * dir.length() {
        return None;
    }
    let inv = 1.0 / det;
    let s = start - a;
    let u = s.dot(p) * inv;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(ab);
    let v = dir.dot(q) * inv;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = ac.dot(q) * inv;
    (0.0..=1.0).contains(&t).then_some(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geotile_geo::{Flat, LandModel};

    fn flat_xyz() -> impl Fn(f64, f64, f64) -> DVec3 {
        let land = Flat::new(1000.0).unwrap();
        move |lat, lon, h| land.lat_lon_height_to_xyz(lat, lon, h)
    }

    #[test]
    fn test_segment_hits_flat_surface() {
        let to_xyz = flat_xyz();
        let extents = Extents::new(0.0, 0.0, 1.0, 1.0);
        let mesh = TileMesh::build(&to_xyz, &extents, MeshSize::new(3, 3), None, TexCoords::FULL, Some(50.0));
        let inside = to_xyz(0.3, 0.6, 0.0);

        let above = inside + DVec3::new(0.0, 0.0, 100.0);
        let below = inside - DVec3::new(0.0, 0.0, 300.0);
        let t = mesh.intersect_segment(above, below).unwrap();
        assert!((t - 0.25).abs() < 1e-9);
        // Direction does not matter.
        let back = mesh.intersect_segment(below, above).unwrap();
        assert!((back - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_segment_misses() {
        let to_xyz = flat_xyz();
        let extents = Extents::new(0.0, 0.0, 1.0, 1.0);
        let mesh = TileMesh::build(&to_xyz, &extents, MeshSize::new(3, 3), None, TexCoords::FULL, None);
        let inside = to_xyz(0.5, 0.5, 0.0);

        // Stops short of the surface.
        let top = inside + DVec3::new(0.0, 0.0, 100.0);
        assert!(mesh.intersect_segment(top, inside + DVec3::new(0.0, 0.0, 1.0)).is_none());
        // Passes beside the tile.
        let outside = to_xyz(0.5, 2.0, 0.0);
        let down = DVec3::new(0.0, 0.0, 10.0);
        assert!(mesh.intersect_segment(outside + down, outside - down).is_none());
    }

    #[test]
    fn test_vertex_is_pod_and_32_bytes() {
        let v = TileVertex {
            position: [1.0, 2.0, 3.0],
            normal: [0.0, 0.0, 1.0],
            uv: [0.5, 0.5],
        };
        let bytes: &[u8] = bytemuck::bytes_of(&v);
        assert_eq!(bytes.len(), 32);
    }

    #[test]
    fn test_surface_counts() {
        let to_xyz = flat_xyz();
        let size = MeshSize::new(5, 4);
        let mesh = TileMesh::build(&to_xyz, &Extents::new(0.0, 0.0, 1.0, 1.0), size, None, TexCoords::FULL, None);
        assert_eq!(mesh.vertices.len(), 20);
        assert_eq!(mesh.indices.len(), 4 * 3 * 6);
        assert!(!mesh.has_skirts());
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
    }

    #[test]
    fn test_skirts_add_edge_strips() {
        let to_xyz = flat_xyz();
        let size = MeshSize::new(5, 4);
        let mesh = TileMesh::build(
            &to_xyz,
            &Extents::new(0.0, 0.0, 1.0, 1.0),
            size,
            None,
            TexCoords::FULL,
            Some(skirt_depth(0)),
        );
        assert_eq!(mesh.vertices.len(), 20 + 2 * (5 + 4));
        let skirt_quads = 2 * (4 - 1) + 2 * (5 - 1);
        assert_eq!(mesh.indices.len(), 4 * 3 * 6 + skirt_quads * 6);
        assert!(mesh.has_skirts());

        let lowest = mesh.vertices[20..]
            .iter()
            .map(|v| v.position[2] as f64 + mesh.origin.z)
            .fold(f64::INFINITY, f64::min);
        assert!((lowest + 25_000.0).abs() < 1e-3);
    }

    #[test]
    fn test_skirt_depth_shrinks_with_level() {
        assert_eq!(skirt_depth(0), 25_000.0);
        assert_eq!(skirt_depth(10), 23_500.0);
        assert_eq!(skirt_depth(1000), 10.0 * f64::EPSILON);
    }

    #[test]
    fn test_flat_normals_point_up() {
        let to_xyz = flat_xyz();
        let mesh = TileMesh::build(
            &to_xyz,
            &Extents::new(0.0, 0.0, 1.0, 1.0),
            MeshSize::new(3, 3),
            None,
            TexCoords::FULL,
            None,
        );
        for v in &mesh.vertices {
            assert!((v.normal[2] - 1.0).abs() < 1e-6, "normal {:?}", v.normal);
        }
    }

    #[test]
    fn test_uvs_follow_tex_coords() {
        let to_xyz = flat_xyz();
        let tex = TexCoords {
            u0: 0.5,
            v0: 0.0,
            u1: 1.0,
            v1: 0.5,
        };
        let mesh = TileMesh::build(&to_xyz, &Extents::new(0.0, 0.0, 1.0, 1.0), MeshSize::new(2, 2), None, tex, None);
        assert_eq!(mesh.vertices[0].uv, [0.5, 0.0]);
        assert_eq!(mesh.vertices[3].uv, [1.0, 0.5]);
    }

    #[test]
    fn test_heights_raise_vertices() {
        let to_xyz = flat_xyz();
        let extents = Extents::new(0.0, 0.0, 1.0, 1.0);
        let size = MeshSize::new(3, 3);
        let heights = HeightGrid::sample(&extents, size, |_, _| 120.0);
        let mesh = TileMesh::build(&to_xyz, &extents, size, Some(&heights), TexCoords::FULL, None);
        assert_eq!(mesh.origin.z, 120.0);
        assert_eq!(heights.max_height(), 120.0);
    }

    #[test]
    fn test_smallest_distance_uses_nearest_sample() {
        let land = Flat::new(1000.0).unwrap();
        let to_xyz = |lat, lon, h| land.lat_lon_height_to_xyz(lat, lon, h);
        let extents = Extents::new(0.0, 0.0, 1.0, 1.0);
        let mesh = TileMesh::build(&to_xyz, &extents, MeshSize::new(3, 3), None, TexCoords::FULL, None);

        let eye = land.lat_lon_height_to_xyz(0.0, 0.0, 500.0);
        assert!((mesh.smallest_distance_squared(eye) - 250_000.0).abs() < 1e-6);

        let above_center = land.lat_lon_height_to_xyz(0.5, 0.5, 10.0);
        assert!((mesh.smallest_distance_squared(above_center) - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_height_grid_sample_order() {
        let extents = Extents::new(10.0, 20.0, 12.0, 22.0);
        let grid = HeightGrid::sample(&extents, MeshSize::new(2, 2), |lat, lon| lat * 100.0 + lon);
        assert_eq!(grid.get(0, 0), 2010.0);
        assert_eq!(grid.get(0, 1), 2012.0);
        assert_eq!(grid.get(1, 0), 2210.0);
        assert_eq!(grid.get(5, 5), 0.0);
    }
}
