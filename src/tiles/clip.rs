//! Per-tile geometry: the part of the dataset coverage that falls inside a
//! tile, either as a subdivided quad mesh or as a triangle fan.

use crate::core::bounds::GeoBounds;
use crate::core::constants::{MAX_CLIPPED_POINTS, MESH_SUBDIVISION_LIMIT};
use crate::core::geo::GeoPoint;
use crate::rendering::surface::PrimitiveMode;
use nalgebra::{Matrix3, SMatrix, SVector, Vector3};

/// Geometry a node draws, in geodetic coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct TileGeometry {
    pub points: Vec<GeoPoint>,
    pub mode: PrimitiveMode,
    /// Strip indices for meshes, `None` for fans
    pub indices: Option<Vec<u16>>,
}

impl TileGeometry {
    pub fn point_count(&self) -> usize {
        self.points.len()
    }
}

/// Mesh subdivisions per edge for a tile at `level`
pub fn subdivisions(zero_height: f64, level: u32, sample_distance: f64, max: u32) -> u32 {
    let max = max.min(MESH_SUBDIVISION_LIMIT);
    let cells = (zero_height / (1u64 << level) as f64) / sample_distance;
    if !(cells >= 1.0) {
        return 1;
    }
    if cells >= max as f64 {
        return max.max(1);
    }
    (cells as u32).next_power_of_two().clamp(1, max.max(1))
}

/// Builds the geometry of the tile with `bounds` against the dataset
/// `coverage` (SW, NW, NE, SE). Returns `None` when the tile lies entirely
/// outside the coverage.
pub fn tile_geometry(
    bounds: &GeoBounds,
    coverage: &[GeoPoint; 4],
    subdivisions: u32,
) -> Option<TileGeometry> {
    let [sw, nw, ne, se] = *coverage;
    let min_north = nw.lat.min(ne.lat);
    let max_south = sw.lat.max(se.lat);
    let min_east = ne.lng.min(se.lng);
    let max_west = nw.lng.max(sw.lng);

    let points = if bounds.north <= min_north
        && bounds.east <= min_east
        && bounds.south >= max_south
        && bounds.west >= max_west
    {
        vec![
            bounds.north_west(),
            bounds.north_east(),
            bounds.south_east(),
            bounds.south_west(),
        ]
    } else {
        let clipped = clip_to_bounds(bounds, coverage);
        if clipped.is_empty() {
            return None;
        }
        clipped
    };

    if points.len() != 4 {
        return Some(TileGeometry {
            points,
            mode: PrimitiveMode::TriangleFan,
            indices: None,
        });
    }

    let subs = subdivisions.max(1);
    let corners = [
        (points[0].lng, points[0].lat),
        (points[1].lng, points[1].lat),
        (points[2].lng, points[2].lat),
        (points[3].lng, points[3].lat),
    ];
    let s = subs as f64;
    let grid_to_geo = match map_quads([(0.0, 0.0), (s, 0.0), (s, s), (0.0, s)], corners) {
        Some(m) => m,
        None => {
            // degenerate quad, draw it unsubdivided
            return Some(TileGeometry {
                points,
                mode: PrimitiveMode::TriangleFan,
                indices: None,
            });
        }
    };

    let mut mesh = Vec::with_capacity(quad_mesh_vertex_count(subs, subs));
    for y in 0..=subs {
        for x in 0..=subs {
            let (lng, lat) = transform(&grid_to_geo, x as f64, y as f64);
            mesh.push(GeoPoint::new(lat, lng));
        }
    }

    Some(TileGeometry {
        points: mesh,
        mode: PrimitiveMode::TriangleStrip,
        indices: Some(quad_mesh_indices(subs, subs)),
    })
}

/// Sutherland–Hodgman clip of the coverage polygon against the tile
/// rectangle, edge order west, north, east, south.
pub fn clip_to_bounds(bounds: &GeoBounds, coverage: &[GeoPoint; 4]) -> Vec<GeoPoint> {
    let mut poly: Vec<GeoPoint> = coverage.to_vec();

    let west = bounds.west;
    poly = clip_edge(&poly, |p| p.lng >= west, |a, b| at_lng(a, b, west));
    if poly.is_empty() {
        return poly;
    }
    let north = bounds.north;
    poly = clip_edge(&poly, |p| p.lat <= north, |a, b| at_lat(a, b, north));
    if poly.is_empty() {
        return poly;
    }
    let east = bounds.east;
    poly = clip_edge(&poly, |p| p.lng <= east, |a, b| at_lng(a, b, east));
    if poly.is_empty() {
        return poly;
    }
    let south = bounds.south;
    poly = clip_edge(&poly, |p| p.lat >= south, |a, b| at_lat(a, b, south));

    debug_assert!(poly.len() <= MAX_CLIPPED_POINTS);
    poly
}

fn clip_edge(
    input: &[GeoPoint],
    inside: impl Fn(&GeoPoint) -> bool,
    intersect: impl Fn(&GeoPoint, &GeoPoint) -> GeoPoint,
) -> Vec<GeoPoint> {
    let mut output = Vec::with_capacity(input.len() + 1);
    let mut last = match input.last() {
        Some(p) => *p,
        None => return output,
    };
    for cur in input {
        if inside(cur) {
            if !inside(&last) {
                output.push(intersect(&last, cur));
            }
            output.push(*cur);
        } else if inside(&last) {
            output.push(intersect(&last, cur));
        }
        last = *cur;
    }
    output
}

fn at_lng(a: &GeoPoint, b: &GeoPoint, lng: f64) -> GeoPoint {
    let t = (lng - a.lng) / (b.lng - a.lng);
    GeoPoint::new(a.lat + t * (b.lat - a.lat), lng)
}

fn at_lat(a: &GeoPoint, b: &GeoPoint, lat: f64) -> GeoPoint {
    let t = (lat - a.lat) / (b.lat - a.lat);
    GeoPoint::new(lat, a.lng + t * (b.lng - a.lng))
}

/// Projective transform taking each `src` corner onto the matching `dst` one
pub fn map_quads(src: [(f64, f64); 4], dst: [(f64, f64); 4]) -> Option<Matrix3<f64>> {
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for i in 0..4 {
        let (x, y) = src[i];
        let (u, v) = dst[i];
        let r = i * 2;
        a[(r, 0)] = x;
        a[(r, 1)] = y;
        a[(r, 2)] = 1.0;
        a[(r, 6)] = -x * u;
        a[(r, 7)] = -y * u;
        b[r] = u;

        a[(r + 1, 3)] = x;
        a[(r + 1, 4)] = y;
        a[(r + 1, 5)] = 1.0;
        a[(r + 1, 6)] = -x * v;
        a[(r + 1, 7)] = -y * v;
        b[r + 1] = v;
    }
    let h = a.lu().solve(&b)?;
    if h.iter().any(|c| !c.is_finite()) {
        return None;
    }
    Some(Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0))
}

pub fn transform(m: &Matrix3<f64>, x: f64, y: f64) -> (f64, f64) {
    let p = m * Vector3::new(x, y, 1.0);
    (p.x / p.z, p.y / p.z)
}

pub fn quad_mesh_vertex_count(w: u32, h: u32) -> usize {
    ((w + 1) * (h + 1)) as usize
}

pub fn quad_mesh_index_count(w: u32, h: u32) -> usize {
    (2 * (w + 1) * h + 2 * h.saturating_sub(1)) as usize
}

/// Triangle strip over a `(w+1) x (h+1)` vertex grid. Rows are stitched with
/// two degenerate indices. Both dimensions are clamped to
/// [`MESH_SUBDIVISION_LIMIT`] so every index fits in `u16`.
pub fn quad_mesh_indices(w: u32, h: u32) -> Vec<u16> {
    let (w, h) = (w.min(MESH_SUBDIVISION_LIMIT), h.min(MESH_SUBDIVISION_LIMIT));
    let mut indices = Vec::with_capacity(quad_mesh_index_count(w, h));
    let stride = w + 1;
    let mut push = |i: u32| indices.push(i as u16);
    for y in 0..h {
        for x in 0..stride {
            push(y * stride + x);
            push((y + 1) * stride + x);
        }
        if y + 1 < h {
            push((y + 1) * stride + (stride - 1));
            push((y + 1) * stride);
        }
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(s: f64, w: f64, n: f64, e: f64) -> [GeoPoint; 4] {
        [
            GeoPoint::new(s, w),
            GeoPoint::new(n, w),
            GeoPoint::new(n, e),
            GeoPoint::new(s, e),
        ]
    }

    #[test]
    fn test_subdivisions() {
        assert_eq!(subdivisions(180.0, 0, 0.5, 32), 32);
        assert_eq!(subdivisions(180.0, 6, 0.5, 32), 8); // 5.6 cells
        assert_eq!(subdivisions(180.0, 12, 0.5, 32), 1);
        assert_eq!(subdivisions(180.0, 8, 0.5, 32), 1); // 1.4 cells truncate to 1
        assert_eq!(subdivisions(180.0, 7, 0.5, 32), 2); // 2.8 cells
    }

    #[test]
    fn test_large_mesh_stays_addressable() {
        // 360 cells at level 0, capped at the u16 limit
        let subs = subdivisions(180.0, 0, 0.5, 256);
        assert_eq!(subs, MESH_SUBDIVISION_LIMIT);

        let idx = quad_mesh_indices(subs, subs);
        assert_eq!(idx.len(), quad_mesh_index_count(subs, subs));
        let max = *idx.iter().max().unwrap() as usize;
        assert_eq!(max + 1, quad_mesh_vertex_count(subs, subs));

        // oversized requests are clamped rather than wrapped
        assert_eq!(quad_mesh_indices(256, 256), idx);
    }

    #[test]
    fn test_index_count_matches_formula() {
        for (w, h) in [(1, 1), (2, 3), (4, 4), (32, 32)] {
            let idx = quad_mesh_indices(w, h);
            assert_eq!(idx.len(), quad_mesh_index_count(w, h));
            let max = *idx.iter().max().unwrap() as usize;
            assert_eq!(max + 1, quad_mesh_vertex_count(w, h));
        }
        assert_eq!(quad_mesh_indices(1, 1), vec![0, 2, 1, 3]);
    }

    #[test]
    fn test_tile_inside_coverage_is_meshed() {
        let bounds = GeoBounds::new(0.0, 0.0, 10.0, 10.0);
        let geom = tile_geometry(&bounds, &square(-50.0, -50.0, 50.0, 50.0), 2).unwrap();
        assert_eq!(geom.mode, PrimitiveMode::TriangleStrip);
        assert_eq!(geom.points.len(), 9);
        // grid origin maps to the north-west corner
        assert!((geom.points[0].lat - 10.0).abs() < 1e-9);
        assert!((geom.points[0].lng - 0.0).abs() < 1e-9);
        // last vertex is the south-east corner
        assert!((geom.points[8].lat - 0.0).abs() < 1e-9);
        assert!((geom.points[8].lng - 10.0).abs() < 1e-9);
        // center
        assert!((geom.points[4].lat - 5.0).abs() < 1e-9);
        assert!((geom.points[4].lng - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_tile_outside_coverage_is_dead() {
        let bounds = GeoBounds::new(60.0, 60.0, 70.0, 70.0);
        assert!(tile_geometry(&bounds, &square(0.0, 0.0, 10.0, 10.0), 4).is_none());
    }

    #[test]
    fn test_partial_overlap_is_clipped() {
        let bounds = GeoBounds::new(0.0, 0.0, 10.0, 10.0);
        let clipped = clip_to_bounds(&bounds, &square(5.0, 5.0, 20.0, 20.0));
        assert_eq!(clipped.len(), 4);
        let b = GeoBounds::from_points(&clipped).unwrap();
        assert_eq!(b, GeoBounds::new(5.0, 5.0, 10.0, 10.0));
    }

    #[test]
    fn test_rotated_coverage_becomes_fan() {
        // a diamond whose tips poke out of the tile on every side
        let diamond = [
            GeoPoint::new(-2.0, 5.0),
            GeoPoint::new(5.0, -2.0),
            GeoPoint::new(12.0, 5.0),
            GeoPoint::new(5.0, 12.0),
        ];
        let bounds = GeoBounds::new(0.0, 0.0, 10.0, 10.0);
        let geom = tile_geometry(&bounds, &diamond, 8).unwrap();
        assert_eq!(geom.mode, PrimitiveMode::TriangleFan);
        assert_eq!(geom.points.len(), 8);
        assert!(geom.indices.is_none());
        for p in &geom.points {
            assert!(bounds.contains(p));
        }
    }

    #[test]
    fn test_map_quads_identity() {
        let sq = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        let m = map_quads(sq, sq).unwrap();
        let (x, y) = transform(&m, 0.25, 0.75);
        assert!((x - 0.25).abs() < 1e-12 && (y - 0.75).abs() < 1e-12);
    }
}
