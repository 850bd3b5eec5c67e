//! Tile coordinate mapping
//!
//! Pure functions between `(level, row, col)` indices and geodetic bounds or
//! pixel positions. Rows grow northward from the grid origin, columns grow
//! eastward. Pixel `y` is measured from a tile's north edge, matching image
//! row order.

use crate::core::bounds::GeoBounds;
use crate::core::geo::GeoPoint;
use crate::{PyramidError, Result};
use geo::{Coord, Intersects, LineString, Polygon, Rect};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileGrid {
    /// South-west corner of tile (0, 0) at every level
    pub origin: GeoPoint,
    /// Width of a level-0 tile in degrees
    pub zero_width: f64,
    /// Height of a level-0 tile in degrees
    pub zero_height: f64,
    pub tile_pixel_width: u32,
    pub tile_pixel_height: u32,
    pub level_count: u32,
    /// Dataset coverage as SW, NW, NE, SE corners. Need not be axis aligned.
    pub coverage: [GeoPoint; 4],
}

impl TileGrid {
    /// A grid whose coverage is the axis aligned rectangle spanned by
    /// `zero_rows` x `zero_cols` level-0 tiles.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        origin: GeoPoint,
        zero_width: f64,
        zero_height: f64,
        zero_rows: u32,
        zero_cols: u32,
        tile_pixel_width: u32,
        tile_pixel_height: u32,
        level_count: u32,
    ) -> Self {
        let north = origin.lat + zero_height * zero_rows as f64;
        let east = origin.lng + zero_width * zero_cols as f64;
        Self {
            origin,
            zero_width,
            zero_height,
            tile_pixel_width,
            tile_pixel_height,
            level_count,
            coverage: [
                GeoPoint::new(origin.lat, origin.lng),
                GeoPoint::new(north, origin.lng),
                GeoPoint::new(north, east),
                GeoPoint::new(origin.lat, east),
            ],
        }
    }

    /// Whole-earth plate carrée pyramid: two 180° level-0 tiles side by side
    pub fn global_equirectangular(tile_pixel_size: u32, level_count: u32) -> Self {
        Self::new(
            GeoPoint::new(-90.0, -180.0),
            180.0,
            180.0,
            1,
            2,
            tile_pixel_size,
            tile_pixel_size,
            level_count,
        )
    }

    /// Replaces the dataset coverage quadrilateral
    pub fn with_coverage(mut self, sw: GeoPoint, nw: GeoPoint, ne: GeoPoint, se: GeoPoint) -> Self {
        self.coverage = [sw, nw, ne, se];
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.zero_width > 0.0 && self.zero_height > 0.0) {
            return Err(Box::new(PyramidError::InvalidConfig(format!(
                "level-0 tile size must be positive, got {}x{}",
                self.zero_width, self.zero_height
            ))));
        }
        if self.level_count == 0 || self.level_count > 31 {
            return Err(Box::new(PyramidError::InvalidConfig(format!(
                "level_count must be in 1..=31, got {}",
                self.level_count
            ))));
        }
        Ok(())
    }

    pub fn tile_width(&self, level: u32) -> f64 {
        self.zero_width / (1u64 << level) as f64
    }

    pub fn tile_height(&self, level: u32) -> f64 {
        self.zero_height / (1u64 << level) as f64
    }

    pub fn tile_bounds(&self, level: u32, row: u32, col: u32) -> GeoBounds {
        let w = self.tile_width(level);
        let h = self.tile_height(level);
        let south = self.origin.lat + row as f64 * h;
        let west = self.origin.lng + col as f64 * w;
        GeoBounds::new(south, west, south + h, west + w)
    }

    pub fn tile_pixel_x(&self, level: u32, _row: u32, col: u32, lng: f64) -> f64 {
        let w = self.tile_width(level);
        let west = self.origin.lng + col as f64 * w;
        (lng - west) / w * self.tile_pixel_width as f64
    }

    pub fn tile_pixel_y(&self, level: u32, row: u32, _col: u32, lat: f64) -> f64 {
        let h = self.tile_height(level);
        let north = self.origin.lat + (row + 1) as f64 * h;
        (north - lat) / h * self.tile_pixel_height as f64
    }

    pub fn tile_pixel_lng(&self, level: u32, _row: u32, col: u32, x: f64) -> f64 {
        let w = self.tile_width(level);
        let west = self.origin.lng + col as f64 * w;
        west + x / self.tile_pixel_width as f64 * w
    }

    pub fn tile_pixel_lat(&self, level: u32, row: u32, _col: u32, y: f64) -> f64 {
        let h = self.tile_height(level);
        let north = self.origin.lat + (row + 1) as f64 * h;
        north - y / self.tile_pixel_height as f64 * h
    }

    /// Pyramid level matching `scale` screen pixels per degree.
    ///
    /// Returns `None` for a degenerate grid with zero-width tiles, in which
    /// case nothing should be drawn.
    pub fn drill_level(&self, scale: f64, bias: f64) -> Option<u32> {
        if self.tile_pixel_width == 0 || self.level_count == 0 {
            return None;
        }
        let layer_scale = scale * self.zero_width / self.tile_pixel_width as f64;
        let raw = (layer_scale.log2() - bias).floor();
        let max = (self.level_count - 1) as f64;
        // NaN and -inf land on level 0
        let level = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, max) };
        Some(level as u32)
    }

    pub fn coverage_bounds(&self) -> GeoBounds {
        // coverage is never empty, the fallback only satisfies the type
        GeoBounds::from_points(&self.coverage)
            .unwrap_or_else(|| GeoBounds::new(0.0, 0.0, 0.0, 0.0))
    }

    pub fn coverage_polygon(&self) -> Polygon<f64> {
        let ring: Vec<Coord<f64>> = self.coverage.iter().map(|p| Coord::from(*p)).collect();
        Polygon::new(LineString::from(ring), vec![])
    }

    /// Level-0 tiles overlapping the dataset coverage, as `(row, col)`
    pub fn root_tiles(&self) -> Vec<(u32, u32)> {
        let b = self.coverage_bounds();
        let coverage = self.coverage_polygon();
        let rows = index_range(b.south, b.north, self.origin.lat, self.zero_height);
        let cols = index_range(b.west, b.east, self.origin.lng, self.zero_width);
        let mut tiles = Vec::new();
        for row in rows {
            for col in cols.clone() {
                let t = self.tile_bounds(0, row, col);
                let rect = Rect::new(
                    Coord { x: t.west, y: t.south },
                    Coord { x: t.east, y: t.north },
                );
                if coverage.intersects(&rect) {
                    tiles.push((row, col));
                }
            }
        }
        tiles
    }
}

fn index_range(min: f64, max: f64, origin: f64, step: f64) -> std::ops::Range<u32> {
    let first = ((min - origin) / step).floor().max(0.0);
    let last = ((max - origin) / step).ceil().max(first + 1.0);
    first as u32..last as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> TileGrid {
        TileGrid::global_equirectangular(256, 5)
    }

    #[test]
    fn test_tile_bounds() {
        let g = grid();
        assert_eq!(g.tile_bounds(0, 0, 0), GeoBounds::new(-90.0, -180.0, 90.0, 0.0));
        assert_eq!(g.tile_bounds(0, 0, 1), GeoBounds::new(-90.0, 0.0, 90.0, 180.0));
        assert_eq!(g.tile_bounds(1, 1, 0), GeoBounds::new(0.0, -180.0, 90.0, -90.0));
    }

    #[test]
    fn test_pixel_mapping_round_trip() {
        let g = grid();
        let b = g.tile_bounds(2, 1, 3);
        assert_eq!(g.tile_pixel_x(2, 1, 3, b.west), 0.0);
        assert_eq!(g.tile_pixel_x(2, 1, 3, b.east), 256.0);
        assert_eq!(g.tile_pixel_y(2, 1, 3, b.north), 0.0);
        assert_eq!(g.tile_pixel_y(2, 1, 3, b.south), 256.0);

        let lat = g.tile_pixel_lat(2, 1, 3, 64.0);
        assert!((g.tile_pixel_y(2, 1, 3, lat) - 64.0).abs() < 1e-9);
        let lng = g.tile_pixel_lng(2, 1, 3, 200.0);
        assert!((g.tile_pixel_x(2, 1, 3, lng) - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_drill_level() {
        let g = grid();
        // level-0 tile drawn at native size: log2(1) - 0.6 floors to -1, clamped
        assert_eq!(g.drill_level(256.0 / 180.0, 0.6), Some(0));
        // 16x magnification lands on level 3
        assert_eq!(g.drill_level(16.0 * 256.0 / 180.0, 0.6), Some(3));
        // clamped to the deepest level
        assert_eq!(g.drill_level(1e9, 0.6), Some(4));
        assert_eq!(g.drill_level(0.0, 0.6), Some(0));
    }

    #[test]
    fn test_degenerate_grid_has_no_level() {
        let mut g = grid();
        g.tile_pixel_width = 0;
        assert_eq!(g.drill_level(10.0, 0.6), None);
    }

    #[test]
    fn test_root_tiles() {
        let g = grid();
        assert_eq!(g.root_tiles(), vec![(0, 0), (0, 1)]);

        let g = grid().with_coverage(
            GeoPoint::new(10.0, 10.0),
            GeoPoint::new(20.0, 10.0),
            GeoPoint::new(20.0, 20.0),
            GeoPoint::new(10.0, 20.0),
        );
        assert_eq!(g.root_tiles(), vec![(0, 1)]);

        // a diagonal band: its bounding box spans four tiles, the band itself three
        let g = TileGrid::new(GeoPoint::new(-90.0, -180.0), 90.0, 90.0, 2, 4, 256, 256, 3)
            .with_coverage(
                GeoPoint::new(-85.0, -175.0),
                GeoPoint::new(-80.0, -175.0),
                GeoPoint::new(85.0, -85.0),
                GeoPoint::new(80.0, -85.0),
            );
        assert_eq!(g.root_tiles(), vec![(0, 0), (1, 0), (1, 1)]);
    }

    #[test]
    fn test_validate() {
        assert!(grid().validate().is_ok());
        let mut g = grid();
        g.level_count = 0;
        assert!(g.validate().is_err());
    }
}
