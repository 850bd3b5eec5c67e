use crate::core::geo::GeoPoint;
use serde::{Deserialize, Serialize};

/// An axis-aligned geodetic rectangle, stored south/west/north/east in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl GeoBounds {
    /// Creates bounds from individual edges
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south,
            west,
            north,
            east,
        }
    }

    /// Smallest bounds containing all of `points`
    pub fn from_points(points: &[GeoPoint]) -> Option<Self> {
        let first = points.first()?;
        let mut bounds = Self::new(first.lat, first.lng, first.lat, first.lng);
        for p in &points[1..] {
            bounds.extend(p);
        }
        Some(bounds)
    }

    pub fn south_west(&self) -> GeoPoint {
        GeoPoint::new(self.south, self.west)
    }

    pub fn north_west(&self) -> GeoPoint {
        GeoPoint::new(self.north, self.west)
    }

    pub fn north_east(&self) -> GeoPoint {
        GeoPoint::new(self.north, self.east)
    }

    pub fn south_east(&self) -> GeoPoint {
        GeoPoint::new(self.south, self.east)
    }

    /// Gets the width of the bounds in degrees of longitude
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    /// Gets the height of the bounds in degrees of latitude
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Gets the center point of the bounds
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }

    /// Checks if the bounds contain a point (edges inclusive)
    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.lat >= self.south
            && point.lat <= self.north
            && point.lng >= self.west
            && point.lng <= self.east
    }

    /// Checks if `other` lies completely inside these bounds
    pub fn contains_bounds(&self, other: &GeoBounds) -> bool {
        other.south >= self.south
            && other.north <= self.north
            && other.west >= self.west
            && other.east <= self.east
    }

    /// Checks if the bounds intersect with another bounds
    pub fn intersects(&self, other: &GeoBounds) -> bool {
        !(other.north < self.south
            || other.south > self.north
            || other.east < self.west
            || other.west > self.east)
    }

    /// Extends the bounds to include a point
    pub fn extend(&mut self, point: &GeoPoint) {
        self.south = self.south.min(point.lat);
        self.west = self.west.min(point.lng);
        self.north = self.north.max(point.lat);
        self.east = self.east.max(point.lng);
    }

    /// Returns true if the bounds have no area
    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_contains() {
        let bounds = GeoBounds::new(40.0, -75.0, 41.0, -73.0);
        assert!(bounds.contains(&GeoPoint::new(40.5, -74.0)));
        assert!(!bounds.contains(&GeoPoint::new(42.0, -74.0)));
    }

    #[test]
    fn test_bounds_intersects() {
        let a = GeoBounds::new(0.0, 0.0, 10.0, 10.0);
        let b = GeoBounds::new(5.0, 5.0, 15.0, 15.0);
        let c = GeoBounds::new(20.0, 20.0, 30.0, 30.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(a.contains_bounds(&GeoBounds::new(1.0, 1.0, 2.0, 2.0)));
        assert!(!a.contains_bounds(&b));
    }

    #[test]
    fn test_from_points() {
        let pts = [
            GeoPoint::new(1.0, 2.0),
            GeoPoint::new(-3.0, 5.0),
            GeoPoint::new(4.0, -1.0),
        ];
        let b = GeoBounds::from_points(&pts).unwrap();
        assert_eq!(b, GeoBounds::new(-3.0, -1.0, 4.0, 5.0));
        assert!(GeoBounds::from_points(&[]).is_none());
    }
}
