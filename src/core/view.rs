use crate::core::bounds::GeoBounds;
use crate::core::geo::{GeoPoint, Point3};
use crate::traits::MapProjection;
use nalgebra::{Matrix4, Vector4};
use std::sync::Arc;

/// Plate carrée, EPSG:4326. Projected space is (lng, lat) in degrees.
#[derive(Debug, Clone, Copy, Default)]
pub struct EquirectangularProjection;

impl MapProjection for EquirectangularProjection {
    fn srid(&self) -> i32 {
        4326
    }

    fn forward(&self, point: GeoPoint) -> Point3 {
        Point3::new(point.lng, point.lat, 0.0)
    }

    fn inverse(&self, point: Point3) -> GeoPoint {
        GeoPoint::new(point.y, point.x)
    }
}

/// Spherical Web Mercator, EPSG:3857. Projected space is meters.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebMercatorProjection;

impl MapProjection for WebMercatorProjection {
    fn srid(&self) -> i32 {
        3857
    }

    fn forward(&self, point: GeoPoint) -> Point3 {
        point.to_mercator()
    }

    fn inverse(&self, point: Point3) -> GeoPoint {
        GeoPoint::from_mercator(point)
    }
}

/// Read-only snapshot of the camera for one frame
///
/// Bounds are in the tile coordinate space (degrees). `scale` is screen
/// pixels per degree of longitude, so a level-0 tile `zero_width` degrees
/// wide covers `scale * zero_width` pixels on screen.
#[derive(Clone)]
pub struct ViewState {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
    pub scale: f64,
    /// SRID of the projection vertices are drawn in
    pub srid: i32,
    /// Bumped by the embedder whenever `scene_forward` changes
    pub draw_version: u64,
    /// Current map resolution, used to gate hardware transforms
    pub draw_map_resolution: f64,
    pub hardware_transform_resolution_threshold: f64,
    pub crosses_idl: bool,
    pub projection: Arc<dyn MapProjection>,
    /// Projected space to screen pixels
    pub scene_forward: Matrix4<f64>,
    /// Screen pixels to clip space
    pub scene_projection: Matrix4<f32>,
    pub width: f32,
    pub height: f32,
}

impl std::fmt::Debug for ViewState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewState")
            .field("north", &self.north)
            .field("south", &self.south)
            .field("east", &self.east)
            .field("west", &self.west)
            .field("scale", &self.scale)
            .field("srid", &self.srid)
            .field("draw_version", &self.draw_version)
            .field("crosses_idl", &self.crosses_idl)
            .finish()
    }
}

impl ViewState {
    /// Builds a view that shows `bounds` across a `width` x `height` pixel
    /// surface using `projection`.
    pub fn fit(
        bounds: GeoBounds,
        width: f32,
        height: f32,
        projection: Arc<dyn MapProjection>,
    ) -> Self {
        let scale = if bounds.width() > 0.0 {
            width as f64 / bounds.width()
        } else {
            0.0
        };

        let mut view = Self {
            north: bounds.north,
            south: bounds.south,
            east: bounds.east,
            west: bounds.west,
            scale,
            srid: projection.srid(),
            draw_version: 0,
            draw_map_resolution: 0.0,
            hardware_transform_resolution_threshold: 0.0,
            crosses_idl: bounds.east > 180.0 || bounds.west < -180.0,
            projection,
            scene_forward: Matrix4::identity(),
            scene_projection: Matrix4::new_orthographic(0.0, width, 0.0, height, -1.0, 1.0),
            width,
            height,
        };
        view.scene_forward = view.fit_matrix(&bounds);
        view.draw_map_resolution = view.resolution();
        view
    }

    /// Maps the projected extent of `bounds` onto the pixel rectangle
    fn fit_matrix(&self, bounds: &GeoBounds) -> Matrix4<f64> {
        let sw = self.projection.forward(bounds.south_west());
        let ne = self.projection.forward(bounds.north_east());
        let dx = ne.x - sw.x;
        let dy = ne.y - sw.y;
        if dx == 0.0 || dy == 0.0 {
            return Matrix4::identity();
        }
        let sx = self.width as f64 / dx;
        let sy = self.height as f64 / dy;
        Matrix4::new(
            sx, 0.0, 0.0, -sw.x * sx, //
            0.0, sy, 0.0, -sw.y * sy, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        )
    }

    /// Projected units per screen pixel along x
    pub fn resolution(&self) -> f64 {
        let sx = self.scene_forward[(0, 0)];
        if sx == 0.0 {
            f64::INFINITY
        } else {
            1.0 / sx.abs()
        }
    }

    pub fn bounds(&self) -> GeoBounds {
        GeoBounds::new(self.south, self.west, self.north, self.east)
    }

    /// Geodetic to projected space
    pub fn project(&self, point: GeoPoint) -> Point3 {
        self.projection.forward(point)
    }

    /// Geodetic to screen space
    pub fn forward(&self, point: GeoPoint) -> Point3 {
        let p = self.projection.forward(point);
        let v = self.scene_forward * Vector4::new(p.x, p.y, p.z, 1.0);
        Point3::new(v.x, v.y, v.z)
    }

    /// Combined matrix for vertices already in screen space, or in projected
    /// space when `forward` is set.
    pub fn draw_matrix(&self, forward: bool) -> Matrix4<f32> {
        if forward {
            self.scene_projection * self.scene_forward.cast::<f32>()
        } else {
            self.scene_projection
        }
    }

    /// Whether vertices may stay in projected space this frame
    pub fn use_hardware_transforms(&self, enabled: bool) -> bool {
        enabled
            && !self.crosses_idl
            && self.draw_map_resolution > self.hardware_transform_resolution_threshold
    }

    /// Same camera, new bounds. Bumps the draw version.
    pub fn panned_to(&self, bounds: GeoBounds) -> Self {
        let mut next = Self::fit(bounds, self.width, self.height, self.projection.clone());
        next.draw_version = self.draw_version + 1;
        next.hardware_transform_resolution_threshold = self.hardware_transform_resolution_threshold;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world_view() -> ViewState {
        ViewState::fit(
            GeoBounds::new(-90.0, -180.0, 90.0, 180.0),
            720.0,
            360.0,
            Arc::new(EquirectangularProjection),
        )
    }

    #[test]
    fn test_fit_maps_corners_to_pixels() {
        let view = world_view();
        assert_eq!(view.scale, 2.0);
        assert_eq!(view.srid, 4326);

        let sw = view.forward(GeoPoint::new(-90.0, -180.0));
        let ne = view.forward(GeoPoint::new(90.0, 180.0));
        assert!((sw.x - 0.0).abs() < 1e-9 && (sw.y - 0.0).abs() < 1e-9);
        assert!((ne.x - 720.0).abs() < 1e-9 && (ne.y - 360.0).abs() < 1e-9);
    }

    #[test]
    fn test_draw_matrix_modes() {
        let view = world_view();
        assert_eq!(view.draw_matrix(false), view.scene_projection);
        assert_ne!(view.draw_matrix(true), view.scene_projection);
    }

    #[test]
    fn test_hardware_transform_gate() {
        let mut view = world_view();
        view.hardware_transform_resolution_threshold = 0.1;
        assert!(view.use_hardware_transforms(true));
        assert!(!view.use_hardware_transforms(false));

        view.crosses_idl = true;
        assert!(!view.use_hardware_transforms(true));

        view.crosses_idl = false;
        view.hardware_transform_resolution_threshold = 10.0;
        assert!(!view.use_hardware_transforms(true));
    }

    #[test]
    fn test_mercator_projection() {
        let proj = WebMercatorProjection;
        let p = proj.forward(GeoPoint::new(0.0, 180.0));
        assert!((p.x - 20037508.342789244).abs() < 1e-3);
        let back = proj.inverse(p);
        assert!((back.lng - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_panned_to_bumps_version() {
        let view = world_view();
        let next = view.panned_to(GeoBounds::new(0.0, 0.0, 45.0, 90.0));
        assert_eq!(next.draw_version, view.draw_version + 1);
        assert_eq!(next.scale, 8.0);
    }
}
