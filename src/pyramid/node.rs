//! Quad tree nodes and the arena that owns them
//!
//! Nodes live in a flat [`NodeTable`] keyed by [`NodeId`]. A parent refers to
//! its children by id, a borrowing node refers to its ancestor by id and the
//! ancestor keeps the ids of its borrowers. No node holds a pointer to
//! another, so releasing a subtree is a walk over ids.

use crate::core::bounds::GeoBounds;
use crate::core::geo::GeoPoint;
use crate::pyramid::state::ResolutionState;
use crate::rendering::surface::PrimitiveMode;
use crate::rendering::texture::TextureResource;
use crate::tiles::clip::{self, TileGeometry};
use crate::tiles::grid::TileGrid;
use crate::tiles::loader::PendingLoad;
use fxhash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Tile coordinate of a node. Rows count northward from the grid origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub level: u32,
    pub row: u32,
    pub col: u32,
}

impl NodeId {
    pub fn new(level: u32, row: u32, col: u32) -> Self {
        Self { level, row, col }
    }

    pub fn root(row: u32, col: u32) -> Self {
        Self::new(0, row, col)
    }

    pub fn is_root(&self) -> bool {
        self.level == 0
    }

    pub fn parent(&self) -> Option<NodeId> {
        if self.level == 0 {
            return None;
        }
        Some(Self::new(self.level - 1, self.row >> 1, self.col >> 1))
    }

    pub fn child(&self, quadrant: Quadrant) -> NodeId {
        let (dr, dc) = quadrant.offsets();
        Self::new(self.level + 1, self.row * 2 + dr, self.col * 2 + dc)
    }

    /// Which quadrant of its parent this node is
    pub fn quadrant(&self) -> Option<Quadrant> {
        if self.level == 0 {
            return None;
        }
        Some(match (self.row & 1 == 1, self.col & 1 == 1) {
            (true, false) => Quadrant::NorthWest,
            (true, true) => Quadrant::NorthEast,
            (false, false) => Quadrant::SouthWest,
            (false, true) => Quadrant::SouthEast,
        })
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.level, self.row, self.col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quadrant {
    NorthWest = 0,
    NorthEast = 1,
    SouthWest = 2,
    SouthEast = 3,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [
        Quadrant::NorthWest,
        Quadrant::NorthEast,
        Quadrant::SouthWest,
        Quadrant::SouthEast,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Row and column offset of the child inside the parent's 2x2 block
    fn offsets(self) -> (u32, u32) {
        match self {
            Quadrant::NorthWest => (1, 0),
            Quadrant::NorthEast => (1, 1),
            Quadrant::SouthWest => (0, 0),
            Quadrant::SouthEast => (0, 1),
        }
    }
}

/// Points a node draws plus their projected vertices and texture coordinates
#[derive(Debug, Clone)]
pub struct NodeGeometry {
    pub(crate) points: Vec<GeoPoint>,
    pub(crate) mode: PrimitiveMode,
    pub(crate) indices: Option<Vec<u16>>,
    /// xyz per point, screen space or projected space
    pub(crate) verts: Vec<f32>,
    pub(crate) tex_coords: Vec<f32>,
    pub(crate) tex_coords_dirty: bool,
    /// Node and texture size the coordinates were computed against
    pub(crate) tex_coords_source: Option<(NodeId, u32, u32)>,
    pub(crate) verts_dirty: bool,
    pub(crate) verts_srid: Option<i32>,
    pub(crate) verts_draw_version: Option<u64>,
    pub(crate) verts_projected: bool,
}

impl NodeGeometry {
    fn new(geometry: TileGeometry) -> Self {
        let count = geometry.points.len();
        Self {
            points: geometry.points,
            mode: geometry.mode,
            indices: geometry.indices,
            verts: vec![0.0; count * 3],
            tex_coords: vec![0.0; count * 2],
            tex_coords_dirty: true,
            tex_coords_source: None,
            verts_dirty: true,
            verts_srid: None,
            verts_draw_version: None,
            verts_projected: false,
        }
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn mode(&self) -> PrimitiveMode {
        self.mode
    }

    pub fn indices(&self) -> Option<&[u16]> {
        self.indices.as_deref()
    }

    pub fn verts(&self) -> &[f32] {
        &self.verts
    }

    pub fn tex_coords(&self) -> &[f32] {
        &self.tex_coords
    }

    /// True if the vertices are in projected space
    pub fn is_projected(&self) -> bool {
        self.verts_projected
    }
}

/// One tile of the pyramid and its resolution state
#[derive(Debug)]
pub struct QuadTileNode {
    pub(crate) id: NodeId,
    pub(crate) children: [Option<NodeId>; 4],
    pub(crate) state: ResolutionState,
    pub(crate) texture: Option<TextureResource>,
    pub(crate) tile_version: u64,
    pub(crate) pending: Option<PendingLoad>,
    /// Texture was synthesized from children while the tile itself has no data
    pub(crate) derived_unresolvable_data: bool,
    pub(crate) borrow_node: Option<NodeId>,
    pub(crate) borrowers: FxHashSet<NodeId>,
    pub(crate) bounds: GeoBounds,
    pub(crate) half_lat: f64,
    pub(crate) half_lng: f64,
    /// Outside the dataset coverage, never drawn
    pub(crate) dead: bool,
    pub(crate) geometry: NodeGeometry,
}

impl QuadTileNode {
    pub(crate) fn new(id: NodeId, grid: &TileGrid, sample_distance: f64, max_subdivisions: u32) -> Self {
        let bounds = grid.tile_bounds(id.level, id.row, id.col);
        // the south-east child's north-west corner is the split point
        let split = grid.tile_bounds(id.level + 1, id.row * 2, id.col * 2 + 1);
        let subs = clip::subdivisions(grid.zero_height, id.level, sample_distance, max_subdivisions);
        let geometry = clip::tile_geometry(&bounds, &grid.coverage, subs);
        let dead = geometry.is_none();
        let geometry = geometry.unwrap_or(TileGeometry {
            points: Vec::new(),
            mode: PrimitiveMode::TriangleFan,
            indices: None,
        });

        Self {
            id,
            children: [None; 4],
            state: ResolutionState::Unresolved,
            texture: None,
            tile_version: 0,
            pending: None,
            derived_unresolvable_data: false,
            borrow_node: None,
            borrowers: FxHashSet::default(),
            bounds,
            half_lat: split.north,
            half_lng: split.west,
            dead,
            geometry: NodeGeometry::new(geometry),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.id.parent()
    }

    pub fn state(&self) -> ResolutionState {
        self.state
    }

    pub fn texture(&self) -> Option<&TextureResource> {
        self.texture.as_ref()
    }

    pub fn has_texture(&self) -> bool {
        self.texture.is_some()
    }

    pub fn tile_version(&self) -> u64 {
        self.tile_version
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn has_derived_unresolvable_data(&self) -> bool {
        self.derived_unresolvable_data
    }

    pub fn borrow_node(&self) -> Option<NodeId> {
        self.borrow_node
    }

    pub fn borrowers(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.borrowers.iter().copied()
    }

    pub fn borrower_count(&self) -> usize {
        self.borrowers.len()
    }

    pub fn child(&self, quadrant: Quadrant) -> Option<NodeId> {
        self.children[quadrant.index()]
    }

    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.iter().flatten().copied()
    }

    pub fn has_children(&self) -> bool {
        self.children.iter().any(Option::is_some)
    }

    pub fn bounds(&self) -> GeoBounds {
        self.bounds
    }

    /// Latitude and longitude where the node splits into quadrants
    pub fn split(&self) -> (f64, f64) {
        (self.half_lat, self.half_lng)
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn geometry(&self) -> &NodeGeometry {
        &self.geometry
    }

    /// Pixel position of `point` in this node's tile image, y down from north
    pub fn ground_to_image(&self, grid: &TileGrid, point: GeoPoint) -> (f64, f64) {
        let NodeId { level, row, col } = self.id;
        (
            grid.tile_pixel_x(level, row, col, point.lng),
            grid.tile_pixel_y(level, row, col, point.lat),
        )
    }

    pub fn image_to_ground(&self, grid: &TileGrid, x: f64, y: f64) -> GeoPoint {
        let NodeId { level, row, col } = self.id;
        GeoPoint::new(
            grid.tile_pixel_lat(level, row, col, y),
            grid.tile_pixel_lng(level, row, col, x),
        )
    }
}

/// Arena of all live nodes of a pyramid
#[derive(Debug, Default)]
pub struct NodeTable {
    nodes: FxHashMap<NodeId, QuadTileNode>,
}

impl NodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NodeId) -> Option<&QuadTileNode> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut QuadTileNode> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub(crate) fn insert(&mut self, node: QuadTileNode) {
        self.nodes.insert(node.id, node);
    }

    pub(crate) fn remove(&mut self, id: NodeId) -> Option<QuadTileNode> {
        self.nodes.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QuadTileNode> {
        self.nodes.values()
    }

    /// State of `id`, `Unresolved` for nodes that do not exist
    pub fn state(&self, id: NodeId) -> ResolutionState {
        self.get(id).map_or(ResolutionState::Unresolved, |n| n.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_parent_round_trip() {
        let id = NodeId::new(2, 3, 1);
        for q in Quadrant::ALL {
            let child = id.child(q);
            assert_eq!(child.parent(), Some(id));
            assert_eq!(child.quadrant(), Some(q));
        }
        assert_eq!(id.child(Quadrant::NorthWest), NodeId::new(3, 7, 2));
        assert_eq!(id.child(Quadrant::SouthEast), NodeId::new(3, 6, 3));
        assert_eq!(NodeId::root(0, 1).parent(), None);
        assert_eq!(id.to_string(), "2/3/1");
    }

    #[test]
    fn test_split_and_bounds() {
        let grid = TileGrid::global_equirectangular(256, 4);
        let node = QuadTileNode::new(NodeId::root(0, 1), &grid, 0.5, 32);
        assert_eq!(node.bounds(), GeoBounds::new(-90.0, 0.0, 90.0, 180.0));
        assert_eq!(node.split(), (0.0, 90.0));
        assert!(!node.is_dead());
        assert_eq!(node.geometry().mode(), PrimitiveMode::TriangleStrip);
    }

    #[test]
    fn test_image_ground_mapping() {
        let grid = TileGrid::global_equirectangular(256, 4);
        let node = QuadTileNode::new(NodeId::new(1, 1, 0), &grid, 0.5, 32);
        // tile spans lat 0..90, lng -180..-90
        let (x, y) = node.ground_to_image(&grid, GeoPoint::new(90.0, -180.0));
        assert_eq!((x, y), (0.0, 0.0));
        let (x, y) = node.ground_to_image(&grid, GeoPoint::new(0.0, -90.0));
        assert_eq!((x, y), (256.0, 256.0));
        let g = node.image_to_ground(&grid, 128.0, 128.0);
        assert_eq!((g.lat, g.lng), (45.0, -135.0));
    }

    #[test]
    fn test_node_outside_coverage_is_dead() {
        let grid = TileGrid::global_equirectangular(256, 4).with_coverage(
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(10.0, 0.0),
            GeoPoint::new(10.0, 10.0),
            GeoPoint::new(0.0, 10.0),
        );
        assert!(QuadTileNode::new(NodeId::new(1, 0, 0), &grid, 0.5, 32).is_dead());
        assert!(!QuadTileNode::new(NodeId::new(1, 1, 2), &grid, 0.5, 32).is_dead());
    }
}
