//! Per-node resolution: drilling, pruning, loading, borrowing and compositing
//!
//! Every operation here works on node ids through the pyramid's arena. A
//! texture that a node lets go of mid-frame is pushed onto the retire list
//! and destroyed only after the frame's draws are flushed, since a batched
//! draw may still reference it.

use crate::core::config::FallbackLoadPolicy;
use crate::core::constants::{TEXTURE_HINT_RESOLVED, UNVERSIONED};
use crate::core::geo::{GeoPoint, Point3};
use crate::core::view::ViewState;
use crate::pyramid::node::{NodeGeometry, NodeId, QuadTileNode, Quadrant};
use crate::pyramid::patch::QuadTilePyramid;
use crate::pyramid::state::ResolutionState;
use crate::rendering::surface::{
    DrawCall, FilterMode, FramebufferStatus, GpuSurface, PrimitiveMode, ShaderVariant, TextureId,
};
use crate::rendering::texture::TextureResource;
use crate::tiles::cache::CacheKey;
use crate::tiles::loader::LoadOutcome;
use nalgebra::Matrix4;

impl<S: GpuSurface> QuadTilePyramid<S> {
    pub(crate) fn cache_key(&self, id: NodeId) -> CacheKey {
        CacheKey::new(self.uri.clone(), id)
    }

    pub(crate) fn create_node(&mut self, id: NodeId) {
        let node = QuadTileNode::new(
            id,
            &self.grid,
            self.options.grid_sample_distance,
            self.options.max_mesh_subdivisions,
        );
        if node.dead {
            log::trace!("{} lies outside the coverage", id);
        }
        self.nodes.insert(node);
    }

    fn state_of(&self, id: NodeId) -> ResolutionState {
        self.nodes.state(id)
    }

    fn set_state(&mut self, id: NodeId, state: ResolutionState) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.state = state;
        }
    }

    /// Draws the subtree of `id` at drill `level`
    pub(crate) fn draw_quad(&mut self, id: NodeId, view: &ViewState, level: u32) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let (half_lat, half_lng) = (node.half_lat, node.half_lng);

        self.release_invisible_children(id, view, half_lat, half_lng);

        if level > id.level {
            let pinned = self.options.fallback_loads == FallbackLoadPolicy::PinnedRoots && id.is_root();
            let needs_fallback = match self.options.fallback_loads {
                FallbackLoadPolicy::Disabled => false,
                _ => pinned || self.any_child_unresolvable(id),
            };

            if needs_fallback {
                let retry = match self.nodes.get(id) {
                    Some(n) => {
                        n.state == ResolutionState::Unresolved
                            || (n.state == ResolutionState::Unresolvable && n.derived_unresolvable_data)
                    }
                    None => false,
                };
                if retry {
                    self.check_cached_texture(id);
                    if self.state_of(id) == ResolutionState::Unresolved {
                        self.start_load(id);
                    }
                }
            }
            if self.state_of(id) == ResolutionState::Resolving {
                if !needs_fallback {
                    if let Some(pending) = self.nodes.get_mut(id).and_then(|n| n.pending.as_mut()) {
                        pending.cancel();
                    }
                }
                self.check_pending_texture(id);
            }

            self.draw_visible_children(id, view, half_lat, half_lng, level);

            let idle = self
                .nodes
                .get(id)
                .map_or(false, |n| n.borrowers.is_empty() && n.texture.is_some());
            if idle && !pinned {
                self.release_texture(id);
            }
        } else if level == id.level {
            self.draw_self(id, view);
        } else {
            log::error!("{} drawn below drill level {}", id, level);
            debug_assert!(false, "node below drill level");
        }
    }

    fn any_child_unresolvable(&self, id: NodeId) -> bool {
        self.nodes.get(id).map_or(false, |n| {
            n.children()
                .any(|c| self.state_of(c) == ResolutionState::Unresolvable)
        })
    }

    fn release_invisible_children(&mut self, id: NodeId, view: &ViewState, half_lat: f64, half_lng: f64) {
        let mut gone = [false; 4];
        let mark = |gone: &mut [bool; 4], a: Quadrant, b: Quadrant| {
            gone[a.index()] = true;
            gone[b.index()] = true;
        };

        if view.east < half_lng {
            mark(&mut gone, Quadrant::NorthEast, Quadrant::SouthEast);
        } else if view.west > half_lng {
            mark(&mut gone, Quadrant::NorthWest, Quadrant::SouthWest);
        }
        if view.south > half_lat {
            mark(&mut gone, Quadrant::SouthWest, Quadrant::SouthEast);
        } else if view.north < half_lat {
            mark(&mut gone, Quadrant::NorthWest, Quadrant::NorthEast);
        }

        for q in Quadrant::ALL {
            if !gone[q.index()] {
                continue;
            }
            if self.nodes.get(id).and_then(|n| n.child(q)).is_some() {
                self.release_child(id, q);
                self.stats.pruned += 1;
            }
        }
    }

    fn draw_visible_children(
        &mut self,
        id: NodeId,
        view: &ViewState,
        half_lat: f64,
        half_lng: f64,
        level: u32,
    ) {
        if view.east > half_lng {
            if view.north > half_lat {
                self.draw_child(id, Quadrant::NorthEast, view, level);
            }
            if view.south < half_lat {
                self.draw_child(id, Quadrant::SouthEast, view, level);
            }
        }
        if view.west < half_lng {
            if view.north > half_lat {
                self.draw_child(id, Quadrant::NorthWest, view, level);
            }
            if view.south < half_lat {
                self.draw_child(id, Quadrant::SouthWest, view, level);
            }
        }
    }

    fn draw_child(&mut self, id: NodeId, q: Quadrant, view: &ViewState, level: u32) {
        let child = id.child(q);
        let exists = match self.nodes.get(id) {
            Some(node) => node.child(q).is_some(),
            None => return,
        };
        if !exists {
            self.create_node(child);
            if let Some(node) = self.nodes.get_mut(id) {
                node.children[q.index()] = Some(child);
            }
        }
        if self.nodes.get(child).map_or(false, |c| !c.dead) {
            self.draw_quad(child, view, level);
        }
    }

    /// Leaf pass: resolve, fall back to an ancestor's texture and draw
    fn draw_self(&mut self, id: NodeId, view: &ViewState) {
        self.stats.nodes_drawn += 1;
        self.project_verts(id, view);

        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let (state, has_children, tile_version) = (node.state, node.has_children(), node.tile_version);

        if state.is_terminal() {
            let current = self.versions.version_of(id.level, id.row, id.col);
            if current != UNVERSIONED && current != tile_version {
                log::debug!("{} is stale (version {} is now {})", id, tile_version, current);
                self.set_state(id, ResolutionState::Unresolved);
            }
        }

        let state = self.state_of(id);
        if state == ResolutionState::Unresolved || (has_children && state == ResolutionState::Unresolvable) {
            self.resolve(id);
        }

        if self.state_of(id) != ResolutionState::Resolved {
            if self.state_of(id) == ResolutionState::Resolving {
                self.check_pending_texture(id);
            }
            if self.state_of(id) != ResolutionState::Resolved && self.try_borrowing(id) {
                let source = self.nodes.get(id).and_then(|n| n.borrow_node);
                let texture = source
                    .and_then(|b| self.nodes.get(b))
                    .and_then(|b| b.texture.as_ref().map(|t| t.id()));
                if let (Some(source), Some(texture)) = (source, texture) {
                    self.ensure_tex_coords(id, source);
                    self.draw_texture(id, texture);
                    self.stats.borrowed_draws += 1;
                }
            }
        }

        if self.state_of(id) == ResolutionState::Resolved {
            self.stop_borrowing(id);
        }

        let own = self
            .nodes
            .get(id)
            .and_then(|n| n.texture.as_ref().map(|t| t.id()));
        if let Some(texture) = own {
            self.ensure_tex_coords(id, id);
            self.draw_texture(id, texture);
        }
    }

    fn resolve(&mut self, id: NodeId) {
        self.check_cached_texture(id);
        if self.state_of(id) == ResolutionState::Resolved {
            return;
        }
        if self.options.texture_copy && self.compositing.is_available() {
            self.composite(id);
        }
        self.release_children(id);
        if self.state_of(id) == ResolutionState::Unresolved {
            self.start_load(id);
        }
    }

    fn start_load(&mut self, id: NodeId) {
        let version = self.versions.version_of(id.level, id.row, id.col);
        let pending = self.loader.load(id, version);
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        if let Some(mut old) = node.pending.replace(pending) {
            old.cancel();
        }
        node.state = ResolutionState::Resolving;
        self.stats.loads_issued += 1;
    }

    /// Adopts a texture parked in the cache for this node, unless the node
    /// already holds newer data.
    pub(crate) fn check_cached_texture(&mut self, id: NodeId) {
        if self.cache.is_none() {
            return;
        }
        let key = self.cache_key(id);
        let Some(cache) = self.cache.as_mut() else {
            return;
        };
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };

        let Some(entry) = cache.remove(&key) else {
            node.derived_unresolvable_data = false;
            return;
        };
        let (resolved, version) = (entry.is_resolved(), entry.version);
        if node.texture.is_some() && node.tile_version > version {
            log::trace!("cached texture for {} is older than the loaded one", id);
            self.retired.push(entry.texture);
            return;
        }

        if let Some(old) = node.texture.replace(entry.texture) {
            self.retired.push(old);
        }
        if resolved {
            node.state = ResolutionState::Resolved;
            if let Some(mut pending) = node.pending.take() {
                pending.cancel();
            }
        }
        node.tile_version = version;
        node.geometry.tex_coords_dirty = true;
        node.geometry.verts_dirty = true;
        log::trace!("{} adopted cached texture (resolved: {})", id, resolved);
    }

    /// Installs the outcome of the node's in-flight load, if it has one
    pub(crate) fn check_pending_texture(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        let Some(pending) = node.pending.as_mut() else {
            return;
        };
        let outcome = pending.poll();
        if outcome.is_pending() {
            return;
        }
        let version = pending.version();
        node.pending = None;

        match outcome {
            LoadOutcome::Pending => {}
            LoadOutcome::Canceled => node.state = ResolutionState::Unresolved,
            LoadOutcome::Unresolved => {
                node.state = ResolutionState::Unresolvable;
                node.tile_version = version;
            }
            LoadOutcome::Resolved(pixels) => {
                let reused = match node.texture.as_mut() {
                    Some(texture) => texture.reupload(&mut self.surface, &pixels),
                    None => Ok(false),
                };
                let installed = match reused {
                    Ok(true) => Ok(()),
                    Ok(false) => {
                        if let Some(old) = node.texture.take() {
                            self.retired.push(old);
                        }
                        TextureResource::from_pixels(&mut self.surface, &pixels)
                            .map(|texture| node.texture = Some(texture))
                    }
                    Err(e) => Err(e),
                };
                match installed {
                    Ok(()) => {
                        node.state = ResolutionState::Resolved;
                        node.derived_unresolvable_data = false;
                        node.geometry.tex_coords_dirty = true;
                        node.geometry.verts_dirty = true;
                    }
                    Err(e) => {
                        log::warn!("failed to upload tile {}: {}", id, e);
                        node.state = ResolutionState::Unresolvable;
                    }
                }
                node.tile_version = version;
            }
        }
    }

    /// Cancels the node's load and parks its texture in the cache
    pub(crate) fn release_texture(&mut self, id: NodeId) {
        if let Some(pending) = self.nodes.get_mut(id).and_then(|n| n.pending.as_mut()) {
            pending.cancel();
        }
        self.check_pending_texture(id);

        let key = self.cache_key(id);
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        if let Some(texture) = node.texture.take() {
            match self.cache.as_mut() {
                Some(cache) => {
                    let hints = if node.state == ResolutionState::Resolved {
                        TEXTURE_HINT_RESOLVED
                    } else {
                        0
                    };
                    let evicted = cache.put(key, texture, hints, node.tile_version);
                    self.retired.extend(evicted);
                }
                None => self.retired.push(texture),
            }
            node.geometry.tex_coords_dirty = true;
        }
        if node.state != ResolutionState::Unresolvable {
            node.state = ResolutionState::Unresolved;
        }
    }

    /// Releases the subtree below `id` and everything `id` holds. The node
    /// itself stays in the arena; its parent removes it.
    pub(crate) fn release_node(&mut self, id: NodeId) {
        self.release_children(id);
        if let Some(node) = self.nodes.get_mut(id) {
            node.geometry.tex_coords_dirty = true;
            node.geometry.verts_dirty = true;
        }
        self.release_texture(id);
        self.stop_borrowing(id);
    }

    pub(crate) fn release_children(&mut self, id: NodeId) {
        for q in Quadrant::ALL {
            self.release_child(id, q);
        }
    }

    fn release_child(&mut self, id: NodeId, q: Quadrant) {
        let Some(child) = self
            .nodes
            .get_mut(id)
            .and_then(|n| n.children[q.index()].take())
        else {
            return;
        };
        self.release_node(child);
        if let Some(removed) = self.nodes.remove(child) {
            debug_assert!(removed.borrowers.is_empty(), "{} released with borrowers", child);
            for borrower in removed.borrowers {
                if let Some(b) = self.nodes.get_mut(borrower) {
                    b.borrow_node = None;
                }
            }
        }
    }

    /// Finds the ancestor whose texture this node should show while it has
    /// none of its own. Returns false when there is nothing to borrow.
    fn try_borrowing(&mut self, id: NodeId) -> bool {
        if !self.options.texture_borrow {
            return false;
        }
        let Some(current) = self.nodes.get(id).map(|n| n.borrow_node) else {
            return false;
        };

        let mut found = None;
        let mut fallback = None;
        let mut cursor = id.parent();
        while let Some(aid) = cursor {
            let Some(ancestor) = self.nodes.get(aid) else {
                break;
            };
            if ancestor.state == ResolutionState::Resolved
                || (current == Some(aid) && ancestor.texture.is_some())
            {
                found = Some(aid);
                break;
            }
            // only adoption below counts as a cache hit
            if let Some(cache) = self.cache.as_ref() {
                let key = CacheKey::new(self.uri.clone(), aid);
                match cache.peek(&key) {
                    Some(entry) if entry.is_resolved() => {
                        found = Some(aid);
                        break;
                    }
                    Some(_) if fallback.is_none() => fallback = Some(aid),
                    _ => {}
                }
            }
            if ancestor.texture.is_some() && fallback.is_none() {
                fallback = Some(aid);
            }
            cursor = aid.parent();
        }

        match found.or(fallback) {
            Some(target) => {
                if current != Some(target) {
                    if self.nodes.get(target).map_or(false, |n| n.texture.is_none()) {
                        self.check_cached_texture(target);
                    }
                    self.start_borrowing(id, target);
                }
                true
            }
            None => {
                self.stop_borrowing(id);
                false
            }
        }
    }

    fn start_borrowing(&mut self, id: NodeId, ancestor: NodeId) {
        let current = self.nodes.get(id).and_then(|n| n.borrow_node);
        if current == Some(ancestor) {
            return;
        }
        if current.is_some() {
            self.stop_borrowing(id);
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.borrow_node = Some(ancestor);
            node.geometry.tex_coords_source = None;
        }
        if let Some(a) = self.nodes.get_mut(ancestor) {
            a.borrowers.insert(id);
        }
        log::trace!("{} borrows from {}", id, ancestor);
    }

    fn stop_borrowing(&mut self, id: NodeId) {
        let Some(ancestor) = self.nodes.get_mut(id).and_then(|n| n.borrow_node.take()) else {
            return;
        };
        if let Some(a) = self.nodes.get_mut(ancestor) {
            a.borrowers.remove(&id);
        }
    }

    /// Renders the children's textures into this node's texture
    fn composite(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let mut sources = Vec::with_capacity(4);
        let mut children_resolved = true;
        for q in Quadrant::ALL {
            match node.child(q).and_then(|c| self.nodes.get(c)) {
                Some(child) if child.texture.is_some() => {
                    children_resolved &= child.state == ResolutionState::Resolved;
                    sources.push(child.id);
                }
                _ => children_resolved = false,
            }
        }
        if sources.is_empty() {
            return;
        }

        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        let mut created = false;
        if node.texture.is_none() {
            match TextureResource::create(
                &mut self.surface,
                self.grid.tile_pixel_width,
                self.grid.tile_pixel_height,
                FilterMode::Linear,
            ) {
                Ok(texture) => {
                    node.texture = Some(texture);
                    created = true;
                }
                Err(e) => {
                    log::warn!("failed to create composite texture for {}: {}", id, e);
                    self.compositing.disable();
                    return;
                }
            }
        }
        let Some((target, width, height)) = node
            .texture
            .as_ref()
            .map(|t| (t.id(), t.width(), t.height()))
        else {
            return;
        };

        let status = match self.scratch.acquire(&mut self.surface, width, height) {
            Ok((framebuffer, depth)) => self.surface.bind_framebuffer(framebuffer, target, depth),
            Err(e) => {
                log::warn!("failed to create composite framebuffer: {}", e);
                FramebufferStatus::Incomplete
            }
        };

        if status != FramebufferStatus::Complete {
            self.surface.unbind_framebuffer();
            log::warn!("offscreen framebuffer incomplete, disabling texture copy");
            if created {
                if let Some(texture) = self.nodes.get_mut(id).and_then(|n| n.texture.take()) {
                    self.retired.push(texture);
                }
            }
            self.compositing.disable();
            return;
        }

        self.surface.clear([0.0; 4]);
        self.surface.use_program(ShaderVariant::Plain);
        self.surface.set_matrix(&Matrix4::new_orthographic(
            0.0,
            width as f32,
            0.0,
            height as f32,
            -1.0,
            1.0,
        ));
        self.surface.set_color([1.0; 4]);

        let mut parts = 0;
        for child_id in sources {
            let (Some(parent), Some(child)) = (self.nodes.get(id), self.nodes.get(child_id)) else {
                continue;
            };
            let Some(texture) = child.texture.as_ref() else {
                continue;
            };
            let (tw, th) = (texture.width() as f64, texture.height() as f64);
            let b = child.bounds;
            let corners = [b.south_west(), b.south_east(), b.north_east(), b.north_west()];

            let mut tex_coords = [0f32; 8];
            let mut verts = [0f32; 8];
            for (i, corner) in corners.iter().enumerate() {
                let (x, y) = child.ground_to_image(&self.grid, *corner);
                let east = i == 1 || i == 2;
                let north = i >= 2;
                // snap corners to whole texels of the child image
                let u = if east { (x + 0.5).ceil() } else { (x - 0.5).floor() };
                let v = if north { (y + 0.5).ceil() } else { (y - 0.5).floor() };
                tex_coords[i * 2] = (u / tw) as f32;
                tex_coords[i * 2 + 1] = (v / th) as f32;

                let (px, py) = parent.ground_to_image(&self.grid, *corner);
                verts[i * 2] = px as f32;
                verts[i * 2 + 1] = py as f32;
            }

            self.surface.draw(&DrawCall {
                texture: texture.id(),
                mode: PrimitiveMode::TriangleFan,
                vertex_count: 4,
                vertex_size: 2,
                vertices: &verts,
                tex_coords: &tex_coords,
                indices: None,
            });
            if child.state == ResolutionState::Resolved {
                parts += 1;
            }
        }
        self.surface.unbind_framebuffer();

        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        let was_unresolvable = node.state == ResolutionState::Unresolvable;
        if was_unresolvable {
            if parts == 4 {
                node.state = ResolutionState::Resolved;
            }
            node.derived_unresolvable_data = true;
        }
        node.geometry.tex_coords_dirty = true;
        // nearest while any quadrant is missing
        let filter = if children_resolved {
            FilterMode::Linear
        } else {
            FilterMode::Nearest
        };
        if let Some(texture) = node.texture.as_mut() {
            texture.set_filter(&mut self.surface, filter);
        }
        self.stats.composites += 1;
        log::trace!("composited {} children into {}", parts, id);
    }

    /// Brings the node's vertices up to date for this frame's view
    fn project_verts(&mut self, id: NodeId, view: &ViewState) {
        let hardware = view.use_hardware_transforms(self.options.hardware_transforms);
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        let g = &mut node.geometry;

        if hardware {
            if g.verts_dirty || g.verts_srid != Some(view.srid) || !g.verts_projected {
                fill_verts(g, |p| view.project(p));
                g.verts_srid = Some(view.srid);
            }
        } else if g.verts_dirty
            || g.verts_draw_version != Some(view.draw_version)
            || g.verts_srid != Some(view.srid)
            || g.verts_projected
        {
            fill_verts(g, |p| view.forward(p));
            g.verts_srid = Some(view.srid);
            g.verts_draw_version = Some(view.draw_version);
        }
        g.verts_projected = hardware;
    }

    /// Texture coordinates of `id`'s points inside `source`'s texture
    fn ensure_tex_coords(&mut self, id: NodeId, source: NodeId) {
        let Some(key) = self
            .nodes
            .get(source)
            .and_then(|s| s.texture.as_ref())
            .map(|t| (source, t.width(), t.height()))
        else {
            return;
        };
        let mut coords = match self.nodes.get_mut(id) {
            Some(node) => {
                let g = &node.geometry;
                if !g.tex_coords_dirty && g.tex_coords_source == Some(key) {
                    return;
                }
                std::mem::take(&mut node.geometry.tex_coords)
            }
            None => return,
        };

        coords.clear();
        let (w, h) = (key.1 as f64, key.2 as f64);
        if let (Some(node), Some(src)) = (self.nodes.get(id), self.nodes.get(source)) {
            for point in &node.geometry.points {
                let (x, y) = src.ground_to_image(&self.grid, *point);
                coords.push((x / w) as f32);
                coords.push((y / h) as f32);
            }
        }

        if let Some(node) = self.nodes.get_mut(id) {
            node.geometry.tex_coords = coords;
            node.geometry.tex_coords_source = Some(key);
            node.geometry.tex_coords_dirty = false;
        }
    }

    fn draw_texture(&mut self, id: NodeId, texture: TextureId) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let g = &node.geometry;
        self.backend.set_use_forward_matrix(&mut self.surface, g.verts_projected);
        self.backend.submit(
            &mut self.surface,
            &DrawCall {
                texture,
                mode: g.mode,
                vertex_count: g.points.len(),
                vertex_size: 3,
                vertices: &g.verts,
                tex_coords: &g.tex_coords,
                indices: g.indices.as_deref(),
            },
        );
        self.stats.draws += 1;
    }

    pub(crate) fn suspend_node(&mut self, id: NodeId) {
        let children: Vec<NodeId> = self.nodes.get(id).map(|n| n.children().collect()).unwrap_or_default();
        for child in children {
            self.suspend_node(child);
        }
        if self.state_of(id) != ResolutionState::Resolving {
            return;
        }
        if let Some(pending) = self.nodes.get_mut(id).and_then(|n| n.pending.as_mut()) {
            pending.cancel();
        }
        self.check_pending_texture(id);
        if !self.state_of(id).is_terminal() {
            self.set_state(id, ResolutionState::Suspended);
        }
    }

    pub(crate) fn resume_node(&mut self, id: NodeId) {
        let children: Vec<NodeId> = self.nodes.get(id).map(|n| n.children().collect()).unwrap_or_default();
        for child in children {
            self.resume_node(child);
        }
        if self.state_of(id) == ResolutionState::Suspended {
            self.set_state(id, ResolutionState::Unresolved);
        }
    }

    pub(crate) fn aggregate_state(&self, id: NodeId) -> ResolutionState {
        let Some(node) = self.nodes.get(id) else {
            return ResolutionState::Unresolved;
        };
        let mut result = None;
        for child in node.children() {
            let state = self.aggregate_state(child);
            if state == ResolutionState::Resolving {
                return state;
            }
            match result {
                None => result = Some(state),
                Some(r) if r != state && state != ResolutionState::Resolved => result = Some(state),
                _ => {}
            }
        }
        result.unwrap_or(node.state)
    }
}

fn fill_verts(g: &mut NodeGeometry, transform: impl Fn(GeoPoint) -> Point3) {
    g.verts.clear();
    for point in &g.points {
        let p = transform(*point);
        g.verts.extend_from_slice(&[p.x as f32, p.y as f32, p.z as f32]);
    }
    g.verts_dirty = false;
}
