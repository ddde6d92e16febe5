//! Tile cache implementation for Detour
//!
//! The [`TileCache`] keeps every navigation mesh layer of a world in
//! compressed form together with the temporary obstacles placed on it.
//! Adding or removing an obstacle only queues a request; repeated calls to
//! [`TileCache::update`] rebuild the affected tiles one at a time and
//! publish them to a navigation mesh.

use std::collections::VecDeque;

use super::compressor::TileCacheCompressor;
use super::config::TileCacheParams;
use super::obstacle::{
    Obstacle, ObstacleData, ObstacleRequest, ObstacleRequestAction, ObstacleState,
};
use super::refs::{next_obstacle_salt, CompressedTileRef, ObstacleRef, TileRefCodec};
use super::tile_cache_builder::{build_tile_nav_data, TileCacheMeshProcess};
use super::tile_cache_data::{LayerWireFormat, TileCacheLayer, TileCacheLayerHeader};
use super::tile_cache_integration::{replace_nav_mesh_tile, NavMeshTiles};
use detour::Status;
use recast_common::{next_pow2, overlap_bounds, Error, Result};

/// Compressed tile slot
#[derive(Debug, Clone)]
pub struct CompressedTile {
    /// Salt value for reference generation
    salt: u32,
    /// Header of the stored layer, `None` while the slot is free
    header: Option<TileCacheLayerHeader>,
    /// Header bytes followed by the compressed grid
    data: Vec<u8>,
    compressed_offset: usize,
    flags: u8,
    /// Next tile in the same position bucket
    next_in_bucket: Option<usize>,
    /// Next free tile slot
    next_free: Option<usize>,
    idx: usize,
}

impl CompressedTile {
    fn free(idx: usize) -> Self {
        Self {
            salt: 1,
            header: None,
            data: Vec::new(),
            compressed_offset: 0,
            flags: 0,
            next_in_bucket: None,
            next_free: None,
            idx,
        }
    }

    /// Header of the stored layer
    pub fn header(&self) -> Option<&TileCacheLayerHeader> {
        self.header.as_ref()
    }

    /// The full tile data as added
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The compressed layer grid
    pub fn compressed_data(&self) -> &[u8] {
        &self.data[self.compressed_offset.min(self.data.len())..]
    }

    pub fn compressed_size(&self) -> usize {
        self.compressed_data().len()
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn salt(&self) -> u32 {
        self.salt
    }
}

#[inline]
fn compute_tile_hash(x: i32, y: i32, mask: usize) -> usize {
    const H1: u32 = 0x8da6_b343; // Large multiplicative constants;
    const H2: u32 = 0xd816_3841; // here arbitrarily chosen primes
    let n = H1.wrapping_mul(x as u32).wrapping_add(H2.wrapping_mul(y as u32));
    n as usize & mask
}

/// Compressed layer store with dynamic obstacles
pub struct TileCache {
    params: TileCacheParams,
    format: LayerWireFormat,
    codec: TileRefCodec,
    compressor: Box<dyn TileCacheCompressor>,
    mesh_process: Option<Box<dyn TileCacheMeshProcess>>,

    tiles: Vec<CompressedTile>,
    /// Tile position buckets
    pos_lookup: Vec<Option<usize>>,
    lut_mask: usize,
    next_free_tile: Option<usize>,
    tile_count: usize,

    obstacles: Vec<Obstacle>,
    next_free_obstacle: Option<usize>,

    requests: Vec<ObstacleRequest>,
    update: VecDeque<CompressedTileRef>,
}

impl std::fmt::Debug for TileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCache")
            .field("params", &self.params)
            .field("format", &self.format)
            .field("compressor", &self.compressor)
            .field("mesh_process", &self.mesh_process.is_some())
            .field("tile_count", &self.tile_count)
            .field("obstacles", &self.obstacles.len())
            .field("requests", &self.requests.len())
            .field("update", &self.update.len())
            .finish()
    }
}

impl TileCache {
    /// Creates a tile cache reading and writing layers in the default wire
    /// format
    pub fn new(
        params: TileCacheParams,
        compressor: Box<dyn TileCacheCompressor>,
        mesh_process: Option<Box<dyn TileCacheMeshProcess>>,
    ) -> Result<Self> {
        Self::with_wire_format(params, LayerWireFormat::default(), compressor, mesh_process)
    }

    /// Creates a tile cache for layers in the given wire format
    pub fn with_wire_format(
        params: TileCacheParams,
        format: LayerWireFormat,
        compressor: Box<dyn TileCacheCompressor>,
        mesh_process: Option<Box<dyn TileCacheMeshProcess>>,
    ) -> Result<Self> {
        params.validate()?;
        let max_tiles = params.max_tiles as usize;
        let codec = TileRefCodec::new(max_tiles)?;

        let lut_size = next_pow2((max_tiles / 4) as u32).max(1) as usize;

        let mut tiles: Vec<CompressedTile> = (0..max_tiles).map(CompressedTile::free).collect();
        for (i, tile) in tiles.iter_mut().enumerate() {
            tile.next_free = if i + 1 < max_tiles { Some(i + 1) } else { None };
        }

        log::debug!(
            "created tile cache: {} tiles ({} tile bits, {} salt bits), {} buckets, {} obstacles",
            max_tiles,
            codec.tile_bits(),
            codec.salt_bits(),
            lut_size,
            params.max_obstacles
        );

        Ok(Self {
            params,
            format,
            codec,
            compressor,
            mesh_process,
            tiles,
            pos_lookup: vec![None; lut_size],
            lut_mask: lut_size - 1,
            next_free_tile: Some(0),
            tile_count: 0,
            obstacles: Vec::new(),
            next_free_obstacle: None,
            requests: Vec::new(),
            update: VecDeque::new(),
        })
    }

    pub fn params(&self) -> &TileCacheParams {
        &self.params
    }

    pub fn wire_format(&self) -> LayerWireFormat {
        self.format
    }

    pub fn compressor(&self) -> &dyn TileCacheCompressor {
        self.compressor.as_ref()
    }

    /// Number of stored tiles
    pub fn tile_count(&self) -> usize {
        self.tile_count
    }

    /// Number of tile slots
    pub fn max_tiles(&self) -> usize {
        self.tiles.len()
    }

    /// Gets the tile stored in slot `idx`
    pub fn get_tile(&self, idx: usize) -> Option<&CompressedTile> {
        self.tiles.get(idx).filter(|t| t.header.is_some())
    }

    /// Adds a compressed tile.
    ///
    /// Returns the null reference when a tile already exists at the same
    /// (x, y, layer), and fails when the header is malformed or every slot
    /// is in use.
    pub fn add_tile(&mut self, data: Vec<u8>, flags: u8) -> Result<CompressedTileRef> {
        let header = TileCacheLayerHeader::read_from(&data, self.format)?;

        if self.find_tile(header.tx, header.ty, header.tlayer).is_some() {
            log::debug!(
                "tile ({}, {}, {}) already exists",
                header.tx,
                header.ty,
                header.tlayer
            );
            return Ok(CompressedTileRef::NULL);
        }

        let idx = self.next_free_tile.ok_or_else(|| {
            Error::TileCache(format!("{}: out of tile storage", Status::OutOfMemory))
        })?;

        let h = compute_tile_hash(header.tx, header.ty, self.lut_mask);
        let tile = &mut self.tiles[idx];
        self.next_free_tile = tile.next_free.take();
        tile.next_in_bucket = self.pos_lookup[h];
        self.pos_lookup[h] = Some(idx);

        tile.header = Some(header);
        tile.data = data;
        tile.compressed_offset = self.format.header_size();
        tile.flags = flags;
        self.tile_count += 1;

        Ok(self.codec.encode(tile.salt, idx))
    }

    /// Removes a tile, returning the data it was added with
    pub fn remove_tile(&mut self, tile_ref: CompressedTileRef) -> Result<Vec<u8>> {
        let idx = self.checked_tile_index(tile_ref)?;
        let (tx, ty) = match &self.tiles[idx].header {
            Some(header) => (header.tx, header.ty),
            None => return Err(invalid_tile_ref(tile_ref)),
        };

        // Unlink from the position bucket
        let h = compute_tile_hash(tx, ty, self.lut_mask);
        let mut prev: Option<usize> = None;
        let mut cur = self.pos_lookup[h];
        while let Some(c) = cur {
            let next = self.tiles[c].next_in_bucket;
            if c == idx {
                match prev {
                    Some(p) => self.tiles[p].next_in_bucket = next,
                    None => self.pos_lookup[h] = next,
                }
                break;
            }
            prev = cur;
            cur = next;
        }

        let next_salt = self.codec.next_salt(self.tiles[idx].salt);
        let tile = &mut self.tiles[idx];
        let data = std::mem::take(&mut tile.data);
        tile.header = None;
        tile.compressed_offset = 0;
        tile.flags = 0;
        tile.next_in_bucket = None;
        tile.salt = next_salt;
        tile.next_free = self.next_free_tile;
        self.next_free_tile = Some(idx);
        self.tile_count -= 1;

        Ok(data)
    }

    fn find_tile(&self, tx: i32, ty: i32, tlayer: i32) -> Option<usize> {
        let h = compute_tile_hash(tx, ty, self.lut_mask);
        let mut cur = self.pos_lookup[h];
        while let Some(idx) = cur {
            let tile = &self.tiles[idx];
            if let Some(header) = &tile.header {
                if header.tx == tx && header.ty == ty && header.tlayer == tlayer {
                    return Some(idx);
                }
            }
            cur = tile.next_in_bucket;
        }
        None
    }

    /// Gets the tile at (tx, ty, tlayer)
    pub fn get_tile_at(&self, tx: i32, ty: i32, tlayer: i32) -> Option<&CompressedTile> {
        self.find_tile(tx, ty, tlayer).map(|idx| &self.tiles[idx])
    }

    /// Gets references to every layer stored at tile column (tx, ty)
    pub fn get_tiles_at(&self, tx: i32, ty: i32) -> Vec<CompressedTileRef> {
        let h = compute_tile_hash(tx, ty, self.lut_mask);
        let mut refs = Vec::new();
        let mut cur = self.pos_lookup[h];
        while let Some(idx) = cur {
            let tile = &self.tiles[idx];
            if let Some(header) = &tile.header {
                if header.tx == tx && header.ty == ty {
                    refs.push(self.codec.encode(tile.salt, idx));
                }
            }
            cur = tile.next_in_bucket;
        }
        refs
    }

    /// Gets a tile by reference, `None` for null, out of range or stale
    /// references
    pub fn get_tile_by_ref(&self, tile_ref: CompressedTileRef) -> Option<&CompressedTile> {
        if tile_ref.is_null() {
            return None;
        }
        let idx = self.codec.decode_index(tile_ref);
        let salt = self.codec.decode_salt(tile_ref);
        self.tiles
            .get(idx)
            .filter(|tile| tile.salt == salt && tile.header.is_some())
    }

    /// Gets the reference of a stored tile
    pub fn get_tile_ref(&self, tile: &CompressedTile) -> CompressedTileRef {
        self.codec.encode(tile.salt, tile.idx)
    }

    fn checked_tile_index(&self, tile_ref: CompressedTileRef) -> Result<usize> {
        if tile_ref.is_null() {
            return Err(invalid_tile_ref(tile_ref));
        }
        let idx = self.codec.decode_index(tile_ref);
        let salt = self.codec.decode_salt(tile_ref);
        match self.tiles.get(idx) {
            Some(tile) if tile.salt == salt && tile.header.is_some() => Ok(idx),
            _ => Err(invalid_tile_ref(tile_ref)),
        }
    }

    /// World bounds of the surface cells of a layer
    pub fn calc_tight_tile_bounds(&self, header: &TileCacheLayerHeader) -> ([f32; 3], [f32; 3]) {
        let cs = self.params.cs;
        (
            [
                header.bmin[0] + header.minx as f32 * cs,
                header.bmin[1],
                header.bmin[2] + header.miny as f32 * cs,
            ],
            [
                header.bmin[0] + (header.maxx as f32 + 1.0) * cs,
                header.bmax[1],
                header.bmin[2] + (header.maxy as f32 + 1.0) * cs,
            ],
        )
    }

    /// Finds the tiles whose tight bounds overlap `[bmin, bmax]`
    pub fn query_tiles(&self, bmin: &[f32; 3], bmax: &[f32; 3]) -> Vec<CompressedTileRef> {
        if bmin.iter().chain(bmax.iter()).any(|v| !v.is_finite()) {
            return Vec::new();
        }
        let tw = self.params.tile_world_width();
        let th = self.params.tile_world_height();
        let origin = self.params.origin;
        let mut tx0 = ((bmin[0] - origin[0]) / tw).floor() as i32;
        let mut tx1 = ((bmax[0] - origin[0]) / tw).floor() as i32;
        let mut ty0 = ((bmin[2] - origin[2]) / th).floor() as i32;
        let mut ty1 = ((bmax[2] - origin[2]) / th).floor() as i32;

        let mut results = Vec::new();
        let columns = (tx1 as i64 - tx0 as i64 + 1) * (ty1 as i64 - ty0 as i64 + 1);
        if columns > self.tile_count as i64 {
            // Never walk more columns than there are stored tiles
            let Some((sx0, sx1, sy0, sy1)) = self.stored_tile_extent() else {
                return results;
            };
            tx0 = tx0.max(sx0);
            tx1 = tx1.min(sx1);
            ty0 = ty0.max(sy0);
            ty1 = ty1.min(sy1);
        }
        for ty in ty0..=ty1 {
            for tx in tx0..=tx1 {
                for tile_ref in self.get_tiles_at(tx, ty) {
                    let Some(header) = self.get_tile_by_ref(tile_ref).and_then(|t| t.header())
                    else {
                        continue;
                    };
                    let (tbmin, tbmax) = self.calc_tight_tile_bounds(header);
                    if overlap_bounds(bmin, bmax, &tbmin, &tbmax) {
                        results.push(tile_ref);
                    }
                }
            }
        }
        results
    }

    /// Inclusive tile coordinate extent `(tx0, tx1, ty0, ty1)` of the stored
    /// tiles
    fn stored_tile_extent(&self) -> Option<(i32, i32, i32, i32)> {
        self.tiles
            .iter()
            .filter_map(|t| t.header.as_ref())
            .fold(None, |extent, h| {
                Some(match extent {
                    None => (h.tx, h.tx, h.ty, h.ty),
                    Some((x0, x1, y0, y1)) => (x0.min(h.tx), x1.max(h.tx), y0.min(h.ty), y1.max(h.ty)),
                })
            })
    }

    /// Decompresses a stored tile
    pub fn decompress_tile(&self, tile_ref: CompressedTileRef) -> Result<TileCacheLayer> {
        let idx = self.checked_tile_index(tile_ref)?;
        TileCacheLayer::decode(&self.tiles[idx].data, self.format, self.compressor.as_ref())
    }

    /// Adds an upright cylinder obstacle
    pub fn add_obstacle(&mut self, pos: [f32; 3], radius: f32, height: f32) -> Result<ObstacleRef> {
        self.alloc_obstacle(ObstacleData::Cylinder {
            pos,
            radius,
            height,
        })
    }

    /// Adds an axis-aligned box obstacle
    pub fn add_box_obstacle(&mut self, bmin: [f32; 3], bmax: [f32; 3]) -> Result<ObstacleRef> {
        self.alloc_obstacle(ObstacleData::Box { bmin, bmax })
    }

    /// Adds a box obstacle rotated by `y_radians` around the Y axis
    pub fn add_oriented_box_obstacle(
        &mut self,
        center: [f32; 3],
        half_extents: [f32; 3],
        y_radians: f32,
    ) -> Result<ObstacleRef> {
        self.alloc_obstacle(ObstacleData::oriented_box(center, half_extents, y_radians))
    }

    fn alloc_obstacle(&mut self, data: ObstacleData) -> Result<ObstacleRef> {
        if !data.is_finite() {
            return Err(Error::TileCache(format!(
                "{}: obstacle shape must be finite",
                Status::InvalidParam
            )));
        }
        let idx = match self.next_free_obstacle {
            Some(idx) => {
                self.next_free_obstacle = self.obstacles[idx].next_free.take();
                idx
            }
            None if self.obstacles.len() < self.params.max_obstacles as usize => {
                let idx = self.obstacles.len();
                self.obstacles.push(Obstacle::empty(idx));
                idx
            }
            None => {
                return Err(Error::TileCache(format!(
                    "{}: out of obstacle storage",
                    Status::OutOfMemory
                )))
            }
        };

        let ob = &mut self.obstacles[idx];
        ob.data = data;
        ob.state = ObstacleState::Processing;
        ob.touched.clear();
        ob.pending.clear();

        let obstacle_ref = ObstacleRef::encode(ob.salt, idx);
        self.requests.push(ObstacleRequest {
            action: ObstacleRequestAction::Add,
            obstacle: obstacle_ref,
        });
        Ok(obstacle_ref)
    }

    /// Requests removal of an obstacle. The null reference is ignored.
    pub fn remove_obstacle(&mut self, obstacle_ref: ObstacleRef) -> Result<()> {
        if obstacle_ref.is_null() {
            return Ok(());
        }
        self.requests.push(ObstacleRequest {
            action: ObstacleRequestAction::Remove,
            obstacle: obstacle_ref,
        });
        Ok(())
    }

    /// Gets an obstacle by reference, `None` for stale references
    pub fn get_obstacle_by_ref(&self, obstacle_ref: ObstacleRef) -> Option<&Obstacle> {
        if obstacle_ref.is_null() {
            return None;
        }
        self.obstacles
            .get(obstacle_ref.index())
            .filter(|ob| ob.salt == obstacle_ref.salt())
    }

    /// Gets the reference of an obstacle
    pub fn get_obstacle_ref(&self, obstacle: &Obstacle) -> ObstacleRef {
        ObstacleRef::encode(obstacle.salt, obstacle.idx)
    }

    /// Gets the obstacle record in slot `idx`
    pub fn get_obstacle(&self, idx: usize) -> Option<&Obstacle> {
        self.obstacles.get(idx)
    }

    /// Number of obstacles that are not empty
    pub fn obstacle_count(&self) -> usize {
        self.obstacles
            .iter()
            .filter(|ob| ob.state != ObstacleState::Empty)
            .count()
    }

    /// World bounds of an obstacle
    pub fn get_obstacle_bounds(&self, obstacle: &Obstacle) -> ([f32; 3], [f32; 3]) {
        obstacle.bounds()
    }

    /// Number of obstacle requests waiting for the next update
    pub fn pending_requests(&self) -> usize {
        self.requests.len()
    }

    /// Number of tiles waiting for a rebuild
    pub fn pending_tile_updates(&self) -> usize {
        self.update.len()
    }

    /// Returns true when no request or tile rebuild is outstanding
    pub fn is_settled(&self) -> bool {
        self.requests.is_empty() && self.update.is_empty()
    }

    /// Advances obstacle processing by one step.
    ///
    /// A call either drains the queued obstacle requests into tile rebuilds
    /// or, when rebuilds are already queued, rebuilds the first of them.
    /// Returns `true` once every request has been handled and no tile is
    /// waiting for a rebuild.
    pub fn update<N: NavMeshTiles + ?Sized>(&mut self, nav_mesh: &mut N) -> Result<bool> {
        if self.update.is_empty() {
            self.process_requests();
        } else if let Some(tile_ref) = self.update.pop_front() {
            let built = if self.get_tile_by_ref(tile_ref).is_some() {
                self.build_nav_mesh_tile(tile_ref, nav_mesh)
            } else {
                log::debug!("skipping rebuild of removed tile {}", tile_ref);
                Ok(())
            };
            if let Err(e) = &built {
                log::warn!("failed to rebuild tile {}: {}", tile_ref, e);
            }

            // The popped tile is done with even when its rebuild failed
            for idx in 0..self.obstacles.len() {
                let ob = &mut self.obstacles[idx];
                if ob.state != ObstacleState::Processing && ob.state != ObstacleState::Removing {
                    continue;
                }
                let before = ob.pending.len();
                ob.pending.retain(|&r| r != tile_ref);
                // Obstacles whose request is still queued have nothing pending yet
                if ob.pending.len() != before && ob.pending.is_empty() {
                    self.finish_obstacle(idx);
                }
            }
            built?;
        }

        Ok(self.is_settled())
    }

    fn process_requests(&mut self) {
        if self.requests.is_empty() {
            return;
        }
        let requests = std::mem::take(&mut self.requests);
        log::debug!("processing {} obstacle requests", requests.len());

        for req in requests {
            let idx = req.obstacle.index();
            let Some(ob) = self.obstacles.get(idx) else {
                continue;
            };
            if ob.salt != req.obstacle.salt() || ob.state == ObstacleState::Empty {
                continue;
            }

            match req.action {
                ObstacleRequestAction::Add => {
                    let (bmin, bmax) = ob.bounds();
                    let touched = self.query_tiles(&bmin, &bmax);
                    let ob = &mut self.obstacles[idx];
                    ob.pending = touched.clone();
                    ob.touched = touched;
                }
                ObstacleRequestAction::Remove => {
                    let ob = &mut self.obstacles[idx];
                    ob.state = ObstacleState::Removing;
                    ob.pending = ob.touched.clone();
                }
            }

            let ob = &self.obstacles[idx];
            for &tile_ref in &ob.pending {
                if !self.update.contains(&tile_ref) {
                    self.update.push_back(tile_ref);
                }
            }
            log::trace!(
                "{:?} obstacle {} touching {} tiles",
                req.action,
                req.obstacle,
                ob.touched.len()
            );

            // Obstacles outside every tile have nothing to wait for
            if ob.pending.is_empty() {
                self.finish_obstacle(idx);
            }
        }
    }

    fn finish_obstacle(&mut self, idx: usize) {
        let ob = &mut self.obstacles[idx];
        match ob.state {
            ObstacleState::Processing => ob.state = ObstacleState::Processed,
            ObstacleState::Removing => {
                ob.state = ObstacleState::Empty;
                ob.salt = next_obstacle_salt(ob.salt);
                ob.touched.clear();
                ob.pending.clear();
                ob.next_free = self.next_free_obstacle;
                self.next_free_obstacle = Some(idx);
            }
            _ => {}
        }
    }

    /// Rebuilds one tile with the obstacles touching it and replaces the
    /// matching tile of `nav_mesh`
    pub fn build_nav_mesh_tile<N: NavMeshTiles + ?Sized>(
        &mut self,
        tile_ref: CompressedTileRef,
        nav_mesh: &mut N,
    ) -> Result<()> {
        let layer = self.decompress_tile(tile_ref)?;
        let location = (layer.header.tx, layer.header.ty, layer.header.tlayer);

        let obstacles = self
            .obstacles
            .iter()
            .filter(|ob| {
                ob.state != ObstacleState::Empty
                    && ob.state != ObstacleState::Removing
                    && ob.touched.contains(&tile_ref)
            })
            .map(|ob| &ob.data);

        let mesh_process = match self.mesh_process.as_mut() {
            Some(hook) => Some(hook.as_mut() as &mut dyn TileCacheMeshProcess),
            None => None,
        };
        let data = build_tile_nav_data(
            layer,
            obstacles,
            &self.params,
            nav_mesh.max_verts_per_poly(),
            mesh_process,
        )?;

        replace_nav_mesh_tile(nav_mesh, location, data)?;
        Ok(())
    }

    /// Builds every layer stored at tile column (tx, ty)
    pub fn build_nav_mesh_tiles_at<N: NavMeshTiles + ?Sized>(
        &mut self,
        tx: i32,
        ty: i32,
        nav_mesh: &mut N,
    ) -> Result<()> {
        for tile_ref in self.get_tiles_at(tx, ty) {
            self.build_nav_mesh_tile(tile_ref, nav_mesh)?;
        }
        Ok(())
    }
}

fn invalid_tile_ref(tile_ref: CompressedTileRef) -> Error {
    Error::TileCache(format!("{}: invalid tile ref {}", Status::InvalidParam, tile_ref))
}
