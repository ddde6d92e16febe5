//! Navigation mesh tile storage
//!
//! A [`NavMesh`] owns a fixed number of tile slots addressed by salted
//! [`TileRef`]s. Tiles are keyed by their (x, y, layer) grid location and
//! replaced wholesale when rebuilt.

use std::collections::HashMap;

use super::binary_format::{Poly, TileData};
use super::{Status, MAX_VERTS_PER_POLY};
use recast_common::{ilog2, next_pow2, Error, Result};

/// Reference to a tile of a [`NavMesh`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TileRef(u64);

impl TileRef {
    /// The null reference
    pub const NULL: TileRef = TileRef(0);

    /// Creates a new tile reference from a raw value
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value
    pub fn id(&self) -> u64 {
        self.0
    }

    /// Returns true if this is not the null reference
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for TileRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TileRef({:#x})", self.0)
    }
}

/// Navigation mesh parameters
#[derive(Debug, Clone)]
pub struct NavMeshParams {
    /// Origin of the navigation mesh
    pub origin: [f32; 3],
    /// Width of each tile
    pub tile_width: f32,
    /// Height of each tile
    pub tile_height: f32,
    /// Maximum number of tiles
    pub max_tiles: i32,
    /// Maximum number of polygons per tile
    pub max_polys_per_tile: i32,
    /// Maximum number of vertices per polygon accepted in tiles
    pub max_verts_per_poly: usize,
}

impl Default for NavMeshParams {
    fn default() -> Self {
        Self {
            origin: [0.0; 3],
            tile_width: 14.4,
            tile_height: 14.4,
            max_tiles: 128,
            max_polys_per_tile: 1024,
            max_verts_per_poly: MAX_VERTS_PER_POLY,
        }
    }
}

/// A tile stored in the navigation mesh
#[derive(Debug, Clone)]
pub struct MeshTile {
    /// Decoded tile contents
    pub data: TileData,
    /// Tile flags passed to [`NavMesh::add_tile`]
    pub flags: u8,
    raw: Vec<u8>,
}

impl MeshTile {
    /// Tile grid location (x, y, layer)
    pub fn location(&self) -> (i32, i32, i32) {
        let h = &self.data.header;
        (h.x, h.y, h.layer)
    }

    /// Number of polygons in the tile
    pub fn poly_count(&self) -> usize {
        self.data.polys.len()
    }

    /// The encoded tile buffer this tile was added from
    pub fn raw_data(&self) -> &[u8] {
        &self.raw
    }

    /// Finds the polygon whose XZ projection contains `(x, z)`
    pub fn find_poly_containing(&self, x: f32, z: f32) -> Option<usize> {
        self.data
            .polys
            .iter()
            .position(|poly| point_in_poly_xz(&self.data.verts, poly, x, z))
    }

    /// Summed XZ area of all polygons
    pub fn walkable_area(&self) -> f32 {
        self.data
            .polys
            .iter()
            .map(|poly| {
                let vs = poly.vertices();
                let mut area = 0.0;
                for i in 0..vs.len() {
                    let a = self.data.verts[vs[i] as usize];
                    let b = self.data.verts[vs[(i + 1) % vs.len()] as usize];
                    area += a[0] * b[2] - b[0] * a[2];
                }
                area.abs() * 0.5
            })
            .sum()
    }
}

fn point_in_poly_xz(verts: &[[f32; 3]], poly: &Poly, x: f32, z: f32) -> bool {
    let vs = poly.vertices();
    let mut inside = false;
    let mut j = vs.len().wrapping_sub(1);
    for i in 0..vs.len() {
        let vi = verts[vs[i] as usize];
        let vj = verts[vs[j] as usize];
        if ((vi[2] > z) != (vj[2] > z))
            && (x < (vj[0] - vi[0]) * (z - vi[2]) / (vj[2] - vi[2]) + vi[0])
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[derive(Debug, Clone)]
struct TileSlot {
    salt: u32,
    tile: Option<MeshTile>,
    next_free: Option<usize>,
}

/// Navigation mesh made of independently replaceable tiles
#[derive(Debug)]
pub struct NavMesh {
    params: NavMeshParams,
    slots: Vec<TileSlot>,
    next_free: Option<usize>,
    pos_lookup: HashMap<(i32, i32, i32), usize>,
    tile_bits: u32,
    poly_bits: u32,
    salt_bits: u32,
}

impl NavMesh {
    /// Creates a new navigation mesh
    pub fn new(params: NavMeshParams) -> Result<Self> {
        if params.origin.iter().any(|v| !v.is_finite()) {
            return Err(Error::Detour(Status::InvalidParam.to_string()));
        }
        if params.tile_width <= 0.0 || params.tile_height <= 0.0 {
            return Err(Error::Detour(Status::InvalidParam.to_string()));
        }
        if params.max_tiles <= 0 || params.max_polys_per_tile <= 0 {
            return Err(Error::Detour(Status::InvalidParam.to_string()));
        }
        if params.max_verts_per_poly < 3 || params.max_verts_per_poly > MAX_VERTS_PER_POLY {
            return Err(Error::Detour(Status::InvalidParam.to_string()));
        }

        let tile_bits = ilog2(next_pow2(params.max_tiles as u32));
        let poly_bits = ilog2(next_pow2(params.max_polys_per_tile as u32));
        let salt_bits = 31u32.min(32u32.saturating_sub(tile_bits + poly_bits));
        if salt_bits < 10 {
            return Err(Error::Detour(Status::InvalidParam.to_string()));
        }

        let count = params.max_tiles as usize;
        let slots = (0..count)
            .map(|i| TileSlot {
                salt: 1,
                tile: None,
                next_free: if i + 1 < count { Some(i + 1) } else { None },
            })
            .collect();

        Ok(Self {
            params,
            slots,
            next_free: Some(0),
            pos_lookup: HashMap::new(),
            tile_bits,
            poly_bits,
            salt_bits,
        })
    }

    /// Returns the navigation mesh parameters
    pub fn params(&self) -> &NavMeshParams {
        &self.params
    }

    /// Maximum vertices per polygon accepted by this mesh
    pub fn max_verts_per_poly(&self) -> usize {
        self.params.max_verts_per_poly
    }

    /// Number of tile slots
    pub fn max_tiles(&self) -> usize {
        self.slots.len()
    }

    /// Number of tiles currently stored
    pub fn tile_count(&self) -> usize {
        self.pos_lookup.len()
    }

    /// Adds a tile from encoded tile data
    ///
    /// Fails when the data is malformed, exceeds the mesh limits, a tile
    /// already exists at the same location or no slot is free.
    pub fn add_tile(&mut self, data: Vec<u8>, flags: u8) -> Result<TileRef> {
        let tile_data = TileData::from_bytes(&data)?;
        let header = &tile_data.header;

        if header.max_verts_per_poly as usize > self.params.max_verts_per_poly {
            return Err(Error::Detour(Status::InvalidParam.to_string()));
        }
        if header.poly_count > self.params.max_polys_per_tile {
            return Err(Error::Detour(Status::InvalidParam.to_string()));
        }

        let key = (header.x, header.y, header.layer);
        if self.pos_lookup.contains_key(&key) {
            return Err(Error::Detour(Status::AlreadyExists.to_string()));
        }

        let idx = self
            .next_free
            .ok_or_else(|| Error::Detour(Status::OutOfMemory.to_string()))?;
        let slot = &mut self.slots[idx];
        self.next_free = slot.next_free.take();
        slot.tile = Some(MeshTile {
            data: tile_data,
            flags,
            raw: data,
        });
        let salt = slot.salt;
        self.pos_lookup.insert(key, idx);

        log::trace!("added nav tile {:?} to slot {}", key, idx);
        Ok(self.encode_tile_ref(salt, idx))
    }

    /// Removes a tile and returns the data it was added from
    pub fn remove_tile(&mut self, tile_ref: TileRef) -> Result<Vec<u8>> {
        let (salt, idx) = self.decode_tile_ref(tile_ref);
        let salt_mask = (1u32 << self.salt_bits) - 1;
        let slot = self
            .slots
            .get_mut(idx)
            .filter(|slot| slot.salt == salt && slot.tile.is_some())
            .ok_or_else(|| Error::Detour(Status::InvalidParam.to_string()))?;

        let tile = slot
            .tile
            .take()
            .ok_or_else(|| Error::Detour(Status::InvalidParam.to_string()))?;
        slot.salt = (slot.salt + 1) & salt_mask;
        if slot.salt == 0 {
            slot.salt = 1;
        }
        slot.next_free = self.next_free;
        self.next_free = Some(idx);
        self.pos_lookup.remove(&tile.location());

        log::trace!("removed nav tile {:?} from slot {}", tile.location(), idx);
        Ok(tile.raw)
    }

    /// Gets the reference of the tile at the given location
    pub fn get_tile_ref_at(&self, x: i32, y: i32, layer: i32) -> Option<TileRef> {
        self.pos_lookup
            .get(&(x, y, layer))
            .map(|&idx| self.encode_tile_ref(self.slots[idx].salt, idx))
    }

    /// Gets the tile at the given location
    pub fn get_tile_at(&self, x: i32, y: i32, layer: i32) -> Option<&MeshTile> {
        self.pos_lookup
            .get(&(x, y, layer))
            .and_then(|&idx| self.slots[idx].tile.as_ref())
    }

    /// Gets every layer stored at a tile column
    pub fn get_tiles_at(&self, x: i32, y: i32) -> Vec<&MeshTile> {
        let mut tiles: Vec<&MeshTile> = self
            .slots
            .iter()
            .filter_map(|slot| slot.tile.as_ref())
            .filter(|tile| {
                let (tx, ty, _) = tile.location();
                tx == x && ty == y
            })
            .collect();
        tiles.sort_by_key(|tile| tile.location().2);
        tiles
    }

    /// Gets a tile by reference, `None` for null or stale references
    pub fn get_tile_by_ref(&self, tile_ref: TileRef) -> Option<&MeshTile> {
        if !tile_ref.is_valid() {
            return None;
        }
        let (salt, idx) = self.decode_tile_ref(tile_ref);
        self.slots
            .get(idx)
            .filter(|slot| slot.salt == salt)
            .and_then(|slot| slot.tile.as_ref())
    }

    /// Calculates the tile grid location containing a world position
    pub fn calc_tile_loc(&self, pos: &[f32; 3]) -> (i32, i32) {
        let tx = ((pos[0] - self.params.origin[0]) / self.params.tile_width).floor() as i32;
        let ty = ((pos[2] - self.params.origin[2]) / self.params.tile_height).floor() as i32;
        (tx, ty)
    }

    /// Finds the tile and polygon below a world position
    pub fn find_poly_at(&self, pos: &[f32; 3]) -> Option<(TileRef, usize)> {
        let (tx, ty) = self.calc_tile_loc(pos);
        self.get_tiles_at(tx, ty).into_iter().find_map(|tile| {
            let (x, y, layer) = tile.location();
            let poly = tile.find_poly_containing(pos[0], pos[2])?;
            Some((self.get_tile_ref_at(x, y, layer)?, poly))
        })
    }

    fn encode_tile_ref(&self, salt: u32, idx: usize) -> TileRef {
        TileRef(
            ((salt as u64) << (self.poly_bits + self.tile_bits))
                | ((idx as u64) << self.poly_bits),
        )
    }

    fn decode_tile_ref(&self, tile_ref: TileRef) -> (u32, usize) {
        let salt_mask = (1u64 << self.salt_bits) - 1;
        let tile_mask = (1u64 << self.tile_bits) - 1;
        let salt = ((tile_ref.0 >> (self.poly_bits + self.tile_bits)) & salt_mask) as u32;
        let idx = ((tile_ref.0 >> self.poly_bits) & tile_mask) as usize;
        (salt, idx)
    }
}
