//! Single-surface heightfield layers
//!
//! A layer is a 2D grid of cells, each carrying at most one walkable surface.
//! Heights are stored in cell-height units relative to the layer's `bmin.y`.
//! Every cell also stores four connection bits (low nibble) and four portal
//! bits (high nibble), one per direction, using the Recast direction order
//! `-x, +z, +x, -z`.

use glam::Vec3;
use recast_common::{Error, Result};

use crate::triangle_utils::{
    get_dir_offset_x, get_dir_offset_y, LAYER_EMPTY_HEIGHT, LAYER_NULL_REGION, RC_NULL_AREA,
};

/// A single-surface layer of a tile
#[derive(Debug, Clone, PartialEq)]
pub struct HeightfieldLayer {
    /// Width of the layer (cells along x)
    pub width: i32,
    /// Height of the layer (cells along z)
    pub height: i32,
    /// The minimum bounds of the layer's AABB
    pub bmin: Vec3,
    /// The maximum bounds of the layer's AABB
    pub bmax: Vec3,
    /// Cell size (horizontal resolution)
    pub cs: f32,
    /// Cell height (vertical resolution)
    pub ch: f32,
    /// Surface height per cell, `LAYER_EMPTY_HEIGHT` for empty cells
    pub heights: Vec<u8>,
    /// Area id per cell
    pub areas: Vec<u8>,
    /// Connection bits (low nibble) and portal bits (high nibble) per cell
    pub cons: Vec<u8>,
    /// Region id per cell, filled by region building
    pub regs: Vec<u8>,
    /// Number of regions after region building
    pub reg_count: usize,
}

impl HeightfieldLayer {
    /// Creates an empty layer
    pub fn new(width: i32, height: i32, bmin: Vec3, bmax: Vec3, cs: f32, ch: f32) -> Result<Self> {
        if width <= 0 || height <= 0 || width > 255 || height > 255 {
            return Err(Error::Recast(format!(
                "invalid layer dimensions {}x{}",
                width, height
            )));
        }
        let size = (width * height) as usize;
        Ok(Self {
            width,
            height,
            bmin,
            bmax,
            cs,
            ch,
            heights: vec![LAYER_EMPTY_HEIGHT; size],
            areas: vec![RC_NULL_AREA; size],
            cons: vec![0; size],
            regs: vec![LAYER_NULL_REGION; size],
            reg_count: 0,
        })
    }

    /// Creates a layer from already decoded grids
    #[allow(clippy::too_many_arguments)]
    pub fn from_grids(
        width: i32,
        height: i32,
        bmin: Vec3,
        bmax: Vec3,
        cs: f32,
        ch: f32,
        heights: Vec<u8>,
        areas: Vec<u8>,
        cons: Vec<u8>,
    ) -> Result<Self> {
        let mut layer = Self::new(width, height, bmin, bmax, cs, ch)?;
        let size = layer.cell_count();
        if heights.len() != size || areas.len() != size || cons.len() != size {
            return Err(Error::Recast(format!(
                "layer grid size mismatch: expected {} cells, got {}/{}/{}",
                size,
                heights.len(),
                areas.len(),
                cons.len()
            )));
        }
        layer.heights = heights;
        layer.areas = areas;
        layer.cons = cons;
        Ok(layer)
    }

    /// Number of cells in the grid
    #[inline]
    pub fn cell_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    /// Index of the cell at (x, z)
    #[inline]
    pub fn index(&self, x: i32, z: i32) -> usize {
        (x + z * self.width) as usize
    }

    /// Whether (x, z) lies inside the grid
    #[inline]
    pub fn contains(&self, x: i32, z: i32) -> bool {
        x >= 0 && z >= 0 && x < self.width && z < self.height
    }

    /// Whether the cell carries a surface
    #[inline]
    pub fn has_surface(&self, idx: usize) -> bool {
        self.heights[idx] != LAYER_EMPTY_HEIGHT
    }

    /// Number of cells with a walkable area
    pub fn walkable_cell_count(&self) -> usize {
        self.areas.iter().filter(|&&a| a != RC_NULL_AREA).count()
    }

    /// Rebuilds the connection and portal bits of every cell.
    ///
    /// Two neighbouring surface cells are connected when their height
    /// difference is at most `walkable_climb` voxels. Surface cells on the
    /// grid border get a portal bit towards the neighbouring tile.
    pub fn build_connections(&mut self, walkable_climb: i32) {
        for z in 0..self.height {
            for x in 0..self.width {
                let idx = self.index(x, z);
                if !self.has_surface(idx) {
                    self.cons[idx] = 0;
                    continue;
                }
                let h = self.heights[idx] as i32;
                let mut con = 0u8;
                let mut portal = 0u8;
                for dir in 0..4u8 {
                    let nx = x + get_dir_offset_x(dir);
                    let nz = z + get_dir_offset_y(dir);
                    if !self.contains(nx, nz) {
                        portal |= 1 << dir;
                        continue;
                    }
                    let nidx = self.index(nx, nz);
                    if self.has_surface(nidx) && (self.heights[nidx] as i32 - h).abs() <= walkable_climb
                    {
                        con |= 1 << dir;
                    }
                }
                self.cons[idx] = con | (portal << 4);
            }
        }
    }

    /// Marks walkable cells closer than `radius` cells to an unwalkable
    /// cell as unwalkable. Cells outside the grid count as walkable so that
    /// tiles keep meeting at their shared border.
    pub fn erode_walkable_area(&mut self, radius: i32) {
        if radius <= 0 {
            return;
        }
        let r2 = radius * radius;
        let blocked: Vec<bool> = self.areas.iter().map(|&a| a == RC_NULL_AREA).collect();
        for z in 0..self.height {
            for x in 0..self.width {
                let idx = self.index(x, z);
                if blocked[idx] {
                    continue;
                }
                'search: for dz in -radius..=radius {
                    for dx in -radius..=radius {
                        if dx * dx + dz * dz >= r2 {
                            continue;
                        }
                        let (nx, nz) = (x + dx, z + dz);
                        if self.contains(nx, nz) && blocked[self.index(nx, nz)] {
                            self.areas[idx] = RC_NULL_AREA;
                            break 'search;
                        }
                    }
                }
            }
        }
    }

    /// Computes the tight cell extents `(minx, maxx, minz, maxz)` of the
    /// surface cells, or `None` when the layer carries no surface.
    pub fn tight_bounds(&self) -> Option<(i32, i32, i32, i32)> {
        let mut bounds: Option<(i32, i32, i32, i32)> = None;
        for z in 0..self.height {
            for x in 0..self.width {
                if !self.has_surface(self.index(x, z)) {
                    continue;
                }
                bounds = Some(match bounds {
                    None => (x, x, z, z),
                    Some((x0, x1, z0, z1)) => (x0.min(x), x1.max(x), z0.min(z), z1.max(z)),
                });
            }
        }
        bounds
    }

    /// Minimum and maximum surface height, or `None` for an empty layer
    pub fn height_range(&self) -> Option<(u16, u16)> {
        self.heights
            .iter()
            .filter(|&&h| h != LAYER_EMPTY_HEIGHT)
            .fold(None, |acc, &h| {
                let h = h as u16;
                Some(match acc {
                    None => (h, h),
                    Some((lo, hi)) => (lo.min(h), hi.max(h)),
                })
            })
    }
}
