//! Navigation mesh the tile cache publishes rebuilt tiles to

use detour::{NavMesh, TileRef};
use recast_common::Result;

/// Tile level access the tile cache needs from a navigation mesh
pub trait NavMeshTiles {
    /// Maximum vertices per polygon the mesh accepts
    fn max_verts_per_poly(&self) -> usize;

    /// Reference of the tile at (x, y, layer), if any
    fn tile_ref_at(&self, x: i32, y: i32, layer: i32) -> Option<TileRef>;

    /// Removes a tile, returning its data
    fn remove_tile(&mut self, tile_ref: TileRef) -> Result<Vec<u8>>;

    /// Adds a tile from encoded tile data
    fn add_tile(&mut self, data: Vec<u8>, flags: u8) -> Result<TileRef>;
}

impl NavMeshTiles for NavMesh {
    fn max_verts_per_poly(&self) -> usize {
        NavMesh::max_verts_per_poly(self)
    }

    fn tile_ref_at(&self, x: i32, y: i32, layer: i32) -> Option<TileRef> {
        self.get_tile_ref_at(x, y, layer)
    }

    fn remove_tile(&mut self, tile_ref: TileRef) -> Result<Vec<u8>> {
        NavMesh::remove_tile(self, tile_ref)
    }

    fn add_tile(&mut self, data: Vec<u8>, flags: u8) -> Result<TileRef> {
        NavMesh::add_tile(self, data, flags)
    }
}

/// Replaces whatever tile sits at (x, y, layer) with `data`, or only removes
/// it when `data` is `None`
pub(crate) fn replace_nav_mesh_tile<N: NavMeshTiles + ?Sized>(
    nav_mesh: &mut N,
    location: (i32, i32, i32),
    data: Option<Vec<u8>>,
) -> Result<Option<TileRef>> {
    let (x, y, layer) = location;
    let previous = match nav_mesh.tile_ref_at(x, y, layer) {
        Some(old) => Some(nav_mesh.remove_tile(old)?),
        None => None,
    };
    let Some(data) = data else {
        return Ok(None);
    };
    match nav_mesh.add_tile(data, 0) {
        Ok(tile_ref) => Ok(Some(tile_ref)),
        Err(e) => {
            // Put the previous tile back so the mesh keeps no hole
            if let Some(previous) = previous {
                if let Err(restore) = nav_mesh.add_tile(previous, 0) {
                    log::error!(
                        "failed to restore tile ({}, {}, {}): {}",
                        x,
                        y,
                        layer,
                        restore
                    );
                }
            }
            Err(e)
        }
    }
}
