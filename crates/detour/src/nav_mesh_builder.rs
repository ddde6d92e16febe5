//! Navigation mesh builder for creating properly formatted tile data
//!
//! Converts a voxel space polygon mesh into the binary tile format read by
//! [`NavMesh::add_tile`](crate::NavMesh::add_tile).

use super::binary_format::{
    BvNode, MeshHeader, Poly, TileData, DT_EXT_LINK, DT_NAVMESH_MAGIC, DT_NAVMESH_VERSION,
};
use super::{Status, MAX_VERTS_PER_POLY};
use recast::{LayerPolyMesh, MESH_NULL_IDX, MESH_PORTAL_FLAG};
use recast_common::{Error, Result};

/// Parameters for building a navigation mesh tile
#[derive(Debug, Clone, Default)]
pub struct NavMeshCreateParams {
    /// Polygon mesh vertices in voxel units
    pub verts: Vec<[u16; 3]>,
    /// Polygon data, `2 * nvp` entries per polygon: vertex indices then
    /// neighbour entries
    pub polys: Vec<u16>,
    /// Per polygon area id
    pub poly_areas: Vec<u8>,
    /// Per polygon user flags
    pub poly_flags: Vec<u16>,
    /// Maximum number of vertices per polygon
    pub nvp: usize,
    /// Agent height in world units
    pub walkable_height: f32,
    /// Agent radius in world units
    pub walkable_radius: f32,
    /// Maximum ledge climb in world units
    pub walkable_climb: f32,
    pub tile_x: i32,
    pub tile_y: i32,
    pub tile_layer: i32,
    pub user_id: u32,
    /// Cell size
    pub cs: f32,
    /// Cell height
    pub ch: f32,
    /// Tile bounds
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
    /// Build a bounding volume tree over the polygons
    pub build_bv_tree: bool,
}

impl NavMeshCreateParams {
    /// Creates parameters from a layer polygon mesh. Tile placement, agent
    /// dimensions and bounds are left for the caller to fill in.
    pub fn from_poly_mesh(mesh: &LayerPolyMesh) -> Self {
        Self {
            verts: mesh.verts.clone(),
            polys: mesh.polys.clone(),
            poly_areas: mesh.areas.clone(),
            poly_flags: mesh.flags.clone(),
            nvp: mesh.nvp,
            ..Default::default()
        }
    }

    /// Number of polygons described by `polys`
    pub fn poly_count(&self) -> usize {
        if self.nvp == 0 {
            0
        } else {
            self.polys.len() / (self.nvp * 2)
        }
    }
}

/// Creates navigation mesh tile data from the provided parameters
pub fn create_nav_mesh_data(params: &NavMeshCreateParams) -> Result<Vec<u8>> {
    validate_params(params)?;

    let nvp = params.nvp;
    let poly_count = params.poly_count();

    let verts = params
        .verts
        .iter()
        .map(|v| {
            [
                params.bmin[0] + v[0] as f32 * params.cs,
                params.bmin[1] + v[1] as f32 * params.ch,
                params.bmin[2] + v[2] as f32 * params.cs,
            ]
        })
        .collect();

    let mut polys = Vec::with_capacity(poly_count);
    for i in 0..poly_count {
        let src = &params.polys[i * nvp * 2..(i + 1) * nvp * 2];
        let mut poly = Poly {
            verts: vec![0; nvp],
            neis: vec![0; nvp],
            flags: params.poly_flags[i],
            vert_count: 0,
            area: params.poly_areas[i],
        };
        for j in 0..nvp {
            if src[j] == MESH_NULL_IDX {
                break;
            }
            poly.verts[j] = src[j];
            poly.neis[j] = convert_neighbour(src[nvp + j]);
            poly.vert_count += 1;
        }
        polys.push(poly);
    }

    let bv_tree = if params.build_bv_tree {
        build_bv_tree(params)
    } else {
        Vec::new()
    };

    let tile = TileData {
        header: MeshHeader {
            magic: DT_NAVMESH_MAGIC,
            version: DT_NAVMESH_VERSION,
            x: params.tile_x,
            y: params.tile_y,
            layer: params.tile_layer,
            user_id: params.user_id,
            max_verts_per_poly: nvp as i32,
            walkable_height: params.walkable_height,
            walkable_radius: params.walkable_radius,
            walkable_climb: params.walkable_climb,
            bmin: params.bmin,
            bmax: params.bmax,
            bv_quant_factor: 1.0 / params.cs,
            ..Default::default()
        },
        verts,
        polys,
        bv_tree,
    };

    log::trace!(
        "created tile ({}, {}, {}) with {} polys",
        params.tile_x,
        params.tile_y,
        params.tile_layer,
        poly_count
    );

    tile.to_bytes()
}

fn validate_params(params: &NavMeshCreateParams) -> Result<()> {
    if params.nvp < 3 || params.nvp > MAX_VERTS_PER_POLY {
        return Err(Error::Detour(Status::InvalidParam.to_string()));
    }
    if params.verts.is_empty() || params.verts.len() >= 0xffff {
        return Err(Error::Detour(Status::InvalidParam.to_string()));
    }
    if params.polys.is_empty() || params.polys.len() % (params.nvp * 2) != 0 {
        return Err(Error::Detour(Status::InvalidParam.to_string()));
    }
    let poly_count = params.poly_count();
    if params.poly_areas.len() != poly_count || params.poly_flags.len() != poly_count {
        return Err(Error::Detour(Status::InvalidParam.to_string()));
    }
    if params.cs <= 0.0 || params.ch <= 0.0 {
        return Err(Error::Detour(Status::InvalidParam.to_string()));
    }
    Ok(())
}

/// Maps a poly mesh neighbour entry to the tile encoding. Portal edges keep
/// the side they lie on, using the eight direction compass of the tile grid.
fn convert_neighbour(nei: u16) -> u16 {
    if nei & MESH_PORTAL_FLAG != 0 {
        match nei & 0xf {
            0 => DT_EXT_LINK | 4,
            1 => DT_EXT_LINK | 2,
            2 => DT_EXT_LINK,
            3 => DT_EXT_LINK | 6,
            // Null index or an unknown side
            _ => 0,
        }
    } else {
        nei + 1
    }
}

struct BvItem {
    bmin: [u16; 3],
    bmax: [u16; 3],
    i: i32,
}

fn build_bv_tree(params: &NavMeshCreateParams) -> Vec<BvNode> {
    let nvp = params.nvp;
    let quant_y = params.ch / params.cs;
    let mut items: Vec<BvItem> = (0..params.poly_count())
        .map(|i| {
            let p = &params.polys[i * nvp * 2..i * nvp * 2 + nvp];
            let mut item = BvItem {
                bmin: [u16::MAX; 3],
                bmax: [0; 3],
                i: i as i32,
            };
            for &vi in p.iter().take_while(|&&v| v != MESH_NULL_IDX) {
                let v = params.verts[vi as usize];
                for k in 0..3 {
                    item.bmin[k] = item.bmin[k].min(v[k]);
                    item.bmax[k] = item.bmax[k].max(v[k]);
                }
            }
            // Remap y into the xz quantization
            item.bmin[1] = (item.bmin[1] as f32 * quant_y).floor() as u16;
            item.bmax[1] = (item.bmax[1] as f32 * quant_y).ceil() as u16;
            item
        })
        .collect();

    let mut nodes = Vec::with_capacity(items.len() * 2);
    let count = items.len();
    subdivide(&mut items, 0, count, &mut nodes);
    nodes
}

fn subdivide(items: &mut [BvItem], imin: usize, imax: usize, nodes: &mut Vec<BvNode>) {
    let inum = imax - imin;
    let icur = nodes.len();
    nodes.push(BvNode::default());

    if inum == 1 {
        let item = &items[imin];
        nodes[icur] = BvNode {
            bmin: item.bmin,
            bmax: item.bmax,
            i: item.i,
        };
        return;
    }

    let mut node = BvNode {
        bmin: [u16::MAX; 3],
        bmax: [0; 3],
        i: 0,
    };
    for item in &items[imin..imax] {
        for k in 0..3 {
            node.bmin[k] = node.bmin[k].min(item.bmin[k]);
            node.bmax[k] = node.bmax[k].max(item.bmax[k]);
        }
    }

    let axis = (0..3)
        .max_by_key(|&k| node.bmax[k].saturating_sub(node.bmin[k]))
        .unwrap_or(0);
    items[imin..imax].sort_by_key(|item| item.bmin[axis]);

    let isplit = imin + inum / 2;
    subdivide(items, imin, isplit, nodes);
    subdivide(items, isplit, imax, nodes);

    // Negative escape index
    node.i = -((nodes.len() - icur) as i32);
    nodes[icur] = node;
}
