//! Contour tracing for partitioned heightfield layers
//!
//! Follows the tile cache variant of Recast's contour builder: each region is
//! walked once along its outline, collinear runs are merged while walking,
//! and the raw outline is then simplified against `max_error`.

use recast_common::{Error, Result};

use crate::heightfield_layers::HeightfieldLayer;
use crate::triangle_utils::{get_dir_offset_x, get_dir_offset_y, LAYER_NULL_REGION, RC_NULL_AREA};

/// Neighbour value of a hard (non-portal) unconnected edge
const EDGE_HARD: u8 = 0xff;
/// Neighbour values `>= EDGE_PORTAL_BASE` mark portal edges, low bits hold the direction
const EDGE_PORTAL_BASE: u8 = 0xf8;
/// Stored in [`ContourVertex::portal`] when the edge is not a portal
pub const CONTOUR_NO_PORTAL: u8 = 0x0f;

/// A simplified contour vertex in layer cell coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContourVertex {
    pub x: u8,
    pub y: u8,
    pub z: u8,
    /// Portal direction of the edge starting at this vertex, or `CONTOUR_NO_PORTAL`
    pub portal: u8,
}

/// Outline of one region
#[derive(Debug, Clone, Default)]
pub struct LayerContour {
    pub verts: Vec<ContourVertex>,
    pub reg: u8,
    pub area: u8,
}

/// All region contours of one layer, indexed by region id
#[derive(Debug, Clone, Default)]
pub struct LayerContourSet {
    pub conts: Vec<LayerContour>,
}

/// Raw vertex while walking: x, y, z and the neighbour region of the edge
#[derive(Debug, Clone, Copy)]
struct RawVertex {
    x: i32,
    y: i32,
    z: i32,
    r: u8,
}

fn get_neighbour_reg(layer: &HeightfieldLayer, ax: i32, ay: i32, dir: u8) -> u8 {
    let ia = layer.index(ax, ay);
    let con = layer.cons[ia] & 0x0f;
    let portal = layer.cons[ia] >> 4;
    let mask = 1u8 << dir;
    if con & mask == 0 {
        if portal & mask != 0 {
            return EDGE_PORTAL_BASE + dir;
        }
        return EDGE_HARD;
    }
    let bx = ax + get_dir_offset_x(dir);
    let by = ay + get_dir_offset_y(dir);
    layer.regs[layer.index(bx, by)]
}

fn append_vertex(cont: &mut Vec<RawVertex>, x: i32, y: i32, z: i32, r: u8) {
    let n = cont.len();
    if n > 1 {
        let pa = cont[n - 2];
        let pb = &mut cont[n - 1];
        if pb.r == r {
            if pa.x == pb.x && pb.x == x {
                // Aligned along x, extend in z.
                pb.y = y;
                pb.z = z;
                return;
            } else if pa.z == pb.z && pb.z == z {
                // Aligned along z, extend in x.
                pb.x = x;
                pb.y = y;
                return;
            }
        }
    }
    cont.push(RawVertex { x, y, z, r });
}

fn walk_contour(layer: &HeightfieldLayer, mut x: i32, mut y: i32) -> Result<Vec<RawVertex>> {
    let mut cont = Vec::new();
    let start_x = x;
    let start_y = y;
    let own_reg = layer.regs[layer.index(x, y)];

    let start_dir = (0..4u8)
        .map(|i| (i + 3) & 3)
        .find(|&dir| get_neighbour_reg(layer, x, y, dir) != own_reg);
    let Some(start_dir) = start_dir else {
        return Ok(cont);
    };

    let mut dir = start_dir;
    let max_iter = (layer.width * layer.height * 4) as usize;
    let mut iter = 0;
    let mut closed = false;
    while iter < max_iter {
        let rn = get_neighbour_reg(layer, x, y, dir);
        let mut nx = x;
        let mut ny = y;
        let ndir;

        if rn != layer.regs[layer.index(x, y)] {
            // Solid edge.
            let mut px = x;
            let mut pz = y;
            match dir {
                0 => pz += 1,
                1 => {
                    px += 1;
                    pz += 1;
                }
                2 => px += 1,
                _ => {}
            }
            append_vertex(&mut cont, px, layer.heights[layer.index(x, y)] as i32, pz, rn);
            ndir = (dir + 1) & 0x3;
        } else {
            nx = x + get_dir_offset_x(dir);
            ny = y + get_dir_offset_y(dir);
            ndir = (dir + 3) & 0x3;
        }

        if iter > 0 && x == start_x && y == start_y && dir == start_dir {
            closed = true;
            break;
        }

        x = nx;
        y = ny;
        dir = ndir;
        iter += 1;
    }

    if !closed {
        return Err(Error::Recast(format!(
            "contour walk of region {} did not close",
            own_reg
        )));
    }

    // Remove last vertex if it duplicates the first one.
    if cont.len() > 1 {
        let first = cont[0];
        let last = cont[cont.len() - 1];
        if first.x == last.x && first.z == last.z {
            cont.pop();
        }
    }
    Ok(cont)
}

fn distance_pt_seg(x: i32, z: i32, px: i32, pz: i32, qx: i32, qz: i32) -> f32 {
    let pqx = (qx - px) as f32;
    let pqz = (qz - pz) as f32;
    let mut dx = (x - px) as f32;
    let mut dz = (z - pz) as f32;
    let d = pqx * pqx + pqz * pqz;
    let mut t = pqx * dx + pqz * dz;
    if d > 0.0 {
        t /= d;
    }
    let t = t.clamp(0.0, 1.0);
    dx = px as f32 + t * pqx - x as f32;
    dz = pz as f32 + t * pqz - z as f32;
    dx * dx + dz * dz
}

fn simplify_contour(cont: &mut Vec<RawVertex>, max_error: f32) {
    let n = cont.len();
    let mut poly: Vec<usize> = (0..n)
        .filter(|&i| cont[(i + 1) % n].r != cont[i].r)
        .collect();

    if poly.len() < 2 {
        // No transitions, seed with the lower-left and upper-right vertices.
        let mut lli = 0;
        let mut uri = 0;
        for i in 1..n {
            let (x, z) = (cont[i].x, cont[i].z);
            if x < cont[lli].x || (x == cont[lli].x && z < cont[lli].z) {
                lli = i;
            }
            if x > cont[uri].x || (x == cont[uri].x && z > cont[uri].z) {
                uri = i;
            }
        }
        poly.clear();
        poly.push(lli);
        poly.push(uri);
    }

    let max_error_sqr = max_error * max_error;
    let mut i = 0;
    while i < poly.len() {
        let ii = (i + 1) % poly.len();
        let ai = poly[i];
        let bi = poly[ii];
        let (ax, az) = (cont[ai].x, cont[ai].z);
        let (bx, bz) = (cont[bi].x, cont[bi].z);

        // Traverse in lexicographic order so opposite segments match.
        let (mut ci, cinc, endi) = if bx > ax || (bx == ax && bz > az) {
            ((ai + 1) % n, 1, bi)
        } else {
            ((bi + n - 1) % n, n - 1, ai)
        };

        let mut maxd = 0.0f32;
        let mut maxi: Option<usize> = None;
        while ci != endi {
            let d = distance_pt_seg(cont[ci].x, cont[ci].z, ax, az, bx, bz);
            if d > maxd {
                maxd = d;
                maxi = Some(ci);
            }
            ci = (ci + cinc) % n;
        }

        match maxi {
            Some(m) if maxd > max_error_sqr => poly.insert(i + 1, m),
            _ => i += 1,
        }
    }

    // Start from the lowest raw index.
    let start = (0..poly.len()).min_by_key(|&k| poly[k]).unwrap_or(0);
    let simplified: Vec<RawVertex> = (0..poly.len())
        .map(|k| cont[poly[(start + k) % poly.len()]])
        .collect();
    *cont = simplified;
}

fn get_corner_height(layer: &HeightfieldLayer, x: i32, y: i32, z: i32, walkable_climb: i32) -> u8 {
    let mut height = 0u8;
    for dz in -1..=0 {
        for dx in -1..=0 {
            let px = x + dx;
            let pz = z + dz;
            if !layer.contains(px, pz) {
                continue;
            }
            let idx = layer.index(px, pz);
            let lh = layer.heights[idx] as i32;
            if (lh - y).abs() <= walkable_climb && layer.areas[idx] != RC_NULL_AREA {
                height = height.max(lh as u8);
            }
        }
    }
    height
}

/// Traces and simplifies the outline of every region in `layer`.
///
/// Regions must already be built with [`crate::build_layer_regions`].
pub fn build_layer_contours(
    layer: &HeightfieldLayer,
    walkable_climb: i32,
    max_error: f32,
) -> Result<LayerContourSet> {
    let mut lcset = LayerContourSet {
        conts: vec![LayerContour::default(); layer.reg_count],
    };

    for y in 0..layer.height {
        for x in 0..layer.width {
            let idx = layer.index(x, y);
            let ri = layer.regs[idx];
            if ri == LAYER_NULL_REGION {
                continue;
            }
            let Some(cont) = lcset.conts.get_mut(ri as usize) else {
                return Err(Error::Recast(format!(
                    "region id {} out of range ({} regions)",
                    ri, layer.reg_count
                )));
            };
            if !cont.verts.is_empty() {
                continue;
            }
            cont.reg = ri;
            cont.area = layer.areas[idx];

            let mut temp = walk_contour(layer, x, y)?;
            if temp.is_empty() {
                continue;
            }
            simplify_contour(&mut temp, max_error);

            let n = temp.len();
            cont.verts = Vec::with_capacity(n);
            for j in 0..n {
                let v = temp[j];
                // The neighbour region of an edge is stored at its end vertex.
                let nei = temp[(j + 1) % n].r;
                let portal = if nei != EDGE_HARD && nei >= EDGE_PORTAL_BASE {
                    nei - EDGE_PORTAL_BASE
                } else {
                    CONTOUR_NO_PORTAL
                };
                cont.verts.push(ContourVertex {
                    x: v.x as u8,
                    y: get_corner_height(layer, v.x, v.y, v.z, walkable_climb),
                    z: v.z as u8,
                    portal,
                });
            }
        }
    }

    Ok(lcset)
}
