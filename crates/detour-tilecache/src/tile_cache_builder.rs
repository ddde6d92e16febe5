//! Tile rebuild pipeline
//!
//! Cuts obstacles into a decompressed layer and runs the Recast layer build
//! steps (regions, contours, polygon mesh) to produce navigation mesh tile
//! data.

use super::config::TileCacheParams;
use super::obstacle::ObstacleData;
use super::tile_cache_data::TileCacheLayer;
use detour::{create_nav_mesh_data, NavMeshCreateParams};
use recast::{build_layer_contours, build_layer_poly_mesh, build_layer_regions, RC_NULL_AREA};
use recast_common::Result;

/// Hook run on every rebuilt tile before it is encoded, typically used to
/// assign polygon flags from area ids
pub trait TileCacheMeshProcess: Send {
    fn process(&mut self, params: &mut NavMeshCreateParams);
}

impl<F> TileCacheMeshProcess for F
where
    F: FnMut(&mut NavMeshCreateParams) + Send,
{
    fn process(&mut self, params: &mut NavMeshCreateParams) {
        self(params)
    }
}

/// Cell range `[min, max]` of a world span along one axis, `None` when it
/// misses the layer entirely
fn cell_range(min: f32, max: f32, origin: f32, ics: f32, size: i32) -> Option<(i32, i32)> {
    let lo = ((min - origin) * ics).floor() as i32;
    let hi = ((max - origin) * ics).floor() as i32;
    if hi < 0 || lo >= size {
        return None;
    }
    Some((lo.max(0), hi.min(size - 1)))
}

/// Surface height range `[min, max]` in cell height units
fn height_range(min_y: f32, max_y: f32, origin_y: f32, ich: f32) -> (i32, i32) {
    (
        ((min_y - origin_y) * ich).floor() as i32,
        ((max_y - origin_y) * ich).floor() as i32,
    )
}

/// Marks the cells under an upright cylinder with `area_id`
pub fn mark_cylinder_area(
    layer: &mut TileCacheLayer,
    cs: f32,
    ch: f32,
    pos: [f32; 3],
    radius: f32,
    height: f32,
    area_id: u8,
) {
    let orig = layer.header.bmin;
    let w = layer.header.width as i32;
    let h = layer.header.height as i32;
    let ics = 1.0 / cs;
    let ich = 1.0 / ch;

    let px = (pos[0] - orig[0]) * ics;
    let pz = (pos[2] - orig[2]) * ics;
    let r2 = (radius * ics + 0.5) * (radius * ics + 0.5);

    let Some((minx, maxx)) = cell_range(pos[0] - radius, pos[0] + radius, orig[0], ics, w) else {
        return;
    };
    let Some((minz, maxz)) = cell_range(pos[2] - radius, pos[2] + radius, orig[2], ics, h) else {
        return;
    };
    let (miny, maxy) = height_range(pos[1], pos[1] + height, orig[1], ich);

    for z in minz..=maxz {
        for x in minx..=maxx {
            let dx = x as f32 + 0.5 - px;
            let dz = z as f32 + 0.5 - pz;
            if dx * dx + dz * dz > r2 {
                continue;
            }
            let idx = (x + z * w) as usize;
            let y = layer.heights[idx] as i32;
            if y < miny || y > maxy {
                continue;
            }
            layer.areas[idx] = area_id;
        }
    }
}

/// Marks the cells inside an axis-aligned box with `area_id`
pub fn mark_box_area(
    layer: &mut TileCacheLayer,
    cs: f32,
    ch: f32,
    bmin: [f32; 3],
    bmax: [f32; 3],
    area_id: u8,
) {
    let orig = layer.header.bmin;
    let w = layer.header.width as i32;
    let h = layer.header.height as i32;
    let ics = 1.0 / cs;
    let ich = 1.0 / ch;

    let Some((minx, maxx)) = cell_range(bmin[0], bmax[0], orig[0], ics, w) else {
        return;
    };
    let Some((minz, maxz)) = cell_range(bmin[2], bmax[2], orig[2], ics, h) else {
        return;
    };
    let (miny, maxy) = height_range(bmin[1], bmax[1], orig[1], ich);

    for z in minz..=maxz {
        for x in minx..=maxx {
            let idx = (x + z * w) as usize;
            let y = layer.heights[idx] as i32;
            if y < miny || y > maxy {
                continue;
            }
            layer.areas[idx] = area_id;
        }
    }
}

/// Marks the cells inside a box rotated around Y with `area_id`.
///
/// `rot_aux` holds `[cos(a/2) * sin(-a/2), cos(a/2)^2 - 0.5]`, half the
/// rotation matrix coefficients, which the doubled cell offsets cancel out.
#[allow(clippy::too_many_arguments)]
pub fn mark_oriented_box_area(
    layer: &mut TileCacheLayer,
    cs: f32,
    ch: f32,
    center: [f32; 3],
    half_extents: [f32; 3],
    rot_aux: [f32; 2],
    area_id: u8,
) {
    let orig = layer.header.bmin;
    let w = layer.header.width as i32;
    let h = layer.header.height as i32;
    let ics = 1.0 / cs;
    let ich = 1.0 / ch;

    let cx = (center[0] - orig[0]) * ics;
    let cz = (center[2] - orig[2]) * ics;
    let max_r = 1.41 * half_extents[0].max(half_extents[2]);

    let Some((minx, maxx)) = cell_range(center[0] - max_r, center[0] + max_r, orig[0], ics, w)
    else {
        return;
    };
    let Some((minz, maxz)) = cell_range(center[2] - max_r, center[2] + max_r, orig[2], ics, h)
    else {
        return;
    };
    let (miny, maxy) = height_range(
        center[1] - half_extents[1],
        center[1] + half_extents[1],
        orig[1],
        ich,
    );

    let xhalf = half_extents[0] * ics + 0.5;
    let zhalf = half_extents[2] * ics + 0.5;

    for z in minz..=maxz {
        for x in minx..=maxx {
            let x2 = 2.0 * (x as f32 - cx);
            let z2 = 2.0 * (z as f32 - cz);
            let xrot = rot_aux[1] * x2 + rot_aux[0] * z2;
            if xrot > xhalf || xrot < -xhalf {
                continue;
            }
            let zrot = rot_aux[1] * z2 - rot_aux[0] * x2;
            if zrot > zhalf || zrot < -zhalf {
                continue;
            }
            let idx = (x + z * w) as usize;
            let y = layer.heights[idx] as i32;
            if y < miny || y > maxy {
                continue;
            }
            layer.areas[idx] = area_id;
        }
    }
}

/// Marks the cells covered by `shape` as unwalkable
pub fn mark_obstacle(layer: &mut TileCacheLayer, cs: f32, ch: f32, shape: &ObstacleData) {
    log::trace!(
        "marking obstacle {:?} into layer ({}, {}, {})",
        shape,
        layer.header.tx,
        layer.header.ty,
        layer.header.tlayer
    );
    match *shape {
        ObstacleData::Cylinder {
            pos,
            radius,
            height,
        } => mark_cylinder_area(layer, cs, ch, pos, radius, height, RC_NULL_AREA),
        ObstacleData::Box { bmin, bmax } => mark_box_area(layer, cs, ch, bmin, bmax, RC_NULL_AREA),
        ObstacleData::OrientedBox {
            center,
            half_extents,
            rot_aux,
        } => mark_oriented_box_area(layer, cs, ch, center, half_extents, rot_aux, RC_NULL_AREA),
    }
}

/// Builds navigation mesh tile data from a decompressed layer and the
/// obstacles overlapping it.
///
/// Returns `None` when no polygon survives, in which case the tile should
/// be removed from the navigation mesh.
pub fn build_tile_nav_data<'a, I>(
    mut layer: TileCacheLayer,
    obstacles: I,
    params: &TileCacheParams,
    max_verts_per_poly: usize,
    mesh_process: Option<&mut dyn TileCacheMeshProcess>,
) -> Result<Option<Vec<u8>>>
where
    I: IntoIterator<Item = &'a ObstacleData>,
{
    let mut obstacle_count = 0;
    for shape in obstacles {
        mark_obstacle(&mut layer, params.cs, params.ch, shape);
        obstacle_count += 1;
    }

    let header = layer.header.clone();
    let walkable_climb = params.walkable_climb_voxels();

    let mut hf = layer.to_heightfield_layer(params.cs, params.ch)?;
    build_layer_regions(&mut hf, walkable_climb)?;
    let cset = build_layer_contours(&hf, walkable_climb, params.max_simplification_error)?;
    let pmesh = build_layer_poly_mesh(&cset, hf.width, hf.height, max_verts_per_poly)?;

    log::debug!(
        "rebuilt layer ({}, {}, {}) with {} obstacles: {} regions, {} polys",
        header.tx,
        header.ty,
        header.tlayer,
        obstacle_count,
        hf.reg_count,
        pmesh.poly_count()
    );

    if pmesh.poly_count() == 0 {
        return Ok(None);
    }

    let mut create = NavMeshCreateParams {
        walkable_height: params.walkable_height,
        walkable_radius: params.walkable_radius,
        walkable_climb: params.walkable_climb,
        tile_x: header.tx,
        tile_y: header.ty,
        tile_layer: header.tlayer,
        cs: params.cs,
        ch: params.ch,
        bmin: header.bmin,
        bmax: header.bmax,
        build_bv_tree: false,
        ..NavMeshCreateParams::from_poly_mesh(&pmesh)
    };

    if let Some(hook) = mesh_process {
        hook.process(&mut create);
    }

    Ok(Some(create_nav_mesh_data(&create)?))
}
