//! Triangle rasterization into a single-surface tile layer
//!
//! Each cell samples the triangles covering its center and keeps the highest
//! surface inside the tile's vertical extent. Triangles steeper than the
//! walkable slope still occlude lower surfaces but are stored unwalkable.

use glam::Vec3;
use recast_common::{deg_to_rad, triangle_normal, Result, TriMesh};

use crate::config::LayerConfig;
use crate::heightfield_layers::HeightfieldLayer;
use crate::triangle_utils::{LAYER_EMPTY_HEIGHT, RC_NULL_AREA, RC_WALKABLE_AREA};

const BARY_EPSILON: f32 = 1e-5;

/// Rasterizes the triangles of `mesh` that overlap the tile described by
/// `config` into a new layer, then erodes and connects it.
pub fn rasterize_layer(mesh: &TriMesh, config: &LayerConfig) -> Result<HeightfieldLayer> {
    config.validate()?;
    mesh.validate()?;

    let mut layer = HeightfieldLayer::new(
        config.width,
        config.height,
        config.bmin,
        config.bmax,
        config.cs,
        config.ch,
    )?;

    let walkable_thr = deg_to_rad(config.walkable_slope_angle).cos();
    let mut top = vec![f32::NEG_INFINITY; layer.cell_count()];
    let mut walkable = vec![false; layer.cell_count()];

    let mut touched = 0usize;
    for i in 0..mesh.tri_count {
        let [a, b, c] = mesh.triangle(i);
        let tmin = a.min(b).min(c);
        let tmax = a.max(b).max(c);
        if tmax.x < config.bmin.x
            || tmin.x > config.bmax.x
            || tmax.z < config.bmin.z
            || tmin.z > config.bmax.z
        {
            continue;
        }
        touched += 1;
        let is_walkable = triangle_normal(a, b, c).y > walkable_thr;
        rasterize_triangle(&layer, a, b, c, |idx, y| {
            if y > top[idx] {
                top[idx] = y;
                walkable[idx] = is_walkable;
            }
        });
    }

    let max_h = (LAYER_EMPTY_HEIGHT - 1) as f32;
    for idx in 0..layer.cell_count() {
        if top[idx] == f32::NEG_INFINITY {
            continue;
        }
        let h = ((top[idx] - config.bmin.y) / config.ch).floor().clamp(0.0, max_h);
        layer.heights[idx] = h as u8;
        layer.areas[idx] = if walkable[idx] {
            RC_WALKABLE_AREA
        } else {
            RC_NULL_AREA
        };
    }

    log::trace!(
        "rasterized {} of {} triangles into a {}x{} layer",
        touched,
        mesh.tri_count,
        config.width,
        config.height
    );

    layer.erode_walkable_area(config.walkable_radius);
    layer.build_connections(config.walkable_climb);
    Ok(layer)
}

/// Calls `emit(cell_index, surface_y)` for every cell whose center lies
/// inside the XZ projection of the triangle and whose surface height lies
/// inside the layer's vertical bounds.
fn rasterize_triangle<F>(layer: &HeightfieldLayer, a: Vec3, b: Vec3, c: Vec3, mut emit: F)
where
    F: FnMut(usize, f32),
{
    let denom = (b.z - c.z) * (a.x - c.x) + (c.x - b.x) * (a.z - c.z);
    if denom.abs() < 1e-12 {
        // Vertical or degenerate, no top surface
        return;
    }

    let ics = 1.0 / layer.cs;
    let tmin = a.min(b).min(c);
    let tmax = a.max(b).max(c);
    let x0 = (((tmin.x - layer.bmin.x) * ics).floor() as i32).max(0);
    let x1 = (((tmax.x - layer.bmin.x) * ics).floor() as i32).min(layer.width - 1);
    let z0 = (((tmin.z - layer.bmin.z) * ics).floor() as i32).max(0);
    let z1 = (((tmax.z - layer.bmin.z) * ics).floor() as i32).min(layer.height - 1);

    for z in z0..=z1 {
        let pz = layer.bmin.z + (z as f32 + 0.5) * layer.cs;
        for x in x0..=x1 {
            let px = layer.bmin.x + (x as f32 + 0.5) * layer.cs;
            let w0 = ((b.z - c.z) * (px - c.x) + (c.x - b.x) * (pz - c.z)) / denom;
            let w1 = ((c.z - a.z) * (px - c.x) + (a.x - c.x) * (pz - c.z)) / denom;
            let w2 = 1.0 - w0 - w1;
            if w0 < -BARY_EPSILON || w1 < -BARY_EPSILON || w2 < -BARY_EPSILON {
                continue;
            }
            let y = w0 * a.y + w1 * b.y + w2 * c.y;
            if y < layer.bmin.y || y > layer.bmax.y {
                continue;
            }
            emit(layer.index(x, z), y);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(size: i32) -> LayerConfig {
        LayerConfig {
            width: size,
            height: size,
            cs: 1.0,
            ch: 0.5,
            bmin: Vec3::ZERO,
            bmax: Vec3::new(size as f32, 8.0, size as f32),
            walkable_slope_angle: 45.0,
            walkable_climb: 2,
            walkable_radius: 0,
        }
    }

    #[test]
    fn test_flat_plane_fills_every_cell() {
        let mut mesh = TriMesh::new();
        mesh.add_plane(Vec3::new(0.0, 1.0, 0.0), Vec3::new(8.0, 1.0, 8.0), 2, 2);
        let layer = rasterize_layer(&mesh, &config(8)).unwrap();
        assert_eq!(layer.walkable_cell_count(), 64);
        assert!(layer.heights.iter().all(|&h| h == 2));
    }

    #[test]
    fn test_box_top_occludes_floor() {
        let mut mesh = TriMesh::new();
        mesh.add_plane(Vec3::ZERO, Vec3::new(8.0, 0.0, 8.0), 1, 1);
        mesh.add_box(Vec3::new(2.0, 0.0, 2.0), Vec3::new(6.0, 3.0, 6.0));
        let layer = rasterize_layer(&mesh, &config(8)).unwrap();
        assert_eq!(layer.heights[layer.index(4, 4)], 6);
        assert_eq!(layer.heights[layer.index(0, 0)], 0);
        // 3 world units is far above the climb, so the platform is cut off
        let inside = layer.index(2, 4);
        let outside = layer.index(1, 4);
        assert_eq!(layer.cons[inside] & 0x01, 0);
        assert_eq!(layer.cons[outside] & (1 << 2), 0);
    }

    #[test]
    fn test_steep_triangles_are_unwalkable() {
        let mut mesh = TriMesh::new();
        let a = mesh.add_vertex(Vec3::new(0.0, 0.0, 0.0));
        let b = mesh.add_vertex(Vec3::new(0.0, 0.0, 4.0));
        let c = mesh.add_vertex(Vec3::new(4.0, 7.0, 0.0));
        mesh.add_triangle(a, b, c);
        let layer = rasterize_layer(&mesh, &config(4)).unwrap();
        assert!(layer.heights.iter().any(|&h| h != LAYER_EMPTY_HEIGHT));
        assert_eq!(layer.walkable_cell_count(), 0);
    }

    #[test]
    fn test_geometry_outside_tile_is_ignored() {
        let mut mesh = TriMesh::new();
        mesh.add_plane(Vec3::new(20.0, 0.0, 20.0), Vec3::new(30.0, 0.0, 30.0), 1, 1);
        let layer = rasterize_layer(&mesh, &config(4)).unwrap();
        assert!(layer.tight_bounds().is_none());
    }
}
