//! Math utilities shared by the build and runtime crates

use glam::Vec3;
use std::f32::consts::PI;

/// Converts degrees to radians
#[inline]
pub fn deg_to_rad(deg: f32) -> f32 {
    deg * PI / 180.0
}

/// Clamps a value between min and max
#[inline]
pub fn clamp<T: PartialOrd>(v: T, min: T, max: T) -> T {
    if v < min {
        min
    } else if v > max {
        max
    } else {
        v
    }
}

/// Square a value (x²)
#[inline]
pub fn sqr<T: std::ops::Mul<Output = T> + Copy>(x: T) -> T {
    x * x
}

/// Get the next power of 2 greater than or equal to x
#[inline]
pub fn next_pow2(x: u32) -> u32 {
    if x == 0 {
        return 1;
    }
    let mut n = x - 1;
    n |= n >> 1;
    n |= n >> 2;
    n |= n >> 4;
    n |= n >> 8;
    n |= n >> 16;
    n.wrapping_add(1)
}

/// Integer log base 2
#[inline]
pub fn ilog2(x: u32) -> u32 {
    if x == 0 {
        return 0;
    }
    31 - x.leading_zeros()
}

/// Checks whether two inclusive axis-aligned boxes overlap
#[inline]
pub fn overlap_bounds(amin: &[f32; 3], amax: &[f32; 3], bmin: &[f32; 3], bmax: &[f32; 3]) -> bool {
    !(amin[0] > bmax[0]
        || amax[0] < bmin[0]
        || amin[1] > bmax[1]
        || amax[1] < bmin[1]
        || amin[2] > bmax[2]
        || amax[2] < bmin[2])
}

/// Unit normal of the triangle (a, b, c), or zero for a degenerate triangle
pub fn triangle_normal(a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    (b - a).cross(c - a).normalize_or_zero()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_pow2() {
        assert_eq!(next_pow2(0), 1);
        assert_eq!(next_pow2(1), 1);
        assert_eq!(next_pow2(3), 4);
        assert_eq!(next_pow2(16), 16);
        assert_eq!(next_pow2(17), 32);
    }

    #[test]
    fn test_ilog2() {
        assert_eq!(ilog2(1), 0);
        assert_eq!(ilog2(16), 4);
        assert_eq!(ilog2(31), 4);
        assert_eq!(ilog2(1 << 20), 20);
    }

    #[test]
    fn test_overlap_bounds_touching_edges() {
        let a = ([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        let b = ([1.0, 0.0, 0.0], [2.0, 1.0, 1.0]);
        let c = ([1.5, 0.0, 0.0], [2.0, 1.0, 1.0]);
        assert!(overlap_bounds(&a.0, &a.1, &b.0, &b.1));
        assert!(!overlap_bounds(&a.0, &a.1, &c.0, &c.1));
    }

    #[test]
    fn test_triangle_normal_points_up_for_ccw_from_above() {
        let n = triangle_normal(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 0.0),
        );
        assert!((n.y - 1.0).abs() < 1e-6);
    }
}
