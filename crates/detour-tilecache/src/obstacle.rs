//! Temporary obstacles
//!
//! Obstacles are cut into the tiles they overlap when those tiles are
//! rebuilt. Each obstacle moves through a small state machine driven by
//! [`TileCache::update`](crate::TileCache::update).

use super::refs::CompressedTileRef;

/// Obstacle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum ObstacleState {
    /// Empty/uninitialized
    Empty,
    /// Added, waiting for the touched tiles to be rebuilt
    Processing,
    /// Processed and active
    Processed,
    /// Removal requested, waiting for the touched tiles to be rebuilt
    Removing,
}

/// Obstacle shape
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum ObstacleData {
    /// Upright cylinder standing on `pos`
    Cylinder {
        /// Base center position
        pos: [f32; 3],
        radius: f32,
        height: f32,
    },
    /// Axis-aligned box obstacle
    Box {
        /// Minimum bounds
        bmin: [f32; 3],
        /// Maximum bounds
        bmax: [f32; 3],
    },
    /// Box rotated around the Y axis
    OrientedBox {
        /// Center position
        center: [f32; 3],
        /// Half extents (width/2, height/2, depth/2)
        half_extents: [f32; 3],
        /// Rotation auxiliary values [cos(0.5*angle)*sin(-0.5*angle), cos(0.5*angle)*cos(0.5*angle) - 0.5]
        rot_aux: [f32; 2],
    },
}

impl ObstacleData {
    /// Creates an oriented box rotated by `y_radians` around the Y axis
    pub fn oriented_box(center: [f32; 3], half_extents: [f32; 3], y_radians: f32) -> Self {
        let coshalf = (0.5 * y_radians).cos();
        let sinhalf = (-0.5 * y_radians).sin();
        ObstacleData::OrientedBox {
            center,
            half_extents,
            rot_aux: [coshalf * sinhalf, coshalf * coshalf - 0.5],
        }
    }

    /// Whether every coordinate of the shape is a finite number
    pub fn is_finite(&self) -> bool {
        let values: &[f32] = match self {
            ObstacleData::Cylinder {
                pos,
                radius,
                height,
            } => &[pos[0], pos[1], pos[2], *radius, *height],
            ObstacleData::Box { bmin, bmax } => {
                &[bmin[0], bmin[1], bmin[2], bmax[0], bmax[1], bmax[2]]
            }
            ObstacleData::OrientedBox {
                center,
                half_extents,
                rot_aux,
            } => &[
                center[0],
                center[1],
                center[2],
                half_extents[0],
                half_extents[1],
                half_extents[2],
                rot_aux[0],
                rot_aux[1],
            ],
        };
        values.iter().all(|v| v.is_finite())
    }

    /// World space bounds enclosing the shape
    ///
    /// The oriented box uses a square of `1.41 * max(ext.x, ext.z)` around
    /// its center. A square box turned by 45 degrees pokes out of it by
    /// `0.0042 * ext`.
    pub fn bounds(&self) -> ([f32; 3], [f32; 3]) {
        match self {
            ObstacleData::Cylinder {
                pos,
                radius,
                height,
            } => (
                [pos[0] - radius, pos[1], pos[2] - radius],
                [pos[0] + radius, pos[1] + height, pos[2] + radius],
            ),
            ObstacleData::Box { bmin, bmax } => (*bmin, *bmax),
            ObstacleData::OrientedBox {
                center,
                half_extents,
                ..
            } => {
                let max_r = 1.41 * half_extents[0].max(half_extents[2]);
                (
                    [
                        center[0] - max_r,
                        center[1] - half_extents[1],
                        center[2] - max_r,
                    ],
                    [
                        center[0] + max_r,
                        center[1] + half_extents[1],
                        center[2] + max_r,
                    ],
                )
            }
        }
    }
}

/// Obstacle in the tile cache
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Obstacle {
    /// Obstacle data
    pub(crate) data: ObstacleData,
    pub(crate) state: ObstacleState,
    /// Salt value for reference generation
    pub(crate) salt: u16,
    /// Tiles overlapped by the obstacle when it was added
    pub(crate) touched: Vec<CompressedTileRef>,
    /// Touched tiles that still need a rebuild
    pub(crate) pending: Vec<CompressedTileRef>,
    pub(crate) next_free: Option<usize>,
    pub(crate) idx: usize,
}

impl Obstacle {
    pub(crate) fn empty(idx: usize) -> Self {
        Self {
            data: ObstacleData::Cylinder {
                pos: [0.0; 3],
                radius: 0.0,
                height: 0.0,
            },
            state: ObstacleState::Empty,
            salt: 1,
            touched: Vec::new(),
            pending: Vec::new(),
            next_free: None,
            idx,
        }
    }

    pub fn shape(&self) -> &ObstacleData {
        &self.data
    }

    pub fn state(&self) -> ObstacleState {
        self.state
    }

    pub fn salt(&self) -> u16 {
        self.salt
    }

    /// Tiles overlapped by the obstacle
    pub fn touched(&self) -> &[CompressedTileRef] {
        &self.touched
    }

    /// Tiles still waiting for a rebuild
    pub fn pending(&self) -> &[CompressedTileRef] {
        &self.pending
    }

    /// World space bounds of the obstacle
    pub fn bounds(&self) -> ([f32; 3], [f32; 3]) {
        self.data.bounds()
    }
}

/// Requested obstacle change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObstacleRequestAction {
    Add,
    Remove,
}

/// Obstacle change waiting for the next [`TileCache::update`](crate::TileCache::update)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObstacleRequest {
    pub action: ObstacleRequestAction,
    pub obstacle: super::refs::ObstacleRef,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contains(bounds: &([f32; 3], [f32; 3]), p: [f32; 3]) -> bool {
        (0..3).all(|i| p[i] >= bounds.0[i] - 1e-5 && p[i] <= bounds.1[i] + 1e-5)
    }

    #[test]
    fn test_cylinder_bounds() {
        let shape = ObstacleData::Cylinder {
            pos: [5.0, 1.0, 5.0],
            radius: 1.0,
            height: 2.0,
        };
        assert_eq!(shape.bounds(), ([4.0, 1.0, 4.0], [6.0, 3.0, 6.0]));
    }

    #[test]
    fn test_box_bounds_are_stored_extents() {
        let shape = ObstacleData::Box {
            bmin: [-1.0, 0.0, 2.0],
            bmax: [3.0, 4.0, 5.0],
        };
        assert_eq!(shape.bounds(), ([-1.0, 0.0, 2.0], [3.0, 4.0, 5.0]));
    }

    #[test]
    fn test_oriented_box_rot_aux() {
        let angle = 0.7f32;
        match ObstacleData::oriented_box([0.0; 3], [1.0; 3], angle) {
            ObstacleData::OrientedBox { rot_aux, .. } => {
                let h = angle * 0.5;
                assert!((rot_aux[0] - h.cos() * (-h).sin()).abs() < 1e-6);
                assert!((rot_aux[1] - (h.cos() * h.cos() - 0.5)).abs() < 1e-6);
                // 2 * rot_aux = (-sin(angle), cos(angle))
                assert!((2.0 * rot_aux[0] + angle.sin()).abs() < 1e-6);
                assert!((2.0 * rot_aux[1] - angle.cos()).abs() < 1e-6);
            }
            _ => panic!("Expected oriented box obstacle"),
        }
    }

    #[test]
    fn test_oriented_box_bounds_contain_rotated_corners() {
        let center = [3.0, 1.0, -2.0];
        let ext = [2.0, 0.5, 1.0];
        for step in 0..32 {
            let angle = step as f32 * std::f32::consts::TAU / 32.0;
            let bounds = ObstacleData::oriented_box(center, ext, angle).bounds();
            let (s, c) = angle.sin_cos();
            for (sx, sz) in [(-1.0, -1.0), (-1.0, 1.0), (1.0, -1.0), (1.0, 1.0)] {
                for sy in [-1.0, 1.0] {
                    let lx = sx * ext[0];
                    let lz = sz * ext[2];
                    let corner = [
                        center[0] + c * lx - s * lz,
                        center[1] + sy * ext[1],
                        center[2] + s * lx + c * lz,
                    ];
                    assert!(contains(&bounds, corner), "angle {} corner {:?}", angle, corner);
                }
            }
        }
    }

    #[test]
    fn test_square_oriented_box_corner_slightly_outside_bounds() {
        let ext = [1.0, 1.0, 1.0];
        let angle = std::f32::consts::FRAC_PI_4;
        let (bmin, bmax) = ObstacleData::oriented_box([0.0; 3], ext, angle).bounds();
        assert!((bmax[0] - 1.41).abs() < 1e-6);
        assert!((bmin[2] + 1.41).abs() < 1e-6);
        // A square box at 45 degrees reaches sqrt(2) on X, just past the bound
        let (s, c) = angle.sin_cos();
        let corner_x = c * ext[0] + s * ext[2];
        assert!(corner_x > bmax[0]);
        assert!((corner_x - bmax[0]) / ext[0] < 0.003);
    }

    #[test]
    fn test_non_finite_shapes() {
        assert!(ObstacleData::oriented_box([0.0; 3], [1.0; 3], 0.3).is_finite());
        assert!(!ObstacleData::oriented_box([0.0; 3], [1.0; 3], f32::NAN).is_finite());
        let cylinder = ObstacleData::Cylinder {
            pos: [0.0, f32::NEG_INFINITY, 0.0],
            radius: 1.0,
            height: 1.0,
        };
        assert!(!cylinder.is_finite());
        let aabb = ObstacleData::Box {
            bmin: [0.0; 3],
            bmax: [1.0; 3],
        };
        assert!(aabb.is_finite());
    }

    #[test]
    fn test_empty_obstacle_starts_with_nonzero_salt() {
        let obstacle = Obstacle::empty(3);
        assert_eq!(obstacle.state(), ObstacleState::Empty);
        assert_eq!(obstacle.salt(), 1);
        assert!(obstacle.touched().is_empty());
        assert_eq!(obstacle.idx, 3);
    }
}
