//! Configuration for rasterizing one tile into a heightfield layer

use glam::Vec3;
use recast_common::{Error, Result};

/// Parameters for building a single tile layer
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct LayerConfig {
    /// Width of the layer grid in cells (x-axis)
    pub width: i32,
    /// Height of the layer grid in cells (z-axis)
    pub height: i32,
    /// The width/depth resolution of the field (cell size)
    pub cs: f32,
    /// The height resolution of the field (cell height)
    pub ch: f32,
    /// The minimum bounds of the tile's AABB
    pub bmin: Vec3,
    /// The maximum bounds of the tile's AABB
    pub bmax: Vec3,
    /// The maximum slope in degrees that is considered walkable
    pub walkable_slope_angle: f32,
    /// The maximum height step between connected cells (voxels)
    pub walkable_climb: i32,
    /// The distance to erode the walkable area from unwalkable cells (voxels)
    pub walkable_radius: i32,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            width: 48,
            height: 48,
            cs: 0.3,
            ch: 0.2,
            bmin: Vec3::ZERO,
            bmax: Vec3::ZERO,
            walkable_slope_angle: 45.0,
            walkable_climb: 4,
            walkable_radius: 2,
        }
    }
}

impl LayerConfig {
    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.width <= 0 || self.height <= 0 || self.width > 255 || self.height > 255 {
            return Err(Error::Recast(format!(
                "layer size {}x{} must be within 1..=255",
                self.width, self.height
            )));
        }
        if self.cs <= 0.0 || self.ch <= 0.0 {
            return Err(Error::Recast("cell size and height must be positive".into()));
        }
        if self.bmax.x < self.bmin.x || self.bmax.y < self.bmin.y || self.bmax.z < self.bmin.z {
            return Err(Error::Recast("layer bounds are inverted".into()));
        }
        if !(0.0..90.0).contains(&self.walkable_slope_angle) {
            return Err(Error::Recast("walkable slope angle must be in [0, 90)".into()));
        }
        if self.walkable_climb < 0 || self.walkable_radius < 0 {
            return Err(Error::Recast("walkable climb and radius must not be negative".into()));
        }
        Ok(())
    }
}
