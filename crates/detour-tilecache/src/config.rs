//! Tile cache configuration

use detour::Status;
use recast_common::{Error, Result};

/// Tile cache parameters, fixed once the cache is created
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TileCacheParams {
    /// Origin of the tile grid
    pub origin: [f32; 3],
    /// Cell size (horizontal resolution)
    pub cs: f32,
    /// Cell height (vertical resolution)
    pub ch: f32,
    /// Width of a tile layer (in cells)
    pub width: i32,
    /// Height of a tile layer (in cells)
    pub height: i32,
    /// Agent height in world units
    pub walkable_height: f32,
    /// Agent radius in world units
    pub walkable_radius: f32,
    /// Agent max climb in world units
    pub walkable_climb: f32,
    /// Maximum contour simplification error (in cells)
    pub max_simplification_error: f32,
    /// Maximum number of compressed tiles
    pub max_tiles: i32,
    /// Maximum number of obstacles
    pub max_obstacles: i32,
}

impl Default for TileCacheParams {
    fn default() -> Self {
        Self {
            origin: [0.0; 3],
            cs: 0.3,
            ch: 0.2,
            width: 48,
            height: 48,
            walkable_height: 2.0,
            walkable_radius: 0.6,
            walkable_climb: 0.9,
            max_simplification_error: 1.3,
            max_tiles: 128,
            max_obstacles: 128,
        }
    }
}

impl TileCacheParams {
    pub fn with_origin(mut self, origin: [f32; 3]) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_cell_size(mut self, cs: f32, ch: f32) -> Self {
        self.cs = cs;
        self.ch = ch;
        self
    }

    pub fn with_tile_size(mut self, width: i32, height: i32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_walkable_height(mut self, walkable_height: f32) -> Self {
        self.walkable_height = walkable_height;
        self
    }

    pub fn with_walkable_radius(mut self, walkable_radius: f32) -> Self {
        self.walkable_radius = walkable_radius;
        self
    }

    pub fn with_walkable_climb(mut self, walkable_climb: f32) -> Self {
        self.walkable_climb = walkable_climb;
        self
    }

    pub fn with_max_simplification_error(mut self, max_simplification_error: f32) -> Self {
        self.max_simplification_error = max_simplification_error;
        self
    }

    pub fn with_max_tiles(mut self, max_tiles: i32) -> Self {
        self.max_tiles = max_tiles;
        self
    }

    pub fn with_max_obstacles(mut self, max_obstacles: i32) -> Self {
        self.max_obstacles = max_obstacles;
        self
    }

    /// World size of a tile along x
    pub fn tile_world_width(&self) -> f32 {
        self.width as f32 * self.cs
    }

    /// World size of a tile along z
    pub fn tile_world_height(&self) -> f32 {
        self.height as f32 * self.cs
    }

    /// Agent climb in cell height units, as used by the build steps
    pub fn walkable_climb_voxels(&self) -> i32 {
        (self.walkable_climb / self.ch).floor() as i32
    }

    pub fn validate(&self) -> Result<()> {
        if self.origin.iter().any(|v| !v.is_finite()) {
            return Err(invalid("origin must be finite"));
        }
        if self.cs <= 0.0 || self.ch <= 0.0 {
            return Err(invalid("cell size and height must be positive"));
        }
        if self.width <= 0 || self.height <= 0 || self.width > 255 || self.height > 255 {
            return Err(invalid("tile size must be within 1..=255 cells"));
        }
        if self.walkable_height < 0.0 || self.walkable_radius < 0.0 || self.walkable_climb < 0.0 {
            return Err(invalid("agent dimensions must not be negative"));
        }
        if self.max_simplification_error < 0.0 {
            return Err(invalid("simplification error must not be negative"));
        }
        if self.max_tiles <= 0 {
            return Err(invalid("max tiles must be positive"));
        }
        if self.max_obstacles <= 0 || self.max_obstacles > 0xffff {
            return Err(invalid("max obstacles must be within 1..=65535"));
        }
        Ok(())
    }

    /// Parses parameters from JSON
    #[cfg(feature = "serialization")]
    pub fn from_json_str(json: &str) -> Result<Self> {
        let params: Self = serde_json::from_str(json)
            .map_err(|e| Error::TileCache(format!("{}: {}", Status::InvalidParam, e)))?;
        params.validate()?;
        Ok(params)
    }

    /// Serializes parameters to pretty printed JSON
    #[cfg(feature = "serialization")]
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::TileCache(format!("{}: {}", Status::Failure, e)))
    }

    /// Loads parameters from a JSON file
    #[cfg(feature = "serialization")]
    pub fn load_from_json<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Saves parameters to a JSON file
    #[cfg(feature = "serialization")]
    pub fn save_to_json<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    /// Serializes parameters to a compact binary form
    #[cfg(feature = "serialization")]
    pub fn to_binary_bytes(&self) -> Result<Vec<u8>> {
        postcard::to_allocvec(self)
            .map_err(|e| Error::TileCache(format!("{}: {}", Status::Failure, e)))
    }

    /// Deserializes parameters from [`TileCacheParams::to_binary_bytes`] output
    #[cfg(feature = "serialization")]
    pub fn from_binary_bytes(data: &[u8]) -> Result<Self> {
        let params: Self = postcard::from_bytes(data)
            .map_err(|e| Error::TileCache(format!("{}: {}", Status::DataCorrupted, e)))?;
        params.validate()?;
        Ok(params)
    }
}

fn invalid(reason: &str) -> Error {
    Error::TileCache(format!("{}: {}", Status::InvalidParam, reason))
}
