//! Dynamic obstacle management and tile caching for navigation meshes
//!
//! This crate keeps the heightfield layers of a tiled world in compressed
//! form and rebuilds navigation mesh tiles on demand when temporary
//! obstacles are added or removed, without regenerating the whole mesh.
//!
//! # Features
//!
//! - **Tile Caching**: Compressed layer storage addressed by salted references
//! - **Dynamic Obstacles**: Cylinder, box and oriented box obstacles
//! - **Incremental Updates**: One tile rebuild per [`TileCache::update`] call
//! - **Compression**: Pluggable compressors, run length and LZ4 included
//! - **Bulk Building**: Parallel layer construction from input geometry
//!
//! # Example
//!
//! ```rust,no_run
//! use detour::{NavMesh, NavMeshParams};
//! use detour_tilecache::{Lz4Compressor, TileCache, TileCacheParams};
//!
//! # fn main() -> recast_common::Result<()> {
//! let params = TileCacheParams::default();
//! let mut nav_mesh = NavMesh::new(NavMeshParams {
//!     tile_width: params.tile_world_width(),
//!     tile_height: params.tile_world_height(),
//!     ..Default::default()
//! })?;
//! let mut tile_cache = TileCache::new(params, Box::new(Lz4Compressor), None)?;
//!
//! // Layers come from TileCacheLayerBuilder or from disk
//! # let layers: Vec<Vec<u8>> = Vec::new();
//! for data in layers {
//!     tile_cache.add_tile(data, 0)?;
//! }
//!
//! let obstacle = tile_cache.add_obstacle([10.0, 0.0, 10.0], 2.0, 4.0)?;
//! while !tile_cache.update(&mut nav_mesh)? {}
//!
//! tile_cache.remove_obstacle(obstacle)?;
//! while !tile_cache.update(&mut nav_mesh)? {}
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`TileCache`]: Tile store, obstacle store and rebuild scheduler
//! - [`TileCacheLayer`]: Decompressed layer and its wire format
//! - [`build_tile_nav_data`]: Rebuild pipeline from layer to tile data
//! - [`TileCacheLayerBuilder`]: Parallel construction of compressed layers
//! - [`NavMeshTiles`]: Navigation mesh the rebuilt tiles are published to

pub mod compressor;
pub mod config;
pub mod layer_builder;
pub mod obstacle;
pub mod refs;
pub mod tile_cache;
pub mod tile_cache_builder;
pub mod tile_cache_data;
pub mod tile_cache_integration;

#[cfg(test)]
mod tile_cache_tests;

pub use compressor::{Lz4Compressor, RleCompressor, TileCacheCompressor};
pub use config::TileCacheParams;
pub use layer_builder::{BuiltLayer, LayerBuildConfig, TileCacheLayerBuilder};
pub use obstacle::{Obstacle, ObstacleData, ObstacleRequest, ObstacleRequestAction, ObstacleState};
pub use refs::{CompressedTileRef, ObstacleRef, TileRefCodec};
pub use tile_cache::{CompressedTile, TileCache};
pub use tile_cache_builder::{
    build_tile_nav_data, mark_box_area, mark_cylinder_area, mark_obstacle, mark_oriented_box_area,
    TileCacheMeshProcess,
};
pub use tile_cache_data::{
    LayerByteOrder, LayerWireFormat, TileCacheLayer, TileCacheLayerHeader, LAYER_HEADER_SIZE,
    LAYER_HEADER_SIZE_C, TILECACHE_MAGIC, TILECACHE_VERSION,
};
pub use tile_cache_integration::NavMeshTiles;
