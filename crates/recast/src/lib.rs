//! Recast component for tiled navigation mesh generation
//!
//! Recast takes input triangle meshes and turns each tile into a single-surface
//! heightfield layer, which is then partitioned into regions, outlined with
//! contours and converted into a polygon mesh. The steps are exposed
//! separately so a tile cache can re-run the later ones on a stored layer.

mod config;
mod contour;
mod heightfield_layers;
mod layer_regions;
mod polymesh;
mod rasterization;
mod triangle_utils;

pub use config::LayerConfig;
pub use contour::{build_layer_contours, ContourVertex, LayerContour, LayerContourSet, CONTOUR_NO_PORTAL};
pub use heightfield_layers::HeightfieldLayer;
pub use layer_regions::build_layer_regions;
pub use polymesh::{build_layer_poly_mesh, LayerPolyMesh, MESH_NULL_IDX, MESH_PORTAL_FLAG};
pub use rasterization::rasterize_layer;
pub use triangle_utils::{
    get_dir_offset_x, get_dir_offset_y, LAYER_EMPTY_HEIGHT, LAYER_NULL_REGION, RC_NULL_AREA,
    RC_WALKABLE_AREA,
};
