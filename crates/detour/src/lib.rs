//! Detour component for navigation mesh tiles
//!
//! Detour stores the polygon tiles produced by the Recast build steps. Tiles
//! are encoded into a portable binary format, added to a [`NavMesh`] under a
//! salted [`TileRef`] and can be replaced one at a time.

pub mod binary_format;
mod nav_mesh;
mod nav_mesh_builder;
mod status;


pub use binary_format::{BvNode, MeshHeader, Poly, TileData, DT_EXT_LINK};
pub use nav_mesh::{MeshTile, NavMesh, NavMeshParams, TileRef};
pub use nav_mesh_builder::{create_nav_mesh_data, NavMeshCreateParams};
pub use status::Status;

/// Maximum number of vertices per navigation polygon
pub const MAX_VERTS_PER_POLY: usize = 6;
