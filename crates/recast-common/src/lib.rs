//! Common utilities and data structures used by both Recast and Detour

mod math;
mod mesh;

pub use math::*;
pub use mesh::*;

/// Represents a 3D position
pub type Vec3 = glam::Vec3;

/// Error types for the library
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input mesh: {0}")]
    InvalidMesh(String),

    #[error("navigation mesh generation failed: {0}")]
    NavMeshGeneration(String),

    #[error("recast error: {0}")]
    Recast(String),

    #[cfg(feature = "std")]
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("detour error: {0}")]
    Detour(String),

    #[error("tile cache error: {0}")]
    TileCache(String),

    #[error("compression error: {0}")]
    Compression(String),
}

/// Result type for recast and detour operations
pub type Result<T> = std::result::Result<T, Error>;
