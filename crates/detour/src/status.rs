//! Status codes for Detour operations

/// Status enum for Detour operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Operation was successful
    Success,
    /// Operation failed due to an unknown reason
    Failure,
    /// Provided parameter was invalid
    InvalidParam,
    /// Operation ran out of memory
    OutOfMemory,
    /// Pathfinding operation exceeded buffer capacity
    BufferTooSmall,
    /// Value already exists
    AlreadyExists,
    /// Value does not exist or is not found
    NotFound,
    /// Input data is corrupted or invalid
    DataCorrupted,
    /// Tile cache operation failed
    TileCacheError,
    /// File has wrong magic number
    WrongMagic,
    /// File has wrong version
    WrongVersion,
}

impl Status {
    /// Checks if the status is a failure
    pub fn is_failure(&self) -> bool {
        *self != Status::Success
    }

    /// Checks if the status is a success
    pub fn is_success(&self) -> bool {
        *self == Status::Success
    }
}

impl std::error::Error for Status {}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Success => write!(f, "Success"),
            Status::Failure => write!(f, "Failure"),
            Status::InvalidParam => write!(f, "Invalid parameter"),
            Status::OutOfMemory => write!(f, "Out of memory"),
            Status::BufferTooSmall => write!(f, "Buffer too small"),
            Status::AlreadyExists => write!(f, "Value already exists"),
            Status::NotFound => write!(f, "Value not found"),
            Status::DataCorrupted => write!(f, "Data corrupted"),
            Status::TileCacheError => write!(f, "Tile cache error"),
            Status::WrongMagic => write!(f, "Wrong magic number"),
            Status::WrongVersion => write!(f, "Wrong version"),
        }
    }
}

impl From<Status> for recast_common::Error {
    fn from(status: Status) -> Self {
        recast_common::Error::Detour(status.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_flags() {
        assert!(Status::Success.is_success());
        assert!(Status::WrongMagic.is_failure());
    }

    #[test]
    fn test_status_converts_into_error() {
        let err: recast_common::Error = Status::OutOfMemory.into();
        assert_eq!(err.to_string(), "detour error: Out of memory");
    }
}
