//! Salted references for tiles and obstacles
//!
//! A reference packs a slot index and the slot's salt at the time the
//! reference was issued. Freeing a slot bumps its salt, so references to a
//! previous occupant stop resolving.

use detour::Status;
use recast_common::{ilog2, next_pow2, Error, Result};

/// Number of bits used for the obstacle slot index
const OBSTACLE_INDEX_BITS: u32 = 16;

/// Minimum number of salt bits a tile reference must keep
const MIN_SALT_BITS: u32 = 10;

/// Reference to a compressed tile in a [`TileCache`](crate::TileCache)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct CompressedTileRef(u64);

impl CompressedTileRef {
    /// The null reference
    pub const NULL: CompressedTileRef = CompressedTileRef(0);

    /// Creates a reference from a raw value
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value
    pub fn id(&self) -> u64 {
        self.0
    }

    /// Returns true for the null reference
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for CompressedTileRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CompressedTileRef({:#x})", self.0)
    }
}

/// Reference to an obstacle in a [`TileCache`](crate::TileCache)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct ObstacleRef(u32);

impl ObstacleRef {
    /// The null reference
    pub const NULL: ObstacleRef = ObstacleRef(0);

    /// Creates a reference from a raw value
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw value
    pub fn id(&self) -> u32 {
        self.0
    }

    /// Returns true for the null reference
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Encodes a salt and slot index
    pub fn encode(salt: u16, idx: usize) -> Self {
        Self(((salt as u32) << OBSTACLE_INDEX_BITS) | (idx as u32 & 0xffff))
    }

    /// Salt stored in the reference
    pub fn salt(&self) -> u16 {
        (self.0 >> OBSTACLE_INDEX_BITS) as u16
    }

    /// Slot index stored in the reference
    pub fn index(&self) -> usize {
        (self.0 & 0xffff) as usize
    }
}

impl std::fmt::Display for ObstacleRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObstacleRef({:#x})", self.0)
    }
}

/// Bit layout of tile references for a given tile capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRefCodec {
    tile_bits: u32,
    salt_bits: u32,
}

impl TileRefCodec {
    /// Derives the bit layout for `max_tiles` slots.
    ///
    /// Fails when fewer than ten bits would remain for the salt.
    pub fn new(max_tiles: usize) -> Result<Self> {
        if max_tiles == 0 || max_tiles > u32::MAX as usize {
            return Err(Error::TileCache(format!(
                "{}: max tiles {} out of range",
                Status::InvalidParam,
                max_tiles
            )));
        }
        let tile_bits = ilog2(next_pow2(max_tiles as u32));
        let salt_bits = 31u32.min(32u32.saturating_sub(tile_bits));
        if salt_bits < MIN_SALT_BITS {
            return Err(Error::TileCache(format!(
                "{}: only {} salt bits left for {} tiles",
                Status::InvalidParam,
                salt_bits,
                max_tiles
            )));
        }
        Ok(Self {
            tile_bits,
            salt_bits,
        })
    }

    pub fn tile_bits(&self) -> u32 {
        self.tile_bits
    }

    pub fn salt_bits(&self) -> u32 {
        self.salt_bits
    }

    /// Mask applied to salts, never zero
    pub fn salt_mask(&self) -> u32 {
        ((1u64 << self.salt_bits) - 1) as u32
    }

    pub fn encode(&self, salt: u32, idx: usize) -> CompressedTileRef {
        CompressedTileRef(((salt as u64) << self.tile_bits) | idx as u64)
    }

    pub fn decode_salt(&self, tile_ref: CompressedTileRef) -> u32 {
        ((tile_ref.0 >> self.tile_bits) & self.salt_mask() as u64) as u32
    }

    pub fn decode_index(&self, tile_ref: CompressedTileRef) -> usize {
        (tile_ref.0 & ((1u64 << self.tile_bits) - 1)) as usize
    }

    /// Next salt after a slot is freed, skipping zero
    pub fn next_salt(&self, salt: u32) -> u32 {
        match (salt.wrapping_add(1)) & self.salt_mask() {
            0 => 1,
            s => s,
        }
    }
}

/// Next obstacle salt after a slot is freed, skipping zero
pub(crate) fn next_obstacle_salt(salt: u16) -> u16 {
    match salt.wrapping_add(1) {
        0 => 1,
        s => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_ref_layout() {
        let codec = TileRefCodec::new(16).unwrap();
        assert_eq!(codec.tile_bits(), 4);
        assert_eq!(codec.salt_bits(), 28);

        let r = codec.encode(5, 9);
        assert_eq!(r.id(), (5 << 4) | 9);
        assert_eq!(codec.decode_salt(r), 5);
        assert_eq!(codec.decode_index(r), 9);
    }

    #[test]
    fn test_small_capacity_keeps_31_salt_bits() {
        let codec = TileRefCodec::new(1).unwrap();
        assert_eq!(codec.tile_bits(), 0);
        assert_eq!(codec.salt_bits(), 31);
        let r = codec.encode(3, 0);
        assert_eq!(codec.decode_salt(r), 3);
        assert_eq!(codec.decode_index(r), 0);
    }

    #[test]
    fn test_non_power_of_two_capacity_rounds_up() {
        let codec = TileRefCodec::new(100).unwrap();
        assert_eq!(codec.tile_bits(), 7);
    }

    #[test]
    fn test_too_many_tiles_for_salt() {
        assert!(TileRefCodec::new(1 << 22).is_ok());
        assert!(TileRefCodec::new((1 << 22) + 1).is_err());
        assert!(TileRefCodec::new(0).is_err());
    }

    #[test]
    fn test_salt_wraps_without_zero() {
        let codec = TileRefCodec::new(1 << 22).unwrap();
        assert_eq!(codec.salt_mask(), 0x3ff);
        assert_eq!(codec.next_salt(1), 2);
        assert_eq!(codec.next_salt(0x3ff), 1);
        assert_eq!(next_obstacle_salt(u16::MAX), 1);
        assert_eq!(next_obstacle_salt(7), 8);
    }

    #[test]
    fn test_obstacle_ref_layout() {
        let r = ObstacleRef::encode(3, 42);
        assert_eq!(r.id(), (3 << 16) | 42);
        assert_eq!(r.salt(), 3);
        assert_eq!(r.index(), 42);
        assert!(!r.is_null());
        assert!(ObstacleRef::NULL.is_null());
    }
}
