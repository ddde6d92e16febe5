//! Shared constants and direction helpers for layer processing

/// Walkable area ID
pub const RC_WALKABLE_AREA: u8 = 63;

/// Null area ID
pub const RC_NULL_AREA: u8 = 0;

/// Height value stored for layer cells that carry no surface
pub const LAYER_EMPTY_HEIGHT: u8 = 0xff;

/// Region id of cells that belong to no region
pub const LAYER_NULL_REGION: u8 = 0xff;

/// Get direction offset X
#[inline]
pub fn get_dir_offset_x(dir: u8) -> i32 {
    const OFFSETS: [i32; 4] = [-1, 0, 1, 0];
    OFFSETS[(dir & 0x03) as usize]
}

/// Get direction offset Y/Z
#[inline]
pub fn get_dir_offset_y(dir: u8) -> i32 {
    const OFFSETS: [i32; 4] = [0, 1, 0, -1];
    OFFSETS[(dir & 0x03) as usize]
}
