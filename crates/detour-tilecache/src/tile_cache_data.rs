//! Tile cache layer data and its wire format
//!
//! A stored tile is a layer header followed by the compressed layer grid
//! (heights, areas and connections, `width * height` bytes each). The
//! header is never compressed so tiles can be indexed without decompressing
//! them.

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::Vec3;
use std::io::{Cursor, Read, Write};

use super::compressor::TileCacheCompressor;
use detour::Status;
use recast::HeightfieldLayer;
use recast_common::{Error, Result};

/// Magic number for tile cache layers ('DTLR')
pub const TILECACHE_MAGIC: u32 = 0x4454_4C52;

/// Version number for tile cache data format
pub const TILECACHE_VERSION: u32 = 1;

/// Packed size of [`TileCacheLayerHeader`]
pub const LAYER_HEADER_SIZE: usize = 54;

/// Size of the header laid out as a C struct,
/// padded to 4 byte alignment
pub const LAYER_HEADER_SIZE_C: usize = 56;

/// Byte order of the layer header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum LayerByteOrder {
    #[default]
    Little,
    Big,
}

/// How layer headers are laid out in tile data. Writer and reader must
/// agree on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct LayerWireFormat {
    pub byte_order: LayerByteOrder,
    /// Pad the header to the C struct size
    pub c_compatibility: bool,
}

impl Default for LayerWireFormat {
    fn default() -> Self {
        Self {
            byte_order: LayerByteOrder::Little,
            c_compatibility: true,
        }
    }
}

impl LayerWireFormat {
    /// Size of the header in bytes
    pub fn header_size(&self) -> usize {
        if self.c_compatibility {
            LAYER_HEADER_SIZE_C
        } else {
            LAYER_HEADER_SIZE
        }
    }
}

/// Tile cache layer header
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TileCacheLayerHeader {
    /// Magic number for validation
    pub magic: u32,
    /// Version of the tile cache format
    pub version: u32,
    /// Tile position X
    pub tx: i32,
    /// Tile position Y
    pub ty: i32,
    /// Tile layer
    pub tlayer: i32,
    /// Bounding box minimum
    pub bmin: [f32; 3],
    /// Bounding box maximum
    pub bmax: [f32; 3],
    /// Lowest surface height (in cells)
    pub hmin: u16,
    /// Highest surface height (in cells)
    pub hmax: u16,
    /// Width of the layer (in cells)
    pub width: u8,
    /// Height of the layer (in cells)
    pub height: u8,
    /// Tight cell extents of the surface cells
    pub minx: u8,
    pub maxx: u8,
    pub miny: u8,
    pub maxy: u8,
}

impl Default for TileCacheLayerHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl TileCacheLayerHeader {
    /// Creates a new tile cache layer header
    pub fn new() -> Self {
        Self {
            magic: TILECACHE_MAGIC,
            version: TILECACHE_VERSION,
            tx: 0,
            ty: 0,
            tlayer: 0,
            bmin: [0.0; 3],
            bmax: [0.0; 3],
            hmin: 0,
            hmax: 0,
            width: 0,
            height: 0,
            minx: 0,
            maxx: 0,
            miny: 0,
            maxy: 0,
        }
    }

    /// Validates the header
    pub fn validate(&self) -> Result<()> {
        if self.magic != TILECACHE_MAGIC {
            return Err(Error::TileCache(Status::WrongMagic.to_string()));
        }
        if self.version != TILECACHE_VERSION {
            return Err(Error::TileCache(Status::WrongVersion.to_string()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(Error::TileCache(format!(
                "{}: empty layer {}x{}",
                Status::DataCorrupted,
                self.width,
                self.height
            )));
        }
        if self.minx > self.maxx
            || self.miny > self.maxy
            || self.maxx >= self.width
            || self.maxy >= self.height
        {
            return Err(Error::TileCache(format!(
                "{}: tight bounds outside the layer",
                Status::DataCorrupted
            )));
        }
        Ok(())
    }

    /// Number of cells in the layer grid
    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Writes the header in the given wire format
    pub fn write_to<W: Write>(&self, writer: &mut W, format: LayerWireFormat) -> Result<()> {
        match format.byte_order {
            LayerByteOrder::Little => self.write_fields::<LittleEndian, W>(writer)?,
            LayerByteOrder::Big => self.write_fields::<BigEndian, W>(writer)?,
        }
        if format.c_compatibility {
            writer.write_all(&[0u8; LAYER_HEADER_SIZE_C - LAYER_HEADER_SIZE])?;
        }
        Ok(())
    }

    /// Reads and validates a header in the given wire format
    pub fn read_from(data: &[u8], format: LayerWireFormat) -> Result<Self> {
        if data.len() < format.header_size() {
            return Err(Error::TileCache(format!(
                "{}: {} bytes is too short for a layer header",
                Status::BufferTooSmall,
                data.len()
            )));
        }
        let mut cursor = Cursor::new(data);
        let header = match format.byte_order {
            LayerByteOrder::Little => Self::read_fields::<LittleEndian, _>(&mut cursor)?,
            LayerByteOrder::Big => Self::read_fields::<BigEndian, _>(&mut cursor)?,
        };
        header.validate()?;
        Ok(header)
    }

    fn write_fields<B: ByteOrder, W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<B>(self.magic)?;
        writer.write_u32::<B>(self.version)?;
        writer.write_i32::<B>(self.tx)?;
        writer.write_i32::<B>(self.ty)?;
        writer.write_i32::<B>(self.tlayer)?;
        for &v in self.bmin.iter().chain(self.bmax.iter()) {
            writer.write_f32::<B>(v)?;
        }
        writer.write_u16::<B>(self.hmin)?;
        writer.write_u16::<B>(self.hmax)?;
        writer.write_all(&[
            self.width,
            self.height,
            self.minx,
            self.maxx,
            self.miny,
            self.maxy,
        ])?;
        Ok(())
    }

    fn read_fields<B: ByteOrder, R: Read>(reader: &mut R) -> Result<Self> {
        let magic = reader.read_u32::<B>()?;
        let version = reader.read_u32::<B>()?;
        let tx = reader.read_i32::<B>()?;
        let ty = reader.read_i32::<B>()?;
        let tlayer = reader.read_i32::<B>()?;
        let mut bmin = [0.0f32; 3];
        for v in &mut bmin {
            *v = reader.read_f32::<B>()?;
        }
        let mut bmax = [0.0f32; 3];
        for v in &mut bmax {
            *v = reader.read_f32::<B>()?;
        }
        let hmin = reader.read_u16::<B>()?;
        let hmax = reader.read_u16::<B>()?;
        let mut dims = [0u8; 6];
        reader.read_exact(&mut dims)?;

        Ok(Self {
            magic,
            version,
            tx,
            ty,
            tlayer,
            bmin,
            bmax,
            hmin,
            hmax,
            width: dims[0],
            height: dims[1],
            minx: dims[2],
            maxx: dims[3],
            miny: dims[4],
            maxy: dims[5],
        })
    }
}

/// Decompressed tile cache layer
#[derive(Debug, Clone, PartialEq)]
pub struct TileCacheLayer {
    /// Header information
    pub header: TileCacheLayerHeader,
    /// Surface height per cell
    pub heights: Vec<u8>,
    /// Area id per cell
    pub areas: Vec<u8>,
    /// Connection and portal bits per cell
    pub cons: Vec<u8>,
}

impl TileCacheLayer {
    /// Captures a built heightfield layer as tile (tx, ty, tlayer).
    ///
    /// Returns `None` when the layer carries no surface.
    pub fn from_heightfield_layer(
        layer: &HeightfieldLayer,
        tx: i32,
        ty: i32,
        tlayer: i32,
    ) -> Option<Self> {
        let (minx, maxx, miny, maxy) = layer.tight_bounds()?;
        let (hmin, hmax) = layer.height_range()?;
        let header = TileCacheLayerHeader {
            tx,
            ty,
            tlayer,
            bmin: layer.bmin.to_array(),
            bmax: layer.bmax.to_array(),
            hmin,
            hmax,
            width: layer.width as u8,
            height: layer.height as u8,
            minx: minx as u8,
            maxx: maxx as u8,
            miny: miny as u8,
            maxy: maxy as u8,
            ..TileCacheLayerHeader::new()
        };
        Some(Self {
            header,
            heights: layer.heights.clone(),
            areas: layer.areas.clone(),
            cons: layer.cons.clone(),
        })
    }

    /// Converts the grids into a heightfield layer for the build steps
    pub fn to_heightfield_layer(&self, cs: f32, ch: f32) -> Result<HeightfieldLayer> {
        HeightfieldLayer::from_grids(
            self.header.width as i32,
            self.header.height as i32,
            Vec3::from_array(self.header.bmin),
            Vec3::from_array(self.header.bmax),
            cs,
            ch,
            self.heights.clone(),
            self.areas.clone(),
            self.cons.clone(),
        )
    }

    /// Encodes the layer as stored tile data: header then compressed grid
    pub fn encode(
        &self,
        format: LayerWireFormat,
        compressor: &dyn TileCacheCompressor,
    ) -> Result<Vec<u8>> {
        self.header.validate()?;
        let cells = self.header.cell_count();
        if self.heights.len() != cells || self.areas.len() != cells || self.cons.len() != cells {
            return Err(Error::TileCache(format!(
                "{}: layer grids do not match {} cells",
                Status::InvalidParam,
                cells
            )));
        }

        let mut grid = Vec::with_capacity(cells * 3);
        grid.extend_from_slice(&self.heights);
        grid.extend_from_slice(&self.areas);
        grid.extend_from_slice(&self.cons);
        let compressed = compressor.compress(&grid)?;

        let mut data = Vec::with_capacity(format.header_size() + compressed.len());
        self.header.write_to(&mut data, format)?;
        data.extend_from_slice(&compressed);
        Ok(data)
    }

    /// Decodes stored tile data
    pub fn decode(
        data: &[u8],
        format: LayerWireFormat,
        compressor: &dyn TileCacheCompressor,
    ) -> Result<Self> {
        let header = TileCacheLayerHeader::read_from(data, format)?;
        let cells = header.cell_count();
        let grid = compressor
            .decompress(&data[format.header_size()..], cells * 3)
            .inspect_err(|e| {
                log::error!(
                    "failed to decompress layer ({}, {}, {}): {}",
                    header.tx,
                    header.ty,
                    header.tlayer,
                    e
                )
            })?;

        Ok(Self {
            heights: grid[..cells].to_vec(),
            areas: grid[cells..cells * 2].to_vec(),
            cons: grid[cells * 2..].to_vec(),
            header,
        })
    }
}
