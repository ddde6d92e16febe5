//! Binary tile format
//!
//! Tiles produced by [`create_nav_mesh_data`](crate::create_nav_mesh_data)
//! are stored as a flat little-endian byte buffer: a fixed header, the world
//! space vertices, the polygons and an optional bounding volume tree.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

use super::Status;
use recast_common::{Error, Result};

/// Magic number for navigation mesh tiles ('DNAV')
pub const DT_NAVMESH_MAGIC: u32 = 0x5641_4E44; // 'DNAV' in little-endian

/// Current navigation mesh tile version
pub const DT_NAVMESH_VERSION: u32 = 7;

/// Null link value
const DT_NULL_LINK: u32 = 0xffffffff;

/// Flag marking a neighbour slot as a tile border edge. The low bits hold
/// the side of the tile the edge lies on.
pub const DT_EXT_LINK: u16 = 0x8000;

/// Size in bytes of the serialized [`MeshHeader`]
pub const MESH_HEADER_SIZE: usize = 4 * 10 + 4 * 3 + 4 * 6 + 4;

/// Tile header
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshHeader {
    pub magic: u32,
    pub version: u32,
    pub x: i32,
    pub y: i32,
    pub layer: i32,
    pub user_id: u32,
    pub poly_count: i32,
    pub vert_count: i32,
    pub max_verts_per_poly: i32,
    pub bv_node_count: i32,
    pub walkable_height: f32,
    pub walkable_radius: f32,
    pub walkable_climb: f32,
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
    /// Scale from world units to bounding volume quantized units
    pub bv_quant_factor: f32,
}

impl MeshHeader {
    fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Self {
            magic: reader.read_u32::<LittleEndian>()?,
            version: reader.read_u32::<LittleEndian>()?,
            x: reader.read_i32::<LittleEndian>()?,
            y: reader.read_i32::<LittleEndian>()?,
            layer: reader.read_i32::<LittleEndian>()?,
            user_id: reader.read_u32::<LittleEndian>()?,
            poly_count: reader.read_i32::<LittleEndian>()?,
            vert_count: reader.read_i32::<LittleEndian>()?,
            max_verts_per_poly: reader.read_i32::<LittleEndian>()?,
            bv_node_count: reader.read_i32::<LittleEndian>()?,
            walkable_height: reader.read_f32::<LittleEndian>()?,
            walkable_radius: reader.read_f32::<LittleEndian>()?,
            walkable_climb: reader.read_f32::<LittleEndian>()?,
            bmin: read_vec3(reader)?,
            bmax: read_vec3(reader)?,
            bv_quant_factor: reader.read_f32::<LittleEndian>()?,
        })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.magic)?;
        writer.write_u32::<LittleEndian>(self.version)?;
        writer.write_i32::<LittleEndian>(self.x)?;
        writer.write_i32::<LittleEndian>(self.y)?;
        writer.write_i32::<LittleEndian>(self.layer)?;
        writer.write_u32::<LittleEndian>(self.user_id)?;
        writer.write_i32::<LittleEndian>(self.poly_count)?;
        writer.write_i32::<LittleEndian>(self.vert_count)?;
        writer.write_i32::<LittleEndian>(self.max_verts_per_poly)?;
        writer.write_i32::<LittleEndian>(self.bv_node_count)?;
        writer.write_f32::<LittleEndian>(self.walkable_height)?;
        writer.write_f32::<LittleEndian>(self.walkable_radius)?;
        writer.write_f32::<LittleEndian>(self.walkable_climb)?;
        write_vec3(writer, &self.bmin)?;
        write_vec3(writer, &self.bmax)?;
        writer.write_f32::<LittleEndian>(self.bv_quant_factor)?;
        Ok(())
    }
}

/// Polygon of a tile
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Poly {
    /// Vertex indices, `vert_count` of them are used
    pub verts: Vec<u16>,
    /// Per edge neighbour: 0 for none, `index + 1` for an internal neighbour
    /// or [`DT_EXT_LINK`] combined with a side for tile border edges
    pub neis: Vec<u16>,
    pub flags: u16,
    pub vert_count: u8,
    pub area: u8,
}

impl Poly {
    fn read_from<R: Read>(reader: &mut R, nvp: usize) -> Result<Self> {
        // Links are resolved at runtime, the stored value is always null.
        let _first_link = reader.read_u32::<LittleEndian>()?;

        let mut verts = vec![0u16; nvp];
        for v in &mut verts {
            *v = reader.read_u16::<LittleEndian>()?;
        }
        let mut neis = vec![0u16; nvp];
        for n in &mut neis {
            *n = reader.read_u16::<LittleEndian>()?;
        }

        let flags = reader.read_u16::<LittleEndian>()?;
        let vert_count = reader.read_u8()?;
        let area_and_type = reader.read_u8()?;

        if vert_count as usize > nvp {
            return Err(Error::Detour(Status::DataCorrupted.to_string()));
        }

        Ok(Self {
            verts,
            neis,
            flags,
            vert_count,
            area: area_and_type & 0x3f,
        })
    }

    fn write_to<W: Write>(&self, writer: &mut W, nvp: usize) -> Result<()> {
        writer.write_u32::<LittleEndian>(DT_NULL_LINK)?;
        for i in 0..nvp {
            writer.write_u16::<LittleEndian>(self.verts.get(i).copied().unwrap_or(0))?;
        }
        for i in 0..nvp {
            writer.write_u16::<LittleEndian>(self.neis.get(i).copied().unwrap_or(0))?;
        }
        writer.write_u16::<LittleEndian>(self.flags)?;
        writer.write_u8(self.vert_count)?;
        writer.write_u8(self.area & 0x3f)?;
        Ok(())
    }

    /// Returns the used vertex indices
    pub fn vertices(&self) -> &[u16] {
        &self.verts[..self.vert_count as usize]
    }
}

/// Bounding volume node, quantized to the tile's bounds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BvNode {
    pub bmin: [u16; 3],
    pub bmax: [u16; 3],
    /// Polygon index for leaf nodes, negative escape offset otherwise
    pub i: i32,
}

impl BvNode {
    fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut node = BvNode::default();
        for v in node.bmin.iter_mut().chain(node.bmax.iter_mut()) {
            *v = reader.read_u16::<LittleEndian>()?;
        }
        node.i = reader.read_i32::<LittleEndian>()?;
        Ok(node)
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        for &v in self.bmin.iter().chain(self.bmax.iter()) {
            writer.write_u16::<LittleEndian>(v)?;
        }
        writer.write_i32::<LittleEndian>(self.i)?;
        Ok(())
    }

    /// Returns true if this node references a polygon
    pub fn is_leaf(&self) -> bool {
        self.i >= 0
    }
}

/// Decoded contents of a tile buffer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileData {
    pub header: MeshHeader,
    pub verts: Vec<[f32; 3]>,
    pub polys: Vec<Poly>,
    pub bv_tree: Vec<BvNode>,
}

impl TileData {
    /// Decodes a tile buffer, validating magic and version
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < MESH_HEADER_SIZE {
            return Err(Error::Detour(Status::BufferTooSmall.to_string()));
        }
        let mut cursor = Cursor::new(data);
        let header = MeshHeader::read_from(&mut cursor)?;

        if header.magic != DT_NAVMESH_MAGIC {
            return Err(Error::Detour(Status::WrongMagic.to_string()));
        }
        if header.version != DT_NAVMESH_VERSION {
            return Err(Error::Detour(Status::WrongVersion.to_string()));
        }
        if header.poly_count < 0
            || header.vert_count < 0
            || header.bv_node_count < 0
            || header.max_verts_per_poly < 3
        {
            return Err(Error::Detour(Status::DataCorrupted.to_string()));
        }

        let nvp = header.max_verts_per_poly as usize;
        let mut verts = Vec::with_capacity(header.vert_count as usize);
        for _ in 0..header.vert_count {
            verts.push(read_vec3(&mut cursor)?);
        }

        let mut polys = Vec::with_capacity(header.poly_count as usize);
        for _ in 0..header.poly_count {
            let poly = Poly::read_from(&mut cursor, nvp)?;
            if poly.vertices().iter().any(|&v| v as usize >= verts.len()) {
                return Err(Error::Detour(Status::DataCorrupted.to_string()));
            }
            polys.push(poly);
        }

        let mut bv_tree = Vec::with_capacity(header.bv_node_count as usize);
        for _ in 0..header.bv_node_count {
            bv_tree.push(BvNode::read_from(&mut cursor)?);
        }

        Ok(Self {
            header,
            verts,
            polys,
            bv_tree,
        })
    }

    /// Encodes the tile, recomputing the counts stored in the header
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let nvp = self.header.max_verts_per_poly.max(3) as usize;
        let mut header = self.header.clone();
        header.poly_count = self.polys.len() as i32;
        header.vert_count = self.verts.len() as i32;
        header.bv_node_count = self.bv_tree.len() as i32;

        let mut buffer = Vec::with_capacity(
            MESH_HEADER_SIZE
                + self.verts.len() * 12
                + self.polys.len() * (8 + nvp * 4)
                + self.bv_tree.len() * 16,
        );
        header.write_to(&mut buffer)?;
        for v in &self.verts {
            write_vec3(&mut buffer, v)?;
        }
        for poly in &self.polys {
            poly.write_to(&mut buffer, nvp)?;
        }
        for node in &self.bv_tree {
            node.write_to(&mut buffer)?;
        }
        Ok(buffer)
    }
}

/// Reads only the header of a tile buffer
pub fn read_tile_header(data: &[u8]) -> Result<MeshHeader> {
    if data.len() < MESH_HEADER_SIZE {
        return Err(Error::Detour(Status::BufferTooSmall.to_string()));
    }
    let header = MeshHeader::read_from(&mut Cursor::new(data))?;
    if header.magic != DT_NAVMESH_MAGIC {
        return Err(Error::Detour(Status::WrongMagic.to_string()));
    }
    Ok(header)
}

fn read_vec3<R: Read>(reader: &mut R) -> Result<[f32; 3]> {
    Ok([
        reader.read_f32::<LittleEndian>()?,
        reader.read_f32::<LittleEndian>()?,
        reader.read_f32::<LittleEndian>()?,
    ])
}

fn write_vec3<W: Write>(writer: &mut W, v: &[f32; 3]) -> Result<()> {
    writer.write_f32::<LittleEndian>(v[0])?;
    writer.write_f32::<LittleEndian>(v[1])?;
    writer.write_f32::<LittleEndian>(v[2])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tile() -> TileData {
        TileData {
            header: MeshHeader {
                magic: DT_NAVMESH_MAGIC,
                version: DT_NAVMESH_VERSION,
                x: 3,
                y: -2,
                layer: 1,
                max_verts_per_poly: 6,
                walkable_height: 2.0,
                walkable_radius: 0.6,
                walkable_climb: 0.9,
                bmin: [0.0, 0.0, 0.0],
                bmax: [4.0, 1.0, 4.0],
                bv_quant_factor: 2.0,
                ..Default::default()
            },
            verts: vec![[0.0, 0.0, 0.0], [0.0, 0.0, 4.0], [4.0, 0.0, 4.0], [4.0, 0.0, 0.0]],
            polys: vec![Poly {
                verts: vec![0, 1, 2, 3, 0, 0],
                neis: vec![0, DT_EXT_LINK | 2, 0, 0, 0, 0],
                flags: 1,
                vert_count: 4,
                area: 63,
            }],
            bv_tree: vec![BvNode {
                bmin: [0, 0, 0],
                bmax: [8, 2, 8],
                i: 0,
            }],
        }
    }

    #[test]
    fn test_header_size_matches_encoding() {
        let mut buffer = Vec::new();
        MeshHeader::default().write_to(&mut buffer).unwrap();
        assert_eq!(buffer.len(), MESH_HEADER_SIZE);
    }

    #[test]
    fn test_tile_bytes_decode_to_same_tile() {
        let tile = sample_tile();
        let bytes = tile.to_bytes().unwrap();
        let decoded = TileData::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.header.poly_count, 1);
        assert_eq!(decoded.header.vert_count, 4);
        assert_eq!(decoded.verts, tile.verts);
        assert_eq!(decoded.polys, tile.polys);
        assert_eq!(decoded.bv_tree, tile.bv_tree);
        assert_eq!(read_tile_header(&bytes).unwrap().x, 3);
    }

    #[test]
    fn test_wrong_magic_is_rejected() {
        let mut bytes = sample_tile().to_bytes().unwrap();
        bytes[0] ^= 0xff;
        assert!(TileData::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_wrong_version_is_rejected() {
        let mut tile = sample_tile();
        tile.header.version = DT_NAVMESH_VERSION + 1;
        let bytes = tile.to_bytes().unwrap();
        assert!(TileData::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_truncated_buffer_is_rejected() {
        let bytes = sample_tile().to_bytes().unwrap();
        assert!(TileData::from_bytes(&bytes[..bytes.len() - 3]).is_err());
        assert!(TileData::from_bytes(&bytes[..10]).is_err());
    }

    #[test]
    fn test_out_of_range_vertex_is_rejected() {
        let mut tile = sample_tile();
        tile.polys[0].verts[2] = 40;
        let bytes = tile.to_bytes().unwrap();
        assert!(TileData::from_bytes(&bytes).is_err());
    }
}
