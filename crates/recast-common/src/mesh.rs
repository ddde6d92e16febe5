//! Triangle mesh input geometry

use crate::{Error, Result};
use glam::Vec3;

#[cfg(feature = "std")]
use std::path::Path;

/// A simple triangle mesh
#[derive(Debug, Clone, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TriMesh {
    /// The vertices of the mesh as a flat array of [x, y, z] coordinates
    pub vertices: Vec<f32>,
    /// The indices of the mesh, 3 per triangle
    pub indices: Vec<i32>,
    /// The number of vertices in the mesh
    pub vert_count: usize,
    /// The number of triangles in the mesh
    pub tri_count: usize,
}

impl TriMesh {
    /// Creates a new empty triangle mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a vertex and returns its index
    pub fn add_vertex(&mut self, v: Vec3) -> i32 {
        self.vertices.extend_from_slice(&[v.x, v.y, v.z]);
        self.vert_count += 1;
        (self.vert_count - 1) as i32
    }

    /// Appends a triangle
    pub fn add_triangle(&mut self, a: i32, b: i32, c: i32) {
        self.indices.extend_from_slice(&[a, b, c]);
        self.tri_count += 1;
    }

    /// Returns vertex `i`
    #[inline]
    pub fn vertex(&self, i: usize) -> Vec3 {
        Vec3::new(
            self.vertices[i * 3],
            self.vertices[i * 3 + 1],
            self.vertices[i * 3 + 2],
        )
    }

    /// Returns the three corners of triangle `i`
    #[inline]
    pub fn triangle(&self, i: usize) -> [Vec3; 3] {
        let t = &self.indices[i * 3..i * 3 + 3];
        [
            self.vertex(t[0] as usize),
            self.vertex(t[1] as usize),
            self.vertex(t[2] as usize),
        ]
    }

    /// Adds an upward facing rectangle on the XZ plane at height `y`,
    /// split into `cells_x * cells_z` quads
    pub fn add_plane(&mut self, min: Vec3, max: Vec3, cells_x: usize, cells_z: usize) {
        let cells_x = cells_x.max(1);
        let cells_z = cells_z.max(1);
        let first = self.vert_count as i32;
        let stride = cells_x as i32 + 1;
        for iz in 0..=cells_z {
            for ix in 0..=cells_x {
                let x = min.x + (max.x - min.x) * ix as f32 / cells_x as f32;
                let z = min.z + (max.z - min.z) * iz as f32 / cells_z as f32;
                self.add_vertex(Vec3::new(x, min.y, z));
            }
        }
        for iz in 0..cells_z as i32 {
            for ix in 0..cells_x as i32 {
                let v00 = first + iz * stride + ix;
                let v10 = v00 + 1;
                let v01 = v00 + stride;
                let v11 = v01 + 1;
                self.add_triangle(v00, v01, v11);
                self.add_triangle(v00, v11, v10);
            }
        }
    }

    /// Adds a closed axis-aligned box
    pub fn add_box(&mut self, min: Vec3, max: Vec3) {
        let corners = [
            Vec3::new(min.x, min.y, min.z),
            Vec3::new(max.x, min.y, min.z),
            Vec3::new(max.x, min.y, max.z),
            Vec3::new(min.x, min.y, max.z),
            Vec3::new(min.x, max.y, min.z),
            Vec3::new(max.x, max.y, min.z),
            Vec3::new(max.x, max.y, max.z),
            Vec3::new(min.x, max.y, max.z),
        ];
        let first = self.vert_count as i32;
        for c in corners {
            self.add_vertex(c);
        }
        const FACES: [[i32; 4]; 6] = [
            [4, 7, 6, 5], // top
            [0, 1, 2, 3], // bottom
            [0, 4, 5, 1],
            [1, 5, 6, 2],
            [2, 6, 7, 3],
            [3, 7, 4, 0],
        ];
        for f in FACES {
            self.add_triangle(first + f[0], first + f[1], first + f[2]);
            self.add_triangle(first + f[0], first + f[2], first + f[3]);
        }
    }

    /// Checks that every index refers to an existing vertex
    pub fn validate(&self) -> Result<()> {
        if self.vertices.len() != self.vert_count * 3 || self.indices.len() != self.tri_count * 3 {
            return Err(Error::InvalidMesh(
                "vertex or index count does not match buffer sizes".to_string(),
            ));
        }
        if let Some(bad) = self
            .indices
            .iter()
            .find(|&&i| i < 0 || i as usize >= self.vert_count)
        {
            return Err(Error::InvalidMesh(format!("index {} out of range", bad)));
        }
        Ok(())
    }

    /// Loads a mesh from an OBJ file
    ///
    /// This method is only available when the `std` feature is enabled.
    #[cfg(feature = "std")]
    pub fn from_obj<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_obj_str(&content)
    }

    /// Parses OBJ content from a string
    ///
    /// Only `v` and `f` records are read; faces with more than three
    /// vertices are fan triangulated.
    ///
    /// ```
    /// use recast_common::TriMesh;
    ///
    /// let mesh = TriMesh::from_obj_str("v 0 0 0\nv 1 0 0\nv 0 0 1\nf 1 3 2\n").unwrap();
    /// assert_eq!(mesh.tri_count, 1);
    /// ```
    pub fn from_obj_str(content: &str) -> Result<Self> {
        let mut mesh = Self::new();
        for (line_no, line) in content.lines().enumerate() {
            let mut tokens = line.split_whitespace();
            match tokens.next() {
                Some("v") => {
                    let mut coord = [0.0f32; 3];
                    for c in &mut coord {
                        *c = tokens
                            .next()
                            .and_then(|t| t.parse().ok())
                            .ok_or_else(|| {
                                Error::InvalidMesh(format!("line {}: bad vertex", line_no + 1))
                            })?;
                    }
                    mesh.add_vertex(Vec3::from_array(coord));
                }
                Some("f") => {
                    let face = tokens
                        .map(|t| {
                            t.split('/')
                                .next()
                                .and_then(|i| i.parse::<i32>().ok())
                                .map(|i| i - 1)
                        })
                        .collect::<Option<Vec<i32>>>()
                        .ok_or_else(|| {
                            Error::InvalidMesh(format!("line {}: bad face index", line_no + 1))
                        })?;
                    if face.len() < 3 {
                        return Err(Error::InvalidMesh(format!(
                            "line {}: face has less than 3 vertices",
                            line_no + 1
                        )));
                    }
                    for i in 1..face.len() - 1 {
                        mesh.add_triangle(face[0], face[i], face[i + 1]);
                    }
                }
                _ => {}
            }
        }
        mesh.validate()?;
        Ok(mesh)
    }

    /// Calculates the axis-aligned bounding box of the mesh
    pub fn calculate_bounds(&self) -> (Vec3, Vec3) {
        if self.vert_count == 0 {
            return (Vec3::ZERO, Vec3::ZERO);
        }
        (0..self.vert_count).fold(
            (Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)),
            |(bmin, bmax), i| {
                let v = self.vertex(i);
                (bmin.min(v), bmax.max(v))
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triangle_normal;

    #[test]
    fn test_plane_faces_up() {
        let mut mesh = TriMesh::new();
        mesh.add_plane(Vec3::ZERO, Vec3::new(4.0, 0.0, 2.0), 2, 1);
        assert_eq!(mesh.vert_count, 6);
        assert_eq!(mesh.tri_count, 4);
        for i in 0..mesh.tri_count {
            let [a, b, c] = mesh.triangle(i);
            assert!(triangle_normal(a, b, c).y > 0.99);
        }
    }

    #[test]
    fn test_box_top_faces_up() {
        let mut mesh = TriMesh::new();
        mesh.add_box(Vec3::ZERO, Vec3::ONE);
        assert_eq!(mesh.tri_count, 12);
        let [a, b, c] = mesh.triangle(0);
        assert!(triangle_normal(a, b, c).y > 0.99);
        let (bmin, bmax) = mesh.calculate_bounds();
        assert_eq!(bmin, Vec3::ZERO);
        assert_eq!(bmax, Vec3::ONE);
    }

    #[test]
    fn test_from_obj_str_quad_triangulation() {
        let obj = "v 0 0 0\nv 1 0 0\nv 1 0 1\nv 0 0 1\n# comment\nf 1/1 2/2 3/3 4/4\n";
        let mesh = TriMesh::from_obj_str(obj).unwrap();
        assert_eq!(mesh.vert_count, 4);
        assert_eq!(mesh.tri_count, 2);
    }

    #[test]
    fn test_from_obj_str_rejects_out_of_range_face() {
        assert!(TriMesh::from_obj_str("v 0 0 0\nv 1 0 0\nf 1 2 3\n").is_err());
        assert!(TriMesh::from_obj_str("v 0.0 0.0\n").is_err());
    }
}
