//! Polygon mesh generation for layer contours
//!
//! Contours are ear-clipped into triangles, triangles of a region are merged
//! greedily into convex polygons of at most `nvp` vertices, and finally edge
//! adjacency is computed. Unconnected edges on the tile border are tagged as
//! portals (`0x8000 | dir`).

use recast_common::{Error, Result};

use crate::contour::{ContourVertex, LayerContourSet};

/// Vertex bucket count for spatial hashing
const VERTEX_BUCKET_COUNT: usize = 1 << 12;

/// Null index for polygon vertices
pub const MESH_NULL_IDX: u16 = 0xffff;

/// Set on a neighbour entry when the edge leads to another tile
pub const MESH_PORTAL_FLAG: u16 = 0x8000;

/// Polygon mesh built from one layer, in layer cell coordinates
#[derive(Debug, Clone, Default)]
pub struct LayerPolyMesh {
    /// Mesh vertices `[x, y, z]`
    pub verts: Vec<[u16; 3]>,
    /// `2 * nvp` entries per polygon: vertex indices then neighbour entries
    pub polys: Vec<u16>,
    /// Area id per polygon
    pub areas: Vec<u8>,
    /// User flags per polygon, zero after building
    pub flags: Vec<u16>,
    /// Max vertices per polygon
    pub nvp: usize,
}

impl LayerPolyMesh {
    /// Number of polygons
    #[inline]
    pub fn poly_count(&self) -> usize {
        self.areas.len()
    }

    /// Vertex and neighbour entries of polygon `i`
    #[inline]
    pub fn poly(&self, i: usize) -> &[u16] {
        &self.polys[i * self.nvp * 2..(i + 1) * self.nvp * 2]
    }

    /// Number of used vertex slots of polygon `i`
    pub fn poly_vert_count(&self, i: usize) -> usize {
        count_poly_verts(&self.poly(i)[..self.nvp])
    }
}

#[inline]
fn prev(i: usize, n: usize) -> usize {
    if i >= 1 {
        i - 1
    } else {
        n - 1
    }
}

#[inline]
fn next(i: usize, n: usize) -> usize {
    if i + 1 < n {
        i + 1
    } else {
        0
    }
}

#[inline]
fn area2(a: &ContourVertex, b: &ContourVertex, c: &ContourVertex) -> i32 {
    (b.x as i32 - a.x as i32) * (c.z as i32 - a.z as i32)
        - (c.x as i32 - a.x as i32) * (b.z as i32 - a.z as i32)
}

#[inline]
fn left(a: &ContourVertex, b: &ContourVertex, c: &ContourVertex) -> bool {
    area2(a, b, c) < 0
}

#[inline]
fn left_on(a: &ContourVertex, b: &ContourVertex, c: &ContourVertex) -> bool {
    area2(a, b, c) <= 0
}

#[inline]
fn collinear(a: &ContourVertex, b: &ContourVertex, c: &ContourVertex) -> bool {
    area2(a, b, c) == 0
}

#[inline]
fn vequal(a: &ContourVertex, b: &ContourVertex) -> bool {
    a.x == b.x && a.z == b.z
}

fn intersect_prop(a: &ContourVertex, b: &ContourVertex, c: &ContourVertex, d: &ContourVertex) -> bool {
    if collinear(a, b, c) || collinear(a, b, d) || collinear(c, d, a) || collinear(c, d, b) {
        return false;
    }
    (left(a, b, c) ^ left(a, b, d)) && (left(c, d, a) ^ left(c, d, b))
}

fn between(a: &ContourVertex, b: &ContourVertex, c: &ContourVertex) -> bool {
    if !collinear(a, b, c) {
        return false;
    }
    if a.x != b.x {
        (a.x <= c.x && c.x <= b.x) || (a.x >= c.x && c.x >= b.x)
    } else {
        (a.z <= c.z && c.z <= b.z) || (a.z >= c.z && c.z >= b.z)
    }
}

fn intersect(a: &ContourVertex, b: &ContourVertex, c: &ContourVertex, d: &ContourVertex) -> bool {
    intersect_prop(a, b, c, d)
        || between(a, b, c)
        || between(a, b, d)
        || between(c, d, a)
        || between(c, d, b)
}

/// Ear clipping state over one contour
struct Triangulator<'a> {
    verts: &'a [ContourVertex],
    indices: Vec<usize>,
    ears: Vec<bool>,
}

impl<'a> Triangulator<'a> {
    fn vert(&self, i: usize) -> &ContourVertex {
        &self.verts[self.indices[i]]
    }

    fn diagonalie(&self, i: usize, j: usize) -> bool {
        let n = self.indices.len();
        let d0 = self.vert(i);
        let d1 = self.vert(j);
        for k in 0..n {
            let k1 = next(k, n);
            if k == i || k1 == i || k == j || k1 == j {
                continue;
            }
            let p0 = self.vert(k);
            let p1 = self.vert(k1);
            if vequal(d0, p0) || vequal(d1, p0) || vequal(d0, p1) || vequal(d1, p1) {
                continue;
            }
            if intersect(d0, d1, p0, p1) {
                return false;
            }
        }
        true
    }

    fn in_cone(&self, i: usize, j: usize) -> bool {
        let n = self.indices.len();
        let pi = self.vert(i);
        let pj = self.vert(j);
        let pi1 = self.vert(next(i, n));
        let pin1 = self.vert(prev(i, n));
        if left_on(pin1, pi, pi1) {
            return left(pi, pj, pin1) && left(pj, pi, pi1);
        }
        !(left_on(pi, pj, pi1) && left_on(pj, pi, pin1))
    }

    fn diagonal(&self, i: usize, j: usize) -> bool {
        self.in_cone(i, j) && self.diagonalie(i, j)
    }

    /// Returns the triangles and whether the contour was fully triangulated
    fn run(mut self) -> (Vec<[usize; 3]>, bool) {
        let mut tris = Vec::new();
        let n = self.indices.len();
        for i in 0..n {
            let i1 = next(i, n);
            let i2 = next(i1, n);
            self.ears[i1] = self.diagonal(i, i2);
        }

        while self.indices.len() > 3 {
            let n = self.indices.len();
            let mut best: Option<(usize, i32)> = None;
            for i in 0..n {
                let i1 = next(i, n);
                if !self.ears[i1] {
                    continue;
                }
                let p0 = self.vert(i);
                let p2 = self.vert(next(i1, n));
                let dx = p2.x as i32 - p0.x as i32;
                let dz = p2.z as i32 - p0.z as i32;
                let len = dx * dx + dz * dz;
                if best.map_or(true, |(_, l)| len < l) {
                    best = Some((i, len));
                }
            }
            let Some((i, _)) = best else {
                return (tris, false);
            };

            let i1 = next(i, n);
            let i2 = next(i1, n);
            tris.push([self.indices[i], self.indices[i1], self.indices[i2]]);

            self.indices.remove(i1);
            self.ears.remove(i1);
            let n = self.indices.len();
            let i1 = if i1 >= n { 0 } else { i1 };
            let i = prev(i1, n);
            self.ears[i] = self.diagonal(prev(i, n), i1);
            self.ears[i1] = self.diagonal(i, next(i1, n));
        }

        tris.push([self.indices[0], self.indices[1], self.indices[2]]);
        (tris, true)
    }
}

fn triangulate(verts: &[ContourVertex]) -> (Vec<[usize; 3]>, bool) {
    Triangulator {
        verts,
        indices: (0..verts.len()).collect(),
        ears: vec![false; verts.len()],
    }
    .run()
}

fn compute_vertex_hash(x: u16, z: u16) -> usize {
    const H1: u32 = 0x8da6b343;
    const H3: u32 = 0xcb1ab31f;
    let n = H1
        .wrapping_mul(x as u32)
        .wrapping_add(H3.wrapping_mul(z as u32));
    (n & (VERTEX_BUCKET_COUNT as u32 - 1)) as usize
}

/// Spatially hashed vertex welding
struct VertexWelder {
    first: Vec<Option<usize>>,
    next: Vec<Option<usize>>,
}

impl VertexWelder {
    fn new() -> Self {
        Self {
            first: vec![None; VERTEX_BUCKET_COUNT],
            next: Vec::new(),
        }
    }

    fn add(&mut self, verts: &mut Vec<[u16; 3]>, x: u16, y: u16, z: u16) -> Result<u16> {
        let bucket = compute_vertex_hash(x, z);
        let mut i = self.first[bucket];
        while let Some(vi) = i {
            let v = verts[vi];
            if v[0] == x && (v[1] as i32 - y as i32).abs() <= 2 && v[2] == z {
                return Ok(vi as u16);
            }
            i = self.next[vi];
        }
        let vi = verts.len();
        if vi >= MESH_NULL_IDX as usize {
            return Err(Error::Recast("too many poly mesh vertices".to_string()));
        }
        verts.push([x, y, z]);
        self.next.push(self.first[bucket]);
        self.first[bucket] = Some(vi);
        Ok(vi as u16)
    }
}

fn count_poly_verts(p: &[u16]) -> usize {
    p.iter().position(|&v| v == MESH_NULL_IDX).unwrap_or(p.len())
}

#[inline]
fn uleft(a: &[u16; 3], b: &[u16; 3], c: &[u16; 3]) -> bool {
    (b[0] as i32 - a[0] as i32) * (c[2] as i32 - a[2] as i32)
        - (c[0] as i32 - a[0] as i32) * (b[2] as i32 - a[2] as i32)
        < 0
}

/// Value of merging `pa` and `pb`: the squared length of the shared edge,
/// or `None` when they share no edge or the result would be too large or concave.
fn get_poly_merge_value(
    pa: &[u16],
    pb: &[u16],
    verts: &[[u16; 3]],
    nvp: usize,
) -> Option<(i32, usize, usize)> {
    let na = count_poly_verts(pa);
    let nb = count_poly_verts(pb);
    if na + nb - 2 > nvp {
        return None;
    }

    let mut shared = None;
    'outer: for i in 0..na {
        let (mut va0, mut va1) = (pa[i], pa[(i + 1) % na]);
        if va0 > va1 {
            std::mem::swap(&mut va0, &mut va1);
        }
        for j in 0..nb {
            let (mut vb0, mut vb1) = (pb[j], pb[(j + 1) % nb]);
            if vb0 > vb1 {
                std::mem::swap(&mut vb0, &mut vb1);
            }
            if va0 == vb0 && va1 == vb1 {
                shared = Some((i, j));
                break 'outer;
            }
        }
    }
    let (ea, eb) = shared?;

    let v = |i: u16| &verts[i as usize];
    if !uleft(v(pa[(ea + na - 1) % na]), v(pa[ea]), v(pb[(eb + 2) % nb])) {
        return None;
    }
    if !uleft(v(pb[(eb + nb - 1) % nb]), v(pb[eb]), v(pa[(ea + 2) % na])) {
        return None;
    }

    let a = v(pa[ea]);
    let b = v(pa[(ea + 1) % na]);
    let dx = a[0] as i32 - b[0] as i32;
    let dz = a[2] as i32 - b[2] as i32;
    Some((dx * dx + dz * dz, ea, eb))
}

fn merge_poly_verts(pa: &[u16], pb: &[u16], ea: usize, eb: usize, nvp: usize) -> Vec<u16> {
    let na = count_poly_verts(pa);
    let nb = count_poly_verts(pb);
    let mut merged = Vec::with_capacity(nvp);
    merged.extend((0..na - 1).map(|i| pa[(ea + 1 + i) % na]));
    merged.extend((0..nb - 1).map(|i| pb[(eb + 1 + i) % nb]));
    merged.resize(nvp, MESH_NULL_IDX);
    merged
}

fn build_mesh_adjacency(mesh: &mut LayerPolyMesh) {
    #[derive(Clone, Copy)]
    struct Edge {
        vert: [u16; 2],
        poly: [usize; 2],
        poly_edge: [usize; 2],
    }

    let nvp = mesh.nvp;
    let npolys = mesh.poly_count();
    let mut first_edge: Vec<Option<usize>> = vec![None; mesh.verts.len()];
    let mut next_edge: Vec<Option<usize>> = Vec::new();
    let mut edges: Vec<Edge> = Vec::new();

    let edge_of = |p: &[u16], j: usize| -> Option<(u16, u16)> {
        if p[j] == MESH_NULL_IDX {
            return None;
        }
        let v1 = if j + 1 >= nvp || p[j + 1] == MESH_NULL_IDX {
            p[0]
        } else {
            p[j + 1]
        };
        Some((p[j], v1))
    };

    for i in 0..npolys {
        let p = &mesh.polys[i * nvp * 2..i * nvp * 2 + nvp];
        for j in 0..nvp {
            let Some((v0, v1)) = edge_of(p, j) else { break };
            if v0 < v1 {
                edges.push(Edge {
                    vert: [v0, v1],
                    poly: [i, i],
                    poly_edge: [j, usize::MAX],
                });
                next_edge.push(first_edge[v0 as usize]);
                first_edge[v0 as usize] = Some(edges.len() - 1);
            }
        }
    }

    for i in 0..npolys {
        let p = &mesh.polys[i * nvp * 2..i * nvp * 2 + nvp];
        for j in 0..nvp {
            let Some((v0, v1)) = edge_of(p, j) else { break };
            if v0 > v1 {
                let mut e = first_edge[v1 as usize];
                while let Some(ei) = e {
                    let edge = &mut edges[ei];
                    if edge.vert[1] == v0 && edge.poly[0] == edge.poly[1] {
                        edge.poly[1] = i;
                        edge.poly_edge[1] = j;
                        break;
                    }
                    e = next_edge[ei];
                }
            }
        }
    }

    for e in &edges {
        if e.poly[0] != e.poly[1] {
            mesh.polys[e.poly[0] * nvp * 2 + nvp + e.poly_edge[0]] = e.poly[1] as u16;
            mesh.polys[e.poly[1] * nvp * 2 + nvp + e.poly_edge[1]] = e.poly[0] as u16;
        }
    }
}

fn mark_portal_edges(mesh: &mut LayerPolyMesh, w: u16, h: u16) {
    let nvp = mesh.nvp;
    for i in 0..mesh.poly_count() {
        let base = i * nvp * 2;
        for j in 0..nvp {
            let vj = mesh.polys[base + j];
            if vj == MESH_NULL_IDX {
                break;
            }
            if mesh.polys[base + nvp + j] != MESH_NULL_IDX {
                continue;
            }
            let nj = if j + 1 >= nvp || mesh.polys[base + j + 1] == MESH_NULL_IDX {
                0
            } else {
                j + 1
            };
            let va = mesh.verts[vj as usize];
            let vb = mesh.verts[mesh.polys[base + nj] as usize];
            let portal = if va[0] == 0 && vb[0] == 0 {
                Some(0)
            } else if va[2] == h && vb[2] == h {
                Some(1)
            } else if va[0] == w && vb[0] == w {
                Some(2)
            } else if va[2] == 0 && vb[2] == 0 {
                Some(3)
            } else {
                None
            };
            if let Some(dir) = portal {
                mesh.polys[base + nvp + j] = MESH_PORTAL_FLAG | dir;
            }
        }
    }
}

/// Builds a polygon mesh from the contours of a `width` x `height` layer.
pub fn build_layer_poly_mesh(
    lcset: &LayerContourSet,
    width: i32,
    height: i32,
    nvp: usize,
) -> Result<LayerPolyMesh> {
    if !(3..=12).contains(&nvp) {
        return Err(Error::Recast(format!(
            "max verts per poly {} must be within 3..=12",
            nvp
        )));
    }

    let mut mesh = LayerPolyMesh {
        nvp,
        ..Default::default()
    };
    let mut welder = VertexWelder::new();

    for cont in &lcset.conts {
        if cont.verts.len() < 3 {
            continue;
        }

        let (tris, complete) = triangulate(&cont.verts);
        if !complete {
            log::warn!(
                "contour of region {} could not be fully triangulated ({} verts)",
                cont.reg,
                cont.verts.len()
            );
        }

        let mut indices = Vec::with_capacity(cont.verts.len());
        for v in &cont.verts {
            indices.push(welder.add(&mut mesh.verts, v.x as u16, v.y as u16, v.z as u16)?);
        }

        let mut polys: Vec<Vec<u16>> = tris
            .iter()
            .filter(|t| t[0] != t[1] && t[0] != t[2] && t[1] != t[2])
            .map(|t| {
                let mut p = vec![indices[t[0]], indices[t[1]], indices[t[2]]];
                p.resize(nvp, MESH_NULL_IDX);
                p
            })
            .collect();
        if polys.is_empty() {
            continue;
        }

        if nvp > 3 {
            loop {
                let mut best: Option<(i32, usize, usize, usize, usize)> = None;
                for j in 0..polys.len() - 1 {
                    for k in j + 1..polys.len() {
                        if let Some((v, ea, eb)) =
                            get_poly_merge_value(&polys[j], &polys[k], &mesh.verts, nvp)
                        {
                            if best.map_or(true, |b| v > b.0) {
                                best = Some((v, j, k, ea, eb));
                            }
                        }
                    }
                }
                let Some((_, pa, pb, ea, eb)) = best else { break };
                polys[pa] = merge_poly_verts(&polys[pa], &polys[pb], ea, eb, nvp);
                polys.swap_remove(pb);
            }
        }

        for p in polys {
            mesh.polys.extend_from_slice(&p);
            mesh.polys.extend(std::iter::repeat(MESH_NULL_IDX).take(nvp));
            mesh.areas.push(cont.area);
            mesh.flags.push(0);
        }
    }

    build_mesh_adjacency(&mut mesh);
    mark_portal_edges(&mut mesh, width as u16, height as u16);

    log::trace!(
        "layer poly mesh: {} verts, {} polys",
        mesh.verts.len(),
        mesh.poly_count()
    );
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contour::{LayerContour, CONTOUR_NO_PORTAL};

    fn cv(x: u8, z: u8) -> ContourVertex {
        ContourVertex {
            x,
            y: 0,
            z,
            portal: CONTOUR_NO_PORTAL,
        }
    }

    fn contour_set(outlines: Vec<Vec<ContourVertex>>) -> LayerContourSet {
        LayerContourSet {
            conts: outlines
                .into_iter()
                .enumerate()
                .map(|(i, verts)| LayerContour {
                    verts,
                    reg: i as u8,
                    area: 63,
                })
                .collect(),
        }
    }

    #[test]
    fn test_square_merges_into_one_quad() {
        let cset = contour_set(vec![vec![cv(0, 0), cv(0, 4), cv(4, 4), cv(4, 0)]]);
        let mesh = build_layer_poly_mesh(&cset, 4, 4, 6).unwrap();
        assert_eq!(mesh.poly_count(), 1);
        assert_eq!(mesh.poly_vert_count(0), 4);
        assert_eq!(mesh.verts.len(), 4);
        // All four edges lie on the tile border.
        let neis = &mesh.poly(0)[6..10];
        assert!(neis.iter().all(|&n| n & MESH_PORTAL_FLAG != 0));
    }

    #[test]
    fn test_triangles_only_when_nvp_is_three() {
        let cset = contour_set(vec![vec![cv(0, 0), cv(0, 4), cv(4, 4), cv(4, 0)]]);
        let mesh = build_layer_poly_mesh(&cset, 8, 8, 3).unwrap();
        assert_eq!(mesh.poly_count(), 2);
        // The two triangles share the diagonal.
        let n0 = &mesh.poly(0)[3..6];
        assert!(n0.contains(&1));
    }

    #[test]
    fn test_concave_outline_stays_convex() {
        // L shape
        let cset = contour_set(vec![vec![
            cv(0, 0),
            cv(0, 4),
            cv(2, 4),
            cv(2, 2),
            cv(4, 2),
            cv(4, 0),
        ]]);
        let mesh = build_layer_poly_mesh(&cset, 8, 8, 6).unwrap();
        assert!(mesh.poly_count() >= 2);
        for i in 0..mesh.poly_count() {
            let p = mesh.poly(i);
            let n = mesh.poly_vert_count(i);
            for j in 0..n {
                let a = &mesh.verts[p[j] as usize];
                let b = &mesh.verts[p[(j + 1) % n] as usize];
                let c = &mesh.verts[p[(j + 2) % n] as usize];
                assert!(!uleft(b, a, c));
            }
        }
    }

    #[test]
    fn test_shared_vertices_are_welded() {
        let cset = contour_set(vec![
            vec![cv(0, 0), cv(0, 4), cv(2, 4), cv(2, 0)],
            vec![cv(2, 0), cv(2, 4), cv(4, 4), cv(4, 0)],
        ]);
        let mesh = build_layer_poly_mesh(&cset, 8, 8, 6).unwrap();
        assert_eq!(mesh.verts.len(), 6);
        assert_eq!(mesh.poly_count(), 2);
        let neis = &mesh.poly(0)[6..];
        assert!(neis.contains(&1));
    }

    #[test]
    fn test_invalid_nvp() {
        let cset = LayerContourSet::default();
        assert!(build_layer_poly_mesh(&cset, 4, 4, 2).is_err());
    }
}
