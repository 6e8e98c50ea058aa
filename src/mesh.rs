use crate::{
    error::{Result, SurfaceError},
    types::{Point, Transform, Vector},
};

/// Indexed triangle mesh produced by a surface build.
///
/// Vertices are shared between triangles, so normals can be smoothed across faces.
/// Build it with [`push_vertex`](SurfaceMesh::push_vertex) and
/// [`triangle_from_verts`](SurfaceMesh::triangle_from_verts), then call
/// [`compute_normals`](SurfaceMesh::compute_normals) once positions are final.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SurfaceMesh {
    /// Vertex positions.
    pub vertices: Vec<Point>,

    /// Per-vertex normals, parallel to `vertices` after
    /// [`compute_normals`](SurfaceMesh::compute_normals).
    pub normals: Vec<Vector>,

    /// Triangle index triples into `vertices`: `[[v0, v1, v2], ...]`
    pub tris: Vec<[u32; 3]>,

    /// Per-vertex group tag (index of the dominant atom) used for picking.
    pub groups: Vec<u32>,
}

impl SurfaceMesh {
    /// Creates an empty mesh with no vertices, triangles, or normals.
    pub fn new_empty() -> Self {
        Self::default()
    }

    /// Empties the mesh but keeps its allocations for reuse.
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.normals.clear();
        self.tris.clear();
        self.groups.clear();
    }

    /// Appends a vertex and returns its index.
    pub fn push_vertex(&mut self, position: Point, group: u32) -> u32 {
        let index = self.vertices.len() as u32;
        self.vertices.push(position);
        self.groups.push(group);
        index
    }

    /// Adds a triangle defined by three vertex indices.
    ///
    /// Returns [`SurfaceError::InvalidIndex`] if any index is out of bounds.
    pub fn triangle_from_verts(&mut self, a: u32, b: u32, c: u32) -> Result<()> {
        if self.vertices.len() <= a.max(b.max(c)) as usize {
            return Err(SurfaceError::InvalidIndex);
        }
        self.tris.push([a, b, c]);
        Ok(())
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.tris.len()
    }

    /// Returns true if the mesh has no triangles.
    pub fn is_empty(&self) -> bool {
        self.tris.is_empty()
    }

    /// Returns the three vertex positions of triangle `tri`.
    pub fn tri_coords(&self, tri: usize) -> [Point; 3] {
        self.tris[tri].map(|v| self.vertices[v as usize])
    }

    /// Area-weighted face normal of triangle `tri`: its length is twice the triangle area.
    pub fn tri_normal(&self, tri: usize) -> Vector {
        let [a, b, c] = self.tri_coords(tri);
        (b - a).cross(&(c - a))
    }

    /// Recomputes per-vertex normals from the current positions.
    ///
    /// Face normals are accumulated unnormalized, so larger faces weigh more, then each
    /// vertex normal is normalized. Vertices only touched by degenerate faces keep a zero
    /// normal.
    pub fn compute_normals(&mut self) {
        self.normals.clear();
        self.normals.resize(self.vertices.len(), Vector::zeros());
        for tri in 0..self.tris.len() {
            let n = self.tri_normal(tri);
            for v in self.tris[tri] {
                self.normals[v as usize] += n;
            }
        }
        for n in &mut self.normals {
            *n = n.try_normalize(0.0).unwrap_or_else(Vector::zeros);
        }
    }

    /// Applies an affine transform to every vertex in place.
    ///
    /// Normals are left untouched; recompute them afterwards.
    pub fn transform(&mut self, t: &Transform) {
        for v in &mut self.vertices {
            *v = t.transform_point(v);
        }
    }

    /// Mean of all vertex positions, or `None` for a mesh without vertices.
    pub fn centroid(&self) -> Option<Point> {
        if self.vertices.is_empty() {
            return None;
        }
        let sum = self
            .vertices
            .iter()
            .fold(Vector::zeros(), |acc, v| acc + v.coords);
        Some(Point::from(sum / self.vertices.len() as f32))
    }
}
