use std::collections::HashMap;

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::debug;

use crate::{
    error::Result,
    field::{DensityField, NO_GROUP},
    interp::{find_t, interpolate_points},
    mesh::SurfaceMesh,
    tables::EDGE_TABLE,
    task::TaskContext,
    types::{Point, Value},
    utils::{EdgeKey, corner_values, edge_key, get_state, triangle_edges_from_state},
};

const PROGRESS_MESSAGE: &str = "Marching cubes";

/// Converts a density field into a triangle mesh.
///
/// Implementations run as a child computation: they must honour cancellation through
/// `ctx` and may reuse the storage of `previous`, returning either that buffer
/// repopulated or a fresh one. Output vertices are in grid-index space.
pub trait IsoSurfaceExtractor: Sync {
    fn extract(
        &self,
        ctx: &TaskContext,
        field: &DensityField,
        iso_level: Value,
        previous: Option<SurfaceMesh>,
    ) -> Result<SurfaceMesh>;
}

/// Marching cubes over the whole field.
///
/// Work is parallelised over X slabs using Rayon. Slabs are processed in batches of
/// [`slabs_per_checkpoint`](MarchingCubes::slabs_per_checkpoint); cancellation is checked
/// between batches, so cancellation points do not depend on thread scheduling.
///
/// ```text
/// Per cube:
/// 1. corner_values              →  8 densities
/// 2. get_state                  →  256-entry lookup key
/// 3. EDGE_TABLE[state]          →  skip cubes the surface does not cross
/// 4. triangle_edges_from_state  →  triangles as cube edges
/// 5. edge_key                   →  grid-wide edge ids
/// Then, sequentially: one vertex per distinct edge, interpolated at the iso level.
/// ```
#[derive(Clone, Copy, Debug)]
pub struct MarchingCubes {
    /// Number of X slabs marched between two checkpoints. Default: `16`.
    pub slabs_per_checkpoint: usize,
}

impl Default for MarchingCubes {
    fn default() -> Self {
        Self {
            slabs_per_checkpoint: 16,
        }
    }
}

impl IsoSurfaceExtractor for MarchingCubes {
    fn extract(
        &self,
        ctx: &TaskContext,
        field: &DensityField,
        iso_level: Value,
        previous: Option<SurfaceMesh>,
    ) -> Result<SurfaceMesh> {
        let mut mesh = previous.unwrap_or_default();
        mesh.clear();

        let [nx, ny, nz] = field.dim();
        if nx < 2 || ny < 2 || nz < 2 {
            return Ok(mesh);
        }

        let slabs = nx - 1;
        let batch = self.slabs_per_checkpoint.max(1);
        let mut edge_tris: Vec<[EdgeKey; 3]> = Vec::new();
        let mut start = 0;
        while start < slabs {
            ctx.checkpoint(PROGRESS_MESSAGE, start, slabs)?;
            let end = (start + batch).min(slabs);
            let per_x: Vec<Vec<[EdgeKey; 3]>> = (start..end)
                .into_par_iter()
                .map(|x| march_slab(field, iso_level, x, ny, nz))
                .collect();
            for mut tris in per_x {
                edge_tris.append(&mut tris);
            }
            start = end;
        }
        ctx.checkpoint(PROGRESS_MESSAGE, slabs, slabs)?;

        // One vertex per distinct grid edge.
        let mut vertex_of: HashMap<EdgeKey, u32> = HashMap::with_capacity(edge_tris.len());
        mesh.tris.reserve(edge_tris.len());
        for keys in edge_tris {
            let [a, b, c] = keys.map(|key| {
                *vertex_of
                    .entry(key)
                    .or_insert_with(|| edge_vertex(&mut mesh, field, iso_level, &key))
            });
            mesh.triangle_from_verts(a, b, c)?;
        }

        debug!(
            vertices = mesh.vertex_count(),
            triangles = mesh.triangle_count(),
            "extracted iso-surface"
        );
        Ok(mesh)
    }
}

/// Marches every cube of the slab at `x`, returning triangles as grid edges.
fn march_slab(
    field: &DensityField,
    iso_level: Value,
    x: usize,
    ny: usize,
    nz: usize,
) -> Vec<[EdgeKey; 3]> {
    let mut local = Vec::new();
    for y in 0..ny - 1 {
        for z in 0..nz - 1 {
            let corners = corner_values(field, x, y, z);
            let state = get_state(&corners, iso_level);
            if EDGE_TABLE[state] == 0 {
                continue;
            }
            let tris = triangle_edges_from_state(state);
            local.extend(tris.map(|tri| tri.map(|edge| edge_key(x, y, z, edge))));
        }
    }
    local
}

/// Interpolates the iso-level crossing on `key`, appends it to `mesh` and returns its index.
///
/// The vertex takes the group of the denser endpoint, the one inside the surface.
fn edge_vertex(
    mesh: &mut SurfaceMesh,
    field: &DensityField,
    iso_level: Value,
    key: &EdgeKey,
) -> u32 {
    let [x0, y0, z0] = key.corner;
    let [x1, y1, z1] = key.end();
    let v0 = field.get(x0, y0, z0);
    let v1 = field.get(x1, y1, z1);

    let p0 = Point::new(x0 as Value, y0 as Value, z0 as Value);
    let p1 = Point::new(x1 as Value, y1 as Value, z1 as Value);
    let t = find_t(v0, v1, iso_level);

    let group = if v0 >= v1 {
        field.group(x0, y0, z0)
    } else {
        field.group(x1, y1, z1)
    };
    mesh.push_vertex(interpolate_points(&p0, &p1, t), group.unwrap_or(NO_GROUP))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{error::SurfaceError, task::CancellationToken};

    /// Field holding `1 - |p - c| / r` clamped at zero around the grid centre.
    fn ball(n: usize, radius: Value) -> DensityField {
        let mut field = DensityField::zeros([n, n, n]).unwrap();
        let c = (n - 1) as Value / 2.0;
        let center = Point::new(c, c, c);
        for ((x, y, z), v) in field.values.indexed_iter_mut() {
            let d = nalgebra::distance(&Point::new(x as Value, y as Value, z as Value), &center);
            *v = (1.0 - d / radius).max(0.0);
        }
        field.groups.fill(7);
        field
    }

    #[test]
    fn empty_field_has_no_surface() {
        let field = DensityField::zeros([4, 4, 4]).unwrap();
        let mesh = MarchingCubes::default()
            .extract(&TaskContext::default(), &field, 0.5, None)
            .unwrap();
        assert!(mesh.is_empty());
    }

    #[test]
    fn tiny_field_has_no_cubes() {
        let field = DensityField::zeros([1, 5, 5]).unwrap();
        let mesh = MarchingCubes::default()
            .extract(&TaskContext::default(), &field, 0.5, None)
            .unwrap();
        assert!(mesh.is_empty());
    }

    #[test]
    fn single_inside_corner_gives_one_triangle() {
        let mut field = DensityField::zeros([2, 2, 2]).unwrap();
        field.values[[0, 0, 0]] = 1.0;
        let mesh = MarchingCubes::default()
            .extract(&TaskContext::default(), &field, 0.5, None)
            .unwrap();
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.vertex_count(), 3);
        // Every vertex sits half-way along an edge leaving the corner.
        for v in &mesh.vertices {
            assert!((v.coords.sum() - 0.5).abs() < 1e-6, "{v:?}");
        }
    }

    #[test]
    fn ball_surface_is_closed_and_welded() {
        let field = ball(12, 4.0);
        let mesh = MarchingCubes::default()
            .extract(&TaskContext::default(), &field, 0.5, None)
            .unwrap();
        assert!(mesh.triangle_count() > 50);

        // Each undirected edge is shared by exactly two triangles.
        let mut edges: HashMap<(u32, u32), usize> = HashMap::new();
        for [a, b, c] in &mesh.tris {
            for (u, v) in [(a, b), (b, c), (c, a)] {
                *edges.entry((*u.min(v), *u.max(v))).or_default() += 1;
            }
        }
        assert!(edges.values().all(|&n| n == 2));

        // Vertices lie close to the r/2 sphere and carry the field's group.
        let c = 5.5;
        for v in &mesh.vertices {
            let d = nalgebra::distance(v, &Point::new(c, c, c));
            assert!((d - 2.0).abs() < 0.5, "{v:?} at {d}");
        }
        assert!(mesh.groups.iter().all(|&g| g == 7));
    }

    #[test]
    fn reuses_previous_buffers() {
        let field = ball(12, 4.0);
        let extractor = MarchingCubes::default();
        let first = extractor
            .extract(&TaskContext::default(), &field, 0.5, None)
            .unwrap();
        let expected = first.clone();
        let storage = first.vertices.as_ptr();
        let second = extractor
            .extract(&TaskContext::default(), &field, 0.5, Some(first))
            .unwrap();
        assert_eq!(second, expected);
        assert_eq!(second.vertices.as_ptr(), storage);
    }

    #[test]
    fn same_result_for_any_batch_size() {
        let field = ball(12, 4.0);
        let one = MarchingCubes {
            slabs_per_checkpoint: 1,
        }
        .extract(&TaskContext::default(), &field, 0.5, None)
        .unwrap();
        let all = MarchingCubes {
            slabs_per_checkpoint: 64,
        }
        .extract(&TaskContext::default(), &field, 0.5, None)
        .unwrap();
        assert_eq!(one, all);
    }

    #[test]
    fn cancelled_extraction_returns_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = TaskContext::new(token);
        let field = ball(12, 4.0);
        let result = MarchingCubes::default().extract(&ctx, &field, 0.5, None);
        assert!(matches!(result, Err(SurfaceError::Cancelled)));
    }
}
