use crate::{
    field::DensityField,
    tables::{CORNER_OFFSETS, CORNER_POINT_INDICES, TRI_TABLE},
    types::{Index3, Value},
};

/// A grid edge shared by up to four neighbouring cubes.
///
/// Identified by its lower corner and the axis it runs along, so every cube touching the
/// edge resolves it to the same key and the same interpolated vertex.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EdgeKey {
    pub corner: Index3,
    pub axis: u8,
}

impl EdgeKey {
    /// The upper corner of the edge.
    pub fn end(&self) -> Index3 {
        let mut end = self.corner;
        end[self.axis as usize] += 1;
        end
    }
}

/// Resolves edge `edge` (0..12) of the cube at `(x, y, z)` to its grid-wide key.
#[inline]
pub fn edge_key(x: usize, y: usize, z: usize, edge: usize) -> EdgeKey {
    let [a, b] = CORNER_POINT_INDICES[edge];
    let oa = CORNER_OFFSETS[a as usize];
    let ob = CORNER_OFFSETS[b as usize];
    let axis = (0..3).find(|&i| oa[i] != ob[i]).unwrap_or(0);
    EdgeKey {
        corner: [
            x + oa[0].min(ob[0]),
            y + oa[1].min(ob[1]),
            z + oa[2].min(ob[2]),
        ],
        axis: axis as u8,
    }
}

/// Returns the 8 corner densities of the cube at grid index `(x, y, z)`.
///
/// Corners are ordered to match [`CORNER_OFFSETS`](crate::tables::CORNER_OFFSETS).
#[inline]
pub fn corner_values(field: &DensityField, x: usize, y: usize, z: usize) -> [Value; 8] {
    CORNER_OFFSETS.map(|[dx, dy, dz]| field.get(x + dx, y + dy, z + dz))
}

/// Computes the marching cubes state bitmask for a cube.
///
/// Each of the 8 corners maps to one bit. A bit is set when the corner's density is
/// **below** the iso level, i.e. outside the surface:
///
/// ```text
/// corner index:  7  6  5  4  3  2  1  0
/// state bits:   [_][_][_][_][_][_][_][_]
///                                      ^-- corner 0 outside?
/// ```
///
/// With this convention the triangle winding of [`TRI_TABLE`] faces towards lower
/// density, so normals point out of the surface.
#[inline]
pub fn get_state(corners: &[Value; 8], iso_level: Value) -> usize {
    let mut state: usize = 0;
    for (i, &v) in corners.iter().enumerate() {
        if v < iso_level {
            state |= 1 << i;
        }
    }
    state
}

/// Yields the triangles of a marching cubes `state` as triples of cube edge indices.
///
/// `TRI_TABLE[state]` contains edge indices in groups of three, terminated by `-1`:
/// ```text
/// TRI_TABLE[state] = [e0, e1, e2,  e3, e4, e5,  -1, ...]
///                     \___tri0__/   \___tri1__/
/// ```
#[inline]
pub fn triangle_edges_from_state(state: usize) -> impl Iterator<Item = [usize; 3]> {
    let row = &TRI_TABLE[state];
    let len = row.iter().position(|&e| e == -1).unwrap_or(row.len());
    row[..len]
        .chunks_exact(3)
        .map(|t| [t[0] as usize, t[1] as usize, t[2] as usize])
}
