use ndarray::Array3;
use tracing::debug;

use crate::{
    atom::{Atom, SizeLookup},
    bounds::Box3D,
    error::{Result, SurfaceError},
    grid::GridSpacing,
    interp::smoothstep,
    task::TaskContext,
    types::{Index3, Point, Value},
};

/// Group tag of voxels no atom reached.
pub const NO_GROUP: u32 = u32::MAX;

/// Number of atoms processed between two checkpoints.
pub const PROGRESS_INTERVAL: usize = 10_000;

const PROGRESS_MESSAGE: &str = "Gaussian surface";

/// Dense density grid produced by splatting atoms.
///
/// Values are stored as `values[[x, y, z]]` in grid-index space. `groups` holds, per
/// voxel, the index of the atom with the largest single contribution, or [`NO_GROUP`].
#[derive(Clone, Debug, PartialEq)]
pub struct DensityField {
    pub values: Array3<Value>,
    pub groups: Array3<u32>,
}

impl DensityField {
    /// Creates a zeroed field, failing with [`SurfaceError::AllocationFailed`] instead of
    /// aborting when the grid does not fit in memory.
    pub fn zeros(dim: Index3) -> Result<Self> {
        Ok(Self {
            values: try_alloc(dim, 0.0)?,
            groups: try_alloc(dim, NO_GROUP)?,
        })
    }

    /// Allocates a field over `local` and splats every atom into it.
    ///
    /// ```text
    /// Per atom, in input order:
    /// 1. v      = (position - local.min) * delta
    /// 2. radius = (size(atom) + probe_radius) * delta.x
    /// 3. every voxel p in [floor(v - radius), ceil(v + radius)) with |p - v| <= radius:
    ///        density[p] += 1 - smoothstep(0, radius, |p - v|)
    /// ```
    ///
    /// Checks for cancellation and reports progress after every
    /// [`PROGRESS_INTERVAL`]-th atom.
    pub fn build<S>(
        ctx: &TaskContext,
        atoms: &[Atom],
        sizes: &S,
        local: &Box3D,
        spacing: &GridSpacing,
        probe_radius: Value,
    ) -> Result<Self>
    where
        S: SizeLookup + ?Sized,
    {
        if atoms.is_empty() {
            return Err(SurfaceError::DegenerateGeometry("unit has no atoms"));
        }

        let dim = spacing.dimensions(local)?;
        let mut field = Self::zeros(dim)?;
        let mut peak = try_alloc(dim, 0.0)?;
        debug!(
            ?dim,
            voxels = field.voxel_count(),
            atoms = atoms.len(),
            "splatting density field"
        );

        let count = atoms.len();
        for (i, atom) in atoms.iter().enumerate() {
            let center = spacing.to_grid(&local.min, &atom.position);
            let radius = spacing.length_to_grid(sizes.size(atom) + probe_radius);
            let group = u32::try_from(i).unwrap_or(NO_GROUP);
            field.splat(&mut peak, &center, radius, group);

            if i % PROGRESS_INTERVAL == 0 {
                ctx.checkpoint(PROGRESS_MESSAGE, i, count)?;
            }
        }

        Ok(field)
    }

    /// Adds one atom's smoothed footprint. The footprint is clipped to the grid.
    fn splat(&mut self, peak: &mut Array3<Value>, center: &Point, radius: Value, group: u32) {
        if radius.is_nan() || radius <= 0.0 {
            return;
        }

        let dim = self.dim();
        let lo = |c: Value| (c - radius).floor().max(0.0) as usize;
        let hi = |c: Value, n: usize| ((c + radius).ceil().max(0.0) as usize).min(n);

        for x in lo(center.x)..hi(center.x, dim[0]) {
            for y in lo(center.y)..hi(center.y, dim[1]) {
                for z in lo(center.z)..hi(center.z, dim[2]) {
                    let p = Point::new(x as Value, y as Value, z as Value);
                    let dist = nalgebra::distance(&p, center);
                    if dist > radius {
                        continue;
                    }
                    let density = 1.0 - smoothstep(0.0, radius, dist);
                    let index = [x, y, z];
                    self.values[index] += density;
                    if density > peak[index] {
                        peak[index] = density;
                        self.groups[index] = group;
                    }
                }
            }
        }
    }

    /// Grid dimensions `[x, y, z]`.
    pub fn dim(&self) -> Index3 {
        let (x, y, z) = self.values.dim();
        [x, y, z]
    }

    pub fn voxel_count(&self) -> usize {
        self.values.len()
    }

    /// Returns the density at voxel `(x, y, z)`.
    pub fn get(&self, x: usize, y: usize, z: usize) -> Value {
        self.values[[x, y, z]]
    }

    /// Returns the dominant atom of voxel `(x, y, z)`, if any atom reached it.
    pub fn group(&self, x: usize, y: usize, z: usize) -> Option<u32> {
        let group = self.groups[[x, y, z]];
        (group != NO_GROUP).then_some(group)
    }
}

fn try_alloc<T: Clone>(dim: Index3, fill: T) -> Result<Array3<T>> {
    let voxels = dim[0]
        .checked_mul(dim[1])
        .and_then(|n| n.checked_mul(dim[2]))
        .ok_or(SurfaceError::AllocationFailed { voxels: usize::MAX })?;

    let mut data = Vec::new();
    data.try_reserve_exact(voxels)
        .map_err(|_| SurfaceError::AllocationFailed { voxels })?;
    data.resize(voxels, fill);
    Ok(Array3::from_shape_vec(dim, data)?)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use approx::assert_relative_eq;

    use super::*;
    use crate::{
        atom::{Element, SizeTheme},
        task::CancellationToken,
    };

    fn cube(size: Value) -> Box3D {
        Box3D::new(Point::origin(), Point::new(size, size, size))
    }

    fn atom(x: Value, y: Value, z: Value) -> Atom {
        Atom::new(Point::new(x, y, z), Element::C)
    }

    fn build(atoms: &[Atom], size: Value) -> DensityField {
        DensityField::build(
            &TaskContext::default(),
            atoms,
            &SizeTheme::Uniform(size),
            &cube(10.0),
            &GridSpacing::isotropic(1.0),
            0.0,
        )
        .unwrap()
    }

    #[test]
    fn falloff_is_one_at_center_and_zero_at_radius() {
        let field = build(&[atom(5.0, 5.0, 5.0)], 3.0);
        assert_eq!(field.dim(), [10, 10, 10]);
        assert_relative_eq!(field.get(5, 5, 5), 1.0);
        assert_relative_eq!(field.get(6, 5, 5), 20.0 / 27.0, epsilon = 1e-6);
        assert_relative_eq!(field.get(8, 5, 5), 0.0);
        assert_eq!(field.get(9, 5, 5), 0.0);
        assert_eq!(field.get(0, 0, 0), 0.0);

        assert_eq!(field.group(5, 5, 5), Some(0));
        assert_eq!(field.group(9, 5, 5), None);
    }

    #[test]
    fn probe_radius_widens_footprint() {
        let field = DensityField::build(
            &TaskContext::default(),
            &[atom(5.0, 5.0, 5.0)],
            &SizeTheme::Uniform(1.0),
            &cube(10.0),
            &GridSpacing::isotropic(1.0),
            1.0,
        )
        .unwrap();
        // radius 2: half-way point of the falloff
        assert_relative_eq!(field.get(6, 5, 5), 0.5);
    }

    #[test]
    fn contributions_add_up() {
        let a = atom(4.0, 5.0, 5.0);
        let b = atom(6.5, 5.2, 4.9);
        let only_a = build(&[a], 2.5);
        let only_b = build(&[b], 2.5);
        let both = build(&[a, b], 2.5);

        let sum = &only_a.values + &only_b.values;
        for (combined, expected) in both.values.iter().zip(sum.iter()) {
            assert_relative_eq!(*combined, *expected, epsilon = 1e-6);
        }
        // Blending: the midpoint sees both atoms.
        assert!(both.get(5, 5, 5) > only_a.get(5, 5, 5));
        assert_eq!(both.group(4, 5, 5), Some(0));
        assert_eq!(both.group(7, 5, 5), Some(1));
    }

    #[test]
    fn builds_are_deterministic() {
        let atoms = [
            atom(2.3, 4.1, 7.7),
            atom(3.0, 3.9, 6.1),
            atom(8.2, 1.5, 2.0),
        ];
        assert_eq!(build(&atoms, 1.8), build(&atoms, 1.8));
    }

    #[test]
    fn atoms_outside_the_grid_are_clipped() {
        let field = build(&[atom(-50.0, 5.0, 5.0), atom(9.9, 9.9, 9.9)], 2.0);
        assert_eq!(field.get(0, 5, 5), 0.0);
        assert!(field.get(9, 9, 9) > 0.1);
    }

    #[test]
    fn zero_radius_contributes_nothing() {
        let field = build(&[atom(5.0, 5.0, 5.0)], 0.0);
        assert!(field.values.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn empty_unit_is_degenerate() {
        let result = DensityField::build(
            &TaskContext::default(),
            &[],
            &SizeTheme::default(),
            &cube(10.0),
            &GridSpacing::isotropic(1.0),
            0.0,
        );
        assert!(matches!(result, Err(SurfaceError::DegenerateGeometry(_))));
    }

    #[test]
    fn reports_progress_every_interval() {
        let reports = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reports);
        let ctx = TaskContext::default().with_observer(move |p| {
            assert_eq!(p.max, 25_000);
            assert_eq!(p.current % PROGRESS_INTERVAL, 0);
            counter.fetch_add(1, Ordering::Relaxed);
        });
        let atoms = vec![atom(5.0, 5.0, 5.0); 25_000];
        DensityField::build(
            &ctx,
            &atoms,
            &SizeTheme::Uniform(0.5),
            &cube(10.0),
            &GridSpacing::isotropic(1.0),
            0.0,
        )
        .unwrap();
        // indices 0, 10000, 20000
        assert_eq!(reports.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn cancellation_after_first_checkpoint() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        let reports = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reports);
        let ctx = TaskContext::new(token).with_observer(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
            canceller.cancel();
        });
        let atoms = vec![atom(5.0, 5.0, 5.0); 20_001];
        let result = DensityField::build(
            &ctx,
            &atoms,
            &SizeTheme::Uniform(0.5),
            &cube(10.0),
            &GridSpacing::isotropic(1.0),
            0.0,
        );
        assert!(matches!(result, Err(SurfaceError::Cancelled)));
        assert_eq!(reports.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn oversized_grid_fails_to_allocate() {
        let result = DensityField::zeros([usize::MAX / 2, 4, 1]);
        assert!(matches!(result, Err(SurfaceError::AllocationFailed { .. })));
    }
}
