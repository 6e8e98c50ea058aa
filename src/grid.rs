use tracing::debug;

use crate::{
    bounds::Box3D,
    error::{Result, SurfaceError},
    types::{Index3, Point, Transform, Value, Vector},
};

/// Per-axis grid spacing, in voxels per unit length.
///
/// Planned once per structure from the structure-wide box so that every unit built with
/// it shares the same voxel size. The spacing may be anisotropic, but radii and the
/// grid-to-world remap only use the first axis:
///
/// ```text
///  index  = (pos - min) * delta
///  world  = index / delta.x + min
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridSpacing {
    delta: Vector,
}

impl GridSpacing {
    /// Derives the spacing for an expanded box so that the total voxel count
    /// approximates `(2^resolution_factor)^3`.
    ///
    /// ```text
    /// n     = (2^resolution_factor)^3
    /// s     = cbrt(volume / n)
    /// size  = ceil(extent * s)
    /// delta = extent / size
    /// ```
    ///
    /// Returns [`SurfaceError::DegenerateGeometry`] for zero-volume or non-finite boxes.
    pub fn plan(expanded: &Box3D, resolution_factor: u32) -> Result<Self> {
        let extent = expanded.extent();
        if !extent.iter().all(|e| e.is_finite() && *e > 0.0) {
            return Err(SurfaceError::DegenerateGeometry(
                "bounding box has zero volume",
            ));
        }

        // Planned in f64; the ceil below is sensitive to rounding.
        let extent = extent.cast::<f64>();
        let per_axis = 2f64.powi(i32::try_from(resolution_factor).unwrap_or(i32::MAX));
        let n = per_axis.powi(3);
        let f = (extent.x * extent.y * extent.z) / n;
        let s = f.cbrt();
        let size = (extent * s).map(f64::ceil);
        let delta = extent.component_div(&size).cast::<Value>();

        if !delta.iter().all(|d| d.is_finite() && *d > 0.0) {
            return Err(SurfaceError::DegenerateGeometry(
                "resolution factor yields non-finite grid spacing",
            ));
        }

        debug!(resolution_factor, ?delta, "planned grid spacing");
        Ok(Self { delta })
    }

    /// Same spacing on every axis.
    pub fn isotropic(voxels_per_unit: Value) -> Self {
        Self {
            delta: Vector::repeat(voxels_per_unit),
        }
    }

    pub fn delta(&self) -> &Vector {
        &self.delta
    }

    /// Grid dimensions covering `local`: `ceil(extent * delta)` per axis.
    pub fn dimensions(&self, local: &Box3D) -> Result<Index3> {
        let dim = local.extent().component_mul(&self.delta).map(Value::ceil);
        if !dim.iter().all(|d| d.is_finite() && *d >= 0.0) {
            return Err(SurfaceError::DegenerateGeometry(
                "grid dimensions are not finite",
            ));
        }
        Ok([dim.x as usize, dim.y as usize, dim.z as usize])
    }

    /// Maps a world position into grid-index space relative to `origin`.
    pub fn to_grid(&self, origin: &Point, p: &Point) -> Point {
        Point::from((p - origin).component_mul(&self.delta))
    }

    /// Converts a world-space length to index units using the first axis.
    pub fn length_to_grid(&self, length: Value) -> Value {
        length * self.delta.x
    }

    /// Uniform scale by `1 / delta.x` followed by a translation to `origin`.
    pub fn grid_to_world(&self, origin: &Point) -> Transform {
        Transform::new_scaling(1.0 / self.delta.x).append_translation(&origin.coords)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn voxel_count(b: &Box3D, resolution_factor: u32) -> usize {
        let spacing = GridSpacing::plan(b, resolution_factor).unwrap();
        spacing.dimensions(b).unwrap().iter().product()
    }

    #[test]
    fn unit_cube_spacing() {
        // 8^3 box at resolution 3 → one voxel per unit.
        let b = Box3D::new(Point::new(-4.0, -4.0, -4.0), Point::new(4.0, 4.0, 4.0));
        let spacing = GridSpacing::plan(&b, 3).unwrap();
        assert_relative_eq!(*spacing.delta(), Vector::repeat(1.0));
        assert_eq!(spacing.dimensions(&b).unwrap(), [8, 8, 8]);
    }

    #[test]
    fn anisotropic_box() {
        let b = Box3D::new(Point::origin(), Point::new(30.0, 20.0, 10.0));
        let spacing = GridSpacing::plan(&b, 3).unwrap();
        // size = ceil(extent * s) = [69, 46, 23]
        assert_relative_eq!(spacing.delta().x, 30.0 / 69.0, epsilon = 1e-6);
        assert_relative_eq!(spacing.delta().y, 20.0 / 46.0, epsilon = 1e-6);
        assert_relative_eq!(spacing.delta().z, 10.0 / 23.0, epsilon = 1e-6);
        assert_eq!(spacing.dimensions(&b).unwrap(), [14, 9, 5]);
    }

    #[test]
    fn voxel_count_scales_by_about_eight() {
        let boxes = [
            Box3D::new(Point::new(-4.0, -4.0, -4.0), Point::new(4.0, 4.0, 4.0)),
            Box3D::new(Point::origin(), Point::new(30.0, 20.0, 10.0)),
            Box3D::new(Point::new(-2.0, 1.0, 0.0), Point::new(22.0, 19.0, 15.0)),
        ];
        for b in &boxes {
            for r in 3..5 {
                let ratio = voxel_count(b, r + 1) as f64 / voxel_count(b, r) as f64;
                assert!(
                    (4.0..12.0).contains(&ratio),
                    "ratio {ratio} for {b:?} at resolution {r}"
                );
            }
        }
    }

    #[test]
    fn zero_volume_is_degenerate() {
        let flat = Box3D::new(Point::origin(), Point::new(1.0, 1.0, 0.0));
        assert!(matches!(
            GridSpacing::plan(&flat, 4),
            Err(SurfaceError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn grid_to_world_inverts_to_grid_for_isotropic_spacing() {
        let spacing = GridSpacing::isotropic(2.5);
        let origin = Point::new(-3.0, 1.0, 4.0);
        let p = Point::new(0.4, -2.0, 7.2);
        let index = spacing.to_grid(&origin, &p);
        let back = spacing.grid_to_world(&origin).transform_point(&index);
        assert_relative_eq!(back, p, epsilon = 1e-5);
    }

    #[test]
    fn grid_to_world_scales_then_translates() {
        let spacing = GridSpacing::isotropic(4.0);
        let t = spacing.grid_to_world(&Point::new(1.0, 2.0, 3.0));
        assert_relative_eq!(
            t.transform_point(&Point::new(8.0, 4.0, 0.0)),
            Point::new(3.0, 3.0, 3.0)
        );
    }
}
