use crate::{
    atom::Atom,
    types::{Point, Value, Vector},
};

/// Axis-aligned bounding box with `min[i] <= max[i]` on every axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Box3D {
    pub min: Point,
    pub max: Point,
}

impl Box3D {
    pub fn new(min: Point, max: Point) -> Self {
        debug_assert!(
            (0..3).all(|i| min[i] <= max[i]),
            "Box3D min {min:?} exceeds max {max:?}"
        );
        Self { min, max }
    }

    /// Tight box around `points`, or `None` when there are none.
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Point>,
    {
        let mut points = points.into_iter();
        let first = *points.next()?;
        let (min, max) = points.fold((first, first), |(min, max), p| {
            (min.inf(p), max.sup(p))
        });
        Some(Self { min, max })
    }

    /// Tight box around the atom positions.
    pub fn from_atoms(atoms: &[Atom]) -> Option<Self> {
        Self::from_points(atoms.iter().map(|a| &a.position))
    }

    /// Returns a copy grown by `padding` on every side.
    ///
    /// ```text
    ///  min' = min - padding
    ///  max' = max + padding
    /// ```
    pub fn expand(&self, padding: Value) -> Self {
        let pad = Vector::repeat(padding);
        Self {
            min: self.min - pad,
            max: self.max + pad,
        }
    }

    pub fn extent(&self) -> Vector {
        self.max - self.min
    }

    pub fn volume(&self) -> Value {
        let e = self.extent();
        e.x * e.y * e.z
    }

    pub fn center(&self) -> Point {
        nalgebra::center(&self.min, &self.max)
    }
}

/// Padding that keeps every atom's smoothed footprint inside the grid.
///
/// Not a true bound on the largest radius: the `+ 2` is a safety margin that holds for
/// typical molecular radii.
pub fn surface_padding(probe_radius: Value) -> Value {
    (probe_radius + 2.0) * 2.0
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn from_points_is_tight() {
        let points = [
            Point::new(1.0, -2.0, 3.0),
            Point::new(-1.0, 4.0, 0.5),
            Point::new(0.0, 0.0, 7.0),
        ];
        let b = Box3D::from_points(&points).unwrap();
        assert_eq!(b.min, Point::new(-1.0, -2.0, 0.5));
        assert_eq!(b.max, Point::new(1.0, 4.0, 7.0));
    }

    #[test]
    fn from_points_empty() {
        assert!(Box3D::from_points(std::iter::empty::<&Point>()).is_none());
    }

    #[test]
    fn expand_pads_every_axis() {
        let b = Box3D::new(Point::new(0.0, 1.0, 2.0), Point::new(1.0, 2.0, 3.0));
        let e = b.expand(surface_padding(1.4));
        assert_relative_eq!(e.min, Point::new(-6.8, -5.8, -4.8), epsilon = 1e-5);
        assert_relative_eq!(e.max, Point::new(7.8, 8.8, 9.8), epsilon = 1e-5);
        assert_relative_eq!(e.center(), b.center(), epsilon = 1e-5);
    }

    #[test]
    fn point_box_has_zero_volume_until_padded() {
        let b = Box3D::from_points(&[Point::origin()]).unwrap();
        assert_eq!(b.volume(), 0.0);
        assert_relative_eq!(b.expand(surface_padding(0.0)).volume(), 512.0);
    }
}
