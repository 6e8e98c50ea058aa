use crate::types::{Point, Value};

// Return the interpolation factor t corresponding to iso_val
pub fn find_t(v0: Value, v1: Value, iso_val: Value) -> Value {
    (iso_val - v0) / (v1 - v0)
}

// Linear interpolation
pub fn lerp(a: Value, b: Value, t: Value) -> Value {
    a + (b - a) * t
}

// Linearly interpolate between two points by factor t
pub fn interpolate_points(p0: &Point, p1: &Point, t: Value) -> Point {
    Point::new(
        lerp(p0.x, p1.x, t),
        lerp(p0.y, p1.y, t),
        lerp(p0.z, p1.z, t),
    )
}

/// Cubic Hermite ease between `edge0` and `edge1`.
///
/// `x` is clamped to the interval first, so the result is always in `[0, 1]`.
/// This is the falloff profile used in place of a true Gaussian kernel.
pub fn smoothstep(edge0: Value, edge1: Value, x: Value) -> Value {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn smoothstep_is_clamped() {
        assert_eq!(smoothstep(0.0, 2.0, -1.0), 0.0);
        assert_eq!(smoothstep(0.0, 2.0, 0.0), 0.0);
        assert_eq!(smoothstep(0.0, 2.0, 2.0), 1.0);
        assert_eq!(smoothstep(0.0, 2.0, 5.0), 1.0);
    }

    #[test]
    fn smoothstep_midpoint_is_half() {
        assert_relative_eq!(smoothstep(0.0, 2.0, 1.0), 0.5);
        // 1/3 of the way: t^2 (3 - 2t) = 7/27
        assert_relative_eq!(smoothstep(0.0, 3.0, 1.0), 7.0 / 27.0, epsilon = 1e-6);
    }

    #[test]
    fn find_t_locates_iso_value() {
        assert_relative_eq!(find_t(1.0, 0.0, 0.25), 0.75);
        let p = interpolate_points(&Point::origin(), &Point::new(4.0, 2.0, 0.0), 0.25);
        assert_relative_eq!(p, Point::new(1.0, 0.5, 0.0));
    }
}
