use nalgebra::{Matrix4, Point3, Vector3};

/// Scalar field value at a point in space.
pub type Value = f32;

/// A 3D point with [`Value`] components.
pub type Point = Point3<Value>;

/// A 3D vector with [`Value`] components.
pub type Vector = Vector3<Value>;

/// A homogeneous affine transform with [`Value`] components.
pub type Transform = Matrix4<Value>;

/// Integer voxel coordinates `[x, y, z]`.
pub type Index3 = [usize; 3];
