use derive_more::{Display, From};

pub type Result<T> = core::result::Result<T, SurfaceError>;

#[derive(Debug, Display, From)]
#[display("{self:?}")]
pub enum SurfaceError {
    /// The host requested interruption at a checkpoint.
    Cancelled,
    /// Input geometry cannot produce a finite grid (empty atom set, zero-volume box, ...).
    DegenerateGeometry(&'static str),
    /// The density field would not fit in memory.
    AllocationFailed { voxels: usize },
    /// A triangle referenced a vertex that does not exist.
    InvalidIndex,
    #[from]
    Shape(ndarray::ShapeError),
}

impl std::error::Error for SurfaceError {}
