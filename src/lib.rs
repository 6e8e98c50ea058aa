pub mod atom;
pub mod bounds;
pub mod error;
pub mod extract;
pub mod field;
pub mod grid;
pub mod interp;
pub mod mesh;
pub mod plugin;
pub mod surface;
pub mod tables;
pub mod task;
pub mod types;
pub mod utils;

pub use atom::{Atom, Element, SizeLookup, SizeTheme};
pub use bounds::Box3D;
pub use error::{Result, SurfaceError};
pub use extract::{IsoSurfaceExtractor, MarchingCubes};
pub use grid::GridSpacing;
pub use mesh::SurfaceMesh;
pub use plugin::{MolecularSurfacePlugin, SurfaceUnit};
pub use surface::{SurfaceProps, build_surface, compute_surface, plan_grid};
pub use task::{CancellationToken, Progress, TaskContext};
