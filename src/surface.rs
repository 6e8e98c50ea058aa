use tracing::{debug, debug_span};

use crate::{
    atom::{Atom, SizeLookup},
    bounds::{Box3D, surface_padding},
    error::Result,
    extract::{IsoSurfaceExtractor, MarchingCubes},
    field::DensityField,
    grid::GridSpacing,
    mesh::SurfaceMesh,
    task::TaskContext,
    types::Value,
};

/// Parameters of a Gaussian surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceProps {
    /// Target grid density: about `8^resolution_factor` voxels over the whole structure.
    pub resolution_factor: u32,
    /// Added to every atom's size.
    pub probe_radius: Value,
    /// Density threshold of the extracted surface.
    pub iso_value: Value,
}

impl Default for SurfaceProps {
    fn default() -> Self {
        Self {
            resolution_factor: 7,
            probe_radius: 1.4,
            iso_value: 0.1,
        }
    }
}

impl SurfaceProps {
    /// Padding applied to every bounding box before gridding.
    pub fn padding(&self) -> Value {
        surface_padding(self.probe_radius)
    }
}

/// Plans the grid spacing shared by every unit of a structure.
///
/// `structure_box` is the tight box of the whole structure; it is padded the same way
/// unit boxes are.
pub fn plan_grid(structure_box: &Box3D, props: &SurfaceProps) -> Result<GridSpacing> {
    GridSpacing::plan(
        &structure_box.expand(props.padding()),
        props.resolution_factor,
    )
}

/// Builds the surface of one unit on a grid planned with [`plan_grid`].
///
/// ```text
/// unit_box ──expand──► local box ──► DensityField::build ──► extractor (child)
///          ──► grid_to_world transform ──► compute_normals ──► SurfaceMesh
/// ```
///
/// `previous` is handed to the extractor as scratch storage. On cancellation or failure
/// nothing is returned.
pub fn build_surface<S, E>(
    ctx: &TaskContext,
    atoms: &[Atom],
    sizes: &S,
    unit_box: &Box3D,
    spacing: &GridSpacing,
    props: &SurfaceProps,
    extractor: &E,
    previous: Option<SurfaceMesh>,
) -> Result<SurfaceMesh>
where
    S: SizeLookup + ?Sized,
    E: IsoSurfaceExtractor + ?Sized,
{
    let _span = debug_span!("gaussian_surface", atoms = atoms.len()).entered();

    let local = unit_box.expand(props.padding());
    let field = DensityField::build(ctx, atoms, sizes, &local, spacing, props.probe_radius)?;

    let mut mesh = extractor.extract(&ctx.child(), &field, props.iso_value, previous)?;
    drop(field);

    mesh.transform(&spacing.grid_to_world(&local.min));
    mesh.compute_normals();

    debug!(
        vertices = mesh.vertex_count(),
        triangles = mesh.triangle_count(),
        "built gaussian surface"
    );
    Ok(mesh)
}

/// One-call surface build with the default [`MarchingCubes`] extractor.
///
/// Plans the spacing from `structure_box`; when building several units of the same
/// structure prefer [`plan_grid`] once plus [`build_surface`] per unit.
pub fn compute_surface<S>(
    ctx: &TaskContext,
    atoms: &[Atom],
    sizes: &S,
    structure_box: &Box3D,
    unit_box: &Box3D,
    props: &SurfaceProps,
    previous: Option<SurfaceMesh>,
) -> Result<SurfaceMesh>
where
    S: SizeLookup + ?Sized,
{
    let spacing = plan_grid(structure_box, props)?;
    build_surface(
        ctx,
        atoms,
        sizes,
        unit_box,
        &spacing,
        props,
        &MarchingCubes::default(),
        previous,
    )
}
