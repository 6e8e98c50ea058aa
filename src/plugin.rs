use std::sync::Arc;

use bevy::{
    asset::RenderAssetUsages,
    mesh::{Indices, PrimitiveTopology},
    prelude::*,
    tasks::{AsyncComputeTaskPool, Task, block_on, futures_lite::future},
};

use crate::{
    atom::{Atom, SizeTheme},
    bounds::Box3D,
    error::{Result, SurfaceError},
    extract::MarchingCubes,
    grid::GridSpacing,
    mesh::SurfaceMesh,
    surface::{SurfaceProps, build_surface},
    task::{CancellationToken, TaskContext},
};

/// System sets for the molecular surface pipeline.
///
/// Use these to order your own systems relative to surface generation:
///
/// ```rust,ignore
/// // Run after geometry is ready but before it's uploaded, e.g. to colour by group:
/// app.add_systems(Update, color_by_group.after(MolecularSurfaceSet::Generate)
///                                       .before(MolecularSurfaceSet::Upload));
/// ```
///
/// ```text
/// MolecularSurfaceSet::Spawn  →  [async compute]  →  MolecularSurfaceSet::Generate
///                             →  [your systems]   →  MolecularSurfaceSet::Upload
/// ```
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum MolecularSurfaceSet {
    /// Spawns an async compute task for each queued unit.
    Spawn,
    /// Polls async tasks and inserts [`GeneratedSurface`] on completion.
    Generate,
    /// Uploads [`GeneratedSurface`] data into a Bevy [`Mesh3d`].
    Upload,
}

/// One unit of a structure whose surface should be built.
///
/// `spacing` comes from [`plan_grid`](crate::surface::plan_grid) over the whole
/// structure and must be shared by all units of that structure. Any change to this
/// component queues a rebuild and cancels a build still in flight.
///
/// ```rust,ignore
/// let spacing = plan_grid(&Box3D::from_atoms(&all_atoms).unwrap(), &props)?;
/// for unit in units {
///     commands.spawn(SurfaceUnit::new(unit, spacing, props));
/// }
/// ```
#[derive(Component, Clone, Debug)]
#[require(Transform)]
pub struct SurfaceUnit {
    pub atoms: Arc<[Atom]>,
    pub spacing: GridSpacing,
    pub props: SurfaceProps,
    pub size_theme: SizeTheme,
}

impl SurfaceUnit {
    pub fn new(atoms: impl Into<Arc<[Atom]>>, spacing: GridSpacing, props: SurfaceProps) -> Self {
        Self {
            atoms: atoms.into(),
            spacing,
            props,
            size_theme: SizeTheme::default(),
        }
    }

    /// Sets the size theme used to look up atom radii.
    pub fn with_size_theme(mut self, size_theme: SizeTheme) -> Self {
        self.size_theme = size_theme;
        self
    }
}

/// Marker component added to [`SurfaceUnit`] entities that need a (re)build.
///
/// Removed once the build task has been spawned.
#[derive(Component)]
pub struct QueuedSurface;

/// Marker component for a [`GeneratedSurface`] that has not been uploaded yet.
#[derive(Component)]
pub struct PendingUpload;

/// Holds the in-flight async compute task for a [`SurfaceUnit`] and the token that
/// cancels it.
#[derive(Component)]
pub struct ComputeTask {
    task: Task<Result<SurfaceMesh>>,
    token: CancellationToken,
}

/// The latest surface built for a unit, in world space.
///
/// Kept on the entity after upload. When the unit is rebuilt the component is removed and
/// its buffers are handed to the new build for reuse, so a cancelled or failed rebuild
/// leaves the entity without a `GeneratedSurface` (the last uploaded [`Mesh3d`] stays).
#[derive(Component, Default)]
pub struct GeneratedSurface(pub SurfaceMesh);

/// Runtime configuration for the surface pipeline.
///
/// Inserted as a resource by [`MolecularSurfacePlugin`]. Modify it at any time to change
/// behaviour:
///
/// ```rust,ignore
/// app.add_plugins(MolecularSurfacePlugin { max_tasks_per_frame: 8, ..default() });
///
/// // Or change it at runtime:
/// fn my_system(mut config: ResMut<MolecularSurfaceConfig>) {
///     config.max_tasks_per_frame = 1;
/// }
/// ```
#[derive(Resource)]
pub struct MolecularSurfaceConfig {
    /// Maximum number of async surface builds spawned per frame.
    ///
    /// Higher values finish large structures faster but may cause frame hitches when
    /// many units are queued at once. Default: `4`.
    pub max_tasks_per_frame: usize,
    /// Extractor used by every build.
    pub extractor: MarchingCubes,
}

impl Default for MolecularSurfaceConfig {
    fn default() -> Self {
        Self {
            max_tasks_per_frame: 4,
            extractor: MarchingCubes::default(),
        }
    }
}

/// Bevy plugin that drives molecular surface generation.
///
/// When the `auto_queue` feature is enabled, any [`SurfaceUnit`] added or changed is
/// automatically (re)built. Builds run on Bevy's `AsyncComputeTaskPool` so the main
/// thread is never blocked:
///
/// ```text
/// SurfaceUnit added / changed
///   → in-flight ComputeTask cancelled  (on_unit_change)
///   → QueuedSurface inserted           (on_unit_change)
///   → ComputeTask spawned              (MolecularSurfaceSet::Spawn)
///   → [async compute runs]
///   → GeneratedSurface inserted        (MolecularSurfaceSet::Generate, once task completes)
///   → [your systems here]
///   → Mesh3d inserted                  (MolecularSurfaceSet::Upload)
/// ```
pub struct MolecularSurfacePlugin {
    /// Initial value for [`MolecularSurfaceConfig::max_tasks_per_frame`].
    pub max_tasks_per_frame: usize,
}

impl Default for MolecularSurfacePlugin {
    fn default() -> Self {
        Self {
            max_tasks_per_frame: MolecularSurfaceConfig::default().max_tasks_per_frame,
        }
    }
}

impl Plugin for MolecularSurfacePlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(MolecularSurfaceConfig {
            max_tasks_per_frame: self.max_tasks_per_frame,
            ..Default::default()
        });

        #[cfg(feature = "auto_queue")]
        app.configure_sets(
            Update,
            (
                MolecularSurfaceSet::Spawn,
                MolecularSurfaceSet::Generate,
                MolecularSurfaceSet::Upload,
            )
                .chain(),
        )
        .add_systems(
            Update,
            (
                on_unit_change.before(MolecularSurfaceSet::Spawn),
                spawn_surface_tasks.in_set(MolecularSurfaceSet::Spawn),
                poll_surface_tasks.in_set(MolecularSurfaceSet::Generate),
                upload_surface.in_set(MolecularSurfaceSet::Upload),
            ),
        );
    }
}

/// Queues every added or changed [`SurfaceUnit`], cancelling its in-flight build.
fn on_unit_change(
    mut commands: Commands,
    query: Query<(Entity, Option<&ComputeTask>), Changed<SurfaceUnit>>,
) {
    for (entity, running) in query.iter() {
        if let Some(running) = running {
            running.token.cancel();
            commands.entity(entity).remove::<ComputeTask>();
        }
        commands.entity(entity).insert(QueuedSurface);
    }
}

/// Spawns async builds for [`QueuedSurface`]s, up to
/// [`MolecularSurfaceConfig::max_tasks_per_frame`] per frame.
fn spawn_surface_tasks(
    mut commands: Commands,
    config: Res<MolecularSurfaceConfig>,
    mut query: Query<
        (Entity, &SurfaceUnit, Option<&mut GeneratedSurface>),
        (With<QueuedSurface>, Without<ComputeTask>, Without<PendingUpload>),
    >,
) {
    let task_pool = AsyncComputeTaskPool::get();

    for (entity, unit, generated) in query.iter_mut().take(config.max_tasks_per_frame) {
        let mut entity_commands = commands.entity(entity);
        // Arc clones only; the atom list is never copied on the main thread.
        let atoms = Arc::clone(&unit.atoms);
        let spacing = unit.spacing;
        let props = unit.props;
        let size_theme = unit.size_theme;
        let extractor = config.extractor;
        let previous = generated.map(|mut g| {
            entity_commands.remove::<GeneratedSurface>();
            std::mem::take(&mut g.0)
        });

        let token = CancellationToken::new();
        let ctx = TaskContext::new(token.clone());

        let task = task_pool.spawn(async move {
            let unit_box = Box3D::from_atoms(&atoms)
                .ok_or(SurfaceError::DegenerateGeometry("unit has no atoms"))?;
            build_surface(
                &ctx,
                &atoms,
                &size_theme,
                &unit_box,
                &spacing,
                &props,
                &extractor,
                previous,
            )
        });

        entity_commands
            .insert(ComputeTask { task, token })
            .remove::<QueuedSurface>();
    }
}

/// Polls in-flight [`ComputeTask`]s each frame and inserts [`GeneratedSurface`] on completion.
///
/// Non-blocking: tasks that haven't finished are skipped and retried next frame.
fn poll_surface_tasks(mut commands: Commands, mut query: Query<(Entity, &mut ComputeTask)>) {
    for (entity, mut compute_task) in query.iter_mut() {
        let Some(result) = block_on(future::poll_once(&mut compute_task.task)) else {
            continue;
        };

        let mut entity_commands = commands.entity(entity);
        entity_commands.remove::<ComputeTask>();
        match result {
            Ok(surface) => {
                debug!(
                    "surface for {entity} ready: {} triangles",
                    surface.triangle_count()
                );
                entity_commands.insert((GeneratedSurface(surface), PendingUpload));
            }
            Err(SurfaceError::Cancelled) => debug!("surface build for {entity} cancelled"),
            Err(err) => warn!("surface build for {entity} failed: {err}"),
        }
    }
}

/// Uploads a [`GeneratedSurface`] into a Bevy [`Mesh3d`], then removes [`PendingUpload`].
fn upload_surface(
    mut commands: Commands,
    query: Query<(Entity, &GeneratedSurface), With<PendingUpload>>,
    mut meshes: ResMut<Assets<Mesh>>,
) {
    for (entity, generated) in query.iter() {
        commands
            .entity(entity)
            .insert(Mesh3d(meshes.add(to_bevy_mesh(&generated.0))))
            .remove::<PendingUpload>();
    }
}

/// Converts a [`SurfaceMesh`] into an indexed triangle-list Bevy [`Mesh`].
pub fn to_bevy_mesh(surface: &SurfaceMesh) -> Mesh {
    let positions: Vec<[f32; 3]> = surface.vertices.iter().map(|v| [v.x, v.y, v.z]).collect();
    let normals: Vec<[f32; 3]> = surface.normals.iter().map(|n| [n.x, n.y, n.z]).collect();
    let indices: Vec<u32> = surface.tris.iter().flatten().copied().collect();

    let mut bevy_mesh = Mesh::new(
        PrimitiveTopology::TriangleList,
        RenderAssetUsages::RENDER_WORLD,
    );
    bevy_mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
    bevy_mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
    bevy_mesh.insert_indices(Indices::U32(indices));
    bevy_mesh
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        atom::Element,
        surface::plan_grid,
        types::{Point, Vector},
    };

    #[test]
    fn converts_to_indexed_triangle_list() {
        let mut surface = SurfaceMesh::new_empty();
        surface.push_vertex(Point::new(0.0, 0.0, 0.0), 0);
        surface.push_vertex(Point::new(1.0, 0.0, 0.0), 0);
        surface.push_vertex(Point::new(0.0, 1.0, 0.0), 0);
        surface.triangle_from_verts(0, 1, 2).unwrap();
        surface.compute_normals();
        assert_eq!(surface.normals[0], Vector::new(0.0, 0.0, 1.0));

        let mesh = to_bevy_mesh(&surface);
        assert_eq!(mesh.count_vertices(), 3);
        match mesh.indices() {
            Some(Indices::U32(indices)) => assert_eq!(indices, &vec![0, 1, 2]),
            other => panic!("unexpected indices {other:?}"),
        }
    }

    fn headless_app() -> App {
        let mut app = App::new();
        app.add_plugins((
            MinimalPlugins,
            bevy::asset::AssetPlugin::default(),
            MolecularSurfacePlugin::default(),
        ))
        .init_asset::<Mesh>();
        app
    }

    fn single_atom_unit() -> SurfaceUnit {
        let atoms = vec![Atom::new(Point::origin(), Element::C)];
        let props = SurfaceProps {
            resolution_factor: 3,
            probe_radius: 0.0,
            iso_value: 0.5,
        };
        let spacing = plan_grid(&Box3D::from_atoms(&atoms).unwrap(), &props).unwrap();
        SurfaceUnit::new(atoms, spacing, props).with_size_theme(SizeTheme::Uniform(2.0))
    }

    /// Runs frames until `done` holds, giving the async pool time between frames.
    fn update_until(app: &mut App, done: impl Fn(&World) -> bool) {
        for _ in 0..2000 {
            app.update();
            if done(app.world()) {
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        panic!("surface pipeline did not settle");
    }

    fn generated(world: &World, entity: Entity) -> &SurfaceMesh {
        &world.get::<GeneratedSurface>(entity).unwrap().0
    }

    fn is_settled(world: &World, entity: Entity) -> bool {
        let e = world.entity(entity);
        e.contains::<GeneratedSurface>()
            && !e.contains::<QueuedSurface>()
            && !e.contains::<ComputeTask>()
            && !e.contains::<PendingUpload>()
    }

    #[cfg(feature = "auto_queue")]
    #[test]
    fn unit_is_built_and_uploaded() {
        let mut app = headless_app();
        let entity = app.world_mut().spawn(single_atom_unit()).id();

        update_until(&mut app, |w| w.entity(entity).contains::<Mesh3d>());

        let world = app.world();
        assert!(is_settled(world, entity));
        let surface = generated(world, entity);
        assert!(!surface.is_empty());
        let handle = &world.get::<Mesh3d>(entity).unwrap().0;
        let mesh = world.resource::<Assets<Mesh>>().get(handle).unwrap();
        assert_eq!(mesh.count_vertices(), surface.vertex_count());
    }

    #[cfg(feature = "auto_queue")]
    #[test]
    fn changing_a_unit_cancels_its_running_build() {
        let mut app = headless_app();
        app.world_mut()
            .resource_mut::<MolecularSurfaceConfig>()
            .max_tasks_per_frame = 0;
        let entity = app.world_mut().spawn(single_atom_unit()).id();
        app.update();
        assert!(app.world().entity(entity).contains::<QueuedSurface>());

        // A build that never finishes on its own.
        let token = CancellationToken::new();
        let task = AsyncComputeTaskPool::get().spawn(future::pending::<Result<SurfaceMesh>>());
        app.world_mut()
            .entity_mut(entity)
            .remove::<QueuedSurface>()
            .insert(ComputeTask {
                task,
                token: token.clone(),
            });

        app.world_mut()
            .get_mut::<SurfaceUnit>(entity)
            .unwrap()
            .props
            .iso_value = 0.4;
        app.update();

        assert!(token.is_cancelled());
        let e = app.world().entity(entity);
        assert!(e.contains::<QueuedSurface>());
        assert!(!e.contains::<ComputeTask>());

        app.world_mut()
            .resource_mut::<MolecularSurfaceConfig>()
            .max_tasks_per_frame = 4;
        update_until(&mut app, |w| is_settled(w, entity));
        assert!(app.world().entity(entity).contains::<Mesh3d>());
    }

    #[cfg(feature = "auto_queue")]
    #[test]
    fn cancelled_build_is_dropped() {
        let mut app = headless_app();
        let task = AsyncComputeTaskPool::get()
            .spawn(async { Err::<SurfaceMesh, _>(SurfaceError::Cancelled) });
        let entity = app
            .world_mut()
            .spawn(ComputeTask {
                task,
                token: CancellationToken::new(),
            })
            .id();

        update_until(&mut app, |w| !w.entity(entity).contains::<ComputeTask>());

        let e = app.world().entity(entity);
        assert!(!e.contains::<GeneratedSurface>());
        assert!(!e.contains::<PendingUpload>());
        assert!(!e.contains::<Mesh3d>());
    }

    #[cfg(feature = "auto_queue")]
    #[test]
    fn rebuild_reuses_the_previous_surface() {
        let mut app = headless_app();
        let entity = app.world_mut().spawn(single_atom_unit()).id();
        update_until(&mut app, |w| is_settled(w, entity));

        let first = generated(app.world(), entity).clone();
        let storage = generated(app.world(), entity).vertices.as_ptr();

        app.world_mut()
            .get_mut::<SurfaceUnit>(entity)
            .unwrap()
            .set_changed();
        update_until(&mut app, |w| is_settled(w, entity));

        let second = generated(app.world(), entity);
        assert_eq!(*second, first);
        assert_eq!(second.vertices.as_ptr(), storage);
    }
}
