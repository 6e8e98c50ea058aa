use bevy::prelude::*;
use bevy_molecular_surface::{
    Atom, Box3D, Element, MolecularSurfacePlugin, SurfaceProps, SurfaceUnit, plan_grid,
    types::Point,
};
use bevy_panorbit_camera::{PanOrbitCamera, PanOrbitCameraPlugin};

const ATOMS_PER_SIDE: usize = 10;

fn main() {
    App::new()
        .add_plugins((
            DefaultPlugins,
            MolecularSurfacePlugin::default(),
            PanOrbitCameraPlugin,
        ))
        .add_systems(Startup, setup)
        .add_systems(Update, adjust_surface)
        .run();
}

/// A cubic lattice of carbons, large enough that rebuilds take a while.
fn lattice() -> Vec<Atom> {
    let mut atoms = Vec::with_capacity(ATOMS_PER_SIDE.pow(3));
    for x in 0..ATOMS_PER_SIDE {
        for y in 0..ATOMS_PER_SIDE {
            for z in 0..ATOMS_PER_SIDE {
                let p = Point::new(x as f32, y as f32, z as f32) * 2.5;
                atoms.push(Atom::new(p, Element::C));
            }
        }
    }
    atoms
}

fn setup(mut commands: Commands, mut materials: ResMut<Assets<StandardMaterial>>) {
    bevy::log::info!("Up/Down: resolution, Left/Right: iso value");

    let center = ATOMS_PER_SIDE as f32 * 1.25;
    commands.spawn((
        Camera3d::default(),
        PanOrbitCamera {
            focus: Vec3::splat(center),
            ..default()
        },
        Transform::from_xyz(-30.0, 50.0, -30.0).looking_at(Vec3::splat(center), Vec3::Y),
    ));

    commands.spawn((
        DirectionalLight::default(),
        Transform::default().with_rotation(Quat::from_rotation_x(-45.0_f32.to_radians())),
    ));

    let atoms = lattice();
    let props = SurfaceProps::default();
    let Some(spacing) = Box3D::from_atoms(&atoms).and_then(|b| plan_grid(&b, &props).ok()) else {
        return;
    };

    commands.spawn((
        SurfaceUnit::new(atoms, spacing, props),
        MeshMaterial3d(materials.add(Color::srgb(0.4, 0.8, 0.4))),
    ));
}

/// Every change re-queues the unit and cancels the build in flight.
fn adjust_surface(keys: Res<ButtonInput<KeyCode>>, mut units: Query<&mut SurfaceUnit>) {
    let change: fn(&mut SurfaceProps) = if keys.just_pressed(KeyCode::ArrowUp) {
        |p: &mut SurfaceProps| p.resolution_factor = (p.resolution_factor + 1).min(9)
    } else if keys.just_pressed(KeyCode::ArrowDown) {
        |p: &mut SurfaceProps| p.resolution_factor = p.resolution_factor.saturating_sub(1).max(3)
    } else if keys.just_pressed(KeyCode::ArrowRight) {
        |p: &mut SurfaceProps| p.iso_value = (p.iso_value + 0.05).min(0.95)
    } else if keys.just_pressed(KeyCode::ArrowLeft) {
        |p: &mut SurfaceProps| p.iso_value = (p.iso_value - 0.05).max(0.05)
    } else {
        return;
    };

    for mut unit in &mut units {
        change(&mut unit.props);
        let Some(structure) = Box3D::from_atoms(&unit.atoms) else {
            continue;
        };
        match plan_grid(&structure, &unit.props) {
            Ok(spacing) => unit.spacing = spacing,
            Err(err) => bevy::log::warn!("cannot plan surface grid: {err}"),
        }
        bevy::log::info!(
            "resolution {} iso {:.2}",
            unit.props.resolution_factor,
            unit.props.iso_value
        );
    }
}
