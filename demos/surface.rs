use bevy::prelude::*;
use bevy_infinite_grid::{InfiniteGridBundle, InfiniteGridPlugin};
use bevy_molecular_surface::{
    Atom, Box3D, Element, MolecularSurfacePlugin, SurfaceProps, SurfaceUnit, plan_grid,
    types::Point,
};
use bevy_panorbit_camera::{PanOrbitCamera, PanOrbitCameraPlugin};

fn main() {
    App::new()
        .add_plugins((
            DefaultPlugins,
            MolecularSurfacePlugin::default(),
            PanOrbitCameraPlugin,
            InfiniteGridPlugin,
        ))
        .add_systems(Startup, setup)
        .run();
}

/// A helical backbone fragment, `residues` long, repeating N, CA, C, O.
fn helix(residues: usize) -> Vec<Atom> {
    const BACKBONE: [&str; 4] = ["N", "CA", "C", "O"];
    (0..residues * BACKBONE.len())
        .map(|i| {
            // Atom names start with the element symbol.
            let element = Element::from_symbol(&BACKBONE[i % BACKBONE.len()][..1]);
            let angle = (i as f32 * 25.0).to_radians();
            let radius = if i % 4 == 3 { 3.3 } else { 2.3 };
            let position = Point::new(
                radius * angle.cos(),
                i as f32 * 0.375,
                radius * angle.sin(),
            );
            Atom::new(position, element)
        })
        .collect()
}

fn setup(mut commands: Commands, mut materials: ResMut<Assets<StandardMaterial>>) {
    bevy::log::info!("Molecular Surface Example");

    commands.spawn(InfiniteGridBundle::default());

    commands.spawn((
        Camera3d::default(),
        PanOrbitCamera {
            button_orbit: MouseButton::Right,
            button_pan: MouseButton::Middle,
            ..default()
        },
        Transform::from_xyz(30.0, 20.0, 30.0).looking_at(Vec3::new(0.0, 8.0, 0.0), Vec3::Y),
    ));

    commands.spawn((
        DirectionalLight {
            illuminance: light_consts::lux::OVERCAST_DAY,
            ..Default::default()
        },
        Transform::default().with_rotation(Quat::from_rotation_x(-45.0_f32.to_radians())),
    ));

    let atoms = helix(12);
    let props = SurfaceProps {
        resolution_factor: 6,
        ..Default::default()
    };
    let Some(structure) = Box3D::from_atoms(&atoms) else {
        return;
    };
    let spacing = match plan_grid(&structure, &props) {
        Ok(spacing) => spacing,
        Err(err) => {
            bevy::log::error!("cannot plan surface grid: {err}");
            return;
        }
    };

    // Two units sharing one grid, so their surfaces line up.
    let (first, second) = atoms.split_at(atoms.len() / 2);
    for (unit, color) in [
        (first, Color::srgb(0.3, 0.5, 0.9)),
        (second, Color::srgb(0.9, 0.5, 0.3)),
    ] {
        commands.spawn((
            SurfaceUnit::new(unit.to_vec(), spacing, props),
            MeshMaterial3d(materials.add(StandardMaterial {
                base_color: color,
                ..Default::default()
            })),
        ));
    }
}
