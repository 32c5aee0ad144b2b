use bevy::prelude::*;
use planet_voxels::{
    terrain::{assign_levels, extrude},
    BiomeConfig, ChunkGrid, DigRequest, DiscardMeshes, GridConfig, Icosphere, NoiseField, Planet,
    PlanetConfig, ISO_LEVEL,
};

#[test]
fn uniform_noise_lifts_every_triangle_one_level() {
    let sphere = Icosphere::new(0, 1.);
    assert_eq!(12, sphere.vertex_count());
    assert_eq!(20, sphere.triangle_count());

    let biome = BiomeConfig {
        number_of_levels: 1,
        extrusion_amount: 1.,
        ..default()
    };
    let infos = assign_levels(&sphere, &NoiseField::constant(0.5), &biome, 1337);
    assert!(infos.iter().all(|info| info.level == 1));

    let mesh = extrude(&sphere, &infos, &biome);
    assert_eq!(0, mesh.wall_triangles);
    assert_eq!(20, mesh.triangles.len());
    assert_eq!(12, mesh.vertices.len());
    assert_eq!(mesh.vertices.len(), mesh.colors.len());

    for (extruded, original) in mesh.triangles.iter().zip(&sphere.triangles) {
        for (&e, &o) in extruded.iter().zip(original) {
            let (e, o) = (mesh.vertices[e as usize], sphere.vertices[o as usize]);
            // Every neighbour is on the same level, so the averaged normal is radial
            assert!((e.distance(o) - 1.).abs() < 1e-5);
            assert!((e.length() - 2.).abs() < 1e-5);
            assert!(e.normalize().distance(o.normalize()) < 1e-5);
        }
    }
    assert_eq!(biome.gradient.evaluate(1.), mesh.colors[0]);
}

#[test]
fn planet_surface_can_be_dug() {
    let biome = BiomeConfig {
        number_of_levels: 2,
        extrusion_amount: 0.25,
        ..default()
    };
    let planet = Planet::generate(
        PlanetConfig {
            subdivisions: 2,
            radius: 3.,
            seed: 42,
            apply_extrusion: true,
        },
        Some(biome),
    )
    .unwrap();
    let surface = planet.reference_surface();
    assert_eq!(planet.mesh().triangles.len(), surface.len());

    let center = Vec3::new(20., -5., 0.);
    let mut grid = ChunkGrid::new(
        GridConfig {
            planet_radius: 3.5,
            chunk_size: 4.,
            resolution: 8,
            ..default()
        },
        center,
    )
    .unwrap();

    let mut ticks = 0;
    while !grid.is_idle() {
        let report = grid.tick(&surface, &mut DiscardMeshes);
        assert!(report.generated <= 3 && report.remeshed <= 5);
        ticks += 1;
        assert!(ticks < 1000);
    }
    assert!(grid.chunks().any(|chunk| !chunk.mesh().is_empty()));

    // The planet center is solid, far outside is empty
    let core = grid
        .chunks()
        .find(|chunk| chunk.contains_world_point(center))
        .map(|chunk| chunk.density_at_world(center));
    assert!(core.is_some_and(|d| d < ISO_LEVEL));

    let hit = grid
        .raycast(center + Vec3::new(0.1, 10., 0.05), Vec3::NEG_Y, 20.)
        .unwrap();
    let altitude = hit.point.distance(center);
    assert!(altitude > 2.8 && altitude < 3.8, "hit at altitude {altitude}");

    let modified = grid.dig(&DigRequest {
        point: hit.point,
        radius: 1.,
        strength: 2.,
        is_digging: true,
    });
    assert!(modified > 0);
    let report = grid.tick(&surface, &mut DiscardMeshes);
    assert_eq!(modified.min(5), report.remeshed);
}
