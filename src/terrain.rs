//! Terraced elevation for an icosphere.
//!
//! Every triangle of the base sphere is assigned a discrete elevation level from spherical noise
//! and pushed outwards by that many steps. Where two neighbouring triangles end up on different
//! levels the gap between them is closed with vertical wall quads, one per level boundary.

use crate::{
    biome::{BiomeConfig, Rgba},
    icosphere::{EdgeKey, Icosphere},
    noise_field::{to_unit_range, NoiseSampler},
};

use bevy::{
    prelude::*,
    utils::{HashMap, HashSet},
};
use rayon::prelude::*;
use smallvec::SmallVec;

/// A read-only snapshot of one triangle of the base sphere, used by decoration placement
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriangleInfo {
    /// The vertex indices in the base sphere
    pub corners: [u32; 3],
    /// The corner positions on the base sphere
    pub positions: [Vec3; 3],
    /// The centroid
    pub center: Vec3,
    /// The average of the radial directions of the corners
    pub normal: Vec3,
    /// The elevation level, in [0, number_of_levels]
    pub level: u32,
}

impl TriangleInfo {
    fn new(sphere: &Icosphere, corners: [u32; 3], level: u32) -> Self {
        let positions = corners.map(|i| sphere.vertices[i as usize]);
        let center = (positions[0] + positions[1] + positions[2]) / 3.;
        let normal = positions
            .iter()
            .map(|p| p.normalize_or_zero())
            .sum::<Vec3>()
            .normalize_or_zero();

        Self {
            corners,
            positions,
            center,
            normal,
            level,
        }
    }
}

/// Turn a noise value in [-1, 1] into an elevation level in [0, levels]
pub fn elevation_level(noise: f32, levels: u32) -> u32 {
    if levels == 0 {
        return 0;
    }
    let scaled = (to_unit_range(noise) * levels as f32).round();
    if scaled.is_nan() {
        return 0;
    }
    (scaled as u32).min(levels)
}

/// Sample the elevation noise at every triangle center of the sphere
pub fn assign_levels<S>(
    sphere: &Icosphere,
    noise: &S,
    biome: &BiomeConfig,
    seed: i32,
) -> Vec<TriangleInfo>
where
    S: NoiseSampler + Sync,
{
    let infos: Vec<TriangleInfo> = sphere
        .triangles
        .par_iter()
        .map(|&corners| {
            let mut info = TriangleInfo::new(sphere, corners, 0);
            let value = noise.sample_spherical(info.center, biome.noise_size, seed);
            info.level = elevation_level(value, biome.number_of_levels);
            info
        })
        .collect();

    let mut distribution = vec![0usize; biome.number_of_levels as usize + 1];
    for info in &infos {
        distribution[info.level as usize] += 1;
    }
    debug!("Elevation distribution (triangles per level): {distribution:?}");

    infos
}

/// The extruded planet surface
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TerrainMesh {
    /// The vertex positions
    pub vertices: Vec<Vec3>,
    /// One color per vertex, empty if the mesh was not extruded
    pub colors: Vec<Rgba>,
    /// The surface triangles followed by the wall triangles
    pub triangles: Vec<[u32; 3]>,
    /// The number of wall triangles at the end of `triangles`
    pub wall_triangles: usize,
}

impl TerrainMesh {
    /// The base sphere as is, without colors or walls
    pub fn from_icosphere(sphere: &Icosphere) -> Self {
        Self {
            vertices: sphere.vertices.clone(),
            colors: Vec::new(),
            triangles: sphere.triangles.clone(),
            wall_triangles: 0,
        }
    }

    /// The flat index list, three indices per triangle
    pub fn indices(&self) -> Vec<u32> {
        self.triangles.iter().flatten().copied().collect()
    }

    /// The triangles that make up the top of each terrace
    pub fn surface(&self) -> &[[u32; 3]] {
        &self.triangles[..self.wall_start()]
    }

    /// The triangles closing the gaps between terraces
    pub fn walls(&self) -> &[[u32; 3]] {
        &self.triangles[self.wall_start()..]
    }

    fn wall_start(&self) -> usize {
        self.triangles.len().saturating_sub(self.wall_triangles)
    }
}

/// Builds the extruded vertices, creating each (vertex, level) pair once
struct Extruder<'a> {
    sphere: &'a Icosphere,
    infos: &'a [TriangleInfo],
    biome: &'a BiomeConfig,
    vertex_triangles: Vec<SmallVec<[u32; 6]>>,
    cache: HashMap<(u32, u32), u32>,
    vertices: Vec<Vec3>,
    colors: Vec<Rgba>,
}

impl<'a> Extruder<'a> {
    fn new(sphere: &'a Icosphere, infos: &'a [TriangleInfo], biome: &'a BiomeConfig) -> Self {
        let mut vertex_triangles = vec![SmallVec::new(); sphere.vertex_count()];
        for (t, info) in infos.iter().enumerate() {
            for &v in &info.corners {
                vertex_triangles[v as usize].push(t as u32);
            }
        }

        Self {
            sphere,
            infos,
            biome,
            vertex_triangles,
            cache: HashMap::default(),
            vertices: Vec::new(),
            colors: Vec::new(),
        }
    }

    fn vertex(&mut self, vertex: u32, level: u32) -> u32 {
        if let Some(&index) = self.cache.get(&(vertex, level)) {
            return index;
        }

        let original = self.sphere.vertices[vertex as usize];
        let mut direction = self.vertex_triangles[vertex as usize]
            .iter()
            .map(|&t| &self.infos[t as usize])
            .filter(|info| info.level == level)
            .map(|info| info.normal)
            .sum::<Vec3>()
            .normalize_or_zero();
        if direction == Vec3::ZERO {
            direction = original.normalize_or_zero();
        }

        let index = self.vertices.len() as u32;
        self.vertices
            .push(original + direction * (level as f32 * self.biome.extrusion_amount));
        self.colors.push(self.biome.level_color(level));
        self.cache.insert((vertex, level), index);
        index
    }

    fn duplicate(&mut self, index: u32, color: Rgba) -> u32 {
        self.vertices.push(self.vertices[index as usize]);
        self.colors.push(color);
        (self.vertices.len() - 1) as u32
    }
}

/// Push every triangle outwards by its elevation level and close the gaps with walls.
///
/// Surface triangles keep the winding of the base sphere. Walls are built along the directed edge
/// of the lower triangle and face towards it, so they face outwards from the raised terrace.
pub fn extrude(sphere: &Icosphere, infos: &[TriangleInfo], biome: &BiomeConfig) -> TerrainMesh {
    let mut extruder = Extruder::new(sphere, infos, biome);
    let mut triangles = Vec::with_capacity(infos.len() * 2);

    for info in infos {
        let [a, b, c] = info.corners;
        triangles.push([
            extruder.vertex(a, info.level),
            extruder.vertex(b, info.level),
            extruder.vertex(c, info.level),
        ]);
    }

    let mut edges: HashMap<EdgeKey, SmallVec<[(u32, u32, u32); 2]>> = HashMap::default();
    for (t, info) in infos.iter().enumerate() {
        let [a, b, c] = info.corners;
        for (from, to) in [(a, b), (b, c), (c, a)] {
            edges
                .entry(EdgeKey::new(from, to))
                .or_default()
                .push((t as u32, from, to));
        }
    }

    let surface_count = triangles.len();
    let mut built: HashSet<(u32, u32, u32, u32)> = HashSet::default();

    // Edges are visited in triangle order so the output does not depend on hash order
    for info in infos {
        let [a, b, c] = info.corners;
        for key in [EdgeKey::new(a, b), EdgeKey::new(b, c), EdgeKey::new(c, a)] {
            let Some(shared) = edges.get(&key) else {
                continue;
            };
            let &[first, second] = shared.as_slice() else {
                continue;
            };
            let (first_level, second_level) = (
                infos[first.0 as usize].level,
                infos[second.0 as usize].level,
            );
            if first_level == second_level {
                continue;
            }

            let (low, high_level) = if first_level < second_level {
                (first, second_level)
            } else {
                (second, first_level)
            };
            let (_, from, to) = low;
            let low_level = infos[low.0 as usize].level;

            for level in low_level..high_level {
                if !built.insert((EdgeKey::min(&key), EdgeKey::max(&key), level, level + 1)) {
                    continue;
                }

                let a_low = extruder.vertex(from, level);
                let b_low = extruder.vertex(to, level);
                let a_high = extruder.vertex(from, level + 1);
                let b_high = extruder.vertex(to, level + 1);

                let color = biome.level_color(level);
                let a_low = extruder.duplicate(a_low, color);
                let b_low = extruder.duplicate(b_low, color);
                let a_high = extruder.duplicate(a_high, color);
                let b_high = extruder.duplicate(b_high, color);

                triangles.push([a_low, a_high, b_low]);
                triangles.push([b_low, a_high, b_high]);
            }
        }
    }

    let wall_triangles = triangles.len() - surface_count;
    debug!(
        "Extruded {} triangles into {} vertices with {wall_triangles} wall triangles",
        infos.len(),
        extruder.vertices.len(),
    );

    TerrainMesh {
        vertices: extruder.vertices,
        colors: extruder.colors,
        triangles,
        wall_triangles,
    }
}

#[cfg(test)]
fn strip(levels: [u32; 2]) -> (Icosphere, Vec<TriangleInfo>) {
    // Two triangles on the +Z side of a unit sphere sharing the edge 1-2
    let sphere = Icosphere {
        vertices: vec![
            Vec3::new(-0.3, -0.3, 1.).normalize(),
            Vec3::new(0.3, -0.3, 1.).normalize(),
            Vec3::new(0., 0.3, 1.).normalize(),
            Vec3::new(0.6, 0.3, 1.).normalize(),
        ],
        triangles: vec![[0, 1, 2], [1, 3, 2]],
    };
    let infos = sphere
        .triangles
        .iter()
        .zip(levels)
        .map(|(&corners, level)| TriangleInfo::new(&sphere, corners, level))
        .collect();
    (sphere, infos)
}

#[cfg(test)]
fn face_normal(mesh: &TerrainMesh, [a, b, c]: [u32; 3]) -> Vec3 {
    let (a, b, c) = (
        mesh.vertices[a as usize],
        mesh.vertices[b as usize],
        mesh.vertices[c as usize],
    );
    (b - a).cross(c - a)
}

#[test]
fn test_elevation_level() {
    assert_eq!(0, elevation_level(0.7, 0));
    assert_eq!(0, elevation_level(-1., 4));
    assert_eq!(2, elevation_level(0., 4));
    assert_eq!(4, elevation_level(1., 4));
    assert_eq!(4, elevation_level(3., 4));
    assert_eq!(1, elevation_level(0.5, 1));
    assert_eq!(0, elevation_level(f32::NAN, 4));
}

#[test]
fn test_no_levels_means_no_walls() {
    use crate::noise_field::{NoiseField, NoiseSettings};

    let sphere = Icosphere::new(2, 1.);
    let biome = BiomeConfig {
        number_of_levels: 0,
        ..default()
    };
    let infos = assign_levels(&sphere, &NoiseField::new(&NoiseSettings::default(), 5), &biome, 5);
    assert!(infos.iter().all(|info| info.level == 0));

    let mesh = extrude(&sphere, &infos, &biome);
    assert_eq!(0, mesh.wall_triangles);
    assert_eq!(sphere.triangle_count(), mesh.triangles.len());
    assert_eq!(mesh.vertices.len(), mesh.colors.len());
    assert_eq!(sphere.vertex_count(), mesh.vertices.len());
    for v in &mesh.vertices {
        assert!((v.length() - 1.).abs() < 1e-5);
    }
}

#[test]
fn test_wall_count_past_the_end() {
    let mut mesh = TerrainMesh::from_icosphere(&Icosphere::new(0, 1.));
    mesh.wall_triangles = 100;
    assert!(mesh.surface().is_empty());
    assert_eq!(20, mesh.walls().len());
}

#[test]
fn test_levels_stay_in_range() {
    use crate::noise_field::{NoiseField, NoiseSettings};

    let sphere = Icosphere::new(3, 10.);
    let biome = BiomeConfig {
        number_of_levels: 6,
        ..default()
    };
    let infos = assign_levels(&sphere, &NoiseField::new(&NoiseSettings::default(), -3), &biome, -3);
    assert_eq!(sphere.triangle_count(), infos.len());
    assert!(infos.iter().all(|info| info.level <= 6));

    let mesh = extrude(&sphere, &infos, &biome);
    for &[a, b, c] in &mesh.triangles {
        assert!([a, b, c].iter().all(|&i| (i as usize) < mesh.vertices.len()));
    }
    assert_eq!(mesh.vertices.len(), mesh.colors.len());
}

#[test]
fn test_wall_strip() {
    let (sphere, infos) = strip([1, 3]);
    let biome = BiomeConfig {
        number_of_levels: 4,
        extrusion_amount: 0.5,
        ..default()
    };
    let mesh = extrude(&sphere, &infos, &biome);

    // Two quads, L to L+1 and L+1 to L+2, each emitted once
    assert_eq!(4, mesh.wall_triangles);
    assert_eq!(2, mesh.surface().len());
    assert_eq!(biome.level_color(1), mesh.colors[mesh.walls()[0][0] as usize]);
    assert_eq!(biome.level_color(2), mesh.colors[mesh.walls()[2][0] as usize]);

    // The walls face the lower triangle
    let low_center = infos[0].center;
    let shared_mid = (sphere.vertices[1] + sphere.vertices[2]) * 0.5;
    let towards_low = (low_center - shared_mid).normalize();
    for &wall in mesh.walls() {
        assert!(face_normal(&mesh, wall).dot(towards_low) > 0.);
    }
}

#[test]
fn test_walls_are_emitted_once_per_level_boundary() {
    let (sphere, infos) = strip([2, 0]);
    let biome = BiomeConfig::default();
    let mesh = extrude(&sphere, &infos, &biome);
    assert_eq!(4, mesh.wall_triangles);
    // Each wall quad owns its four vertices
    let mut used: Vec<u32> = mesh.walls().iter().flatten().copied().collect();
    used.sort_unstable();
    used.dedup();
    assert_eq!(8, used.len());
}

#[test]
fn test_surface_faces_outwards() {
    use crate::noise_field::{NoiseField, NoiseSettings};

    let sphere = Icosphere::new(2, 5.);
    let biome = BiomeConfig {
        number_of_levels: 3,
        extrusion_amount: 0.3,
        ..default()
    };
    let infos = assign_levels(&sphere, &NoiseField::new(&NoiseSettings::default(), 11), &biome, 11);
    let mesh = extrude(&sphere, &infos, &biome);
    for (&triangle, info) in mesh.surface().iter().zip(&infos) {
        assert!(face_normal(&mesh, triangle).dot(info.normal) > 0.);
    }
}
