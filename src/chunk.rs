use crate::{
    marching_cubes::{extract, SurfaceMesh},
    surface::ReferenceSurface,
    DENSITY_SCALE, SURFACE_DENSITY,
};

use bevy::prelude::*;
use fast_surface_nets::ndshape::{RuntimeShape, Shape};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// The integer position of a chunk in the grid. Chunk `[0, 0, 0]` is centered on the planet
#[derive(
    Component,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Debug,
    Deref,
    Hash,
    Serialize,
    Deserialize,
)]
pub struct ChunkCoord(pub(crate) [i32; 3]);

impl From<[i32; 3]> for ChunkCoord {
    fn from(value: [i32; 3]) -> Self {
        Self(value)
    }
}

impl ChunkCoord {
    /// Construct a ChunkCoord from the x, y and z coordinates
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self([x, y, z])
    }

    /// The world position of the center of this chunk
    pub fn center(&self, chunk_size: f32, planet_center: Vec3) -> Vec3 {
        planet_center + IVec3::from_array(self.0).as_vec3() * chunk_size
    }

    /// Get the coordinate of the chunk whose cell contains this world position
    pub fn from_world(pos: Vec3, chunk_size: f32, planet_center: Vec3) -> Self {
        let p = ((pos - planet_center) / chunk_size).round();
        Self([p.x as i32, p.y as i32, p.z as i32])
    }
}

/// Where a chunk is in its lifecycle. Chunks waiting to be generated are not represented, they
/// only exist as a coordinate in the generation queue
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChunkState {
    /// The density field is being filled in
    Generating,
    /// The densities changed since the last mesh was built
    Dirty,
    /// The mesh is being rebuilt
    Remeshing,
    /// The mesh matches the densities
    Meshed,
}

/// A cube of space holding a density grid of `resolution + 1` samples per side and the mesh
/// extracted from it. Mesh positions are relative to the chunk center.
#[derive(Clone, Debug)]
pub struct VoxelChunk {
    coord: ChunkCoord,
    center: Vec3,
    resolution: u32,
    size: f32,
    densities: Vec<f32>,
    state: ChunkState,
    mesh: SurfaceMesh,
}

/// The world position of a grid sample
fn sample_position(center: Vec3, resolution: u32, size: f32, [x, y, z]: [u32; 3]) -> Vec3 {
    center + (Vec3::new(x as f32, y as f32, z as f32) / resolution as f32 - 0.5) * size
}

/// The density change of a spherical brush at `distance` from its center, none outside it
fn brush_falloff(distance: f32, radius: f32) -> Option<f32> {
    if distance >= radius {
        return None;
    }
    let falloff = 1. - distance / radius;
    Some(falloff * falloff)
}

impl VoxelChunk {
    /// Create a chunk filled with empty space. `resolution` is the number of cubes per side
    pub fn new(coord: ChunkCoord, center: Vec3, resolution: u32, size: f32) -> Self {
        let resolution = resolution.max(1);
        let samples = (resolution as usize + 1).pow(3);
        Self {
            coord,
            center,
            resolution,
            size,
            densities: vec![SURFACE_DENSITY + DENSITY_SCALE; samples],
            state: ChunkState::Generating,
            mesh: SurfaceMesh::default(),
        }
    }

    /// The position of the chunk in the grid
    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// The world position of the chunk center
    pub fn center(&self) -> Vec3 {
        self.center
    }

    /// The number of cubes per side
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// The length of a side in world units
    pub fn size(&self) -> f32 {
        self.size
    }

    /// The distance between neighbouring samples
    pub fn voxel_size(&self) -> f32 {
        self.size / self.resolution as f32
    }

    /// The lifecycle state
    pub fn state(&self) -> ChunkState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ChunkState) {
        self.state = state;
    }

    /// Whether the mesh is out of date
    pub fn is_dirty(&self) -> bool {
        self.state == ChunkState::Dirty
    }

    /// The shape of the density grid, x changes fastest
    pub fn shape(&self) -> RuntimeShape<u32, 3> {
        RuntimeShape::<u32, 3>::new([self.resolution + 1; 3])
    }

    /// The world space bounds as (min, max)
    pub fn bounds(&self) -> (Vec3, Vec3) {
        let half = Vec3::splat(self.size * 0.5);
        (self.center - half, self.center + half)
    }

    /// The world position of a grid sample
    pub fn world_position(&self, index: [u32; 3]) -> Vec3 {
        sample_position(self.center, self.resolution, self.size, index)
    }

    /// Convert a world position to fractional grid coordinates
    pub fn world_to_grid(&self, pos: Vec3) -> Vec3 {
        ((pos - self.center) / self.size + 0.5) * self.resolution as f32
    }

    /// The density of a grid sample, 0 outside the grid
    pub fn density(&self, index: [u32; 3]) -> f32 {
        if index.iter().any(|&i| i > self.resolution) {
            return 0.;
        }
        self.densities[self.shape().linearize(index) as usize]
    }

    /// The density of the sample at or below a world position, 0 outside the grid
    pub fn density_at_world(&self, pos: Vec3) -> f32 {
        let grid = self.world_to_grid(pos).floor();
        if !grid.is_finite() || grid.min_element() < 0. {
            return 0.;
        }
        self.density([grid.x as u32, grid.y as u32, grid.z as u32])
    }

    /// Whether a world position lies within the chunk, including its faces
    pub fn contains_world_point(&self, pos: Vec3) -> bool {
        ((pos - self.center).abs() - self.size * 0.5).max_element() <= 0.
    }

    /// Fill the density field from a reference surface given relative to `planet_center`
    pub fn initialize(&mut self, surface: &ReferenceSurface, planet_center: Vec3) {
        self.state = ChunkState::Generating;
        let shape = self.shape();
        let (center, resolution, size) = (self.center, self.resolution, self.size);

        self.densities.par_iter_mut().enumerate().for_each(|(i, density)| {
            let world = sample_position(center, resolution, size, shape.delinearize(i as u32));
            *density = surface.density(world - planet_center, Vec3::ZERO);
        });
        self.state = ChunkState::Dirty;
    }

    /// Add `signed_strength * (1 - d / radius)²` to every sample at a distance `d < radius` from
    /// `point`. Positive strengths erode, negative strengths fill. The chunk only becomes dirty
    /// if a sample changed
    pub fn modify_density(&mut self, point: Vec3, radius: f32, signed_strength: f32) -> bool {
        if !(radius > 0. && radius.is_finite() && signed_strength.is_finite()) {
            return false;
        }
        let shape = self.shape();
        let (center, resolution, size) = (self.center, self.resolution, self.size);

        let changed: usize = self
            .densities
            .par_iter_mut()
            .enumerate()
            .map(|(i, density)| {
                let world = sample_position(center, resolution, size, shape.delinearize(i as u32));
                match brush_falloff(world.distance(point), radius) {
                    Some(falloff) => {
                        *density += signed_strength * falloff;
                        1
                    }
                    None => 0,
                }
            })
            .sum();

        if changed > 0 {
            self.state = ChunkState::Dirty;
        }
        changed > 0
    }

    /// Blend interior samples within `radius` of `point` towards the average of their six
    /// neighbours, by `strength * (1 - d / radius)²` clamped to `[0, 1]`
    pub fn smooth(&mut self, point: Vec3, radius: f32, strength: f32) -> bool {
        if !(radius > 0. && radius.is_finite() && strength > 0. && strength.is_finite()) {
            return false;
        }
        let shape = self.shape();
        let (center, resolution, size) = (self.center, self.resolution, self.size);
        let source = &self.densities;
        let at = |p: [u32; 3]| source[shape.linearize(p) as usize];

        let mut smoothed = source.clone();
        let changed: usize = smoothed
            .par_iter_mut()
            .enumerate()
            .map(|(i, density)| {
                let [x, y, z] = shape.delinearize(i as u32);
                let interior = [x, y, z].iter().all(|&c| c >= 1 && c < resolution);
                if !interior {
                    return 0;
                }
                let world = sample_position(center, resolution, size, [x, y, z]);
                let Some(falloff) = brush_falloff(world.distance(point), radius) else {
                    return 0;
                };

                let average = (at([x - 1, y, z])
                    + at([x + 1, y, z])
                    + at([x, y - 1, z])
                    + at([x, y + 1, z])
                    + at([x, y, z - 1])
                    + at([x, y, z + 1]))
                    / 6.;
                let t = (strength * falloff).clamp(0., 1.);
                *density += (average - *density) * t;
                1
            })
            .sum();

        if changed > 0 {
            self.densities = smoothed;
            self.state = ChunkState::Dirty;
        }
        changed > 0
    }

    /// The raw density samples, x changes fastest
    pub fn densities(&self) -> &[f32] {
        &self.densities
    }

    /// Replace the density samples, for example with saved data. Samples of the wrong length are
    /// rejected
    pub fn set_densities(&mut self, densities: Vec<f32>) -> bool {
        if densities.len() != self.densities.len() {
            warn!(
                "Rejected {} density samples for chunk {:?}, expected {}",
                densities.len(),
                self.coord,
                self.densities.len(),
            );
            return false;
        }
        self.densities = densities;
        self.state = ChunkState::Dirty;
        true
    }

    /// Rebuild the mesh from the current densities
    pub fn remesh(&mut self, iso_level: f32) -> &SurfaceMesh {
        self.state = ChunkState::Remeshing;
        let origin = Vec3::splat(-self.size * 0.5);
        self.mesh = extract(&self.densities, &self.shape(), origin, self.voxel_size(), iso_level);
        self.state = ChunkState::Meshed;
        &self.mesh
    }

    /// The last extracted mesh, relative to the chunk center
    pub fn mesh(&self) -> &SurfaceMesh {
        &self.mesh
    }
}

#[cfg(test)]
fn test_chunk() -> VoxelChunk {
    let coord = ChunkCoord::new(1, 0, -1);
    VoxelChunk::new(coord, coord.center(4., Vec3::ZERO), 8, 4.)
}

#[test]
fn test_coord_round_trip() {
    let center = Vec3::new(10., 0., -3.);
    let coord = ChunkCoord::new(-2, 3, 0);
    let world = coord.center(8., center);
    assert_eq!(Vec3::new(-6., 24., -3.), world);
    assert_eq!(coord, ChunkCoord::from_world(world + Vec3::splat(3.9), 8., center));
}

#[test]
fn test_grid_positions() {
    let chunk = test_chunk();
    assert_eq!(Vec3::new(2., -2., -6.), chunk.world_position([0, 0, 0]));
    assert_eq!(Vec3::new(6., 2., -2.), chunk.world_position([8, 8, 8]));
    assert_eq!(Vec3::splat(4.), chunk.world_to_grid(chunk.center()));
    assert!(chunk.contains_world_point(Vec3::new(6., 2., -2.)));
    assert!(!chunk.contains_world_point(Vec3::new(6.1, 0., -4.)));
}

#[test]
fn test_out_of_range_density() {
    let chunk = test_chunk();
    assert_eq!(0., chunk.density([9, 0, 0]));
    assert_eq!(0., chunk.density_at_world(Vec3::new(100., 0., 0.)));
    assert_eq!(0., chunk.density_at_world(Vec3::new(1.9, -2., -6.)));
    assert_eq!(
        SURFACE_DENSITY + DENSITY_SCALE,
        chunk.density_at_world(Vec3::new(2.1, -1.9, -5.9))
    );
}

#[test]
fn test_dig_falloff() {
    let mut chunk = test_chunk();
    let before = chunk.densities().to_vec();
    let point = Vec3::new(4.2, 0.1, -3.7);
    let (radius, strength) = (1.6, 0.8);
    assert!(chunk.modify_density(point, radius, strength));
    assert!(chunk.is_dirty());

    let shape = chunk.shape();
    for (i, (&old, &new)) in before.iter().zip(chunk.densities()).enumerate() {
        let d = chunk.world_position(shape.delinearize(i as u32)).distance(point);
        if d < radius {
            let expected = strength * (1. - d / radius).powi(2);
            assert!((new - old - expected).abs() < 1e-5);
        } else {
            assert_eq!(old, new);
        }
    }
}

#[test]
fn test_fill_is_inverse_of_dig() {
    let mut chunk = test_chunk();
    let before = chunk.densities().to_vec();
    let point = Vec3::new(3., -1., -4.);
    chunk.modify_density(point, 2., 1.);
    chunk.modify_density(point, 2., -1.);
    for (old, new) in before.iter().zip(chunk.densities()) {
        assert!((old - new).abs() < 1e-5);
    }
}

#[test]
fn test_modification_outside_leaves_chunk_clean() {
    let mut chunk = test_chunk();
    chunk.set_state(ChunkState::Meshed);
    assert!(!chunk.modify_density(Vec3::splat(100.), 2., 1.));
    assert!(!chunk.modify_density(chunk.center(), 0., 1.));
    assert_eq!(ChunkState::Meshed, chunk.state());
}

#[test]
fn test_smooth() {
    let mut chunk = test_chunk();
    let shape = chunk.shape();
    let mut densities = vec![0.; shape.usize()];
    densities[shape.linearize([4, 4, 4]) as usize] = 6.;
    assert!(chunk.set_densities(densities));

    assert!(chunk.smooth(chunk.center(), 0.1, 1.));
    // The peak is replaced by the average of its neighbours, which are all zero
    assert_eq!(0., chunk.density([4, 4, 4]));
    assert_eq!(0., chunk.density([5, 4, 4]));

    let mut chunk = test_chunk();
    let mut densities = vec![0.; shape.usize()];
    densities[shape.linearize([4, 4, 4]) as usize] = 6.;
    chunk.set_densities(densities);
    assert!(chunk.smooth(chunk.center(), 10., 0.5));
    assert!(chunk.density([4, 4, 4]) < 6.);
    assert!(chunk.density([5, 4, 4]) > 0.);
    // Samples on the faces are never smoothed
    assert_eq!(0., chunk.density([0, 4, 4]));
}

#[test]
fn test_smooth_never_overshoots() {
    let shape = test_chunk().shape();
    let mut densities = vec![0.; shape.usize()];
    densities[shape.linearize([4, 4, 4]) as usize] = 6.;

    // A blend past the average stops at the average
    let mut chunk = test_chunk();
    chunk.set_densities(densities.clone());
    assert!(chunk.smooth(chunk.center(), 10., 3.));
    for p in [[4, 4, 4], [5, 4, 4], [4, 3, 4]] {
        let d = chunk.density(p);
        assert!((0. ..=6.).contains(&d), "density {d} at {p:?}");
    }
    assert_eq!(0., chunk.density([4, 4, 4]));
    assert_eq!(1., chunk.density([5, 4, 4]));

    // A negative blend leaves the samples as they are
    let mut chunk = test_chunk();
    chunk.set_densities(densities.clone());
    chunk.set_state(ChunkState::Meshed);
    assert!(!chunk.smooth(chunk.center(), 10., -2.));
    assert_eq!(densities.as_slice(), chunk.densities());
    assert_eq!(ChunkState::Meshed, chunk.state());
}

#[test]
fn test_set_densities_rejects_wrong_length() {
    let mut chunk = test_chunk();
    chunk.set_state(ChunkState::Meshed);
    assert!(!chunk.set_densities(vec![0.; 3]));
    assert_eq!(ChunkState::Meshed, chunk.state());
}

#[test]
fn test_initialize_and_remesh() {
    let sphere = crate::Icosphere::new(3, 3.);
    let surface = ReferenceSurface::new(&sphere.vertices, &sphere.triangles);
    let planet_center = Vec3::new(5., 5., 5.);
    let coord = ChunkCoord::new(0, 0, 0);
    let mut chunk = VoxelChunk::new(coord, coord.center(8., planet_center), 16, 8.);

    chunk.initialize(&surface, planet_center);
    assert!(chunk.is_dirty());
    assert!(chunk.density([8, 8, 8]) < crate::ISO_LEVEL);
    assert!(chunk.density([0, 0, 0]) > crate::ISO_LEVEL);

    let mesh = chunk.remesh(crate::ISO_LEVEL).clone();
    assert_eq!(ChunkState::Meshed, chunk.state());
    assert!(!mesh.is_empty());
    for p in &mesh.positions {
        assert!((p.length() - 3.).abs() < 0.2, "vertex at distance {}", p.length());
    }
}
