//! This module owns the chunks of a planet and schedules their work.
//!
//! Chunks covering the planet are queued once at startup and generated a few per tick. Digging
//! marks chunks dirty, dirty chunks are re-meshed a few per tick. Both budgets bound the work done
//! in a single frame.

use crate::{
    chunk::{ChunkCoord, ChunkState, VoxelChunk},
    geometry::{ray_aabb, ray_triangle},
    marching_cubes::SurfaceMesh,
    surface::ReferenceSurface,
    ConfigError, DENSITY_SCALE, ISO_LEVEL, SURFACE_DENSITY,
};

use bevy::{
    prelude::*,
    utils::{HashMap, HashSet},
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Half the length of a unit cube diagonal
const HALF_DIAGONAL: f32 = 0.866;

/// Settings for the chunk grid of a planet
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// The radius of the planet the grid covers
    pub planet_radius: f32,
    /// The length of a chunk side in world units
    pub chunk_size: f32,
    /// The number of cubes per chunk side
    pub resolution: u32,
    /// The most chunks generated or re-initialized per tick
    pub max_chunks_per_tick: usize,
    /// The most chunks re-meshed per tick
    pub max_rebuilds_per_tick: usize,
    /// The density at which the surface is extracted
    pub iso_level: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            planet_radius: 15.,
            chunk_size: 8.,
            resolution: 32,
            max_chunks_per_tick: 3,
            max_rebuilds_per_tick: 5,
            iso_level: ISO_LEVEL,
        }
    }
}

impl GridConfig {
    /// Parse grid settings from JSON. Missing fields take their default value
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// The lowest and highest density a sample near the surface can start out with. The deepest
    /// sample is the planet center, the highest is a chunk corner just outside the surface
    pub fn density_range(&self) -> (f32, f32) {
        (
            SURFACE_DENSITY - self.planet_radius * DENSITY_SCALE,
            SURFACE_DENSITY + self.chunk_size * 2. * HALF_DIAGONAL * DENSITY_SCALE,
        )
    }

    /// Check that every value is in its supported range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.planet_radius.is_finite() && self.planet_radius > 0.) {
            return Err(ConfigError::invalid(
                "planet_radius",
                format!("{} must be positive", self.planet_radius),
            ));
        }
        if !(self.chunk_size.is_finite() && self.chunk_size > 0.) {
            return Err(ConfigError::invalid(
                "chunk_size",
                format!("{} must be positive", self.chunk_size),
            ));
        }
        if self.resolution == 0 {
            return Err(ConfigError::invalid("resolution", "must be at least 1"));
        }
        if self.max_chunks_per_tick == 0 || self.max_rebuilds_per_tick == 0 {
            return Err(ConfigError::invalid("budget", "tick budgets must be at least 1"));
        }
        let (min, max) = self.density_range();
        if !(self.iso_level > min && self.iso_level < max) {
            return Err(ConfigError::invalid(
                "iso_level",
                format!("{} must lie strictly between {min} and {max}", self.iso_level),
            ));
        }
        Ok(())
    }

    /// The number of chunk coordinates per axis that is checked against the planet
    pub fn chunks_per_side(&self) -> i32 {
        (self.planet_radius * 2. / self.chunk_size).ceil() as i32 + 2
    }

    /// Every chunk coordinate whose chunk may intersect the planet, in generation order. The test
    /// uses the bounding sphere of each chunk, so some chunks may end up empty
    pub fn enumerate(&self) -> Vec<ChunkCoord> {
        let offset = self.chunks_per_side() / 2;
        let reach = self.planet_radius + self.chunk_size * HALF_DIAGONAL;

        let mut coords = Vec::new();
        for x in -offset..=offset {
            for y in -offset..=offset {
                for z in -offset..=offset {
                    let coord = ChunkCoord::new(x, y, z);
                    if coord.center(self.chunk_size, Vec3::ZERO).length() < reach {
                        coords.push(coord);
                    }
                }
            }
        }
        coords
    }
}

/// Receives chunk meshes whenever they are rebuilt, for example to upload them for rendering or
/// collision
pub trait MeshSink {
    /// A chunk has a new, non-empty mesh. Positions are relative to the chunk center
    fn upload(&mut self, coord: ChunkCoord, mesh: &SurfaceMesh);
    /// A chunk no longer has any geometry
    fn clear(&mut self, coord: ChunkCoord);
}

/// A [MeshSink] that ignores every mesh
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardMeshes;

impl MeshSink for DiscardMeshes {
    fn upload(&mut self, _coord: ChunkCoord, _mesh: &SurfaceMesh) {}
    fn clear(&mut self, _coord: ChunkCoord) {}
}

impl MeshSink for HashMap<ChunkCoord, SurfaceMesh> {
    fn upload(&mut self, coord: ChunkCoord, mesh: &SurfaceMesh) {
        self.insert(coord, mesh.clone());
    }

    fn clear(&mut self, coord: ChunkCoord) {
        self.remove(&coord);
    }
}

/// A request to change the terrain around a point
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DigRequest {
    /// The world position of the brush center
    pub point: Vec3,
    /// The brush radius
    pub radius: f32,
    /// How much the density changes at the brush center
    pub strength: f32,
    /// Remove terrain when true, add it back when false
    pub is_digging: bool,
}

impl DigRequest {
    /// The density change at the brush center, positive when digging
    pub fn signed_strength(&self) -> f32 {
        if self.is_digging {
            self.strength
        } else {
            -self.strength
        }
    }
}

/// What a single tick did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Chunks that were generated or re-initialized
    pub generated: usize,
    /// Chunks that got a new mesh
    pub remeshed: usize,
    /// Queue entries for chunks that no longer needed a mesh
    pub skipped_stale: usize,
    /// Chunks still waiting to be generated or re-initialized
    pub pending: usize,
    /// Chunks still waiting for a new mesh
    pub dirty: usize,
}

/// The closest intersection of a ray with the chunk meshes
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    /// The world position of the hit
    pub point: Vec3,
    /// The distance from the ray origin
    pub distance: f32,
    /// The chunk whose mesh was hit
    pub coord: ChunkCoord,
}

/// The resource that owns every chunk of a planet and the queues deciding which chunk is worked on
/// next
#[derive(Resource, Debug)]
pub struct ChunkGrid {
    config: GridConfig,
    planet_center: Vec3,
    chunks: HashMap<ChunkCoord, VoxelChunk>,
    pending: VecDeque<ChunkCoord>,
    reinit: VecDeque<ChunkCoord>,
    queued_reinit: HashSet<ChunkCoord>,
    dirty: VecDeque<ChunkCoord>,
    queued_dirty: HashSet<ChunkCoord>,
}

impl ChunkGrid {
    /// Create the grid and queue every chunk that may intersect the planet
    pub fn new(config: GridConfig, planet_center: Vec3) -> Result<Self, ConfigError> {
        config.validate()?;
        let pending: VecDeque<_> = config.enumerate().into();
        info!("Chunk grid initialized, {} chunks to generate", pending.len());

        Ok(Self {
            config,
            planet_center,
            chunks: HashMap::default(),
            pending,
            reinit: VecDeque::new(),
            queued_reinit: HashSet::default(),
            dirty: VecDeque::new(),
            queued_dirty: HashSet::default(),
        })
    }

    fn mark_dirty(&mut self, coord: ChunkCoord) {
        if self.queued_dirty.insert(coord) {
            self.dirty.push_back(coord);
        }
    }

    fn next_generation(&mut self) -> Option<(ChunkCoord, bool)> {
        if let Some(coord) = self.reinit.pop_front() {
            self.queued_reinit.remove(&coord);
            return Some((coord, true));
        }
        self.pending.pop_front().map(|coord| (coord, false))
    }

    /// Advance the grid by one step: generate or re-initialize up to
    /// [GridConfig::max_chunks_per_tick] chunks from `surface`, then re-mesh up to
    /// [GridConfig::max_rebuilds_per_tick] dirty chunks and hand the meshes to `sink`.
    ///
    /// `surface` is given relative to the planet center.
    pub fn tick(&mut self, surface: &ReferenceSurface, sink: &mut impl MeshSink) -> TickReport {
        let mut report = TickReport::default();

        while report.generated < self.config.max_chunks_per_tick {
            let Some((coord, reinit)) = self.next_generation() else {
                break;
            };

            if reinit {
                let Some(chunk) = self.chunks.get_mut(&coord) else {
                    continue;
                };
                chunk.initialize(surface, self.planet_center);
            } else {
                if self.chunks.contains_key(&coord) {
                    continue;
                }
                let center = coord.center(self.config.chunk_size, self.planet_center);
                let mut chunk =
                    VoxelChunk::new(coord, center, self.config.resolution, self.config.chunk_size);
                chunk.initialize(surface, self.planet_center);
                self.chunks.insert(coord, chunk);
            }
            self.mark_dirty(coord);
            report.generated += 1;
        }

        if report.generated > 0 && self.pending.is_empty() && self.reinit.is_empty() {
            info!("All chunks generated, total: {}", self.chunks.len());
        }

        while report.remeshed < self.config.max_rebuilds_per_tick {
            let Some(coord) = self.dirty.pop_front() else {
                break;
            };
            self.queued_dirty.remove(&coord);

            let Some(chunk) = self.chunks.get_mut(&coord).filter(|c| c.is_dirty()) else {
                report.skipped_stale += 1;
                continue;
            };

            let mesh = chunk.remesh(self.config.iso_level);
            if mesh.is_empty() {
                sink.clear(coord);
            } else {
                debug!(
                    "Chunk {:?} meshed: {} triangles",
                    coord,
                    mesh.triangle_count()
                );
                sink.upload(coord, mesh);
            }
            report.remeshed += 1;
        }

        report.pending = self.pending.len() + self.reinit.len();
        report.dirty = self.dirty.len();
        report
    }

    /// The existing chunks whose cells overlap the bounding box of a brush, in coordinate order
    fn chunks_near(&self, point: Vec3, radius: f32) -> Vec<ChunkCoord> {
        let (size, center) = (self.config.chunk_size, self.planet_center);
        let offset = self.config.chunks_per_side() / 2;
        let reach = Vec3::splat(radius);
        let low = ChunkCoord::from_world(point - reach, size, center).0.map(|c| c.max(-offset));
        let high = ChunkCoord::from_world(point + reach, size, center).0.map(|c| c.min(offset));

        let mut coords = Vec::new();
        for x in low[0]..=high[0] {
            for y in low[1]..=high[1] {
                for z in low[2]..=high[2] {
                    let coord = ChunkCoord::new(x, y, z);
                    if self.chunks.contains_key(&coord) {
                        coords.push(coord);
                    }
                }
            }
        }
        coords
    }

    /// Apply a dig request to every chunk the brush may touch. Modified chunks are re-meshed by
    /// the following ticks. Returns the number of modified chunks
    pub fn dig(&mut self, request: &DigRequest) -> usize {
        let strength = request.signed_strength();
        let mut modified = 0;
        for coord in self.chunks_near(request.point, request.radius) {
            let Some(chunk) = self.chunks.get_mut(&coord) else {
                continue;
            };
            // Chunks waiting for re-initialization are overwritten anyway
            if chunk.state() == ChunkState::Generating {
                continue;
            }
            if chunk.modify_density(request.point, request.radius, strength) {
                self.mark_dirty(coord);
                modified += 1;
            }
        }
        debug!("Dig at {} modified {modified} chunks", request.point);
        modified
    }

    /// Smooth the terrain around a point in every chunk the brush may touch. Returns the number of
    /// modified chunks
    pub fn smooth(&mut self, point: Vec3, radius: f32, strength: f32) -> usize {
        let mut modified = 0;
        for coord in self.chunks_near(point, radius) {
            let Some(chunk) = self.chunks.get_mut(&coord) else {
                continue;
            };
            if chunk.state() != ChunkState::Generating && chunk.smooth(point, radius, strength) {
                self.mark_dirty(coord);
                modified += 1;
            }
        }
        modified
    }

    /// Queue every existing chunk to be filled from the reference surface again. The work is
    /// spread over the following ticks with the generation budget
    pub fn reset(&mut self) {
        let mut coords: Vec<_> = self.chunks.keys().copied().collect();
        coords.sort_unstable();
        for coord in coords {
            if self.queued_reinit.insert(coord) {
                self.reinit.push_back(coord);
            }
            if let Some(chunk) = self.chunks.get_mut(&coord) {
                chunk.set_state(ChunkState::Generating);
            }
        }
        info!("Resetting planet, {} chunks queued", self.reinit.len());
    }

    /// Remove every chunk and queue the whole planet for generation again
    pub fn clear(&mut self, sink: &mut impl MeshSink) {
        for coord in self.chunks.keys() {
            sink.clear(*coord);
        }
        self.chunks.clear();
        self.reinit.clear();
        self.queued_reinit.clear();
        self.dirty.clear();
        self.queued_dirty.clear();
        self.pending = self.config.enumerate().into();
    }

    /// Find the closest point where a ray hits the current chunk meshes
    pub fn raycast(&self, origin: Vec3, dir: Vec3, max_distance: f32) -> Option<RayHit> {
        let dir = dir.try_normalize()?;
        let mut best: Option<RayHit> = None;

        for (coord, chunk) in &self.chunks {
            if chunk.mesh().is_empty() {
                continue;
            }
            let (min, max) = chunk.bounds();
            let Some((near, _)) = ray_aabb(origin, dir, min, max) else {
                continue;
            };
            let limit = best.map_or(max_distance, |hit| hit.distance.min(max_distance));
            if near > limit {
                continue;
            }

            let center = chunk.center();
            for [a, b, c] in chunk.mesh().triangles() {
                let Some(t) = ray_triangle(origin, dir, a + center, b + center, c + center) else {
                    continue;
                };
                let limit = best.map_or(max_distance, |hit| hit.distance);
                if t <= max_distance && t < limit {
                    best = Some(RayHit {
                        point: origin + dir * t,
                        distance: t,
                        coord: *coord,
                    });
                }
            }
        }
        best
    }

    /// Cast a ray and dig where it hits the terrain
    pub fn dig_along_ray(
        &mut self,
        origin: Vec3,
        dir: Vec3,
        max_distance: f32,
        radius: f32,
        strength: f32,
    ) -> Option<RayHit> {
        let hit = self.raycast(origin, dir, max_distance)?;
        self.dig(&DigRequest {
            point: hit.point,
            radius,
            strength,
            is_digging: true,
        });
        Some(hit)
    }

    /// The grid settings
    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// The world position of the planet center
    pub fn planet_center(&self) -> Vec3 {
        self.planet_center
    }

    /// Get a generated chunk
    pub fn chunk(&self, coord: ChunkCoord) -> Option<&VoxelChunk> {
        self.chunks.get(&coord)
    }

    /// Iterate over the generated chunks, in no particular order
    pub fn chunks(&self) -> impl Iterator<Item = &VoxelChunk> {
        self.chunks.values()
    }

    /// The number of generated chunks
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether no chunk was generated yet
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The number of chunks waiting to be generated or re-initialized
    pub fn pending_count(&self) -> usize {
        self.pending.len() + self.reinit.len()
    }

    /// The number of chunks waiting for a new mesh
    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Whether there is no queued work left
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.reinit.is_empty() && self.dirty.is_empty()
    }
}

#[cfg(test)]
fn small_config() -> GridConfig {
    GridConfig {
        planet_radius: 3.,
        chunk_size: 4.,
        resolution: 8,
        max_chunks_per_tick: 2,
        max_rebuilds_per_tick: 3,
        ..default()
    }
}

#[cfg(test)]
fn small_surface() -> ReferenceSurface {
    let sphere = crate::Icosphere::new(2, 3.);
    ReferenceSurface::new(&sphere.vertices, &sphere.triangles)
}

#[cfg(test)]
fn run_until_idle(grid: &mut ChunkGrid, surface: &ReferenceSurface, sink: &mut impl MeshSink) {
    for _ in 0..1000 {
        if grid.is_idle() {
            return;
        }
        grid.tick(surface, sink);
    }
    panic!("grid did not become idle");
}

#[test]
fn test_enumeration_bound() {
    let config = GridConfig::default();
    // ceil(30 / 8) + 2 = 6 chunks per side, coordinates -3..=3
    assert_eq!(6, config.chunks_per_side());
    let coords = config.enumerate();
    assert!(coords.contains(&ChunkCoord::new(0, 0, 0)));
    assert!(coords.contains(&ChunkCoord::new(2, 0, 0)));
    assert!(!coords.contains(&ChunkCoord::new(3, 0, 0)));
    assert!(!coords.contains(&ChunkCoord::new(2, 2, 2)));
    for coord in &coords {
        assert!(coord.center(8., Vec3::ZERO).length() < 15. + 8. * HALF_DIAGONAL);
    }
}

#[test]
fn test_invalid_config() {
    assert!(GridConfig::default().validate().is_ok());
    let config = GridConfig {
        iso_level: 20.,
        ..default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidValue { field: "iso_level", .. })
    ));
    let config = GridConfig {
        max_rebuilds_per_tick: 0,
        ..default()
    };
    assert!(ChunkGrid::new(config, Vec3::ZERO).is_err());
    assert!(GridConfig::from_json_str(r#"{ "resolution": 0 }"#).is_err());
    assert_eq!(
        16,
        GridConfig::from_json_str(r#"{ "resolution": 16 }"#)
            .unwrap()
            .resolution
    );
}

#[test]
fn test_tick_budgets() {
    let surface = small_surface();
    let mut grid = ChunkGrid::new(small_config(), Vec3::ZERO).unwrap();
    let total = grid.pending_count();

    let report = grid.tick(&surface, &mut DiscardMeshes);
    assert_eq!(2, report.generated);
    assert_eq!(2, report.remeshed);
    assert_eq!(total - 2, report.pending);
    assert_eq!(0, report.dirty);

    let report = grid.tick(&surface, &mut DiscardMeshes);
    assert_eq!(2, report.generated);
    assert_eq!(2, report.remeshed);
    assert_eq!(4, grid.len());

    run_until_idle(&mut grid, &surface, &mut DiscardMeshes);
    assert_eq!(total, grid.len());
    assert!(grid.chunks().all(|c| c.state() == ChunkState::Meshed));
}

#[test]
fn test_dig_marks_chunks_dirty_once() {
    let surface = small_surface();
    let mut grid = ChunkGrid::new(small_config(), Vec3::ZERO).unwrap();
    let mut meshes: HashMap<ChunkCoord, SurfaceMesh> = HashMap::default();
    run_until_idle(&mut grid, &surface, &mut meshes);
    assert!(!meshes.is_empty());

    let request = DigRequest {
        point: Vec3::new(0., 3., 0.),
        radius: 1.5,
        strength: 0.5,
        is_digging: true,
    };
    let modified = grid.dig(&request);
    assert!(modified > 0);
    assert_eq!(modified, grid.dirty_count());

    // Digging the same spot again does not queue the chunks twice
    assert_eq!(modified, grid.dig(&request));
    assert_eq!(modified, grid.dirty_count());

    let report = grid.tick(&surface, &mut meshes);
    assert_eq!(0, report.generated);
    assert_eq!(modified.min(3), report.remeshed);
    run_until_idle(&mut grid, &surface, &mut meshes);

    // The dug point is now empty space in every chunk that holds it
    for chunk in grid.chunks().filter(|c| c.contains_world_point(request.point)) {
        assert!(chunk.density_at_world(request.point) > ISO_LEVEL);
    }
}

#[test]
fn test_brush_reaches_neighbouring_chunks() {
    let surface = small_surface();
    let mut grid = ChunkGrid::new(small_config(), Vec3::ZERO).unwrap();
    run_until_idle(&mut grid, &surface, &mut DiscardMeshes);

    // On the face between chunks (0, 0, 0) and (1, 0, 0)
    let request = DigRequest {
        point: Vec3::new(2., 0., 0.),
        radius: 1.,
        strength: 0.5,
        is_digging: true,
    };
    assert_eq!(
        vec![ChunkCoord::new(0, 0, 0), ChunkCoord::new(1, 0, 0)],
        grid.chunks_near(request.point, request.radius)
    );
    assert_eq!(2, grid.dig(&request));

    let far = DigRequest {
        point: Vec3::new(100., 0., 0.),
        ..request
    };
    assert!(grid.chunks_near(far.point, far.radius).is_empty());
    assert_eq!(0, grid.dig(&far));
}

#[test]
fn test_emptied_chunk_clears_its_mesh() {
    let surface = small_surface();
    let mut grid = ChunkGrid::new(small_config(), Vec3::ZERO).unwrap();
    let mut meshes: HashMap<ChunkCoord, SurfaceMesh> = HashMap::default();
    run_until_idle(&mut grid, &surface, &mut meshes);

    let coord = ChunkCoord::new(0, 1, 0);
    assert!(meshes.contains_key(&coord));
    if let Some(chunk) = grid.chunks.get_mut(&coord) {
        let empty = vec![ISO_LEVEL + 0.3; chunk.densities().len()];
        assert!(chunk.set_densities(empty));
    }
    grid.mark_dirty(coord);

    let report = grid.tick(&surface, &mut meshes);
    assert_eq!(1, report.remeshed);
    assert!(!meshes.contains_key(&coord));
    assert!(grid.chunk(coord).is_some_and(|c| c.mesh().is_empty()));
}

#[test]
fn test_clear_releases_every_chunk() {
    let surface = small_surface();
    let mut grid = ChunkGrid::new(small_config(), Vec3::ZERO).unwrap();
    let mut meshes: HashMap<ChunkCoord, SurfaceMesh> = HashMap::default();
    run_until_idle(&mut grid, &surface, &mut meshes);
    assert!(!meshes.is_empty());

    grid.mark_dirty(ChunkCoord::new(0, 0, 0));
    grid.clear(&mut meshes);
    assert!(meshes.is_empty());
    assert!(grid.is_empty());
    assert_eq!(0, grid.dirty_count());
    assert_eq!(small_config().enumerate().len(), grid.pending_count());

    run_until_idle(&mut grid, &surface, &mut meshes);
    assert_eq!(small_config().enumerate().len(), grid.len());
    assert!(!meshes.is_empty());
}

#[test]
fn test_stale_entries_are_skipped() {
    let surface = small_surface();
    let mut grid = ChunkGrid::new(small_config(), Vec3::ZERO).unwrap();
    run_until_idle(&mut grid, &surface, &mut DiscardMeshes);

    let coord = ChunkCoord::new(0, 0, 0);
    grid.mark_dirty(coord);
    if let Some(chunk) = grid.chunks.get_mut(&coord) {
        chunk.set_state(ChunkState::Meshed);
    }
    let report = grid.tick(&surface, &mut DiscardMeshes);
    assert_eq!(1, report.skipped_stale);
    assert_eq!(0, report.remeshed);
}

#[test]
fn test_reset_is_budgeted() {
    let surface = small_surface();
    let mut grid = ChunkGrid::new(small_config(), Vec3::ZERO).unwrap();
    run_until_idle(&mut grid, &surface, &mut DiscardMeshes);
    let before: Vec<f32> = grid
        .chunk(ChunkCoord::new(0, 1, 0))
        .map(|c| c.densities().to_vec())
        .unwrap_or_default();

    grid.dig(&DigRequest {
        point: Vec3::new(0., 3., 0.),
        radius: 2.,
        strength: 1.,
        is_digging: true,
    });
    grid.reset();
    assert_eq!(grid.len(), grid.pending_count());

    let report = grid.tick(&surface, &mut DiscardMeshes);
    assert_eq!(2, report.generated);
    assert_eq!(grid.len() - 2, report.pending);

    run_until_idle(&mut grid, &surface, &mut DiscardMeshes);
    let after = grid.chunk(ChunkCoord::new(0, 1, 0)).map(|c| c.densities().to_vec());
    assert_eq!(Some(before), after);
    assert!(grid.chunks().all(|c| c.state() == ChunkState::Meshed));
}

#[test]
fn test_raycast_and_dig_along_ray() {
    let surface = small_surface();
    let mut grid = ChunkGrid::new(small_config(), Vec3::ZERO).unwrap();
    run_until_idle(&mut grid, &surface, &mut DiscardMeshes);

    let origin = Vec3::new(0.3, 10., 0.2);
    let hit = grid.raycast(origin, Vec3::NEG_Y, 20.).unwrap();
    assert!((hit.point.length() - 3.).abs() < 0.25, "hit at {}", hit.point);
    assert!((hit.distance - (origin.y - hit.point.y)).abs() < 1e-4);
    assert!(grid.raycast(origin, Vec3::Y, 20.).is_none());
    assert!(grid.raycast(origin, Vec3::NEG_Y, 5.).is_none());

    let dug = grid.dig_along_ray(origin, Vec3::NEG_Y, 20., 1., 0.5).unwrap();
    assert_eq!(hit, dug);
    assert!(grid.dirty_count() > 0);
}

#[test]
fn test_fill_request() {
    let request = DigRequest {
        point: Vec3::ZERO,
        radius: 1.,
        strength: 0.25,
        is_digging: false,
    };
    assert_eq!(-0.25, request.signed_strength());
}

#[test]
fn test_grid_as_resource() {
    let surface = small_surface();
    let mut world = World::default();
    world.insert_resource(ChunkGrid::new(small_config(), Vec3::new(1., 2., 3.)).unwrap());

    let report = world
        .resource_mut::<ChunkGrid>()
        .tick(&surface, &mut DiscardMeshes);
    assert_eq!(2, report.generated);

    let grid = world.resource::<ChunkGrid>();
    assert_eq!(2, grid.len());
    for chunk in grid.chunks() {
        let expected = chunk.coord().center(4., Vec3::new(1., 2., 3.));
        assert_eq!(expected, chunk.center());
    }
}
