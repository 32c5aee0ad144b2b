//! This crate holds the geometry side of a procedural planet.
//! A planet starts out as a subdivided icosphere, which is pushed outwards into terraces based on
//! spherical noise. That surface is then sampled into a grid of chunks, each holding a density
//! field, so the planet can be dug into at runtime and re-meshed with marching cubes.
//!
//! Densities follow a shifted signed distance convention:
//! - Values below [ISO_LEVEL] lie inside the planet
//! - Values above [ISO_LEVEL] lie outside of it, digging pushes densities upwards

#![warn(missing_docs)]
#![allow(clippy::too_many_arguments)]

mod error;
pub use error::ConfigError;

pub mod noise_field;
pub use noise_field::{NoiseChannel, NoiseField, NoiseSampler, NoiseSettings};

pub mod icosphere;
pub use icosphere::{EdgeKey, Icosphere};

pub mod biome;
pub use biome::{BiomeConfig, ColorGradient, Rgba, ScatterConfig};

pub mod terrain;
pub use terrain::{TerrainMesh, TriangleInfo};

pub mod scatter;
pub use scatter::Placement;

pub mod change;
pub use change::{ChangeSet, PlanetSnapshot, ScatterChange};

mod planet;
pub use planet::{Planet, PlanetConfig};

pub mod geometry;

mod surface;
pub use surface::ReferenceSurface;

mod tables;
pub mod marching_cubes;
pub use marching_cubes::SurfaceMesh;

mod chunk;
pub use chunk::{ChunkCoord, ChunkState, VoxelChunk};

pub mod grid;
pub use grid::{ChunkGrid, DigRequest, DiscardMeshes, GridConfig, MeshSink, RayHit, TickReport};

pub use fast_surface_nets::ndshape::{RuntimeShape, Shape};

/// The density of a point lying exactly on the reference surface
pub const SURFACE_DENSITY: f32 = 0.5;
/// How much the density changes per world unit of signed distance to the reference surface.
/// Together with [SURFACE_DENSITY] this decides where [ISO_LEVEL] crosses the surface, the iso
/// level must stay strictly between the lowest and highest density a chunk can hold.
pub const DENSITY_SCALE: f32 = 0.3;
/// The density at which marching cubes places the surface
pub const ISO_LEVEL: f32 = SURFACE_DENSITY;
/// The maximum number of triangles a single marching cube can emit
pub const MAX_TRIANGLES_PER_CUBE: usize = 5;
