//! This module turns a density grid into a triangle mesh with marching cubes.
//!
//! Every cube of eight neighbouring samples is handled on its own, in parallel. Vertices are not
//! shared between cubes, each triangle owns its three positions. Triangles face the side of the
//! surface with the higher density.

use crate::{
    tables::{CORNERS, EDGES, EDGE_MASKS, TRIANGLES},
    MAX_TRIANGLES_PER_CUBE,
};

use bevy::prelude::*;
use fast_surface_nets::ndshape::{RuntimeShape, Shape};
use rayon::prelude::*;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    OnceLock,
};

/// Interpolation treats densities closer than this as equal
const INTERPOLATION_EPSILON: f32 = 1e-5;

/// An unindexed triangle mesh, three positions per triangle
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SurfaceMesh {
    /// The vertex positions, every three make up a triangle
    pub positions: Vec<Vec3>,
}

impl SurfaceMesh {
    /// The number of triangles
    pub fn triangle_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Whether the mesh has no triangles
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// The index list. Every vertex is used by exactly one triangle
    pub fn indices(&self) -> Vec<u32> {
        (0..self.positions.len() as u32).collect()
    }

    /// The triangles as position triples
    pub fn triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        self.positions.chunks_exact(3).map(|t| [t[0], t[1], t[2]])
    }

    /// One normal per vertex, the face normal of the triangle it belongs to
    pub fn flat_normals(&self) -> Vec<Vec3> {
        self.triangles()
            .flat_map(|[a, b, c]| [(b - a).cross(c - a).normalize_or_zero(); 3])
            .collect()
    }
}

/// The point on the edge `p1`-`p2` where the density crosses `iso`
fn interpolate(iso: f32, p1: Vec3, p2: Vec3, v1: f32, v2: f32) -> Vec3 {
    if (iso - v1).abs() < INTERPOLATION_EPSILON {
        return p1;
    }
    if (iso - v2).abs() < INTERPOLATION_EPSILON {
        return p2;
    }
    if (v1 - v2).abs() < INTERPOLATION_EPSILON {
        return p1;
    }
    p1 + (p2 - p1) * ((iso - v1) / (v2 - v1))
}

/// Extract the surface where `densities` crosses `iso`.
///
/// `shape` describes the sample grid, sample `[x, y, z]` lies at `origin + [x, y, z] * voxel_size`.
pub fn extract(
    densities: &[f32],
    shape: &RuntimeShape<u32, 3>,
    origin: Vec3,
    voxel_size: f32,
    iso: f32,
) -> SurfaceMesh {
    let cubes = cube_shape(shape).map_or(0, |s| s.usize());
    let (mesh, dropped) = extract_with_capacity(
        densities,
        shape,
        origin,
        voxel_size,
        iso,
        cubes * MAX_TRIANGLES_PER_CUBE,
    );
    if dropped > 0 {
        warn!("Marching cubes output buffer overflowed, dropped {dropped} triangles");
    }
    mesh
}

/// The shape of the cubes between the samples, none if the grid is too small to hold a cube
fn cube_shape(shape: &RuntimeShape<u32, 3>) -> Option<RuntimeShape<u32, 3>> {
    let [x, y, z] = shape.as_array();
    (x >= 2 && y >= 2 && z >= 2).then(|| RuntimeShape::<u32, 3>::new([x - 1, y - 1, z - 1]))
}

/// Like [extract], but the output holds at most `capacity` triangles. Triangles past that are
/// dropped, the number of dropped triangles is returned with the mesh
pub fn extract_with_capacity(
    densities: &[f32],
    shape: &RuntimeShape<u32, 3>,
    origin: Vec3,
    voxel_size: f32,
    iso: f32,
    capacity: usize,
) -> (SurfaceMesh, usize) {
    if densities.len() != shape.usize() {
        warn!(
            "Density grid holds {} samples but its shape needs {}, nothing extracted",
            densities.len(),
            shape.usize(),
        );
        return (SurfaceMesh::default(), 0);
    }
    let Some(cubes) = cube_shape(shape) else {
        return (SurfaceMesh::default(), 0);
    };

    let slots: Vec<OnceLock<[Vec3; 3]>> = (0..capacity).map(|_| OnceLock::new()).collect();
    let next = AtomicUsize::new(0);

    (0..cubes.size()).into_par_iter().for_each(|cube| {
        let base = cubes.delinearize(cube);

        let mut values = [0.; 8];
        let mut corners = [Vec3::ZERO; 8];
        let mut config = 0usize;
        for (i, offset) in CORNERS.iter().enumerate() {
            let p = [base[0] + offset[0], base[1] + offset[1], base[2] + offset[2]];
            values[i] = densities[shape.linearize(p) as usize];
            corners[i] = origin + Vec3::new(p[0] as f32, p[1] as f32, p[2] as f32) * voxel_size;
            if values[i] > iso {
                config |= 1 << i;
            }
        }

        let mask = EDGE_MASKS[config];
        if mask == 0 {
            return;
        }

        let mut points = [Vec3::ZERO; 12];
        for (e, &[a, b]) in EDGES.iter().enumerate() {
            if mask & (1 << e) != 0 {
                points[e] = interpolate(iso, corners[a], corners[b], values[a], values[b]);
            }
        }

        for t in TRIANGLES[config].chunks_exact(3) {
            if t[0] < 0 {
                break;
            }
            let triangle = [
                points[t[0] as usize],
                points[t[1] as usize],
                points[t[2] as usize],
            ];
            let slot = next.fetch_add(1, Ordering::Relaxed);
            if let Some(cell) = slots.get(slot) {
                let _ = cell.set(triangle);
            }
        }
    });

    let dropped = next.into_inner().saturating_sub(capacity);
    let positions = slots
        .into_iter()
        .filter_map(OnceLock::into_inner)
        .flatten()
        .collect();
    (SurfaceMesh { positions }, dropped)
}

#[cfg(test)]
fn sphere_field(samples: u32, size: f32, radius: f32) -> (Vec<f32>, RuntimeShape<u32, 3>, Vec3, f32) {
    let shape = RuntimeShape::<u32, 3>::new([samples; 3]);
    let voxel_size = size / (samples - 1) as f32;
    let origin = Vec3::splat(-size / 2.);
    let densities = (0..shape.size())
        .map(|i| {
            let [x, y, z] = shape.delinearize(i);
            let p = origin + Vec3::new(x as f32, y as f32, z as f32) * voxel_size;
            crate::SURFACE_DENSITY + (p.length() - radius) * crate::DENSITY_SCALE
        })
        .collect();
    (densities, shape, origin, voxel_size)
}

#[test]
fn test_sphere_round_trip() {
    let (densities, shape, origin, voxel_size) = sphere_field(41, 10., 4.);
    let mesh = extract(&densities, &shape, origin, voxel_size, crate::ISO_LEVEL);

    assert!(mesh.triangle_count() > 100);
    assert_eq!(mesh.positions.len(), mesh.indices().len());
    for p in &mesh.positions {
        assert!((p.length() - 4.).abs() < 0.05, "vertex at distance {}", p.length());
    }
    for ([a, b, c], normal) in mesh.triangles().zip(mesh.flat_normals().chunks_exact(3)) {
        let center = (a + b + c) / 3.;
        if normal[0] != Vec3::ZERO {
            assert!(normal[0].dot(center) > 0.);
        }
    }
}

#[test]
fn test_uniform_fields_are_empty() {
    let shape = RuntimeShape::<u32, 3>::new([9; 3]);
    for value in [0., 1.] {
        let densities = vec![value; shape.usize()];
        let mesh = extract(&densities, &shape, Vec3::ZERO, 1., 0.5);
        assert!(mesh.is_empty());
    }
}

#[test]
fn test_single_corner_faces_high_density() {
    let shape = RuntimeShape::<u32, 3>::new([2; 3]);
    let mut densities = vec![0.; 8];
    densities[shape.linearize([0, 0, 0]) as usize] = 1.;

    let mesh = extract(&densities, &shape, Vec3::ZERO, 1., 0.5);
    assert_eq!(1, mesh.triangle_count());
    let [a, b, c] = [mesh.positions[0], mesh.positions[1], mesh.positions[2]];
    let normal = (b - a).cross(c - a);
    assert!(normal.dot(Vec3::ZERO - (a + b + c) / 3.) > 0.);
    for p in [a, b, c] {
        assert!((p.length() - 0.5).abs() < 1e-6);
    }
}

#[test]
fn test_overflow_is_dropped() {
    let (densities, shape, origin, voxel_size) = sphere_field(17, 10., 4.);
    let full = extract(&densities, &shape, origin, voxel_size, crate::ISO_LEVEL);

    let (mesh, dropped) = extract_with_capacity(&densities, &shape, origin, voxel_size, 0.5, 10);
    assert_eq!(10, mesh.triangle_count());
    assert_eq!(full.triangle_count() - 10, dropped);

    let (mesh, dropped) = extract_with_capacity(&densities, &shape, origin, voxel_size, 0.5, 0);
    assert!(mesh.is_empty());
    assert_eq!(full.triangle_count(), dropped);
}

#[test]
fn test_mismatched_grid() {
    let shape = RuntimeShape::<u32, 3>::new([4; 3]);
    assert!(extract(&[0.; 10], &shape, Vec3::ZERO, 1., 0.5).is_empty());
    let flat = RuntimeShape::<u32, 3>::new([4, 1, 4]);
    assert!(extract(&[0.; 16], &flat, Vec3::ZERO, 1., 0.5).is_empty());
}
