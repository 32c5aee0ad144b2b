use crate::{
    geometry::{closest_point_on_triangle, ray_triangle},
    DENSITY_SCALE, SURFACE_DENSITY,
};

use bevy::prelude::*;

/// Rays towards the planet center are tilted by this, so they do not run exactly through the
/// vertices and edges of a mesh built around the coordinate axes
const RAY_TILT: Vec3 = Vec3::new(1e-3, 2e-3, 3e-3);

/// A closed triangle mesh that voxel densities are sampled from
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReferenceSurface {
    triangles: Vec<[Vec3; 3]>,
}

impl ReferenceSurface {
    /// Build the surface from an indexed mesh. Triangles pointing outside `vertices` are skipped
    pub fn new(vertices: &[Vec3], triangles: &[[u32; 3]]) -> Self {
        let triangles = triangles
            .iter()
            .filter_map(|t| {
                let a = *vertices.get(t[0] as usize)?;
                let b = *vertices.get(t[1] as usize)?;
                let c = *vertices.get(t[2] as usize)?;
                Some([a, b, c])
            })
            .collect();
        Self { triangles }
    }

    /// The number of triangles
    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    /// Whether the surface has no triangles
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// The distance from `p` to the nearest point of the surface, infinite for an empty surface
    pub fn unsigned_distance(&self, p: Vec3) -> f32 {
        self.triangles
            .iter()
            .map(|&[a, b, c]| closest_point_on_triangle(p, a, b, c).distance_squared(p))
            .fold(f32::INFINITY, f32::min)
            .sqrt()
    }

    /// Whether `p` lies inside the surface, by counting crossings of a ray cast from `p` towards
    /// `center`. An odd count is inside
    pub fn is_inside(&self, p: Vec3, center: Vec3) -> bool {
        let towards = center - p;
        let dir = if towards.length_squared() <= f32::EPSILON {
            Vec3::Y
        } else {
            towards.normalize()
        };
        let dir = (dir + RAY_TILT).normalize_or_zero();

        let hits = self
            .triangles
            .iter()
            .filter(|&&[a, b, c]| ray_triangle(p, dir, a, b, c).is_some())
            .count();
        hits % 2 == 1
    }

    /// The distance to the surface, negative inside
    pub fn signed_distance(&self, p: Vec3, center: Vec3) -> f32 {
        let distance = self.unsigned_distance(p);
        if self.is_inside(p, center) {
            -distance
        } else {
            distance
        }
    }

    /// The density at `p`, see [SURFACE_DENSITY] and [DENSITY_SCALE]. An empty surface is empty
    /// space everywhere
    pub fn density(&self, p: Vec3, center: Vec3) -> f32 {
        if self.triangles.is_empty() {
            return SURFACE_DENSITY + DENSITY_SCALE;
        }
        SURFACE_DENSITY + self.signed_distance(p, center) * DENSITY_SCALE
    }
}

#[cfg(test)]
fn sphere_surface(radius: f32) -> ReferenceSurface {
    let sphere = crate::Icosphere::new(3, radius);
    ReferenceSurface::new(&sphere.vertices, &sphere.triangles)
}

#[test]
fn test_inside_outside() {
    let surface = sphere_surface(4.);
    let center = Vec3::ZERO;
    assert!(surface.is_inside(Vec3::new(1., 0.5, -2.), center));
    assert!(surface.is_inside(Vec3::ZERO, center));
    assert!(surface.is_inside(Vec3::new(3.5, 0., 0.), center));
    assert!(!surface.is_inside(Vec3::new(4.5, 0., 0.), center));
    assert!(!surface.is_inside(Vec3::new(0., -6., 2.), center));
}

#[test]
fn test_signed_distance() {
    let surface = sphere_surface(4.);
    // An icosphere at 3 subdivisions is within a few percent of the sphere
    let outside = surface.signed_distance(Vec3::new(0., 6., 0.), Vec3::ZERO);
    assert!((outside - 2.).abs() < 0.1);
    let inside = surface.signed_distance(Vec3::new(0., 0., 2.), Vec3::ZERO);
    assert!((inside + 2.).abs() < 0.1);
}

#[test]
fn test_density_convention() {
    let surface = sphere_surface(4.);
    let on_surface = surface.triangles[0][0];
    assert!((surface.density(on_surface, Vec3::ZERO) - SURFACE_DENSITY).abs() < 1e-5);
    assert!(surface.density(Vec3::ZERO, Vec3::ZERO) < SURFACE_DENSITY);
    assert!(surface.density(Vec3::splat(5.), Vec3::ZERO) > SURFACE_DENSITY);
    assert!(ReferenceSurface::default().density(Vec3::ZERO, Vec3::ZERO) > SURFACE_DENSITY);
}

#[test]
fn test_offset_center() {
    let sphere = crate::Icosphere::new(2, 3.);
    let offset = Vec3::new(10., -4., 2.);
    let vertices: Vec<_> = sphere.vertices.iter().map(|v| *v + offset).collect();
    let surface = ReferenceSurface::new(&vertices, &sphere.triangles);
    assert!(surface.is_inside(offset + Vec3::new(1., 1., 0.), offset));
    assert!(!surface.is_inside(Vec3::ZERO, offset));
}
