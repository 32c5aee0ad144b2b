//! This module builds the base planet mesh: a unit icosahedron whose faces are recursively split
//! in four, with every new vertex pushed back onto the sphere. Vertices are shared between the
//! triangles that use them, every edge midpoint is created exactly once per subdivision pass.

use bevy::{prelude::*, utils::HashMap};

/// An undirected edge between two vertices, stored with the smaller index first
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeKey(u32, u32);

impl EdgeKey {
    /// Construct the key for the edge between `a` and `b`, in either order
    pub fn new(a: u32, b: u32) -> Self {
        Self(a.min(b), a.max(b))
    }

    /// The smaller vertex index
    pub fn min(&self) -> u32 {
        self.0
    }

    /// The larger vertex index
    pub fn max(&self) -> u32 {
        self.1
    }
}

/// A triangle mesh approximating a sphere. Triangles are wound counter-clockwise when seen from
/// outside, so the right-handed face normal points away from the center.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Icosphere {
    /// The vertex positions
    pub vertices: Vec<Vec3>,
    /// Index triples into `vertices`
    pub triangles: Vec<[u32; 3]>,
}

/// The twenty faces of the icosahedron returned by [Icosphere::icosahedron]
const ICOSAHEDRON_FACES: [[u32; 3]; 20] = [
    [0, 11, 5],
    [0, 5, 1],
    [0, 1, 7],
    [0, 7, 10],
    [0, 10, 11],
    [1, 5, 9],
    [5, 11, 4],
    [11, 10, 2],
    [10, 7, 6],
    [7, 1, 8],
    [3, 9, 4],
    [3, 4, 2],
    [3, 2, 6],
    [3, 6, 8],
    [3, 8, 9],
    [4, 9, 5],
    [2, 4, 11],
    [6, 2, 10],
    [8, 6, 7],
    [9, 8, 1],
];

impl Icosphere {
    /// Build a sphere of the given radius by subdividing an icosahedron `subdivisions` times
    pub fn new(subdivisions: u32, radius: f32) -> Self {
        let mut sphere = Self::icosahedron();
        for _ in 0..subdivisions {
            sphere = sphere.subdivide();
        }
        sphere.scale_to(radius);
        sphere
    }

    /// The 12 vertices and 20 faces of a unit icosahedron
    pub fn icosahedron() -> Self {
        let t = (1. + 5f32.sqrt()) / 2.;
        let vertices = [
            Vec3::new(-1., t, 0.),
            Vec3::new(1., t, 0.),
            Vec3::new(-1., -t, 0.),
            Vec3::new(1., -t, 0.),
            Vec3::new(0., -1., t),
            Vec3::new(0., 1., t),
            Vec3::new(0., -1., -t),
            Vec3::new(0., 1., -t),
            Vec3::new(t, 0., -1.),
            Vec3::new(t, 0., 1.),
            Vec3::new(-t, 0., -1.),
            Vec3::new(-t, 0., 1.),
        ]
        .into_iter()
        .map(Vec3::normalize)
        .collect();

        Self {
            vertices,
            triangles: ICOSAHEDRON_FACES.to_vec(),
        }
    }

    /// Split every triangle into four. New vertices are placed on the unit sphere, so this should
    /// be applied before [Icosphere::scale_to]
    pub fn subdivide(&self) -> Self {
        let mut vertices = self.vertices.clone();
        let mut cache = MidpointCache::default();
        let mut triangles = Vec::with_capacity(self.triangles.len() * 4);

        for &[v1, v2, v3] in &self.triangles {
            let a = cache.midpoint(&mut vertices, v1, v2);
            let b = cache.midpoint(&mut vertices, v2, v3);
            let c = cache.midpoint(&mut vertices, v3, v1);

            triangles.push([v1, a, c]);
            triangles.push([v2, b, a]);
            triangles.push([v3, c, b]);
            triangles.push([a, b, c]);
        }

        Self {
            vertices,
            triangles,
        }
    }

    /// Move every vertex to the given distance from the center
    pub fn scale_to(&mut self, radius: f32) {
        for v in self.vertices.iter_mut() {
            *v = v.normalize_or_zero() * radius;
        }
    }

    /// The number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// The number of triangles
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// The flat index list, three indices per triangle
    pub fn indices(&self) -> Vec<u32> {
        self.triangles.iter().flatten().copied().collect()
    }

    /// The vertex and triangle counts after `subdivisions` passes
    pub fn expected_counts(subdivisions: u32) -> (usize, usize) {
        let faces = 20 * 4usize.pow(subdivisions);
        (10 * 4usize.pow(subdivisions) + 2, faces)
    }
}

/// Remembers the midpoint created for every edge during one subdivision pass
#[derive(Default)]
pub struct MidpointCache(HashMap<EdgeKey, u32>);

impl MidpointCache {
    /// Get the index of the midpoint between `a` and `b`, creating it on the unit sphere if this
    /// edge was not split yet
    pub fn midpoint(&mut self, vertices: &mut Vec<Vec3>, a: u32, b: u32) -> u32 {
        *self.0.entry(EdgeKey::new(a, b)).or_insert_with(|| {
            let middle = (vertices[a as usize] + vertices[b as usize]) * 0.5;
            vertices.push(middle.normalize_or_zero());
            (vertices.len() - 1) as u32
        })
    }

    /// The number of edges split so far
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no edge was split yet
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[test]
fn test_subdivision_counts() {
    for n in 0..=5 {
        let sphere = Icosphere::new(n, 2.5);
        let (vertices, triangles) = Icosphere::expected_counts(n);
        assert_eq!(vertices, sphere.vertex_count(), "subdivision {n}");
        assert_eq!(triangles, sphere.triangle_count(), "subdivision {n}");
        for v in &sphere.vertices {
            assert!((v.length() - 2.5).abs() < 1e-4);
        }
    }
}

#[test]
fn test_triangles_are_valid() {
    let sphere = Icosphere::new(3, 1.);
    for &[a, b, c] in &sphere.triangles {
        assert!(a != b && b != c && a != c);
        assert!([a, b, c].iter().all(|&i| (i as usize) < sphere.vertex_count()));
    }
}

#[test]
fn test_midpoint_cache_is_symmetric() {
    let mut vertices = Icosphere::icosahedron().vertices;
    let mut cache = MidpointCache::default();
    let forward = cache.midpoint(&mut vertices, 0, 11);
    let backward = cache.midpoint(&mut vertices, 11, 0);
    assert_eq!(forward, backward);
    assert_eq!(13, vertices.len());
    assert_eq!(1, cache.len());
    assert_eq!(EdgeKey::new(11, 0), EdgeKey::new(0, 11));
}

#[test]
fn test_no_duplicate_vertices() {
    let sphere = Icosphere::new(2, 1.);
    let mut seen = bevy::utils::HashSet::default();
    for v in &sphere.vertices {
        let key = (*v * 1e4).round().as_ivec3();
        assert!(seen.insert(key), "duplicate vertex at {v}");
    }
}

#[test]
fn test_faces_point_outwards() {
    let sphere = Icosphere::new(2, 3.);
    for &[a, b, c] in &sphere.triangles {
        let (a, b, c) = (
            sphere.vertices[a as usize],
            sphere.vertices[b as usize],
            sphere.vertices[c as usize],
        );
        let normal = (b - a).cross(c - a);
        assert!(normal.dot((a + b + c) / 3.) > 0.);
    }
}

#[test]
fn test_generation_is_repeatable() {
    let a = Icosphere::new(3, 4.);
    let b = Icosphere::new(3, 4.);
    assert_eq!(a.triangles, b.triangles);
    for (a, b) in a.vertices.iter().zip(&b.vertices) {
        assert!(a.distance(*b) < 1e-5);
    }
}
