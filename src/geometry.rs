//! Small geometric queries shared by density sampling and ray casting

use bevy::prelude::*;

/// Triangles with a squared normal length below this are treated as degenerate
const DEGENERATE_AREA: f32 = 1e-12;
/// Rays closer to parallel than this miss the triangle
const RAY_EPSILON: f32 = 1e-7;

/// The closest point to `p` on the segment `a`-`b`
pub fn closest_point_on_segment(p: Vec3, a: Vec3, b: Vec3) -> Vec3 {
    let ab = b - a;
    let length_squared = ab.length_squared();
    if length_squared <= f32::EPSILON {
        return a;
    }
    a + ab * ((p - a).dot(ab) / length_squared).clamp(0., 1.)
}

/// The closest point to `p` on the triangle `a`, `b`, `c`.
///
/// Finds the Voronoi region of the triangle `p` projects into: one of the three vertices, one of
/// the three edges, or the face itself. Degenerate triangles fall back to the closest of their
/// edges.
pub fn closest_point_on_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let ab = b - a;
    let ac = c - a;
    if ab.cross(ac).length_squared() <= DEGENERATE_AREA {
        return [
            closest_point_on_segment(p, a, b),
            closest_point_on_segment(p, b, c),
            closest_point_on_segment(p, c, a),
        ]
        .into_iter()
        .min_by(|x, y| x.distance_squared(p).total_cmp(&y.distance_squared(p)))
        .unwrap_or(a);
    }

    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0. && d2 <= 0. {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0. && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0. && d1 >= 0. && d3 <= 0. {
        return a + ab * (d1 / (d1 - d3));
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0. && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0. && d2 >= 0. && d6 <= 0. {
        return a + ac * (d2 / (d2 - d6));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0. && (d4 - d3) >= 0. && (d5 - d6) >= 0. {
        return b + (c - b) * ((d4 - d3) / ((d4 - d3) + (d5 - d6)));
    }

    let denom = 1. / (va + vb + vc);
    a + ab * (vb * denom) + ac * (vc * denom)
}

/// Möller-Trumbore intersection. Returns the distance along `dir` to the hit, only hits in front
/// of the origin count. Both faces of the triangle are hit.
pub fn ray_triangle(origin: Vec3, dir: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    let e1 = b - a;
    let e2 = c - a;
    let h = dir.cross(e2);
    let det = e1.dot(h);
    if det.abs() < RAY_EPSILON {
        return None;
    }

    let inv = 1. / det;
    let s = origin - a;
    let u = inv * s.dot(h);
    if !(0. ..=1.).contains(&u) {
        return None;
    }

    let q = s.cross(e1);
    let v = inv * dir.dot(q);
    if v < 0. || u + v > 1. {
        return None;
    }

    let t = inv * e2.dot(q);
    (t > RAY_EPSILON).then_some(t)
}

/// Slab test against an axis aligned box. Returns the entry and exit distance along `dir`, the
/// entry distance is 0 if the origin is inside the box
pub fn ray_aabb(origin: Vec3, dir: Vec3, min: Vec3, max: Vec3) -> Option<(f32, f32)> {
    let mut near = 0f32;
    let mut far = f32::INFINITY;

    for axis in 0..3 {
        let (o, d) = (origin[axis], dir[axis]);
        if d.abs() < RAY_EPSILON {
            if o < min[axis] || o > max[axis] {
                return None;
            }
            continue;
        }

        let inv = 1. / d;
        let mut t0 = (min[axis] - o) * inv;
        let mut t1 = (max[axis] - o) * inv;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        near = near.max(t0);
        far = far.min(t1);
        if near > far {
            return None;
        }
    }

    Some((near, far))
}

#[cfg(test)]
const TRIANGLE: [Vec3; 3] = [
    Vec3::new(0., 0., 0.),
    Vec3::new(2., 0., 0.),
    Vec3::new(0., 2., 0.),
];

#[test]
fn test_closest_point_regions() {
    let [a, b, c] = TRIANGLE;
    let cases = [
        // Face
        (Vec3::new(0.5, 0.5, 3.), Vec3::new(0.5, 0.5, 0.)),
        // Vertices
        (Vec3::new(-1., -1., 1.), a),
        (Vec3::new(4., -1., 0.), b),
        (Vec3::new(-1., 4., -2.), c),
        // Edges
        (Vec3::new(1., -3., 0.), Vec3::new(1., 0., 0.)),
        (Vec3::new(-3., 1., 0.), Vec3::new(0., 1., 0.)),
        (Vec3::new(2., 2., 1.), Vec3::new(1., 1., 0.)),
    ];
    for (p, expected) in cases {
        let closest = closest_point_on_triangle(p, a, b, c);
        assert!(closest.distance(expected) < 1e-5, "{p} gave {closest}");
    }
}

#[test]
fn test_closest_point_degenerate() {
    let a = Vec3::ZERO;
    let b = Vec3::X;
    let closest = closest_point_on_triangle(Vec3::new(0.5, 1., 0.), a, b, b * 2.);
    assert!(closest.distance(Vec3::new(0.5, 0., 0.)) < 1e-6);
    let closest = closest_point_on_triangle(Vec3::ONE, a, a, a);
    assert_eq!(a, closest);
}

#[test]
fn test_ray_triangle() {
    let [a, b, c] = TRIANGLE;
    assert_eq!(
        Some(3.),
        ray_triangle(Vec3::new(0.5, 0.5, 3.), Vec3::NEG_Z, a, b, c)
    );
    assert_eq!(
        Some(3.),
        ray_triangle(Vec3::new(0.5, 0.5, -3.), Vec3::Z, a, b, c)
    );
    // Behind the origin
    assert_eq!(None, ray_triangle(Vec3::new(0.5, 0.5, 3.), Vec3::Z, a, b, c));
    // Outside the triangle
    assert_eq!(None, ray_triangle(Vec3::new(2., 2., 3.), Vec3::NEG_Z, a, b, c));
    // Parallel
    assert_eq!(None, ray_triangle(Vec3::new(0.5, 0.5, 0.), Vec3::X, a, b, c));
}

#[test]
fn test_ray_aabb() {
    let (min, max) = (Vec3::splat(-1.), Vec3::splat(1.));
    assert_eq!(
        Some((4., 6.)),
        ray_aabb(Vec3::new(-5., 0., 0.), Vec3::X, min, max)
    );
    assert_eq!(Some((0., 1.)), ray_aabb(Vec3::ZERO, Vec3::Y, min, max));
    assert_eq!(None, ray_aabb(Vec3::new(-5., 2., 0.), Vec3::X, min, max));
    assert_eq!(None, ray_aabb(Vec3::new(-5., 0., 0.), Vec3::NEG_X, min, max));
}
