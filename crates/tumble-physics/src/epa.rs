//! Expanding Polytope Algorithm
//!
//! Grows the terminal GJK simplex into a polytope inside the Minkowski
//! difference until the face nearest the origin stops moving. That face's
//! normal is the minimum translation direction and its distance is the
//! penetration depth.

use glam::{Quat, Vec3};

use crate::gjk::{minkowski_support, Simplex, SupportMap};

/// Convergence tolerance on the distance of the closest face
pub const EPA_TOLERANCE: f32 = 1e-4;

/// Smallest distance between polytope points considered distinct
const MIN_SEPARATION: f32 = 1e-6;

/// Base iteration budget before the per-vertex allowance
const BASE_ITERATIONS: usize = 64;

/// Result of a successful expansion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Penetration {
    /// Unit normal pointing from A toward B
    pub normal: Vec3,
    /// Distance A must move along `-normal` to separate, never negative
    pub depth: f32,
}

#[derive(Debug, Clone, Copy)]
struct Face {
    indices: [usize; 3],
    normal: Vec3,
    distance: f32,
}

impl Face {
    fn new(points: &[Vec3], indices: [usize; 3]) -> Self {
        let [a, b, c] = indices.map(|i| points[i]);
        match (b - a).cross(c - a).try_normalize() {
            Some(normal) => Self {
                indices,
                normal,
                distance: normal.dot(a),
            },
            // Slivers have no plane and are never picked
            None => Self {
                indices,
                normal: Vec3::ZERO,
                distance: f32::INFINITY,
            },
        }
    }

    /// Whether `point` lies in front of the face. Slivers always give way so
    /// the next expansion replaces them.
    fn is_visible_from(&self, points: &[Vec3], point: Vec3) -> bool {
        !self.distance.is_finite() || self.normal.dot(point - points[self.indices[0]]) > 0.0
    }
}

/// Penetration depth and normal of two overlapping shapes, starting from
/// the simplex [`gjk::intersect`](crate::gjk::intersect) returned.
///
/// Returns `None` when the Minkowski difference is flat, which happens for
/// shapes that only touch.
pub fn penetration<A, B>(simplex: &Simplex, a: &A, b: &B) -> Option<Penetration>
where
    A: SupportMap + ?Sized,
    B: SupportMap + ?Sized,
{
    let mut points: Vec<Vec3> = simplex.to_vec();
    blow_up(&mut points, a, b)?;

    // Wind the tetrahedron so every face normal points outward
    let orientation = (points[1] - points[0])
        .cross(points[2] - points[0])
        .dot(points[3] - points[0]);
    if orientation > 0.0 {
        points.swap(1, 2);
    }
    let mut faces: Vec<Face> = [[0, 1, 2], [0, 3, 1], [0, 2, 3], [1, 3, 2]]
        .into_iter()
        .map(|indices| Face::new(&points, indices))
        .collect();

    let cap = BASE_ITERATIONS + a.point_count() + b.point_count();
    let mut edges: Vec<[usize; 2]> = Vec::new();

    for _ in 0..cap {
        let closest = closest_face(&faces)?;
        let support = minkowski_support(a, b, closest.normal);
        let reach = support.dot(closest.normal);

        if reach - closest.distance < EPA_TOLERANCE {
            return Some(Penetration {
                normal: closest.normal,
                depth: closest.distance.max(0.0),
            });
        }

        expand(&mut points, &mut faces, &mut edges, support);
    }

    let closest = closest_face(&faces)?;
    log::warn!(
        "EPA stopped after {cap} iterations at depth {}",
        closest.distance
    );
    Some(Penetration {
        normal: closest.normal,
        depth: closest.distance.max(0.0),
    })
}

fn closest_face(faces: &[Face]) -> Option<Face> {
    faces
        .iter()
        .filter(|face| face.distance.is_finite())
        .min_by(|x, y| x.distance.total_cmp(&y.distance))
        .copied()
}

/// Add `support` to the polytope, replacing every face it can see with a fan
/// from the new point to the horizon.
fn expand(points: &mut Vec<Vec3>, faces: &mut Vec<Face>, edges: &mut Vec<[usize; 2]>, support: Vec3) {
    let new_index = points.len();
    points.push(support);

    edges.clear();
    faces.retain(|face| {
        let visible = face.is_visible_from(points, support);
        if visible {
            let [i, j, k] = face.indices;
            add_edge(edges, i, j);
            add_edge(edges, j, k);
            add_edge(edges, k, i);
        }
        !visible
    });
    faces.extend(
        edges
            .iter()
            .map(|&[i, j]| Face::new(points, [i, j, new_index])),
    );
}

/// Record an edge of a removed face; an edge seen from both sides is interior
fn add_edge(edges: &mut Vec<[usize; 2]>, i: usize, j: usize) {
    if let Some(pos) = edges.iter().position(|&[a, b]| a == j && b == i) {
        edges.swap_remove(pos);
    } else {
        edges.push([i, j]);
    }
}

/// Extend a one to three point simplex to a tetrahedron with volume.
fn blow_up<A, B>(points: &mut Vec<Vec3>, a: &A, b: &B) -> Option<()>
where
    A: SupportMap + ?Sized,
    B: SupportMap + ?Sized,
{
    if points.len() == 1 {
        let origin = points[0];
        let found = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z]
            .into_iter()
            .map(|axis| minkowski_support(a, b, axis))
            .find(|p| p.distance(origin) > MIN_SEPARATION)?;
        points.push(found);
    }

    if points.len() == 2 {
        let line = points[1] - points[0];
        let axis = line.try_normalize()?;
        let start = axis.any_orthonormal_vector();
        let step = Quat::from_axis_angle(axis, std::f32::consts::FRAC_PI_3);
        let mut direction = start;
        let mut found = None;
        for _ in 0..6 {
            let p = minkowski_support(a, b, direction);
            if line.cross(p - points[0]).length() > MIN_SEPARATION * line.length() {
                found = Some(p);
                break;
            }
            direction = step * direction;
        }
        points.push(found?);
    }

    if points.len() == 3 {
        let normal = (points[1] - points[0])
            .cross(points[2] - points[0])
            .try_normalize()?;
        let off_plane = |p: Vec3| (p - points[0]).dot(normal).abs() > MIN_SEPARATION;
        let p = Some(minkowski_support(a, b, normal))
            .filter(|&p| off_plane(p))
            .or_else(|| Some(minkowski_support(a, b, -normal)).filter(|&p| off_plane(p)))?;
        points.push(p);
    }

    (points.len() == 4).then_some(())
}

#[cfg(test)]
mod tests {
    use tumble_core::Transform;

    use super::*;
    use crate::collider::WorldHull;
    use crate::gjk::{intersect, tests::Ball};
    use crate::shape::ConvexMesh;

    fn cube_penetration(offset: Vec3) -> Option<Penetration> {
        let mesh = ConvexMesh::cuboid(Vec3::splat(0.5));
        let ta = Transform::IDENTITY;
        let tb = Transform::from_position(offset);
        let a = WorldHull::new(&mesh, &ta);
        let b = WorldHull::new(&mesh, &tb);
        let simplex = intersect(&a, &b)?;
        penetration(&simplex, &a, &b)
    }

    #[test]
    fn test_cube_overlap_along_x() {
        let p = cube_penetration(Vec3::new(0.5, 0.0, 0.0)).expect("overlap");
        assert!((p.normal - Vec3::X).length() < 1e-4, "normal {}", p.normal);
        assert!((p.depth - 0.5).abs() < 1e-3, "depth {}", p.depth);
    }

    #[test]
    fn test_cube_overlap_picks_shallow_axis() {
        let p = cube_penetration(Vec3::new(0.2, -0.9, 0.1)).expect("overlap");
        assert!((p.normal - Vec3::NEG_Y).length() < 1e-4, "normal {}", p.normal);
        assert!((p.depth - 0.1).abs() < 1e-3, "depth {}", p.depth);
    }

    #[test]
    fn test_ball_depth() {
        let a = Ball { center: Vec3::ZERO, radius: 1.0 };
        let b = Ball { center: Vec3::new(0.0, 0.0, 1.5), radius: 1.0 };
        let simplex = intersect(&a, &b).expect("overlap");
        let p = penetration(&simplex, &a, &b).expect("depth");
        // A polytope approximation of a sphere only converges from the inside
        assert!(p.depth <= 0.5 + 1e-3);
        assert!(p.depth > 0.4, "depth {}", p.depth);
        assert!(p.normal.z > 0.9, "normal {}", p.normal);
    }

    /// Every directed edge has its reverse in some other face
    fn is_closed(faces: &[Face]) -> bool {
        let edges: Vec<[usize; 2]> = faces
            .iter()
            .flat_map(|f| {
                let [i, j, k] = f.indices;
                [[i, j], [j, k], [k, i]]
            })
            .collect();
        edges.iter().all(|&[i, j]| edges.contains(&[j, i]))
    }

    #[test]
    fn test_sliver_face_is_always_visible() {
        let points = [Vec3::ZERO, Vec3::X, Vec3::X * 2.0];
        let sliver = Face::new(&points, [0, 1, 2]);
        assert!(!sliver.distance.is_finite());
        assert!(sliver.is_visible_from(&points, Vec3::NEG_Y * 10.0));
        assert!(sliver.is_visible_from(&points, Vec3::Y * 10.0));
    }

    #[test]
    fn test_expansion_replaces_sliver_next_to_visible_faces() {
        // Unit corner tetrahedron whose slanted face is split at the middle of
        // edge 1-3, with a zero-area face closing the split
        let mut points = vec![
            Vec3::ZERO,
            Vec3::X,
            Vec3::Y,
            Vec3::Z,
            Vec3::new(0.5, 0.0, 0.5),
        ];
        let mut faces: Vec<Face> = [[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 4], [4, 2, 3], [1, 4, 3]]
            .into_iter()
            .map(|indices| Face::new(&points, indices))
            .collect();
        assert!(is_closed(&faces));
        assert_eq!(faces.iter().filter(|f| !f.distance.is_finite()).count(), 1);

        let mut edges = Vec::new();
        expand(&mut points, &mut faces, &mut edges, Vec3::ONE);

        assert!(is_closed(&faces));
        assert_eq!(faces.len(), 6);
        assert!(faces.iter().all(|f| f.distance.is_finite()));
        assert!(faces.iter().all(|f| f.indices.iter().all(|&i| i != 4)));
    }

    #[test]
    fn test_add_edge_cancels_shared_edges() {
        let mut edges = Vec::new();
        add_edge(&mut edges, 0, 1);
        add_edge(&mut edges, 1, 2);
        add_edge(&mut edges, 1, 0);
        assert_eq!(edges, vec![[1, 2]]);
    }
}
