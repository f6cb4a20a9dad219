//! GJK overlap test
//!
//! Searches the Minkowski difference `A - B` for the origin with a simplex of
//! one to four points, newest point last. The line, triangle and tetrahedron
//! cases keep the simplex wound so that the last face tested always faces
//! the origin.

use glam::Vec3;
use smallvec::SmallVec;

use crate::collider::WorldHull;

/// Squared length below which a search direction counts as zero
const DEGENERATE_DIRECTION: f32 = 1e-10;

/// Base iteration budget before the per-vertex allowance
const BASE_ITERATIONS: usize = 64;

/// Up to four points of the Minkowski difference
pub type Simplex = SmallVec<[Vec3; 4]>;

/// A convex shape queried through its support function
pub trait SupportMap {
    /// Farthest world point along `direction`
    fn support(&self, direction: Vec3) -> Vec3;

    /// A point inside the shape, used to seed the search
    fn center(&self) -> Vec3;

    /// Vertices scanned per support call, used to size the iteration budget
    fn point_count(&self) -> usize;
}

impl SupportMap for WorldHull<'_> {
    fn support(&self, direction: Vec3) -> Vec3 {
        WorldHull::support(self, direction)
    }

    fn center(&self) -> Vec3 {
        WorldHull::center(self)
    }

    fn point_count(&self) -> usize {
        WorldHull::point_count(self)
    }
}

/// Support point of the Minkowski difference `A - B`
#[inline]
pub fn minkowski_support<A, B>(a: &A, b: &B, direction: Vec3) -> Vec3
where
    A: SupportMap + ?Sized,
    B: SupportMap + ?Sized,
{
    a.support(direction) - b.support(-direction)
}

/// Iteration cap for a pair of shapes
pub fn iteration_cap(a_points: usize, b_points: usize) -> usize {
    BASE_ITERATIONS + 2 * (a_points + b_points)
}

/// Returns the terminal simplex if `a` and `b` overlap or touch.
///
/// Gives up after [`iteration_cap`] iterations and reports no overlap.
pub fn intersect<A, B>(a: &A, b: &B) -> Option<Simplex>
where
    A: SupportMap + ?Sized,
    B: SupportMap + ?Sized,
{
    let mut direction = a.center() - b.center();
    if direction.length_squared() < DEGENERATE_DIRECTION {
        direction = Vec3::X;
    }

    let mut simplex = Simplex::new();
    let first = minkowski_support(a, b, direction);
    simplex.push(first);
    direction = -first;

    let cap = iteration_cap(a.point_count(), b.point_count());
    for _ in 0..cap {
        // The origin lies on the current simplex
        if direction.length_squared() < DEGENERATE_DIRECTION {
            return Some(simplex);
        }

        let point = minkowski_support(a, b, direction);
        if point.dot(direction) <= 0.0 {
            return None;
        }
        simplex.push(point);

        if evolve(&mut simplex, &mut direction) {
            return Some(simplex);
        }
    }

    log::warn!("GJK gave up after {cap} iterations, treating the pair as separated");
    None
}

/// Whether `a` and `b` overlap or touch
pub fn overlaps<A, B>(a: &A, b: &B) -> bool
where
    A: SupportMap + ?Sized,
    B: SupportMap + ?Sized,
{
    intersect(a, b).is_some()
}

/// Reduce the simplex toward the origin and pick the next search direction.
/// Returns true once the simplex encloses the origin.
fn evolve(simplex: &mut Simplex, direction: &mut Vec3) -> bool {
    match simplex.len() {
        2 => line_case(simplex, direction),
        3 => triangle_case(simplex, direction),
        4 => tetrahedron_case(simplex, direction),
        n => unreachable!("GJK simplex with {n} points"),
    }
}

/// `(a x b) x c`
#[inline]
fn triple_cross(a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    a.cross(b).cross(c)
}

fn line_case(simplex: &mut Simplex, direction: &mut Vec3) -> bool {
    let a = simplex[1];
    let b = simplex[0];
    let ab = b - a;
    let ao = -a;

    if ab.dot(ao) > 0.0 {
        // Perpendicular to the segment, toward the origin
        *direction = triple_cross(ab, ao, ab);
    } else {
        *simplex = SmallVec::from_slice(&[a]);
        *direction = ao;
    }
    false
}

fn triangle_case(simplex: &mut Simplex, direction: &mut Vec3) -> bool {
    let a = simplex[2];
    let b = simplex[1];
    let c = simplex[0];
    let ab = b - a;
    let ac = c - a;
    let ao = -a;
    let abc = ab.cross(ac);

    if abc.cross(ac).dot(ao) > 0.0 {
        if ac.dot(ao) > 0.0 {
            *simplex = SmallVec::from_slice(&[c, a]);
            *direction = triple_cross(ac, ao, ac);
            false
        } else {
            *simplex = SmallVec::from_slice(&[b, a]);
            line_case(simplex, direction)
        }
    } else if ab.cross(abc).dot(ao) > 0.0 {
        *simplex = SmallVec::from_slice(&[b, a]);
        line_case(simplex, direction)
    } else if abc.dot(ao) > 0.0 {
        *direction = abc;
        false
    } else {
        // Below the face: flip the winding so the normal faces the origin
        *simplex = SmallVec::from_slice(&[b, c, a]);
        *direction = -abc;
        false
    }
}

fn tetrahedron_case(simplex: &mut Simplex, direction: &mut Vec3) -> bool {
    let a = simplex[3];
    let b = simplex[2];
    let c = simplex[1];
    let d = simplex[0];
    let ab = b - a;
    let ac = c - a;
    let ad = d - a;
    let ao = -a;

    // bcd was checked when the triangle was extended
    if ab.cross(ac).dot(ao) > 0.0 {
        *simplex = SmallVec::from_slice(&[c, b, a]);
        return triangle_case(simplex, direction);
    }
    if ac.cross(ad).dot(ao) > 0.0 {
        *simplex = SmallVec::from_slice(&[d, c, a]);
        return triangle_case(simplex, direction);
    }
    if ad.cross(ab).dot(ao) > 0.0 {
        *simplex = SmallVec::from_slice(&[b, d, a]);
        return triangle_case(simplex, direction);
    }
    true
}
