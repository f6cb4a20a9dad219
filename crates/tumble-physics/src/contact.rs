//! Contact generation
//!
//! GJK decides whether two hulls overlap and EPA finds the separating normal
//! and depth. When one hull presents a face to that normal, the other hull's
//! most opposed face is clipped against it and every clipped corner that
//! reaches the reference face becomes a contact with its own depth, reduced
//! to at most four points spanning the largest area. Edges and vertices that
//! meet at an angle fall back to a single contact: the touching features
//! are projected onto the contact plane, their overlap is clipped, and its
//! centroid is lifted back to the plane halfway between the two surfaces.

use glam::{Vec2, Vec3};
use smallvec::{smallvec, SmallVec};
use tumble_core::Transform;

use crate::collider::{Collider, WorldHull};
use crate::epa::{self, Penetration};
use crate::gjk;

/// Points within this distance of a hull's extreme along the normal belong to its feature
const FEATURE_TOLERANCE: f32 = 1e-3;

/// Distance below which two projected points are the same point
const MERGE_DISTANCE: f32 = 1e-5;

/// Hull points this close to a face's plane belong to the face
const COPLANAR_TOLERANCE: f32 = 1e-4;

/// A face whose normal is at least this aligned with the contact normal is clipped against
const FACE_ALIGNMENT: f32 = 0.999;

/// Incident faces closer than this to perpendicular are not clipped
const MIN_INCIDENT_SLOPE: f32 = 1e-3;

/// Most contacts kept for one pair of hulls
pub const MAX_MANIFOLD_POINTS: usize = 4;

/// Contacts of one hull pair, all sharing the same normal
pub type Manifold = SmallVec<[Contact; MAX_MANIFOLD_POINTS]>;

type Polygon = SmallVec<[Vec2; 8]>;

/// A single contact between two hulls
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// World-space contact point, midway between the surfaces
    pub position: Vec3,
    /// Unit normal pointing from A toward B
    pub normal: Vec3,
    /// Overlap depth along the normal, never negative
    pub penetration: f32,
}

/// Single representative contact between two hulls, or `None` if they do not overlap.
///
/// The position is the centroid of the touching features' overlap.
pub fn hull_contact(a: &WorldHull<'_>, b: &WorldHull<'_>) -> Option<Contact> {
    penetration(a, b).map(|p| centroid_contact(a, b, p))
}

/// Contact manifold between two hulls, empty if they do not overlap
pub fn hull_contacts(a: &WorldHull<'_>, b: &WorldHull<'_>) -> Manifold {
    let Some(penetration) = penetration(a, b) else {
        return Manifold::new();
    };
    let manifold = face_manifold(a, b, penetration.normal);
    if manifold.is_empty() {
        smallvec![centroid_contact(a, b, penetration)]
    } else {
        manifold
    }
}

/// Append the manifold of every overlapping hull pair of two colliders.
/// Returns the number of contacts added.
pub fn collider_contacts(
    a: &Collider,
    ta: &Transform,
    b: &Collider,
    tb: &Transform,
    out: &mut Vec<Contact>,
) -> usize {
    let before = out.len();
    for i in 0..a.meshes().len() {
        let hull_a = a.world_hull(i, ta);
        for j in 0..b.meshes().len() {
            out.extend(hull_contacts(&hull_a, &b.world_hull(j, tb)));
        }
    }
    out.len() - before
}

fn penetration(a: &WorldHull<'_>, b: &WorldHull<'_>) -> Option<Penetration> {
    let simplex = gjk::intersect(a, b)?;
    epa::penetration(&simplex, a, b)
}

fn centroid_contact(a: &WorldHull<'_>, b: &WorldHull<'_>, penetration: Penetration) -> Contact {
    let Penetration { normal, depth } = penetration;
    Contact {
        position: contact_point(a, b, normal),
        normal,
        penetration: depth,
    }
}

/// A flat face of a hull in world space
#[derive(Debug)]
struct HullFace {
    /// Outward unit normal
    normal: Vec3,
    /// Plane offset along `normal`
    offset: f32,
    points: SmallVec<[Vec3; 8]>,
}

/// The face of `hull` whose normal points furthest along `direction`
fn best_face(hull: &WorldHull<'_>, direction: Vec3) -> Option<HullFace> {
    let (normal, anchor) = hull
        .world_triangles()
        .filter_map(|[a, b, c]| Some(((b - a).cross(c - a).try_normalize()?, a)))
        .max_by(|(n, _), (m, _)| n.dot(direction).total_cmp(&m.dot(direction)))?;
    let offset = normal.dot(anchor);
    let points = hull
        .world_points()
        .filter(|p| (normal.dot(*p) - offset).abs() <= COPLANAR_TOLERANCE)
        .collect();
    Some(HullFace {
        normal,
        offset,
        points,
    })
}

/// Clip the incident face against the reference face, the better aligned of
/// the two faces presented along `normal`. Empty when neither face is aligned
/// closely enough, which leaves the pair to the centroid contact.
fn face_manifold(a: &WorldHull<'_>, b: &WorldHull<'_>, normal: Vec3) -> Manifold {
    let mut manifold = Manifold::new();
    let (Some(face_a), Some(face_b)) = (best_face(a, normal), best_face(b, -normal)) else {
        return manifold;
    };
    let (align_a, align_b) = (face_a.normal.dot(normal), -face_b.normal.dot(normal));
    if align_a.max(align_b) < FACE_ALIGNMENT {
        return manifold;
    }
    let (reference, incident_hull, flipped) = if align_a >= align_b {
        (face_a, b, false)
    } else {
        (face_b, a, true)
    };
    let Some(incident) = best_face(incident_hull, -reference.normal) else {
        return manifold;
    };
    let slope = incident.normal.dot(reference.normal);
    if slope.abs() < MIN_INCIDENT_SLOPE {
        return manifold;
    }

    let (t1, t2) = reference.normal.any_orthonormal_pair();
    let project = |p: Vec3| Vec2::new(p.dot(t1), p.dot(t2));
    let clipper = convex_hull(reference.points.iter().map(|&p| project(p)));
    if clipper.len() < 3 {
        return manifold;
    }
    let subject = convex_hull(incident.points.iter().map(|&p| project(p)));

    let mut points = Polygon::new();
    let mut contacts: SmallVec<[Contact; 8]> = SmallVec::new();
    let contact_normal = if flipped { -reference.normal } else { reference.normal };
    for q in clip(&subject, &clipper) {
        if points.iter().any(|p| p.distance(q) < MERGE_DISTANCE) {
            continue;
        }
        let on_plane = t1 * q.x + t2 * q.y;
        // Height of the incident face over `q` along the reference normal
        let height = (incident.offset - incident.normal.dot(on_plane)) / slope;
        let separation = height - reference.offset;
        if separation > FEATURE_TOLERANCE {
            continue;
        }
        points.push(q);
        contacts.push(Contact {
            position: on_plane + reference.normal * (0.5 * (height + reference.offset)),
            normal: contact_normal,
            penetration: (-separation).max(0.0),
        });
    }

    let depths: SmallVec<[f32; 8]> = contacts.iter().map(|c| c.penetration).collect();
    manifold.extend(
        spanning_points(&points, &depths)
            .into_iter()
            .map(|i| contacts[i]),
    );
    manifold
}

/// Indices of at most [`MAX_MANIFOLD_POINTS`] points: the deepest, the one
/// farthest from it, then the furthest on either side of the line between them.
fn spanning_points(points: &[Vec2], depths: &[f32]) -> SmallVec<[usize; MAX_MANIFOLD_POINTS]> {
    if points.len() <= MAX_MANIFOLD_POINTS {
        return (0..points.len()).collect();
    }
    let arg_max = |score: &dyn Fn(usize) -> f32| {
        (0..points.len())
            .max_by(|&i, &j| score(i).total_cmp(&score(j)))
            .unwrap_or(0)
    };
    let deepest = arg_max(&|i| depths[i]);
    let p0 = points[deepest];
    let farthest = arg_max(&|i| points[i].distance_squared(p0));
    let edge = points[farthest] - p0;
    let left = arg_max(&|i| edge.perp_dot(points[i] - p0));
    let right = arg_max(&|i| -edge.perp_dot(points[i] - p0));

    let mut picked = SmallVec::new();
    for i in [deepest, farthest, left, right] {
        if !picked.contains(&i) {
            picked.push(i);
        }
    }
    picked
}

fn contact_point(a: &WorldHull<'_>, b: &WorldHull<'_>, normal: Vec3) -> Vec3 {
    let (t1, t2) = normal.any_orthonormal_pair();
    let project = |p: Vec3| Vec2::new(p.dot(t1), p.dot(t2));

    let a_points: SmallVec<[Vec3; 16]> = a.world_points().collect();
    let b_points: SmallVec<[Vec3; 16]> = b.world_points().collect();
    let a_front = a_points
        .iter()
        .map(|p| p.dot(normal))
        .fold(f32::NEG_INFINITY, f32::max);
    let b_back = b_points
        .iter()
        .map(|p| p.dot(normal))
        .fold(f32::INFINITY, f32::min);

    let a_feature = convex_hull(
        a_points
            .iter()
            .filter(|p| p.dot(normal) >= a_front - FEATURE_TOLERANCE)
            .map(|&p| project(p)),
    );
    let b_feature = convex_hull(
        b_points
            .iter()
            .filter(|p| p.dot(normal) <= b_back + FEATURE_TOLERANCE)
            .map(|&p| project(p)),
    );

    let center = overlap_center(&a_feature, &b_feature)
        .unwrap_or_else(|| 0.5 * (mean(&a_feature) + mean(&b_feature)));
    t1 * center.x + t2 * center.y + normal * (0.5 * (a_front + b_back))
}

/// Center of the region shared by two projected features
fn overlap_center(a: &[Vec2], b: &[Vec2]) -> Option<Vec2> {
    match (a.len(), b.len()) {
        (0, _) | (_, 0) => None,
        // A vertex touches whatever the other side presents
        (1, _) => Some(a[0]),
        (_, 1) => Some(b[0]),
        (2, 2) => segment_overlap(a[0], a[1], b[0], b[1]),
        (2, _) => centroid(&clip(a, b)),
        _ => centroid(&clip(b, a)),
    }
}

/// Monotone chain hull, counter-clockwise, duplicates merged.
/// One or two input points come back as a point or segment.
fn convex_hull(points: impl Iterator<Item = Vec2>) -> Polygon {
    let mut sorted: Polygon = points.collect();
    sorted.sort_by(|p, q| p.x.total_cmp(&q.x).then(p.y.total_cmp(&q.y)));
    sorted.dedup_by(|p, q| p.distance(*q) < MERGE_DISTANCE);
    if sorted.len() < 3 {
        return sorted;
    }

    let turn = |o: Vec2, a: Vec2, b: Vec2| (a - o).perp_dot(b - o);
    let mut hull = Polygon::new();
    for pass in 0..2 {
        let start = hull.len();
        let chain = |p: Vec2, hull: &mut Polygon| {
            while hull.len() >= start + 2
                && turn(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0
            {
                hull.pop();
            }
            hull.push(p);
        };
        if pass == 0 {
            sorted.iter().for_each(|&p| chain(p, &mut hull));
        } else {
            sorted.iter().rev().for_each(|&p| chain(p, &mut hull));
        }
        // The last point of each chain starts the next one
        hull.pop();
    }

    if hull.len() < 3 {
        // Collinear input: keep the two extremes
        let mut ends = Polygon::new();
        ends.push(sorted[0]);
        ends.push(sorted[sorted.len() - 1]);
        return ends;
    }
    hull
}

/// Sutherland-Hodgman: clip `subject` by the convex counter-clockwise polygon `clipper`
fn clip(subject: &[Vec2], clipper: &[Vec2]) -> Polygon {
    let mut output: Polygon = subject.iter().copied().collect();
    for (i, &edge_start) in clipper.iter().enumerate() {
        let edge_end = clipper[(i + 1) % clipper.len()];
        let edge = edge_end - edge_start;
        let side = |p: Vec2| edge.perp_dot(p - edge_start);

        let input = std::mem::take(&mut output);
        let Some(&last) = input.last() else {
            break;
        };
        let mut previous = last;
        for &current in &input {
            let (sp, sc) = (side(previous), side(current));
            if sc >= -MERGE_DISTANCE {
                if sp < -MERGE_DISTANCE {
                    output.push(previous + (current - previous) * (sp / (sp - sc)));
                }
                output.push(current);
            } else if sp >= -MERGE_DISTANCE {
                output.push(previous + (current - previous) * (sp / (sp - sc)));
            }
            previous = current;
        }
    }
    output
}

/// Area centroid, or the mean of the distinct points for degenerate polygons
fn centroid(polygon: &[Vec2]) -> Option<Vec2> {
    if polygon.is_empty() {
        return None;
    }
    // Relative to the first vertex to keep far-away polygons precise
    let origin = polygon[0];
    let mut twice_area = 0.0;
    let mut weighted = Vec2::ZERO;
    for (i, &p) in polygon.iter().enumerate() {
        let (p, q) = (p - origin, polygon[(i + 1) % polygon.len()] - origin);
        let cross = p.perp_dot(q);
        twice_area += cross;
        weighted += (p + q) * cross;
    }
    if twice_area.abs() > MERGE_DISTANCE * MERGE_DISTANCE {
        return Some(origin + weighted / (3.0 * twice_area));
    }

    let mut distinct = Polygon::new();
    for &p in polygon {
        if distinct.iter().all(|d: &Vec2| d.distance(p) >= MERGE_DISTANCE) {
            distinct.push(p);
        }
    }
    Some(mean(&distinct))
}

/// Crossing point of two segments, or the middle of their shared span when parallel
fn segment_overlap(a0: Vec2, a1: Vec2, b0: Vec2, b1: Vec2) -> Option<Vec2> {
    let da = a1 - a0;
    let db = b1 - b0;
    let denom = da.perp_dot(db);
    if denom.abs() > 1e-6 * da.length() * db.length() {
        let t = (b0 - a0).perp_dot(db) / denom;
        let u = (b0 - a0).perp_dot(da) / denom;
        let range = -1e-4..=1.0 + 1e-4;
        return (range.contains(&t) && range.contains(&u)).then(|| a0 + da * t);
    }

    let dir = da.try_normalize().unwrap_or(Vec2::X);
    let span = |p: Vec2, q: Vec2| {
        let (s, t) = (p.dot(dir), q.dot(dir));
        (s.min(t), s.max(t))
    };
    let (a_lo, a_hi) = span(a0, a1);
    let (b_lo, b_hi) = span(b0, b1);
    let (lo, hi) = (a_lo.max(b_lo), a_hi.min(b_hi));
    if lo > hi + MERGE_DISTANCE {
        return None;
    }
    let across = dir.perp();
    let offset = (a0 + a1 + b0 + b1).dot(across) * 0.25;
    Some(dir * (0.5 * (lo + hi)) + across * offset)
}

fn mean(points: &[Vec2]) -> Vec2 {
    if points.is_empty() {
        return Vec2::ZERO;
    }
    points.iter().copied().sum::<Vec2>() / points.len() as f32
}
