//! Convex meshes
//!
//! A [`ConvexMesh`] is one convex hull in local space, stored as a flat
//! triangle list: every three vertices form one triangle, wound
//! counter-clockwise when seen from outside. Concave objects are expected to
//! arrive already decomposed into several hulls.

use glam::Vec3;
use tumble_core::Aabb;

use crate::error::{PhysicsError, PhysicsResult};

/// Smallest enclosed volume accepted for a hull
const MIN_HULL_VOLUME: f32 = 1e-9;

/// One convex hull in local space
#[derive(Debug, Clone, PartialEq)]
pub struct ConvexMesh {
    /// Triangle list, three vertices per face
    vertices: Vec<Vec3>,
    /// Deduplicated hull points, scanned by the support function
    points: Vec<Vec3>,
    local_aabb: Aabb,
    bounding_radius: f32,
    volume: f32,
}

impl ConvexMesh {
    /// Build a hull from a triangle list.
    ///
    /// # Panics
    /// On empty, malformed or zero-volume input. Use [`ConvexMesh::try_new`]
    /// for content that comes from outside the program.
    pub fn new(vertices: Vec<Vec3>) -> Self {
        match Self::try_new(vertices) {
            Ok(mesh) => mesh,
            Err(err) => panic!("invalid convex mesh: {err}"),
        }
    }

    /// Build a hull from a triangle list, reporting malformed input
    pub fn try_new(vertices: Vec<Vec3>) -> PhysicsResult<Self> {
        if vertices.is_empty() {
            return Err(PhysicsError::EmptyMesh);
        }
        if vertices.len() % 3 != 0 {
            return Err(PhysicsError::MalformedMesh(vertices.len()));
        }
        if vertices.iter().any(|v| !v.is_finite()) {
            return Err(PhysicsError::NonFiniteVertex);
        }

        let volume = vertices
            .chunks_exact(3)
            .map(|tri| tri[0].dot(tri[1].cross(tri[2])))
            .sum::<f32>()
            / 6.0;
        if volume <= MIN_HULL_VOLUME {
            return Err(PhysicsError::DegenerateMesh(volume));
        }

        let mut points: Vec<Vec3> = Vec::with_capacity(vertices.len() / 3);
        for &v in &vertices {
            if !points.contains(&v) {
                points.push(v);
            }
        }

        let local_aabb = Aabb::from_points(points.iter().copied());
        let bounding_radius = points.iter().map(|p| p.length()).fold(0.0, f32::max);

        Ok(Self {
            vertices,
            points,
            local_aabb,
            bounding_radius,
            volume,
        })
    }

    /// Axis-aligned box centered on the local origin
    pub fn cuboid(half_extents: Vec3) -> Self {
        let h = half_extents;
        // Corner index bits: 1 = +x, 2 = +y, 4 = +z
        let corner = |i: usize| {
            Vec3::new(
                if i & 1 != 0 { h.x } else { -h.x },
                if i & 2 != 0 { h.y } else { -h.y },
                if i & 4 != 0 { h.z } else { -h.z },
            )
        };
        const QUADS: [[usize; 4]; 6] = [
            [1, 3, 7, 5], // +x
            [0, 4, 6, 2], // -x
            [2, 6, 7, 3], // +y
            [0, 1, 5, 4], // -y
            [4, 5, 7, 6], // +z
            [0, 2, 3, 1], // -z
        ];

        let mut vertices = Vec::with_capacity(36);
        for [a, b, c, d] in QUADS {
            vertices.extend([corner(a), corner(b), corner(c)]);
            vertices.extend([corner(a), corner(c), corner(d)]);
        }
        Self::new(vertices)
    }

    /// Regular octahedron with its six tips on the local axes
    pub fn octahedron(radius: f32) -> Self {
        let tips = [
            Vec3::X * radius,
            Vec3::NEG_X * radius,
            Vec3::Y * radius,
            Vec3::NEG_Y * radius,
            Vec3::Z * radius,
            Vec3::NEG_Z * radius,
        ];
        let mut vertices = Vec::with_capacity(24);
        for &x in &tips[0..2] {
            for &y in &tips[2..4] {
                for &z in &tips[4..6] {
                    // Outward winding flips with the parity of negative tips
                    let negatives = [x.x, y.y, z.z].iter().filter(|c| **c < 0.0).count();
                    if negatives % 2 == 0 {
                        vertices.extend([x, y, z]);
                    } else {
                        vertices.extend([x, z, y]);
                    }
                }
            }
        }
        Self::new(vertices)
    }

    /// Triangle-list vertices
    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    /// Unique hull points
    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    /// Triangles as vertex triples
    pub fn triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        self.vertices
            .chunks_exact(3)
            .map(|tri| [tri[0], tri[1], tri[2]])
    }

    /// Local-space bounds
    pub fn local_aabb(&self) -> Aabb {
        self.local_aabb
    }

    /// Largest distance from the local origin to a hull point
    pub fn bounding_radius(&self) -> f32 {
        self.bounding_radius
    }

    /// Enclosed volume
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Farthest hull point along `direction`, both in local space.
    ///
    /// Linear in the number of points. Ties keep the first point found.
    pub fn support_local(&self, direction: Vec3) -> Vec3 {
        let mut best = self.points[0];
        let mut best_dot = best.dot(direction);
        for &p in &self.points[1..] {
            let d = p.dot(direction);
            if d > best_dot {
                best = p;
                best_dot = d;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_outward(mesh: &ConvexMesh) {
        for [a, b, c] in mesh.triangles() {
            let normal = (b - a).cross(c - a);
            let centroid = (a + b + c) / 3.0;
            assert!(normal.dot(centroid) > 0.0, "inward triangle {a} {b} {c}");
        }
    }

    #[test]
    fn test_cuboid() {
        let mesh = ConvexMesh::cuboid(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(mesh.vertices().len(), 36);
        assert_eq!(mesh.points().len(), 8);
        assert!((mesh.volume() - 48.0).abs() < 1e-4);
        assert_eq!(mesh.local_aabb().max, Vec3::new(1.0, 2.0, 3.0));
        assert_outward(&mesh);
    }

    #[test]
    fn test_octahedron() {
        let mesh = ConvexMesh::octahedron(1.0);
        assert_eq!(mesh.vertices().len(), 24);
        assert_eq!(mesh.points().len(), 6);
        assert!((mesh.volume() - 4.0 / 3.0).abs() < 1e-4);
        assert!((mesh.bounding_radius() - 1.0).abs() < 1e-6);
        assert_outward(&mesh);
    }

    #[test]
    fn test_support_local() {
        let mesh = ConvexMesh::cuboid(Vec3::splat(0.5));
        assert_eq!(mesh.support_local(Vec3::new(1.0, 1.0, 1.0)), Vec3::splat(0.5));
        assert_eq!(mesh.support_local(Vec3::new(-1.0, 0.2, -0.3)), Vec3::new(-0.5, 0.5, -0.5));
    }

    #[test]
    fn test_try_new_errors() {
        assert_eq!(ConvexMesh::try_new(vec![]), Err(PhysicsError::EmptyMesh));
        assert_eq!(
            ConvexMesh::try_new(vec![Vec3::ZERO; 4]),
            Err(PhysicsError::MalformedMesh(4))
        );
        assert_eq!(
            ConvexMesh::try_new(vec![Vec3::ZERO, Vec3::X, Vec3::splat(f32::NAN)]),
            Err(PhysicsError::NonFiniteVertex)
        );
        assert!(matches!(
            ConvexMesh::try_new(vec![Vec3::ZERO, Vec3::X, Vec3::Y]),
            Err(PhysicsError::DegenerateMesh(_))
        ));
    }

    #[test]
    fn test_inside_out_mesh_rejected() {
        let mut flipped = ConvexMesh::cuboid(Vec3::ONE).vertices().to_vec();
        for tri in flipped.chunks_exact_mut(3) {
            tri.swap(1, 2);
        }
        assert!(matches!(
            ConvexMesh::try_new(flipped),
            Err(PhysicsError::DegenerateMesh(v)) if v < 0.0
        ));
    }

    #[test]
    #[should_panic(expected = "invalid convex mesh")]
    fn test_new_panics_on_empty() {
        let _ = ConvexMesh::new(Vec::new());
    }
}
