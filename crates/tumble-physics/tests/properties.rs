use glam::{Quat, Vec3};
use proptest::prelude::*;
use tumble_core::{Aabb, Transform};
use tumble_physics::contact::Contact;
use tumble_physics::gjk::overlaps;
use tumble_physics::resolver::{resolve_contact, ContactSide};
use tumble_physics::{ConvexMesh, RigidBody, Sas, SasConfig, WorldHull};

fn small_tree() -> Sas<u32> {
    Sas::new(SasConfig {
        split_threshold: 4,
        max_depth: 8,
    })
}

fn aabb_strategy() -> impl Strategy<Value = Aabb> {
    (
        -20.0f32..20.0,
        -20.0f32..20.0,
        -20.0f32..20.0,
        0.05f32..3.0,
        0.05f32..3.0,
        0.05f32..3.0,
    )
        .prop_map(|(x, y, z, hx, hy, hz)| {
            Aabb::from_center_half_extents(Vec3::new(x, y, z), Vec3::new(hx, hy, hz))
        })
}

fn brute_force(boxes: &[Aabb], query: &Aabb) -> Vec<u32> {
    boxes
        .iter()
        .enumerate()
        .filter(|(_, aabb)| aabb.intersects(query))
        .map(|(i, _)| i as u32)
        .collect()
}

fn sorted_query(tree: &mut Sas<u32>, query: &Aabb) -> Vec<u32> {
    let mut out = Vec::new();
    tree.query_aabb(query, &mut out);
    out.sort_unstable();
    out
}

fn rotation_strategy() -> impl Strategy<Value = Quat> {
    (-1.0f32..1.0, -1.0f32..1.0, -1.0f32..1.0, 0.0f32..std::f32::consts::TAU).prop_map(
        |(x, y, z, angle)| {
            Vec3::new(x, y, z)
                .try_normalize()
                .map_or(Quat::IDENTITY, |axis| Quat::from_axis_angle(axis, angle))
        },
    )
}

fn scaled(position: Vec3, rotation: Quat, factor: f32) -> Transform {
    Transform::new(position, rotation, Vec3::splat(factor))
}

proptest! {
    #[test]
    fn query_matches_brute_force(
        boxes in prop::collection::vec(aabb_strategy(), 1..80),
        queries in prop::collection::vec(aabb_strategy(), 1..8),
    ) {
        let mut tree = small_tree();
        for (i, aabb) in boxes.iter().enumerate() {
            tree.add_collider(i as u32, *aabb);
        }
        for query in &queries {
            prop_assert_eq!(sorted_query(&mut tree, query), brute_force(&boxes, query));
            prop_assert!(tree.check_containment());
        }
    }

    #[test]
    fn containment_holds_through_updates(
        boxes in prop::collection::vec(aabb_strategy(), 1..60),
        moves in prop::collection::vec((any::<prop::sample::Index>(), aabb_strategy()), 0..40),
        query in aabb_strategy(),
    ) {
        let mut boxes = boxes;
        let mut tree = small_tree();
        for (i, aabb) in boxes.iter().enumerate() {
            tree.add_collider(i as u32, *aabb);
        }
        // Force splits so updates have a real tree to move through
        sorted_query(&mut tree, &Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(30.0)));

        for (index, aabb) in moves {
            let i = index.index(boxes.len());
            boxes[i] = aabb;
            let node = tree.update_collider(i as u32, aabb);
            prop_assert_eq!(tree.node_of(i as u32), Some(node));
            prop_assert!(tree.check_containment());
            prop_assert_eq!(tree.update_collider(i as u32, aabb), node);
        }

        prop_assert_eq!(sorted_query(&mut tree, &query), brute_force(&boxes, &query));
        prop_assert!(tree.check_containment());
        prop_assert_eq!(tree.len(), boxes.len());
    }

    #[test]
    fn gjk_is_symmetric(
        pa in (-1.5f32..1.5, -1.5f32..1.5, -1.5f32..1.5),
        ra in rotation_strategy(),
        rb in rotation_strategy(),
        ha in (0.2f32..1.0, 0.2f32..1.0, 0.2f32..1.0),
        hb in (0.2f32..1.0, 0.2f32..1.0, 0.2f32..1.0),
    ) {
        let mesh_a = ConvexMesh::cuboid(Vec3::new(ha.0, ha.1, ha.2));
        let mesh_b = ConvexMesh::cuboid(Vec3::new(hb.0, hb.1, hb.2));
        let position_a = Vec3::new(pa.0, pa.1, pa.2);

        let classify = |factor: f32| {
            let ta = scaled(position_a, ra, factor);
            let tb = scaled(Vec3::ZERO, rb, factor);
            let a = WorldHull::new(&mesh_a, &ta);
            let b = WorldHull::new(&mesh_b, &tb);
            (overlaps(&a, &b), overlaps(&b, &a))
        };

        // Near-touching poses are ambiguous in floating point
        let (shrunk, _) = classify(0.99);
        let (grown, _) = classify(1.01);
        prop_assume!(shrunk == grown);

        let (ab, ba) = classify(1.0);
        prop_assert_eq!(ab, ba);
        prop_assert_eq!(ab, shrunk);
    }

    #[test]
    fn friction_never_exceeds_coulomb_limit(
        vx in -10.0f32..10.0,
        vz in -10.0f32..10.0,
        vy in -10.0f32..-0.01,
        spin in (-5.0f32..5.0, -5.0f32..5.0, -5.0f32..5.0),
        mu_a in 0.0f32..1.0,
        mu_b in 0.0f32..1.0,
        elasticity in 0.0f32..1.0,
    ) {
        let mut body = RigidBody::new(1.0, Vec3::splat(1.0 / 6.0)).with_velocity(Vec3::new(vx, vy, vz));
        body.angular_velocity = Vec3::new(spin.0, spin.1, spin.2);

        let mut floor = ContactSide {
            body: None,
            center: Vec3::new(0.0, -0.5, 0.0),
            rotation: Quat::IDENTITY,
            elasticity,
            friction: mu_a,
        };
        let mut cube = ContactSide {
            body: Some(&mut body),
            center: Vec3::new(0.0, 0.5, 0.0),
            rotation: Quat::IDENTITY,
            elasticity,
            friction: mu_b,
        };
        let contact = Contact {
            position: Vec3::ZERO,
            normal: Vec3::Y,
            penetration: 0.01,
        };

        let impulse = resolve_contact(&contact, &mut floor, &mut cube);
        prop_assert!(impulse.normal >= 0.0);
        prop_assert!(impulse.tangent <= mu_a * mu_b * impulse.normal * (1.0 + 1e-5) + 1e-6);
    }
}
