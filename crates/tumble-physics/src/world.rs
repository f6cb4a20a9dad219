//! Physics world
//!
//! Owns the objects, the SAS and the layer matrix, and advances them with a
//! fixed step made of three passes that always run in this order:
//!
//! 1. **Integrate** every dynamic body, then refresh the SAS entry of every
//!    collider whose transform moved.
//! 2. **Collide** every dynamic collider against its broad-phase candidates,
//!    then sweep impulses over all gathered contacts `solver_iterations`
//!    times, starting from the impulses the same contacts ended the previous
//!    step with. Positional corrections are only recorded.
//! 3. **Correct** by applying the recorded offsets, then refresh the SAS
//!    again for the objects that were pushed apart.
//!
//! Deferring the corrections keeps pass 2 independent of the order in which
//! pairs are found: every contact sees the poses produced by pass 1.

use ahash::AHashMap;
use glam::Vec3;
use serde::Serialize;
use smallvec::SmallVec;
use tumble_core::{Aabb, FixedStepAccumulator, FixedTimeStep, Transform};

use crate::body::RigidBody;
use crate::collider::Collider;
use crate::config::PhysicsConfig;
use crate::contact::{collider_contacts, Contact, MAX_MANIFOLD_POINTS};
use crate::error::PhysicsResult;
use crate::layers::{CollisionLayer, CollisionLayers, MAX_LAYERS};
use crate::objects::{ObjectHandle, ObjectSet, PhysicsObject};
use crate::resolver::{correction_offsets, AccumulatedImpulse, ContactConstraint, ContactSide};
use crate::sas::{NodeId, Sas};

/// What one call to [`PhysicsWorld::step`] did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StepStats {
    /// Dynamic bodies integrated in pass 1
    pub bodies_integrated: usize,
    /// SAS entries refreshed after motion
    pub sas_updates: usize,
    /// Collider pairs handed to the narrow phase
    pub candidate_pairs: usize,
    /// Contacts produced by the narrow phase
    pub contacts: usize,
    /// Contacts left holding an impulse after the last sweep
    pub impulses: usize,
    /// Objects moved by positional correction
    pub corrected: usize,
}

impl std::ops::AddAssign for StepStats {
    fn add_assign(&mut self, rhs: Self) {
        self.bodies_integrated += rhs.bodies_integrated;
        self.sas_updates += rhs.sas_updates;
        self.candidate_pairs += rhs.candidate_pairs;
        self.contacts += rhs.contacts;
        self.impulses += rhs.impulses;
        self.corrected += rhs.corrected;
    }
}

/// Contacts this far apart in the first body's frame are different contacts
const WARM_START_DISTANCE: f32 = 0.05;

/// A contact waiting in the solver, with the objects it joins
#[derive(Debug, Clone, Copy)]
struct PairConstraint {
    a: ObjectHandle,
    b: ObjectHandle,
    /// Contact position in A's local frame
    anchor: Vec3,
    constraint: ContactConstraint,
}

/// Impulse a contact finished the step with
#[derive(Debug, Clone, Copy)]
struct CachedImpulse {
    anchor: Vec3,
    impulse: AccumulatedImpulse,
}

type ContactCache = AHashMap<(ObjectHandle, ObjectHandle), SmallVec<[CachedImpulse; MAX_MANIFOLD_POINTS]>>;

/// The physics simulation
#[derive(Debug)]
pub struct PhysicsWorld {
    config: PhysicsConfig,
    pub(crate) objects: ObjectSet,
    pub(crate) sas: Sas<ObjectHandle>,
    layers: CollisionLayers,
    accumulator: FixedStepAccumulator,
    corrections: AHashMap<ObjectHandle, Vec3>,
    active: Vec<ObjectHandle>,
    candidates: Vec<ObjectHandle>,
    contacts: Vec<Contact>,
    constraints: Vec<PairConstraint>,
    contact_cache: ContactCache,
    last_stats: StepStats,
    steps: u64,
}

impl PhysicsWorld {
    /// Create an empty world
    ///
    /// # Panics
    /// If the configuration does not validate.
    pub fn new(config: PhysicsConfig) -> Self {
        match Self::try_new(config) {
            Ok(world) => world,
            Err(err) => panic!("{err}"),
        }
    }

    /// Create an empty world, reporting an invalid configuration
    pub fn try_new(config: PhysicsConfig) -> PhysicsResult<Self> {
        config.validate()?;
        let accumulator = FixedStepAccumulator::new(
            FixedTimeStep::from_step(f64::from(config.fixed_timestep))
                .with_max_updates(config.max_substeps),
        );
        log::debug!(
            "Physics world created: step {}s, gravity {}, split threshold {}",
            config.fixed_timestep,
            config.gravity,
            config.sas.split_threshold
        );
        Ok(Self {
            sas: Sas::new(config.sas),
            config,
            objects: ObjectSet::new(),
            layers: CollisionLayers::new(),
            accumulator,
            corrections: AHashMap::new(),
            active: Vec::new(),
            candidates: Vec::new(),
            contacts: Vec::new(),
            constraints: Vec::new(),
            contact_cache: ContactCache::default(),
            last_stats: StepStats::default(),
            steps: 0,
        })
    }

    /// World configuration
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Change gravity for subsequent steps
    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.config.gravity = gravity;
    }

    /// Add an object. Its collider AABB is computed and it enters the SAS.
    pub fn insert(&mut self, mut object: PhysicsObject) -> ObjectHandle {
        let fat = self.config.aabb_fat_factor;
        let aabb = object
            .collider
            .as_mut()
            .map(|collider| collider.refresh_aabb(&object.transform, fat));
        object.transform.clear_moved();

        let owner = object.owner;
        let handle = self.objects.insert(object);
        if let Some(aabb) = aabb {
            let node = self.sas.add_collider(handle, aabb);
            log::trace!("{handle} for {owner} stored in SAS node {node}");
        }
        handle
    }

    /// Remove an object, returning it
    pub fn remove(&mut self, handle: ObjectHandle) -> Option<PhysicsObject> {
        let object = self.objects.remove(handle)?;
        if object.collider.is_some() {
            self.sas.remove_collider(handle);
            self.contact_cache.retain(|&(a, b), _| a != handle && b != handle);
        }
        Some(object)
    }

    /// All objects
    pub fn objects(&self) -> &ObjectSet {
        &self.objects
    }

    /// Object by handle
    pub fn get(&self, handle: ObjectHandle) -> Option<&PhysicsObject> {
        self.objects.get(handle)
    }

    /// Transform of an object
    pub fn transform(&self, handle: ObjectHandle) -> Option<&Transform> {
        self.objects.get(handle).map(|object| &object.transform)
    }

    /// Mutable transform of an object. Changes reach the SAS on the next
    /// step or [`refresh_moved_colliders`](Self::refresh_moved_colliders).
    pub fn transform_mut(&mut self, handle: ObjectHandle) -> Option<&mut Transform> {
        self.objects.get_mut(handle).map(|object| &mut object.transform)
    }

    /// Rigid body of an object
    pub fn body(&self, handle: ObjectHandle) -> Option<&RigidBody> {
        self.objects.get(handle)?.body.as_ref()
    }

    /// Mutable rigid body, for forces and impulses between steps
    pub fn body_mut(&mut self, handle: ObjectHandle) -> Option<&mut RigidBody> {
        self.objects.get_mut(handle)?.body.as_mut()
    }

    /// Collider of an object
    pub fn collider(&self, handle: ObjectHandle) -> Option<&Collider> {
        self.objects.get(handle)?.collider.as_ref()
    }

    /// Every object with a rigid body, with its transform
    pub fn iter_bodies_mut(
        &mut self,
    ) -> impl Iterator<Item = (ObjectHandle, &mut Transform, &mut RigidBody)> {
        self.objects.bodies_mut()
    }

    /// The broad phase
    pub fn sas(&self) -> &Sas<ObjectHandle> {
        &self.sas
    }

    /// SAS node currently storing an object's collider
    pub fn sas_node(&self, handle: ObjectHandle) -> Option<NodeId> {
        self.sas.node_of(handle)
    }

    /// Enable or disable collisions between two layers
    ///
    /// # Panics
    /// If either layer is `>= MAX_LAYERS`.
    pub fn set_collision_layers(&mut self, a: CollisionLayer, b: CollisionLayer, enabled: bool) {
        self.layers.set(a, b, enabled);
    }

    /// The layer matrix
    pub fn collision_layers(&self) -> &CollisionLayers {
        &self.layers
    }

    /// The layer matrix as booleans
    pub fn collision_layer_matrix(&self) -> [[bool; MAX_LAYERS]; MAX_LAYERS] {
        self.layers.matrix()
    }

    /// Colliders whose AABB intersects `aabb`, appended to `out`
    pub fn query_aabb(&mut self, aabb: &Aabb, out: &mut Vec<ObjectHandle>) {
        self.sas.query_aabb(aabb, out);
    }

    /// Colliders whose AABB the ray crosses, appended to `out`
    pub fn query_ray(&mut self, origin: Vec3, direction: Vec3, out: &mut Vec<ObjectHandle>) {
        self.sas.query_ray(origin, direction, out);
    }

    /// Colliders the resolver would test `handle` against: SAS hits on its
    /// AABB, minus itself and layers it does not collide with
    pub fn broad_phase_candidates(&mut self, handle: ObjectHandle, out: &mut Vec<ObjectHandle>) {
        let Some(collider) = self.collider(handle) else {
            return;
        };
        let (aabb, layer) = (collider.aabb(), collider.layer());

        let start = out.len();
        self.sas.query_aabb(&aabb, out);
        let mut kept = start;
        for i in start..out.len() {
            let other = out[i];
            let allowed = other != handle
                && self
                    .collider(other)
                    .is_some_and(|c| self.layers.can_collide(layer, c.layer()));
            if allowed {
                out[kept] = other;
                kept += 1;
            }
        }
        out.truncate(kept);
    }

    /// Refresh the SAS entries of colliders whose transform moved.
    /// Returns the number refreshed.
    pub fn refresh_moved_colliders(&mut self) -> usize {
        let fat = self.config.aabb_fat_factor;
        let mut refreshed = 0;
        for (handle, transform, collider) in self.objects.colliders_mut() {
            if !transform.is_moved() {
                continue;
            }
            let aabb = collider.refresh_aabb(transform, fat);
            self.sas.update_collider(handle, aabb);
            transform.clear_moved();
            refreshed += 1;
        }
        refreshed
    }

    /// Advance the simulation by exactly `dt` seconds
    pub fn step(&mut self, dt: f32) -> StepStats {
        debug_assert!(dt.is_finite() && dt >= 0.0, "invalid timestep {dt}");
        let mut stats = StepStats::default();

        {
            let _span = tracing::trace_span!("physics_integrate").entered();
            let gravity = self.config.gravity;
            for (_, transform, body) in self.objects.bodies_mut() {
                if body.is_kinematic() {
                    continue;
                }
                body.integrate(transform, gravity, dt);
                stats.bodies_integrated += 1;
            }
            stats.sas_updates += self.refresh_moved_colliders();
        }

        {
            let _span = tracing::trace_span!("physics_collide").entered();
            self.collide(&mut stats);
        }

        {
            let _span = tracing::trace_span!("physics_correct").entered();
            for (handle, offset) in self.corrections.drain() {
                if let Some(object) = self.objects.get_mut(handle) {
                    object.transform.translate(offset);
                    stats.corrected += 1;
                }
            }
            stats.sas_updates += self.refresh_moved_colliders();
        }

        self.steps += 1;
        self.last_stats = stats;
        log::trace!("Physics step {}: {stats:?}", self.steps);
        stats
    }

    fn collide(&mut self, stats: &mut StepStats) {
        let slop = self.config.penetration_slop;
        let percent = self.config.correction_percent;
        let threshold = self.config.restitution_threshold;
        self.corrections.clear();

        let mut active = std::mem::take(&mut self.active);
        let mut candidates = std::mem::take(&mut self.candidates);
        let mut contacts = std::mem::take(&mut self.contacts);
        let mut constraints = std::mem::take(&mut self.constraints);
        constraints.clear();

        active.clear();
        active.extend(
            self.objects
                .iter()
                .filter(|(_, object)| object.is_dynamic() && object.collider.is_some())
                .map(|(handle, _)| handle),
        );

        for &handle in &active {
            candidates.clear();
            self.broad_phase_candidates(handle, &mut candidates);

            for &other in &candidates {
                let (Some(a), Some(b)) = (self.objects.get(handle), self.objects.get(other))
                else {
                    continue;
                };
                // Dynamic pairs are visited from both sides; keep the lower handle's visit
                if b.is_dynamic() && other < handle {
                    continue;
                }
                let (Some(collider_a), Some(collider_b)) = (&a.collider, &b.collider) else {
                    continue;
                };

                stats.candidate_pairs += 1;
                contacts.clear();
                if collider_contacts(collider_a, &a.transform, collider_b, &b.transform, &mut contacts) == 0 {
                    continue;
                }
                stats.contacts += contacts.len();

                let (Some(a), Some(b)) = self.objects.get2_mut(handle, other) else {
                    continue;
                };
                let side_a = contact_side(a);
                let side_b = contact_side(b);
                // Every constraint captures its approach speed before any impulse lands
                for contact in &contacts {
                    constraints.push(PairConstraint {
                        a: handle,
                        b: other,
                        anchor: side_a.rotation.inverse() * (contact.position - side_a.center),
                        constraint: ContactConstraint::new(*contact, &side_a, &side_b, threshold),
                    });
                }

                let deepest = contacts
                    .iter()
                    .max_by(|x, y| x.penetration.total_cmp(&y.penetration));
                if let Some((offset_a, offset_b)) =
                    deepest.and_then(|contact| correction_offsets(contact, &side_a, &side_b, slop, percent))
                {
                    if offset_a != Vec3::ZERO {
                        *self.corrections.entry(handle).or_default() += offset_a;
                    }
                    if offset_b != Vec3::ZERO {
                        *self.corrections.entry(other).or_default() += offset_b;
                    }
                }
            }
        }

        if self.config.warm_starting {
            for pair in &mut constraints {
                let Some(previous) = self
                    .contact_cache
                    .get(&(pair.a, pair.b))
                    .and_then(|cached| matching_impulse(cached, pair.anchor))
                else {
                    continue;
                };
                let (Some(a), Some(b)) = self.objects.get2_mut(pair.a, pair.b) else {
                    continue;
                };
                pair.constraint
                    .warm_start(previous, &mut contact_side(a), &mut contact_side(b));
            }
        }

        for _ in 0..self.config.solver_iterations {
            for pair in &mut constraints {
                let (Some(a), Some(b)) = self.objects.get2_mut(pair.a, pair.b) else {
                    continue;
                };
                pair.constraint.solve(&mut contact_side(a), &mut contact_side(b));
            }
        }

        self.contact_cache.clear();
        for pair in &constraints {
            if pair.constraint.impulse().is_applied() {
                stats.impulses += 1;
            }
            self.contact_cache
                .entry((pair.a, pair.b))
                .or_default()
                .push(CachedImpulse {
                    anchor: pair.anchor,
                    impulse: pair.constraint.accumulated(),
                });
        }

        self.active = active;
        self.candidates = candidates;
        self.contacts = contacts;
        self.constraints = constraints;
    }

    /// Run as many fixed steps as `frame_time` calls for, carrying the
    /// remainder to the next call. At most `max_substeps` steps run per
    /// call; time beyond that is dropped. Returns the number of steps run.
    pub fn advance(&mut self, frame_time: f32) -> u32 {
        let dropped_before = self.accumulator.dropped_time();
        self.accumulator.accumulate(f64::from(frame_time));
        let steps = self.accumulator.steps_due();

        let dropped = self.accumulator.dropped_time() - dropped_before;
        if dropped > 0.0 {
            log::warn!("Physics fell behind, dropping {dropped:.3}s of simulation time");
        }

        let dt = self.config.fixed_timestep;
        for _ in 0..steps {
            self.step(dt);
        }
        steps
    }

    /// Fraction of a step left in the accumulator, for render interpolation
    pub fn interpolation_alpha(&self) -> f32 {
        self.accumulator.alpha() as f32
    }

    /// Statistics of the most recent step
    pub fn last_step_stats(&self) -> StepStats {
        self.last_stats
    }

    /// Steps run since creation
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Sum of `mass * velocity` over all dynamic bodies
    pub fn total_momentum(&self) -> Vec3 {
        self.objects
            .iter()
            .filter_map(|(_, object)| object.body.as_ref())
            .map(RigidBody::momentum)
            .sum()
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(PhysicsConfig::default())
    }
}

/// Impulse of the cached contact nearest `anchor`, if one is close enough
fn matching_impulse(cached: &[CachedImpulse], anchor: Vec3) -> Option<AccumulatedImpulse> {
    cached
        .iter()
        .map(|c| (c.anchor.distance_squared(anchor), c.impulse))
        .filter(|(distance, _)| *distance < WARM_START_DISTANCE * WARM_START_DISTANCE)
        .min_by(|x, y| x.0.total_cmp(&y.0))
        .map(|(_, impulse)| impulse)
}

fn contact_side(object: &mut PhysicsObject) -> ContactSide<'_> {
    let (elasticity, friction) = object
        .collider
        .as_ref()
        .map_or((0.0, 0.0), |c| (c.elasticity, c.friction));
    ContactSide {
        center: object.transform.position(),
        rotation: object.transform.rotation(),
        body: object.body.as_mut(),
        elasticity,
        friction,
    }
}
