//! Physics object storage
//!
//! A generation-checked slot arena of [`PhysicsObject`]s. Each object joins
//! a transform with an optional collider and an optional rigid body, and
//! the views on [`ObjectSet`] iterate the filtered joins the solver needs.

use std::fmt;

use serde::{Deserialize, Serialize};
use tumble_core::{Entity, Transform};

use crate::body::RigidBody;
use crate::collider::Collider;

/// Handle to an object in an [`ObjectSet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectHandle {
    index: u32,
    generation: u32,
}

impl ObjectHandle {
    /// Slot index
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot when the handle was issued
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object({}v{})", self.index, self.generation)
    }
}

/// Everything the physics world knows about one game object
#[derive(Debug, Clone)]
pub struct PhysicsObject {
    /// Owning game object
    pub owner: Entity,
    /// World pose
    pub transform: Transform,
    /// Shape, `None` for bodies that never collide
    pub collider: Option<Collider>,
    /// Dynamics, `None` for static colliders
    pub body: Option<RigidBody>,
}

impl PhysicsObject {
    /// Object with only a transform
    pub fn new(owner: Entity, transform: Transform) -> Self {
        Self {
            owner,
            transform,
            collider: None,
            body: None,
        }
    }

    /// Attach a collider
    pub fn with_collider(mut self, collider: Collider) -> Self {
        self.collider = Some(collider);
        self
    }

    /// Attach a rigid body
    pub fn with_body(mut self, body: RigidBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Whether the solver may move this object
    pub fn is_dynamic(&self) -> bool {
        self.body.as_ref().is_some_and(|body| !body.is_kinematic())
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    object: Option<PhysicsObject>,
}

impl Slot {
    fn live(&self, generation: u32) -> Option<&PhysicsObject> {
        self.object.as_ref().filter(|_| self.generation == generation)
    }

    fn live_mut(&mut self, generation: u32) -> Option<&mut PhysicsObject> {
        if self.generation == generation {
            self.object.as_mut()
        } else {
            None
        }
    }
}

/// Generation-checked storage of physics objects
#[derive(Debug, Clone, Default)]
pub struct ObjectSet {
    slots: Vec<Slot>,
    free_indices: Vec<u32>,
    len: usize,
}

impl ObjectSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object and return its handle
    pub fn insert(&mut self, object: PhysicsObject) -> ObjectHandle {
        self.len += 1;
        if let Some(index) = self.free_indices.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation += 1;
            slot.object = Some(object);
            return ObjectHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            object: Some(object),
        });
        ObjectHandle {
            index,
            generation: 0,
        }
    }

    /// Remove an object; stale handles return `None`
    pub fn remove(&mut self, handle: ObjectHandle) -> Option<PhysicsObject> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let object = slot.object.take()?;
        self.free_indices.push(handle.index);
        self.len -= 1;
        Some(object)
    }

    /// Whether `handle` refers to a live object
    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Object by handle
    pub fn get(&self, handle: ObjectHandle) -> Option<&PhysicsObject> {
        self.slots
            .get(handle.index as usize)
            .and_then(|slot| slot.live(handle.generation))
    }

    /// Mutable object by handle
    pub fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut PhysicsObject> {
        self.slots
            .get_mut(handle.index as usize)
            .and_then(|slot| slot.live_mut(handle.generation))
    }

    /// Two distinct objects at once
    ///
    /// # Panics
    /// If both handles are the same.
    pub fn get2_mut(
        &mut self,
        a: ObjectHandle,
        b: ObjectHandle,
    ) -> (Option<&mut PhysicsObject>, Option<&mut PhysicsObject>) {
        assert_ne!(a, b, "get2_mut needs two distinct handles");
        let (ia, ib) = (a.index as usize, b.index as usize);
        if ia == ib {
            // Same slot, different generations: at most one is live
            return if self.contains(a) {
                (self.get_mut(a), None)
            } else {
                (None, self.get_mut(b))
            };
        }

        let (low, high) = (ia.min(ib), ia.max(ib));
        if high >= self.slots.len() {
            return if ia < ib {
                (self.get_mut(a), None)
            } else {
                (None, self.get_mut(b))
            };
        }
        let (head, tail) = self.slots.split_at_mut(high);
        let (low_slot, high_slot) = (&mut head[low], &mut tail[0]);
        if ia < ib {
            (low_slot.live_mut(a.generation), high_slot.live_mut(b.generation))
        } else {
            (high_slot.live_mut(a.generation), low_slot.live_mut(b.generation))
        }
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// All live objects in slot order
    pub fn iter(&self) -> impl Iterator<Item = (ObjectHandle, &PhysicsObject)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.object.as_ref().map(|object| {
                (
                    ObjectHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    object,
                )
            })
        })
    }

    /// All live objects in slot order, mutably
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ObjectHandle, &mut PhysicsObject)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.object.as_mut().map(|object| {
                (
                    ObjectHandle {
                        index: index as u32,
                        generation,
                    },
                    object,
                )
            })
        })
    }

    /// Objects with both a transform and a rigid body
    pub fn bodies_mut(
        &mut self,
    ) -> impl Iterator<Item = (ObjectHandle, &mut Transform, &mut RigidBody)> {
        self.iter_mut().filter_map(|(handle, object)| {
            let PhysicsObject {
                transform, body, ..
            } = object;
            body.as_mut().map(|body| (handle, transform, body))
        })
    }

    /// Objects with a collider, paired with their transforms
    pub fn colliders(&self) -> impl Iterator<Item = (ObjectHandle, &Transform, &Collider)> {
        self.iter().filter_map(|(handle, object)| {
            object
                .collider
                .as_ref()
                .map(|collider| (handle, &object.transform, collider))
        })
    }

    /// Objects with a collider, mutably
    pub fn colliders_mut(
        &mut self,
    ) -> impl Iterator<Item = (ObjectHandle, &mut Transform, &mut Collider)> {
        self.iter_mut().filter_map(|(handle, object)| {
            let PhysicsObject {
                transform,
                collider,
                ..
            } = object;
            collider.as_mut().map(|collider| (handle, transform, collider))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use glam::Vec3;

    use super::*;
    use crate::shape::ConvexMesh;

    fn object(index: u32) -> PhysicsObject {
        PhysicsObject::new(Entity::new(index, 0), Transform::IDENTITY)
    }

    #[test]
    fn test_insert_remove_recycles_with_new_generation() {
        let mut set = ObjectSet::new();
        let a = set.insert(object(0));
        let b = set.insert(object(1));
        assert_eq!(set.len(), 2);

        assert!(set.remove(a).is_some());
        assert!(set.remove(a).is_none());
        assert!(!set.contains(a));

        let c = set.insert(object(2));
        assert_eq!(c.index(), a.index());
        assert_eq!(c.generation(), 1);
        assert!(set.get(a).is_none());
        assert_eq!(set.get(c).map(|o| o.owner), Some(Entity::new(2, 0)));
        assert!(set.contains(b));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_get2_mut() {
        let mut set = ObjectSet::new();
        let a = set.insert(object(0));
        let b = set.insert(object(1));
        let (oa, ob) = set.get2_mut(b, a);
        oa.expect("b").transform.set_position(Vec3::X);
        ob.expect("a").transform.set_position(Vec3::Y);
        assert_eq!(set.get(b).map(|o| o.transform.position()), Some(Vec3::X));
        assert_eq!(set.get(a).map(|o| o.transform.position()), Some(Vec3::Y));

        set.remove(a);
        let stale = a;
        let fresh = set.insert(object(3));
        let (old, new) = set.get2_mut(stale, fresh);
        assert!(old.is_none());
        assert!(new.is_some());
    }

    #[test]
    fn test_views() {
        let mut set = ObjectSet::new();
        let mesh = Arc::new(ConvexMesh::cuboid(Vec3::splat(0.5)));
        set.insert(object(0).with_body(RigidBody::new(1.0, Vec3::ONE)));
        set.insert(object(1).with_collider(Collider::new(Entity::new(1, 0), mesh.clone())));
        set.insert(
            object(2)
                .with_collider(Collider::new(Entity::new(2, 0), mesh))
                .with_body(RigidBody::kinematic()),
        );

        assert_eq!(set.bodies_mut().count(), 2);
        assert_eq!(set.colliders().count(), 2);
        for (_, transform, body) in set.bodies_mut() {
            body.velocity = Vec3::X;
            transform.translate(Vec3::Y);
        }
        assert!(set.iter().filter(|(_, o)| o.body.is_some()).all(|(_, o)| o.transform.position() == Vec3::Y));
        assert_eq!(set.iter().filter(|(_, o)| o.is_dynamic()).count(), 1);
    }
}
