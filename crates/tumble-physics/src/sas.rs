//! Spatial Acceleration Structure
//!
//! A dynamic bounding-volume tree over collider AABBs. Each internal node is
//! cut into a 3x3x3 grid around the mean center of its objects: per axis an
//! object is either below the split point, above it, or straddling it.
//! Straddling objects go to the middle band instead of being forced into a
//! side cell, so objects resting on a wall or floor do not pile up at the
//! coarse levels.
//!
//! Nodes are split lazily: a query that visits a node holding more than
//! `split_threshold` objects splits it before testing them. Nodes live in an
//! arena and refer to each other by [`NodeId`]. Children are never deleted
//! individually.

use std::fmt;
use std::hash::Hash;

use ahash::AHashMap;
use glam::Vec3;
use serde::Serialize;
use tumble_core::Aabb;

use crate::config::SasConfig;

/// Number of children of a split node
pub const CHILD_COUNT: usize = 27;

/// Index of a node in the SAS arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// The root node, created with the tree
    pub const ROOT: NodeId = NodeId(0);

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One node of the tree
#[derive(Debug, Clone)]
pub struct SasNode<K> {
    objects: Vec<(K, Aabb)>,
    aabb: Aabb,
    split_point: Vec3,
    children: Option<Box<[NodeId; CHILD_COUNT]>>,
    parent: Option<NodeId>,
    depth: u32,
}

impl<K> SasNode<K> {
    fn new(parent: Option<NodeId>, depth: u32) -> Self {
        Self {
            objects: Vec::new(),
            aabb: Aabb::EMPTY,
            split_point: Vec3::NAN,
            children: None,
            parent,
            depth,
        }
    }

    /// Objects stored directly in this node with their AABBs
    pub fn objects(&self) -> &[(K, Aabb)] {
        &self.objects
    }

    /// Bounds of everything stored at or below this node
    pub fn aabb(&self) -> Aabb {
        self.aabb
    }

    /// Mean object center at split time, NaN before the first split
    pub fn split_point(&self) -> Vec3 {
        self.split_point
    }

    /// The 27 children, once split
    pub fn children(&self) -> Option<&[NodeId; CHILD_COUNT]> {
        self.children.as_deref()
    }

    /// Parent node, `None` for the root
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Distance from the root
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Whether this node has been split
    pub fn is_split(&self) -> bool {
        self.children.is_some()
    }
}

/// Tree shape summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SasStats {
    /// Nodes in the arena
    pub nodes: usize,
    /// Nodes that have been split
    pub split_nodes: usize,
    /// Stored objects
    pub objects: usize,
    /// Deepest node holding at least one object
    pub deepest_object: u32,
}

/// Where a key is stored: its node and its index in that node's objects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Location {
    node: NodeId,
    slot: usize,
}

/// Spatial acceleration structure over keyed AABBs
#[derive(Debug, Clone)]
pub struct Sas<K> {
    nodes: Vec<SasNode<K>>,
    locations: AHashMap<K, Location>,
    config: SasConfig,
    stack: Vec<NodeId>,
}

impl<K: Copy + Eq + Hash + fmt::Debug> Sas<K> {
    /// Empty tree with a single root node
    pub fn new(config: SasConfig) -> Self {
        Self {
            nodes: vec![SasNode::new(None, 0)],
            locations: AHashMap::new(),
            config,
            stack: Vec::new(),
        }
    }

    /// Tuning parameters
    pub fn config(&self) -> &SasConfig {
        &self.config
    }

    /// Node by id
    pub fn node(&self, id: NodeId) -> &SasNode<K> {
        &self.nodes[id.index()]
    }

    /// Number of nodes in the arena
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Whether no objects are stored
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Node currently storing `key`
    pub fn node_of(&self, key: K) -> Option<NodeId> {
        self.locations.get(&key).map(|location| location.node)
    }

    /// Insert a new object and return the node it landed in.
    ///
    /// # Panics
    /// If `key` is already stored.
    pub fn add_collider(&mut self, key: K, aabb: Aabb) -> NodeId {
        assert!(
            !self.locations.contains_key(&key),
            "{key:?} is already in the SAS"
        );
        let node = self.descend(NodeId::ROOT, &aabb);
        self.push_object(node, key, aabb);
        node
    }

    /// Refresh the AABB of a stored object and return its (possibly new) node.
    ///
    /// When the current node still envelops the new AABB, the object only
    /// moves if the insert heuristic now picks a child. Otherwise the search
    /// restarts from the nearest enveloping ancestor, growing the root if no
    /// ancestor fits, and the vacated node's bounds are tightened.
    ///
    /// # Panics
    /// If `key` is not stored.
    pub fn update_collider(&mut self, key: K, aabb: Aabb) -> NodeId {
        let Location {
            node: current,
            slot,
        } = self.expect_location(key);

        let start = if self.nodes[current.index()].aabb.envelops(&aabb) {
            current
        } else {
            let mut ancestor = self.nodes[current.index()].parent;
            while let Some(id) = ancestor {
                if self.nodes[id.index()].aabb.envelops(&aabb) {
                    break;
                }
                ancestor = self.nodes[id.index()].parent;
            }
            ancestor.unwrap_or(NodeId::ROOT)
        };

        let target = self.descend(start, &aabb);
        if target == current {
            self.nodes[current.index()].objects[slot].1 = aabb;
            return current;
        }

        self.take_object(current, slot);
        self.push_object(target, key, aabb);
        self.recalculate_aabb(current);
        target
    }

    /// Remove a stored object, tightening the bounds it leaves behind.
    /// Returns whether the key was present.
    pub fn remove_collider(&mut self, key: K) -> bool {
        let Some(Location { node, slot }) = self.locations.remove(&key) else {
            return false;
        };
        self.take_object(node, slot);
        self.recalculate_aabb(node);
        true
    }

    /// Append every key whose AABB intersects `aabb` to `out`.
    ///
    /// Splits eligible nodes on the way down.
    pub fn query_aabb(&mut self, aabb: &Aabb, out: &mut Vec<K>) {
        self.traverse(
            |node| node.intersects(aabb),
            |object| object.intersects(aabb),
            out,
        );
    }

    /// Append every key whose AABB is hit by the ray `origin + t * direction`, `t >= 0`.
    ///
    /// Splits eligible nodes on the way down.
    pub fn query_ray(&mut self, origin: Vec3, direction: Vec3, out: &mut Vec<K>) {
        self.traverse(
            |node| node.intersects_ray(origin, direction),
            |object| object.intersects_ray(origin, direction),
            out,
        );
    }

    fn traverse(
        &mut self,
        visit_node: impl Fn(&Aabb) -> bool,
        accept_object: impl Fn(&Aabb) -> bool,
        out: &mut Vec<K>,
    ) {
        let mut stack = std::mem::take(&mut self.stack);
        stack.clear();
        stack.push(NodeId::ROOT);

        while let Some(id) = stack.pop() {
            if !visit_node(&self.nodes[id.index()].aabb) {
                continue;
            }
            if self.should_split(id) {
                self.split(id);
            }

            let node = &self.nodes[id.index()];
            out.extend(
                node.objects
                    .iter()
                    .filter(|(_, object)| accept_object(object))
                    .map(|(key, _)| *key),
            );
            if let Some(children) = &node.children {
                stack.extend(children.iter().copied());
            }
        }

        self.stack = stack;
    }

    fn should_split(&self, id: NodeId) -> bool {
        let node = &self.nodes[id.index()];
        !node.is_split()
            && node.objects.len() > self.config.split_threshold
            && node.depth < self.config.max_depth
    }

    /// Create the 27 children of `id` and push its objects down into them.
    ///
    /// # Panics
    /// If the node is already split, sits at the maximum depth, or holds
    /// fewer than `split_threshold` objects.
    pub fn split(&mut self, id: NodeId) {
        let threshold = self.config.split_threshold;
        let node = &self.nodes[id.index()];
        assert!(!node.is_split(), "SAS node {id} is already split");
        assert!(
            node.objects.len() >= threshold,
            "SAS node {id} holds {} objects, fewer than the split threshold {threshold}",
            node.objects.len()
        );
        assert!(
            node.depth < self.config.max_depth,
            "SAS node {id} is at the maximum depth {}",
            self.config.max_depth
        );

        let count = node.objects.len();
        let split_point = node
            .objects
            .iter()
            .fold(Vec3::ZERO, |acc, (_, aabb)| acc + aabb.center())
            / count as f32;
        let depth = node.depth + 1;

        let first = self.nodes.len() as u32;
        let children: [NodeId; CHILD_COUNT] = std::array::from_fn(|i| NodeId(first + i as u32));
        self.nodes
            .extend((0..CHILD_COUNT).map(|_| SasNode::new(Some(id), depth)));

        let node = &mut self.nodes[id.index()];
        node.split_point = split_point;
        node.children = Some(Box::new(children));
        let objects = std::mem::take(&mut node.objects);

        let mut moved = 0;
        for (key, aabb) in objects {
            match self.insert_heuristic(id, &aabb) {
                Some(child) => {
                    self.nodes[child.index()].aabb.grow(&aabb);
                    self.push_object(child, key, aabb);
                    moved += 1;
                }
                None => self.push_object(id, key, aabb),
            }
        }

        log::debug!(
            "SAS split node {id} at depth {}: {moved} of {count} objects moved to children",
            depth - 1
        );
    }

    /// Child of `id` that should hold `aabb`, or `None` to keep it in `id`
    pub fn insert_heuristic(&self, id: NodeId, aabb: &Aabb) -> Option<NodeId> {
        let node = &self.nodes[id.index()];
        let children = node.children.as_ref()?;
        if node.aabb.volume() < 8.0 * aabb.volume() {
            return None;
        }

        let band = |min: f32, max: f32, split: f32| -> usize {
            if max < split {
                0
            } else if min > split {
                2
            } else {
                1
            }
        };
        let p = node.split_point;
        let index = band(aabb.min.x, aabb.max.x, p.x) * 9
            + band(aabb.min.y, aabb.max.y, p.y) * 3
            + band(aabb.min.z, aabb.max.z, p.z);
        assert!(index < CHILD_COUNT, "SAS child index {index} out of range");
        Some(children[index])
    }

    /// Walk down from `start`, growing each visited node before asking the
    /// heuristic, so the decision is made against the node's final bounds.
    /// `start` must be the root or already envelop `aabb`.
    fn descend(&mut self, start: NodeId, aabb: &Aabb) -> NodeId {
        let mut node = start;
        loop {
            self.nodes[node.index()].aabb.grow(aabb);
            match self.insert_heuristic(node, aabb) {
                Some(child) => node = child,
                None => return node,
            }
        }
    }

    /// Recompute the bounds of `id` and its ancestors from their contents.
    /// Stops early once a node's bounds are unchanged.
    pub fn recalculate_aabb(&mut self, id: NodeId) {
        let mut current = Some(id);
        while let Some(id) = current {
            let node = &self.nodes[id.index()];
            let mut aabb = node
                .objects
                .iter()
                .fold(Aabb::EMPTY, |acc, (_, object)| acc.merged(object));
            if let Some(children) = &node.children {
                for child in children.iter() {
                    aabb.grow(&self.nodes[child.index()].aabb);
                }
            }
            if aabb == node.aabb {
                break;
            }
            current = node.parent;
            self.nodes[id.index()].aabb = aabb;
        }
    }

    /// Whether every node envelops all objects and children directly beneath it
    pub fn check_containment(&self) -> bool {
        self.nodes.iter().all(|node| {
            node.objects
                .iter()
                .all(|(_, object)| node.aabb.envelops(object))
                && node.children.iter().flat_map(|c| c.iter()).all(|child| {
                    node.aabb.envelops(&self.nodes[child.index()].aabb)
                })
        })
    }

    /// Tree shape summary
    pub fn stats(&self) -> SasStats {
        SasStats {
            nodes: self.nodes.len(),
            split_nodes: self.nodes.iter().filter(|n| n.is_split()).count(),
            objects: self.locations.len(),
            deepest_object: self
                .nodes
                .iter()
                .filter(|n| !n.objects.is_empty())
                .map(|n| n.depth)
                .max()
                .unwrap_or(0),
        }
    }

    fn expect_location(&self, key: K) -> Location {
        match self.locations.get(&key) {
            Some(&location) => location,
            None => panic!("{key:?} is not in the SAS"),
        }
    }

    fn push_object(&mut self, node: NodeId, key: K, aabb: Aabb) {
        let objects = &mut self.nodes[node.index()].objects;
        self.locations.insert(
            key,
            Location {
                node,
                slot: objects.len(),
            },
        );
        objects.push((key, aabb));
    }

    /// Drop the object at `slot`; the node's last object fills the gap
    fn take_object(&mut self, node: NodeId, slot: usize) {
        let objects = &mut self.nodes[node.index()].objects;
        objects.swap_remove(slot);
        if let Some(&(moved, _)) = objects.get(slot) {
            if let Some(location) = self.locations.get_mut(&moved) {
                location.slot = slot;
            }
        }
    }
}

impl<K: Copy + Eq + Hash + fmt::Debug> Default for Sas<K> {
    fn default() -> Self {
        Self::new(SasConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(x: f32, y: f32, z: f32) -> Aabb {
        Aabb::from_center_half_extents(Vec3::new(x, y, z), Vec3::splat(0.1))
    }

    /// A 4x4x4 lattice of small boxes, keys 0..64
    fn lattice(sas: &mut Sas<u32>) {
        let mut key = 0;
        for x in 0..4 {
            for y in 0..4 {
                for z in 0..4 {
                    sas.add_collider(key, cell(x as f32, y as f32, z as f32));
                    key += 1;
                }
            }
        }
    }

    fn small_config() -> SasConfig {
        SasConfig {
            split_threshold: 4,
            max_depth: 6,
        }
    }

    fn sorted(mut keys: Vec<u32>) -> Vec<u32> {
        keys.sort_unstable();
        keys
    }

    #[test]
    fn test_add_grows_root() {
        let mut sas = Sas::new(small_config());
        assert_eq!(sas.add_collider(1, cell(0.0, 0.0, 0.0)), NodeId::ROOT);
        sas.add_collider(2, cell(5.0, 0.0, 0.0));
        let root = sas.node(NodeId::ROOT);
        assert!(root.aabb().envelops(&cell(5.0, 0.0, 0.0)));
        assert!(root.split_point().is_nan());
        assert_eq!(sas.len(), 2);
    }

    #[test]
    fn test_query_splits_lazily() {
        let mut sas = Sas::new(small_config());
        lattice(&mut sas);
        assert_eq!(sas.node_count(), 1);

        let mut out = Vec::new();
        sas.query_aabb(&cell(0.0, 0.0, 0.0), &mut out);
        assert_eq!(out, vec![0]);
        assert!(sas.node(NodeId::ROOT).is_split());
        assert!(sas.node_count() > 1);
        assert!(sas.check_containment());
    }

    #[test]
    fn test_split_moves_objects_and_locations() {
        let mut sas = Sas::new(small_config());
        lattice(&mut sas);
        sas.split(NodeId::ROOT);

        let root = sas.node(NodeId::ROOT);
        assert!((root.split_point() - Vec3::splat(1.5)).length() < 1e-5);
        // Small boxes away from the mean all fit a side cell
        assert!(root.objects().is_empty());
        for key in 0..64 {
            let node = sas.node_of(key).expect("stored");
            assert_ne!(node, NodeId::ROOT);
            assert!(sas.node(node).objects().iter().any(|(k, _)| *k == key));
        }
        assert!(sas.check_containment());
    }

    #[test]
    #[should_panic(expected = "fewer than the split threshold")]
    fn test_premature_split_panics() {
        let mut sas = Sas::new(small_config());
        sas.add_collider(0, cell(0.0, 0.0, 0.0));
        sas.split(NodeId::ROOT);
    }

    #[test]
    #[should_panic(expected = "already split")]
    fn test_double_split_panics() {
        let mut sas = Sas::new(small_config());
        lattice(&mut sas);
        sas.split(NodeId::ROOT);
        sas.split(NodeId::ROOT);
    }

    #[test]
    fn test_large_object_stays_high() {
        let mut sas = Sas::new(small_config());
        lattice(&mut sas);
        sas.split(NodeId::ROOT);
        let big = Aabb::new(Vec3::splat(-0.1), Vec3::splat(3.1));
        assert_eq!(sas.add_collider(100, big), NodeId::ROOT);
    }

    #[test]
    fn test_straddling_object_goes_to_middle_band() {
        let mut sas = Sas::new(small_config());
        lattice(&mut sas);
        sas.split(NodeId::ROOT);
        // Crosses the split plane on x only
        let node = sas.add_collider(100, Aabb::new(Vec3::new(1.4, 0.0, 0.0), Vec3::new(1.6, 0.1, 0.1)));
        let children = sas.node(NodeId::ROOT).children().expect("split");
        assert_eq!(node, children[9]);
    }

    #[test]
    fn test_update_small_motion_keeps_node() {
        let mut sas = Sas::new(small_config());
        lattice(&mut sas);
        sas.split(NodeId::ROOT);
        let before = sas.node_of(0).expect("stored");
        let moved = Aabb::from_center_half_extents(Vec3::splat(0.01), Vec3::splat(0.09));
        assert_eq!(sas.update_collider(0, moved), before);
        assert!(sas.check_containment());
    }

    #[test]
    fn test_update_large_motion_relocates_and_tightens() {
        let mut sas = Sas::new(small_config());
        lattice(&mut sas);
        sas.split(NodeId::ROOT);
        let before = sas.node_of(0).expect("stored");

        let far = cell(3.0, 3.0, 3.0);
        let after = sas.update_collider(0, far);
        assert_ne!(after, before);
        assert!(sas.node(after).aabb().envelops(&far));
        assert!(!sas.node(before).objects().iter().any(|(k, _)| *k == 0));
        assert!(sas.check_containment());

        // Escaping the root grows it
        let outside = cell(50.0, 0.0, 0.0);
        sas.update_collider(5, outside);
        assert!(sas.node(NodeId::ROOT).aabb().envelops(&outside));
        assert!(sas.check_containment());
    }

    #[test]
    fn test_update_twice_is_idempotent() {
        let mut sas = Sas::new(small_config());
        lattice(&mut sas);
        let mut out = Vec::new();
        sas.query_aabb(&cell(0.0, 0.0, 0.0), &mut out);

        sas.update_collider(7, cell(2.2, 0.3, 1.9));
        // Unsplit nodes carry a NaN split point, so compare the printed form
        let nodes = format!("{:?}", sas.nodes);
        let locations = sas.locations.clone();
        sas.update_collider(7, cell(2.2, 0.3, 1.9));
        assert_eq!(format!("{:?}", sas.nodes), nodes);
        assert_eq!(sas.locations, locations);
    }

    /// Every stored key sits at the slot its location names
    fn locations_are_exact(sas: &Sas<u32>) -> bool {
        sas.locations.iter().all(|(key, location)| {
            sas.nodes[location.node.index()]
                .objects
                .get(location.slot)
                .is_some_and(|(k, _)| k == key)
        }) && sas.nodes.iter().map(|n| n.objects.len()).sum::<usize>() == sas.locations.len()
    }

    #[test]
    fn test_slots_follow_moves_and_removals() {
        let mut sas = Sas::new(small_config());
        lattice(&mut sas);
        assert!(locations_are_exact(&sas));

        let mut out = Vec::new();
        sas.query_aabb(&Aabb::new(Vec3::splat(-1.0), Vec3::splat(5.0)), &mut out);
        assert!(sas.stats().split_nodes >= 1);
        assert!(locations_are_exact(&sas));

        // Removing from the front of a node moves its last object into the gap
        for key in [0, 21, 42, 5] {
            assert!(sas.remove_collider(key));
            assert!(locations_are_exact(&sas), "after removing {key}");
        }
        for key in [1, 22, 63] {
            sas.update_collider(key, cell(30.0 + key as f32, 0.0, 0.0));
            assert!(locations_are_exact(&sas), "after moving {key}");
        }
        sas.update_collider(22, cell(2.0, 1.0, 2.0));
        assert!(locations_are_exact(&sas));
        assert_eq!(sas.len(), 60);
        assert!(sas.check_containment());
    }

    #[test]
    fn test_remove() {
        let mut sas = Sas::new(small_config());
        lattice(&mut sas);
        assert!(sas.remove_collider(63));
        assert!(!sas.remove_collider(63));
        assert_eq!(sas.len(), 63);
        assert_eq!(sas.node_of(63), None);

        let mut out = Vec::new();
        sas.query_aabb(&Aabb::new(Vec3::splat(-10.0), Vec3::splat(10.0)), &mut out);
        assert_eq!(sorted(out), (0..63).collect::<Vec<_>>());

        // Removing the only object of a corner tightens the bounds left behind
        let mut sas = Sas::new(small_config());
        sas.add_collider(0, cell(0.0, 0.0, 0.0));
        sas.add_collider(1, cell(4.0, 0.0, 0.0));
        sas.remove_collider(1);
        assert_eq!(sas.node(NodeId::ROOT).aabb(), cell(0.0, 0.0, 0.0));
    }

    #[test]
    fn test_query_ray() {
        let mut sas = Sas::new(small_config());
        lattice(&mut sas);
        let mut out = Vec::new();
        // Along the x axis at y = z = 0 hits keys 0, 16, 32, 48
        sas.query_ray(Vec3::new(-5.0, 0.0, 0.0), Vec3::X, &mut out);
        assert_eq!(sorted(out), vec![0, 16, 32, 48]);

        let mut out = Vec::new();
        sas.query_ray(Vec3::new(-5.0, 0.0, 0.0), Vec3::NEG_X, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_max_depth_stops_splitting() {
        let mut sas = Sas::new(SasConfig {
            split_threshold: 1,
            max_depth: 0,
        });
        lattice(&mut sas);
        let mut out = Vec::new();
        sas.query_aabb(&cell(0.0, 0.0, 0.0), &mut out);
        assert_eq!(sas.node_count(), 1);
    }

    #[test]
    fn test_stats() {
        let mut sas = Sas::new(small_config());
        lattice(&mut sas);
        let mut out = Vec::new();
        sas.query_aabb(&Aabb::new(Vec3::splat(-1.0), Vec3::splat(5.0)), &mut out);
        assert_eq!(out.len(), 64);
        let stats = sas.stats();
        assert_eq!(stats.objects, 64);
        assert!(stats.split_nodes >= 1);
        assert!(stats.deepest_object >= 1);
        assert_eq!(stats.nodes, sas.node_count());
    }
}
