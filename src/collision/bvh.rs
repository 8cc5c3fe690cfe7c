//! A dynamic Bounding Volume Hierarchy
//! for speeding up proximity queries on objects that come, go and move around.

use super::{Overlap, AABB};

use std::collections::HashMap;

/// External identifier of an object stored in a [`BoundingTree`].
pub type ObjectId = u32;

#[derive(thiserror::Error, Debug)]
pub enum BoundingTreeError {
    #[error("Object {0} is already in the tree")]
    DuplicateObject(ObjectId),
    #[error("Object {0} is not in the tree")]
    UnknownObject(ObjectId),
    #[error("Bounding tree is malformed: {0}")]
    InvariantViolated(&'static str),
}

//
// Internal types
//

#[derive(Clone, Copy, Debug)]
struct Node {
    aabb: AABB,
    parent: Option<usize>,
    /// Leaves have height 0, branches one more than their tallest child.
    height: i32,
    kind: NodeKind,
}

#[derive(Clone, Copy, Debug)]
enum NodeKind {
    Branch { left: usize, right: usize },
    Leaf { object_id: ObjectId },
}

impl Node {
    fn leaf(object_id: ObjectId, aabb: AABB) -> Self {
        Self {
            aabb,
            parent: None,
            height: 0,
            kind: NodeKind::Leaf { object_id },
        }
    }
}

//
// Tree itself
//

/// A Bounding Volume Hierarchy implemented as an
/// incrementally constructed, self-balancing binary AABB tree.
///
/// Leaves store their object's box grown by a caller-chosen boundary,
/// so objects that move a little don't need to be reinserted every time.
/// Nodes live in a pool and removed ones are recycled through a free list.
#[derive(Clone, Debug, Default)]
pub struct BoundingTree {
    nodes: Vec<Node>,
    free_list: Vec<usize>,
    root: Option<usize>,
    leaves: HashMap<ObjectId, usize>,
}

impl BoundingTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free_list.clear();
        self.root = None;
        self.leaves.clear();
    }

    /// Number of objects in the tree.
    #[inline]
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Height of the root node, zero for an empty tree or a single leaf.
    pub fn height(&self) -> i32 {
        self.root.map_or(0, |root| self.nodes[root].height)
    }

    #[inline]
    pub fn contains(&self, object_id: ObjectId) -> bool {
        self.leaves.contains_key(&object_id)
    }

    /// The padded box currently stored for an object.
    pub fn fat_aabb(&self, object_id: ObjectId) -> Option<AABB> {
        self.leaves.get(&object_id).map(|&idx| self.nodes[idx].aabb)
    }

    pub fn object_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.leaves.keys().copied()
    }

    /// Add an object whose bounds are `aabb` grown by `boundary` on every side.
    pub fn insert(
        &mut self,
        object_id: ObjectId,
        aabb: AABB,
        boundary: f64,
    ) -> Result<(), BoundingTreeError> {
        if self.leaves.contains_key(&object_id) {
            return Err(BoundingTreeError::DuplicateObject(object_id));
        }
        let leaf = self.alloc_node(Node::leaf(object_id, aabb.padded(boundary)));
        self.leaves.insert(object_id, leaf);
        self.insert_leaf(leaf);
        Ok(())
    }

    /// Update an object's bounds. Returns whether the object had to be reinserted,
    /// which only happens when the new box pokes out of the stored padded box.
    pub fn move_object(
        &mut self,
        object_id: ObjectId,
        aabb: AABB,
        boundary: f64,
    ) -> Result<bool, BoundingTreeError> {
        let leaf = *self
            .leaves
            .get(&object_id)
            .ok_or(BoundingTreeError::UnknownObject(object_id))?;
        if self.nodes[leaf].aabb.contains(&aabb) {
            return Ok(false);
        }
        self.remove_leaf(leaf);
        self.nodes[leaf].aabb = aabb.padded(boundary);
        self.insert_leaf(leaf);
        Ok(true)
    }

    pub fn remove(&mut self, object_id: ObjectId) -> Result<(), BoundingTreeError> {
        let leaf = self
            .leaves
            .remove(&object_id)
            .ok_or(BoundingTreeError::UnknownObject(object_id))?;
        self.remove_leaf(leaf);
        self.free_list.push(leaf);
        Ok(())
    }

    /// Iterate over every object whose stored box overlaps with the given shape.
    pub fn query<'a, S: Overlap>(&'a self, shape: &'a S) -> OverlapIter<'a, S> {
        let mut stack = Vec::new();
        if let Some(root) = self.root {
            if shape.overlaps_aabb(&self.nodes[root].aabb) {
                stack.push(root);
            }
        }
        OverlapIter {
            shape,
            nodes: &self.nodes,
            stack,
        }
    }

    /// Collect every object whose stored box overlaps with the given shape.
    /// An empty tree gives an empty list.
    pub fn bounded_object_ids(&self, shape: &impl Overlap) -> Vec<ObjectId> {
        let _span = tracy_span!("bounded object ids", "bounded_object_ids");
        self.query(shape).collect()
    }

    /// Check every structural invariant of the tree:
    /// parent links agree with child links, heights are consistent,
    /// every branch's box is exactly the union of its children's,
    /// and the leaves correspond one-to-one with the inserted objects.
    pub fn validate(&self) -> Result<(), BoundingTreeError> {
        use BoundingTreeError::InvariantViolated;

        let root = match self.root {
            Some(root) => root,
            None if self.leaves.is_empty() => return Ok(()),
            None => return Err(InvariantViolated("objects registered in an empty tree")),
        };
        if self.nodes[root].parent.is_some() {
            return Err(InvariantViolated("root has a parent"));
        }

        let mut visited = vec![false; self.nodes.len()];
        for &free in &self.free_list {
            visited[free] = true;
        }
        let mut leaf_count = 0;
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            if visited[idx] {
                return Err(InvariantViolated("node reachable twice or from the free list"));
            }
            visited[idx] = true;

            let node = &self.nodes[idx];
            match node.kind {
                NodeKind::Leaf { object_id } => {
                    if node.height != 0 {
                        return Err(InvariantViolated("leaf with nonzero height"));
                    }
                    if self.leaves.get(&object_id) != Some(&idx) {
                        return Err(InvariantViolated("leaf not registered for its object"));
                    }
                    leaf_count += 1;
                }
                NodeKind::Branch { left, right } => {
                    let (l, r) = (&self.nodes[left], &self.nodes[right]);
                    if l.parent != Some(idx) || r.parent != Some(idx) {
                        return Err(InvariantViolated("child does not point back at parent"));
                    }
                    if node.height != 1 + l.height.max(r.height) {
                        return Err(InvariantViolated("branch height out of date"));
                    }
                    if node.aabb != l.aabb.union(&r.aabb) {
                        return Err(InvariantViolated(
                            "branch box is not the union of its children",
                        ));
                    }
                    stack.push(right);
                    stack.push(left);
                }
            }
        }

        if leaf_count != self.leaves.len() {
            return Err(InvariantViolated("registered object missing from the tree"));
        }
        Ok(())
    }

    /// Generate a list of AABBs of every node for debug drawing.
    pub fn debug_boxes(&self) -> Vec<NodeInfo> {
        let mut curr_node_idx = match self.root {
            Some(root) => root,
            None => return Vec::new(),
        };

        // right children of branch nodes we've only been to the left child of (DFS)
        let mut stack: Vec<(usize, usize)> = Vec::new();
        let mut boxes = Vec::new();
        let mut curr_depth = 0;
        'dfs: loop {
            let curr_node = &self.nodes[curr_node_idx];
            boxes.push(NodeInfo {
                aabb: curr_node.aabb,
                depth: curr_depth,
            });
            match curr_node.kind {
                NodeKind::Branch { left, right } => {
                    stack.push((right, curr_depth + 1));
                    curr_node_idx = left;
                    curr_depth += 1;
                }
                NodeKind::Leaf { .. } => match stack.pop() {
                    Some((next, depth)) => {
                        curr_node_idx = next;
                        curr_depth = depth;
                    }
                    None => break 'dfs,
                },
            }
        }
        boxes
    }

    //
    // Internals
    //

    fn alloc_node(&mut self, node: Node) -> usize {
        match self.free_list.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    /// Point `parent` (or the root, if there is no parent) at `new` instead of `old`.
    fn replace_child(&mut self, parent: Option<usize>, old: usize, new: usize) {
        match parent {
            None => self.root = Some(new),
            Some(parent) => {
                if let NodeKind::Branch { left, right } = &mut self.nodes[parent].kind {
                    if *left == old {
                        *left = new;
                    } else if *right == old {
                        *right = new;
                    }
                }
            }
        }
    }

    /// Cost of descending into `child` when looking for a sibling for `aabb`,
    /// not counting the cost inherited from the ancestors.
    fn descend_cost(&self, child: usize, aabb: &AABB) -> f64 {
        let child_node = &self.nodes[child];
        let combined_area = aabb.union(&child_node.aabb).surface_area();
        match child_node.kind {
            NodeKind::Leaf { .. } => combined_area,
            NodeKind::Branch { .. } => combined_area - child_node.aabb.surface_area(),
        }
    }

    fn insert_leaf(&mut self, leaf: usize) {
        let mut sibling = match self.root {
            Some(root) => root,
            None => {
                self.nodes[leaf].parent = None;
                self.root = Some(leaf);
                return;
            }
        };

        // walk down picking whichever option grows the total surface area the least

        let leaf_aabb = self.nodes[leaf].aabb;
        while let NodeKind::Branch { left, right } = self.nodes[sibling].kind {
            let area = self.nodes[sibling].aabb.surface_area();
            let combined_area = leaf_aabb.union(&self.nodes[sibling].aabb).surface_area();

            // pairing with this node creates a new parent with the combined area
            let cost_here = 2.0 * combined_area;
            // going further down still grows this node and everything above it
            let inherited = 2.0 * (combined_area - area);
            let cost_left = self.descend_cost(left, &leaf_aabb) + inherited;
            let cost_right = self.descend_cost(right, &leaf_aabb) + inherited;

            if cost_here < cost_left && cost_here < cost_right {
                break;
            }
            sibling = if cost_left < cost_right { left } else { right };
        }

        let old_parent = self.nodes[sibling].parent;
        let new_parent = self.alloc_node(Node {
            aabb: leaf_aabb.union(&self.nodes[sibling].aabb),
            parent: old_parent,
            height: self.nodes[sibling].height + 1,
            kind: NodeKind::Branch {
                left: sibling,
                right: leaf,
            },
        });
        self.replace_child(old_parent, sibling, new_parent);
        self.nodes[sibling].parent = Some(new_parent);
        self.nodes[leaf].parent = Some(new_parent);

        self.fix_upwards(Some(new_parent));
    }

    /// Detach a leaf from the tree, freeing its parent but not the leaf itself.
    fn remove_leaf(&mut self, leaf: usize) {
        let parent = match self.nodes[leaf].parent {
            Some(parent) => parent,
            None => {
                self.root = None;
                return;
            }
        };
        let sibling = match self.nodes[parent].kind {
            NodeKind::Branch { left, right } => {
                if left == leaf {
                    right
                } else {
                    left
                }
            }
            NodeKind::Leaf { .. } => return,
        };

        // the sibling takes the parent's place
        let grandparent = self.nodes[parent].parent;
        self.replace_child(grandparent, parent, sibling);
        self.nodes[sibling].parent = grandparent;
        self.nodes[leaf].parent = None;
        self.free_list.push(parent);

        self.fix_upwards(grandparent);
    }

    /// Recompute the box and height of a branch from its children.
    fn refit(&mut self, idx: usize) {
        if let NodeKind::Branch { left, right } = self.nodes[idx].kind {
            let (l, r) = (&self.nodes[left], &self.nodes[right]);
            let aabb = l.aabb.union(&r.aabb);
            let height = 1 + l.height.max(r.height);
            self.nodes[idx].aabb = aabb;
            self.nodes[idx].height = height;
        }
    }

    /// Refit and rebalance every node from `start` up to the root.
    fn fix_upwards(&mut self, start: Option<usize>) {
        let mut curr = start;
        while let Some(idx) = curr {
            self.refit(idx);
            let idx = self.balance(idx);
            curr = self.nodes[idx].parent;
        }
    }

    /// Rotate the taller child of node `a` up if the heights of its subtrees
    /// differ by more than one. Returns the node now in `a`'s place.
    fn balance(&mut self, a: usize) -> usize {
        let (b, c) = match self.nodes[a].kind {
            NodeKind::Branch { left, right } if self.nodes[a].height >= 2 => (left, right),
            _ => return a,
        };

        let diff = self.nodes[c].height - self.nodes[b].height;
        if diff > 1 {
            self.rotate_up(a, c)
        } else if diff < -1 {
            self.rotate_up(a, b)
        } else {
            a
        }
    }

    /// Make the child `high` of `a` take `a`'s place,
    /// with `a` as one of its children and its shorter child moved under `a`.
    fn rotate_up(&mut self, a: usize, high: usize) -> usize {
        let (f, g) = match self.nodes[high].kind {
            NodeKind::Branch { left, right } => (left, right),
            NodeKind::Leaf { .. } => return a,
        };
        let (tall, short) = if self.nodes[f].height > self.nodes[g].height {
            (f, g)
        } else {
            (g, f)
        };

        let parent = self.nodes[a].parent;
        self.replace_child(parent, a, high);
        self.nodes[high].parent = parent;

        self.replace_child(Some(a), high, short);
        self.nodes[short].parent = Some(a);

        self.nodes[high].kind = NodeKind::Branch {
            left: a,
            right: tall,
        };
        self.nodes[a].parent = Some(high);

        self.refit(a);
        self.refit(high);
        high
    }
}

/// Box and tree depth of a node, for debug visualization.
#[derive(Clone, Copy, Debug)]
pub struct NodeInfo {
    pub aabb: AABB,
    pub depth: usize,
}

//
// Iterator
//

/// An iterator that yields every object whose box may intersect with a given shape.
#[derive(Debug)]
pub struct OverlapIter<'a, S> {
    shape: &'a S,
    nodes: &'a [Node],
    stack: Vec<usize>,
}

impl<'a, S: Overlap> Iterator for OverlapIter<'a, S> {
    type Item = ObjectId;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(idx) = self.stack.pop() {
            match self.nodes[idx].kind {
                NodeKind::Branch { left, right } => {
                    // right goes on the stack first so that left is visited first
                    for child in [right, left] {
                        if self.shape.overlaps_aabb(&self.nodes[child].aabb) {
                            self.stack.push(child);
                        }
                    }
                }
                NodeKind::Leaf { object_id } => return Some(object_id),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        collision::{Obb, Ray, Sphere},
        math::{Rotor3, Vec3},
    };
    use rand::{distributions as distr, distributions::Distribution, rngs::StdRng, SeedableRng};
    use std::collections::HashSet;

    fn unit_cube(x: f64, y: f64, z: f64) -> AABB {
        AABB::from_center(Vec3::new(x, y, z), Vec3::broadcast(0.5))
    }

    fn sorted(mut ids: Vec<ObjectId>) -> Vec<ObjectId> {
        ids.sort_unstable();
        ids
    }

    fn three_cubes() -> BoundingTree {
        let mut tree = BoundingTree::new();
        for (id, x) in [(0, 0.0), (1, 10.0), (2, 20.0)] {
            tree.insert(id, unit_cube(x, 0.0, 0.0), 0.0).unwrap();
        }
        tree
    }

    #[test]
    fn ray_and_sphere_queries() {
        let tree = three_cubes();
        tree.validate().unwrap();
        assert_eq!(tree.len(), 3);

        let ray = Ray::between(Vec3::new(-1.0, 0.0, 0.0), Vec3::new(21.0, 0.0, 0.0)).unwrap();
        assert_eq!(sorted(tree.bounded_object_ids(&ray)), vec![0, 1, 2]);
        let short_ray = ray.with_max_distance(5.0);
        assert_eq!(tree.bounded_object_ids(&short_ray), vec![0]);

        let sphere = Sphere::new(Vec3::new(10.0, 0.0, 0.0), 0.5);
        assert_eq!(tree.bounded_object_ids(&sphere), vec![1]);
    }

    #[test]
    fn box_queries() {
        let tree = three_cubes();
        let aabb = AABB {
            min: Vec3::new(5.0, -1.0, -1.0),
            max: Vec3::new(25.0, 1.0, 1.0),
        };
        assert_eq!(sorted(tree.bounded_object_ids(&aabb)), vec![1, 2]);

        let obb = Obb::new(
            Vec3::new(20.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 1.0),
            Rotor3::from_rotation_xy(0.5),
        );
        assert_eq!(tree.bounded_object_ids(&obb), vec![2]);
    }

    #[test]
    fn empty_tree() {
        let mut tree = BoundingTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.height(), 0);
        tree.validate().unwrap();
        assert!(tree.bounded_object_ids(&unit_cube(0.0, 0.0, 0.0)).is_empty());
        assert!(tree.debug_boxes().is_empty());

        assert!(matches!(
            tree.remove(3),
            Err(BoundingTreeError::UnknownObject(3))
        ));
        assert!(matches!(
            tree.move_object(3, unit_cube(0.0, 0.0, 0.0), 0.0),
            Err(BoundingTreeError::UnknownObject(3))
        ));
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut tree = three_cubes();
        assert!(matches!(
            tree.insert(1, unit_cube(50.0, 0.0, 0.0), 0.0),
            Err(BoundingTreeError::DuplicateObject(1))
        ));
        // the first object is untouched
        tree.validate().unwrap();
        assert_eq!(tree.bounded_object_ids(&unit_cube(10.0, 0.0, 0.0)), vec![1]);
        assert!(tree.bounded_object_ids(&unit_cube(50.0, 0.0, 0.0)).is_empty());
    }

    #[test]
    fn small_moves_stay_in_padding() {
        let mut tree = three_cubes();
        tree.remove(1).unwrap();
        tree.insert(1, unit_cube(10.0, 0.0, 0.0), 1.0).unwrap();

        assert!(!tree.move_object(1, unit_cube(10.5, 0.0, 0.0), 1.0).unwrap());
        assert!(tree.move_object(1, unit_cube(15.0, 0.0, 0.0), 1.0).unwrap());
        tree.validate().unwrap();

        let fat = tree.fat_aabb(1).unwrap();
        assert_eq!(fat, unit_cube(15.0, 0.0, 0.0).padded(1.0));
        let sphere = Sphere::new(Vec3::new(15.0, 0.0, 0.0), 0.1);
        assert_eq!(tree.bounded_object_ids(&sphere), vec![1]);
    }

    #[test]
    fn debug_boxes_cover_every_node() {
        let tree = three_cubes();
        let boxes = tree.debug_boxes();
        // three leaves and two branches
        assert_eq!(boxes.len(), 5);
        assert_eq!(boxes[0].depth, 0);
        let leaf_boxes = boxes.iter().filter(|info| info.depth > 0).count();
        assert_eq!(leaf_boxes, 4);
        assert!(boxes.iter().all(|info| boxes[0].aabb.contains(&info.aabb)));
    }

    #[test]
    fn stays_balanced_when_filled_in_order() {
        let mut tree = BoundingTree::new();
        for i in 0..100 {
            tree.insert(i, unit_cube(i as f64 * 3.0, 0.0, 0.0), 0.1)
                .unwrap();
        }
        tree.validate().unwrap();
        assert_eq!(tree.len(), 100);
        assert!(tree.height() < 20, "height {}", tree.height());
    }

    #[test]
    fn random_operations_keep_invariants() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let coord = distr::Uniform::from(-50.0..50.0);
        let size = distr::Uniform::from(0.1..3.0);
        let op = distr::Uniform::from(0..4);
        let id_distr = distr::Uniform::from(0..64);

        let mut tree = BoundingTree::new();
        let mut live: HashSet<ObjectId> = HashSet::new();
        for _ in 0..1000 {
            let id = id_distr.sample(&mut rng);
            let aabb = AABB::from_center(
                Vec3::new(
                    coord.sample(&mut rng),
                    coord.sample(&mut rng),
                    coord.sample(&mut rng),
                ),
                Vec3::broadcast(size.sample(&mut rng)),
            );
            match op.sample(&mut rng) {
                0 | 1 => {
                    let inserted = tree.insert(id, aabb, 0.5).is_ok();
                    assert_eq!(inserted, live.insert(id));
                }
                2 => {
                    let moved = tree.move_object(id, aabb, 0.5).is_ok();
                    assert_eq!(moved, live.contains(&id));
                }
                _ => {
                    let removed = tree.remove(id).is_ok();
                    assert_eq!(removed, live.remove(&id));
                }
            }
            tree.validate().unwrap();
        }

        let in_tree: HashSet<ObjectId> = tree.object_ids().collect();
        assert_eq!(in_tree, live);
        // a box around everything finds every object exactly once
        let everything = AABB::from_center(Vec3::zero(), Vec3::broadcast(100.0));
        let found = tree.bounded_object_ids(&everything);
        assert_eq!(found.len(), live.len());
        assert_eq!(found.into_iter().collect::<HashSet<_>>(), live);
    }
}
