// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core tree implementation: arena, structural edits, queries.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use crate::types::{Kind, Node, NodeId, Op, Side};

#[derive(Clone, Debug)]
enum Content<P> {
    Primitive(P),
    Operation { op: Op, left: NodeId, right: NodeId },
}

#[derive(Clone, Debug)]
struct Slot<P> {
    generation: u32,
    parent: Option<NodeId>,
    origin: Option<NodeId>,
    content: Content<P>,
}

/// An arena of CSG nodes.
///
/// Every node is owned by exactly one parent, or is a parentless root held by the
/// caller. Several unattached subtrees may live in the same arena, which is how
/// editors build up operands before [joining](Tree::join) them.
///
/// The parent link stored with each node is non-owning bookkeeping for localized
/// edits; every structural operation keeps it in sync with the child links.
///
/// Structural misuse (stale identifiers, joining two attached subtrees, detaching
/// a root) is a programming error and panics.
#[derive(Clone)]
pub struct Tree<P> {
    slots: Vec<Option<Slot<P>>>,
    generations: Vec<u32>, // last generation per slot (persists across frees)
    free_list: Vec<usize>,
}

impl<P> Default for Tree<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for Tree<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.slots.len();
        let alive = self.slots.iter().filter(|n| n.is_some()).count();
        let free = self.free_list.len();
        f.debug_struct("Tree")
            .field("nodes_total", &total)
            .field("nodes_alive", &alive)
            .field("free_list", &free)
            .finish_non_exhaustive()
    }
}

impl<P> Tree<P> {
    /// Create a new empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
        }
    }

    /// Number of live nodes across all subtrees in the arena.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    /// True if the arena holds no live nodes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `id` refers to a live node.
    ///
    /// A `NodeId` is considered live if its slot exists and its generation matches
    /// the current generation stored in that slot.
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.slots
            .get(id.idx())
            .and_then(|n| n.as_ref())
            .map(|n| n.generation == id.1)
            .unwrap_or(false)
    }

    /// Borrowed view of a node; panics if `id` is stale.
    pub fn node(&self, id: NodeId) -> Node<'_, P> {
        view(self.slot(id))
    }

    /// Borrowed view of a node, or `None` if `id` is stale.
    pub fn get(&self, id: NodeId) -> Option<Node<'_, P>> {
        let slot = self.slots.get(id.idx())?.as_ref()?;
        (slot.generation == id.1).then(|| view(slot))
    }

    /// Shape classification of a node.
    pub fn kind(&self, id: NodeId) -> Kind {
        self.node(id).kind()
    }

    /// The parent of a node, `None` for a root.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).parent
    }

    /// The leaf of a source tree this node was copied from by [`Tree::copy_from`].
    ///
    /// Copies made inside one arena keep the origin of the copied leaf.
    pub fn origin(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).origin
    }

    /// The payload of a primitive leaf, `None` for an operation node.
    pub fn primitive(&self, id: NodeId) -> Option<&P> {
        match &self.slot(id).content {
            Content::Primitive(p) => Some(p),
            Content::Operation { .. } => None,
        }
    }

    /// Mutable payload of a primitive leaf, `None` for an operation node.
    pub fn primitive_mut(&mut self, id: NodeId) -> Option<&mut P> {
        match &mut self.slot_mut(id).content {
            Content::Primitive(p) => Some(p),
            Content::Operation { .. } => None,
        }
    }

    /// The operator of an operation node, `None` for a primitive leaf.
    pub fn op(&self, id: NodeId) -> Option<Op> {
        self.kind(id).op()
    }

    /// The `(left, right)` children of an operation node, `None` for a primitive leaf.
    pub fn children(&self, id: NodeId) -> Option<(NodeId, NodeId)> {
        match self.slot(id).content {
            Content::Primitive(_) => None,
            Content::Operation { left, right, .. } => Some((left, right)),
        }
    }

    /// One child of an operation node, `None` for a primitive leaf.
    pub fn child(&self, id: NodeId, side: Side) -> Option<NodeId> {
        self.children(id).map(|(left, right)| match side {
            Side::Left => left,
            Side::Right => right,
        })
    }

    /// Which child of its parent `id` is, `None` for a root.
    pub fn side_of(&self, id: NodeId) -> Option<Side> {
        let parent = self.parent(id)?;
        let (left, _) = self
            .children(parent)
            .expect("parent of a node must be an operation");
        Some(if left == id { Side::Left } else { Side::Right })
    }

    /// Walk parent links up to the root of the subtree containing `id`.
    pub fn root_of(&self, mut id: NodeId) -> NodeId {
        while let Some(parent) = self.parent(id) {
            id = parent;
        }
        id
    }

    /// Create a new, unattached primitive leaf.
    pub fn insert_primitive(&mut self, primitive: P) -> NodeId {
        self.alloc(Content::Primitive(primitive), None)
    }

    /// Create an operation node over `left` and `right`.
    ///
    /// If neither operand has a parent, the new node is a root. If exactly one
    /// operand is attached, the new node takes that operand's place in its parent,
    /// so an edit can wrap any subtree in place.
    ///
    /// # Panics
    ///
    /// Panics if both operands are attached, if they are the same node, or if the
    /// unattached operand is the root above the attached one (that would form a cycle).
    pub fn join(&mut self, op: Op, left: NodeId, right: NodeId) -> NodeId {
        assert_ne!(left, right, "cannot join a node with itself");
        let attached = match (self.parent(left), self.parent(right)) {
            (Some(_), Some(_)) => panic!("join: both operands are already attached"),
            (Some(_), None) => Some((left, right)),
            (None, Some(_)) => Some((right, left)),
            (None, None) => None,
        };
        let id = self.alloc(Content::Operation { op, left, right }, None);
        if let Some((inner, free)) = attached {
            assert_ne!(
                self.root_of(inner),
                free,
                "join: operand is an ancestor of the other operand"
            );
            self.replace_in_parent(inner, id);
        }
        self.slot_mut(left).parent = Some(id);
        self.slot_mut(right).parent = Some(id);
        id
    }

    /// Change the operator of an operation node.
    ///
    /// # Panics
    ///
    /// Panics if `id` is a primitive leaf.
    pub fn set_op(&mut self, id: NodeId, new_op: Op) {
        match &mut self.slot_mut(id).content {
            Content::Operation { op, .. } => *op = new_op,
            Content::Primitive(_) => panic!("set_op: node is a primitive"),
        }
    }

    /// Remove operation node `id`, put its right child in its place, and return
    /// the left child as a parentless subtree.
    ///
    /// # Panics
    ///
    /// Panics if `id` is a primitive or has no parent.
    pub fn detach_left(&mut self, id: NodeId) -> NodeId {
        self.detach(id, Side::Left)
    }

    /// Remove operation node `id`, put its left child in its place, and return
    /// the right child as a parentless subtree.
    ///
    /// # Panics
    ///
    /// Panics if `id` is a primitive or has no parent.
    pub fn detach_right(&mut self, id: NodeId) -> NodeId {
        self.detach(id, Side::Right)
    }

    /// Remove root operation node `id` together with its left subtree and return
    /// its right child, now parentless.
    ///
    /// # Panics
    ///
    /// Panics if `id` is a primitive or has a parent.
    pub fn delete_left_detach_right(&mut self, id: NodeId) -> NodeId {
        self.delete_detach(id, Side::Left)
    }

    /// Remove root operation node `id` together with its right subtree and return
    /// its left child, now parentless.
    ///
    /// # Panics
    ///
    /// Panics if `id` is a primitive or has a parent.
    pub fn delete_right_detach_left(&mut self, id: NodeId) -> NodeId {
        self.delete_detach(id, Side::Right)
    }

    /// Replace the left subtree of `id` with the parentless `subtree`, freeing the old one.
    ///
    /// # Panics
    ///
    /// Panics if `id` is a primitive, or if `subtree` is attached or contains `id`.
    pub fn replace_left(&mut self, id: NodeId, subtree: NodeId) {
        self.replace_child(id, Side::Left, subtree);
    }

    /// Replace the right subtree of `id` with the parentless `subtree`, freeing the old one.
    ///
    /// # Panics
    ///
    /// Panics if `id` is a primitive, or if `subtree` is attached or contains `id`.
    pub fn replace_right(&mut self, id: NodeId, subtree: NodeId) {
        self.replace_child(id, Side::Right, subtree);
    }

    /// Free a parentless subtree.
    ///
    /// # Panics
    ///
    /// Panics if `id` is stale or still attached to a parent.
    pub fn remove(&mut self, id: NodeId) {
        assert!(
            self.parent(id).is_none(),
            "remove: node is attached; detach it first"
        );
        self.free_subtree(id);
    }

    /// Delete the primitive `leaf` from the tree rooted at `root`.
    ///
    /// The operation node joining `leaf` to its sibling is removed as well, and the
    /// sibling takes its place. Returns the root of the edited tree, which changes
    /// when the leaf was a direct child of the root, and is `None` when the leaf was
    /// the whole tree.
    ///
    /// # Panics
    ///
    /// Panics if `root` is attached, if `leaf` is not a primitive, or if `leaf` is
    /// not inside the tree rooted at `root`.
    pub fn delete_primitive(&mut self, root: NodeId, leaf: NodeId) -> Option<NodeId> {
        assert!(
            self.parent(root).is_none(),
            "delete_primitive: root is attached"
        );
        assert_eq!(
            self.kind(leaf),
            Kind::Primitive,
            "delete_primitive: node is not a primitive"
        );
        assert_eq!(
            self.root_of(leaf),
            root,
            "delete_primitive: leaf is not in this tree"
        );
        let Some(parent) = self.parent(leaf) else {
            self.remove(leaf);
            return None;
        };
        let side = self.side_of(leaf).expect("attached leaf has a side");
        if self.parent(parent).is_some() {
            let removed = match side {
                Side::Left => self.detach_left(parent),
                Side::Right => self.detach_right(parent),
            };
            self.remove(removed);
            Some(root)
        } else {
            Some(match side {
                Side::Left => self.delete_left_detach_right(parent),
                Side::Right => self.delete_right_detach_left(parent),
            })
        }
    }

    /// The first leaf, in left-to-right order, whose payload satisfies `predicate`.
    pub fn find_primitive(
        &self,
        root: NodeId,
        mut predicate: impl FnMut(&P) -> bool,
    ) -> Option<NodeId> {
        self.leaves(root)
            .find(|&id| self.primitive(id).is_some_and(&mut predicate))
    }

    /// Iterate the leaves of a subtree from left to right.
    pub fn leaves(&self, root: NodeId) -> Leaves<'_, P> {
        Leaves {
            tree: self,
            stack: vec![root],
        }
    }

    /// Number of nodes in the subtree rooted at `root`.
    pub fn subtree_len(&self, root: NodeId) -> usize {
        match self.node(root) {
            Node::Primitive(_) => 1,
            Node::Operation { left, right, .. } => {
                1 + self.subtree_len(left) + self.subtree_len(right)
            }
        }
    }

    /// Evaluate the subtree as a boolean formula.
    ///
    /// `inside` reports membership for each primitive; union maps to or,
    /// intersection to and, and difference to and-not-right.
    pub fn evaluate(&self, root: NodeId, mut inside: impl FnMut(&P) -> bool) -> bool {
        self.evaluate_with(root, &mut inside)
    }

    fn evaluate_with(&self, id: NodeId, inside: &mut dyn FnMut(&P) -> bool) -> bool {
        match self.node(id) {
            Node::Primitive(p) => inside(p),
            Node::Operation { op, left, right } => {
                let l = self.evaluate_with(left, inside);
                let r = self.evaluate_with(right, inside);
                op.apply(l, r)
            }
        }
    }

    /// Whether the subtree is in canonical (sum of products) form.
    ///
    /// - A primitive is normal.
    /// - A union is normal if both children are.
    /// - A difference is normal if its right child is a primitive and its left child
    ///   is a normal non-union.
    /// - An intersection is normal if its right child is a primitive and its left
    ///   child is a normal intersection or primitive.
    pub fn is_normal(&self, root: NodeId) -> bool {
        match self.node(root) {
            Node::Primitive(_) => true,
            Node::Operation {
                op: Op::Union,
                left,
                right,
            } => self.is_normal(left) && self.is_normal(right),
            Node::Operation {
                op: Op::Difference,
                left,
                right,
            } => {
                self.kind(right) == Kind::Primitive
                    && self.kind(left) != Kind::Union
                    && self.is_normal(left)
            }
            Node::Operation {
                op: Op::Intersection,
                left,
                right,
            } => {
                self.kind(right) == Kind::Primitive
                    && matches!(self.kind(left), Kind::Intersection | Kind::Primitive)
                    && self.is_normal(left)
            }
        }
    }

    /// Display adaptor for the reverse-Polish text form of a subtree.
    ///
    /// Operations render as `<left> <right> <op>` and leaves as `[ <primitive> ]`,
    /// with tokens separated by single spaces.
    pub fn postfix(&self, root: NodeId) -> Postfix<'_, P> {
        Postfix { tree: self, root }
    }

    // --- internals ---

    fn slot(&self, id: NodeId) -> &Slot<P> {
        self.slots
            .get(id.idx())
            .and_then(|n| n.as_ref())
            .filter(|n| n.generation == id.1)
            .expect("dangling NodeId")
    }

    fn slot_mut(&mut self, id: NodeId) -> &mut Slot<P> {
        self.slots
            .get_mut(id.idx())
            .and_then(|n| n.as_mut())
            .filter(|n| n.generation == id.1)
            .expect("dangling NodeId")
    }

    fn alloc(&mut self, content: Content<P>, origin: Option<NodeId>) -> NodeId {
        let (idx, generation) = if let Some(idx) = self.free_list.pop() {
            let generation = self.generations[idx].saturating_add(1);
            self.generations[idx] = generation;
            (idx, generation)
        } else {
            self.slots.push(None);
            self.generations.push(1);
            (self.slots.len() - 1, 1)
        };
        self.slots[idx] = Some(Slot {
            generation,
            parent: None,
            origin,
            content,
        });
        NodeId::new(idx, generation)
    }

    /// Free one slot and hand back what it held.
    fn release(&mut self, id: NodeId) -> Content<P> {
        assert!(self.is_alive(id), "dangling NodeId");
        let slot = self.slots[id.idx()].take().expect("live slot");
        self.free_list.push(id.idx());
        slot.content
    }

    fn free_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Content::Operation { left, right, .. } = self.release(id) {
                stack.push(left);
                stack.push(right);
            }
        }
    }

    /// Put `new` where `old` hangs in its parent; `old` becomes parentless.
    fn replace_in_parent(&mut self, old: NodeId, new: NodeId) {
        let parent = self.slot(old).parent;
        if let Some(p) = parent {
            match &mut self.slot_mut(p).content {
                Content::Operation { left, right, .. } => {
                    if *left == old {
                        *left = new;
                    } else {
                        debug_assert_eq!(*right, old, "parent link out of sync");
                        *right = new;
                    }
                }
                Content::Primitive(_) => unreachable!("a primitive cannot be a parent"),
            }
        }
        self.slot_mut(new).parent = parent;
        self.slot_mut(old).parent = None;
    }

    fn detach(&mut self, id: NodeId, side: Side) -> NodeId {
        let (left, right) = self
            .children(id)
            .expect("detach: node is not an operation");
        assert!(
            self.parent(id).is_some(),
            "detach: node has no parent; use delete_*_detach_* on a root"
        );
        let (taken, kept) = match side {
            Side::Left => (left, right),
            Side::Right => (right, left),
        };
        self.replace_in_parent(id, kept);
        self.slot_mut(taken).parent = None;
        self.release(id);
        taken
    }

    fn delete_detach(&mut self, id: NodeId, deleted_side: Side) -> NodeId {
        let (left, right) = self
            .children(id)
            .expect("delete_detach: node is not an operation");
        assert!(
            self.parent(id).is_none(),
            "delete_detach: node has a parent; use detach_* instead"
        );
        let (deleted, kept) = match deleted_side {
            Side::Left => (left, right),
            Side::Right => (right, left),
        };
        self.slot_mut(deleted).parent = None;
        self.free_subtree(deleted);
        self.slot_mut(kept).parent = None;
        self.release(id);
        kept
    }

    fn replace_child(&mut self, id: NodeId, side: Side, subtree: NodeId) {
        let old = self
            .child(id, side)
            .expect("replace: node is not an operation");
        assert!(
            self.parent(subtree).is_none(),
            "replace: replacement subtree is attached"
        );
        assert_ne!(
            self.root_of(id),
            subtree,
            "replace: replacement subtree contains the node"
        );
        self.slot_mut(old).parent = None;
        self.free_subtree(old);
        match &mut self.slot_mut(id).content {
            Content::Operation { left, right, .. } => match side {
                Side::Left => *left = subtree,
                Side::Right => *right = subtree,
            },
            Content::Primitive(_) => unreachable!("checked above"),
        }
        self.slot_mut(subtree).parent = Some(id);
    }
}

impl<P: Clone> Tree<P> {
    /// Deep-copy a subtree inside this arena. The copy is parentless.
    pub fn copy_subtree(&mut self, id: NodeId) -> NodeId {
        let (content, origin) = {
            let slot = self.slot(id);
            (slot.content.clone(), slot.origin)
        };
        match content {
            Content::Primitive(p) => self.alloc(Content::Primitive(p), origin),
            Content::Operation { op, left, right } => {
                let left = self.copy_subtree(left);
                let right = self.copy_subtree(right);
                self.attach_new(op, left, right)
            }
        }
    }

    /// Deep-copy a subtree of `source` into this arena. The copy is parentless.
    ///
    /// Each copied leaf records the source leaf as its [origin](Tree::origin).
    pub fn copy_from(&mut self, source: &Self, id: NodeId) -> NodeId {
        match source.node(id) {
            Node::Primitive(p) => self.alloc(Content::Primitive(p.clone()), Some(id)),
            Node::Operation { op, left, right } => {
                let left = self.copy_from(source, left);
                let right = self.copy_from(source, right);
                self.attach_new(op, left, right)
            }
        }
    }

    fn attach_new(&mut self, op: Op, left: NodeId, right: NodeId) -> NodeId {
        let id = self.alloc(Content::Operation { op, left, right }, None);
        self.slot_mut(left).parent = Some(id);
        self.slot_mut(right).parent = Some(id);
        id
    }
}

fn view<P>(slot: &Slot<P>) -> Node<'_, P> {
    match &slot.content {
        Content::Primitive(p) => Node::Primitive(p),
        Content::Operation { op, left, right } => Node::Operation {
            op: *op,
            left: *left,
            right: *right,
        },
    }
}

/// Left-to-right leaf iterator returned by [`Tree::leaves`].
pub struct Leaves<'a, P> {
    tree: &'a Tree<P>,
    stack: Vec<NodeId>,
}

impl<P> fmt::Debug for Leaves<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Leaves")
            .field("pending", &self.stack.len())
            .finish_non_exhaustive()
    }
}

impl<P> Iterator for Leaves<'_, P> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        while let Some(id) = self.stack.pop() {
            match self.tree.node(id) {
                Node::Primitive(_) => return Some(id),
                Node::Operation { left, right, .. } => {
                    self.stack.push(right);
                    self.stack.push(left);
                }
            }
        }
        None
    }
}

/// Reverse-Polish rendering of a subtree, returned by [`Tree::postfix`].
pub struct Postfix<'a, P> {
    tree: &'a Tree<P>,
    root: NodeId,
}

impl<P> fmt::Debug for Postfix<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Postfix")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl<P: fmt::Display> fmt::Display for Postfix<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_postfix(self.tree, self.root, f)
    }
}

fn write_postfix<P: fmt::Display>(
    tree: &Tree<P>,
    id: NodeId,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    match tree.node(id) {
        Node::Primitive(p) => write!(f, "[ {p} ]"),
        Node::Operation { op, left, right } => {
            write_postfix(tree, left, f)?;
            f.write_str(" ")?;
            write_postfix(tree, right, f)?;
            write!(f, " {}", op.symbol())
        }
    }
}
