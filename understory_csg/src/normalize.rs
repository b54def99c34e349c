// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rewriting arbitrary trees into canonical sum-of-products form.
//!
//! A canonical tree is a union of *products*, where each product is a left-deep
//! chain of intersections over primitives followed by a left-deep chain of
//! subtracted primitives: `(((P1 ∩ P2) ∩ P3) − P4) − P5`. The image-space
//! evaluator only accepts this shape.

use core::fmt;

use crate::tree::Tree;
use crate::types::{Kind, NodeId, Op, Side};

/// One of the seven boolean-preserving rewrites applied by [`normalize`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Rewrite {
    /// `(A ∪ B) ∩ C → (A ∩ C) ∪ (B ∩ C)`
    DistributeIntersection,
    /// `(A − B) ∩ C → (A ∩ C) − B`
    HoistDifference,
    /// `A − (B ∪ C) → (A − B) − C`
    SubtractUnion,
    /// `(A ∪ B) − C → (A − C) ∪ (B − C)`
    DistributeDifference,
    /// `A − (B − C) → (A − B) ∪ (A ∩ C)`
    SubtractDifference,
    /// `A − (B ∩ C) → (A − B) ∪ (A − C)`
    SubtractIntersection,
    /// `A ∩ (B ∩ C) → (A ∩ B) ∩ C`
    ReassociateIntersection,
}

impl Rewrite {
    /// All rewrites, in rule order.
    pub const ALL: [Self; 7] = [
        Self::DistributeIntersection,
        Self::HoistDifference,
        Self::SubtractUnion,
        Self::DistributeDifference,
        Self::SubtractDifference,
        Self::SubtractIntersection,
        Self::ReassociateIntersection,
    ];

    /// The shape this rule rewrites: root operator, the side of the offending
    /// child, and that child's operator.
    ///
    /// Intersection is commutative, so the two intersection rules whose pattern
    /// sits on the left also apply to the mirrored shape.
    pub const fn pattern(self) -> (Op, Side, Op) {
        match self {
            Self::DistributeIntersection => (Op::Intersection, Side::Left, Op::Union),
            Self::HoistDifference => (Op::Intersection, Side::Left, Op::Difference),
            Self::SubtractUnion => (Op::Difference, Side::Right, Op::Union),
            Self::DistributeDifference => (Op::Difference, Side::Left, Op::Union),
            Self::SubtractDifference => (Op::Difference, Side::Right, Op::Difference),
            Self::SubtractIntersection => (Op::Difference, Side::Right, Op::Intersection),
            Self::ReassociateIntersection => (Op::Intersection, Side::Right, Op::Intersection),
        }
    }
}

impl fmt::Display for Rewrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DistributeIntersection => "(A+B)*C -> (A*C)+(B*C)",
            Self::HoistDifference => "(A-B)*C -> (A*C)-B",
            Self::SubtractUnion => "A-(B+C) -> (A-B)-C",
            Self::DistributeDifference => "(A+B)-C -> (A-C)+(B-C)",
            Self::SubtractDifference => "A-(B-C) -> (A-B)+(A*C)",
            Self::SubtractIntersection => "A-(B*C) -> (A-B)+(A-C)",
            Self::ReassociateIntersection => "A*(B*C) -> (A*B)*C",
        })
    }
}

/// Pick the rewrite for a node of kind `root` with children of kind `left` and `right`.
///
/// Returns the side holding the child the rule takes apart, or `None` when the
/// node is not fixable. A left fix is preferred when both sides qualify.
pub fn classify(root: Kind, left: Kind, right: Kind) -> Option<(Side, Rewrite)> {
    use Rewrite as R;
    let left_fix = match (root, left) {
        (Kind::Intersection, Kind::Union) => Some(R::DistributeIntersection),
        (Kind::Intersection, Kind::Difference) => Some(R::HoistDifference),
        (Kind::Difference, Kind::Union) => Some(R::DistributeDifference),
        _ => None,
    };
    if let Some(rule) = left_fix {
        return Some((Side::Left, rule));
    }
    let right_fix = match (root, right) {
        (Kind::Intersection, Kind::Union) => R::DistributeIntersection,
        (Kind::Intersection, Kind::Difference) => R::HoistDifference,
        (Kind::Intersection, Kind::Intersection) => R::ReassociateIntersection,
        (Kind::Difference, Kind::Union) => R::SubtractUnion,
        (Kind::Difference, Kind::Difference) => R::SubtractDifference,
        (Kind::Difference, Kind::Intersection) => R::SubtractIntersection,
        _ => return None,
    };
    Some((Side::Right, right_fix))
}

/// A canonical tree produced by [`normalize`].
///
/// The tree owns its own arena, holding exactly the nodes reachable from
/// [`root`](Self::root). Leaves remember the raw-tree leaf they were copied from.
#[derive(Clone)]
pub struct NormalTree<P> {
    tree: Tree<P>,
    root: NodeId,
    leaf_count: usize,
}

impl<P> fmt::Debug for NormalTree<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NormalTree")
            .field("root", &self.root)
            .field("nodes", &self.tree.len())
            .field("leaves", &self.leaf_count)
            .finish_non_exhaustive()
    }
}

impl<P> NormalTree<P> {
    /// The arena holding the canonical tree.
    pub fn tree(&self) -> &Tree<P> {
        &self.tree
    }

    /// Root of the canonical tree.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of primitive leaves.
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// The raw-tree leaf a canonical leaf was copied from.
    ///
    /// Distribution rules duplicate subtrees, so several canonical leaves may share
    /// one origin.
    pub fn origin(&self, leaf: NodeId) -> Option<NodeId> {
        self.tree.origin(leaf)
    }

    /// Give up the canonical-form guarantee and take the arena and root.
    pub fn into_parts(self) -> (Tree<P>, NodeId) {
        (self.tree, self.root)
    }
}

/// Counters gathered while normalizing, for logging.
#[derive(Default)]
struct Stats {
    rewrites: usize,
}

/// Rewrite the subtree of `source` rooted at `root` into canonical form.
///
/// The input is never mutated; the result lives in a fresh arena. Boolean meaning
/// is preserved: for every assignment of inside/outside to the leaves,
/// [`Tree::evaluate`] gives the same answer on both trees.
pub fn normalize<P: Clone>(source: &Tree<P>, root: NodeId) -> NormalTree<P> {
    let input_nodes = source.subtree_len(root);
    let mut tree = Tree::new();
    let copy = tree.copy_from(source, root);
    let mut stats = Stats::default();
    let root = normalize_node(&mut tree, copy, &mut stats);
    debug_assert!(tree.is_normal(root), "normalizer produced a non-canonical tree");
    debug_assert_eq!(
        tree.len(),
        tree.subtree_len(root),
        "normalizer leaked discarded subtrees"
    );
    let leaf_count = tree.leaves(root).count();
    tracing::debug!(
        input_nodes,
        output_nodes = tree.len(),
        leaves = leaf_count,
        rewrites = stats.rewrites,
        "normalized CSG tree"
    );
    NormalTree {
        tree,
        root,
        leaf_count,
    }
}

/// Normalize `id` in place: the result occupies `id`'s position in its parent.
fn normalize_node<P: Clone>(tree: &mut Tree<P>, mut id: NodeId, stats: &mut Stats) -> NodeId {
    if tree.kind(id) == Kind::Primitive {
        return id;
    }
    loop {
        while let Some((side, rule)) = classify_node(tree, id) {
            id = rewrite(tree, id, side, rule);
            stats.rewrites += 1;
        }
        let left = tree.child(id, Side::Left).expect("operation has children");
        normalize_node(tree, left, stats);
        if classify_node(tree, id).is_none() {
            break;
        }
    }
    let right = tree.child(id, Side::Right).expect("operation has children");
    normalize_node(tree, right, stats);
    id
}

fn classify_node<P>(tree: &Tree<P>, id: NodeId) -> Option<(Side, Rewrite)> {
    let (left, right) = tree.children(id)?;
    classify(tree.kind(id), tree.kind(left), tree.kind(right))
}

/// Apply `rule` at `id`, whose child on `side` has the rule's shape.
///
/// The replacement is assembled from fresh copies of the operands and then
/// swapped into `id`'s position; the old subtree is freed.
pub(crate) fn rewrite<P: Clone>(
    tree: &mut Tree<P>,
    id: NodeId,
    side: Side,
    rule: Rewrite,
) -> NodeId {
    let child = tree.child(id, side).expect("rewrite target is an operation");
    let sibling = tree.child(id, side.other()).expect("rewrite target is an operation");
    let (inner_left, inner_right) = tree
        .children(child)
        .expect("rewritten child is an operation");

    let other = tree.copy_subtree(sibling);
    let cl = tree.copy_subtree(inner_left);
    let cr = tree.copy_subtree(inner_right);

    let replacement = match rule {
        Rewrite::DistributeIntersection => {
            let other_again = tree.copy_subtree(other);
            let l = tree.join(Op::Intersection, cl, other);
            let r = tree.join(Op::Intersection, cr, other_again);
            tree.join(Op::Union, l, r)
        }
        Rewrite::HoistDifference => {
            let l = tree.join(Op::Intersection, cl, other);
            tree.join(Op::Difference, l, cr)
        }
        Rewrite::SubtractUnion => {
            let l = tree.join(Op::Difference, other, cl);
            tree.join(Op::Difference, l, cr)
        }
        Rewrite::DistributeDifference => {
            let other_again = tree.copy_subtree(other);
            let l = tree.join(Op::Difference, cl, other);
            let r = tree.join(Op::Difference, cr, other_again);
            tree.join(Op::Union, l, r)
        }
        Rewrite::SubtractDifference => {
            let other_again = tree.copy_subtree(other);
            let l = tree.join(Op::Difference, other, cl);
            let r = tree.join(Op::Intersection, other_again, cr);
            tree.join(Op::Union, l, r)
        }
        Rewrite::SubtractIntersection => {
            let other_again = tree.copy_subtree(other);
            let l = tree.join(Op::Difference, other, cl);
            let r = tree.join(Op::Difference, other_again, cr);
            tree.join(Op::Union, l, r)
        }
        Rewrite::ReassociateIntersection => {
            let l = tree.join(Op::Intersection, other, cl);
            tree.join(Op::Intersection, l, cr)
        }
    };
    tracing::trace!(%rule, ?side, node = ?id, "applied rewrite");

    match (tree.parent(id), tree.side_of(id)) {
        (Some(parent), Some(Side::Left)) => tree.replace_left(parent, replacement),
        (Some(parent), Some(Side::Right)) => tree.replace_right(parent, replacement),
        _ => tree.remove(id),
    }
    replacement
}
