// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public types for CSG trees: node identifiers, operators, and node views.

/// Identifier for a node in a [`Tree`](crate::Tree).
///
/// This is a small, copyable handle that stays stable across edits but becomes
/// invalid when the underlying slot is freed.
/// It consists of a slot index and a generation counter.
///
/// ## Semantics
///
/// - On insert, a fresh slot is allocated with generation `1`.
/// - On removal, the slot is freed; any existing `NodeId` that pointed to that slot is now stale.
/// - On reuse of a freed slot, its generation is incremented, producing a new, distinct `NodeId`.
///
/// ### Liveness
///
/// Use [`Tree::is_alive`](crate::Tree::is_alive) to check whether a `NodeId` still refers to a live node.
/// Stale `NodeId`s never alias a different live node because the generation must match.
/// Passing a stale `NodeId` to any structural operation is a programming error and panics.
///
/// Identifiers are only meaningful for the tree that issued them.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct NodeId(pub(crate) u32, pub(crate) u32);

impl NodeId {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "NodeId uses 32-bit indices by design."
    )]
    pub(crate) const fn new(idx: usize, generation: u32) -> Self {
        Self(idx as u32, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }
}

/// A boolean set operator combining exactly two subtrees.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Op {
    /// Points in either operand.
    Union,
    /// Points in both operands.
    Intersection,
    /// Points in the left operand but not in the right one.
    Difference,
}

impl Op {
    /// All operators, in declaration order.
    pub const ALL: [Self; 3] = [Self::Union, Self::Intersection, Self::Difference];

    /// Symbol used by the postfix text form: `+`, `*` or `-`.
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Union => "+",
            Self::Intersection => "*",
            Self::Difference => "-",
        }
    }

    /// Inverse of [`Op::symbol`].
    pub fn from_symbol(token: &str) -> Option<Self> {
        match token {
            "+" => Some(Self::Union),
            "*" => Some(Self::Intersection),
            "-" => Some(Self::Difference),
            _ => None,
        }
    }

    /// Membership of a point given its membership in the left and right operands.
    pub const fn apply(self, left: bool, right: bool) -> bool {
        match self {
            Self::Union => left || right,
            Self::Intersection => left && right,
            Self::Difference => left && !right,
        }
    }
}

/// Shape classification of a node, used by normal-form checks and rewrites.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Kind {
    /// A primitive leaf.
    Primitive,
    /// An operation node with [`Op::Union`].
    Union,
    /// An operation node with [`Op::Intersection`].
    Intersection,
    /// An operation node with [`Op::Difference`].
    Difference,
}

impl Kind {
    /// All kinds, primitive first.
    pub const ALL: [Self; 4] = [
        Self::Primitive,
        Self::Union,
        Self::Intersection,
        Self::Difference,
    ];

    /// The operator of an operation kind, `None` for [`Kind::Primitive`].
    pub const fn op(self) -> Option<Op> {
        match self {
            Self::Primitive => None,
            Self::Union => Some(Op::Union),
            Self::Intersection => Some(Op::Intersection),
            Self::Difference => Some(Op::Difference),
        }
    }
}

impl From<Op> for Kind {
    fn from(op: Op) -> Self {
        match op {
            Op::Union => Self::Union,
            Op::Intersection => Self::Intersection,
            Op::Difference => Self::Difference,
        }
    }
}

/// Which child of an operation node.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Side {
    /// The left operand.
    Left,
    /// The right operand.
    Right,
}

impl Side {
    /// The other child.
    pub const fn other(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// Borrowed view of a live node.
///
/// Matching on the view is the only way to reach a primitive payload or the
/// children of an operation, so asking the wrong variant for its fields cannot
/// be expressed.
#[derive(Debug)]
pub enum Node<'a, P> {
    /// A primitive leaf and its payload.
    Primitive(&'a P),
    /// An operation node and its two children.
    Operation {
        /// The boolean operator.
        op: Op,
        /// Left operand.
        left: NodeId,
        /// Right operand.
        right: NodeId,
    },
}

impl<P> Clone for Node<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for Node<'_, P> {}

impl<P> Node<'_, P> {
    /// Shape classification of this node.
    pub fn kind(&self) -> Kind {
        match self {
            Self::Primitive(_) => Kind::Primitive,
            Self::Operation { op, .. } => Kind::from(*op),
        }
    }
}
