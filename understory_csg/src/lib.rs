// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_csg --heading-base-level=0

//! Understory CSG: arena-backed constructive solid geometry trees.
//!
//! A CSG tree describes a solid as boolean operations (union, intersection, difference) over
//! primitive solids. This crate holds the editable tree and turns it into the canonical
//! sum-of-products shape consumed by image-space renderers such as `understory_scs`.
//!
//! - [`Tree`]: a slot arena of binary nodes with generational [`NodeId`] handles and parent links
//!   kept in sync by every structural edit.
//! - [`normalize`]: rewrites a tree into a [`NormalTree`], a union of products where each product
//!   is an intersection chain followed by subtracted primitives.
//! - [`Tree::postfix`] and [`parse_postfix`]: the reverse-Polish text form.
//!
//! ## Editing model
//!
//! Every node has exactly one owner: its parent, or the caller holding a root. Several
//! unattached subtrees may share an arena while an edit is being assembled. Structural
//! misuse (stale ids, attaching an already attached subtree twice, detaching a root) panics.
//!
//! Key operations:
//! - [`Tree::insert_primitive`] and [`Tree::join`] build trees.
//! - [`Tree::detach_left`] / [`Tree::detach_right`] remove an interior operation and hand back
//!   one child; [`Tree::delete_left_detach_right`] / [`Tree::delete_right_detach_left`] do the same
//!   at the root.
//! - [`Tree::replace_left`] / [`Tree::replace_right`] swap out a child subtree.
//! - [`Tree::delete_primitive`] combines the above into the usual "delete this leaf" edit.
//!
//! ## Canonical form
//!
//! A primitive is normal. A union is normal if both children are. A difference is normal if its
//! right child is a primitive and its left child is a normal non-union. An intersection is normal
//! if its right child is a primitive and its left child is a normal intersection or primitive.
//! [`Tree::is_normal`] checks this; [`normalize`] establishes it without mutating its input.
//!
//! This crate is `no_std` and uses `alloc`.
//!
//! # Example
//!
//! ```rust
//! use understory_csg::{Op, Tree, normalize};
//!
//! let mut tree = Tree::new();
//! let a = tree.insert_primitive("a");
//! let b = tree.insert_primitive("b");
//! let c = tree.insert_primitive("c");
//! let ab = tree.join(Op::Union, a, b);
//! let root = tree.join(Op::Intersection, ab, c);
//! assert_eq!(tree.postfix(root).to_string(), "[ a ] [ b ] + [ c ] *");
//! assert!(!tree.is_normal(root));
//!
//! let normal = normalize(&tree, root);
//! assert_eq!(
//!     normal.tree().postfix(normal.root()).to_string(),
//!     "[ a ] [ c ] * [ b ] [ c ] * +",
//! );
//!
//! // Same solid: compare the boolean formula for every assignment.
//! for bits in 0..8_u32 {
//!     let inside = |p: &&str| bits & (1 << (p.as_bytes()[0] - b'a')) != 0;
//!     assert_eq!(
//!         tree.evaluate(root, inside),
//!         normal.tree().evaluate(normal.root(), inside),
//!     );
//! }
//! ```
//!
//! ### Deleting a leaf
//!
//! ```rust
//! use understory_csg::{Op, Tree};
//!
//! let mut tree = Tree::new();
//! let a = tree.insert_primitive("a");
//! let b = tree.insert_primitive("b");
//! let c = tree.insert_primitive("c");
//! let ab = tree.join(Op::Union, a, b);
//! let root = tree.join(Op::Difference, ab, c);
//!
//! let root = tree.delete_primitive(root, b).unwrap();
//! assert_eq!(tree.postfix(root).to_string(), "[ a ] [ c ] -");
//! assert!(!tree.is_alive(b));
//! ```

#![no_std]

extern crate alloc;

mod normalize;
mod postfix;
mod tree;
mod types;

pub use normalize::{NormalTree, Rewrite, classify, normalize};
pub use postfix::{ParseError, parse_postfix};
pub use tree::{Leaves, Postfix, Tree};
pub use types::{Kind, Node, NodeId, Op, Side};
