// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_scs --heading-base-level=0

//! Understory SCS: image-space CSG evaluation with depth and stencil buffers.
//!
//! Given a canonical CSG tree from `understory_csg`, the [`Evaluator`] computes the visible
//! surface of the solid per pixel using the sequenced convex subtraction technique. Nothing
//! is converted to a boundary mesh: primitives are only ever rasterized, front or back faces,
//! under varying depth and stencil state.
//!
//! - [`RasterTarget`] is the seam to the graphics device. It is generic over the primitive
//!   type, so the same evaluator drives a GPU backend or the CPU [`SoftwareTarget`].
//! - [`Evaluator::prepare`] runs the depth pass and optionally resolves a pick;
//!   [`Evaluator::present`] paints colors for the selected [`RenderMode`].
//! - A step budget stops the depth pass after a given number of buffer operations, which is
//!   how the intermediate stages of the technique can be inspected.
//! - [`PickPalette`] and [`resolve`] map a read-back pick color to the canonical leaf;
//!   `NormalTree::origin` maps that back to the edited tree.
//!
//! Primitives must be convex: along any view ray they cover a single depth interval.
//!
//! # Example
//!
//! ```rust
//! use kurbo::{Point, Rect};
//! use understory_csg::{Op, Tree, normalize};
//! use understory_scs::solids::{Cuboid, Solid};
//! use understory_scs::{Evaluator, Progress, Rgb, SoftwareTarget};
//!
//! let slab = |name: &str, x0, near, far| {
//!     Solid::from(Cuboid {
//!         name: name.into(),
//!         bounds: Rect::new(x0, 0.0, 1.0, 1.0),
//!         near,
//!         far,
//!         color: Rgb::WHITE,
//!     })
//! };
//!
//! // A plate with a notch cut into its right half.
//! let mut tree = Tree::new();
//! let plate = tree.insert_primitive(slab("plate", 0.0, 0.2, 0.8));
//! let cutter = tree.insert_primitive(slab("cutter", 0.5, 0.1, 0.5));
//! let root = tree.join(Op::Difference, plate, cutter);
//! let normal = normalize(&tree, root);
//!
//! let mut target = SoftwareTarget::new(4, 1);
//! let mut evaluator = Evaluator::new();
//! let evaluation = evaluator.evaluate(&normal, &mut target, None);
//! assert_eq!(evaluation.progress, Progress::Complete);
//! assert_eq!(target.depth().get(0, 0), 0.2);
//! assert_eq!(target.depth().get(3, 0), 0.5);
//!
//! // The floor of the notch belongs to the cutter.
//! let picked = evaluator.pick(&normal, &mut target, Point::new(3.5, 0.5), false);
//! assert_eq!(picked.and_then(|leaf| normal.origin(leaf)), Some(cutter));
//! ```

mod evaluator;
mod pick;
mod software;
pub mod solids;
mod target;

pub use evaluator::{
    Evaluation, Evaluator, EvaluatorConfig, PickRequest, Progress, RenderMode,
    subtraction_sequence,
};
pub use pick::{PickColors, PickPalette, resolve};
pub use software::{Coverage, SoftwareTarget, Span};
pub use target::{
    Buffers, ClearValues, ColorImage, Compare, DepthImage, Face, Image, Paint, RasterState,
    RasterTarget, Rgb, StencilImage, StencilOp, StencilTest,
};
