// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The image-space CSG evaluator.
//!
//! A frame has two halves. [`Evaluator::prepare`] runs the *depth pass*: it leaves
//! the depth of the visible CSG surface in the target's depth buffer, and can pick
//! the leaf under a point. [`Evaluator::present`] then paints colors against that
//! depth buffer according to the [`RenderMode`].
//!
//! The depth pass works on one product at a time. For a product
//! `(((P1 ∩ P2) ∩ ...) − S1) − S2 ...` it
//!
//! 1. finds the farthest front face of the intersected primitives and keeps it where
//!    every intersected primitive has a back face behind it (back faces are counted
//!    in the 8-bit stencil buffer, in groups of up to 255 primitives),
//! 2. carves each subtracted primitive out with a two-pass stencil test, in a fixed
//!    order that contains every relative order of the subtrahends
//!    (see [`subtraction_sequence`]),
//! 3. resets pixels whose surface was pushed behind the intersection.
//!
//! Products of a union are merged through a saved depth image.

use kurbo::{Point, Rect};
use understory_csg::{Kind, Node, NodeId, NormalTree, Op, Tree};

use crate::pick::{PickPalette, resolve};
use crate::target::{
    Buffers, ClearValues, ColorImage, Compare, DepthImage, Face, Paint, RasterState,
    RasterTarget, Rgb, StencilImage, StencilOp, StencilTest,
};

/// What [`Evaluator::present`] draws.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum RenderMode {
    /// The shaded CSG result.
    #[default]
    Csg,
    /// The depth of the CSG result as gray levels, nearer is brighter.
    CsgDepth,
    /// Every primitive, as if all operations were unions.
    AllPrimitives,
    /// The depth of [`RenderMode::AllPrimitives`] as gray levels.
    AllPrimitivesDepth,
    /// Four quadrants: CSG color (top left), its depth (top right), the stencil
    /// buffer (bottom left) and the saved merge depth (bottom right).
    Split,
}

impl RenderMode {
    /// Whether the depth pass evaluates boolean operations.
    pub const fn is_csg(self) -> bool {
        matches!(self, Self::Csg | Self::CsgDepth | Self::Split)
    }
}

/// Evaluator settings.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct EvaluatorConfig {
    /// What [`Evaluator::present`] draws.
    pub mode: RenderMode,
    /// Stop the depth pass after this many buffer operations; `None` runs it to the end.
    pub step_budget: Option<u32>,
    /// Colors used by picking.
    pub palette: PickPalette,
}

/// A pick query for [`Evaluator::prepare`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PickRequest {
    /// Pixel position in the target, top-left origin.
    pub point: Point,
    /// Pick the nearest primitive along the ray even where boolean operations
    /// removed it, instead of the visible surface.
    pub select_invisible: bool,
}

/// Whether the depth pass ran to the end.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Progress {
    /// Every buffer operation ran.
    Complete,
    /// The step budget ran out; the target holds the state after the last allowed operation.
    Incomplete,
}

/// Result of [`Evaluator::prepare`] or [`Evaluator::evaluate`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Evaluation {
    /// Whether the depth pass completed.
    pub progress: Progress,
    /// Buffer operations the depth pass performed.
    pub steps: u32,
    /// The canonical leaf under the pick point, if a pick was requested and hit.
    pub picked: Option<NodeId>,
}

/// Per-session image-space CSG evaluator.
///
/// The evaluator owns its settings and the scratch data the split view keeps
/// between [`prepare`](Self::prepare) and [`present`](Self::present). A tree must
/// not change between the two calls.
#[derive(Clone, Debug, Default)]
pub struct Evaluator {
    config: EvaluatorConfig,
    split_merged: Option<DepthImage>,
}

/// The depth pass ran out of budget.
#[derive(Copy, Clone, Debug)]
struct BudgetExhausted;

type Step = Result<(), BudgetExhausted>;

impl Evaluator {
    /// An evaluator with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// An evaluator with the given settings.
    pub fn with_config(config: EvaluatorConfig) -> Self {
        Self {
            config,
            split_merged: None,
        }
    }

    /// Current settings.
    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Current render mode.
    pub fn mode(&self) -> RenderMode {
        self.config.mode
    }

    /// Change the render mode.
    pub fn set_mode(&mut self, mode: RenderMode) {
        self.config.mode = mode;
    }

    /// Set or clear the step budget of the depth pass.
    pub fn set_step_budget(&mut self, budget: Option<u32>) {
        self.config.step_budget = budget;
    }

    /// Change the picking palette.
    pub fn set_palette(&mut self, palette: PickPalette) {
        self.config.palette = palette;
    }

    /// Run the depth pass, and resolve `pick` if given.
    ///
    /// Visible-surface picks run after the depth pass and are skipped when it was cut
    /// short by the step budget. Picks that select invisible primitives run first,
    /// against a plain z-buffer. The split view never picks.
    pub fn prepare<P, T: RasterTarget<P>>(
        &mut self,
        tree: &NormalTree<P>,
        target: &mut T,
        pick: Option<PickRequest>,
    ) -> Evaluation {
        let mode = self.config.mode;
        let budget = self.config.step_budget;
        tracing::debug!(?mode, ?budget, leaves = tree.leaf_count(), "depth pass started");
        self.split_merged = None;

        let (pass, picked) = if mode == RenderMode::Split {
            let full = target.viewport();
            let quadrant = top_left_quadrant(full);
            target.set_viewport(quadrant);
            let (w, h) = pixel_size(quadrant);
            let mut pass = DepthPass::new(tree.tree(), target, budget);
            // Starts at the far plane so the quadrant shows black until a merge happens.
            pass.merged.reset(w, h, 1.0);
            let outcome = pass.products(tree.root(), true);
            let (steps, merged) = (pass.steps, pass.merged);
            target.set_viewport(full);
            self.split_merged = Some(merged);
            ((outcome, steps), None)
        } else {
            let invisible = match pick {
                Some(request) if request.select_invisible => {
                    self.pick_nearest(tree, target, request.point)
                }
                _ => None,
            };
            let mut pass = DepthPass::new(tree.tree(), target, budget);
            let outcome = if mode.is_csg() {
                pass.products(tree.root(), true)
            } else {
                pass.all_primitives(tree.root())
            };
            let steps = pass.steps;
            let picked = match pick {
                Some(request) if !request.select_invisible && outcome.is_ok() => {
                    self.pick_visible(tree, target, request.point, mode.is_csg())
                }
                _ => invisible,
            };
            ((outcome, steps), picked)
        };

        let (outcome, steps) = pass;
        let progress = match outcome {
            Ok(()) => Progress::Complete,
            Err(BudgetExhausted) => {
                tracing::debug!(steps, "step budget exhausted");
                Progress::Incomplete
            }
        };
        tracing::debug!(?progress, steps, ?picked, "depth pass finished");
        Evaluation {
            progress,
            steps,
            picked,
        }
    }

    /// Paint the color buffer from the depth left by [`prepare`](Self::prepare).
    pub fn present<P, T: RasterTarget<P>>(&mut self, tree: &NormalTree<P>, target: &mut T) {
        let mode = self.config.mode;
        tracing::debug!(?mode, "presenting");
        target.set_state(RasterState::default());
        target.clear(Buffers::COLOR, ClearValues::FAR);
        match mode {
            RenderMode::Csg => shade_csg(tree, target),
            RenderMode::CsgDepth => show_depth(target),
            RenderMode::AllPrimitives => shade_all(tree, target),
            RenderMode::AllPrimitivesDepth => {
                shade_all(tree, target);
                show_depth(target);
            }
            RenderMode::Split => self.present_split(tree, target),
        }
    }

    /// [`prepare`](Self::prepare) followed by [`present`](Self::present).
    pub fn evaluate<P, T: RasterTarget<P>>(
        &mut self,
        tree: &NormalTree<P>,
        target: &mut T,
        pick: Option<PickRequest>,
    ) -> Evaluation {
        let evaluation = self.prepare(tree, target, pick);
        self.present(tree, target);
        evaluation
    }

    /// Run the depth pass and return the canonical leaf under `point`.
    pub fn pick<P, T: RasterTarget<P>>(
        &mut self,
        tree: &NormalTree<P>,
        target: &mut T,
        point: Point,
        select_invisible: bool,
    ) -> Option<NodeId> {
        let request = PickRequest {
            point,
            select_invisible,
        };
        self.prepare(tree, target, Some(request)).picked
    }

    /// Flat pick colors against the depth pass result; subtrahends show their back faces.
    fn pick_visible<P, T: RasterTarget<P>>(
        &self,
        tree: &NormalTree<P>,
        target: &mut T,
        point: Point,
        csg: bool,
    ) -> Option<NodeId> {
        target.set_state(RasterState::depth(Compare::Equal, false));
        target.clear(Buffers::COLOR, ClearValues::FAR);
        let mut colors = self.config.palette.colors();
        paint_tree(tree.tree(), tree.root(), target, csg, &mut || {
            Paint::Flat(colors.next().unwrap_or(Rgb::BLACK))
        });
        self.read_pick(tree, target, point)
    }

    /// Flat pick colors through a plain z-buffer of every primitive.
    fn pick_nearest<P, T: RasterTarget<P>>(
        &self,
        tree: &NormalTree<P>,
        target: &mut T,
        point: Point,
    ) -> Option<NodeId> {
        target.set_state(RasterState::depth(Compare::Less, true));
        target.clear(Buffers::COLOR | Buffers::DEPTH, ClearValues::FAR);
        let mut colors = self.config.palette.colors();
        paint_tree(tree.tree(), tree.root(), target, false, &mut || {
            Paint::Flat(colors.next().unwrap_or(Rgb::BLACK))
        });
        self.read_pick(tree, target, point)
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "The point is checked against the target size before conversion."
    )]
    fn read_pick<P, T: RasterTarget<P>>(
        &self,
        tree: &NormalTree<P>,
        target: &mut T,
        point: Point,
    ) -> Option<NodeId> {
        let size = target.size();
        if !(point.x >= 0.0 && point.y >= 0.0 && point.x < size.width && point.y < size.height) {
            return None;
        }
        let color = target.read_color(point.x as u32, point.y as u32);
        let index = self.config.palette.index(color);
        tracing::trace!(?point, ?color, index, "pick read back");
        resolve(tree, index)
    }

    fn present_split<P, T: RasterTarget<P>>(&mut self, tree: &NormalTree<P>, target: &mut T) {
        let full = target.viewport();
        let quadrant = top_left_quadrant(full);
        let (w, h) = pixel_size(quadrant);
        let (x, y) = pixel_origin(full);

        target.set_viewport(quadrant);
        let mut stencil = StencilImage::default();
        target.read_stencil(&mut stencil);
        let mut depth = DepthImage::default();
        target.read_depth(&mut depth);
        shade_csg(tree, target);
        target.set_viewport(full);

        let merged = self
            .split_merged
            .take()
            .unwrap_or_else(|| DepthImage::new(w, h, 1.0));
        target.write_color(x + w, y, &depth_to_gray(&depth));
        target.write_color(x, y + h, &stencil.map(stencil_color));
        target.write_color(x + w, y + h, &depth_to_gray(&merged));
    }
}

/// The order in which a product visits its `n` subtrahends.
///
/// Index `0` is the subtrahend nearest the product root. The sequence starts there and
/// then sweeps to the far end and back, `n` sweeps in total, so it has
/// `n(n-1) + 1` entries. Every ordering of the `n` indices occurs in it as a
/// subsequence; applying an already-correct subtraction again changes nothing.
///
/// ```
/// use understory_scs::subtraction_sequence;
///
/// assert_eq!(subtraction_sequence(3), [0, 1, 2, 1, 0, 1, 2]);
/// ```
pub fn subtraction_sequence(n: usize) -> Vec<usize> {
    let mut sequence = Vec::with_capacity(n * n.saturating_sub(1) + 1);
    if n == 0 {
        return sequence;
    }
    sequence.push(0);
    let mut at = 0;
    for sweep in 0..n {
        if sweep % 2 == 0 {
            while at + 1 < n {
                at += 1;
                sequence.push(at);
            }
        } else {
            while at > 0 {
                at -= 1;
                sequence.push(at);
            }
        }
    }
    sequence
}

/// One budgeted run over the depth buffer.
struct DepthPass<'a, P, T> {
    tree: &'a Tree<P>,
    target: &'a mut T,
    budget: Option<u32>,
    steps: u32,
    merged: DepthImage,
}

impl<'a, P, T: RasterTarget<P>> DepthPass<'a, P, T> {
    fn new(tree: &'a Tree<P>, target: &'a mut T, budget: Option<u32>) -> Self {
        Self {
            tree,
            target,
            budget,
            steps: 0,
            merged: DepthImage::default(),
        }
    }

    /// Claim one unit of budget for the next buffer operation.
    fn step(&mut self) -> Step {
        if self.budget.is_some_and(|budget| self.steps >= budget) {
            return Err(BudgetExhausted);
        }
        self.steps += 1;
        Ok(())
    }

    fn clear(&mut self, buffers: Buffers, values: ClearValues) -> Step {
        self.step()?;
        self.target.clear(buffers, values);
        Ok(())
    }

    fn draw(&mut self, leaf: NodeId, face: Face) -> Step {
        self.step()?;
        let tree = self.tree;
        let primitive = tree.primitive(leaf).expect("product operand is a primitive");
        self.target.draw_primitive(primitive, face, Paint::None);
        Ok(())
    }

    fn fill_far_plane(&mut self) -> Step {
        self.step()?;
        self.target.fill_far_plane();
        Ok(())
    }

    fn save_depth(&mut self) -> Step {
        self.step()?;
        self.target.read_depth(&mut self.merged);
        Ok(())
    }

    fn merge_depth(&mut self) -> Step {
        self.step()?;
        self.target.set_state(RasterState::depth(Compare::Less, true));
        self.target.draw_depth(&self.merged);
        Ok(())
    }

    /// Walk the unions above the products, merging each product into the depth buffer.
    fn products(&mut self, id: NodeId, first: bool) -> Step {
        let tree = self.tree;
        match tree.node(id) {
            Node::Primitive(_) => {
                self.target.set_state(RasterState::depth(Compare::Less, true));
                if first {
                    self.clear(Buffers::DEPTH | Buffers::STENCIL, ClearValues::FAR)?;
                }
                self.draw(id, Face::Front)
            }
            Node::Operation {
                op: Op::Union,
                left,
                right,
            } => {
                self.products(left, first)?;
                self.products(right, false)
            }
            Node::Operation { .. } => {
                if !first {
                    self.save_depth()?;
                }
                self.product(id)?;
                if !first {
                    self.merge_depth()?;
                }
                Ok(())
            }
        }
    }

    /// Replace the depth buffer with the image of one product.
    fn product(&mut self, id: NodeId) -> Step {
        let tree = self.tree;
        let mut subtrahends = Vec::new();
        let mut base = id;
        while let Some(Op::Difference) = tree.op(base) {
            let (left, right) = tree.children(base).expect("difference has children");
            subtrahends.push(right);
            base = left;
        }
        tracing::trace!(
            intersected = tree.leaves(base).count(),
            subtracted = subtrahends.len(),
            "product"
        );
        self.intersect(base)?;
        if subtrahends.is_empty() {
            return Ok(());
        }
        for index in subtraction_sequence(subtrahends.len()) {
            self.subtract(subtrahends[index])?;
        }
        self.punch_holes(base)
    }

    /// Replace the depth buffer with the image of an intersection chain.
    fn intersect(&mut self, chain: NodeId) -> Step {
        let tree = self.tree;
        if tree.kind(chain) == Kind::Primitive {
            self.target.set_state(RasterState::depth(Compare::Always, true));
            self.clear(Buffers::DEPTH | Buffers::STENCIL, ClearValues::FAR)?;
            return self.draw(chain, Face::Front);
        }

        // Farthest front face per pixel.
        self.target.set_state(RasterState::depth(Compare::Greater, true));
        self.clear(Buffers::DEPTH | Buffers::STENCIL, ClearValues::NEAR)?;
        let leaves: Vec<NodeId> = tree.leaves(chain).collect();
        for &leaf in &leaves {
            self.draw(leaf, Face::Front)?;
        }

        // Count back faces behind it, at most one stencil range per group. Every fill
        // zeroes the stencil, and a pixel sent to the far plane has no back faces
        // behind it in later groups, so it stays there.
        for group in leaves.chunks(usize::from(u8::MAX)) {
            self.target.set_state(
                RasterState::depth(Compare::Greater, false).with_stencil(StencilTest {
                    compare: Compare::Always,
                    reference: 0,
                    fail: StencilOp::Keep,
                    depth_fail: StencilOp::Keep,
                    pass: StencilOp::IncrementClamp,
                }),
            );
            for &leaf in group {
                self.draw(leaf, Face::Back)?;
            }

            // Outside at least one operand: back to the far plane.
            self.target.set_state(
                RasterState::depth(Compare::Always, true).with_stencil(StencilTest {
                    compare: Compare::NotEqual,
                    reference: u8::try_from(group.len()).expect("groups fit the stencil range"),
                    fail: StencilOp::Zero,
                    depth_fail: StencilOp::Zero,
                    pass: StencilOp::Zero,
                }),
            );
            self.fill_far_plane()?;
        }
        Ok(())
    }

    /// Push the surface to the back of `leaf` wherever the surface lies inside it.
    fn subtract(&mut self, leaf: NodeId) -> Step {
        self.target.set_state(
            RasterState::depth(Compare::Less, false).with_stencil(StencilTest {
                compare: Compare::Always,
                reference: 1,
                fail: StencilOp::Zero,
                depth_fail: StencilOp::Zero,
                pass: StencilOp::Replace,
            }),
        );
        self.draw(leaf, Face::Front)?;

        self.target.set_state(
            RasterState::depth(Compare::Greater, true).with_stencil(StencilTest {
                compare: Compare::Equal,
                reference: 1,
                fail: StencilOp::Zero,
                depth_fail: StencilOp::Zero,
                pass: StencilOp::Zero,
            }),
        );
        self.draw(leaf, Face::Back)
    }

    /// Reset pixels whose surface ended up behind a back face of the intersection.
    fn punch_holes(&mut self, chain: NodeId) -> Step {
        let tree = self.tree;
        self.target.set_state(
            RasterState::depth(Compare::Less, false).with_stencil(StencilTest {
                compare: Compare::Always,
                reference: 1,
                fail: StencilOp::Keep,
                depth_fail: StencilOp::Keep,
                pass: StencilOp::Replace,
            }),
        );
        for leaf in tree.leaves(chain) {
            self.draw(leaf, Face::Back)?;
        }

        self.target.set_state(
            RasterState::depth(Compare::Always, true).with_stencil(StencilTest {
                compare: Compare::Equal,
                reference: 1,
                fail: StencilOp::Zero,
                depth_fail: StencilOp::Zero,
                pass: StencilOp::Zero,
            }),
        );
        self.fill_far_plane()
    }

    /// Plain z-buffer of every primitive, for the modes that ignore boolean operations.
    fn all_primitives(&mut self, root: NodeId) -> Step {
        let tree = self.tree;
        self.target.set_state(RasterState::depth(Compare::Less, true));
        self.clear(Buffers::DEPTH | Buffers::STENCIL, ClearValues::FAR)?;
        for leaf in tree.leaves(root) {
            self.draw(leaf, Face::Front)?;
        }
        Ok(())
    }
}

/// Draw every leaf in order. Left operands show front faces; with `csg`, the
/// right operand of a difference shows its back faces.
fn paint_tree<P, T: RasterTarget<P>>(
    tree: &Tree<P>,
    id: NodeId,
    target: &mut T,
    csg: bool,
    paint: &mut dyn FnMut() -> Paint,
) {
    paint_node(tree, id, Face::Front, target, csg, paint);
}

fn paint_node<P, T: RasterTarget<P>>(
    tree: &Tree<P>,
    id: NodeId,
    face: Face,
    target: &mut T,
    csg: bool,
    paint: &mut dyn FnMut() -> Paint,
) {
    match tree.node(id) {
        Node::Primitive(primitive) => target.draw_primitive(primitive, face, paint()),
        Node::Operation { op, left, right } => {
            paint_node(tree, left, Face::Front, target, csg, paint);
            let right_face = if csg && op == Op::Difference {
                Face::Back
            } else {
                Face::Front
            };
            paint_node(tree, right, right_face, target, csg, paint);
        }
    }
}

/// Shaded colors wherever a face lies exactly on the evaluated surface.
fn shade_csg<P, T: RasterTarget<P>>(tree: &NormalTree<P>, target: &mut T) {
    target.set_state(RasterState::depth(Compare::Equal, false));
    target.clear(Buffers::STENCIL, ClearValues::FAR);
    paint_tree(tree.tree(), tree.root(), target, true, &mut || Paint::Shaded);
}

/// Ordinary z-buffered shading of every primitive.
fn shade_all<P, T: RasterTarget<P>>(tree: &NormalTree<P>, target: &mut T) {
    target.set_state(RasterState::depth(Compare::Less, true));
    target.clear(Buffers::DEPTH, ClearValues::FAR);
    paint_tree(tree.tree(), tree.root(), target, false, &mut || Paint::Shaded);
}

/// Replace the viewport's colors with its depth as gray levels.
fn show_depth<P, T: RasterTarget<P>>(target: &mut T) {
    let mut depth = DepthImage::default();
    target.read_depth(&mut depth);
    let (x, y) = pixel_origin(target.viewport());
    target.write_color(x, y, &depth_to_gray(&depth));
}

fn depth_to_gray(depth: &DepthImage) -> ColorImage {
    depth.map(|d| Rgb::gray(1.0 - d))
}

/// Colors for stencil values, cycling through eight.
fn stencil_color(value: u8) -> Rgb {
    const PALETTE: [Rgb; 8] = [
        Rgb::BLACK,
        Rgb::new(255, 0, 0),
        Rgb::new(0, 255, 0),
        Rgb::new(0, 0, 255),
        Rgb::new(255, 0, 255),
        Rgb::new(0, 255, 255),
        Rgb::new(255, 255, 0),
        Rgb::WHITE,
    ];
    PALETTE[usize::from(value % 8)]
}

fn top_left_quadrant(viewport: Rect) -> Rect {
    let (w, h) = pixel_size(viewport);
    Rect::from_origin_size(
        viewport.origin(),
        (f64::from(w / 2), f64::from(h / 2)),
    )
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "Viewports are whole, non-negative pixel rectangles."
)]
fn pixel_size(rect: Rect) -> (u32, u32) {
    (rect.width().max(0.0) as u32, rect.height().max(0.0) as u32)
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "Viewports are whole, non-negative pixel rectangles."
)]
fn pixel_origin(rect: Rect) -> (u32, u32) {
    (rect.x0.max(0.0) as u32, rect.y0.max(0.0) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::software::SoftwareTarget;
    use crate::solids::{Cuboid, Solid};
    use understory_csg::{Tree, normalize};

    /// A full-height box spanning `x0..x1` horizontally.
    fn slab(name: &str, x0: f64, x1: f64, near: f32, far: f32, color: Rgb) -> Solid {
        Solid::Cuboid(Cuboid {
            name: name.into(),
            bounds: Rect::new(x0, 0.0, x1, 1.0),
            near,
            far,
            color,
        })
    }

    const RED: Rgb = Rgb::new(200, 0, 0);
    const GREEN: Rgb = Rgb::new(0, 200, 0);
    const BLUE: Rgb = Rgb::new(0, 0, 200);

    fn row(target: &SoftwareTarget) -> Vec<f32> {
        (0..target.depth().width())
            .map(|x| target.depth().get(x, 0))
            .collect()
    }

    /// `a − b` where `b` covers the right half and holds `a`'s front face.
    fn notch(through: bool) -> (NormalTree<Solid>, NodeId, NodeId) {
        let mut tree = Tree::new();
        let a = tree.insert_primitive(slab("a", 0.0, 1.0, 0.2, 0.8, RED));
        let far = if through { 0.9 } else { 0.5 };
        let b = tree.insert_primitive(slab("b", 0.5, 1.0, 0.1, far, GREEN));
        let root = tree.join(Op::Difference, a, b);
        (normalize(&tree, root), a, b)
    }

    fn evaluator(mode: RenderMode) -> Evaluator {
        Evaluator::with_config(EvaluatorConfig {
            mode,
            ..EvaluatorConfig::default()
        })
    }

    fn permutations(n: usize) -> Vec<Vec<usize>> {
        if n == 0 {
            return vec![vec![]];
        }
        let mut out = Vec::new();
        for rest in permutations(n - 1) {
            for at in 0..=rest.len() {
                let mut p = rest.clone();
                p.insert(at, n - 1);
                out.push(p);
            }
        }
        out
    }

    fn is_subsequence(needle: &[usize], hay: &[usize]) -> bool {
        let mut hay = hay.iter();
        needle.iter().all(|n| hay.any(|h| h == n))
    }

    #[test]
    fn subtraction_sequence_shape() {
        assert!(subtraction_sequence(0).is_empty());
        assert_eq!(subtraction_sequence(1), [0]);
        assert_eq!(subtraction_sequence(2), [0, 1, 0]);
        assert_eq!(subtraction_sequence(4), [0, 1, 2, 3, 2, 1, 0, 1, 2, 3, 2, 1, 0]);
        for n in 1..10 {
            assert_eq!(subtraction_sequence(n).len(), n * (n - 1) + 1);
        }
    }

    #[test]
    fn subtraction_sequence_contains_every_order() {
        for n in 1..=6 {
            let sequence = subtraction_sequence(n);
            for order in permutations(n) {
                assert!(
                    is_subsequence(&order, &sequence),
                    "{order:?} missing from {sequence:?}"
                );
            }
        }
    }

    #[test]
    fn difference_moves_surface_to_subtrahend_back() {
        let (tree, ..) = notch(false);
        let mut target = SoftwareTarget::new(8, 1);
        let evaluation = Evaluator::new().prepare(&tree, &mut target, None);
        assert_eq!(evaluation.progress, Progress::Complete);
        assert_eq!(row(&target), [0.2, 0.2, 0.2, 0.2, 0.5, 0.5, 0.5, 0.5]);
    }

    #[test]
    fn subtrahend_through_the_solid_leaves_a_hole() {
        let (tree, ..) = notch(true);
        let mut target = SoftwareTarget::new(8, 1);
        Evaluator::new().prepare(&tree, &mut target, None);
        assert_eq!(row(&target), [0.2, 0.2, 0.2, 0.2, 1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn intersection_keeps_the_overlap() {
        let mut tree = Tree::new();
        let a = tree.insert_primitive(slab("a", 0.0, 0.75, 0.2, 0.6, RED));
        let b = tree.insert_primitive(slab("b", 0.25, 1.0, 0.4, 0.8, GREEN));
        let root = tree.join(Op::Intersection, a, b);
        let normal = normalize(&tree, root);
        let mut target = SoftwareTarget::new(8, 1);
        Evaluator::new().prepare(&normal, &mut target, None);
        assert_eq!(row(&target), [1.0, 1.0, 0.4, 0.4, 0.4, 0.4, 1.0, 1.0]);
    }

    #[test]
    fn disjoint_depth_ranges_intersect_to_nothing() {
        let mut tree = Tree::new();
        let a = tree.insert_primitive(slab("a", 0.0, 1.0, 0.1, 0.3, RED));
        let b = tree.insert_primitive(slab("b", 0.0, 1.0, 0.5, 0.7, GREEN));
        let root = tree.join(Op::Intersection, a, b);
        let normal = normalize(&tree, root);
        let mut target = SoftwareTarget::new(4, 1);
        Evaluator::new().prepare(&normal, &mut target, None);
        assert_eq!(row(&target), [1.0; 4]);
    }

    #[test]
    fn long_intersection_chains_count_every_operand() {
        // 256 operands overflow one 8-bit stencil count; the half-width one goes first
        // and last so it lands in either group.
        for half_first in [true, false] {
            let mut tree = Tree::new();
            let half = tree.insert_primitive(slab("half", 0.0, 0.5, 0.2, 0.8, RED));
            let mut root = if half_first {
                half
            } else {
                tree.insert_primitive(slab("s0", 0.0, 1.0, 0.1, 0.9, GREEN))
            };
            for i in 1..256 {
                let leaf = if !half_first && i == 255 {
                    half
                } else {
                    tree.insert_primitive(slab(&format!("s{i}"), 0.0, 1.0, 0.1, 0.9, GREEN))
                };
                root = tree.join(Op::Intersection, root, leaf);
            }
            let normal = normalize(&tree, root);
            assert_eq!(normal.leaf_count(), 256);
            let mut target = SoftwareTarget::new(4, 1);
            let evaluation = Evaluator::new().prepare(&normal, &mut target, None);
            assert_eq!(evaluation.progress, Progress::Complete);
            assert_eq!(row(&target), [0.2, 0.2, 1.0, 1.0], "half first: {half_first}");
            assert_eq!(target.stencil().pixels(), &[0; 4]);
        }
    }

    #[test]
    fn union_of_products_keeps_nearest_surface() {
        let mut tree = Tree::new();
        let a = tree.insert_primitive(slab("a", 0.0, 0.5, 0.3, 0.6, RED));
        let b = tree.insert_primitive(slab("b", 0.0, 0.25, 0.1, 0.4, GREEN));
        let c = tree.insert_primitive(slab("c", 0.25, 1.0, 0.5, 0.9, BLUE));
        let d = tree.insert_primitive(slab("d", 0.375, 1.0, 0.2, 0.7, RED));
        let ab = tree.join(Op::Difference, a, b);
        let cd = tree.join(Op::Intersection, c, d);
        let root = tree.join(Op::Union, ab, cd);
        let normal = normalize(&tree, root);
        let mut target = SoftwareTarget::new(8, 1);
        let evaluation = Evaluator::new().prepare(&normal, &mut target, None);
        assert_eq!(row(&target), [0.4, 0.4, 0.3, 0.3, 0.5, 0.5, 0.5, 0.5]);
        assert_eq!(u64::from(evaluation.steps), target.operations());
    }

    #[test]
    fn zero_budget_touches_nothing() {
        let (tree, ..) = notch(false);
        let mut target = SoftwareTarget::new(8, 1);
        let mut evaluator = Evaluator::new();
        evaluator.set_step_budget(Some(0));
        let evaluation = evaluator.prepare(&tree, &mut target, None);
        assert_eq!(evaluation.progress, Progress::Incomplete);
        assert_eq!(evaluation.steps, 0);
        assert_eq!(target.operations(), 0);
    }

    #[test]
    fn budget_stops_after_exactly_that_many_operations() {
        let (tree, ..) = notch(false);
        let mut full = SoftwareTarget::new(8, 1);
        let complete = Evaluator::new().prepare(&tree, &mut full, None);
        // Clear, front; subtract front and back; punch back, far fill.
        assert_eq!(complete.steps, 6);
        assert_eq!(full.operations(), 6);

        for budget in 0..=complete.steps {
            let mut target = SoftwareTarget::new(8, 1);
            let mut evaluator = Evaluator::new();
            evaluator.set_step_budget(Some(budget));
            let evaluation = evaluator.prepare(&tree, &mut target, None);
            assert_eq!(evaluation.steps, budget);
            assert_eq!(target.operations(), u64::from(budget));
            let expected = if budget == complete.steps {
                Progress::Complete
            } else {
                Progress::Incomplete
            };
            assert_eq!(evaluation.progress, expected, "budget {budget}");
        }

        // A partial pass shows the intermediate state: `a` drawn, nothing subtracted.
        let mut target = SoftwareTarget::new(8, 1);
        let mut evaluator = Evaluator::new();
        evaluator.set_step_budget(Some(2));
        evaluator.prepare(&tree, &mut target, None);
        assert_eq!(row(&target), [0.2; 8]);
    }

    #[test]
    fn csg_present_shades_visible_faces() {
        let (tree, ..) = notch(false);
        let mut target = SoftwareTarget::new(8, 1);
        Evaluator::new().evaluate(&tree, &mut target, None);
        assert_eq!(target.color().get(0, 0), RED.scale(1.0 - 0.5 * 0.2));
        assert_eq!(
            target.color().get(7, 0),
            GREEN.scale((1.0 - 0.5 * 0.5) * 0.6),
            "the subtrahend's back face is visible"
        );

        let (tree, ..) = notch(true);
        let mut target = SoftwareTarget::new(8, 1);
        Evaluator::new().evaluate(&tree, &mut target, None);
        assert_eq!(target.color().get(7, 0), Rgb::BLACK);
    }

    #[test]
    fn depth_mode_shows_inverted_gray() {
        let (tree, ..) = notch(false);
        let mut target = SoftwareTarget::new(8, 1);
        evaluator(RenderMode::CsgDepth).evaluate(&tree, &mut target, None);
        assert_eq!(target.color().get(0, 0), Rgb::gray(1.0 - 0.2));
        assert_eq!(target.color().get(6, 0), Rgb::gray(1.0 - 0.5));
    }

    #[test]
    fn all_primitives_ignores_operations() {
        let (tree, ..) = notch(true);
        let mut target = SoftwareTarget::new(8, 1);
        let evaluation = evaluator(RenderMode::AllPrimitives).evaluate(&tree, &mut target, None);
        assert_eq!(evaluation.progress, Progress::Complete);
        assert_eq!(row(&target), [0.2, 0.2, 0.2, 0.2, 0.1, 0.1, 0.1, 0.1]);
        assert_eq!(target.color().get(5, 0), GREEN.scale(1.0 - 0.5 * 0.1));

        let mut target = SoftwareTarget::new(8, 1);
        evaluator(RenderMode::AllPrimitivesDepth).evaluate(&tree, &mut target, None);
        assert_eq!(target.color().get(5, 0), Rgb::gray(1.0 - 0.1));
    }

    #[test]
    fn pick_visible_surface() {
        let (tree, a, b) = notch(false);
        let mut target = SoftwareTarget::new(8, 1);
        let mut evaluator = Evaluator::new();
        let left = evaluator.pick(&tree, &mut target, Point::new(1.5, 0.5), false);
        assert_eq!(left.and_then(|id| tree.origin(id)), Some(a));
        let right = evaluator.pick(&tree, &mut target, Point::new(5.5, 0.5), false);
        assert_eq!(right.and_then(|id| tree.origin(id)), Some(b));
        assert_eq!(
            evaluator.pick(&tree, &mut target, Point::new(9.0, 0.5), false),
            None
        );
    }

    #[test]
    fn pick_through_hole_needs_select_invisible() {
        let (tree, _, b) = notch(true);
        let mut target = SoftwareTarget::new(8, 1);
        let mut evaluator = Evaluator::new();
        let at = Point::new(5.5, 0.5);
        assert_eq!(evaluator.pick(&tree, &mut target, at, false), None);
        let hidden = evaluator.pick(&tree, &mut target, at, true);
        assert_eq!(hidden.and_then(|id| tree.origin(id)), Some(b));

        // The depth pass still runs after an invisible pick.
        assert_eq!(row(&target), [0.2, 0.2, 0.2, 0.2, 1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn incomplete_pass_does_not_pick_visible() {
        let (tree, ..) = notch(false);
        let mut target = SoftwareTarget::new(8, 1);
        let mut evaluator = Evaluator::new();
        evaluator.set_step_budget(Some(3));
        let request = PickRequest {
            point: Point::new(1.5, 0.5),
            select_invisible: false,
        };
        let evaluation = evaluator.prepare(&tree, &mut target, Some(request));
        assert_eq!(evaluation.progress, Progress::Incomplete);
        assert_eq!(evaluation.picked, None);
    }

    #[test]
    fn split_view_quadrants() {
        let mut tree = Tree::new();
        let a = tree.insert_primitive(slab("a", 0.0, 1.0, 0.5, 0.75, RED));
        let c = tree.insert_primitive(slab("c", 0.0, 1.0, 0.25, 0.9, GREEN));
        let d = tree.insert_primitive(slab("d", 0.5, 1.0, 0.1, 0.3, BLUE));
        let cd = tree.join(Op::Difference, c, d);
        let root = tree.join(Op::Union, a, cd);
        let normal = normalize(&tree, root);

        let mut reference = SoftwareTarget::new(4, 4);
        Evaluator::new().evaluate(&normal, &mut reference, None);

        let mut split = SoftwareTarget::new(8, 8);
        let mut evaluator = evaluator(RenderMode::Split);
        let pick = PickRequest {
            point: Point::new(1.0, 1.0),
            select_invisible: false,
        };
        let evaluation = evaluator.evaluate(&normal, &mut split, Some(pick));
        assert_eq!(evaluation.progress, Progress::Complete);
        assert_eq!(evaluation.picked, None, "the split view never picks");
        assert_eq!(
            RasterTarget::<Solid>::viewport(&split),
            Rect::new(0.0, 0.0, 8.0, 8.0)
        );

        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(split.color().get(x, y), reference.color().get(x, y));
                let depth = reference.depth().get(x, y);
                assert_eq!(split.color().get(x + 4, y), Rgb::gray(1.0 - depth));
                assert_eq!(split.color().get(x, y + 4), Rgb::BLACK);
                // Saved before `c − d` was merged: only `a`.
                assert_eq!(split.color().get(x + 4, y + 4), Rgb::gray(1.0 - 0.5));
            }
        }

        // The shaded quadrant read back through the target is the whole small frame.
        let mut quadrant = ColorImage::default();
        RasterTarget::<Solid>::set_viewport(&mut split, Rect::new(0.0, 0.0, 4.0, 4.0));
        RasterTarget::<Solid>::read_color_image(&mut split, &mut quadrant);
        let mut frame = ColorImage::default();
        RasterTarget::<Solid>::read_color_image(&mut reference, &mut frame);
        assert_eq!((quadrant.width(), quadrant.height()), (4, 4));
        assert_eq!(quadrant, frame);
    }

    #[test]
    fn stencil_palette_cycles() {
        assert_eq!(stencil_color(0), Rgb::BLACK);
        assert_eq!(stencil_color(1), Rgb::new(255, 0, 0));
        assert_eq!(stencil_color(7), Rgb::WHITE);
        assert_eq!(stencil_color(9), stencil_color(1));
    }
}
