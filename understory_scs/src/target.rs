// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Raster target abstraction: the depth/stencil/color operations the evaluator issues.

use core::fmt;

use kurbo::{Rect, Size};

/// An 8-bit RGB color.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rgb {
    /// Red.
    pub r: u8,
    /// Green.
    pub g: u8,
    /// Blue.
    pub b: u8,
}

impl Rgb {
    /// Black, also the pick color of the background.
    pub const BLACK: Self = Self::new(0, 0, 0);
    /// White.
    pub const WHITE: Self = Self::new(255, 255, 255);

    /// Create a color from its channels.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// A gray level from an intensity in `[0, 1]`.
    pub fn gray(level: f32) -> Self {
        let v = unit_to_byte(level);
        Self::new(v, v, v)
    }

    /// Scale every channel by `factor`, saturating at the channel range.
    #[must_use]
    pub fn scale(self, factor: f32) -> Self {
        let s = |c: u8| unit_to_byte(f32::from(c) / 255.0 * factor);
        Self::new(s(self.r), s(self.g), s(self.b))
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "The value is clamped to the byte range first."
)]
fn unit_to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// A row-major image of `width × height` pixels.
#[derive(Clone, PartialEq)]
pub struct Image<T> {
    width: u32,
    height: u32,
    pixels: Vec<T>,
}

/// Depth values in `[0, 1]`, `0` nearest.
pub type DepthImage = Image<f32>;
/// Stencil values.
pub type StencilImage = Image<u8>;
/// Colors.
pub type ColorImage = Image<Rgb>;

impl<T> fmt::Debug for Image<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl<T> Default for Image<T> {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            pixels: Vec::new(),
        }
    }
}

impl<T: Copy> Image<T> {
    /// An image with every pixel set to `fill`.
    pub fn new(width: u32, height: u32, fill: T) -> Self {
        Self {
            width,
            height,
            pixels: vec![fill; width as usize * height as usize],
        }
    }

    /// Resize to `width × height` and set every pixel to `fill`, reusing the allocation.
    pub fn reset(&mut self, width: u32, height: u32, fill: T) {
        self.width = width;
        self.height = height;
        self.pixels.clear();
        self.pixels.resize(width as usize * height as usize, fill);
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel at `(x, y)`; panics when out of bounds.
    pub fn get(&self, x: u32, y: u32) -> T {
        self.pixels[self.offset(x, y)]
    }

    /// Set the pixel at `(x, y)`; panics when out of bounds.
    pub fn set(&mut self, x: u32, y: u32, value: T) {
        let i = self.offset(x, y);
        self.pixels[i] = value;
    }

    /// All pixels, row-major.
    pub fn pixels(&self) -> &[T] {
        &self.pixels
    }

    /// Map every pixel into a new image of the same size.
    pub fn map<U: Copy>(&self, f: impl FnMut(T) -> U) -> Image<U> {
        Image {
            width: self.width,
            height: self.height,
            pixels: self.pixels.iter().copied().map(f).collect(),
        }
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) outside {}x{} image",
            self.width,
            self.height
        );
        y as usize * self.width as usize + x as usize
    }
}

/// Comparison used by the depth and stencil tests.
///
/// A test passes when `incoming <op> stored` holds; for the stencil test the
/// incoming value is the reference.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compare {
    /// Never passes.
    Never,
    /// Passes if incoming is less than stored.
    #[default]
    Less,
    /// Passes if equal.
    Equal,
    /// Passes if incoming is less than or equal to stored.
    LessEqual,
    /// Passes if incoming is greater than stored.
    Greater,
    /// Passes if not equal.
    NotEqual,
    /// Passes if incoming is greater than or equal to stored.
    GreaterEqual,
    /// Always passes.
    Always,
}

impl Compare {
    /// Evaluate the comparison.
    pub fn test<T: PartialOrd>(self, incoming: T, stored: T) -> bool {
        match self {
            Self::Never => false,
            Self::Less => incoming < stored,
            Self::Equal => incoming == stored,
            Self::LessEqual => incoming <= stored,
            Self::Greater => incoming > stored,
            Self::NotEqual => incoming != stored,
            Self::GreaterEqual => incoming >= stored,
            Self::Always => true,
        }
    }
}

/// What to do with a stored stencil value.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum StencilOp {
    /// Leave it.
    #[default]
    Keep,
    /// Set it to zero.
    Zero,
    /// Set it to the reference value.
    Replace,
    /// Add one, saturating at the maximum.
    IncrementClamp,
}

impl StencilOp {
    /// The new stencil value.
    pub const fn apply(self, stored: u8, reference: u8) -> u8 {
        match self {
            Self::Keep => stored,
            Self::Zero => 0,
            Self::Replace => reference,
            Self::IncrementClamp => stored.saturating_add(1),
        }
    }
}

/// Stencil test and the updates applied for each outcome.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct StencilTest {
    /// Compares `reference` against the stored value.
    pub compare: Compare,
    /// Reference value.
    pub reference: u8,
    /// Applied when the stencil test fails.
    pub fail: StencilOp,
    /// Applied when the stencil test passes and the depth test fails.
    pub depth_fail: StencilOp,
    /// Applied when both tests pass.
    pub pass: StencilOp,
}

/// Per-fragment state: depth test, depth write mask, and optional stencil test.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RasterState {
    /// Compares a fragment's depth against the stored depth.
    pub depth_compare: Compare,
    /// Whether passing fragments write their depth.
    pub depth_write: bool,
    /// Stencil test, `None` when disabled.
    pub stencil: Option<StencilTest>,
}

impl RasterState {
    /// Depth test only, stencil disabled.
    pub const fn depth(compare: Compare, write: bool) -> Self {
        Self {
            depth_compare: compare,
            depth_write: write,
            stencil: None,
        }
    }

    /// Enable a stencil test.
    #[must_use]
    pub const fn with_stencil(mut self, stencil: StencilTest) -> Self {
        self.stencil = Some(stencil);
        self
    }
}

impl Default for RasterState {
    /// Ordinary z-buffering: `Less`, depth writes on, no stencil.
    fn default() -> Self {
        Self::depth(Compare::Less, true)
    }
}

bitflags::bitflags! {
    /// Buffers affected by [`RasterTarget::clear`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Buffers: u8 {
        /// The color buffer.
        const COLOR   = 0b0000_0001;
        /// The depth buffer.
        const DEPTH   = 0b0000_0010;
        /// The stencil buffer.
        const STENCIL = 0b0000_0100;
    }
}

/// Values written by [`RasterTarget::clear`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ClearValues {
    /// Color value.
    pub color: Rgb,
    /// Depth value.
    pub depth: f32,
    /// Stencil value.
    pub stencil: u8,
}

impl ClearValues {
    /// Black, far plane, zero stencil.
    pub const FAR: Self = Self {
        color: Rgb::BLACK,
        depth: 1.0,
        stencil: 0,
    };
    /// Black, near plane, zero stencil.
    pub const NEAR: Self = Self {
        color: Rgb::BLACK,
        depth: 0.0,
        stencil: 0,
    };
}

impl Default for ClearValues {
    fn default() -> Self {
        Self::FAR
    }
}

/// Which side of a primitive's boundary to rasterize.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Face {
    /// Faces pointing at the viewer (back faces culled).
    Front,
    /// Faces pointing away from the viewer (front faces culled).
    Back,
}

/// How a draw writes color.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Paint {
    /// Depth and stencil only.
    None,
    /// One flat color, used for picking.
    Flat(Rgb),
    /// The primitive's own lit material.
    Shaded,
}

/// A raster device with color, depth and stencil buffers.
///
/// This is the seam between the evaluator and a graphics API. Every operation
/// is restricted to the current viewport, and draws go through the current
/// [`RasterState`]: the stencil test runs first, then the depth test, then the
/// stencil update for the outcome, the depth write and the color write.
///
/// Whole-viewport images ([`read_depth`](Self::read_depth),
/// [`draw_depth`](Self::draw_depth), [`read_stencil`](Self::read_stencil)) are
/// sized to the viewport, with `(0, 0)` at its top-left corner.
pub trait RasterTarget<P> {
    /// Full target size in pixels.
    fn size(&self) -> Size;

    /// Current viewport in pixels, top-left origin.
    fn viewport(&self) -> Rect;

    /// Restrict rendering to `viewport`, clipped to the target.
    fn set_viewport(&mut self, viewport: Rect);

    /// Set the per-fragment state for subsequent draws.
    fn set_state(&mut self, state: RasterState);

    /// Overwrite `buffers` inside the viewport, ignoring the raster state.
    fn clear(&mut self, buffers: Buffers, values: ClearValues);

    /// Rasterize one side of a primitive's boundary.
    fn draw_primitive(&mut self, primitive: &P, face: Face, paint: Paint);

    /// Emit one fragment at depth `1.0` for every viewport pixel, through the raster state.
    fn fill_far_plane(&mut self);

    /// Copy the viewport's depth values into `into`, resizing it.
    fn read_depth(&mut self, into: &mut DepthImage);

    /// Emit one fragment per viewport pixel with the depth stored in `depth`,
    /// through the raster state. Color is not written.
    fn draw_depth(&mut self, depth: &DepthImage);

    /// Copy the viewport's stencil values into `into`, resizing it.
    fn read_stencil(&mut self, into: &mut StencilImage);

    /// Color at pixel `(x, y)` of the target; black outside it.
    fn read_color(&mut self, x: u32, y: u32) -> Rgb;

    /// Copy the viewport's colors into `into`, resizing it.
    fn read_color_image(&mut self, into: &mut ColorImage);

    /// Write `image` with its top-left corner at pixel `(x, y)` of the target,
    /// ignoring viewport and raster state.
    fn write_color(&mut self, x: u32, y: u32, image: &ColorImage);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_matches_operator() {
        assert!(Compare::Less.test(0.25_f32, 0.5));
        assert!(!Compare::Less.test(0.5_f32, 0.5));
        assert!(Compare::LessEqual.test(0.5_f32, 0.5));
        assert!(Compare::Greater.test(2_u8, 1));
        assert!(Compare::NotEqual.test(2_u8, 1));
        assert!(!Compare::Never.test(1_u8, 1));
        assert!(Compare::Always.test(0_u8, 9));
    }

    #[test]
    fn stencil_ops() {
        assert_eq!(StencilOp::Keep.apply(7, 1), 7);
        assert_eq!(StencilOp::Zero.apply(7, 1), 0);
        assert_eq!(StencilOp::Replace.apply(7, 1), 1);
        assert_eq!(StencilOp::IncrementClamp.apply(7, 1), 8);
        assert_eq!(StencilOp::IncrementClamp.apply(u8::MAX, 1), u8::MAX);
    }

    #[test]
    fn image_access_and_map() {
        let mut image = Image::new(3, 2, 0.5_f32);
        image.set(2, 1, 0.25);
        assert_eq!(image.get(2, 1), 0.25);
        assert_eq!(image.pixels().len(), 6);
        let gray = image.map(|d| Rgb::gray(1.0 - d));
        assert_eq!(gray.get(0, 0), Rgb::new(128, 128, 128));
        image.reset(1, 1, 1.0);
        assert_eq!(image.pixels(), &[1.0]);
    }

    #[test]
    fn color_scaling_saturates() {
        assert_eq!(Rgb::WHITE.scale(2.0), Rgb::WHITE);
        assert_eq!(Rgb::new(200, 100, 0).scale(0.5), Rgb::new(100, 50, 0));
        assert_eq!(Rgb::gray(0.0), Rgb::BLACK);
    }
}
