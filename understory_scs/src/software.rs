// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A CPU raster target with exact depth/stencil semantics.
//!
//! Primitives describe themselves through [`Coverage`]: for the ray through a
//! pixel center they report the depth interval they occupy. Convex primitives
//! have at most one such interval, whose near end is the front face and whose
//! far end is the back face.

use kurbo::{Point, Rect, Size};

use crate::target::{
    Buffers, ClearValues, ColorImage, DepthImage, Face, Image, Paint, RasterState, RasterTarget,
    Rgb, StencilImage,
};

/// Depth interval covered by a primitive along one view ray.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Span {
    /// Depth of the front face.
    pub near: f32,
    /// Depth of the back face.
    pub far: f32,
}

impl Span {
    /// Depth of the given face.
    pub fn depth(self, face: Face) -> f32 {
        match face {
            Face::Front => self.near,
            Face::Back => self.far,
        }
    }
}

/// A convex primitive that can be rasterized by [`SoftwareTarget`].
pub trait Coverage {
    /// The depth interval along the ray through `at`, in normalized viewport
    /// coordinates (`[0, 1]²`, top-left origin). `None` where the primitive is absent.
    fn span(&self, at: Point) -> Option<Span>;

    /// Material color used for shaded draws.
    fn color(&self) -> Rgb;
}

/// Color, depth and stencil buffers in memory.
///
/// Pixel `(x, y)` of the viewport samples its primitives at the pixel center,
/// mapped into the viewport's normalized coordinates.
#[derive(Clone)]
pub struct SoftwareTarget {
    color: ColorImage,
    depth: DepthImage,
    stencil: StencilImage,
    viewport: Rect,
    state: RasterState,
    operations: u64,
}

impl core::fmt::Debug for SoftwareTarget {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SoftwareTarget")
            .field("width", &self.color.width())
            .field("height", &self.color.height())
            .field("viewport", &self.viewport)
            .field("state", &self.state)
            .field("operations", &self.operations)
            .finish_non_exhaustive()
    }
}

/// Integer pixel bounds of a viewport.
#[derive(Copy, Clone)]
struct PixelRect {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl PixelRect {
    fn width(self) -> u32 {
        self.x1 - self.x0
    }

    fn height(self) -> u32 {
        self.y1 - self.y0
    }

    /// Normalized viewport coordinates of the center of pixel `(x, y)`.
    fn sample(self, x: u32, y: u32) -> Point {
        Point::new(
            (f64::from(x - self.x0) + 0.5) / f64::from(self.width()),
            (f64::from(y - self.y0) + 0.5) / f64::from(self.height()),
        )
    }

    fn pixels(self) -> impl Iterator<Item = (u32, u32)> {
        (self.y0..self.y1).flat_map(move |y| (self.x0..self.x1).map(move |x| (x, y)))
    }
}

impl SoftwareTarget {
    /// A `width × height` target: black, depth `1.0`, stencil `0`, full viewport.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            color: Image::new(width, height, Rgb::BLACK),
            depth: Image::new(width, height, 1.0),
            stencil: Image::new(width, height, 0),
            viewport: Rect::new(0.0, 0.0, f64::from(width), f64::from(height)),
            state: RasterState::default(),
            operations: 0,
        }
    }

    /// Number of buffer operations performed so far: clears, primitive draws,
    /// far-plane fills, depth reads and depth draws.
    pub fn operations(&self) -> u64 {
        self.operations
    }

    /// The whole color buffer.
    pub fn color(&self) -> &ColorImage {
        &self.color
    }

    /// The whole depth buffer.
    pub fn depth(&self) -> &DepthImage {
        &self.depth
    }

    /// The whole stencil buffer.
    pub fn stencil(&self) -> &StencilImage {
        &self.stencil
    }

    /// The current raster state.
    pub fn state(&self) -> RasterState {
        self.state
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "The viewport is rounded and clipped to the target before conversion."
    )]
    fn pixel_viewport(&self) -> PixelRect {
        let v = self.viewport;
        PixelRect {
            x0: v.x0 as u32,
            y0: v.y0 as u32,
            x1: v.x1 as u32,
            y1: v.y1 as u32,
        }
    }

    fn full_rect(&self) -> Rect {
        Rect::new(
            0.0,
            0.0,
            f64::from(self.color.width()),
            f64::from(self.color.height()),
        )
    }

    /// Run one fragment through the stencil and depth tests and apply the writes.
    fn fragment(&mut self, x: u32, y: u32, depth: f32, color: Option<Rgb>) {
        let state = self.state;
        let stored_depth = self.depth.get(x, y);
        let depth_pass = state.depth_compare.test(depth, stored_depth);
        if let Some(stencil) = state.stencil {
            let stored = self.stencil.get(x, y);
            let stencil_pass = stencil.compare.test(stencil.reference, stored);
            let op = if !stencil_pass {
                stencil.fail
            } else if !depth_pass {
                stencil.depth_fail
            } else {
                stencil.pass
            };
            self.stencil.set(x, y, op.apply(stored, stencil.reference));
            if !stencil_pass {
                return;
            }
        }
        if !depth_pass {
            return;
        }
        if state.depth_write {
            self.depth.set(x, y, depth);
        }
        if let Some(color) = color {
            self.color.set(x, y, color);
        }
    }
}

/// Lit color of a fragment: nearer is brighter, back faces are darker.
fn shade(color: Rgb, depth: f32, face: Face) -> Rgb {
    let cue = 1.0 - 0.5 * depth;
    let side = match face {
        Face::Front => 1.0,
        Face::Back => 0.6,
    };
    color.scale(cue * side)
}

impl<P: Coverage> RasterTarget<P> for SoftwareTarget {
    fn size(&self) -> Size {
        self.full_rect().size()
    }

    fn viewport(&self) -> Rect {
        self.viewport
    }

    fn set_viewport(&mut self, viewport: Rect) {
        let clipped = viewport.round().intersect(self.full_rect());
        self.viewport = if clipped.is_zero_area() {
            Rect::ZERO
        } else {
            clipped
        };
    }

    fn set_state(&mut self, state: RasterState) {
        self.state = state;
    }

    fn clear(&mut self, buffers: Buffers, values: ClearValues) {
        self.operations += 1;
        for (x, y) in self.pixel_viewport().pixels() {
            if buffers.contains(Buffers::COLOR) {
                self.color.set(x, y, values.color);
            }
            if buffers.contains(Buffers::DEPTH) {
                self.depth.set(x, y, values.depth);
            }
            if buffers.contains(Buffers::STENCIL) {
                self.stencil.set(x, y, values.stencil);
            }
        }
    }

    fn draw_primitive(&mut self, primitive: &P, face: Face, paint: Paint) {
        self.operations += 1;
        let vp = self.pixel_viewport();
        for (x, y) in vp.pixels() {
            let Some(span) = primitive.span(vp.sample(x, y)) else {
                continue;
            };
            let depth = span.depth(face);
            let color = match paint {
                Paint::None => None,
                Paint::Flat(color) => Some(color),
                Paint::Shaded => Some(shade(primitive.color(), depth, face)),
            };
            self.fragment(x, y, depth, color);
        }
    }

    fn fill_far_plane(&mut self) {
        self.operations += 1;
        for (x, y) in self.pixel_viewport().pixels() {
            self.fragment(x, y, 1.0, None);
        }
    }

    fn read_depth(&mut self, into: &mut DepthImage) {
        self.operations += 1;
        let vp = self.pixel_viewport();
        into.reset(vp.width(), vp.height(), 1.0);
        for (x, y) in vp.pixels() {
            into.set(x - vp.x0, y - vp.y0, self.depth.get(x, y));
        }
    }

    fn draw_depth(&mut self, depth: &DepthImage) {
        self.operations += 1;
        let vp = self.pixel_viewport();
        for (x, y) in vp.pixels() {
            let (ix, iy) = (x - vp.x0, y - vp.y0);
            if ix < depth.width() && iy < depth.height() {
                self.fragment(x, y, depth.get(ix, iy), None);
            }
        }
    }

    fn read_stencil(&mut self, into: &mut StencilImage) {
        let vp = self.pixel_viewport();
        into.reset(vp.width(), vp.height(), 0);
        for (x, y) in vp.pixels() {
            into.set(x - vp.x0, y - vp.y0, self.stencil.get(x, y));
        }
    }

    fn read_color(&mut self, x: u32, y: u32) -> Rgb {
        if x < self.color.width() && y < self.color.height() {
            self.color.get(x, y)
        } else {
            Rgb::BLACK
        }
    }

    fn read_color_image(&mut self, into: &mut ColorImage) {
        let vp = self.pixel_viewport();
        into.reset(vp.width(), vp.height(), Rgb::BLACK);
        for (x, y) in vp.pixels() {
            into.set(x - vp.x0, y - vp.y0, self.color.get(x, y));
        }
    }

    fn write_color(&mut self, x: u32, y: u32, image: &ColorImage) {
        let w = image.width().min(self.color.width().saturating_sub(x));
        let h = image.height().min(self.color.height().saturating_sub(y));
        for iy in 0..h {
            for ix in 0..w {
                self.color.set(x + ix, y + iy, image.get(ix, iy));
            }
        }
    }
}
