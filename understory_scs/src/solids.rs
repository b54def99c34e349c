// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Simple convex solids for [`SoftwareTarget`](crate::SoftwareTarget).
//!
//! Solids live in normalized viewport space under an orthographic view: `x` and `y`
//! in `[0, 1]` with the origin at the top left, depth in `[0, 1]` with `0` nearest.
//! Their [`Display`](core::fmt::Display) form is the token list used inside `[ ... ]`
//! by the postfix text form, and [`Solid::parse`] reads it back.

use core::fmt;
use core::str::FromStr;

use kurbo::{Point, Rect};

use crate::software::{Coverage, Span};
use crate::target::Rgb;

/// A box aligned with the view axes.
#[derive(Clone, Debug, PartialEq)]
pub struct Cuboid {
    /// Name shown in the text form.
    pub name: String,
    /// Screen-space footprint.
    pub bounds: Rect,
    /// Depth of the front face.
    pub near: f32,
    /// Depth of the back face.
    pub far: f32,
    /// Material color.
    pub color: Rgb,
}

/// An ellipsoid with a circular footprint.
#[derive(Clone, Debug, PartialEq)]
pub struct Ball {
    /// Name shown in the text form.
    pub name: String,
    /// Center of the footprint.
    pub center: Point,
    /// Radius of the footprint.
    pub radius: f64,
    /// Depth of the center.
    pub depth: f32,
    /// Half the thickness through the center.
    pub depth_radius: f32,
    /// Material color.
    pub color: Rgb,
}

/// Any of the built-in solids.
#[derive(Clone, Debug, PartialEq)]
pub enum Solid {
    /// A box.
    Cuboid(Cuboid),
    /// An ellipsoid.
    Ball(Ball),
}

impl Solid {
    /// Name shown in the text form.
    pub fn name(&self) -> &str {
        match self {
            Self::Cuboid(c) => &c.name,
            Self::Ball(b) => &b.name,
        }
    }

    /// Parse the tokens of one postfix leaf, as written by `Display`.
    pub fn parse(tokens: &[&str]) -> Result<Self, SolidError> {
        let (&kind, rest) = tokens.split_first().ok_or(SolidError::Empty)?;
        match kind {
            "cuboid" => {
                let [name, x0, y0, x1, y1, near, far, r, g, b] = fields(kind, rest)?;
                Ok(Self::Cuboid(Cuboid {
                    name: name.to_string(),
                    bounds: Rect::new(number(x0)?, number(y0)?, number(x1)?, number(y1)?),
                    near: number(near)?,
                    far: number(far)?,
                    color: Rgb::new(number(r)?, number(g)?, number(b)?),
                }))
            }
            "ball" => {
                let [name, cx, cy, radius, depth, depth_radius, r, g, b] = fields(kind, rest)?;
                Ok(Self::Ball(Ball {
                    name: name.to_string(),
                    center: Point::new(number(cx)?, number(cy)?),
                    radius: number(radius)?,
                    depth: number(depth)?,
                    depth_radius: number(depth_radius)?,
                    color: Rgb::new(number(r)?, number(g)?, number(b)?),
                }))
            }
            other => Err(SolidError::UnknownKind(other.to_string())),
        }
    }
}

fn fields<'a, const N: usize>(kind: &str, rest: &[&'a str]) -> Result<[&'a str; N], SolidError> {
    <[&str; N]>::try_from(rest).map_err(|_| SolidError::FieldCount {
        kind: kind.to_string(),
        expected: N,
        found: rest.len(),
    })
}

fn number<T: FromStr>(token: &str) -> Result<T, SolidError> {
    token
        .parse()
        .map_err(|_| SolidError::Number(token.to_string()))
}

/// Errors from [`Solid::parse`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SolidError {
    /// The leaf has no tokens.
    #[error("empty solid description")]
    Empty,
    /// The first token names no known solid.
    #[error("unknown solid kind `{0}`")]
    UnknownKind(String),
    /// Wrong number of fields after the kind.
    #[error("`{kind}` takes {expected} fields, found {found}")]
    FieldCount {
        /// The solid kind.
        kind: String,
        /// Fields the kind takes.
        expected: usize,
        /// Fields present.
        found: usize,
    },
    /// A field is not a valid number.
    #[error("invalid number `{0}`")]
    Number(String),
}

impl Coverage for Cuboid {
    fn span(&self, at: Point) -> Option<Span> {
        self.bounds.contains(at).then_some(Span {
            near: self.near,
            far: self.far,
        })
    }

    fn color(&self) -> Rgb {
        self.color
    }
}

impl Coverage for Ball {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Depths are stored as f32; the footprint test runs in f64."
    )]
    fn span(&self, at: Point) -> Option<Span> {
        let d2 = (at - self.center).hypot2() / (self.radius * self.radius);
        if d2 >= 1.0 {
            return None;
        }
        let half = (1.0 - d2).sqrt() as f32 * self.depth_radius;
        Some(Span {
            near: self.depth - half,
            far: self.depth + half,
        })
    }

    fn color(&self) -> Rgb {
        self.color
    }
}

impl Coverage for Solid {
    fn span(&self, at: Point) -> Option<Span> {
        match self {
            Self::Cuboid(c) => c.span(at),
            Self::Ball(b) => b.span(at),
        }
    }

    fn color(&self) -> Rgb {
        match self {
            Self::Cuboid(c) => c.color,
            Self::Ball(b) => b.color,
        }
    }
}

impl fmt::Display for Solid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cuboid(c) => write!(
                f,
                "cuboid {} {} {} {} {} {} {} {} {} {}",
                c.name,
                c.bounds.x0,
                c.bounds.y0,
                c.bounds.x1,
                c.bounds.y1,
                c.near,
                c.far,
                c.color.r,
                c.color.g,
                c.color.b
            ),
            Self::Ball(b) => write!(
                f,
                "ball {} {} {} {} {} {} {} {} {}",
                b.name,
                b.center.x,
                b.center.y,
                b.radius,
                b.depth,
                b.depth_radius,
                b.color.r,
                b.color.g,
                b.color.b
            ),
        }
    }
}

impl From<Cuboid> for Solid {
    fn from(c: Cuboid) -> Self {
        Self::Cuboid(c)
    }
}

impl From<Ball> for Solid {
    fn from(b: Ball) -> Self {
        Self::Ball(b)
    }
}
