// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Picking colors and mapping a read-back color to a canonical leaf.
//!
//! During a pick pass every leaf of the canonical tree is filled with its own
//! flat color, taken from a per-channel counter: red advances by one bucket per
//! leaf, carrying into green and then blue when it wraps. Black is index `0`,
//! reserved for the background.

use understory_csg::{NodeId, NormalTree};

use crate::target::Rgb;

/// Quantization of the picking colors.
///
/// Each channel is split into `256 / step` buckets. Larger steps tolerate more
/// color error in the read-back at the cost of fewer distinguishable leaves;
/// a step of `1` gives exact ids.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PickPalette {
    step: u8,
}

impl Default for PickPalette {
    fn default() -> Self {
        Self {
            step: Self::DEFAULT_STEP,
        }
    }
}

impl PickPalette {
    /// Default bucket size: 16 buckets per channel, 4095 leaves.
    pub const DEFAULT_STEP: u8 = 16;

    /// Create a palette with the given bucket size.
    ///
    /// # Panics
    ///
    /// Panics unless `step` is a power of two no larger than 128.
    pub fn new(step: u8) -> Self {
        assert!(
            step.is_power_of_two() && step <= 128,
            "pick palette step must be a power of two in 1..=128, got {step}"
        );
        Self { step }
    }

    /// Bucket size.
    pub const fn step(self) -> u8 {
        self.step
    }

    /// Buckets per channel.
    pub const fn buckets(self) -> u32 {
        256 / self.step as u32
    }

    /// Number of leaves that get distinct colors. Leaves beyond this wrap around.
    pub const fn capacity(self) -> u32 {
        let b = self.buckets();
        b * b * b - 1
    }

    /// Color of the leaf with the given one-based index; `0` is black.
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Each channel value is a bucket below 256 / step, times step."
    )]
    pub const fn color(self, index: u32) -> Rgb {
        let b = self.buckets();
        let step = self.step as u32;
        let index = index % (b * b * b);
        Rgb::new(
            ((index % b) * step) as u8,
            ((index / b % b) * step) as u8,
            ((index / (b * b)) * step) as u8,
        )
    }

    /// Index of the nearest bucket color.
    pub const fn index(self, color: Rgb) -> u32 {
        let b = self.buckets();
        self.bucket(color.r) + self.bucket(color.g) * b + self.bucket(color.b) * b * b
    }

    const fn bucket(self, channel: u8) -> u32 {
        let step = self.step as u32;
        let bucket = (channel as u32 + step / 2) / step;
        // Values above the last bucket center round up past it.
        if bucket < self.buckets() {
            bucket
        } else {
            self.buckets() - 1
        }
    }

    /// The colors given to leaves in order, starting with index `1`.
    pub fn colors(self) -> PickColors {
        PickColors {
            step: self.step,
            next: self.color(1),
        }
    }
}

/// The incrementing color counter returned by [`PickPalette::colors`]. Never ends.
#[derive(Clone, Debug)]
pub struct PickColors {
    step: u8,
    next: Rgb,
}

impl Iterator for PickColors {
    type Item = Rgb;

    fn next(&mut self) -> Option<Rgb> {
        let current = self.next;
        let c = &mut self.next;
        c.r = c.r.wrapping_add(self.step);
        if c.r == 0 {
            c.g = c.g.wrapping_add(self.step);
            if c.g == 0 {
                c.b = c.b.wrapping_add(self.step);
            }
        }
        Some(current)
    }
}

/// The canonical leaf painted with pick color `index`, in in-order position.
///
/// Index `0` is the background and yields `None`, as does an index past the last leaf.
pub fn resolve<P>(tree: &NormalTree<P>, index: u32) -> Option<NodeId> {
    let position = usize::try_from(index.checked_sub(1)?).ok()?;
    tree.tree().leaves(tree.root()).nth(position)
}
