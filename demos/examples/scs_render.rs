// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Image-space CSG on the CPU target.
//!
//! Renders a drilled plate in each mode as text, picks a few points,
//! and steps through the depth pass with a growing step budget.
//!
//! Run:
//! - `cargo run -p understory_demos --example scs_render`

use kurbo::{Point, Rect};
use understory_csg::{Op, Tree, normalize};
use understory_scs::solids::{Ball, Cuboid, Solid};
use understory_scs::{DepthImage, Evaluator, Progress, RenderMode, Rgb, SoftwareTarget};

const W: u32 = 32;
const H: u32 = 16;

fn depth_art(depth: &DepthImage) -> String {
    const RAMP: &[u8] = b"@%#*+=-:. ";
    let mut out = String::new();
    for y in 0..depth.height() {
        for x in 0..depth.width() {
            let d = depth.get(x, y).clamp(0.0, 1.0);
            let i = ((d * (RAMP.len() - 1) as f32).round() as usize).min(RAMP.len() - 1);
            out.push(RAMP[i] as char);
        }
        out.push('\n');
    }
    out
}

fn main() {
    let mut tree = Tree::new();
    let plate = tree.insert_primitive(Solid::from(Cuboid {
        name: "plate".into(),
        bounds: Rect::new(0.1, 0.1, 0.9, 0.9),
        near: 0.3,
        far: 0.7,
        color: Rgb::new(180, 180, 200),
    }));
    // Through the plate.
    let drill = tree.insert_primitive(Solid::from(Ball {
        name: "drill".into(),
        center: Point::new(0.3, 0.5),
        radius: 0.2,
        depth: 0.5,
        depth_radius: 0.35,
        color: Rgb::new(200, 80, 40),
    }));
    // A shallow pocket.
    let pocket = tree.insert_primitive(Solid::from(Cuboid {
        name: "pocket".into(),
        bounds: Rect::new(0.55, 0.3, 0.8, 0.7),
        near: 0.1,
        far: 0.45,
        color: Rgb::new(40, 160, 90),
    }));
    let drilled = tree.join(Op::Difference, plate, drill);
    let root = tree.join(Op::Difference, drilled, pocket);
    println!("{}", tree.postfix(root));

    let normal = normalize(&tree, root);
    let mut evaluator = Evaluator::new();

    for mode in [RenderMode::Csg, RenderMode::AllPrimitives] {
        let mut target = SoftwareTarget::new(W, H);
        evaluator.set_mode(mode);
        let evaluation = evaluator.evaluate(&normal, &mut target, None);
        println!("{mode:?}: {evaluation:?}");
        print!("{}", depth_art(target.depth()));
    }

    evaluator.set_mode(RenderMode::Csg);
    let mut target = SoftwareTarget::new(W, H);
    for (label, point, hidden) in [
        ("plate top", Point::new(2.5, 2.5), false),
        ("drill hole", Point::new(9.5, 8.5), false),
        ("under the hole", Point::new(9.5, 8.5), true),
        ("pocket floor", Point::new(21.5, 8.5), false),
    ] {
        let picked = evaluator
            .pick(&normal, &mut target, point, hidden)
            .and_then(|leaf| normal.origin(leaf))
            .and_then(|origin| tree.primitive(origin))
            .map(Solid::name);
        println!("pick {label}: {picked:?}");
    }

    // Step through the depth pass.
    for budget in 0.. {
        let mut target = SoftwareTarget::new(W, H);
        evaluator.set_step_budget(Some(budget));
        let evaluation = evaluator.prepare(&normal, &mut target, None);
        println!("budget {budget}: {:?} after {} steps", evaluation.progress, evaluation.steps);
        if evaluation.progress == Progress::Complete {
            break;
        }
    }
    evaluator.set_step_budget(None);
}
