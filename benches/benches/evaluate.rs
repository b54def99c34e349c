// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use kurbo::{Point, Rect};
use understory_csg::{NodeId, Op, Tree, normalize};
use understory_scs::solids::{Ball, Cuboid, Solid};
use understory_scs::{Evaluator, RenderMode, Rgb, SoftwareTarget};

#[derive(Clone)]
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }
    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
    fn next_f64(&mut self) -> f64 {
        let v = self.next_u64() >> 11;
        (v as f64) / ((1u64 << 53) as f64)
    }
}

/// A plate with `holes` random drills through it.
fn gen_drilled_plate(holes: usize) -> (Tree<Solid>, NodeId) {
    let mut rng = Rng::new(0xC1A5_7E55_9999_ABCD);
    let mut tree = Tree::new();
    let mut root = tree.insert_primitive(Solid::from(Cuboid {
        name: "plate".into(),
        bounds: Rect::new(0.05, 0.05, 0.95, 0.95),
        near: 0.3,
        far: 0.6,
        color: Rgb::new(180, 180, 200),
    }));
    for i in 0..holes {
        let drill = tree.insert_primitive(Solid::from(Ball {
            name: format!("drill{i}"),
            center: Point::new(rng.next_f64(), rng.next_f64()),
            radius: 0.05 + 0.1 * rng.next_f64(),
            depth: 0.45,
            depth_radius: 0.25 + 0.01 * i as f32,
            color: Rgb::new(200, 80, 40),
        }));
        root = tree.join(Op::Difference, root, drill);
    }
    (tree, root)
}

/// A union of `count` random boxes, each intersected with a ball.
fn gen_rounded_boxes(count: usize) -> (Tree<Solid>, NodeId) {
    let mut rng = Rng::new(0xCAFE_F00D_DEAD_BEEF);
    let mut tree = Tree::new();
    let mut root = None;
    for i in 0..count {
        let (x, y) = (rng.next_f64() * 0.8, rng.next_f64() * 0.8);
        let near = 0.1 + 0.5 * rng.next_f64() as f32;
        let cube = tree.insert_primitive(Solid::from(Cuboid {
            name: format!("box{i}"),
            bounds: Rect::new(x, y, x + 0.2, y + 0.2),
            near,
            far: near + 0.2,
            color: Rgb::new(60, 160, 90),
        }));
        let ball = tree.insert_primitive(Solid::from(Ball {
            name: format!("round{i}"),
            center: Point::new(x + 0.1, y + 0.1),
            radius: 0.13,
            depth: near + 0.1,
            depth_radius: 0.13,
            color: Rgb::new(60, 90, 160),
        }));
        let rounded = tree.join(Op::Intersection, cube, ball);
        root = Some(match root {
            Some(previous) => tree.join(Op::Union, previous, rounded),
            None => rounded,
        });
    }
    (tree, root.expect("at least one box"))
}

fn bench_depth_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("depth_pass_64x64");
    for &holes in &[1_usize, 4, 8] {
        let (tree, root) = gen_drilled_plate(holes);
        let normal = normalize(&tree, root);
        let mut target = SoftwareTarget::new(64, 64);
        let mut evaluator = Evaluator::new();
        let steps = evaluator.prepare(&normal, &mut target, None).steps;
        group.throughput(Throughput::Elements(u64::from(steps)));
        group.bench_function(format!("drilled_plate_h{holes}"), |b| {
            b.iter(|| black_box(evaluator.prepare(&normal, &mut target, None).steps));
        });
    }
    for &count in &[4_usize, 16] {
        let (tree, root) = gen_rounded_boxes(count);
        let normal = normalize(&tree, root);
        let mut target = SoftwareTarget::new(64, 64);
        let mut evaluator = Evaluator::new();
        group.bench_function(format!("rounded_boxes_n{count}"), |b| {
            b.iter(|| black_box(evaluator.prepare(&normal, &mut target, None).steps));
        });
    }
    group.finish();
}

fn bench_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_64x64");
    let (tree, root) = gen_drilled_plate(4);
    let normal = normalize(&tree, root);
    for mode in [RenderMode::Csg, RenderMode::AllPrimitives, RenderMode::Split] {
        let mut target = SoftwareTarget::new(64, 64);
        let mut evaluator = Evaluator::new();
        evaluator.set_mode(mode);
        group.bench_function(format!("{mode:?}"), |b| {
            b.iter(|| black_box(evaluator.evaluate(&normal, &mut target, None).steps));
        });
    }
    let mut target = SoftwareTarget::new(64, 64);
    let mut evaluator = Evaluator::new();
    group.bench_function("pick", |b| {
        b.iter(|| black_box(evaluator.pick(&normal, &mut target, Point::new(32.0, 32.0), false)));
    });
    group.finish();
}

criterion_group!(benches, bench_depth_pass, bench_frame);
criterion_main!(benches);
