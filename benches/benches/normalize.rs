// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use understory_csg::{NodeId, Op, Tree, normalize, parse_postfix};

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
    fn below(&mut self, n: u64) -> u64 {
        self.next_u64() % n
    }
}

/// Random tree over `leaves` primitives, built by joining random pairs of roots.
fn gen_random_tree(leaves: u32, ops: &[Op], seed: u64) -> (Tree<u32>, NodeId) {
    let mut rng = Rng::new(seed);
    let mut tree = Tree::new();
    let mut roots: Vec<NodeId> = (0..leaves).map(|i| tree.insert_primitive(i)).collect();
    while roots.len() > 1 {
        let i = rng.below(roots.len() as u64) as usize;
        let left = roots.swap_remove(i);
        let j = rng.below(roots.len() as u64) as usize;
        let right = roots.swap_remove(j);
        let op = ops[rng.below(ops.len() as u64) as usize];
        roots.push(tree.join(op, left, right));
    }
    (tree, roots[0])
}

/// `((p0 − p1) − p2) ... ∩ ...`: already canonical, measures the copy and the shape checks.
fn gen_product_chain(leaves: u32) -> (Tree<u32>, NodeId) {
    let mut tree = Tree::new();
    let mut root = tree.insert_primitive(0);
    for i in 1..leaves {
        let leaf = tree.insert_primitive(i);
        let op = if i < leaves / 2 {
            Op::Intersection
        } else {
            Op::Difference
        };
        root = tree.join(op, root, leaf);
    }
    (tree, root)
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    for &n in &[8_u32, 16, 32] {
        let (tree, root) = gen_random_tree(n, &[Op::Union, Op::Difference], 0xCAFE_F00D_DEAD_BEEF);
        group.throughput(Throughput::Elements(u64::from(n)));
        group.bench_function(format!("union_difference_n{n}"), |b| {
            b.iter(|| black_box(normalize(&tree, root).leaf_count()));
        });
    }
    // Intersections of unions distribute multiplicatively; keep these small.
    for &n in &[6_u32, 10] {
        let (tree, root) = gen_random_tree(
            n,
            &[Op::Union, Op::Intersection, Op::Difference],
            0xBADC_F00D_1234_5678,
        );
        group.bench_function(format!("mixed_n{n}"), |b| {
            b.iter(|| black_box(normalize(&tree, root).leaf_count()));
        });
    }
    for &n in &[64_u32, 256] {
        let (tree, root) = gen_product_chain(n);
        group.throughput(Throughput::Elements(u64::from(n)));
        group.bench_function(format!("canonical_chain_n{n}"), |b| {
            b.iter(|| black_box(normalize(&tree, root).leaf_count()));
        });
    }
    group.finish();
}

fn bench_postfix(c: &mut Criterion) {
    let mut group = c.benchmark_group("postfix");
    let (tree, root) = gen_random_tree(
        256,
        &[Op::Union, Op::Intersection, Op::Difference],
        0xFACE_FEED_CAFE_BABE,
    );
    let text = tree.postfix(root).to_string();
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("write_n256", |b| {
        b.iter(|| black_box(tree.postfix(root).to_string().len()));
    });
    group.bench_function("parse_n256", |b| {
        b.iter_batched(
            Tree::<u32>::new,
            |mut parsed| {
                let root = parse_postfix(&mut parsed, &text, |tokens| tokens[0].parse::<u32>());
                black_box(root.is_ok());
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_normalize, bench_postfix);
criterion_main!(benches);
