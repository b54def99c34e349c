// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! CSG normalization.
//!
//! Build a tree, print its postfix form, normalize it, and map canonical leaves
//! back to the edited tree. Then delete a leaf and read the result back from text.
//!
//! Run:
//! - `cargo run -p understory_demos --example csg_normalize`

use understory_csg::{Op, Tree, normalize, parse_postfix};

fn main() {
    // (bracket ∪ boss) − (bolt ∩ washer)
    let mut tree = Tree::new();
    let bracket = tree.insert_primitive("bracket");
    let boss = tree.insert_primitive("boss");
    let bolt = tree.insert_primitive("bolt");
    let washer = tree.insert_primitive("washer");
    let body = tree.join(Op::Union, bracket, boss);
    let cut = tree.join(Op::Intersection, bolt, washer);
    let root = tree.join(Op::Difference, body, cut);

    println!("edited:    {}", tree.postfix(root));
    println!("normal:    {}", tree.is_normal(root));

    let normal = normalize(&tree, root);
    println!("canonical: {}", normal.tree().postfix(normal.root()));
    assert!(normal.tree().is_normal(normal.root()));

    // Each canonical leaf is a copy of one edited leaf.
    for leaf in normal.tree().leaves(normal.root()) {
        let origin = normal.origin(leaf).expect("canonical leaves have origins");
        println!(
            "  {:?} <- {:?} ({})",
            leaf,
            origin,
            tree.primitive(origin).expect("origin is a leaf")
        );
    }

    // Deleting the washer leaves `(bracket ∪ boss) − bolt`.
    let root = tree
        .delete_primitive(root, washer)
        .expect("the tree had more than one leaf");
    let text = tree.postfix(root).to_string();
    println!("after delete: {text}");

    // The text form reads back into a fresh arena.
    let mut parsed: Tree<String> = Tree::new();
    let parsed_root = parse_postfix(&mut parsed, &text, |tokens| {
        Ok::<_, core::convert::Infallible>(tokens.join(" "))
    })
    .expect("well-formed postfix");
    assert_eq!(parsed.postfix(parsed_root).to_string(), text);

    // Malformed input is rejected without leaking nodes.
    let err = parse_postfix(&mut parsed, "[ a ] [ b ] + -", |tokens| {
        Ok::<_, core::convert::Infallible>(tokens.join(" "))
    })
    .unwrap_err();
    println!("rejected: {err}");
    assert_eq!(parsed.len(), parsed.subtree_len(parsed_root));
}
