// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reading the reverse-Polish text form written by [`Tree::postfix`].

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::tree::Tree;
use crate::types::{NodeId, Op};

/// Errors from [`parse_postfix`].
///
/// Positions are zero-based token indices into the whitespace-split input.
#[derive(Debug, thiserror::Error)]
pub enum ParseError<E> {
    /// An operator found fewer than two operands on the stack.
    #[error("operator `{}` at token {position} is missing an operand", op.symbol())]
    MissingOperand {
        /// The operator.
        op: Op,
        /// Token index of the operator.
        position: usize,
    },
    /// A `[` without a matching `]`.
    #[error("leaf opened at token {position} is never closed")]
    UnterminatedLeaf {
        /// Token index of the opening bracket.
        position: usize,
    },
    /// A token that is neither an operator nor the start of a leaf.
    #[error("unexpected token `{token}` at token {position}")]
    UnexpectedToken {
        /// The offending token.
        token: String,
        /// Its index.
        position: usize,
    },
    /// The leaf parser rejected the contents of a leaf.
    #[error("invalid leaf at token {position}")]
    Leaf {
        /// Token index of the opening bracket.
        position: usize,
        /// What the leaf parser reported.
        #[source]
        source: E,
    },
    /// The input did not reduce to exactly one tree.
    #[error("input reduces to {depth} trees, expected exactly one")]
    StackDepth {
        /// Number of subtrees left on the stack.
        depth: usize,
    },
}

/// Parse a tree from its postfix text form into `tree`, returning the new root.
///
/// Tokens are separated by whitespace. `[` starts a leaf whose tokens, up to the
/// next `]`, are handed to `leaf`; `+`, `*` and `-` combine the two most recent
/// subtrees as union, intersection and difference, the older one on the left.
///
/// On error nothing is left behind in `tree`.
///
/// ```
/// use understory_csg::{Tree, parse_postfix};
///
/// let mut tree = Tree::new();
/// let root = parse_postfix(&mut tree, "[ a ] [ b ] + [ c ] -", |tokens| {
///     Ok::<_, core::convert::Infallible>(tokens.join(" "))
/// })
/// .unwrap();
/// assert_eq!(tree.postfix(root).to_string(), "[ a ] [ b ] + [ c ] -");
/// ```
pub fn parse_postfix<P, E>(
    tree: &mut Tree<P>,
    text: &str,
    mut leaf: impl FnMut(&[&str]) -> Result<P, E>,
) -> Result<NodeId, ParseError<E>> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut stack: Vec<NodeId> = Vec::new();
    match parse_tokens(tree, &tokens, &mut leaf, &mut stack) {
        Ok(root) => Ok(root),
        Err(err) => {
            for id in stack {
                tree.remove(id);
            }
            tracing::warn!(error = %err, "rejected postfix CSG text");
            Err(err)
        }
    }
}

fn parse_tokens<P, E>(
    tree: &mut Tree<P>,
    tokens: &[&str],
    leaf: &mut impl FnMut(&[&str]) -> Result<P, E>,
    stack: &mut Vec<NodeId>,
) -> Result<NodeId, ParseError<E>> {
    let mut position = 0;
    while position < tokens.len() {
        let token = tokens[position];
        if token == "[" {
            let len = tokens[position + 1..]
                .iter()
                .position(|t| *t == "]")
                .ok_or(ParseError::UnterminatedLeaf { position })?;
            let inner = &tokens[position + 1..position + 1 + len];
            let primitive = leaf(inner).map_err(|source| ParseError::Leaf { position, source })?;
            stack.push(tree.insert_primitive(primitive));
            position += len + 2;
            continue;
        }
        let Some(op) = Op::from_symbol(token) else {
            return Err(ParseError::UnexpectedToken {
                token: token.to_string(),
                position,
            });
        };
        if stack.len() < 2 {
            return Err(ParseError::MissingOperand { op, position });
        }
        let right = stack.pop().expect("checked depth");
        let left = stack.pop().expect("checked depth");
        stack.push(tree.join(op, left, right));
        position += 1;
    }
    match stack.as_slice() {
        [root] => Ok(*root),
        _ => Err(ParseError::StackDepth { depth: stack.len() }),
    }
}
