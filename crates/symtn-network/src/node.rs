//! Contraction-tree nodes.
//!
//! Nodes live in a flat arena indexed by `usize`. A leaf references a
//! tensor slot of its network; an internal node caches the merged labels,
//! the merged bonds, the block-sparse element count of the intermediate it
//! stands for, and the greedy score that selected it. Scores and swap lists
//! are recomputed from scratch at every construction, so no upward links
//! are kept.

use symtn_core::{blocked_elem_num, Bond};

pub(crate) type NodeId = usize;

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub left: Option<NodeId>,
    pub right: Option<NodeId>,
    /// Tensor slot for leaves, `None` for internal nodes.
    pub leaf: Option<usize>,
    pub labels: Vec<i32>,
    pub bonds: Vec<Bond>,
    /// Conserved elements of the tensor this node stands for.
    pub elem_num: u64,
    /// Greedy score at merge time (leaves score zero).
    pub point: i64,
}

impl Node {
    pub fn leaf(slot: usize, labels: Vec<i32>, bonds: Vec<Bond>) -> Self {
        let elem_num = blocked_elem_num(&bonds);
        Self {
            left: None,
            right: None,
            leaf: Some(slot),
            labels,
            bonds,
            elem_num,
            point: 0,
        }
    }

    pub fn shares_label(&self, other: &Node) -> bool {
        self.labels.iter().any(|l| other.labels.contains(l))
    }

    /// Labels and bonds of the contraction of `a` and `b`: the symmetric
    /// difference of the label sets, `a`'s free bonds first.
    pub fn merged(a: &Node, b: &Node) -> (Vec<i32>, Vec<Bond>) {
        let mut labels = Vec::new();
        let mut bonds = Vec::new();
        for (l, bond) in a.labels.iter().zip(&a.bonds) {
            if !b.labels.contains(l) {
                labels.push(*l);
                bonds.push(bond.clone());
            }
        }
        for (l, bond) in b.labels.iter().zip(&b.bonds) {
            if !a.labels.contains(l) {
                labels.push(*l);
                bonds.push(bond.clone());
            }
        }
        (labels, bonds)
    }

    /// Greedy score for merging `a` and `b`: the extra intermediate storage
    /// `elem(merged) - max(elem(a), elem(b))`, lower is better. Also returns
    /// the merged element count for tie breaking and node construction.
    pub fn metric(a: &Node, b: &Node) -> (i64, u64) {
        let (_, bonds) = Node::merged(a, b);
        let merged = blocked_elem_num(&bonds);
        let point = merged as i64 - a.elem_num.max(b.elem_num) as i64;
        (point, merged)
    }
}
