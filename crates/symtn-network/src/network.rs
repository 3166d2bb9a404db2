//! Tensor network contraction: greedy planning and postorder execution.
//!
//! A network is a list of named tensor slots with integer label patterns.
//! Labels shared by two slots are contracted; labels appearing once are
//! external and may be ordered by a distinguished `TOUT` entry. The
//! contraction tree is built greedily (smallest extra intermediate first),
//! cached, and reused across launches; per-leaf fermionic swap lists are
//! regenerated from scratch at every construction.

use std::fmt;
use std::path::Path;

use symtn_core::{contract, Scalar, Swap, SymTensor};

use crate::error::{NetworkError, Result};
use crate::node::{Node, NodeId};
use crate::parser::{parse_network, NetLine};

#[derive(Debug, Clone)]
struct Tout {
    labels: Vec<i32>,
    in_count: usize,
}

/// A contractible network of symmetric tensors.
pub struct Network<T: Scalar> {
    names: Vec<String>,
    patterns: Vec<Vec<i32>>,
    in_counts: Vec<usize>,
    tout: Option<Tout>,
    tensors: Vec<Option<SymTensor<T>>>,
    nodes: Vec<Node>,
    root: Option<NodeId>,
    swaps: Vec<Vec<Swap>>,
}

impl<T: Scalar> Network<T> {
    /// Build a network from `(name, labels, in_count)` entries. An entry
    /// named `TOUT` defines the output label order and IN split.
    pub fn from_parts<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Vec<i32>, usize)>,
    {
        let lines = entries
            .into_iter()
            .map(|(name, labels, in_count)| NetLine {
                name,
                labels,
                in_count,
            })
            .collect();
        Self::from_lines(lines)
    }

    /// Read a network spec file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_lines(parse_network(&text)?)
    }

    fn from_lines(lines: Vec<NetLine>) -> Result<Self> {
        let mut names = Vec::new();
        let mut patterns = Vec::new();
        let mut in_counts = Vec::new();
        let mut tout = None;
        for line in lines {
            if line.name == "TOUT" {
                if tout.is_some() {
                    return Err(NetworkError::InvalidNetwork(
                        "more than one TOUT entry".into(),
                    ));
                }
                tout = Some(Tout {
                    labels: line.labels,
                    in_count: line.in_count,
                });
            } else {
                if names.contains(&line.name) {
                    return Err(NetworkError::InvalidNetwork(format!(
                        "duplicate tensor name '{}'",
                        line.name
                    )));
                }
                names.push(line.name);
                patterns.push(line.labels);
                in_counts.push(line.in_count);
            }
        }
        if names.is_empty() {
            return Err(NetworkError::InvalidNetwork("no tensor entries".into()));
        }

        let net = Self {
            tensors: vec![None; names.len()],
            swaps: vec![Vec::new(); names.len()],
            names,
            patterns,
            in_counts,
            tout,
            nodes: Vec::new(),
            root: None,
        };
        net.validate()?;
        Ok(net)
    }

    /// Every label must occur exactly twice among the patterns, or once plus
    /// once in TOUT.
    fn validate(&self) -> Result<()> {
        let mut counts: std::collections::BTreeMap<i32, usize> = std::collections::BTreeMap::new();
        for (name, pattern) in self.names.iter().zip(&self.patterns) {
            for (i, l) in pattern.iter().enumerate() {
                if pattern[i + 1..].contains(l) {
                    return Err(NetworkError::InvalidNetwork(format!(
                        "label {l} repeated within tensor '{name}'"
                    )));
                }
                *counts.entry(*l).or_insert(0) += 1;
            }
        }
        let mut external: Vec<i32> = counts
            .iter()
            .filter(|&(_, &c)| c == 1)
            .map(|(&l, _)| l)
            .collect();
        if let Some((&l, &c)) = counts.iter().find(|&(_, &c)| c > 2) {
            return Err(NetworkError::InvalidNetwork(format!(
                "label {l} appears {c} times"
            )));
        }
        if let Some(tout) = &self.tout {
            let mut tout_labels = tout.labels.clone();
            tout_labels.sort_unstable();
            external.sort_unstable();
            if tout_labels != external {
                return Err(NetworkError::InvalidNetwork(format!(
                    "TOUT labels {tout_labels:?} do not match the external labels {external:?}"
                )));
            }
        }
        Ok(())
    }

    pub fn tensor_num(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Bind a tensor to leaf `idx`, assigning the leaf's label pattern.
    ///
    /// Unless `force` is set, a rebind must present the same bond signature
    /// (directions and state lists, labels ignored) as the bound tensor;
    /// `force` rebinding with a new signature discards the cached tree.
    pub fn replace_with(&mut self, idx: usize, tensor: &SymTensor<T>, force: bool) -> Result<()> {
        if idx >= self.tensors.len() {
            return Err(NetworkError::InvalidNetwork(format!(
                "tensor index {idx} out of range"
            )));
        }
        let pattern = &self.patterns[idx];
        if tensor.bond_num() != pattern.len() {
            return Err(NetworkError::ShapeMismatch(self.names[idx].clone()));
        }
        if !force && tensor.in_bond_num() != self.in_counts[idx] {
            return Err(NetworkError::ShapeMismatch(self.names[idx].clone()));
        }
        if let Some(prev) = &self.tensors[idx] {
            if prev.bonds() != tensor.bonds() {
                if !force {
                    return Err(NetworkError::ShapeMismatch(self.names[idx].clone()));
                }
                self.destruct();
            }
        }
        let mut bound = tensor.clone();
        bound.set_label(&self.patterns[idx])?;
        self.tensors[idx] = Some(bound);
        Ok(())
    }

    /// Bind a tensor by its entry name.
    pub fn put_tensor(&mut self, name: &str, tensor: &SymTensor<T>, force: bool) -> Result<()> {
        let idx = self
            .names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| NetworkError::InvalidNetwork(format!("unknown tensor '{name}'")))?;
        self.replace_with(idx, tensor, force)
    }

    /// Contract the network and return the result, named `name`.
    ///
    /// The contraction tree is built on the first launch and reused while
    /// the leaf signatures stay unchanged. With a `TOUT` entry the result is
    /// permuted to its label order and IN split.
    pub fn launch(&mut self, name: &str) -> Result<SymTensor<T>> {
        for (i, t) in self.tensors.iter().enumerate() {
            if t.is_none() {
                return Err(NetworkError::UnboundTensor(self.names[i].clone()));
            }
        }
        if self.root.is_none() {
            self.construct();
        }
        let root = self.root.expect("tree constructed");
        let result = self.eval(root)?;
        let mut out = match &self.tout {
            Some(tout) if !tout.labels.is_empty() => result.permute(&tout.labels, tout.in_count)?,
            _ => result,
        };
        out.set_name(name);
        Ok(out)
    }

    /// Build the contraction tree greedily: among all root pairs sharing a
    /// label, merge the pair with the lowest metric (ties: lower merged
    /// element count, then earlier position). Disjoint remainders are merged
    /// by outer product in original order.
    fn construct(&mut self) {
        self.nodes.clear();
        let mut roots: Vec<NodeId> = Vec::new();
        for (i, slot) in self.tensors.iter().enumerate() {
            let t = slot.as_ref().expect("all leaves bound before construct");
            self.nodes
                .push(Node::leaf(i, self.patterns[i].clone(), t.bonds().to_vec()));
            roots.push(i);
        }

        loop {
            let mut best: Option<(i64, u64, usize, usize)> = None;
            for i in 0..roots.len() {
                for j in i + 1..roots.len() {
                    let a = &self.nodes[roots[i]];
                    let b = &self.nodes[roots[j]];
                    if !a.shares_label(b) {
                        continue;
                    }
                    let (point, merged) = Node::metric(a, b);
                    let cand = (point, merged, i, j);
                    if best.map_or(true, |b| cand < b) {
                        best = Some(cand);
                    }
                }
            }
            match best {
                Some((point, _, i, j)) => {
                    let id = self.merge_nodes(roots[i], roots[j], point);
                    roots.remove(j);
                    roots.remove(i);
                    roots.push(id);
                }
                None => break,
            }
        }

        // Disconnected parts: outer products in original order.
        while roots.len() > 1 {
            let (point, _) = Node::metric(&self.nodes[roots[0]], &self.nodes[roots[1]]);
            let id = self.merge_nodes(roots[0], roots[1], point);
            roots.remove(1);
            roots[0] = id;
        }

        self.root = roots.pop();
        self.rec_swap();
    }

    fn destruct(&mut self) {
        self.nodes.clear();
        self.root = None;
        for s in &mut self.swaps {
            s.clear();
        }
    }

    fn merge_nodes(&mut self, left: NodeId, right: NodeId, point: i64) -> NodeId {
        let (labels, bonds) = Node::merged(&self.nodes[left], &self.nodes[right]);
        let elem_num = symtn_core::blocked_elem_num(&bonds);
        let id = self.nodes.len();
        self.nodes.push(Node {
            left: Some(left),
            right: Some(right),
            leaf: None,
            labels,
            bonds,
            elem_num,
            point,
        });
        id
    }

    /// Regenerate the per-leaf swap lists: every leaf accumulates the
    /// crossings against each leaf on the other side of every merge above
    /// it. Rebuilt from scratch on every construction, so repeated launches
    /// never double-apply gates.
    fn rec_swap(&mut self) {
        self.swaps = vec![Vec::new(); self.tensors.len()];
        if let Some(root) = self.root {
            self.collect_swaps(root);
        }
    }

    fn collect_swaps(&mut self, id: NodeId) -> Vec<usize> {
        let (left, right) = match (self.nodes[id].left, self.nodes[id].right) {
            (Some(l), Some(r)) => (l, r),
            _ => return vec![self.nodes[id].leaf.expect("leaf node")],
        };
        let left_leaves = self.collect_swaps(left);
        let mut right_leaves = self.collect_swaps(right);
        for &rl in &right_leaves {
            for &ll in &left_leaves {
                let swaps = {
                    let tr = self.tensors[rl].as_ref().expect("bound leaf");
                    let tl = self.tensors[ll].as_ref().expect("bound leaf");
                    tr.ex_swap(tl)
                };
                self.swaps[rl].extend(swaps);
            }
        }
        let mut all = left_leaves;
        all.append(&mut right_leaves);
        all
    }

    fn eval(&self, id: NodeId) -> Result<SymTensor<T>> {
        let node = &self.nodes[id];
        if let Some(slot) = node.leaf {
            let mut t = self.tensors[slot].as_ref().expect("bound leaf").clone();
            t.add_gate(&self.swaps[slot]);
            return Ok(t);
        }
        let left = self.eval(node.left.expect("internal node"))?;
        let right = self.eval(node.right.expect("internal node"))?;
        Ok(contract(&left, &right, true)?)
    }

    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, id: NodeId, depth: usize) -> fmt::Result {
        let node = &self.nodes[id];
        for _ in 0..depth {
            write!(f, "  ")?;
        }
        match node.leaf {
            Some(slot) => writeln!(
                f,
                "{}: {:?} ({} elems)",
                self.names[slot], node.labels, node.elem_num
            )?,
            None => writeln!(
                f,
                "*: {:?} ({} elems, point {})",
                node.labels, node.elem_num, node.point
            )?,
        }
        if let Some(l) = node.left {
            self.fmt_node(f, l, depth + 1)?;
        }
        if let Some(r) = node.right {
            self.fmt_node(f, r, depth + 1)?;
        }
        Ok(())
    }
}

impl<T: Scalar> fmt::Display for Network<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.root {
            Some(root) => self.fmt_node(f, root, 0),
            None => {
                for (name, pattern) in self.names.iter().zip(&self.patterns) {
                    writeln!(f, "{name}: {pattern:?}")?;
                }
                Ok(())
            }
        }
    }
}
