//! Charge-class bookkeeping for block-sparse tensors.
//!
//! Flattening the IN bonds of a tensor gives a row multi-index, the OUT
//! bonds a column multi-index. Each combination of per-bond charge states
//! (a "class", the Qidx of the original layout) carries a total charge, a
//! degeneracy dimension, and an offset inside the block of that charge.
//! Enumeration is lexicographic with the first bond most significant, which
//! fixes the deterministic bijection
//! `(row multi-index, col multi-index) <-> (charge, offset in block)`.

use std::collections::BTreeMap;

use crate::bond::{Bond, BondKind};
use crate::qnum::Qnum;

/// One state combination on one side of the tensor.
#[derive(Debug, Clone)]
pub(crate) struct Class {
    /// State index chosen on each bond.
    pub states: Vec<usize>,
    /// Sum of the chosen states' charges.
    pub charge: Qnum,
    /// Offset of this class inside the block of its charge.
    pub offset: usize,
    /// Product of the chosen states' degeneracies.
    pub dim: usize,
    /// Degeneracy of the chosen state on each bond (radices of the
    /// sub-index within the class).
    pub degs: Vec<usize>,
}

/// Enumeration of all classes on one side (row or column).
#[derive(Debug, Clone)]
pub(crate) struct AxisLayout {
    pub classes: Vec<Class>,
    /// Number of states per bond (radices of the class index).
    state_counts: Vec<usize>,
    /// Per bond: dense start offset of each state.
    state_starts: Vec<Vec<usize>>,
    /// Per bond: dense coordinate -> (state index, offset within state).
    coord_to_state: Vec<Vec<(usize, usize)>>,
    /// Class indices grouped by charge, ascending.
    by_charge: BTreeMap<Qnum, Vec<usize>>,
    /// Total dimension per charge.
    charge_dims: BTreeMap<Qnum, usize>,
}

impl AxisLayout {
    pub fn build(bonds: &[Bond]) -> Self {
        let n = bonds.len();
        let state_counts: Vec<usize> = bonds.iter().map(|b| b.states().len()).collect();

        let mut state_starts = Vec::with_capacity(n);
        let mut coord_to_state = Vec::with_capacity(n);
        for bond in bonds {
            let mut starts = Vec::with_capacity(bond.states().len());
            let mut lookup = Vec::with_capacity(bond.dim());
            let mut acc = 0;
            for (s, st) in bond.states().iter().enumerate() {
                starts.push(acc);
                for u in 0..st.deg {
                    lookup.push((s, u));
                }
                acc += st.deg;
            }
            state_starts.push(starts);
            coord_to_state.push(lookup);
        }

        let total: usize = state_counts.iter().product();
        let mut classes = Vec::with_capacity(total);
        let mut by_charge: BTreeMap<Qnum, Vec<usize>> = BTreeMap::new();
        let mut charge_dims: BTreeMap<Qnum, usize> = BTreeMap::new();

        let mut states = vec![0usize; n];
        for idx in 0..total {
            let mut charge = Qnum::zero();
            let mut dim = 1;
            let mut degs = Vec::with_capacity(n);
            for (b, &s) in bonds.iter().zip(states.iter()) {
                let st = &b.states()[s];
                charge = charge + st.q;
                dim *= st.deg;
                degs.push(st.deg);
            }
            let entry = charge_dims.entry(charge).or_insert(0);
            let offset = *entry;
            *entry += dim;
            by_charge.entry(charge).or_default().push(idx);
            classes.push(Class {
                states: states.clone(),
                charge,
                offset,
                dim,
                degs,
            });

            // Odometer increment, last bond fastest.
            for i in (0..n).rev() {
                states[i] += 1;
                if states[i] < state_counts[i] {
                    break;
                }
                states[i] = 0;
            }
        }

        Self {
            classes,
            state_counts,
            state_starts,
            coord_to_state,
            by_charge,
            charge_dims,
        }
    }

    /// Classes carrying the given charge.
    pub fn classes_for(&self, q: &Qnum) -> &[usize] {
        self.by_charge.get(q).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn charge_dims(&self) -> &BTreeMap<Qnum, usize> {
        &self.charge_dims
    }

    /// Map dense per-bond coordinates to (class index, sub-offset).
    pub fn locate(&self, coords: &[usize]) -> (usize, usize) {
        debug_assert_eq!(coords.len(), self.state_counts.len());
        let mut class_idx = 0;
        let mut sub = 0;
        for (i, &c) in coords.iter().enumerate() {
            let (s, u) = self.coord_to_state[i][c];
            class_idx = class_idx * self.state_counts[i] + s;
            sub = sub * self.classes_deg(i, s) + u;
        }
        (class_idx, sub)
    }

    fn classes_deg(&self, bond: usize, state: usize) -> usize {
        // Degeneracy of one state, recovered from the start table.
        let starts = &self.state_starts[bond];
        let end = if state + 1 < starts.len() {
            starts[state + 1]
        } else {
            self.coord_to_state[bond].len()
        };
        end - starts[state]
    }

    /// Fill the dense per-bond coordinates of element `sub` of a class.
    pub fn fill_coords(&self, class: &Class, sub: usize, out: &mut [usize]) {
        let n = class.states.len();
        debug_assert_eq!(out.len(), n);
        let mut rem = sub;
        for i in (0..n).rev() {
            let deg = class.degs[i];
            let u = rem % deg;
            rem /= deg;
            out[i] = self.state_starts[i][class.states[i]] + u;
        }
    }
}

/// Row and column layouts of a symmetric tensor.
#[derive(Debug, Clone)]
pub(crate) struct BlockLayout {
    pub row: AxisLayout,
    pub col: AxisLayout,
}

impl BlockLayout {
    pub fn build(bonds: &[Bond], in_count: usize) -> Self {
        Self {
            row: AxisLayout::build(&bonds[..in_count]),
            col: AxisLayout::build(&bonds[in_count..]),
        }
    }

    /// Shapes of the existing blocks: a block exists for every charge that
    /// appears on both sides.
    pub fn block_shapes(&self) -> BTreeMap<Qnum, (usize, usize)> {
        let mut shapes = BTreeMap::new();
        for (q, &rdim) in self.row.charge_dims() {
            if let Some(&cdim) = self.col.charge_dims().get(q) {
                shapes.insert(*q, (rdim, cdim));
            }
        }
        shapes
    }

    pub fn elem_num(&self) -> u64 {
        self.block_shapes()
            .values()
            .map(|&(r, c)| (r * c) as u64)
            .sum()
    }
}

/// Number of conserved elements a tensor over `bonds` would store.
///
/// The bonds are split by direction (IN bonds form the rows), matching the
/// storage rule of the tensor itself. Used by contraction planners to score
/// intermediates without materialising them.
pub fn blocked_elem_num(bonds: &[Bond]) -> u64 {
    let ins: Vec<Bond> = bonds
        .iter()
        .filter(|b| b.kind() == BondKind::In)
        .cloned()
        .collect();
    let outs: Vec<Bond> = bonds
        .iter()
        .filter(|b| b.kind() == BondKind::Out)
        .cloned()
        .collect();
    let row = AxisLayout::build(&ins);
    let col = AxisLayout::build(&outs);
    let mut total = 0u64;
    for (q, &rdim) in row.charge_dims() {
        if let Some(&cdim) = col.charge_dims().get(q) {
            total += (rdim * cdim) as u64;
        }
    }
    total
}
