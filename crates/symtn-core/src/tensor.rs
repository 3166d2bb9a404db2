//! Block-sparse symmetric tensors.
//!
//! A [`SymTensor`] stores the conserved blocks of a multi-index tensor whose
//! bonds carry abelian charges. The first `in_count` bonds are incoming and
//! flatten into the block rows, the remaining bonds are outgoing and flatten
//! into the block columns; an element is representable only when its row and
//! column charge sums agree. All index-motion operations (permute, combine,
//! partial trace, contraction) preserve that layout while moving elements.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use rand::Rng;

use crate::block::Block;
use crate::bond::{Bond, BondKind, BondState};
use crate::error::{Result, TensorError};
use crate::layout::BlockLayout;
use crate::qnum::Qnum;
use crate::scalar::Scalar;

/// Tensor has bonds attached.
pub const HAVE_BOND: u8 = 1;
/// Tensor has elements assigned.
pub const HAVE_ELEM: u8 = 2;

static COUNTER: AtomicI64 = AtomicI64::new(0);
static ELEM_NUM: AtomicI64 = AtomicI64::new(0);
static MAX_ELEM_NUM: AtomicI64 = AtomicI64::new(0);
static MAX_ELEM_TEN: AtomicI64 = AtomicI64::new(0);

fn profile_add(elems: i64) {
    COUNTER.fetch_add(1, Ordering::Relaxed);
    let now = ELEM_NUM.fetch_add(elems, Ordering::Relaxed) + elems;
    MAX_ELEM_NUM.fetch_max(now, Ordering::Relaxed);
    MAX_ELEM_TEN.fetch_max(elems, Ordering::Relaxed);
}

fn profile_sub(elems: i64) {
    COUNTER.fetch_sub(1, Ordering::Relaxed);
    ELEM_NUM.fetch_sub(elems, Ordering::Relaxed);
}

/// Memory accounting of every live tensor in the process.
pub fn profile() -> String {
    format!(
        "Tensor profile:\n  Existing tensors: {}\n  Allocated elements: {}\n  Max allocated elements: {}\n  Max allocated elements for a single tensor: {}\n",
        COUNTER.load(Ordering::Relaxed),
        ELEM_NUM.load(Ordering::Relaxed),
        MAX_ELEM_NUM.load(Ordering::Relaxed),
        MAX_ELEM_TEN.load(Ordering::Relaxed),
    )
}

/// A fermionic swap gate between two bond positions of a tensor.
///
/// Applying the gate flips the sign of every element whose sub-indices on
/// both bonds carry fermionic charges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Swap {
    pub b1: usize,
    pub b2: usize,
}

/// A block-sparse tensor with abelian quantum numbers on its bonds.
#[derive(Debug)]
pub struct SymTensor<T: Scalar> {
    name: String,
    bonds: Vec<Bond>,
    labels: Vec<i32>,
    in_count: usize,
    layout: BlockLayout,
    blocks: BTreeMap<Qnum, Block<T>>,
    status: u8,
}

impl<T: Scalar> SymTensor<T> {
    /// Create a zero-filled tensor with default labels `0..bond_num`.
    ///
    /// IN bonds must precede OUT bonds.
    pub fn new(bonds: Vec<Bond>) -> Result<Self> {
        let labels: Vec<i32> = (0..bonds.len() as i32).collect();
        Self::with_labels(bonds, labels)
    }

    /// Create a zero-filled tensor with explicit labels.
    pub fn with_labels(bonds: Vec<Bond>, labels: Vec<i32>) -> Result<Self> {
        if labels.len() != bonds.len() {
            return Err(TensorError::LabelError(format!(
                "{} labels for {} bonds",
                labels.len(),
                bonds.len()
            )));
        }
        check_distinct(&labels)?;
        let in_count = bonds.iter().filter(|b| b.kind() == BondKind::In).count();
        if bonds[..in_count].iter().any(|b| b.kind() == BondKind::Out) {
            return Err(TensorError::BondMismatch(
                "incoming bonds must precede outgoing bonds".into(),
            ));
        }

        let layout = BlockLayout::build(&bonds, in_count);
        let blocks: BTreeMap<Qnum, Block<T>> = layout
            .block_shapes()
            .into_iter()
            .map(|(q, (r, c))| (q, Block::zeros(r, c)))
            .collect();
        let status = if bonds.is_empty() { 0 } else { HAVE_BOND };

        let tensor = Self {
            name: String::new(),
            bonds,
            labels,
            in_count,
            layout,
            blocks,
            status,
        };
        profile_add(tensor.elem_num() as i64);
        Ok(tensor)
    }

    /// A rank-0 tensor holding a single value.
    pub fn from_scalar(val: T) -> Self {
        let mut t = Self::with_labels(Vec::new(), Vec::new()).expect("rank-0 tensor");
        t.blocks
            .get_mut(&Qnum::zero())
            .expect("rank-0 block")
            .set(0, 0, val);
        t.status |= HAVE_ELEM;
        t
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn bond_num(&self) -> usize {
        self.bonds.len()
    }

    pub fn in_bond_num(&self) -> usize {
        self.in_count
    }

    pub fn labels(&self) -> &[i32] {
        &self.labels
    }

    pub fn status(&self) -> u8 {
        self.status
    }

    pub fn has_elem(&self) -> bool {
        self.status & HAVE_ELEM != 0
    }

    /// Number of stored (conserved) elements.
    pub fn elem_num(&self) -> u64 {
        self.blocks.values().map(|b| b.len() as u64).sum()
    }

    pub fn block_num(&self) -> usize {
        self.blocks.len()
    }

    /// Block charges in ascending order.
    pub fn block_qnums(&self) -> Vec<Qnum> {
        self.blocks.keys().copied().collect()
    }

    pub fn block(&self, q: &Qnum) -> Option<&Block<T>> {
        self.blocks.get(q)
    }

    pub fn blocks(&self) -> impl Iterator<Item = (&Qnum, &Block<T>)> {
        self.blocks.iter()
    }

    /// The value of a rank-0 tensor.
    pub fn scalar_value(&self) -> Result<T> {
        if !self.bonds.is_empty() {
            return Err(TensorError::BondMismatch(
                "tensor is not rank-0".into(),
            ));
        }
        Ok(self.blocks[&Qnum::zero()].get(0, 0))
    }

    /// Replace the block of charge `q`.
    ///
    /// Diagonal inputs are expanded (off-diagonal elements become zero).
    /// Unless `force` is set, the shape must match the existing block.
    pub fn put_block(&mut self, q: Qnum, mat: &Block<T>, force: bool) -> Result<()> {
        let existing = self
            .blocks
            .get_mut(&q)
            .ok_or(TensorError::BlockNotFound(q))?;
        if !force && mat.shape() != existing.shape() {
            return Err(TensorError::ShapeMismatch {
                expected: existing.shape().to_vec(),
                actual: mat.shape().to_vec(),
            });
        }
        *existing = mat.to_dense();
        self.status |= HAVE_ELEM;
        Ok(())
    }

    /// Assign labels, replacing the current ones.
    pub fn set_label(&mut self, new_labels: &[i32]) -> Result<()> {
        if new_labels.len() != self.bonds.len() {
            return Err(TensorError::LabelError(format!(
                "{} labels for {} bonds",
                new_labels.len(),
                self.bonds.len()
            )));
        }
        check_distinct(new_labels)?;
        self.labels = new_labels.to_vec();
        Ok(())
    }

    /// Dense total dimension (product of bond dimensions).
    pub fn dense_len(&self) -> usize {
        self.bonds.iter().map(|b| b.dim()).product()
    }

    fn dense_dims(&self) -> Vec<usize> {
        self.bonds.iter().map(|b| b.dim()).collect()
    }

    /// Map dense per-bond coordinates to the block cell holding them, or
    /// `None` for a charge-forbidden position.
    fn locate(&self, coords: &[usize]) -> Option<(Qnum, usize, usize)> {
        let (ri, sr) = self.layout.row.locate(&coords[..self.in_count]);
        let (ci, sc) = self.layout.col.locate(&coords[self.in_count..]);
        let rc = &self.layout.row.classes[ri];
        let cc = &self.layout.col.classes[ci];
        if rc.charge != cc.charge {
            return None;
        }
        Some((rc.charge, rc.offset + sr, cc.offset + sc))
    }

    /// Visit every stored element with its dense per-bond coordinates.
    fn for_each_element<F: FnMut(&[usize], T)>(&self, mut f: F) {
        let n = self.bonds.len();
        let mut coords = vec![0usize; n];
        for (q, block) in &self.blocks {
            for &ri in self.layout.row.classes_for(q) {
                let rc = &self.layout.row.classes[ri];
                for &ci in self.layout.col.classes_for(q) {
                    let cc = &self.layout.col.classes[ci];
                    for sr in 0..rc.dim {
                        self.layout.row.fill_coords(rc, sr, &mut coords[..self.in_count]);
                        for sc in 0..cc.dim {
                            self.layout
                                .col
                                .fill_coords(cc, sc, &mut coords[self.in_count..]);
                            f(&coords, block.get(rc.offset + sr, cc.offset + sc));
                        }
                    }
                }
            }
        }
    }

    /// Interpret `elems` as the full dense tensor in lexicographic
    /// multi-index order (first bond most significant) and scatter it into
    /// the conserved blocks. Charge-forbidden entries are dropped.
    pub fn set_raw_elem(&mut self, elems: &[T]) -> Result<()> {
        self.scatter_raw(elems, None)
    }

    /// Like [`set_raw_elem`](Self::set_raw_elem), but fails with
    /// `SymmetryViolation` if a dropped entry exceeds `tol` in magnitude.
    /// The tensor is untouched on failure.
    pub fn set_raw_elem_strict(&mut self, elems: &[T], tol: f64) -> Result<()> {
        self.scatter_raw(elems, Some(tol))
    }

    fn scatter_raw(&mut self, elems: &[T], tol: Option<f64>) -> Result<()> {
        let total = self.dense_len();
        if elems.len() != total {
            return Err(TensorError::ShapeMismatch {
                expected: vec![total],
                actual: vec![elems.len()],
            });
        }
        let dims = self.dense_dims();
        let n = dims.len();
        let mut coords = vec![0usize; n];

        if let Some(tol) = tol {
            for (idx, v) in elems.iter().enumerate() {
                decompose(idx, &dims, &mut coords);
                if self.locate(&coords).is_none() && v.abs_f64() > tol {
                    return Err(TensorError::SymmetryViolation {
                        index: idx,
                        value: v.abs_f64(),
                    });
                }
            }
        }

        for b in self.blocks.values_mut() {
            b.fill_zero();
        }
        for (idx, v) in elems.iter().enumerate() {
            decompose(idx, &dims, &mut coords);
            if let Some((q, r, c)) = self.locate(&coords) {
                self.blocks.get_mut(&q).expect("layout block").set(r, c, *v);
            }
        }
        self.status |= HAVE_ELEM;
        Ok(())
    }

    /// Export the dense tensor in lexicographic multi-index order.
    pub fn raw_elem(&self) -> Vec<T> {
        let dims = self.dense_dims();
        let mut out = vec![T::zero(); self.dense_len()];
        self.for_each_element(|coords, v| {
            let mut linear = 0;
            for (c, d) in coords.iter().zip(dims.iter()) {
                linear = linear * d + c;
            }
            out[linear] = v;
        });
        out
    }

    /// Single dense element; zero at charge-forbidden positions.
    pub fn at(&self, idxs: &[usize]) -> Result<T> {
        let dims = self.dense_dims();
        if idxs.len() != dims.len() {
            return Err(TensorError::ShapeMismatch {
                expected: dims,
                actual: vec![idxs.len()],
            });
        }
        for (i, (&c, &d)) in idxs.iter().zip(dims.iter()).enumerate() {
            if c >= d {
                return Err(TensorError::LabelError(format!(
                    "index {c} out of range for bond {i} of dimension {d}"
                )));
            }
        }
        Ok(match self.locate(idxs) {
            Some((q, r, c)) => self.blocks[&q].get(r, c),
            None => T::zero(),
        })
    }

    /// Set every element to zero; the element status is retained.
    pub fn set_zero(&mut self) {
        for b in self.blocks.values_mut() {
            b.fill_zero();
        }
    }

    /// Drop the elements, keeping the bonds.
    pub fn clear(&mut self) {
        self.set_zero();
        self.status &= !HAVE_ELEM;
    }

    /// Set the diagonal of every block to one.
    pub fn identity(&mut self) {
        for b in self.blocks.values_mut() {
            b.set_identity();
        }
        self.status |= HAVE_ELEM;
    }

    /// Fill every block with values uniform in [0, 1).
    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for b in self.blocks.values_mut() {
            b.randomize(rng);
        }
        self.status |= HAVE_ELEM;
    }

    /// Fill every block with random orthonormal rows or columns.
    pub fn ortho_rand<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        for b in self.blocks.values_mut() {
            b.ortho_rand(rng)?;
        }
        self.status |= HAVE_ELEM;
        Ok(())
    }

    /// Frobenius norm over all blocks.
    pub fn norm(&self) -> f64 {
        self.blocks
            .values()
            .map(|b| {
                let n = b.norm();
                n * n
            })
            .sum::<f64>()
            .sqrt()
    }

    /// Largest real part over all blocks.
    pub fn max(&self) -> f64 {
        self.blocks
            .values()
            .map(Block::max)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Largest magnitude over all blocks.
    pub fn abs_max(&self) -> f64 {
        self.blocks.values().map(Block::abs_max).fold(0.0, f64::max)
    }

    /// Multiply every element by `alpha`.
    pub fn scale(&mut self, alpha: T) {
        for b in self.blocks.values_mut() {
            b.scale(alpha);
        }
    }

    pub fn scaled(&self, alpha: T) -> Self {
        let mut t = self.clone();
        t.scale(alpha);
        t
    }

    /// True iff the bond lists (and the IN split) agree.
    pub fn similar(&self, other: &Self) -> bool {
        self.in_count == other.in_count && self.bonds == other.bonds
    }

    /// Exact element-wise comparison of similar tensors.
    pub fn elem_cmp(&self, other: &Self) -> bool {
        self.similar(other)
            && self
                .blocks
                .iter()
                .zip(other.blocks.iter())
                .all(|((qa, a), (qb, b))| qa == qb && a.elem_eq(b))
    }

    /// Element-wise sum of similar tensors.
    pub fn add(&self, other: &Self) -> Result<Self> {
        if !self.similar(other) {
            return Err(TensorError::BondMismatch(
                "tensors are not similar".into(),
            ));
        }
        let mut out = self.clone();
        for (q, b) in out.blocks.iter_mut() {
            *b = b.add(&other.blocks[q]);
        }
        out.status |= other.status & HAVE_ELEM;
        Ok(out)
    }

    /// Full trace: the sum of the block traces.
    pub fn trace(&self) -> Result<T> {
        let mut acc = T::zero();
        for b in self.blocks.values() {
            acc = acc + b.trace()?;
        }
        Ok(acc)
    }

    /// Permute bonds to the order given by `new_labels` with `new_in_count`
    /// incoming bonds. Bonds moved across the IN/OUT split reverse
    /// direction (their charges negate); the dense element content is
    /// unchanged.
    pub fn permute(&self, new_labels: &[i32], new_in_count: usize) -> Result<Self> {
        let n = self.bonds.len();
        if new_labels.len() != n {
            return Err(TensorError::LabelError(format!(
                "{} labels for {} bonds",
                new_labels.len(),
                n
            )));
        }
        if new_in_count > n {
            return Err(TensorError::LabelError(format!(
                "IN bond count {new_in_count} exceeds bond count {n}"
            )));
        }
        let mut perm = Vec::with_capacity(n);
        for l in new_labels {
            let src = self
                .labels
                .iter()
                .position(|x| x == l)
                .ok_or_else(|| TensorError::LabelError(format!("unknown label {l}")))?;
            if perm.contains(&src) {
                return Err(TensorError::LabelError(format!("duplicate label {l}")));
            }
            perm.push(src);
        }

        let identity = perm.iter().enumerate().all(|(i, &p)| i == p);
        if identity && new_in_count == self.in_count {
            return Ok(self.clone());
        }

        let mut new_bonds = Vec::with_capacity(n);
        for (j, &src) in perm.iter().enumerate() {
            let want = if j < new_in_count {
                BondKind::In
            } else {
                BondKind::Out
            };
            let b = &self.bonds[src];
            new_bonds.push(if b.kind() == want { b.clone() } else { b.reversed() });
        }

        let mut dst = Self::with_labels(new_bonds, new_labels.to_vec())?;
        dst.name = self.name.clone();
        dst.status = self.status;

        let layout = &dst.layout;
        let in_new = new_in_count;
        let mut blocks = std::mem::take(&mut dst.blocks);
        let mut dstc = vec![0usize; n];
        self.for_each_element(|coords, v| {
            for (j, &src) in perm.iter().enumerate() {
                dstc[j] = coords[src];
            }
            let (ri, sr) = layout.row.locate(&dstc[..in_new]);
            let (ci, sc) = layout.col.locate(&dstc[in_new..]);
            let rc = &layout.row.classes[ri];
            let cc = &layout.col.classes[ci];
            debug_assert_eq!(rc.charge, cc.charge);
            blocks
                .get_mut(&rc.charge)
                .expect("conserved element lands in an existing block")
                .set(rc.offset + sr, cc.offset + sc, v);
        });
        dst.blocks = blocks;
        Ok(dst)
    }

    /// Swap the IN and OUT roles of every bond, keeping the stored charges,
    /// and transpose every block.
    pub fn transpose(&self) -> Self {
        let out_count = self.bonds.len() - self.in_count;
        let mut new_bonds = Vec::with_capacity(self.bonds.len());
        let mut new_labels = Vec::with_capacity(self.bonds.len());
        for (b, &l) in self.bonds[self.in_count..]
            .iter()
            .zip(&self.labels[self.in_count..])
        {
            new_bonds.push(Bond::new(BondKind::In, b.states().to_vec()));
            new_labels.push(l);
        }
        for (b, &l) in self.bonds[..self.in_count]
            .iter()
            .zip(&self.labels[..self.in_count])
        {
            new_bonds.push(Bond::new(BondKind::Out, b.states().to_vec()));
            new_labels.push(l);
        }

        let mut dst =
            Self::with_labels(new_bonds, new_labels).expect("transposed bonds are valid");
        dst.name = self.name.clone();
        dst.status = self.status;
        debug_assert_eq!(dst.in_count, out_count);
        for (q, b) in &self.blocks {
            *dst.blocks.get_mut(q).expect("mirrored block") = b.transpose();
        }
        dst
    }

    /// Element-wise complex conjugate.
    pub fn conj(&self) -> Self {
        let mut dst = self.clone();
        for b in dst.blocks.values_mut() {
            *b = b.conj();
        }
        dst
    }

    /// Conjugate transpose (the adjoint tensor).
    pub fn conj_transpose(&self) -> Self {
        let mut dst = self.transpose();
        for b in dst.blocks.values_mut() {
            *b = b.conj();
        }
        dst
    }

    /// Trace out the pair of bonds labelled `la` and `lb`.
    pub fn partial_trace(&self, la: i32, lb: i32) -> Result<Self> {
        if la == lb {
            return Err(TensorError::LabelError(format!(
                "cannot trace label {la} with itself"
            )));
        }
        let pa = self.position_of(la)?;
        let pb = self.position_of(lb)?;
        if !self.bonds[pa].contractible(&self.bonds[pb]) {
            return Err(TensorError::BondMismatch(format!(
                "bonds {la} and {lb} are not traceable"
            )));
        }

        let mut rest_bonds = Vec::new();
        let mut rest_labels = Vec::new();
        let mut rest_pos = Vec::new();
        for (p, (b, &l)) in self.bonds.iter().zip(&self.labels).enumerate() {
            if p != pa && p != pb {
                rest_bonds.push(b.clone());
                rest_labels.push(l);
                rest_pos.push(p);
            }
        }

        let mut dst = Self::with_labels(rest_bonds, rest_labels)?;
        dst.status = self.status;

        let layout = &dst.layout;
        let in_new = dst.in_count;
        let mut blocks = std::mem::take(&mut dst.blocks);
        let mut dstc = vec![0usize; rest_pos.len()];
        self.for_each_element(|coords, v| {
            if coords[pa] != coords[pb] {
                return;
            }
            for (j, &p) in rest_pos.iter().enumerate() {
                dstc[j] = coords[p];
            }
            let (ri, sr) = layout.row.locate(&dstc[..in_new]);
            let (ci, sc) = layout.col.locate(&dstc[in_new..]);
            let rc = &layout.row.classes[ri];
            let cc = &layout.col.classes[ci];
            if rc.charge != cc.charge {
                return;
            }
            let blk = blocks.get_mut(&rc.charge).expect("traced block");
            let prev = blk.get(rc.offset + sr, cc.offset + sc);
            blk.set(rc.offset + sr, cc.offset + sc, prev + v);
        });
        dst.blocks = blocks;
        Ok(dst)
    }

    /// Replace the bonds named in `combined` with their direct product.
    ///
    /// The listed bonds are gathered, in listed order, at the position of
    /// the first listed label; the result bond takes the direction of the
    /// first listed bond and keeps its label.
    pub fn combine_bond(&self, combined: &[i32]) -> Result<Self> {
        if combined.is_empty() {
            return Err(TensorError::LabelError(
                "no labels given to combine".into(),
            ));
        }
        check_distinct(combined)?;
        let positions: Vec<usize> = combined
            .iter()
            .map(|&l| self.position_of(l))
            .collect::<Result<_>>()?;
        if combined.len() == 1 {
            return Ok(self.clone());
        }

        let group_kind = self.bonds[positions[0]].kind();
        let first_pos = positions[0];

        // Gather the group at the first listed position, then restore the
        // IN-first invariant by a stable partition on assigned direction.
        let mut scan: Vec<(usize, BondKind)> = Vec::with_capacity(self.bonds.len());
        for p in 0..self.bonds.len() {
            if p == first_pos {
                for &gp in &positions {
                    scan.push((gp, group_kind));
                }
            } else if !positions.contains(&p) {
                scan.push((p, self.bonds[p].kind()));
            }
        }
        let mut order: Vec<usize> = Vec::with_capacity(scan.len());
        order.extend(scan.iter().filter(|(_, k)| *k == BondKind::In).map(|(p, _)| *p));
        let new_in = order.len();
        order.extend(scan.iter().filter(|(_, k)| *k == BondKind::Out).map(|(p, _)| *p));

        let perm_labels: Vec<i32> = order.iter().map(|&p| self.labels[p]).collect();
        let permuted = self.permute(&perm_labels, new_in)?;

        // The group is contiguous now; locate its start.
        let start = permuted
            .labels
            .iter()
            .position(|&l| l == combined[0])
            .expect("group label present");
        let k = combined.len();
        let group_bonds = &permuted.bonds[start..start + k];

        // Combined bond plus the map from the group's joint dense coordinate
        // to the coordinate along the canonicalised combined bond.
        let (combined_bond, joint_map) = combine_with_map(group_bonds);

        let mut new_bonds = Vec::with_capacity(permuted.bonds.len() - k + 1);
        let mut new_labels = Vec::with_capacity(permuted.bonds.len() - k + 1);
        new_bonds.extend_from_slice(&permuted.bonds[..start]);
        new_labels.extend_from_slice(&permuted.labels[..start]);
        new_bonds.push(combined_bond);
        new_labels.push(combined[0]);
        new_bonds.extend_from_slice(&permuted.bonds[start + k..]);
        new_labels.extend_from_slice(&permuted.labels[start + k..]);

        let mut dst = Self::with_labels(new_bonds, new_labels)?;
        dst.name = self.name.clone();
        dst.status = self.status;

        let group_dims: Vec<usize> = permuted.bonds[start..start + k]
            .iter()
            .map(|b| b.dim())
            .collect();
        let layout = &dst.layout;
        let in_new = dst.in_count;
        let mut blocks = std::mem::take(&mut dst.blocks);
        let mut dstc = vec![0usize; dst.bonds.len()];
        permuted.for_each_element(|coords, v| {
            let mut joint = 0;
            for (d, &c) in group_dims.iter().zip(&coords[start..start + k]) {
                joint = joint * d + c;
            }
            dstc[..start].copy_from_slice(&coords[..start]);
            dstc[start] = joint_map[joint];
            dstc[start + 1..].copy_from_slice(&coords[start + k..]);
            let (ri, sr) = layout.row.locate(&dstc[..in_new]);
            let (ci, sc) = layout.col.locate(&dstc[in_new..]);
            let rc = &layout.row.classes[ri];
            let cc = &layout.col.classes[ci];
            debug_assert_eq!(rc.charge, cc.charge);
            blocks
                .get_mut(&rc.charge)
                .expect("combined block")
                .set(rc.offset + sr, cc.offset + sc, v);
        });
        dst.blocks = blocks;
        Ok(dst)
    }

    /// Swap-gate list incurred by contracting `self` against `other`: every
    /// pair of a shared and an unshared bond position of `self`.
    pub fn ex_swap(&self, other: &Self) -> Vec<Swap> {
        let mut shared = Vec::new();
        let mut free = Vec::new();
        for (p, l) in self.labels.iter().enumerate() {
            if other.labels.contains(l) {
                shared.push(p);
            } else {
                free.push(p);
            }
        }
        let mut swaps = Vec::with_capacity(shared.len() * free.len());
        for &i in &shared {
            for &j in &free {
                swaps.push(Swap { b1: i, b2: j });
            }
        }
        swaps
    }

    /// Apply a sequence of fermionic swap gates: each swap flips the sign of
    /// every element whose states on both named bonds are fermionic. Sign
    /// composition is XOR, so applying the same list twice is the identity.
    pub fn add_gate(&mut self, swaps: &[Swap]) {
        if swaps.is_empty() {
            return;
        }
        let n = self.bonds.len();
        for sw in swaps {
            assert!(sw.b1 < n && sw.b2 < n, "swap bond position out of range");
        }
        let layout = &self.layout;
        let bonds = &self.bonds;
        let in_count = self.in_count;
        for (q, block) in self.blocks.iter_mut() {
            for &ri in layout.row.classes_for(q) {
                let rc = &layout.row.classes[ri];
                for &ci in layout.col.classes_for(q) {
                    let cc = &layout.col.classes[ci];
                    let charge_at = |p: usize| -> Qnum {
                        if p < in_count {
                            bonds[p].states()[rc.states[p]].q
                        } else {
                            bonds[p].states()[cc.states[p - in_count]].q
                        }
                    };
                    let mut flip = false;
                    for sw in swaps {
                        if charge_at(sw.b1).is_fermionic() && charge_at(sw.b2).is_fermionic() {
                            flip = !flip;
                        }
                    }
                    if flip {
                        for r in rc.offset..rc.offset + rc.dim {
                            for c in cc.offset..cc.offset + cc.dim {
                                let v = block.get(r, c);
                                block.set(r, c, -v);
                            }
                        }
                    }
                }
            }
        }
    }

    fn position_of(&self, label: i32) -> Result<usize> {
        self.labels
            .iter()
            .position(|&l| l == label)
            .ok_or_else(|| TensorError::LabelError(format!("unknown label {label}")))
    }
}

/// Combine a contiguous bond group into one canonical bond, returning the
/// map from the group's joint dense coordinate to the combined coordinate.
fn combine_with_map(group: &[Bond]) -> (Bond, Vec<usize>) {
    let kind = group[0].kind();
    let dims: Vec<usize> = group.iter().map(|b| b.dim()).collect();
    let total: usize = dims.iter().product();
    let counts: Vec<usize> = group.iter().map(|b| b.states().len()).collect();
    let tuples: usize = counts.iter().product();

    // Pass 1: per-charge totals over state tuples (lexicographic).
    let mut charge_total: BTreeMap<Qnum, usize> = BTreeMap::new();
    let mut states = vec![0usize; group.len()];
    for _ in 0..tuples {
        let mut q = Qnum::zero();
        let mut deg = 1;
        for (b, &s) in group.iter().zip(&states) {
            q = q + b.states()[s].q;
            deg *= b.states()[s].deg;
        }
        *charge_total.entry(q).or_insert(0) += deg;
        odometer(&mut states, &counts);
    }

    // Start of each charge in the canonical (ascending) combined bond.
    let mut charge_start: BTreeMap<Qnum, usize> = BTreeMap::new();
    let mut acc = 0;
    for (&q, &deg) in &charge_total {
        charge_start.insert(q, acc);
        acc += deg;
    }
    let combined = Bond::new(
        kind,
        charge_total
            .iter()
            .map(|(&q, &deg)| BondState::new(q, deg))
            .collect(),
    );

    // Pass 2: assign each state tuple its slice of the combined bond, in
    // lexicographic tuple order within each charge, and fill the joint map.
    let mut next_in_charge: BTreeMap<Qnum, usize> = BTreeMap::new();
    let mut joint_map = vec![0usize; total];
    let mut states = vec![0usize; group.len()];
    for _ in 0..tuples {
        let mut q = Qnum::zero();
        let mut deg = 1;
        let mut starts = Vec::with_capacity(group.len());
        let mut degs = Vec::with_capacity(group.len());
        for (b, &s) in group.iter().zip(&states) {
            q = q + b.states()[s].q;
            deg *= b.states()[s].deg;
            let start: usize = b.states()[..s].iter().map(|st| st.deg).sum();
            starts.push(start);
            degs.push(b.states()[s].deg);
        }
        let used = next_in_charge.entry(q).or_insert(0);
        let slice_start = charge_start[&q] + *used;
        *used += deg;

        // Enumerate the intra-state offsets of this tuple.
        let mut sub = vec![0usize; group.len()];
        for off in 0..deg {
            let mut joint = 0;
            for i in 0..group.len() {
                joint = joint * dims[i] + starts[i] + sub[i];
            }
            joint_map[joint] = slice_start + off;
            odometer(&mut sub, &degs);
        }
        odometer(&mut states, &counts);
    }

    (combined, joint_map)
}

fn odometer(digits: &mut [usize], radices: &[usize]) {
    for i in (0..digits.len()).rev() {
        digits[i] += 1;
        if digits[i] < radices[i] {
            return;
        }
        digits[i] = 0;
    }
}

fn decompose(mut linear: usize, dims: &[usize], out: &mut [usize]) {
    for i in (0..dims.len()).rev() {
        out[i] = linear % dims[i];
        linear /= dims[i];
    }
}

fn check_distinct(labels: &[i32]) -> Result<()> {
    for (i, a) in labels.iter().enumerate() {
        if labels[i + 1..].contains(a) {
            return Err(TensorError::LabelError(format!("duplicate label {a}")));
        }
    }
    Ok(())
}

impl<T: Scalar> Clone for SymTensor<T> {
    fn clone(&self) -> Self {
        let t = Self {
            name: self.name.clone(),
            bonds: self.bonds.clone(),
            labels: self.labels.clone(),
            in_count: self.in_count,
            layout: self.layout.clone(),
            blocks: self.blocks.clone(),
            status: self.status,
        };
        profile_add(t.elem_num() as i64);
        t
    }
}

impl<T: Scalar> Drop for SymTensor<T> {
    fn drop(&mut self) {
        profile_sub(self.elem_num() as i64);
    }
}

/// Contract all same-labelled bond pairs of `a` and `b`.
///
/// Shared bonds must be pairwise contractible. With `fast` the result keeps
/// the internal bond order (`a`'s free bonds, then `b`'s); otherwise it is
/// permuted back so the bond order matches the order in which the free
/// labels appear in `a` then `b`.
pub fn contract<T: Scalar>(a: &SymTensor<T>, b: &SymTensor<T>, fast: bool) -> Result<SymTensor<T>> {
    // Rank-0 operands act as scalars.
    if a.bond_num() == 0 {
        return Ok(b.scaled(a.scalar_value()?));
    }
    if b.bond_num() == 0 {
        return Ok(a.scaled(b.scalar_value()?));
    }

    let mut shared: Vec<i32> = a
        .labels()
        .iter()
        .filter(|l| b.labels().contains(l))
        .copied()
        .collect();
    shared.sort_unstable();

    for &l in &shared {
        let ba = &a.bonds()[a.position_of(l)?];
        let bb = &b.bonds()[b.position_of(l)?];
        if !ba.contractible(bb) {
            return Err(TensorError::BondMismatch(format!(
                "bonds with label {l} cannot be contracted"
            )));
        }
    }

    // A: free bonds first (IN free, then OUT free), shared last as columns.
    let mut a_order: Vec<i32> = Vec::with_capacity(a.bond_num());
    for (bond, &l) in a.bonds().iter().zip(a.labels()) {
        if bond.kind() == BondKind::In && !shared.contains(&l) {
            a_order.push(l);
        }
    }
    for (bond, &l) in a.bonds().iter().zip(a.labels()) {
        if bond.kind() == BondKind::Out && !shared.contains(&l) {
            a_order.push(l);
        }
    }
    let free_a = a_order.len();
    a_order.extend_from_slice(&shared);

    // B: shared bonds first as rows, free bonds after in original order.
    let mut b_order: Vec<i32> = shared.clone();
    let free_b_labels: Vec<i32> = b
        .labels()
        .iter()
        .filter(|l| !shared.contains(l))
        .copied()
        .collect();
    b_order.extend_from_slice(&free_b_labels);

    let pa = a.permute(&a_order, free_a)?;
    let pb = b.permute(&b_order, shared.len())?;

    let mut bonds_c: Vec<Bond> = pa.bonds()[..free_a].to_vec();
    bonds_c.extend_from_slice(&pb.bonds()[shared.len()..]);
    let mut labels_c: Vec<i32> = pa.labels()[..free_a].to_vec();
    labels_c.extend_from_slice(&pb.labels()[shared.len()..]);

    let mut c = SymTensor::with_labels(bonds_c, labels_c)?;
    for (q, blk_a) in pa.blocks() {
        if let Some(blk_b) = pb.block(q) {
            let prod = blk_a.matmul(blk_b);
            c.put_block(*q, &prod, false)?;
        }
    }
    if !(a.has_elem() && b.has_elem()) {
        c.status &= !HAVE_ELEM;
    } else {
        c.status |= HAVE_ELEM;
    }

    if c.bond_num() == 0 || fast {
        return Ok(c);
    }

    // Restore first-appearance order of the free labels.
    let mut final_labels = Vec::with_capacity(c.bond_num());
    let mut final_in = 0;
    for (bond, &l) in a.bonds().iter().zip(a.labels()) {
        if !shared.contains(&l) {
            final_labels.push(l);
            if bond.kind() == BondKind::In {
                final_in += 1;
            }
        }
    }
    for (bond, &l) in b.bonds().iter().zip(b.labels()) {
        if !shared.contains(&l) {
            final_labels.push(l);
            if bond.kind() == BondKind::In {
                final_in += 1;
            }
        }
    }
    c.permute(&final_labels, final_in)
}

/// Tensor product of `a` and `b`.
///
/// Operand labels are replaced by a disjoint running sequence, so the result
/// carries labels `0..a.bond_num() + b.bond_num()`.
pub fn otimes<T: Scalar>(a: &SymTensor<T>, b: &SymTensor<T>) -> Result<SymTensor<T>> {
    let mut ta = a.clone();
    let mut tb = b.clone();
    let la: Vec<i32> = (0..a.bond_num() as i32).collect();
    let lb: Vec<i32> = (a.bond_num() as i32..(a.bond_num() + b.bond_num()) as i32).collect();
    ta.set_label(&la)?;
    tb.set_label(&lb)?;
    contract(&ta, &tb, false)
}

impl<T: Scalar> std::ops::Mul<T> for &SymTensor<T> {
    type Output = SymTensor<T>;

    fn mul(self, alpha: T) -> SymTensor<T> {
        self.scaled(alpha)
    }
}

impl<T: Scalar> std::ops::Mul for &SymTensor<T> {
    type Output = SymTensor<T>;

    /// Contraction over all same-labelled bonds.
    ///
    /// # Panics
    /// Panics if the shared bonds are incompatible; use [`contract`] for a
    /// fallible version.
    fn mul(self, other: &SymTensor<T>) -> SymTensor<T> {
        match contract(self, other, false) {
            Ok(res) => res,
            Err(err) => panic!("{}", err),
        }
    }
}

impl<T: Scalar + fmt::Display> SymTensor<T> {
    /// Render the dense elements as a matrix, rows spanned by the incoming
    /// bonds and columns by the outgoing ones.
    pub fn raw_elem_string(&self) -> String {
        use std::fmt::Write;
        let mut s = String::new();
        let dims = self.dense_dims();
        let rows: usize = dims[..self.in_count].iter().product();
        let cols: usize = dims[self.in_count..].iter().product();
        let raw = self.raw_elem();
        for r in 0..rows {
            for c in 0..cols {
                let _ = write!(s, "{:10.3} ", raw[r * cols + c]);
            }
            s.push('\n');
        }
        s
    }
}

impl<T: Scalar + fmt::Display> fmt::Display for SymTensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "**************** {} ****************", self.name)?;
        let rows = self.in_count;
        let cols = self.bonds.len() - self.in_count;
        writeln!(f, "     ____________")?;
        writeln!(f, "    |            |")?;
        for i in 0..rows.max(cols) {
            let left = if i < rows {
                format!("{:>3}___{:<4}", self.labels[i], self.bonds[i].dim())
            } else {
                "         ".to_string()
            };
            let right = if i < cols {
                format!(
                    "{:>4}___{:<3}",
                    self.bonds[rows + i].dim(),
                    self.labels[rows + i]
                )
            } else {
                "         ".to_string()
            };
            writeln!(f, "{left}|            |{right}")?;
            writeln!(f, "    |            |")?;
        }
        writeln!(f, "    |____________|")?;
        writeln!(f)?;
        writeln!(f, "================BONDS===============")?;
        for b in &self.bonds {
            writeln!(f, "{b}")?;
        }
        writeln!(f, "===============BLOCKS===============")?;
        for (q, b) in &self.blocks {
            writeln!(f, "--- {}: {} x {} = {}", q, b.rows(), b.cols(), b.len())?;
            if self.has_elem() {
                write!(f, "{b}")?;
            }
        }
        writeln!(f, "Total elemNum: {}", self.elem_num())?;
        writeln!(f, "***************** END ****************")
    }
}
