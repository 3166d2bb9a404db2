//! Higher-order singular value decomposition.

use std::collections::BTreeMap;

use crate::block::Block;
use crate::bond::{Bond, BondKind, BondState};
use crate::error::{Result, TensorError};
use crate::qnum::Qnum;
use crate::scalar::Scalar;
use crate::tensor::{contract, SymTensor};

impl<T: Scalar> SymTensor<T> {
    /// Higher-order SVD into `mode_count` factors and a core tensor.
    ///
    /// The first `mode_count * k` bonds are split into `mode_count` groups
    /// of `k = (bond_num - fixed_count) / mode_count` bonds; the trailing
    /// `fixed_count` bonds stay untouched. Factor `m` carries its group
    /// bonds plus a fresh bond labelled `-(m + 1)` holding the left singular
    /// vectors of the mode-`m` unfolding; the core is the input with every
    /// factor adjoint contracted in, labelled `-1..-mode_count` followed by
    /// the fixed labels.
    pub fn hosvd(
        &self,
        mode_count: usize,
        fixed_count: usize,
    ) -> Result<(Vec<SymTensor<T>>, SymTensor<T>)> {
        let (factors, core, _) = self.hosvd_impl(mode_count, fixed_count, false)?;
        Ok((factors, core))
    }

    /// Like [`hosvd`](Self::hosvd), also returning each mode's singular
    /// values as per-charge diagonal matrices in ascending charge order.
    pub fn hosvd_with_singulars(
        &self,
        mode_count: usize,
        fixed_count: usize,
    ) -> Result<(
        Vec<SymTensor<T>>,
        SymTensor<T>,
        Vec<BTreeMap<Qnum, Block<T>>>,
    )> {
        self.hosvd_impl(mode_count, fixed_count, true)
    }

    fn hosvd_impl(
        &self,
        mode_count: usize,
        fixed_count: usize,
        return_singulars: bool,
    ) -> Result<(
        Vec<SymTensor<T>>,
        SymTensor<T>,
        Vec<BTreeMap<Qnum, Block<T>>>,
    )> {
        let n = self.bond_num();
        if mode_count == 0 || fixed_count >= n || (n - fixed_count) % mode_count != 0 {
            return Err(TensorError::LabelError(format!(
                "cannot split {n} bonds into {mode_count} modes with {fixed_count} fixed"
            )));
        }
        let k = (n - fixed_count) / mode_count;

        // Work on the all-incoming form so every group unfolds as rows with
        // a consistent charge convention; the caller recovers the original
        // split with one permute of the reconstruction.
        let base = self.permute(&self.labels().to_vec(), n)?;
        let labels = base.labels().to_vec();

        let mut factors = Vec::with_capacity(mode_count);
        let mut singulars = Vec::new();
        for m in 0..mode_count {
            let group: Vec<i32> = labels[m * k..(m + 1) * k].to_vec();
            let mut order = group.clone();
            order.extend(labels.iter().copied().filter(|l| !group.contains(l)));
            let unfolded = base.permute(&order, k)?;

            let sv_states: Vec<BondState> = unfolded
                .blocks()
                .map(|(q, b)| BondState::new(*q, b.rows().min(b.cols())))
                .collect();
            let mut u_bonds: Vec<Bond> = unfolded.bonds()[..k].to_vec();
            u_bonds.push(Bond::new(BondKind::Out, sv_states));
            let mut u_labels = group.clone();
            u_labels.push(-(m as i32 + 1));

            let mut u = SymTensor::with_labels(u_bonds, u_labels)?;
            let mut ls = BTreeMap::new();
            for (q, blk) in unfolded.blocks() {
                let (uq, sq, _vt) = blk.svd()?;
                u.put_block(*q, &uq, false)?;
                if return_singulars {
                    ls.insert(*q, sq);
                }
            }
            factors.push(u);
            if return_singulars {
                singulars.push(ls);
            }
        }

        let mut core = base;
        for u in &factors {
            core = contract(&core, &u.conj_transpose(), false)?;
        }
        let mut core_order: Vec<i32> = (1..=mode_count as i32).map(|m| -m).collect();
        core_order.extend_from_slice(&labels[n - fixed_count..]);
        let core = core.permute(&core_order, mode_count)?;

        Ok((factors, core, singulars))
    }
}
