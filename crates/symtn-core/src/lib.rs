//! Block-sparse symmetric tensors with abelian quantum numbers.
//!
//! Tensors whose bonds carry conserved charges decompose into a direct sum
//! of dense blocks, one per total charge. This crate stores only those
//! blocks and provides the index manipulations (permute, combine, partial
//! trace), block-wise linear algebra (contraction, SVD, HOSVD, norms) and
//! fermionic swap gates needed by tensor network algorithms.
//!
//! # Core types
//!
//! - [`Qnum`]: an abelian charge (U(1) × Z2 parity × Z2 fermionic parity)
//! - [`Bond`]: a directed tensor index with `(charge, degeneracy)` states
//! - [`Block`]: one dense (or diagonal) conserved sector
//! - [`SymTensor`]: the block-sparse tensor itself
//!
//! # Example
//!
//! ```
//! use symtn_core::{Bond, BondKind, Qnum, SymTensor, contract};
//!
//! // A 3x4 and a 4x5 matrix as rank-2 tensors sharing label 1.
//! let a_bonds = vec![
//!     Bond::trivial(BondKind::In, 3),
//!     Bond::trivial(BondKind::Out, 4),
//! ];
//! let b_bonds = vec![
//!     Bond::trivial(BondKind::In, 4),
//!     Bond::trivial(BondKind::Out, 5),
//! ];
//! let mut a = SymTensor::<f64>::with_labels(a_bonds, vec![0, 1]).unwrap();
//! let mut b = SymTensor::<f64>::with_labels(b_bonds, vec![1, 2]).unwrap();
//! a.set_raw_elem(&vec![1.0; 12]).unwrap();
//! b.set_raw_elem(&vec![1.0; 20]).unwrap();
//!
//! let c = contract(&a, &b, false).unwrap();
//! assert_eq!(c.labels(), &[0, 2]);
//! assert_eq!(c.at(&[0, 0]).unwrap(), 4.0);
//! ```

mod block;
mod bond;
mod error;
mod hosvd;
mod io;
mod layout;
mod qnum;
mod scalar;
mod tensor;

pub use block::Block;
pub use bond::{Bond, BondKind, BondState};
pub use error::{Result, TensorError};
pub use layout::blocked_elem_num;
pub use qnum::{Parity, Qnum};
pub use scalar::{Scalar, ScalarKind};
pub use tensor::{contract, otimes, profile, Swap, SymTensor, HAVE_BOND, HAVE_ELEM};
