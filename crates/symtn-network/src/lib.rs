//! Contraction planner and executor for symmetric tensor networks.
//!
//! A [`Network`] is parsed from a line-oriented spec (or built in memory),
//! bound to concrete [`symtn_core::SymTensor`]s, and contracted along a
//! greedily chosen binary tree that minimises intermediate storage. The
//! tree is cached across launches; fermionic swap gates are inserted
//! automatically where contracted index lines cross free ones.
//!
//! # Example
//!
//! ```
//! use symtn_core::{Bond, BondKind, SymTensor};
//! use symtn_network::Network;
//!
//! let mut net = Network::<f64>::from_parts(vec![
//!     ("A".to_string(), vec![1, 2], 1),
//!     ("B".to_string(), vec![2, 3], 1),
//!     ("TOUT".to_string(), vec![1, 3], 1),
//! ])
//! .unwrap();
//!
//! let mut a = SymTensor::<f64>::new(vec![
//!     Bond::trivial(BondKind::In, 2),
//!     Bond::trivial(BondKind::Out, 3),
//! ])
//! .unwrap();
//! a.identity();
//! let mut b = SymTensor::<f64>::new(vec![
//!     Bond::trivial(BondKind::In, 3),
//!     Bond::trivial(BondKind::Out, 2),
//! ])
//! .unwrap();
//! b.identity();
//!
//! net.put_tensor("A", &a, false).unwrap();
//! net.put_tensor("B", &b, false).unwrap();
//! let c = net.launch("C").unwrap();
//! assert_eq!(c.labels(), &[1, 3]);
//! ```

mod error;
mod network;
mod node;
mod parser;

pub use error::{NetworkError, Result};
pub use network::Network;
