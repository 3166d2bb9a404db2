use num_complex::Complex64;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use symtn_core::{contract, otimes, Bond, BondKind, Parity, Qnum, SymTensor, TensorError};

#[test]
fn test_matrix_product_trivial_charge() {
    // Two rank-2 trivial-charge tensors, 3x4 and 4x5, sharing label 1.
    let mut a = SymTensor::<f64>::with_labels(
        vec![Bond::trivial(BondKind::In, 3), Bond::trivial(BondKind::Out, 4)],
        vec![0, 1],
    )
    .unwrap();
    let mut b = SymTensor::<f64>::with_labels(
        vec![Bond::trivial(BondKind::In, 4), Bond::trivial(BondKind::Out, 5)],
        vec![1, 2],
    )
    .unwrap();
    let raw_a: Vec<f64> = (0..12).map(|i| i as f64).collect();
    let raw_b: Vec<f64> = (0..20).map(|i| (i as f64) * 0.5 - 3.0).collect();
    a.set_raw_elem(&raw_a).unwrap();
    b.set_raw_elem(&raw_b).unwrap();

    let c = contract(&a, &b, false).unwrap();
    assert_eq!(c.bond_num(), 2);
    assert_eq!(c.labels(), &[0, 2]);
    assert_eq!(c.in_bond_num(), 1);
    assert_eq!(c.bonds()[0].dim(), 3);
    assert_eq!(c.bonds()[1].dim(), 5);

    for i in 0..3 {
        for k in 0..5 {
            let expect: f64 = (0..4).map(|j| raw_a[i * 4 + j] * raw_b[j * 5 + k]).sum();
            assert!((c.at(&[i, k]).unwrap() - expect).abs() < 1e-12);
        }
    }
}

#[test]
fn test_contract_with_adjoint_gives_norm_squared() {
    // Z2-symmetric rank-4 tensor contracted with its adjoint over every
    // bond: the result is the sum of squared magnitudes.
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    let z2 = |kind| {
        Bond::from_pairs(
            kind,
            &[
                (Qnum::new(0, Parity::Even, Parity::Even), 2),
                (Qnum::new(0, Parity::Odd, Parity::Even), 2),
            ],
        )
    };
    let mut a = SymTensor::<Complex64>::new(vec![
        z2(BondKind::In),
        z2(BondKind::In),
        z2(BondKind::Out),
        z2(BondKind::Out),
    ])
    .unwrap();
    a.randomize(&mut rng);

    let adj = a.conj_transpose();
    let s = contract(&a, &adj, false).unwrap();
    assert_eq!(s.bond_num(), 0);

    let norm2 = a.norm() * a.norm();
    let val = s.scalar_value().unwrap();
    assert!((val.re - norm2).abs() < 1e-10 * norm2.max(1.0));
    assert!(val.im.abs() < 1e-10 * norm2.max(1.0));
}

#[test]
fn test_contract_commutes_up_to_label_order() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let u1 = |kind, pairs: &[(i32, usize)]| {
        Bond::from_pairs(
            kind,
            &pairs
                .iter()
                .map(|&(q, d)| (Qnum::u1(q), d))
                .collect::<Vec<_>>(),
        )
    };
    let mut a = SymTensor::<f64>::with_labels(
        vec![
            u1(BondKind::In, &[(0, 2), (1, 1)]),
            u1(BondKind::Out, &[(0, 1), (1, 2)]),
            u1(BondKind::Out, &[(0, 2), (1, 1)]),
        ],
        vec![10, 20, 30],
    )
    .unwrap();
    let mut b = SymTensor::<f64>::with_labels(
        vec![
            u1(BondKind::In, &[(0, 1), (1, 2)]),
            u1(BondKind::Out, &[(0, 2), (-1, 1)]),
        ],
        vec![20, 40],
    )
    .unwrap();
    a.randomize(&mut rng);
    b.randomize(&mut rng);

    let ab = contract(&a, &b, false).unwrap();
    let ba = contract(&b, &a, false).unwrap();
    assert_eq!(ab.labels(), &[10, 30, 40]);

    let ba_aligned = ba.permute(ab.labels(), ab.in_bond_num()).unwrap();
    let raw_ab = ab.raw_elem();
    let raw_ba = ba_aligned.raw_elem();
    assert_eq!(raw_ab.len(), raw_ba.len());
    for i in 0..raw_ab.len() {
        assert!((raw_ab[i] - raw_ba[i]).abs() < 1e-12);
    }
}

#[test]
fn test_contract_bond_mismatch() {
    let a = SymTensor::<f64>::with_labels(
        vec![Bond::trivial(BondKind::In, 3), Bond::trivial(BondKind::Out, 4)],
        vec![0, 1],
    )
    .unwrap();
    // Same label, same direction: not contractible.
    let b = SymTensor::<f64>::with_labels(
        vec![Bond::trivial(BondKind::In, 4), Bond::trivial(BondKind::Out, 5)],
        vec![2, 1],
    )
    .unwrap();
    assert!(matches!(
        contract(&a, &b, false),
        Err(TensorError::BondMismatch(_))
    ));

    // Same label, right direction, wrong dimension.
    let c = SymTensor::<f64>::with_labels(
        vec![Bond::trivial(BondKind::In, 7), Bond::trivial(BondKind::Out, 5)],
        vec![1, 2],
    )
    .unwrap();
    assert!(matches!(
        contract(&a, &c, false),
        Err(TensorError::BondMismatch(_))
    ));
}

#[test]
fn test_contract_fast_skips_back_permute() {
    let mut a = SymTensor::<f64>::with_labels(
        vec![Bond::trivial(BondKind::In, 3), Bond::trivial(BondKind::Out, 2)],
        vec![6, 5],
    )
    .unwrap();
    let mut b = SymTensor::<f64>::with_labels(
        vec![Bond::trivial(BondKind::In, 2), Bond::trivial(BondKind::Out, 4)],
        vec![5, 7],
    )
    .unwrap();
    a.identity();
    b.identity();

    let fast = contract(&a, &b, true).unwrap();
    let slow = contract(&a, &b, false).unwrap();
    // Here the internal order coincides with the appearance order.
    assert_eq!(fast.labels(), slow.labels());
    assert!((fast.norm() - slow.norm()).abs() < 1e-12);
}

#[test]
fn test_otimes_dimensions_and_norm() {
    let mut rng = ChaCha8Rng::seed_from_u64(8);
    let mut a = SymTensor::<f64>::new(vec![
        Bond::from_pairs(BondKind::In, &[(Qnum::u1(0), 1), (Qnum::u1(1), 1)]),
        Bond::from_pairs(BondKind::Out, &[(Qnum::u1(0), 1), (Qnum::u1(1), 1)]),
    ])
    .unwrap();
    let mut b = SymTensor::<f64>::new(vec![
        Bond::trivial(BondKind::In, 3),
        Bond::trivial(BondKind::Out, 2),
    ])
    .unwrap();
    a.randomize(&mut rng);
    b.randomize(&mut rng);

    let p = otimes(&a, &b).unwrap();
    assert_eq!(p.bond_num(), 4);
    assert_eq!(p.labels(), &[0, 1, 2, 3]);
    assert_eq!(p.elem_num(), a.elem_num() * b.elem_num());
    assert!((p.norm() - a.norm() * b.norm()).abs() < 1e-10);
}

#[test]
fn test_mul_operator_contracts() {
    let mut a = SymTensor::<f64>::with_labels(
        vec![Bond::trivial(BondKind::In, 2), Bond::trivial(BondKind::Out, 2)],
        vec![0, 1],
    )
    .unwrap();
    let mut b = SymTensor::<f64>::with_labels(
        vec![Bond::trivial(BondKind::In, 2), Bond::trivial(BondKind::Out, 2)],
        vec![1, 2],
    )
    .unwrap();
    a.identity();
    b.identity();

    let c = &a * &b;
    assert_eq!(c.labels(), &[0, 2]);
    assert!((c.trace().unwrap() - 2.0).abs() < 1e-12);
}

#[test]
fn test_contract_scalar_operand() {
    let s = SymTensor::from_scalar(3.0);
    let mut a = SymTensor::<f64>::new(vec![
        Bond::trivial(BondKind::In, 2),
        Bond::trivial(BondKind::Out, 2),
    ])
    .unwrap();
    a.identity();

    let c = contract(&s, &a, false).unwrap();
    assert!((c.trace().unwrap() - 6.0).abs() < 1e-12);
}
