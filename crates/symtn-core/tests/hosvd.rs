use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use symtn_core::{contract, Bond, BondKind, Qnum, SymTensor};

#[test]
fn test_hosvd_cube_reconstruction() {
    // 4x4x4 real random tensor, three modes, nothing fixed: the factors are
    // 4x4 orthogonal and the core reconstructs the input.
    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    let mut t = SymTensor::<f64>::new(vec![
        Bond::trivial(BondKind::In, 4),
        Bond::trivial(BondKind::Out, 4),
        Bond::trivial(BondKind::Out, 4),
    ])
    .unwrap();
    t.randomize(&mut rng);

    let (factors, core) = t.hosvd(3, 0).unwrap();
    assert_eq!(factors.len(), 3);
    assert_eq!(core.bond_num(), 3);
    assert_eq!(core.labels(), &[-1, -2, -3]);
    assert_eq!(core.in_bond_num(), 3);

    for (m, f) in factors.iter().enumerate() {
        assert_eq!(f.bond_num(), 2);
        assert_eq!(f.labels(), &[m as i32, -(m as i32 + 1)]);
        assert_eq!(f.bonds()[0].dim(), 4);
        assert_eq!(f.bonds()[1].dim(), 4);

        // Orthogonality: U^T U = I.
        let mut fdag = f.conj_transpose();
        fdag.set_label(&[-(m as i32 + 1), 100]).unwrap();
        let mut fr = f.clone();
        fr.set_label(&[101, -(m as i32 + 1)]).unwrap();
        let gram = contract(&fdag, &fr, false).unwrap();
        for i in 0..4 {
            for j in 0..4 {
                let expect = if i == j { 1.0 } else { 0.0 };
                assert!((gram.at(&[i, j]).unwrap() - expect).abs() < 1e-10);
            }
        }
    }

    // Reconstruct: contract each factor back into the core.
    let mut rec = core;
    for f in &factors {
        rec = contract(&rec, f, false).unwrap();
    }
    let rec = rec.permute(&[0, 1, 2], 1).unwrap();
    assert!(rec.similar(&t));

    let norm = t.norm();
    let diff = rec.add(&t.scaled(-1.0)).unwrap();
    assert!(diff.norm() <= 1e-10 * norm);
}

#[test]
fn test_hosvd_fixed_bonds_and_singulars() {
    let mut rng = ChaCha8Rng::seed_from_u64(77);
    let mut t = SymTensor::<f64>::new(vec![
        Bond::from_pairs(BondKind::In, &[(Qnum::u1(0), 2), (Qnum::u1(1), 1)]),
        Bond::from_pairs(BondKind::Out, &[(Qnum::u1(0), 2), (Qnum::u1(1), 1)]),
        Bond::from_pairs(BondKind::Out, &[(Qnum::u1(0), 2), (Qnum::u1(1), 1)]),
    ])
    .unwrap();
    t.randomize(&mut rng);

    // Two modes of one bond each, one fixed bond.
    let (factors, core, singulars) = t.hosvd_with_singulars(2, 1).unwrap();
    assert_eq!(factors.len(), 2);
    assert_eq!(core.bond_num(), 3);
    assert_eq!(core.labels(), &[-1, -2, 2]);
    assert_eq!(singulars.len(), 2);

    for ls in &singulars {
        // Singular values are per charge, ascending, non-negative.
        let charges: Vec<Qnum> = ls.keys().copied().collect();
        let mut sorted = charges.clone();
        sorted.sort();
        assert_eq!(charges, sorted);
        for s in ls.values() {
            assert!(s.is_diag());
            for v in s.diag_values() {
                assert!(v >= 0.0);
            }
        }
    }

    let mut rec = core;
    for f in &factors {
        rec = contract(&rec, f, false).unwrap();
    }
    let rec = rec.permute(&[0, 1, 2], 1).unwrap();
    let norm = t.norm();
    let diff = rec.add(&t.scaled(-1.0)).unwrap();
    assert!(diff.norm() <= 1e-10 * norm);
}

#[test]
fn test_hosvd_bad_split() {
    let t = SymTensor::<f64>::new(vec![
        Bond::trivial(BondKind::In, 2),
        Bond::trivial(BondKind::Out, 2),
        Bond::trivial(BondKind::Out, 2),
    ])
    .unwrap();
    assert!(t.hosvd(2, 0).is_err());
    assert!(t.hosvd(0, 0).is_err());
    assert!(t.hosvd(1, 3).is_err());
}
