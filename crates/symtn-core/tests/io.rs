use num_complex::Complex64;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use symtn_core::{Bond, BondKind, Parity, Qnum, SymTensor, TensorError};

fn temp_path(name: &str) -> std::path::PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("symtn-io-{}-{}", std::process::id(), name));
    p
}

#[test]
fn test_save_load_round_trip_real() {
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let mut t = SymTensor::<f64>::with_labels(
        vec![
            Bond::from_pairs(
                BondKind::In,
                &[(Qnum::u1(1), 2), (Qnum::u1(0), 1), (Qnum::u1(-1), 2)],
            ),
            Bond::from_pairs(BondKind::Out, &[(Qnum::u1(1), 2), (Qnum::u1(0), 3)]),
            Bond::from_pairs(BondKind::Out, &[(Qnum::u1(0), 1), (Qnum::u1(-1), 1)]),
        ],
        vec![4, -2, 9],
    )
    .unwrap();
    t.randomize(&mut rng);
    t.set_name("demo");

    let path = temp_path("real.sym");
    t.save(&path).unwrap();
    let loaded = SymTensor::<f64>::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert!(loaded.elem_cmp(&t));
    assert_eq!(loaded.labels(), t.labels());
    assert_eq!(loaded.name(), "demo");
    assert_eq!(loaded.status(), t.status());
}

#[test]
fn test_save_load_round_trip_complex_fermionic() {
    let mut rng = ChaCha8Rng::seed_from_u64(2);
    let f = |kind| {
        Bond::from_pairs(
            kind,
            &[
                (Qnum::new(0, Parity::Even, Parity::Even), 1),
                (Qnum::new(1, Parity::Odd, Parity::Odd), 2),
            ],
        )
    };
    let mut t = SymTensor::<Complex64>::new(vec![f(BondKind::In), f(BondKind::Out)]).unwrap();
    t.randomize(&mut rng);

    let path = temp_path("complex.sym");
    t.save(&path).unwrap();
    let loaded = SymTensor::<Complex64>::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert!(loaded.elem_cmp(&t));
}

#[test]
fn test_load_without_elements() {
    let t = SymTensor::<f64>::new(vec![
        Bond::trivial(BondKind::In, 2),
        Bond::trivial(BondKind::Out, 2),
    ])
    .unwrap();
    assert!(!t.has_elem());

    let path = temp_path("empty.sym");
    t.save(&path).unwrap();
    let loaded = SymTensor::<f64>::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert!(!loaded.has_elem());
    assert!(loaded.similar(&t));
}

#[test]
fn test_load_scalar_kind_mismatch() {
    let mut t = SymTensor::<f64>::new(vec![
        Bond::trivial(BondKind::In, 2),
        Bond::trivial(BondKind::Out, 2),
    ])
    .unwrap();
    t.identity();

    let path = temp_path("kind.sym");
    t.save(&path).unwrap();
    let err = SymTensor::<Complex64>::load(&path);
    std::fs::remove_file(&path).unwrap();

    assert!(matches!(
        err,
        Err(TensorError::ScalarKindMismatch { .. })
    ));
}

#[test]
fn test_load_rejects_garbage() {
    let path = temp_path("garbage.sym");
    std::fs::write(&path, b"not a tensor file at all").unwrap();
    let err = SymTensor::<f64>::load(&path);
    std::fs::remove_file(&path).unwrap();
    assert!(matches!(err, Err(TensorError::Format(_))));
}
