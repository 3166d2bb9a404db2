//! Contract a ring of four U(1)-symmetric tensors down to a scalar.
//!
//! Run with: cargo run --example ring

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use symtn_core::{Bond, BondKind, Qnum, SymTensor};
use symtn_network::Network;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bond = |kind| {
        Bond::from_pairs(
            kind,
            &[(Qnum::u1(1), 1), (Qnum::u1(0), 2), (Qnum::u1(-1), 1)],
        )
    };

    let mut net = Network::<f64>::from_parts(vec![
        ("T0".to_string(), vec![0, 1], 1),
        ("T1".to_string(), vec![1, 2], 1),
        ("T2".to_string(), vec![2, 3], 1),
        ("T3".to_string(), vec![3, 0], 1),
    ])?;

    let mut rng = ChaCha8Rng::seed_from_u64(1);
    for name in ["T0", "T1", "T2", "T3"] {
        let mut t = SymTensor::<f64>::new(vec![bond(BondKind::In), bond(BondKind::Out)])?;
        t.randomize(&mut rng);
        t.set_name(name);
        net.put_tensor(name, &t, false)?;
    }

    let result = net.launch("ring")?;
    println!("{net}");
    println!("ring value = {:.6}", result.scalar_value()?);
    println!("{}", symtn_core::profile());
    Ok(())
}
