//! Scalar trait for generic block operations.
//!
//! Abstracts over `f64` and `Complex64` so the block and tensor layers are
//! written once; the faer backend bounds (`ComplexField`) ride along so
//! matrix multiply, SVD and QR are available for both element types.

use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

use faer_traits::ComplexField;
use num_complex::{Complex64, ComplexFloat};
use num_traits::{MulAdd, One, Zero};
use rand::Rng;

/// Runtime tag for the element type of a tensor, used at serialisation
/// boundaries where the type parameter is not yet known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Real,
    Complex,
}

impl ScalarKind {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            ScalarKind::Real => 0,
            ScalarKind::Complex => 1,
        }
    }

    pub(crate) fn from_byte(b: u8) -> Option<ScalarKind> {
        match b {
            0 => Some(ScalarKind::Real),
            1 => Some(ScalarKind::Complex),
            _ => None,
        }
    }
}

/// Trait for scalar types stored in tensor blocks.
///
/// Provides the minimal interface needed by block operations, including the
/// bounds required by the faer linear algebra backend.
pub trait Scalar:
    Clone
    + Copy
    + Debug
    + Default
    + PartialEq
    + Zero
    + One
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + ComplexFloat
    + ComplexField
    + MulAdd<Output = Self>
    + From<<Self as ComplexFloat>::Real>
    + Send
    + Sync
    + 'static
{
    /// The runtime tag for this element type.
    const KIND: ScalarKind;

    /// Create a scalar from f64.
    fn from_f64(val: f64) -> Self;

    /// Create a scalar from real and imaginary parts (the imaginary part is
    /// dropped for real types).
    fn from_components(re: f64, im: f64) -> Self;

    /// Decompose into (real, imaginary) parts.
    fn components(&self) -> (f64, f64);

    /// Get the real part as f64.
    fn real_f64(&self) -> f64;

    /// Get the magnitude as f64.
    fn abs_f64(&self) -> f64;

    /// Complex conjugate (identity for real types).
    fn conj_val(&self) -> Self;

    /// Draw a value with each component uniform in [0, 1).
    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self;
}

impl Scalar for f64 {
    const KIND: ScalarKind = ScalarKind::Real;

    fn from_f64(val: f64) -> Self {
        val
    }

    fn from_components(re: f64, _im: f64) -> Self {
        re
    }

    fn components(&self) -> (f64, f64) {
        (*self, 0.0)
    }

    fn real_f64(&self) -> f64 {
        *self
    }

    fn abs_f64(&self) -> f64 {
        f64::abs(*self)
    }

    fn conj_val(&self) -> Self {
        *self
    }

    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        rng.gen::<f64>()
    }
}

impl Scalar for Complex64 {
    const KIND: ScalarKind = ScalarKind::Complex;

    fn from_f64(val: f64) -> Self {
        Complex64::new(val, 0.0)
    }

    fn from_components(re: f64, im: f64) -> Self {
        Complex64::new(re, im)
    }

    fn components(&self) -> (f64, f64) {
        (self.re, self.im)
    }

    fn real_f64(&self) -> f64 {
        self.re
    }

    fn abs_f64(&self) -> f64 {
        self.norm()
    }

    fn conj_val(&self) -> Self {
        Complex64::new(self.re, -self.im)
    }

    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Complex64::new(rng.gen::<f64>(), rng.gen::<f64>())
    }
}
