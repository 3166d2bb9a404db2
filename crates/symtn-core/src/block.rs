//! Dense (or diagonal) matrix blocks.
//!
//! A [`Block`] is one conserved sector of a symmetric tensor: a plain
//! row-major matrix backed by mdarray, multiplied/decomposed through the
//! faer backend. Diagonal blocks store only `min(rows, cols)` entries and
//! expand transparently in mixed arithmetic.

use mdarray::{DSlice, DTensor};
use mdarray_linalg::matmul::{MatMul, MatMulBuilder};
use mdarray_linalg::qr::QR;
use mdarray_linalg::svd::{SVDDecomp, SVD};
use mdarray_linalg_faer::Faer;
use rand::Rng;

use crate::error::{Result, TensorError};
use crate::scalar::Scalar;

#[derive(Debug, Clone)]
enum Payload<T> {
    /// Row-major rows × cols matrix.
    Dense(DTensor<T, 2>),
    /// min(rows, cols) diagonal entries.
    Diag(Vec<T>),
}

/// A dense or diagonal matrix over [`Scalar`] elements.
#[derive(Debug, Clone)]
pub struct Block<T: Scalar> {
    rows: usize,
    cols: usize,
    payload: Payload<T>,
}

impl<T: Scalar + faer_traits::ComplexField> Block<T> {
    /// Zero-filled dense block.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            payload: Payload::Dense(DTensor::<T, 2>::from_elem([rows, cols], T::zero())),
        }
    }

    /// Dense block from a row-major vector.
    ///
    /// # Panics
    /// Panics if the data length does not match `rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            rows * cols,
            "data length {} does not match shape [{}, {}]",
            data.len(),
            rows,
            cols
        );
        let tensor = DTensor::<T, 2>::from_fn([rows, cols], |idx| data[idx[0] * cols + idx[1]]);
        Self {
            rows,
            cols,
            payload: Payload::Dense(tensor),
        }
    }

    /// Diagonal block; only the diagonal entries are stored.
    ///
    /// # Panics
    /// Panics if `values.len() != min(rows, cols)`.
    pub fn diagonal(rows: usize, cols: usize, values: Vec<T>) -> Self {
        assert_eq!(
            values.len(),
            rows.min(cols),
            "diagonal length {} does not match shape [{}, {}]",
            values.len(),
            rows,
            cols
        );
        Self {
            rows,
            cols,
            payload: Payload::Diag(values),
        }
    }

    pub fn from_tensor(tensor: DTensor<T, 2>) -> Self {
        let s = tensor.shape();
        let (rows, cols) = (s.0, s.1);
        Self {
            rows,
            cols,
            payload: Payload::Dense(tensor),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.rows, self.cols]
    }

    /// Number of dense elements (`rows * cols` regardless of storage).
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_diag(&self) -> bool {
        matches!(self.payload, Payload::Diag(_))
    }

    pub fn get(&self, i: usize, j: usize) -> T {
        match &self.payload {
            Payload::Dense(t) => t[[i, j]],
            Payload::Diag(d) => {
                if i == j && i < d.len() {
                    d[i]
                } else {
                    T::zero()
                }
            }
        }
    }

    /// Set one element. Diagonal storage is expanded first.
    pub fn set(&mut self, i: usize, j: usize, v: T) {
        if self.is_diag() {
            *self = self.to_dense();
        }
        match &mut self.payload {
            Payload::Dense(t) => t[[i, j]] = v,
            Payload::Diag(_) => unreachable!(),
        }
    }

    /// Expand to dense storage.
    pub fn to_dense(&self) -> Block<T> {
        match &self.payload {
            Payload::Dense(_) => self.clone(),
            Payload::Diag(d) => {
                let tensor = DTensor::<T, 2>::from_fn([self.rows, self.cols], |idx| {
                    if idx[0] == idx[1] {
                        d[idx[0]]
                    } else {
                        T::zero()
                    }
                });
                Block::from_tensor(tensor)
            }
        }
    }

    fn dense_tensor(&self) -> DTensor<T, 2> {
        match &self.payload {
            Payload::Dense(t) => t.clone(),
            Payload::Diag(_) => match self.to_dense().payload {
                Payload::Dense(t) => t,
                Payload::Diag(_) => unreachable!(),
            },
        }
    }

    /// Diagonal entries (length `min(rows, cols)`).
    pub fn diag_values(&self) -> Vec<T> {
        let k = self.rows.min(self.cols);
        match &self.payload {
            Payload::Dense(t) => (0..k).map(|i| t[[i, i]]).collect(),
            Payload::Diag(d) => d.clone(),
        }
    }

    /// Row-major dense export.
    pub fn to_vec(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.rows * self.cols);
        for i in 0..self.rows {
            for j in 0..self.cols {
                out.push(self.get(i, j));
            }
        }
        out
    }

    /// Matrix product `self * other`.
    ///
    /// Diagonal × dense scales rows, dense × diagonal scales columns, and
    /// two diagonal operands stay diagonal; everything else goes through the
    /// faer backend.
    ///
    /// # Panics
    /// Panics if the inner dimensions do not match.
    pub fn matmul(&self, other: &Block<T>) -> Block<T> {
        assert_eq!(
            self.cols, other.rows,
            "inner dimensions must match: [{}, {}] x [{}, {}]",
            self.rows, self.cols, other.rows, other.cols
        );
        match (&self.payload, &other.payload) {
            (Payload::Diag(a), Payload::Diag(b)) => {
                let k = self.rows.min(other.cols).min(self.cols);
                let values = (0..self.rows.min(other.cols))
                    .map(|i| {
                        if i < k {
                            a[i] * b[i]
                        } else {
                            T::zero()
                        }
                    })
                    .collect();
                Block::diagonal(self.rows, other.cols, values)
            }
            (Payload::Diag(a), Payload::Dense(b)) => {
                let tensor = DTensor::<T, 2>::from_fn([self.rows, other.cols], |idx| {
                    if idx[0] < a.len() {
                        a[idx[0]] * b[[idx[0], idx[1]]]
                    } else {
                        T::zero()
                    }
                });
                Block::from_tensor(tensor)
            }
            (Payload::Dense(a), Payload::Diag(b)) => {
                let tensor = DTensor::<T, 2>::from_fn([self.rows, other.cols], |idx| {
                    if idx[1] < b.len() {
                        a[[idx[0], idx[1]]] * b[idx[1]]
                    } else {
                        T::zero()
                    }
                });
                Block::from_tensor(tensor)
            }
            (Payload::Dense(a), Payload::Dense(b)) => {
                let lhs: &DSlice<T, 2> = a.as_ref();
                let rhs: &DSlice<T, 2> = b.as_ref();
                let tensor = Faer.matmul(lhs, rhs).eval();
                Block::from_tensor(tensor)
            }
        }
    }

    /// Thin singular value decomposition: `(U, S, V†)` with `U` rows × k,
    /// `S` a k × k diagonal block, `V†` k × cols, `k = min(rows, cols)`.
    pub fn svd(&self) -> Result<(Block<T>, Block<T>, Block<T>)> {
        let mut a = self.dense_tensor();
        let k = self.rows.min(self.cols);
        let a_slice: &mut DSlice<T, 2> = a.as_mut();
        let SVDDecomp { s, u, vt } = Faer
            .svd(a_slice)
            .map_err(|e| TensorError::Backend(format!("SVD failed: {e}")))?;

        // The backend stores the singular values in the first row of `s`
        // (LAPACK-style), not on the diagonal.
        let s_vals: Vec<T> = (0..k).map(|i| s[[0, i]]).collect();
        let u_thin = DTensor::<T, 2>::from_fn([self.rows, k], |idx| u[[idx[0], idx[1]]]);
        let vt_thin = DTensor::<T, 2>::from_fn([k, self.cols], |idx| vt[[idx[0], idx[1]]]);

        Ok((
            Block::from_tensor(u_thin),
            Block::diagonal(k, k, s_vals),
            Block::from_tensor(vt_thin),
        ))
    }

    /// Thin QR decomposition: `(Q, R)` with `Q` rows × k, `R` k × cols.
    pub fn qr(&self) -> Result<(Block<T>, Block<T>)> {
        let mut a = self.dense_tensor();
        let k = self.rows.min(self.cols);
        let a_slice: &mut DSlice<T, 2> = a.as_mut();
        let (q_full, r_full) = Faer.qr(a_slice);
        let q_thin = DTensor::<T, 2>::from_fn([self.rows, k], |idx| q_full[[idx[0], idx[1]]]);
        let r_thin = DTensor::<T, 2>::from_fn([k, self.cols], |idx| r_full[[idx[0], idx[1]]]);
        Ok((Block::from_tensor(q_thin), Block::from_tensor(r_thin)))
    }

    /// Trace of a square block.
    pub fn trace(&self) -> Result<T> {
        if self.rows != self.cols {
            return Err(TensorError::ShapeMismatch {
                expected: vec![self.rows, self.rows],
                actual: vec![self.rows, self.cols],
            });
        }
        Ok((0..self.rows).fold(T::zero(), |acc, i| acc + self.get(i, i)))
    }

    /// Frobenius norm.
    pub fn norm(&self) -> f64 {
        let sum: f64 = match &self.payload {
            Payload::Dense(_) => {
                let mut acc = 0.0;
                for i in 0..self.rows {
                    for j in 0..self.cols {
                        let a = self.get(i, j).abs_f64();
                        acc += a * a;
                    }
                }
                acc
            }
            Payload::Diag(d) => d.iter().map(|v| v.abs_f64() * v.abs_f64()).sum(),
        };
        sum.sqrt()
    }

    /// Largest real part.
    pub fn max(&self) -> f64 {
        let mut m = f64::NEG_INFINITY;
        match &self.payload {
            Payload::Dense(_) => {
                for i in 0..self.rows {
                    for j in 0..self.cols {
                        m = m.max(self.get(i, j).real_f64());
                    }
                }
            }
            Payload::Diag(d) => {
                for v in d {
                    m = m.max(v.real_f64());
                }
            }
        }
        m
    }

    /// Largest magnitude.
    pub fn abs_max(&self) -> f64 {
        let mut m = 0.0f64;
        match &self.payload {
            Payload::Dense(_) => {
                for i in 0..self.rows {
                    for j in 0..self.cols {
                        m = m.max(self.get(i, j).abs_f64());
                    }
                }
            }
            Payload::Diag(d) => {
                for v in d {
                    m = m.max(v.abs_f64());
                }
            }
        }
        m
    }

    /// Multiply every element by `alpha`.
    pub fn scale(&mut self, alpha: T) {
        match &mut self.payload {
            Payload::Dense(t) => {
                for i in 0..self.rows {
                    for j in 0..self.cols {
                        t[[i, j]] = t[[i, j]] * alpha;
                    }
                }
            }
            Payload::Diag(d) => {
                for v in d.iter_mut() {
                    *v = *v * alpha;
                }
            }
        }
    }

    /// Element-wise sum with a same-shaped block.
    ///
    /// # Panics
    /// Panics if the shapes differ.
    pub fn add(&self, other: &Block<T>) -> Block<T> {
        assert_eq!(self.shape(), other.shape(), "shape mismatch in block add");
        if let (Payload::Diag(a), Payload::Diag(b)) = (&self.payload, &other.payload) {
            let values = a.iter().zip(b).map(|(x, y)| *x + *y).collect();
            return Block::diagonal(self.rows, self.cols, values);
        }
        let tensor = DTensor::<T, 2>::from_fn([self.rows, self.cols], |idx| {
            self.get(idx[0], idx[1]) + other.get(idx[0], idx[1])
        });
        Block::from_tensor(tensor)
    }

    pub fn transpose(&self) -> Block<T> {
        match &self.payload {
            Payload::Diag(d) => Block::diagonal(self.cols, self.rows, d.clone()),
            Payload::Dense(t) => {
                let tensor =
                    DTensor::<T, 2>::from_fn([self.cols, self.rows], |idx| t[[idx[1], idx[0]]]);
                Block::from_tensor(tensor)
            }
        }
    }

    pub fn conj(&self) -> Block<T> {
        match &self.payload {
            Payload::Diag(d) => {
                Block::diagonal(self.rows, self.cols, d.iter().map(|v| v.conj_val()).collect())
            }
            Payload::Dense(t) => {
                let tensor = DTensor::<T, 2>::from_fn([self.rows, self.cols], |idx| {
                    t[[idx[0], idx[1]]].conj_val()
                });
                Block::from_tensor(tensor)
            }
        }
    }

    /// Overwrite with zeros.
    pub fn fill_zero(&mut self) {
        *self = Block::zeros(self.rows, self.cols);
    }

    /// Set the diagonal to one and everything else to zero.
    pub fn set_identity(&mut self) {
        let tensor = DTensor::<T, 2>::from_fn([self.rows, self.cols], |idx| {
            if idx[0] == idx[1] {
                T::one()
            } else {
                T::zero()
            }
        });
        *self = Block::from_tensor(tensor);
    }

    /// Fill with values uniform in [0, 1).
    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut data = Vec::with_capacity(self.rows * self.cols);
        for _ in 0..self.rows * self.cols {
            data.push(T::random(rng));
        }
        *self = Block::from_vec(self.rows, self.cols, data);
    }

    /// Fill with random orthonormal rows (if rows < cols) or columns.
    pub fn ortho_rand<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        if self.rows >= self.cols {
            let mut seed = Block::zeros(self.rows, self.cols);
            seed.randomize(rng);
            let (q, _r) = seed.qr()?;
            *self = q;
        } else {
            let mut seed = Block::zeros(self.cols, self.rows);
            seed.randomize(rng);
            let (q, _r) = seed.qr()?;
            *self = q.transpose();
        }
        Ok(())
    }

    /// Exact element-wise comparison.
    pub fn elem_eq(&self, other: &Block<T>) -> bool {
        if self.shape() != other.shape() {
            return false;
        }
        for i in 0..self.rows {
            for j in 0..self.cols {
                if self.get(i, j) != other.get(i, j) {
                    return false;
                }
            }
        }
        true
    }
}

impl<T: Scalar> PartialEq for Block<T> {
    fn eq(&self, other: &Self) -> bool {
        self.elem_eq(other)
    }
}

impl<T: Scalar + std::fmt::Display> std::fmt::Display for Block<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for i in 0..self.rows {
            for j in 0..self.cols {
                write!(f, "{:10.3} ", self.get(i, j))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_matmul_dense() {
        let a = Block::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = Block::from_vec(3, 2, vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
        let c = a.matmul(&b);
        assert_eq!(c.shape(), [2, 2]);
        assert!((c.get(0, 0) - 58.0).abs() < 1e-12);
        assert!((c.get(0, 1) - 64.0).abs() < 1e-12);
        assert!((c.get(1, 0) - 139.0).abs() < 1e-12);
        assert!((c.get(1, 1) - 154.0).abs() < 1e-12);
    }

    #[test]
    fn test_matmul_diag_mixed() {
        let d = Block::diagonal(2, 2, vec![2.0, 3.0]);
        let a = Block::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]);

        let da = d.matmul(&a);
        assert!(!da.is_diag());
        assert_eq!(da.to_vec(), vec![2.0, 4.0, 9.0, 12.0]);

        let ad = a.matmul(&d);
        assert_eq!(ad.to_vec(), vec![2.0, 6.0, 6.0, 12.0]);

        let dd = d.matmul(&d);
        assert!(dd.is_diag());
        assert_eq!(dd.diag_values(), vec![4.0, 9.0]);
    }

    #[test]
    fn test_svd_reconstructs() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut a = Block::<f64>::zeros(4, 3);
        a.randomize(&mut rng);

        let (u, s, vt) = a.svd().unwrap();
        assert_eq!(u.shape(), [4, 3]);
        assert_eq!(s.shape(), [3, 3]);
        assert!(s.is_diag());
        assert_eq!(vt.shape(), [3, 3]);

        let rec = u.matmul(&s).matmul(&vt);
        for i in 0..4 {
            for j in 0..3 {
                assert!((rec.get(i, j) - a.get(i, j)).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn test_qr_orthonormal_columns() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut a = Block::<f64>::zeros(5, 3);
        a.randomize(&mut rng);

        let (q, r) = a.qr().unwrap();
        assert_eq!(q.shape(), [5, 3]);
        assert_eq!(r.shape(), [3, 3]);

        let qtq = q.transpose().matmul(&q);
        for i in 0..3 {
            for j in 0..3 {
                let expect = if i == j { 1.0 } else { 0.0 };
                assert!((qtq.get(i, j) - expect).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn test_trace_norm() {
        let a = Block::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(a.trace().unwrap(), 5.0);
        assert!((a.norm() - (30.0f64).sqrt()).abs() < 1e-12);
        assert_eq!(a.max(), 4.0);
        assert_eq!(a.abs_max(), 4.0);

        let rect = Block::<f64>::zeros(2, 3);
        assert!(rect.trace().is_err());
    }

    #[test]
    fn test_complex_conj_transpose() {
        let a = Block::from_vec(
            1,
            2,
            vec![Complex64::new(1.0, 2.0), Complex64::new(3.0, -4.0)],
        );
        let at = a.transpose().conj();
        assert_eq!(at.shape(), [2, 1]);
        assert_eq!(at.get(0, 0), Complex64::new(1.0, -2.0));
        assert_eq!(at.get(1, 0), Complex64::new(3.0, 4.0));
    }

    #[test]
    fn test_ortho_rand_rows() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut a = Block::<f64>::zeros(2, 4);
        a.ortho_rand(&mut rng).unwrap();

        // Rows are orthonormal when rows < cols.
        let aat = a.matmul(&a.transpose());
        for i in 0..2 {
            for j in 0..2 {
                let expect = if i == j { 1.0 } else { 0.0 };
                assert!((aat.get(i, j) - expect).abs() < 1e-10);
            }
        }
    }
}
