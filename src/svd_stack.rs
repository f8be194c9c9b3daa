//! UDV stack of a matrix product: `U * D * V^T = ... A_2 * A_1 * A_0`.
//!
//! Long products of time-slice propagators have singular values spanning
//! many orders of magnitude. Each push re-factorizes the running product so
//! that the scales stay on the diagonal, separated from the mixing rotations.

use nalgebra::{DMatrix, DVector, SVD};

/// One factorization `U * diag(sigma) * V^T`.
#[derive(Clone, Debug)]
struct SvdFactor {
    u: DMatrix<f64>,
    sigma: DVector<f64>,
    v: DMatrix<f64>,
}

/// Stack of SVD factorizations representing a cumulative matrix product.
///
/// `pop` only shortens the logical length; a later `push` overwrites the
/// abandoned slot, so no reallocation happens during a sweep.
#[derive(Clone, Debug)]
pub struct SvdStack {
    n: usize,
    capacity: usize,
    factors: Vec<SvdFactor>,
    len: usize,
}

impl SvdStack {
    pub fn new(n: usize, l: usize) -> Self {
        Self {
            n,
            capacity: l,
            factors: Vec::with_capacity(l),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    /// Prepend a matrix to the decomposition.
    pub fn push(&mut self, m: &DMatrix<f64>) {
        assert_eq!(m.nrows(), self.n, "pushed matrix has wrong row count");
        assert_eq!(m.ncols(), self.n, "pushed matrix has wrong column count");
        assert!(
            self.len < self.capacity,
            "SvdStack overflow: capacity {}",
            self.capacity
        );

        let target = if self.len == 0 {
            m.clone()
        } else {
            // Mind the multiplication order: the running scales must be
            // applied last so they never mix into the new rotations.
            (m * self.matrix_u()) * DMatrix::from_diagonal(self.singular_values())
        };
        let svd = SVD::new(target, true, true);
        let factor = SvdFactor {
            u: svd.u.expect("SVD computed with U"),
            sigma: svd.singular_values,
            v: svd.v_t.expect("SVD computed with V").transpose(),
        };
        if self.len < self.factors.len() {
            self.factors[self.len] = factor;
        } else {
            self.factors.push(factor);
        }
        self.len += 1;
    }

    pub fn pop(&mut self) {
        assert!(self.len > 0, "pop from empty SvdStack");
        self.len -= 1;
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn resize(&mut self, n: usize, l: usize) {
        *self = SvdStack::new(n, l);
    }

    /// Singular values of the cumulative product.
    pub fn singular_values(&self) -> &DVector<f64> {
        assert!(self.len > 0);
        &self.factors[self.len - 1].sigma
    }

    pub fn matrix_u(&self) -> &DMatrix<f64> {
        assert!(self.len > 0);
        &self.factors[self.len - 1].u
    }

    /// Cumulative product `V_0 * V_1 * ... * V_top` of all pushed V factors.
    pub fn matrix_v(&self) -> DMatrix<f64> {
        assert!(self.len > 0);
        let mut v = self.factors[0].v.clone();
        for factor in &self.factors[1..self.len] {
            v = v * &factor.v;
        }
        v
    }
}
