//! Single-slice propagator operators.
//!
//! Each time slice `l` defines, per spin channel `sigma`,
//! `B_l = exp(-dtau K) * exp(sigma * alpha * diag(s(:, l-1)) + dtau * mu)`.
//! The hopping exponential is dense and precomputed once from the symmetric
//! eigendecomposition of `K`; the interaction factor is diagonal and built
//! per call from the field column.

use nalgebra::{DMatrix, DVector, SymmetricEigen};

use super::lattice::SquareLattice;

/// Applies `B_l`, its inverse and its transpose from either side, in place.
#[derive(Clone, Debug)]
pub struct Propagator {
    exp_k: DMatrix<f64>,
    inv_exp_k: DMatrix<f64>,
    alpha: f64,
    dtau_mu: f64,
    u_is_attractive: bool,
}

fn sym_exp(q: &DMatrix<f64>, lambda: &DVector<f64>, scale: f64) -> DMatrix<f64> {
    let exp_lambda = lambda.map(|v| (scale * v).exp());
    q * DMatrix::from_diagonal(&exp_lambda) * q.transpose()
}

impl Propagator {
    pub fn new(
        lattice: &SquareLattice,
        t: f64,
        dtau: f64,
        mu: f64,
        alpha: f64,
        u_is_attractive: bool,
    ) -> Self {
        let eig = SymmetricEigen::new(lattice.hopping_matrix(t));
        Self {
            exp_k: sym_exp(&eig.eigenvectors, &eig.eigenvalues, -dtau),
            inv_exp_k: sym_exp(&eig.eigenvectors, &eig.eigenvalues, dtau),
            alpha,
            dtau_mu: dtau * mu,
            u_is_attractive,
        }
    }

    /// Diagonal of `exp(sigma * alpha * s + dtau * mu)` for one field column.
    ///
    /// In the attractive case both spin channels couple with `+alpha`.
    fn interaction_diag(&self, s: &DVector<f64>, sigma: i32) -> Vec<f64> {
        let coupling = if self.u_is_attractive {
            1.0
        } else {
            f64::from(sigma)
        };
        s.iter()
            .map(|&si| (coupling * self.alpha * si + self.dtau_mu).exp())
            .collect()
    }

    /// `M <- B_l M`
    pub fn mult_b_from_left(&self, m: &mut DMatrix<f64>, s: &DVector<f64>, sigma: i32) {
        for (i, d) in self.interaction_diag(s, sigma).into_iter().enumerate() {
            m.row_mut(i).scale_mut(d);
        }
        *m = &self.exp_k * &*m;
    }

    /// `M <- M B_l`
    pub fn mult_b_from_right(&self, m: &mut DMatrix<f64>, s: &DVector<f64>, sigma: i32) {
        *m = &*m * &self.exp_k;
        for (j, d) in self.interaction_diag(s, sigma).into_iter().enumerate() {
            m.column_mut(j).scale_mut(d);
        }
    }

    /// `M <- B_l^{-1} M`
    pub fn mult_inv_b_from_left(&self, m: &mut DMatrix<f64>, s: &DVector<f64>, sigma: i32) {
        *m = &self.inv_exp_k * &*m;
        for (i, d) in self.interaction_diag(s, sigma).into_iter().enumerate() {
            m.row_mut(i).scale_mut(1.0 / d);
        }
    }

    /// `M <- M B_l^{-1}`
    pub fn mult_inv_b_from_right(&self, m: &mut DMatrix<f64>, s: &DVector<f64>, sigma: i32) {
        for (j, d) in self.interaction_diag(s, sigma).into_iter().enumerate() {
            m.column_mut(j).scale_mut(1.0 / d);
        }
        *m = &*m * &self.inv_exp_k;
    }

    /// `M <- B_l^T M`; both factors of `B_l` are symmetric, so
    /// `B_l^T = exp(sigma alpha s + dtau mu) * exp(-dtau K)`.
    pub fn mult_trans_b_from_left(&self, m: &mut DMatrix<f64>, s: &DVector<f64>, sigma: i32) {
        *m = &self.exp_k * &*m;
        for (i, d) in self.interaction_diag(s, sigma).into_iter().enumerate() {
            m.row_mut(i).scale_mut(d);
        }
    }

    /// Dense `B_l` for the given field column.
    pub fn b_mat(&self, s: &DVector<f64>, sigma: i32) -> DMatrix<f64> {
        let mut b = self.exp_k.clone();
        for (j, d) in self.interaction_diag(s, sigma).into_iter().enumerate() {
            b.column_mut(j).scale_mut(d);
        }
        b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Propagator, DVector<f64>) {
        let lattice = SquareLattice::new(2);
        let prop = Propagator::new(&lattice, 1.0, 0.125, 0.3, 0.8, false);
        let s = DVector::from_vec(vec![1.0, -1.0, -1.0, 1.0]);
        (prop, s)
    }

    #[test]
    fn left_multiplication_of_identity_builds_b() {
        let (prop, s) = setup();
        for sigma in [1, -1] {
            let mut m = DMatrix::identity(4, 4);
            prop.mult_b_from_left(&mut m, &s, sigma);
            assert!((m - prop.b_mat(&s, sigma)).amax() < 1e-12);
        }
    }

    #[test]
    fn right_multiplication_of_identity_builds_b() {
        let (prop, s) = setup();
        let mut m = DMatrix::identity(4, 4);
        prop.mult_b_from_right(&mut m, &s, 1);
        assert!((m - prop.b_mat(&s, 1)).amax() < 1e-12);
    }

    #[test]
    fn inverse_operators_cancel_b() {
        let (prop, s) = setup();
        let mut m = prop.b_mat(&s, -1);
        prop.mult_inv_b_from_left(&mut m, &s, -1);
        assert!((m - DMatrix::identity(4, 4)).amax() < 1e-10);

        let mut m = prop.b_mat(&s, 1);
        prop.mult_inv_b_from_right(&mut m, &s, 1);
        assert!((m - DMatrix::identity(4, 4)).amax() < 1e-10);
    }

    #[test]
    fn transpose_operator_matches_transposed_b() {
        let (prop, s) = setup();
        let mut m = DMatrix::identity(4, 4);
        prop.mult_trans_b_from_left(&mut m, &s, 1);
        assert!((m - prop.b_mat(&s, 1).transpose()).amax() < 1e-12);
    }

    #[test]
    fn attractive_coupling_is_spin_symmetric() {
        let lattice = SquareLattice::new(2);
        let prop = Propagator::new(&lattice, 1.0, 0.125, 0.0, 0.8, true);
        let s = DVector::from_vec(vec![1.0, -1.0, 1.0, -1.0]);
        let b_up = prop.b_mat(&s, 1);
        let b_dn = prop.b_mat(&s, -1);
        assert!((b_up - b_dn).amax() < 1e-15);
    }
}
