//! Hubbard model state and the numerically stable sweep engine.
//!
//! The Markov chain state is the auxiliary Ising field `s` on the `ls x lt`
//! space-time lattice. Sweeps wrap the equal-time Green's functions slice by
//! slice, update the field with Metropolis moves and rank-one Green's
//! function updates, and rebuild the Green's functions from the UDV stacks
//! every `nwrap` slices to bound the accumulated wrap error.

use log::warn;
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Bernoulli, Distribution};
use serde::{Deserialize, Serialize};

use crate::greens::{compute_green_displaced, compute_green_eqtime, matrix_compare_error};
use crate::svd_stack::SvdStack;

use super::lattice::SquareLattice;
use super::propagator::Propagator;

/// Model parameters of a determinant QMC run.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ModelParams {
    /// Linear lattice size
    pub ll: usize,
    /// Number of imaginary-time slices
    pub lt: usize,
    /// Inverse temperature
    pub beta: f64,
    /// Hopping amplitude
    pub t: f64,
    /// On-site interaction; negative values select the attractive model
    pub u: f64,
    /// Chemical potential
    pub mu: f64,
    /// Stabilization period in time slices
    pub nwrap: usize,
    /// Accepted for compatibility; the dense propagator is always used
    #[serde(default)]
    pub checkerboard: bool,
    /// RNG seed; equal seeds reproduce runs bit for bit
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    42
}

/// Number of UDV segments covering `lt` slices at period `nwrap`.
pub(crate) fn stack_chunks(lt: usize, nwrap: usize) -> usize {
    if lt % nwrap == 0 {
        lt / nwrap
    } else {
        lt / nwrap + 1
    }
}

/// Auxiliary-field state, Green's functions and UDV stacks of one model
/// instance. Owns its RNG, so runs with equal seeds are reproducible.
pub struct Hubbard {
    pub lattice: SquareLattice,
    pub ll: usize,
    pub ls: usize,
    pub lt: usize,

    pub beta: f64,
    pub dtau: f64,
    pub t: f64,
    pub u_int: f64,
    pub mu: f64,
    pub alpha: f64,
    pub u_is_attractive: bool,
    pub nwrap: usize,

    /// Slice the next sweep step operates on; 0 between sweep pairs,
    /// `lt + 1` after a completed forward sweep.
    pub current_tau: usize,

    /// Auxiliary field, `ls x lt`, entries +-1
    pub s: DMatrix<f64>,

    pub green_tt_up: DMatrix<f64>,
    pub green_tt_dn: DMatrix<f64>,
    pub green_t0_up: DMatrix<f64>,
    pub green_t0_dn: DMatrix<f64>,
    pub green_0t_up: DMatrix<f64>,
    pub green_0t_dn: DMatrix<f64>,

    /// Per-slice snapshots; slot `l - 1` holds the function wrapped to slice `l`
    pub vec_green_tt_up: Vec<DMatrix<f64>>,
    pub vec_green_tt_dn: Vec<DMatrix<f64>>,
    pub vec_green_t0_up: Vec<DMatrix<f64>>,
    pub vec_green_t0_dn: Vec<DMatrix<f64>>,
    pub vec_green_0t_up: Vec<DMatrix<f64>>,
    pub vec_green_0t_dn: Vec<DMatrix<f64>>,

    pub stack_left_up: SvdStack,
    pub stack_left_dn: SvdStack,
    pub stack_right_up: SvdStack,
    pub stack_right_dn: SvdStack,

    /// Sign of the configuration weight, +-1
    pub config_sign: f64,
    pub max_wrap_error_equal: f64,
    pub max_wrap_error_displaced: f64,

    prop: Propagator,
    rng: StdRng,
}

impl Hubbard {
    pub fn new(params: &ModelParams) -> Self {
        assert!(params.lt >= 1, "at least one time slice is required");
        assert!(params.nwrap >= 1, "stabilization period must be positive");
        if params.checkerboard {
            warn!("checkerboard decomposition is not implemented; using the dense propagator");
        }

        let lattice = SquareLattice::new(params.ll);
        let ls = lattice.ls;
        let lt = params.lt;
        let dtau = params.beta / lt as f64;
        let alpha = (0.5 * dtau * params.u.abs()).exp().acosh();
        let u_is_attractive = params.u < 0.0;
        let prop = Propagator::new(&lattice, params.t, dtau, params.mu, alpha, u_is_attractive);
        let capacity = stack_chunks(lt, params.nwrap) + 1;

        let zeros = DMatrix::zeros(ls, ls);
        let mut model = Self {
            lattice,
            ll: params.ll,
            ls,
            lt,
            beta: params.beta,
            dtau,
            t: params.t,
            u_int: params.u,
            mu: params.mu,
            alpha,
            u_is_attractive,
            nwrap: params.nwrap,
            current_tau: 0,
            s: DMatrix::zeros(ls, lt),
            green_tt_up: zeros.clone(),
            green_tt_dn: zeros.clone(),
            green_t0_up: zeros.clone(),
            green_t0_dn: zeros.clone(),
            green_0t_up: zeros.clone(),
            green_0t_dn: zeros.clone(),
            vec_green_tt_up: vec![zeros.clone(); lt],
            vec_green_tt_dn: vec![zeros.clone(); lt],
            vec_green_t0_up: vec![zeros.clone(); lt],
            vec_green_t0_dn: vec![zeros.clone(); lt],
            vec_green_0t_up: vec![zeros.clone(); lt],
            vec_green_0t_dn: vec![zeros; lt],
            stack_left_up: SvdStack::new(ls, capacity),
            stack_left_dn: SvdStack::new(ls, capacity),
            stack_right_up: SvdStack::new(ls, capacity),
            stack_right_dn: SvdStack::new(ls, capacity),
            config_sign: 1.0,
            max_wrap_error_equal: 0.0,
            max_wrap_error_displaced: 0.0,
            prop,
            rng: StdRng::seed_from_u64(params.seed),
        };

        model.init_field_to_random();
        model.init_stacks();
        model.config_sign = model.determinant_sign();
        model
    }

    /// Draw a fresh +-1 field, uniformly per space-time site.
    pub fn init_field_to_random(&mut self) {
        let coin = Bernoulli::new(0.5).unwrap();
        for l in 0..self.lt {
            for i in 0..self.ls {
                self.s[(i, l)] = if coin.sample(&mut self.rng) { 1.0 } else { -1.0 };
            }
        }
    }

    /// Adopt a loaded field and re-derive stacks, Green's functions and sign.
    pub fn set_field(&mut self, s: DMatrix<f64>) {
        assert_eq!(s.shape(), (self.ls, self.lt), "field dimensions mismatch");
        debug_assert!(s.iter().all(|&x| x == 1.0 || x == -1.0));
        self.s = s;
        self.current_tau = 0;
        self.init_stacks();
        self.config_sign = self.determinant_sign();
    }

    fn determinant_sign(&self) -> f64 {
        let det = self.green_tt_up.determinant() * self.green_tt_dn.determinant();
        if det >= 0.0 {
            1.0
        } else {
            -1.0
        }
    }

    /// Field column for slice `l`, `l` in `[1, lt]`.
    fn field_col(&self, l: usize) -> DVector<f64> {
        self.s.column(l - 1).clone_owned()
    }

    pub fn mult_b_from_left(&self, m: &mut DMatrix<f64>, l: usize, sigma: i32) {
        self.prop.mult_b_from_left(m, &self.field_col(l), sigma);
    }

    pub fn mult_b_from_right(&self, m: &mut DMatrix<f64>, l: usize, sigma: i32) {
        self.prop.mult_b_from_right(m, &self.field_col(l), sigma);
    }

    pub fn mult_inv_b_from_left(&self, m: &mut DMatrix<f64>, l: usize, sigma: i32) {
        self.prop.mult_inv_b_from_left(m, &self.field_col(l), sigma);
    }

    pub fn mult_inv_b_from_right(&self, m: &mut DMatrix<f64>, l: usize, sigma: i32) {
        self.prop.mult_inv_b_from_right(m, &self.field_col(l), sigma);
    }

    pub fn mult_trans_b_from_left(&self, m: &mut DMatrix<f64>, l: usize, sigma: i32) {
        self.prop.mult_trans_b_from_left(m, &self.field_col(l), sigma);
    }

    /// Dense `B_l` for one spin channel, mainly for consistency checks.
    pub fn b_mat(&self, l: usize, sigma: i32) -> DMatrix<f64> {
        self.prop.b_mat(&self.field_col(l), sigma)
    }

    /// Update the field at every site of slice `l` with Metropolis
    /// probability; each accepted flip applies a rank-one update to both
    /// equal-time Green's functions. Records the per-slice snapshot at the
    /// end.
    pub fn metropolis_update(&mut self, l: usize) {
        assert_eq!(self.current_tau, l, "metropolis update out of sweep order");
        assert!(l <= self.lt);
        let tau = if l == 0 { self.lt - 1 } else { l - 1 };

        for i in 0..self.ls {
            let s_i = self.s[(i, tau)];
            let exp_up = (-2.0 * self.alpha * s_i).exp();
            let exp_dn = if self.u_is_attractive {
                exp_up
            } else {
                (2.0 * self.alpha * s_i).exp()
            };

            let ratio_up = 1.0 + (1.0 - self.green_tt_up[(i, i)]) * (exp_up - 1.0);
            let ratio_dn = 1.0 + (1.0 - self.green_tt_dn[(i, i)]) * (exp_dn - 1.0);
            let p = if self.u_is_attractive {
                (2.0 * self.alpha * s_i).exp() * ratio_up * ratio_dn
            } else {
                ratio_up * ratio_dn
            };

            let accept = Bernoulli::new(p.abs().min(1.0)).unwrap();
            if accept.sample(&mut self.rng) {
                rank_one_update(&mut self.green_tt_up, i, (exp_up - 1.0) / ratio_up);
                rank_one_update(&mut self.green_tt_dn, i, (exp_dn - 1.0) / ratio_dn);

                self.s[(i, tau)] = -s_i;
                // p == 0 counts as positive
                if p < 0.0 {
                    self.config_sign = -self.config_sign;
                }
            }
        }

        self.vec_green_tt_up[tau] = self.green_tt_up.clone();
        self.vec_green_tt_dn[tau] = self.green_tt_dn.clone();
    }

    /// Advance the equal-time Green's functions from slice `l` to `l + 1`:
    /// `G <- B_{l+1} G B_{l+1}^{-1}`.
    pub fn wrap_north(&mut self, l: usize) {
        assert!(l <= self.lt);
        let tau = if l == self.lt { 1 } else { l + 1 };
        let col = self.field_col(tau);
        self.prop.mult_b_from_left(&mut self.green_tt_up, &col, 1);
        self.prop.mult_inv_b_from_right(&mut self.green_tt_up, &col, 1);
        self.prop.mult_b_from_left(&mut self.green_tt_dn, &col, -1);
        self.prop.mult_inv_b_from_right(&mut self.green_tt_dn, &col, -1);
    }

    /// Retreat the equal-time Green's functions from slice `l` to `l - 1`:
    /// `G <- B_l^{-1} G B_l`.
    pub fn wrap_south(&mut self, l: usize) {
        assert!(l <= self.lt);
        let tau = if l == 0 { self.lt } else { l };
        let col = self.field_col(tau);
        self.prop.mult_b_from_right(&mut self.green_tt_up, &col, 1);
        self.prop.mult_inv_b_from_left(&mut self.green_tt_up, &col, 1);
        self.prop.mult_b_from_right(&mut self.green_tt_dn, &col, -1);
        self.prop.mult_inv_b_from_left(&mut self.green_tt_dn, &col, -1);
    }

    /// Build the right stacks for a sweep starting at `tau = 0` and compute
    /// the initial Green's functions. The right stacks end up holding the
    /// full decomposition of `B(1)^T ... B(lt)^T`, segmented every `nwrap`
    /// slices.
    pub fn init_stacks(&mut self) {
        self.stack_left_up.clear();
        self.stack_left_dn.clear();
        self.stack_right_up.clear();
        self.stack_right_dn.clear();

        let mut tmp_up = DMatrix::identity(self.ls, self.ls);
        let mut tmp_dn = DMatrix::identity(self.ls, self.ls);

        for l in (1..=self.lt).rev() {
            self.mult_trans_b_from_left(&mut tmp_up, l, 1);
            self.mult_trans_b_from_left(&mut tmp_dn, l, -1);

            if (l - 1) % self.nwrap == 0 {
                self.stack_right_up.push(&tmp_up);
                self.stack_right_dn.push(&tmp_dn);
                tmp_up = DMatrix::identity(self.ls, self.ls);
                tmp_dn = DMatrix::identity(self.ls, self.ls);
            }
        }

        compute_green_eqtime(&self.stack_left_up, &self.stack_right_up, &mut self.green_tt_up);
        compute_green_eqtime(&self.stack_left_dn, &self.stack_right_dn, &mut self.green_tt_dn);
    }

    /// Rebuild both equal-time Green's functions from the stacks and fold
    /// the discrepancy against the wrapped versions into the running
    /// wrap-error maximum.
    fn rebuild_equal_time(&mut self) {
        let mut fresh_up = DMatrix::zeros(self.ls, self.ls);
        let mut fresh_dn = DMatrix::zeros(self.ls, self.ls);
        compute_green_eqtime(&self.stack_left_up, &self.stack_right_up, &mut fresh_up);
        compute_green_eqtime(&self.stack_left_dn, &self.stack_right_dn, &mut fresh_dn);

        let err_up = matrix_compare_error(&fresh_up, &self.green_tt_up);
        let err_dn = matrix_compare_error(&fresh_dn, &self.green_tt_dn);
        self.max_wrap_error_equal = self.max_wrap_error_equal.max(err_up.max(err_dn));

        self.green_tt_up = fresh_up;
        self.green_tt_dn = fresh_dn;
    }

    /// Forward sweep: for `l = 1..=lt` wrap the Green's functions up one
    /// slice, update the field at `l`, and stabilize every `nwrap` slices by
    /// moving one segment from the right stacks to the left stacks.
    pub fn sweep_0_to_beta(&mut self, nwrap: usize) {
        assert_eq!(self.current_tau, 0, "forward sweep must start at tau = 0");
        self.current_tau = 1;

        let nlen = stack_chunks(self.lt, nwrap);
        assert!(self.stack_left_up.is_empty() && self.stack_left_dn.is_empty());
        assert_eq!(self.stack_right_up.len(), nlen);
        assert_eq!(self.stack_right_dn.len(), nlen);

        let mut tmp_up = DMatrix::identity(self.ls, self.ls);
        let mut tmp_dn = DMatrix::identity(self.ls, self.ls);

        for l in 1..=self.lt {
            self.wrap_north(l - 1);
            self.metropolis_update(l);

            self.mult_b_from_left(&mut tmp_up, l, 1);
            self.mult_b_from_left(&mut tmp_dn, l, -1);

            if l % nwrap == 0 || l == self.lt {
                self.stack_right_up.pop();
                self.stack_right_dn.pop();
                self.stack_left_up.push(&tmp_up);
                self.stack_left_dn.push(&tmp_dn);

                self.rebuild_equal_time();

                tmp_up = DMatrix::identity(self.ls, self.ls);
                tmp_dn = DMatrix::identity(self.ls, self.ls);
            }

            self.current_tau += 1;
        }

        // end with fresh Green's functions
        self.vec_green_tt_up[self.lt - 1] = self.green_tt_up.clone();
        self.vec_green_tt_dn[self.lt - 1] = self.green_tt_dn.clone();
    }

    /// Backward sweep: for `l = lt..=1` stabilize at segment boundaries
    /// (before the update), update the field at `l`, and wrap the Green's
    /// functions down one slice. Ends with a final rebuild at `l = 0`.
    pub fn sweep_beta_to_0(&mut self, nwrap: usize) {
        assert_eq!(
            self.current_tau,
            self.lt + 1,
            "backward sweep requires a completed forward sweep"
        );
        self.current_tau = self.lt;

        let nlen = stack_chunks(self.lt, nwrap);
        assert!(self.stack_right_up.is_empty() && self.stack_right_dn.is_empty());
        assert_eq!(self.stack_left_up.len(), nlen);
        assert_eq!(self.stack_left_dn.len(), nlen);

        let mut tmp_up = DMatrix::identity(self.ls, self.ls);
        let mut tmp_dn = DMatrix::identity(self.ls, self.ls);

        for l in (1..=self.lt).rev() {
            if l % nwrap == 0 && l != self.lt {
                self.stack_left_up.pop();
                self.stack_left_dn.pop();
                self.stack_right_up.push(&tmp_up);
                self.stack_right_dn.push(&tmp_dn);

                self.rebuild_equal_time();

                tmp_up = DMatrix::identity(self.ls, self.ls);
                tmp_dn = DMatrix::identity(self.ls, self.ls);
            }

            self.metropolis_update(l);

            self.mult_trans_b_from_left(&mut tmp_up, l, 1);
            self.mult_trans_b_from_left(&mut tmp_dn, l, -1);

            self.wrap_south(l);

            self.current_tau -= 1;
        }

        // final segment at l = 0
        self.stack_left_up.pop();
        self.stack_left_dn.pop();
        self.stack_right_up.push(&tmp_up);
        self.stack_right_dn.push(&tmp_dn);

        compute_green_eqtime(&self.stack_left_up, &self.stack_right_up, &mut self.green_tt_up);
        compute_green_eqtime(&self.stack_left_dn, &self.stack_right_dn, &mut self.green_tt_dn);

        self.vec_green_tt_up[self.lt - 1] = self.green_tt_up.clone();
        self.vec_green_tt_dn[self.lt - 1] = self.green_tt_dn.clone();
    }

    /// Forward sweep computing the time-displaced Green's functions with the
    /// field held fixed. `G(tau,0)` advances by left multiplication with
    /// `B_l`, `G(0,tau)` retreats by right multiplication with `B_l^{-1}`;
    /// both are rebuilt from the stacks every `nwrap` slices.
    pub fn sweep_0_to_beta_displaced(&mut self, nwrap: usize) {
        assert_eq!(self.current_tau, 0, "displaced sweep must start at tau = 0");
        self.current_tau = 1;

        let nlen = stack_chunks(self.lt, nwrap);
        assert!(self.stack_left_up.is_empty() && self.stack_left_dn.is_empty());
        assert_eq!(self.stack_right_up.len(), nlen);
        assert_eq!(self.stack_right_dn.len(), nlen);

        // at l = 0: g_t0 = g_tt, g_0t = g_tt - 1
        let identity = DMatrix::identity(self.ls, self.ls);
        self.green_t0_up = self.green_tt_up.clone();
        self.green_t0_dn = self.green_tt_dn.clone();
        self.green_0t_up = &self.green_tt_up - &identity;
        self.green_0t_dn = &self.green_tt_dn - &identity;

        let mut tmp_up = identity.clone();
        let mut tmp_dn = identity;

        for l in 1..=self.lt {
            let col = self.field_col(l);

            self.prop.mult_b_from_left(&mut self.green_t0_up, &col, 1);
            self.prop.mult_b_from_left(&mut self.green_t0_dn, &col, -1);
            self.vec_green_t0_up[l - 1] = self.green_t0_up.clone();
            self.vec_green_t0_dn[l - 1] = self.green_t0_dn.clone();

            self.prop.mult_inv_b_from_right(&mut self.green_0t_up, &col, 1);
            self.prop.mult_inv_b_from_right(&mut self.green_0t_dn, &col, -1);
            self.vec_green_0t_up[l - 1] = self.green_0t_up.clone();
            self.vec_green_0t_dn[l - 1] = self.green_0t_dn.clone();

            self.prop.mult_b_from_left(&mut tmp_up, &col, 1);
            self.prop.mult_b_from_left(&mut tmp_dn, &col, -1);

            if l % nwrap == 0 || l == self.lt {
                self.stack_right_up.pop();
                self.stack_right_dn.pop();
                self.stack_left_up.push(&tmp_up);
                self.stack_left_dn.push(&tmp_dn);

                self.rebuild_displaced(l);

                tmp_up = DMatrix::identity(self.ls, self.ls);
                tmp_dn = DMatrix::identity(self.ls, self.ls);
            }

            self.current_tau += 1;
        }
    }

    fn rebuild_displaced(&mut self, l: usize) {
        let mut fresh_t0_up = DMatrix::zeros(self.ls, self.ls);
        let mut fresh_t0_dn = DMatrix::zeros(self.ls, self.ls);
        let mut fresh_0t_up = DMatrix::zeros(self.ls, self.ls);
        let mut fresh_0t_dn = DMatrix::zeros(self.ls, self.ls);
        compute_green_displaced(
            &self.stack_left_up,
            &self.stack_right_up,
            &mut fresh_t0_up,
            &mut fresh_0t_up,
        );
        compute_green_displaced(
            &self.stack_left_dn,
            &self.stack_right_dn,
            &mut fresh_t0_dn,
            &mut fresh_0t_dn,
        );

        let err = matrix_compare_error(&fresh_t0_up, &self.green_t0_up)
            .max(matrix_compare_error(&fresh_t0_dn, &self.green_t0_dn))
            .max(matrix_compare_error(&fresh_0t_up, &self.green_0t_up))
            .max(matrix_compare_error(&fresh_0t_dn, &self.green_0t_dn));
        self.max_wrap_error_displaced = self.max_wrap_error_displaced.max(err);

        self.green_t0_up = fresh_t0_up;
        self.green_t0_dn = fresh_t0_dn;
        self.green_0t_up = fresh_0t_up;
        self.green_0t_dn = fresh_0t_dn;

        self.vec_green_t0_up[l - 1] = self.green_t0_up.clone();
        self.vec_green_t0_dn[l - 1] = self.green_t0_dn.clone();
        self.vec_green_0t_up[l - 1] = self.green_0t_up.clone();
        self.vec_green_0t_dn[l - 1] = self.green_0t_dn.clone();
    }
}

fn rank_one_update(g: &mut DMatrix<f64>, i: usize, factor: f64) {
    let col = g.column(i).clone_owned();
    let mut row = -g.row(i).clone_owned();
    row[i] += 1.0;
    *g -= factor * &col * &row;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params(ll: usize, lt: usize, beta: f64, u: f64, mu: f64, nwrap: usize) -> ModelParams {
        ModelParams {
            ll,
            lt,
            beta,
            t: 1.0,
            u,
            mu,
            nwrap,
            checkerboard: false,
            seed: 7,
        }
    }

    fn sweep_pair(model: &mut Hubbard) {
        let nwrap = model.nwrap;
        model.sweep_0_to_beta(nwrap);
        model.sweep_beta_to_0(nwrap);
    }

    #[test]
    fn stack_chunks_covers_all_slices() {
        assert_eq!(stack_chunks(80, 10), 8);
        assert_eq!(stack_chunks(81, 10), 9);
        assert_eq!(stack_chunks(4, 10), 1);
    }

    #[test]
    fn initial_green_inverts_full_propagator_product() {
        let model = Hubbard::new(&params(2, 4, 1.0, 4.0, 0.0, 2));
        for sigma in [1, -1] {
            let mut product = DMatrix::identity(model.ls, model.ls);
            for l in 1..=model.lt {
                product = model.b_mat(l, sigma) * product;
            }
            let g = if sigma == 1 {
                &model.green_tt_up
            } else {
                &model.green_tt_dn
            };
            let residual = g * (DMatrix::identity(model.ls, model.ls) + &product)
                - DMatrix::identity(model.ls, model.ls);
            assert!(residual.amax() < 1e-9);
        }
    }

    #[test]
    fn field_stays_in_domain_and_sign_stays_unit() {
        let mut model = Hubbard::new(&params(2, 8, 2.0, 4.0, 0.5, 4));
        for _ in 0..3 {
            sweep_pair(&mut model);
            assert!(model.s.iter().all(|&x| x == 1.0 || x == -1.0));
            assert!(model.config_sign == 1.0 || model.config_sign == -1.0);
        }
    }

    #[test]
    fn sweep_pair_restores_current_tau() {
        let mut model = Hubbard::new(&params(2, 8, 2.0, 4.0, 0.0, 4));
        assert_eq!(model.current_tau, 0);
        model.sweep_0_to_beta(4);
        assert_eq!(model.current_tau, model.lt + 1);
        model.sweep_beta_to_0(4);
        assert_eq!(model.current_tau, 0);
    }

    #[test]
    #[should_panic(expected = "forward sweep")]
    fn forward_sweep_rejects_wrong_phase() {
        let mut model = Hubbard::new(&params(2, 4, 1.0, 4.0, 0.0, 2));
        model.sweep_0_to_beta(2);
        model.sweep_0_to_beta(2);
    }

    #[test]
    fn wrap_error_stays_small_on_healthy_run() {
        let mut model = Hubbard::new(&params(2, 20, 2.0, 4.0, 0.0, 5));
        for _ in 0..2 {
            sweep_pair(&mut model);
        }
        assert!(model.max_wrap_error_equal < 1e-6);
    }

    #[test]
    fn noninteracting_sweep_pair_is_idempotent() {
        // At U = 0 every proposal has unit weight and the rank-one factors
        // vanish, so a forward/backward pair must reproduce the input.
        let mut model = Hubbard::new(&params(2, 8, 1.0, 0.0, 0.3, 4));
        let before = model.green_tt_up.clone();
        sweep_pair(&mut model);
        assert!(matrix_compare_error(&model.green_tt_up, &before) < 1e-10);
    }

    #[test]
    fn displaced_green_reduces_to_equal_time_at_origin() {
        let model = Hubbard::new(&params(2, 8, 2.0, 4.0, 0.0, 4));
        let mut g_t0 = DMatrix::zeros(model.ls, model.ls);
        let mut g_0t = DMatrix::zeros(model.ls, model.ls);
        compute_green_displaced(
            &model.stack_left_up,
            &model.stack_right_up,
            &mut g_t0,
            &mut g_0t,
        );
        assert!(matrix_compare_error(&g_t0, &model.green_tt_up) < 1e-12);
        let shifted = &model.green_tt_up - DMatrix::identity(model.ls, model.ls);
        assert!(matrix_compare_error(&g_0t, &shifted) < 1e-12);
    }

    #[test]
    fn displaced_sweep_differs_from_equal_time_in_the_bulk() {
        let mut model = Hubbard::new(&params(2, 8, 2.0, 4.0, 0.0, 4));
        sweep_pair(&mut model);
        model.sweep_0_to_beta_displaced(4);
        let mid = model.lt / 2;
        let diff = matrix_compare_error(&model.vec_green_t0_up[mid], &model.vec_green_tt_up[mid]);
        assert!(diff > 1e-8);
        model.sweep_beta_to_0(4);
    }

    #[test]
    fn displaced_sweep_leaves_field_unchanged() {
        let mut model = Hubbard::new(&params(2, 8, 2.0, 4.0, 0.0, 4));
        let field = model.s.clone();
        model.sweep_0_to_beta_displaced(4);
        assert_eq!(model.s, field);
        model.sweep_beta_to_0(4);
    }

    #[test]
    fn uniform_field_sign_is_deterministic() {
        let mut model = Hubbard::new(&params(2, 8, 2.0, 4.0, 0.0, 4));
        let ones = DMatrix::from_element(model.ls, model.lt, 1.0);
        model.set_field(ones);
        let det = model.green_tt_up.determinant() * model.green_tt_dn.determinant();
        let expected = if det >= 0.0 { 1.0 } else { -1.0 };
        assert_relative_eq!(model.config_sign, expected);
        // repulsive half filling carries no sign problem
        assert_relative_eq!(model.config_sign, 1.0);
    }

    #[test]
    fn equal_seeds_reproduce_the_field() {
        let p = params(2, 8, 2.0, 4.0, 0.0, 4);
        let mut a = Hubbard::new(&p);
        let mut b = Hubbard::new(&p);
        sweep_pair(&mut a);
        sweep_pair(&mut b);
        assert_eq!(a.s, b.s);
        assert_eq!(a.config_sign, b.config_sign);
        assert_eq!(a.green_tt_up, b.green_tt_up);
    }
}
