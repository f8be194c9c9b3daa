//! Time-displaced observables accumulated from `G(tau,0)` and `G(0,tau)`.
//!
//! Records the momentum-space projection `g_kt` of the displaced Green's
//! function per time slice, the per-slice spin-resolved `G(tau,0)` matrices
//! feeding the local-density-of-states output, and the helicity modulus
//! from a current-current correlator at `tau = lt/2`.

use std::f64::consts::PI;

use nalgebra::{DMatrix, Vector2};

use crate::model::Hubbard;

use super::observable::Observable;

pub struct DynamicMeasure {
    pub nbin: usize,
    /// Wave vector in absolute units (the driver stores `pi * input`)
    pub q: Vector2<f64>,
    n_measure: usize,
    /// Momentum projection of `G(tau,0)` per slice offset
    pub g_kt: Vec<Observable>,
    pub rho_s: Observable,
    pub average_sign: Observable,
    acc_gt0_up: Vec<DMatrix<f64>>,
    acc_gt0_dn: Vec<DMatrix<f64>>,
    /// Normalized per-bin `G(tau,0)` matrices, indexed `[bin][tau]`
    pub bin_gt0_up: Vec<Vec<DMatrix<f64>>>,
    pub bin_gt0_dn: Vec<Vec<DMatrix<f64>>>,
}

impl DynamicMeasure {
    pub fn new(nbin: usize, hubbard: &Hubbard) -> Self {
        let ls = hubbard.ls;
        let lt = hubbard.lt;
        let zeros = DMatrix::zeros(ls, ls);
        Self {
            nbin,
            q: Vector2::zeros(),
            n_measure: 0,
            g_kt: vec![Observable::new(nbin); lt],
            rho_s: Observable::new(nbin),
            average_sign: Observable::new(nbin),
            acc_gt0_up: vec![zeros.clone(); lt],
            acc_gt0_dn: vec![zeros.clone(); lt],
            bin_gt0_up: vec![vec![zeros.clone(); lt]; nbin],
            bin_gt0_dn: vec![vec![zeros; lt]; nbin],
        }
    }

    pub fn clear(&mut self, _hubbard: &Hubbard) {
        self.n_measure = 0;
        for obs in &mut self.g_kt {
            obs.clear();
        }
        self.rho_s.clear();
        self.average_sign.clear();
        for m in &mut self.acc_gt0_up {
            m.fill(0.0);
        }
        for m in &mut self.acc_gt0_dn {
            m.fill(0.0);
        }
    }

    /// Accumulate the dynamical observables of one displaced sweep.
    pub fn measure_time_displaced(&mut self, hubbard: &Hubbard) {
        let sign = hubbard.config_sign;
        for t in 0..hubbard.lt {
            let fourier = self.momentum_projection(hubbard, &hubbard.vec_green_t0_up[t]);
            self.g_kt[t].accumulate(sign * fourier);
            self.acc_gt0_up[t] += sign * &hubbard.vec_green_t0_up[t];
            self.acc_gt0_dn[t] += sign * &hubbard.vec_green_t0_dn[t];
        }
        self.rho_s
            .accumulate(sign * self.superfluid_stiffness(hubbard));
        self.average_sign.accumulate(sign);
        self.n_measure += 1;
    }

    fn momentum_projection(&self, hubbard: &Hubbard, g: &DMatrix<f64>) -> f64 {
        let ll = hubbard.ll;
        let mut fourier = 0.0;
        for xi in 0..ll {
            for yi in 0..ll {
                for xj in 0..ll {
                    for yj in 0..ll {
                        let i = hubbard.lattice.site(xi, yi);
                        let j = hubbard.lattice.site(xj, yj);
                        let phase = (xi as f64 - xj as f64) * self.q[0]
                            + (yi as f64 - yj as f64) * self.q[1];
                        fourier += phase.cos() * g[(j, i)];
                    }
                }
            }
        }
        fourier
    }

    /// Helicity modulus `rho_s = beta/4 * (Lambda_L - Lambda_T)` from the
    /// connected current-current correlator at `tau = lt/2`, with the
    /// longitudinal and transverse limits taken at the smallest nonzero
    /// wave vectors `(2 pi / ll, 0)` and `(0, 2 pi / ll)`.
    fn superfluid_stiffness(&self, hubbard: &Hubbard) -> f64 {
        let mid = hubbard.lt / 2;
        let dq = 2.0 * PI / hubbard.ll as f64;
        let lambda_l = self.current_correlator(hubbard, mid, Vector2::new(dq, 0.0));
        let lambda_t = self.current_correlator(hubbard, mid, Vector2::new(0.0, dq));
        0.25 * hubbard.beta * (lambda_l - lambda_t)
    }

    /// `Lambda_xx(q, tau) = t^2/ls * sum_ij cos(q.(r_i - r_j))
    ///                      * sum_sigma [connected Wick contractions]`
    /// of the x-bond current operators at imaginary-time separation `tau`.
    fn current_correlator(&self, hubbard: &Hubbard, t: usize, q: Vector2<f64>) -> f64 {
        let ll = hubbard.ll;
        let spins = [
            (&hubbard.vec_green_t0_up[t], &hubbard.vec_green_0t_up[t]),
            (&hubbard.vec_green_t0_dn[t], &hubbard.vec_green_0t_dn[t]),
        ];

        let mut sum = 0.0;
        for xi in 0..ll {
            for yi in 0..ll {
                for xj in 0..ll {
                    for yj in 0..ll {
                        let i = hubbard.lattice.site(xi, yi);
                        let ix = hubbard.lattice.site(xi + 1, yi);
                        let j = hubbard.lattice.site(xj, yj);
                        let jx = hubbard.lattice.site(xj + 1, yj);
                        let phase = (xi as f64 - xj as f64) * q[0]
                            + (yi as f64 - yj as f64) * q[1];

                        let mut conn = 0.0;
                        for (gt0, g0t) in spins {
                            conn += g0t[(j, ix)] * gt0[(i, jx)]
                                - g0t[(jx, ix)] * gt0[(i, j)]
                                - g0t[(j, i)] * gt0[(ix, jx)]
                                + g0t[(jx, i)] * gt0[(ix, j)];
                        }
                        sum += phase.cos() * conn;
                    }
                }
            }
        }
        hubbard.t * hubbard.t * sum / hubbard.ls as f64
    }

    pub fn normalize_stats(&mut self, hubbard: &Hubbard) {
        let n = self.n_measure as f64;
        let ls = hubbard.ls as f64;
        self.average_sign.normalize(n);
        let sign = self.average_sign.value();
        for obs in &mut self.g_kt {
            obs.normalize(ls * n * sign);
        }
        self.rho_s.normalize(n * sign);
        for m in &mut self.acc_gt0_up {
            *m /= n * sign;
        }
        for m in &mut self.acc_gt0_dn {
            *m /= n * sign;
        }
    }

    pub fn write_stats_to_bins(&mut self, bin: usize) {
        for t in 0..self.g_kt.len() {
            self.g_kt[t].store_bin(bin);
            self.bin_gt0_up[bin][t] = self.acc_gt0_up[t].clone();
            self.bin_gt0_dn[bin][t] = self.acc_gt0_dn[t].clone();
        }
        self.rho_s.store_bin(bin);
        self.average_sign.store_bin(bin);
    }

    pub fn analyse_stats(&mut self) {
        for obs in &mut self.g_kt {
            obs.analyse();
        }
        self.rho_s.analyse();
        self.average_sign.analyse();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelParams;
    use approx::assert_relative_eq;

    fn model(u: f64) -> Hubbard {
        Hubbard::new(&ModelParams {
            ll: 2,
            lt: 8,
            beta: 2.0,
            t: 1.0,
            u,
            mu: 0.0,
            nwrap: 4,
            checkerboard: false,
            seed: 23,
        })
    }

    fn measured(u: f64) -> (Hubbard, DynamicMeasure) {
        let mut model = model(u);
        model.sweep_0_to_beta(4);
        model.sweep_beta_to_0(4);
        model.sweep_0_to_beta_displaced(4);

        let mut measure = DynamicMeasure::new(1, &model);
        measure.q = PI * Vector2::new(1.0, 1.0);
        measure.measure_time_displaced(&model);
        measure.normalize_stats(&model);
        measure.write_stats_to_bins(0);
        measure.analyse_stats();
        model.sweep_beta_to_0(4);
        (model, measure)
    }

    #[test]
    fn dynamical_observables_are_finite() {
        let (model, measure) = measured(4.0);
        for t in 0..model.lt {
            assert!(measure.g_kt[t].mean.is_finite());
        }
        assert!(measure.rho_s.mean.is_finite());
        assert_relative_eq!(measure.average_sign.mean, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn binned_matrices_carry_the_displaced_green_function() {
        let (model, measure) = measured(4.0);
        // one measurement with unit sign: the bin holds the snapshot itself
        for t in 0..model.lt {
            let diff = (&measure.bin_gt0_up[0][t] - &model.vec_green_t0_up[t]).amax();
            assert!(diff < 1e-12);
        }
    }

    #[test]
    fn attractive_channel_is_spin_symmetric() {
        let (model, measure) = measured(-4.0);
        for t in 0..model.lt {
            let diff = (&measure.bin_gt0_up[0][t] - &measure.bin_gt0_dn[0][t]).amax();
            assert!(diff < 1e-10);
        }
    }
}
