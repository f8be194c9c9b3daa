//! Equal-time observables accumulated from the per-slice Green's functions.
//!
//! Every contribution is weighted by the configuration sign; normalization
//! divides the accumulated sign out once per bin, so the stored bins are
//! already sign-reweighted.

use nalgebra::{DMatrix, Vector2};

use crate::model::Hubbard;

use super::observable::Observable;

pub struct EqtimeMeasure {
    pub nbin: usize,
    /// Wave vector in absolute units (the driver stores `pi * input`)
    pub q: Vector2<f64>,
    n_measure: usize,
    pub double_occupancy: Observable,
    pub kinetic_energy: Observable,
    pub structure_factor: Observable,
    pub momentum_distribution: Observable,
    pub local_spin_correlation: Observable,
    pub average_sign: Observable,
}

impl EqtimeMeasure {
    pub fn new(nbin: usize) -> Self {
        Self {
            nbin,
            q: Vector2::zeros(),
            n_measure: 0,
            double_occupancy: Observable::new(nbin),
            kinetic_energy: Observable::new(nbin),
            structure_factor: Observable::new(nbin),
            momentum_distribution: Observable::new(nbin),
            local_spin_correlation: Observable::new(nbin),
            average_sign: Observable::new(nbin),
        }
    }

    pub fn clear(&mut self) {
        self.n_measure = 0;
        self.double_occupancy.clear();
        self.kinetic_energy.clear();
        self.structure_factor.clear();
        self.momentum_distribution.clear();
        self.local_spin_correlation.clear();
        self.average_sign.clear();
    }

    /// Accumulate every observable over all time slices of the completed
    /// sweep.
    pub fn measure_equal_time(&mut self, hubbard: &Hubbard) {
        for t in 0..hubbard.lt {
            self.measure_double_occupancy(hubbard, t);
            self.measure_kinetic_energy(hubbard, t);
            self.measure_structure_factor(hubbard, t);
            self.measure_momentum_distribution(hubbard, t);
            self.measure_local_spin_correlation(hubbard, t);
        }
        self.average_sign.accumulate(hubbard.config_sign);
        self.n_measure += 1;
    }

    fn measure_double_occupancy(&mut self, hubbard: &Hubbard, t: usize) {
        let gu = &hubbard.vec_green_tt_up[t];
        let gd = &hubbard.vec_green_tt_dn[t];
        for i in 0..hubbard.ls {
            let double_occu = (1.0 - gu[(i, i)]) * (1.0 - gd[(i, i)]);
            self.double_occupancy
                .accumulate(hubbard.config_sign * double_occu);
        }
    }

    fn measure_kinetic_energy(&mut self, hubbard: &Hubbard, t: usize) {
        let ll = hubbard.ll;
        let gu = &hubbard.vec_green_tt_up[t];
        let gd = &hubbard.vec_green_tt_dn[t];
        for x in 0..ll {
            for y in 0..ll {
                let i = hubbard.lattice.site(x, y);
                let right = hubbard.lattice.site(x + 1, y);
                let up = hubbard.lattice.site(x, y + 1);
                let kinetic = 2.0 * hubbard.t * (gu[(i, right)] + gu[(i, up)])
                    + 2.0 * hubbard.t * (gd[(i, right)] + gd[(i, up)]);
                self.kinetic_energy.accumulate(hubbard.config_sign * kinetic);
            }
        }
    }

    fn measure_momentum_distribution(&mut self, hubbard: &Hubbard, t: usize) {
        let ll = hubbard.ll;
        let gu = &hubbard.vec_green_tt_up[t];
        let gd = &hubbard.vec_green_tt_dn[t];
        let mut fourier = 0.0;
        for xi in 0..ll {
            for yi in 0..ll {
                for xj in 0..ll {
                    for yj in 0..ll {
                        let i = hubbard.lattice.site(xi, yi);
                        let j = hubbard.lattice.site(xj, yj);
                        let phase = (xi as f64 - xj as f64) * self.q[0]
                            + (yi as f64 - yj as f64) * self.q[1];
                        fourier += phase.cos() * (gu[(j, i)] + gd[(j, i)]);
                    }
                }
            }
        }
        let dist = 1.0 - 0.5 * fourier / hubbard.ls as f64;
        self.momentum_distribution
            .accumulate(hubbard.config_sign * dist);
    }

    fn measure_local_spin_correlation(&mut self, hubbard: &Hubbard, t: usize) {
        let gu = &hubbard.vec_green_tt_up[t];
        let gd = &hubbard.vec_green_tt_dn[t];
        let mut onsite = 0.0;
        for i in 0..hubbard.ls {
            onsite += gu[(i, i)] + gd[(i, i)] - 2.0 * gu[(i, i)] * gd[(i, i)];
        }
        self.local_spin_correlation
            .accumulate(hubbard.config_sign * onsite / hubbard.ls as f64);
    }

    fn measure_structure_factor(&mut self, hubbard: &Hubbard, t: usize) {
        let ll = hubbard.ll;
        let ls = hubbard.ls;
        let gu = &hubbard.vec_green_tt_up[t];
        let gd = &hubbard.vec_green_tt_dn[t];

        // g(i,j) = <c_i c+_j>; gc(i,j) = <c+_i c_j> = delta_ij - g(j,i)
        let guc = DMatrix::identity(ls, ls) - gu.transpose();
        let gdc = DMatrix::identity(ls, ls) - gd.transpose();

        for xi in 0..ll {
            for yi in 0..ll {
                for xj in 0..ll {
                    for yj in 0..ll {
                        let i = hubbard.lattice.site(xi, yi);
                        let j = hubbard.lattice.site(xj, yj);
                        let phase = (xi as f64 - xj as f64) * self.q[0]
                            + (yi as f64 - yj as f64) * self.q[1];
                        // the factor 1/4 comes from spin 1/2
                        let factor = phase.cos() / 4.0;
                        let structure = factor
                            * (guc[(i, i)] * guc[(j, j)]
                                + guc[(i, j)] * gu[(i, j)]
                                + gdc[(i, i)] * gdc[(j, j)]
                                + gdc[(i, j)] * gd[(i, j)]
                                - gdc[(i, i)] * guc[(j, j)]
                                - guc[(i, i)] * gdc[(j, j)]);
                        self.structure_factor
                            .accumulate(hubbard.config_sign * structure);
                    }
                }
            }
        }
    }

    /// Divide the accumulators by their prefactors. The sign is normalized
    /// first; all other observables then divide by it, so the reweighting
    /// happens here and not again at analysis time.
    pub fn normalize_stats(&mut self, hubbard: &Hubbard) {
        let n = self.n_measure as f64;
        let ls = hubbard.ls as f64;
        let lt = hubbard.lt as f64;
        self.average_sign.normalize(n);
        let sign = self.average_sign.value();
        self.double_occupancy.normalize(ls * lt * n * sign);
        self.kinetic_energy.normalize(ls * lt * n * sign);
        self.structure_factor.normalize(ls * ls * lt * n * sign);
        self.momentum_distribution.normalize(lt * n * sign);
        self.local_spin_correlation.normalize(lt * n * sign);
    }

    pub fn write_stats_to_bins(&mut self, bin: usize) {
        self.double_occupancy.store_bin(bin);
        self.kinetic_energy.store_bin(bin);
        self.structure_factor.store_bin(bin);
        self.momentum_distribution.store_bin(bin);
        self.local_spin_correlation.store_bin(bin);
        self.average_sign.store_bin(bin);
    }

    pub fn analyse_stats(&mut self) {
        self.double_occupancy.analyse();
        self.kinetic_energy.analyse();
        self.structure_factor.analyse();
        self.momentum_distribution.analyse();
        self.local_spin_correlation.analyse();
        self.average_sign.analyse();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelParams;
    use approx::assert_relative_eq;

    fn free_model() -> Hubbard {
        Hubbard::new(&ModelParams {
            ll: 2,
            lt: 8,
            beta: 2.0,
            t: 1.0,
            u: 0.0,
            mu: 0.0,
            nwrap: 4,
            checkerboard: false,
            seed: 11,
        })
    }

    #[test]
    fn free_fermions_at_half_filling_have_exact_occupations() {
        // At U = 0 the Green's function is deterministic and particle-hole
        // symmetry pins <n_up> = <n_dn> = 1/2, so double occupancy is 1/4
        // and the local spin correlation is 1/2.
        let mut model = free_model();
        model.sweep_0_to_beta(4);
        model.sweep_beta_to_0(4);

        let mut measure = EqtimeMeasure::new(1);
        measure.q = std::f64::consts::PI * Vector2::new(1.0, 1.0);
        measure.measure_equal_time(&model);
        measure.normalize_stats(&model);
        measure.write_stats_to_bins(0);
        measure.analyse_stats();

        assert_relative_eq!(measure.average_sign.mean, 1.0, epsilon = 1e-12);
        assert_relative_eq!(measure.double_occupancy.mean, 0.25, epsilon = 1e-9);
        assert_relative_eq!(measure.local_spin_correlation.mean, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn clear_resets_the_accumulators() {
        let mut model = free_model();
        model.sweep_0_to_beta(4);
        model.sweep_beta_to_0(4);

        let mut measure = EqtimeMeasure::new(1);
        measure.measure_equal_time(&model);
        assert!(measure.double_occupancy.value() != 0.0);
        measure.clear();
        assert_relative_eq!(measure.double_occupancy.value(), 0.0);
        assert_relative_eq!(measure.average_sign.value(), 0.0);
    }
}
