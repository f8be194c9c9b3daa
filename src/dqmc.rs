//! DQMC driver: warm-up, measurement bins, decorrelation sweeps and the
//! file-output entry points.

use std::f64::consts::PI;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use log::{info, warn};
use nalgebra::{DMatrix, Vector2};
use serde::{Deserialize, Serialize};

use crate::measure::{DynamicMeasure, EqtimeMeasure};
use crate::model::{Hubbard, ModelParams};

/// Average-sign magnitude below which the run is flagged as sign-problem
/// dominated.
const SIGN_WARN_THRESHOLD: f64 = 0.1;

/// Monte Carlo schedule parameters.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MonteCarloParams {
    /// Warm-up sweeps (counted singly; performed as back-and-forth pairs)
    pub nwarm: usize,
    /// Number of measurement bins
    pub nbin: usize,
    /// Measurement sweeps per bin
    pub nsweep: usize,
    /// Decorrelation sweep pairs between bins
    pub n_between_bins: usize,
}

/// Control flags selecting which phases of the run are performed.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Controls {
    pub warm_up: bool,
    pub measure_eqtime: bool,
    pub measure_dynamic: bool,
}

/// Owns the model and the measurement modules for one simulation.
/// Reconfiguration replaces the owned model atomically; measurements borrow
/// it only for the duration of a measurement call.
pub struct DetQmc {
    pub hubb: Hubbard,
    pub eqtime: Option<EqtimeMeasure>,
    pub dynamic: Option<DynamicMeasure>,
    pub model: ModelParams,
    pub mc: MonteCarloParams,
    pub controls: Controls,
    /// Wave vector in multiples of pi, as given on input
    q: Vector2<f64>,
    nwrap: usize,
    run_time: Option<Duration>,
}

impl DetQmc {
    pub fn new(
        model: ModelParams,
        mc: MonteCarloParams,
        controls: Controls,
        qx: f64,
        qy: f64,
    ) -> Self {
        let hubb = Hubbard::new(&model);
        let mut qmc = Self {
            hubb,
            eqtime: None,
            dynamic: None,
            model,
            mc,
            controls,
            q: Vector2::new(qx, qy),
            nwrap: model.nwrap,
            run_time: None,
        };
        qmc.init_measure();
        qmc
    }

    /// Replace the model. Existing measurement modules are rebuilt to match.
    pub fn set_model_params(&mut self, model: ModelParams) {
        self.hubb = Hubbard::new(&model);
        self.model = model;
        self.nwrap = model.nwrap;
        self.init_measure();
    }

    pub fn set_monte_carlo_params(&mut self, mc: MonteCarloParams) {
        self.mc = mc;
        self.init_measure();
    }

    pub fn set_controlling_params(&mut self, controls: Controls) {
        self.controls = controls;
        self.init_measure();
    }

    /// Wave vector in multiples of pi; the stored momentum is `pi * q`.
    pub fn set_lattice_momentum(&mut self, qx: f64, qy: f64) {
        self.q = Vector2::new(qx, qy);
        if let Some(measure) = &mut self.eqtime {
            measure.q = PI * self.q;
        }
        if let Some(measure) = &mut self.dynamic {
            measure.q = PI * self.q;
        }
    }

    /// Allocate the measurement modules selected by the control flags.
    pub fn init_measure(&mut self) {
        self.eqtime = if self.controls.measure_eqtime {
            let mut measure = EqtimeMeasure::new(self.mc.nbin);
            measure.q = PI * self.q;
            Some(measure)
        } else {
            None
        };
        self.dynamic = if self.controls.measure_dynamic {
            let mut measure = DynamicMeasure::new(self.mc.nbin, &self.hubb);
            measure.q = PI * self.q;
            Some(measure)
        } else {
            None
        };
    }

    /// Run the full Monte Carlo schedule: warm-up, then `nbin` measurement
    /// blocks separated by decorrelation sweeps.
    pub fn run_qmc(&mut self, display: bool) {
        let begin = Instant::now();
        if let Some(measure) = &mut self.eqtime {
            measure.clear();
        }
        if let Some(measure) = &mut self.dynamic {
            measure.clear(&self.hubb);
        }

        if self.controls.warm_up {
            let pairs = self.mc.nwarm / 2;
            for nwm in 1..=pairs {
                self.sweep_back_and_forth(false, false);
                if display && nwm % 10 == 0 {
                    println!("  warm-up sweep pair {nwm}/{pairs}");
                }
            }
        }

        if self.controls.measure_eqtime || self.controls.measure_dynamic {
            let pairs = self.mc.nsweep / 2;
            for bin in 0..self.mc.nbin {
                for nsw in 1..=pairs {
                    self.sweep_back_and_forth(
                        self.controls.measure_eqtime,
                        self.controls.measure_dynamic,
                    );
                    if display && nsw % 10 == 0 {
                        println!("  bin {bin}: sweep pair {nsw}/{pairs}");
                    }
                }

                if let Some(measure) = &mut self.eqtime {
                    measure.normalize_stats(&self.hubb);
                    measure.write_stats_to_bins(bin);
                    measure.clear();
                }
                if let Some(measure) = &mut self.dynamic {
                    measure.normalize_stats(&self.hubb);
                    measure.write_stats_to_bins(bin);
                    measure.clear(&self.hubb);
                }

                // avoid correlation between bins
                for _ in 0..self.mc.n_between_bins {
                    self.sweep_back_and_forth(false, false);
                }
            }
        }

        self.run_time = Some(begin.elapsed());
        info!(
            "max wrap error (equal-time): {:.3e}",
            self.hubb.max_wrap_error_equal
        );
        info!(
            "max wrap error (time-displaced): {:.3e}",
            self.hubb.max_wrap_error_displaced
        );
    }

    /// One forward/backward sweep pair. The forward leg computes displaced
    /// Green's functions instead of updating the field when `dynamic` is
    /// set; equal-time measurements run after both legs.
    pub fn sweep_back_and_forth(&mut self, eqtime: bool, dynamic: bool) {
        if dynamic {
            self.hubb.sweep_0_to_beta_displaced(self.nwrap);
            if let Some(measure) = &mut self.dynamic {
                measure.measure_time_displaced(&self.hubb);
            }
        } else {
            self.hubb.sweep_0_to_beta(self.nwrap);
        }
        if eqtime {
            if let Some(measure) = &mut self.eqtime {
                measure.measure_equal_time(&self.hubb);
            }
        }

        self.hubb.sweep_beta_to_0(self.nwrap);
        if eqtime {
            if let Some(measure) = &mut self.eqtime {
                measure.measure_equal_time(&self.hubb);
            }
        }
    }

    /// Compute means and errors over the completed bins.
    pub fn analyse_stats(&mut self) {
        if let Some(measure) = &mut self.eqtime {
            measure.analyse_stats();
            if measure.average_sign.mean.abs() < SIGN_WARN_THRESHOLD {
                warn!(
                    "average sign {:.4} is close to zero; statistical errors are unreliable",
                    measure.average_sign.mean
                );
            }
        }
        if let Some(measure) = &mut self.dynamic {
            measure.analyse_stats();
            if measure.average_sign.mean.abs() < SIGN_WARN_THRESHOLD {
                warn!(
                    "average sign {:.4} is close to zero; statistical errors are unreliable",
                    measure.average_sign.mean
                );
            }
        }
    }

    pub fn print_params(&self) {
        println!("==============================================================================");
        println!("  Simulation parameters:");
        println!("    ll:     {}", self.hubb.ll);
        println!("    lt:     {}", self.hubb.lt);
        println!("    beta:   {}", self.hubb.beta);
        println!("    U/t:    {}", self.hubb.u_int / self.hubb.t);
        println!("    mu:     {}", self.hubb.mu);
        println!("    q:      {} pi, {} pi", self.q[0], self.q[1]);
        println!("    nwrap:  {}", self.nwrap);
        println!("==============================================================================");
    }

    pub fn print_stats(&self) {
        if let Some(measure) = &self.eqtime {
            println!();
            println!("  Equal-time measurements:");
            println!(
                "    Double occupancy:        {:.8}    err: {:.8}",
                measure.double_occupancy.mean, measure.double_occupancy.err
            );
            println!(
                "    Kinetic energy:          {:.8}    err: {:.8}",
                measure.kinetic_energy.mean, measure.kinetic_energy.err
            );
            println!(
                "    Momentum distribution:   {:.8}    err: {:.8}",
                measure.momentum_distribution.mean, measure.momentum_distribution.err
            );
            println!(
                "    Local spin correlation:  {:.8}    err: {:.8}",
                measure.local_spin_correlation.mean, measure.local_spin_correlation.err
            );
            println!(
                "    Structure factor:        {:.8}    err: {:.8}",
                measure.structure_factor.mean, measure.structure_factor.err
            );
            println!(
                "    Average sign (abs):      {:.8}    err: {:.8}",
                measure.average_sign.mean.abs(),
                measure.average_sign.err
            );
        }

        if let Some(measure) = &self.dynamic {
            let mid = ((self.hubb.lt as f64 / 2.0).ceil() as usize).min(self.hubb.lt - 1);
            println!();
            println!("  Time-displaced measurements:");
            println!(
                "    Correlation G(k, beta/2):  {:.8}    err: {:.8}",
                measure.g_kt[mid].mean, measure.g_kt[mid].err
            );
            println!(
                "    Helicity modulus rho_s:    {:.8}    err: {:.8}",
                measure.rho_s.mean, measure.rho_s.err
            );
            println!(
                "    Average sign (abs):        {:.8}    err: {:.8}",
                measure.average_sign.mean.abs(),
                measure.average_sign.err
            );
        }

        println!(
            "  Max wrap error: {:.3e} (equal-time), {:.3e} (time-displaced)",
            self.hubb.max_wrap_error_equal, self.hubb.max_wrap_error_displaced
        );
        if let Some(elapsed) = self.run_time {
            let secs = elapsed.as_secs_f64();
            println!("  Time cost:      {} min {:.1} s", secs as u64 / 60, secs % 60.0);
        }
        println!("==============================================================================");
    }

    /// Imaginary-time axis: `lt beta`, then `l * dtau` per slice.
    pub fn write_tau_axis(&self, path: &Path) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "{:>7}{:>7}", self.hubb.lt, self.hubb.beta)?;
        for l in 0..self.hubb.lt {
            writeln!(out, "{:>15.8}", l as f64 * self.hubb.dtau)?;
        }
        Ok(())
    }

    /// One equal-time record: `U/t, beta`, the five means, the five errors,
    /// `q_x, q_y`, each right-aligned in a 15-wide field.
    pub fn write_eqtime_stats(&self, path: &Path) -> io::Result<()> {
        let Some(measure) = &self.eqtime else {
            return Ok(());
        };
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(
            out,
            "{:>15.8}{:>15.8}{:>15.8}{:>15.8}{:>15.8}{:>15.8}{:>15.8}{:>15.8}{:>15.8}{:>15.8}{:>15.8}{:>15.8}{:>15.8}{:>15.8}",
            self.hubb.u_int / self.hubb.t,
            self.hubb.beta,
            measure.double_occupancy.mean,
            measure.kinetic_energy.mean,
            measure.structure_factor.mean,
            measure.momentum_distribution.mean,
            measure.local_spin_correlation.mean,
            measure.double_occupancy.err,
            measure.kinetic_energy.err,
            measure.structure_factor.err,
            measure.momentum_distribution.err,
            measure.local_spin_correlation.err,
            measure.q[0],
            measure.q[1],
        )?;
        Ok(())
    }

    /// Dynamic statistics: `g_kt` per slice with its error and relative
    /// error, then the helicity modulus.
    pub fn write_dynamic_stats(&self, path: &Path) -> io::Result<()> {
        let Some(measure) = &self.dynamic else {
            return Ok(());
        };
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "Momentum k: {} pi, {} pi", self.q[0], self.q[1])?;
        for l in 0..self.hubb.lt {
            let tau = (l + self.hubb.lt - 1) % self.hubb.lt;
            let obs = &measure.g_kt[tau];
            writeln!(
                out,
                "{:>15}{:>15.8}{:>15.8}{:>15.8}",
                l,
                obs.mean,
                obs.err,
                obs.err / obs.mean
            )?;
        }
        writeln!(
            out,
            "{:>15.8}{:>15.8}{:>15.8}",
            measure.rho_s.mean,
            measure.rho_s.err,
            measure.rho_s.err / measure.rho_s.mean
        )?;
        Ok(())
    }

    /// Per-bin `g_kt` values, for bin-to-bin correlation analysis.
    pub fn write_bin_corr(&self, path: &Path) -> io::Result<()> {
        let Some(measure) = &self.dynamic else {
            return Ok(());
        };
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "{:>10}", self.mc.nbin)?;
        for bin in 0..self.mc.nbin {
            writeln!(out, "{:>20}", bin)?;
            for l in 0..self.hubb.lt {
                let tau = (l + self.hubb.lt - 1) % self.hubb.lt;
                writeln!(out, "{:>20.12}", measure.g_kt[tau].bins[bin])?;
            }
        }
        Ok(())
    }

    /// Per-bin local density of states,
    /// `0.5/ls * trace(G_t0_up + G_t0_dn)` per slice.
    pub fn write_bin_ldos(&self, path: &Path) -> io::Result<()> {
        let Some(measure) = &self.dynamic else {
            return Ok(());
        };
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "{:>10}", self.mc.nbin)?;
        for bin in 0..self.mc.nbin {
            writeln!(out, "{:>20}", bin)?;
            for l in 0..self.hubb.lt {
                let tau = (l + self.hubb.lt - 1) % self.hubb.lt;
                let ldos = 0.5 / self.hubb.ls as f64
                    * (&measure.bin_gt0_up[bin][tau] + &measure.bin_gt0_dn[bin][tau]).trace();
                writeln!(out, "{:>20.12}", ldos)?;
            }
        }
        Ok(())
    }

    /// Auxiliary field, one `l i s` record per space-time site.
    pub fn write_aux_field(&self, path: &Path) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        for l in 0..self.hubb.lt {
            for i in 0..self.hubb.ls {
                writeln!(out, "{:>15}{:>15}{:>15}", l, i, self.hubb.s[(i, l)])?;
            }
        }
        Ok(())
    }

    /// Read an auxiliary field written by [`DetQmc::write_aux_field`] and
    /// re-initialize stacks, Green's functions and sign from it. The file
    /// must cover exactly the configured space-time lattice.
    pub fn read_aux_field(&mut self, path: &Path) -> io::Result<()> {
        let reader = BufReader::new(File::open(path)?);
        let mut s = DMatrix::zeros(self.hubb.ls, self.hubb.lt);
        let mut max_l = 0usize;
        let mut max_i = 0usize;
        let mut records = 0usize;

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let l: usize = parse_token(fields.next())?;
            let i: usize = parse_token(fields.next())?;
            let value: f64 = parse_token(fields.next())?;
            if l >= self.hubb.lt || i >= self.hubb.ls {
                return Err(invalid_data(format!(
                    "field record ({l}, {i}) outside the {} x {} lattice",
                    self.hubb.ls, self.hubb.lt
                )));
            }
            if value != 1.0 && value != -1.0 {
                return Err(invalid_data(format!("field value {value} is not +-1")));
            }
            s[(i, l)] = value;
            max_l = max_l.max(l);
            max_i = max_i.max(i);
            records += 1;
        }

        if records == 0 || max_l + 1 != self.hubb.lt || max_i + 1 != self.hubb.ls {
            return Err(invalid_data(format!(
                "field file covers {} slices x {} sites, expected {} x {}",
                max_l + 1,
                max_i + 1,
                self.hubb.lt,
                self.hubb.ls
            )));
        }

        self.hubb.set_field(s);
        Ok(())
    }
}

fn invalid_data(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

fn parse_token<T: std::str::FromStr>(token: Option<&str>) -> io::Result<T> {
    token
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| invalid_data("malformed auxiliary field record".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn small_qmc(u: f64, measure_dynamic: bool, seed: u64) -> DetQmc {
        DetQmc::new(
            ModelParams {
                ll: 2,
                lt: 8,
                beta: 2.0,
                t: 1.0,
                u,
                mu: 0.0,
                nwrap: 4,
                checkerboard: false,
                seed,
            },
            MonteCarloParams {
                nwarm: 4,
                nbin: 2,
                nsweep: 4,
                n_between_bins: 1,
            },
            Controls {
                warm_up: true,
                measure_eqtime: true,
                measure_dynamic,
            },
            1.0,
            1.0,
        )
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("detqmc_{}_{}", std::process::id(), name))
    }

    #[test]
    fn run_fills_every_bin() {
        let mut qmc = small_qmc(4.0, false, 3);
        qmc.run_qmc(false);
        qmc.analyse_stats();
        let measure = qmc.eqtime.as_ref().unwrap();
        assert!(measure.double_occupancy.bins.iter().all(|&x| x != 0.0));
        assert!(measure.average_sign.mean.is_finite());
    }

    #[test]
    fn equal_seeds_give_bitwise_identical_bins() {
        let mut a = small_qmc(4.0, true, 5);
        let mut b = small_qmc(4.0, true, 5);
        a.run_qmc(false);
        b.run_qmc(false);
        let ea = a.eqtime.as_ref().unwrap();
        let eb = b.eqtime.as_ref().unwrap();
        assert_eq!(ea.double_occupancy.bins, eb.double_occupancy.bins);
        assert_eq!(ea.kinetic_energy.bins, eb.kinetic_energy.bins);
        let da = a.dynamic.as_ref().unwrap();
        let db = b.dynamic.as_ref().unwrap();
        assert_eq!(da.rho_s.bins, db.rho_s.bins);
    }

    #[test]
    fn aux_field_round_trips_through_file() {
        let mut qmc = small_qmc(4.0, false, 9);
        let path = temp_path("roundtrip.dat");
        qmc.write_aux_field(&path).unwrap();
        let original = qmc.hubb.s.clone();
        let sign = qmc.hubb.config_sign;

        let mut restored = small_qmc(4.0, false, 1234);
        restored.read_aux_field(&path).unwrap();
        assert_eq!(restored.hubb.s, original);
        assert_relative_eq!(restored.hubb.config_sign, sign);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn truncated_field_file_is_rejected() {
        let path = temp_path("truncated.dat");
        std::fs::write(&path, "0 0 1\n0 1 -1\n").unwrap();
        let mut qmc = small_qmc(4.0, false, 2);
        let err = qmc.read_aux_field(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn malformed_field_file_is_rejected() {
        let path = temp_path("malformed.dat");
        std::fs::write(&path, "0 0 up\n").unwrap();
        let mut qmc = small_qmc(4.0, false, 2);
        let err = qmc.read_aux_field(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn tau_axis_file_lists_every_slice() {
        let mut qmc = small_qmc(4.0, false, 2);
        qmc.run_qmc(false);
        let path = temp_path("tau.dat");
        qmc.write_tau_axis(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), qmc.hubb.lt + 1);
        assert!(lines[0].contains('8'));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn eqtime_stats_record_has_fourteen_fields() {
        let mut qmc = small_qmc(4.0, false, 2);
        qmc.run_qmc(false);
        qmc.analyse_stats();
        let path = temp_path("eqtime.dat");
        qmc.write_eqtime_stats(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        let fields: Vec<&str> = contents.split_whitespace().collect();
        assert_eq!(fields.len(), 14);
        std::fs::remove_file(&path).ok();
    }
}
