//! detqmc - determinant quantum Monte Carlo in Rust
//!
//! This crate implements the determinant QMC algorithm for the
//! two-dimensional square-lattice Hubbard model: Metropolis sampling of a
//! discrete auxiliary field, numerically stable propagation of equal-time
//! and time-displaced Green's functions through a stack of SVD
//! factorizations, and binned measurements of equal-time and dynamical
//! observables.

pub mod dqmc;
pub mod greens;
pub mod io;
pub mod measure;
pub mod model;
pub mod svd_stack;

// Re-export commonly used types at crate root
pub use dqmc::{Controls, DetQmc, MonteCarloParams};
pub use greens::{compute_green_displaced, compute_green_eqtime, matrix_compare_error};
pub use io::{read_config, Momentum, OutputConfig, SimulationConfig};
pub use measure::{DynamicMeasure, EqtimeMeasure, Observable};
pub use model::{Hubbard, ModelParams, Propagator, SquareLattice};
pub use svd_stack::SvdStack;
