//! Hubbard model state, lattice geometry and propagator algebra.

mod hubbard;
mod lattice;
mod propagator;

pub use hubbard::{Hubbard, ModelParams};
pub use lattice::SquareLattice;
pub use propagator::Propagator;
