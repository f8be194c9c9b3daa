//! Measurement modules - observables accumulated from sampled Green's
//! functions, binned per measurement block.

mod dynamic;
mod eqtime;
mod observable;

pub use dynamic::DynamicMeasure;
pub use eqtime::EqtimeMeasure;
pub use observable::Observable;
