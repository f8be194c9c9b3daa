//! IO module - run configuration handling.

pub mod config;

pub use config::{read_config, Momentum, OutputConfig, SimulationConfig};
