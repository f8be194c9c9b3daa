//! YAML run configuration.
//!
//! One document per run, mirroring the programmatic setters of the driver:
//!
//! ```yaml
//! model:
//!   ll: 4
//!   lt: 80
//!   beta: 4.0
//!   t: 1.0
//!   u: 4.0
//!   mu: 0.0
//!   nwrap: 10
//!   seed: 42
//! monte_carlo:
//!   nwarm: 400
//!   nbin: 20
//!   nsweep: 100
//!   n_between_bins: 10
//! controls:
//!   warm_up: true
//!   measure_eqtime: true
//!   measure_dynamic: false
//! momentum:
//!   qx: 1.0
//!   qy: 1.0
//! ```

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dqmc::{Controls, MonteCarloParams};
use crate::model::ModelParams;

/// Full configuration of one simulation run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub model: ModelParams,
    pub monte_carlo: MonteCarloParams,
    pub controls: Controls,
    #[serde(default)]
    pub momentum: Momentum,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Wave vector in multiples of pi.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Momentum {
    pub qx: f64,
    pub qy: f64,
}

impl Default for Momentum {
    fn default() -> Self {
        Self { qx: 1.0, qy: 1.0 }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory the output files are written to; defaults to the working
    /// directory
    #[serde(default)]
    pub dir: Option<String>,
}

/// Read a [`SimulationConfig`] from a YAML file.
pub fn read_config(path: &Path) -> io::Result<SimulationConfig> {
    let reader = BufReader::new(File::open(path)?);
    serde_yaml::from_reader(reader).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
