//! TOML description of a single simulation run.
//!
//! ```toml
//! [device]
//! nlevels = 3
//! qubits = [
//!     { frequency = 30.0, anharmonicity = 1.4 },
//!     { frequency = 31.5, anharmonicity = 1.4 },
//! ]
//! couplings = [ { qubits = [0, 1], strength = 0.1 } ]
//!
//! [[device.drives]]
//! qubit = 0
//! frequency = 30.0
//! signal = { kind = "windowed", duration = 20.0, values = [[0.05, 0.0], [0.02, 0.01]] }
//!
//! [grid]
//! duration = 20.0
//! nsteps = 2000
//!
//! [evolution]
//! mode = "rotating"
//! basis = "bare"
//! initial = [1, 0]
//! ```

use std::path::Path;
use ndarray as nd;
use num_complex::Complex64 as C64;
use serde::Deserialize;
use crate::{
    device::{ Coupling, Drive, Qubit, TransmonDevice },
    error::{ EvolveError, Result },
    evolve::EvolutionMode,
    grid::TimeGrid,
    hilbert::Basis,
};

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    pub nlevels: usize,
    pub qubits: Vec<Qubit>,
    #[serde(default)]
    pub couplings: Vec<Coupling>,
    #[serde(default)]
    pub drives: Vec<Drive>,
}

/// Either `duration` and `nsteps` for a uniform grid, or an explicit
/// `lattice` of times.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridConfig {
    pub duration: Option<f64>,
    pub nsteps: Option<usize>,
    pub lattice: Option<Vec<f64>>,
}

fn default_basis() -> Basis { Basis::Bare }

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvolutionConfig {
    #[serde(default)]
    pub mode: EvolutionMode,
    /// Basis of the initial state and observables.
    #[serde(default = "default_basis")]
    pub basis: Basis,
    /// Per-qubit occupations of the initial product state.
    pub initial: Vec<usize>,
    /// Qubits whose number operators are observed; all of them if empty.
    #[serde(default)]
    pub observe: Vec<usize>,
}

/// Top-level run configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimConfig {
    pub device: DeviceConfig,
    pub grid: GridConfig,
    pub evolution: EvolutionConfig,
}

impl SimConfig {
    /// Parse from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Read and parse a TOML file.
    pub fn from_file<P>(path: P) -> Result<Self>
    where P: AsRef<Path>
    {
        let s = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&s)
    }

    /// Construct the described device.
    pub fn build_device(&self) -> Result<TransmonDevice> {
        let DeviceConfig { nlevels, qubits, couplings, drives } = &self.device;
        TransmonDevice::new(*nlevels, qubits.clone(), couplings.clone(), drives.clone())
    }

    /// Construct the described time grid.
    pub fn build_grid(&self) -> Result<TimeGrid> {
        match &self.grid {
            GridConfig { duration: None, nsteps: None, lattice: Some(times) } => {
                TimeGrid::lattice(nd::Array1::from(times.clone()))
            },
            GridConfig { duration: Some(duration), nsteps: Some(nsteps), lattice: None } => {
                TimeGrid::uniform(*nsteps, *duration)
            },
            _ => Err(EvolveError::config(
                "grid needs either both `duration` and `nsteps` or only `lattice`"
            )),
        }
    }

    /// Construct the initial state for `device`, in the configured basis.
    pub fn initial_state(&self, device: &TransmonDevice)
        -> Result<nd::Array1<C64>>
    {
        device.bare_state(&self.evolution.initial)
    }

    /// Number operators of the observed qubits, in the configured basis.
    pub fn observables(&self, device: &TransmonDevice)
        -> Result<Vec<nd::Array2<C64>>>
    {
        let basis = self.evolution.basis;
        if self.evolution.observe.is_empty() {
            Ok((0..device.nqubits()).map(|q| device.number_operator(q, basis)).collect())
        } else {
            self.evolution.observe.iter()
                .map(|q| {
                    EvolveError::check_bounds(*q, device.nqubits())?;
                    Ok(device.number_operator(*q, basis))
                })
                .collect()
        }
    }
}
