//! Device models: the source of every Hamiltonian piece used during
//! evolution.
//!
//! The evolution code only ever talks to a device through [`Device`]; see
//! [`transmon`] for the concrete implementation shipped with the crate.

use ndarray as nd;
use num_complex::Complex64 as C64;
use crate::{
    error::Result,
    grid::TimeGrid,
    hilbert::{ self, Basis },
};

pub mod signal;
pub use signal::Signal;

pub mod transmon;
pub use transmon::{ Coupling, Drive, Qubit, TransmonDevice };

/// Basic requirements for any controllable device.
///
/// The full Hamiltonian is `H(t) = H0 + V(t)`, where the drive part can be
/// decomposed over [`ngrades`][Self::ngrades] Hermitian gradient operators
/// with real, time-dependent coefficients. All operators are returned in the
/// requested [`Basis`].
pub trait Device {
    /// Dimension of the device's Hilbert space.
    fn nstates(&self) -> usize;

    /// Number of independent gradient operators.
    fn ngrades(&self) -> usize;

    /// Number of variational parameters.
    fn nparameters(&self) -> usize;

    /// Current values of the variational parameters.
    fn parameters(&self) -> nd::Array1<f64>;

    /// Bind new values to the variational parameters.
    ///
    /// Fails if `x` does not have exactly [`nparameters`][Self::nparameters]
    /// elements.
    fn set_parameters(&mut self, x: &[f64]) -> Result<()>;

    /// Unitary taking coordinates in basis `from` to coordinates in basis
    /// `to`.
    fn basis_rotation(&self, from: Basis, to: Basis) -> nd::Array2<C64>;

    /// The static Hamiltonian `H0`.
    fn static_hamiltonian(&self, basis: Basis) -> nd::Array2<C64>;

    /// The static propagator `U(t) = exp(-i H0 t)`.
    fn evolver(&self, basis: Basis, t: f64) -> nd::Array2<C64>;

    /// The drive operator `V(t)`.
    fn drive_operator(&self, basis: Basis, t: f64) -> nd::Array2<C64>;

    /// The `j`-th gradient operator at time `t`.
    ///
    /// *Panics* if `j >= self.ngrades()`.
    fn gradient_operator(&self, j: usize, basis: Basis, t: f64)
        -> nd::Array2<C64>;

    /// Compute `<lambda| A_j(t) |psi>` for the `j`-th gradient operator.
    fn braket(
        &self,
        j: usize,
        basis: Basis,
        t: f64,
        lambda: nd::ArrayView1<C64>,
        psi: nd::ArrayView1<C64>,
    ) -> C64
    {
        hilbert::braket(&lambda, &self.gradient_operator(j, basis, t), &psi)
    }

    /// Integrate the gradient signals of a single observable, `phi[[i, j]]`
    /// for grid point `i` and gradient operator `j`, into the gradient of that
    /// observable with respect to each variational parameter.
    fn gradient(&self, grid: &TimeGrid, phi: nd::ArrayView2<f64>)
        -> Result<nd::Array1<f64>>;
}
