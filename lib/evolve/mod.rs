//! Fixed-step fourth-order Runge-Kutta integration of the Schrödinger
//! equation
//! ```text
//! dψ/dt = -i H(t) ψ
//! ```
//! for a single state or a bundle of states, driven by a [`Device`].
//!
//! Integration happens in the *work basis* of an [`EvolutionMode`]; callers
//! hand in and get back states in whatever [`Basis`] they like, and the
//! rotation in and out is done here.

use ndarray as nd;
use num_complex::Complex64 as C64;
use serde::Deserialize;
use crate::{
    device::Device,
    error::{ EvolveError, Result },
    grid::TimeGrid,
    hilbert::{ self, Basis },
};

pub mod gradient;
pub use gradient::{ gradient_signals, gradient_signals_into };

/// Picture in which the Hamiltonian is assembled.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvolutionMode {
    /// Interaction picture with respect to the static Hamiltonian, in the
    /// dressed basis: `H(t) = U(t)^† V(t) U(t)` with `U(t) = exp(-i H0 t)`.
    #[default]
    Rotating,
    /// Lab frame, in the bare basis: `H(t) = H0 + V(t)`.
    Direct,
}

impl EvolutionMode {
    /// Basis in which states are integrated.
    pub fn work_basis(self) -> Basis {
        match self {
            Self::Rotating => Basis::Dressed,
            Self::Direct => Basis::Bare,
        }
    }

    /// Assemble the Hamiltonian at time `t`.
    pub fn hamiltonian<Dev>(self, device: &Dev, basis: Basis, t: f64)
        -> nd::Array2<C64>
    where Dev: Device + ?Sized
    {
        match self {
            Self::Rotating => {
                let u = device.evolver(basis, t);
                let v = device.drive_operator(basis, t);
                hilbert::adjoint(&u).dot(&v).dot(&u)
            },
            Self::Direct => {
                device.static_hamiltonian(basis) + device.drive_operator(basis, t)
            },
        }
    }

    /// Transformation taking states of this picture to the lab frame at time
    /// `t`; `None` if the picture already is the lab frame.
    ///
    /// Gradient operators act on lab-frame states, so
    /// `<lambda| U^† A U |psi>` is computed as `<U lambda| A |U psi>`.
    pub fn frame<Dev>(self, device: &Dev, basis: Basis, t: f64)
        -> Option<nd::Array2<C64>>
    where Dev: Device + ?Sized
    {
        match self {
            Self::Rotating => Some(device.evolver(basis, t)),
            Self::Direct => None,
        }
    }
}

/// Quantum state arrays that can be acted on by a Hamiltonian: a single state
/// vector or a column-wise bundle of them.
pub trait Propagand: nd::Dimension {
    /// Compute `h z`.
    fn apply(h: &nd::Array2<C64>, z: &nd::Array<C64, Self>)
        -> nd::Array<C64, Self>;
}

impl Propagand for nd::Ix1 {
    fn apply(h: &nd::Array2<C64>, z: &nd::Array1<C64>) -> nd::Array1<C64> {
        h.dot(z)
    }
}

impl Propagand for nd::Ix2 {
    fn apply(h: &nd::Array2<C64>, z: &nd::Array2<C64>) -> nd::Array2<C64> {
        h.dot(z)
    }
}

fn rhs<D>(h: &nd::Array2<C64>, z: &nd::Array<C64, D>) -> nd::Array<C64, D>
where D: Propagand
{
    D::apply(h, z) * (-C64::i())
}

/// Compute the time derivative `-i H(t) z` of a state or bundle of states.
pub fn derivative<Dev, D>(
    mode: EvolutionMode,
    device: &Dev,
    basis: Basis,
    t: f64,
    z: &nd::Array<C64, D>,
) -> nd::Array<C64, D>
where
    Dev: Device + ?Sized,
    D: Propagand,
{
    rhs(&mode.hamiltonian(device, basis, t), z)
}

/// Advance `z` in place by one RK4 step of (signed) size `dt`, starting at
/// time `t`.
///
/// Fails if the result contains non-finite entries.
pub fn rk4_step<Dev, D>(
    mode: EvolutionMode,
    device: &Dev,
    basis: Basis,
    t: f64,
    z: &mut nd::Array<C64, D>,
    dt: f64,
) -> Result<()>
where
    Dev: Device + ?Sized,
    D: Propagand,
{
    let k1 = derivative(mode, device, basis, t, z);
    let k2 = derivative(mode, device, basis, t + dt / 2.0, &(&*z + &k1 * (dt / 2.0)));
    let k3 = derivative(mode, device, basis, t + dt / 2.0, &(&*z + &k2 * (dt / 2.0)));
    let k4 = derivative(mode, device, basis, t + dt, &(&*z + &k3 * dt));
    *z += &((k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0));
    if z.iter().all(|a| a.re.is_finite() && a.im.is_finite()) {
        Ok(())
    } else {
        Err(EvolveError::Divergence { t: t + dt })
    }
}

/// Callback invoked at every grid point with the point's index, its time, and
/// the state there (in the work basis).
pub type Observer<'a> = dyn FnMut(usize, f64, nd::ArrayView1<C64>) + 'a;

// step `psi` (already in the work basis) across the grid
pub(crate) fn propagate<Dev>(
    mode: EvolutionMode,
    device: &Dev,
    grid: &TimeGrid,
    psi: &mut nd::Array1<C64>,
    mut observer: Option<&mut Observer<'_>>,
) -> Result<()>
where Dev: Device + ?Sized
{
    let basis = mode.work_basis();
    if let Some(f) = observer.as_deref_mut() {
        f(0, grid.time_at(0), psi.view());
    }
    for (i, (t, dt)) in grid.steps().enumerate() {
        rk4_step(mode, device, basis, t, psi, dt)?;
        if let Some(f) = observer.as_deref_mut() {
            f(i + 1, t + dt, psi.view());
        }
    }
    Ok(())
}

pub(crate) fn check_state<Dev>(device: &Dev, psi: &nd::Array1<C64>)
    -> Result<()>
where Dev: Device + ?Sized
{
    if psi.len() != device.nstates() {
        Err(EvolveError::shape("state", &[device.nstates()], psi.shape()))
    } else {
        Ok(())
    }
}

/// Evolve `psi`, given and returned in `basis`, across `grid`.
///
/// The observer, if any, sees every grid point, including the first.
pub fn evolve<Dev>(
    mode: EvolutionMode,
    device: &Dev,
    basis: Basis,
    grid: &TimeGrid,
    psi: &mut nd::Array1<C64>,
    observer: Option<&mut Observer<'_>>,
) -> Result<()>
where Dev: Device + ?Sized
{
    check_state(device, psi)?;
    let work = mode.work_basis();
    tracing::debug!(?mode, nsteps = grid.nsteps(), "evolving state");
    if work != basis {
        hilbert::rotate_state(&device.basis_rotation(basis, work), psi);
    }
    propagate(mode, device, grid, psi, observer)?;
    if work != basis {
        hilbert::rotate_state(&device.basis_rotation(work, basis), psi);
    }
    Ok(())
}

/// Like [`evolve`], but return the final state instead of mutating the
/// initial one.
pub fn evolved<Dev>(
    mode: EvolutionMode,
    device: &Dev,
    basis: Basis,
    grid: &TimeGrid,
    psi0: &nd::Array1<C64>,
) -> Result<nd::Array1<C64>>
where Dev: Device + ?Sized
{
    let mut psi = psi0.clone();
    evolve(mode, device, basis, grid, &mut psi, None)?;
    Ok(psi)
}

#[cfg(test)]
mod test {
    use std::f64::consts::PI;
    use approx::assert_abs_diff_eq;
    use crate::{
        device::{ Drive, Qubit, Signal, TransmonDevice },
        hilbert::StateNorm,
    };
    use super::*;

    // two-level system driven on resonance; in the rotating frame this is a
    // constant `Ω σ_x`
    fn rabi_device(omega: f64, rabi: f64) -> TransmonDevice {
        TransmonDevice::new(
            2,
            vec![Qubit { frequency: omega, anharmonicity: 0.0 }],
            vec![],
            vec![Drive {
                qubit: 0,
                frequency: omega,
                signal: Signal::new_constant(C64::from(rabi)),
            }],
        ).unwrap()
    }

    fn ground() -> nd::Array1<C64> { nd::array![C64::from(1.0), C64::from(0.0)] }

    #[test]
    fn rabi_oscillation() {
        let rabi = 1.3;
        let grid = TimeGrid::from_stepsize(100, 0.01).unwrap();
        for &(mode, omega) in [(EvolutionMode::Rotating, 5.0), (EvolutionMode::Direct, 2.0)].iter() {
            let device = rabi_device(omega, rabi);
            let mut pops: Vec<(f64, f64)> = Vec::new();
            let mut psi = ground();
            evolve(
                mode, &device, Basis::Bare, &grid, &mut psi,
                Some(&mut |_, t, state| pops.push((t, state[1].norm_sqr()))),
            ).unwrap();
            assert_eq!(pops.len(), 101);
            for (t, p1) in pops.into_iter() {
                assert_abs_diff_eq!(p1, (rabi * t).sin().powi(2), epsilon = 1e-6);
            }
            assert_abs_diff_eq!(psi[1].norm_sqr(), (rabi * 1.0).sin().powi(2), epsilon = 1e-6);
        }
    }

    #[test]
    fn fourth_order_convergence() {
        // Ω = π, T = 1: a full flop back to -|0>
        let device = rabi_device(4.0, PI);
        let exact: nd::Array1<C64> = nd::array![C64::from(-1.0), C64::from(0.0)];
        let err = |nsteps: usize| -> f64 {
            let grid = TimeGrid::uniform(nsteps, 1.0).unwrap();
            let psi = evolved(EvolutionMode::Rotating, &device, Basis::Bare, &grid, &ground())
                .unwrap();
            (&psi - &exact).norm()
        };
        let ratio = err(50) / err(100);
        assert!((15.0..17.0).contains(&ratio), "error ratio {ratio}");
    }

    #[test]
    fn unitarity_improves_with_smaller_steps() {
        let device = rabi_device(5.0, 0.5);
        let dev_at = |nsteps: usize| -> f64 {
            let grid = TimeGrid::uniform(nsteps, 2.0).unwrap();
            let psi = evolved(EvolutionMode::Direct, &device, Basis::Bare, &grid, &ground())
                .unwrap();
            (psi.norm() - 1.0).abs()
        };
        let coarse = dev_at(40);
        let fine = dev_at(80);
        assert!(fine < coarse);
        assert!(fine < 1e-4);
    }

    #[test]
    fn forward_backward_round_trip() {
        let device = rabi_device(2.0, 0.7);
        let grid = TimeGrid::uniform(200, 2.0).unwrap();
        let basis = EvolutionMode::Direct.work_basis();
        let psi0: nd::Array1<C64>
            = nd::array![C64::new(0.6, 0.0), C64::new(0.0, 0.8)];
        let mut psi = psi0.clone();
        evolve(EvolutionMode::Direct, &device, basis, &grid, &mut psi, None).unwrap();
        let steps: Vec<(f64, f64)> = grid.steps().collect();
        for (t, dt) in steps.into_iter().rev() {
            rk4_step(EvolutionMode::Direct, &device, basis, t + dt, &mut psi, -dt).unwrap();
        }
        assert!((&psi - &psi0).norm() < 1e-7);
    }

    #[test]
    fn bundles_step_column_wise() {
        let device = rabi_device(3.0, 0.9);
        let basis = Basis::Dressed;
        let a: nd::Array1<C64> = nd::array![C64::from(1.0), C64::from(0.0)];
        let b: nd::Array1<C64> = nd::array![C64::new(0.0, 0.6), C64::from(0.8)];
        let mut bundle: nd::Array2<C64> = nd::Array2::zeros((2, 2));
        bundle.column_mut(0).assign(&a);
        bundle.column_mut(1).assign(&b);
        let mut a1 = a.clone();
        let mut b1 = b.clone();
        let (t, dt) = (0.3, 0.05);
        rk4_step(EvolutionMode::Rotating, &device, basis, t, &mut bundle, dt).unwrap();
        rk4_step(EvolutionMode::Rotating, &device, basis, t, &mut a1, dt).unwrap();
        rk4_step(EvolutionMode::Rotating, &device, basis, t, &mut b1, dt).unwrap();
        assert!((&bundle.column(0) - &a1).norm() < 1e-14);
        assert!((&bundle.column(1) - &b1).norm() < 1e-14);
    }

    #[test]
    fn observer_sees_every_point() {
        let device = rabi_device(1.0, 0.2);
        let grid = TimeGrid::uniform(10, 0.5).unwrap();
        let mut seen: Vec<(usize, f64)> = Vec::new();
        let mut psi = ground();
        evolve(
            EvolutionMode::Rotating, &device, Basis::Dressed, &grid, &mut psi,
            Some(&mut |i, t, _| seen.push((i, t))),
        ).unwrap();
        assert_eq!(seen.len(), 11);
        for (k, (i, t)) in seen.into_iter().enumerate() {
            assert_eq!(i, k);
            assert_abs_diff_eq!(t, grid.time_at(k), epsilon = 1e-12);
        }
    }

    #[test]
    fn lattice_matches_uniform() {
        let device = rabi_device(2.0, 0.8);
        let uniform = TimeGrid::uniform(50, 1.0).unwrap();
        let lattice = TimeGrid::lattice(uniform.lattice_times()).unwrap();
        for &mode in [EvolutionMode::Rotating, EvolutionMode::Direct].iter() {
            let psi_u = evolved(mode, &device, Basis::Bare, &uniform, &ground()).unwrap();
            let psi_l = evolved(mode, &device, Basis::Bare, &lattice, &ground()).unwrap();
            assert!((&psi_u - &psi_l).norm() < 1e-12);
        }
    }

    #[test]
    fn derivative_is_schrodinger() {
        let device = rabi_device(2.0, 0.5);
        let psi = ground();
        let t = 0.4;
        let dpsi = derivative(EvolutionMode::Direct, &device, Basis::Bare, t, &psi);
        let h = EvolutionMode::Direct.hamiltonian(&device, Basis::Bare, t);
        assert!(hilbert::is_hermitian(&h, 1e-12));
        let expected = h.dot(&psi).mapv(|x| -C64::i() * x);
        assert!((&dpsi - &expected).norm() < 1e-14);
    }

    #[test]
    fn step_composes_derivative_stages() {
        let device = rabi_device(3.0, 0.9);
        let (t, dt) = (0.25, 0.1);
        for &mode in [EvolutionMode::Rotating, EvolutionMode::Direct].iter() {
            let basis = mode.work_basis();
            let z0: nd::Array1<C64> = nd::array![C64::new(0.6, 0.0), C64::new(0.0, 0.8)];
            let f = |s: f64, z: &nd::Array1<C64>| derivative(mode, &device, basis, s, z);
            let k1 = f(t, &z0);
            let k2 = f(t + dt / 2.0, &(&z0 + &k1 * (dt / 2.0)));
            let k3 = f(t + dt / 2.0, &(&z0 + &k2 * (dt / 2.0)));
            let k4 = f(t + dt, &(&z0 + &k3 * dt));
            let expected = &z0 + &((k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0));
            let mut z = z0.clone();
            rk4_step(mode, &device, basis, t, &mut z, dt).unwrap();
            assert!((&z - &expected).norm() < 1e-14);
        }
    }

    #[test]
    fn divergence_and_shape_errors() {
        let device = rabi_device(1.0, f64::NAN);
        let grid = TimeGrid::uniform(5, 1.0).unwrap();
        let mut psi = ground();
        assert!(matches!(
            evolve(EvolutionMode::Rotating, &device, Basis::Bare, &grid, &mut psi, None),
            Err(EvolveError::Divergence { .. }),
        ));
        let mut bad: nd::Array1<C64> = nd::Array1::zeros(3);
        assert!(matches!(
            evolve(EvolutionMode::Direct, &device, Basis::Bare, &grid, &mut bad, None),
            Err(EvolveError::Shape { .. }),
        ));
    }
}
