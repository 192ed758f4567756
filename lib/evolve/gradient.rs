//! Adjoint computation of gradient signals.
//!
//! For an observable `O` measured on the final state, the co-state
//! `λ(t) = U(T, t)^† O ψ(T)` obeys the same equation of motion as `ψ`, and the
//! sensitivity of `<ψ(T)|O|ψ(T)>` to a perturbation `c_j(t) A_j` of the
//! Hamiltonian is
//! ```text
//! φ_j(t) = 2 Im <λ(t)| A_j(t) |ψ(t)>
//! ```
//! The state is first run forward to the final time; the state and one
//! co-state per observable are then run backward together, sampling `φ` at
//! every grid point on the way. Intermediate forward states are not stored,
//! so the backward trajectory of `ψ` is a re-integration and agrees with the
//! forward one only up to integrator error.

use ndarray::{ self as nd, linalg, s };
use num_complex::Complex64 as C64;
use crate::{
    device::Device,
    error::{ EvolveError, Result },
    evolve::{ self, EvolutionMode, Observer },
    grid::TimeGrid,
    hilbert::Basis,
    workspace,
};

/// Compute gradient signals for each observable, returning a tensor of shape
/// `(nsteps + 1, ngrades, nobservables)`.
///
/// `psi0` and the observables are given in `basis`.
pub fn gradient_signals<Dev>(
    mode: EvolutionMode,
    device: &Dev,
    basis: Basis,
    grid: &TimeGrid,
    psi0: &nd::Array1<C64>,
    observables: &[nd::Array2<C64>],
) -> Result<nd::Array3<f64>>
where Dev: Device + ?Sized
{
    let mut phi: nd::Array3<f64>
        = nd::Array3::zeros((grid.npoints(), device.ngrades(), observables.len()));
    gradient_signals_into(
        mode, device, basis, grid, psi0, observables, &mut phi, None)?;
    Ok(phi)
}

/// Like [`gradient_signals`], but write into a caller-supplied buffer and
/// invoke `observer` at every point of the forward pass.
///
/// Fails before any integration if there are no observables or any of the
/// state, observables, or buffer has the wrong shape.
#[allow(clippy::too_many_arguments)]
pub fn gradient_signals_into<Dev>(
    mode: EvolutionMode,
    device: &Dev,
    basis: Basis,
    grid: &TimeGrid,
    psi0: &nd::Array1<C64>,
    observables: &[nd::Array2<C64>],
    phi: &mut nd::Array3<f64>,
    observer: Option<&mut Observer<'_>>,
) -> Result<()>
where Dev: Device + ?Sized
{
    let n = device.nstates();
    let nobs = observables.len();
    if nobs == 0 {
        return Err(EvolveError::config("gradient signals need at least one observable"));
    }
    evolve::check_state(device, psi0)?;
    for op in observables.iter() {
        if op.shape() != &[n, n][..] {
            return Err(EvolveError::shape("observable", &[n, n], op.shape()));
        }
    }
    let expected = [grid.npoints(), device.ngrades(), nobs];
    if phi.shape() != &expected[..] {
        return Err(EvolveError::shape("gradient signals", &expected, phi.shape()));
    }

    let work = mode.work_basis();
    let nsteps = grid.nsteps();
    tracing::debug!(?mode, nsteps, nobs, ngrades = device.ngrades(), "computing gradient signals");

    // forward; rotations write into the pooled buffers in place
    let one = C64::from(1.0);
    let zero = C64::from(0.0);
    let mut psi = workspace::acquire("gradient_signals.psi", n);
    if work != basis {
        linalg::general_mat_vec_mul(
            one, &device.basis_rotation(basis, work), psi0, zero, &mut *psi);
    } else {
        psi.assign(psi0);
    }
    evolve::propagate(mode, device, grid, &mut psi, observer)?;

    // co-states, built from the final state as seen in the caller's basis
    let mut lambda = workspace::acquire("gradient_signals.costates", (n, nobs));
    if work != basis {
        let mut psi_caller = workspace::acquire("gradient_signals.psi_caller", n);
        linalg::general_mat_vec_mul(
            one, &device.basis_rotation(work, basis), &*psi, zero, &mut *psi_caller);
        let mut lambda_caller
            = workspace::acquire("gradient_signals.costates_caller", (n, nobs));
        for (mut lk, op) in lambda_caller.axis_iter_mut(nd::Axis(1)).zip(observables) {
            linalg::general_mat_vec_mul(one, op, &*psi_caller, zero, &mut lk);
        }
        linalg::general_mat_mul(
            one, &device.basis_rotation(basis, work), &*lambda_caller, zero, &mut *lambda);
    } else {
        for (mut lk, op) in lambda.axis_iter_mut(nd::Axis(1)).zip(observables) {
            lk.assign(&op.dot(&*psi));
        }
    }

    // backward
    let steps: Vec<(f64, f64)> = grid.steps().collect();
    let t_final = steps.last().map(|(t, dt)| t + dt).unwrap_or_else(|| grid.time_at(0));
    sample(mode, device, t_final, &psi, &lambda, phi.slice_mut(s![nsteps, .., ..]));
    for (i, (t, dt)) in steps.into_iter().enumerate().rev() {
        evolve::rk4_step(mode, device, work, t + dt, &mut *psi, -dt)?;
        evolve::rk4_step(mode, device, work, t + dt, &mut *lambda, -dt)?;
        sample(mode, device, t, &psi, &lambda, phi.slice_mut(s![i, .., ..]));
    }
    tracing::trace!("backward pass complete");
    Ok(())
}

// write `2 Im <λ_k| A_j |ψ>` into `phi_t[[j, k]]`
fn sample<Dev>(
    mode: EvolutionMode,
    device: &Dev,
    t: f64,
    psi: &nd::Array1<C64>,
    lambda: &nd::Array2<C64>,
    mut phi_t: nd::ArrayViewMut2<f64>,
)
where Dev: Device + ?Sized
{
    let work = mode.work_basis();
    let framed: Option<(nd::Array1<C64>, nd::Array2<C64>)>
        = mode.frame(device, work, t)
        .map(|u| (u.dot(psi), u.dot(lambda)));
    let (psi_f, lambda_f)
        = match framed.as_ref() {
            Some((psi_u, lambda_u)) => (psi_u.view(), lambda_u.view()),
            None => (psi.view(), lambda.view()),
        };
    for ((j, k), phi_jk) in phi_t.indexed_iter_mut() {
        *phi_jk = 2.0 * device.braket(j, work, t, lambda_f.column(k), psi_f).im;
    }
}
