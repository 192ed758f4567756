//! A linear chain of coupled, driven transmons, modeled as truncated
//! anharmonic oscillators.
//!
//! The static Hamiltonian is
//! ```text
//! H0 = \sum_q ω_q a_q^† a_q - (δ_q / 2) a_q^† a_q^† a_q a_q
//!     + \sum_{pq} g_pq (a_p^† a_q + a_q^† a_p)
//! ```
//! and each drive `d` on qubit `q` contributes
//! ```text
//! V_d(t) = Ω_d(t) exp(i ν_d t) a_q + h.c.
//!        = Re[Ω_d(t)] P_d(t) + Im[Ω_d(t)] Q_d(t)
//! ```
//! with gradient operators `P_d = exp(i ν_d t) a_q + h.c.` (index `2d`) and
//! `Q_d = i exp(i ν_d t) a_q + h.c.` (index `2d + 1`).
//!
//! Variational parameters are every drive's [`Signal`] parameters, in drive
//! order, followed by one frequency `ν_d` per drive.

use ndarray::{ self as nd, s };
use ndarray_linalg::{ EighInto, UPLO };
use num_complex::Complex64 as C64;
use serde::Deserialize;
use crate::{
    device::{ Device, Signal },
    error::{ EvolveError, Result },
    grid::TimeGrid,
    hilbert::{ self, Basis },
};

/// Single-qubit static parameters.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize)]
pub struct Qubit {
    /// Resonance frequency ω (radians per unit time)
    pub frequency: f64,
    /// Anharmonicity δ (radians per unit time)
    pub anharmonicity: f64,
}

/// Exchange coupling between two qubits.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize)]
pub struct Coupling {
    pub qubits: [usize; 2],
    /// Coupling strength g (radians per unit time)
    pub strength: f64,
}

/// A single drive line.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Drive {
    /// Index of the driven qubit.
    pub qubit: usize,
    /// Drive frequency ν (radians per unit time)
    pub frequency: f64,
    /// Complex envelope Ω(t)
    pub signal: Signal,
}

/// Device model for coupled transmons; see the [module-level
/// documentation][self].
#[derive(Clone, Debug)]
pub struct TransmonDevice {
    nlevels: usize,
    qubits: Vec<Qubit>,
    couplings: Vec<Coupling>,
    drives: Vec<Drive>,
    h0: nd::Array2<C64>,
    // dressed energies, indexed by the bare label of each eigenvector
    energies: nd::Array1<f64>,
    // columns are dressed states in bare coordinates
    dressing: nd::Array2<C64>,
    lowering_bare: Vec<nd::Array2<C64>>,
    lowering_dressed: Vec<nd::Array2<C64>>,
}

impl TransmonDevice {
    /// Create a new `TransmonDevice`.
    ///
    /// Fails if fewer than two levels or no qubits are requested, if a
    /// coupling or drive refers to a nonexistent qubit, if a signal is
    /// malformed, or if the static Hamiltonian cannot be diagonalized.
    pub fn new(
        nlevels: usize,
        qubits: Vec<Qubit>,
        couplings: Vec<Coupling>,
        drives: Vec<Drive>,
    ) -> Result<Self>
    {
        if nlevels < 2 {
            return Err(EvolveError::config("transmons need at least two levels"));
        }
        if qubits.is_empty() {
            return Err(EvolveError::config("device has no qubits"));
        }
        let nqubits = qubits.len();
        for Coupling { qubits: [p, q], .. } in couplings.iter() {
            EvolveError::check_bounds(*p, nqubits)?;
            EvolveError::check_bounds(*q, nqubits)?;
            if p == q {
                return Err(EvolveError::config(
                    format!("qubit {p} cannot be coupled to itself")
                ));
            }
        }
        for drive in drives.iter() {
            EvolveError::check_bounds(drive.qubit, nqubits)?;
            drive.signal.validate()?;
        }

        let a = hilbert::annihilator(nlevels);
        let lowering_bare: Vec<nd::Array2<C64>>
            = (0..nqubits)
            .map(|q| hilbert::embed(&a, q, nlevels, nqubits))
            .collect();

        let nstates = nlevels.pow(nqubits as u32);
        let mut h0: nd::Array2<C64> = nd::Array2::zeros((nstates, nstates));
        for (Qubit { frequency, anharmonicity }, aq) in qubits.iter().zip(&lowering_bare) {
            let aq_dag = hilbert::adjoint(aq);
            let nq = aq_dag.dot(aq);
            h0 += &(&nq * C64::from(*frequency));
            h0 -= &(aq_dag.dot(&nq).dot(aq) * C64::from(*anharmonicity / 2.0));
        }
        for Coupling { qubits: [p, q], strength } in couplings.iter() {
            let exch = hilbert::adjoint(&lowering_bare[*p]).dot(&lowering_bare[*q]);
            h0 += &(&exch * C64::from(*strength));
            h0 += &(hilbert::adjoint(&exch) * C64::from(*strength));
        }

        let (energies, dressing) = dress(&h0)?;
        let dressing_dag = hilbert::adjoint(&dressing);
        let lowering_dressed: Vec<nd::Array2<C64>>
            = lowering_bare.iter()
            .map(|aq| dressing_dag.dot(aq).dot(&dressing))
            .collect();

        tracing::debug!(
            nqubits,
            nlevels,
            nstates,
            ndrives = drives.len(),
            "built transmon device",
        );
        Ok(Self {
            nlevels,
            qubits,
            couplings,
            drives,
            h0,
            energies,
            dressing,
            lowering_bare,
            lowering_dressed,
        })
    }

    /// Number of levels kept per transmon.
    pub fn nlevels(&self) -> usize { self.nlevels }

    /// Number of transmons.
    pub fn nqubits(&self) -> usize { self.qubits.len() }

    /// Get a reference to the qubit parameters.
    pub fn qubits(&self) -> &[Qubit] { &self.qubits }

    /// Get a reference to the couplings.
    pub fn couplings(&self) -> &[Coupling] { &self.couplings }

    /// Get a reference to the drives.
    pub fn drives(&self) -> &[Drive] { &self.drives }

    /// Dressed energies, indexed like the bare basis.
    pub fn energies(&self) -> &nd::Array1<f64> { &self.energies }

    /// Annihilation operator for qubit `q`.
    ///
    /// *Panics* if `q` is not a valid qubit index.
    pub fn lowering_operator(&self, q: usize, basis: Basis) -> &nd::Array2<C64> {
        match basis {
            Basis::Bare => &self.lowering_bare[q],
            Basis::Dressed => &self.lowering_dressed[q],
        }
    }

    /// Number operator for qubit `q`.
    ///
    /// *Panics* if `q` is not a valid qubit index.
    pub fn number_operator(&self, q: usize, basis: Basis) -> nd::Array2<C64> {
        let a = self.lowering_operator(q, basis);
        hilbert::adjoint(a).dot(a)
    }

    /// Product state with the given per-qubit occupations, as a vector in
    /// either basis (the dressed state shares its label with the bare one).
    ///
    /// Fails if the number of occupations differs from the number of qubits
    /// or any occupation is not below the number of levels.
    pub fn bare_state(&self, occupations: &[usize]) -> Result<nd::Array1<C64>> {
        if occupations.len() != self.nqubits() {
            return Err(EvolveError::shape("occupations", &[self.nqubits()], &[occupations.len()]));
        }
        for n in occupations.iter() {
            EvolveError::check_bounds(*n, self.nlevels)?;
        }
        let mut psi: nd::Array1<C64> = nd::Array1::zeros(self.nstates());
        if let Some(k) = hilbert::product_index(occupations, self.nlevels) {
            psi[k] = C64::from(1.0);
        }
        Ok(psi)
    }

    fn drive_phase(&self, d: usize, t: f64) -> C64 {
        (C64::i() * self.drives[d].frequency * t).exp()
    }
}

// diagonalize `h0` and order/phase its eigenvectors so that the `k`-th column
// is the eigenvector with the largest overlap with the `k`-th bare state,
// having that overlap real and positive
fn dress(h0: &nd::Array2<C64>) -> Result<(nd::Array1<f64>, nd::Array2<C64>)> {
    let n = h0.nrows();
    let (E, V): (nd::Array1<f64>, nd::Array2<C64>)
        = h0.clone().eigh_into(UPLO::Lower)?;
    let mut taken: Vec<bool> = vec![false; n];
    let mut energies: nd::Array1<f64> = nd::Array1::zeros(n);
    let mut dressing: nd::Array2<C64> = nd::Array2::zeros((n, n));
    for (k, vk) in V.axis_iter(nd::Axis(1)).enumerate() {
        let (label, _) = vk.iter().enumerate()
            .filter(|(i, _)| !taken[*i])
            .fold(
                (n, -1.0),
                |(best, best_p), (i, z)| {
                    let p = z.norm_sqr();
                    if p > best_p { (i, p) } else { (best, best_p) }
                },
            );
        // one eigenvector per label, so a free label always exists
        if label >= n {
            return Err(EvolveError::config("failed to label dressed states"));
        }
        taken[label] = true;
        let z = vk[label];
        let phase
            = if z.norm() > 0.0 { z.conj() / z.norm() } else { C64::from(1.0) };
        dressing.slice_mut(s![.., label]).assign(&vk.mapv(|x| x * phase));
        energies[label] = E[k];
    }
    Ok((energies, dressing))
}

impl Device for TransmonDevice {
    fn nstates(&self) -> usize { self.h0.nrows() }

    fn ngrades(&self) -> usize { 2 * self.drives.len() }

    fn nparameters(&self) -> usize {
        self.drives.iter()
            .map(|drive| drive.signal.nparameters() + 1)
            .sum()
    }

    fn parameters(&self) -> nd::Array1<f64> {
        self.drives.iter()
            .flat_map(|drive| drive.signal.parameters())
            .chain(self.drives.iter().map(|drive| drive.frequency))
            .collect()
    }

    fn set_parameters(&mut self, x: &[f64]) -> Result<()> {
        let nparams = self.nparameters();
        if x.len() != nparams {
            return Err(EvolveError::shape("device parameters", &[nparams], &[x.len()]));
        }
        let ndrives = self.drives.len();
        let (signal_x, freq_x) = x.split_at(nparams - ndrives);
        let mut offset: usize = 0;
        for (drive, nu) in self.drives.iter_mut().zip(freq_x) {
            let np = drive.signal.nparameters();
            drive.signal.set_parameters(&signal_x[offset..offset + np])?;
            drive.frequency = *nu;
            offset += np;
        }
        Ok(())
    }

    fn basis_rotation(&self, from: Basis, to: Basis) -> nd::Array2<C64> {
        match (from, to) {
            (Basis::Bare, Basis::Dressed) => hilbert::adjoint(&self.dressing),
            (Basis::Dressed, Basis::Bare) => self.dressing.clone(),
            _ => nd::Array2::eye(self.nstates()),
        }
    }

    fn static_hamiltonian(&self, basis: Basis) -> nd::Array2<C64> {
        match basis {
            Basis::Bare => self.h0.clone(),
            Basis::Dressed => nd::Array2::from_diag(&self.energies.mapv(C64::from)),
        }
    }

    fn evolver(&self, basis: Basis, t: f64) -> nd::Array2<C64> {
        let phases: nd::Array1<C64>
            = self.energies.mapv(|e| (-C64::i() * e * t).exp());
        match basis {
            Basis::Dressed => nd::Array2::from_diag(&phases),
            Basis::Bare => {
                let scaled = &self.dressing * &phases.view().insert_axis(nd::Axis(0));
                scaled.dot(&hilbert::adjoint(&self.dressing))
            },
        }
    }

    fn drive_operator(&self, basis: Basis, t: f64) -> nd::Array2<C64> {
        let n = self.nstates();
        let mut v: nd::Array2<C64> = nd::Array2::zeros((n, n));
        for (d, drive) in self.drives.iter().enumerate() {
            let z = drive.signal.at(t) * self.drive_phase(d, t);
            let a = self.lowering_operator(drive.qubit, basis);
            v += &(a * z);
            v += &(hilbert::adjoint(a) * z.conj());
        }
        v
    }

    fn gradient_operator(&self, j: usize, basis: Basis, t: f64)
        -> nd::Array2<C64>
    {
        let d = j / 2;
        let a = self.lowering_operator(self.drives[d].qubit, basis);
        let z
            = if j % 2 == 0 {
                self.drive_phase(d, t)
            } else {
                C64::i() * self.drive_phase(d, t)
            };
        a * z + hilbert::adjoint(a) * z.conj()
    }

    fn gradient(&self, grid: &TimeGrid, phi: nd::ArrayView2<f64>)
        -> Result<nd::Array1<f64>>
    {
        let expected = [grid.npoints(), self.ngrades()];
        if phi.shape() != &expected[..] {
            return Err(EvolveError::shape("gradient signals", &expected, phi.shape()));
        }
        let time = grid.lattice_times();
        let mut grad: Vec<f64> = Vec::with_capacity(self.nparameters());
        for (d, drive) in self.drives.iter().enumerate() {
            grad.extend(
                drive.signal.gradient(grid, phi.column(2 * d), phi.column(2 * d + 1))?
            );
        }
        // dV/dν = t (Re[Ω] Q - Im[Ω] P)
        for (d, drive) in self.drives.iter().enumerate() {
            let amp = drive.signal.gen_time_dep(&time);
            let integrand: nd::Array1<f64>
                = time.iter().zip(amp.iter())
                .zip(phi.column(2 * d).iter().zip(phi.column(2 * d + 1).iter()))
                .map(|((t, w), (phi_p, phi_q))| *t * (w.re * *phi_q - w.im * *phi_p))
                .collect();
            grad.push(grid.integrate(&integrand)?);
        }
        Ok(grad.into())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn max_abs_diff(a: &nd::Array2<C64>, b: &nd::Array2<C64>) -> f64 {
        a.iter().zip(b.iter())
            .map(|(x, y)| (*x - *y).norm())
            .fold(0.0, f64::max)
    }

    fn pair() -> TransmonDevice {
        TransmonDevice::new(
            3,
            vec![
                Qubit { frequency: 4.8, anharmonicity: 0.3 },
                Qubit { frequency: 5.3, anharmonicity: 0.3 },
            ],
            vec![Coupling { qubits: [0, 1], strength: 0.02 }],
            vec![
                Drive {
                    qubit: 0,
                    frequency: 4.8,
                    signal: Signal::new_constant(C64::new(0.05, 0.01)),
                },
                Drive {
                    qubit: 1,
                    frequency: 5.0,
                    signal: Signal::new_windowed(
                        10.0,
                        [C64::new(0.02, 0.0), C64::new(-0.01, 0.03)],
                    ).unwrap(),
                },
            ],
        ).unwrap()
    }

    #[test]
    fn uncoupled_dressing_is_trivial() {
        let device = TransmonDevice::new(
            3,
            vec![
                Qubit { frequency: 4.0, anharmonicity: 0.2 },
                Qubit { frequency: 4.5, anharmonicity: 0.25 },
            ],
            vec![],
            vec![],
        ).unwrap();
        let r = device.basis_rotation(Basis::Bare, Basis::Dressed);
        assert!(max_abs_diff(&r, &nd::Array2::eye(9)) < 1e-10);
        let k = hilbert::product_index(&[1, 2], 3).unwrap();
        // ω_0 + 2 ω_1 - δ_1
        assert_abs_diff_eq!(device.energies()[k], 4.0 + 9.0 - 0.25, epsilon = 1e-10);
    }

    #[test]
    fn dressing_is_unitary_and_diagonalizes() {
        let device = pair();
        let r = device.basis_rotation(Basis::Bare, Basis::Dressed);
        let r_inv = device.basis_rotation(Basis::Dressed, Basis::Bare);
        assert!(max_abs_diff(&r.dot(&r_inv), &nd::Array2::eye(9)) < 1e-10);

        let mut h = device.static_hamiltonian(Basis::Bare);
        hilbert::rotate_operator(&r, &mut h);
        assert!(max_abs_diff(&h, &device.static_hamiltonian(Basis::Dressed)) < 1e-10);

        // weak coupling: each dressed state stays close to its bare label
        for k in 0..9 {
            assert!(r_inv[[k, k]].re > 0.9);
            assert_abs_diff_eq!(r_inv[[k, k]].im, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn evolver_matches_in_both_bases() {
        let device = pair();
        let t = 1.7;
        let mut u = device.evolver(Basis::Dressed, t);
        hilbert::rotate_operator(&device.basis_rotation(Basis::Dressed, Basis::Bare), &mut u);
        assert!(max_abs_diff(&u, &device.evolver(Basis::Bare, t)) < 1e-10);
        assert!(max_abs_diff(&device.evolver(Basis::Bare, 0.0), &nd::Array2::eye(9)) < 1e-10);
        let uu = hilbert::adjoint(&u).dot(&u);
        assert!(max_abs_diff(&uu, &nd::Array2::eye(9)) < 1e-10);
    }

    #[test]
    fn drive_decomposes_over_gradient_operators() {
        let device = pair();
        for &basis in [Basis::Bare, Basis::Dressed].iter() {
            for &t in [0.0, 3.3, 7.9].iter() {
                let v = device.drive_operator(basis, t);
                assert!(hilbert::is_hermitian(&v, 1e-12));
                let mut recon: nd::Array2<C64> = nd::Array2::zeros((9, 9));
                for (d, drive) in device.drives().iter().enumerate() {
                    let w = drive.signal.at(t);
                    recon += &(device.gradient_operator(2 * d, basis, t) * C64::from(w.re));
                    recon += &(device.gradient_operator(2 * d + 1, basis, t) * C64::from(w.im));
                }
                assert!(max_abs_diff(&v, &recon) < 1e-12);
            }
        }
    }

    #[test]
    fn parameters_round_trip() {
        let mut device = pair();
        assert_eq!(device.ngrades(), 4);
        assert_eq!(device.nparameters(), 2 + 4 + 2);
        let x = device.parameters();
        assert_eq!(x.to_vec(), vec![0.05, 0.01, 0.02, 0.0, -0.01, 0.03, 4.8, 5.0]);
        let y: Vec<f64> = (0..8).map(|k| k as f64 * 0.1).collect();
        device.set_parameters(&y).unwrap();
        assert_eq!(device.parameters().to_vec(), y);
        assert!(matches!(
            device.set_parameters(&y[..5]),
            Err(EvolveError::Shape { .. }),
        ));
    }

    #[test]
    fn bad_devices_rejected() {
        let q = Qubit { frequency: 1.0, anharmonicity: 0.1 };
        assert!(matches!(
            TransmonDevice::new(1, vec![q], vec![], vec![]),
            Err(EvolveError::Config(_)),
        ));
        assert!(matches!(
            TransmonDevice::new(2, vec![q], vec![Coupling { qubits: [0, 1], strength: 0.1 }], vec![]),
            Err(EvolveError::Bounds { index: 1, len: 1 }),
        ));
        let drive = Drive { qubit: 3, frequency: 1.0, signal: Signal::new_constant(C64::from(0.1)) };
        assert!(matches!(
            TransmonDevice::new(2, vec![q, q], vec![], vec![drive]),
            Err(EvolveError::Bounds { index: 3, len: 2 }),
        ));
    }

    #[test]
    fn bare_state_bounds() {
        let device = pair();
        let psi = device.bare_state(&[1, 0]).unwrap();
        assert_eq!(psi[3], C64::from(1.0));
        assert!(matches!(device.bare_state(&[0, 3]), Err(EvolveError::Bounds { index: 3, len: 3 })));
        assert!(matches!(device.bare_state(&[0]), Err(EvolveError::Shape { .. })));
    }
}
