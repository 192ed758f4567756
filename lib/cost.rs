//! Scalar cost functions over a device's parameter vector, for use with
//! gradient-based optimizers.

use ndarray::{ self as nd, s };
use num_complex::Complex64 as C64;
use crate::{
    device::Device,
    error::{ EvolveError, Result },
    evolve::{ self, EvolutionMode },
    grid::TimeGrid,
    hilbert::{ self, Basis },
};

/// A differentiable function of a parameter vector.
pub trait CostFunction {
    /// Number of parameters expected.
    fn nparameters(&self) -> usize;

    /// Evaluate at `x`.
    fn cost(&mut self, x: &[f64]) -> Result<f64>;

    /// Gradient at `x`.
    fn grad(&mut self, x: &[f64]) -> Result<nd::Array1<f64>>;
}

/// Expectation value of an observable in the final state of an evolution.
#[derive(Clone, Debug)]
pub struct Energy<D>
where D: Device
{
    device: D,
    mode: EvolutionMode,
    basis: Basis,
    grid: TimeGrid,
    psi0: nd::Array1<C64>,
    observable: nd::Array2<C64>,
    phi: nd::Array3<f64>,
}

impl<D> Energy<D>
where D: Device
{
    /// Create a new `Energy`.
    ///
    /// `psi0` and `observable` are given in `basis`.
    pub fn new(
        device: D,
        mode: EvolutionMode,
        basis: Basis,
        grid: TimeGrid,
        psi0: nd::Array1<C64>,
        observable: nd::Array2<C64>,
    ) -> Result<Self>
    {
        let n = device.nstates();
        if psi0.len() != n {
            return Err(EvolveError::shape("initial state", &[n], psi0.shape()));
        }
        if observable.shape() != &[n, n][..] {
            return Err(EvolveError::shape("observable", &[n, n], observable.shape()));
        }
        let phi = nd::Array3::zeros((grid.npoints(), device.ngrades(), 1));
        Ok(Self { device, mode, basis, grid, psi0, observable, phi })
    }

    /// Get a reference to the device with the most recently bound
    /// parameters.
    pub fn device(&self) -> &D { &self.device }

    /// Gradient signals from the last call to [`grad`][CostFunction::grad].
    pub fn signals(&self) -> nd::ArrayView2<f64> { self.phi.slice(s![.., .., 0]) }
}

impl<D> CostFunction for Energy<D>
where D: Device
{
    fn nparameters(&self) -> usize { self.device.nparameters() }

    fn cost(&mut self, x: &[f64]) -> Result<f64> {
        self.device.set_parameters(x)?;
        let psi = evolve::evolved(
            self.mode, &self.device, self.basis, &self.grid, &self.psi0)?;
        Ok(hilbert::expectation(&self.observable, &psi).re)
    }

    fn grad(&mut self, x: &[f64]) -> Result<nd::Array1<f64>> {
        self.device.set_parameters(x)?;
        evolve::gradient_signals_into(
            self.mode,
            &self.device,
            self.basis,
            &self.grid,
            &self.psi0,
            std::slice::from_ref(&self.observable),
            &mut self.phi,
            None,
        )?;
        self.device.gradient(&self.grid, self.phi.slice(s![.., .., 0]))
    }
}

/// Quadratic penalty on amplitudes exceeding a threshold,
/// `weight * max(0, A - threshold)^2` summed over amplitudes `A`.
///
/// Amplitudes are `|x[i]|` for each listed index or, if `paired`, `|x[i] + i
/// x[i + 1]|` for consecutive pairs of listed indices.
#[derive(Clone, Debug, PartialEq)]
pub struct AmplitudePenalty {
    nparameters: usize,
    indices: Vec<usize>,
    paired: bool,
    threshold: f64,
    weight: f64,
}

impl AmplitudePenalty {
    /// Create a new `AmplitudePenalty`.
    ///
    /// Fails if `paired` is set and an odd number of indices is given, or any
    /// index is not less than `nparameters`.
    pub fn new(
        nparameters: usize,
        indices: Vec<usize>,
        paired: bool,
        threshold: f64,
        weight: f64,
    ) -> Result<Self>
    {
        if paired && indices.len() % 2 != 0 {
            return Err(EvolveError::config(
                format!("paired amplitudes need an even number of indices, got {}", indices.len())
            ));
        }
        for i in indices.iter() {
            EvolveError::check_bounds(*i, nparameters)?;
        }
        Ok(Self { nparameters, indices, paired, threshold, weight })
    }

    // (index bundle, amplitude) for every amplitude
    fn amplitudes<'a>(&'a self, x: &'a [f64])
        -> Result<impl Iterator<Item = (&'a [usize], f64)> + 'a>
    {
        for i in self.indices.iter() {
            EvolveError::check_bounds(*i, x.len())?;
        }
        let width = if self.paired { 2 } else { 1 };
        let iter
            = self.indices.chunks(width)
            .map(move |idx| {
                let amp
                    = if let [re, im] = idx {
                        x[*re].hypot(x[*im])
                    } else {
                        x[idx[0]].abs()
                    };
                (idx, amp)
            });
        Ok(iter)
    }
}

impl CostFunction for AmplitudePenalty {
    fn nparameters(&self) -> usize { self.nparameters }

    fn cost(&mut self, x: &[f64]) -> Result<f64> {
        let acc
            = self.amplitudes(x)?
            .map(|(_, a)| (a - self.threshold).max(0.0).powi(2))
            .sum::<f64>();
        Ok(self.weight * acc)
    }

    fn grad(&mut self, x: &[f64]) -> Result<nd::Array1<f64>> {
        let mut grad: nd::Array1<f64> = nd::Array1::zeros(x.len());
        for (idx, a) in self.amplitudes(x)? {
            let excess = a - self.threshold;
            if excess <= 0.0 || a == 0.0 { continue; }
            let scale = 2.0 * self.weight * excess / a;
            for i in idx.iter() {
                grad[*i] += scale * x[*i];
            }
        }
        Ok(grad)
    }
}

/// Sum of cost functions over a shared parameter vector.
#[derive(Default)]
pub struct Composite(pub Vec<Box<dyn CostFunction>>);

impl Composite {
    /// Create a new, empty `Composite`.
    pub fn new() -> Self { Self::default() }

    /// Add a term to the sum.
    pub fn with<C>(mut self, term: C) -> Self
    where C: CostFunction + 'static
    {
        self.0.push(Box::new(term));
        self
    }
}

impl CostFunction for Composite {
    fn nparameters(&self) -> usize {
        self.0.iter().map(|term| term.nparameters()).max().unwrap_or(0)
    }

    fn cost(&mut self, x: &[f64]) -> Result<f64> {
        self.0.iter_mut()
            .map(|term| term.cost(x))
            .sum()
    }

    fn grad(&mut self, x: &[f64]) -> Result<nd::Array1<f64>> {
        let mut grad: nd::Array1<f64> = nd::Array1::zeros(x.len());
        for term in self.0.iter_mut() {
            let g = term.grad(x)?;
            if g.len() != grad.len() {
                return Err(EvolveError::shape("cost gradient", &[grad.len()], g.shape()));
            }
            grad += &g;
        }
        Ok(grad)
    }
}

#[cfg(test)]
mod test {
    use approx::assert_abs_diff_eq;
    use crate::device::{ Drive, Qubit, Signal, TransmonDevice };
    use super::*;

    fn fd_grad<C: CostFunction>(cost: &mut C, x: &[f64]) -> Vec<f64> {
        let h = 1e-6;
        (0..x.len())
            .map(|p| {
                let mut xp = x.to_vec();
                let mut xm = x.to_vec();
                xp[p] += h;
                xm[p] -= h;
                (cost.cost(&xp).unwrap() - cost.cost(&xm).unwrap()) / (2.0 * h)
            })
            .collect()
    }

    #[test]
    fn penalty_values() {
        let mut single = AmplitudePenalty::new(4, vec![0, 2], false, 1.0, 3.0).unwrap();
        // only |x[2]| = 1.5 exceeds the threshold
        assert_abs_diff_eq!(single.cost(&[0.5, 9.0, -1.5, 9.0]).unwrap(), 3.0 * 0.25);

        let mut paired = AmplitudePenalty::new(4, vec![0, 1], true, 1.0, 2.0).unwrap();
        // |0.6 + 0.8i| = 1 sits on the threshold
        assert_abs_diff_eq!(paired.cost(&[0.6, 0.8, 5.0, 5.0]).unwrap(), 0.0);
        // |3 + 4i| = 5
        assert_abs_diff_eq!(paired.cost(&[3.0, 4.0, 0.0, 0.0]).unwrap(), 2.0 * 16.0);
    }

    #[test]
    fn penalty_gradient() {
        let x = [1.7, -0.4, -2.1, 0.3];
        let mut single = AmplitudePenalty::new(4, vec![0, 2, 3], false, 1.0, 0.5).unwrap();
        let mut paired = AmplitudePenalty::new(4, vec![0, 1, 2, 3], true, 1.2, 1.5).unwrap();
        for pen in [&mut single, &mut paired] {
            let g = pen.grad(&x).unwrap();
            let g_fd = fd_grad(pen, &x);
            for (a, b) in g.iter().zip(g_fd.iter()) {
                assert_abs_diff_eq!(a, b, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn penalty_errors() {
        assert!(matches!(
            AmplitudePenalty::new(4, vec![0, 1, 2], true, 1.0, 1.0),
            Err(EvolveError::Config(_)),
        ));
        assert!(matches!(
            AmplitudePenalty::new(4, vec![0, 4], false, 1.0, 1.0),
            Err(EvolveError::Bounds { index: 4, len: 4 }),
        ));
        let mut pen = AmplitudePenalty::new(4, vec![3], false, 1.0, 1.0).unwrap();
        assert!(matches!(pen.cost(&[0.0, 0.0]), Err(EvolveError::Bounds { index: 3, len: 2 })));
    }

    #[test]
    fn composite_sums_terms() {
        let device = TransmonDevice::new(
            2,
            vec![Qubit { frequency: 1.0, anharmonicity: 0.0 }],
            vec![],
            vec![Drive {
                qubit: 0,
                frequency: 1.0,
                signal: Signal::new_constant(C64::new(0.4, 0.0)),
            }],
        ).unwrap();
        let grid = TimeGrid::uniform(100, 2.0).unwrap();
        let psi0 = device.bare_state(&[0]).unwrap();
        let obs = device.number_operator(0, Basis::Bare);
        let energy = Energy::new(
            device, EvolutionMode::Rotating, Basis::Bare, grid, psi0, obs).unwrap();
        let penalty = AmplitudePenalty::new(3, vec![0, 1], true, 0.5, 10.0).unwrap();
        let mut total = Composite::new().with(energy.clone()).with(penalty.clone());
        assert_eq!(total.nparameters(), 3);

        let x = [0.7, 0.1, 1.0];
        let expected
            = energy.clone().cost(&x).unwrap() + penalty.clone().cost(&x).unwrap();
        assert_abs_diff_eq!(total.cost(&x).unwrap(), expected, epsilon = 1e-14);
        // resonant Rabi flop: sin^2(|Ω| T)
        assert_abs_diff_eq!(
            energy.clone().cost(&x).unwrap(),
            (0.7_f64.hypot(0.1) * 2.0).sin().powi(2),
            epsilon = 1e-6,
        );

        let g = total.grad(&x).unwrap();
        let g_fd = fd_grad(&mut total, &x);
        for (a, b) in g.iter().zip(g_fd.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-3);
        }
    }

    #[test]
    fn energy_rejects_bad_shapes() {
        let device = TransmonDevice::new(
            2, vec![Qubit { frequency: 1.0, anharmonicity: 0.0 }], vec![], vec![],
        ).unwrap();
        let grid = TimeGrid::uniform(10, 1.0).unwrap();
        let psi0: nd::Array1<C64> = nd::Array1::zeros(3);
        assert!(matches!(
            Energy::new(device, EvolutionMode::Direct, Basis::Bare, grid, psi0, nd::Array2::eye(2)),
            Err(EvolveError::Shape { .. }),
        ));
    }
}
