//! Time grids for fixed-step integration.

use ndarray as nd;
use crate::error::{ EvolveError, Result };

/// Sample times for one evolution.
///
/// Both forms describe `nsteps + 1` sample points with inclusive endpoints,
/// starting at the first sample time.
#[derive(Clone, Debug, PartialEq)]
pub enum TimeGrid {
    /// `nsteps` equal steps over `[0, duration]`.
    Uniform {
        nsteps: usize,
        duration: f64,
    },
    /// Explicit, strictly increasing sample times.
    Lattice(nd::Array1<f64>),
}

impl TimeGrid {
    /// Create a new uniform grid.
    ///
    /// Fails if `nsteps` is zero or `duration` is not finite and positive.
    pub fn uniform(nsteps: usize, duration: f64) -> Result<Self> {
        if nsteps == 0 {
            return Err(EvolveError::config("uniform grid needs at least one step"));
        }
        if !(duration.is_finite() && duration > 0.0) {
            return Err(EvolveError::config(
                format!("uniform grid duration must be finite and positive, got {duration}")
            ));
        }
        Ok(Self::Uniform { nsteps, duration })
    }

    /// Create a new uniform grid from a step count and step size.
    pub fn from_stepsize(nsteps: usize, dt: f64) -> Result<Self> {
        Self::uniform(nsteps, nsteps as f64 * dt)
    }

    /// Create a new explicit grid.
    ///
    /// Fails if there are fewer than two times or they are not finite and
    /// strictly increasing.
    pub fn lattice<T>(times: T) -> Result<Self>
    where T: Into<nd::Array1<f64>>
    {
        let times: nd::Array1<f64> = times.into();
        if times.len() < 2 {
            return Err(EvolveError::config("lattice needs at least two times"));
        }
        if times.iter().any(|t| !t.is_finite()) {
            return Err(EvolveError::config("lattice times must be finite"));
        }
        if times.iter().zip(times.iter().skip(1)).any(|(tk, tkp1)| tkp1 <= tk) {
            return Err(EvolveError::config("lattice times must be strictly increasing"));
        }
        Ok(Self::Lattice(times))
    }

    /// Number of integration steps.
    pub fn nsteps(&self) -> usize {
        match self {
            Self::Uniform { nsteps, .. } => *nsteps,
            Self::Lattice(times) => times.len().saturating_sub(1),
        }
    }

    /// Number of sample points, `nsteps + 1`.
    pub fn npoints(&self) -> usize { self.nsteps() + 1 }

    /// Uniform step size; `None` for an explicit lattice.
    pub fn stepsize(&self) -> Option<f64> {
        match self {
            Self::Uniform { nsteps, duration } => Some(*duration / *nsteps as f64),
            Self::Lattice(_) => None,
        }
    }

    /// Total time spanned by the grid.
    pub fn duration(&self) -> f64 {
        match self {
            Self::Uniform { duration, .. } => *duration,
            Self::Lattice(times) => match (times.get(0), times.get(self.nsteps())) {
                (Some(t0), Some(t1)) => t1 - t0,
                _ => 0.0,
            },
        }
    }

    /// The `i`-th sample time, for `i` in `0..=nsteps`.
    ///
    /// *Panics* if `i > nsteps`.
    pub fn time_at(&self, i: usize) -> f64 {
        match self {
            Self::Uniform { nsteps, duration } => {
                assert!(i <= *nsteps, "time_at: index {i} beyond {nsteps} steps");
                *duration * i as f64 / *nsteps as f64
            },
            Self::Lattice(times) => {
                assert!(i <= self.nsteps(), "time_at: index {i} beyond {} steps", self.nsteps());
                times.get(i).copied().unwrap_or(0.0)
            },
        }
    }

    /// Size of the `i`-th step, which takes sample `i` to sample `i + 1`.
    ///
    /// *Panics* if `i >= nsteps`.
    pub fn step_at(&self, i: usize) -> f64 {
        match self {
            Self::Uniform { nsteps, duration } => {
                assert!(i < *nsteps, "step_at: index {i} beyond {nsteps} steps");
                *duration / *nsteps as f64
            },
            Self::Lattice(times) => times[i + 1] - times[i],
        }
    }

    /// All `nsteps + 1` sample times.
    pub fn lattice_times(&self) -> nd::Array1<f64> {
        match self {
            Self::Uniform { nsteps, duration } => {
                nd::Array1::linspace(0.0, *duration, *nsteps + 1)
            },
            Self::Lattice(times) => times.clone(),
        }
    }

    /// Iterate over `(start time, step size)` pairs in forward order.
    ///
    /// A uniform grid accumulates its time rather than indexing a precomputed
    /// lattice.
    pub fn steps(&self) -> Steps<'_> {
        match self {
            Self::Uniform { nsteps, duration } => Steps::Uniform {
                k: 0,
                nsteps: *nsteps,
                t: 0.0,
                dt: *duration / *nsteps as f64,
            },
            Self::Lattice(times) => Steps::Lattice { k: 0, times },
        }
    }

    /// Integrate samples `y` (one per grid point) with the trapezoidal rule.
    ///
    /// Fails if `y` does not have `nsteps + 1` elements.
    pub fn integrate<S>(&self, y: &nd::ArrayBase<S, nd::Ix1>) -> Result<f64>
    where S: nd::Data<Elem = f64>
    {
        if y.len() != self.npoints() {
            return Err(EvolveError::shape("integrand", &[self.npoints()], y.shape()));
        }
        let acc
            = y.iter().zip(y.iter().skip(1))
            .enumerate()
            .map(|(k, (yk, ykp1))| self.step_at(k) * (*yk + *ykp1) / 2.0)
            .sum();
        Ok(acc)
    }
}

/// Iterator over the steps of a [`TimeGrid`]; see [`TimeGrid::steps`].
#[derive(Clone, Debug)]
pub enum Steps<'a> {
    Uniform { k: usize, nsteps: usize, t: f64, dt: f64 },
    Lattice { k: usize, times: &'a nd::Array1<f64> },
}

impl<'a> Iterator for Steps<'a> {
    type Item = (f64, f64);

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Uniform { k, nsteps, t, dt } => {
                if *k >= *nsteps { return None; }
                let item = (*t, *dt);
                *t += *dt;
                *k += 1;
                Some(item)
            },
            Self::Lattice { k, times } => {
                if *k + 1 >= times.len() { return None; }
                let item = (times[*k], times[*k + 1] - times[*k]);
                *k += 1;
                Some(item)
            },
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rem = match self {
            Self::Uniform { k, nsteps, .. } => nsteps - *k,
            Self::Lattice { k, times } => times.len().saturating_sub(*k + 1),
        };
        (rem, Some(rem))
    }
}

impl<'a> ExactSizeIterator for Steps<'a> { }
