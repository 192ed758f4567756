//! Complex drive envelopes.

use ndarray as nd;
use num_complex::Complex64 as C64;
use num_traits::Zero;
use serde::Deserialize;
use crate::{
    error::{ EvolveError, Result },
    grid::TimeGrid,
};

/// Complex amplitude `Ω(t)` of a single drive.
///
/// Variational parameters are interleaved `(re, im)` pairs, one pair per
/// piece of the envelope.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Signal {
    /// Time-independent amplitude.
    Constant {
        re: f64,
        im: f64,
    },
    /// Piecewise-constant amplitude over `values.len()` equal windows
    /// spanning `[0, duration]`. Times outside the span clamp to the first or
    /// last window.
    Windowed {
        duration: f64,
        values: Vec<[f64; 2]>,
    },
}

impl Signal {
    /// Create a new `Signal::Constant`.
    pub fn new_constant(amp: C64) -> Self {
        Self::Constant { re: amp.re, im: amp.im }
    }

    /// Create a new `Signal::Windowed`.
    ///
    /// Fails if there are no windows or `duration` is not finite and positive.
    pub fn new_windowed<I>(duration: f64, values: I) -> Result<Self>
    where I: IntoIterator<Item = C64>
    {
        let values: Vec<[f64; 2]>
            = values.into_iter().map(|a| [a.re, a.im]).collect();
        let signal = Self::Windowed { duration, values };
        signal.validate()?;
        Ok(signal)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Constant { .. } => Ok(()),
            Self::Windowed { duration, values } => {
                if values.is_empty() {
                    Err(EvolveError::config("windowed signal needs at least one window"))
                } else if !(duration.is_finite() && *duration > 0.0) {
                    Err(EvolveError::config(
                        format!("windowed signal duration must be positive, got {duration}")
                    ))
                } else {
                    Ok(())
                }
            },
        }
    }

    /// Number of variational parameters.
    pub fn nparameters(&self) -> usize {
        match self {
            Self::Constant { .. } => 2,
            Self::Windowed { values, .. } => 2 * values.len(),
        }
    }

    /// Current parameter values, as interleaved `(re, im)` pairs.
    pub fn parameters(&self) -> Vec<f64> {
        match self {
            Self::Constant { re, im } => vec![*re, *im],
            Self::Windowed { values, .. } => values.iter().flatten().copied().collect(),
        }
    }

    /// Bind new parameter values.
    ///
    /// Fails if `x` has the wrong length.
    pub fn set_parameters(&mut self, x: &[f64]) -> Result<()> {
        if x.len() != self.nparameters() {
            return Err(EvolveError::shape("signal parameters", &[self.nparameters()], &[x.len()]));
        }
        match self {
            Self::Constant { re, im } => {
                *re = x[0];
                *im = x[1];
            },
            Self::Windowed { values, .. } => {
                values.iter_mut().zip(x.chunks_exact(2))
                    .for_each(|(v, xk)| { *v = [xk[0], xk[1]]; });
            },
        }
        Ok(())
    }

    /// Index of the window containing time `t`.
    fn window_of(duration: f64, nwindows: usize, t: f64) -> usize {
        let k = (t / duration * nwindows as f64).floor();
        if k < 0.0 { 0 } else { (k as usize).min(nwindows.saturating_sub(1)) }
    }

    /// Compute the amplitude at a given time.
    pub fn at(&self, t: f64) -> C64 {
        match self {
            Self::Constant { re, im } => C64::new(*re, *im),
            Self::Windowed { duration, values } => {
                values.get(Self::window_of(*duration, values.len(), t))
                    .map(|[re, im]| C64::new(*re, *im))
                    .unwrap_or_else(C64::zero)
            },
        }
    }

    /// Compute the amplitude at every sample time.
    pub fn gen_time_dep(&self, time: &nd::Array1<f64>) -> nd::Array1<C64> {
        time.mapv(|t| self.at(t))
    }

    /// Gradient with respect to this signal's parameters, given the gradient
    /// signals for the real (`phi_re`) and imaginary (`phi_im`) quadratures of
    /// the drive.
    pub fn gradient(
        &self,
        grid: &TimeGrid,
        phi_re: nd::ArrayView1<f64>,
        phi_im: nd::ArrayView1<f64>,
    ) -> Result<Vec<f64>>
    {
        match self {
            Self::Constant { .. } => {
                Ok(vec![grid.integrate(&phi_re)?, grid.integrate(&phi_im)?])
            },
            Self::Windowed { duration, values } => {
                let nwindows = values.len();
                let windows: Vec<usize>
                    = grid.lattice_times().iter()
                    .map(|t| Self::window_of(*duration, nwindows, *t))
                    .collect();
                let mut grad: Vec<f64> = Vec::with_capacity(2 * nwindows);
                for w in 0..nwindows {
                    let mask: nd::Array1<f64>
                        = windows.iter()
                        .map(|wk| if *wk == w { 1.0 } else { 0.0 })
                        .collect();
                    grad.push(grid.integrate(&(&mask * &phi_re))?);
                    grad.push(grid.integrate(&(&mask * &phi_im))?);
                }
                Ok(grad)
            },
        }
    }
}
