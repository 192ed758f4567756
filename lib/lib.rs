#![allow(non_snake_case, non_upper_case_globals)]

//! Fixed-step RK4 time evolution of driven quantum devices, with adjoint
//! computation of gradient signals for optimal control.

pub mod error;
pub mod hilbert;
pub mod grid;
pub mod workspace;
pub mod device;
pub mod evolve;
pub mod cost;
pub mod config;
