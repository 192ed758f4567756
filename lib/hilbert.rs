//! Bases, state vectors, and the small set of linear-algebra primitives used by
//! the evolution and gradient code.

use ndarray::{ self as nd, linalg::kron };
use itertools::Itertools;
use num_complex::Complex64 as C64;
use num_traits::Zero;
use serde::Deserialize;

/* Bases **********************************************************************/

/// Names the basis in which a state or operator is expressed.
///
/// `Bare` is the product basis of single-site occupation states; `Dressed` is
/// the eigenbasis of a device's static Hamiltonian, with each eigenvector
/// labeled by the bare state it most resembles.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Basis {
    Bare,
    Dressed,
}

/* States *********************************************************************/

/// Compute a norm of an object, treating it as a representation of a quantum
/// state.
pub trait StateNorm {
    fn norm(&self) -> f64;
}

/// The norm of an `ndarray::Array1<num_complex::Complex64>` is the quadrature
/// sum of its elements.
impl StateNorm for nd::Array1<C64> {
    fn norm(&self) -> f64 { self.iter().map(|a| a.norm_sqr()).sum::<f64>().sqrt() }
}

/// The norm of an `ndarray::Array2<num_complex::Complex64>` is the Frobenius
/// norm, i.e. the quadrature sum of the column norms of a bundle of states.
impl StateNorm for nd::Array2<C64> {
    fn norm(&self) -> f64 { self.iter().map(|a| a.norm_sqr()).sum::<f64>().sqrt() }
}

/// Compute the conjugate transpose of a matrix.
pub fn adjoint<S>(a: &nd::ArrayBase<S, nd::Ix2>) -> nd::Array2<C64>
where S: nd::Data<Elem = C64>
{
    a.t().mapv(|x| x.conj())
}

/// Return `true` if `a` is square and equal to its conjugate transpose to
/// within `tol` in every element.
pub fn is_hermitian(a: &nd::Array2<C64>, tol: f64) -> bool {
    a.is_square()
        && a.indexed_iter().all(|((i, j), x)| (*x - a[[j, i]].conj()).norm() <= tol)
}

/// Rotate a state in place: `psi <- r psi`.
pub fn rotate_state(r: &nd::Array2<C64>, psi: &mut nd::Array1<C64>) {
    *psi = r.dot(&*psi);
}

/// Rotate an operator in place: `a <- r a r^†`.
#[cfg(test)]
pub(crate) fn rotate_operator(r: &nd::Array2<C64>, a: &mut nd::Array2<C64>) {
    *a = r.dot(&a.dot(&adjoint(r)));
}

/// Compute the bilinear form `<lambda| op |psi>`.
pub fn braket<S1, S2>(
    lambda: &nd::ArrayBase<S1, nd::Ix1>,
    op: &nd::Array2<C64>,
    psi: &nd::ArrayBase<S2, nd::Ix1>,
) -> C64
where
    S1: nd::Data<Elem = C64>,
    S2: nd::Data<Elem = C64>,
{
    lambda.iter().zip(op.dot(psi).iter())
        .fold(C64::zero(), |acc, (l, x)| acc + l.conj() * x)
}

/// Compute the expectation value `<psi| op |psi>`.
pub fn expectation<S>(op: &nd::Array2<C64>, psi: &nd::ArrayBase<S, nd::Ix1>)
    -> C64
where S: nd::Data<Elem = C64>
{
    braket(psi, op, psi)
}

/* Operators ******************************************************************/

/// Bosonic annihilation operator truncated to `nlevels` levels.
pub fn annihilator(nlevels: usize) -> nd::Array2<C64> {
    let mut a: nd::Array2<C64> = nd::Array2::zeros((nlevels, nlevels));
    for n in 1..nlevels {
        a[[n - 1, n]] = C64::from((n as f64).sqrt());
    }
    a
}

/// Embed a single-site operator acting on site `site` of `nsites` identical
/// sites, each of dimension `nlevels`.
pub fn embed(
    op: &nd::Array2<C64>,
    site: usize,
    nlevels: usize,
    nsites: usize,
) -> nd::Array2<C64>
{
    let eyesize1 = nlevels.pow(site as u32);
    let eyesize2 = nlevels.pow((nsites - site - 1) as u32);
    kron(&kron(&nd::Array2::eye(eyesize1), op), &nd::Array2::eye(eyesize2))
}

/// Index of a product state in the bare basis, given per-site occupations.
///
/// Site 0 is the most significant digit. Returns `None` if any occupation is
/// out of range.
pub fn product_index(occupations: &[usize], nlevels: usize) -> Option<usize> {
    occupations.iter()
        .try_fold(0_usize, |acc, &n| (n < nlevels).then_some(acc * nlevels + n))
}

/// List the per-site occupations of every bare basis state, in index order.
pub fn product_labels(nlevels: usize, nsites: usize) -> Vec<Vec<usize>> {
    (0..nsites).map(|_| 0..nlevels)
        .multi_cartesian_product()
        .collect()
}
