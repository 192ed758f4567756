//! Reusable scratch buffers for state and co-state arrays.
//!
//! Buffers are parked in a thread-local pool keyed by a stable tag and the
//! buffer's shape. [`acquire`] checks one out as a [`Scratch`] guard, which
//! puts it back when dropped. A key that is already checked out is never
//! handed out twice; a nested acquisition simply allocates a fresh buffer.
//!
//! Buffer contents are unspecified on acquisition.

use std::{
    cell::RefCell,
    ops::{ Deref, DerefMut },
};
use ndarray as nd;
use num_complex::Complex64 as C64;
use rustc_hash::FxHashMap as HashMap;

type Key = (&'static str, Vec<usize>);

thread_local! {
    static POOL: RefCell<HashMap<Key, nd::ArrayD<C64>>>
        = RefCell::new(HashMap::default());
}

/// A checked-out scratch buffer; derefs to the underlying array.
#[derive(Debug)]
pub struct Scratch<D>
where D: nd::Dimension
{
    tag: &'static str,
    array: nd::Array<C64, D>,
}

impl<D> Scratch<D>
where D: nd::Dimension
{
    /// Return the tag under which this buffer is pooled.
    pub fn tag(&self) -> &'static str { self.tag }
}

impl<D> Deref for Scratch<D>
where D: nd::Dimension
{
    type Target = nd::Array<C64, D>;

    fn deref(&self) -> &Self::Target { &self.array }
}

impl<D> DerefMut for Scratch<D>
where D: nd::Dimension
{
    fn deref_mut(&mut self) -> &mut Self::Target { &mut self.array }
}

impl<D> Drop for Scratch<D>
where D: nd::Dimension
{
    fn drop(&mut self) {
        let array = std::mem::take(&mut self.array);
        let key: Key = (self.tag, array.shape().to_vec());
        // the pool may already be gone during thread teardown
        let _ = POOL.try_with(|pool| {
            pool.borrow_mut().insert(key, array.into_dyn());
        });
    }
}

/// Check out a buffer of the given shape under `tag`, allocating a zeroed one
/// if none is parked.
pub fn acquire<D, Sh>(tag: &'static str, shape: Sh) -> Scratch<D>
where
    D: nd::Dimension,
    Sh: nd::IntoDimension<Dim = D>,
{
    let dim: D = shape.into_dimension();
    let key: Key = (tag, dim.slice().to_vec());
    let array: nd::Array<C64, D>
        = POOL.with(|pool| pool.borrow_mut().remove(&key))
        .and_then(|arr| arr.into_dimensionality::<D>().ok())
        .unwrap_or_else(|| {
            tracing::trace!(tag, shape = ?key.1, "allocating scratch buffer");
            nd::Array::zeros(dim)
        });
    Scratch { tag, array }
}

/// Drop every buffer parked in the current thread's pool.
pub fn clear() {
    POOL.with(|pool| pool.borrow_mut().clear());
}

/// Number of buffers parked in the current thread's pool.
pub fn pooled() -> usize {
    POOL.with(|pool| pool.borrow().len())
}
