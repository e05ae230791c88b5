//! Expansion of per-spectrum array properties.
//!
//! A property that holds one value per spectrum may be given with 0 values (use the
//! defaults), 1 value (repeat it for every spectrum) or exactly N values. Every
//! algorithm that takes per-spectrum arrays goes through this module.

use thiserror::Error;

/// How a given array length maps onto N elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Broadcast {
    /// Length 0: every element takes its default.
    Defaults,
    /// Length 1: the single value is repeated.
    Single,
    /// Length N: used as given.
    PerElement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("length mismatch: expected 0, 1 or {expected} values, got {actual}")]
pub struct LengthMismatch {
    pub expected: usize,
    pub actual: usize,
}

/// Classifies `len` against `n` elements.
///
/// When `n` is 1 a single value counts as [`Broadcast::Single`].
pub fn classify(len: usize, n: usize) -> Result<Broadcast, LengthMismatch> {
    match len {
        0 => Ok(Broadcast::Defaults),
        1 => Ok(Broadcast::Single),
        l if l == n => Ok(Broadcast::PerElement),
        actual => Err(LengthMismatch { expected: n, actual }),
    }
}

/// Expands `values` to `n` elements, using `default(i)` for element `i` when empty.
pub fn broadcast_with<T, F>(values: &[T], n: usize, default: F) -> Result<Vec<T>, LengthMismatch>
where
    T: Clone,
    F: FnMut(usize) -> T,
{
    match classify(values.len(), n)? {
        Broadcast::Defaults => Ok((0..n).map(default).collect()),
        Broadcast::Single => Ok(vec![values[0].clone(); n]),
        Broadcast::PerElement => Ok(values.to_vec()),
    }
}

/// Expands `values` to `n` elements with one shared default.
pub fn broadcast<T: Clone>(values: &[T], n: usize, default: T) -> Result<Vec<T>, LengthMismatch> {
    broadcast_with(values, n, |_| default.clone())
}
