//! Numeric kernels for the log-space Viterbi recurrence.
//!
//! Pure functions over flat f32/i32 slices with explicit extents. No I/O,
//! no allocation beyond caller-provided buffers, infallible once the engine
//! has validated shapes. The tie-break rule (ascending scan, strict
//! greater-than, smallest index wins) is a cross-backend contract.

pub mod backward;
pub mod chunked;
pub mod forward;

/// Extents of a padded batch: (batch, frames, states).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Extents {
    pub batch: usize,
    pub frames: usize,
    pub states: usize,
}

impl Extents {
    /// Length of the (B, F, S) emission and memoization slabs.
    pub fn slab_len(&self) -> usize {
        self.batch * self.frames * self.states
    }

    /// Length of the (B, S) terminal posterior.
    pub fn term_len(&self) -> usize {
        self.batch * self.states
    }
}

/// State counts at or above this split the per-frame predecessor scan
/// across threads as well as the batch.
pub(crate) const PAR_STATES: usize = 512;
