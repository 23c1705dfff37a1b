//! Dense log-space forward recurrence.

use rayon::prelude::*;

use super::PAR_STATES;

/// Best predecessor for one output state: max over i of
/// `delta_prev[i] + log T[i, j]`, scanning ascending with strict `>` so the
/// smallest index wins ties. An all minus-infinity column yields index 0.
#[inline]
pub(crate) fn best_predecessor(delta_prev: &[f32], transition_col: &[f32]) -> (i32, f32) {
    let mut best = f32::NEG_INFINITY;
    let mut arg = 0usize;
    for (i, (&d, &t)) in delta_prev.iter().zip(transition_col).enumerate() {
        let p = d + t;
        if p > best {
            best = p;
            arg = i;
        }
    }
    (arg as i32, best)
}

/// Forward pass over one sequence.
///
/// `obs` is the (frames, states) log emission block; `transition_t` is the
/// transposed log transition so the predecessor scan over i is unit-stride.
/// `delta` is caller scratch of length `2 * states` (the double buffer);
/// `memo` is the (frames, states) predecessor table, whose frame-0 row the
/// caller has already zeroed. The terminal posterior lands in `delta_term`.
pub fn forward_single(
    obs: &[f32],
    transition_t: &[f32],
    initial: &[f32],
    frames: usize,
    states: usize,
    delta: &mut [f32],
    memo: &mut [i32],
    delta_term: &mut [f32],
) {
    debug_assert_eq!(delta.len(), 2 * states);
    let (mut prev, mut cur) = delta.split_at_mut(states);

    for s in 0..states {
        prev[s] = initial[s] + obs[s];
    }

    for t in 1..frames {
        let obs_row = &obs[t * states..(t + 1) * states];
        let memo_row = &mut memo[t * states..(t + 1) * states];
        let delta_prev: &[f32] = prev;

        if states >= PAR_STATES {
            cur.par_iter_mut()
                .zip(memo_row.par_iter_mut())
                .enumerate()
                .for_each(|(j, (d, m))| {
                    let col = &transition_t[j * states..(j + 1) * states];
                    let (arg, best) = best_predecessor(delta_prev, col);
                    *m = arg;
                    *d = best + obs_row[j];
                });
        } else {
            for (j, (d, m)) in cur.iter_mut().zip(memo_row.iter_mut()).enumerate() {
                let col = &transition_t[j * states..(j + 1) * states];
                let (arg, best) = best_predecessor(delta_prev, col);
                *m = arg;
                *d = best + obs_row[j];
            }
        }

        std::mem::swap(&mut prev, &mut cur);
    }

    delta_term.copy_from_slice(prev);
}
