//! Argmax backtrace over the memoization tensor.

use super::Extents;

/// Smallest-index argmax, matching the forward tie-break.
#[inline]
pub(crate) fn argmax(values: &[f32]) -> usize {
    let mut best = f32::NEG_INFINITY;
    let mut arg = 0usize;
    for (i, &v) in values.iter().enumerate() {
        if v > best {
            best = v;
            arg = i;
        }
    }
    arg
}

/// Reconstruct index paths from the terminal posterior and the predecessor
/// table. `indices` is the (batch, frames) output; entries at `t >= lens[b]`
/// are left untouched (the writer masks them). No allocation.
pub fn backtrace(
    delta_term: &[f32],
    memo: &[i32],
    lens: &[usize],
    ext: Extents,
    indices: &mut [i32],
) {
    let fs = ext.frames * ext.states;
    for b in 0..ext.batch {
        let len = lens[b];
        if len == 0 {
            continue;
        }
        let term = &delta_term[b * ext.states..(b + 1) * ext.states];
        let memo_b = &memo[b * fs..(b + 1) * fs];
        let row = &mut indices[b * ext.frames..b * ext.frames + ext.frames];

        row[len - 1] = argmax(term) as i32;
        for t in (0..len - 1).rev() {
            let next = row[t + 1] as usize;
            row[t] = memo_b[(t + 1) * ext.states + next];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_tie_break_picks_smallest_state() {
        let ext = Extents {
            batch: 1,
            frames: 1,
            states: 3,
        };
        let mut indices = [9i32];
        backtrace(&[-1.0, -1.0, -2.0], &[0, 0, 0], &[1], ext, &mut indices);
        assert_eq!(indices, [0]);
    }

    #[test]
    fn follows_predecessor_chain() {
        // Two frames, three states: terminal argmax is 2, whose frame-1
        // predecessor is 1.
        let ext = Extents {
            batch: 1,
            frames: 2,
            states: 3,
        };
        let memo = [0, 0, 0, 0, 0, 1];
        let mut indices = [0i32; 2];
        backtrace(&[-5.0, -4.0, -3.0], &memo, &[2], ext, &mut indices);
        assert_eq!(indices, [1, 2]);
    }

    #[test]
    fn padding_entries_are_untouched() {
        let ext = Extents {
            batch: 1,
            frames: 4,
            states: 2,
        };
        let memo = [0i32; 8];
        let mut indices = [7i32; 4];
        backtrace(&[0.0, -1.0], &memo, &[2], ext, &mut indices);
        assert_eq!(&indices[..2], &[0, 0]);
        assert_eq!(&indices[2..], &[7, 7]);
    }
}
