//! State pruning for large alphabets.
//!
//! When most of each frame's probability mass sits on a small neighborhood
//! of states (pitch tracking over ~1440 bins is the motivating workload),
//! the quadratic predecessor scan can be restricted to a per-frame
//! candidate window. The chunker selects, per frame, the highest-mass
//! states covering a configured fraction of that frame's total mass. The
//! window starts at `width` states and doubles until the threshold is met;
//! a frame with no usable mass falls back to the full state range.

use crate::tensor::Matrix;

/// Per-frame candidate-state lists, sorted ascending.
#[derive(Clone, Debug)]
pub struct CandidateSets {
    frames: Vec<Vec<u32>>,
    states: usize,
}

impl CandidateSets {
    pub fn frame(&self, t: usize) -> &[u32] {
        &self.frames[t]
    }

    /// Number of frames covered.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn states(&self) -> usize {
        self.states
    }
}

/// Select per-frame candidate states retaining at least `threshold` of each
/// frame's probability mass, with a window cap that doubles on demand.
///
/// Mass is accounted in probability space; log-space inputs are
/// exponentiated for the accounting only. The emission values themselves
/// are never modified.
pub fn chunk(observation: &Matrix, width: usize, threshold: f32, log_probs: bool) -> CandidateSets {
    let states = observation.cols();
    let mut frames = Vec::with_capacity(observation.rows());
    let mut order: Vec<u32> = (0..states as u32).collect();

    for t in 0..observation.rows() {
        let row = observation.row(t);
        let masses: Vec<f32> = if log_probs {
            row.iter().map(|v| v.exp()).collect()
        } else {
            row.to_vec()
        };
        let total: f64 = masses.iter().map(|&m| f64::from(m)).sum();
        if !(total > 0.0) {
            frames.push((0..states as u32).collect());
            continue;
        }
        let target = f64::from(threshold) * total;

        // Highest mass first; ties resolve to the smaller state index.
        order.sort_unstable_by(|&a, &b| {
            masses[b as usize]
                .partial_cmp(&masses[a as usize])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });

        let mut take = width.max(1).min(states);
        loop {
            let mass: f64 = order[..take]
                .iter()
                .map(|&s| f64::from(masses[s as usize]))
                .sum();
            if mass >= target || take == states {
                break;
            }
            take = (take * 2).min(states);
        }

        let mut selected: Vec<u32> = order[..take].to_vec();
        selected.sort_unstable();
        frames.push(selected);
    }

    CandidateSets { frames, states }
}
