//! Probability-space oracle decoder.
//!
//! Single-sequence textbook Viterbi over f64 accumulators with per-frame
//! renormalization against underflow. Used as a correctness oracle and for
//! small inputs; never in the hot path. Tie-breaks match the engine:
//! ascending scan, strict greater-than, smallest index wins.

use std::path::Path;

use crate::error::DecodeError;
use crate::io;
use crate::tensor::Matrix;

/// Decode one sequence in probability space.
///
/// `transition` and `initial` default to uniform when absent. When
/// `log_probs` is set, all inputs are exponentiated back to probabilities
/// before decoding.
pub fn decode(
    observation: &Matrix,
    transition: Option<&Matrix>,
    initial: Option<&[f32]>,
    log_probs: bool,
) -> Result<Vec<i32>, DecodeError> {
    let frames = observation.rows();
    let states = observation.cols();
    if frames == 0 {
        return Err(DecodeError::EmptySequence);
    }

    let to_prob = |v: f32| -> f64 {
        if log_probs {
            f64::from(v).exp()
        } else {
            f64::from(v)
        }
    };

    let uniform = 1.0 / states as f64;
    let trans: Vec<f64> = match transition {
        Some(t) => {
            if t.rows() != states || t.cols() != states {
                return Err(DecodeError::ShapeMismatch {
                    what: "transition matrix",
                    expected: format!("({states}, {states})"),
                    got: format!("({}, {})", t.rows(), t.cols()),
                });
            }
            t.as_slice().iter().map(|&v| to_prob(v)).collect()
        }
        None => vec![uniform; states * states],
    };
    let init: Vec<f64> = match initial {
        Some(p) => {
            if p.len() != states {
                return Err(DecodeError::ShapeMismatch {
                    what: "initial distribution",
                    expected: format!("({states},)"),
                    got: format!("({},)", p.len()),
                });
            }
            p.iter().map(|&v| to_prob(v)).collect()
        }
        None => vec![uniform; states],
    };

    let mut delta: Vec<f64> = (0..states)
        .map(|s| init[s] * to_prob(observation.row(0)[s]))
        .collect();
    let mut scratch = vec![0.0f64; states];
    let mut memo = vec![0i32; frames * states];
    normalize(&mut delta);

    for t in 1..frames {
        let row = observation.row(t);
        for j in 0..states {
            let mut best = f64::NEG_INFINITY;
            let mut arg = 0usize;
            for (i, &d) in delta.iter().enumerate() {
                let p = d * trans[i * states + j];
                if p > best {
                    best = p;
                    arg = i;
                }
            }
            memo[t * states + j] = arg as i32;
            scratch[j] = best * to_prob(row[j]);
        }
        std::mem::swap(&mut delta, &mut scratch);
        normalize(&mut delta);
    }

    let mut best = f64::NEG_INFINITY;
    let mut arg = 0usize;
    for (s, &d) in delta.iter().enumerate() {
        if d > best {
            best = d;
            arg = s;
        }
    }

    let mut path = vec![0i32; frames];
    path[frames - 1] = arg as i32;
    for t in (0..frames - 1).rev() {
        path[t] = memo[(t + 1) * states + path[t + 1] as usize];
    }
    Ok(path)
}

fn normalize(delta: &mut [f64]) {
    let sum: f64 = delta.iter().sum();
    if sum > 0.0 {
        for d in delta.iter_mut() {
            *d /= sum;
        }
    }
}

/// Decode a single emission file with the oracle.
pub fn from_file(
    input_file: &Path,
    transition_file: Option<&Path>,
    initial_file: Option<&Path>,
    log_probs: bool,
) -> Result<Vec<i32>, DecodeError> {
    let observation = io::read_matrix(input_file)?;
    let transition = transition_file.map(io::read_matrix).transpose()?;
    let initial = initial_file.map(io::read_vector).transpose()?;
    decode(
        &observation,
        transition.as_ref(),
        initial.as_deref(),
        log_probs,
    )
}

/// Decode a single emission file with the oracle and save the path.
pub fn from_file_to_file(
    input_file: &Path,
    output_file: &Path,
    transition_file: Option<&Path>,
    initial_file: Option<&Path>,
    log_probs: bool,
) -> Result<(), DecodeError> {
    let indices = from_file(input_file, transition_file, initial_file, log_probs)?;
    io::write_indices(output_file, &indices)
}
