//! Batch decoding engine.
//!
//! Owns backend selection, input validation, log-space conversion, batch
//! padding, and the pooled memoization workspace. The kernels do the math;
//! the engine hands them validated flat buffers with explicit extents.

use rayon::prelude::*;

use crate::chunk::CandidateSets;
use crate::error::DecodeError;
use crate::gpu::accel::Accelerator;
use crate::kernel::backward::backtrace;
use crate::kernel::chunked::forward_pruned;
use crate::kernel::forward::forward_single;
use crate::kernel::Extents;
use crate::tensor::Matrix;

/// Decode target: CPU thread pool or an accelerator adapter by index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Accelerator(usize),
}

/// Shared read-only transition/initial model, always in log space.
///
/// Prepared once per workload and shared across every worker thread and
/// batch. The transition matrix is stored transposed ([j, i] layout) so the
/// predecessor scan over i is unit-stride on every backend.
pub struct Model {
    pub(crate) states: usize,
    pub(crate) log_transition_t: Vec<f32>,
    pub(crate) log_initial: Vec<f32>,
}

impl Model {
    /// Validate, default, and log-convert the transition matrix and initial
    /// distribution. Absent inputs default to uniform 1/S.
    pub fn prepare(
        states: usize,
        transition: Option<&Matrix>,
        initial: Option<&[f32]>,
        log_probs: bool,
    ) -> Result<Self, DecodeError> {
        if states == 0 {
            return Err(DecodeError::ShapeMismatch {
                what: "state count",
                expected: "at least 1".into(),
                got: "0".into(),
            });
        }
        let uniform = -(states as f32).ln();

        let mut log_transition_t = vec![uniform; states * states];
        if let Some(t) = transition {
            if t.rows() != states || t.cols() != states {
                return Err(DecodeError::ShapeMismatch {
                    what: "transition matrix",
                    expected: format!("({states}, {states})"),
                    got: format!("({}, {})", t.rows(), t.cols()),
                });
            }
            for i in 0..states {
                let row = t.row(i);
                for j in 0..states {
                    let lv = convert(row[j], log_probs);
                    if lv.is_nan() || lv == f32::INFINITY {
                        return Err(DecodeError::NumericInvalid { frame: i, state: j });
                    }
                    log_transition_t[j * states + i] = lv;
                }
            }
        }

        let mut log_initial = vec![uniform; states];
        if let Some(p) = initial {
            if p.len() != states {
                return Err(DecodeError::ShapeMismatch {
                    what: "initial distribution",
                    expected: format!("({states},)"),
                    got: format!("({},)", p.len()),
                });
            }
            for (s, &v) in p.iter().enumerate() {
                let lv = convert(v, log_probs);
                if lv.is_nan() || lv == f32::INFINITY {
                    return Err(DecodeError::NumericInvalid { frame: 0, state: s });
                }
                log_initial[s] = lv;
            }
        }

        Ok(Self {
            states,
            log_transition_t,
            log_initial,
        })
    }

    pub fn states(&self) -> usize {
        self.states
    }
}

#[inline]
fn convert(v: f32, log_probs: bool) -> f32 {
    if log_probs {
        v
    } else {
        v.ln()
    }
}

/// A padded batch of log-space emissions ready for the kernels.
pub struct Batch {
    pub(crate) obs: Vec<f32>,
    pub(crate) lens: Vec<usize>,
    pub(crate) ext: Extents,
    pub(crate) candidates: Vec<Option<CandidateSets>>,
}

impl Batch {
    /// Collate sequences into one padded (B, F_max, S) block, converting to
    /// log space and validating every element. `candidates` carries one
    /// optional pruning window per sequence, in order.
    pub fn collate(
        seqs: &[Matrix],
        candidates: Vec<Option<CandidateSets>>,
        log_probs: bool,
        states: usize,
    ) -> Result<Self, DecodeError> {
        if candidates.len() != seqs.len() {
            return Err(DecodeError::ShapeMismatch {
                what: "candidate sets",
                expected: format!("{} entries", seqs.len()),
                got: format!("{}", candidates.len()),
            });
        }
        let mut frames_max = 0usize;
        for (m, cand) in seqs.iter().zip(&candidates) {
            if m.cols() != states {
                return Err(DecodeError::ShapeMismatch {
                    what: "emission matrix",
                    expected: format!("(F, {states})"),
                    got: format!("({}, {})", m.rows(), m.cols()),
                });
            }
            if m.rows() == 0 {
                return Err(DecodeError::EmptySequence);
            }
            if let Some(sets) = cand {
                if sets.states() != states || sets.len() != m.rows() {
                    return Err(DecodeError::ShapeMismatch {
                        what: "candidate sets",
                        expected: format!("({}, {states})", m.rows()),
                        got: format!("({}, {})", sets.len(), sets.states()),
                    });
                }
            }
            frames_max = frames_max.max(m.rows());
        }

        let ext = Extents {
            batch: seqs.len(),
            frames: frames_max,
            states,
        };
        let mut obs = vec![f32::NEG_INFINITY; ext.slab_len()];
        let mut lens = Vec::with_capacity(seqs.len());
        for (b, m) in seqs.iter().enumerate() {
            for t in 0..m.rows() {
                let src = m.row(t);
                let dst = &mut obs[(b * frames_max + t) * states..][..states];
                for (s, (&v, d)) in src.iter().zip(dst.iter_mut()).enumerate() {
                    let lv = convert(v, log_probs);
                    if lv.is_nan() || lv == f32::INFINITY {
                        return Err(DecodeError::NumericInvalid { frame: t, state: s });
                    }
                    *d = lv;
                }
            }
            lens.push(m.rows());
        }

        Ok(Self {
            obs,
            lens,
            ext,
            candidates,
        })
    }

    pub fn extents(&self) -> Extents {
        self.ext
    }

    pub fn lens(&self) -> &[usize] {
        &self.lens
    }
}

/// Pooled per-call scratch: the memoization slab and terminal posterior.
/// Reused across batches so the only F-sized allocation is amortized.
#[derive(Default)]
pub struct Workspace {
    memo: Vec<i32>,
    delta_term: Vec<f32>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure(&mut self, ext: Extents) {
        let slab = ext.slab_len();
        if self.memo.len() < slab {
            self.memo.resize(slab, 0);
        }
        self.memo[..slab].fill(0);
        let term = ext.term_len();
        if self.delta_term.len() < term {
            self.delta_term.resize(term, 0.0);
        }
    }
}

enum Backend {
    Cpu,
    Accelerator(Accelerator),
}

/// Batched Viterbi decoder bound to one backend.
pub struct Engine {
    backend: Backend,
}

impl Engine {
    /// Bind a backend. `Device::Accelerator` fails with
    /// [`DecodeError::BackendUnavailable`] when the adapter index is
    /// invalid or the device cannot be created.
    pub fn new(device: Device) -> Result<Self, DecodeError> {
        let backend = match device {
            Device::Cpu => Backend::Cpu,
            Device::Accelerator(index) => Backend::Accelerator(Accelerator::new(index)?),
        };
        Ok(Self { backend })
    }

    /// Decode one batch. Returns row-major (B, F_max) indices; entries at
    /// `t >= lens[b]` are zero and must be masked by the caller.
    ///
    /// Pruned batches always decode on the CPU; the accelerator contract
    /// covers the dense recurrence only.
    pub fn decode_batch(
        &self,
        model: &Model,
        batch: &Batch,
        ws: &mut Workspace,
    ) -> Result<Vec<i32>, DecodeError> {
        let ext = batch.ext;
        if ext.batch == 0 {
            return Ok(Vec::new());
        }
        if ext.states != model.states {
            return Err(DecodeError::ShapeMismatch {
                what: "batch state count",
                expected: format!("{}", model.states),
                got: format!("{}", ext.states),
            });
        }
        ws.ensure(ext);

        let pruned = batch.candidates.iter().any(Option::is_some);
        match &self.backend {
            Backend::Accelerator(accel) if !pruned => {
                accel.forward(model, batch, &mut ws.delta_term, &mut ws.memo)?;
            }
            _ => cpu_forward(model, batch, ws),
        }

        let mut indices = vec![0i32; ext.batch * ext.frames];
        backtrace(
            &ws.delta_term[..ext.term_len()],
            &ws.memo[..ext.slab_len()],
            &batch.lens,
            ext,
            &mut indices,
        );
        Ok(indices)
    }
}

/// CPU forward pass: parallel across batch elements; the dense kernel
/// additionally splits the per-frame scan for large state counts.
fn cpu_forward(model: &Model, batch: &Batch, ws: &mut Workspace) {
    let ext = batch.ext;
    let fs = ext.frames * ext.states;
    let transition_t = model.log_transition_t.as_slice();
    let initial = model.log_initial.as_slice();

    ws.memo[..ext.slab_len()]
        .par_chunks_mut(fs)
        .zip(ws.delta_term[..ext.term_len()].par_chunks_mut(ext.states))
        .zip(batch.obs.par_chunks(fs))
        .zip(batch.lens.par_iter())
        .zip(batch.candidates.par_iter())
        .for_each(|((((memo_b, term_b), obs_b), &len), cand)| {
            let mut delta = vec![f32::NEG_INFINITY; 2 * ext.states];
            match cand {
                Some(sets) => forward_pruned(
                    obs_b,
                    transition_t,
                    initial,
                    len,
                    ext.states,
                    sets,
                    &mut delta,
                    memo_b,
                    term_b,
                ),
                None => forward_single(
                    obs_b,
                    transition_t,
                    initial,
                    len,
                    ext.states,
                    &mut delta,
                    memo_b,
                    term_b,
                ),
            }
        });
}
