//! Many-file streaming pipeline.
//!
//! loader pool -> collator -> engine -> writer pool. Loader workers pull
//! input indices from a shared cursor and feed a bounded channel; the
//! pipeline thread collates batches and decodes; writers consume a bounded
//! save queue, so the producer blocks when saves fall behind. The only
//! ordering contract is the input-to-output path mapping; batches form in
//! completion order.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use crate::chunk::{chunk, CandidateSets};
use crate::config::DecodeConfig;
use crate::engine::{Batch, Engine, Model, Workspace};
use crate::error::DecodeError;
use crate::io::{self, Loader};
use crate::tensor::Matrix;

/// Writer queue bound; the decoder blocks when this many saves are pending.
const SAVE_QUEUE_LIMIT: usize = 100;

/// Cooperative cancellation, checked between batches. In-flight batches run
/// to completion so partial outputs stay well-formed.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Outcome of a many-files run.
#[derive(Debug, Default)]
pub struct PipelineReport {
    /// Sequences decoded and handed to the writer.
    pub decoded: usize,
    /// Per-sequence failures; the corresponding outputs were not produced.
    pub failures: Vec<(PathBuf, DecodeError)>,
    /// Whether the run stopped at a batch boundary due to cancellation.
    pub cancelled: bool,
}

impl PipelineReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

struct Loaded {
    emission: Matrix,
    candidates: Option<CandidateSets>,
}

struct SaveJob {
    path: PathBuf,
    indices: Vec<i32>,
}

/// Decode many emission files to index files.
///
/// `transition` and `initial` are shared read-only across the whole run;
/// the model's state count comes from the first loaded sequence. Read and
/// write failures are recorded per sequence and never disturb sibling
/// outputs; shape or numeric errors in the shared model abort the run.
#[allow(clippy::too_many_arguments)]
pub fn decode_files(
    inputs: &[PathBuf],
    outputs: &[PathBuf],
    transition: Option<&Matrix>,
    initial: Option<&[f32]>,
    config: &DecodeConfig,
    engine: &Engine,
    loader: &dyn Loader,
    cancel: Option<&CancelToken>,
    mut progress: impl FnMut(usize, usize),
) -> Result<PipelineReport, DecodeError> {
    if inputs.len() != outputs.len() {
        return Err(DecodeError::ShapeMismatch {
            what: "output paths",
            expected: format!("{} entries", inputs.len()),
            got: format!("{}", outputs.len()),
        });
    }
    let total = inputs.len();
    let mut report = PipelineReport::default();
    if total == 0 {
        return Ok(report);
    }

    let failures: Mutex<Vec<(PathBuf, DecodeError)>> = Mutex::new(Vec::new());
    let cursor = AtomicUsize::new(0);
    let batch_size = config.batch_size.max(1);

    std::thread::scope(|scope| -> Result<(), DecodeError> {
        // Writer pool, bounded for backpressure.
        let save_tx: Option<mpsc::SyncSender<SaveJob>> = if config.save_workers > 0 {
            let (tx, rx) = mpsc::sync_channel::<SaveJob>(SAVE_QUEUE_LIMIT);
            let rx = Arc::new(Mutex::new(rx));
            for _ in 0..config.save_workers {
                let rx = Arc::clone(&rx);
                let failures = &failures;
                scope.spawn(move || writer_loop(&rx, failures));
            }
            Some(tx)
        } else {
            None
        };

        // Loader pool: a shared cursor distributes input indices.
        let (load_tx, load_rx) =
            mpsc::sync_channel::<(usize, Result<Loaded, DecodeError>)>(batch_size * 2);
        let workers = std::thread::available_parallelism()
            .map_or(1, |n| (n.get() / 2).max(1))
            .min(total);
        for _ in 0..workers {
            let tx = load_tx.clone();
            let cursor = &cursor;
            scope.spawn(move || loop {
                if cancel.is_some_and(CancelToken::is_cancelled) {
                    break;
                }
                let i = cursor.fetch_add(1, Ordering::Relaxed);
                if i >= total {
                    break;
                }
                let result = loader.load(&inputs[i]).map(|emission| {
                    let candidates = config.use_chunking.then(|| {
                        chunk(
                            &emission,
                            config.chunk_width,
                            config.chunk_threshold,
                            config.log_probs,
                        )
                    });
                    Loaded {
                        emission,
                        candidates,
                    }
                });
                if tx.send((i, result)).is_err() {
                    break;
                }
            });
        }
        drop(load_tx);

        // Collate and decode on this thread.
        let mut model_holder: Option<Model> = None;
        let mut ws = Workspace::new();
        let mut pending: Vec<(usize, Matrix, Option<CandidateSets>)> = Vec::new();
        let mut decoded = 0usize;
        let mut cancelled = false;

        for (i, result) in load_rx.iter() {
            match result {
                Err(e) => record(&failures, inputs[i].clone(), e),
                Ok(loaded) => pending.push((i, loaded.emission, loaded.candidates)),
            }
            if pending.len() >= batch_size {
                if cancel.is_some_and(CancelToken::is_cancelled) {
                    cancelled = true;
                    break;
                }
                decoded += flush_batch(
                    &mut pending,
                    &mut model_holder,
                    &mut ws,
                    engine,
                    config,
                    transition,
                    initial,
                    inputs,
                    outputs,
                    save_tx.as_ref(),
                    &failures,
                )?;
                progress(decoded, total);
            }
        }
        drop(load_rx);

        if !cancelled && cancel.is_some_and(CancelToken::is_cancelled) {
            cancelled = true;
        }
        if !cancelled && !pending.is_empty() {
            decoded += flush_batch(
                &mut pending,
                &mut model_holder,
                &mut ws,
                engine,
                config,
                transition,
                initial,
                inputs,
                outputs,
                save_tx.as_ref(),
                &failures,
            )?;
            progress(decoded, total);
        }

        drop(save_tx);
        report.decoded = decoded;
        report.cancelled = cancelled;
        Ok(())
    })?;

    report.failures = match failures.into_inner() {
        Ok(v) => v,
        Err(poisoned) => poisoned.into_inner(),
    };
    Ok(report)
}

fn writer_loop(
    rx: &Mutex<mpsc::Receiver<SaveJob>>,
    failures: &Mutex<Vec<(PathBuf, DecodeError)>>,
) {
    loop {
        let job = match rx.lock() {
            Ok(guard) => guard.recv(),
            Err(_) => break,
        };
        match job {
            Ok(job) => {
                if let Err(e) = io::write_indices(&job.path, &job.indices) {
                    record(failures, job.path, e);
                }
            }
            Err(_) => break,
        }
    }
}

fn record(failures: &Mutex<Vec<(PathBuf, DecodeError)>>, path: PathBuf, error: DecodeError) {
    if let Ok(mut guard) = failures.lock() {
        guard.push((path, error));
    }
}

/// Decode the pending sequences as one batch and dispatch the writes.
/// Returns how many sequences were decoded.
#[allow(clippy::too_many_arguments)]
fn flush_batch(
    pending: &mut Vec<(usize, Matrix, Option<CandidateSets>)>,
    model_holder: &mut Option<Model>,
    ws: &mut Workspace,
    engine: &Engine,
    config: &DecodeConfig,
    transition: Option<&Matrix>,
    initial: Option<&[f32]>,
    inputs: &[PathBuf],
    outputs: &[PathBuf],
    save_tx: Option<&mpsc::SyncSender<SaveJob>>,
    failures: &Mutex<Vec<(PathBuf, DecodeError)>>,
) -> Result<usize, DecodeError> {
    if pending.is_empty() {
        return Ok(0);
    }

    // The shared model's state count comes from the first usable sequence.
    if model_holder.is_none() {
        if let Some((_, m, _)) = pending.iter().find(|(_, m, _)| m.cols() > 0) {
            *model_holder = Some(Model::prepare(
                m.cols(),
                transition,
                initial,
                config.log_probs,
            )?);
        }
    }
    let model = match model_holder.as_ref() {
        Some(m) => m,
        None => {
            for (i, m, _) in pending.drain(..) {
                record(
                    failures,
                    inputs[i].clone(),
                    DecodeError::ShapeMismatch {
                        what: "emission matrix",
                        expected: "(F, S) with S > 0".into(),
                        got: format!("({}, {})", m.rows(), m.cols()),
                    },
                );
            }
            return Ok(0);
        }
    };

    // Sequences that disagree with the shared model fail individually.
    let mut ids = Vec::with_capacity(pending.len());
    let mut seqs = Vec::with_capacity(pending.len());
    let mut cands = Vec::with_capacity(pending.len());
    for (i, m, c) in pending.drain(..) {
        if m.cols() != model.states() {
            record(
                failures,
                inputs[i].clone(),
                DecodeError::ShapeMismatch {
                    what: "emission matrix",
                    expected: format!("(F, {})", model.states()),
                    got: format!("({}, {})", m.rows(), m.cols()),
                },
            );
            continue;
        }
        if m.rows() == 0 {
            record(failures, inputs[i].clone(), DecodeError::EmptySequence);
            continue;
        }
        ids.push(i);
        seqs.push(m);
        cands.push(c);
    }
    if seqs.is_empty() {
        return Ok(0);
    }

    let batch = Batch::collate(&seqs, cands, config.log_probs, model.states())?;
    let flat = engine.decode_batch(model, &batch, ws)?;
    let ext = batch.extents();

    for (k, &i) in ids.iter().enumerate() {
        let len = batch.lens()[k];
        let masked = &flat[k * ext.frames..k * ext.frames + len];
        match save_tx {
            Some(tx) => {
                let job = SaveJob {
                    path: outputs[i].clone(),
                    indices: masked.to_vec(),
                };
                if tx.send(job).is_err() {
                    record(
                        failures,
                        outputs[i].clone(),
                        DecodeError::write(&outputs[i], "writer pool shut down"),
                    );
                }
            }
            None => {
                if let Err(e) = io::write_indices(&outputs[i], masked) {
                    record(failures, outputs[i].clone(), e);
                }
            }
        }
    }
    Ok(ids.len())
}
