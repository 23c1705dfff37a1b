//! Public decode API.
//!
//! Three entry shapes, each reducing to the same engine: in-memory batches,
//! one file to one file, and many files to many files through the streaming
//! pipeline.

use std::path::{Path, PathBuf};

use crate::config::DecodeConfig;
use crate::engine::{Batch, Device, Engine, Model, Workspace};
use crate::error::DecodeError;
use crate::io::{self, ArchiveLoader};
use crate::stream::{self, CancelToken, PipelineReport};
use crate::tensor::Matrix;

/// Decode a batch of time-varying categorical distributions.
///
/// Each observation is an (F, S) matrix; all must agree on S. `transition`
/// and `initial` default to uniform. Returns one index path per sequence,
/// already masked to its own length.
pub fn from_probabilities(
    observations: &[Matrix],
    transition: Option<&Matrix>,
    initial: Option<&[f32]>,
    log_probs: bool,
    device: Device,
) -> Result<Vec<Vec<i32>>, DecodeError> {
    if observations.is_empty() {
        return Ok(Vec::new());
    }
    let states = observations[0].cols();
    let model = Model::prepare(states, transition, initial, log_probs)?;
    let engine = Engine::new(device)?;
    let mut ws = Workspace::new();

    let batch = Batch::collate(
        observations,
        vec![None; observations.len()],
        log_probs,
        states,
    )?;
    let flat = engine.decode_batch(&model, &batch, &mut ws)?;
    let ext = batch.extents();

    Ok(batch
        .lens()
        .iter()
        .enumerate()
        .map(|(b, &len)| flat[b * ext.frames..b * ext.frames + len].to_vec())
        .collect())
}

/// Decode a single emission file.
pub fn from_file(
    input_file: &Path,
    transition_file: Option<&Path>,
    initial_file: Option<&Path>,
    log_probs: bool,
    device: Device,
) -> Result<Vec<i32>, DecodeError> {
    let observation = io::read_matrix(input_file)?;
    let transition = transition_file.map(io::read_matrix).transpose()?;
    let initial = initial_file.map(io::read_vector).transpose()?;
    let mut paths = from_probabilities(
        &[observation],
        transition.as_ref(),
        initial.as_deref(),
        log_probs,
        device,
    )?;
    Ok(paths.pop().unwrap_or_default())
}

/// Decode a single emission file and save the index path.
pub fn from_file_to_file(
    input_file: &Path,
    output_file: &Path,
    transition_file: Option<&Path>,
    initial_file: Option<&Path>,
    log_probs: bool,
    device: Device,
) -> Result<(), DecodeError> {
    let indices = from_file(
        input_file,
        transition_file,
        initial_file,
        log_probs,
        device,
    )?;
    io::write_indices(output_file, &indices)
}

/// Decode many emission files through the streaming pipeline.
///
/// The transition matrix and initial distribution are loaded once and
/// shared across every sequence. Per-sequence read/write failures are
/// recorded in the report; the matching outputs are not produced.
pub fn from_files_to_files(
    input_files: &[PathBuf],
    output_files: &[PathBuf],
    transition_file: Option<&Path>,
    initial_file: Option<&Path>,
    config: &DecodeConfig,
    cancel: Option<&CancelToken>,
    progress: impl FnMut(usize, usize),
) -> Result<PipelineReport, DecodeError> {
    let transition = transition_file.map(io::read_matrix).transpose()?;
    let initial = initial_file.map(io::read_vector).transpose()?;
    let engine = Engine::new(config.device())?;
    stream::decode_files(
        input_files,
        output_files,
        transition.as_ref(),
        initial.as_deref(),
        config,
        &engine,
        &ArchiveLoader,
        cancel,
        progress,
    )
}
