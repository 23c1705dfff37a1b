use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use trellis::engine::Device;
use trellis::{
    from_file_to_file, from_files_to_files, from_probabilities, io, reference, CancelToken,
    DecodeConfig, DecodeError, Matrix,
};

fn random_stochastic(rng: &mut StdRng, rows: usize, cols: usize) -> Matrix {
    let mut data = Vec::with_capacity(rows * cols);
    for _ in 0..rows {
        let row: Vec<f32> = (0..cols).map(|_| rng.gen_range(0.01..1.0)).collect();
        let sum: f32 = row.iter().sum();
        data.extend(row.into_iter().map(|v| v / sum));
    }
    Matrix::from_vec(rows, cols, data).unwrap()
}

/// Write emission files and return (inputs, outputs, expected paths).
fn stage_workload(
    dir: &TempDir,
    seed: u64,
    lengths: &[usize],
    states: usize,
) -> (Vec<PathBuf>, Vec<PathBuf>, Vec<Vec<i32>>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    let mut expected = Vec::new();
    for (k, &frames) in lengths.iter().enumerate() {
        let emission = random_stochastic(&mut rng, frames, states);
        let input = dir.path().join(format!("seq{k}.trl"));
        let output = dir.path().join(format!("seq{k}.idx.trl"));
        io::write_matrix(&input, &emission).unwrap();
        let solo = from_probabilities(&[emission], None, None, false, Device::Cpu).unwrap();
        expected.push(solo.into_iter().next().unwrap());
        inputs.push(input);
        outputs.push(output);
    }
    (inputs, outputs, expected)
}

#[test]
fn many_files_round_trip_matches_in_memory_decoding() {
    let dir = tempfile::tempdir().unwrap();
    let (inputs, outputs, expected) = stage_workload(&dir, 21, &[3, 5, 4], 4);
    let config = DecodeConfig {
        batch_size: 2,
        ..DecodeConfig::default()
    };

    let report =
        from_files_to_files(&inputs, &outputs, None, None, &config, None, |_, _| {}).unwrap();
    assert!(report.is_clean());
    assert_eq!(report.decoded, 3);

    for (output, expected) in outputs.iter().zip(&expected) {
        assert_eq!(&io::read_indices(output).unwrap(), expected);
    }
}

#[test]
fn batching_masks_each_output_to_its_own_length() {
    // All three sequences land in one batch; the padded region of the
    // shorter ones must not leak into their files.
    let dir = tempfile::tempdir().unwrap();
    let (inputs, outputs, expected) = stage_workload(&dir, 22, &[2, 9, 6], 5);
    let config = DecodeConfig {
        batch_size: 3,
        ..DecodeConfig::default()
    };

    from_files_to_files(&inputs, &outputs, None, None, &config, None, |_, _| {}).unwrap();

    for (output, expected) in outputs.iter().zip(&expected) {
        let written = io::read_indices(output).unwrap();
        assert_eq!(written.len(), expected.len());
        assert_eq!(&written, expected);
    }
}

#[test]
fn async_save_matches_synchronous_save() {
    let dir = tempfile::tempdir().unwrap();
    let (inputs, outputs, expected) = stage_workload(&dir, 23, &[4, 4, 7, 2, 5], 3);
    let config = DecodeConfig {
        batch_size: 2,
        save_workers: 2,
        ..DecodeConfig::default()
    };

    let report =
        from_files_to_files(&inputs, &outputs, None, None, &config, None, |_, _| {}).unwrap();
    assert!(report.is_clean());

    for (output, expected) in outputs.iter().zip(&expected) {
        assert_eq!(&io::read_indices(output).unwrap(), expected);
    }
}

#[test]
fn per_sequence_read_failure_skips_only_that_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let (mut inputs, outputs, expected) = stage_workload(&dir, 24, &[3, 4, 5], 4);
    inputs[1] = dir.path().join("missing.trl");
    let config = DecodeConfig {
        batch_size: 2,
        ..DecodeConfig::default()
    };

    let report =
        from_files_to_files(&inputs, &outputs, None, None, &config, None, |_, _| {}).unwrap();
    assert_eq!(report.decoded, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, inputs[1]);
    assert!(matches!(report.failures[0].1, DecodeError::Read { .. }));

    assert_eq!(&io::read_indices(&outputs[0]).unwrap(), &expected[0]);
    assert!(!outputs[1].exists());
    assert_eq!(&io::read_indices(&outputs[2]).unwrap(), &expected[2]);
}

#[test]
fn shared_transition_and_initial_are_loaded_once_and_applied() {
    let dir = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(25);
    let states = 6;
    let transition = random_stochastic(&mut rng, states, states);
    let initial: Vec<f32> = {
        let row: Vec<f32> = (0..states).map(|_| rng.gen_range(0.01..1.0)).collect();
        let sum: f32 = row.iter().sum();
        row.into_iter().map(|v| v / sum).collect()
    };
    let transition_path = dir.path().join("transition.trl");
    let initial_path = dir.path().join("initial.trl");
    io::write_matrix(&transition_path, &transition).unwrap();
    io::write_vector(&initial_path, &initial).unwrap();

    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    let mut expected = Vec::new();
    for k in 0..3 {
        let emission = random_stochastic(&mut rng, 8 + k, states);
        let input = dir.path().join(format!("seq{k}.trl"));
        io::write_matrix(&input, &emission).unwrap();
        let solo = from_probabilities(
            &[emission],
            Some(&transition),
            Some(&initial),
            false,
            Device::Cpu,
        )
        .unwrap();
        expected.push(solo.into_iter().next().unwrap());
        inputs.push(input);
        outputs.push(dir.path().join(format!("seq{k}.idx.trl")));
    }

    let config = DecodeConfig {
        batch_size: 2,
        ..DecodeConfig::default()
    };
    let report = from_files_to_files(
        &inputs,
        &outputs,
        Some(&transition_path),
        Some(&initial_path),
        &config,
        None,
        |_, _| {},
    )
    .unwrap();
    assert!(report.is_clean());

    for (output, expected) in outputs.iter().zip(&expected) {
        assert_eq!(&io::read_indices(output).unwrap(), expected);
    }
}

#[test]
fn progress_advances_by_batch_up_to_the_total() {
    let dir = tempfile::tempdir().unwrap();
    let (inputs, outputs, _) = stage_workload(&dir, 26, &[3, 3, 3, 3, 3], 4);
    let config = DecodeConfig {
        batch_size: 2,
        ..DecodeConfig::default()
    };

    let mut ticks = Vec::new();
    from_files_to_files(&inputs, &outputs, None, None, &config, None, |done, total| {
        ticks.push((done, total));
    })
    .unwrap();

    assert_eq!(ticks.last(), Some(&(5, 5)));
    assert!(ticks.windows(2).all(|w| w[0].0 < w[1].0));
}

#[test]
fn cancellation_before_the_first_batch_decodes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (inputs, outputs, _) = stage_workload(&dir, 27, &[3, 4], 4);
    let token = CancelToken::new();
    token.cancel();

    let report = from_files_to_files(
        &inputs,
        &outputs,
        None,
        None,
        &DecodeConfig::default(),
        Some(&token),
        |_, _| {},
    )
    .unwrap();
    assert!(report.cancelled);
    assert_eq!(report.decoded, 0);
    assert!(!outputs[0].exists() && !outputs[1].exists());
}

#[test]
fn chunked_pipeline_decodes_peaked_sequences_exactly() {
    // The pruning window is wide enough to keep the whole mass, so the
    // pipeline output must match the dense decode.
    let dir = tempfile::tempdir().unwrap();
    let frames = 30usize;
    let states = 24usize;
    let mut data = vec![1e-6f32; frames * states];
    for t in 0..frames {
        let center = (t / 2).min(states - 2);
        data[t * states + center] = 0.75;
        data[t * states + center + 1] = 0.2;
    }
    let emission = Matrix::from_vec(frames, states, data).unwrap();
    let input = dir.path().join("peaked.trl");
    let output = dir.path().join("peaked.idx.trl");
    io::write_matrix(&input, &emission).unwrap();

    let dense = from_probabilities(&[emission], None, None, false, Device::Cpu).unwrap();

    let config = DecodeConfig {
        use_chunking: true,
        chunk_width: 6,
        chunk_threshold: 0.9,
        ..DecodeConfig::default()
    };
    let report = from_files_to_files(
        &[input],
        &[output.clone()],
        None,
        None,
        &config,
        None,
        |_, _| {},
    )
    .unwrap();
    assert!(report.is_clean());
    assert_eq!(io::read_indices(&output).unwrap(), dense[0]);
}

#[test]
fn single_file_entry_point_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(28);
    let emission = random_stochastic(&mut rng, 12, 5);
    let input = dir.path().join("seq.trl");
    let output = dir.path().join("seq.idx.trl");
    io::write_matrix(&input, &emission).unwrap();

    from_file_to_file(&input, &output, None, None, false, Device::Cpu).unwrap();

    let written = io::read_indices(&output).unwrap();
    let oracle = reference::from_file(&input, None, None, false).unwrap();
    assert_eq!(written, oracle);
}

#[test]
fn mismatched_path_counts_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (inputs, outputs, _) = stage_workload(&dir, 29, &[3, 3], 4);
    let result = from_files_to_files(
        &inputs,
        &outputs[..1],
        None,
        None,
        &DecodeConfig::default(),
        None,
        |_, _| {},
    );
    assert!(matches!(result, Err(DecodeError::ShapeMismatch { .. })));
}
