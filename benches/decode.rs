//! Kernel throughput benchmarks.
//!
//! Measures the dense forward/backward engine at several alphabet sizes and
//! the pruned variant on a pitch-tracking-shaped workload (narrow moving
//! peak over a large alphabet).

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use trellis::engine::{Batch, Device, Engine, Model, Workspace};
use trellis::{chunk, Matrix};

fn random_stochastic(rng: &mut StdRng, rows: usize, cols: usize) -> Matrix {
    let mut data = Vec::with_capacity(rows * cols);
    for _ in 0..rows {
        let row: Vec<f32> = (0..cols).map(|_| rng.gen_range(0.01..1.0)).collect();
        let sum: f32 = row.iter().sum();
        data.extend(row.into_iter().map(|v| v / sum));
    }
    Matrix::from_vec(rows, cols, data).expect("extent matches data")
}

fn peaked_emissions(frames: usize, states: usize) -> Matrix {
    let mut data = vec![1e-6f32; frames * states];
    for t in 0..frames {
        let center = (t * 7 % states).min(states - 2);
        data[t * states + center] = 0.7;
        data[t * states + center + 1] = 0.25;
    }
    Matrix::from_vec(frames, states, data).expect("extent matches data")
}

fn bench_dense(c: &mut Criterion) {
    let engine = Engine::new(Device::Cpu).expect("CPU backend");
    let mut group = c.benchmark_group("dense_forward");

    for &states in &[64usize, 256, 512] {
        let mut rng = StdRng::seed_from_u64(states as u64);
        let observation = random_stochastic(&mut rng, 500, states);
        let transition = random_stochastic(&mut rng, states, states);
        let model = Model::prepare(states, Some(&transition), None, false).expect("valid model");
        let batch =
            Batch::collate(&[observation], vec![None], false, states).expect("valid batch");
        let mut ws = Workspace::new();

        group.bench_function(format!("{states}_states_500_frames"), |b| {
            b.iter(|| {
                engine
                    .decode_batch(black_box(&model), black_box(&batch), &mut ws)
                    .expect("decode")
            })
        });
    }
    group.finish();
}

fn bench_batched(c: &mut Criterion) {
    let engine = Engine::new(Device::Cpu).expect("CPU backend");
    let states = 128usize;
    let mut rng = StdRng::seed_from_u64(99);
    let observations: Vec<Matrix> = (0..8)
        .map(|_| random_stochastic(&mut rng, 400, states))
        .collect();
    let model = Model::prepare(states, None, None, false).expect("valid model");
    let batch = Batch::collate(&observations, vec![None; 8], false, states).expect("valid batch");
    let mut ws = Workspace::new();

    c.bench_function("batch_of_8_128_states_400_frames", |b| {
        b.iter(|| {
            engine
                .decode_batch(black_box(&model), black_box(&batch), &mut ws)
                .expect("decode")
        })
    });
}

fn bench_pruned(c: &mut Criterion) {
    let engine = Engine::new(Device::Cpu).expect("CPU backend");
    let (frames, states) = (500usize, 1440usize);
    let observation = peaked_emissions(frames, states);
    let model = Model::prepare(states, None, None, false).expect("valid model");
    let mut ws = Workspace::new();

    let mut group = c.benchmark_group("pruned_forward");
    group.sample_size(10);

    let sets = chunk(&observation, 128, 0.95, false);
    let pruned_batch = Batch::collate(&[observation.clone()], vec![Some(sets)], false, states)
        .expect("valid batch");
    group.bench_function("1440_states_width_128", |b| {
        b.iter(|| {
            engine
                .decode_batch(black_box(&model), black_box(&pruned_batch), &mut ws)
                .expect("decode")
        })
    });

    let dense_batch =
        Batch::collate(&[observation], vec![None], false, states).expect("valid batch");
    group.bench_function("1440_states_dense", |b| {
        b.iter(|| {
            engine
                .decode_batch(black_box(&model), black_box(&dense_batch), &mut ws)
                .expect("decode")
        })
    });
    group.finish();
}

criterion_group!(benches, bench_dense, bench_batched, bench_pruned);
criterion_main!(benches);
