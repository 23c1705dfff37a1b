use std::path::PathBuf;
use std::process;

use clap::Args;

use trellis::{from_files_to_files, DecodeConfig};

#[derive(Args)]
pub struct DecodeArgs {
    /// Emission file(s) to decode
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<PathBuf>,
    /// Output index file(s); one per input
    #[arg(short, long, required = true, num_args = 1..)]
    pub output: Vec<PathBuf>,
    /// Transition matrix file (defaults to uniform)
    #[arg(short, long)]
    pub transition: Option<PathBuf>,
    /// Initial distribution file (defaults to uniform)
    #[arg(long)]
    pub initial: Option<PathBuf>,
    /// Config file with option overrides
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Inputs are already natural-log probabilities
    #[arg(long)]
    pub log_probs: bool,
    /// Enable per-frame state pruning
    #[arg(long)]
    pub chunk: bool,
    /// Maximum candidate states per frame
    #[arg(long)]
    pub chunk_width: Option<usize>,
    /// Mass retention threshold in (0, 1]
    #[arg(long)]
    pub chunk_threshold: Option<f32>,
    /// Sequences per decoded batch
    #[arg(short, long)]
    pub batch_size: Option<usize>,
    /// Async writer threads; 0 writes in-thread
    #[arg(long)]
    pub save_workers: Option<usize>,
    /// Accelerator adapter index; CPU when absent
    #[arg(short, long)]
    pub device: Option<usize>,
}

/// Merge config-file overrides and CLI flags; flags win.
fn resolve_config(args: &DecodeArgs) -> Result<DecodeConfig, String> {
    let mut config = match &args.config {
        Some(path) => DecodeConfig::load(path)?,
        None => DecodeConfig::default(),
    };
    if args.log_probs {
        config.log_probs = true;
    }
    if args.chunk {
        config.use_chunking = true;
    }
    if let Some(width) = args.chunk_width {
        config.chunk_width = width;
    }
    if let Some(threshold) = args.chunk_threshold {
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err("chunk_threshold must be in (0, 1]".to_string());
        }
        config.chunk_threshold = threshold;
    }
    if let Some(batch_size) = args.batch_size {
        if batch_size == 0 {
            return Err("batch_size must be at least 1".to_string());
        }
        config.batch_size = batch_size;
    }
    if let Some(workers) = args.save_workers {
        config.save_workers = workers;
    }
    if let Some(device) = args.device {
        config.device = Some(device);
    }
    Ok(config)
}

pub fn cmd_decode(args: DecodeArgs) {
    if args.input.len() != args.output.len() {
        eprintln!(
            "error: {} input(s) but {} output(s)",
            args.input.len(),
            args.output.len()
        );
        process::exit(1);
    }

    let config = match resolve_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    let total = args.input.len();
    eprintln!("trellis decode");
    eprintln!(
        "  workload  {} file(s), batch size {}",
        total, config.batch_size
    );
    eprintln!(
        "  backend   {}",
        match config.device {
            Some(index) => format!("accelerator {index}"),
            None => "CPU".to_string(),
        }
    );
    if config.use_chunking {
        eprintln!(
            "  chunking  width {} threshold {}",
            config.chunk_width, config.chunk_threshold
        );
    }

    let result = from_files_to_files(
        &args.input,
        &args.output,
        args.transition.as_deref(),
        args.initial.as_deref(),
        &config,
        None,
        |done, total| eprintln!("  decoded   {done}/{total}"),
    );

    match result {
        Ok(report) => {
            for (path, error) in &report.failures {
                eprintln!("error: {}: {}", path.display(), error);
            }
            if !report.failures.is_empty() {
                eprintln!(
                    "done with {} failure(s), {} decoded",
                    report.failures.len(),
                    report.decoded
                );
                process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
