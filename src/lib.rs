pub mod api;
pub mod chunk;
pub mod config;
pub mod engine;
pub mod error;
pub mod gpu;
pub mod io;
pub mod kernel;
pub mod reference;
pub mod stream;
pub mod tensor;

// Re-exports — the decode API at the crate root
pub use api::{from_file, from_file_to_file, from_files_to_files, from_probabilities};
pub use chunk::{chunk, CandidateSets};
pub use config::DecodeConfig;
pub use engine::{Batch, Device, Engine, Model, Workspace};
pub use error::DecodeError;
pub use io::{ArchiveLoader, Loader};
pub use stream::{CancelToken, PipelineReport};
pub use tensor::Matrix;
