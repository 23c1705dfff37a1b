//! On-disk array archives.
//!
//! Every file is an rkyv archive carrying its own extents, so frame and
//! state counts are recoverable from the file alone. The `Loader` trait
//! keeps the streaming pipeline ignorant of the format.

use std::path::Path;

use rkyv::{Archive, Deserialize, Serialize};

use crate::error::DecodeError;
use crate::tensor::Matrix;

/// Serialized rank-2 array (emission or transition matrix).
#[derive(Archive, Serialize, Deserialize, Clone, Debug)]
#[rkyv(derive(Debug))]
pub struct MatrixArchive {
    pub rows: u32,
    pub cols: u32,
    pub data: Vec<f32>,
}

/// Serialized rank-1 array (initial distribution).
#[derive(Archive, Serialize, Deserialize, Clone, Debug)]
#[rkyv(derive(Debug))]
pub struct VectorArchive {
    pub data: Vec<f32>,
}

/// Serialized decoded index path.
#[derive(Archive, Serialize, Deserialize, Clone, Debug)]
#[rkyv(derive(Debug))]
pub struct IndexArchive {
    pub data: Vec<i32>,
}

fn read_aligned(path: &Path) -> Result<rkyv::util::AlignedVec, DecodeError> {
    let bytes = std::fs::read(path).map_err(|e| DecodeError::read(path, e))?;
    let mut aligned = rkyv::util::AlignedVec::new();
    aligned.extend_from_slice(&bytes);
    Ok(aligned)
}

pub fn read_matrix(path: &Path) -> Result<Matrix, DecodeError> {
    let bytes = read_aligned(path)?;
    let archive = rkyv::from_bytes::<MatrixArchive, rkyv::rancor::Error>(&bytes)
        .map_err(|e| DecodeError::read(path, e))?;
    let (rows, cols) = (archive.rows as usize, archive.cols as usize);
    if rows * cols != archive.data.len() {
        return Err(DecodeError::read(path, "extent header disagrees with payload"));
    }
    Matrix::from_vec(rows, cols, archive.data)
}

pub fn write_matrix(path: &Path, matrix: &Matrix) -> Result<(), DecodeError> {
    let archive = MatrixArchive {
        rows: matrix.rows() as u32,
        cols: matrix.cols() as u32,
        data: matrix.as_slice().to_vec(),
    };
    let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&archive)
        .map_err(|e| DecodeError::write(path, e))?;
    std::fs::write(path, bytes.as_slice()).map_err(|e| DecodeError::write(path, e))
}

pub fn read_vector(path: &Path) -> Result<Vec<f32>, DecodeError> {
    let bytes = read_aligned(path)?;
    let archive = rkyv::from_bytes::<VectorArchive, rkyv::rancor::Error>(&bytes)
        .map_err(|e| DecodeError::read(path, e))?;
    Ok(archive.data)
}

pub fn write_vector(path: &Path, data: &[f32]) -> Result<(), DecodeError> {
    let archive = VectorArchive {
        data: data.to_vec(),
    };
    let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&archive)
        .map_err(|e| DecodeError::write(path, e))?;
    std::fs::write(path, bytes.as_slice()).map_err(|e| DecodeError::write(path, e))
}

pub fn read_indices(path: &Path) -> Result<Vec<i32>, DecodeError> {
    let bytes = read_aligned(path)?;
    let archive = rkyv::from_bytes::<IndexArchive, rkyv::rancor::Error>(&bytes)
        .map_err(|e| DecodeError::read(path, e))?;
    Ok(archive.data)
}

pub fn write_indices(path: &Path, indices: &[i32]) -> Result<(), DecodeError> {
    let archive = IndexArchive {
        data: indices.to_vec(),
    };
    let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&archive)
        .map_err(|e| DecodeError::write(path, e))?;
    std::fs::write(path, bytes.as_slice()).map_err(|e| DecodeError::write(path, e))
}

/// Emission source abstraction for the streaming pipeline.
pub trait Loader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Matrix, DecodeError>;
}

/// The shipped loader: rkyv `MatrixArchive` files.
#[derive(Clone, Copy, Debug, Default)]
pub struct ArchiveLoader;

impl Loader for ArchiveLoader {
    fn load(&self, path: &Path) -> Result<Matrix, DecodeError> {
        read_matrix(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emission.trl");
        let m = Matrix::from_vec(2, 3, vec![0.1, 0.2, 0.7, 0.5, 0.4, 0.1]).unwrap();
        write_matrix(&path, &m).unwrap();
        assert_eq!(read_matrix(&path).unwrap(), m);
    }

    #[test]
    fn indices_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indices.trl");
        write_indices(&path, &[3, 1, 4, 1, 5]).unwrap();
        assert_eq!(read_indices(&path).unwrap(), vec![3, 1, 4, 1, 5]);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = read_matrix(Path::new("/nonexistent/emission.trl")).unwrap_err();
        assert!(matches!(err, DecodeError::Read { .. }));
    }
}
