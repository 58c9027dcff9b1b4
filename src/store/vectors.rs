//! Append-only flat vector index with exact inner-product search.
//!
//! File format (little-endian):
//!
//!   Magic: "LRVI" (4 bytes)
//!   Version: u16
//!   Dimension: u32
//!   Count: u64
//!   Vectors: Count × Dimension × f32, row-major, row i is chunk id i
//!   Checksum: blake3 of everything above (32 bytes)
//!
//! Rows are never removed or reordered; row offsets are the chunk ids stored in
//! the metadata sidecar.

use crate::error::{RagError, Result};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::io::Write;
use std::path::Path;
use tracing::warn;

pub const VECTOR_MAGIC: [u8; 4] = *b"LRVI";
pub const VECTOR_VERSION: u16 = 1;
const HEADER_LEN: usize = 4 + 2 + 4 + 8;
const CHECKSUM_LEN: usize = 32;

/// How `FlatIndex::open` obtained its contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No file on disk yet
    Fresh,
    Loaded,
    /// The file was unreadable; an empty index replaces it
    Recovered { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of rows, tombstoned ones included
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn vector(&self, row: usize) -> Option<&[f32]> {
        let start = row.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Append rows; all rows are checked before any is added
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }
        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    /// Drop rows from `len` onward
    pub(crate) fn truncate(&mut self, len: usize) {
        self.data.truncate(len * self.dimension);
    }

    /// Top `top_n` rows by descending inner product, ties broken by row id
    pub fn search(&self, query: &[f32], top_n: usize) -> Result<Vec<(u64, f32)>> {
        if query.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if self.is_empty() || top_n == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(u64, f32)> = self
            .data
            .par_chunks(self.dimension)
            .enumerate()
            .map(|(row, vector)| {
                let score = vector.iter().zip(query).map(|(a, b)| a * b).sum::<f32>();
                (row as u64, score)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(top_n);
        Ok(scored)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * 4 + CHECKSUM_LEN);
        bytes.extend_from_slice(&VECTOR_MAGIC);
        bytes.extend_from_slice(&VECTOR_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for value in &self.data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        let checksum = blake3::hash(&bytes);
        bytes.extend_from_slice(checksum.as_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let corrupt = |msg: &str| RagError::Store(format!("corrupt vector index: {msg}"));

        if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
            return Err(corrupt("file too short"));
        }
        let (body, checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
        if blake3::hash(body).as_bytes() != checksum {
            return Err(corrupt("checksum mismatch"));
        }
        if body[0..4] != VECTOR_MAGIC {
            return Err(corrupt("bad magic"));
        }
        let version = u16::from_le_bytes([body[4], body[5]]);
        if version != VECTOR_VERSION {
            return Err(corrupt(&format!("unsupported version {version}")));
        }
        let dimension = u32::from_le_bytes([body[6], body[7], body[8], body[9]]) as usize;
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&body[10..18]);
        let count = u64::from_le_bytes(count_bytes) as usize;

        let payload = &body[HEADER_LEN..];
        let expected_len = count
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| corrupt("size overflow"))?;
        if payload.len() != expected_len {
            return Err(corrupt("length does not match header"));
        }

        let data = payload
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self { dimension, data })
    }

    /// Write to a temp file in the same directory, then atomically rename over `path`
    pub fn persist(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| RagError::Store(format!("no parent directory for {}", path.display())))?;
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&self.to_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| RagError::Io(e.error))?;
        Ok(())
    }

    /// Read the index at `path`.
    ///
    /// A missing file gives an empty index. An unreadable or corrupt file also
    /// gives an empty index, reported as `LoadOutcome::Recovered`. A valid file
    /// with a different dimension is an error: it belongs to another model.
    pub fn open(path: &Path, dimension: usize) -> Result<(Self, LoadOutcome)> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok((Self::new(dimension), LoadOutcome::Fresh));
            }
            Err(e) => {
                warn!("Vector index {} unreadable, starting empty: {}", path.display(), e);
                return Ok((
                    Self::new(dimension),
                    LoadOutcome::Recovered {
                        reason: e.to_string(),
                    },
                ));
            }
        };

        match Self::from_bytes(&bytes) {
            Ok(index) if index.dimension != dimension => Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: index.dimension,
            }),
            Ok(index) => Ok((index, LoadOutcome::Loaded)),
            Err(e) => {
                warn!("Vector index {} is corrupt, starting empty: {}", path.display(), e);
                Ok((
                    Self::new(dimension),
                    LoadOutcome::Recovered {
                        reason: e.to_string(),
                    },
                ))
            }
        }
    }
}
