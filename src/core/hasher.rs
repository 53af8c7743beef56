/*!
 * Streaming content hashing
 */

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::HashAlgorithm;

/// Errors raised while hashing one file
#[derive(Error, Debug)]
pub enum HashError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Access denied: {0}")]
    AccessDenied(PathBuf),

    #[error("Read failed on {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Digest of one file plus telemetry
#[derive(Debug, Clone)]
pub struct HashOutcome {
    /// Lowercase hex digest
    pub hex: String,
    pub bytes_read: u64,
    pub elapsed: Duration,
}

enum DigestState {
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl DigestState {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => DigestState::Sha256(Sha256::new()),
            HashAlgorithm::Blake3 => DigestState::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            DigestState::Sha256(h) => h.update(data),
            DigestState::Blake3(h) => {
                h.update(data);
            }
        }
    }

    fn finalize(self) -> String {
        match self {
            DigestState::Sha256(h) => hex::encode(h.finalize()),
            DigestState::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

/// Streams files through the configured digest with a bounded buffer
#[derive(Debug, Clone)]
pub struct Hasher {
    algorithm: HashAlgorithm,
    buffer_size: usize,
}

impl Hasher {
    pub fn new(algorithm: HashAlgorithm, buffer_size_mb: usize) -> Self {
        Self {
            algorithm,
            buffer_size: buffer_size_mb.max(1) * 1024 * 1024,
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Hash the whole file, streaming `buffer_size` bytes at a time
    pub fn hash_file(&self, path: &Path) -> Result<HashOutcome, HashError> {
        let start = Instant::now();

        let file = File::open(path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => HashError::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => HashError::AccessDenied(path.to_path_buf()),
            _ => HashError::Read {
                path: path.to_path_buf(),
                source: err,
            },
        })?;

        let mut reader = BufReader::new(file);
        let mut digest = DigestState::new(self.algorithm);
        let mut buffer = vec![0u8; self.buffer_size];
        let mut bytes_read = 0u64;

        loop {
            let n = reader.read(&mut buffer).map_err(|source| HashError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            if n == 0 {
                break;
            }
            digest.update(&buffer[..n]);
            bytes_read += n as u64;
        }

        Ok(HashOutcome {
            hex: digest.finalize(),
            bytes_read,
            elapsed: start.elapsed(),
        })
    }

    /// Hash `path` and compare against an expected lowercase hex digest
    pub fn verify(&self, path: &Path, expected: &str) -> Result<bool, HashError> {
        let outcome = self.hash_file(path)?;
        Ok(outcome.hex == expected)
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new(HashAlgorithm::Sha256, 4)
    }
}
