use std::path::{Path, PathBuf};

use ipd_core::{CancelToken, DedupError, Result};

use crate::runner::Deduplicator;

pub const DEFAULT_CHUNK_SIZE: u64 = 1 << 30;

/// Collects the run parameters and checks them once in `build`.
#[derive(Debug, Clone)]
pub struct DeduplicatorBuilder {
    work_dir: PathBuf,
    chunk_size: u64,
    workers: usize,
    cancel: CancelToken,
}

impl DeduplicatorBuilder {
    pub fn new(work_dir: impl AsRef<Path>) -> Self {
        Self {
            work_dir: work_dir.as_ref().to_path_buf(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: num_cpus::get(),
            cancel: CancelToken::new(),
        }
    }

    /// Byte budget per chunk, measured in input text bytes.
    pub fn chunk_size(mut self, bytes: u64) -> Self {
        self.chunk_size = bytes;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(self) -> Result<Deduplicator> {
        if self.chunk_size == 0 {
            return Err(DedupError::Configuration(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(DedupError::Configuration(
                "worker count must be greater than zero".to_string(),
            ));
        }
        if !self.work_dir.is_dir() {
            return Err(DedupError::Configuration(format!(
                "temporary directory {} does not exist",
                self.work_dir.display()
            )));
        }
        Ok(Deduplicator::new(
            self.work_dir,
            self.chunk_size,
            self.workers,
            self.cancel,
        ))
    }
}
