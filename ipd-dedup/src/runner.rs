use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use ipd_core::{
    record::write_records, CancelToken, CounterSnapshot, Counters, DedupError, Result, TempFile,
};
use ipd_parser::{AddressReader, TextAddressReader};

use crate::{pool, scheduler::MergeScheduler, sorter::ChunkWorkerPool};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupReport {
    /// Sorted, duplicate-free records. Lives in the work directory.
    pub final_file: TempFile,
    pub counters: CounterSnapshot,
    pub chunk_count: usize,
    pub merge_rounds: usize,
    pub merge_jobs: usize,
    pub elapsed: Duration,
}

impl DedupReport {
    pub fn unique_count(&self) -> u64 {
        self.counters.unique_count()
    }
}

#[derive(Debug, Clone)]
pub struct Deduplicator {
    work_dir: PathBuf,
    chunk_size: u64,
    workers: usize,
    cancel: CancelToken,
}

impl Deduplicator {
    pub(crate) fn new(
        work_dir: PathBuf,
        chunk_size: u64,
        workers: usize,
        cancel: CancelToken,
    ) -> Self {
        Self {
            work_dir,
            chunk_size,
            workers,
            cancel,
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn run(&self, input: &Path) -> Result<DedupReport> {
        let mut reader = TextAddressReader::open(input)?;
        self.run_reader(&mut reader)
    }

    /// Runs both phases over `reader`. Counters start from zero on every call.
    pub fn run_reader<R: AddressReader>(&self, reader: &mut R) -> Result<DedupReport> {
        let start = Instant::now();
        let counters = Arc::new(Counters::new());

        log::info!(
            "chunk phase: budget {} bytes, {} worker(s)",
            self.chunk_size,
            self.workers
        );
        let pool = ChunkWorkerPool::new(
            self.workers,
            &self.work_dir,
            Arc::clone(&counters),
            self.cancel.clone(),
        );
        let (stats, mut files) = pool.run(reader, self.chunk_size)?;
        log::info!("chunk phase took {:?}", start.elapsed());

        if files.is_empty() {
            let empty = TempFile::chunk(&self.work_dir, 0);
            write_records(&empty.path, &[])?;
            files.push(empty);
        }
        let chunk_count = files.len();

        if let Err(err) = self.cancel.check() {
            pool::purge_run_files(&self.work_dir);
            return Err(err);
        }

        let merge_start = Instant::now();
        let scheduler = MergeScheduler::new(
            self.workers,
            &self.work_dir,
            Arc::clone(&counters),
            self.cancel.clone(),
        );
        let outcome = scheduler.merge_all(files)?;
        log::info!(
            "merge phase: {} round(s), {} job(s), took {:?}",
            outcome.rounds,
            outcome.jobs,
            merge_start.elapsed()
        );

        let snapshot = counters.snapshot();
        let unique = outcome.final_file.len_records()?;
        if snapshot.unique_count() != unique {
            return Err(DedupError::AccountingMismatch {
                total_lines: snapshot.total_lines,
                deduped_in_chunk: snapshot.deduped_in_chunk,
                deduped_in_merge: snapshot.deduped_in_merge,
                unique,
            });
        }
        debug_assert_eq!(stats.lines, snapshot.total_lines);

        Ok(DedupReport {
            final_file: outcome.final_file,
            counters: snapshot,
            chunk_count,
            merge_rounds: outcome.rounds,
            merge_jobs: outcome.jobs,
            elapsed: start.elapsed(),
        })
    }
}
