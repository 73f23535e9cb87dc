use std::{
    path::{Path, PathBuf},
    sync::Arc,
    thread,
};

use crossbeam::channel::{bounded, Receiver, Sender};
use ipd_core::{record::write_records, CancelToken, Counters, DedupError, Result, TempFile};
use ipd_parser::{AddressReader, Chunk, ChunkProducer, ProducerStats};

use crate::pool;

/// Sorts ascending and drops every repeat of a value, keeping the first.
/// Returns how many values were dropped.
pub fn sort_and_dedup(values: &mut Vec<u32>) -> u64 {
    values.sort_unstable();
    let before = values.len();
    values.dedup();
    (before - values.len()) as u64
}

/// Sorts, dedups and writes one chunk to `chunk_<index>.tmp` under `dir`.
pub fn process_chunk(chunk: Chunk, dir: &Path, counters: &Counters) -> Result<TempFile> {
    let Chunk { index, mut values } = chunk;
    let read = values.len();
    let dropped = sort_and_dedup(&mut values);
    counters.add_chunk_duplicates(dropped);

    let file = TempFile::chunk(dir, index);
    if let Err(err) = write_records(&file.path, &values) {
        pool::discard(&file.path);
        return Err(err);
    }

    log::info!(
        "chunk {} done: {} values, {} duplicates removed",
        index,
        read,
        dropped
    );
    Ok(file)
}

pub struct ChunkWorkerPool {
    workers: usize,
    dir: PathBuf,
    counters: Arc<Counters>,
    cancel: CancelToken,
}

impl ChunkWorkerPool {
    pub fn new(
        workers: usize,
        dir: &Path,
        counters: Arc<Counters>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            workers: workers.max(1),
            dir: dir.to_path_buf(),
            counters,
            cancel,
        }
    }

    /// Runs the whole chunk phase and returns the produced files ordered by
    /// chunk index. Returns only after every worker has been joined.
    pub fn run<R: AddressReader>(
        &self,
        reader: &mut R,
        budget_bytes: u64,
    ) -> Result<(ProducerStats, Vec<TempFile>)> {
        let (job_tx, job_rx) = bounded::<Chunk>(self.workers * 2);
        let (done_tx, done_rx) = bounded::<(usize, TempFile)>(self.workers * 2);

        thread::scope(|scope| {
            let collector = scope.spawn(move || -> Result<Vec<TempFile>> {
                let mut files: Vec<(usize, TempFile)> = done_rx.iter().collect();
                files.sort_by_key(|(index, _)| *index);
                Ok(files.into_iter().map(|(_, file)| file).collect())
            });

            let workers: Vec<_> = (0..self.workers)
                .map(|id| {
                    let jobs = job_rx.clone();
                    let done = done_tx.clone();
                    scope.spawn(move || self.work(id, jobs, done))
                })
                .collect();
            drop(job_rx);
            drop(done_tx);

            let producer = ChunkProducer::new(
                budget_bytes,
                job_tx,
                Arc::clone(&self.counters),
                self.cancel.clone(),
            );
            let produced = producer.run(reader);
            if produced.is_err() {
                self.cancel.cancel();
            }

            let mut failure = None;
            for handle in workers {
                if let Err(err) = pool::join(handle, "chunk worker") {
                    pool::record_failure(&mut failure, err);
                }
            }
            let files = pool::join(collector, "chunk collector")?;

            match (produced, failure) {
                (Ok(stats), None) => {
                    log::info!("chunk phase produced {} file(s)", files.len());
                    Ok((stats, files))
                }
                (produced, mut failure) => {
                    if let Err(err) = produced {
                        pool::record_failure(&mut failure, err);
                    }
                    purge(&files);
                    Err(failure.unwrap_or(DedupError::Cancelled))
                }
            }
        })
    }

    fn work(&self, id: usize, jobs: Receiver<Chunk>, done: Sender<(usize, TempFile)>) -> Result<()> {
        for chunk in jobs.iter() {
            self.cancel.check()?;
            let index = chunk.index;
            log::debug!("worker {} took chunk {}", id, index);
            let file = process_chunk(chunk, &self.dir, &self.counters).inspect_err(|_| {
                self.cancel.cancel();
            })?;
            done.send((index, file)).map_err(|_| DedupError::Cancelled)?;
        }
        Ok(())
    }
}

fn purge(files: &[TempFile]) {
    for file in files {
        pool::discard(&file.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipd_core::record::read_records;
    use ipd_parser::TextAddressReader;
    use proptest::prelude::*;
    use std::{collections::BTreeSet, fs, io::Cursor};
    use tempfile::tempdir;

    #[test]
    fn chunk_is_sorted_and_deduplicated() {
        let dir = tempdir().unwrap();
        let counters = Counters::new();
        let chunk = Chunk {
            index: 0,
            values: vec![12345, 12345, 67890, 12345, 67890, 11111],
        };

        let file = process_chunk(chunk, dir.path(), &counters).unwrap();
        assert_eq!(file.path, dir.path().join("chunk_0.tmp"));
        assert_eq!(read_records(&file.path).unwrap(), vec![11111, 12345, 67890]);
        assert_eq!(counters.snapshot().deduped_in_chunk, 3);
    }

    #[test]
    fn empty_chunk_writes_empty_file() {
        let dir = tempdir().unwrap();
        let counters = Counters::new();
        let file = process_chunk(
            Chunk {
                index: 4,
                values: Vec::new(),
            },
            dir.path(),
            &counters,
        )
        .unwrap();

        assert_eq!(fs::metadata(&file.path).unwrap().len(), 0);
        assert_eq!(counters.snapshot(), Default::default());
    }

    #[test]
    fn write_failure_is_io_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("gone");
        let err = process_chunk(
            Chunk {
                index: 0,
                values: vec![1],
            },
            &missing,
            &Counters::new(),
        )
        .unwrap_err();
        assert!(matches!(err, DedupError::Io { .. }));
    }

    #[test]
    fn pool_returns_files_in_chunk_order() {
        let dir = tempdir().unwrap();
        let counters = Arc::new(Counters::new());
        let pool = ChunkWorkerPool::new(3, dir.path(), Arc::clone(&counters), CancelToken::new());

        let text: String = (0..40).map(|i| format!("10.0.0.{}\n", i % 7)).collect();
        let mut reader = TextAddressReader::new("mem", Cursor::new(text.into_bytes()));
        // 9-byte lines, 4 per chunk
        let (stats, files) = pool.run(&mut reader, 36).unwrap();

        assert_eq!(stats.lines, 40);
        assert_eq!(stats.chunks, 10);
        let expected: Vec<TempFile> = (0..10).map(|i| TempFile::chunk(dir.path(), i)).collect();
        assert_eq!(files, expected);

        let kept: u64 = files.iter().map(|f| f.len_records().unwrap()).sum();
        let snapshot = counters.snapshot();
        assert_eq!(snapshot.total_lines, kept + snapshot.deduped_in_chunk);
    }

    #[test]
    fn malformed_input_fails_the_phase_and_purges_files() {
        let dir = tempdir().unwrap();
        let pool = ChunkWorkerPool::new(2, dir.path(), Arc::new(Counters::new()), CancelToken::new());
        let mut reader = TextAddressReader::new(
            "mem",
            Cursor::new(b"1.1.1.1\n2.2.2.2\n3.3.3.3\n300.1.1.1\n".to_vec()),
        );

        let err = pool.run(&mut reader, 8).unwrap_err();
        assert!(matches!(err, DedupError::MalformedInput { line_number: 4, .. }));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn worker_failure_surfaces_instead_of_cancellation() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("gone");
        let pool = ChunkWorkerPool::new(2, &missing, Arc::new(Counters::new()), CancelToken::new());
        let text: String = (0..50).map(|i| format!("10.0.0.{}\n", i)).collect();
        let mut reader = TextAddressReader::new("mem", Cursor::new(text.into_bytes()));

        let err = pool.run(&mut reader, 9).unwrap_err();
        assert!(matches!(err, DedupError::Io { .. }), "got {:?}", err);
    }

    proptest! {
        #[test]
        fn dedup_matches_set_model(mut values in proptest::collection::vec(any::<u32>(), 0..500)) {
            let distinct: BTreeSet<u32> = values.iter().copied().collect();
            let total = values.len() as u64;

            let dropped = sort_and_dedup(&mut values);

            prop_assert_eq!(values, distinct.iter().copied().collect::<Vec<_>>());
            prop_assert_eq!(dropped, total - distinct.len() as u64);
        }
    }
}
