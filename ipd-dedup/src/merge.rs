use std::{cmp::Ordering, fs, path::Path};

use ipd_core::{
    record::{RecordBatchReader, RecordWriter, BATCH_SIZE},
    CancelToken, Counters, DedupError, Result,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub written: u64,
    /// Input values consumed but not written.
    pub duplicates: u64,
}

enum Take {
    A(u32),
    B(u32),
    Both(u32),
}

pub struct TwoWayMerge<'a> {
    counters: &'a Counters,
    cancel: &'a CancelToken,
    clean_up: bool,
    batch_size: usize,
}

impl<'a> TwoWayMerge<'a> {
    pub fn new(counters: &'a Counters, cancel: &'a CancelToken) -> Self {
        Self {
            counters,
            cancel,
            clean_up: false,
            batch_size: BATCH_SIZE,
        }
    }

    /// Delete both inputs once the output has been flushed.
    pub fn clean_up(mut self, clean_up: bool) -> Self {
        self.clean_up = clean_up;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Merges `file_a` and `file_b` into `out_file`.
    ///
    /// On failure the partially written output is removed and the inputs are
    /// left in place.
    pub fn merge(&self, file_a: &Path, file_b: &Path, out_file: &Path) -> Result<MergeStats> {
        let mut a = RecordBatchReader::with_batch_size(file_a, self.batch_size)?;
        let mut b = RecordBatchReader::with_batch_size(file_b, self.batch_size)?;
        let writer = RecordWriter::create(out_file)?;

        let stats = match self.stream(&mut a, &mut b, writer) {
            Ok(stats) => stats,
            Err(err) => {
                if let Err(e) = fs::remove_file(out_file) {
                    log::warn!("could not remove partial file {}: {}", out_file.display(), e);
                }
                return Err(err);
            }
        };
        self.counters.add_merge_duplicates(stats.duplicates);

        if self.clean_up {
            for input in [file_a, file_b] {
                fs::remove_file(input).map_err(|e| DedupError::io(input, e))?;
            }
        }
        Ok(stats)
    }

    fn stream(
        &self,
        a: &mut RecordBatchReader,
        b: &mut RecordBatchReader,
        mut writer: RecordWriter,
    ) -> Result<MergeStats> {
        let mut stats = MergeStats::default();
        let mut last_written: Option<u32> = None;
        let mut steps = 0usize;
        let mut consumed = 0u64;

        loop {
            let take = match (a.peek(), b.peek()) {
                (None, None) => break,
                (Some(x), None) => Take::A(x),
                (None, Some(y)) => Take::B(y),
                (Some(x), Some(y)) => match x.cmp(&y) {
                    Ordering::Less => Take::A(x),
                    Ordering::Greater => Take::B(y),
                    Ordering::Equal => Take::Both(x),
                },
            };

            let value = match take {
                Take::A(v) | Take::B(v) | Take::Both(v) => v,
            };
            // never write the same value twice
            if last_written != Some(value) {
                writer.push(value)?;
                last_written = Some(value);
            }

            match take {
                Take::A(_) => {
                    consumed += 1;
                    a.advance()?;
                }
                Take::B(_) => {
                    consumed += 1;
                    b.advance()?;
                }
                Take::Both(_) => {
                    consumed += 2;
                    a.advance()?;
                    b.advance()?;
                }
            }

            steps += 1;
            if steps % self.batch_size.max(1) == 0 {
                self.cancel.check()?;
            }
        }

        stats.written = writer.finish()?;
        stats.duplicates = consumed - stats.written;
        Ok(stats)
    }
}
