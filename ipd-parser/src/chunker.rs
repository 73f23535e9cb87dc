use std::{mem, sync::Arc};

use crossbeam::channel::Sender;
use ipd_core::{CancelToken, Counters, DedupError, Result};

use crate::reader::AddressReader;

/// A slice of the input handed to exactly one worker, which owns and sorts it.
#[derive(Debug)]
pub struct Chunk {
    pub index: usize,
    pub values: Vec<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    pub lines: u64,
    pub chunks: usize,
}

pub struct ChunkProducer {
    budget_bytes: u64,
    jobs: Sender<Chunk>,
    counters: Arc<Counters>,
    cancel: CancelToken,
}

impl ChunkProducer {
    pub fn new(
        budget_bytes: u64,
        jobs: Sender<Chunk>,
        counters: Arc<Counters>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            budget_bytes,
            jobs,
            counters,
            cancel,
        }
    }

    /// Drains `reader` into the job queue.
    ///
    /// A chunk is closed when the next line would push it past the budget,
    /// unless it is still empty. Sends block while the queue is full. The
    /// queue is closed when this returns, since the producer owns the only
    /// sender.
    pub fn run<R: AddressReader>(self, reader: &mut R) -> Result<ProducerStats> {
        let mut stats = ProducerStats::default();
        let mut values: Vec<u32> = Vec::new();
        let mut current_bytes = 0u64;

        while let Some(line) = reader.next_address()? {
            stats.lines += 1;

            if current_bytes + line.weight > self.budget_bytes && current_bytes > 0 {
                let capacity = values.len();
                let full = mem::replace(&mut values, Vec::with_capacity(capacity));
                self.dispatch(stats.chunks, full)?;
                stats.chunks += 1;
                current_bytes = 0;
            }

            values.push(line.value);
            current_bytes += line.weight;
        }

        if !values.is_empty() {
            self.dispatch(stats.chunks, values)?;
            stats.chunks += 1;
        }

        self.counters.add_lines(stats.lines);
        log::info!(
            "read {} lines into {} chunk(s)",
            stats.lines,
            stats.chunks
        );
        Ok(stats)
    }

    fn dispatch(&self, index: usize, values: Vec<u32>) -> Result<()> {
        self.cancel.check()?;
        log::debug!("dispatching chunk {} ({} values)", index, values.len());
        // Every receiver is gone only when all workers have stopped early.
        self.jobs
            .send(Chunk { index, values })
            .map_err(|_| DedupError::Cancelled)
    }
}
