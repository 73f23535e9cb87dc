use std::sync::atomic::{AtomicU64, Ordering};

/// Run-wide tallies shared by the producer and both worker pools.
///
/// Updated with relaxed atomic adds only; read once both pools have drained,
/// at which point the thread joins provide the needed ordering.
#[derive(Debug, Default)]
pub struct Counters {
    total_lines: AtomicU64,
    deduped_in_chunk: AtomicU64,
    deduped_in_merge: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub total_lines: u64,
    pub deduped_in_chunk: u64,
    pub deduped_in_merge: u64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_lines(&self, n: u64) {
        self.total_lines.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_chunk_duplicates(&self, n: u64) {
        self.deduped_in_chunk.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_merge_duplicates(&self, n: u64) {
        self.deduped_in_merge.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            total_lines: self.total_lines.load(Ordering::Relaxed),
            deduped_in_chunk: self.deduped_in_chunk.load(Ordering::Relaxed),
            deduped_in_merge: self.deduped_in_merge.load(Ordering::Relaxed),
        }
    }
}

impl CounterSnapshot {
    pub fn duplicates(&self) -> u64 {
        self.deduped_in_chunk + self.deduped_in_merge
    }

    /// Distinct values seen: total lines minus everything removed as a duplicate.
    pub fn unique_count(&self) -> u64 {
        self.total_lines.saturating_sub(self.duplicates())
    }
}
