pub mod builder;
pub mod merge;
pub mod runner;
pub mod scheduler;
pub mod sorter;

mod pool;

pub use builder::DeduplicatorBuilder;
pub use merge::{MergeStats, TwoWayMerge};
pub use runner::{DedupReport, Deduplicator};
pub use scheduler::{MergeJob, MergeOutcome, MergeScheduler};
pub use sorter::{sort_and_dedup, ChunkWorkerPool};
