use std::{io, path::PathBuf};

/// Reasons a line does not decode to a four-octet address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("expected 4 dot-separated octets, found {0}")]
    SegmentCount(usize),
    #[error("octet {0:?} is not a decimal integer")]
    InvalidOctet(String),
    #[error("octet {0} is out of range 0..=255")]
    OctetOutOfRange(u64),
    #[error("line is not valid UTF-8")]
    NotUtf8,
}

#[derive(Debug, thiserror::Error)]
pub enum DedupError {
    #[error("malformed address on line {line_number} ({line:?}): {source}")]
    MalformedInput {
        line_number: u64,
        line: String,
        #[source]
        source: AddressError,
    },

    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("truncated record in {} at byte offset {offset}", path.display())]
    TruncatedRecord { path: PathBuf, offset: u64 },

    #[error("configuration failure: {0}")]
    Configuration(String),

    #[error(
        "accounting mismatch: {total_lines} lines, {deduped_in_chunk} dropped in chunks, \
         {deduped_in_merge} dropped in merges, {unique} left"
    )]
    AccountingMismatch {
        total_lines: u64,
        deduped_in_chunk: u64,
        deduped_in_merge: u64,
        unique: u64,
    },

    #[error("run cancelled after a failure in another worker")]
    Cancelled,

    #[error("{0} thread panicked")]
    WorkerPanicked(&'static str),
}

impl DedupError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        DedupError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DedupError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, DedupError>;
