pub mod text;

use ipd_core::Result;

/// One decoded input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressLine {
    pub value: u32,
    /// Estimated bytes the line occupied on disk: its length plus the newline.
    pub weight: u64,
}

pub trait AddressReader {
    fn next_address(&mut self) -> Result<Option<AddressLine>>;
}
