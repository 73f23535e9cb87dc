pub mod address;
pub mod cancel;
pub mod counters;
pub mod error;
pub mod record;

pub use address::{format_address, parse_address};
pub use cancel::CancelToken;
pub use counters::{CounterSnapshot, Counters};
pub use error::{AddressError, DedupError, Result};
pub use record::{TempFile, TempRole};
