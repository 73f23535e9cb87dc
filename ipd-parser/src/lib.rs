pub mod chunker;
pub mod reader;

pub use chunker::{Chunk, ChunkProducer, ProducerStats};
pub use reader::{text::TextAddressReader, AddressLine, AddressReader};
