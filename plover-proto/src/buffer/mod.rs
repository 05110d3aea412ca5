pub mod reader;
pub mod writer;

pub use reader::{PacketCursor, ReaderError};
pub use writer::{PacketWriter, WriterError};

/// Longest decoded name the reader will produce, dots included.
pub const MAX_NAME_LEN: usize = 255;
