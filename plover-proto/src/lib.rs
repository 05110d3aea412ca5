//! Wire format for the plover resolver: message buffers, header and record
//! codecs, and the CNAME chain used while walking responses.

pub mod buffer;
pub mod chain;
pub mod packet;

pub use buffer::{PacketCursor, PacketWriter, ReaderError, WriterError, MAX_NAME_LEN};
pub use chain::CnameChain;
