use super::{DnsClass, QueryType, RecordType};
use crate::buffer::{PacketCursor, PacketWriter, ReaderError, WriterError};

/// A single entry of the question section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// QNAME - a domain name represented as a sequence of labels.
    pub name: String,
    /// QTYPE - wire code of the asked record type.
    pub qtype: RecordType,
    /// QCLASS - for example IN for the Internet.
    pub qclass: DnsClass,
}

impl Question {
    pub fn new(name: String, qtype: QueryType) -> Self {
        Self {
            name,
            qtype: qtype.into(),
            qclass: Default::default(),
        }
    }

    pub fn read(cursor: &mut PacketCursor<'_>) -> Result<Self, ReaderError> {
        let name = cursor.read_name()?;
        let qtype = RecordType::from_num(cursor.read_u16()?);
        let qclass = DnsClass::from_num(cursor.read_u16()?);

        Ok(Question {
            name,
            qtype,
            qclass,
        })
    }

    pub fn write(&self, writer: &mut PacketWriter<'_>) -> Result<(), WriterError> {
        writer.write_name(&self.name)?;
        writer.write_u16(self.qtype.to_num())?;
        writer.write_u16(self.qclass as u16)?;

        Ok(())
    }
}
