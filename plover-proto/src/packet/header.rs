use super::ResponseCode;
use crate::buffer::{PacketCursor, PacketWriter, ReaderError, WriterError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// A 16 bit identifier assigned by the program that generates the query,
    /// copied into the reply so the requester can match up replies to
    /// outstanding queries.
    pub id: u16,

    /// RD - directs the name server to pursue the query recursively.
    pub recursion_desired: bool,
    /// TC - this message was truncated by the transmission channel.
    pub truncated: bool,
    /// AA - the responding name server is an authority for the name.
    pub authoritative_answer: bool,
    /// OPCODE - kind of query, 0 for a standard query.
    pub opcode: u8,
    /// QR - query (false) or response (true).
    pub response: bool,

    /// RCODE - set as part of responses.
    pub response_code: ResponseCode,
    pub checking_disabled: bool,
    pub authed_data: bool,
    /// Z - reserved, must be zero.
    pub z: bool,
    /// RA - recursive query support is available.
    pub recursion_available: bool,

    /// QDCOUNT
    pub questions: u16,
    /// ANCOUNT
    pub answers: u16,
    /// NSCOUNT
    pub authoritative_entries: u16,
    /// ARCOUNT
    pub resource_entries: u16,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            id: 0,

            recursion_desired: false,
            truncated: false,
            authoritative_answer: false,
            opcode: 0,
            response: false,

            response_code: ResponseCode::NoError,
            checking_disabled: false,
            authed_data: false,
            z: false,
            recursion_available: false,

            questions: 0,
            answers: 0,
            authoritative_entries: 0,
            resource_entries: 0,
        }
    }
}

impl Header {
    /// Header for an outbound recursive query with a single question.
    pub fn query(id: u16) -> Self {
        Self {
            id,
            recursion_desired: true,
            questions: 1,
            ..Default::default()
        }
    }

    /// Header for a reply to the given query id.
    pub fn response(id: u16) -> Self {
        Self {
            id,
            response: true,
            recursion_desired: true,
            recursion_available: true,
            ..Default::default()
        }
    }

    pub fn read(cursor: &mut PacketCursor<'_>) -> Result<Self, ReaderError> {
        let id = cursor.read_u16()?;

        let flags = cursor.read_u16()?;
        let head = (flags >> 8) as u8;
        let tail = (flags & 0xFF) as u8;

        let questions = cursor.read_u16()?;
        let answers = cursor.read_u16()?;
        let authoritative_entries = cursor.read_u16()?;
        let resource_entries = cursor.read_u16()?;

        Ok(Self {
            id,
            recursion_desired: (head & (1 << 0)) > 0,
            truncated: (head & (1 << 1)) > 0,
            authoritative_answer: (head & (1 << 2)) > 0,
            opcode: (head >> 3) & 0x0F,
            response: (head & (1 << 7)) > 0,
            response_code: ResponseCode::from_num(tail & 0x0F),
            checking_disabled: (tail & (1 << 4)) > 0,
            authed_data: (tail & (1 << 5)) > 0,
            z: (tail & (1 << 6)) > 0,
            recursion_available: (tail & (1 << 7)) > 0,
            questions,
            answers,
            authoritative_entries,
            resource_entries,
        })
    }

    pub fn write(&self, writer: &mut PacketWriter<'_>) -> Result<(), WriterError> {
        writer.write_u16(self.id)?;

        writer.write_u8(
            (self.recursion_desired as u8)
                | ((self.truncated as u8) << 1)
                | ((self.authoritative_answer as u8) << 2)
                | (self.opcode << 3)
                | ((self.response as u8) << 7),
        )?;

        writer.write_u8(
            (self.response_code as u8)
                | ((self.checking_disabled as u8) << 4)
                | ((self.authed_data as u8) << 5)
                | ((self.z as u8) << 6)
                | ((self.recursion_available as u8) << 7),
        )?;

        writer.write_u16(self.questions)?;
        writer.write_u16(self.answers)?;
        writer.write_u16(self.authoritative_entries)?;
        writer.write_u16(self.resource_entries)?;

        Ok(())
    }
}
