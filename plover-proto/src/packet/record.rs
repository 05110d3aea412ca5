use super::{DnsClass, RecordType};
use crate::buffer::{PacketCursor, ReaderError};
use std::net::{Ipv4Addr, Ipv6Addr};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SrvData {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NaptrData {
    pub order: u16,
    pub preference: u16,
    pub flags: String,
    pub service: String,
    pub regexp: String,
    pub replacement: String,
}

/// Decoded RDATA of one resource record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Srv(SrvData),
    Naptr(NaptrData),
    Cname(String),
    /// Record type outside the decoder set; the body is skipped.
    Unsupported,
    /// The body failed to decode; the fixed fields are still valid.
    Malformed(ReaderError),
}

/// One resource record: the fixed fields plus the dispatched body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub owner: String,
    pub rtype: RecordType,
    pub class: DnsClass,
    pub ttl: u32,
    pub data: RecordData,
}

impl Record {
    /// Decode the record at the cursor.
    ///
    /// The cursor always ends up right past the RDATA, computed from
    /// RDLENGTH, so a failing body never misaligns the records after it.
    /// An error is only returned when the fixed fields themselves cannot be
    /// read, which loses the rest of the message.
    pub fn read(cursor: &mut PacketCursor<'_>) -> Result<Record, ReaderError> {
        let owner = cursor.read_name()?;
        let rtype = RecordType::from_num(cursor.read_u16()?);
        let class = DnsClass::from_num(cursor.read_u16()?);
        let ttl = cursor.read_u32()?;
        let rdlength = cursor.read_u16()? as usize;

        let rdata_end = cursor.pos() + rdlength;
        if rdata_end > cursor.len() {
            return Err(ReaderError::EndOfBuffer);
        }

        let data = match Self::read_body(cursor, rtype) {
            Ok(data) => data,
            Err(err) => RecordData::Malformed(err),
        };
        cursor.seek(rdata_end);

        Ok(Record {
            owner,
            rtype,
            class,
            ttl,
            data,
        })
    }

    fn read_body(cursor: &mut PacketCursor<'_>, rtype: RecordType) -> Result<RecordData, ReaderError> {
        match rtype {
            RecordType::A => {
                let raw_addr = cursor.read_u32()?;
                let addr = Ipv4Addr::new(
                    ((raw_addr >> 24) & 0xFF) as u8,
                    ((raw_addr >> 16) & 0xFF) as u8,
                    ((raw_addr >> 8) & 0xFF) as u8,
                    (raw_addr & 0xFF) as u8,
                );

                Ok(RecordData::A(addr))
            }
            RecordType::Aaaa => {
                let raw_addr1 = cursor.read_u32()?;
                let raw_addr2 = cursor.read_u32()?;
                let raw_addr3 = cursor.read_u32()?;
                let raw_addr4 = cursor.read_u32()?;
                let addr = Ipv6Addr::new(
                    ((raw_addr1 >> 16) & 0xFFFF) as u16,
                    (raw_addr1 & 0xFFFF) as u16,
                    ((raw_addr2 >> 16) & 0xFFFF) as u16,
                    (raw_addr2 & 0xFFFF) as u16,
                    ((raw_addr3 >> 16) & 0xFFFF) as u16,
                    (raw_addr3 & 0xFFFF) as u16,
                    ((raw_addr4 >> 16) & 0xFFFF) as u16,
                    (raw_addr4 & 0xFFFF) as u16,
                );

                Ok(RecordData::Aaaa(addr))
            }
            RecordType::Srv => {
                let priority = cursor.read_u16()?;
                let weight = cursor.read_u16()?;
                let port = cursor.read_u16()?;
                let target = cursor.read_name()?;

                Ok(RecordData::Srv(SrvData {
                    priority,
                    weight,
                    port,
                    target,
                }))
            }
            RecordType::Naptr => {
                let order = cursor.read_u16()?;
                let preference = cursor.read_u16()?;
                let flags = cursor.read_char_string()?;
                let service = cursor.read_char_string()?;
                let regexp = cursor.read_char_string()?;
                let replacement = cursor.read_name()?;

                Ok(RecordData::Naptr(NaptrData {
                    order,
                    preference,
                    flags,
                    service,
                    regexp,
                    replacement,
                }))
            }
            RecordType::Cname => {
                let alias = cursor.read_name()?;

                Ok(RecordData::Cname(alias))
            }
            // SOA only matters for the negative-TTL scan of the authority
            // section, which reads it in place.
            RecordType::Soa | RecordType::Unsupported(_) => Ok(RecordData::Unsupported),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Record, RecordData};
    use crate::buffer::{PacketCursor, PacketWriter, ReaderError};
    use crate::packet::RecordType;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn record_head(buf: &mut Vec<u8>, owner: &[u8], rtype: u16, ttl: u32, rdlength: u16) {
        buf.extend_from_slice(owner);
        buf.extend_from_slice(&rtype.to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&ttl.to_be_bytes());
        buf.extend_from_slice(&rdlength.to_be_bytes());
    }

    #[test]
    fn should_decode_a_record() {
        let mut buf = Vec::new();
        record_head(&mut buf, &[4, b'h', b'o', b's', b't', 0], 1, 60, 4);
        buf.extend_from_slice(&[192, 0, 2, 7]);

        let mut cursor = PacketCursor::new(&buf);
        let record = Record::read(&mut cursor).unwrap();
        assert_eq!(record.owner, "host");
        assert_eq!(record.rtype, RecordType::A);
        assert_eq!(record.ttl, 60);
        assert_eq!(record.data, RecordData::A(Ipv4Addr::new(192, 0, 2, 7)));
        assert_eq!(cursor.pos(), buf.len());
    }

    #[test]
    fn should_decode_aaaa_record() {
        let mut buf = Vec::new();
        record_head(&mut buf, &[2, b'v', b'6', 0], 28, 30, 16);
        buf.extend_from_slice(&Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1).octets());

        let record = Record::read(&mut PacketCursor::new(&buf)).unwrap();
        assert_eq!(
            record.data,
            RecordData::Aaaa(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1))
        );
    }

    #[test]
    fn should_decode_srv_record() {
        let mut target = Vec::new();
        let mut tbuf = [0u8; 32];
        let mut writer = PacketWriter::new(&mut tbuf);
        writer.write_name("sip.example.com").unwrap();
        let pos = writer.pos();
        target.extend_from_slice(&tbuf[..pos]);

        let mut buf = Vec::new();
        let rdlength = 6 + target.len() as u16;
        record_head(&mut buf, &[3, b's', b'r', b'v', 0], 33, 120, rdlength);
        buf.extend_from_slice(&10u16.to_be_bytes());
        buf.extend_from_slice(&20u16.to_be_bytes());
        buf.extend_from_slice(&5060u16.to_be_bytes());
        buf.extend_from_slice(&target);

        let record = Record::read(&mut PacketCursor::new(&buf)).unwrap();
        match record.data {
            RecordData::Srv(srv) => {
                assert_eq!(srv.priority, 10);
                assert_eq!(srv.weight, 20);
                assert_eq!(srv.port, 5060);
                assert_eq!(srv.target, "sip.example.com");
            }
            other => panic!("unexpected data: {other:?}"),
        }
    }

    #[test]
    fn should_decode_naptr_record() {
        let mut rdata = Vec::new();
        rdata.extend_from_slice(&100u16.to_be_bytes());
        rdata.extend_from_slice(&50u16.to_be_bytes());
        rdata.extend_from_slice(&[1, b's']);
        rdata.extend_from_slice(&[7, b'S', b'I', b'P', b'+', b'D', b'2', b'U']);
        rdata.extend_from_slice(&[0]);
        rdata.extend_from_slice(&[4, b'_', b's', b'i', b'p', 3, b'u', b'd', b'p', 0]);

        let mut buf = Vec::new();
        record_head(&mut buf, &[2, b'n', b'a', 0], 35, 300, rdata.len() as u16);
        buf.extend_from_slice(&rdata);

        let record = Record::read(&mut PacketCursor::new(&buf)).unwrap();
        match record.data {
            RecordData::Naptr(naptr) => {
                assert_eq!(naptr.order, 100);
                assert_eq!(naptr.preference, 50);
                assert_eq!(naptr.flags, "s");
                assert_eq!(naptr.service, "SIP+D2U");
                assert_eq!(naptr.regexp, "");
                assert_eq!(naptr.replacement, "_sip.udp");
            }
            other => panic!("unexpected data: {other:?}"),
        }
    }

    #[test]
    fn should_skip_unsupported_record() {
        let mut buf = Vec::new();
        record_head(&mut buf, &[1, b'x', 0], 16, 60, 4);
        buf.extend_from_slice(&[1, 2, 3, 4]);
        buf.push(0xAB);

        let mut cursor = PacketCursor::new(&buf);
        let record = Record::read(&mut cursor).unwrap();
        assert_eq!(record.data, RecordData::Unsupported);
        // Cursor parked right past the RDATA.
        assert_eq!(cursor.read().unwrap(), 0xAB);
    }

    #[test]
    fn should_report_malformed_body_without_losing_position() {
        // SRV record whose RDATA is too short for the fixed fields.
        let mut buf = Vec::new();
        record_head(&mut buf, &[1, b'x', 0], 33, 60, 2);
        buf.extend_from_slice(&[0, 10]);
        buf.push(0xCD);

        let mut cursor = PacketCursor::new(&buf);
        let record = Record::read(&mut cursor).unwrap();
        assert!(matches!(record.data, RecordData::Malformed(_)));
        assert_eq!(cursor.read().unwrap(), 0xCD);
    }

    #[test]
    fn should_fail_on_truncated_fixed_fields() {
        let buf = [1, b'x', 0, 0, 1];
        let error = Record::read(&mut PacketCursor::new(&buf)).unwrap_err();
        assert_eq!(error, ReaderError::EndOfBuffer);
    }

    #[test]
    fn should_fail_on_rdata_overrun() {
        let mut buf = Vec::new();
        record_head(&mut buf, &[1, b'x', 0], 1, 60, 200);
        buf.extend_from_slice(&[1, 2, 3, 4]);

        let error = Record::read(&mut PacketCursor::new(&buf)).unwrap_err();
        assert_eq!(error, ReaderError::EndOfBuffer);
    }
}
