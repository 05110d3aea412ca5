pub mod header;
pub mod question;
pub mod record;

/// Fixed header size
pub const HEADER_LEN: usize = 12;
/// QTYPE + QCLASS trailing a question name
pub const QUESTION_FIXED_LEN: usize = 4;
/// TYPE + CLASS + TTL + RDLENGTH trailing a record name
pub const RR_FIXED_LEN: usize = 10;

/// Lookup types a caller may ask for.
#[derive(PartialEq, Eq, Debug, Clone, Hash, Copy)]
pub enum QueryType {
    /// a host address
    A, // 1
    /// an IPv6 host address
    Aaaa, // 28
    /// service location
    Srv, // 33
    /// naming authority pointer
    Naptr, // 35
}

impl QueryType {
    pub fn to_num(self) -> u16 {
        match self {
            QueryType::A => 1,
            QueryType::Aaaa => 28,
            QueryType::Srv => 33,
            QueryType::Naptr => 35,
        }
    }
}

/// Resource-record types understood by the decoder. Anything else is carried
/// as `Unsupported` and skipped by the response walk.
#[derive(PartialEq, Eq, Debug, Clone, Hash, Copy)]
pub enum RecordType {
    A, // 1
    /// the canonical name for an alias
    Cname, // 5
    /// start of a zone of authority
    Soa, // 6
    Aaaa, // 28
    Srv, // 33
    Naptr, // 35
    Unsupported(u16),
}

impl RecordType {
    pub fn to_num(self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::Cname => 5,
            RecordType::Soa => 6,
            RecordType::Aaaa => 28,
            RecordType::Srv => 33,
            RecordType::Naptr => 35,
            RecordType::Unsupported(x) => x,
        }
    }

    pub fn from_num(num: u16) -> RecordType {
        match num {
            1 => RecordType::A,
            5 => RecordType::Cname,
            6 => RecordType::Soa,
            28 => RecordType::Aaaa,
            33 => RecordType::Srv,
            35 => RecordType::Naptr,
            _ => RecordType::Unsupported(num),
        }
    }
}

impl From<QueryType> for RecordType {
    fn from(value: QueryType) -> Self {
        RecordType::from_num(value.to_num())
    }
}

/// CLASS fields appear in resource records.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DnsClass {
    /// IN - the Internet
    Internet = 1,
    /// CH - the CHAOS class
    Chaos = 3,
    /// HS - Hesiod
    Hesiod = 4,
}

impl Default for DnsClass {
    fn default() -> Self {
        Self::Internet
    }
}

impl DnsClass {
    pub fn from_num(value: u16) -> Self {
        match value {
            3 => Self::Chaos,
            4 => Self::Hesiod,
            _other => Self::Internet,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResponseCode {
    /// No error condition
    NoError = 0,
    /// The name server was unable to interpret the query.
    FormatError = 1,
    /// The name server was unable to process this query due to a problem
    /// with the name server.
    ServerFailure = 2,
    /// The domain name referenced in the query does not exist.
    /// Previously named NXDOMAIN.
    NameError = 3,
    /// The name server does not support the requested kind of query.
    NotImplemented = 4,
    /// The name server refuses to perform the specified operation for
    /// policy reasons.
    Refused = 5,
}

impl ResponseCode {
    pub fn from_num(num: u8) -> ResponseCode {
        match num {
            1 => ResponseCode::FormatError,
            2 => ResponseCode::ServerFailure,
            3 => ResponseCode::NameError,
            4 => ResponseCode::NotImplemented,
            5 => ResponseCode::Refused,
            _ => ResponseCode::NoError,
        }
    }
}
