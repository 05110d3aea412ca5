use plover_proto::buffer::{ReaderError, WriterError};
use std::fmt::Display;

/// Everything a lookup can fail with, either as a return value of the public
/// calls or inside a status-only record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsError {
    /// Empty name or name longer than the wire format allows.
    BadName,
    /// The caller buffer cannot hold the outbound query; `required` is the
    /// size that would have been enough.
    InsufficientBuffer { required: usize },
    /// Every configured server has been tried, or none were configured.
    EndOfServers,
    /// The response could not be decoded.
    Malformed,
    /// A record inside an otherwise valid response could not be decoded.
    MalformedRecord,
    /// An answer record of a supported type that does not match the question.
    UnexpectedRecordType,
    /// The name does not exist (NXDOMAIN), possibly served from the
    /// negative cache.
    NotFound,
    /// The name exists but has no records of the requested type.
    NoData,
    /// The server refused to process the query.
    Refused,
    /// The server reported an internal failure.
    ServerFailure,
    /// No reply within the per-attempt budget.
    Timeout,
    Io(String),
    /// The id passed to `cancel` is not a pending cache delivery.
    CacheNotFound,
    /// The per-response cache budget is exhausted.
    CacheFull,
    QueryCanceled,
}

impl Display for DnsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadName => write!(f, "invalid name"),
            Self::InsufficientBuffer { required } => {
                write!(f, "query buffer too small, {required} bytes required")
            }
            Self::EndOfServers => write!(f, "no more servers to try"),
            Self::Malformed => write!(f, "malformed response"),
            Self::MalformedRecord => write!(f, "malformed record in response"),
            Self::UnexpectedRecordType => write!(f, "unexpected record type in response"),
            Self::NotFound => write!(f, "name not found"),
            Self::NoData => write!(f, "no records of the requested type"),
            Self::Refused => write!(f, "query refused by server"),
            Self::ServerFailure => write!(f, "server failure"),
            Self::Timeout => write!(f, "query timed out"),
            Self::Io(reason) => write!(f, "io error: {reason}"),
            Self::CacheNotFound => write!(f, "query not found in cache"),
            Self::CacheFull => write!(f, "cache budget exhausted"),
            Self::QueryCanceled => write!(f, "query canceled"),
        }
    }
}

impl std::error::Error for DnsError {}

impl From<ReaderError> for DnsError {
    fn from(_value: ReaderError) -> Self {
        Self::Malformed
    }
}

impl From<WriterError> for DnsError {
    fn from(_value: WriterError) -> Self {
        // The writer only runs out of caller-provided space; the caller
        // learns the right size from the engine.
        Self::InsufficientBuffer { required: 0 }
    }
}

impl From<std::io::Error> for DnsError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}
