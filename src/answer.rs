use crate::error::DnsError;
use plover_proto::packet::record::{Record, RecordData};
use plover_proto::packet::QueryType;
use std::sync::Arc;

pub type QueryId = u32;

/// What a callback tells the engine about its consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Continue,
    /// The consumer is gone; stop delivering record callbacks for this
    /// query. The terminating record is still delivered.
    Destructed,
}

/// Per-record delivery callback. Invoked from the engine's driver tasks, one
/// or more times per accepted query, ending with exactly one record whose
/// data is [`AnswerData::EndOfList`] or [`AnswerData::Status`].
pub type RecordCallback = Arc<dyn Fn(QueryId, &DnsAnswer) -> CallbackAction + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerData {
    Record(RecordData),
    Status(DnsError),
    EndOfList,
}

/// One decoded answer streamed to a callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsAnswer {
    /// The type the query asked for, which every `Record` payload matches.
    pub query_type: QueryType,
    /// 1-based position among the delivered records; 0 on terminators.
    pub record_number: u32,
    pub owner: String,
    pub ttl: u32,
    pub data: AnswerData,
}

impl DnsAnswer {
    /// Status-only record used when there is no response to draw names and
    /// TTLs from.
    pub fn status(query_type: QueryType, status: DnsError) -> Self {
        Self {
            query_type,
            record_number: 0,
            owner: String::new(),
            ttl: u32::MAX,
            data: AnswerData::Status(status),
        }
    }

    pub fn end_of_list(query_type: QueryType) -> Self {
        Self {
            query_type,
            record_number: 0,
            owner: String::new(),
            ttl: 0,
            data: AnswerData::EndOfList,
        }
    }

    pub fn from_record(query_type: QueryType, record: &Record) -> Self {
        Self {
            query_type,
            record_number: 0,
            owner: record.owner.clone(),
            ttl: record.ttl,
            data: AnswerData::Record(record.data.clone()),
        }
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// True for record payloads of the given query type.
    pub fn is_record_of(&self, query_type: QueryType) -> bool {
        matches!(
            (&self.data, query_type),
            (AnswerData::Record(RecordData::A(_)), QueryType::A)
                | (AnswerData::Record(RecordData::Aaaa(_)), QueryType::Aaaa)
                | (AnswerData::Record(RecordData::Srv(_)), QueryType::Srv)
                | (AnswerData::Record(RecordData::Naptr(_)), QueryType::Naptr)
        )
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self.data, AnswerData::Status(_) | AnswerData::EndOfList)
    }
}

#[cfg(test)]
mod tests {
    use super::{AnswerData, DnsAnswer};
    use crate::error::DnsError;
    use plover_proto::packet::record::RecordData;
    use plover_proto::packet::QueryType;
    use std::net::Ipv4Addr;

    #[test]
    fn record_should_match_its_query_type() {
        let answer = DnsAnswer {
            query_type: QueryType::A,
            record_number: 1,
            owner: "host".into(),
            ttl: 60,
            data: AnswerData::Record(RecordData::A(Ipv4Addr::LOCALHOST)),
        };
        assert!(answer.is_record_of(QueryType::A));
        assert!(!answer.is_record_of(QueryType::Aaaa));
        assert!(!answer.is_terminator());
    }

    #[test]
    fn status_should_terminate() {
        let answer = DnsAnswer::status(QueryType::Srv, DnsError::NotFound);
        assert!(answer.is_terminator());
        assert!(!answer.is_record_of(QueryType::Srv));
    }
}
