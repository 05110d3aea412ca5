//! Response walk: decode the answer section, feed the cache and the user
//! callback, and derive the negative answer when nothing matched.

use crate::answer::{AnswerData, CallbackAction, DnsAnswer, QueryId, RecordCallback};
use crate::cache::CacheTx;
use crate::error::DnsError;
use plover_proto::buffer::{PacketCursor, ReaderError};
use plover_proto::chain::CnameChain;
use plover_proto::packet::header::Header;
use plover_proto::packet::record::{Record, RecordData};
use plover_proto::packet::{DnsClass, QueryType, RecordType, ResponseCode, QUESTION_FIXED_LEN};

/// Callback wrapper enforcing the delivery contract: once the consumer
/// reports itself gone, record callbacks stop, but the one terminating
/// record still goes out.
pub(crate) struct CallbackSink {
    callback: RecordCallback,
    query_id: QueryId,
    alive: bool,
}

impl CallbackSink {
    pub fn new(callback: RecordCallback, query_id: QueryId) -> Self {
        Self {
            callback,
            query_id,
            alive: true,
        }
    }

    pub fn deliver_record(&mut self, answer: &DnsAnswer) {
        if !self.alive {
            return;
        }
        if (self.callback)(self.query_id, answer) == CallbackAction::Destructed {
            tracing::debug!("consumer of query {} gone, stopping records", self.query_id);
            self.alive = false;
        }
    }

    pub fn deliver_final(&self, answer: &DnsAnswer) {
        let _ = (self.callback)(self.query_id, answer);
    }
}

/// Skip the question section, keeping the owner name of the last question.
/// Queries carry a single question, so "last" is "the" question.
fn skip_questions(cursor: &mut PacketCursor<'_>, count: u16) -> Result<String, ReaderError> {
    let mut name = String::new();
    for _ in 0..count {
        name = cursor.read_name()?;
        cursor.step(QUESTION_FIXED_LEN);
    }
    Ok(name)
}

/// TTL of a denial: min(record TTL, MINIMUM) of the first IN SOA in the
/// authority section, 0 when there is none. The cursor is moved past every
/// record it inspects.
fn negative_ttl(cursor: &mut PacketCursor<'_>, authority_count: u16) -> u32 {
    for _ in 0..authority_count {
        if cursor.skip_name().is_err() {
            return 0;
        }
        let (rtype, class, ttl, rdlength) = match (|| {
            Ok::<_, ReaderError>((
                cursor.read_u16()?,
                cursor.read_u16()?,
                cursor.read_u32()?,
                cursor.read_u16()?,
            ))
        })() {
            Ok(fields) => fields,
            Err(_) => return 0,
        };

        let end = cursor.pos() + rdlength as usize;
        if end > cursor.len() {
            return 0;
        }

        if RecordType::from_num(rtype) == RecordType::Soa
            && DnsClass::from_num(class) == DnsClass::Internet
        {
            // MINIMUM is the trailing 32-bit field of the SOA body.
            if rdlength < 4 {
                return 0;
            }
            cursor.seek(end - 4);
            return match cursor.read_u32() {
                Ok(minimum) => ttl.min(minimum),
                Err(_) => 0,
            };
        }

        cursor.seek(end);
    }
    0
}

/// Walk one response.
///
/// With `deliver` set, matching records stream to the sink followed by one
/// terminator. Without it only the cache sees the response, which is how
/// denials of intermediate suffix attempts are recorded.
///
/// A name-error response never streams records: its answer section is only
/// walked so the CNAME chain can name the denial, which is then cached and
/// (when delivering) handed to the callback with the SOA-derived TTL.
pub(crate) fn walk_response(
    sink: &mut CallbackSink,
    tx: &mut CacheTx,
    qtype: QueryType,
    response: &[u8],
    deliver: bool,
) {
    let mut cursor = PacketCursor::new(response);
    let header = match Header::read(&mut cursor) {
        Ok(header) => header,
        Err(_) => {
            if deliver {
                sink.deliver_final(&DnsAnswer::status(qtype, DnsError::Malformed));
            }
            return;
        }
    };

    let question_name = match skip_questions(&mut cursor, header.questions) {
        Ok(name) => name,
        Err(_) => {
            if deliver {
                sink.deliver_final(&DnsAnswer::status(qtype, DnsError::Malformed));
            }
            return;
        }
    };

    let nxdomain = header.response_code == ResponseCode::NameError;
    let deliver_records = deliver && !nxdomain;
    let expected = RecordType::from(qtype);
    let mut chain = CnameChain::new();
    let mut record_number = 0u32;
    let mut continue_caching = true;

    for _ in 0..header.answers {
        let record = match Record::read(&mut cursor) {
            Ok(record) => record,
            Err(_) => {
                tx.finish();
                if deliver {
                    sink.deliver_final(&DnsAnswer::status(qtype, DnsError::Malformed));
                }
                return;
            }
        };

        match &record.data {
            RecordData::Malformed(_) => {
                tracing::warn!("undecodable record in response for {question_name}");
                tx.finish();
                if deliver {
                    sink.deliver_final(&DnsAnswer::status(qtype, DnsError::MalformedRecord));
                }
                return;
            }
            // Record types outside the decoder set are skipped silently.
            RecordData::Unsupported => continue,
            RecordData::Cname(alias) => {
                chain.add(&record.owner, alias);
                if continue_caching
                    && tx.record(&DnsAnswer::from_record(qtype, &record)).is_err()
                {
                    continue_caching = false;
                }
            }
            _ => {
                if record.rtype != expected {
                    tracing::warn!(
                        "response for {question_name} answers with {:?} records",
                        record.rtype
                    );
                    tx.finish();
                    if deliver {
                        sink.deliver_final(&DnsAnswer::status(
                            qtype,
                            DnsError::UnexpectedRecordType,
                        ));
                    }
                    return;
                }

                let mut answer = DnsAnswer::from_record(qtype, &record);
                if continue_caching && tx.record(&answer).is_err() {
                    tracing::warn!("cache budget exhausted, caching disabled for this response");
                    continue_caching = false;
                }
                if deliver_records {
                    record_number += 1;
                    answer.record_number = record_number;
                    sink.deliver_record(&answer);
                }
            }
        }
    }

    if nxdomain || record_number == 0 {
        let status = if nxdomain {
            DnsError::NotFound
        } else {
            DnsError::NoData
        };
        // The denial refers to the end of the CNAME chain when one exists.
        let owner = chain
            .find_terminal()
            .unwrap_or(question_name.as_str())
            .to_string();
        let ttl = negative_ttl(&mut cursor, header.authoritative_entries);
        let answer = DnsAnswer {
            query_type: qtype,
            record_number: 0,
            owner,
            ttl,
            data: AnswerData::Status(status),
        };
        if continue_caching {
            let _ = tx.record(&answer);
        }
        // Cache writes land before the terminating callback.
        tx.finish();
        if deliver {
            sink.deliver_final(&answer);
        }
    } else {
        tx.finish();
        if deliver {
            sink.deliver_final(&DnsAnswer::end_of_list(qtype));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{walk_response, CallbackSink};
    use crate::answer::{AnswerData, DnsAnswer};
    use crate::cache::{CacheService, CacheTx, FindOutcome};
    use crate::error::DnsError;
    use crate::testpkt::{recorder, recorder_destructing_after, ResponseBuilder};
    use plover_proto::packet::record::RecordData;
    use plover_proto::packet::{QueryType, ResponseCode};
    use similar_asserts::assert_eq;
    use std::net::{Ipv4Addr, Ipv6Addr};
    use std::sync::Arc;

    fn cache() -> Arc<dyn CacheService> {
        Arc::new(crate::cache::Config::default().build())
    }

    fn walk(
        response: &[u8],
        qname: &str,
        qtype: QueryType,
    ) -> (Vec<DnsAnswer>, Arc<dyn CacheService>) {
        let cache = cache();
        let (callback, log) = recorder();
        let mut sink = CallbackSink::new(callback, 1);
        let mut tx = CacheTx::new(cache.clone(), qname.into(), qtype);
        walk_response(&mut sink, &mut tx, qtype, response, true);
        drop(tx);
        let answers = log.lock().unwrap().clone();
        (answers, cache)
    }

    #[test]
    fn should_stream_matching_records_in_order() {
        let response = ResponseBuilder::new("host.example.com", QueryType::A)
            .a("host.example.com", [192, 0, 2, 7], 60)
            .a("host.example.com", [192, 0, 2, 8], 60)
            .a("host.example.com", [192, 0, 2, 9], 60)
            .build();

        let (answers, _) = walk(&response, "host.example.com", QueryType::A);
        assert_eq!(answers.len(), 4);
        for (idx, answer) in answers[..3].iter().enumerate() {
            assert_eq!(answer.record_number, idx as u32 + 1);
            assert_eq!(answer.owner, "host.example.com");
            assert_eq!(answer.ttl, 60);
        }
        assert_eq!(
            answers[0].data,
            AnswerData::Record(RecordData::A(Ipv4Addr::new(192, 0, 2, 7)))
        );
        assert_eq!(answers[3].data, AnswerData::EndOfList);
    }

    #[test]
    fn should_stream_srv_records() {
        let response = ResponseBuilder::new("_sip._udp.example.com", QueryType::Srv)
            .srv("_sip._udp.example.com", 10, 60, 5060, "sip1.example.com", 300)
            .build();

        let (answers, _) = walk(&response, "_sip._udp.example.com", QueryType::Srv);
        assert_eq!(answers.len(), 2);
        match &answers[0].data {
            AnswerData::Record(RecordData::Srv(srv)) => {
                assert_eq!(srv.priority, 10);
                assert_eq!(srv.weight, 60);
                assert_eq!(srv.port, 5060);
                assert_eq!(srv.target, "sip1.example.com");
            }
            other => panic!("unexpected data: {other:?}"),
        }
        assert_eq!(answers[1].data, AnswerData::EndOfList);
    }

    #[test]
    fn should_stream_aaaa_records() {
        let addr = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1);
        let response = ResponseBuilder::new("v6.example.com", QueryType::Aaaa)
            .aaaa("v6.example.com", addr.octets(), 60)
            .build();

        let (answers, _) = walk(&response, "v6.example.com", QueryType::Aaaa);
        assert_eq!(answers.len(), 2);
        assert_eq!(answers[0].data, AnswerData::Record(RecordData::Aaaa(addr)));
    }

    #[test]
    fn should_cache_streamed_records() {
        let response = ResponseBuilder::new("host.example.com", QueryType::A)
            .a("host.example.com", [192, 0, 2, 7], 60)
            .build();

        let (_, cache) = walk(&response, "host.example.com", QueryType::A);
        match cache.find("host.example.com", QueryType::A, &[], 1, 1) {
            FindOutcome::Positive(records) => assert_eq!(records.len(), 1),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn should_skip_unsupported_records_silently() {
        let response = ResponseBuilder::new("host.example.com", QueryType::A)
            .raw_answer("host.example.com", 16, vec![4, b't', b'e', b'x', b't'], 60)
            .a("host.example.com", [192, 0, 2, 7], 60)
            .build();

        let (answers, _) = walk(&response, "host.example.com", QueryType::A);
        assert_eq!(answers.len(), 2);
        assert_eq!(answers[0].record_number, 1);
    }

    #[test]
    fn should_derive_nodata_from_soa() {
        let response = ResponseBuilder::new("host.example.com", QueryType::Aaaa)
            .soa("example.com", 600, 120)
            .build();

        let (answers, cache) = walk(&response, "host.example.com", QueryType::Aaaa);
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].data, AnswerData::Status(DnsError::NoData));
        assert_eq!(answers[0].ttl, 120);
        assert_eq!(answers[0].owner, "host.example.com");

        // The denial is cached for the question name.
        match cache.find("host.example.com", QueryType::Aaaa, &[], 1, 1) {
            FindOutcome::Negative { status, .. } => assert_eq!(status, DnsError::NoData),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn nxdomain_should_carry_the_chain_terminal() {
        let response = ResponseBuilder::new("www.a", QueryType::A)
            .rcode(ResponseCode::NameError)
            .cname("www.a", "b", 300)
            .cname("b", "c", 300)
            .soa("a", 600, 120)
            .build();

        let (answers, _) = walk(&response, "www.a", QueryType::A);
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].data, AnswerData::Status(DnsError::NotFound));
        assert_eq!(answers[0].owner, "c");
        assert_eq!(answers[0].ttl, 120);
    }

    #[test]
    fn nodata_with_cname_cycle_should_fall_back_to_question_name() {
        let response = ResponseBuilder::new("a", QueryType::A)
            .cname("a", "b", 300)
            .cname("b", "a", 300)
            .build();

        let (answers, _) = walk(&response, "a", QueryType::A);
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].owner, "a");
        assert_eq!(answers[0].data, AnswerData::Status(DnsError::NoData));
    }

    #[test]
    fn unexpected_answer_type_should_abort_with_status() {
        let response = ResponseBuilder::new("host.example.com", QueryType::Srv)
            .a("host.example.com", [192, 0, 2, 7], 60)
            .build();

        let (answers, _) = walk(&response, "host.example.com", QueryType::Srv);
        assert_eq!(answers.len(), 1);
        assert_eq!(
            answers[0].data,
            AnswerData::Status(DnsError::UnexpectedRecordType)
        );
    }

    #[test]
    fn malformed_record_should_abort_with_status() {
        let response = ResponseBuilder::new("host.example.com", QueryType::Srv)
            // SRV body shorter than its fixed fields.
            .raw_answer("host.example.com", 33, vec![0, 1], 60)
            .a("host.example.com", [192, 0, 2, 7], 60)
            .build();

        let (answers, _) = walk(&response, "host.example.com", QueryType::Srv);
        assert_eq!(answers.len(), 1);
        assert_eq!(
            answers[0].data,
            AnswerData::Status(DnsError::MalformedRecord)
        );
    }

    #[test]
    fn destructed_consumer_should_still_get_a_terminator() {
        let response = ResponseBuilder::new("host.example.com", QueryType::A)
            .a("host.example.com", [192, 0, 2, 7], 60)
            .a("host.example.com", [192, 0, 2, 8], 60)
            .build();

        let cache = cache();
        let (callback, log) = recorder_destructing_after(1);
        let mut sink = CallbackSink::new(callback, 1);
        let mut tx = CacheTx::new(cache.clone(), "host.example.com".into(), QueryType::A);
        walk_response(&mut sink, &mut tx, QueryType::A, &response, true);
        drop(tx);

        let answers = log.lock().unwrap().clone();
        assert_eq!(answers.len(), 2);
        assert_eq!(answers[0].record_number, 1);
        assert_eq!(answers[1].data, AnswerData::EndOfList);

        // Caching kept going after the consumer left.
        match cache.find("host.example.com", QueryType::A, &[], 1, 1) {
            FindOutcome::Positive(records) => assert_eq!(records.len(), 2),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn cache_only_walk_should_not_call_back() {
        let response = ResponseBuilder::new("gone.example", QueryType::A)
            .rcode(ResponseCode::NameError)
            .soa("example", 600, 60)
            .build();

        let cache = cache();
        let (callback, log) = recorder();
        let mut sink = CallbackSink::new(callback, 1);
        let mut tx = CacheTx::new(cache.clone(), "gone.example".into(), QueryType::A);
        walk_response(&mut sink, &mut tx, QueryType::A, &response, false);
        drop(tx);

        assert!(log.lock().unwrap().is_empty());
        assert!(matches!(
            cache.find("gone.example", QueryType::A, &[], 1, 1),
            FindOutcome::Negative { .. }
        ));
    }

    #[test]
    fn truncated_message_should_abort_with_status() {
        let response = ResponseBuilder::new("host.example.com", QueryType::A)
            .a("host.example.com", [192, 0, 2, 7], 60)
            .build();

        let (answers, _) = walk(&response[..20], "host.example.com", QueryType::A);
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].data, AnswerData::Status(DnsError::Malformed));
    }
}
