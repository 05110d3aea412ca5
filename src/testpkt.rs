//! Test support: canned responses and recording callbacks.

use crate::answer::{CallbackAction, DnsAnswer, RecordCallback};
use plover_proto::packet::{QueryType, ResponseCode};
use std::sync::{Arc, Mutex};

fn push_name(out: &mut Vec<u8>, name: &str) {
    for label in name.trim_end_matches('.').split('.') {
        if label.is_empty() {
            continue;
        }
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
}

fn encode_record(owner: &str, rtype: u16, ttl: u32, rdata: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    push_name(&mut out, owner);
    out.extend_from_slice(&rtype.to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&ttl.to_be_bytes());
    out.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
    out.extend_from_slice(rdata);
    out
}

/// Builds response packets byte by byte. The id is left zero; scripted
/// transports patch it to match the query.
pub(crate) struct ResponseBuilder {
    rcode: ResponseCode,
    question: (String, u16),
    answers: Vec<Vec<u8>>,
    authority: Vec<Vec<u8>>,
}

impl ResponseBuilder {
    pub fn new(qname: &str, qtype: QueryType) -> Self {
        Self {
            rcode: ResponseCode::NoError,
            question: (qname.to_string(), qtype.to_num()),
            answers: Vec::new(),
            authority: Vec::new(),
        }
    }

    pub fn rcode(mut self, rcode: ResponseCode) -> Self {
        self.rcode = rcode;
        self
    }

    pub fn a(mut self, owner: &str, octets: [u8; 4], ttl: u32) -> Self {
        self.answers.push(encode_record(owner, 1, ttl, &octets));
        self
    }

    pub fn aaaa(mut self, owner: &str, octets: [u8; 16], ttl: u32) -> Self {
        self.answers.push(encode_record(owner, 28, ttl, &octets));
        self
    }

    pub fn cname(mut self, owner: &str, alias: &str, ttl: u32) -> Self {
        let mut rdata = Vec::new();
        push_name(&mut rdata, alias);
        self.answers.push(encode_record(owner, 5, ttl, &rdata));
        self
    }

    pub fn srv(
        mut self,
        owner: &str,
        priority: u16,
        weight: u16,
        port: u16,
        target: &str,
        ttl: u32,
    ) -> Self {
        let mut rdata = Vec::new();
        rdata.extend_from_slice(&priority.to_be_bytes());
        rdata.extend_from_slice(&weight.to_be_bytes());
        rdata.extend_from_slice(&port.to_be_bytes());
        push_name(&mut rdata, target);
        self.answers.push(encode_record(owner, 33, ttl, &rdata));
        self
    }

    pub fn soa(mut self, owner: &str, record_ttl: u32, minimum: u32) -> Self {
        let mut rdata = Vec::new();
        push_name(&mut rdata, "ns.invalid");
        push_name(&mut rdata, "hostmaster.invalid");
        for field in [1u32, 7200, 900, 86400, minimum] {
            rdata.extend_from_slice(&field.to_be_bytes());
        }
        self.authority
            .push(encode_record(owner, 6, record_ttl, &rdata));
        self
    }

    pub fn raw_answer(mut self, owner: &str, rtype: u16, rdata: Vec<u8>, ttl: u32) -> Self {
        self.answers.push(encode_record(owner, rtype, ttl, &rdata));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0u16.to_be_bytes());
        out.push(0x80 | 0x01); // response, recursion desired
        out.push(0x80 | self.rcode as u8); // recursion available
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&(self.answers.len() as u16).to_be_bytes());
        out.extend_from_slice(&(self.authority.len() as u16).to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());

        push_name(&mut out, &self.question.0);
        out.extend_from_slice(&self.question.1.to_be_bytes());
        out.extend_from_slice(&1u16.to_be_bytes());

        for record in self.answers.iter().chain(self.authority.iter()) {
            out.extend_from_slice(record);
        }
        out
    }
}

pub(crate) type AnswerLog = Arc<Mutex<Vec<DnsAnswer>>>;

/// Callback that stores every delivery.
pub(crate) fn recorder() -> (RecordCallback, AnswerLog) {
    let log: AnswerLog = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    let callback: RecordCallback = Arc::new(move |_id, answer: &DnsAnswer| {
        sink.lock().unwrap().push(answer.clone());
        CallbackAction::Continue
    });
    (callback, log)
}

/// Callback that reports its consumer gone after `records` record
/// deliveries.
pub(crate) fn recorder_destructing_after(records: usize) -> (RecordCallback, AnswerLog) {
    let log: AnswerLog = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    let callback: RecordCallback = Arc::new(move |_id, answer: &DnsAnswer| {
        let mut log = sink.lock().unwrap();
        log.push(answer.clone());
        let delivered = log.iter().filter(|a| !a.is_terminator()).count();
        if delivered >= records {
            CallbackAction::Destructed
        } else {
            CallbackAction::Continue
        }
    });
    (callback, log)
}
