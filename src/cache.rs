//! Positive and negative answer cache.
//!
//! The engine consults the cache under its own lock before issuing to the
//! network, so every operation here is synchronous; deliveries of cached
//! answers happen later on their own task, never from inside those calls.

use crate::answer::{AnswerData, DnsAnswer, QueryId};
use crate::error::DnsError;
use moka::sync::Cache;
use plover_proto::packet::QueryType;
use std::collections::HashMap;
use std::ops::Add;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::sync::oneshot;

/// Records kept from a single response before caching degrades.
pub(crate) const MAX_RECORDS_PER_RESPONSE: usize = 64;

#[derive(Debug, serde::Deserialize)]
pub struct Config {
    #[serde(default = "Config::default_size")]
    size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self { size: 1000 }
    }
}

impl Config {
    pub fn default_size() -> u64 {
        1000
    }

    pub fn build(self) -> MemoryCacheService {
        MemoryCacheService::new(self.size)
    }
}

/// How a lookup fared against the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindOutcome {
    /// Found; records carry their remaining TTL.
    Positive(Vec<DnsAnswer>),
    /// A fresh denial covers every name the lookup could try.
    Negative {
        owner: String,
        status: DnsError,
        ttl: u32,
    },
    /// Go to the network. Mask bits of candidates with a fresh cached
    /// denial are cleared so they are not asked again.
    Miss { mask: u32 },
}

pub trait CacheService: Send + Sync {
    fn find(
        &self,
        qname: &str,
        qtype: QueryType,
        domains: &[String],
        mask: u32,
        ndots: u32,
    ) -> FindOutcome;
    fn store_positive(&self, qname: &str, qtype: QueryType, records: Vec<DnsAnswer>);
    fn store_negative(
        &self,
        qname: &str,
        qtype: QueryType,
        owner: &str,
        status: DnsError,
        ttl: u32,
    );
    fn clear(&self);
}

#[derive(Clone)]
enum CacheEntry {
    Positive {
        deadline: SystemTime,
        records: Vec<DnsAnswer>,
    },
    Negative {
        deadline: SystemTime,
        owner: String,
        status: DnsError,
    },
}

pub struct MemoryCacheService {
    inner: Cache<(String, QueryType), CacheEntry>,
}

impl MemoryCacheService {
    #[inline]
    fn new(size: u64) -> Self {
        Self {
            inner: Cache::new(size),
        }
    }
}

impl CacheService for MemoryCacheService {
    #[tracing::instrument(skip(self, domains))]
    fn find(
        &self,
        qname: &str,
        qtype: QueryType,
        domains: &[String],
        mask: u32,
        ndots: u32,
    ) -> FindOutcome {
        let now = SystemTime::now();
        let mut adjusted = mask;
        let mut negative: Option<(String, DnsError, u32)> = None;
        let mut unknown = false;

        for (bit, name) in crate::search::candidate_names(qname, domains, mask, ndots) {
            // Names compare case-insensitively, keys are kept lowercase.
            let key = (name.to_lowercase(), qtype);
            match self.inner.get(&key) {
                Some(CacheEntry::Positive { deadline, records }) => {
                    if let Ok(left) = deadline.duration_since(now) {
                        tracing::debug!("found in cache with {} seconds left", left.as_secs());
                        return FindOutcome::Positive(
                            records
                                .iter()
                                .map(|record| record.clone().with_ttl(left.as_secs() as u32))
                                .collect(),
                        );
                    }
                    tracing::debug!("found in cache but expired");
                    self.inner.invalidate(&key);
                    unknown = true;
                }
                Some(CacheEntry::Negative {
                    deadline,
                    owner,
                    status,
                }) => match deadline.duration_since(now) {
                    Ok(left) => {
                        adjusted &= !bit;
                        if negative.is_none() || bit == 1 {
                            negative = Some((owner, status, left.as_secs() as u32));
                        }
                    }
                    Err(_) => {
                        self.inner.invalidate(&key);
                        unknown = true;
                    }
                },
                None => unknown = true,
            }
        }

        match negative {
            Some((owner, status, ttl)) if !unknown => {
                tracing::debug!("every candidate negatively cached");
                FindOutcome::Negative { owner, status, ttl }
            }
            _ => FindOutcome::Miss { mask: adjusted },
        }
    }

    #[tracing::instrument(skip(self, records))]
    fn store_positive(&self, qname: &str, qtype: QueryType, records: Vec<DnsAnswer>) {
        if let Some(min_ttl) = records.iter().map(|record| record.ttl).min() {
            tracing::debug!("caching with a ttl of {min_ttl} seconds");
            let deadline = SystemTime::now().add(Duration::new(min_ttl as u64, 0));
            self.inner
                .insert((qname.to_lowercase(), qtype), CacheEntry::Positive { deadline, records });
        }
    }

    #[tracing::instrument(skip(self))]
    fn store_negative(&self, qname: &str, qtype: QueryType, owner: &str, status: DnsError, ttl: u32) {
        if ttl == 0 {
            return;
        }
        tracing::debug!("caching denial with a ttl of {ttl} seconds");
        let deadline = SystemTime::now().add(Duration::new(ttl as u64, 0));
        self.inner.insert(
            (qname.to_lowercase(), qtype),
            CacheEntry::Negative {
                deadline,
                owner: owner.to_string(),
                status,
            },
        );
    }

    fn clear(&self) {
        self.inner.invalidate_all();
    }
}

/// Write-side of one response. Records are collected as the response walk
/// sees them and committed when the transaction is dropped, so early exits
/// on malformed responses still finalize exactly once.
pub(crate) struct CacheTx {
    cache: Arc<dyn CacheService>,
    qname: String,
    qtype: QueryType,
    records: Vec<DnsAnswer>,
    negative: Option<(String, DnsError, u32)>,
    committed: bool,
}

impl CacheTx {
    pub fn new(cache: Arc<dyn CacheService>, qname: String, qtype: QueryType) -> Self {
        Self {
            cache,
            qname,
            qtype,
            records: Vec::new(),
            negative: None,
            committed: false,
        }
    }

    pub fn record(&mut self, answer: &DnsAnswer) -> Result<(), DnsError> {
        match &answer.data {
            AnswerData::Status(status @ (DnsError::NotFound | DnsError::NoData)) => {
                self.negative = Some((answer.owner.clone(), status.clone(), answer.ttl));
                Ok(())
            }
            AnswerData::Record(_) if answer.is_record_of(self.qtype) => {
                if self.records.len() >= MAX_RECORDS_PER_RESPONSE {
                    return Err(DnsError::CacheFull);
                }
                self.records.push(answer.clone());
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Flush to the cache now. Committing is idempotent; dropping the
    /// transaction finishes it if nothing did earlier.
    pub fn finish(&mut self) {
        self.commit();
    }

    fn commit(&mut self) {
        if self.committed {
            return;
        }
        self.committed = true;
        if let Some((owner, status, ttl)) = self.negative.take() {
            self.cache
                .store_negative(&self.qname, self.qtype, &owner, status, ttl);
        } else if !self.records.is_empty() {
            self.cache
                .store_positive(&self.qname, self.qtype, std::mem::take(&mut self.records));
        }
    }
}

impl Drop for CacheTx {
    fn drop(&mut self) {
        self.commit();
    }
}

/// Queries currently being answered from the cache, by id. Cancellation
/// consults this registry before the in-flight table.
#[derive(Default)]
pub(crate) struct PendingDeliveries {
    inner: Mutex<HashMap<QueryId, oneshot::Sender<()>>>,
}

impl PendingDeliveries {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<QueryId, oneshot::Sender<()>>> {
        self.inner.lock().unwrap_or_else(|err| err.into_inner())
    }

    pub fn register(&self, id: QueryId) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(id, tx);
        rx
    }

    pub fn complete(&self, id: QueryId) {
        self.lock().remove(&id);
    }

    pub fn cancel(&self, id: QueryId) -> Result<(), DnsError> {
        match self.lock().remove(&id) {
            Some(tx) => {
                let _ = tx.send(());
                Ok(())
            }
            None => Err(DnsError::CacheNotFound),
        }
    }
}
