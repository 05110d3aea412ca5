//! The resolver engine: query lifecycle, cancellation, and configuration.
//!
//! Every accepted lookup runs in its own driver task. The engine owns the
//! table of in-flight queries; timers and socket completions find their
//! query by id, so an invalidated id turns late deliveries into no-ops. No
//! user callback ever runs while the engine lock is held.

use crate::answer::{DnsAnswer, QueryId, RecordCallback};
use crate::cache::{CacheService, CacheTx, FindOutcome, PendingDeliveries};
use crate::config::ResolverConfig;
use crate::error::DnsError;
use crate::pipeline::{walk_response, CallbackSink};
use crate::search::{self, SearchQuery};
use crate::system;
use crate::transport::{Transport, UdpTransport};
use plover_proto::buffer::{PacketCursor, PacketWriter, MAX_NAME_LEN};
use plover_proto::packet::header::Header;
use plover_proto::packet::question::Question;
use plover_proto::packet::{QueryType, ResponseCode, HEADER_LEN, QUESTION_FIXED_LEN};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Which parts of the host configuration `configure` reads.
#[derive(Debug, Clone, Copy)]
pub struct ProbeOptions {
    pub servers: bool,
    pub suffixes: bool,
}

impl ProbeOptions {
    pub fn all() -> Self {
        Self {
            servers: true,
            suffixes: true,
        }
    }
}

/// How a `send` was taken care of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Issued to the network; answers arrive through the callback.
    Scheduled,
    /// Answered from the cache; records arrive through the callback.
    ServedFromCache,
    /// A cached denial covers the name; the status arrives through the
    /// callback.
    NegativeFromCache,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReply {
    pub query_id: QueryId,
    pub disposition: Disposition,
}

/// Current engine parameters, as a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineParams {
    pub timeout: Duration,
    pub tries: u32,
    pub ndots: u32,
    pub servers: Vec<SocketAddr>,
    pub domains: Vec<String>,
}

/// Caller-owned scratch the outbound query is encoded into. Sizing it once
/// for the longest expected name lets one buffer serve many lookups.
pub struct QueryScratch {
    buf: Box<[u8]>,
}

impl QueryScratch {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}

/// Outcome of the issuing layer inside `send`. Failures detected while the
/// caller is still inside `send` become its return value instead of a
/// callback, so application code is never re-entered from within the call.
enum SendOutcome {
    Scheduled,
    InlineFailure(DnsError),
}

struct QueryEntry {
    qtype: QueryType,
    callback: RecordCallback,
    cancel: oneshot::Sender<()>,
    task: Option<JoinHandle<()>>,
}

struct CanceledQuery {
    query_id: QueryId,
    qtype: QueryType,
    callback: RecordCallback,
}

struct EngineState {
    servers: Vec<SocketAddr>,
    domains: Vec<String>,
    ndots: u32,
    timeout: Duration,
    tries: u32,
    next_query_id: QueryId,
    in_flight: HashMap<QueryId, QueryEntry>,
}

struct Shared {
    state: Mutex<EngineState>,
    cache: Arc<dyn CacheService>,
    pending: PendingDeliveries,
    transport: Arc<dyn Transport>,
    default_callback: RecordCallback,
    max_servers: usize,
    max_domains: usize,
    no_search: bool,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }
}

/// A long-lived resolver shared by many concurrent request initiators.
/// Cloning hands out another handle to the same engine.
///
/// Lookups are driven by Tokio tasks, so the engine must be used from
/// within a runtime.
#[derive(Clone)]
pub struct DnsEngine {
    shared: Arc<Shared>,
}

impl DnsEngine {
    pub fn new(mut config: ResolverConfig, default_callback: RecordCallback) -> Self {
        let cache: Arc<dyn CacheService> = Arc::new(std::mem::take(&mut config.cache).build());
        let transport: Arc<dyn Transport> =
            Arc::new(UdpTransport::new(config.force_tcp, config.tcp_buf_len));
        Self::with_parts(&config, default_callback, transport, cache)
    }

    pub(crate) fn with_parts(
        config: &ResolverConfig,
        default_callback: RecordCallback,
        transport: Arc<dyn Transport>,
        cache: Arc<dyn CacheService>,
    ) -> Self {
        let domains = cap_domains(config.domains.clone(), config.max_domains);
        let mut servers = config.servers.clone();
        if servers.len() > config.max_servers {
            servers.truncate(config.max_servers);
        }

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(EngineState {
                    servers,
                    domains,
                    ndots: config.ndots,
                    timeout: config.timeout(),
                    tries: config.tries,
                    next_query_id: 1,
                    in_flight: HashMap::new(),
                }),
                cache,
                pending: PendingDeliveries::default(),
                transport,
                default_callback,
                max_servers: config.max_servers,
                max_domains: config.max_domains,
                no_search: config.no_search,
            }),
        }
    }

    /// Issue a lookup.
    ///
    /// The reply carries the query id and whether the answer comes from the
    /// network or the cache; either way records arrive through `callback`
    /// (the engine default when `None`), ending with one terminating
    /// record. Failures detected synchronously are returned instead, and no
    /// callback fires for them. With `as_is` unset the name is expanded
    /// against the configured search suffixes.
    #[tracing::instrument(skip(self, scratch, callback), fields(name = %name))]
    pub fn send(
        &self,
        qtype: QueryType,
        name: &str,
        as_is: bool,
        scratch: &mut QueryScratch,
        callback: Option<RecordCallback>,
    ) -> Result<SendReply, DnsError> {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(DnsError::BadName);
        }
        let callback = callback.unwrap_or_else(|| self.shared.default_callback.clone());

        let mut state = self.shared.state();
        let query_id = state.next_query_id;
        state.next_query_id = state.next_query_id.wrapping_add(1);

        let mask = if as_is {
            1
        } else {
            ((1u64 << (state.domains.len() + 1)) - 1) as u32
        };

        // The cache may already hold the answer, or a denial for every name
        // the search could produce.
        let mask = match self
            .shared
            .cache
            .find(name, qtype, &state.domains, mask, state.ndots)
        {
            FindOutcome::Positive(records) => {
                drop(state);
                tracing::debug!("serving {qtype:?} lookup of {name} from cache");
                self.spawn_cache_records(query_id, qtype, records, callback);
                return Ok(SendReply {
                    query_id,
                    disposition: Disposition::ServedFromCache,
                });
            }
            FindOutcome::Negative { owner, status, ttl } => {
                drop(state);
                tracing::debug!("serving {qtype:?} lookup of {name} from negative cache");
                self.spawn_cache_negative(query_id, qtype, owner, status, ttl, callback);
                return Ok(SendReply {
                    query_id,
                    disposition: Disposition::NegativeFromCache,
                });
            }
            FindOutcome::Miss { mask } => mask,
        };

        let outcome = self.issue(&mut state, query_id, qtype, name, as_is, mask, scratch, callback);
        drop(state);

        match outcome {
            Ok(SendOutcome::Scheduled) => Ok(SendReply {
                query_id,
                disposition: Disposition::Scheduled,
            }),
            Ok(SendOutcome::InlineFailure(status)) | Err(status) => {
                tracing::debug!("lookup of {name} failed inline: {status}");
                Err(status)
            }
        }
    }

    /// Issuing layer of `send`, running under the engine lock. Synchronous
    /// failures come back as `InlineFailure` so no callback fires from
    /// inside the public call.
    #[allow(clippy::too_many_arguments)]
    fn issue(
        &self,
        state: &mut EngineState,
        query_id: QueryId,
        qtype: QueryType,
        name: &str,
        as_is: bool,
        mask: u32,
        scratch: &mut QueryScratch,
        callback: RecordCallback,
    ) -> Result<SendOutcome, DnsError> {
        let search_needed = !as_is
            && !self.shared.no_search
            && !state.domains.is_empty()
            && !name.ends_with('.')
            && mask != 1;

        let longest_suffix = if search_needed {
            state.domains.iter().map(|d| d.len()).max().unwrap_or(0)
        } else {
            0
        };
        let required = compute_query_size(name.len(), longest_suffix);
        if scratch.capacity() < required {
            return Err(DnsError::InsufficientBuffer { required });
        }

        if state.servers.is_empty() {
            return Ok(SendOutcome::InlineFailure(DnsError::EndOfServers));
        }

        let mut search = search_needed.then(|| SearchQuery::new(name.to_string(), mask));
        let target = match &mut search {
            Some(search) => match search.first_target(state.ndots, &state.domains) {
                Some(target) => target,
                None => {
                    return Ok(SendOutcome::InlineFailure(
                        search.final_status(DnsError::NotFound),
                    ))
                }
            },
            None => name.to_string(),
        };

        let len = encode_query(&mut scratch.buf, query_id as u16, &target, qtype)
            .map_err(|_| DnsError::InsufficientBuffer { required })?;

        let mut buf = scratch.buf.to_vec();
        buf.truncate(required.max(len));

        let (cancel_tx, cancel_rx) = oneshot::channel();
        state.in_flight.insert(
            query_id,
            QueryEntry {
                qtype,
                callback: callback.clone(),
                cancel: cancel_tx,
                task: None,
            },
        );

        let job = QueryJob {
            query_id,
            qtype,
            search,
            target,
            buf,
            len,
            callback,
        };
        let task = tokio::spawn(drive_query(self.shared.clone(), job, cancel_rx));
        if let Some(entry) = state.in_flight.get_mut(&query_id) {
            entry.task = Some(task);
        }

        Ok(SendOutcome::Scheduled)
    }

    /// Stop a lookup. The cache delivery registry is consulted first, then
    /// the in-flight table. No callback fires from inside this call; a
    /// cancelled query delivers its single cancellation record from its own
    /// task. Unknown or already-finished ids report [`DnsError::CacheNotFound`].
    #[tracing::instrument(skip(self))]
    pub fn cancel(&self, query_id: QueryId) -> Result<(), DnsError> {
        let mut state = self.shared.state();

        if self.shared.pending.cancel(query_id).is_ok() {
            return Ok(());
        }

        match state.in_flight.remove(&query_id) {
            Some(entry) => {
                let _ = entry.cancel.send(());
                Ok(())
            }
            None => Err(DnsError::CacheNotFound),
        }
    }

    /// Replace engine parameters. Handing in a server list resets the
    /// resolver: every in-flight query is cancelled and notified once the
    /// lock is back down.
    #[tracing::instrument(skip_all)]
    pub fn set_params(
        &self,
        timeout: Option<Duration>,
        tries: Option<u32>,
        servers: Option<Vec<SocketAddr>>,
        domains: Option<Vec<String>>,
    ) -> Result<(), DnsError> {
        let canceled = {
            let mut state = self.shared.state();
            if let Some(timeout) = timeout {
                state.timeout = timeout;
            }
            if let Some(tries) = tries {
                state.tries = tries;
            }
            if let Some(domains) = domains {
                state.domains = cap_domains(domains, self.shared.max_domains);
            }
            match servers {
                Some(servers) => reset_servers(&mut state, servers, self.shared.max_servers),
                None => Vec::new(),
            }
        };

        notify_canceled(canceled);
        Ok(())
    }

    /// Read the host resolver configuration and install the selected parts.
    /// Replacing the servers resets in-flight queries like `set_params`.
    pub fn configure(&self, probe: ProbeOptions) -> Result<(), DnsError> {
        self.configure_from(probe, Path::new(system::RESOLV_CONF))
    }

    #[tracing::instrument(skip(self))]
    pub fn configure_from(&self, probe: ProbeOptions, path: &Path) -> Result<(), DnsError> {
        let found = system::probe(path)?;

        let canceled = {
            let mut state = self.shared.state();
            let canceled = if probe.servers {
                reset_servers(&mut state, found.servers, self.shared.max_servers)
            } else {
                Vec::new()
            };
            if probe.suffixes {
                state.domains = cap_domains(found.domains, self.shared.max_domains);
                if let Some(ndots) = found.ndots {
                    state.ndots = ndots;
                }
            }
            dump_config(&state, &probe);
            canceled
        };

        notify_canceled(canceled);
        Ok(())
    }

    pub fn get_params(&self) -> EngineParams {
        let state = self.shared.state();
        EngineParams {
            timeout: state.timeout,
            tries: state.tries,
            ndots: state.ndots,
            servers: state.servers.clone(),
            domains: state.domains.clone(),
        }
    }

    pub fn clear_cache(&self) {
        self.shared.cache.clear();
    }

    fn spawn_cache_records(
        &self,
        query_id: QueryId,
        qtype: QueryType,
        records: Vec<DnsAnswer>,
        callback: RecordCallback,
    ) {
        let mut cancel_rx = self.shared.pending.register(query_id);
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let mut sink = CallbackSink::new(callback, query_id);
            let mut number = 0;
            for mut record in records {
                if cancel_rx.try_recv().is_ok() {
                    sink.deliver_final(&DnsAnswer::status(qtype, DnsError::QueryCanceled));
                    return;
                }
                number += 1;
                record.record_number = number;
                sink.deliver_record(&record);
            }
            sink.deliver_final(&DnsAnswer::end_of_list(qtype));
            shared.pending.complete(query_id);
        });
    }

    fn spawn_cache_negative(
        &self,
        query_id: QueryId,
        qtype: QueryType,
        owner: String,
        status: DnsError,
        ttl: u32,
        callback: RecordCallback,
    ) {
        let mut cancel_rx = self.shared.pending.register(query_id);
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let sink = CallbackSink::new(callback, query_id);
            if cancel_rx.try_recv().is_ok() {
                sink.deliver_final(&DnsAnswer::status(qtype, DnsError::QueryCanceled));
                return;
            }
            let answer = DnsAnswer {
                query_type: qtype,
                record_number: 0,
                owner,
                ttl,
                data: crate::answer::AnswerData::Status(status),
            };
            sink.deliver_final(&answer);
            shared.pending.complete(query_id);
        });
    }
}

/// Size the outbound message needs for `name`, expanded against the longest
/// selected suffix when searching.
fn compute_query_size(name_len: usize, longest_suffix: usize) -> usize {
    let suffix = if longest_suffix > 0 {
        longest_suffix + 1
    } else {
        0
    };
    HEADER_LEN + name_len + suffix + 2 + QUESTION_FIXED_LEN
}

fn encode_query(
    buf: &mut [u8],
    id: u16,
    name: &str,
    qtype: QueryType,
) -> Result<usize, plover_proto::buffer::WriterError> {
    let mut writer = PacketWriter::new(buf);
    Header::query(id).write(&mut writer)?;
    Question::new(name.to_string(), qtype).write(&mut writer)?;
    Ok(writer.pos())
}

fn cap_domains(mut domains: Vec<String>, max_domains: usize) -> Vec<String> {
    let cap = max_domains.min(search::MAX_DOMAINS);
    if domains.len() > cap {
        tracing::warn!(
            "too many search domains ({}), keeping the first {cap}",
            domains.len()
        );
        domains.truncate(cap);
    }
    domains
}

/// First phase of a server reset, under the engine lock: stop every driver
/// task (dropping a task closes its sockets), drain the in-flight table,
/// and install the new list.
fn reset_servers(
    state: &mut EngineState,
    mut servers: Vec<SocketAddr>,
    max_servers: usize,
) -> Vec<CanceledQuery> {
    let mut canceled = Vec::new();
    for (query_id, entry) in state.in_flight.drain() {
        if let Some(task) = entry.task {
            task.abort();
        }
        canceled.push(CanceledQuery {
            query_id,
            qtype: entry.qtype,
            callback: entry.callback,
        });
    }

    if servers.len() > max_servers {
        tracing::warn!(
            "too many servers ({}), keeping the first {max_servers}",
            servers.len()
        );
        servers.truncate(max_servers);
    }
    state.servers = servers;
    canceled
}

/// Second phase, after the lock is released: one cancellation record per
/// stopped query, through its own callback.
fn notify_canceled(canceled: Vec<CanceledQuery>) {
    for query in canceled {
        let answer = DnsAnswer::status(query.qtype, DnsError::QueryCanceled);
        let _ = (query.callback)(query.query_id, &answer);
    }
}

fn dump_config(state: &EngineState, probe: &ProbeOptions) {
    if probe.servers {
        if state.servers.is_empty() {
            tracing::warn!("no servers configured");
        } else {
            tracing::debug!("{} servers configured", state.servers.len());
            for server in &state.servers {
                tracing::debug!("   {server}");
            }
        }
    }
    if probe.suffixes {
        tracing::debug!("{} search domains configured", state.domains.len());
        for domain in &state.domains {
            tracing::debug!("   {domain}");
        }
    }
}

struct QueryJob {
    query_id: QueryId,
    qtype: QueryType,
    search: Option<SearchQuery>,
    target: String,
    buf: Vec<u8>,
    len: usize,
    callback: RecordCallback,
}

enum Resolution {
    /// Final response to walk and stream.
    Response { target: String, bytes: Vec<u8> },
    /// Status-only ending.
    Failed(DnsError),
}

enum AttemptOutcome {
    /// A response that ends the query.
    Answered(Vec<u8>),
    /// A negative outcome; the response is kept when it carries a denial
    /// worth caching.
    Negative {
        status: DnsError,
        response: Option<Vec<u8>>,
    },
}

#[tracing::instrument(skip_all, fields(id = job.query_id))]
async fn drive_query(
    shared: Arc<Shared>,
    mut job: QueryJob,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let query_id = job.query_id;
    let qtype = job.qtype;
    let callback = job.callback.clone();

    let resolution = tokio::select! {
        canceled = &mut cancel_rx => {
            // A closed channel means a reset already notified the caller;
            // only an explicit cancellation is delivered from here.
            if canceled.is_ok() {
                let answer = DnsAnswer::status(qtype, DnsError::QueryCanceled);
                CallbackSink::new(callback, query_id).deliver_final(&answer);
            }
            return;
        }
        resolution = resolve(&shared, &mut job) => resolution,
    };

    // Deliveries need the id claimed first; a missing entry means the query
    // was cancelled or reset while resolving.
    let claimed = shared.state().in_flight.remove(&query_id).is_some();
    if !claimed {
        if cancel_rx.try_recv().is_ok() {
            let answer = DnsAnswer::status(qtype, DnsError::QueryCanceled);
            CallbackSink::new(callback, query_id).deliver_final(&answer);
        }
        return;
    }

    let mut sink = CallbackSink::new(callback, query_id);
    match resolution {
        Resolution::Response { target, bytes } => {
            let mut tx = CacheTx::new(shared.cache.clone(), target, qtype);
            walk_response(&mut sink, &mut tx, qtype, &bytes, true);
        }
        Resolution::Failed(status) => {
            sink.deliver_final(&DnsAnswer::status(qtype, status));
        }
    }
}

async fn resolve(shared: &Arc<Shared>, job: &mut QueryJob) -> Resolution {
    loop {
        match attempt_servers(shared, &job.buf[..job.len]).await {
            AttemptOutcome::Answered(bytes) => {
                return Resolution::Response {
                    target: job.target.clone(),
                    bytes,
                };
            }
            AttemptOutcome::Negative { status, response } => {
                let search = match job.search.as_mut() {
                    // Only a denial keeps an ongoing search going.
                    Some(search) if search::keeps_searching(&status) => search,
                    // Otherwise this outcome ends the query. A denial with
                    // a response is walked so the chain and SOA TTL shape
                    // the status record.
                    _ => {
                        return match response {
                            Some(bytes) => Resolution::Response {
                                target: job.target.clone(),
                                bytes,
                            },
                            None => Resolution::Failed(status),
                        };
                    }
                };

                // Record the denial against the attempted name before
                // moving to the next candidate.
                if let Some(bytes) = &response {
                    let mut tx =
                        CacheTx::new(shared.cache.clone(), job.target.clone(), job.qtype);
                    let mut sink = CallbackSink::new(job.callback.clone(), job.query_id);
                    walk_response(&mut sink, &mut tx, job.qtype, bytes, false);
                }

                let next = {
                    let state = shared.state();
                    search.advance(status.clone(), &state.domains)
                };
                match next {
                    Some(target) => {
                        tracing::debug!("searching for {target} next");
                        job.target = target;
                        match encode_query(
                            &mut job.buf,
                            job.query_id as u16,
                            &job.target,
                            job.qtype,
                        ) {
                            Ok(len) => job.len = len,
                            Err(err) => return Resolution::Failed(err.into()),
                        }
                    }
                    None => return Resolution::Failed(search.final_status(status)),
                }
            }
        }
    }
}

/// One pass of the retry budget: every server, `tries` times over.
async fn attempt_servers(shared: &Arc<Shared>, packet: &[u8]) -> AttemptOutcome {
    let (servers, wait, tries) = {
        let state = shared.state();
        (state.servers.clone(), state.timeout, state.tries)
    };
    if servers.is_empty() {
        return AttemptOutcome::Negative {
            status: DnsError::EndOfServers,
            response: None,
        };
    }

    for _ in 0..tries {
        for server in &servers {
            let response = match shared.transport.exchange(*server, packet, wait).await {
                Ok(response) => response,
                Err(err) => {
                    tracing::debug!("exchange with {server} failed: {err}");
                    continue;
                }
            };

            let mut cursor = PacketCursor::new(&response);
            let header = match Header::read(&mut cursor) {
                Ok(header) => header,
                // Undecodable header: hand it to the response walk, which
                // reports the malformed message.
                Err(_) => return AttemptOutcome::Answered(response),
            };

            match header.response_code {
                ResponseCode::ServerFailure
                | ResponseCode::NotImplemented
                | ResponseCode::FormatError => {
                    tracing::debug!("server {server} failed the query, trying the next");
                    continue;
                }
                ResponseCode::NameError => {
                    return AttemptOutcome::Negative {
                        status: DnsError::NotFound,
                        response: Some(response),
                    };
                }
                ResponseCode::Refused => {
                    return AttemptOutcome::Negative {
                        status: DnsError::Refused,
                        response: None,
                    };
                }
                ResponseCode::NoError if header.answers == 0 => {
                    return AttemptOutcome::Negative {
                        status: DnsError::NoData,
                        response: Some(response),
                    };
                }
                ResponseCode::NoError => return AttemptOutcome::Answered(response),
            }
        }
    }

    AttemptOutcome::Negative {
        status: DnsError::EndOfServers,
        response: None,
    }
}
