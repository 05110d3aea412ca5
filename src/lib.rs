//! Asynchronous DNS stub resolver.
//!
//! A [`DnsEngine`] accepts lookups from many concurrent callers, queries the
//! configured recursive servers over UDP with TCP fallback, chases CNAMEs,
//! expands bare names against the search suffixes, caches positive and
//! negative answers, and streams decoded records back through per-request
//! callbacks.

pub mod answer;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
mod pipeline;
mod search;
pub mod system;
pub mod transport;

#[cfg(test)]
mod testpkt;

pub use answer::{AnswerData, CallbackAction, DnsAnswer, QueryId, RecordCallback};
pub use config::ResolverConfig;
pub use engine::{
    Disposition, DnsEngine, EngineParams, ProbeOptions, QueryScratch, SendReply,
};
pub use error::DnsError;
pub use plover_proto::packet::record::{NaptrData, RecordData, SrvData};
pub use plover_proto::packet::QueryType;

#[cfg(test)]
pub(crate) fn init_logs() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, registry, EnvFilter};

    let _ = registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!("{}=debug", env!("CARGO_PKG_NAME")).into()
        }))
        .with(fmt::layer().with_ansi(cfg!(debug_assertions)))
        .try_init();
}
