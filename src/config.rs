use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Engine configuration. Every field has a default so a file only needs the
/// values it wants to change.
#[derive(Debug, serde::Deserialize)]
pub struct ResolverConfig {
    /// Seconds to wait for each server before moving on.
    #[serde(default = "ResolverConfig::default_timeout")]
    pub timeout: u64,
    /// Passes over the server list before giving up.
    #[serde(default = "ResolverConfig::default_tries")]
    pub tries: u32,
    /// Dot-count threshold deciding whether a name is tried as-is before or
    /// after the search suffixes.
    #[serde(default = "ResolverConfig::default_ndots")]
    pub ndots: u32,
    #[serde(default = "ResolverConfig::default_max_servers")]
    pub max_servers: usize,
    #[serde(default = "ResolverConfig::default_max_domains")]
    pub max_domains: usize,
    /// Receive budget for TCP replies.
    #[serde(default = "ResolverConfig::default_tcp_buf_len")]
    pub tcp_buf_len: usize,
    /// Send every query over TCP instead of falling back on truncation.
    #[serde(default)]
    pub force_tcp: bool,
    /// Never expand names against the search suffixes.
    #[serde(default)]
    pub no_search: bool,
    #[serde(default)]
    pub servers: Vec<SocketAddr>,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub cache: crate::cache::Config,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            timeout: Self::default_timeout(),
            tries: Self::default_tries(),
            ndots: Self::default_ndots(),
            max_servers: Self::default_max_servers(),
            max_domains: Self::default_max_domains(),
            tcp_buf_len: Self::default_tcp_buf_len(),
            force_tcp: false,
            no_search: false,
            servers: Vec::new(),
            domains: Vec::new(),
            cache: Default::default(),
        }
    }
}

impl ResolverConfig {
    pub fn default_timeout() -> u64 {
        5
    }

    pub fn default_tries() -> u32 {
        4
    }

    pub fn default_ndots() -> u32 {
        1
    }

    pub fn default_max_servers() -> usize {
        8
    }

    pub fn default_max_domains() -> usize {
        crate::search::MAX_DOMAINS
    }

    pub fn default_tcp_buf_len() -> usize {
        4096
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl ResolverConfig {
    pub fn load(path: &Path) -> Self {
        let conf = ::config::Config::builder()
            .add_source(::config::File::from(path).required(true))
            .add_source(::config::Environment::default().separator("_"))
            .build()
            .expect("unable to locate configuration file");
        conf.try_deserialize()
            .expect("configuration format invalid")
    }
}
